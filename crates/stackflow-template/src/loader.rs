//! Template file loading

use crate::error::{Result, TemplateError};
use crate::yaml::parse_yaml;
use std::path::Path;

/// Supported template file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Yaml,
    Json,
}

impl TemplateFormat {
    /// Detect the format from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => Some(TemplateFormat::Yaml),
            Some("json") => Some(TemplateFormat::Json),
            _ => None,
        }
    }
}

/// Load a template document from a `.yml`, `.yaml` or `.json` file
pub fn load_template(path: impl AsRef<Path>) -> Result<serde_json::Value> {
    let path = path.as_ref();
    let format = TemplateFormat::from_path(path)
        .ok_or_else(|| TemplateError::UnsupportedFormat(path.to_path_buf()))?;

    let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), ?format, "Loading template");

    match format {
        TemplateFormat::Yaml => parse_yaml(&source),
        TemplateFormat::Json => Ok(serde_json::from_str(&source)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_load_yaml_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.yml");
        fs::write(
            &path,
            "Resources:\n  Topic:\n    Type: AWS::SNS::Topic\nOutputs:\n  Arn:\n    Value: !Ref Topic\n",
        )
        .unwrap();

        let template = load_template(&path).unwrap();
        assert_eq!(template["Outputs"]["Arn"]["Value"], json!({"Ref": "Topic"}));
    }

    #[test]
    fn test_load_json_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        fs::write(&path, r#"{"Resources": {"Topic": {"Type": "AWS::SNS::Topic"}}}"#).unwrap();

        let template = load_template(&path).unwrap();
        assert_eq!(template["Resources"]["Topic"]["Type"], "AWS::SNS::Topic");
    }

    #[test]
    fn test_yaml_extension_variant() {
        assert_eq!(
            TemplateFormat::from_path(Path::new("stack.yaml")),
            Some(TemplateFormat::Yaml)
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.js");
        fs::write(&path, "module.exports = {}").unwrap();

        let err = load_template(&path).unwrap_err();
        assert!(matches!(err, TemplateError::UnsupportedFormat(_)));
        assert!(err.to_string().contains("not a yaml or json file"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_template("/nonexistent/template.yml").unwrap_err();
        assert!(matches!(err, TemplateError::Read { .. }));
    }
}

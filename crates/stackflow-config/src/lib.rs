pub mod error;

pub use error::*;

use stackflow_cloud::StackInputs;
use std::path::{Path, PathBuf};

/// 環境変数でスタックファイルを直接指定する
pub const CONFIG_PATH_ENV: &str = "STACKFLOW_CONFIG_PATH";

const CANDIDATES: [&str; 3] = ["stack.local.yml", "stack.yml", "stack.yaml"];

/// プロジェクトのスタックファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 STACKFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: stack.local.yml, stack.yml, stack.yaml
/// 3. ./.stackflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/stackflow/stack.yml (グローバル設定)
pub fn find_stack_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    if let Some(path) = first_existing(&current_dir) {
        return Ok(path);
    }

    // 3. ./.stackflow/ ディレクトリで検索
    let stack_dir = current_dir.join(".stackflow");
    if stack_dir.is_dir() {
        if let Some(path) = first_existing(&stack_dir) {
            return Ok(path);
        }
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("stackflow").join("stack.yml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// スタックファイルを読み込み、テンプレートのパス指定を解決する
///
/// `template` が文字列の場合はスタックファイルからの相対パスとして
/// 読み込み、ドキュメントに置き換える。
pub fn load_stack_file(path: impl AsRef<Path>) -> Result<StackInputs> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)?;

    // インラインテンプレートの !Ref 等もここで展開される
    let document = stackflow_template::parse_yaml(&source)?;
    let mut inputs: StackInputs =
        serde_json::from_value(document).map_err(|e| ConfigError::InvalidStackFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if let Some(serde_json::Value::String(template_path)) = &inputs.template {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let template_path = base.join(template_path);
        tracing::debug!("Load template file {}", template_path.display());
        inputs.template = Some(stackflow_template::load_template(&template_path)?);
    }

    Ok(inputs)
}

/// 状態ファイル (.stackflow/state.json) を置くプロジェクトルート
///
/// スタックファイルが .stackflow/ 内にある場合はその親ディレクトリ。
pub fn project_root(stack_file: &Path) -> PathBuf {
    let dir = stack_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if dir.file_name().is_some_and(|name| name == ".stackflow") {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_find_stack_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stack.yml"), "stackName: api").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_stack_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("stack.yml"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        // stack.yml と stack.local.yml の両方を作成
        fs::write(temp_dir.path().join("stack.yml"), "stackName: api").unwrap();
        fs::write(temp_dir.path().join("stack.local.yml"), "stackName: api-dev").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_stack_file();
        std::env::set_current_dir(original_dir).unwrap();

        // stack.local.yml が優先される
        assert!(result.unwrap().ends_with("stack.local.yml"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_stackflow_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let stack_dir = temp_dir.path().join(".stackflow");
        fs::create_dir(&stack_dir).unwrap();
        fs::write(stack_dir.join("stack.yaml"), "stackName: api").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_stack_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".stackflow/stack.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yml");
        fs::write(&config_path, "stackName: api").unwrap();

        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        }

        let result = find_stack_file();

        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_find_stack_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let home = std::env::var_os("HOME");
        let xdg = std::env::var_os("XDG_CONFIG_HOME");

        // グローバル設定を拾わないようにする
        unsafe {
            std::env::set_var("HOME", temp_dir.path());
            std::env::set_var("XDG_CONFIG_HOME", temp_dir.path().join("config"));
        }
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_stack_file();

        std::env::set_current_dir(original_dir).unwrap();
        unsafe {
            match home {
                Some(h) => std::env::set_var("HOME", h),
                None => std::env::remove_var("HOME"),
            }
            match xdg {
                Some(x) => std::env::set_var("XDG_CONFIG_HOME", x),
                None => std::env::remove_var("XDG_CONFIG_HOME"),
            }
        }

        assert!(matches!(result, Err(ConfigError::StackFileNotFound)));
    }

    #[test]
    fn test_load_stack_file_with_inline_template() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stack.yml");
        fs::write(
            &path,
            r#"
stackName: api
region: eu-west-1
parameters:
  Env: prod
enableTerminationProtection: true
template:
  Resources:
    Topic:
      Type: AWS::SNS::Topic
  Outputs:
    Arn:
      Value: !Ref Topic
"#,
        )
        .unwrap();

        let inputs = load_stack_file(&path).unwrap();

        assert_eq!(inputs.stack_name.as_deref(), Some("api"));
        assert_eq!(inputs.region.as_deref(), Some("eu-west-1"));
        assert_eq!(inputs.parameters["Env"], "prod");
        assert!(inputs.enable_termination_protection);
        assert_eq!(
            inputs.template.unwrap()["Outputs"]["Arn"]["Value"],
            json!({"Ref": "Topic"})
        );
    }

    #[test]
    fn test_load_stack_file_resolves_template_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir(temp_dir.path().join("infra")).unwrap();
        fs::write(
            temp_dir.path().join("infra/template.yml"),
            "Resources:\n  Bucket:\n    Type: AWS::S3::Bucket\nOutputs:\n  Arn:\n    Value: !GetAtt Bucket.Arn\n",
        )
        .unwrap();
        let path = temp_dir.path().join("stack.yml");
        fs::write(&path, "stackName: api\ntemplate: infra/template.yml\n").unwrap();

        let inputs = load_stack_file(&path).unwrap();

        assert_eq!(
            inputs.template.unwrap()["Outputs"]["Arn"]["Value"],
            json!({"Fn::GetAtt": ["Bucket", "Arn"]})
        );
    }

    #[test]
    fn test_load_stack_file_rejects_unknown_template_format() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stack.yml");
        fs::write(&path, "stackName: api\ntemplate: template.txt\n").unwrap();

        let err = load_stack_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Template(_)));
    }

    #[test]
    fn test_load_stack_file_rejects_bad_shape() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stack.yml");
        fs::write(&path, "stackName: [not, a, string]\n").unwrap();

        let err = load_stack_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStackFile { .. }));
    }

    #[test]
    fn test_project_root() {
        assert_eq!(
            project_root(Path::new("/work/app/stack.yml")),
            PathBuf::from("/work/app")
        );
        assert_eq!(
            project_root(Path::new("/work/app/.stackflow/stack.yml")),
            PathBuf::from("/work/app")
        );
        assert_eq!(project_root(Path::new("stack.yml")), PathBuf::from("."));
    }
}

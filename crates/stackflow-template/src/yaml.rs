//! YAML to JSON conversion with intrinsic-function tags

use crate::error::{Result, TemplateError};
use crate::intrinsic::Intrinsic;
use serde_yaml::Value as Yaml;
use serde_json::{Map, Number, Value as Json};

/// Parse a YAML template, expanding `!Ref`, `!Sub`, ... into JSON objects
pub fn parse_yaml(source: &str) -> Result<Json> {
    let document: Yaml = serde_yaml::from_str(source)?;
    to_json(document)
}

/// Convert a parsed YAML node
pub fn to_json(node: Yaml) -> Result<Json> {
    Ok(match node {
        Yaml::Null => Json::Null,
        Yaml::Bool(b) => Json::Bool(b),
        Yaml::Number(n) => Json::Number(number(&n)?),
        Yaml::String(s) => Json::String(s),
        Yaml::Sequence(items) => Json::Array(
            items
                .into_iter()
                .map(to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut object = Map::new();
            for (key, value) in mapping {
                object.insert(key_string(key)?, to_json(value)?);
            }
            Json::Object(object)
        }
        Yaml::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let function =
                Intrinsic::from_tag(&tag).ok_or_else(|| TemplateError::UnknownTag(
                    tag.trim_start_matches('!').to_string(),
                ))?;
            function.expand(to_json(tagged.value)?)
        }
    })
}

fn number(n: &serde_yaml::Number) -> Result<Number> {
    if let Some(i) = n.as_i64() {
        return Ok(Number::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Ok(Number::from(u));
    }
    n.as_f64()
        .and_then(Number::from_f64)
        .ok_or_else(|| TemplateError::InvalidNumber(n.to_string()))
}

fn key_string(key: Yaml) -> Result<String> {
    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Null => Ok("null".to_string()),
        other => Err(TemplateError::InvalidKey(format!("{:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_document() {
        let doc = parse_yaml(
            r#"
AWSTemplateFormatVersion: "2010-09-09"
Resources:
  Queue:
    Type: AWS::SQS::Queue
    Properties:
      DelaySeconds: 5
      FifoQueue: false
"#,
        )
        .unwrap();

        assert_eq!(
            doc,
            json!({
                "AWSTemplateFormatVersion": "2010-09-09",
                "Resources": {
                    "Queue": {
                        "Type": "AWS::SQS::Queue",
                        "Properties": {"DelaySeconds": 5, "FifoQueue": false}
                    }
                }
            })
        );
    }

    #[test]
    fn test_scalar_tags() {
        let doc = parse_yaml(
            r#"
Name: !Ref Env
Url: !Sub "https://${Domain}/api"
Arn: !GetAtt Bucket.Arn
Zones: !GetAZs ""
Exported: !ImportValue shared-vpc
"#,
        )
        .unwrap();

        assert_eq!(doc["Name"], json!({"Ref": "Env"}));
        assert_eq!(doc["Url"], json!({"Fn::Sub": "https://${Domain}/api"}));
        assert_eq!(doc["Arn"], json!({"Fn::GetAtt": ["Bucket", "Arn"]}));
        assert_eq!(doc["Zones"], json!({"Fn::GetAZs": ""}));
        assert_eq!(doc["Exported"], json!({"Fn::ImportValue": "shared-vpc"}));
    }

    #[test]
    fn test_sequence_and_nested_tags() {
        let doc = parse_yaml(
            r#"
Joined: !Join [",", [!Ref A, !Ref B]]
First: !Select [0, !GetAZs ""]
Picked: !If [IsProd, !FindInMap [Sizes, prod, cpu], 1]
Check: !And [!Equals [!Ref Env, prod], !Not [!Condition IsDev]]
"#,
        )
        .unwrap();

        assert_eq!(
            doc["Joined"],
            json!({"Fn::Join": [",", [{"Ref": "A"}, {"Ref": "B"}]]})
        );
        assert_eq!(doc["First"], json!({"Fn::Select": [0, {"Fn::GetAZs": ""}]}));
        assert_eq!(
            doc["Picked"],
            json!({"Fn::If": ["IsProd", {"Fn::FindInMap": ["Sizes", "prod", "cpu"]}, 1]})
        );
        assert_eq!(
            doc["Check"],
            json!({"Fn::And": [
                {"Fn::Equals": [{"Ref": "Env"}, "prod"]},
                {"Fn::Not": [{"Condition": "IsDev"}]}
            ]})
        );
    }

    #[test]
    fn test_mapping_tag() {
        let doc = parse_yaml(
            r#"
Body: !Sub
  - "${Name}-queue"
  - Name: !Ref Env
Encoded: !Base64
  Fn::Join: ["", ["a", "b"]]
"#,
        )
        .unwrap();

        assert_eq!(
            doc["Body"],
            json!({"Fn::Sub": ["${Name}-queue", {"Name": {"Ref": "Env"}}]})
        );
        assert_eq!(
            doc["Encoded"],
            json!({"Fn::Base64": {"Fn::Join": ["", ["a", "b"]]}})
        );
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let err = parse_yaml("Value: !Transform {Name: X}").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownTag(ref t) if t == "Transform"));
    }

    #[test]
    fn test_non_string_keys() {
        let doc = parse_yaml("Mappings:\n  Ports:\n    80: http\n    true: yes\n").unwrap();
        assert_eq!(doc["Mappings"]["Ports"]["80"], "http");
        assert_eq!(doc["Mappings"]["Ports"]["true"], "yes");
    }
}

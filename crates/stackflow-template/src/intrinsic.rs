//! CloudFormation intrinsic functions written as YAML tags
//!
//! `!Ref x` and `!Condition x` keep their bare name as the key, every other
//! function is keyed `Fn::<Name>`. The set is closed.

use serde_json::{Value, json};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    And,
    Base64,
    Cidr,
    Condition,
    Equals,
    FindInMap,
    GetAtt,
    GetAZs,
    If,
    ImportValue,
    Join,
    Not,
    Or,
    Ref,
    Select,
    Split,
    Sub,
}

impl Intrinsic {
    pub const ALL: [Intrinsic; 17] = [
        Intrinsic::And,
        Intrinsic::Base64,
        Intrinsic::Cidr,
        Intrinsic::Condition,
        Intrinsic::Equals,
        Intrinsic::FindInMap,
        Intrinsic::GetAtt,
        Intrinsic::GetAZs,
        Intrinsic::If,
        Intrinsic::ImportValue,
        Intrinsic::Join,
        Intrinsic::Not,
        Intrinsic::Or,
        Intrinsic::Ref,
        Intrinsic::Select,
        Intrinsic::Split,
        Intrinsic::Sub,
    ];

    /// Tag name without the leading `!`
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::And => "And",
            Intrinsic::Base64 => "Base64",
            Intrinsic::Cidr => "Cidr",
            Intrinsic::Condition => "Condition",
            Intrinsic::Equals => "Equals",
            Intrinsic::FindInMap => "FindInMap",
            Intrinsic::GetAtt => "GetAtt",
            Intrinsic::GetAZs => "GetAZs",
            Intrinsic::If => "If",
            Intrinsic::ImportValue => "ImportValue",
            Intrinsic::Join => "Join",
            Intrinsic::Not => "Not",
            Intrinsic::Or => "Or",
            Intrinsic::Ref => "Ref",
            Intrinsic::Select => "Select",
            Intrinsic::Split => "Split",
            Intrinsic::Sub => "Sub",
        }
    }

    /// Look up a tag, with or without the leading `!`
    pub fn from_tag(tag: &str) -> Option<Self> {
        let name = tag.strip_prefix('!').unwrap_or(tag);
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Key of the JSON object the function expands to
    pub fn key(self) -> String {
        match self {
            Intrinsic::Ref | Intrinsic::Condition => self.name().to_string(),
            other => format!("Fn::{}", other.name()),
        }
    }

    /// Expand the tagged node into its JSON form
    pub fn expand(self, data: Value) -> Value {
        let data = match (self, data) {
            // dot syntax: "Resource.Attribute"
            (Intrinsic::GetAtt, Value::String(path)) => Value::Array(
                path.split('.')
                    .take(2)
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ),
            (_, data) => data,
        };
        let mut object = json!({});
        object[self.key()] = data;
        object
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_keys() {
        assert_eq!(Intrinsic::Ref.key(), "Ref");
        assert_eq!(Intrinsic::Condition.key(), "Condition");
    }

    #[test]
    fn test_fn_keys() {
        for f in Intrinsic::ALL {
            if !matches!(f, Intrinsic::Ref | Intrinsic::Condition) {
                assert_eq!(f.key(), format!("Fn::{}", f.name()));
            }
        }
        assert_eq!(Intrinsic::GetAZs.key(), "Fn::GetAZs");
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(Intrinsic::from_tag("!Sub"), Some(Intrinsic::Sub));
        assert_eq!(Intrinsic::from_tag("ImportValue"), Some(Intrinsic::ImportValue));
        assert_eq!(Intrinsic::from_tag("!Transform"), None);
        assert_eq!(Intrinsic::from_tag("!ref"), None);
    }

    #[test]
    fn test_get_att_dot_syntax() {
        assert_eq!(
            Intrinsic::GetAtt.expand(json!("Bucket.Arn")),
            json!({"Fn::GetAtt": ["Bucket", "Arn"]})
        );
        assert_eq!(
            Intrinsic::GetAtt.expand(json!("Db.Endpoint.Address")),
            json!({"Fn::GetAtt": ["Db", "Endpoint"]})
        );
        assert_eq!(
            Intrinsic::GetAtt.expand(json!(["Db", "Endpoint.Address"])),
            json!({"Fn::GetAtt": ["Db", "Endpoint.Address"]})
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Intrinsic::FindInMap.to_string(), "!FindInMap");
    }
}

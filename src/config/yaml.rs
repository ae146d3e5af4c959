//! YAML loading helpers shared by the manager and scheduler files

use crate::error::{AbiQueueError, Result};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_yaml::Value;

/// Parse a YAML document, resolving anchors, aliases and `<<` merge keys
pub fn load_document(text: &str, origin: &str) -> Result<Value> {
    let mut value: Value =
        serde_yaml::from_str(text).map_err(|e| AbiQueueError::yaml(origin, e))?;
    value
        .apply_merge()
        .map_err(|e| AbiQueueError::yaml(origin, e))?;
    Ok(value)
}

/// Parse a YAML document into `T` after merge-key resolution
pub fn from_document<T: DeserializeOwned>(text: &str, origin: &str) -> Result<T> {
    let value = load_document(text, origin)?;
    serde_yaml::from_value(value).map_err(|e| AbiQueueError::yaml(origin, e))
}

/// Accept `true/false` as well as the `yes/no` spelling common in old files
pub fn bool_like<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolLike {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match BoolLike::deserialize(deserializer)? {
        BoolLike::Bool(b) => Ok(b),
        BoolLike::Int(i) => Ok(i != 0),
        BoolLike::Text(s) => match s.to_ascii_lowercase().as_str() {
            "yes" | "true" | "on" => Ok(true),
            "no" | "false" | "off" => Ok(false),
            _ => Err(de::Error::custom(format!(
                "don't know how to convert '{}' into a boolean",
                s
            ))),
        },
    }
}

/// Accept a single string or a list of strings; null gives an empty list
pub fn string_or_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}

/// Render a YAML scalar the way it would appear in a shell script
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Flags {
        #[serde(deserialize_with = "bool_like")]
        enabled: bool,
        #[serde(default, deserialize_with = "string_or_list")]
        modules: Vec<String>,
    }

    #[test]
    fn test_merge_keys_are_resolved() {
        let text = r#"
base: &base
  num_nodes: 2
  cores_per_socket: 8
derived:
  <<: *base
  cores_per_socket: 16
"#;
        let value = load_document(text, "test").unwrap();
        assert_eq!(value["derived"]["num_nodes"].as_u64(), Some(2));
        assert_eq!(value["derived"]["cores_per_socket"].as_u64(), Some(16));
    }

    #[test]
    fn test_bool_like_and_lists() {
        let flags: Flags = serde_yaml::from_str("enabled: no\nmodules: intel/2023").unwrap();
        assert!(!flags.enabled);
        assert_eq!(flags.modules, vec!["intel/2023"]);

        let flags: Flags = serde_yaml::from_str("enabled: true\nmodules: [a, b]").unwrap();
        assert!(flags.enabled);
        assert_eq!(flags.modules.len(), 2);

        assert!(serde_yaml::from_str::<Flags>("enabled: maybe").is_err());
    }

    #[test]
    fn test_invalid_document() {
        assert!(load_document("a: [1, 2", "broken.yml").is_err());
    }
}

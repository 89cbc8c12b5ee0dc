//! Canonical reply shape produced by every chat backend.
//!
//! Vendors answer with a bare string, a list of typed parts, or a JSON object
//! depending on the API and the request. Providers convert whatever they
//! receive into [`ReplyContent`] and the backend boundary flattens it with
//! [`ReplyContent::normalize`], which is total: every shape maps to a string.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyContent {
    Empty,
    Text(String),
    Sequence(Vec<ReplyContent>),
    Mapping(Map<String, Value>),
    Opaque(Value),
}

impl ReplyContent {
    pub fn normalize(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(text) => text.clone(),
            Self::Sequence(items) => items.iter().map(Self::normalize_element).collect(),
            Self::Mapping(map) => normalize_mapping(map),
            Self::Opaque(value) => value.to_string(),
        }
    }

    fn normalize_element(&self) -> String {
        match self {
            Self::Mapping(map) => field(map, "text")
                .or_else(|| field(map, "content"))
                .map(|value| Self::from(value.clone()).normalize())
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            other => other.normalize(),
        }
    }
}

fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

fn normalize_mapping(map: &Map<String, Value>) -> String {
    field(map, "content")
        .or_else(|| field(map, "text"))
        .map(|value| ReplyContent::from(value.clone()).normalize())
        .unwrap_or_else(|| Value::Object(map.clone()).to_string())
}

impl From<Value> for ReplyContent {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(text) => Self::Text(text),
            Value::Array(items) => Self::Sequence(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Mapping(map),
            other => Self::Opaque(other),
        }
    }
}

impl From<String> for ReplyContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ReplyContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

pub fn normalize(value: &Value) -> String {
    ReplyContent::from(value.clone()).normalize()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ReplyContent, normalize};

    #[test]
    fn normalize_handles_every_reply_shape() {
        assert_eq!(normalize(&json!(null)), "");
        assert_eq!(normalize(&json!("x")), "x");
        assert_eq!(normalize(&json!(["a", {"text": "b"}])), "ab");
        assert_eq!(normalize(&json!({"content": "c"})), "c");
        assert_eq!(normalize(&json!({"role": "assistant", "content": "d"})), "d");
    }

    #[test]
    fn mapping_prefers_content_then_text_then_json() {
        assert_eq!(normalize(&json!({"content": "c", "text": "t"})), "c");
        assert_eq!(normalize(&json!({"content": null, "text": "t"})), "t");
        assert_eq!(normalize(&json!({"other": 1})), r#"{"other":1}"#);
    }

    #[test]
    fn sequence_elements_prefer_text_then_content() {
        let value = json!([
            {"type": "text", "text": "one "},
            {"content": "two "},
            {"content": [{"text": "three"}]},
            {"kind": "image"}
        ]);
        assert_eq!(normalize(&value), r#"one two three{"kind":"image"}"#);
    }

    #[test]
    fn nested_content_is_followed_recursively() {
        let value = json!({"content": {"content": ["x", null, "y"]}});
        assert_eq!(normalize(&value), "xy");
    }

    #[test]
    fn scalars_are_stringified() {
        assert_eq!(normalize(&json!(42)), "42");
        assert_eq!(normalize(&json!(true)), "true");
        assert_eq!(normalize(&json!([1, "a"])), "1a");
    }

    #[test]
    fn text_and_empty_variants_round_out_the_union() {
        assert_eq!(ReplyContent::Empty.normalize(), "");
        assert_eq!(ReplyContent::from("hi").normalize(), "hi");
        assert_eq!(
            ReplyContent::Sequence(vec![ReplyContent::Empty, "z".into()]).normalize(),
            "z"
        );
    }
}

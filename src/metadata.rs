//! Scalar metadata model shared by chunks and the index
//!
//! The index only stores scalar payload values. Anything structured is
//! flattened to JSON text before it gets there, and the page hierarchy is
//! kept in two explicit forms: a display string and a JSON list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const CONTENT_ID: &str = "content_id";
pub const PARENT_ID: &str = "parent_id";
pub const KIND: &str = "kind";
pub const TITLE: &str = "title";
pub const LINK: &str = "link";
pub const SOURCE_URL: &str = "source_url";
pub const SPACE: &str = "space";
pub const LAST_MODIFIED: &str = "last_modified";
/// Owning page's `last_modified`, carried by attachment chunks
pub const PAGE_LAST_MODIFIED: &str = "page_last_modified";
pub const IS_ATTACHMENT: &str = "is_attachment";
pub const FILE_TYPE: &str = "file_type";
pub const HIERARCHY: &str = "hierarchy";
pub const HIERARCHY_TEXT: &str = "hierarchy_text";
pub const HIERARCHY_JSON: &str = "hierarchy_json";
pub const CHUNK_INDEX: &str = "chunk_index";
pub const CHUNK_COUNT: &str = "chunk_count";
pub const CHUNK_HASH: &str = "chunk_hash";

/// Separator used in the human-readable hierarchy form
pub const HIERARCHY_SEPARATOR: &str = " > ";

/// A metadata value the index accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ScalarValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Int(i) => write!(f, "{}", i),
            ScalarValue::Float(x) => write!(f, "{}", x),
            ScalarValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::Str(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::Str(s)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Bool(b)
    }
}

impl From<i64> for ScalarValue {
    fn from(i: i64) -> Self {
        ScalarValue::Int(i)
    }
}

impl From<usize> for ScalarValue {
    fn from(i: usize) -> Self {
        ScalarValue::Int(i as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(x: f64) -> Self {
        ScalarValue::Float(x)
    }
}

/// Index-safe metadata: every value is a scalar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, ScalarValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ScalarValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(ScalarValue::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(ScalarValue::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(ScalarValue::as_i64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScalarValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Content id of the chunk this metadata belongs to
    pub fn content_id(&self) -> Option<&str> {
        self.get_str(CONTENT_ID)
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str(TITLE)
    }

    pub fn is_attachment(&self) -> bool {
        self.get_bool(IS_ATTACHMENT).unwrap_or(false)
    }

    /// Id used for structural grouping: an attachment resolves to its page
    pub fn effective_id(&self) -> Option<&str> {
        if self.is_attachment() {
            self.get_str(PARENT_ID)
        } else {
            self.content_id()
        }
    }

    /// `last_modified` of the page behind [`Metadata::effective_id`]
    pub fn effective_last_modified(&self) -> Option<&str> {
        if self.is_attachment() {
            self.get_str(PAGE_LAST_MODIFIED)
        } else {
            self.get_str(LAST_MODIFIED)
        }
    }

    /// Decoded hierarchy path, root first
    pub fn hierarchy(&self) -> Vec<String> {
        decode_hierarchy(self)
    }
}

impl FromIterator<(String, ScalarValue)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, ScalarValue)>>(iter: I) -> Self {
        Metadata(iter.into_iter().collect())
    }
}

/// Convert one JSON value to an index-safe scalar.
///
/// Lists and maps become their JSON text; scalars pass through.
pub fn to_scalar(value: Value) -> ScalarValue {
    match value {
        Value::Null => ScalarValue::Null,
        Value::Bool(b) => ScalarValue::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ScalarValue::Int(i)
            } else if let Some(x) = n.as_f64() {
                ScalarValue::Float(x)
            } else {
                ScalarValue::Str(n.to_string())
            }
        }
        Value::String(s) => ScalarValue::Str(s),
        other @ (Value::Array(_) | Value::Object(_)) => ScalarValue::Str(other.to_string()),
    }
}

/// Sanitize a free-form metadata map for the index.
///
/// A `hierarchy` list is replaced by its two parallel encodings
/// (`hierarchy_text` and `hierarchy_json`); every other non-scalar value is
/// serialized to JSON text.
pub fn sanitize(mut map: Map<String, Value>) -> Metadata {
    let mut out = Metadata::new();

    if let Some(Value::Array(items)) = map.get(HIERARCHY) {
        let path: Vec<String> = items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        map.remove(HIERARCHY);
        encode_hierarchy(&mut out, &path);
    }

    for (key, value) in map {
        out.insert(key, to_scalar(value));
    }
    out
}

/// Write both hierarchy encodings into `metadata`
pub fn encode_hierarchy(metadata: &mut Metadata, path: &[String]) {
    metadata.insert(HIERARCHY_TEXT, path.join(HIERARCHY_SEPARATOR));
    metadata.insert(HIERARCHY_JSON, serde_json::Value::from(path).to_string());
}

/// Read the hierarchy back, preferring the JSON form.
///
/// Falls back to splitting the display string when the JSON form is missing
/// or unparseable.
pub fn decode_hierarchy(metadata: &Metadata) -> Vec<String> {
    if let Some(json) = metadata.get_str(HIERARCHY_JSON) {
        if let Ok(path) = serde_json::from_str::<Vec<String>>(json) {
            return path;
        }
    }

    match metadata.get_str(HIERARCHY_TEXT) {
        Some(text) if !text.is_empty() => text
            .split(HIERARCHY_SEPARATOR)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hierarchy_round_trip() {
        let mut map = Map::new();
        map.insert(HIERARCHY.to_string(), json!(["A", "B", "C"]));

        let metadata = sanitize(map);

        assert_eq!(metadata.get_str(HIERARCHY_TEXT), Some("A > B > C"));
        assert_eq!(metadata.get_str(HIERARCHY_JSON), Some(r#"["A","B","C"]"#));
        assert!(metadata.get(HIERARCHY).is_none());
        assert_eq!(decode_hierarchy(&metadata), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_decode_prefers_json_over_text() {
        // A title containing the separator only survives through the JSON form
        let mut metadata = Metadata::new();
        encode_hierarchy(&mut metadata, &["Ops > Legacy".to_string(), "Runbooks".to_string()]);

        assert_eq!(decode_hierarchy(&metadata), vec!["Ops > Legacy", "Runbooks"]);
    }

    #[test]
    fn test_decode_falls_back_to_text() {
        let mut metadata = Metadata::new();
        metadata.insert(HIERARCHY_JSON, "not json");
        metadata.insert(HIERARCHY_TEXT, "Home > Guides");

        assert_eq!(decode_hierarchy(&metadata), vec!["Home", "Guides"]);
        assert!(decode_hierarchy(&Metadata::new()).is_empty());
    }

    #[test]
    fn test_non_scalars_serialized_scalars_untouched() {
        let mut map = Map::new();
        map.insert("labels".to_string(), json!(["howto", "faq"]));
        map.insert("version".to_string(), json!({"number": 7}));
        map.insert("title".to_string(), json!("Setup"));
        map.insert("chunk_count".to_string(), json!(3));
        map.insert("score".to_string(), json!(0.5));
        map.insert("is_attachment".to_string(), json!(false));
        map.insert("parent_id".to_string(), Value::Null);

        let metadata = sanitize(map);

        assert_eq!(metadata.get_str("labels"), Some(r#"["howto","faq"]"#));
        assert_eq!(metadata.get_str("version"), Some(r#"{"number":7}"#));
        assert_eq!(metadata.get_str("title"), Some("Setup"));
        assert_eq!(metadata.get_i64("chunk_count"), Some(3));
        assert_eq!(metadata.get("score"), Some(&ScalarValue::Float(0.5)));
        assert_eq!(metadata.get_bool("is_attachment"), Some(false));
        assert_eq!(metadata.get("parent_id"), Some(&ScalarValue::Null));
    }

    #[test]
    fn test_effective_id() {
        let mut page = Metadata::new();
        page.insert(CONTENT_ID, "100");
        page.insert(IS_ATTACHMENT, false);
        assert_eq!(page.effective_id(), Some("100"));

        let mut attachment = Metadata::new();
        attachment.insert(CONTENT_ID, "att-7");
        attachment.insert(PARENT_ID, "100");
        attachment.insert(IS_ATTACHMENT, true);
        assert_eq!(attachment.effective_id(), Some("100"));
    }
}

//! Payload conversion between index records and Qdrant points

use super::{FieldFilter, IndexRecord, StoredChunk};
use crate::error::{Error, Result};
use crate::metadata::{Metadata, ScalarValue};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{Condition, Filter, PointId, PointStruct, Value as QdrantValue};
use serde_json::Value;
use std::collections::HashMap;

/// Payload key holding the chunk text
pub const TEXT_KEY: &str = "text";

impl IndexRecord {
    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let mut payload: HashMap<String, QdrantValue> = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), scalar_to_qdrant(v)))
            .collect();
        payload.insert(TEXT_KEY.to_string(), string_to_qdrant(&self.text));

        PointStruct::new(self.id.to_string(), self.vector, payload)
    }
}

/// Rebuild a stored chunk from a point id and payload
pub fn stored_chunk_from_payload(
    id: Option<PointId>,
    payload: HashMap<String, QdrantValue>,
    score: Option<f32>,
) -> StoredChunk {
    let mut text = String::new();
    let mut metadata = Metadata::new();

    for (key, value) in payload {
        if key == TEXT_KEY {
            if let Some(Kind::StringValue(s)) = value.kind {
                text = s;
            }
            continue;
        }
        metadata.insert(key, qdrant_to_scalar(value));
    }

    StoredChunk {
        id: point_id_to_string(id),
        text,
        metadata,
        score,
    }
}

/// Translate a conjunction of equality conditions into a Qdrant filter
pub fn to_qdrant_filter(filter: &FieldFilter) -> Result<Filter> {
    let conditions = filter
        .conditions()
        .iter()
        .map(|(field, value)| match value {
            ScalarValue::Str(s) => Ok(Condition::matches(field.as_str(), s.clone())),
            ScalarValue::Int(i) => Ok(Condition::matches(field.as_str(), *i)),
            ScalarValue::Bool(b) => Ok(Condition::matches(field.as_str(), *b)),
            ScalarValue::Null => Ok(Condition::is_null(field.as_str())),
            ScalarValue::Float(_) => Err(Error::Index(format!(
                "Cannot filter on float field '{}'",
                field
            ))),
        })
        .collect::<Result<Vec<Condition>>>()?;

    Ok(Filter::must(conditions))
}

pub fn scalar_to_qdrant(value: &ScalarValue) -> QdrantValue {
    let kind = match value {
        ScalarValue::Null => Kind::NullValue(0),
        ScalarValue::Bool(b) => Kind::BoolValue(*b),
        ScalarValue::Int(i) => Kind::IntegerValue(*i),
        ScalarValue::Float(x) => Kind::DoubleValue(*x),
        ScalarValue::Str(s) => Kind::StringValue(s.clone()),
    };
    QdrantValue { kind: Some(kind) }
}

/// Read a payload value back as a scalar; structured values become JSON text
pub fn qdrant_to_scalar(value: QdrantValue) -> ScalarValue {
    match value.kind {
        Some(Kind::NullValue(_)) | None => ScalarValue::Null,
        Some(Kind::BoolValue(b)) => ScalarValue::Bool(b),
        Some(Kind::IntegerValue(i)) => ScalarValue::Int(i),
        Some(Kind::DoubleValue(d)) => ScalarValue::Float(d),
        Some(Kind::StringValue(s)) => ScalarValue::Str(s),
        other => ScalarValue::Str(json_from_qdrant_value(QdrantValue { kind: other }).to_string()),
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::StringValue(s.to_string())),
    }
}

/// Convert PointId to string
pub fn point_id_to_string(id: Option<PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;

    match id.and_then(|p| p.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// Convert Qdrant value to serde_json Value
fn json_from_qdrant_value(v: QdrantValue) -> Value {
    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata;
    use qdrant_client::qdrant::ListValue;

    #[test]
    fn test_record_payload_round_trip() {
        let mut meta = Metadata::new();
        meta.insert(metadata::CONTENT_ID, "42");
        meta.insert(metadata::CHUNK_INDEX, 1usize);
        meta.insert(metadata::IS_ATTACHMENT, false);

        let record = IndexRecord::new("42", 1, vec![0.1, 0.2], "chunk body".to_string(), meta.clone());
        let expected_id = record.id.to_string();
        let point = record.to_point_struct();

        let chunk = stored_chunk_from_payload(point.id, point.payload, Some(0.5));

        assert_eq!(chunk.id, expected_id);
        assert_eq!(chunk.text, "chunk body");
        assert_eq!(chunk.metadata, meta);
        assert_eq!(chunk.score, Some(0.5));
    }

    #[test]
    fn test_structured_payload_becomes_json_text() {
        let list = QdrantValue {
            kind: Some(Kind::ListValue(ListValue {
                values: vec![string_to_qdrant("A"), string_to_qdrant("B")],
            })),
        };

        assert_eq!(qdrant_to_scalar(list), ScalarValue::Str(r#"["A","B"]"#.to_string()));
    }

    #[test]
    fn test_filter_conversion() {
        let filter = FieldFilter::eq(metadata::CONTENT_ID, "42").and(metadata::IS_ATTACHMENT, false);
        let qdrant_filter = to_qdrant_filter(&filter).unwrap();
        assert_eq!(qdrant_filter.must.len(), 2);

        let bad = FieldFilter::eq("score", 0.5);
        assert!(to_qdrant_filter(&bad).is_err());
    }
}

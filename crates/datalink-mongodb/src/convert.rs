//! BSON <-> JSON conversion for documents, rows and aggregation pipelines.

use base64::Engine;
use bson::{oid::ObjectId, Bson, Document};
use datalink_core::{DataError, DataRow, Result};
use serde_json::{Number, Value};

/// JSON-safe rendering of a BSON value.
///
/// ObjectIds become hex strings, dates RFC 3339, decimals strings, binary base64.
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(s) | Bson::Symbol(s) => Value::String(s.clone()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(
            dt.try_to_rfc3339_string()
                .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        ),
        Bson::Timestamp(ts) => chrono::DateTime::from_timestamp(ts.time as i64, 0)
            .map(|at| Value::String(at.to_rfc3339()))
            .unwrap_or(Value::Null),
        Bson::Binary(binary) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(&binary.bytes))
        }
        Bson::RegularExpression(regex) => {
            Value::String(format!("/{}/{}", regex.pattern, regex.options))
        }
        Bson::Decimal128(_) => match value.clone().into_relaxed_extjson() {
            Value::Object(mut wrapped) => wrapped.remove("$numberDecimal").unwrap_or(Value::Null),
            other => other,
        },
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(document_to_row(doc)),
        other => other.clone().into_relaxed_extjson(),
    }
}

pub fn document_to_row(doc: &Document) -> DataRow {
    doc.iter()
        .map(|(key, value)| (key.clone(), bson_to_json(value)))
        .collect()
}

/// Document for insertion. A 24-hex `_id` string is restored to an ObjectId.
pub fn row_to_document(row: &DataRow) -> Result<Document> {
    let mut doc = match Bson::try_from(Value::Object(row.clone())) {
        Ok(Bson::Document(doc)) => doc,
        Ok(other) => {
            return Err(DataError::invalid_query(format!(
                "row is not a document: {}",
                other
            )))
        }
        Err(e) => return Err(DataError::invalid_query(format!("Invalid document: {}", e))),
    };

    if let Some(Bson::String(id)) = doc.get("_id") {
        if let Ok(oid) = ObjectId::parse_str(id) {
            doc.insert("_id", oid);
        }
    }
    Ok(doc)
}

/// Parse an aggregation pipeline given as a JSON array of stage objects.
///
/// Extended JSON such as `{"$oid": ...}` and `{"$date": ...}` is honored.
pub fn parse_pipeline(query: &str) -> Result<Vec<Document>> {
    let parsed: Value = serde_json::from_str(query)
        .map_err(|e| DataError::invalid_query(format!("Invalid JSON: {}", e)))?;
    let Value::Array(stages) = parsed else {
        return Err(DataError::invalid_query(
            "MongoDB pipeline must be a JSON array",
        ));
    };

    stages
        .into_iter()
        .map(|stage| {
            let rendered = stage.to_string();
            match Bson::try_from(stage) {
                Ok(Bson::Document(doc)) => Ok(doc),
                _ => Err(DataError::invalid_query(format!(
                    "Invalid stage format: {}",
                    rendered
                ))),
            }
        })
        .collect()
}

/// Type name used by schema inference
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::ObjectId(_) => "ObjectId",
        Bson::String(_) => "String",
        Bson::Int32(_) => "Int32",
        Bson::Int64(_) => "Int64",
        Bson::Double(_) => "Double",
        Bson::Decimal128(_) => "Decimal128",
        Bson::Boolean(_) => "Boolean",
        Bson::DateTime(_) => "Date",
        Bson::Timestamp(_) => "Timestamp",
        Bson::Document(_) => "Object",
        Bson::Array(_) => "Array",
        Bson::Binary(_) => "Binary",
        Bson::RegularExpression(_) => "Regex",
        Bson::Null => "null",
        Bson::Undefined => "Undefined",
        _ => "Other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, spec::BinarySubtype, Binary};
    use serde_json::json;

    #[test]
    fn test_bson_to_json_scalars() {
        let oid = ObjectId::parse_str("65a1f0c2e4b0a1b2c3d4e5f6").unwrap();
        let doc = doc! {
            "_id": oid,
            "when": bson::DateTime::from_millis(0),
            "ratio": f64::NAN,
            "blob": Binary { subtype: BinarySubtype::Generic, bytes: vec![1, 2, 3] },
            "nested": { "tags": ["a", 1_i32] },
        };

        let row = document_to_row(&doc);
        assert_eq!(row["_id"], json!("65a1f0c2e4b0a1b2c3d4e5f6"));
        assert_eq!(row["when"], json!("1970-01-01T00:00:00Z"));
        assert_eq!(row["ratio"], Value::Null);
        assert_eq!(row["blob"], json!("AQID"));
        assert_eq!(row["nested"], json!({"tags": ["a", 1]}));

        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_id", "when", "ratio", "blob", "nested"]);
    }

    #[test]
    fn test_decimal_becomes_string() {
        let decimal = Bson::try_from(json!({"$numberDecimal": "12.50"})).unwrap();
        assert!(matches!(decimal, Bson::Decimal128(_)));
        assert_eq!(bson_to_json(&decimal), json!("12.50"));
    }

    #[test]
    fn test_row_to_document_restores_object_id() {
        let row = json!({"_id": "65a1f0c2e4b0a1b2c3d4e5f6", "n": 3})
            .as_object()
            .unwrap()
            .clone();
        let doc = row_to_document(&row).unwrap();
        assert!(matches!(doc.get("_id"), Some(Bson::ObjectId(_))));
        assert_eq!(doc.get_i64("n").ok().or(doc.get_i32("n").ok().map(i64::from)), Some(3));
    }

    #[test]
    fn test_parse_pipeline_errors() {
        let err = parse_pipeline("{\"$match\": {}}").unwrap_err();
        assert!(err.to_string().contains("must be a JSON array"));

        let err = parse_pipeline("[{\"$match\": {}}, 5]").unwrap_err();
        assert!(err.to_string().contains("Invalid stage format: 5"));

        let err = parse_pipeline("[{").unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn test_parse_pipeline_extended_json() {
        let stages = parse_pipeline(
            r#"[{"$match": {"_id": {"$oid": "65a1f0c2e4b0a1b2c3d4e5f6"}}}, {"$limit": 5}]"#,
        )
        .unwrap();
        assert_eq!(stages.len(), 2);
        let matcher = stages[0].get_document("$match").unwrap();
        assert!(matches!(matcher.get("_id"), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(bson_type_name(&Bson::Int32(1)), "Int32");
        assert_eq!(bson_type_name(&Bson::Null), "null");
        assert_eq!(bson_type_name(&Bson::Document(doc! {})), "Object");
        assert_eq!(bson_type_name(&Bson::MaxKey), "Other");
    }
}

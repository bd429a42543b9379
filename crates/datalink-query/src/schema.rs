//! Generator-ready schema context
//!
//! The context is the JSON document handed to query generators. Relational stores are described
//! as tables plus foreign-key relationships, document stores as collections with their inferred
//! fields.

use datalink_core::{Result, StoreFamily, StoreType, TableMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnContext {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableContext {
    pub name: String,
    pub schema: Option<String>,
    pub row_count: u64,
    pub columns: Vec<ColumnContext>,
}

/// A foreign key seen from the referencing side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldContext {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionContext {
    pub name: String,
    pub document_count: u64,
    pub fields: Vec<FieldContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaContext {
    Relational {
        database_type: StoreType,
        tables: Vec<TableContext>,
        relationships: Vec<Relationship>,
    },
    Document {
        database_type: StoreType,
        collections: Vec<CollectionContext>,
    },
}

impl SchemaContext {
    /// Build the context for `store_type`; its family decides the shape
    pub fn from_metadata(store_type: StoreType, tables: &[TableMetadata]) -> Self {
        match store_type.family() {
            StoreFamily::Relational => SchemaContext::Relational {
                database_type: store_type,
                tables: tables.iter().map(table_context).collect(),
                relationships: tables
                    .iter()
                    .flat_map(|table| {
                        table.foreign_keys.iter().map(move |fk| Relationship {
                            from_table: table.name.clone(),
                            from_columns: fk.columns.clone(),
                            to_table: fk.referred_table.clone(),
                            to_columns: fk.referred_columns.clone(),
                        })
                    })
                    .collect(),
            },
            StoreFamily::Document => SchemaContext::Document {
                database_type: store_type,
                collections: tables
                    .iter()
                    .map(|collection| CollectionContext {
                        name: collection.name.clone(),
                        document_count: collection.row_count,
                        fields: collection
                            .columns
                            .iter()
                            .map(|c| FieldContext {
                                name: c.name.clone(),
                                data_type: c.data_type.clone(),
                                nullable: c.nullable,
                            })
                            .collect(),
                    })
                    .collect(),
            },
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn table_context(table: &TableMetadata) -> TableContext {
    TableContext {
        name: table.name.clone(),
        schema: table.schema.clone(),
        row_count: table.row_count,
        columns: table
            .columns
            .iter()
            .map(|c| ColumnContext {
                name: c.name.clone(),
                data_type: c.data_type.clone(),
                nullable: c.nullable,
                primary_key: table.primary_keys.contains(&c.name),
            })
            .collect(),
    }
}

/// Names of the tables or collections a context describes, in context order.
///
/// Accepts both the list shapes (`tables`, `collections`) and the keyed map shapes
/// (`table_schemas`, `collection_schemas`).
pub fn entity_names(context: &Value) -> Vec<String> {
    for key in ["tables", "collections"] {
        if let Some(items) = context.get(key).and_then(Value::as_array) {
            return items
                .iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
        }
    }
    for key in ["table_schemas", "collection_schemas"] {
        if let Some(map) = context.get(key).and_then(Value::as_object) {
            return map.keys().cloned().collect();
        }
    }
    Vec::new()
}

fn str_field<'a>(item: &'a Value, keys: &[&str], default: &'a str) -> &'a str {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .unwrap_or(default)
}

fn render_columns(out: &mut Vec<String>, columns: Option<&Value>) {
    for column in columns.and_then(Value::as_array).into_iter().flatten() {
        out.push(format!(
            "  - {} ({})",
            str_field(column, &["name", "column_name"], ""),
            str_field(column, &["type", "data_type"], "unknown"),
        ));
    }
}

fn render_fields(out: &mut Vec<String>, fields: Option<&Value>) {
    for field in fields.and_then(Value::as_array).into_iter().flatten() {
        out.push(format!(
            "  - {}: {}",
            str_field(field, &["name", "field"], ""),
            str_field(field, &["type"], "unknown"),
        ));
    }
}

/// Render a schema context as prompt text for a language-model generator
pub fn render_schema_prompt(context: &Value) -> String {
    if let Some(text) = context.as_str() {
        return text.to_string();
    }

    let mut out = Vec::new();
    if let Some(tables) = context.get("tables").and_then(Value::as_array) {
        for table in tables {
            out.push(format!("\nTable: {}", str_field(table, &["name"], "unknown")));
            render_columns(&mut out, table.get("columns"));
        }
        let relationships = context.get("relationships").and_then(Value::as_array);
        if let Some(relationships) = relationships.filter(|r| !r.is_empty()) {
            out.push("\nRelationships:".to_string());
            for rel in relationships {
                out.push(format!(
                    "  - {}({}) -> {}({})",
                    str_field(rel, &["from_table"], ""),
                    joined(rel.get("from_columns")),
                    str_field(rel, &["to_table"], ""),
                    joined(rel.get("to_columns")),
                ));
            }
        }
    } else if let Some(tables) = context.get("table_schemas").and_then(Value::as_object) {
        for (name, info) in tables {
            out.push(format!("\nTable: {}", name));
            render_columns(&mut out, info.get("columns"));
        }
    } else if let Some(collections) = context.get("collections").and_then(Value::as_array) {
        for collection in collections {
            out.push(format!(
                "\nCollection: {}",
                str_field(collection, &["name"], "unknown")
            ));
            render_fields(&mut out, collection.get("fields"));
        }
    } else if let Some(collections) = context.get("collection_schemas").and_then(Value::as_object) {
        for (name, info) in collections {
            out.push(format!("\nCollection: {}", name));
            render_fields(&mut out, info.get("fields"));
        }
    } else {
        return serde_json::to_string_pretty(context).unwrap_or_default();
    }
    out.join("\n")
}

fn joined(values: Option<&Value>) -> String {
    values
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalink_core::{ColumnMetadata, ForeignKey};
    use serde_json::json;

    fn shop() -> Vec<TableMetadata> {
        let mut customers = TableMetadata::new("customers", Some("public".to_string()));
        customers.columns = vec![
            ColumnMetadata::new("id", "integer", false),
            ColumnMetadata::new("email", "text", true),
        ];
        customers.primary_keys = vec!["id".to_string()];
        customers.row_count = 7;

        let mut orders = TableMetadata::new("orders", Some("public".to_string()));
        orders.columns = vec![
            ColumnMetadata::new("id", "integer", false),
            ColumnMetadata::new("customer_id", "integer", false),
        ];
        orders.primary_keys = vec!["id".to_string()];
        orders.foreign_keys = vec![ForeignKey {
            name: Some("orders_customer_fk".to_string()),
            columns: vec!["customer_id".to_string()],
            referred_table: "customers".to_string(),
            referred_schema: Some("public".to_string()),
            referred_columns: vec!["id".to_string()],
        }];
        vec![customers, orders]
    }

    #[test]
    fn test_relational_context_shape() {
        let context = SchemaContext::from_metadata(StoreType::Postgresql, &shop())
            .to_value()
            .unwrap();

        assert_eq!(context["database_type"], "postgresql");
        assert_eq!(context["tables"][0]["row_count"], 7);
        assert_eq!(
            context["tables"][0]["columns"][0],
            json!({"name": "id", "type": "integer", "nullable": false, "primary_key": true})
        );
        assert_eq!(
            context["relationships"],
            json!([{
                "from_table": "orders",
                "from_columns": ["customer_id"],
                "to_table": "customers",
                "to_columns": ["id"]
            }])
        );
        assert_eq!(entity_names(&context), vec!["customers", "orders"]);
    }

    #[test]
    fn test_document_context_shape() {
        let mut users = TableMetadata::new("users", None);
        users.columns = vec![ColumnMetadata::new("_id", "ObjectId", false)];
        users.row_count = 3;

        let context = SchemaContext::from_metadata(StoreType::Mongodb, &[users])
            .to_value()
            .unwrap();
        assert_eq!(context["database_type"], "mongodb");
        assert_eq!(context["collections"][0]["document_count"], 3);
        assert_eq!(context["collections"][0]["fields"][0]["type"], "ObjectId");
        assert!(context.get("tables").is_none());
    }

    #[test]
    fn test_render_prompt_variants() {
        let context = SchemaContext::from_metadata(StoreType::Sqlite, &shop())
            .to_value()
            .unwrap();
        let prompt = render_schema_prompt(&context);
        assert!(prompt.contains("Table: orders"));
        assert!(prompt.contains("  - customer_id (integer)"));
        assert!(prompt.contains("orders(customer_id) -> customers(id)"));

        let keyed = json!({"collection_schemas": {"events": {"fields": [{"name": "kind", "type": "String"}]}}});
        assert_eq!(render_schema_prompt(&keyed), "\nCollection: events\n  - kind: String");
        assert_eq!(entity_names(&keyed), vec!["events"]);

        assert_eq!(render_schema_prompt(&json!("raw text")), "raw text");
        assert!(render_schema_prompt(&json!({"other": 1})).contains("\"other\": 1"));
    }
}

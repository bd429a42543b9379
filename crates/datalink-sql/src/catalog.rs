//! Catalog reads: table listing, columns, keys, indexes and row counts per dialect.

use crate::dialect::Dialect;
use crate::pool::SqlPool;
use datalink_core::{
    ColumnMetadata, DataError, DataRow, ForeignKey, IndexInfo, Result, TableMetadata,
};
use serde_json::Value;

/// `(schema, table)` pairs of every user table and view
pub async fn list_tables(pool: &SqlPool) -> Result<Vec<(Option<String>, String)>> {
    let (sql, has_schema) = match pool.dialect() {
        Dialect::Postgres => (
            "SELECT table_schema::text AS table_schema, table_name::text AS table_name \
             FROM information_schema.tables \
             WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
             AND table_schema NOT LIKE 'pg_toast%' \
             AND table_type IN ('BASE TABLE', 'VIEW') \
             ORDER BY table_schema, table_name",
            true,
        ),
        Dialect::MySql => (
            "SELECT CAST(TABLE_NAME AS CHAR) AS table_name FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() ORDER BY TABLE_NAME",
            false,
        ),
        Dialect::Sqlite => (
            "SELECT name AS table_name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
            false,
        ),
    };

    let rows = pool.fetch_all(sql).await?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let table = text(row, "table_name")?;
            let schema = if has_schema { text(row, "table_schema") } else { None };
            Some((schema, table))
        })
        .collect())
}

/// Full metadata for one table, including an exact row count
pub async fn table_metadata(
    pool: &SqlPool,
    table: &str,
    schema: Option<&str>,
) -> Result<TableMetadata> {
    let mut metadata = describe_table(pool, table, schema).await?;
    metadata.row_count = row_count(pool, table, metadata.schema.as_deref()).await?;
    Ok(metadata)
}

/// Columns, keys and indexes without counting rows
pub async fn describe_table(
    pool: &SqlPool,
    table: &str,
    schema: Option<&str>,
) -> Result<TableMetadata> {
    let dialect = pool.dialect();
    let schema = schema.or(dialect.default_schema());

    let mut metadata = match dialect {
        Dialect::Postgres => postgres_metadata(pool, table, schema.unwrap_or("public")).await?,
        Dialect::MySql => mysql_metadata(pool, table, schema).await?,
        Dialect::Sqlite => sqlite_metadata(pool, table, schema).await?,
    };

    if metadata.columns.is_empty() {
        return Err(DataError::not_found(format!("Table {} not found", table)));
    }
    metadata.retain_known_primary_keys();
    Ok(metadata)
}

pub async fn row_count(pool: &SqlPool, table: &str, schema: Option<&str>) -> Result<u64> {
    let sql = format!(
        "SELECT COUNT(*) AS row_count FROM {}",
        pool.dialect().table_ref(table, schema)
    );
    let rows = pool.fetch_all(&sql).await?;
    Ok(rows
        .first()
        .and_then(|row| int(row, "row_count"))
        .map(|n| n.max(0) as u64)
        .unwrap_or(0))
}

async fn postgres_metadata(pool: &SqlPool, table: &str, schema: &str) -> Result<TableMetadata> {
    let mut metadata = TableMetadata::new(table, Some(schema.to_string()));
    let params = [schema, table];

    let columns = pool
        .fetch_bound(
            "SELECT column_name::text AS column_name, data_type::text AS data_type, \
             is_nullable::text AS is_nullable, column_default::text AS column_default, \
             is_identity::text AS is_identity \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
            &params,
        )
        .await?;
    for row in &columns {
        let Some(name) = text(row, "column_name") else {
            continue;
        };
        let default = text(row, "column_default");
        let mut column = ColumnMetadata::new(
            name,
            text(row, "data_type").unwrap_or_default().to_uppercase(),
            text(row, "is_nullable").as_deref() == Some("YES"),
        );
        column.auto_increment = text(row, "is_identity").as_deref() == Some("YES")
            || default
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("));
        column.default = default;
        metadata.columns.push(column);
    }

    let primary_keys = pool
        .fetch_bound(
            "SELECT kcu.column_name::text AS column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
              AND tc.table_name = kcu.table_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = $1 AND tc.table_name = $2 \
             ORDER BY kcu.ordinal_position",
            &params,
        )
        .await?;
    metadata.primary_keys = primary_keys
        .iter()
        .filter_map(|row| text(row, "column_name"))
        .collect();

    let foreign_keys = pool
        .fetch_bound(
            "SELECT con.conname::text AS constraint_name, att.attname::text AS column_name, \
             ref_ns.nspname::text AS referred_schema, ref_cl.relname::text AS referred_table, \
             ref_att.attname::text AS referred_column \
             FROM pg_constraint con \
             JOIN pg_class cl ON cl.oid = con.conrelid \
             JOIN pg_namespace ns ON ns.oid = cl.relnamespace \
             JOIN pg_class ref_cl ON ref_cl.oid = con.confrelid \
             JOIN pg_namespace ref_ns ON ref_ns.oid = ref_cl.relnamespace \
             CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, ref_attnum, ord) \
             JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum \
             JOIN pg_attribute ref_att ON ref_att.attrelid = con.confrelid AND ref_att.attnum = k.ref_attnum \
             WHERE con.contype = 'f' AND ns.nspname = $1 AND cl.relname = $2 \
             ORDER BY con.conname, k.ord",
            &params,
        )
        .await?;
    metadata.foreign_keys = group_foreign_keys(&foreign_keys);

    let indexes = pool
        .fetch_bound(
            "SELECT i.relname::text AS index_name, a.attname::text AS column_name, \
             ix.indisunique AS is_unique, am.amname::text AS index_kind \
             FROM pg_index ix \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_am am ON am.oid = i.relam \
             CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
             WHERE n.nspname = $1 AND t.relname = $2 AND NOT ix.indisprimary \
             ORDER BY i.relname, k.ord",
            &params,
        )
        .await?;
    metadata.indexes = group_indexes(&indexes, |row| flag(row, "is_unique"));

    Ok(metadata)
}

async fn mysql_metadata(
    pool: &SqlPool,
    table: &str,
    schema: Option<&str>,
) -> Result<TableMetadata> {
    let mut metadata = TableMetadata::new(table, schema.map(str::to_string));
    let schema_filter = if schema.is_some() { "?" } else { "DATABASE()" };
    let params: Vec<&str> = schema.into_iter().chain(std::iter::once(table)).collect();

    let columns = pool
        .fetch_bound(
            &format!(
                "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name, \
                 CAST(COLUMN_TYPE AS CHAR) AS column_type, \
                 CAST(IS_NULLABLE AS CHAR) AS is_nullable, \
                 CAST(COLUMN_DEFAULT AS CHAR) AS column_default, \
                 CAST(EXTRA AS CHAR) AS extra \
                 FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
                schema_filter
            ),
            &params,
        )
        .await?;
    for row in &columns {
        let Some(name) = text(row, "column_name") else {
            continue;
        };
        let mut column = ColumnMetadata::new(
            name,
            text(row, "column_type").unwrap_or_default().to_uppercase(),
            text(row, "is_nullable").as_deref() == Some("YES"),
        );
        column.default = text(row, "column_default");
        column.auto_increment = text(row, "extra")
            .is_some_and(|extra| extra.to_lowercase().contains("auto_increment"));
        metadata.columns.push(column);
    }

    let primary_keys = pool
        .fetch_bound(
            &format!(
                "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name \
                 FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
                 ORDER BY ORDINAL_POSITION",
                schema_filter
            ),
            &params,
        )
        .await?;
    metadata.primary_keys = primary_keys
        .iter()
        .filter_map(|row| text(row, "column_name"))
        .collect();

    let foreign_keys = pool
        .fetch_bound(
            &format!(
                "SELECT CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name, \
                 CAST(COLUMN_NAME AS CHAR) AS column_name, \
                 CAST(REFERENCED_TABLE_SCHEMA AS CHAR) AS referred_schema, \
                 CAST(REFERENCED_TABLE_NAME AS CHAR) AS referred_table, \
                 CAST(REFERENCED_COLUMN_NAME AS CHAR) AS referred_column \
                 FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = ? AND REFERENCED_TABLE_NAME IS NOT NULL \
                 ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION",
                schema_filter
            ),
            &params,
        )
        .await?;
    metadata.foreign_keys = group_foreign_keys(&foreign_keys);

    let indexes = pool
        .fetch_bound(
            &format!(
                "SELECT CAST(INDEX_NAME AS CHAR) AS index_name, \
                 CAST(COLUMN_NAME AS CHAR) AS column_name, \
                 CAST(NON_UNIQUE AS SIGNED) AS non_unique, \
                 CAST(INDEX_TYPE AS CHAR) AS index_kind \
                 FROM information_schema.STATISTICS \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = ? AND INDEX_NAME <> 'PRIMARY' \
                 ORDER BY INDEX_NAME, SEQ_IN_INDEX",
                schema_filter
            ),
            &params,
        )
        .await?;
    metadata.indexes = group_indexes(&indexes, |row| int(row, "non_unique") == Some(0));

    Ok(metadata)
}

async fn sqlite_metadata(
    pool: &SqlPool,
    table: &str,
    schema: Option<&str>,
) -> Result<TableMetadata> {
    let dialect = Dialect::Sqlite;
    let mut metadata = TableMetadata::new(table, schema.map(str::to_string));
    let pragma = |name: &str, arg: &str| match schema {
        Some(schema) => format!(
            "PRAGMA {}.{}({})",
            dialect.quote_ident(schema),
            name,
            dialect.quote_ident(arg)
        ),
        None => format!("PRAGMA {}({})", name, dialect.quote_ident(arg)),
    };

    let columns = pool.fetch_all(&pragma("table_info", table)).await?;
    let mut primary_keys: Vec<(i64, String)> = Vec::new();
    for row in &columns {
        let Some(name) = text(row, "name") else {
            continue;
        };
        let pk_position = int(row, "pk").unwrap_or(0);
        let not_null = int(row, "notnull").unwrap_or(0) != 0;
        let mut column = ColumnMetadata::new(
            name.clone(),
            text(row, "type").unwrap_or_default().to_uppercase(),
            !not_null && pk_position == 0,
        );
        column.default = text(row, "dflt_value");
        if pk_position > 0 {
            primary_keys.push((pk_position, name));
        }
        metadata.columns.push(column);
    }
    primary_keys.sort();
    metadata.primary_keys = primary_keys.into_iter().map(|(_, name)| name).collect();

    // a lone INTEGER PRIMARY KEY aliases the rowid
    if let [only] = metadata.primary_keys.as_slice() {
        let only = only.clone();
        if let Some(column) = metadata.columns.iter_mut().find(|c| c.name == only) {
            column.auto_increment = column.data_type == "INTEGER";
        }
    }

    let foreign_keys = pool.fetch_all(&pragma("foreign_key_list", table)).await?;
    let mut grouped: Vec<(i64, ForeignKey)> = Vec::new();
    for row in &foreign_keys {
        let id = int(row, "id").unwrap_or(0);
        let (Some(from), Some(referred_table)) = (text(row, "from"), text(row, "table")) else {
            continue;
        };
        let position = match grouped.iter().position(|(gid, _)| *gid == id) {
            Some(position) => position,
            None => {
                grouped.push((
                    id,
                    ForeignKey {
                        name: None,
                        columns: Vec::new(),
                        referred_table,
                        referred_schema: schema.map(str::to_string),
                        referred_columns: Vec::new(),
                    },
                ));
                grouped.len() - 1
            }
        };
        let fk = &mut grouped[position].1;
        fk.columns.push(from);
        if let Some(to) = text(row, "to") {
            fk.referred_columns.push(to);
        }
    }
    metadata.foreign_keys = grouped.into_iter().map(|(_, fk)| fk).collect();

    let index_list = pool.fetch_all(&pragma("index_list", table)).await?;
    for row in &index_list {
        let Some(index_name) = text(row, "name") else {
            continue;
        };
        if text(row, "origin").as_deref() == Some("pk") {
            continue;
        }
        let info = pool.fetch_all(&pragma("index_info", &index_name)).await?;
        metadata.indexes.push(IndexInfo {
            name: index_name,
            columns: info.iter().filter_map(|r| text(r, "name")).collect(),
            unique: int(row, "unique").unwrap_or(0) != 0,
            kind: None,
        });
    }

    Ok(metadata)
}

fn group_foreign_keys(rows: &[DataRow]) -> Vec<ForeignKey> {
    let mut keys: Vec<ForeignKey> = Vec::new();
    for row in rows {
        let (Some(column), Some(referred_table)) =
            (text(row, "column_name"), text(row, "referred_table"))
        else {
            continue;
        };
        let name = text(row, "constraint_name");
        let referred_column = text(row, "referred_column");

        let existing = keys.last_mut().filter(|fk| fk.name == name && name.is_some());
        match existing {
            Some(fk) => {
                fk.columns.push(column);
                fk.referred_columns.extend(referred_column);
            }
            None => keys.push(ForeignKey {
                name,
                columns: vec![column],
                referred_table,
                referred_schema: text(row, "referred_schema"),
                referred_columns: referred_column.into_iter().collect(),
            }),
        }
    }
    keys
}

fn group_indexes(rows: &[DataRow], unique: impl Fn(&DataRow) -> bool) -> Vec<IndexInfo> {
    let mut indexes: Vec<IndexInfo> = Vec::new();
    for row in rows {
        let (Some(name), Some(column)) = (text(row, "index_name"), text(row, "column_name")) else {
            continue;
        };
        match indexes.last_mut().filter(|index| index.name == name) {
            Some(index) => index.columns.push(column),
            None => indexes.push(IndexInfo {
                name,
                columns: vec![column],
                unique: unique(row),
                kind: text(row, "index_kind").map(|k| k.to_lowercase()),
            }),
        }
    }
    indexes
}

pub(crate) fn text(row: &DataRow, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub(crate) fn int(row: &DataRow, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn flag(row: &DataRow, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(b)) => *b,
        _ => int(row, key).unwrap_or(0) != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> DataRow {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_group_foreign_keys_merges_composite_constraints() {
        let rows = vec![
            row(json!({"constraint_name": "fk_line", "column_name": "order_id",
                       "referred_table": "orders", "referred_schema": "public",
                       "referred_column": "id"})),
            row(json!({"constraint_name": "fk_line", "column_name": "order_rev",
                       "referred_table": "orders", "referred_schema": "public",
                       "referred_column": "rev"})),
            row(json!({"constraint_name": "fk_product", "column_name": "product_id",
                       "referred_table": "products", "referred_schema": "public",
                       "referred_column": "id"})),
        ];

        let keys = group_foreign_keys(&rows);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].columns, vec!["order_id", "order_rev"]);
        assert_eq!(keys[0].referred_columns, vec!["id", "rev"]);
        assert_eq!(keys[1].referred_table, "products");
    }

    #[test]
    fn test_group_indexes() {
        let rows = vec![
            row(json!({"index_name": "idx_a", "column_name": "a", "non_unique": 0, "index_kind": "BTREE"})),
            row(json!({"index_name": "idx_a", "column_name": "b", "non_unique": 0, "index_kind": "BTREE"})),
            row(json!({"index_name": "idx_c", "column_name": "c", "non_unique": 1, "index_kind": "HASH"})),
        ];

        let indexes = group_indexes(&rows, |r| int(r, "non_unique") == Some(0));
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].columns, vec!["a", "b"]);
        assert!(indexes[0].unique);
        assert!(!indexes[1].unique);
        assert_eq!(indexes[1].kind.as_deref(), Some("hash"));
    }

    #[test]
    fn test_int_reads_strings_and_numbers() {
        let r = row(json!({"a": 3, "b": "4", "c": null, "d": true}));
        assert_eq!(int(&r, "a"), Some(3));
        assert_eq!(int(&r, "b"), Some(4));
        assert_eq!(int(&r, "c"), None);
        assert_eq!(int(&r, "d"), Some(1));
    }
}

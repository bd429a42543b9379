use datalink_core::{DataError, Result, StoreType};

/// SQL dialects with a bundled driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn for_store(store_type: StoreType) -> Result<Self> {
        match store_type {
            StoreType::Postgresql => Ok(Dialect::Postgres),
            StoreType::Mysql => Ok(Dialect::MySql),
            StoreType::Sqlite => Ok(Dialect::Sqlite),
            StoreType::Oracle | StoreType::Sqlserver => Err(DataError::unsupported(format!(
                "no SQL driver bundled for {}",
                store_type
            ))),
            StoreType::Mongodb => Err(DataError::unsupported(
                "mongodb is not a relational store",
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgresql",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Quoted `schema.table`, or just `table`
    pub fn table_ref(&self, table: &str, schema: Option<&str>) -> String {
        match schema {
            Some(schema) if !schema.is_empty() => {
                format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
            }
            _ => self.quote_ident(table),
        }
    }

    /// Schema assumed when none is given
    pub fn default_schema(&self) -> Option<&'static str> {
        match self {
            Dialect::Postgres => Some("public"),
            Dialect::MySql | Dialect::Sqlite => None,
        }
    }

    /// Bind placeholder for the 1-based parameter `n`
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Statement producing a plan for `query`
    pub fn explain(&self, query: &str) -> String {
        match self {
            Dialect::Postgres => format!("EXPLAIN (FORMAT JSON) {}", query),
            Dialect::MySql => format!("EXPLAIN FORMAT=JSON {}", query),
            Dialect::Sqlite => format!("EXPLAIN QUERY PLAN {}", query),
        }
    }

    /// Whether ORDER BY can be applied to a column of this declared type
    pub fn is_orderable(&self, data_type: &str) -> bool {
        let upper = data_type.to_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match self {
            Dialect::Postgres => !matches!(
                base,
                "JSON" | "XML" | "POINT" | "LINE" | "LSEG" | "BOX" | "PATH" | "POLYGON" | "CIRCLE"
            ),
            Dialect::MySql => !matches!(base, "JSON" | "GEOMETRY" | "POINT" | "POLYGON"),
            Dialect::Sqlite => true,
        }
    }
}

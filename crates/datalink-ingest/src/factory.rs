use datalink_core::{DataError, EngineSettings, Ingestor, Result, StoreType};
use datalink_mongodb::MongoIngestor;
use datalink_sql::SqlIngestor;

/// Creates an unconnected ingestor for a store type
pub trait IngestorFactory: Send + Sync {
    fn create_ingestor(&self, store_type: StoreType) -> Result<Box<dyn Ingestor>>;

    fn supported_store_types(&self) -> Vec<StoreType>;
}

/// Ingestors bundled with datalink: sqlx for relational stores, the MongoDB driver for documents
#[derive(Debug, Clone, Default)]
pub struct DefaultIngestorFactory {
    settings: EngineSettings,
}

impl DefaultIngestorFactory {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }
}

impl IngestorFactory for DefaultIngestorFactory {
    fn create_ingestor(&self, store_type: StoreType) -> Result<Box<dyn Ingestor>> {
        match store_type {
            StoreType::Postgresql | StoreType::Mysql | StoreType::Sqlite => Ok(Box::new(
                SqlIngestor::new(store_type)?.with_settings(self.settings.clone()),
            )),
            StoreType::Mongodb => Ok(Box::new(
                MongoIngestor::new().with_settings(self.settings.clone()),
            )),
            StoreType::Oracle | StoreType::Sqlserver => Err(DataError::unsupported(format!(
                "No ingestor available for store type {}",
                store_type
            ))),
        }
    }

    fn supported_store_types(&self) -> Vec<StoreType> {
        vec![
            StoreType::Postgresql,
            StoreType::Mysql,
            StoreType::Sqlite,
            StoreType::Mongodb,
        ]
    }
}

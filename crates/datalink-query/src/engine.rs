use crate::validation::validate_for;
use datalink_core::{
    ConnectionConfig, ExecuteOptions, GeneratedQuery, QueryExecutionResult, QueryExecutor,
    QueryGenerator, QueryValidation, Result, StoreType,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Generator, validator and executor for one store type
pub struct QueryEngine {
    store_type: StoreType,
    generator: Option<Arc<dyn QueryGenerator>>,
    fallback: Arc<dyn QueryGenerator>,
    executor: Arc<dyn QueryExecutor>,
}

impl QueryEngine {
    pub fn new(
        store_type: StoreType,
        generator: Option<Arc<dyn QueryGenerator>>,
        fallback: Arc<dyn QueryGenerator>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            store_type,
            generator,
            fallback,
            executor,
        }
    }

    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    pub fn has_external_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Translate a natural-language request.
    ///
    /// Uses the external generator when configured and degrades to the deterministic fallback
    /// when it is absent or fails.
    pub async fn generate(
        &self,
        natural_language_query: &str,
        schema_context: &Value,
        additional_context: Option<&Value>,
    ) -> Result<GeneratedQuery> {
        let Some(generator) = &self.generator else {
            return self
                .fallback
                .generate_query(natural_language_query, schema_context, additional_context)
                .await;
        };

        match generator
            .generate_query(natural_language_query, schema_context, additional_context)
            .await
        {
            Ok(generated) => Ok(generated),
            Err(e) => {
                warn!("Query generator failed, using fallback: {}", e);
                let mut generated = self
                    .fallback
                    .generate_query(natural_language_query, schema_context, additional_context)
                    .await?;
                generated
                    .warnings
                    .push(format!("External generator failed: {}", e));
                Ok(generated)
            }
        }
    }

    /// The external generator's own checks, then the built-in safety checks.
    ///
    /// The query is valid only when both accept it; findings are merged without duplicates.
    pub fn validate(&self, query: &str, schema_context: &Value) -> QueryValidation {
        let builtin = validate_for(self.store_type.family(), query, schema_context);
        let Some(generator) = &self.generator else {
            return builtin;
        };

        let external = generator.validate_query(query, schema_context);
        let mut errors = external.errors;
        if !external.valid && errors.is_empty() {
            errors.push("Query rejected by generator".to_string());
        }
        let mut warnings = external.warnings;
        for error in builtin.errors {
            if !errors.contains(&error) {
                errors.push(error);
            }
        }
        for warning in builtin.warnings {
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }
        QueryValidation::from_findings(errors, warnings)
    }

    /// Describe a query with whichever generator is active
    pub async fn explain(&self, query: &str) -> String {
        match &self.generator {
            Some(generator) => generator.explain_query(query).await,
            None => self.fallback.explain_query(query).await,
        }
    }

    /// Validate, then execute. A query that fails validation never reaches the store.
    pub async fn run(
        &self,
        query: &str,
        config: &ConnectionConfig,
        schema_context: &Value,
        options: ExecuteOptions,
    ) -> QueryExecutionResult {
        let validation = self.validate(query, schema_context);
        if !validation.valid {
            debug!("Rejected query: {}", validation.errors.join("; "));
            return QueryExecutionResult::failed(
                query,
                format!("Query validation failed: {}", validation.errors.join("; ")),
                0,
            );
        }

        let result = self.executor.execute_query(query, config, options).await;
        if validation.warnings.is_empty() {
            result
        } else {
            result.with_metadata("validation_warnings", validation.warnings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::{FallbackSqlGenerator, FALLBACK_WARNING};
    use async_trait::async_trait;
    use datalink_core::{
        DataError, QueryLanguage, QueryStatus, RowStream, StoreFamily,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts executions so tests can assert the store was never touched
    #[derive(Default)]
    struct CountingExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryExecutor for CountingExecutor {
        fn store_family(&self) -> StoreFamily {
            StoreFamily::Relational
        }

        async fn execute_query(
            &self,
            query: &str,
            _config: &ConnectionConfig,
            _options: ExecuteOptions,
        ) -> QueryExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            QueryExecutionResult::completed(query, Vec::new(), Vec::new(), 1)
        }

        async fn execute_query_streaming(
            &self,
            _query: &str,
            _config: &ConnectionConfig,
            _batch_size: usize,
        ) -> Result<RowStream> {
            Err(DataError::unsupported("streaming"))
        }

        async fn explain_execution_plan(&self, _query: &str, _config: &ConnectionConfig) -> Value {
            json!({})
        }

        async fn test_connection(&self, _config: &ConnectionConfig) -> bool {
            true
        }

        async fn close_connection(&self) {}
    }

    struct BrokenGenerator;

    #[async_trait]
    impl QueryGenerator for BrokenGenerator {
        fn query_language(&self) -> QueryLanguage {
            QueryLanguage::Sql
        }

        async fn generate_query(
            &self,
            _natural_language_query: &str,
            _schema_context: &Value,
            _additional_context: Option<&Value>,
        ) -> Result<GeneratedQuery> {
            Err(DataError::Internal("model offline".to_string()))
        }

        fn validate_query(&self, query: &str, _schema_context: &Value) -> QueryValidation {
            if query.contains("ghost") {
                QueryValidation::from_findings(
                    vec!["Unknown column: ghost".to_string()],
                    vec!["Prefer explicit columns".to_string()],
                )
            } else {
                QueryValidation::from_findings(Vec::new(), Vec::new())
            }
        }

        async fn explain_query(&self, _query: &str) -> String {
            "external".to_string()
        }
    }

    fn engine(generator: Option<Arc<dyn QueryGenerator>>) -> (QueryEngine, Arc<CountingExecutor>) {
        let executor = Arc::new(CountingExecutor::default());
        let engine = QueryEngine::new(
            StoreType::Sqlite,
            generator,
            Arc::new(FallbackSqlGenerator::new(StoreType::Sqlite)),
            executor.clone(),
        );
        (engine, executor)
    }

    #[tokio::test]
    async fn test_failing_generator_degrades_to_fallback() {
        let (engine, _) = engine(Some(Arc::new(BrokenGenerator)));
        let generated = engine
            .generate("how many users", &json!({"tables": [{"name": "users"}]}), None)
            .await
            .unwrap();
        assert_eq!(generated.query, "SELECT COUNT(*) as count FROM users");
        assert_eq!(generated.warnings[0], FALLBACK_WARNING);
        assert!(generated.warnings[1].contains("model offline"));
        assert_eq!(engine.explain("SELECT 1").await, "external");
    }

    #[tokio::test]
    async fn test_external_validation_is_combined_with_safety_checks() {
        let (engine, executor) = engine(Some(Arc::new(BrokenGenerator)));
        let context = json!({"tables": [{"name": "users"}]});

        let rejected = engine.validate("SELECT ghost FROM users", &context);
        assert!(!rejected.valid);
        assert_eq!(rejected.errors, vec!["Unknown column: ghost"]);
        assert_eq!(rejected.warnings, vec!["Prefer explicit columns"]);

        // the generator accepts it, the built-in check does not
        let dangerous = engine.validate("DROP TABLE users", &context);
        assert!(!dangerous.valid);
        assert!(dangerous.errors[0].contains("dangerous operation: DROP"));

        assert!(engine.validate("SELECT id FROM users", &context).valid);

        let config = ConnectionConfig::new(StoreType::Sqlite, ":memory:");
        let result = engine
            .run("SELECT ghost FROM users", &config, &context, ExecuteOptions::default())
            .await;
        assert_eq!(result.status, QueryStatus::Failed);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_query_never_reaches_executor() {
        let (engine, executor) = engine(None);
        let config = ConnectionConfig::new(StoreType::Sqlite, ":memory:");

        let result = engine
            .run("DROP TABLE users", &config, &json!({}), ExecuteOptions::default())
            .await;
        assert_eq!(result.status, QueryStatus::Failed);
        assert!(result
            .error_message
            .unwrap()
            .contains("Query contains dangerous operation: DROP"));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);

        let result = engine
            .run("SELECT 1", &config, &json!({"tables": [{"name": "users"}]}), ExecuteOptions::default())
            .await;
        assert_eq!(result.status, QueryStatus::Completed);
        assert!(result.metadata.contains_key("validation_warnings"));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }
}

//! End-to-end pipeline behavior with in-memory generator and store fakes.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering}
    },
    time::Duration
};

use async_trait::async_trait;
use serde_json::json;
use sql_query_gate::{
    error::{ErrorCategory, GeneratorError, QueryError},
    executor::{QueryStore, ResultRow, ResultSet},
    fallback::{BUILTIN_TEMPLATES, FallbackMatcher},
    gate::QuerySource,
    llm::SqlGenerator,
    pipeline::Pipeline,
    policy::{RowCap, SecurityPolicy, TableAllowlist}
};

enum Reply {
    Sql(&'static str),
    Fail(GeneratorError),
    Hang
}

struct FakeGenerator {
    reply: Reply,
    calls: AtomicUsize
}

impl FakeGenerator {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0)
        })
    }
}

#[async_trait]
impl SqlGenerator for FakeGenerator {
    async fn generate(&self, _question: &str) -> Result<String, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Sql(sql) => Ok(sql.to_string()),
            Reply::Fail(err) => Err(err.clone()),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("SELECT 1".to_string())
            }
        }
    }
}

enum Outcome {
    Rows(usize),
    Fail(&'static str),
    Panic
}

struct FakeStore {
    outcome: Outcome,
    seen:    Mutex<Vec<String>>
}

impl FakeStore {
    fn new(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            seen: Mutex::new(Vec::new())
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryStore for FakeStore {
    async fn fetch(&self, sql: &str, _max_rows: RowCap) -> Result<ResultSet, QueryError> {
        self.seen.lock().unwrap().push(sql.to_string());
        match self.outcome {
            Outcome::Rows(count) => {
                let rows: Vec<ResultRow> = (0..count)
                    .map(|i| {
                        let mut row = ResultRow::new();
                        row.insert("id".into(), json!(i));
                        row.insert("issue_date".into(), json!("2024-03-09"));
                        row
                    })
                    .collect();
                Ok(ResultSet {
                    columns: vec!["id".into(), "issue_date".into()],
                    rows,
                    truncated: false
                })
            }
            Outcome::Fail(message) => Err(QueryError::Execution(message.to_string())),
            Outcome::Panic => panic!("store blew up")
        }
    }
}

fn policy(cap: u32) -> SecurityPolicy {
    SecurityPolicy {
        allowlist:    TableAllowlist::new(["invoices", "vendors"]),
        row_cap:      RowCap::new(cap).unwrap(),
        strict_parse: false
    }
}

fn pipeline(generator: Arc<FakeGenerator>, store: Arc<FakeStore>) -> Pipeline {
    Pipeline::new(generator, store, &policy(100))
}

#[tokio::test]
async fn test_generated_select_runs_with_row_limit() {
    let store = FakeStore::new(Outcome::Rows(2));
    let pipeline = pipeline(FakeGenerator::new(Reply::Sql("SELECT * FROM invoices")), store.clone());

    let response = pipeline.run("show all invoices").await.unwrap();

    assert_eq!(response.sql, "SELECT * FROM invoices LIMIT 100");
    assert_eq!(response.source, QuerySource::Generated);
    assert_eq!(response.columns, ["id", "issue_date"]);
    assert_eq!(response.rows.len(), 2);
    assert_eq!(response.rows[0]["issue_date"], "2024-03-09");
    assert_eq!(store.seen(), ["SELECT * FROM invoices LIMIT 100"]);
}

#[tokio::test]
async fn test_disallowed_table_is_validation_error_and_never_executes() {
    let store = FakeStore::new(Outcome::Rows(1));
    let pipeline = pipeline(FakeGenerator::new(Reply::Sql("SELECT * FROM users")), store.clone());

    let err = pipeline.run("list users").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(err.client_message().contains("users"));
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn test_stacked_statement_rejected() {
    let store = FakeStore::new(Outcome::Rows(1));
    let generator = FakeGenerator::new(Reply::Sql("SELECT 1; DROP TABLE invoices"));
    let err = pipeline(generator, store.clone()).run("anything").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(err.client_message().contains("Semicolons"));
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn test_delete_rejected() {
    let store = FakeStore::new(Outcome::Rows(1));
    let generator = FakeGenerator::new(Reply::Sql("DELETE FROM invoices"));
    let err = pipeline(generator, store.clone()).run("remove invoices").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(err.client_message().contains("Only SELECT"));
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn test_generation_timeout_falls_back_to_template() {
    let store = FakeStore::new(Outcome::Rows(3));
    let pipeline = pipeline(FakeGenerator::new(Reply::Hang), store.clone())
        .with_generation_timeout(Duration::from_millis(50));

    let response = pipeline.run("top vendors by spend").await.unwrap();

    let template = BUILTIN_TEMPLATES
        .iter()
        .find(|t| t.name == "top vendors by spend")
        .unwrap();
    assert_eq!(response.source, QuerySource::Fallback);
    assert_eq!(response.sql, template.sql);
    assert_eq!(store.seen(), [template.sql]);
}

#[tokio::test]
async fn test_generation_failure_without_fallback_is_upstream() {
    let store = FakeStore::new(Outcome::Rows(1));
    let generator = FakeGenerator::new(Reply::Fail(GeneratorError::Status {
        status: 503,
        body:   "overloaded".into()
    }));
    let pipeline = pipeline(generator, store.clone()).with_fallback(None);

    let err = pipeline.run("top vendors by spend").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Upstream);
    assert!(err.client_message().contains("503"));
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn test_generation_timeout_without_match_is_upstream() {
    let store = FakeStore::new(Outcome::Rows(1));
    let pipeline = pipeline(FakeGenerator::new(Reply::Hang), store.clone())
        .with_generation_timeout(Duration::from_millis(20));

    let err = pipeline.run("what is the meaning of life").await.unwrap_err();

    assert_eq!(err, QueryError::Upstream(GeneratorError::Timeout(0).to_string()));
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn test_missing_credential_without_match_is_validation() {
    let store = FakeStore::new(Outcome::Rows(1));
    let generator = FakeGenerator::new(Reply::Fail(GeneratorError::MissingCredential("OpenAI")));

    let err = pipeline(generator, store.clone())
        .run("how many invoices per month")
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(err.client_message().contains("API key"));
}

#[tokio::test]
async fn test_missing_credential_with_match_uses_fallback() {
    let store = FakeStore::new(Outcome::Rows(1));
    let generator = FakeGenerator::new(Reply::Fail(GeneratorError::MissingCredential("OpenAI")));

    let response = pipeline(generator, store)
        .run("which invoices are overdue?")
        .await
        .unwrap();

    assert_eq!(response.source, QuerySource::Fallback);
    assert!(response.sql.contains("CURRENT_DATE"));
}

#[tokio::test]
async fn test_fallback_sql_still_goes_through_gate() {
    let store = FakeStore::new(Outcome::Rows(1));
    let generator = FakeGenerator::new(Reply::Fail(GeneratorError::EmptyResponse));
    let narrow = SecurityPolicy {
        allowlist: TableAllowlist::new(["invoices"]),
        ..policy(100)
    };
    let pipeline = Pipeline::new(generator, store.clone(), &narrow);

    let err = pipeline.run("top vendors by spend").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(err.client_message().contains("vendors"));
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn test_rejected_generation_does_not_fall_back() {
    let store = FakeStore::new(Outcome::Rows(1));
    let generator = FakeGenerator::new(Reply::Sql("DROP TABLE vendors"));

    let err = pipeline(generator, store.clone())
        .run("top vendors by spend")
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn test_custom_fallback_templates() {
    let store = FakeStore::new(Outcome::Rows(1));
    let generator = FakeGenerator::new(Reply::Fail(GeneratorError::Disabled));
    let custom = FallbackMatcher::with_templates(vec![BUILTIN_TEMPLATES[0]]);
    let pipeline = pipeline(generator, store).with_fallback(Some(custom));

    assert!(pipeline.run("top vendors").await.is_ok());
    assert!(pipeline.run("overdue invoices").await.is_err());
}

#[tokio::test]
async fn test_blank_question_rejected_before_generation() {
    let generator = FakeGenerator::new(Reply::Sql("SELECT * FROM invoices"));
    let store = FakeStore::new(Outcome::Rows(1));
    let pipeline = pipeline(generator.clone(), store.clone());

    for question in ["", "   ", "\n\t"] {
        let err = pipeline.run(question).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(store.seen().is_empty());
}

#[tokio::test]
async fn test_store_failure_is_execution_error() {
    let store = FakeStore::new(Outcome::Fail("relation \"invoices\" does not exist"));
    let generator = FakeGenerator::new(Reply::Sql("SELECT * FROM invoices"));

    let err = pipeline(generator, store).run("all invoices").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Execution);
    assert_eq!(err.client_message(), "relation \"invoices\" does not exist");
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_store_panic_is_opaque_internal_error() {
    let store = FakeStore::new(Outcome::Panic);
    let generator = FakeGenerator::new(Reply::Sql("SELECT * FROM invoices"));

    let err = pipeline(generator, store).run("all invoices").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Internal);
    assert_eq!(err.client_message(), "internal error");
}

#[tokio::test]
async fn test_oversized_result_is_truncated_to_cap() {
    let store = FakeStore::new(Outcome::Rows(12));
    let generator = FakeGenerator::new(Reply::Sql("SELECT * FROM invoices LIMIT 500"));
    let pipeline = Pipeline::new(generator, store.clone(), &policy(10));

    let response = pipeline.run("invoices").await.unwrap();

    assert_eq!(response.rows.len(), 10);
    assert!(response.truncated);
    assert_eq!(response.sql, "SELECT * FROM invoices LIMIT 500");
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let store = FakeStore::new(Outcome::Rows(0));
    let generator = FakeGenerator::new(Reply::Sql("SELECT * FROM invoices WHERE total < 0"));

    let response = pipeline(generator, store).run("negative invoices").await.unwrap();

    assert!(response.rows.is_empty());
    assert_eq!(response.columns, ["id", "issue_date"]);
    assert!(!response.truncated);
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let store = FakeStore::new(Outcome::Rows(1));
    let generator = FakeGenerator::new(Reply::Sql("SELECT * FROM vendors"));
    let pipeline = Arc::new(pipeline(generator.clone(), store.clone()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run(&format!("vendors {}", i)).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(generator.calls.load(Ordering::SeqCst), 8);
    assert_eq!(store.seen().len(), 8);
}

//! The "convert and run" request pipeline.
//!
//! ```text
//! question ──▶ generator ──(failed)──▶ fallback matcher
//!                 │                         │
//!                 └──────── candidate ◀─────┘
//!                              │
//!                         security gate ──(rejected)──▶ validation error
//!                              │
//!                           executor ──(failed)──▶ execution error
//!                              │
//!                        QueryResponse
//! ```
//!
//! Each step starts only after the previous one finished. A request either
//! gets a full response or exactly one [`QueryError`]; partial rows are never
//! returned.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use crate::{
    error::{GeneratorError, QueryError},
    executor::{QueryExecutor, QueryStore, ResultRow},
    fallback::FallbackMatcher,
    gate::{CandidateQuery, QuerySource, SecurityGate, Verdict},
    llm::SqlGenerator,
    policy::SecurityPolicy
};

/// Default upper bound on one generation call
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// The SQL that actually ran, row limit included
    pub sql:       String,
    pub source:    QuerySource,
    pub columns:   Vec<String>,
    pub rows:      Vec<ResultRow>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool
}

/// Generator, fallback, gate and executor wired together.
pub struct Pipeline {
    generator:          Arc<dyn SqlGenerator>,
    fallback:           Option<FallbackMatcher>,
    gate:               SecurityGate,
    executor:           QueryExecutor,
    generation_timeout: Duration
}

impl Pipeline {
    /// Pipeline with the built-in fallback templates and the default
    /// generation timeout.
    pub fn new(
        generator: Arc<dyn SqlGenerator>,
        store: Arc<dyn QueryStore>,
        policy: &SecurityPolicy
    ) -> Self {
        Self {
            generator,
            fallback: Some(FallbackMatcher::builtin()),
            gate: policy.gate(),
            executor: QueryExecutor::new(store, policy.row_cap),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT
        }
    }

    /// Replace or disable (`None`) the fallback matcher
    pub fn with_fallback(mut self, fallback: Option<FallbackMatcher>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_generation_timeout(mut self, generation_timeout: Duration) -> Self {
        self.generation_timeout = generation_timeout;
        self
    }

    pub fn gate(&self) -> &SecurityGate {
        &self.gate
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback.is_some()
    }

    /// Answer one natural-language question.
    #[instrument(skip_all, fields(question_len = question.len()))]
    pub async fn run(&self, question: &str) -> Result<QueryResponse, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::Validation(String::from("question must not be empty")));
        }

        let candidate = self.candidate(question).await?;

        let vetted = match self.gate.vet_candidate(&candidate) {
            Verdict::Accepted(vetted) => vetted,
            Verdict::Rejected(rejection) => {
                warn!(
                    check = rejection.check().id(),
                    source = %candidate.source(),
                    reason = %rejection,
                    "query rejected by security gate"
                );
                return Err(QueryError::Validation(rejection.to_string()));
            }
        };

        let executor = self.executor.clone();
        let task_query = vetted.clone();
        let executed = tokio::spawn(async move { executor.execute(&task_query).await })
            .await
            .map_err(|e| {
                error!(error = %e, "execution task did not complete");
                QueryError::Internal(format!("execution task did not complete: {}", e))
            })??;

        info!(
            source = %vetted.source(),
            rows = executed.result.rows.len(),
            truncated = executed.result.truncated,
            "query answered"
        );
        Ok(QueryResponse {
            sql:       executed.sql,
            source:    vetted.source(),
            columns:   executed.result.columns,
            rows:      executed.result.rows,
            truncated: executed.result.truncated
        })
    }

    /// Generated SQL, or a fallback template if generation failed and one
    /// matches. Otherwise the generator's own failure.
    async fn candidate(&self, question: &str) -> Result<CandidateQuery, QueryError> {
        let generated = timeout(self.generation_timeout, self.generator.generate(question))
            .await
            .unwrap_or(Err(GeneratorError::Timeout(self.generation_timeout.as_secs())));

        let failure = match generated {
            Ok(sql) => return Ok(CandidateQuery::generated(sql)),
            Err(failure) => failure
        };
        warn!(error = %failure, "SQL generation failed");

        match self.fallback.as_ref().and_then(|m| m.find(question)) {
            Some(template) => {
                info!(template = template.name, "answering from fallback template");
                Ok(CandidateQuery::fallback(template.sql))
            }
            None => Err(failure.into_query_error())
        }
    }
}

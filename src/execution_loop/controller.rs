//! Retry Controller
//!
//! Bounded self-correction loop: generate once, then execute / diagnose /
//! repair until a candidate succeeds, the diagnoser flags a non-SQL request,
//! or the repair budget is spent. Every outcome lands in the returned
//! [`RunRecord`]; nothing is thrown to the caller.

use crate::agents::{Diagnosis, ErrorDiagnoser, QueryGenerator, QueryRepairer};
use crate::config::PipelineConfig;
use crate::execution::{ExecutionError, QuerySession, SessionProvider};
use crate::execution_loop::error_classifier::ErrorClassifier;
use crate::execution_loop::record::{
    Attempt, AttemptOutcome, CandidateOrigin, FailureStage, RunOutcome, RunRecord,
};
use crate::llm::ReasoningBackend;
use crate::normalize::normalize_sql;
use crate::schema::SchemaContext;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

pub struct RetryController {
    generator: QueryGenerator,
    diagnoser: ErrorDiagnoser,
    repairer: QueryRepairer,
    sessions: Arc<dyn SessionProvider>,
    schema: SchemaContext,
    config: PipelineConfig,
    classifier: ErrorClassifier,
}

impl RetryController {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        sessions: Arc<dyn SessionProvider>,
        schema: SchemaContext,
        config: PipelineConfig,
    ) -> Self {
        let rate_limit = config.rate_limit.clone();
        Self {
            generator: QueryGenerator::new(Arc::clone(&backend), rate_limit.clone()),
            diagnoser: ErrorDiagnoser::new(Arc::clone(&backend), rate_limit.clone()),
            repairer: QueryRepairer::new(backend, rate_limit),
            sessions,
            schema,
            config,
            classifier: ErrorClassifier::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaContext {
        &self.schema
    }

    /// Run the full loop for one request
    pub async fn submit_query(&self, user_query: &str) -> RunRecord {
        let mut record = RunRecord::new(user_query, self.config.dialect.clone());
        let run_id = record.run_id;
        let span = info_span!("run", %run_id);

        info!(%run_id, max_retry = self.config.max_retry, dialect = %self.config.dialect, "Starting run");

        let drive = self.drive(&mut record).instrument(span);
        let outcome = match self.config.run_timeout {
            Some(limit) => match tokio::time::timeout(limit, drive).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(%run_id, timeout_ms = limit.as_millis() as u64, "Run deadline expired");
                    RunOutcome::Failed {
                        stage: FailureStage::Deadline,
                        message: format!("Run exceeded its {:?} deadline", limit),
                    }
                }
            },
            None => drive.await,
        };

        record.finish(outcome);
        info!(
            %run_id,
            candidates = record.attempts.len(),
            outcome = %record.outcome,
            "Run finished"
        );
        record
    }

    async fn drive(&self, record: &mut RunRecord) -> RunOutcome {
        // Released on every return path, including deadline cancellation
        let mut session: Box<dyn QuerySession> = match self.sessions.open_session().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Could not open a session");
                return RunOutcome::Failed {
                    stage: FailureStage::Session,
                    message: e.to_string(),
                };
            }
        };

        let reply = match self
            .generator
            .generate(&record.user_query, &self.schema, &self.config.dialect)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "Generation failed");
                return RunOutcome::Failed {
                    stage: FailureStage::Generation,
                    message: e.to_string(),
                };
            }
        };

        let mut candidate = normalize_sql(&reply.output);
        record.responses.push(reply);

        let mut origin = CandidateOrigin::Generated;
        let mut repairs_used: u32 = 0;
        let mut last_diagnosis: Option<String> = None;

        loop {
            let index = record.attempts.len() as u32;
            let slot = record.attempts.len();
            info!(attempt = index, ?origin, sql = %candidate, "Executing candidate");

            // Recorded before execution so a deadline never loses a candidate
            record.attempts.push(Attempt {
                index,
                origin,
                sql: candidate.clone(),
                outcome: AttemptOutcome::Interrupted,
                error: None,
                error_class: None,
                result: None,
                diagnosis: None,
                elapsed_ms: 0,
            });

            let started = Instant::now();
            let executed = session.execute(&candidate).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let (result, failure) = match executed {
                Ok(table) if table.is_empty() && self.config.empty_result_is_failure => {
                    (Some(table), Some(ExecutionError::EmptyResult))
                }
                Ok(table) => (Some(table), None),
                Err(e) => (None, Some(e)),
            };

            let attempt = &mut record.attempts[slot];
            attempt.result = result;
            attempt.elapsed_ms = elapsed_ms;

            let failure = match failure {
                None => {
                    attempt.outcome = AttemptOutcome::Success;
                    info!(attempt = index, elapsed_ms, "✅ Candidate succeeded");
                    return RunOutcome::Success { attempt: index };
                }
                Some(failure) => failure,
            };

            let class = self.classifier.classify(&failure);
            let message = failure.to_string();
            warn!(attempt = index, error_class = %class, error = %message, "Candidate failed");

            attempt.outcome = match failure {
                ExecutionError::EmptyResult => AttemptOutcome::EmptyResult,
                _ => AttemptOutcome::ExecutionError,
            };
            attempt.error = Some(message.clone());
            attempt.error_class = Some(class.clone());

            if repairs_used >= self.config.max_retry {
                warn!(attempt = index, repairs_used, "Retry budget exhausted");
                return RunOutcome::Exhausted {
                    last_error: Some(message),
                    last_diagnosis,
                };
            }

            let hint = class.to_string();
            let diagnosis = match self
                .diagnoser
                .diagnose(&message, &candidate, &record.user_query, &self.schema, Some(&hint))
                .await
            {
                Ok(diagnosis) => diagnosis,
                Err(e) => {
                    error!(attempt = index, error = %e, "Diagnosis failed");
                    return RunOutcome::Failed {
                        stage: FailureStage::Diagnosis,
                        message: e.to_string(),
                    };
                }
            };

            let attempt = &mut record.attempts[slot];
            attempt.diagnosis = Some(diagnosis.plan().text().to_string());

            let plan = match diagnosis {
                Diagnosis::NonSqlIntent(_) => {
                    attempt.outcome = AttemptOutcome::NonSqlIntent;
                    info!(attempt = index, "Request is not a data query, aborting");
                    return RunOutcome::Aborted { attempt: index };
                }
                Diagnosis::Recoverable(plan) => plan,
            };

            last_diagnosis = Some(plan.text().to_string());
            repairs_used += 1;
            info!(attempt = index, repairs_used, "Repairing candidate");

            let reply = match self.repairer.repair(&plan).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!(attempt = index, error = %e, "Repair failed");
                    return RunOutcome::Failed {
                        stage: FailureStage::Repair,
                        message: e.to_string(),
                    };
                }
            };

            candidate = normalize_sql(&reply.output);
            record.responses.push(reply);
            origin = CandidateOrigin::Repaired;
        }
    }
}

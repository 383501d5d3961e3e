mod common;

use common::*;
use querysmith::execution::ExecutionError;
use querysmith::execution_loop::{
    AttemptOutcome, CandidateOrigin, FailureStage, RetryController, RunOutcome, SqlErrorClass,
};
use querysmith::llm::{AgentRole, LlmError};
use querysmith::schema::SchemaContext;
use querysmith::{PipelineConfig, PipelineError};
use std::sync::Arc;
use std::time::Duration;

const UNITS_SQL: &str = "SELECT e.full_name, SUM(s.units_sold) AS total_units FROM employee e JOIN sales s ON e.employee_id = s.employee_id GROUP BY e.full_name";

fn controller(backend: &Arc<ScriptedBackend>, db: &Arc<FakeDatabase>, config: PipelineConfig) -> RetryController {
    RetryController::new(backend.clone(), db.clone(), SchemaContext::demo(), config)
}

#[tokio::test]
async fn test_immediate_success() {
    let backend = Arc::new(ScriptedBackend::new().reply(AgentRole::Generate, sql_reply(UNITS_SQL)));
    let db = Arc::new(FakeDatabase::new().with(UNITS_SQL, Ok(units_by_employee())));

    let record = controller(&backend, &db, pipeline(3))
        .submit_query("Total units sold per employee")
        .await;

    assert_eq!(record.outcome, RunOutcome::Success { attempt: 0 });
    assert_eq!(record.sql_candidates(), vec![UNITS_SQL]);
    assert!(record.diagnoses().is_empty());
    assert_eq!(record.result_tables(), vec![&units_by_employee()]);
    assert_eq!(record.responses.len(), 1);
    assert!(record.finished_at.is_some());

    let (sql, table) = record.answer().unwrap();
    assert_eq!(sql, UNITS_SQL);
    assert_eq!(table.row_count(), 2);

    assert_eq!(backend.calls(AgentRole::Diagnose), 0);
    assert_eq!(backend.calls(AgentRole::Repair), 0);
    assert_eq!(db.opened(), 1);
    assert_eq!(db.released(), 1);
}

#[tokio::test]
async fn test_missing_column_repaired() {
    let bad = "SELECT full_name, age FROM employee";
    let fixed = "SELECT full_name, department FROM employee";
    let plan = "Error diagnosis: missing column. Root cause: `age` does not exist on `employee`. Fix: 1. select `department` instead of `age`. Verification: the query returns one row per employee.";

    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(AgentRole::Generate, sql_reply(&format!("```sql\n{}\n```", bad)))
            .reply(AgentRole::Diagnose, plan_reply(plan))
            .reply(
                AgentRole::Repair,
                repair_reply("Replace age with department", &format!("```sql\n{}\n```", fixed)),
            ),
    );
    let db = Arc::new(
        FakeDatabase::new()
            .with(bad, Err(ExecutionError::Engine("Unknown column 'age' in 'field list'".to_string())))
            .with(fixed, Ok(units_by_employee())),
    );

    let record = controller(&backend, &db, pipeline(3))
        .submit_query("List employees with their age")
        .await;

    assert_eq!(record.outcome, RunOutcome::Success { attempt: 1 });
    assert_eq!(record.sql_candidates(), vec![bad, fixed]);
    assert_eq!(record.diagnoses(), vec![plan]);
    assert_eq!(db.executed(), vec![bad.to_string(), fixed.to_string()]);

    let first = &record.attempts[0];
    assert_eq!(first.outcome, AttemptOutcome::ExecutionError);
    assert_eq!(first.error_class, Some(SqlErrorClass::ColumnNotFound(Some("age".to_string()))));
    assert!(first.result.is_none());

    let last = record.attempts.last().unwrap();
    assert_eq!(last.origin, CandidateOrigin::Repaired);
    assert_eq!(last.sql, fixed);
    assert!(!last.result.as_ref().unwrap().is_empty());

    assert_eq!(record.responses.len(), 2);
    assert_eq!(
        record.responses[1].reasoning.as_deref(),
        Some("Replace age with department")
    );

    // diagnoser sees the raw error and the classification hint
    let diagnose = &backend.requests(AgentRole::Diagnose)[0];
    let prompt = &diagnose.messages[1].content;
    assert!(prompt.contains("Unknown column 'age'"));
    assert!(prompt.contains("classified as: missing or incorrect column `age`"));
    assert!(prompt.contains(bad));

    // repairer sees only the fix plan
    let repair = &backend.requests(AgentRole::Repair)[0];
    assert!(repair.messages[1].content.contains(plan));
    assert!(!repair.messages[1].content.contains(bad));
    assert!(!repair.messages[1].content.contains("Unknown column"));
}

#[tokio::test]
async fn test_non_sql_request_aborts_without_repair() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(AgentRole::Generate, "```sql\n```")
            .reply(AgentRole::Diagnose, plan_reply("NOT ASKING FOR SQL")),
    );
    let db = Arc::new(FakeDatabase::new());

    let record = controller(&backend, &db, pipeline(3))
        .submit_query("Hello, how are you?")
        .await;

    assert_eq!(record.outcome, RunOutcome::Aborted { attempt: 0 });
    assert_eq!(record.attempts.len(), 1);
    assert_eq!(record.attempts[0].sql, "");
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::NonSqlIntent);
    assert_eq!(record.attempts[0].error_class, Some(SqlErrorClass::EmptyStatement));
    assert_eq!(backend.calls(AgentRole::Repair), 0);
    assert!(db.executed().is_empty());
    assert!(matches!(record.answer(), Err(PipelineError::NoAnswer(_))));
}

#[tokio::test]
async fn test_non_sql_verdict_after_a_repair() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(AgentRole::Generate, sql_reply("SELECT * FROM t0"))
            .reply(AgentRole::Diagnose, plan_reply("Table `t0` does not exist; use `t1`."))
            .reply(AgentRole::Repair, repair_reply("rename the table", "SELECT * FROM t1"))
            .reply(AgentRole::Diagnose, plan_reply("NOT ASKING FOR SQL")),
    );
    let db = Arc::new(FakeDatabase::new());

    let record = controller(&backend, &db, pipeline(3)).submit_query("thanks!").await;

    assert_eq!(record.outcome, RunOutcome::Aborted { attempt: 1 });
    assert_eq!(record.sql_candidates(), vec!["SELECT * FROM t0", "SELECT * FROM t1"]);
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::ExecutionError);
    assert_eq!(record.attempts[1].outcome, AttemptOutcome::NonSqlIntent);
    assert_eq!(record.attempts[1].origin, CandidateOrigin::Repaired);
    assert_eq!(backend.calls(AgentRole::Diagnose), 2);
    assert_eq!(backend.calls(AgentRole::Repair), 1);
}

#[tokio::test]
async fn test_empty_generated_sql_is_a_generation_failure() {
    let backend = Arc::new(ScriptedBackend::new().reply(AgentRole::Generate, sql_reply("")));
    let db = Arc::new(FakeDatabase::new());

    let record = controller(&backend, &db, pipeline(3)).submit_query("Hello").await;

    assert!(matches!(record.outcome, RunOutcome::Failed { stage: FailureStage::Generation, .. }));
    assert!(record.attempts.is_empty());
    assert_eq!(backend.calls(AgentRole::Diagnose), 0);
    assert!(db.executed().is_empty());
    assert_eq!(db.released(), 1);
}

#[tokio::test]
async fn test_non_sql_request_with_empty_result() {
    let greeting = "SELECT 'Hello!' AS greeting FROM employee WHERE 1 = 0";
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(AgentRole::Generate, sql_reply(greeting))
            .reply(
                AgentRole::Diagnose,
                plan_reply("Error diagnosis: the user greeted us. NOT ASKING FOR SQL"),
            ),
    );
    let db = Arc::new(FakeDatabase::new().with(greeting, Ok(empty_table())));

    let record = controller(&backend, &db, pipeline(3)).submit_query("Hi!").await;

    assert_eq!(record.outcome, RunOutcome::Aborted { attempt: 0 });
    let attempt = &record.attempts[0];
    assert_eq!(attempt.outcome, AttemptOutcome::NonSqlIntent);
    assert_eq!(attempt.error.as_deref(), Some("Query returned an empty result set."));
    assert_eq!(record.result_tables().len(), 1);
    assert_eq!(backend.calls(AgentRole::Repair), 0);
}

#[tokio::test]
async fn test_budget_exhausted() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(AgentRole::Generate, sql_reply("SELECT * FROM product_sales"))
            .reply(AgentRole::Diagnose, plan_reply("Table product_sales does not exist; try productsales"))
            .reply(AgentRole::Repair, sql_reply("SELECT * FROM productsales"))
            .reply(AgentRole::Diagnose, plan_reply("Table productsales does not exist; try prod_sales"))
            .reply(AgentRole::Repair, sql_reply("SELECT * FROM prod_sales")),
    );
    let db = Arc::new(FakeDatabase::new());

    let record = controller(&backend, &db, pipeline(2))
        .submit_query("Show product sales")
        .await;

    assert_eq!(
        record.outcome,
        RunOutcome::Exhausted {
            last_error: Some("no such table: prod_sales".to_string()),
            last_diagnosis: Some("Table productsales does not exist; try prod_sales".to_string()),
        }
    );
    assert_eq!(record.sql_candidates().len(), 3);
    assert_eq!(record.diagnoses().len(), 2);
    assert!(record.attempts.last().unwrap().diagnosis.is_none());
    assert_eq!(backend.calls(AgentRole::Diagnose), 2);
    assert_eq!(backend.calls(AgentRole::Repair), 2);
    assert_eq!(db.released(), 1);
}

#[tokio::test]
async fn test_zero_retry_budget() {
    let backend = Arc::new(ScriptedBackend::new().reply(AgentRole::Generate, sql_reply("SELECT * FROM nope")));
    let db = Arc::new(FakeDatabase::new());

    let record = controller(&backend, &db, pipeline(0)).submit_query("anything").await;

    assert!(matches!(record.outcome, RunOutcome::Exhausted { last_diagnosis: None, .. }));
    assert_eq!(record.sql_candidates().len(), 1);
    assert_eq!(backend.calls(AgentRole::Generate), 1);
    assert_eq!(backend.calls(AgentRole::Diagnose), 0);
    assert_eq!(backend.calls(AgentRole::Repair), 0);
}

#[tokio::test]
async fn test_candidates_bounded_by_budget() {
    for max_retry in 0..=4u32 {
        let mut script = ScriptedBackend::new().reply(AgentRole::Generate, sql_reply("SELECT * FROM t0"));
        for i in 1..=5 {
            script = script
                .reply(AgentRole::Diagnose, plan_reply(&format!("use table t{}", i)))
                .reply(AgentRole::Repair, sql_reply(&format!("SELECT * FROM t{}", i)));
        }
        let backend = Arc::new(script);
        let db = Arc::new(FakeDatabase::new());

        let record = controller(&backend, &db, pipeline(max_retry)).submit_query("q").await;

        assert!(matches!(record.outcome, RunOutcome::Exhausted { .. }));
        assert_eq!(record.sql_candidates().len(), max_retry as usize + 1);
        assert_eq!(record.diagnoses().len(), max_retry as usize);
        assert!(record.result_tables().len() <= record.sql_candidates().len());
    }
}

#[tokio::test]
async fn test_generation_failure_gives_empty_record() {
    let backend = Arc::new(
        ScriptedBackend::new().fail(AgentRole::Generate, LlmError::Api { status: 500, body: "boom".to_string() }),
    );
    let db = Arc::new(FakeDatabase::new());

    let record = controller(&backend, &db, pipeline(3)).submit_query("q").await;

    assert!(matches!(
        record.outcome,
        RunOutcome::Failed { stage: FailureStage::Generation, .. }
    ));
    assert!(record.attempts.is_empty());
    assert!(record.responses.is_empty());
    assert!(db.executed().is_empty());
    assert_eq!(db.opened(), 1);
    assert_eq!(db.released(), 1);
}

#[tokio::test]
async fn test_session_unavailable() {
    let backend = Arc::new(ScriptedBackend::new().reply(AgentRole::Generate, sql_reply(UNITS_SQL)));
    let db = Arc::new(FakeDatabase::new().unavailable());

    let record = controller(&backend, &db, pipeline(3)).submit_query("q").await;

    assert!(matches!(record.outcome, RunOutcome::Failed { stage: FailureStage::Session, .. }));
    assert!(record.attempts.is_empty());
    assert_eq!(backend.calls(AgentRole::Generate), 0);
}

#[tokio::test]
async fn test_blank_fix_plan_fails_diagnosis() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(AgentRole::Generate, sql_reply("SELECT * FROM nope"))
            .reply(AgentRole::Diagnose, plan_reply("   ")),
    );
    let db = Arc::new(FakeDatabase::new());

    let record = controller(&backend, &db, pipeline(3)).submit_query("q").await;

    assert!(matches!(record.outcome, RunOutcome::Failed { stage: FailureStage::Diagnosis, .. }));
    assert_eq!(record.attempts.len(), 1);
    assert_eq!(backend.calls(AgentRole::Repair), 0);
    assert_eq!(db.released(), 1);
}

#[tokio::test]
async fn test_repair_failure_keeps_partial_record() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(AgentRole::Generate, sql_reply("SELECT * FROM nope"))
            .reply(AgentRole::Diagnose, plan_reply("use table employee")),
    );
    let db = Arc::new(FakeDatabase::new());

    let record = controller(&backend, &db, pipeline(3)).submit_query("q").await;

    assert!(matches!(record.outcome, RunOutcome::Failed { stage: FailureStage::Repair, .. }));
    assert_eq!(record.attempts.len(), 1);
    assert_eq!(record.diagnoses(), vec!["use table employee"]);
    assert_eq!(record.responses.len(), 1);
    assert_eq!(db.released(), 1);
}

#[tokio::test]
async fn test_empty_result_policy_off() {
    let sql = "SELECT full_name FROM employee WHERE department = 'Legal'";
    let backend = Arc::new(ScriptedBackend::new().reply(AgentRole::Generate, sql_reply(sql)));
    let db = Arc::new(FakeDatabase::new().with(sql, Ok(empty_table())));

    let mut config = pipeline(3);
    config.empty_result_is_failure = false;
    let record = controller(&backend, &db, config).submit_query("Who works in Legal?").await;

    assert_eq!(record.outcome, RunOutcome::Success { attempt: 0 });
    assert_eq!(backend.calls(AgentRole::Diagnose), 0);
    assert!(matches!(record.answer(), Err(PipelineError::NoAnswer(_))));
}

#[tokio::test]
async fn test_rate_limit_handled_within_run() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .fail(AgentRole::Generate, LlmError::RateLimited("429".to_string()))
            .fail(AgentRole::Generate, LlmError::RateLimited("429".to_string()))
            .reply(AgentRole::Generate, sql_reply(UNITS_SQL)),
    );
    let db = Arc::new(FakeDatabase::new().with(UNITS_SQL, Ok(units_by_employee())));

    let record = controller(&backend, &db, pipeline(3)).submit_query("q").await;

    assert_eq!(record.outcome, RunOutcome::Success { attempt: 0 });
    assert_eq!(backend.calls(AgentRole::Generate), 3);
}

#[tokio::test]
async fn test_run_deadline() {
    let backend = Arc::new(ScriptedBackend::new().reply(AgentRole::Generate, sql_reply(UNITS_SQL)));
    let db = Arc::new(
        FakeDatabase::new()
            .with(UNITS_SQL, Ok(units_by_employee()))
            .slow(Duration::from_millis(500)),
    );

    let mut config = pipeline(3);
    config.run_timeout = Some(Duration::from_millis(50));
    let record = controller(&backend, &db, config).submit_query("q").await;

    match &record.outcome {
        RunOutcome::Failed { stage: FailureStage::Deadline, message } => {
            assert!(message.contains("50ms"), "{}", message)
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(record.responses.len(), 1);
    // the candidate cut off mid-execution is still on the record
    assert_eq!(record.sql_candidates(), vec![UNITS_SQL]);
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::Interrupted);
    assert!(record.attempts[0].error.is_none());
    assert!(record.attempts[0].result.is_none());
    assert_eq!(db.released(), 1);
}

#[tokio::test]
async fn test_deadline_during_diagnosis_keeps_failed_attempt() {
    let bad = "SELECT * FROM missing_table";
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(AgentRole::Generate, sql_reply(bad))
            .reply(AgentRole::Diagnose, plan_reply("Use the `sales` table."))
            .slow(AgentRole::Diagnose, Duration::from_millis(500)),
    );
    let db = Arc::new(FakeDatabase::new());

    let mut config = pipeline(3);
    config.run_timeout = Some(Duration::from_millis(100));
    let record = controller(&backend, &db, config).submit_query("q").await;

    match &record.outcome {
        RunOutcome::Failed { stage: FailureStage::Deadline, message } => {
            assert!(message.contains("100ms"), "{}", message)
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(db.executed(), vec![bad]);
    assert_eq!(record.sql_candidates(), vec![bad]);

    let attempt = &record.attempts[0];
    assert_eq!(attempt.outcome, AttemptOutcome::ExecutionError);
    assert_eq!(attempt.error.as_deref(), Some("no such table: missing_table"));
    assert_eq!(
        attempt.error_class,
        Some(SqlErrorClass::TableNotFound(Some("missing_table".to_string())))
    );
    assert!(attempt.diagnosis.is_none());
    assert_eq!(backend.calls(AgentRole::Repair), 0);
    assert_eq!(db.released(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let other = "SELECT COUNT(*) AS employees FROM employee";
    let backend = Arc::new(
        ScriptedBackend::new()
            .reply(AgentRole::Generate, sql_reply(UNITS_SQL))
            .reply(AgentRole::Generate, sql_reply(other)),
    );
    let db = Arc::new(
        FakeDatabase::new()
            .with(UNITS_SQL, Ok(units_by_employee()))
            .with(other, Ok(units_by_employee())),
    );
    let controller = Arc::new(controller(&backend, &db, pipeline(3)));

    let first = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit_query("units per employee").await }
    });
    let second = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit_query("how many employees").await }
    });

    let (first, second) = (first.await.unwrap(), second.await.unwrap());

    assert!(first.is_success());
    assert!(second.is_success());
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.user_query, "units per employee");
    assert_eq!(first.sql_candidates().len(), 1);
    assert_eq!(second.sql_candidates().len(), 1);
    assert_eq!(db.opened(), 2);
    assert_eq!(db.released(), 2);
}

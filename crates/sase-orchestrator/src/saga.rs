//! Saga Orchestration for NGFW Provisioning
//!
//! A saga is an ordered list of steps, each a forward action plus an
//! optional compensation. Steps run in order; when one fails, the
//! compensations of the steps that already completed run in reverse.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ProvisionResult;

/// Saga step status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Compensating,
    Compensated,
}

/// Saga overall status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStatus {
    Pending,
    Running,
    Completed,
    Compensating,
    Compensated,
    /// A compensation itself failed
    Failed,
}

/// Saga step record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SagaStep {
    pub id: String,
    pub name: String,
    pub service: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Saga execution record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SagaExecution {
    pub id: String,
    pub saga_type: String,
    pub status: SagaStatus,
    pub steps: Vec<SagaStep>,
    pub input: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SagaExecution {
    pub fn new(saga_type: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            saga_type: saga_type.into(),
            status: SagaStatus::Pending,
            steps: vec![],
            input,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn step(&self, name: &str) -> Option<&SagaStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// One forward action and its compensation over a shared context `C`
#[async_trait]
pub trait SagaStepExecutor<C: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Control plane the step talks to
    fn service(&self) -> &'static str;

    /// Forward action. The returned value is kept in the step record.
    async fn execute(&self, ctx: &mut C) -> ProvisionResult<Option<serde_json::Value>>;

    /// Undo a completed `execute`. Nothing to undo by default.
    async fn compensate(&self, _ctx: &mut C) -> ProvisionResult<()> {
        Ok(())
    }
}

/// Ordered saga definition
pub struct Saga<C: Send> {
    saga_type: String,
    steps: Vec<Box<dyn SagaStepExecutor<C>>>,
}

impl<C: Send> Saga<C> {
    pub fn new(saga_type: impl Into<String>) -> Self {
        Self {
            saga_type: saga_type.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl SagaStepExecutor<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Execute saga with automatic compensation on failure.
    ///
    /// The error of the failing step is returned unchanged after compensation.
    pub async fn execute(&self, ctx: &mut C, execution: &mut SagaExecution) -> ProvisionResult<()> {
        execution.status = SagaStatus::Running;

        for (i, step) in self.steps.iter().enumerate() {
            execution.steps.push(SagaStep {
                id: Uuid::new_v4().to_string(),
                name: step.name().to_string(),
                service: step.service().to_string(),
                status: StepStatus::Running,
                started_at: Some(Utc::now()),
                completed_at: None,
                output: None,
                error: None,
            });
            let record = execution.steps.len() - 1;

            match step.execute(ctx).await {
                Ok(output) => {
                    let s = &mut execution.steps[record];
                    s.status = StepStatus::Completed;
                    s.completed_at = Some(Utc::now());
                    s.output = output;
                }
                Err(e) => {
                    let s = &mut execution.steps[record];
                    s.status = StepStatus::Failed;
                    s.completed_at = Some(Utc::now());
                    s.error = Some(e.to_string());

                    self.compensate(i, ctx, execution).await;
                    execution.completed_at = Some(Utc::now());
                    return Err(e);
                }
            }
        }

        execution.status = SagaStatus::Completed;
        execution.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Compensate steps `0..failed` in reverse
    async fn compensate(&self, failed: usize, ctx: &mut C, execution: &mut SagaExecution) {
        execution.status = SagaStatus::Compensating;
        let mut clean = true;

        for j in (0..failed).rev() {
            let step = &self.steps[j];
            execution.steps[j].status = StepStatus::Compensating;
            info!("Compensating {} step {}", self.saga_type, step.name());

            match step.compensate(ctx).await {
                Ok(()) => execution.steps[j].status = StepStatus::Compensated,
                Err(e) => {
                    warn!("Compensation of {} failed: {}", step.name(), e);
                    execution.steps[j].status = StepStatus::Failed;
                    execution.steps[j].error = Some(e.to_string());
                    clean = false;
                }
            }
        }

        execution.status = if clean { SagaStatus::Compensated } else { SagaStatus::Failed };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProvisionError;

    #[derive(Default)]
    struct Journal {
        events: Vec<String>,
    }

    struct Recorder {
        name: &'static str,
        fail: bool,
        fail_compensation: bool,
    }

    impl Recorder {
        fn ok(name: &'static str) -> Self {
            Self { name, fail: false, fail_compensation: false }
        }

        fn failing(name: &'static str) -> Self {
            Self { name, fail: true, fail_compensation: false }
        }
    }

    #[async_trait]
    impl SagaStepExecutor<Journal> for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn service(&self) -> &'static str {
            "test"
        }

        async fn execute(&self, ctx: &mut Journal) -> ProvisionResult<Option<serde_json::Value>> {
            ctx.events.push(format!("do {}", self.name));
            if self.fail {
                Err(ProvisionError::Configuration(format!("{} broke", self.name)))
            } else {
                Ok(Some(serde_json::json!({ "step": self.name })))
            }
        }

        async fn compensate(&self, ctx: &mut Journal) -> ProvisionResult<()> {
            ctx.events.push(format!("undo {}", self.name));
            if self.fail_compensation {
                Err(ProvisionError::Configuration("undo broke".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_saga_execution_new() {
        let input = serde_json::json!({"resource_group": "rg1"});
        let exec = SagaExecution::new("ngfw_create", input);

        assert_eq!(exec.status, SagaStatus::Pending);
        assert!(exec.steps.is_empty());
    }

    #[tokio::test]
    async fn test_all_steps_complete() {
        let saga = Saga::new("test").step(Recorder::ok("a")).step(Recorder::ok("b"));
        let mut journal = Journal::default();
        let mut exec = SagaExecution::new("test", serde_json::Value::Null);

        saga.execute(&mut journal, &mut exec).await.unwrap();

        assert_eq!(journal.events, vec!["do a", "do b"]);
        assert_eq!(exec.status, SagaStatus::Completed);
        assert!(exec.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(saga.step_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failure_compensates_in_reverse() {
        let saga = Saga::new("test")
            .step(Recorder::ok("a"))
            .step(Recorder::ok("b"))
            .step(Recorder::failing("c"))
            .step(Recorder::ok("d"));
        let mut journal = Journal::default();
        let mut exec = SagaExecution::new("test", serde_json::Value::Null);

        let err = saga.execute(&mut journal, &mut exec).await.unwrap_err();

        assert_eq!(err.to_string(), "Configuration error: c broke");
        assert_eq!(journal.events, vec!["do a", "do b", "do c", "undo b", "undo a"]);
        assert_eq!(exec.status, SagaStatus::Compensated);
        assert_eq!(exec.step("c").unwrap().status, StepStatus::Failed);
        assert_eq!(exec.step("a").unwrap().status, StepStatus::Compensated);
        assert!(exec.step("d").is_none());
    }

    #[tokio::test]
    async fn test_first_step_failure_has_nothing_to_undo() {
        let saga = Saga::new("test").step(Recorder::failing("a")).step(Recorder::ok("b"));
        let mut journal = Journal::default();
        let mut exec = SagaExecution::new("test", serde_json::Value::Null);

        assert!(saga.execute(&mut journal, &mut exec).await.is_err());
        assert_eq!(journal.events, vec!["do a"]);
        assert_eq!(exec.status, SagaStatus::Compensated);
    }

    #[tokio::test]
    async fn test_failed_compensation_marks_saga_failed() {
        let saga = Saga::new("test")
            .step(Recorder { name: "a", fail: false, fail_compensation: true })
            .step(Recorder::failing("b"));
        let mut journal = Journal::default();
        let mut exec = SagaExecution::new("test", serde_json::Value::Null);

        assert!(saga.execute(&mut journal, &mut exec).await.is_err());
        assert_eq!(exec.status, SagaStatus::Failed);
        assert_eq!(exec.step("a").unwrap().error.as_deref(), Some("Configuration error: undo broke"));
    }
}

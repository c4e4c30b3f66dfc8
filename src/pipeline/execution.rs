// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Run records
//!
//! An [`Execution`] only moves forward: `Pending → Running → {Succeeded |
//! Failed}`. Observations that would move a run or a step backwards are
//! ignored, and terminal runs never change again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::backend::{RunDescription, RunStatus, StepFailure};
use crate::errors::{TrainflowError, TrainflowResult};

/// Observability data recorded when a run starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_name: String,
    /// Experiment/tracking label the run is filed under
    pub experiment: Option<String>,
    /// Resolved parameter values
    pub parameters: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
}

/// One run of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pipeline_name: String,
    run_id: String,
    status: RunStatus,
    step_status: BTreeMap<String, RunStatus>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    metadata: RunMetadata,
    failure: Option<StepFailure>,
}

impl Execution {
    /// A freshly started run with every step pending
    pub fn started<I>(
        pipeline_name: impl Into<String>,
        run_id: impl Into<String>,
        metadata: RunMetadata,
        steps: I,
    ) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            pipeline_name: pipeline_name.into(),
            run_id: run_id.into(),
            status: RunStatus::Pending,
            step_status: steps
                .into_iter()
                .map(|step| (step, RunStatus::Pending))
                .collect(),
            started_at: metadata.started_at,
            ended_at: None,
            metadata,
            failure: None,
        }
    }

    /// Rebuild the record of a run from a backend snapshot
    ///
    /// Used to follow a run started elsewhere. The snapshot is folded in
    /// the same way a poll would be, so the state machine still holds.
    pub fn attached(description: &RunDescription) -> Self {
        let mut execution = Self::started(
            description.pipeline_name.clone(),
            description.run_id.clone(),
            description.metadata.clone(),
            description.steps.keys().cloned(),
        );
        execution.observe(description);
        execution
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn step_status(&self) -> &BTreeMap<String, RunStatus> {
        &self.step_status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        self.failure.as_ref()
    }

    /// Name of the step that failed the run, if it failed
    pub fn failed_step(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.step.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold a backend snapshot into the record. Returns whether anything changed.
    pub fn observe(&mut self, description: &RunDescription) -> bool {
        if self.is_terminal() {
            return false;
        }

        let mut changed = false;

        for (step, status) in &description.steps {
            let current = self.step_status.entry(step.clone()).or_insert(RunStatus::Pending);
            if status.rank() > current.rank() {
                *current = *status;
                changed = true;
            }
        }

        if description.status.rank() > self.status.rank() {
            self.status = description.status;
            changed = true;

            if self.status.is_terminal() {
                self.ended_at = Some(Utc::now());
            }
            if self.status == RunStatus::Failed {
                self.failure = description.failure.clone();
            }
        }

        changed
    }
}

/// What `wait` saw before returning
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// The run reached a terminal status
    Completed(Execution),
    /// The bound elapsed first; the run keeps going on the backend
    TimedOut {
        execution: Execution,
        waited: Duration,
    },
}

impl WaitOutcome {
    pub fn execution(&self) -> &Execution {
        match self {
            Self::Completed(execution) | Self::TimedOut { execution, .. } => execution,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn into_execution(self) -> Execution {
        match self {
            Self::Completed(execution) | Self::TimedOut { execution, .. } => execution,
        }
    }

    /// Map a failed run to `ExecutionFailure` and a timeout to `TimeoutExceeded`
    pub fn into_result(self) -> TrainflowResult<Execution> {
        match self {
            Self::Completed(execution) if execution.status() == RunStatus::Failed => {
                let (step, reason) = match execution.failure() {
                    Some(f) => (f.step.clone(), f.reason.clone()),
                    None => ("unknown".to_string(), "no reason reported".to_string()),
                };
                Err(TrainflowError::ExecutionFailure {
                    run_id: execution.run_id().to_string(),
                    step,
                    reason,
                })
            }
            Self::Completed(execution) => Ok(execution),
            Self::TimedOut { execution, waited } => Err(TrainflowError::TimeoutExceeded {
                run_id: execution.run_id().to_string(),
                status: execution.status().to_string(),
                waited,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution() -> Execution {
        let metadata = RunMetadata {
            run_name: "p-run".into(),
            experiment: None,
            parameters: BTreeMap::new(),
            started_at: Utc::now(),
        };
        Execution::started("p", "run-1", metadata, vec!["a".to_string(), "b".to_string()])
    }

    fn snapshot(status: RunStatus, steps: &[(&str, RunStatus)]) -> RunDescription {
        RunDescription {
            run_id: "run-1".into(),
            pipeline_name: "p".into(),
            metadata: execution().metadata().clone(),
            status,
            steps: steps.iter().map(|(s, st)| (s.to_string(), *st)).collect(),
            failure: None,
        }
    }

    #[test]
    fn test_status_only_moves_forward() {
        let mut exec = execution();

        assert!(exec.observe(&snapshot(RunStatus::Running, &[("a", RunStatus::Succeeded)])));
        assert!(!exec.observe(&snapshot(RunStatus::Pending, &[("a", RunStatus::Running)])));

        assert_eq!(exec.status(), RunStatus::Running);
        assert_eq!(exec.step_status()["a"], RunStatus::Succeeded);
        assert_eq!(exec.step_status()["b"], RunStatus::Pending);
    }

    #[test]
    fn test_terminal_is_sticky() {
        let mut exec = execution();
        exec.observe(&snapshot(RunStatus::Succeeded, &[]));
        assert!(exec.ended_at().is_some());

        assert!(!exec.observe(&snapshot(RunStatus::Failed, &[("a", RunStatus::Failed)])));
        assert_eq!(exec.status(), RunStatus::Succeeded);
    }

    #[test]
    fn test_failure_maps_to_error() {
        let mut exec = execution();
        let mut failed = snapshot(RunStatus::Failed, &[("a", RunStatus::Failed)]);
        failed.failure = Some(StepFailure {
            step: "a".into(),
            reason: "AlgorithmError".into(),
        });
        exec.observe(&failed);
        assert_eq!(exec.failed_step(), Some("a"));

        let err = WaitOutcome::Completed(exec).into_result().unwrap_err();
        assert!(matches!(err, TrainflowError::ExecutionFailure { ref step, .. } if step == "a"));
    }

    #[test]
    fn test_attached_run_keeps_backend_state() {
        let mut failed = snapshot(
            RunStatus::Failed,
            &[("a", RunStatus::Failed), ("b", RunStatus::Pending)],
        );
        failed.failure = Some(StepFailure {
            step: "a".into(),
            reason: "OOM".into(),
        });

        let exec = Execution::attached(&failed);
        assert_eq!(exec.run_id(), "run-1");
        assert_eq!(exec.pipeline_name(), "p");
        assert_eq!(exec.metadata().run_name, "p-run");
        assert_eq!(exec.status(), RunStatus::Failed);
        assert!(exec.is_terminal());
        assert_eq!(exec.failed_step(), Some("a"));
        assert_eq!(exec.step_status()["b"], RunStatus::Pending);
    }

    #[test]
    fn test_timeout_maps_to_error() {
        let outcome = WaitOutcome::TimedOut {
            execution: execution(),
            waited: Duration::from_secs(5),
        };
        assert!(outcome.is_timed_out());

        let err = outcome.into_result().unwrap_err();
        assert!(!err.is_fatal());
    }
}

//! Common types shared by the handler, the state machine and the runner

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One billing record to enter into the target application.
///
/// Produced by the data pipeline already validated and trimmed; the engine
/// only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingTask {
    /// Clinical-record identifier typed into the search field
    #[serde(alias = "recordId")]
    pub record_id: String,
    /// Identifier displayed once the record is loaded, used for validation
    #[serde(alias = "validationId")]
    pub validation_id: String,
    pub insurer: String,
    pub contract: String,
    pub stratum: String,
    #[serde(alias = "primaryDiagnosis")]
    pub primary_diagnosis: String,
    #[serde(default, alias = "additionalDiagnoses")]
    pub additional_diagnoses: Vec<String>,
    #[serde(alias = "attendingPhysician")]
    pub attending_physician: String,
    #[serde(alias = "admissionDate")]
    pub admission_date: NaiveDate,
}

/// Lifecycle states of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Ready,
    EnsuringInitialState,
    FindingRecord,
    /// Folded into `FindingRecord`; kept so diagnostics can name it
    ValidatingRecord,
    InitiatingNewEntry,
    Successful,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Successful | TaskState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Ready => "READY",
            TaskState::EnsuringInitialState => "ENSURING_INITIAL_STATE",
            TaskState::FindingRecord => "FINDING_RECORD",
            TaskState::ValidatingRecord => "VALIDATING_RECORD",
            TaskState::InitiatingNewEntry => "INITIATING_NEW_ENTRY",
            TaskState::Successful => "SUCCESSFUL",
            TaskState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskResultStatus {
    Success,
    FailedRetryLimit,
    FailedUnrecoverable,
    FailedUnexpected,
    /// The batch was cancelled before this task started
    Cancelled,
}

/// Immutable record produced exactly once per task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskResultStatus,
    pub task_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_state: Option<TaskState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Handler attempts made across all states, retries included
    pub attempts: u32,
}

impl TaskResult {
    pub fn success(task_identifier: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: TaskResultStatus::Success,
            task_identifier: task_identifier.into(),
            message: None,
            failed_at_state: None,
            error_code: None,
            attempts,
        }
    }

    pub fn cancelled(task_identifier: impl Into<String>) -> Self {
        Self {
            status: TaskResultStatus::Cancelled,
            task_identifier: task_identifier.into(),
            message: Some("batch cancelled before this task started".to_string()),
            failed_at_state: None,
            error_code: None,
            attempts: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskResultStatus::Success
    }
}

/// Per-status counts over a batch of results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed_retry_limit: usize,
    pub failed_unrecoverable: usize,
    pub failed_unexpected: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[TaskResult]) -> Self {
        let mut summary = BatchSummary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.status {
                TaskResultStatus::Success => summary.succeeded += 1,
                TaskResultStatus::FailedRetryLimit => summary.failed_retry_limit += 1,
                TaskResultStatus::FailedUnrecoverable => summary.failed_unrecoverable += 1,
                TaskResultStatus::FailedUnexpected => summary.failed_unexpected += 1,
                TaskResultStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    pub fn failed(&self) -> usize {
        self.failed_retry_limit + self.failed_unrecoverable + self.failed_unexpected
    }
}

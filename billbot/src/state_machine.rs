//! Per-task state machine and failure policy.

use crate::config::{AutomationConfig, RetryScope};
use crate::control::ControlSurface;
use crate::errors::{AutomationError, ErrorKind};
use crate::handler::WindowHandler;
use crate::types::{BillingTask, TaskResult, TaskResultStatus, TaskState};
use chrono::{DateTime, Local};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// What to do after a handler step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Wait the backoff and re-attempt the same state
    Retry,
    AbortRetryLimit,
    AbortUnrecoverable,
    AbortUnexpected,
}

impl FailureAction {
    /// Terminal status for the abort actions.
    pub fn status(self) -> Option<TaskResultStatus> {
        match self {
            FailureAction::Retry => None,
            FailureAction::AbortRetryLimit => Some(TaskResultStatus::FailedRetryLimit),
            FailureAction::AbortUnrecoverable => Some(TaskResultStatus::FailedUnrecoverable),
            FailureAction::AbortUnexpected => Some(TaskResultStatus::FailedUnexpected),
        }
    }
}

/// Failure classification. Depends only on the error kind and the retry budget.
pub struct FailurePolicy;

impl FailurePolicy {
    pub fn decide(kind: ErrorKind, retries_used: u32, max_retries: u32) -> FailureAction {
        match kind {
            k if k.is_retryable() => {
                if retries_used < max_retries {
                    FailureAction::Retry
                } else {
                    FailureAction::AbortRetryLimit
                }
            }
            ErrorKind::IdentifierMismatch | ErrorKind::UnexpectedModal => {
                FailureAction::AbortUnrecoverable
            }
            _ => FailureAction::AbortUnexpected,
        }
    }
}

/// The state that follows `state` when its step succeeds.
fn next_state(state: TaskState) -> TaskState {
    match state {
        TaskState::Ready => TaskState::EnsuringInitialState,
        TaskState::EnsuringInitialState => TaskState::FindingRecord,
        // Validation runs inside the find step
        TaskState::FindingRecord | TaskState::ValidatingRecord => TaskState::InitiatingNewEntry,
        TaskState::InitiatingNewEntry => TaskState::Successful,
        TaskState::Successful | TaskState::Failed => state,
    }
}

/// Keep only `[A-Za-z0-9_-]`, so any record id is safe inside a file name.
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// `<dir>/FAILURE_<YYYYmmdd_HHMMSS>_<sanitized id>_<STATE>.png`
pub fn failure_screenshot_path(
    dir: &Path,
    at: DateTime<Local>,
    task_identifier: &str,
    state: TaskState,
) -> PathBuf {
    dir.join(format!(
        "FAILURE_{}_{}_{}.png",
        at.format("%Y%m%d_%H%M%S"),
        sanitize_identifier(task_identifier),
        state
    ))
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Drives one [`BillingTask`] from `READY` to a terminal state.
#[derive(Debug, Clone)]
pub struct TaskStateMachine {
    max_retries: u32,
    scope: RetryScope,
    retry_backoff: Duration,
    screenshot_dir: PathBuf,
}

impl TaskStateMachine {
    pub fn new(config: &AutomationConfig) -> Self {
        Self {
            max_retries: config.retries.max_retries,
            scope: config.retries.scope,
            retry_backoff: config.timeouts.retry_backoff(),
            screenshot_dir: config.automation.screenshot_dir.clone(),
        }
    }

    /// Run the task to completion. Never fails and never panics on handler
    /// errors: every outcome becomes a [`TaskResult`].
    #[instrument(skip_all, fields(task = %task.record_id))]
    pub fn run(
        &self,
        task: &BillingTask,
        handler: &dyn WindowHandler,
        surface: &dyn ControlSurface,
    ) -> TaskResult {
        let mut state = TaskState::Ready;
        let mut retries_used = 0u32;
        let mut attempts = 0u32;

        loop {
            match state {
                TaskState::Ready => {
                    retries_used = 0;
                    state = self.advance(state, &mut retries_used);
                    continue;
                }
                TaskState::Successful => {
                    info!(attempts, "Task completed successfully");
                    return TaskResult::success(&task.record_id, attempts);
                }
                _ => {}
            }

            attempts += 1;
            let error = match Self::attempt(state, task, handler, surface) {
                Ok(()) => {
                    state = self.advance(state, &mut retries_used);
                    continue;
                }
                Err(error) => error,
            };

            let action = FailurePolicy::decide(error.kind(), retries_used, self.max_retries);
            let Some(status) = action.status() else {
                retries_used += 1;
                warn!(
                    state = %state,
                    code = error.error_code(),
                    "Retryable failure ({}/{}): {}",
                    retries_used,
                    self.max_retries,
                    error
                );
                surface.wait(self.retry_backoff);
                continue;
            };

            match action {
                FailureAction::AbortRetryLimit => {
                    error!(state = %state, "Retry limit reached: {}", error);
                }
                FailureAction::AbortUnrecoverable => {
                    error!(
                        state = %state,
                        payload = %error.payload(),
                        "Unrecoverable failure: {}",
                        error
                    );
                }
                _ => {
                    error!(
                        state = %state,
                        code = error.error_code(),
                        details = ?error,
                        "Unexpected failure: {}",
                        error
                    );
                    self.capture_failure(task, state, surface);
                }
            }
            return Self::failed(task, status, state, &error, attempts);
        }
    }

    fn advance(&self, from: TaskState, retries_used: &mut u32) -> TaskState {
        let to = next_state(from);
        debug!("Transition {} -> {}", from, to);
        if self.scope == RetryScope::PerState && from != TaskState::Ready {
            *retries_used = 0;
        }
        to
    }

    fn attempt(
        state: TaskState,
        task: &BillingTask,
        handler: &dyn WindowHandler,
        surface: &dyn ControlSurface,
    ) -> Result<(), AutomationError> {
        let step = || match state {
            TaskState::EnsuringInitialState => handler.ensure_initial_state(surface),
            TaskState::FindingRecord => handler.find_record(surface, task),
            TaskState::ValidatingRecord => handler.validate_record_loaded(surface, task),
            TaskState::InitiatingNewEntry => handler.initiate_new_entry(surface),
            other => Err(AutomationError::Internal(format!(
                "no handler step for state {other}"
            ))),
        };
        panic::catch_unwind(AssertUnwindSafe(step)).unwrap_or_else(|payload| {
            Err(AutomationError::Unclassified(format!(
                "panic: {}",
                panic_message(payload)
            )))
        })
    }

    fn capture_failure(&self, task: &BillingTask, state: TaskState, surface: &dyn ControlSurface) {
        let path =
            failure_screenshot_path(&self.screenshot_dir, Local::now(), &task.record_id, state);
        match panic::catch_unwind(AssertUnwindSafe(|| surface.take_screenshot(&path))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Could not save failure screenshot to {}: {}", path.display(), e);
            }
            Err(payload) => {
                warn!(
                    "Screenshot capture panicked for {}: {}",
                    path.display(),
                    panic_message(payload)
                );
            }
        }
    }

    fn failed(
        task: &BillingTask,
        status: TaskResultStatus,
        state: TaskState,
        error: &AutomationError,
        attempts: u32,
    ) -> TaskResult {
        TaskResult {
            status,
            task_identifier: task.record_id.clone(),
            message: Some(error.to_string()),
            failed_at_state: Some(state),
            error_code: Some(error.error_code().to_string()),
            attempts,
        }
    }
}

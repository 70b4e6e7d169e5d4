//! Batch runner: acquires the target window once, runs every task in order
//! and always releases the control surface.

use crate::config::AutomationConfig;
use crate::control::{ControlSurface, RemoteControl, SurfaceOptions};
use crate::errors::AutomationError;
use crate::handler::{MainWindowHandler, WindowHandler};
use crate::state_machine::{panic_message, TaskStateMachine};
use crate::types::{BatchSummary, BillingTask, TaskResult, TaskResultStatus};
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Cooperative stop signal, observed between tasks only.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Owns the surface for the duration of a run and shuts it down on drop,
/// including early returns and unwinding.
struct ShutdownGuard<S: ControlSurface> {
    surface: S,
}

impl<S: ControlSurface> Deref for ShutdownGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.surface
    }
}

impl<S: ControlSurface> DerefMut for ShutdownGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

impl<S: ControlSurface> Drop for ShutdownGuard<S> {
    fn drop(&mut self) {
        self.surface.shutdown();
    }
}

pub struct TaskRunner<S: ControlSurface, H: WindowHandler> {
    surface: S,
    handler: H,
    machine: TaskStateMachine,
    window_title: String,
    cancel: CancellationToken,
}

impl<S: ControlSurface, H: WindowHandler> TaskRunner<S, H> {
    pub fn new(surface: S, handler: H, config: &AutomationConfig) -> Self {
        Self {
            surface,
            handler,
            machine: TaskStateMachine::new(config),
            window_title: config.automation.window_title.clone(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one wired to Ctrl+C.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every task and return one result per task, in input order.
    ///
    /// Fails only when the target window cannot be acquired. The surface is
    /// shut down exactly once whatever happens.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub fn run(self, tasks: &[BillingTask]) -> Result<Vec<TaskResult>, AutomationError> {
        let TaskRunner {
            surface,
            handler,
            machine,
            window_title,
            cancel,
        } = self;
        let mut surface = ShutdownGuard { surface };

        if let Err(e) = surface.find_and_focus_window(&window_title) {
            error!("Could not acquire target window '{}': {}", window_title, e);
            return Err(e);
        }

        let started = Instant::now();
        let total = tasks.len();
        let mut results = Vec::with_capacity(total);

        for (index, task) in tasks.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    "Batch cancelled; skipping {} remaining task(s)",
                    total - index
                );
                results.extend(
                    tasks[index..]
                        .iter()
                        .map(|t| TaskResult::cancelled(&t.record_id)),
                );
                break;
            }

            info!("Processing task {}/{}: {}", index + 1, total, task.record_id);
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                machine.run(task, &handler, &*surface)
            }))
            .unwrap_or_else(|payload| {
                let error = AutomationError::Unclassified(format!(
                    "panic: {}",
                    panic_message(payload)
                ));
                error!("Task {} aborted by a panic: {}", task.record_id, error);
                escaped_panic_result(task, &error)
            });
            info!(
                status = ?result.status,
                attempts = result.attempts,
                "Finished task {}",
                task.record_id
            );
            results.push(result);
        }

        let summary = BatchSummary::from_results(&results);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed_retry_limit = summary.failed_retry_limit,
            failed_unrecoverable = summary.failed_unrecoverable,
            failed_unexpected = summary.failed_unexpected,
            cancelled = summary.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );
        Ok(results)
    }
}

/// Result for a task whose run unwound past the state machine, e.g. from a
/// surface call made between handler steps.
fn escaped_panic_result(task: &BillingTask, error: &AutomationError) -> TaskResult {
    TaskResult {
        status: TaskResultStatus::FailedUnexpected,
        task_identifier: task.record_id.clone(),
        message: Some(error.to_string()),
        failed_at_state: None,
        error_code: Some(error.error_code().to_string()),
        attempts: 0,
    }
}

/// Runner over the real desktop for the current platform.
pub fn remote_runner(
    config: &AutomationConfig,
) -> Result<TaskRunner<RemoteControl, MainWindowHandler>, AutomationError> {
    config.validate()?;
    let handler = MainWindowHandler::new(config)?;
    let surface = RemoteControl::for_current_platform(SurfaceOptions::from_config(config))?;
    Ok(TaskRunner::new(surface, handler, config))
}

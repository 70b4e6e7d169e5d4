//! Keyboard and clipboard driven data entry for legacy desktop billing software
//!
//! The engine drives a target application that exposes no API: it focuses the
//! application's window, types into it, and copies displayed values back
//! through the clipboard to confirm the right record is on screen. Each
//! [`BillingTask`] runs through a small state machine with bounded retries,
//! and a [`TaskRunner`] processes a batch sequentially, producing exactly one
//! [`TaskResult`] per task.

pub mod config;
pub mod control;
pub mod errors;
pub mod handler;
pub mod keys;
pub mod platforms;
pub mod runner;
pub mod state_machine;
#[cfg(test)]
mod tests;
pub mod types;

pub use config::{AutomationConfig, RetryScope, TitleMatch};
pub use control::{ControlSurface, RemoteControl, SurfaceOptions};
pub use errors::{AutomationError, ErrorKind};
pub use handler::{MainWindowHandler, WindowHandler};
pub use keys::KeySequence;
pub use runner::{remote_runner, CancellationToken, TaskRunner};
pub use state_machine::{FailureAction, FailurePolicy, TaskStateMachine};
pub use types::{BatchSummary, BillingTask, TaskResult, TaskResultStatus, TaskState};

//! Shared fakes for the engine's unit tests.

use crate::control::ControlSurface;
use crate::errors::AutomationError;
use crate::handler::WindowHandler;
use crate::keys::{KeySequence, KeyToken};
use crate::types::BillingTask;
use chrono::NaiveDate;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_test_writer()
        .try_init();
}

pub fn sample_task(record_id: &str) -> BillingTask {
    BillingTask {
        record_id: record_id.to_string(),
        validation_id: "CC-98765".to_string(),
        insurer: "Test Insurer".to_string(),
        contract: "Contract 1".to_string(),
        stratum: "2".to_string(),
        primary_diagnosis: "A001".to_string(),
        additional_diagnoses: vec!["B002".to_string()],
        attending_physician: "Dr. Mock".to_string(),
        admission_date: NaiveDate::from_ymd_opt(2025, 7, 14).unwrap(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    FindWindow(String),
    Keys(String),
    Wait(Duration),
    ClipboardRead(Duration),
    Screenshot(PathBuf),
    Shutdown,
}

#[derive(Default)]
struct SurfaceLog {
    calls: RefCell<Vec<SurfaceCall>>,
    typed: RefCell<Vec<String>>,
    clipboard: RefCell<VecDeque<Result<String, AutomationError>>>,
    focus_fails: Cell<bool>,
    screenshot_fails: Cell<bool>,
    screenshot_panics: Cell<bool>,
    wait_panics: Cell<bool>,
    shutdowns: Cell<u32>,
}

/// Recording [`ControlSurface`]. Clones share one log, so a test can keep a
/// handle after moving the surface into a runner.
#[derive(Clone, Default)]
pub struct FakeSurface {
    log: Rc<SurfaceLog>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next clipboard read. Reads past the queue return `CC-98765`.
    pub fn push_clipboard(&self, value: Result<String, AutomationError>) {
        self.log.clipboard.borrow_mut().push_back(value);
    }

    pub fn fail_focus(&self) {
        self.log.focus_fails.set(true);
    }

    pub fn fail_screenshots(&self) {
        self.log.screenshot_fails.set(true);
    }

    pub fn panic_on_screenshot(&self) {
        self.log.screenshot_panics.set(true);
    }

    /// Make every `wait` panic
    pub fn panic_on_wait(&self) {
        self.log.wait_panics.set(true);
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.log.calls.borrow().clone()
    }

    /// Literal text runs passed to `send_keys`, in order
    pub fn typed_text(&self) -> Vec<String> {
        self.log.typed.borrow().clone()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Wait(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Screenshot(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn shutdowns(&self) -> u32 {
        self.log.shutdowns.get()
    }

    fn record(&self, call: SurfaceCall) {
        self.log.calls.borrow_mut().push(call);
    }
}

impl ControlSurface for FakeSurface {
    fn find_and_focus_window(&mut self, title: &str) -> Result<(), AutomationError> {
        self.record(SurfaceCall::FindWindow(title.to_string()));
        if self.log.focus_fails.get() {
            return Err(AutomationError::Focus(format!("no window titled '{title}'")));
        }
        Ok(())
    }

    fn ensure_focus(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    fn send_keys(&self, keys: &KeySequence) -> Result<(), AutomationError> {
        self.record(SurfaceCall::Keys(keys.source().to_string()));
        for token in keys.tokens() {
            if let KeyToken::Text(text) = token {
                self.log.typed.borrow_mut().push(text.clone());
            }
        }
        Ok(())
    }

    fn read_clipboard_verified(&self, settle: Duration) -> Result<String, AutomationError> {
        self.record(SurfaceCall::ClipboardRead(settle));
        self.log
            .clipboard
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok("CC-98765".to_string()))
    }

    fn take_screenshot(&self, path: &Path) -> Result<(), AutomationError> {
        self.record(SurfaceCall::Screenshot(path.to_path_buf()));
        if self.log.screenshot_panics.get() {
            panic!("screen capture crashed");
        }
        if self.log.screenshot_fails.get() {
            return Err(AutomationError::PlatformError("no display".to_string()));
        }
        Ok(())
    }

    fn wait(&self, duration: Duration) {
        self.record(SurfaceCall::Wait(duration));
        if self.log.wait_panics.get() {
            panic!("wait crashed");
        }
    }

    fn shutdown(&mut self) {
        self.record(SurfaceCall::Shutdown);
        self.log.shutdowns.set(self.log.shutdowns.get() + 1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    EnsureInitialState,
    FindRecord,
    ValidateRecordLoaded,
    InitiateNewEntry,
}

/// Scripted result of one handler step.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Ok,
    Focus,
    Clipboard,
    NotReady,
    Mismatch,
    Modal,
    Unclassified(&'static str),
    Panic(&'static str),
}

impl Outcome {
    fn resolve(self) -> Result<(), AutomationError> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::Focus => Err(AutomationError::Focus("focus stolen".into())),
            Outcome::Clipboard => Err(AutomationError::Clipboard("copy had no effect".into())),
            Outcome::NotReady => Err(AutomationError::ApplicationStateNotReady(
                "record still loading".into(),
            )),
            Outcome::Mismatch => Err(AutomationError::IdentifierMismatch {
                expected_id: "CC-98765".into(),
                found_id: "CC-11111".into(),
            }),
            Outcome::Modal => Err(AutomationError::UnexpectedModal {
                popup_text: "Record locked by another user".into(),
            }),
            Outcome::Unclassified(msg) => Err(AutomationError::Unclassified(msg.into())),
            Outcome::Panic(msg) => panic!("{}", msg),
        }
    }
}

/// [`WindowHandler`] whose steps play back scripted outcomes. A step with an
/// empty script succeeds unless an `always` outcome is set for it.
#[derive(Default)]
pub struct FakeHandler {
    scripts: RefCell<HashMap<Step, VecDeque<Outcome>>>,
    always: RefCell<HashMap<Step, Outcome>>,
    steps: RefCell<Vec<Step>>,
    records: RefCell<Vec<String>>,
}

impl FakeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, step: Step, outcomes: Vec<Outcome>) {
        self.scripts
            .borrow_mut()
            .entry(step)
            .or_default()
            .extend(outcomes);
    }

    pub fn always(&self, step: Step, outcome: Outcome) {
        self.always.borrow_mut().insert(step, outcome);
    }

    pub fn steps(&self) -> Vec<Step> {
        self.steps.borrow().clone()
    }

    pub fn count(&self, step: Step) -> usize {
        self.steps.borrow().iter().filter(|s| **s == step).count()
    }

    /// Record ids seen by `find_record`, in order
    pub fn records(&self) -> Vec<String> {
        self.records.borrow().clone()
    }

    fn play(&self, step: Step) -> Result<(), AutomationError> {
        self.steps.borrow_mut().push(step);
        let scripted = self
            .scripts
            .borrow_mut()
            .get_mut(&step)
            .and_then(|queue| queue.pop_front());
        let outcome = scripted
            .or_else(|| self.always.borrow().get(&step).copied())
            .unwrap_or(Outcome::Ok);
        outcome.resolve()
    }
}

impl WindowHandler for FakeHandler {
    fn ensure_initial_state(&self, _surface: &dyn ControlSurface) -> Result<(), AutomationError> {
        self.play(Step::EnsureInitialState)
    }

    fn find_record(
        &self,
        _surface: &dyn ControlSurface,
        task: &BillingTask,
    ) -> Result<(), AutomationError> {
        self.records.borrow_mut().push(task.record_id.clone());
        self.play(Step::FindRecord)
    }

    fn validate_record_loaded(
        &self,
        _surface: &dyn ControlSurface,
        _task: &BillingTask,
    ) -> Result<(), AutomationError> {
        self.play(Step::ValidateRecordLoaded)
    }

    fn initiate_new_entry(&self, _surface: &dyn ControlSurface) -> Result<(), AutomationError> {
        self.play(Step::InitiateNewEntry)
    }
}

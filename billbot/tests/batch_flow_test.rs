//! End-to-end batches against an in-memory model of the billing application.

use billbot::keys::{Key, KeyToken, NamedKey};
use billbot::{
    AutomationConfig, AutomationError, BillingTask, ControlSurface, KeySequence,
    MainWindowHandler, TaskResultStatus, TaskRunner, TaskState,
};
use chrono::NaiveDate;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// What the simulated application shows and how it misbehaves.
#[derive(Default)]
struct AppModel {
    /// record id -> identifier displayed once loaded
    records: HashMap<String, String>,
    search_field: String,
    loaded: Option<String>,
    /// Clipboard reads that should see the copy silently fail
    dead_copies: u32,
    /// Record id whose load crashes the application
    crash_on: Option<String>,
    entries_opened: Vec<String>,
    screenshots: Vec<PathBuf>,
}

#[derive(Clone, Default)]
struct SimulatedApp {
    model: Rc<RefCell<AppModel>>,
    shutdowns: Rc<Cell<u32>>,
}

impl SimulatedApp {
    fn with_records(records: &[(&str, &str)]) -> Self {
        let app = Self::default();
        app.model.borrow_mut().records = records
            .iter()
            .map(|(r, v)| (r.to_string(), v.to_string()))
            .collect();
        app
    }
}

impl ControlSurface for SimulatedApp {
    fn find_and_focus_window(&mut self, title: &str) -> Result<(), AutomationError> {
        if title == "Billing Software - Main" {
            Ok(())
        } else {
            Err(AutomationError::Focus(format!("no window titled '{title}'")))
        }
    }

    fn ensure_focus(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    fn send_keys(&self, keys: &KeySequence) -> Result<(), AutomationError> {
        let mut model = self.model.borrow_mut();
        for token in keys.tokens() {
            match token {
                KeyToken::Text(text) => model.search_field.push_str(text),
                KeyToken::Key { key, modifiers, .. } => match (key, modifiers.ctrl) {
                    (Key::Named(NamedKey::Escape), false) => {
                        model.search_field.clear();
                        model.loaded = None;
                    }
                    (Key::Named(NamedKey::Enter), false) => {
                        let id = std::mem::take(&mut model.search_field);
                        if model.crash_on.as_deref() == Some(id.as_str()) {
                            return Err(AutomationError::PlatformError(
                                "target application stopped responding".into(),
                            ));
                        }
                        model.loaded = Some(id);
                    }
                    (Key::Char('n'), true) => {
                        if let Some(id) = model.loaded.clone() {
                            model.entries_opened.push(id);
                        }
                    }
                    _ => {}
                },
            }
        }
        Ok(())
    }

    fn read_clipboard_verified(&self, _settle: Duration) -> Result<String, AutomationError> {
        let mut model = self.model.borrow_mut();
        if model.dead_copies > 0 {
            model.dead_copies -= 1;
            return Err(AutomationError::Clipboard("copy had no observable effect".into()));
        }
        let loaded = model.loaded.clone();
        let displayed = loaded
            .and_then(|id| model.records.get(&id).cloned())
            .unwrap_or_default();
        Ok(format!("{displayed}\r\n"))
    }

    fn take_screenshot(&self, path: &Path) -> Result<(), AutomationError> {
        self.model.borrow_mut().screenshots.push(path.to_path_buf());
        Ok(())
    }

    fn wait(&self, _duration: Duration) {}

    fn shutdown(&mut self) {
        self.shutdowns.set(self.shutdowns.get() + 1);
    }
}

fn task(record_id: &str, validation_id: &str) -> BillingTask {
    BillingTask {
        record_id: record_id.into(),
        validation_id: validation_id.into(),
        insurer: "Test Insurer".into(),
        contract: "Contract 1".into(),
        stratum: "2".into(),
        primary_diagnosis: "A001".into(),
        additional_diagnoses: Vec::new(),
        attending_physician: "Dr. Mock".into(),
        admission_date: NaiveDate::from_ymd_opt(2025, 7, 14).unwrap(),
    }
}

fn config() -> AutomationConfig {
    let mut config = AutomationConfig::new("Billing Software - Main");
    config.timeouts.retry_backoff_ms = 0;
    config
}

fn runner(
    app: &SimulatedApp,
    config: &AutomationConfig,
) -> TaskRunner<SimulatedApp, MainWindowHandler> {
    let handler = MainWindowHandler::new(config).unwrap();
    TaskRunner::new(app.clone(), handler, config)
}

#[test]
fn test_batch_enters_every_matching_record() {
    let _ = tracing_subscriber::fmt::try_init();
    let app = SimulatedApp::with_records(&[("ID-1", "CC-1"), ("ID-2", "CC-2")]);

    let results = runner(&app, &config())
        .run(&[task("ID-1", "CC-1"), task("ID-2", "CC-2")])
        .unwrap();

    assert!(results.iter().all(|r| r.is_success()), "{results:?}");
    assert_eq!(app.model.borrow().entries_opened, ["ID-1", "ID-2"]);
    assert_eq!(app.shutdowns.get(), 1);
}

#[test]
fn test_wrong_record_is_never_billed() {
    let app = SimulatedApp::with_records(&[("ID-1", "CC-OTHER"), ("ID-2", "CC-2")]);

    let results = runner(&app, &config())
        .run(&[task("ID-1", "CC-1"), task("ID-2", "CC-2")])
        .unwrap();

    assert_eq!(results[0].status, TaskResultStatus::FailedUnrecoverable);
    assert_eq!(results[0].error_code.as_deref(), Some("E2001_ID_MISMATCH"));
    assert!(results[1].is_success());
    assert_eq!(app.model.borrow().entries_opened, ["ID-2"]);
}

#[test]
fn test_transient_clipboard_failure_is_retried() {
    let app = SimulatedApp::with_records(&[("ID-1", "CC-1")]);
    app.model.borrow_mut().dead_copies = 1;

    let results = runner(&app, &config()).run(&[task("ID-1", "CC-1")]).unwrap();

    assert!(results[0].is_success());
    assert_eq!(results[0].attempts, 4);
}

#[test]
fn test_persistent_clipboard_failure_hits_retry_limit() {
    let app = SimulatedApp::with_records(&[("ID-1", "CC-1")]);
    app.model.borrow_mut().dead_copies = 10;
    let mut config = config();
    config.retries.max_retries = 2;

    let results = runner(&app, &config).run(&[task("ID-1", "CC-1")]).unwrap();

    assert_eq!(results[0].status, TaskResultStatus::FailedRetryLimit);
    assert_eq!(results[0].failed_at_state, Some(TaskState::FindingRecord));
    // Three find attempts, each consuming one dead copy
    assert_eq!(app.model.borrow().dead_copies, 7);
}

#[test]
fn test_application_crash_is_captured_and_batch_continues() {
    let app = SimulatedApp::with_records(&[("ID-2", "CC-2")]);
    app.model.borrow_mut().crash_on = Some("ID-1".into());

    let results = runner(&app, &config())
        .run(&[task("ID-1", "CC-1"), task("ID-2", "CC-2")])
        .unwrap();

    assert_eq!(results[0].status, TaskResultStatus::FailedUnexpected);
    assert_eq!(
        results[0].message.as_deref(),
        Some("Platform-specific error: target application stopped responding")
    );
    assert!(results[1].is_success());

    let model = app.model.borrow();
    assert_eq!(model.screenshots.len(), 1);
    let name = model.screenshots[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.ends_with("_ID-1_FINDING_RECORD.png"), "{name}");
}

#[test]
fn test_missing_window_aborts_before_any_task() {
    let app = SimulatedApp::default();
    let config = AutomationConfig::new("Some Other Window");

    let err = runner(&app, &config).run(&[task("ID-1", "CC-1")]).unwrap_err();

    assert!(matches!(err, AutomationError::Focus(_)));
    assert_eq!(app.shutdowns.get(), 1);
    assert!(app.model.borrow().entries_opened.is_empty());
}

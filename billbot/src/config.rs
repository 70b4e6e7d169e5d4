//! Automation profile loaded from a TOML file
//!
//! Every table except `[automation].window_title` is optional and falls back
//! to the defaults below. The profile is read once and shared read-only.
//!
//! ```toml
//! [automation]
//! window_title = "Billing Software - Main"
//!
//! [timeouts]
//! record_load_wait_ms = 4000
//!
//! [retries]
//! max_retries = 2
//!
//! [sequences]
//! nav_to_id_field = "{TAB 2}"
//! ```

use crate::errors::AutomationError;
use crate::keys::KeySequence;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub automation: AutomationSection,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub retries: RetrySettings,
    #[serde(default)]
    pub sequences: SequenceSettings,
}

/// How a window title is matched against the configured one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleMatch {
    #[default]
    Exact,
    Contains,
}

impl TitleMatch {
    pub fn matches(&self, expected: &str, actual: &str) -> bool {
        match self {
            TitleMatch::Exact => actual == expected,
            TitleMatch::Contains => actual.contains(expected),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationSection {
    pub window_title: String,
    #[serde(default)]
    pub title_match: TitleMatch,
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Pause between typing a value and confirming it
    pub generic_action_delay_ms: u64,
    /// Wait after submitting a record search
    pub record_load_wait_ms: u64,
    /// How long to poll for the target window at startup
    pub focus_timeout_ms: u64,
    /// Wait between the copy action and reading the clipboard
    pub clipboard_settle_ms: u64,
    pub navigation_settle_ms: u64,
    pub reset_settle_ms: u64,
    pub new_entry_settle_ms: u64,
    /// Fixed backoff before re-attempting a state after a retryable failure
    pub retry_backoff_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            generic_action_delay_ms: 100,
            record_load_wait_ms: 3000,
            focus_timeout_ms: 10_000,
            clipboard_settle_ms: 200,
            navigation_settle_ms: 200,
            reset_settle_ms: 500,
            new_entry_settle_ms: 1500,
            retry_backoff_ms: 1000,
        }
    }
}

impl TimeoutSettings {
    pub fn generic_action_delay(&self) -> Duration {
        Duration::from_millis(self.generic_action_delay_ms)
    }

    pub fn record_load_wait(&self) -> Duration {
        Duration::from_millis(self.record_load_wait_ms)
    }

    pub fn focus_timeout(&self) -> Duration {
        Duration::from_millis(self.focus_timeout_ms)
    }

    pub fn clipboard_settle(&self) -> Duration {
        Duration::from_millis(self.clipboard_settle_ms)
    }

    pub fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    pub fn new_entry_settle(&self) -> Duration {
        Duration::from_millis(self.new_entry_settle_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// When the per-task retry counter is reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryScope {
    /// Only when the task enters `READY`: one budget shared by every state
    #[default]
    PerTask,
    /// Also whenever the machine advances to a new state
    PerState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub scope: RetryScope,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 1,
            scope: RetryScope::PerTask,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSettings {
    /// Keys that move the cursor from the search field to the validation field
    pub nav_to_id_field: String,
    /// Keys that dismiss stray dialogs and return to the main screen
    pub reset: String,
    /// Keys that start a new billing entry
    pub new_entry: String,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            nav_to_id_field: "{TAB}".to_string(),
            reset: "{ESC 3}".to_string(),
            new_entry: "^n".to_string(),
        }
    }
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("data/output/screenshots")
}

impl AutomationConfig {
    /// Minimal profile for `window_title` with every other setting defaulted.
    pub fn new(window_title: impl Into<String>) -> Self {
        Self {
            automation: AutomationSection {
                window_title: window_title.into(),
                title_match: TitleMatch::default(),
                screenshot_dir: default_screenshot_dir(),
            },
            timeouts: TimeoutSettings::default(),
            retries: RetrySettings::default(),
            sequences: SequenceSettings::default(),
        }
    }

    /// Read, parse and validate a profile.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AutomationError> {
        let path = path.as_ref();
        info!("Loading automation profile from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AutomationError::Config(format!("cannot read profile '{}': {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&contents)?;
        info!(
            window_title = %config.automation.window_title,
            max_retries = config.retries.max_retries,
            "Automation profile loaded"
        );
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, AutomationError> {
        let config: AutomationConfig = toml::from_str(contents)
            .map_err(|e| AutomationError::Config(format!("invalid profile: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no task could run with.
    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.automation.window_title.trim().is_empty() {
            return Err(AutomationError::Config(
                "[automation].window_title must not be empty".to_string(),
            ));
        }
        for (name, source) in [
            ("nav_to_id_field", &self.sequences.nav_to_id_field),
            ("reset", &self.sequences.reset),
            ("new_entry", &self.sequences.new_entry),
        ] {
            let sequence = KeySequence::parse(source)
                .map_err(|e| AutomationError::Config(format!("[sequences].{name}: {e}")))?;
            if sequence.is_empty() {
                return Err(AutomationError::Config(format!(
                    "[sequences].{name} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

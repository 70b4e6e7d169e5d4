//! Screen-level steps against the target application's main window.

use crate::config::{AutomationConfig, TimeoutSettings};
use crate::control::ControlSurface;
use crate::errors::AutomationError;
use crate::keys::{Key, KeySequence, Modifiers, NamedKey};
use crate::types::BillingTask;
use tracing::{debug, info, instrument};

/// The four operations the state machine composes into a task.
///
/// Every step receives the control surface; handlers never touch the OS
/// directly.
pub trait WindowHandler {
    /// Dismiss stray dialogs and return to the main screen. Safe to repeat.
    fn ensure_initial_state(&self, surface: &dyn ControlSurface) -> Result<(), AutomationError>;

    /// Search for the task's record and confirm the right one loaded.
    fn find_record(
        &self,
        surface: &dyn ControlSurface,
        task: &BillingTask,
    ) -> Result<(), AutomationError>;

    /// Read the identifier displayed by the loaded record and compare it.
    fn validate_record_loaded(
        &self,
        surface: &dyn ControlSurface,
        task: &BillingTask,
    ) -> Result<(), AutomationError>;

    /// Open a blank billing entry for the loaded record.
    fn initiate_new_entry(&self, surface: &dyn ControlSurface) -> Result<(), AutomationError>;
}

impl<H: WindowHandler + ?Sized> WindowHandler for &H {
    fn ensure_initial_state(&self, surface: &dyn ControlSurface) -> Result<(), AutomationError> {
        (**self).ensure_initial_state(surface)
    }

    fn find_record(
        &self,
        surface: &dyn ControlSurface,
        task: &BillingTask,
    ) -> Result<(), AutomationError> {
        (**self).find_record(surface, task)
    }

    fn validate_record_loaded(
        &self,
        surface: &dyn ControlSurface,
        task: &BillingTask,
    ) -> Result<(), AutomationError> {
        (**self).validate_record_loaded(surface, task)
    }

    fn initiate_new_entry(&self, surface: &dyn ControlSurface) -> Result<(), AutomationError> {
        (**self).initiate_new_entry(surface)
    }
}

/// Handler for the main billing window, driven entirely by configured
/// key sequences and delays.
#[derive(Debug, Clone)]
pub struct MainWindowHandler {
    timeouts: TimeoutSettings,
    reset: KeySequence,
    nav_to_id_field: KeySequence,
    new_entry: KeySequence,
    submit: KeySequence,
}

impl MainWindowHandler {
    pub fn new(config: &AutomationConfig) -> Result<Self, AutomationError> {
        let sequences = &config.sequences;
        Ok(Self {
            timeouts: config.timeouts.clone(),
            reset: KeySequence::parse(&sequences.reset)?,
            nav_to_id_field: KeySequence::parse(&sequences.nav_to_id_field)?,
            new_entry: KeySequence::parse(&sequences.new_entry)?,
            submit: KeySequence::chord(Modifiers::NONE, Key::Named(NamedKey::Enter)),
        })
    }
}

impl WindowHandler for MainWindowHandler {
    #[instrument(skip_all)]
    fn ensure_initial_state(&self, surface: &dyn ControlSurface) -> Result<(), AutomationError> {
        debug!("Resetting target to its main screen with '{}'", self.reset);
        surface.send_keys(&self.reset)?;
        surface.wait(self.timeouts.reset_settle());
        Ok(())
    }

    #[instrument(skip_all, fields(record_id = %task.record_id))]
    fn find_record(
        &self,
        surface: &dyn ControlSurface,
        task: &BillingTask,
    ) -> Result<(), AutomationError> {
        info!("Searching for record");
        // Record ids are data, never notation
        surface.send_keys(&KeySequence::literal(&task.record_id))?;
        surface.wait(self.timeouts.generic_action_delay());
        surface.send_keys(&self.submit)?;
        surface.wait(self.timeouts.record_load_wait());
        self.validate_record_loaded(surface, task)
    }

    #[instrument(skip_all, fields(expected = %task.validation_id))]
    fn validate_record_loaded(
        &self,
        surface: &dyn ControlSurface,
        task: &BillingTask,
    ) -> Result<(), AutomationError> {
        surface.send_keys(&self.nav_to_id_field)?;
        surface.wait(self.timeouts.navigation_settle());

        let displayed = surface.read_clipboard_verified(self.timeouts.clipboard_settle())?;
        let found = displayed.trim();
        let expected = task.validation_id.trim();
        if found != expected {
            return Err(AutomationError::IdentifierMismatch {
                expected_id: expected.to_string(),
                found_id: found.to_string(),
            });
        }
        info!("Record validated");
        Ok(())
    }

    #[instrument(skip_all)]
    fn initiate_new_entry(&self, surface: &dyn ControlSurface) -> Result<(), AutomationError> {
        surface.send_keys(&self.new_entry)?;
        surface.wait(self.timeouts.new_entry_settle());
        Ok(())
    }
}

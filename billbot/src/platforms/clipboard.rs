use crate::AutomationError;
use arboard::Clipboard;
use std::sync::Mutex;
use tracing::debug;

/// Process-wide clipboard access shared by every backend.
///
/// The handle is kept open for the lifetime of the backend: on X11 the
/// clipboard contents we set disappear as soon as the owning handle drops.
pub struct SystemClipboard {
    inner: Mutex<Option<Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn with_clipboard<T>(
        &self,
        op: impl FnOnce(&mut Clipboard) -> Result<T, arboard::Error>,
    ) -> Result<T, AutomationError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AutomationError::Internal("clipboard lock poisoned".to_string()))?;
        if guard.is_none() {
            debug!("Opening system clipboard");
            let clipboard = Clipboard::new().map_err(|e| {
                AutomationError::Clipboard(format!("Failed to initialize clipboard: {e}"))
            })?;
            *guard = Some(clipboard);
        }
        let clipboard = guard
            .as_mut()
            .ok_or_else(|| AutomationError::Internal("clipboard not initialized".to_string()))?;
        op(clipboard).map_err(|e| AutomationError::Clipboard(e.to_string()))
    }

    pub fn get_text(&self) -> Result<String, AutomationError> {
        self.with_clipboard(|cb| match cb.get_text() {
            // An empty clipboard is a valid read, not an I/O failure
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            other => other,
        })
    }

    pub fn set_text(&self, text: &str) -> Result<(), AutomationError> {
        self.with_clipboard(|cb| cb.set_text(text.to_string()))
    }

    pub fn close(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            if guard.take().is_some() {
                debug!("Closed system clipboard");
            }
        }
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

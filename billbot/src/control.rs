//! The control surface: the only layer allowed to touch OS window, keyboard
//! and clipboard state.
//!
//! [`ControlSurface`] is the contract the handler and state machine are
//! written against. [`RemoteControl`] implements it on top of a platform
//! [`DesktopBackend`], adding focus recovery and the sentinel clipboard check.

use crate::config::{AutomationConfig, TitleMatch};
use crate::errors::AutomationError;
use crate::keys::{Key, KeySequence, Modifiers};
use crate::platforms::{self, DesktopBackend, WindowInfo};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const SENTINEL_PREFIX: &str = "__billbot_sentinel_";

pub trait ControlSurface {
    /// Locate exactly one matching top-level window and bring it to the foreground.
    fn find_and_focus_window(&mut self, title: &str) -> Result<(), AutomationError>;

    /// Verify the acquired window still has focus, re-asserting it once if not.
    fn ensure_focus(&self) -> Result<(), AutomationError>;

    /// Inject a key sequence after checking focus.
    fn send_keys(&self, keys: &KeySequence) -> Result<(), AutomationError>;

    /// Copy the focused field and return its text, failing if the copy had no effect.
    fn read_clipboard_verified(&self, settle: Duration) -> Result<String, AutomationError>;

    /// Best-effort PNG capture for diagnostics.
    fn take_screenshot(&self, path: &Path) -> Result<(), AutomationError>;

    /// Blocking pause; the only synchronization available against the target.
    fn wait(&self, duration: Duration);

    /// Release the window handle and OS resources. Safe to call more than once.
    fn shutdown(&mut self);
}

/// Tunables for [`RemoteControl`].
#[derive(Debug, Clone)]
pub struct SurfaceOptions {
    pub title_match: TitleMatch,
    /// How long `find_and_focus_window` polls before giving up
    pub focus_timeout: Duration,
    pub poll_interval: Duration,
    /// Pause after activating a window, before checking it took focus
    pub focus_settle: Duration,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            title_match: TitleMatch::Exact,
            focus_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            focus_settle: Duration::from_millis(500),
        }
    }
}

impl SurfaceOptions {
    pub fn from_config(config: &AutomationConfig) -> Self {
        Self {
            title_match: config.automation.title_match,
            focus_timeout: config.timeouts.focus_timeout(),
            ..Self::default()
        }
    }
}

/// [`ControlSurface`] backed by the current platform.
pub struct RemoteControl {
    backend: Box<dyn DesktopBackend>,
    options: SurfaceOptions,
    window: Option<WindowInfo>,
    released: bool,
}

impl RemoteControl {
    pub fn new(backend: Box<dyn DesktopBackend>, options: SurfaceOptions) -> Self {
        Self {
            backend,
            options,
            window: None,
            released: false,
        }
    }

    /// Build a surface for the platform this binary was compiled for.
    pub fn for_current_platform(options: SurfaceOptions) -> Result<Self, AutomationError> {
        let backend = platforms::create_backend()?;
        info!("Using {} window backend", backend.platform_name());
        Ok(Self::new(backend, options))
    }

    /// The window acquired by `find_and_focus_window`, if any.
    pub fn window(&self) -> Option<&WindowInfo> {
        self.window.as_ref()
    }

    fn is_foreground(&self, window: &WindowInfo) -> Result<bool, AutomationError> {
        Ok(self.backend.foreground_window()? == Some(window.id))
    }

    fn copy_chord() -> KeySequence {
        KeySequence::chord(Modifiers::CTRL, Key::Char('c'))
    }
}

impl ControlSurface for RemoteControl {
    #[instrument(skip(self))]
    fn find_and_focus_window(&mut self, title: &str) -> Result<(), AutomationError> {
        info!(
            "Searching for window '{}' ({:?} match) on {}",
            title,
            self.options.title_match,
            self.backend.platform_name()
        );
        let deadline = Instant::now() + self.options.focus_timeout;

        let window = loop {
            let mut matches = match self.backend.find_windows(title, self.options.title_match) {
                Ok(matches) => matches,
                Err(e) if Instant::now() >= deadline => {
                    return Err(AutomationError::Focus(format!(
                        "could not list windows titled '{title}' within {:?}: {e}",
                        self.options.focus_timeout
                    )));
                }
                Err(e) => {
                    debug!("Window enumeration failed, polling again: {}", e);
                    thread::sleep(self.options.poll_interval);
                    continue;
                }
            };
            match matches.len() {
                1 => break matches.remove(0),
                0 if Instant::now() >= deadline => {
                    return Err(AutomationError::Focus(format!(
                        "no window titled '{title}' found within {:?}",
                        self.options.focus_timeout
                    )));
                }
                0 => thread::sleep(self.options.poll_interval),
                n => {
                    let titles: Vec<&str> = matches.iter().map(|w| w.title.as_str()).collect();
                    return Err(AutomationError::Focus(format!(
                        "window title '{title}' is ambiguous: {n} windows match {titles:?}"
                    )));
                }
            }
        };

        debug!("Found window {:#x} '{}'", window.id, window.title);
        self.backend.activate_window(window.id)?;
        thread::sleep(self.options.focus_settle);
        if !self.is_foreground(&window)? {
            warn!("Window '{}' was found but did not take focus yet", window.title);
        }
        info!("Target window '{}' acquired", window.title);
        self.window = Some(window);
        self.released = false;
        Ok(())
    }

    fn ensure_focus(&self) -> Result<(), AutomationError> {
        let window = self.window.as_ref().ok_or_else(|| {
            AutomationError::Focus(
                "no target window acquired; call find_and_focus_window first".to_string(),
            )
        })?;

        if self.is_foreground(window)? {
            return Ok(());
        }

        warn!(
            "Focus lost from '{}', re-asserting once",
            window.title
        );
        self.backend.activate_window(window.id)?;
        thread::sleep(self.options.focus_settle);

        if self.is_foreground(window)? {
            info!("Focus recovered for '{}'", window.title);
            Ok(())
        } else {
            Err(AutomationError::Focus(format!(
                "window '{}' is not the foreground window after re-asserting focus",
                window.title
            )))
        }
    }

    #[instrument(skip(self, keys), fields(keys = %keys))]
    fn send_keys(&self, keys: &KeySequence) -> Result<(), AutomationError> {
        self.ensure_focus()?;
        debug!("Sending keys");
        self.backend.send_keys(keys)
    }

    #[instrument(skip(self))]
    fn read_clipboard_verified(&self, settle: Duration) -> Result<String, AutomationError> {
        let sentinel = format!("{SENTINEL_PREFIX}{}__", Uuid::new_v4().simple());
        self.backend.set_clipboard_text(&sentinel).map_err(|e| match e {
            AutomationError::Clipboard(_) => e,
            other => AutomationError::Clipboard(format!("could not write sentinel: {other}")),
        })?;

        self.send_keys(&Self::copy_chord())?;
        self.wait(settle);

        let text = self.backend.clipboard_text().map_err(|e| match e {
            AutomationError::Clipboard(_) => e,
            other => AutomationError::Clipboard(format!("could not read clipboard: {other}")),
        })?;

        if text == sentinel {
            return Err(AutomationError::Clipboard(
                "copy action had no observable effect (clipboard still holds the sentinel)"
                    .to_string(),
            ));
        }
        debug!("Clipboard read {} characters", text.chars().count());
        Ok(text)
    }

    #[instrument(skip(self))]
    fn take_screenshot(&self, path: &Path) -> Result<(), AutomationError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.backend.capture_screen(path)?;
        info!("Diagnostic screenshot saved to {}", path.display());
        Ok(())
    }

    fn wait(&self, duration: Duration) {
        debug!("Waiting {:?}", duration);
        thread::sleep(duration);
    }

    fn shutdown(&mut self) {
        if self.released {
            return;
        }
        info!("Releasing control surface");
        self.window = None;
        self.backend.release();
        self.released = true;
    }
}

use crate::config::TitleMatch;
use crate::keys::KeySequence;
use crate::AutomationError;
use std::path::Path;
use tracing::debug;

mod clipboard;
pub use clipboard::SystemClipboard;

/// Opaque, platform-specific handle of a top-level window.
pub type WindowId = u64;

/// A top-level window as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
}

/// The common trait that all platform-specific backends must implement
///
/// This is the fixed capability set the control surface is built on. It carries
/// no retry or verification logic; that lives in [`crate::RemoteControl`].
pub trait DesktopBackend {
    /// Short platform name used in logs
    fn platform_name(&self) -> &'static str;

    /// All visible top-level windows whose title satisfies `rule`
    fn find_windows(
        &self,
        title: &str,
        rule: TitleMatch,
    ) -> Result<Vec<WindowInfo>, AutomationError>;

    /// Restore and raise a window, making it the foreground window
    fn activate_window(&self, window: WindowId) -> Result<(), AutomationError>;

    /// The window currently holding input focus, if any
    fn foreground_window(&self) -> Result<Option<WindowId>, AutomationError>;

    /// Inject keystrokes into whatever window has focus
    fn send_keys(&self, keys: &KeySequence) -> Result<(), AutomationError>;

    fn clipboard_text(&self) -> Result<String, AutomationError>;

    fn set_clipboard_text(&self, text: &str) -> Result<(), AutomationError>;

    /// Save a PNG of the primary monitor to `path`
    fn capture_screen(&self, path: &Path) -> Result<(), AutomationError> {
        capture_primary_monitor(path)
    }

    /// Drop any held OS resources. Called once at shutdown.
    fn release(&self) {}
}

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "windows")]
pub mod windows;

/// Create the appropriate backend for the current platform
pub fn create_backend() -> Result<Box<dyn DesktopBackend>, AutomationError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::WindowsBackend::new()))
    }
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxBackend::new()?))
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        Err(AutomationError::UnsupportedPlatform(format!(
            "window control is not implemented for {}",
            std::env::consts::OS
        )))
    }
}

/// Capture the primary monitor and write it as PNG.
pub fn capture_primary_monitor(path: &Path) -> Result<(), AutomationError> {
    let monitors = xcap::Monitor::all().map_err(|e| {
        AutomationError::PlatformError(format!("Failed to get monitors: {e}"))
    })?;

    let mut primary_monitor: Option<xcap::Monitor> = None;
    for monitor in monitors {
        match monitor.is_primary() {
            Ok(true) => {
                primary_monitor = Some(monitor);
                break;
            }
            Ok(false) => continue,
            Err(e) => {
                return Err(AutomationError::PlatformError(format!(
                    "Error checking monitor primary status: {e}"
                )));
            }
        }
    }
    let primary_monitor = primary_monitor.ok_or_else(|| {
        AutomationError::PlatformError("Could not find primary monitor".to_string())
    })?;

    let capture = primary_monitor.capture_image().map_err(|e| {
        AutomationError::PlatformError(format!("Failed to capture screen: {e}"))
    })?;
    debug!(
        width = capture.width(),
        height = capture.height(),
        "Captured primary monitor"
    );

    capture
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| {
            AutomationError::PlatformError(format!(
                "Failed to write screenshot '{}': {e}",
                path.display()
            ))
        })
}

//! Windows backend: Win32 window enumeration, `SetForegroundWindow` and `SendInput`

use super::{DesktopBackend, SystemClipboard, WindowId, WindowInfo};
use crate::config::TitleMatch;
use crate::keys::{Key, KeySequence, KeyToken, Modifiers, NamedKey};
use crate::AutomationError;
use std::ffi::c_void;
use std::mem::size_of;
use tracing::debug;
use windows::core::BOOL;
use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, VkKeyScanW, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, VIRTUAL_KEY, VK_BACK, VK_CONTROL, VK_DELETE, VK_DOWN,
    VK_END, VK_ESCAPE, VK_F1, VK_HOME, VK_INSERT, VK_LEFT, VK_MENU, VK_NEXT, VK_PRIOR,
    VK_RETURN, VK_RIGHT, VK_SHIFT, VK_SPACE, VK_TAB, VK_UP,
};
use windows::Win32::UI::WindowsAndMessaging::{
    BringWindowToTop, EnumWindows, GetForegroundWindow, GetWindowTextLengthW, GetWindowTextW,
    IsIconic, IsWindow, IsWindowVisible, SetForegroundWindow, ShowWindow, SW_RESTORE,
};

pub struct WindowsBackend {
    clipboard: SystemClipboard,
}

impl WindowsBackend {
    pub fn new() -> Self {
        Self {
            clipboard: SystemClipboard::new(),
        }
    }
}

impl Default for WindowsBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn hwnd_from_id(window: WindowId) -> HWND {
    HWND(window as usize as *mut c_void)
}

fn id_from_hwnd(hwnd: HWND) -> WindowId {
    hwnd.0 as usize as WindowId
}

// Window enumeration callback collecting visible titled windows
unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let found = &mut *(lparam.0 as *mut Vec<WindowInfo>);

    if IsWindowVisible(hwnd).as_bool() {
        let len = GetWindowTextLengthW(hwnd);
        if len > 0 {
            let mut buffer = vec![0u16; len as usize + 1];
            let copied = GetWindowTextW(hwnd, &mut buffer);
            if copied > 0 {
                found.push(WindowInfo {
                    id: id_from_hwnd(hwnd),
                    title: String::from_utf16_lossy(&buffer[..copied as usize]),
                });
            }
        }
    }

    BOOL::from(true) // Continue enumeration
}

fn key_input(vk: VIRTUAL_KEY, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn named_vk(key: NamedKey) -> VIRTUAL_KEY {
    match key {
        NamedKey::Enter => VK_RETURN,
        NamedKey::Escape => VK_ESCAPE,
        NamedKey::Tab => VK_TAB,
        NamedKey::Backspace => VK_BACK,
        NamedKey::Delete => VK_DELETE,
        NamedKey::Insert => VK_INSERT,
        NamedKey::Home => VK_HOME,
        NamedKey::End => VK_END,
        NamedKey::Up => VK_UP,
        NamedKey::Down => VK_DOWN,
        NamedKey::Left => VK_LEFT,
        NamedKey::Right => VK_RIGHT,
        NamedKey::PageUp => VK_PRIOR,
        NamedKey::PageDown => VK_NEXT,
        NamedKey::Space => VK_SPACE,
        NamedKey::F(n) => VIRTUAL_KEY(VK_F1.0 + u16::from(n) - 1),
    }
}

/// Split a `VkKeyScanW` result into the virtual key (low byte) and the
/// shift state the layout needs to produce the character (high byte).
fn split_vk_scan(scan: i16) -> (u16, Modifiers) {
    let bits = scan as u16;
    let state = bits >> 8;
    (
        bits & 0xff,
        Modifiers {
            ctrl: state & 0x2 != 0,
            shift: state & 0x1 != 0,
            alt: state & 0x4 != 0,
        },
    )
}

fn char_vk(c: char) -> Result<(VIRTUAL_KEY, Modifiers), AutomationError> {
    let mut units = [0u16; 2];
    let encoded = c.encode_utf16(&mut units);
    if encoded.len() != 1 {
        return Err(AutomationError::PlatformError(format!(
            "character '{c}' cannot be used in a key chord"
        )));
    }
    let scan = unsafe { VkKeyScanW(encoded[0]) };
    if scan == -1 {
        return Err(AutomationError::PlatformError(format!(
            "character '{c}' has no virtual key on the current layout"
        )));
    }
    let (vk, layout_mods) = split_vk_scan(scan);
    Ok((VIRTUAL_KEY(vk), layout_mods))
}

fn modifier_vks(modifiers: Modifiers) -> Vec<VIRTUAL_KEY> {
    let mut vks = Vec::new();
    if modifiers.ctrl {
        vks.push(VK_CONTROL);
    }
    if modifiers.shift {
        vks.push(VK_SHIFT);
    }
    if modifiers.alt {
        vks.push(VK_MENU);
    }
    vks
}

fn inputs_for(keys: &KeySequence) -> Result<Vec<INPUT>, AutomationError> {
    let mut inputs = Vec::new();
    for token in keys.tokens() {
        match token {
            KeyToken::Text(text) => {
                for unit in text.encode_utf16() {
                    inputs.push(key_input(VIRTUAL_KEY(0), unit, KEYEVENTF_UNICODE));
                    inputs.push(key_input(
                        VIRTUAL_KEY(0),
                        unit,
                        KEYEVENTF_UNICODE | KEYEVENTF_KEYUP,
                    ));
                }
            }
            KeyToken::Key {
                key,
                modifiers,
                repeat,
            } => {
                let (vk, layout_mods) = match key {
                    Key::Named(named) => (named_vk(*named), Modifiers::NONE),
                    Key::Char(c) => char_vk(*c)?,
                };
                let mods = modifier_vks(Modifiers {
                    ctrl: modifiers.ctrl || layout_mods.ctrl,
                    shift: modifiers.shift || layout_mods.shift,
                    alt: modifiers.alt || layout_mods.alt,
                });
                for _ in 0..*repeat {
                    for m in &mods {
                        inputs.push(key_input(*m, 0, KEYBD_EVENT_FLAGS(0)));
                    }
                    inputs.push(key_input(vk, 0, KEYBD_EVENT_FLAGS(0)));
                    inputs.push(key_input(vk, 0, KEYEVENTF_KEYUP));
                    for m in mods.iter().rev() {
                        inputs.push(key_input(*m, 0, KEYEVENTF_KEYUP));
                    }
                }
            }
        }
    }
    Ok(inputs)
}

impl DesktopBackend for WindowsBackend {
    fn platform_name(&self) -> &'static str {
        "windows"
    }

    fn find_windows(
        &self,
        title: &str,
        rule: TitleMatch,
    ) -> Result<Vec<WindowInfo>, AutomationError> {
        let mut all: Vec<WindowInfo> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_window),
                LPARAM(&mut all as *mut Vec<WindowInfo> as isize),
            )
            .map_err(|e| AutomationError::PlatformError(format!("EnumWindows failed: {e}")))?;
        }
        debug!("Enumerated {} visible top-level windows", all.len());
        Ok(all
            .into_iter()
            .filter(|w| rule.matches(title, &w.title))
            .collect())
    }

    fn activate_window(&self, window: WindowId) -> Result<(), AutomationError> {
        let hwnd = hwnd_from_id(window);
        unsafe {
            if !IsWindow(Some(hwnd)).as_bool() {
                return Err(AutomationError::Focus(format!(
                    "window {window:#x} no longer exists"
                )));
            }

            // Check if the window is minimized and restore it if needed
            if IsIconic(hwnd).as_bool() {
                debug!("Window is minimized, restoring it");
                let _ = ShowWindow(hwnd, SW_RESTORE);
            }

            // Bring the window to the top of the Z order
            let _ = BringWindowToTop(hwnd);

            if !SetForegroundWindow(hwnd).as_bool() {
                debug!("SetForegroundWindow refused for {window:#x}");
            }
        }
        Ok(())
    }

    fn foreground_window(&self) -> Result<Option<WindowId>, AutomationError> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.0.is_null() {
            Ok(None)
        } else {
            Ok(Some(id_from_hwnd(hwnd)))
        }
    }

    fn send_keys(&self, keys: &KeySequence) -> Result<(), AutomationError> {
        let inputs = inputs_for(keys)?;
        if inputs.is_empty() {
            return Ok(());
        }
        let sent = unsafe { SendInput(&inputs, size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            return Err(AutomationError::PlatformError(format!(
                "SendInput injected {sent} of {} events for '{keys}'",
                inputs.len()
            )));
        }
        Ok(())
    }

    fn clipboard_text(&self) -> Result<String, AutomationError> {
        self.clipboard.get_text()
    }

    fn set_clipboard_text(&self, text: &str) -> Result<(), AutomationError> {
        self.clipboard.set_text(text)
    }

    fn release(&self) {
        self.clipboard.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_scan_high_byte_becomes_modifiers() {
        // '+' on a US layout: VK_OEM_PLUS with shift
        assert_eq!(
            split_vk_scan(0x01bb),
            (
                0xbb,
                Modifiers {
                    ctrl: false,
                    shift: true,
                    alt: false
                }
            )
        );
        // 'n' needs no shift state
        assert_eq!(split_vk_scan(0x004e), (0x4e, Modifiers::NONE));
        // AltGr characters report ctrl+alt
        assert_eq!(
            split_vk_scan(0x0651),
            (
                0x51,
                Modifiers {
                    ctrl: true,
                    shift: false,
                    alt: true
                }
            )
        );
    }
}

//! Linux backend driving X11 through the `xdotool` command line tool

use super::{DesktopBackend, SystemClipboard, WindowId, WindowInfo};
use crate::config::TitleMatch;
use crate::keys::{Key, KeySequence, KeyToken, Modifiers};
use crate::AutomationError;
use std::process::Command;
use tracing::debug;

const XDOTOOL: &str = "xdotool";
// Per-character delay for `xdotool type`, in milliseconds
const TYPE_DELAY_MS: &str = "12";

pub struct LinuxBackend {
    clipboard: SystemClipboard,
}

impl LinuxBackend {
    pub fn new() -> Result<Self, AutomationError> {
        // Fail at startup rather than on the first keystroke
        run_xdotool(&["version"])?;
        Ok(Self {
            clipboard: SystemClipboard::new(),
        })
    }
}

struct XdotoolOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

fn exec_xdotool(args: &[&str]) -> Result<XdotoolOutput, AutomationError> {
    debug!("xdotool {}", args.join(" "));
    let output = Command::new(XDOTOOL).args(args).output().map_err(|e| {
        AutomationError::PlatformError(format!(
            "Failed to run '{XDOTOOL}': {e}. Make sure xdotool is installed"
        ))
    })?;
    Ok(XdotoolOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

fn run_xdotool(args: &[&str]) -> Result<String, AutomationError> {
    let output = exec_xdotool(args)?;
    if !output.success {
        return Err(AutomationError::PlatformError(format!(
            "xdotool {} failed: {}",
            args.first().unwrap_or(&""),
            output.stderr.trim()
        )));
    }
    Ok(output.stdout)
}

/// Escape a literal for the POSIX extended regex `xdotool search` expects.
fn regex_escape(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if "\\.^$|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn parse_window_id(raw: &str) -> Option<WindowId> {
    raw.trim().parse::<WindowId>().ok()
}

fn chord_name(key: &Key, modifiers: Modifiers) -> String {
    let mut parts: Vec<String> = Vec::new();
    if modifiers.ctrl {
        parts.push("ctrl".to_string());
    }
    if modifiers.shift {
        parts.push("shift".to_string());
    }
    if modifiers.alt {
        parts.push("alt".to_string());
    }
    parts.push(match key {
        Key::Named(named) => named.xdotool_name(),
        Key::Char(c) => keysym_name(*c),
    });
    parts.join("+")
}

/// X keysym for a character that xdotool cannot take literally inside a chord.
fn keysym_name(c: char) -> String {
    let name = match c {
        '+' => "plus",
        ' ' => "space",
        '-' => "minus",
        '=' => "equal",
        ',' => "comma",
        '.' => "period",
        '/' => "slash",
        '\\' => "backslash",
        ';' => "semicolon",
        ':' => "colon",
        '\'' => "apostrophe",
        '"' => "quotedbl",
        '[' => "bracketleft",
        ']' => "bracketright",
        '{' => "braceleft",
        '}' => "braceright",
        '(' => "parenleft",
        ')' => "parenright",
        '`' => "grave",
        '~' => "asciitilde",
        '%' => "percent",
        '^' => "asciicircum",
        '&' => "ampersand",
        '*' => "asterisk",
        '#' => "numbersign",
        '@' => "at",
        '!' => "exclam",
        '?' => "question",
        '<' => "less",
        '>' => "greater",
        '|' => "bar",
        '$' => "dollar",
        '_' => "underscore",
        _ => return c.to_string(),
    };
    name.to_string()
}

/// Resolve window names and keep the ones matching `title`. A window that
/// vanishes between `search` and `getwindowname` is skipped.
fn named_matches<I, F>(ids: I, title: &str, rule: TitleMatch, name_of: F) -> Vec<WindowInfo>
where
    I: IntoIterator<Item = WindowId>,
    F: Fn(WindowId) -> Result<String, AutomationError>,
{
    let mut found = Vec::new();
    for id in ids {
        let name = match name_of(id) {
            Ok(name) => name.trim_end_matches('\n').to_string(),
            Err(e) => {
                debug!("Skipping window {id}: {e}");
                continue;
            }
        };
        if rule.matches(title, &name) {
            found.push(WindowInfo { id, title: name });
        }
    }
    found
}

impl DesktopBackend for LinuxBackend {
    fn platform_name(&self) -> &'static str {
        "linux"
    }

    fn find_windows(
        &self,
        title: &str,
        rule: TitleMatch,
    ) -> Result<Vec<WindowInfo>, AutomationError> {
        let pattern = regex_escape(title);
        // `search` exits non-zero when nothing matches; that is an empty result
        let output = exec_xdotool(&["search", "--onlyvisible", "--name", &pattern])?;
        if !output.success {
            debug!("xdotool search matched no window for '{title}'");
            return Ok(Vec::new());
        }

        let ids = output.stdout.lines().filter_map(parse_window_id);
        Ok(named_matches(ids, title, rule, |id| {
            run_xdotool(&["getwindowname", &id.to_string()])
        }))
    }

    fn activate_window(&self, window: WindowId) -> Result<(), AutomationError> {
        let id_arg = window.to_string();
        run_xdotool(&["windowactivate", "--sync", &id_arg]).map_err(|e| {
            AutomationError::Focus(format!("could not activate window {window}: {e}"))
        })?;
        Ok(())
    }

    fn foreground_window(&self) -> Result<Option<WindowId>, AutomationError> {
        let output = exec_xdotool(&["getactivewindow"])?;
        if !output.success {
            return Ok(None);
        }
        Ok(parse_window_id(&output.stdout))
    }

    fn send_keys(&self, keys: &KeySequence) -> Result<(), AutomationError> {
        for token in keys.tokens() {
            match token {
                KeyToken::Text(text) => {
                    run_xdotool(&[
                        "type",
                        "--clearmodifiers",
                        "--delay",
                        TYPE_DELAY_MS,
                        "--",
                        text,
                    ])?;
                }
                KeyToken::Key {
                    key,
                    modifiers,
                    repeat,
                } => {
                    let chord = chord_name(key, *modifiers);
                    let repeat_arg = repeat.to_string();
                    run_xdotool(&["key", "--clearmodifiers", "--repeat", &repeat_arg, &chord])?;
                }
            }
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

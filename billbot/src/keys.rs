//! Key-sequence notation
//!
//! A small pywinauto-compatible notation for describing keystrokes:
//!
//! ```text
//! sequence  := item*
//! item      := modifier* atom
//! modifier  := '^' (Ctrl) | '+' (Shift) | '%' (Alt)
//! atom      := '{' NAME [ ' ' COUNT ] '}' | '{{}' | '{}}' | char
//! ```
//!
//! `"{ESC 3}"` presses Escape three times, `"^n"` presses Ctrl+N and
//! `"ID-123{ENTER}"` types a literal run followed by Enter.

use crate::errors::AutomationError;
use std::fmt;
use std::str::FromStr;

/// Keys that have a name in the notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Escape,
    Tab,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Space,
    /// Function keys F1..=F12
    F(u8),
}

impl NamedKey {
    fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        let key = match upper.as_str() {
            "ENTER" | "RETURN" => NamedKey::Enter,
            "ESC" | "ESCAPE" => NamedKey::Escape,
            "TAB" => NamedKey::Tab,
            "BACKSPACE" | "BS" | "BKSP" => NamedKey::Backspace,
            "DELETE" | "DEL" => NamedKey::Delete,
            "INSERT" | "INS" => NamedKey::Insert,
            "HOME" => NamedKey::Home,
            "END" => NamedKey::End,
            "UP" => NamedKey::Up,
            "DOWN" => NamedKey::Down,
            "LEFT" => NamedKey::Left,
            "RIGHT" => NamedKey::Right,
            "PGUP" | "PAGEUP" => NamedKey::PageUp,
            "PGDN" | "PAGEDOWN" => NamedKey::PageDown,
            "SPACE" => NamedKey::Space,
            _ => {
                let n = upper.strip_prefix('F')?.parse::<u8>().ok()?;
                if (1..=12).contains(&n) {
                    NamedKey::F(n)
                } else {
                    return None;
                }
            }
        };
        Some(key)
    }

    fn notation_name(&self) -> String {
        match self {
            NamedKey::Enter => "ENTER".to_string(),
            NamedKey::Escape => "ESC".to_string(),
            NamedKey::Tab => "TAB".to_string(),
            NamedKey::Backspace => "BACKSPACE".to_string(),
            NamedKey::Delete => "DELETE".to_string(),
            NamedKey::Insert => "INSERT".to_string(),
            NamedKey::Home => "HOME".to_string(),
            NamedKey::End => "END".to_string(),
            NamedKey::Up => "UP".to_string(),
            NamedKey::Down => "DOWN".to_string(),
            NamedKey::Left => "LEFT".to_string(),
            NamedKey::Right => "RIGHT".to_string(),
            NamedKey::PageUp => "PGUP".to_string(),
            NamedKey::PageDown => "PGDN".to_string(),
            NamedKey::Space => "SPACE".to_string(),
            NamedKey::F(n) => format!("F{n}"),
        }
    }

    /// Name understood by `xdotool key`.
    pub fn xdotool_name(&self) -> String {
        match self {
            NamedKey::Enter => "Return".to_string(),
            NamedKey::Escape => "Escape".to_string(),
            NamedKey::Tab => "Tab".to_string(),
            NamedKey::Backspace => "BackSpace".to_string(),
            NamedKey::Delete => "Delete".to_string(),
            NamedKey::Insert => "Insert".to_string(),
            NamedKey::Home => "Home".to_string(),
            NamedKey::End => "End".to_string(),
            NamedKey::Up => "Up".to_string(),
            NamedKey::Down => "Down".to_string(),
            NamedKey::Left => "Left".to_string(),
            NamedKey::Right => "Right".to_string(),
            NamedKey::PageUp => "Prior".to_string(),
            NamedKey::PageDown => "Next".to_string(),
            NamedKey::Space => "space".to_string(),
            NamedKey::F(n) => format!("F{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Named(NamedKey),
    Char(char),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        shift: false,
        alt: false,
    };

    pub const CTRL: Modifiers = Modifiers {
        ctrl: true,
        shift: false,
        alt: false,
    };

    pub fn is_empty(&self) -> bool {
        !(self.ctrl || self.shift || self.alt)
    }
}

/// One parsed unit of a key sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyToken {
    /// A run of literal characters typed as-is
    Text(String),
    /// A single key, optionally chorded with modifiers, pressed `repeat` times
    Key {
        key: Key,
        modifiers: Modifiers,
        repeat: u32,
    },
}

/// A parsed key sequence, keeping its source text for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySequence {
    source: String,
    tokens: Vec<KeyToken>,
}

impl KeySequence {
    /// Parse the notation described in the module docs.
    pub fn parse(source: &str) -> Result<Self, AutomationError> {
        let invalid = |reason: String| AutomationError::InvalidKeySequence {
            sequence: source.to_string(),
            reason,
        };

        let chars: Vec<char> = source.chars().collect();
        let mut tokens: Vec<KeyToken> = Vec::new();
        let mut modifiers = Modifiers::NONE;
        let mut i = 0;

        while i < chars.len() {
            let (key, repeat) = match chars[i] {
                '^' => {
                    modifiers.ctrl = true;
                    i += 1;
                    continue;
                }
                '+' => {
                    modifiers.shift = true;
                    i += 1;
                    continue;
                }
                '%' => {
                    modifiers.alt = true;
                    i += 1;
                    continue;
                }
                '{' => {
                    // Escaped braces: "{{}" and "{}}"
                    if i + 2 < chars.len()
                        && (chars[i + 1] == '{' || chars[i + 1] == '}')
                        && chars[i + 2] == '}'
                    {
                        let c = chars[i + 1];
                        i += 3;
                        (Key::Char(c), 1)
                    } else {
                        let close = chars[i + 1..]
                            .iter()
                            .position(|&c| c == '}')
                            .map(|offset| i + 1 + offset)
                            .ok_or_else(|| invalid(format!("unterminated '{{' at position {i}")))?;
                        let body: String = chars[i + 1..close].iter().collect();
                        i = close + 1;
                        parse_brace_body(&body).map_err(invalid)?
                    }
                }
                '}' => return Err(invalid(format!("unmatched '}}' at position {i}"))),
                c => {
                    i += 1;
                    (Key::Char(c), 1)
                }
            };

            push_atom(&mut tokens, key, modifiers, repeat);
            modifiers = Modifiers::NONE;
        }

        if !modifiers.is_empty() {
            return Err(invalid("modifier is not followed by a key".to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    /// A sequence that types `text` verbatim, with no notation interpreted.
    pub fn literal(text: &str) -> Self {
        let tokens = if text.is_empty() {
            Vec::new()
        } else {
            vec![KeyToken::Text(text.to_string())]
        };
        Self {
            source: text.to_string(),
            tokens,
        }
    }

    /// A single chord, e.g. Ctrl+C.
    pub fn chord(modifiers: Modifiers, key: Key) -> Self {
        let source = format!("{}", DisplayChord(modifiers, key));
        Self {
            source,
            tokens: vec![KeyToken::Key {
                key,
                modifiers,
                repeat: 1,
            }],
        }
    }

    pub fn tokens(&self) -> &[KeyToken] {
        &self.tokens
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromStr for KeySequence {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeySequence::parse(s)
    }
}

impl fmt::Display for KeySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

struct DisplayChord(Modifiers, Key);

impl fmt::Display for DisplayChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let DisplayChord(m, key) = self;
        if m.ctrl {
            write!(f, "^")?;
        }
        if m.shift {
            write!(f, "+")?;
        }
        if m.alt {
            write!(f, "%")?;
        }
        match key {
            Key::Char(c) => write!(f, "{c}"),
            Key::Named(named) => write!(f, "{{{}}}", named.notation_name()),
        }
    }
}

fn parse_brace_body(body: &str) -> Result<(Key, u32), String> {
    let mut parts = body.split_whitespace();
    let name = parts.next().ok_or_else(|| "empty key name '{}'".to_string())?;
    let repeat = match parts.next() {
        Some(count) => match count.parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => return Err(format!("invalid repeat count '{count}' for key '{name}'")),
        },
        None => 1,
    };
    if parts.next().is_some() {
        return Err(format!("unexpected trailing input in '{{{body}}}'"));
    }

    let mut name_chars = name.chars();
    let key = match (name_chars.next(), name_chars.next()) {
        (Some(c), None) => Key::Char(c),
        _ => Key::Named(
            NamedKey::from_name(name).ok_or_else(|| format!("unknown key name '{name}'"))?,
        ),
    };
    Ok((key, repeat))
}

fn push_atom(tokens: &mut Vec<KeyToken>, key: Key, modifiers: Modifiers, repeat: u32) {
    if let (Key::Char(c), true) = (key, modifiers.is_empty()) {
        let run: String = std::iter::repeat(c).take(repeat as usize).collect();
        if let Some(KeyToken::Text(existing)) = tokens.last_mut() {
            existing.push_str(&run);
        } else {
            tokens.push(KeyToken::Text(run));
        }
        return;
    }
    tokens.push(KeyToken::Key {
        key,
        modifiers,
        repeat,
    });
}

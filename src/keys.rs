//! Byte-by-byte state machine that turns raw stdin bytes into [`KeyEvent`]s.
//!
//! Deliberately independent of `crossterm::event`'s own parser: the spec
//! calls for a hand-rolled reader so paste-burst timing (owned by
//! [`crate::input`]) can observe raw inter-byte arrival without going
//! through an event abstraction that already coalesces keystrokes.

/// Observable output of the parser. One byte sequence always yields zero or
/// one event except for the "no transition" reset case, which yields the
/// synthesized `Escape` plus whatever the re-queued byte produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Interrupt,
    Eof,
    Backspace,
    Tab,
    Enter,
    Suspend,
    Escape,
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    Delete,
    PageUp,
    PageDown,
    MouseWheelUp,
    MouseWheelDown,
    /// Ctrl-U: clear the line.
    ClearLine,
    /// Ctrl-K: delete to end of line.
    DeleteToEnd,
    Char(char),
}

#[derive(Debug, Clone)]
enum State {
    Ground,
    Esc,
    Ss3,
    /// Just saw `ESC [`; no bytes accumulated yet. Needed to special-case
    /// the legacy X10 mouse report (`ESC [ M <btn> <x> <y>`), whose three
    /// payload bytes are raw and must not be run through the general
    /// parameter/final-byte scanner.
    CsiStart,
    Csi(Vec<u8>),
    LegacyMouse(Vec<u8>),
    Utf8 { buf: Vec<u8>, need: usize },
}

/// A byte-driven escape-sequence parser. Not thread-safe; owned by a single
/// input-reading task.
pub struct KeyParser {
    state: State,
}

impl Default for KeyParser {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyParser {
    pub fn new() -> Self {
        Self { state: State::Ground }
    }

    /// True while the parser is mid-sequence and a caller with access to a
    /// wall clock should arm the "bare ESC" timeout.
    pub fn is_pending(&self) -> bool {
        !matches!(self.state, State::Ground)
    }

    /// Called when no further byte arrives within the escape timeout while
    /// [`KeyParser::is_pending`] is true. Resets to ground and emits a bare
    /// `Escape` if the pending state was exactly a lone `ESC`.
    pub fn on_timeout(&mut self) -> Vec<KeyEvent> {
        match std::mem::replace(&mut self.state, State::Ground) {
            State::Esc => vec![KeyEvent::Escape],
            _ => vec![],
        }
    }

    /// Feed one raw byte. May produce zero, one, or (on a reset-and-requeue)
    /// two events.
    pub fn feed(&mut self, byte: u8) -> Vec<KeyEvent> {
        match std::mem::replace(&mut self.state, State::Ground) {
            State::Ground => self.feed_ground(byte),
            State::Esc => self.feed_esc(byte),
            State::Ss3 => self.feed_ss3(byte),
            State::CsiStart => self.feed_csi_start(byte),
            State::Csi(params) => self.feed_csi(params, byte),
            State::LegacyMouse(buf) => self.feed_legacy_mouse(buf, byte),
            State::Utf8 { buf, need } => self.feed_utf8(buf, need, byte),
        }
    }

    fn feed_ground(&mut self, byte: u8) -> Vec<KeyEvent> {
        match byte {
            0x03 => vec![KeyEvent::Interrupt],
            0x04 => vec![KeyEvent::Eof],
            0x08 | 0x7F => vec![KeyEvent::Backspace],
            0x09 => vec![KeyEvent::Tab],
            0x0D | 0x0A => vec![KeyEvent::Enter],
            0x1A => vec![KeyEvent::Suspend],
            0x01 => vec![KeyEvent::Home], // Ctrl-A
            0x05 => vec![KeyEvent::End],  // Ctrl-E
            0x15 => vec![KeyEvent::ClearLine], // Ctrl-U
            0x0B => vec![KeyEvent::DeleteToEnd], // Ctrl-K
            0x1B => {
                self.state = State::Esc;
                vec![]
            }
            0x20..=0x7E => vec![KeyEvent::Char(byte as char)],
            0xC0..=0xDF => {
                self.state = State::Utf8 { buf: vec![byte], need: 1 };
                vec![]
            }
            0xE0..=0xEF => {
                self.state = State::Utf8 { buf: vec![byte], need: 2 };
                vec![]
            }
            0xF0..=0xF7 => {
                self.state = State::Utf8 { buf: vec![byte], need: 3 };
                vec![]
            }
            _ => vec![],
        }
    }

    fn feed_esc(&mut self, byte: u8) -> Vec<KeyEvent> {
        match byte {
            b'[' => {
                self.state = State::CsiStart;
                vec![]
            }
            b'O' => {
                self.state = State::Ss3;
                vec![]
            }
            _ => {
                // No transition out of Esc for this byte: reset, emit the
                // synthesized Escape, and re-queue the byte in Ground.
                let mut events = vec![KeyEvent::Escape];
                events.extend(self.feed_ground(byte));
                events
            }
        }
    }

    fn feed_ss3(&mut self, byte: u8) -> Vec<KeyEvent> {
        match byte {
            b'H' => vec![KeyEvent::Home],
            b'F' => vec![KeyEvent::End],
            _ => {
                let mut events = vec![KeyEvent::Escape];
                events.extend(self.feed_ground(byte));
                events
            }
        }
    }

    fn feed_csi_start(&mut self, byte: u8) -> Vec<KeyEvent> {
        if byte == b'M' {
            self.state = State::LegacyMouse(Vec::with_capacity(3));
            vec![]
        } else {
            self.feed_csi(Vec::new(), byte)
        }
    }

    fn feed_csi(&mut self, mut params: Vec<u8>, byte: u8) -> Vec<KeyEvent> {
        match byte {
            0x20..=0x3F => {
                params.push(byte);
                self.state = State::Csi(params);
                vec![]
            }
            0x40..=0x7E => finalize_csi(&params, byte),
            _ => {
                // Invalid byte mid-sequence: reset and re-queue in Ground.
                let mut events = vec![KeyEvent::Escape];
                events.extend(self.feed_ground(byte));
                events
            }
        }
    }

    fn feed_legacy_mouse(&mut self, mut buf: Vec<u8>, byte: u8) -> Vec<KeyEvent> {
        buf.push(byte);
        if buf.len() < 3 {
            self.state = State::LegacyMouse(buf);
            return vec![];
        }
        let button = buf[0].wrapping_sub(32);
        decode_mouse_button(button).into_iter().collect()
    }

    fn feed_utf8(&mut self, mut buf: Vec<u8>, need: usize, byte: u8) -> Vec<KeyEvent> {
        if byte & 0xC0 != 0x80 {
            // Not a continuation byte: abandon the partial sequence and
            // reprocess this byte from Ground.
            return self.feed_ground(byte);
        }
        buf.push(byte);
        let remaining = need - 1;
        if remaining == 0 {
            match std::str::from_utf8(&buf) {
                Ok(s) => s.chars().next().map(KeyEvent::Char).into_iter().collect(),
                Err(_) => vec![],
            }
        } else {
            self.state = State::Utf8 { buf, need: remaining };
            vec![]
        }
    }
}

fn finalize_csi(params: &[u8], final_byte: u8) -> Vec<KeyEvent> {
    let text = String::from_utf8_lossy(params);
    match (text.as_ref(), final_byte) {
        ("", b'A') => vec![KeyEvent::Up],
        ("", b'B') => vec![KeyEvent::Down],
        ("", b'C') => vec![KeyEvent::Right],
        ("", b'D') => vec![KeyEvent::Left],
        ("", b'H') => vec![KeyEvent::Home],
        ("", b'F') => vec![KeyEvent::End],
        ("3", b'~') => vec![KeyEvent::Delete],
        ("5", b'~') => vec![KeyEvent::PageUp],
        ("6", b'~') => vec![KeyEvent::PageDown],
        (sgr, b'M') | (sgr, b'm') if sgr.starts_with('<') => {
            parse_sgr_mouse(&sgr[1..]).into_iter().collect()
        }
        _ => vec![],
    }
}

fn parse_sgr_mouse(body: &str) -> Option<KeyEvent> {
    let mut parts = body.split(';');
    let button: u8 = parts.next()?.parse().ok()?;
    decode_mouse_button(button)
}

fn decode_mouse_button(button: u8) -> Option<KeyEvent> {
    match button {
        64 => Some(KeyEvent::MouseWheelUp),
        65 => Some(KeyEvent::MouseWheelDown),
        _ => None,
    }
}

//! The only component permitted to write bytes to the OS terminal.
//!
//! [`TerminalSink`] is the narrow capability every other component writes
//! through (directly, or via the [`crate::coordinator::UiCoordinator`]'s
//! published output lock). [`CrosstermSink`] is the production
//! implementation; [`RecordingSink`] is an in-memory stand-in used by tests
//! that need to assert on the exact bytes and cursor positions emitted
//! (spec properties 1 and 2).

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// 1-based, inclusive `(top, bottom)` scroll margin pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRegion {
    pub top: u16,
    pub bottom: u16,
}

/// Capability every component that mutates the shared terminal depends on.
///
/// All methods are synchronous and expected to be cheap; callers that need
/// atomicity across several of them (e.g. move-then-write) take the
/// coordinator's output lock first.
pub trait TerminalSink: Send {
    fn size(&self) -> io::Result<(u16, u16)>;
    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()>;
    fn is_raw_mode(&self) -> bool;
    fn move_cursor(&mut self, x: u16, y: u16) -> io::Result<()>;
    fn save_cursor(&mut self) -> io::Result<()>;
    fn restore_cursor(&mut self) -> io::Result<()>;
    fn hide_cursor(&mut self) -> io::Result<()>;
    fn show_cursor(&mut self) -> io::Result<()>;
    fn clear_screen(&mut self) -> io::Result<()>;
    fn clear_scrollback(&mut self) -> io::Result<()>;
    fn clear_line(&mut self) -> io::Result<()>;
    fn clear_to_eol(&mut self) -> io::Result<()>;
    fn clear_to_eos(&mut self) -> io::Result<()>;
    fn set_scroll_region(&mut self, region: ScrollRegion) -> io::Result<()>;
    fn reset_scroll_region(&mut self) -> io::Result<()>;
    fn enter_alt_screen(&mut self) -> io::Result<()>;
    fn exit_alt_screen(&mut self) -> io::Result<()>;
    /// Write raw bytes. A lone `\n` is normalized to `\r\n` while in raw
    /// mode; callers that already emit `\r\n` must not pass bytes through
    /// this normalization twice (pass pre-normalized bytes through
    /// [`TerminalSink::write_raw`] instead).
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Write bytes with no `\n` → `\r\n` normalization.
    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

fn normalize_newlines(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        if b == b'\n' {
            out.push(b'\r');
        }
        out.push(b);
    }
    out
}

/// Scoped raw-mode acquisition. Restores the terminal's prior mode on drop
/// so every exit path — normal shutdown, signal, panic unwind — releases
/// the resource. Safe to construct more than once (re-entrant acquisition
/// from a signal handler that re-enters the scope to force a restore is a
/// supported use case).
pub struct RawModeGuard<'a> {
    sink: &'a Mutex<dyn TerminalSink>,
    was_raw: bool,
    active: AtomicBool,
}

impl<'a> RawModeGuard<'a> {
    pub fn acquire(sink: &'a Mutex<dyn TerminalSink>) -> Result<Self> {
        let was_raw = {
            let guard = sink.lock().map_err(|_| Error::TerminalUnavailable)?;
            guard.is_raw_mode()
        };
        {
            let mut guard = sink.lock().map_err(|_| Error::TerminalUnavailable)?;
            guard.set_raw_mode(true).map_err(Error::RawModeFailed)?;
        }
        Ok(Self {
            sink,
            was_raw,
            active: AtomicBool::new(true),
        })
    }

    /// Idempotent; safe to call from a signal handler ahead of `Drop`.
    pub fn restore(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Ok(mut guard) = self.sink.lock() {
                let _ = guard.set_raw_mode(self.was_raw);
            }
        }
    }
}

impl Drop for RawModeGuard<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Crossterm-backed production sink. Writes go straight to `stdout`.
pub struct CrosstermSink {
    out: io::Stdout,
    raw_mode: bool,
}

impl Default for CrosstermSink {
    fn default() -> Self {
        Self {
            out: io::stdout(),
            raw_mode: false,
        }
    }
}

impl CrosstermSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_retrying(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut remaining = bytes;
        while !remaining.is_empty() {
            match self.out.write(remaining) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => remaining = &remaining[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl TerminalSink for CrosstermSink {
    fn size(&self) -> io::Result<(u16, u16)> {
        crossterm::terminal::size()
    }

    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        if enabled {
            crossterm::terminal::enable_raw_mode()?;
        } else {
            crossterm::terminal::disable_raw_mode()?;
        }
        self.raw_mode = enabled;
        Ok(())
    }

    fn is_raw_mode(&self) -> bool {
        self.raw_mode
    }

    fn move_cursor(&mut self, x: u16, y: u16) -> io::Result<()> {
        self.write_raw(format!("\x1b[{};{}H", y, x).as_bytes())
    }

    fn save_cursor(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[s")
    }

    fn restore_cursor(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[u")
    }

    fn hide_cursor(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[?25l")
    }

    fn show_cursor(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[?25h")
    }

    fn clear_screen(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[2J")
    }

    fn clear_scrollback(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[3J")
    }

    fn clear_line(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[2K")
    }

    fn clear_to_eol(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[K")
    }

    fn clear_to_eos(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[J")
    }

    fn set_scroll_region(&mut self, region: ScrollRegion) -> io::Result<()> {
        self.write_raw(format!("\x1b[{};{}r", region.top, region.bottom).as_bytes())
    }

    fn reset_scroll_region(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[r")
    }

    fn enter_alt_screen(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[?1049h")
    }

    fn exit_alt_screen(&mut self) -> io::Result<()> {
        self.write_raw(b"\x1b[?1049l")
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.raw_mode {
            let normalized = normalize_newlines(bytes);
            self.write_retrying(&normalized)
        } else {
            self.write_retrying(bytes)
        }
    }

    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_retrying(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// In-memory sink for deterministic tests. Tracks the cursor position and
/// the full byte history so tests can assert on row/column invariants
/// without a real TTY.
#[derive(Clone)]
pub struct RecordingSink {
    pub bytes: Arc<Mutex<Vec<u8>>>,
    pub cursor: (u16, u16),
    pub raw_mode: bool,
    pub width: u16,
    pub height: u16,
    pub scroll_region: Option<ScrollRegion>,
    pub alt_screen: bool,
}

impl RecordingSink {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(Vec::new())),
            cursor: (1, 1),
            raw_mode: false,
            width,
            height,
            scroll_region: None,
            alt_screen: false,
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.bytes.lock().map(|b| b.clone()).unwrap_or_default()
    }

    fn push(&mut self, bytes: &[u8]) {
        if let Ok(mut buf) = self.bytes.lock() {
            buf.extend_from_slice(bytes);
        }
        // Track the row the cursor ends on for the non-interleave /
        // scroll-region invariants: each literal byte written advances the
        // column, and each raw '\n' advances the row.
        for &b in bytes {
            if b == b'\n' {
                self.cursor.1 = self.cursor.1.saturating_add(1).min(self.height);
                self.cursor.0 = 1;
            } else if b != b'\r' {
                self.cursor.0 = self.cursor.0.saturating_add(1);
            }
        }
    }
}

impl TerminalSink for RecordingSink {
    fn size(&self) -> io::Result<(u16, u16)> {
        Ok((self.width, self.height))
    }

    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        self.raw_mode = enabled;
        Ok(())
    }

    fn is_raw_mode(&self) -> bool {
        self.raw_mode
    }

    fn move_cursor(&mut self, x: u16, y: u16) -> io::Result<()> {
        self.cursor = (x, y);
        self.push(format!("\x1b[{};{}H", y, x).as_bytes());
        Ok(())
    }

    fn save_cursor(&mut self) -> io::Result<()> {
        self.push(b"\x1b[s");
        Ok(())
    }

    fn restore_cursor(&mut self) -> io::Result<()> {
        self.push(b"\x1b[u");
        Ok(())
    }

    fn hide_cursor(&mut self) -> io::Result<()> {
        self.push(b"\x1b[?25l");
        Ok(())
    }

    fn show_cursor(&mut self) -> io::Result<()> {
        self.push(b"\x1b[?25h");
        Ok(())
    }

    fn clear_screen(&mut self) -> io::Result<()> {
        self.push(b"\x1b[2J");
        Ok(())
    }

    fn clear_scrollback(&mut self) -> io::Result<()> {
        self.push(b"\x1b[3J");
        Ok(())
    }

    fn clear_line(&mut self) -> io::Result<()> {
        self.push(b"\x1b[2K");
        Ok(())
    }

    fn clear_to_eol(&mut self) -> io::Result<()> {
        self.push(b"\x1b[K");
        Ok(())
    }

    fn clear_to_eos(&mut self) -> io::Result<()> {
        self.push(b"\x1b[J");
        Ok(())
    }

    fn set_scroll_region(&mut self, region: ScrollRegion) -> io::Result<()> {
        self.scroll_region = Some(region);
        self.push(format!("\x1b[{};{}r", region.top, region.bottom).as_bytes());
        Ok(())
    }

    fn reset_scroll_region(&mut self) -> io::Result<()> {
        self.scroll_region = None;
        self.push(b"\x1b[r");
        Ok(())
    }

    fn enter_alt_screen(&mut self) -> io::Result<()> {
        self.alt_screen = true;
        self.push(b"\x1b[?1049h");
        Ok(())
    }

    fn exit_alt_screen(&mut self) -> io::Result<()> {
        self.alt_screen = false;
        self.push(b"\x1b[?1049l");
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.raw_mode {
            let normalized = normalize_newlines(bytes);
            self.push(&normalized);
        } else {
            self.push(bytes);
        }
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.push(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

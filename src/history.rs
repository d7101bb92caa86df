//! Bounded, deduped, persistable history of past submissions.
//!
//! Dedup/navigation semantics are grounded on
//! `tui/src/bottom_pane/chat_composer_history.rs`'s
//! `ChatComposerHistory`, simplified from its async/persistent-log variant
//! down to the spec's synchronous, most-recent-wins bounded store.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::RwLock;

use crate::error::{Error, Result};

const DEFAULT_CAPACITY: usize = 1_000;

/// Navigation cursor over a [`HistoryStore`]. `index = None` means "not
/// browsing; the buffer is the user's live draft."
#[derive(Debug, Clone, Default)]
pub struct HistoryState {
    pub index: Option<usize>,
    pub saved_draft: Option<String>,
}

impl HistoryState {
    /// Any printable keystroke or backspace while browsing exits browse
    /// mode and clears the saved draft.
    pub fn exit_browse_on_edit(&mut self) {
        self.index = None;
        self.saved_draft = None;
    }
}

struct Inner {
    entries: VecDeque<String>,
    capacity: usize,
}

/// Thread-safe, bounded, deduplicated store of past user submissions.
pub struct HistoryStore {
    inner: RwLock<Inner>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: VecDeque::new(),
                capacity,
            }),
        }
    }

    /// Trim, ignore empty, remove any prior occurrence (most-recent-wins
    /// dedup), append, drop the oldest entry if over capacity.
    pub fn add(&self, entry: &str) {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            return;
        }
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.entries.retain(|e| e != trimmed);
        inner.entries.push_back(trimmed.to_string());
        while inner.entries.len() > inner.capacity {
            inner.entries.pop_front();
        }
    }

    /// A copy of every entry in insertion order.
    pub fn get(&self) -> Vec<String> {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry at `index` (0 = oldest), if any.
    pub fn entry_at(&self, index: usize) -> Option<String> {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.entries.get(index).cloned()
    }

    /// Read a history file, one trimmed non-empty line per entry, up to
    /// capacity. A missing file is non-fatal.
    pub fn load_from_file(&self, path: &Path) -> Result<()> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::HistoryIoError(e)),
        };
        for line in contents.lines() {
            self.add(line);
        }
        Ok(())
    }

    /// Persist entries, one per line, mode 0600, atomic replace.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::HistoryIoError)?;
        }
        let entries = self.get();
        let mut contents = String::new();
        for entry in &entries {
            contents.push_str(entry);
            contents.push('\n');
        }

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents).map_err(Error::HistoryIoError)?;
        set_private_permissions(&tmp_path)?;
        fs::rename(&tmp_path, path).map_err(Error::HistoryIoError)?;
        Ok(())
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn set_private_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms).map_err(Error::HistoryIoError)
}

#[cfg(not(unix))]
fn set_private_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

//! The input region: edit buffer, history navigation, wrap-aware rendering,
//! output-focus vim-style scrolling, and paste-burst detection.
//!
//! History navigation is grounded on
//! `tui/src/bottom_pane/chat_composer_history.rs`'s `ChatComposerHistory`
//! (`should_handle_navigation`, `navigate_up`/`navigate_down`), adapted to
//! the synchronous [`crate::history::HistoryStore`].

mod paste;

pub use paste::{PasteDetector, PasteOutcome};

use std::sync::Arc;

use crate::history::{HistoryState, HistoryStore};
use crate::keys::KeyEvent;

const GUTTER: u16 = 2;

/// Which region is receiving keystrokes. Provided by a callback so the
/// composition root can move focus without the editor knowing why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    Output,
}

/// A scroll request surfaced while [`Focus::Output`] is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollIntent {
    Up(u16),
    Down(u16),
    PageUp,
    PageDown,
    Top,
    Bottom,
    ToggleHelp,
}

/// What happened in response to a keystroke. The composition root decides
/// what each variant means (submit to the agent, send an interrupt, scroll
/// the content region, or run the external tab-completion hook).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    Submit(String),
    Tab,
    Scroll(ScrollIntent),
}

/// In-memory edit buffer, indexed by character (not byte or grapheme —
/// wide characters and combining marks are out of scope; `chars().count()`
/// is the display width everywhere in this crate).
#[derive(Debug, Clone, Default)]
struct EditBuffer {
    chars: Vec<char>,
    cursor: usize,
}

impl EditBuffer {
    fn insert_char(&mut self, c: char) {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.chars.remove(self.cursor);
        }
    }

    fn delete(&mut self) {
        if self.cursor < self.chars.len() {
            self.chars.remove(self.cursor);
        }
    }

    fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.chars.len());
    }

    fn home(&mut self) {
        self.cursor = 0;
    }

    fn end(&mut self) {
        self.cursor = self.chars.len();
    }

    fn clear_line(&mut self) {
        self.chars.clear();
        self.cursor = 0;
    }

    fn delete_to_end(&mut self) {
        self.chars.truncate(self.cursor);
    }

    fn set_text(&mut self, text: &str) {
        self.chars = text.chars().collect();
        self.cursor = self.chars.len();
    }

    fn as_string(&self) -> String {
        self.chars.iter().collect()
    }

    fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    fn width(&self) -> usize {
        self.chars.len()
    }

    fn contains_newline(&self) -> bool {
        self.chars.contains(&'\n')
    }

    /// Move the cursor to the same column one row up/down, treating `\n` as
    /// a row boundary. Used for visual-line navigation in multi-line
    /// buffers, as distinct from history navigation in single-line ones.
    fn move_visual_line(&mut self, delta: i32) {
        let text: String = self.chars.iter().collect();
        let lines: Vec<&str> = text.split('\n').collect();
        let mut offset = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        for (i, line) in lines.iter().enumerate() {
            let len = line.chars().count();
            if self.cursor <= offset + len {
                row = i;
                col = self.cursor - offset;
                break;
            }
            offset += len + 1;
        }
        let new_row = (row as i32 + delta).clamp(0, lines.len() as i32 - 1) as usize;
        let target_col = col.min(lines[new_row].chars().count());
        let mut new_cursor = 0usize;
        for line in &lines[..new_row] {
            new_cursor += line.chars().count() + 1;
        }
        new_cursor += target_col;
        self.cursor = new_cursor.min(self.chars.len());
    }
}

/// The rendered content of the input region, ready for the coordinator to
/// emit: wrapped display lines plus the cursor's row/column within them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedInput {
    pub lines: Vec<String>,
    pub cursor_row: u16,
    pub cursor_col: u16,
}

pub struct InputEditor {
    buffer: EditBuffer,
    history: Arc<HistoryStore>,
    history_state: HistoryState,
    prompt: String,
    focus: Arc<dyn Fn() -> Focus + Send + Sync>,
    on_height_change: Arc<dyn Fn(u16) + Send + Sync>,
    cached_line_count: u16,
    pending_g: bool,
}

impl InputEditor {
    pub fn new(
        prompt: impl Into<String>,
        history: Arc<HistoryStore>,
        focus: Arc<dyn Fn() -> Focus + Send + Sync>,
        on_height_change: Arc<dyn Fn(u16) + Send + Sync>,
    ) -> Self {
        Self {
            buffer: EditBuffer::default(),
            history,
            history_state: HistoryState::default(),
            prompt: prompt.into(),
            focus,
            on_height_change,
            cached_line_count: 1,
            pending_g: false,
        }
    }

    pub fn buffer_text(&self) -> String {
        self.buffer.as_string()
    }

    /// Whether the edit buffer currently holds no characters. Used by the
    /// composition root to decide when an incoming keystroke run is a
    /// plausible paste burst rather than the middle of deliberate typing.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Insert already-assembled text (e.g. a resolved paste burst) at the
    /// cursor in one step, bypassing history-browse exit logic per
    /// character.
    pub fn insert_text(&mut self, text: &str) {
        self.exit_history_browse_on_edit();
        for c in text.chars() {
            self.buffer.insert_char(c);
        }
    }

    /// `ceil((prompt_width + buffer_width) / effective_width)`, per §4.4.
    pub fn line_count(&self, terminal_width: u16) -> u16 {
        let effective_width = effective_width(terminal_width);
        let total = self.prompt.chars().count() + self.buffer.width();
        let lines = total.div_ceil(effective_width as usize).max(1);
        lines.min(u16::MAX as usize) as u16
    }

    /// Handles one decoded key event, returning what the composition root
    /// should do about it. Mutates internal state for everything that is
    /// purely an editing concern.
    pub fn handle_key(&mut self, event: KeyEvent) -> InputAction {
        if (self.focus)() == Focus::Output {
            return self.handle_output_focus_key(event);
        }
        self.pending_g = false;

        match event {
            KeyEvent::Char(c) => {
                self.exit_history_browse_on_edit();
                self.buffer.insert_char(c);
                InputAction::None
            }
            KeyEvent::Backspace => {
                self.exit_history_browse_on_edit();
                self.buffer.backspace();
                InputAction::None
            }
            KeyEvent::Delete => {
                self.exit_history_browse_on_edit();
                self.buffer.delete();
                InputAction::None
            }
            KeyEvent::Left => {
                self.buffer.move_left();
                InputAction::None
            }
            KeyEvent::Right => {
                self.buffer.move_right();
                InputAction::None
            }
            KeyEvent::Home => {
                self.buffer.home();
                InputAction::None
            }
            KeyEvent::End => {
                self.buffer.end();
                InputAction::None
            }
            KeyEvent::ClearLine => {
                self.exit_history_browse_on_edit();
                self.buffer.clear_line();
                InputAction::None
            }
            KeyEvent::DeleteToEnd => {
                self.exit_history_browse_on_edit();
                self.buffer.delete_to_end();
                InputAction::None
            }
            KeyEvent::Up => {
                if self.buffer.contains_newline() {
                    self.buffer.move_visual_line(-1);
                } else {
                    self.navigate_history(-1);
                }
                InputAction::None
            }
            KeyEvent::Down => {
                if self.buffer.contains_newline() {
                    self.buffer.move_visual_line(1);
                } else {
                    self.navigate_history(1);
                }
                InputAction::None
            }
            KeyEvent::Tab => InputAction::Tab,
            KeyEvent::Enter => self.submit(),
            _ => InputAction::None,
        }
    }

    fn handle_output_focus_key(&mut self, event: KeyEvent) -> InputAction {
        let was_pending_g = self.pending_g;
        self.pending_g = false;
        match event {
            KeyEvent::Char('j') => InputAction::Scroll(ScrollIntent::Down(1)),
            KeyEvent::Char('k') => InputAction::Scroll(ScrollIntent::Up(1)),
            KeyEvent::Char('g') => {
                if was_pending_g {
                    InputAction::Scroll(ScrollIntent::Top)
                } else {
                    self.pending_g = true;
                    InputAction::None
                }
            }
            KeyEvent::Char('G') => InputAction::Scroll(ScrollIntent::Bottom),
            KeyEvent::Char('?') => InputAction::Scroll(ScrollIntent::ToggleHelp),
            KeyEvent::Up => InputAction::Scroll(ScrollIntent::Up(1)),
            KeyEvent::Down => InputAction::Scroll(ScrollIntent::Down(1)),
            KeyEvent::PageUp => InputAction::Scroll(ScrollIntent::PageUp),
            KeyEvent::PageDown => InputAction::Scroll(ScrollIntent::PageDown),
            _ => InputAction::None,
        }
    }

    fn exit_history_browse_on_edit(&mut self) {
        if self.history_state.index.is_some() {
            self.history_state.exit_browse_on_edit();
        }
    }

    fn navigate_history(&mut self, delta: i32) {
        if self.history.is_empty() {
            return;
        }
        let len = self.history.len();
        match self.history_state.index {
            None => {
                if delta > 0 {
                    return;
                }
                self.history_state.saved_draft = Some(self.buffer.as_string());
                self.history_state.index = Some(len - 1);
            }
            Some(idx) => {
                let next = idx as i32 + delta;
                if next < 0 {
                    return;
                }
                if next as usize >= len {
                    let draft = self.history_state.saved_draft.take().unwrap_or_default();
                    self.history_state.index = None;
                    self.buffer.set_text(&draft);
                    return;
                }
                self.history_state.index = Some(next as usize);
            }
        }
        if let Some(idx) = self.history_state.index {
            if let Some(entry) = self.history.entry_at(idx) {
                self.buffer.set_text(&entry);
            }
        }
    }

    fn submit(&mut self) -> InputAction {
        let text = self.buffer.as_string().trim().to_string();
        self.buffer.clear_line();
        self.history_state = HistoryState::default();
        self.cached_line_count = 1;
        (self.on_height_change)(1);
        if text.is_empty() {
            InputAction::None
        } else {
            InputAction::Submit(text)
        }
    }

    /// Rows to clear on resize to erase wrap-artifact ghosts: the union of
    /// the old row count at the old and new widths, the new row count, and
    /// a three-row guard.
    pub fn resize_clear_rows(&mut self, old_width: u16, new_width: u16) -> u16 {
        let old_at_old = self.cached_line_count;
        let old_at_new = self.line_count(old_width);
        let new_lines = self.line_count(new_width);
        self.cached_line_count = new_lines;
        old_at_old.max(old_at_new).max(new_lines).saturating_add(3)
    }

    /// Recomputes the wrapped line count at `terminal_width` and notifies
    /// the height-change callback if it moved, so the layout manager can
    /// grow or shrink the input region (and the content scroll region with
    /// it) to match.
    pub fn sync_cached_line_count(&mut self, terminal_width: u16) -> bool {
        let lines = self.line_count(terminal_width);
        let changed = lines != self.cached_line_count;
        self.cached_line_count = lines;
        if changed {
            (self.on_height_change)(lines);
        }
        changed
    }

    pub fn render(&self, terminal_width: u16) -> RenderedInput {
        if (self.focus)() == Focus::Output {
            return RenderedInput {
                lines: vec!["-- OUTPUT: j/k scroll, gg top, G bottom, ? help --".to_string()],
                cursor_row: 0,
                cursor_col: 0,
            };
        }

        let effective_width = effective_width(terminal_width) as usize;
        let combined: Vec<char> = self
            .prompt
            .chars()
            .chain(self.buffer.chars.iter().copied())
            .collect();
        let lines: Vec<String> = if combined.is_empty() {
            vec![String::new()]
        } else {
            combined
                .chunks(effective_width.max(1))
                .map(|chunk| chunk.iter().collect())
                .collect()
        };

        let absolute_cursor = self.prompt.chars().count() + self.buffer.cursor;
        let effective = effective_width.max(1);
        let cursor_row = (absolute_cursor / effective) as u16;
        let cursor_col = (absolute_cursor % effective) as u16;

        RenderedInput {
            lines,
            cursor_row,
            cursor_col,
        }
    }
}

fn effective_width(terminal_width: u16) -> u16 {
    terminal_width.saturating_sub(GUTTER).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn editor_with_focus(history: Arc<HistoryStore>, focus: Focus) -> InputEditor {
        let focus = Arc::new(Mutex::new(focus));
        let focus_for_closure = focus.clone();
        InputEditor::new(
            "> ",
            history,
            Arc::new(move || *focus_for_closure.lock().expect("lock")),
            Arc::new(|_| {}),
        )
    }

    fn type_str(editor: &mut InputEditor, s: &str) {
        for c in s.chars() {
            editor.handle_key(KeyEvent::Char(c));
        }
    }

    #[test]
    fn typing_and_backspace_mutate_buffer() {
        let history = Arc::new(HistoryStore::new());
        let mut editor = editor_with_focus(history, Focus::Input);
        type_str(&mut editor, "hi");
        editor.handle_key(KeyEvent::Backspace);
        assert_eq!(editor.buffer_text(), "h");
    }

    #[test]
    fn enter_submits_trimmed_nonempty_text_and_resets_buffer() {
        let history = Arc::new(HistoryStore::new());
        let mut editor = editor_with_focus(history, Focus::Input);
        type_str(&mut editor, "  hello  ");
        let action = editor.handle_key(KeyEvent::Enter);
        assert_eq!(action, InputAction::Submit("hello".to_string()));
        assert_eq!(editor.buffer_text(), "");
    }

    #[test]
    fn enter_on_empty_buffer_is_discarded() {
        let history = Arc::new(HistoryStore::new());
        let mut editor = editor_with_focus(history, Focus::Input);
        type_str(&mut editor, "   ");
        let action = editor.handle_key(KeyEvent::Enter);
        assert_eq!(action, InputAction::None);
    }

    #[test]
    fn up_loads_most_recent_history_entry_then_down_restores_draft() {
        let history = Arc::new(HistoryStore::new());
        history.add("first");
        history.add("second");
        let mut editor = editor_with_focus(history, Focus::Input);
        type_str(&mut editor, "draft");

        editor.handle_key(KeyEvent::Up);
        assert_eq!(editor.buffer_text(), "second");
        editor.handle_key(KeyEvent::Up);
        assert_eq!(editor.buffer_text(), "first");

        editor.handle_key(KeyEvent::Down);
        assert_eq!(editor.buffer_text(), "second");
        editor.handle_key(KeyEvent::Down);
        assert_eq!(editor.buffer_text(), "draft");
    }

    #[test]
    fn typing_after_history_load_exits_browse_mode() {
        let history = Arc::new(HistoryStore::new());
        history.add("first");
        let mut editor = editor_with_focus(history, Focus::Input);
        editor.handle_key(KeyEvent::Up);
        assert_eq!(editor.buffer_text(), "first");
        editor.handle_key(KeyEvent::Char('!'));
        assert_eq!(editor.buffer_text(), "first!");
        assert!(editor.history_state.index.is_none());
    }

    #[test]
    fn ctrl_u_clears_line_and_ctrl_k_deletes_to_end() {
        let history = Arc::new(HistoryStore::new());
        let mut editor = editor_with_focus(history.clone(), Focus::Input);
        type_str(&mut editor, "hello world");
        editor.handle_key(KeyEvent::Home);
        for _ in 0..5 {
            editor.handle_key(KeyEvent::Right);
        }
        editor.handle_key(KeyEvent::DeleteToEnd);
        assert_eq!(editor.buffer_text(), "hello");

        let mut editor2 = editor_with_focus(history, Focus::Input);
        type_str(&mut editor2, "hello world");
        editor2.handle_key(KeyEvent::ClearLine);
        assert_eq!(editor2.buffer_text(), "");
    }

    #[test]
    fn line_count_matches_ceil_formula() {
        let history = Arc::new(HistoryStore::new());
        let mut editor = editor_with_focus(history, Focus::Input);
        // prompt "> " (2 chars) + 10 buffer chars = 12; effective width at
        // terminal width 10 is 8; ceil(12/8) = 2.
        type_str(&mut editor, "0123456789");
        assert_eq!(editor.line_count(10), 2);
    }

    #[test]
    fn output_focus_maps_vim_keys_to_scroll_intents_without_touching_buffer() {
        let mut editor = editor_with_focus(Arc::new(HistoryStore::new()), Focus::Output);
        assert_eq!(
            editor.handle_key(KeyEvent::Char('j')),
            InputAction::Scroll(ScrollIntent::Down(1))
        );
        assert_eq!(
            editor.handle_key(KeyEvent::Char('k')),
            InputAction::Scroll(ScrollIntent::Up(1))
        );
        assert_eq!(editor.handle_key(KeyEvent::Char('g')), InputAction::None);
        assert_eq!(
            editor.handle_key(KeyEvent::Char('g')),
            InputAction::Scroll(ScrollIntent::Top)
        );
        assert_eq!(
            editor.handle_key(KeyEvent::Char('G')),
            InputAction::Scroll(ScrollIntent::Bottom)
        );
        assert_eq!(editor.buffer_text(), "");
    }

    #[test]
    fn multiline_buffer_up_down_move_visual_lines_not_history() {
        let history = Arc::new(HistoryStore::new());
        history.add("should not be loaded");
        let mut editor = editor_with_focus(history, Focus::Input);
        editor.buffer.set_text("line one\nline two");
        editor.buffer.home();
        editor.handle_key(KeyEvent::Down);
        assert_eq!(editor.buffer.cursor, "line one\n".chars().count());
    }

    #[test]
    fn insert_text_appends_a_resolved_paste_burst_at_once() {
        let history = Arc::new(HistoryStore::new());
        let mut editor = editor_with_focus(history, Focus::Input);
        assert!(editor.is_empty());
        editor.insert_text("pasted\ntext");
        assert_eq!(editor.buffer_text(), "pasted\ntext");
        assert!(!editor.is_empty());
    }

    #[test]
    fn height_change_callback_fires_on_wrap_and_on_submit_reset() {
        let history = Arc::new(HistoryStore::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_for_closure = seen.clone();
        let mut editor = InputEditor::new(
            "> ",
            history,
            Arc::new(|| Focus::Input),
            Arc::new(move |h| seen_for_closure.lock().expect("lock").push(h)),
        );

        type_str(&mut editor, &"x".repeat(30));
        assert!(editor.sync_cached_line_count(10));
        assert_eq!(seen.lock().expect("lock").last(), Some(&editor.line_count(10)));

        editor.handle_key(KeyEvent::Enter);
        assert_eq!(seen.lock().expect("lock").last(), Some(&1));
    }

    #[test]
    fn resize_clear_rows_is_union_plus_guard() {
        let history = Arc::new(HistoryStore::new());
        let mut editor = editor_with_focus(history, Focus::Input);
        type_str(&mut editor, &"x".repeat(30));
        editor.sync_cached_line_count(20);
        let rows = editor.resize_clear_rows(20, 10);
        assert!(rows >= 3);
    }
}

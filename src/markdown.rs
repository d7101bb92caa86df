//! Streaming markdown line-formatter.
//!
//! No teacher file owns an equivalent of this component — `codex-tui`
//! renders already-parsed history cells through `ratatui` widgets rather
//! than formatting a raw agent byte stream line by line — so the algorithm
//! here follows the spec's own state machine directly. The small,
//! purpose-built span transforms (inline emphasis, tool-call filtering) are
//! grounded on the narrow, anchored-regex style of
//! `codex-ansi-escape::normalize_ansi_text_for_tui`: a handful of targeted
//! substitutions rather than a general-purpose parser.

use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use regex_lite::{Captures, Regex};

const FLUSH_THRESHOLD: usize = 100;

lazy_static! {
    static ref FENCE_RE: Regex = Regex::new(r"^```([A-Za-z0-9_+-]*)\s*$").expect("valid regex");
    static ref HEADER_RE: Regex = Regex::new(r"^#{1,6} ").expect("valid regex");
    static ref BULLET_RE: Regex = Regex::new(r"^[-*+] ").expect("valid regex");
    static ref ORDERED_RE: Regex = Regex::new(r"^\d+\. ").expect("valid regex");
    static ref BLOCKQUOTE_RE: Regex = Regex::new(r"^> ").expect("valid regex");
    static ref RULE_RE: Regex = Regex::new(r"^(---+|\*\*\*+)\s*$").expect("valid regex");
    static ref CODE_SPAN_RE: Regex = Regex::new(r"`([^`\n]+)`").expect("valid regex");
    static ref BOLD_STAR_RE: Regex = Regex::new(r"\*\*([^*\n]+)\*\*").expect("valid regex");
    static ref BOLD_UNDER_RE: Regex = Regex::new(r"__([^_\n]+)__").expect("valid regex");
    static ref ITALIC_STAR_RE: Regex = Regex::new(r"\*([^*\n]+)\*").expect("valid regex");
    static ref ITALIC_UNDER_RE: Regex = Regex::new(r"_([^_\n]+)_").expect("valid regex");
    static ref TOOL_CALL_RE: Regex =
        Regex::new(r"<function=([^>]+)>[\s\S]*?</(?:function|tool_call)>").expect("valid regex");
    static ref SENTINEL_RE: Regex =
        Regex::new(r"(?i)\[\[\s*task[_ ]?complete\s*\]\]").expect("valid regex");
}

/// A recognized markdown line kind. Exposed mainly for introspection and
/// testing; every kind other than `CodeBlockLine` still receives the same
/// inline-formatting pass (the spec does not forbid emphasis inside a
/// header or bullet line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    FenceOpen,
    FenceClose,
    CodeBlockLine,
    Header,
    Bullet,
    Ordered,
    Blockquote,
    Rule,
    Plain,
}

pub fn classify_line(line: &str, in_code_block: bool) -> LineKind {
    if FENCE_RE.is_match(line) {
        return if in_code_block {
            LineKind::FenceClose
        } else {
            LineKind::FenceOpen
        };
    }
    if in_code_block {
        return LineKind::CodeBlockLine;
    }
    if HEADER_RE.is_match(line) {
        LineKind::Header
    } else if BULLET_RE.is_match(line) {
        LineKind::Bullet
    } else if ORDERED_RE.is_match(line) {
        LineKind::Ordered
    } else if BLOCKQUOTE_RE.is_match(line) {
        LineKind::Blockquote
    } else if RULE_RE.is_match(line) {
        LineKind::Rule
    } else {
        LineKind::Plain
    }
}

fn apply_italic(s: &str) -> String {
    let once = ITALIC_STAR_RE.replace_all(s, |c: &Captures| format!("\x1b[3m{}\x1b[0m", &c[1]));
    ITALIC_UNDER_RE
        .replace_all(&once, |c: &Captures| format!("\x1b[3m{}\x1b[0m", &c[1]))
        .into_owned()
}

/// Longest-delimiter-first inline emphasis pass: code spans first (their
/// content is never reprocessed), then bold (`**`/`__`, recursing into
/// italic so nesting italic inside bold works), then any remaining
/// top-level italic. Unmatched delimiters are left untouched because none
/// of these regexes match without a closing pair.
fn apply_inline_formatting(line: &str) -> String {
    let after_code = CODE_SPAN_RE.replace_all(line, |c: &Captures| format!("\x1b[2m{}\x1b[0m", &c[1]));
    let after_bold_star = BOLD_STAR_RE.replace_all(&after_code, |c: &Captures| {
        format!("\x1b[1m{}\x1b[0m", apply_italic(&c[1]))
    });
    let after_bold_under = BOLD_UNDER_RE.replace_all(&after_bold_star, |c: &Captures| {
        format!("\x1b[1m{}\x1b[0m", apply_italic(&c[1]))
    });
    apply_italic(&after_bold_under)
}

fn strip_tool_calls_and_sentinels(text: &str) -> String {
    let without_sentinels = SENTINEL_RE.replace_all(text, "");
    TOOL_CALL_RE
        .replace_all(&without_sentinels, |c: &Captures| format!("🔧 {}\n", &c[1]))
        .into_owned()
}

struct StreamingState {
    buffer: String,
    in_code_block: bool,
    code_fence_lang: Option<String>,
    is_first_chunk: bool,
    last_was_newline: bool,
    has_processed_content: bool,
    finalized: bool,
    /// True when the current logical line has already had a partial,
    /// inline-only flush (via the 100-unit overflow threshold), so the
    /// eventual line-terminator should not re-run fence/header
    /// classification for text that already streamed out.
    line_in_progress: bool,
}

impl StreamingState {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            in_code_block: false,
            code_fence_lang: None,
            is_first_chunk: true,
            last_was_newline: false,
            has_processed_content: false,
            finalized: false,
            line_in_progress: false,
        }
    }
}

/// Consumes chunks of agent output and emits progressively formatted lines
/// through an injected emitter. The formatter's internal lock is always
/// released before the emitter is invoked — see the crate-level
/// documentation for why this matters for lock-order with
/// [`crate::coordinator::UiCoordinator`]'s output lock.
pub struct StreamingFormatter {
    state: Mutex<StreamingState>,
    emitter: Arc<dyn Fn(&str) + Send + Sync>,
}

impl StreamingFormatter {
    pub fn new(emitter: Arc<dyn Fn(&str) + Send + Sync>) -> Self {
        Self {
            state: Mutex::new(StreamingState::new()),
            emitter,
        }
    }

    pub fn write(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let mut to_emit: Vec<String> = Vec::new();
        {
            let mut state = lock(&self.state);
            state.buffer.push_str(chunk);
            self.drain_complete_lines(&mut state, &mut to_emit);
            if state.buffer.chars().count() > FLUSH_THRESHOLD {
                let fragment = std::mem::take(&mut state.buffer);
                let formatted = self.format_fragment(&mut state, &fragment, false);
                if !formatted.is_empty() {
                    state.has_processed_content = true;
                    to_emit.push(formatted);
                }
                state.line_in_progress = true;
            }
        }
        self.emit_all(to_emit);
    }

    /// Flush whatever is currently buffered, treating it as the final piece
    /// of its logical line even though no newline terminated it.
    pub fn force_flush(&self) {
        let mut to_emit = Vec::new();
        {
            let mut state = lock(&self.state);
            self.flush_remainder(&mut state, &mut to_emit);
        }
        self.emit_all(to_emit);
    }

    pub fn finalize(&self) {
        let mut to_emit = Vec::new();
        {
            let mut state = lock(&self.state);
            self.flush_remainder(&mut state, &mut to_emit);
            state.finalized = true;
        }
        self.emit_all(to_emit);
    }

    pub fn reset(&self) {
        let mut state = lock(&self.state);
        *state = StreamingState::new();
    }

    pub fn has_processed_content(&self) -> bool {
        lock(&self.state).has_processed_content
    }

    pub fn ended_with_newline(&self) -> bool {
        lock(&self.state).last_was_newline
    }

    fn drain_complete_lines(&self, state: &mut StreamingState, to_emit: &mut Vec<String>) {
        loop {
            let Some(idx) = state.buffer.find('\n') else {
                break;
            };
            let line = state.buffer[..idx].to_string();
            state.buffer.drain(..=idx);
            let formatted = self.format_fragment(state, &line, true);
            to_emit.push(format!("{formatted}\n"));
            state.has_processed_content = true;
            state.last_was_newline = true;
            state.line_in_progress = false;
        }
    }

    fn flush_remainder(&self, state: &mut StreamingState, to_emit: &mut Vec<String>) {
        if state.buffer.is_empty() {
            return;
        }
        let fragment = std::mem::take(&mut state.buffer);
        let formatted = self.format_fragment(state, &fragment, !state.line_in_progress);
        if !formatted.is_empty() {
            state.has_processed_content = true;
            state.last_was_newline = false;
            to_emit.push(formatted);
        }
        state.line_in_progress = false;
    }

    /// Formats one fragment of text. `is_line_start` controls whether fence
    /// and block-type classification run (only meaningful at the start of
    /// a logical line); continuations of an already-overflowed line only
    /// get the inline-formatting and code-block-verbatim treatment.
    fn format_fragment(&self, state: &mut StreamingState, text: &str, is_line_start: bool) -> String {
        let filtered = strip_tool_calls_and_sentinels(text);

        if state.is_first_chunk {
            if filtered.trim().is_empty() {
                return String::new();
            }
            state.is_first_chunk = false;
        }

        if !is_line_start {
            return if state.in_code_block {
                filtered
            } else {
                apply_inline_formatting(&filtered)
            };
        }

        match classify_line(&filtered, state.in_code_block) {
            LineKind::FenceOpen => {
                state.in_code_block = true;
                let lang = FENCE_RE
                    .captures(&filtered)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .filter(|s| !s.is_empty());
                state.code_fence_lang = lang;
                filtered
            }
            LineKind::FenceClose => {
                state.in_code_block = false;
                state.code_fence_lang = None;
                filtered
            }
            LineKind::CodeBlockLine => filtered,
            LineKind::Header
            | LineKind::Bullet
            | LineKind::Ordered
            | LineKind::Blockquote
            | LineKind::Rule
            | LineKind::Plain => apply_inline_formatting(&filtered),
        }
    }

    fn emit_all(&self, lines: Vec<String>) {
        for line in lines {
            (self.emitter)(&line);
        }
    }
}

fn lock(m: &Mutex<StreamingState>) -> std::sync::MutexGuard<'_, StreamingState> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn collecting_formatter() -> (StreamingFormatter, Arc<StdMutex<Vec<String>>>) {
        let sink = Arc::new(StdMutex::new(Vec::new()));
        let sink_clone = sink.clone();
        let formatter = StreamingFormatter::new(Arc::new(move |s: &str| {
            sink_clone.lock().expect("lock").push(s.to_string());
        }));
        (formatter, sink)
    }

    #[test]
    fn idempotent_finalize_emits_exactly_once() {
        let (formatter, sink) = collecting_formatter();
        formatter.reset();
        formatter.write("hello\n");
        formatter.finalize();
        formatter.finalize();
        assert_eq!(sink.lock().expect("lock").join(""), "hello\n");
    }

    #[test]
    fn code_fence_flush_clears_in_code_block_state() {
        let (formatter, sink) = collecting_formatter();
        formatter.write("```go\n");
        formatter.write("fmt.Println(\"hi\")\n");
        formatter.write("```");
        formatter.force_flush();
        let joined = sink.lock().expect("lock").join("");
        assert_eq!(joined, "```go\nfmt.Println(\"hi\")\n```");
        assert!(!lock(&formatter.state).in_code_block);
    }

    #[test]
    fn tool_call_filtering_replaces_function_block() {
        let (formatter, sink) = collecting_formatter();
        formatter.write(
            "Pre <function=shell_command><parameter=command>ls</parameter></function> Post\n",
        );
        let joined = sink.lock().expect("lock").join("");
        assert_eq!(joined, "Pre 🔧 shell_command\n Post\n");
    }

    #[test]
    fn sentinel_variants_are_stripped_case_insensitively() {
        let (formatter, sink) = collecting_formatter();
        formatter.write("done [[TASK_COMPLETE]]\n");
        formatter.write("done [[task complete]]\n");
        formatter.write("done [[Task_Complete]]\n");
        let joined = sink.lock().expect("lock").join("");
        assert_eq!(joined, "done \ndone \ndone \n");
    }

    #[test]
    fn inline_bold_and_italic_are_rendered() {
        let (formatter, sink) = collecting_formatter();
        formatter.write("**bold** and *italic* and `code`\n");
        let joined = sink.lock().expect("lock").join("");
        assert_eq!(
            joined,
            "\x1b[1mbold\x1b[0m and \x1b[3mitalic\x1b[0m and \x1b[2mcode\x1b[0m\n"
        );
    }

    #[test]
    fn italic_nested_inside_bold_is_rendered() {
        let (formatter, sink) = collecting_formatter();
        formatter.write("**bold _italic_ bold**\n");
        let joined = sink.lock().expect("lock").join("");
        assert_eq!(joined, "\x1b[1mbold \x1b[3mitalic\x1b[0m bold\x1b[0m\n");
    }

    #[test]
    fn unmatched_delimiters_pass_through_unchanged() {
        let (formatter, sink) = collecting_formatter();
        formatter.write("half *italic without close\n");
        let joined = sink.lock().expect("lock").join("");
        assert_eq!(joined, "half *italic without close\n");
    }

    #[test]
    fn code_block_lines_are_emitted_verbatim() {
        let (formatter, sink) = collecting_formatter();
        formatter.write("```\n");
        formatter.write("**not bold**\n");
        formatter.write("```\n");
        let joined = sink.lock().expect("lock").join("");
        assert_eq!(joined, "```\n**not bold**\n```\n");
    }

    #[test]
    fn reset_returns_formatter_to_first_chunk_state() {
        let (formatter, sink) = collecting_formatter();
        formatter.write("hello\n");
        formatter.reset();
        assert!(!formatter.has_processed_content());
        formatter.write("world\n");
        assert_eq!(sink.lock().expect("lock").join(""), "hello\nworld\n");
    }

    #[test]
    fn leading_blank_lines_before_first_content_are_swallowed() {
        let (formatter, sink) = collecting_formatter();
        formatter.write("\n");
        formatter.write("   \n");
        formatter.write("hi\n");
        let joined = sink.lock().expect("lock").join("");
        assert_eq!(joined, "hi\n");
    }

    #[test]
    fn order_is_preserved_across_many_small_writes() {
        let (formatter, sink) = collecting_formatter();
        for i in 0..20 {
            formatter.write(&format!("line{i}\n"));
        }
        let joined = sink.lock().expect("lock").join("");
        let expected: String = (0..20).map(|i| format!("line{i}\n")).collect();
        assert_eq!(joined, expected);
    }

    #[test]
    fn overflow_threshold_flushes_long_unterminated_line_without_losing_text() {
        let (formatter, sink) = collecting_formatter();
        let long_run = "x".repeat(150);
        formatter.write(&long_run);
        formatter.write("\n");
        let joined = sink.lock().expect("lock").join("");
        assert_eq!(joined, format!("{long_run}\n"));
    }
}

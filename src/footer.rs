//! Renders the two-line status footer: a separator strip and
//! `model (provider) | NNNk tokens | $c.ccc | context% | elapsed`.
//!
//! No teacher file renders anything like this (codex-tui's status line is a
//! `ratatui` widget tree, not hand-formatted text), so this module follows
//! the data model and render contract in the specification directly,
//! applying the same "small anchored string transform" idiom used in
//! `src/markdown.rs`.

use std::time::{Duration, Instant};

/// Everything the footer needs to render one frame. Git/path fields mirror
/// the data model even though the current one-line format doesn't surface
/// them; they exist so a richer status line can be added without changing
/// what feeds it.
#[derive(Debug, Clone)]
pub struct FooterSnapshot {
    pub model: String,
    pub provider: String,
    pub total_tokens: u64,
    pub cost: f64,
    pub iteration: u32,
    pub context_tokens: u64,
    pub max_context_tokens: u64,
    pub git_branch: Option<String>,
    pub git_changes: u32,
    pub git_has_repo: bool,
    pub git_remote: Option<String>,
    pub path: String,
    pub session_start: Instant,
}

/// Family-specific shortening table. Checked against the lowercased model
/// name (provider prefix and any `:suffix` already split off); extend as
/// new model families show up in footers.
const KNOWN_FAMILIES: &[(&str, &str)] = &[
    ("qwen3-coder-480b", "Qwen3-Coder-480B"),
    ("claude-3-5-sonnet", "Claude-3.5-Sonnet"),
    ("claude-3-opus", "Claude-3-Opus"),
    ("gpt-4o", "GPT-4o"),
    ("gpt-4-turbo", "GPT-4-Turbo"),
    ("deepseek-r1", "DeepSeek-R1"),
];

/// Strips a `provider/` prefix, keeps any `:suffix` (e.g. `:free`), and
/// applies family-specific shortening where the base name matches a known
/// family.
pub fn normalize_model_name(raw: &str) -> String {
    let without_provider = raw.rsplit('/').next().unwrap_or(raw);
    let (base, suffix) = match without_provider.split_once(':') {
        Some((b, s)) => (b, Some(s)),
        None => (without_provider, None),
    };
    let lower = base.to_lowercase();
    let shortened = KNOWN_FAMILIES
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, short)| short.to_string())
        .unwrap_or_else(|| base.to_string());
    match suffix {
        Some(s) => format!("{shortened}:{s}"),
        None => shortened,
    }
}

fn format_tokens(total_tokens: u64) -> String {
    let thousands = (total_tokens + 500) / 1000;
    format!("{thousands}k")
}

fn format_cost(cost: f64) -> String {
    format!("${cost:.3}")
}

fn format_context_percent(context_tokens: u64, max_context_tokens: u64) -> String {
    if max_context_tokens == 0 {
        return "0%".to_string();
    }
    let pct = (context_tokens as f64 / max_context_tokens as f64 * 100.0).round() as i64;
    format!("{pct}%")
}

fn format_elapsed(session_start: Instant, now: Instant) -> String {
    let elapsed = now.saturating_duration_since(session_start);
    format_duration(elapsed)
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h{minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

fn truncate_to_width(s: &str, width: u16) -> String {
    let width = width as usize;
    if s.chars().count() <= width {
        s.to_string()
    } else {
        s.chars().take(width).collect()
    }
}

/// Renders the separator line and the status line, both truncated to
/// `terminal_width`. `now` is injected rather than read from the clock so
/// elapsed-time rendering stays testable.
pub fn render_footer(snapshot: &FooterSnapshot, terminal_width: u16, now: Instant) -> (String, String) {
    let separator = truncate_to_width(&"─".repeat(terminal_width as usize), terminal_width);

    let model = normalize_model_name(&snapshot.model);
    let tokens = format_tokens(snapshot.total_tokens);
    let cost = format_cost(snapshot.cost);
    let context = format_context_percent(snapshot.context_tokens, snapshot.max_context_tokens);
    let elapsed = format_elapsed(snapshot.session_start, now);

    let status = format!(
        "{model} ({}) | {tokens} tokens | {cost} | {context} | {elapsed}",
        snapshot.provider
    );
    (separator, truncate_to_width(&status, terminal_width))
}

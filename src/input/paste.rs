//! Paste-burst detection: rapid, uninterrupted character arrival on an
//! empty buffer is treated as a paste and accumulated into a single edit
//! rather than replayed keystroke-by-keystroke, per §4.3's heuristic.

use std::time::{Duration, Instant};

const BURST_GAP: Duration = Duration::from_millis(30);
const QUIET_GAP: Duration = Duration::from_millis(100);

const CODE_KEYWORDS: &[&str] = &[
    "fn ", "function ", "def ", "class ", "if (", "for (", "while (", "return ", "const ",
    "let ", "import ", "public ", "private ",
];

enum State {
    Idle,
    /// One character received; not yet known whether it starts a burst.
    Held(char),
    Active(String),
}

/// What a burst resolved to once it ends (quiet timeout or trailing Enter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasteOutcome {
    /// Not a burst: this lone character should be handled as a normal
    /// keystroke.
    Single(char),
    /// A burst of `len >= 2` characters, already wrapped in triple
    /// backticks (code-like) or triple double-quotes (plain multiline).
    Burst(String),
}

/// Observes character arrivals and their timestamps; callers only invoke
/// `observe` when the precondition holds (buffer empty, parser not
/// mid-escape) since that gating is a property of the caller's state, not
/// the detector's.
pub struct PasteDetector {
    state: State,
    last_arrival: Option<Instant>,
}

impl Default for PasteDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PasteDetector {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            last_arrival: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// Feed one character. Returns `Some` only when a prior held character
    /// is conclusively resolved as not part of a burst (release it as a
    /// normal keystroke) — a character that might still be starting a
    /// burst is held pending the next arrival or a quiet timeout.
    pub fn observe(&mut self, ch: char, now: Instant) -> Option<PasteOutcome> {
        let gap = self.last_arrival.map(|prev| now.duration_since(prev));
        self.last_arrival = Some(now);

        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {
                self.state = State::Held(ch);
                None
            }
            State::Held(prev) => {
                if gap.is_some_and(|g| g < BURST_GAP) {
                    self.state = State::Active(format!("{prev}{ch}"));
                    None
                } else {
                    self.state = State::Held(ch);
                    Some(PasteOutcome::Single(prev))
                }
            }
            State::Active(mut buf) => {
                buf.push(ch);
                self.state = State::Active(buf);
                None
            }
        }
    }

    /// True once `now` is at least the quiet gap past the last arrival and
    /// something is pending — the caller's timer tick should call
    /// [`PasteDetector::finish`] when this returns true.
    pub fn quiet_timeout_elapsed(&self, now: Instant) -> bool {
        match (&self.state, self.last_arrival) {
            (State::Idle, _) => false,
            (_, None) => false,
            (_, Some(last)) => now.duration_since(last) >= QUIET_GAP,
        }
    }

    /// Ends whatever is pending, e.g. on quiet timeout or a trailing Enter.
    pub fn finish(&mut self) -> Option<PasteOutcome> {
        self.last_arrival = None;
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => None,
            State::Held(c) => Some(PasteOutcome::Single(c)),
            State::Active(buf) => Some(PasteOutcome::Burst(wrap(&buf))),
        }
    }
}

fn is_code_like(text: &str) -> bool {
    let total = text.chars().count().max(1);
    let brace_count = text
        .chars()
        .filter(|c| matches!(c, '{' | '}' | '(' | ')'))
        .count();
    let density = brace_count as f64 / total as f64;
    density > 0.02 || CODE_KEYWORDS.iter().any(|kw| text.contains(kw))
}

fn wrap(text: &str) -> String {
    if is_code_like(text) {
        format!("```\n{text}\n```")
    } else {
        format!("\"\"\"\n{text}\n\"\"\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_slow_keystrokes_are_never_treated_as_a_burst() {
        let mut detector = PasteDetector::new();
        let t0 = Instant::now();
        assert_eq!(detector.observe('a', t0), None);
        let t1 = t0 + Duration::from_millis(200);
        assert_eq!(detector.observe('b', t1), Some(PasteOutcome::Single('a')));
        let t2 = t1 + Duration::from_millis(200);
        assert_eq!(detector.finish(), None);
        // 'b' is still held until the next observe or a finish() call.
        let _ = t2;
    }

    #[test]
    fn rapid_arrivals_accumulate_into_a_single_burst() {
        let mut detector = PasteDetector::new();
        let t0 = Instant::now();
        assert_eq!(detector.observe('l', t0), None);
        assert_eq!(detector.observe('e', t0 + Duration::from_millis(5)), None);
        assert_eq!(detector.observe('t', t0 + Duration::from_millis(10)), None);
        assert!(detector.is_active());
        let outcome = detector.finish();
        assert_eq!(outcome, Some(PasteOutcome::Burst("\"\"\"\nlet\n\"\"\"".to_string())));
    }

    #[test]
    fn code_like_burst_is_wrapped_in_triple_backticks() {
        let mut detector = PasteDetector::new();
        let t0 = Instant::now();
        let text = "fn main() {}";
        for (i, c) in text.chars().enumerate() {
            detector.observe(c, t0 + Duration::from_millis(i as u64));
        }
        let outcome = detector.finish();
        assert_eq!(
            outcome,
            Some(PasteOutcome::Burst(format!("```\n{text}\n```")))
        );
    }

    #[test]
    fn quiet_timeout_is_detected_after_the_quiet_gap() {
        let mut detector = PasteDetector::new();
        let t0 = Instant::now();
        detector.observe('a', t0);
        assert!(!detector.quiet_timeout_elapsed(t0 + Duration::from_millis(50)));
        assert!(detector.quiet_timeout_elapsed(t0 + Duration::from_millis(150)));
    }
}

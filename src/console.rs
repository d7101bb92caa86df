//! The composition root: wires every other component together, routes
//! submitted input to a command, the shell, or the agent, and owns
//! Ctrl-C escalation. Grounded on `tui/src/app_event.rs`'s "one event enum,
//! one consumer" shape for the overall control-flow idea, generalized here
//! across command/shell/agent routing instead of a single `AppEvent`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::agent::{AgentHandle, AgentReport};
use crate::commands::CommandRegistry;
use crate::history::HistoryStore;

const CTRL_C_ESCALATION_WINDOW: Duration = Duration::from_secs(2);
const SHORT_INPUT_MAX_LEN: usize = 2;

const BUILTIN_COMMAND_NAMES: &[&str] = &[
    "help", "?", "quit", "exit", "q", "clear", "history", "stats", "debug", "debug-layout", "stop",
];

const SHELL_PREFIXES: &[&str] = &[
    "ls", "cd", "pwd", "cat", "echo", "git", "grep", "find", "mkdir", "rm", "cp", "mv", "touch",
    "chmod", "curl", "wget", "npm", "cargo", "python", "python3", "make",
];

const SHELL_OPERATOR_CHARS: &[char] = &['|', '&', '<', '>', '$'];

/// How a trimmed, non-empty line of user input should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRoute {
    Command(String),
    Shell(String),
    Agent(String),
    ConfirmShortInput(String),
}

/// Classifies one line of input. `known_commands` is the union of built-in
/// and registry command names, so a leading `/` only routes to the command
/// handler when it actually names one; `/usr/bin/foo`-style absolute paths
/// fall through to the shell-prefix check below.
pub fn classify_input(trimmed: &str, known_commands: &[&str]) -> InputRoute {
    if let Some(rest) = trimmed.strip_prefix('/') {
        let name = rest.split_whitespace().next().unwrap_or("");
        if known_commands.contains(&name) {
            return InputRoute::Command(trimmed.to_string());
        }
    }
    if trimmed.starts_with('/') || trimmed.starts_with("./") || trimmed.starts_with("../") {
        return InputRoute::Shell(trimmed.to_string());
    }
    if trimmed.chars().any(|c| SHELL_OPERATOR_CHARS.contains(&c)) {
        return InputRoute::Shell(trimmed.to_string());
    }
    let first_word = trimmed.split_whitespace().next().unwrap_or("");
    if SHELL_PREFIXES.contains(&first_word) {
        return InputRoute::Shell(trimmed.to_string());
    }
    if trimmed.chars().count() <= SHORT_INPUT_MAX_LEN && !trimmed.contains('?') {
        return InputRoute::ConfirmShortInput(trimmed.to_string());
    }
    InputRoute::Agent(trimmed.to_string())
}

/// Outcome of a built-in command dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Message(String),
    ClearContent,
    Quit,
    StopAgent,
    Unknown(String),
}

/// What happened in response to a Ctrl-C press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlCOutcome {
    StopNotice,
    Exit,
}

/// External collaborator for shell-routed input, mirroring the trait
/// boundary used for [`crate::agent::AgentHandle`]. Shell execution is
/// explicitly out of scope per the specification; this is the seam a real
/// implementation plugs into.
pub trait ShellExecutor: Send + Sync {
    fn execute(&self, command: &str) -> crate::error::Result<String>;
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct NullShellExecutor;

impl ShellExecutor for NullShellExecutor {
    fn execute(&self, command: &str) -> crate::error::Result<String> {
        Ok(format!("(shell execution disabled) {command}"))
    }
}

/// Tracks the most recent Ctrl-C press for the double-press-within-2s
/// escalation to exit.
#[derive(Default)]
pub struct CtrlCTracker {
    last_press: Option<Instant>,
}

impl CtrlCTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, now: Instant) -> CtrlCOutcome {
        let outcome = match self.last_press {
            Some(prev) if now.saturating_duration_since(prev) <= CTRL_C_ESCALATION_WINDOW => {
                CtrlCOutcome::Exit
            }
            _ => CtrlCOutcome::StopNotice,
        };
        self.last_press = Some(now);
        outcome
    }
}

/// The composition root. Owns the long-lived collaborators; the event loop
/// itself (selecting over interrupt/agent-done/signal channels) is driven
/// by the binary crate's `main`, which calls back into these methods.
pub struct AgentConsole {
    history: Arc<HistoryStore>,
    registry: CommandRegistry,
    agent: Arc<dyn AgentHandle>,
    shell: Arc<dyn ShellExecutor>,
    conversation: Mutex<Vec<String>>,
    ctrl_c: Mutex<CtrlCTracker>,
    interrupted: Arc<AtomicBool>,
    debug_enabled: AtomicBool,
}

impl AgentConsole {
    pub fn new(history: Arc<HistoryStore>, agent: Arc<dyn AgentHandle>, shell: Arc<dyn ShellExecutor>) -> Self {
        Self {
            history,
            registry: CommandRegistry::new(),
            agent,
            shell,
            conversation: Mutex::new(Vec::new()),
            ctrl_c: Mutex::new(CtrlCTracker::new()),
            interrupted: Arc::new(AtomicBool::new(false)),
            debug_enabled: AtomicBool::new(false),
        }
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    fn known_command_names(&self) -> Vec<&str> {
        BUILTIN_COMMAND_NAMES
            .iter()
            .copied()
            .chain(self.registry.names())
            .collect()
    }

    /// Routes one trimmed, non-empty line of submitted input.
    pub fn route(&self, line: &str) -> InputRoute {
        let known = self.known_command_names();
        classify_input(line, &known)
    }

    pub fn handle_command(&self, line: &str) -> CommandOutcome {
        let rest = line.strip_prefix('/').unwrap_or(line);
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("").trim();

        match name {
            "help" | "?" => CommandOutcome::Message(self.help_text()),
            "quit" | "exit" | "q" => CommandOutcome::Quit,
            "clear" => {
                lock(&self.conversation).clear();
                CommandOutcome::ClearContent
            }
            "history" => {
                let entries = self.history.get();
                if entries.is_empty() {
                    CommandOutcome::Message("(history is empty)".to_string())
                } else {
                    CommandOutcome::Message(entries.join("\n"))
                }
            }
            "stats" => CommandOutcome::Message(format!(
                "{} submissions in history",
                self.history.len()
            )),
            "debug" => {
                let now = !self.debug_enabled.load(Ordering::Acquire);
                self.debug_enabled.store(now, Ordering::Release);
                CommandOutcome::Message(format!("debug logging {}", if now { "enabled" } else { "disabled" }))
            }
            "debug-layout" => CommandOutcome::Message("layout debug dump requested".to_string()),
            "stop" => {
                self.interrupted.store(true, Ordering::Release);
                CommandOutcome::StopAgent
            }
            _ => {
                if let Some(command) = self.registry.find(name) {
                    CommandOutcome::Message(command.execute(args))
                } else {
                    CommandOutcome::Unknown(format!("unknown command: /{name}"))
                }
            }
        }
    }

    fn help_text(&self) -> String {
        let mut names: Vec<&str> = vec!["help", "quit", "clear", "history", "stats", "debug", "debug-layout", "stop"];
        names.extend(self.registry.names());
        format!("available commands: {}", names.join(", "))
    }

    pub fn handle_shell(&self, command: &str) -> crate::error::Result<String> {
        self.shell.execute(command)
    }

    /// Runs the agent synchronously on the calling thread, recording the
    /// prompt and reply in the conversation log. Intended to be invoked
    /// from a dedicated worker thread/task by the binary crate so the
    /// Input Editor keeps accepting keystrokes concurrently.
    pub fn run_agent(&self, prompt: &str, on_chunk: &(dyn Fn(&str) + Send + Sync)) -> crate::error::Result<AgentReport> {
        self.interrupted.store(false, Ordering::Release);
        lock(&self.conversation).push(prompt.to_string());
        self.agent.run(prompt, on_chunk, &self.interrupted)
    }

    pub fn interrupt_agent(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn handle_ctrl_c(&self, now: Instant) -> CtrlCOutcome {
        let outcome = lock(&self.ctrl_c).press(now);
        if outcome == CtrlCOutcome::StopNotice {
            self.interrupt_agent();
        }
        outcome
    }

    pub fn record_submission(&self, text: &str) {
        self.history.add(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::NullAgent;

    fn console() -> AgentConsole {
        AgentConsole::new(
            Arc::new(HistoryStore::new()),
            Arc::new(NullAgent),
            Arc::new(NullShellExecutor),
        )
    }

    #[test]
    fn leading_slash_with_known_command_name_routes_to_command() {
        let known = ["help", "quit"];
        assert_eq!(
            classify_input("/help", &known),
            InputRoute::Command("/help".to_string())
        );
    }

    #[test]
    fn leading_slash_with_unknown_name_routes_to_shell_as_absolute_path() {
        let known = ["help"];
        assert_eq!(
            classify_input("/usr/bin/ls", &known),
            InputRoute::Shell("/usr/bin/ls".to_string())
        );
    }

    #[test]
    fn relative_path_prefixes_route_to_shell() {
        let known = [];
        assert_eq!(classify_input("./build.sh", &known), InputRoute::Shell("./build.sh".to_string()));
        assert_eq!(classify_input("../run.sh", &known), InputRoute::Shell("../run.sh".to_string()));
    }

    #[test]
    fn shell_operator_characters_route_to_shell() {
        let known = [];
        assert_eq!(
            classify_input("echo hi | grep h", &known),
            InputRoute::Shell("echo hi | grep h".to_string())
        );
    }

    #[test]
    fn curated_shell_prefix_routes_to_shell() {
        let known = [];
        assert_eq!(classify_input("git status", &known), InputRoute::Shell("git status".to_string()));
    }

    #[test]
    fn short_input_without_question_mark_asks_for_confirmation() {
        let known = [];
        assert_eq!(
            classify_input("ok", &known),
            InputRoute::ConfirmShortInput("ok".to_string())
        );
    }

    #[test]
    fn short_input_with_question_mark_is_not_flagged() {
        let known = [];
        assert_eq!(classify_input("p?", &known), InputRoute::Agent("p?".to_string()));
    }

    #[test]
    fn ordinary_prose_routes_to_agent() {
        let known = [];
        assert_eq!(
            classify_input("what does this function do", &known),
            InputRoute::Agent("what does this function do".to_string())
        );
    }

    #[test]
    fn unknown_slash_command_reports_the_name() {
        let console = console();
        assert_eq!(
            console.handle_command("/bogus"),
            CommandOutcome::Unknown("unknown command: /bogus".to_string())
        );
    }

    #[test]
    fn clear_empties_conversation_log() {
        let console = console();
        console.conversation.lock().expect("lock").push("hi".to_string());
        assert_eq!(console.handle_command("/clear"), CommandOutcome::ClearContent);
        assert!(console.conversation.lock().expect("lock").is_empty());
    }

    #[test]
    fn quit_aliases_all_produce_quit() {
        let console = console();
        assert_eq!(console.handle_command("/quit"), CommandOutcome::Quit);
        assert_eq!(console.handle_command("/exit"), CommandOutcome::Quit);
        assert_eq!(console.handle_command("/q"), CommandOutcome::Quit);
    }

    #[test]
    fn second_ctrl_c_within_two_seconds_escalates_to_exit() {
        let console = console();
        let t0 = Instant::now();
        assert_eq!(console.handle_ctrl_c(t0), CtrlCOutcome::StopNotice);
        assert_eq!(console.handle_ctrl_c(t0 + Duration::from_millis(500)), CtrlCOutcome::Exit);
    }

    #[test]
    fn ctrl_c_after_the_window_resets_to_stop_notice() {
        let console = console();
        let t0 = Instant::now();
        assert_eq!(console.handle_ctrl_c(t0), CtrlCOutcome::StopNotice);
        assert_eq!(
            console.handle_ctrl_c(t0 + Duration::from_secs(3)),
            CtrlCOutcome::StopNotice
        );
    }
}

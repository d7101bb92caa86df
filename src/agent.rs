//! The external collaborator boundary for the AI agent itself. The spec
//! explicitly scopes the agent out: only its streaming/interrupt interface
//! matters to this crate. Grounded on the trait-at-the-seam pattern the
//! teacher uses for its own external collaborators (e.g.
//! `mcp-client`/`rmcp-client` sit behind narrow traits rather than being
//! inlined into `tui`).

use std::sync::atomic::AtomicBool;

use crate::error::{Error, Result};

/// Final totals an agent run reports once it completes or is interrupted.
/// Per the specification's bound Open Question, these reported totals —
/// never a client-side streaming estimate — are what feeds the footer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AgentReport {
    pub total_tokens: u64,
    pub cost: f64,
    pub context_tokens: u64,
}

/// Implemented by whatever drives the actual model conversation. `run` is
/// expected to block the calling thread (the console runs it on a
/// dedicated worker), streaming formatted chunks through `on_chunk` and
/// polling `interrupted` at its own natural suspension points.
pub trait AgentHandle: Send + Sync {
    fn run(
        &self,
        prompt: &str,
        on_chunk: &(dyn Fn(&str) + Send + Sync),
        interrupted: &AtomicBool,
    ) -> Result<AgentReport>;
}

/// Test double: completes instantly with no output. Useful for exercising
/// console routing without any streaming side effects.
pub struct NullAgent;

impl AgentHandle for NullAgent {
    fn run(
        &self,
        _prompt: &str,
        _on_chunk: &(dyn Fn(&str) + Send + Sync),
        _interrupted: &AtomicBool,
    ) -> Result<AgentReport> {
        Ok(AgentReport::default())
    }
}

/// Test double: streams the prompt back word by word, honoring
/// interruption. Useful for exercising the Streaming Formatter and
/// Coordinator wiring end to end without a real model.
pub struct EchoAgent;

impl AgentHandle for EchoAgent {
    fn run(
        &self,
        prompt: &str,
        on_chunk: &(dyn Fn(&str) + Send + Sync),
        interrupted: &AtomicBool,
    ) -> Result<AgentReport> {
        use std::sync::atomic::Ordering;

        for word in prompt.split_whitespace() {
            if interrupted.load(Ordering::Acquire) {
                return Err(Error::AgentInterrupted);
            }
            on_chunk(word);
            on_chunk(" ");
        }
        on_chunk("\n");
        Ok(AgentReport {
            total_tokens: prompt.chars().count() as u64,
            cost: 0.0,
            context_tokens: prompt.chars().count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    #[test]
    fn echo_agent_streams_prompt_words_and_reports_totals() {
        let collected = Mutex::new(String::new());
        let interrupted = AtomicBool::new(false);
        let report = EchoAgent
            .run("hello world", &|chunk| collected.lock().expect("lock").push_str(chunk), &interrupted)
            .expect("run succeeds");
        assert_eq!(collected.into_inner().expect("lock"), "hello world \n");
        assert_eq!(report.total_tokens, 11);
    }

    #[test]
    fn echo_agent_stops_when_interrupted_before_starting() {
        let interrupted = AtomicBool::new(true);
        let result = EchoAgent.run("hello", &|_| {}, &interrupted);
        assert!(matches!(result, Err(Error::AgentInterrupted)));
    }

    #[test]
    fn null_agent_completes_with_zero_totals() {
        let interrupted = AtomicBool::new(false);
        let report = NullAgent.run("anything", &|_| {}, &interrupted).expect("run succeeds");
        assert_eq!(report, AgentReport::default());
    }
}

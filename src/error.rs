use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the terminal UI coordinator.
///
/// Most variants are non-fatal (see propagation policy in the crate docs);
/// only [`Error::TerminalUnavailable`] and [`Error::RawModeFailed`] abort
/// `AgentConsole::init`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no usable terminal is attached to this process")]
    TerminalUnavailable,

    #[error("failed to enter raw mode: {0}")]
    RawModeFailed(#[source] io::Error),

    #[error("this platform does not support terminal resize notification")]
    ResizeUnsupported,

    #[error("unknown layout region: {0}")]
    RegionUnknown(String),

    #[error("history file I/O failed: {0}")]
    HistoryIoError(#[source] io::Error),

    #[error("the agent was interrupted before completing its response")]
    AgentInterrupted,

    #[error("the agent reported a failure: {0}")]
    AgentApiFailure(String),

    #[error("timed out waiting for the remainder of an escape sequence")]
    ParseSequenceTimeout,

    #[error(transparent)]
    Io(#[from] io::Error),
}

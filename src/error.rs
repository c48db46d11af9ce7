//! Error types for the session, command, and transfer layers

use thiserror::Error;

/// Failure while opening a new connection.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Connection to {target} failed: {reason}")]
    Failed { target: String, reason: String },

    #[error("Connection to {target} timed out after {secs}s")]
    Timeout { target: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by the SSH collaborator itself.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH process failed: {0}")]
    Process(String),

    #[error("Disconnected")]
    Disconnected,
}

/// Malformed permission string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid permission string {0:?}")]
pub struct FormatError(pub String);

/// Failure of a path-bearing remote command.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Not connected")]
    NotConnected,

    #[error("`{command}` exited with code {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Unexpected output for `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("No remote directory is open")]
    NoDirectory,
}

impl ExecError {
    /// Errors after which the current view cannot continue.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, ExecError::NotConnected | ExecError::Transport(_))
    }
}

/// Failure of an upload or download. Partial transfers are not rolled back.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Not connected")]
    NotConnected,

    #[error("Local path {0} does not exist")]
    MissingLocal(String),

    #[error("Invalid file name {0:?}")]
    InvalidName(String),

    #[error("Transfer failed: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

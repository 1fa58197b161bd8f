use thiserror::Error;

/// Failures talking to other processes in the fleet.
#[derive(Error, Debug)]
pub enum Error {
    /// Connect or lookup failure for a specific named peer. Retried on the
    /// master path, then degraded to an absent result.
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    /// The peer is no longer registered. Retrying cannot help.
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("No live instances of service {0}")]
    NoInstances(String),

    #[error("Remote call failed with status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Only connectivity failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PeerUnreachable(_) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("failed to open notification endpoint {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read group id: {0}")]
    Read(#[source] io::Error),
    #[error("invalid group id: {0}")]
    GroupId(String),
    #[error("failed to start notification reader: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {path} is already open")]
    AlreadyOpen { path: String },
    #[error("channel {path} is not open")]
    NotOpen { path: String },
    #[error("{} does not exist and creation was not requested", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("short write on {path}: {written} of {expected} bytes")]
    PartialWrite {
        path: String,
        written: usize,
        expected: usize,
    },
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}

use pps_client::ChannelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("unsupported orientation {0}, expected 0, 90, 180 or 270")]
    InvalidOrientation(i32),
}

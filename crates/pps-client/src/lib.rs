pub mod channel;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod options;

pub use channel::{handler_fn, Channel, ChannelHandler, Decoded, FnHandler, MessageHandler};
pub use config::{PpsConfig, DEFAULT_MAX_OBJECT_SIZE, DEFAULT_MOUNT_POINT};
pub use context::PpsContext;
pub use dispatcher::{NotificationDispatcher, NotifyEvent, NotifyKind};
pub use error::{ChannelError, DispatcherError};
pub use options::OpenOptions;

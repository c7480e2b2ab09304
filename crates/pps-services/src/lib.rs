pub mod error;
pub mod navigator;
pub mod notification;

pub use error::ServiceError;
pub use navigator::{Display, Navigator, NavigatorEvent, NavigatorState, WindowState};
pub use notification::{
    Category, Notification, NotificationEvent, NotificationInbox, NotificationManager,
    NotificationText,
};

use pps_core::Attributes;

pub(crate) fn text_attribute(attributes: &Attributes, key: &str) -> String {
    attributes
        .get(key)
        .and_then(|value| value.to_text())
        .unwrap_or_default()
}

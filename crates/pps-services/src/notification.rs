use crate::error::ServiceError;
use crate::text_attribute;
use chrono::{DateTime, Utc};
use pps_client::{Channel, Decoded, MessageHandler, OpenOptions, PpsContext};
use pps_core::{Attributes, Encoding, ObjectStatus, PpsMessage, PpsValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const NOTIFICATION_PATH: &str = "services/notification/control";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Category {
    #[default]
    Default,
    Ongoing,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "null",
            Self::Ongoing => "ongoing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationText {
    Plain(String),
    Lines(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Notification {
    id: String,
    time: Option<DateTime<Utc>>,
    expiration_time: Option<DateTime<Utc>>,
    icon_url: String,
    sound_url: String,
    led_color: Option<(u8, u8, u8)>,
    app_url: String,
    category: Category,
    text: Option<NotificationText>,
    html_text: String,
    prompt_choices: Vec<String>,
    shown: bool,
    dirty: bool,
    batching: bool,
}

impl Default for Notification {
    fn default() -> Self {
        Self::new()
    }
}

impl Notification {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            time: None,
            expiration_time: None,
            icon_url: String::new(),
            sound_url: String::new(),
            led_color: None,
            app_url: String::new(),
            category: Category::default(),
            text: None,
            html_text: String::new(),
            prompt_choices: Vec::new(),
            shown: false,
            dirty: false,
            batching: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn text(&self) -> Option<&NotificationText> {
        self.text.as_ref()
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.time = Some(time);
        self.dirty = true;
    }

    pub fn set_expiration_time(&mut self, time: DateTime<Utc>) {
        self.expiration_time = Some(time);
        self.dirty = true;
    }

    pub fn set_icon_url(&mut self, url: impl Into<String>) {
        self.icon_url = url.into();
        self.dirty = true;
    }

    pub fn set_sound_url(&mut self, url: impl Into<String>) {
        self.sound_url = url.into();
        self.dirty = true;
    }

    pub fn set_led_color(&mut self, red: u8, green: u8, blue: u8) {
        self.led_color = Some((red, green, blue));
        self.dirty = true;
    }

    pub fn set_app_url(&mut self, url: impl Into<String>) {
        self.app_url = url.into();
        self.dirty = true;
    }

    pub fn set_category(&mut self, category: Category) {
        self.category = category;
        self.dirty = true;
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(NotificationText::Plain(text.into()));
        self.dirty = true;
    }

    pub fn set_text_lines(&mut self, lines: Vec<String>) {
        self.text = Some(NotificationText::Lines(lines));
        self.dirty = true;
    }

    pub fn set_html_text(&mut self, html: impl Into<String>) {
        self.html_text = html.into();
        self.dirty = true;
    }

    pub fn set_prompt_choices(&mut self, choices: Vec<String>) {
        self.prompt_choices = choices;
        self.dirty = true;
    }

    pub fn begin_property_update(&mut self) {
        self.batching = true;
    }

    pub fn end_property_update(&mut self) {
        self.batching = false;
    }

    pub fn needs_update(&self) -> bool {
        self.shown && self.dirty && !self.batching
    }

    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        let mut put = |key: &str, value: PpsValue| {
            attributes.insert(key.to_string(), value);
        };

        put("id", PpsValue::from(self.id.as_str()));
        put("canAcknowledge", PpsValue::Bool(true));
        put("showInAll", PpsValue::Bool(true));
        put("category", PpsValue::from(self.category.as_str()));
        put("notifyOnAcknowledge", PpsValue::Bool(true));
        put("notifyOnExpire", PpsValue::Bool(true));
        put("notifyOnInvoke", PpsValue::Bool(true));

        // Milliseconds since the epoch exceed i32, so these travel as doubles.
        if let Some(time) = self.time {
            put("time", PpsValue::Number(time.timestamp_millis() as f64));
        }
        if let Some(time) = self.expiration_time {
            put("expirationTime", PpsValue::Number(time.timestamp_millis() as f64));
        }
        if !self.icon_url.is_empty() {
            put("iconUrl", PpsValue::from(self.icon_url.as_str()));
        }
        if !self.sound_url.is_empty() {
            put("soundUrl", PpsValue::from(self.sound_url.as_str()));
        }
        if let Some((red, green, blue)) = self.led_color {
            let rgb = (i64::from(red) << 16) | (i64::from(green) << 8) | i64::from(blue);
            put("ledColor", PpsValue::Int(rgb));
        }
        if !self.app_url.is_empty() {
            put("appUrl", PpsValue::from(self.app_url.as_str()));
        }

        if self.html_text.is_empty() {
            match &self.text {
                Some(NotificationText::Plain(text)) => put("text", PpsValue::from(text.as_str())),
                Some(NotificationText::Lines(lines)) => put(
                    "text",
                    PpsValue::Array(lines.iter().map(|line| PpsValue::from(line.as_str())).collect()),
                ),
                None => {}
            }
        } else {
            put("htmlText", PpsValue::from(self.html_text.as_str()));
        }

        if !self.prompt_choices.is_empty() {
            let choices = self
                .prompt_choices
                .iter()
                .map(|label| {
                    let mut choice = Attributes::new();
                    choice.insert("label".to_string(), PpsValue::from(label.as_str()));
                    PpsValue::Object(choice)
                })
                .collect();
            put("promptChoices", PpsValue::Array(choices));
        }
        attributes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// `prompt_response` is the chosen prompt index, or -1 without one.
    Acknowledged { id: String, prompt_response: i32 },
    Expired { id: String },
    Invoked { id: String },
    ServiceClosed,
    Disconnected,
}

#[derive(Debug, Default)]
pub struct NotificationInbox {
    events: Vec<NotificationEvent>,
}

impl NotificationInbox {
    pub fn take_events(&mut self) -> Vec<NotificationEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn handle(&mut self, message: &PpsMessage) {
        if !matches!(
            message.status(),
            ObjectStatus::Undefined | ObjectStatus::Created
        ) {
            error!(
                event = "pps_notification_service_closed",
                status = ?message.status()
            );
            self.events.push(NotificationEvent::ServiceClosed);
            return;
        }

        let attributes = message.attributes();
        let msg = text_attribute(attributes, "msg");
        let empty = Attributes::new();
        let dat = attributes
            .get("dat")
            .and_then(PpsValue::as_object)
            .unwrap_or(&empty);
        let id = text_attribute(dat, "id");

        match msg.as_str() {
            "Acknowledge" => {
                let prompt_response = parse_prompt_response(&text_attribute(dat, "promptResponse"));
                self.events
                    .push(NotificationEvent::Acknowledged { id, prompt_response });
            }
            "Expire" => self.events.push(NotificationEvent::Expired { id }),
            "Invoke" => self.events.push(NotificationEvent::Invoked { id }),
            _ => warn!(event = "pps_notification_unknown_msg", msg = %msg),
        }
    }
}

fn parse_prompt_response(raw: &str) -> i32 {
    if raw.is_empty() {
        return -1;
    }
    raw.parse().unwrap_or_else(|_| {
        warn!(event = "pps_notification_bad_prompt_response", value = %raw);
        -1
    })
}

impl MessageHandler for NotificationInbox {
    fn on_message(&mut self, message: PpsMessage) {
        self.handle(&message);
    }

    fn on_disconnected(&mut self) {
        warn!(event = "pps_notification_disconnected");
        self.events.push(NotificationEvent::Disconnected);
    }
}

pub struct NotificationManager {
    channel: Channel<Decoded<NotificationInbox>>,
}

impl NotificationManager {
    pub fn open(context: Arc<PpsContext>) -> Result<Self, ServiceError> {
        Self::open_at(context, NOTIFICATION_PATH)
    }

    pub fn open_at(context: Arc<PpsContext>, path: &str) -> Result<Self, ServiceError> {
        let mut channel = Channel::new(context, path, Decoded(NotificationInbox::default()));
        channel.open(OpenOptions::CREATE)?;
        Ok(Self { channel })
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    pub fn show(&mut self, notification: &mut Notification) -> Result<(), ServiceError> {
        self.send("Notify", notification.to_attributes())?;
        info!(event = "pps_notification_show", id = %notification.id);
        notification.shown = true;
        notification.dirty = false;
        Ok(())
    }

    pub fn update(&mut self, notification: &mut Notification) -> Result<bool, ServiceError> {
        if !notification.needs_update() {
            return Ok(false);
        }
        self.show(notification)?;
        Ok(true)
    }

    pub fn cancel(&mut self, notification: &mut Notification) -> Result<(), ServiceError> {
        let mut dat = Attributes::new();
        dat.insert("id".to_string(), PpsValue::from(notification.id.as_str()));
        self.send("Cancel", dat)?;
        info!(event = "pps_notification_cancel", id = %notification.id);
        notification.shown = false;
        Ok(())
    }

    pub fn process_events(&mut self) -> Vec<NotificationEvent> {
        self.channel.process_events();
        self.channel.handler_mut().0.take_events()
    }

    pub fn wait_events(&mut self, timeout: Duration) -> Vec<NotificationEvent> {
        self.channel.wait_events(timeout);
        self.channel.handler_mut().0.take_events()
    }

    fn send(&mut self, msg: &str, dat: Attributes) -> Result<(), ServiceError> {
        let mut attributes = Attributes::new();
        attributes.insert("msg".to_string(), PpsValue::from(msg));
        attributes.insert("dat".to_string(), PpsValue::Object(dat));
        let warnings = self
            .channel
            .write_attributes("", &attributes, Encoding::Native)?;
        debug!(event = "pps_notification_send", msg, warnings = warnings.len());
        Ok(())
    }
}

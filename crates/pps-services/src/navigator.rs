use crate::error::ServiceError;
use crate::text_attribute;
use pps_client::{Channel, Decoded, MessageHandler, OpenOptions, PpsContext};
use pps_core::{Attributes, Encoding, PpsMessage, PpsValue};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const NAVIGATOR_PATH: &str = "services/navigator/control";

const SUPPORTED_ANGLES: [i32; 4] = [0, 90, 180, 270];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowState {
    #[default]
    Fullscreen,
    Thumbnail,
    Invisible,
}

impl WindowState {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "fullscreen" => Some(Self::Fullscreen),
            "thumbnail" => Some(Self::Thumbnail),
            "invisible" => Some(Self::Invisible),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Display {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigatorEvent {
    OrientationStarted { angle: i32, id: String },
    OrientationCompleted { id: String },
    WindowStateChanged { display: Display, state: WindowState },
    WindowActivated { display: Display, active: bool },
    SwipeDown,
    SwipeStart,
    Invoke(String),
    Back,
    Exit,
    LowMemory,
    Disconnected,
}

#[derive(Debug, Clone)]
struct DisplayInfo {
    group_id: String,
    window_state: WindowState,
    active: bool,
}

impl Default for DisplayInfo {
    fn default() -> Self {
        Self {
            group_id: String::new(),
            window_state: WindowState::default(),
            active: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct NavigatorState {
    orientation_locked: bool,
    primary: DisplayInfo,
    secondary: DisplayInfo,
    replies: Vec<Attributes>,
    events: Vec<NavigatorEvent>,
}

impl NavigatorState {
    pub fn is_orientation_locked(&self) -> bool {
        self.orientation_locked
    }

    pub fn window_state(&self, display: Display) -> WindowState {
        self.display(display).window_state
    }

    pub fn is_active(&self, display: Display) -> bool {
        self.display(display).active
    }

    pub fn take_events(&mut self) -> Vec<NavigatorEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn take_replies(&mut self) -> Vec<Attributes> {
        std::mem::take(&mut self.replies)
    }

    pub fn handle(&mut self, message: &PpsMessage) {
        let attributes = message.attributes();
        let Some(msg) = attributes.get("msg").and_then(PpsValue::to_text) else {
            warn!(event = "pps_navigator_missing_msg", object = %message.name());
            return;
        };
        let dat = text_attribute(attributes, "dat");
        let id = text_attribute(attributes, "id");
        debug!(event = "pps_navigator_message", msg = %msg, dat = %dat, id = %id);

        match msg.to_ascii_lowercase().as_str() {
            "orientationcheck" => self.orientation_check(&dat, id),
            "orientation" => match dat.parse::<i32>() {
                Ok(angle) => self.events.push(NavigatorEvent::OrientationStarted { angle, id }),
                Err(_) => warn!(event = "pps_navigator_bad_angle", dat = %dat),
            },
            "orientationdone" => self.events.push(NavigatorEvent::OrientationCompleted { id }),
            "windowstate" => self.window_state_changed(&dat),
            "windowactive" => self.set_active(&dat, true),
            "windowinactive" => self.set_active(&dat, false),
            "swipe_down" => self.events.push(NavigatorEvent::SwipeDown),
            "swipe_start" => self.events.push(NavigatorEvent::SwipeStart),
            "invoke" => self.events.push(NavigatorEvent::Invoke(dat)),
            "back" => self.events.push(NavigatorEvent::Back),
            "exit" => self.events.push(NavigatorEvent::Exit),
            "low_memory" => self.events.push(NavigatorEvent::LowMemory),
            _ => warn!(event = "pps_navigator_unknown_msg", msg = %msg),
        }
    }

    fn orientation_check(&mut self, dat: &str, id: String) {
        if dat.parse::<i32>().is_err() {
            warn!(event = "pps_navigator_bad_angle", dat = %dat);
            return;
        }
        let mut reply = Attributes::new();
        reply.insert("res".to_string(), PpsValue::from("orientationCheck"));
        reply.insert("id".to_string(), PpsValue::from(id));
        reply.insert(
            "dat".to_string(),
            PpsValue::from(if self.orientation_locked { "false" } else { "true" }),
        );
        self.replies.push(reply);
    }

    fn window_state_changed(&mut self, dat: &str) {
        let parts: Vec<&str> = dat.split(',').collect();
        let [raw_state, group_id] = parts.as_slice() else {
            warn!(event = "pps_navigator_bad_window_state", dat = %dat);
            return;
        };
        let state = WindowState::parse(raw_state).unwrap_or_else(|| {
            warn!(event = "pps_navigator_unknown_window_state", state = %raw_state);
            WindowState::Invisible
        });
        let display = self.display_for(group_id);
        self.display_mut(display).window_state = state;
        self.events
            .push(NavigatorEvent::WindowStateChanged { display, state });
    }

    fn set_active(&mut self, group_id: &str, active: bool) {
        let display = self.display_for(group_id);
        self.display_mut(display).active = active;
        self.events
            .push(NavigatorEvent::WindowActivated { display, active });
    }

    /// Unknown group ids belong to the primary display.
    fn display_for(&self, group_id: &str) -> Display {
        if !self.secondary.group_id.is_empty() && self.secondary.group_id == group_id {
            Display::Secondary
        } else {
            Display::Primary
        }
    }

    fn display(&self, display: Display) -> &DisplayInfo {
        match display {
            Display::Primary => &self.primary,
            Display::Secondary => &self.secondary,
        }
    }

    fn display_mut(&mut self, display: Display) -> &mut DisplayInfo {
        match display {
            Display::Primary => &mut self.primary,
            Display::Secondary => &mut self.secondary,
        }
    }
}

impl MessageHandler for NavigatorState {
    fn on_message(&mut self, message: PpsMessage) {
        self.handle(&message);
    }

    fn on_disconnected(&mut self) {
        warn!(event = "pps_navigator_disconnected");
        self.events.push(NavigatorEvent::Disconnected);
    }
}

pub struct Navigator {
    channel: Channel<Decoded<NavigatorState>>,
}

impl Navigator {
    pub fn open(context: Arc<PpsContext>) -> Result<Self, ServiceError> {
        Self::open_at(context, NAVIGATOR_PATH)
    }

    pub fn open_at(context: Arc<PpsContext>, path: &str) -> Result<Self, ServiceError> {
        let mut channel = Channel::new(context, path, Decoded(NavigatorState::default()));
        channel.open(OpenOptions::CREATE)?;
        let mut navigator = Self { channel };
        navigator.flush_replies();
        Ok(navigator)
    }

    pub fn state(&self) -> &NavigatorState {
        &self.channel.handler().0
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    pub fn set_group_ids(&mut self, primary: &str, secondary: &str) {
        let state = &mut self.channel.handler_mut().0;
        state.primary.group_id = primary.to_string();
        state.secondary.group_id = secondary.to_string();
    }

    pub fn process_events(&mut self) -> Vec<NavigatorEvent> {
        self.channel.process_events();
        self.collect()
    }

    pub fn wait_events(&mut self, timeout: Duration) -> Vec<NavigatorEvent> {
        self.channel.wait_events(timeout);
        self.collect()
    }

    fn collect(&mut self) -> Vec<NavigatorEvent> {
        self.flush_replies();
        self.channel.handler_mut().0.take_events()
    }

    fn flush_replies(&mut self) {
        let replies = self.channel.handler_mut().0.take_replies();
        for reply in replies {
            if let Err(err) = self.write(&reply) {
                warn!(event = "pps_navigator_reply_failed", error = %err);
            }
        }
    }

    fn write(&mut self, attributes: &Attributes) -> Result<(), ServiceError> {
        self.channel
            .write_attributes("", attributes, Encoding::Native)?;
        Ok(())
    }

    fn send(&mut self, msg: &str, dat: Option<String>) -> Result<(), ServiceError> {
        let mut attributes = Attributes::new();
        attributes.insert("msg".to_string(), PpsValue::from(msg));
        if let Some(dat) = dat {
            attributes.insert("dat".to_string(), PpsValue::from(dat));
        }
        debug!(event = "pps_navigator_send", msg);
        self.write(&attributes)
    }

    pub fn invoke(&mut self, url: &str) -> Result<(), ServiceError> {
        self.send("invoke", Some(url.to_string()))
    }

    pub fn open_file(&mut self, path: &Path) -> Result<(), ServiceError> {
        self.send("openFile", Some(path.display().to_string()))
    }

    pub fn enable_swipe_start(&mut self) -> Result<(), ServiceError> {
        self.send("SWIPE_START", None)
    }

    pub fn add_uri(
        &mut self,
        icon: &Path,
        label: &str,
        category: &str,
        url: &str,
    ) -> Result<(), ServiceError> {
        let dat = format!("{},{label},{category},{url}", icon.display());
        self.send("addURI", Some(dat))
    }

    pub fn set_orientation(&mut self, angle: i32) -> Result<(), ServiceError> {
        if !SUPPORTED_ANGLES.contains(&angle) {
            return Err(ServiceError::InvalidOrientation(angle));
        }
        self.send("orientation", Some(angle.to_string()))
    }

    pub fn lock_orientation(&mut self) -> Result<(), ServiceError> {
        self.send("lockOrientation", None)?;
        self.channel.handler_mut().0.orientation_locked = true;
        Ok(())
    }

    pub fn unlock_orientation(&mut self) -> Result<(), ServiceError> {
        self.send("unlockOrientation", None)?;
        self.channel.handler_mut().0.orientation_locked = false;
        Ok(())
    }

    pub fn add_badge(&mut self) -> Result<(), ServiceError> {
        self.send("addBadge", Some("splat".to_string()))
    }

    pub fn remove_badge(&mut self) -> Result<(), ServiceError> {
        self.send("removeBadge", None)
    }

    pub fn extend_timeout(&mut self, timeout: Duration) -> Result<(), ServiceError> {
        self.send("extendTimeout", Some(timeout.as_millis().to_string()))
    }

    pub fn set_window_angle(&mut self, angle: i32) -> Result<(), ServiceError> {
        self.send("windowAngle", Some(angle.to_string()))
    }

    pub fn set_window_label(&mut self, label: &str) -> Result<(), ServiceError> {
        self.send("windowLabel", Some(label.to_string()))
    }

    pub fn set_close_prompt(&mut self, title: &str, message: &str) -> Result<(), ServiceError> {
        self.send("closePrompt", Some(format!("{title},{message}")))
    }

    pub fn clear_close_prompt(&mut self) -> Result<(), ServiceError> {
        self.set_close_prompt("", "")
    }

    pub fn buffer_resized(&mut self, id: &str) -> Result<(), ServiceError> {
        let mut attributes = Attributes::new();
        attributes.insert("res".to_string(), PpsValue::from("orientation"));
        attributes.insert("id".to_string(), PpsValue::from(id));
        info!(event = "pps_navigator_buffer_resized", id);
        self.write(&attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(pairs: &[(&str, PpsValue)]) -> PpsMessage {
        let attributes = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        PpsMessage::new("", attributes)
    }

    #[test]
    fn orientation_check_replies_with_lock_state() {
        let mut state = NavigatorState::default();
        state.handle(&message(&[
            ("msg", "orientationCheck".into()),
            ("dat", PpsValue::Number(90.0)),
            ("id", "7".into()),
        ]));
        state.orientation_locked = true;
        state.handle(&message(&[
            ("msg", "orientationCheck".into()),
            ("dat", "180".into()),
            ("id", "8".into()),
        ]));

        let replies = state.take_replies();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].get("res"), Some(&PpsValue::from("orientationCheck")));
        assert_eq!(replies[0].get("id"), Some(&PpsValue::from("7")));
        assert_eq!(replies[0].get("dat"), Some(&PpsValue::from("true")));
        assert_eq!(replies[1].get("dat"), Some(&PpsValue::from("false")));
        assert!(state.take_events().is_empty());
    }

    #[test]
    fn non_numeric_angles_are_ignored() {
        let mut state = NavigatorState::default();
        state.handle(&message(&[("msg", "orientationCheck".into()), ("dat", "up".into())]));
        state.handle(&message(&[("msg", "orientation".into()), ("dat", "up".into())]));
        assert!(state.take_replies().is_empty());
        assert!(state.take_events().is_empty());
    }

    #[test]
    fn message_names_match_case_insensitively() {
        let mut state = NavigatorState::default();
        state.handle(&message(&[
            ("msg", "ORIENTATION".into()),
            ("dat", "270".into()),
            ("id", "3".into()),
        ]));
        state.handle(&message(&[("msg", "orientationDone".into()), ("id", "3".into())]));
        state.handle(&message(&[("msg", "swipe_down".into())]));
        state.handle(&message(&[("msg", "invoke".into()), ("dat", "app://x".into())]));
        state.handle(&message(&[("msg", "LOW_MEMORY".into())]));

        assert_eq!(
            state.take_events(),
            vec![
                NavigatorEvent::OrientationStarted {
                    angle: 270,
                    id: "3".to_string()
                },
                NavigatorEvent::OrientationCompleted { id: "3".to_string() },
                NavigatorEvent::SwipeDown,
                NavigatorEvent::Invoke("app://x".to_string()),
                NavigatorEvent::LowMemory,
            ]
        );
    }

    #[test]
    fn window_state_is_tracked_per_display() {
        let mut state = NavigatorState::default();
        state.primary.group_id = "main".to_string();
        state.secondary.group_id = "hdmi".to_string();

        state.handle(&message(&[
            ("msg", "windowState".into()),
            ("dat", "thumbnail,hdmi".into()),
        ]));
        state.handle(&message(&[
            ("msg", "windowState".into()),
            ("dat", "sideways,main".into()),
        ]));
        state.handle(&message(&[("msg", "windowInactive".into()), ("dat", "hdmi".into())]));

        assert_eq!(state.window_state(Display::Secondary), WindowState::Thumbnail);
        assert_eq!(state.window_state(Display::Primary), WindowState::Invisible);
        assert!(!state.is_active(Display::Secondary));
        assert!(state.is_active(Display::Primary));
        assert_eq!(state.take_events().len(), 3);
    }

    #[test]
    fn malformed_window_state_is_dropped() {
        let mut state = NavigatorState::default();
        state.handle(&message(&[
            ("msg", "windowState".into()),
            ("dat", "thumbnail".into()),
        ]));
        state.handle(&message(&[("dat", "x".into())]));
        state.handle(&message(&[("msg", "dance".into())]));
        assert!(state.take_events().is_empty());
        assert_eq!(state.window_state(Display::Primary), WindowState::Fullscreen);
    }
}

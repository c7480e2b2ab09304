use crate::config::{is_valid_object_size, PpsConfig};
use crate::dispatcher::NotificationDispatcher;
use crate::error::DispatcherError;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

pub struct PpsContext {
    mount_point: PathBuf,
    max_object_size: AtomicUsize,
    dispatcher: Mutex<Option<Arc<NotificationDispatcher>>>,
}

impl PpsContext {
    pub fn new(config: PpsConfig) -> Self {
        Self {
            mount_point: config.mount_point,
            max_object_size: AtomicUsize::new(config.max_object_size),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn from_env() -> Self {
        Self::new(PpsConfig::from_env())
    }

    pub fn with_dispatcher(config: PpsConfig, dispatcher: NotificationDispatcher) -> Self {
        let context = Self::new(config);
        *context.dispatcher.lock() = Some(Arc::new(dispatcher));
        context
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn max_object_size(&self) -> usize {
        self.max_object_size.load(Ordering::Relaxed)
    }

    pub fn set_max_object_size(&self, size: usize) -> bool {
        if !is_valid_object_size(size) {
            return false;
        }
        self.max_object_size.store(size, Ordering::Relaxed);
        true
    }

    /// Connects on first use; a dispatcher whose reader stopped is replaced.
    pub fn dispatcher(&self) -> Result<Arc<NotificationDispatcher>, DispatcherError> {
        let mut slot = self.dispatcher.lock();
        if let Some(dispatcher) = slot.as_ref() {
            if dispatcher.is_running() {
                return Ok(dispatcher.clone());
            }
            warn!(event = "pps_dispatcher_stale", group_id = %dispatcher.group_id());
            *slot = None;
        }
        let dispatcher = Arc::new(NotificationDispatcher::connect(&self.mount_point)?);
        *slot = Some(dispatcher.clone());
        Ok(dispatcher)
    }

    pub fn has_dispatcher(&self) -> bool {
        self.dispatcher.lock().is_some()
    }
}

impl Default for PpsContext {
    fn default() -> Self {
        Self::new(PpsConfig::default())
    }
}

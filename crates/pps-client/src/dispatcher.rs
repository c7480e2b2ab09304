use crate::error::DispatcherError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const NOTIFY_OBJECT: &str = ".notify?wait";

const GROUP_ID_LIMIT: usize = 18;
const READ_CHUNK: usize = 512;
const PENDING_LIMIT: usize = 4 * READ_CHUNK;
const POLL_INTERVAL_MS: i32 = 100;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyKind {
    Changed,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyEvent {
    pub unique_id: String,
    pub kind: NotifyKind,
}

type Routes = Arc<RwLock<HashMap<String, Sender<NotifyEvent>>>>;

pub struct NotificationDispatcher {
    group_id: String,
    next_id: AtomicU32,
    routes: Routes,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    reader: Option<JoinHandle<()>>,
}

impl NotificationDispatcher {
    pub fn connect(mount_point: &Path) -> Result<Self, DispatcherError> {
        let path = mount_point.join(NOTIFY_OBJECT);
        let file = File::open(&path).map_err(|source| DispatcherError::Connect {
            path: path.clone(),
            source,
        })?;
        Self::from_source(file)
    }

    pub fn from_source<S>(mut source: S) -> Result<Self, DispatcherError>
    where
        S: Read + AsRawFd + Send + 'static,
    {
        let group_id = read_group_id(&mut source)?;
        let routes: Routes = Arc::default();
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = bounded(1);

        let reader = NotifyReader {
            source,
            pending: Vec::new(),
            routes: routes.clone(),
            stop: stop.clone(),
            running: running.clone(),
        };
        let handle = thread::Builder::new()
            .name("pps-notify".to_string())
            .spawn(move || {
                reader.run();
                let _ = done_tx.send(());
            })
            .map_err(DispatcherError::Spawn)?;

        info!(event = "pps_dispatcher_start", group_id = %group_id);
        Ok(Self {
            group_id,
            next_id: AtomicU32::new(1),
            routes,
            stop,
            running,
            done_rx,
            reader: Some(handle),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn create_unique_id(&self) -> String {
        format!("{:08x}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn subscribe(&self, unique_id: &str, sender: Sender<NotifyEvent>) {
        self.routes.write().insert(unique_id.to_string(), sender);
        debug!(event = "pps_dispatcher_subscribe", unique_id);
    }

    pub fn unsubscribe(&self, unique_id: &str) -> bool {
        let removed = self.routes.write().remove(unique_id).is_some();
        if removed {
            debug!(event = "pps_dispatcher_unsubscribe", unique_id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        match self.done_rx.recv_timeout(SHUTDOWN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.reader.take() {
                    let _ = handle.join();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(event = "pps_dispatcher_stop_timeout", group_id = %self.group_id);
            }
        }
    }
}

fn read_group_id<S: Read>(source: &mut S) -> Result<String, DispatcherError> {
    let mut buffer = [0u8; GROUP_ID_LIMIT];
    let count = source.read(&mut buffer).map_err(DispatcherError::Read)?;
    if count == 0 || count >= GROUP_ID_LIMIT {
        error!(event = "pps_dispatcher_group_id_invalid", len = count);
        return Err(DispatcherError::GroupId(format!(
            "expected 1 to {} bytes, read {count}",
            GROUP_ID_LIMIT - 1
        )));
    }
    let group_id = String::from_utf8_lossy(&buffer[..count]).trim().to_string();
    if group_id.is_empty() || !group_id.is_ascii() {
        error!(event = "pps_dispatcher_group_id_invalid", group_id = %group_id);
        return Err(DispatcherError::GroupId(group_id));
    }
    Ok(group_id)
}

struct NotifyReader<S> {
    source: S,
    pending: Vec<u8>,
    routes: Routes,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl<S: Read + AsRawFd> NotifyReader<S> {
    fn run(mut self) {
        let mut buffer = [0u8; READ_CHUNK];
        while !self.stop.load(Ordering::Acquire) {
            match wait_readable(self.source.as_raw_fd(), POLL_INTERVAL_MS) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(event = "pps_dispatcher_poll_failed", error = %err);
                    break;
                }
            }
            let count = match self.source.read(&mut buffer) {
                Ok(0) => {
                    info!(event = "pps_dispatcher_eof", pending = self.pending.len());
                    break;
                }
                Ok(count) => count,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(event = "pps_dispatcher_read_failed", error = %err);
                    break;
                }
            };
            if let Err(record) = self.feed(&buffer[..count]) {
                error!(event = "pps_dispatcher_bad_record", record = %record);
                self.disconnect_all();
                break;
            }
        }
        self.running.store(false, Ordering::Release);
        debug!(event = "pps_dispatcher_stopped");
    }

    // Records may straddle reads; only terminated ones are dispatched.
    fn feed(&mut self, chunk: &[u8]) -> Result<(), String> {
        self.pending.extend_from_slice(chunk);
        let Some(end) = self
            .pending
            .iter()
            .rposition(|byte| *byte == b'\n' || *byte == 0)
        else {
            if self.pending.len() > PENDING_LIMIT {
                return Err(String::from_utf8_lossy(&self.pending).into_owned());
            }
            return Ok(());
        };
        let complete: Vec<u8> = self.pending.drain(..=end).collect();
        self.dispatch_chunk(&complete)
    }

    fn dispatch_chunk(&self, chunk: &[u8]) -> Result<(), String> {
        let text = String::from_utf8_lossy(chunk);
        let records = text
            .split(|c: char| c == '\n' || c == '\0')
            .map(str::trim)
            .filter(|record| !record.is_empty());
        for record in records {
            let (kind, body) = match record.strip_prefix('-') {
                Some(rest) => (NotifyKind::Disconnected, rest),
                None => (NotifyKind::Changed, record),
            };
            let Some((_group, unique_id)) = body.split_once(':') else {
                return Err(record.to_string());
            };
            self.route(unique_id.trim(), kind);
        }
        Ok(())
    }

    fn route(&self, unique_id: &str, kind: NotifyKind) {
        let sender = self.routes.read().get(unique_id).cloned();
        let Some(sender) = sender else {
            debug!(event = "pps_dispatcher_unknown_id", unique_id);
            return;
        };
        let event = NotifyEvent {
            unique_id: unique_id.to_string(),
            kind,
        };
        if sender.send(event).is_err() {
            self.routes.write().remove(unique_id);
            debug!(event = "pps_dispatcher_route_closed", unique_id);
        }
    }

    fn disconnect_all(&self) {
        for (unique_id, sender) in self.routes.read().iter() {
            let _ = sender.send(NotifyEvent {
                unique_id: unique_id.clone(),
                kind: NotifyKind::Disconnected,
            });
        }
    }
}

fn wait_readable(fd: RawFd, timeout_ms: i32) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pollfd` is a valid, initialized array of one element that
    // outlives the call.
    let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc > 0)
}

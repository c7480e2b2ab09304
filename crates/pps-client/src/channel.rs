use crate::context::PpsContext;
use crate::dispatcher::{NotificationDispatcher, NotifyEvent, NotifyKind};
use crate::error::ChannelError;
use crate::options::OpenOptions;
use crossbeam_channel::{unbounded, Receiver, Sender};
use pps_core::{decode, encode, Attributes, CodecWarning, Encoding, PpsMessage};
use std::fs::{self, File, OpenOptions as FileOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub trait ChannelHandler {
    /// `data` holds the bytes read followed by a terminating NUL.
    fn on_data(&mut self, data: &[u8]);

    fn on_disconnected(&mut self) {}
}

pub struct FnHandler<D, X> {
    on_data: D,
    on_disconnected: X,
}

pub fn handler_fn<D, X>(on_data: D, on_disconnected: X) -> FnHandler<D, X>
where
    D: FnMut(&[u8]),
    X: FnMut(),
{
    FnHandler {
        on_data,
        on_disconnected,
    }
}

impl<D, X> ChannelHandler for FnHandler<D, X>
where
    D: FnMut(&[u8]),
    X: FnMut(),
{
    fn on_data(&mut self, data: &[u8]) {
        (self.on_data)(data)
    }

    fn on_disconnected(&mut self) {
        (self.on_disconnected)()
    }
}

pub trait MessageHandler {
    fn on_message(&mut self, message: PpsMessage);

    fn on_disconnected(&mut self) {}
}

pub struct Decoded<M>(pub M);

impl<M: MessageHandler> ChannelHandler for Decoded<M> {
    fn on_data(&mut self, data: &[u8]) {
        match decode(data) {
            Ok(report) => {
                for message in report.messages {
                    self.0.on_message(message);
                }
            }
            Err(err) => warn!(event = "pps_channel_decode_failed", error = %err),
        }
    }

    fn on_disconnected(&mut self) {
        self.0.on_disconnected();
    }
}

/// One connection to a named object under the context's mount point.
///
/// A monitoring channel receives change notifications through a queue that
/// the owner drains with [`Channel::process_events`] or
/// [`Channel::wait_events`]; handler callbacks always run on the owner's
/// thread. Dropping the channel closes it.
pub struct Channel<H> {
    context: Arc<PpsContext>,
    path: String,
    file: Option<File>,
    options: OpenOptions,
    unique_id: Option<String>,
    dispatcher: Option<Arc<NotificationDispatcher>>,
    events_tx: Sender<NotifyEvent>,
    events_rx: Receiver<NotifyEvent>,
    handler: H,
}

impl<H> Channel<H> {
    pub fn new(context: Arc<PpsContext>, path: impl Into<String>, handler: H) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            context,
            path: path.into(),
            file: None,
            options: OpenOptions::default(),
            unique_id: None,
            dispatcher: None,
            events_tx,
            events_rx,
            handler,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn full_path(&self) -> PathBuf {
        self.context
            .mount_point()
            .join(self.path.trim_start_matches('/'))
    }

    pub fn options(&self) -> OpenOptions {
        self.options
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    pub fn context(&self) -> &Arc<PpsContext> {
        &self.context
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn events(&self) -> &Receiver<NotifyEvent> {
        &self.events_rx
    }

    pub fn close(&mut self) {
        let dispatcher = self.dispatcher.take();
        let unique_id = self.unique_id.take();
        if let (Some(dispatcher), Some(unique_id)) = (dispatcher, unique_id) {
            dispatcher.unsubscribe(&unique_id);
        }
        if self.file.take().is_some() {
            debug!(event = "pps_channel_close", path = %self.path);
        }
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        let Some(file) = self.file.as_mut() else {
            warn!(event = "pps_channel_write_closed", path = %self.path);
            return Err(ChannelError::NotOpen {
                path: self.path.clone(),
            });
        };

        let max = self.context.max_object_size();
        if data.len() > max {
            warn!(
                event = "pps_channel_oversized_write",
                path = %self.path,
                size = data.len(),
                max
            );
        }

        match file.write(data) {
            Ok(written) if written == data.len() => Ok(()),
            Ok(written) => {
                warn!(
                    event = "pps_channel_short_write",
                    path = %self.path,
                    written,
                    expected = data.len()
                );
                Err(ChannelError::PartialWrite {
                    path: self.path.clone(),
                    written,
                    expected: data.len(),
                })
            }
            Err(source) => {
                warn!(event = "pps_channel_write_failed", path = %self.path, error = %source);
                Err(ChannelError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    pub fn write_str(&mut self, data: &str) -> Result<(), ChannelError> {
        self.write(data.as_bytes())
    }

    pub fn write_message(
        &mut self,
        message: &PpsMessage,
        encoding: Encoding,
    ) -> Result<Vec<CodecWarning>, ChannelError> {
        let report = message.encode(encoding);
        self.write(&report.bytes)?;
        Ok(report.warnings)
    }

    pub fn write_attributes(
        &mut self,
        name: &str,
        attributes: &Attributes,
        encoding: Encoding,
    ) -> Result<Vec<CodecWarning>, ChannelError> {
        let report = encode(name, attributes, encoding);
        self.write(&report.bytes)?;
        Ok(report.warnings)
    }
}

impl<H: ChannelHandler> Channel<H> {
    pub fn open(&mut self, options: OpenOptions) -> Result<(), ChannelError> {
        if self.is_open() {
            warn!(event = "pps_channel_already_open", path = %self.path);
            return Err(ChannelError::AlreadyOpen {
                path: self.path.clone(),
            });
        }

        let target = self.full_path();
        let exists = target.exists();
        if !exists && !options.contains(OpenOptions::CREATE) {
            warn!(event = "pps_channel_missing", path = %target.display());
            return Err(ChannelError::NotFound { path: target });
        }

        let notify = if options.is_one_shot() {
            None
        } else {
            Some(self.attach()?)
        };

        let mut raw_path = target.clone().into_os_string();
        raw_path.push(options.query(notify.as_deref()));
        let open_path = PathBuf::from(raw_path);

        let truncate = options.contains(OpenOptions::TRUNCATE);
        let opened = if truncate || !exists {
            create_parent(&target).and_then(|_| {
                FileOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(truncate)
                    .open(&open_path)
            })
        } else {
            FileOptions::new().read(true).write(true).open(&open_path)
        };

        match opened {
            Ok(file) => self.file = Some(file),
            Err(source) => {
                warn!(
                    event = "pps_channel_open_failed",
                    path = %open_path.display(),
                    error = %source
                );
                self.close();
                return Err(ChannelError::Open {
                    path: open_path,
                    source,
                });
            }
        }

        self.options = options;
        info!(
            event = "pps_channel_open",
            path = %self.path,
            unique_id = self.unique_id.as_deref().unwrap_or("-"),
            one_shot = options.is_one_shot()
        );

        self.try_read();
        if options.is_one_shot() {
            self.close();
        }
        Ok(())
    }

    fn attach(&mut self) -> Result<String, ChannelError> {
        let dispatcher = self.context.dispatcher()?;
        let unique_id = dispatcher.create_unique_id();
        dispatcher.subscribe(&unique_id, self.events_tx.clone());
        let token = format!("{}:{}", dispatcher.group_id(), unique_id);
        self.unique_id = Some(unique_id);
        self.dispatcher = Some(dispatcher);
        Ok(token)
    }

    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn wait_events(&mut self, timeout: Duration) -> usize {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                1 + self.process_events()
            }
            Err(_) => 0,
        }
    }

    pub fn handle_event(&mut self, event: NotifyEvent) {
        if self.unique_id.as_deref() != Some(event.unique_id.as_str()) {
            debug!(
                event = "pps_channel_stale_event",
                path = %self.path,
                unique_id = %event.unique_id
            );
            return;
        }
        match event.kind {
            NotifyKind::Changed => while self.try_read() {},
            NotifyKind::Disconnected => {
                info!(event = "pps_channel_disconnected", path = %self.path);
                self.close();
                self.handler.on_disconnected();
            }
        }
    }

    fn try_read(&mut self) -> bool {
        let max = self.context.max_object_size();
        let mut buffer = vec![0u8; max + 1];
        let read = match self.file.as_mut() {
            Some(file) => read_retrying(file, &mut buffer[..max]),
            None => {
                warn!(event = "pps_channel_read_closed", path = %self.path);
                return false;
            }
        };

        let count = match read {
            Ok(0) => return false,
            Ok(count) => count,
            Err(err) => {
                warn!(event = "pps_channel_read_failed", path = %self.path, error = %err);
                self.close();
                self.handler.on_disconnected();
                return false;
            }
        };

        buffer.truncate(count + 1);
        buffer[count] = 0;
        self.handler.on_data(&buffer);
        true
    }
}

impl<H> Drop for Channel<H> {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_retrying(file: &mut File, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        match file.read(buffer) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

fn create_parent(target: &Path) -> io::Result<()> {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PpsConfig;
    use pps_core::PpsValue;
    use std::os::unix::net::UnixStream;

    #[derive(Default)]
    struct Recorder {
        data: Vec<Vec<u8>>,
        disconnects: usize,
    }

    impl ChannelHandler for Recorder {
        fn on_data(&mut self, data: &[u8]) {
            self.data.push(data.to_vec());
        }

        fn on_disconnected(&mut self) {
            self.disconnects += 1;
        }
    }

    fn plain_context(mount: &Path) -> Arc<PpsContext> {
        Arc::new(PpsContext::new(PpsConfig::default().with_mount_point(mount)))
    }

    fn monitored_context(mount: &Path) -> (Arc<PpsContext>, UnixStream) {
        let (source, mut peer) = UnixStream::pair().expect("socket pair");
        peer.write_all(b"grp").expect("group id");
        let dispatcher = NotificationDispatcher::from_source(source).expect("dispatcher");
        let config = PpsConfig::default().with_mount_point(mount);
        (Arc::new(PpsContext::with_dispatcher(config, dispatcher)), peer)
    }

    #[test]
    fn one_shot_reads_once_and_closes_without_dispatcher() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("status"), b"obj{a:1}").expect("seed");
        let context = plain_context(dir.path());

        let mut channel = Channel::new(context.clone(), "status", Recorder::default());
        channel.open(OpenOptions::ONE_SHOT).expect("open");

        assert!(!channel.is_open());
        assert_eq!(channel.unique_id(), None);
        assert_eq!(channel.handler().data, vec![b"obj{a:1}\0".to_vec()]);
        assert!(!context.has_dispatcher());
    }

    #[test]
    fn missing_object_without_create_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut channel = Channel::new(plain_context(dir.path()), "absent", Recorder::default());

        let result = channel.open(OpenOptions::ONE_SHOT);
        assert!(matches!(result, Err(ChannelError::NotFound { .. })));
        assert!(!channel.is_open());
    }

    #[test]
    fn create_makes_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut channel = Channel::new(
            plain_context(dir.path()),
            "/services/demo/control",
            Recorder::default(),
        );

        channel
            .open(OpenOptions::ONE_SHOT | OpenOptions::CREATE)
            .expect("open");
        assert!(dir.path().join("services/demo/control").exists());
        assert!(channel.handler().data.is_empty());
    }

    #[test]
    fn write_on_closed_channel_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut channel = Channel::new(plain_context(dir.path()), "obj", Recorder::default());
        assert!(matches!(
            channel.write_str("a:1"),
            Err(ChannelError::NotOpen { .. })
        ));
    }

    #[test]
    fn oversized_write_warns_and_still_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (context, _peer) = monitored_context(dir.path());
        assert!(context.set_max_object_size(512));

        let mut channel = Channel::new(context, "big", Recorder::default());
        channel.open(OpenOptions::default()).expect("open");
        let payload = vec![b'x'; 1_000];
        channel.write(&payload).expect("write");

        let unique_id = channel.unique_id().expect("unique id").to_string();
        let stored = fs::read(dir.path().join(format!("big?notify=grp:{unique_id}")))
            .expect("stored object");
        assert_eq!(stored.len(), 1_000);
    }

    #[test]
    fn second_open_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (context, _peer) = monitored_context(dir.path());
        let mut channel = Channel::new(context, "obj", Recorder::default());
        channel.open(OpenOptions::default()).expect("open");

        assert!(matches!(
            channel.open(OpenOptions::default()),
            Err(ChannelError::AlreadyOpen { .. })
        ));
        assert!(channel.is_open());
    }

    #[test]
    fn close_is_idempotent_and_unsubscribes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (context, _peer) = monitored_context(dir.path());
        let dispatcher = context.dispatcher().expect("dispatcher");
        let mut channel = Channel::new(context, "obj", Recorder::default());
        channel.open(OpenOptions::default()).expect("open");
        assert_eq!(dispatcher.subscriber_count(), 1);

        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert_eq!(channel.unique_id(), None);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn stale_events_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (context, _peer) = monitored_context(dir.path());
        let mut channel = Channel::new(context, "obj", Recorder::default());
        channel.open(OpenOptions::default()).expect("open");

        channel.handle_event(NotifyEvent {
            unique_id: "ffffffff".to_string(),
            kind: NotifyKind::Disconnected,
        });
        assert!(channel.is_open());
        assert_eq!(channel.handler().disconnects, 0);
    }

    #[test]
    fn closure_handler_receives_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("obj"), b"x:1").expect("seed");
        let mut seen = Vec::new();
        let mut lost = 0;
        {
            let handler = handler_fn(|data: &[u8]| seen.push(data.to_vec()), || lost += 1);
            let mut channel = Channel::new(plain_context(dir.path()), "obj", handler);
            channel.open(OpenOptions::ONE_SHOT).expect("open");
        }
        assert_eq!(seen, vec![b"x:1\0".to_vec()]);
        assert_eq!(lost, 0);
    }

    #[test]
    fn decoded_adapter_splits_messages() {
        #[derive(Default)]
        struct Messages(Vec<PpsMessage>);

        impl MessageHandler for Messages {
            fn on_message(&mut self, message: PpsMessage) {
                self.0.push(message);
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("delta"), b"a{x:1}b{y:\"z\"}").expect("seed");
        let mut channel = Channel::new(
            plain_context(dir.path()),
            "delta",
            Decoded(Messages::default()),
        );
        channel.open(OpenOptions::ONE_SHOT).expect("open");

        let messages = &channel.handler().0 .0;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].get("y"), Some(&PpsValue::from("z")));
    }
}

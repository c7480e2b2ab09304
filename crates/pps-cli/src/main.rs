use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pps_client::dispatcher::NOTIFY_OBJECT;
use pps_client::{
    Channel, ChannelError, Decoded, MessageHandler, OpenOptions, PpsConfig, PpsContext,
};
use pps_core::{decode, Attributes, Encoding, PpsMessage, PpsValue};
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WATCH_TICK: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "pps")]
#[command(about = "Read, write and watch PPS objects", long_about = None)]
struct Cli {
    #[arg(long, global = true, default_value = "")]
    mount_point: String,
    #[arg(long, global = true)]
    max_object_size: Option<usize>,
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current contents of an object
    Read {
        path: String,
        /// Print messages as JSON documents instead of PPS text
        #[arg(long)]
        json: bool,
    },
    /// Publish attributes to an object
    Write {
        path: String,
        /// Write under this object name instead of as a rootless list
        #[arg(long)]
        object: Option<String>,
        /// Encode the payload as JSON
        #[arg(long)]
        json_encoding: bool,
        /// Mark an attribute as deleted
        #[arg(long = "delete", value_name = "KEY")]
        delete: Vec<String>,
        /// Attributes as key=value; values parse as JSON when they can
        #[arg(value_name = "KEY=VALUE")]
        pairs: Vec<String>,
    },
    /// Follow an object and print every change until the connection is lost
    Watch {
        path: String,
        /// Receive only changed attributes
        #[arg(long)]
        delta: bool,
        #[arg(long)]
        json: bool,
    },
    /// Decode PPS text from stdin and print the messages as JSON
    Decode,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug || env_true("PPS_DEBUG"));
    let context = Arc::new(PpsContext::new(load_config(&cli)));

    match cli.command {
        Commands::Read { path, json } => run_read(context, &path, json),
        Commands::Write {
            path,
            object,
            json_encoding,
            delete,
            pairs,
        } => {
            let attributes = build_attributes(&pairs, &delete)?;
            let encoding = if json_encoding {
                Encoding::Json
            } else {
                Encoding::Native
            };
            run_write(
                context,
                &path,
                object.as_deref().unwrap_or_default(),
                &attributes,
                encoding,
            )
        }
        Commands::Watch { path, delta, json } => run_watch(context, &path, delta, json),
        Commands::Decode => run_decode(),
    }
}

fn load_config(cli: &Cli) -> PpsConfig {
    let mut config = PpsConfig::from_env();
    if !cli.mount_point.trim().is_empty() {
        config = config.with_mount_point(cli.mount_point.trim());
    }
    if let Some(size) = cli.max_object_size {
        if !config.set_max_object_size(size) {
            warn!(event = "pps_cli_object_size_ignored", size);
        }
    }
    config
}

fn init_logging(debug: bool) {
    let level = if debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("PPS_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => is_truthy(&value),
        Err(_) => false,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

struct Printer {
    json: bool,
    printed: usize,
    lost: bool,
}

impl Printer {
    fn new(json: bool) -> Self {
        Self {
            json,
            printed: 0,
            lost: false,
        }
    }
}

impl MessageHandler for Printer {
    fn on_message(&mut self, message: PpsMessage) {
        match render(&message, self.json) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(event = "pps_cli_render_failed", error = %err),
        }
        self.printed += 1;
    }

    fn on_disconnected(&mut self) {
        self.lost = true;
    }
}

fn render(message: &PpsMessage, json: bool) -> Result<String> {
    if json {
        return serde_json::to_string(message).context("failed to serialize message");
    }
    let report = message.encode(Encoding::Native);
    Ok(String::from_utf8_lossy(&report.bytes).into_owned())
}

fn run_read(context: Arc<PpsContext>, path: &str, json: bool) -> Result<()> {
    let mut channel = Channel::new(context, path, Decoded(Printer::new(json)));
    channel
        .open(OpenOptions::ONE_SHOT)
        .with_context(|| format!("failed to read {path}"))?;
    info!(
        event = "pps_cli_read",
        path,
        messages = channel.handler().0.printed
    );
    Ok(())
}

fn run_write(
    context: Arc<PpsContext>,
    path: &str,
    object: &str,
    attributes: &Attributes,
    encoding: Encoding,
) -> Result<()> {
    let endpoint = context.mount_point().join(NOTIFY_OBJECT);
    let mut channel = Channel::new(context, path, Decoded(Printer::new(false)));
    // Writable opens always monitor, so the notify endpoint must be reachable.
    match channel.open(OpenOptions::CREATE) {
        Ok(()) => {}
        Err(ChannelError::Dispatcher(err)) => {
            return Err(anyhow::Error::new(err).context(format!(
                "cannot write {path}: notification endpoint {} is unavailable",
                endpoint.display()
            )));
        }
        Err(err) => return Err(anyhow::Error::new(err).context(format!("failed to open {path}"))),
    }
    let warnings = channel
        .write_attributes(object, attributes, encoding)
        .with_context(|| format!("failed to write {path}"))?;
    info!(
        event = "pps_cli_write",
        path,
        attributes = attributes.len(),
        warnings = warnings.len()
    );
    Ok(())
}

fn run_watch(context: Arc<PpsContext>, path: &str, delta: bool, json: bool) -> Result<()> {
    let options = if delta {
        OpenOptions::READ_DELTA
    } else {
        OpenOptions::MONITOR
    };
    let mut channel = Channel::new(context, path, Decoded(Printer::new(json)));
    channel
        .open(options)
        .with_context(|| format!("failed to watch {path}"))?;

    while channel.is_open() {
        channel.wait_events(WATCH_TICK);
    }
    let printer = &channel.handler().0;
    info!(
        event = "pps_cli_watch_end",
        path,
        messages = printer.printed,
        lost = printer.lost
    );
    Ok(())
}

fn run_decode() -> Result<()> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("failed to read stdin")?;
    buffer.push(0);

    let report = decode(&buffer)?;
    for message in &report.messages {
        println!("{}", render(message, true)?);
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn build_attributes(pairs: &[String], deletes: &[String]) -> Result<Attributes> {
    let mut attributes = Attributes::new();
    for pair in pairs {
        let (key, value) = parse_pair(pair)?;
        attributes.insert(key, value);
    }
    for key in deletes {
        if key.is_empty() {
            bail!("--delete needs a non-empty key");
        }
        attributes.insert(key.clone(), PpsValue::Deleted);
    }
    if attributes.is_empty() {
        bail!("nothing to write: give key=value pairs or --delete keys");
    }
    Ok(attributes)
}

fn parse_pair(pair: &str) -> Result<(String, PpsValue)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("expected key=value, got {pair:?}");
    };
    if key.is_empty() {
        bail!("empty key in {pair:?}");
    }
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map(PpsValue::from)
        .unwrap_or_else(|_| PpsValue::from(raw));
    Ok((key.to_string(), value))
}

//! mdm-bridge
//!
//! Bridges one port of a USB modem to stdin/stdout. Bytes read from stdin are
//! queued to the modem's bulk OUT endpoint; bytes the modem sends arrive on
//! stdout. Logs go to stderr.

mod config;
mod sink;
mod usb;

use anyhow::{Context, Result, bail};
use async_channel::Receiver;
use clap::Parser;
use common::setup_logging;
use config::{BridgeConfig, expand_path};
use link::LinkController;
use protocol::ModemStatus;
use sink::StdoutSink;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use usb::{ModemDevice, RusbTransport};

/// Size of one stdin read
const STDIN_CHUNK: usize = 4096;

/// Chunks buffered between the stdin thread and the write loop
const STDIN_QUEUE: usize = 4;

/// How often modem status and device presence are checked
const WATCH_INTERVAL: Duration = Duration::from_millis(250);

/// Time allowed for the first modem-status notification with --status
const STATUS_SETTLE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "mdm-bridge")]
#[command(author, version, about = "Bridge a USB modem port to stdin/stdout")]
#[command(long_about = "
Opens one interface of a USB modem, sends stdin to it and writes whatever it
receives to stdout. On the modem interface (4) the control lines are tracked
and DTR is raised while the bridge runs.

EXAMPLES:
    # Talk to the modem port
    mdm-bridge

    # Another port of the same device, without DTR handling
    mdm-bridge --interface 2 --no-dtr

    # Print the modem status and exit
    mdm-bridge --status

CONFIGURATION:
    The bridge looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/mdm-bridge/bridge.toml
    3. /etc/mdm-bridge/bridge.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Interface number to bridge
    #[arg(short, long, value_name = "NUM")]
    interface: Option<u8>,

    /// Leave DTR alone
    #[arg(long)]
    no_dtr: bool,

    /// Print the modem status and exit
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = BridgeConfig::default();
        let path = BridgeConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        BridgeConfig::load(Some(expand_path(path))).context("Failed to load configuration")?
    } else {
        BridgeConfig::load_or_default()
    };

    if let Some(interface) = args.interface {
        config.device.interface = interface;
    }
    if args.no_dtr {
        config.link.assert_dtr = false;
    }

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.bridge.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("mdm-bridge v{}", env!("CARGO_PKG_VERSION"));

    let device = ModemDevice::open(
        config.vendor_id()?,
        config.product_id()?,
        config.device.interface,
    )
    .context("Failed to open modem")?;

    let result = run(&config, &device, args.status).await;
    device.close();
    result
}

/// Attach a link to the opened device and run one session on it
async fn run(config: &BridgeConfig, device: &ModemDevice, status_only: bool) -> Result<()> {
    let endpoints = device.endpoints();
    let link_config = config.link_config(
        endpoints.bulk_out.max_packet_size,
        endpoints.interrupt_in.map(|e| e.max_packet_size),
    );
    if link_config.is_control_port() && endpoints.interrupt_in.is_none() {
        bail!(
            "Interface {} has no interrupt endpoint for modem status",
            device.interface()
        );
    }

    let transport = Arc::new(RusbTransport::new(device.handle(), &endpoints)?);
    let link = LinkController::attach(
        transport.clone(),
        Arc::new(StdoutSink::stdout()),
        link_config,
    )
    .context("Failed to attach link")?;

    let result = session(&link, &transport, config, status_only).await;

    link.detach();
    transport.shutdown();
    result
}

async fn session(
    link: &LinkController,
    transport: &RusbTransport,
    config: &BridgeConfig,
    status_only: bool,
) -> Result<()> {
    link.open().context("Failed to open link")?;

    if config.link.assert_dtr
        && let Err(e) = link.set_dtr(true)
    {
        warn!("Failed to raise DTR: {}", e);
    }

    let result = if status_only {
        tokio::time::sleep(STATUS_SETTLE).await;
        println!("{}", describe_status(link.read_status()));
        Ok(())
    } else {
        let input = spawn_stdin_reader()?;
        info!("Bridging interface {}, Ctrl+C to stop", link.config().port_number);

        tokio::select! {
            result = pump_input(link, input) => result,
            () = watch(link, transport) => Ok(()),
            signal = signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Received Ctrl+C, shutting down"),
                    Err(e) => error!("Error waiting for Ctrl+C: {}", e),
                }
                Ok(())
            }
        }
    };

    if config.link.assert_dtr
        && !transport.is_disconnected()
        && let Err(e) = link.set_dtr(false)
    {
        warn!("Failed to drop DTR: {}", e);
    }

    link.close();
    result
}

/// Read stdin on a plain thread; the returned channel closes at EOF
fn spawn_stdin_reader() -> Result<Receiver<Vec<u8>>> {
    let (tx, rx) = async_channel::bounded(STDIN_QUEUE);

    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = vec![0u8; STDIN_CHUNK];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send_blocking(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    Ok(rx)
}

/// Feed stdin chunks to the link, waiting for write room when the pool is full
async fn pump_input(link: &LinkController, input: Receiver<Vec<u8>>) -> Result<()> {
    while let Ok(chunk) = input.recv().await {
        let mut rest = chunk.as_slice();
        while !rest.is_empty() {
            let written = link.write(rest).context("Write to modem failed")?;
            if written == 0 {
                if !link.is_open() {
                    bail!("Link closed with {} bytes unsent", rest.len());
                }
                link.writable().await;
                continue;
            }
            rest = &rest[written..];
        }
    }

    info!("stdin closed");
    Ok(())
}

/// Log modem status changes; returns when the device goes away
async fn watch(link: &LinkController, transport: &RusbTransport) {
    let mut interval = tokio::time::interval(WATCH_INTERVAL);
    let mut last = link.read_status();

    loop {
        interval.tick().await;

        if transport.is_disconnected() {
            warn!("Modem disconnected");
            return;
        }

        let status = link.read_status();
        if status != last {
            info!("Modem status: {}", describe_status(status));
            last = status;
        }
    }
}

/// Human-readable list of the raised lines
fn describe_status(status: ModemStatus) -> String {
    let lines = [
        (ModemStatus::DTR, "DTR"),
        (ModemStatus::RTS, "RTS"),
        (ModemStatus::CAR, "DCD"),
        (ModemStatus::DSR, "DSR"),
        (ModemStatus::RNG, "RI"),
    ];

    let raised: Vec<&str> = lines
        .iter()
        .filter(|(flag, _)| status.contains(*flag))
        .map(|(_, name)| *name)
        .collect();

    if raised.is_empty() {
        "no lines raised".to_string()
    } else {
        raised.join(" ")
    }
}

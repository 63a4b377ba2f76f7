use anyhow::{Context, Result};
use clap::{Args, Parser};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use sessantaquattro_lib::constants::DEFAULT_PORT;
use sessantaquattro_lib::monitor::{FrameDecimator, RateMeter};
use sessantaquattro_lib::{DecodedFrame, DeviceConfiguration, DeviceSession, FormatTriple, SessionSettings};
use sessantaquattro_rs::logging::setup_logging;

/// Acquire and print live channel data from a Sessantaquattro bio-signal logger.
///
/// The device connects to this host; every decoded frame is written to stdout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on for the device.
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    address: IpAddr,
    /// TCP port the device connects to.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// JSON file with the device configuration. Flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(flatten)]
    device: DeviceArgs,
    /// Convert bio-measurement channels to millivolts.
    #[arg(short, long)]
    millivolts: bool,
    /// Seconds without data before the device is considered gone (0 waits forever).
    #[arg(long, default_value_t = 5)]
    read_timeout_secs: u64,
    /// Consecutive undecodable frames tolerated before giving up.
    #[arg(long, default_value_t = 3)]
    max_decode_errors: u32,
    /// Print every frame instead of decimating to the display refresh rate.
    #[arg(long)]
    all_frames: bool,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

/// Device configuration overrides. Unset fields keep the base configuration.
#[derive(Args, Debug)]
struct DeviceArgs {
    /// Record on the device SD card (0/1).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    rec: Option<u8>,
    /// Trigger input (0/1).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    trig: Option<u8>,
    /// External input (0/1).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    ext: Option<u8>,
    /// High-pass filter (0/1).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    hpf: Option<u8>,
    /// High resolution, 24-bit samples (0/1).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    hres: Option<u8>,
    /// Working mode (0-3).
    #[arg(long)]
    mode: Option<u8>,
    /// Channel selection (0-3).
    #[arg(long)]
    nch: Option<u8>,
    /// Sampling frequency selection (0-3).
    #[arg(long)]
    fsamp: Option<u8>,
    /// Get/set flag (0/1).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    getset: Option<u8>,
}

impl DeviceArgs {
    fn apply(&self, mut config: DeviceConfiguration) -> DeviceConfiguration {
        let flag = |value: Option<u8>, current: bool| value.map_or(current, |v| v == 1);
        config.rec = flag(self.rec, config.rec);
        config.trig = flag(self.trig, config.trig);
        config.ext = flag(self.ext, config.ext);
        config.hpf = flag(self.hpf, config.hpf);
        config.hres = flag(self.hres, config.hres);
        config.getset = flag(self.getset, config.getset);
        config.mode = self.mode.unwrap_or(config.mode);
        config.nch = self.nch.unwrap_or(config.nch);
        config.fsamp = self.fsamp.unwrap_or(config.fsamp);
        config
    }
}

impl Cli {
    fn device_configuration(&self) -> Result<DeviceConfiguration> {
        let base = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read configuration file: {:?}", path))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse configuration file: {:?}", path))?
            }
            // High-pass filter and 24-bit samples, 12 channels at 500 Hz
            None => DeviceConfiguration {
                hpf: true,
                hres: true,
                ..Default::default()
            },
        };
        Ok(self.device.apply(base))
    }

    fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            bind_addr: SocketAddr::new(self.address, self.port),
            scale_to_millivolts: self.millivolts,
            read_timeout: (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs)),
            accept_timeout: None,
            max_consecutive_decode_errors: self.max_decode_errors,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.as_deref(), &cli.verbose)?;

    if let Err(e) = run(cli).await {
        error!("Acquisition failed: {:?}", e);
        process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.device_configuration()?;
    let mut session =
        DeviceSession::new(&config, cli.session_settings()).context("Invalid device configuration")?;
    let format = session.format();
    info!(
        "Starting to log data: {} channels with {} Hz sampling rate",
        format.number_of_channels, format.sample_frequency_hz
    );

    session.listen().context("Failed to open listening socket")?;
    let accepted = tokio::select! {
        res = session.accept() => Some(res),
        _ = signal::ctrl_c() => None,
    };
    match accepted {
        Some(res) => {
            res.context("Device connection failed")?;
        }
        None => {
            info!("Ctrl+C received, shutting down gracefully.");
            session.stop().await;
            return Ok(());
        }
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_frames(rx, format, cli.all_frames));

    let outcome = session
        .stream(tx, async {
            let _ = signal::ctrl_c().await;
            info!("Ctrl+C received, stopping device.");
        })
        .await;

    // The sender is gone once the stream returns, so the printer drains and exits
    printer.await.context("Frame printer panicked")?;
    let summary = outcome.context("Streaming stopped")?;
    info!(
        "Finished: {} frames received, {} dropped",
        summary.delivered, summary.dropped
    );
    Ok(())
}

async fn print_frames(mut rx: mpsc::UnboundedReceiver<DecodedFrame>, format: FormatTriple, all_frames: bool) {
    let mut decimator = if all_frames {
        FrameDecimator::new(1, 1)
    } else {
        FrameDecimator::for_display(format.sample_frequency_hz)
    };
    let mut meter = RateMeter::new();

    while let Some(frame) = rx.recv().await {
        if !decimator.accept() {
            continue;
        }
        if let Some(rate) = meter.tick() {
            debug!("{:.2} updates/s", rate);
        }
        println!("{}", frame);
    }
}

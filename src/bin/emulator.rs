use anyhow::{Context, Result, bail};
use bytes::{BufMut, BytesMut};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::f64::consts::TAU;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, error, info, warn};

use sessantaquattro_lib::constants::CONVERSION_FACTOR_MV;
use sessantaquattro_lib::sample::{encode_sample, sample_range};
use sessantaquattro_lib::{ControlWord, DeviceConfiguration, FormatTriple};
use sessantaquattro_rs::logging::setup_logging;

// Frames are written in batches on this period
const TICK: Duration = Duration::from_millis(10);

/// A software stand-in for a Sessantaquattro device.
///
/// Connects to a listening host, waits for the start command and streams
/// synthetic frames in the format the command asks for.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host the acquisition software listens on.
    #[arg(long, default_value = "127.0.0.1:45454")]
    host: SocketAddr,
    /// Peak amplitude of the synthetic bio signals in millivolts.
    #[arg(long, default_value_t = 1.0)]
    amplitude_mv: f64,
    /// Frequency of the synthetic bio signals in Hz.
    #[arg(long, default_value_t = 10.0)]
    signal_hz: f64,
    /// Hang up after this many frames instead of waiting for the stop command.
    #[arg(long)]
    frames: Option<u64>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

/// Produces sine waves on the bio channels and counters on the auxiliary ones
struct SignalGenerator {
    format: FormatTriple,
    amplitude_counts: f64,
    signal_hz: f64,
    frame_index: u64,
}

impl SignalGenerator {
    fn new(format: FormatTriple, amplitude_mv: f64, signal_hz: f64) -> Result<Self> {
        let range = sample_range(format.bytes_per_sample)?;
        let limit = (*range.end()) as f64;
        Ok(Self {
            format,
            amplitude_counts: (amplitude_mv / CONVERSION_FACTOR_MV).clamp(0.0, limit),
            signal_hz,
            frame_index: 0,
        })
    }

    fn sample(&self, channel: usize) -> i32 {
        let width = self.format.bytes_per_sample;
        if channel < self.format.bio_channel_count() {
            let t = self.frame_index as f64 / self.format.sample_frequency_hz as f64;
            let phase = channel as f64 * TAU / self.format.bio_channel_count() as f64;
            (self.amplitude_counts * (TAU * self.signal_hz * t + phase).sin()).round() as i32
        } else {
            let modulus = 1u64 << (8 * width - 1);
            ((self.frame_index + channel as u64) % modulus) as i32
        }
    }

    fn write_frames(&mut self, count: u64, out: &mut BytesMut) -> Result<()> {
        for _ in 0..count {
            for channel in 0..self.format.number_of_channels {
                let bytes = encode_sample(self.sample(channel), self.format.bytes_per_sample)?;
                out.put_slice(&bytes);
            }
            self.frame_index += 1;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(None, &cli.verbose)?;

    if let Err(e) = run(cli).await {
        error!("Emulator failed: {:?}", e);
        process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    info!("Connecting to {}...", cli.host);
    let stream = TcpStream::connect(cli.host)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.host))?;
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let mut word = [0u8; 2];
    reader
        .read_exact(&mut word)
        .await
        .context("Host closed before sending the start command")?;
    let word = ControlWord::from_wire(word);
    let config = DeviceConfiguration::from(word);
    if !config.start {
        bail!("Control word {} does not have the start bit set", word);
    }
    let format = config.format()?;
    info!("Start command {} received, streaming {}", word, format);

    let mut stop = tokio::spawn(wait_for_stop(reader));
    let mut generator = SignalGenerator::new(format, cli.amplitude_mv, cli.signal_hz)?;
    let frames_per_tick = (format.sample_frequency_hz as u64 * TICK.as_millis() as u64 / 1000).max(1);
    let mut buffer = BytesMut::with_capacity(frames_per_tick as usize * format.frame_len());
    let mut interval = tokio::time::interval(TICK);
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            res = &mut stop => {
                res.context("Control reader panicked")??;
                break;
            }
            _ = interval.tick() => {
                let count = match cli.frames {
                    Some(limit) if sent >= limit => {
                        info!("Sent {} frames, hanging up", sent);
                        break;
                    }
                    Some(limit) => frames_per_tick.min(limit - sent),
                    None => frames_per_tick,
                };
                buffer.clear();
                generator.write_frames(count, &mut buffer)?;
                if let Err(e) = writer.write_all(&buffer).await {
                    if is_disconnect(&e) {
                        warn!("Host went away: {}", e);
                        break;
                    }
                    return Err(e.into());
                }
                sent += count;
            }
        }
    }

    // Close our side; the host sees end of stream
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown after stop: {}", e);
    }
    info!("Emulator finished after {} frames", sent);
    Ok(())
}

/// Read control words until one clears the start bit or the host hangs up
async fn wait_for_stop(mut reader: OwnedReadHalf) -> Result<()> {
    let mut word = [0u8; 2];
    loop {
        match reader.read_exact(&mut word).await {
            Ok(_) => {
                let word = ControlWord::from_wire(word);
                if !word.start() {
                    info!("Stop command {} received", word);
                    return Ok(());
                }
                debug!("Ignoring control word {}", word);
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof || is_disconnect(&e) => {
                info!("Host closed the connection");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}

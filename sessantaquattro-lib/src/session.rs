use crate::config::{ControlWord, DeviceConfiguration, FormatTriple};
use crate::constants::DEFAULT_PORT;
use crate::error::{ConnectionError, SqError};
use crate::frame::{DecodeErrorBudget, FrameDemux};
use crate::sink::FrameSink;
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr};
use std::time::Duration;
use strum_macros::Display;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

// Default bound on a single socket read while streaming
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_MAX_DECODE_ERRORS: u32 = 3;

/// Lifecycle of a [`DeviceSession`]. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    #[strum(to_string = "not connected")]
    NotConnected,
    #[strum(to_string = "listening")]
    Listening,
    #[strum(to_string = "connected")]
    Connected,
    #[strum(to_string = "disconnected")]
    Disconnected,
}

/// Everything about a session that is not part of the device configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Address the device connects to
    pub bind_addr: SocketAddr,
    /// Convert bio-measurement channels to millivolts
    pub scale_to_millivolts: bool,
    /// Bound on every socket read while streaming; `None` waits forever
    pub read_timeout: Option<Duration>,
    /// Bound on waiting for the device to connect; `None` waits forever
    pub accept_timeout: Option<Duration>,
    /// Consecutive undecodable frames tolerated before the stream is abandoned
    pub max_consecutive_decode_errors: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            scale_to_millivolts: false,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            accept_timeout: None,
            max_consecutive_decode_errors: DEFAULT_MAX_DECODE_ERRORS,
        }
    }
}

/// Why a stream ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StopReason {
    #[strum(to_string = "stop requested")]
    Requested,
    #[strum(to_string = "consumer closed")]
    ConsumerClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    /// Frames handed to the sink
    pub delivered: u64,
    /// Frames dropped because they failed to decode
    pub dropped: u64,
    pub reason: StopReason,
}

/// A single acquisition session with one device.
///
/// The session listens on [`SessionSettings::bind_addr`], accepts exactly one
/// connection, sends the start command and then streams frames until it is
/// told to stop or the device goes away. Sockets are owned by the session and
/// released when it reaches `Disconnected` or is dropped.
pub struct DeviceSession {
    settings: SessionSettings,
    start_word: ControlWord,
    demux: FrameDemux,
    state: SessionState,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl DeviceSession {
    /// Resolve the configuration and create an unconnected session.
    /// No socket is opened if the configuration is invalid.
    pub fn new(config: &DeviceConfiguration, settings: SessionSettings) -> Result<Self, SqError> {
        let (word, format) = config.resolve()?;
        let start_word = word.with_start(true);
        let demux = FrameDemux::new(format, settings.scale_to_millivolts)?;

        info!(
            "Session configured: {} (control word {})",
            format, start_word
        );

        Ok(Self {
            settings,
            start_word,
            demux,
            state: SessionState::NotConnected,
            listener: None,
            stream: None,
            peer: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn format(&self) -> FormatTriple {
        self.demux.format()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Control word sent on connect
    pub fn start_word(&self) -> ControlWord {
        self.start_word
    }

    /// Control word sent on stop
    pub fn stop_word(&self) -> ControlWord {
        self.start_word.stop_word()
    }

    /// Address actually bound, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), SqError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SqError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    /// Bind the listening socket. `NotConnected -> Listening`.
    pub fn listen(&mut self) -> Result<SocketAddr, SqError> {
        self.expect_state(SessionState::NotConnected)?;

        let addr = self.settings.bind_addr;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1)?;
        let local = listener.local_addr()?;

        info!("Waiting for connection on {}...", local);
        self.listener = Some(listener);
        self.state = SessionState::Listening;
        Ok(local)
    }

    /// Accept the device and send the start command. `Listening -> Connected`.
    pub async fn accept(&mut self) -> Result<SocketAddr, SqError> {
        self.expect_state(SessionState::Listening)?;
        let Some(listener) = self.listener.take() else {
            self.state = SessionState::Disconnected;
            return Err(SqError::InvalidState {
                expected: SessionState::Listening,
                actual: SessionState::Disconnected,
            });
        };

        // Any failure from here on ends the session
        self.state = SessionState::Disconnected;

        let accepted = match self.settings.accept_timeout {
            Some(limit) => timeout(limit, listener.accept())
                .await
                .map_err(|_| ConnectionError::AcceptTimeout(limit))?,
            None => listener.accept().await,
        };
        let (mut stream, peer) = accepted?;
        stream.set_nodelay(true)?;
        info!("Connection from address: {}", peer);

        let word = self.start_word.to_wire();
        debug!(bytes = hex::encode(word), "Sending start command");
        stream.write_all(&word).await.map_err(ConnectionError::Reset)?;

        self.stream = Some(stream);
        self.peer = Some(peer);
        self.state = SessionState::Connected;
        Ok(peer)
    }

    /// `listen` followed by `accept`
    pub async fn connect(&mut self) -> Result<SocketAddr, SqError> {
        self.listen()?;
        self.accept().await
    }

    /// Read, decode and deliver frames until `shutdown` resolves, the sink
    /// closes or the connection fails. `Connected -> Disconnected`.
    ///
    /// On a requested stop, a closed sink, a read timeout or a corrupted
    /// stream the stop command is sent before the socket is shut down. When
    /// the device itself disconnects the socket is only closed.
    pub async fn stream<S, F>(&mut self, mut sink: S, shutdown: F) -> Result<StreamSummary, SqError>
    where
        S: FrameSink,
        F: Future<Output = ()>,
    {
        self.expect_state(SessionState::Connected)?;
        let Some(mut stream) = self.stream.take() else {
            self.state = SessionState::Disconnected;
            return Err(ConnectionError::PeerDisconnected.into());
        };
        // The socket is owned by this call from here on and closed on every exit
        self.state = SessionState::Disconnected;

        let outcome = self.read_loop(&mut stream, &mut sink, shutdown).await;

        let peer_gone = matches!(
            outcome,
            Err(SqError::Connection(
                ConnectionError::PeerDisconnected | ConnectionError::Reset(_)
            ))
        );
        match &outcome {
            Ok(summary) => info!(
                "Stream ended ({}): {} frames delivered, {} dropped",
                summary.reason, summary.delivered, summary.dropped
            ),
            Err(e) => error!("Stream failed: {}", e),
        }
        self.teardown(stream, !peer_gone).await;
        outcome
    }

    /// Stop a session without streaming. Safe to call in any state.
    pub async fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.teardown(stream, true).await;
        }
        if self.listener.take().is_some() {
            info!("Stopped listening");
        }
        self.state = SessionState::Disconnected;
    }

    async fn read_loop<S, F>(
        &self,
        stream: &mut TcpStream,
        sink: &mut S,
        shutdown: F,
    ) -> Result<StreamSummary, SqError>
    where
        S: FrameSink,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut buffer = BytesMut::zeroed(self.format().frame_len());
        let mut budget = DecodeErrorBudget::new(self.settings.max_consecutive_decode_errors);
        let mut sequence: u64 = 0;
        let mut delivered: u64 = 0;
        let mut dropped: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Stop requested after {} frames", sequence);
                    return Ok(StreamSummary { delivered, dropped, reason: StopReason::Requested });
                }
                read = self.read_frame(stream, &mut buffer) => read?,
            }

            match self.demux.decode(sequence, &buffer) {
                Ok(frame) => {
                    budget.record_success();
                    trace!(sequence, bytes = hex::encode(&buffer), "Frame");
                    if !sink.deliver(frame) {
                        info!("Consumer closed after {} frames", delivered);
                        return Ok(StreamSummary {
                            delivered,
                            dropped,
                            reason: StopReason::ConsumerClosed,
                        });
                    }
                    delivered += 1;
                }
                Err(e) => {
                    dropped += 1;
                    warn!(sequence, "Dropping malformed frame: {}", e);
                    if budget.record_failure() {
                        return Err(ConnectionError::StreamCorrupted {
                            consecutive: budget.consecutive(),
                        }
                        .into());
                    }
                }
            }
            sequence += 1;
        }
    }

    /// Fill `buffer` completely. The transport may hand out fewer bytes per
    /// read than requested; a zero-length read means the device hung up.
    async fn read_frame(&self, stream: &mut TcpStream, buffer: &mut [u8]) -> Result<(), SqError> {
        let mut filled = 0;
        while filled < buffer.len() {
            let read = stream.read(&mut buffer[filled..]);
            let n = match self.settings.read_timeout {
                Some(limit) => timeout(limit, read)
                    .await
                    .map_err(|_| ConnectionError::ReadTimeout(limit))?,
                None => read.await,
            }
            .map_err(ConnectionError::Reset)?;

            if n == 0 {
                if filled > 0 {
                    warn!("Device disconnected mid-frame ({} of {} bytes)", filled, buffer.len());
                }
                return Err(ConnectionError::PeerDisconnected.into());
            }
            filled += n;
            if filled < buffer.len() {
                trace!(filled, expected = buffer.len(), "Short read");
            }
        }
        Ok(())
    }

    async fn teardown(&self, mut stream: TcpStream, send_stop: bool) {
        if send_stop {
            let word = self.stop_word().to_wire();
            debug!(bytes = hex::encode(word), "Sending stop command");
            let sent = match stream.write_all(&word).await {
                Ok(()) => stream.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                warn!("Failed to send stop command: {}", e);
            }
        }

        match stream.into_std() {
            Ok(std_stream) => {
                if let Err(e) = std_stream.shutdown(Shutdown::Both) {
                    if e.kind() != io::ErrorKind::NotConnected {
                        warn!("Socket shutdown failed: {}", e);
                    }
                }
            }
            Err(e) => warn!("Failed to detach socket for shutdown: {}", e),
        }
        info!("Disconnected from device");
    }
}

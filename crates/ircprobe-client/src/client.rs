//! Simulated IRC client.
//!
//! A [`SimClient`] owns one TCP connection and one [`LineBuffer`]. It runs a
//! [`ClientScript`] strictly in order and records every line it sends and
//! receives. Sends never wait for replies. Every read is bounded by the
//! configured read timeout, so a silent server can delay a client but never
//! hang it.
//!
//! Every failure after connect ends the run with a terminal
//! [`ClientOutcome`] instead of an error, and the connection is dropped on
//! every path.

use std::time::Duration;

use ircprobe_proto::{Command, LineBuffer, Message, Pattern};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::Instant,
};
use tracing::Instrument;

use crate::{
    endpoint::Endpoint,
    error::ClientError,
    script::{Action, ClientScript},
    signal::SignalBoard,
    transcript::{ClientId, ClientOutcome, Direction, Transcript, TranscriptRecorder},
};

/// Timing and behaviour knobs for a simulated client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound on the TCP handshake.
    pub connect_timeout: Duration,
    /// Upper bound on a single read. A listen phase ends early after one
    /// full read timeout without data.
    pub read_timeout: Duration,
    /// Listen phase appended after the last scripted action.
    pub listen_window: Duration,
    /// Answer `PING` with `PONG` while observing.
    pub auto_pong: bool,
    /// Size of the socket read buffer.
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(3),
            listen_window: Duration::from_secs(2),
            auto_pong: true,
            read_buffer_size: 4096,
        }
    }
}

/// When an observe phase stops, besides its time bound.
#[derive(Debug, Clone, Copy)]
enum Until<'a> {
    /// Stop after one full read timeout without data.
    Quiet,
    /// Stop at the first line matching any pattern.
    Match(&'a [Pattern]),
}

/// One protocol participant with an established connection.
#[derive(Debug)]
pub struct SimClient {
    id: ClientId,
    endpoint: Endpoint,
    stream: TcpStream,
    lines: LineBuffer,
    recorder: TranscriptRecorder,
    config: ClientConfig,
    read_buf: Vec<u8>,
}

impl SimClient {
    /// Open the connection.
    ///
    /// # Errors
    ///
    /// [`ClientError::Connect`] if the peer refuses or the host does not
    /// resolve, [`ClientError::ConnectTimeout`] if the handshake does not
    /// finish within `config.connect_timeout`.
    pub async fn connect(
        id: impl Into<ClientId>,
        endpoint: Endpoint,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let id = id.into();
        let connect = TcpStream::connect((endpoint.host(), endpoint.port()));
        let stream = match tokio::time::timeout(config.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ClientError::Connect { endpoint, source }),
            Err(_) => {
                let timeout = config.connect_timeout;
                return Err(ClientError::ConnectTimeout { endpoint, timeout });
            },
        };
        stream.set_nodelay(true)?;

        tracing::debug!(client = %id, %endpoint, "connected");

        let recorder = TranscriptRecorder::new(id.clone(), endpoint.clone());
        let read_buf = vec![0; config.read_buffer_size.max(1)];
        Ok(Self { id, endpoint, stream, lines: LineBuffer::new(), recorder, config, read_buf })
    }

    /// Client identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run `script` to a terminal state and hand back the transcript.
    ///
    /// If `deadline` passes first the script is cancelled and the outcome is
    /// [`ClientOutcome::TimedOut`]; lines captured up to that point are kept.
    pub async fn run(
        mut self,
        script: &ClientScript,
        signals: &SignalBoard,
        deadline: Option<Instant>,
    ) -> Transcript {
        let span = tracing::info_span!("client", id = %self.id, endpoint = %self.endpoint);
        async move {
            let outcome = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.drive(script, signals)).await {
                        Ok(result) => outcome_of(result),
                        Err(_) => ClientOutcome::TimedOut,
                    }
                },
                None => outcome_of(self.drive(script, signals).await),
            };
            self.finish(outcome)
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &mut self,
        script: &ClientScript,
        signals: &SignalBoard,
    ) -> Result<(), ClientError> {
        for action in script.actions() {
            match action {
                Action::Send(command) => self.send(command).await?,
                Action::Listen(duration) => {
                    self.observe(Instant::now() + *duration, Until::Quiet).await?;
                },
                Action::Expect { any_of, timeout } => {
                    let until = Instant::now() + *timeout;
                    let matched = self.observe(until, Until::Match(any_of)).await?;
                    if !matched {
                        tracing::debug!(?any_of, "expected line did not arrive");
                    }
                },
                Action::Sleep(duration) => tokio::time::sleep(*duration).await,
                Action::Signal(name) => {
                    signals.raise(name)?;
                    tracing::debug!(signal = %name, "raised signal");
                },
                Action::AwaitSignal { name, timeout } => {
                    signals.wait(name, *timeout).await?;
                    tracing::debug!(signal = %name, "signal observed");
                },
            }
        }

        if !self.config.listen_window.is_zero() {
            self.observe(Instant::now() + self.config.listen_window, Until::Quiet).await?;
        }

        Ok(())
    }

    async fn send(&mut self, command: &Command) -> Result<(), ClientError> {
        let line = command.to_line()?;
        self.stream.write_all(line.as_bytes()).await?;

        let line = line.trim_end_matches(['\r', '\n']).to_string();
        tracing::debug!(%line, "sent");
        self.recorder.record(Direction::Sent, line);
        Ok(())
    }

    /// Read and record until `until`, the stop condition, or end of stream.
    ///
    /// Returns whether a line matched `Until::Match`.
    async fn observe(&mut self, until: Instant, stop: Until<'_>) -> Result<bool, ClientError> {
        loop {
            let now = Instant::now();
            if now >= until {
                return Ok(false);
            }
            let wait = (until - now).min(self.config.read_timeout);

            let read = tokio::time::timeout(wait, self.stream.read(&mut self.read_buf)).await;
            let n = match read {
                Err(_) => match stop {
                    Until::Quiet => return Ok(false),
                    Until::Match(_) => continue,
                },
                Ok(Ok(0)) => {
                    self.flush_tail();
                    return Err(ClientError::Closed);
                },
                Ok(Ok(n)) => n,
                Ok(Err(err)) => return Err(err.into()),
            };

            self.lines.extend(&self.read_buf[..n]);
            let lines: Vec<String> = self.lines.drain().collect();

            let mut matched = false;
            for line in lines {
                if let Until::Match(patterns) = stop {
                    matched |= Pattern::any_matches(patterns, &line);
                }
                self.receive(line).await?;
            }
            if matched {
                return Ok(true);
            }
        }
    }

    async fn receive(&mut self, line: String) -> Result<(), ClientError> {
        tracing::debug!(%line, "received");
        let pong = self.config.auto_pong.then(|| ping_token(&line)).flatten();
        self.recorder.record(Direction::Received, line);

        if let Some(token) = pong {
            self.send(&Command::Pong(token)).await?;
        }
        Ok(())
    }

    fn flush_tail(&mut self) {
        if let Some(tail) = self.lines.finish() {
            tracing::debug!(line = %tail, "received unterminated tail");
            self.recorder.record(Direction::Received, tail);
        }
    }

    fn finish(mut self, outcome: ClientOutcome) -> Transcript {
        self.flush_tail();
        match &outcome {
            ClientOutcome::TimedOut | ClientOutcome::IoFailed(_) | ClientOutcome::Aborted(_) => {
                tracing::warn!(%outcome, lines = self.recorder.len(), "client stopped");
            },
            _ => tracing::info!(%outcome, lines = self.recorder.len(), "client finished"),
        }

        let Self { stream, recorder, .. } = self;
        drop(stream);
        recorder.finish(outcome)
    }
}

fn outcome_of(result: Result<(), ClientError>) -> ClientOutcome {
    match result {
        Ok(()) => ClientOutcome::Completed,
        Err(err) => err.outcome(),
    }
}

fn ping_token(line: &str) -> Option<String> {
    let msg = Message::parse(line).ok()?;
    (msg.command == "PING").then(|| msg.trailing().unwrap_or_default().to_string())
}

/// Connect and run a script, folding a failed connect into the transcript.
///
/// This never fails: a client that cannot connect yields an empty transcript
/// with [`ClientOutcome::ConnectFailed`], and a connect still pending at
/// `deadline` yields [`ClientOutcome::TimedOut`].
pub async fn simulate(
    id: ClientId,
    endpoint: Endpoint,
    config: &ClientConfig,
    script: &ClientScript,
    signals: &SignalBoard,
    deadline: Option<Instant>,
) -> Transcript {
    let connect = SimClient::connect(id.clone(), endpoint.clone(), config.clone());
    let connected = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, connect).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(client = %id, %endpoint, "deadline passed while connecting");
                return Transcript::empty(id, endpoint, ClientOutcome::TimedOut);
            },
        },
        None => connect.await,
    };

    match connected {
        Ok(client) => client.run(script, signals, deadline).await,
        Err(err) => {
            tracing::warn!(client = %id, %endpoint, error = %err, "connect failed");
            Transcript::empty(id, endpoint, err.outcome())
        },
    }
}

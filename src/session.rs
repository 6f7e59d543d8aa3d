//! The playback session: a loaded source, its read cursor, the formatter for
//! the active transport and the delivery discipline.
//!
//! A session never talks to the host interpreter. In pull mode each tick only
//! moves the next formatted line into a capacity-1 handoff that the host's
//! poll drains; in push mode the tick sends through the peer transport itself.

use crate::config::EngineConfig;
use crate::control::Notice;
use crate::error::{PacerError, ResourceError, StateError, TransportError};
use crate::formatter::LineFormatter;
use crate::splitter::LineSplitter;
use crate::transport::{PeerTransport, Transport};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

/// A formatted line travelling from the timer to the host's poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Handoff {
    /// Session that produced the line; lines from a stopped session are
    /// dropped by the receiver.
    pub generation: u64,
    pub command: Vec<u8>,
    /// The source ran out with this line.
    pub last: bool,
}

pub(crate) enum Delivery {
    /// The host pulls each line from the handoff during its poll.
    Pull(mpsc::Sender<Handoff>),
    /// Each tick sends straight to the peer process.
    Push(PeerTransport),
}

/// What a single timer tick did.
#[derive(Debug)]
pub(crate) enum TickOutcome {
    /// Paused, or the handoff is still occupied.
    Idle,
    /// A line is waiting in the handoff.
    Queued,
    /// A line reached the peer.
    Delivered { command: Vec<u8>, finished: bool },
    /// The source is exhausted and nothing is left in flight.
    Finished,
    Failed(PacerError),
}

/// Splitter plus formatter; produces formatted lines until the source ends.
struct LineSource {
    splitter: LineSplitter,
    formatter: LineFormatter,
    end_of_source: bool,
}

impl LineSource {
    async fn produce(&mut self, generation: u64) -> Result<Option<Handoff>, ResourceError> {
        let Some(line) = self.splitter.next_line() else {
            self.end_of_source = true;
            return Ok(None);
        };
        self.end_of_source = line.last;
        let command = self.formatter.format(&line.text).await?;
        trace!(cursor = self.splitter.cursor(), last = line.last, "produced line");
        Ok(Some(Handoff {
            generation,
            command,
            last: line.last,
        }))
    }
}

pub(crate) struct PlaybackSession {
    source: LineSource,
    delivery: Delivery,
    generation: u64,
    interval: Duration,
    paused: bool,
    /// Push mode: the line produced ahead of the next tick.
    pending: Option<Handoff>,
    /// Pull mode: the final line has gone into the handoff.
    handed_last: bool,
}

impl PlaybackSession {
    pub(crate) fn new(
        buffer: Vec<u8>,
        max_line_bytes: usize,
        formatter: LineFormatter,
        delivery: Delivery,
        generation: u64,
        interval: Duration,
    ) -> Self {
        Self {
            source: LineSource {
                splitter: LineSplitter::with_line_limit(buffer, max_line_bytes),
                formatter,
                end_of_source: false,
            },
            delivery,
            generation,
            interval,
            paused: false,
            pending: None,
            handed_last: false,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn is_pull(&self) -> bool {
        matches!(self.delivery, Delivery::Pull(_))
    }

    pub(crate) fn channel(&self) -> &str {
        self.source.formatter.channel()
    }

    /// Produce the first line ahead of the first tick.
    ///
    /// Returns `false` when the source holds no line at all.
    pub(crate) async fn prime(&mut self) -> Result<bool, ResourceError> {
        let Some(handoff) = self.source.produce(self.generation).await? else {
            return Ok(false);
        };
        match &self.delivery {
            Delivery::Pull(sender) => {
                self.handed_last = handoff.last;
                // the handoff is fresh, so this only fails if the receiver is gone
                if sender.try_send(handoff).is_err() {
                    debug!("handoff receiver dropped before the first line");
                }
            }
            Delivery::Push(_) => self.pending = Some(handoff),
        }
        Ok(true)
    }

    pub(crate) fn pause(&mut self) -> Result<(), StateError> {
        if self.paused {
            return Err(StateError::AlreadyPaused);
        }
        self.paused = true;
        Ok(())
    }

    pub(crate) fn resume(&mut self) -> Result<(), StateError> {
        if !self.paused {
            return Err(StateError::NotPaused);
        }
        self.paused = false;
        Ok(())
    }

    pub(crate) async fn tick(&mut self) -> TickOutcome {
        if self.paused {
            return TickOutcome::Idle;
        }
        match &mut self.delivery {
            Delivery::Pull(sender) => {
                if self.source.end_of_source {
                    return if self.handed_last {
                        TickOutcome::Idle
                    } else {
                        TickOutcome::Finished
                    };
                }
                let permit = match sender.try_reserve() {
                    Ok(permit) => permit,
                    Err(TrySendError::Full(())) => return TickOutcome::Idle,
                    Err(TrySendError::Closed(())) => {
                        return TickOutcome::Failed(TransportError::HandoffClosed.into());
                    }
                };
                match self.source.produce(self.generation).await {
                    Ok(Some(handoff)) => {
                        self.handed_last = handoff.last;
                        permit.send(handoff);
                        TickOutcome::Queued
                    }
                    Ok(None) if self.handed_last => TickOutcome::Idle,
                    Ok(None) => TickOutcome::Finished,
                    Err(err) => TickOutcome::Failed(err.into()),
                }
            }
            Delivery::Push(transport) => {
                let next = match self.pending.take() {
                    Some(handoff) => Some(handoff),
                    None if self.source.end_of_source => None,
                    None => match self.source.produce(self.generation).await {
                        Ok(next) => next,
                        Err(err) => return TickOutcome::Failed(err.into()),
                    },
                };
                let Some(handoff) = next else {
                    return TickOutcome::Finished;
                };
                match transport.send(&handoff.command).await {
                    Ok(()) => TickOutcome::Delivered {
                        command: handoff.command,
                        finished: handoff.last,
                    },
                    Err(err) => TickOutcome::Failed(err.into()),
                }
            }
        }
    }

    /// Send `notice` to the peer right away. Pull sessions queue notices for
    /// the host instead, so this returns `None` for them.
    pub(crate) async fn announce(&mut self, notice: Notice) -> Option<Result<(), TransportError>> {
        let command = self.source.formatter.notice(notice);
        match &mut self.delivery {
            Delivery::Pull(_) => None,
            Delivery::Push(transport) => Some(transport.send(&command).await),
        }
    }

    /// Release the transport. The buffer goes with `self`.
    pub(crate) async fn close(self) {
        if let Delivery::Push(mut transport) = self.delivery {
            transport.shutdown().await;
        }
    }
}

/// Read a source file fully into memory.
///
/// Fails on a missing, empty or oversized file, on an allocation failure and
/// on a read that comes up short.
pub(crate) async fn load_source(
    path: &Path,
    config: &EngineConfig,
) -> Result<Vec<u8>, ResourceError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| ResourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let size = file
        .metadata()
        .await
        .map_err(|source| ResourceError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    if size == 0 {
        return Err(ResourceError::Empty(path.to_path_buf()));
    }
    if size > config.max_source_bytes {
        return Err(ResourceError::TooBig {
            path: path.to_path_buf(),
            size,
            limit: config.max_source_bytes,
        });
    }

    let expected = usize::try_from(size).map_err(|_| ResourceError::OutOfMemory(size))?;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(expected)
        .map_err(|_| ResourceError::OutOfMemory(size))?;
    let read = file
        .read_to_end(&mut buffer)
        .await
        .map_err(|source| ResourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if read < expected {
        return Err(ResourceError::ShortRead {
            path: path.to_path_buf(),
            read,
            expected: size,
        });
    }

    debug!(path = %path.display(), bytes = read, "loaded source");
    Ok(buffer)
}

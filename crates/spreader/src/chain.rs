//! DestinationChain - one destination with its own FIFO and worker task
//!
//! Each destination gets an unbounded queue of [`ChainOp`]s drained by a
//! dedicated task. The queue is the only ordering mechanism: op N+1 starts
//! after op N finished, independently of every other destination.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use contracts::{ByteSink, ContractError};

use crate::chunk_store::Chunk;
use crate::error::{DestinationFailure, DestinationId, FailureKind};
use crate::metrics::SinkMetrics;

/// How each chain step performs its write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// `write_blocking` on the blocking pool; the step ends when it returns
    Blocking,
    /// `write` awaited on the worker task
    Overlapped,
}

impl WriteMode {
    pub fn from_asynchronous(asynchronous: bool) -> Self {
        if asynchronous {
            Self::Overlapped
        } else {
            Self::Blocking
        }
    }
}

type Reply = oneshot::Sender<Result<(), FailureKind>>;

/// Unit of work queued on a chain
enum ChainOp {
    Write(Chunk),
    /// Answer once every earlier op has run
    Drain(Reply),
    /// Flush the sink once every earlier op has run
    Flush(Reply),
}

/// Cloneable producer side of a chain
#[derive(Clone)]
pub struct ChainSender {
    id: DestinationId,
    name: Arc<str>,
    tx: mpsc::UnboundedSender<ChainOp>,
    metrics: Arc<SinkMetrics>,
}

impl ChainSender {
    pub fn id(&self) -> DestinationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a write continuation. Zero-length chunks are not dispatched.
    pub fn enqueue(&self, chunk: Chunk) {
        if chunk.is_empty() {
            return;
        }
        let seq = chunk.seq();
        if self.tx.send(ChainOp::Write(chunk)).is_err() {
            error!(sink = %self.name, seq, "Chain worker closed unexpectedly");
        }
    }

    /// Request a drain marker; resolves after every write queued before it
    pub fn request_drain(&self) -> PendingReply {
        self.request(ChainOp::Drain)
    }

    /// Request a sink flush behind every write queued before it
    pub fn request_flush(&self) -> PendingReply {
        self.request(ChainOp::Flush)
    }

    fn request(&self, op: fn(Reply) -> ChainOp) -> PendingReply {
        let (reply_tx, reply_rx) = oneshot::channel();
        // A send error drops `reply_tx`, which the receiver reports as WorkerGone.
        let _ = self.tx.send(op(reply_tx));
        PendingReply {
            id: self.id,
            name: Arc::clone(&self.name),
            rx: reply_rx,
        }
    }
}

/// Answer to a drain or flush request
pub struct PendingReply {
    id: DestinationId,
    name: Arc<str>,
    rx: oneshot::Receiver<Result<(), FailureKind>>,
}

impl PendingReply {
    pub async fn wait(self) -> Result<(), DestinationFailure> {
        let result = self.rx.await.unwrap_or(Err(FailureKind::WorkerGone));
        result.map_err(|kind| DestinationFailure {
            name: self.name.to_string(),
            id: self.id,
            kind,
        })
    }
}

/// A registered destination: its sender plus the worker task
pub struct DestinationChain {
    sender: ChainSender,
    worker: JoinHandle<Result<(), FailureKind>>,
}

impl DestinationChain {
    /// Create a chain for `sink` and spawn its worker on `runtime`
    pub fn spawn<S>(
        sink: Arc<S>,
        mode: WriteMode,
        cancel: CancellationToken,
        runtime: &Handle,
    ) -> Self
    where
        S: ByteSink + Sync + 'static,
    {
        let id = DestinationId::of(&sink);
        let name: Arc<str> = Arc::from(sink.name());
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(SinkMetrics::new());

        let worker = runtime.spawn(chain_worker(
            sink,
            rx,
            mode,
            cancel,
            Arc::clone(&metrics),
            Arc::clone(&name),
        ));

        Self {
            sender: ChainSender {
                id,
                name,
                tx,
                metrics,
            },
            worker,
        }
    }

    pub fn id(&self) -> DestinationId {
        self.sender.id
    }

    pub fn name(&self) -> &str {
        &self.sender.name
    }

    pub fn sender(&self) -> &ChainSender {
        &self.sender
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.sender.metrics
    }

    /// Close the queue, let the worker finish everything queued, then close the sink
    #[instrument(name = "destination_chain_shutdown", skip(self), fields(sink = %self.name()))]
    pub async fn shutdown(self) -> Result<(), DestinationFailure> {
        let Self { sender, worker } = self;
        let ChainSender { id, name, tx, .. } = sender;
        drop(tx);

        let result = match worker.await {
            Ok(result) => result,
            Err(e) => {
                error!(sink = %name, error = ?e, "Worker task panicked");
                Err(FailureKind::WorkerGone)
            }
        };
        debug!(sink = %name, "DestinationChain shutdown complete");

        result.map_err(|kind| DestinationFailure {
            name: name.to_string(),
            id,
            kind,
        })
    }
}

/// Worker task that drains the chain FIFO into the sink
#[instrument(
    name = "chain_worker_loop",
    skip(sink, rx, cancel, metrics),
    fields(sink = %name)
)]
async fn chain_worker<S>(
    sink: Arc<S>,
    mut rx: mpsc::UnboundedReceiver<ChainOp>,
    mode: WriteMode,
    cancel: CancellationToken,
    metrics: Arc<SinkMetrics>,
    name: Arc<str>,
) -> Result<(), FailureKind>
where
    S: ByteSink + Sync + 'static,
{
    debug!(sink = %name, ?mode, "Chain worker started");

    // Set once; every later write is skipped and every drain/flush reports it.
    let mut terminal: Option<FailureKind> = None;

    while let Some(op) = rx.recv().await {
        metrics.set_queue_len(rx.len());
        observability::record_queue_depth(&name, rx.len());

        match op {
            ChainOp::Write(chunk) => {
                if terminal.is_some() {
                    metrics.inc_skipped_count();
                    continue;
                }
                if cancel.is_cancelled() {
                    warn!(sink = %name, seq = chunk.seq(), "Cancelled, chain stopped");
                    observability::record_destination_failed(&name, "cancelled");
                    metrics.inc_skipped_count();
                    terminal = Some(FailureKind::Cancelled { seq: chunk.seq() });
                    continue;
                }

                match write_chunk(&sink, &chunk, mode).await {
                    Ok(()) => {
                        trace!(sink = %name, seq = chunk.seq(), len = chunk.len(), "Chunk written");
                        metrics.record_write(chunk.len());
                        observability::record_chunk_delivered(&name, chunk.len(), true);
                    }
                    Err(e) => {
                        error!(
                            sink = %name,
                            seq = chunk.seq(),
                            error = %e,
                            "Write failed, chain stopped"
                        );
                        metrics.inc_failure_count();
                        observability::record_chunk_delivered(&name, chunk.len(), false);
                        observability::record_destination_failed(&name, "write");
                        terminal = Some(FailureKind::WriteFailed {
                            seq: chunk.seq(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            ChainOp::Drain(reply) => {
                let _ = reply.send(terminal.clone().map_or(Ok(()), Err));
            }
            ChainOp::Flush(reply) => {
                let result = match &terminal {
                    Some(kind) => Err(kind.clone()),
                    None => flush_sink(&sink, mode).await.map_err(|e| {
                        warn!(sink = %name, error = %e, "Flush failed");
                        FailureKind::FlushFailed {
                            message: e.to_string(),
                        }
                    }),
                };
                let _ = reply.send(result);
            }
        }
    }

    metrics.set_queue_len(0);

    // Queue closed: the destination is being released.
    let closed = sink.close().await.map_err(|e| {
        error!(sink = %name, error = %e, "Close failed on shutdown");
        FailureKind::CloseFailed {
            message: e.to_string(),
        }
    });

    debug!(sink = %name, "Chain worker stopped");
    closed
}

async fn write_chunk<S>(sink: &Arc<S>, chunk: &Chunk, mode: WriteMode) -> Result<(), ContractError>
where
    S: ByteSink + Sync + 'static,
{
    match mode {
        WriteMode::Overlapped => sink.write(chunk.data()).await,
        WriteMode::Blocking => {
            let sink = Arc::clone(sink);
            let data = chunk.data().clone();
            task::spawn_blocking(move || sink.write_blocking(&data))
                .await
                .map_err(|e| ContractError::Other(format!("blocking write panicked: {e}")))?
        }
    }
}

async fn flush_sink<S>(sink: &Arc<S>, mode: WriteMode) -> Result<(), ContractError>
where
    S: ByteSink + Sync + 'static,
{
    match mode {
        WriteMode::Overlapped => sink.flush().await,
        WriteMode::Blocking => {
            let sink = Arc::clone(sink);
            task::spawn_blocking(move || sink.flush_blocking())
                .await
                .map_err(|e| ContractError::Other(format!("blocking flush panicked: {e}")))?
        }
    }
}

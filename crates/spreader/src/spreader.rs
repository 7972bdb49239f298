//! StreamSpreader - write-only sink that replicates one byte stream to many destinations

use std::future::Future;
use std::io::SeekFrom;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use contracts::{ByteSink, SpreaderConfig};

use crate::chain::{ChainSender, DestinationChain, PendingReply, WriteMode};
use crate::chunk_store::ChunkStore;
use crate::error::{DestinationFailure, DestinationId, SpreaderError};
use crate::gate::CompletionGate;
use crate::metrics::MetricsSnapshot;
use crate::registry::Registry;
use crate::sinks::ConfiguredSink;

/// Fan-out multiplexer
///
/// Every `write` is copied into an immutable chunk and appended to the chain
/// of each registered destination. Chains run independently, so a slow
/// destination never holds up another one, while each destination still sees
/// the chunks in write order.
///
/// Lock order is registry, then chunk store. `write` appends and enqueues
/// under the registry lock and `add_destination` snapshots and publishes
/// under it, so a destination added concurrently with writes sees every
/// chunk exactly once.
pub struct StreamSpreader {
    mode: WriteMode,
    keep_cached: bool,
    wait_for_finish: bool,
    flush_timeout: Option<Duration>,
    chunk_size: usize,
    runtime: Handle,
    cancel: CancellationToken,
    store: Mutex<ChunkStore>,
    registry: Mutex<Registry>,
    gate: CompletionGate,
}

impl StreamSpreader {
    /// Create a spreader with no destinations
    ///
    /// Must be called from within a tokio runtime; destination workers are
    /// spawned on it.
    pub fn new(config: SpreaderConfig) -> Result<Self, SpreaderError> {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Create a spreader bound to a cancellation token
    ///
    /// Once `cancel` fires, chunks not yet started are declined and every
    /// chain reports `Cancelled`.
    pub fn with_cancellation(
        config: SpreaderConfig,
        cancel: CancellationToken,
    ) -> Result<Self, SpreaderError> {
        let runtime =
            Handle::try_current().map_err(|e| SpreaderError::NoRuntime(e.to_string()))?;

        Ok(Self {
            mode: WriteMode::from_asynchronous(config.asynchronous),
            keep_cached: config.keep_cached,
            wait_for_finish: config.wait_for_finish,
            flush_timeout: config.flush_timeout_ms.map(Duration::from_millis),
            chunk_size: config.chunk_size.max(1),
            runtime,
            cancel,
            store: Mutex::new(ChunkStore::new(config.keep_cached)),
            registry: Mutex::new(Registry::new()),
            gate: CompletionGate::new(),
        })
    }

    /// Create a spreader and register `destinations` in order
    ///
    /// Fails on the first duplicate.
    pub fn with_destinations<S, I>(
        config: SpreaderConfig,
        cancel: CancellationToken,
        destinations: I,
    ) -> Result<Self, SpreaderError>
    where
        S: ByteSink + Sync + 'static,
        I: IntoIterator<Item = Arc<S>>,
    {
        let spreader = Self::with_cancellation(config, cancel)?;
        for sink in destinations {
            spreader.add_destination(sink)?;
        }
        Ok(spreader)
    }

    pub fn is_asynchronous(&self) -> bool {
        self.mode == WriteMode::Overlapped
    }

    pub fn keep_cached(&self) -> bool {
        self.keep_cached
    }

    pub fn write_mode(&self) -> WriteMode {
        self.mode
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn destination_count(&self) -> usize {
        lock(&self.registry).len()
    }

    pub fn chunks_written(&self) -> u64 {
        lock(&self.store).chunk_count()
    }

    pub fn bytes_written(&self) -> u64 {
        lock(&self.store).total_bytes()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.registry).is_closed()
    }

    /// Per-destination metrics
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        lock(&self.registry).metrics()
    }

    /// Record `buf` and hand it to every destination's chain
    ///
    /// Returns once the chunk is queued; never waits for destination I/O.
    /// Fails with `Cancelled` once the construction-time token has fired,
    /// without recording anything.
    pub fn write(&self, buf: &[u8]) -> Result<(), SpreaderError> {
        if self.cancel.is_cancelled() {
            return Err(SpreaderError::Cancelled);
        }
        let data = Bytes::copy_from_slice(buf);

        let registry = lock(&self.registry);
        registry.ensure_open()?;
        let chunk = lock(&self.store).append(data);
        for chain in registry.iter() {
            chain.sender().enqueue(chunk.clone());
        }
        let fan_out = registry.len();
        drop(registry);

        trace!(seq = chunk.seq(), len = chunk.len(), fan_out, "Chunk recorded");
        observability::record_chunk_written(chunk.len(), fan_out);
        Ok(())
    }

    /// Write `count` bytes of `buf` starting at `offset`
    pub fn write_range(&self, buf: &[u8], offset: usize, count: usize) -> Result<(), SpreaderError> {
        let range = offset
            .checked_add(count)
            .and_then(|end| buf.get(offset..end))
            .ok_or(SpreaderError::InvalidRange {
                offset,
                count,
                len: buf.len(),
            })?;
        self.write(range)
    }

    /// Async counterpart of `write`; resolves once the chunk is recorded
    ///
    /// Also fails with `Cancelled` when the call-scoped `token` has fired.
    pub async fn write_async(
        &self,
        buf: &[u8],
        token: &CancellationToken,
    ) -> Result<(), SpreaderError> {
        if token.is_cancelled() {
            return Err(SpreaderError::Cancelled);
        }
        self.write(buf)
    }

    /// Copy `reader` into the spreader until end of source
    ///
    /// Reads at most `chunk_size` bytes at a time and writes each read as
    /// one chunk. Returns the number of bytes copied.
    pub async fn copy_from<R>(&self, reader: &mut R) -> Result<u64, SpreaderError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.copy_from_with(reader, &CancellationToken::new(), |_| {})
            .await
    }

    /// `copy_from` honoring a call-scoped `token`
    ///
    /// `on_chunk` sees the length of every chunk written. A pending read is
    /// abandoned as soon as either token fires.
    #[instrument(name = "spreader_copy_from", skip_all)]
    pub async fn copy_from_with<R, F>(
        &self,
        reader: &mut R,
        token: &CancellationToken,
        mut on_chunk: F,
    ) -> Result<u64, SpreaderError>
    where
        R: AsyncRead + Unpin + ?Sized,
        F: FnMut(usize),
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut copied = 0u64;

        loop {
            let read = self.until_cancelled(token, reader.read(&mut buf)).await??;
            if read == 0 {
                break;
            }
            self.write(&buf[..read])?;
            on_chunk(read);
            copied += read as u64;
        }

        debug!(bytes = copied, "Source exhausted");
        Ok(copied)
    }

    /// Register a destination
    ///
    /// With `keep_cached`, every chunk written so far is queued on the new
    /// chain before it becomes visible to `write`.
    #[instrument(name = "spreader_add_destination", skip(self, sink), fields(sink = %sink.name()))]
    pub fn add_destination<S>(&self, sink: Arc<S>) -> Result<DestinationId, SpreaderError>
    where
        S: ByteSink + Sync + 'static,
    {
        let id = DestinationId::of(&sink);
        let name = sink.name().to_string();

        let mut registry = lock(&self.registry);
        registry.ensure_open()?;

        let chain = registry
            .register(id, &name, || {
                DestinationChain::spawn(sink, self.mode, self.cancel.clone(), &self.runtime)
            })
            .inspect_err(|_| warn!(sink = %name, %id, "Destination already registered"))?;

        // Still under the registry lock: no write can land between the
        // snapshot and the chain becoming visible.
        let replay = if self.keep_cached {
            lock(&self.store).snapshot()
        } else {
            Vec::new()
        };
        for chunk in &replay {
            chain.sender().enqueue(chunk.clone());
        }

        let destinations = registry.len();
        drop(registry);

        info!(
            sink = %name,
            %id,
            replayed = replay.len(),
            destinations,
            "Destination added"
        );
        observability::record_destination_added(&name, replay.len());
        Ok(id)
    }

    /// Register each sink independently; one outcome per sink, in order
    pub fn add_destinations<S, I>(&self, sinks: I) -> Vec<Result<DestinationId, SpreaderError>>
    where
        S: ByteSink + Sync + 'static,
        I: IntoIterator<Item = Arc<S>>,
    {
        sinks
            .into_iter()
            .map(|sink| self.add_destination(sink))
            .collect()
    }

    /// Drain every chain and flush every destination
    ///
    /// Uses the configured deadline (`flush_timeout_ms`), if any.
    pub async fn flush(&self) -> Result<(), SpreaderError> {
        self.flush_with(&CancellationToken::new(), self.flush_timeout)
            .await
    }

    /// Drain every chain and flush every destination, honoring `token` and `deadline`
    ///
    /// Waits for the completion gate first when `wait_for_finish` is set.
    /// Only work queued before the call is waited for. Every destination
    /// error is collected into one `DestinationFailures`.
    #[instrument(name = "spreader_flush", skip(self, token))]
    pub async fn flush_with(
        &self,
        token: &CancellationToken,
        deadline: Option<Duration>,
    ) -> Result<(), SpreaderError> {
        let started = Instant::now();

        let result = match deadline {
            Some(after) => tokio::time::timeout(after, self.flush_inner(token))
                .await
                .unwrap_or(Err(SpreaderError::TimedOut { after })),
            None => self.flush_inner(token).await,
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        observability::record_flush_latency_ms(elapsed_ms, result.is_ok());
        match &result {
            Ok(()) => debug!(elapsed_ms, "Flush complete"),
            Err(e) => warn!(elapsed_ms, error = %e, "Flush failed"),
        }
        result
    }

    /// Blocking `flush` for threads outside the async runtime
    ///
    /// On a `current_thread` runtime `Handle::block_on` cannot drive the
    /// timer driver, so a configured `flush_timeout_ms` never fires there
    /// unless another thread is running the runtime. Use a multi-thread
    /// runtime when a deadline matters.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context,
    /// like tokio's other `blocking_*` methods.
    pub fn blocking_flush(&self) -> Result<(), SpreaderError> {
        self.runtime.block_on(self.flush())
    }

    async fn flush_inner(&self, token: &CancellationToken) -> Result<(), SpreaderError> {
        if self.wait_for_finish {
            self.await_finish(token).await?;
        }

        let senders = lock(&self.registry).senders();
        let mut failures = Vec::new();

        // 1. Wait for every chain to run what was queued before this call
        let drains: Vec<PendingReply> = senders.iter().map(ChainSender::request_drain).collect();
        let mut drained = Vec::with_capacity(senders.len());
        for (sender, pending) in senders.iter().zip(drains) {
            match self.until_cancelled(token, pending.wait()).await? {
                Ok(()) => drained.push(sender),
                Err(failure) => failures.push(failure),
            }
        }

        // 2. Commit destination-level buffering on the healthy ones
        let flushes: Vec<PendingReply> = drained.iter().map(|s| s.request_flush()).collect();
        for pending in flushes {
            if let Err(failure) = self.until_cancelled(token, pending.wait()).await? {
                failures.push(failure);
            }
        }

        into_result(failures)
    }

    /// Mark the producer as done; idempotent
    pub fn finish_writing(&self) {
        if self.gate.finish() {
            debug!(chunks = self.chunks_written(), "Writing finished");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.gate.is_finished()
    }

    /// Wait until `finish_writing` has been called
    pub async fn await_finish(&self, token: &CancellationToken) -> Result<(), SpreaderError> {
        self.until_cancelled(token, self.gate.wait()).await
    }

    /// `await_finish` with a deadline
    pub async fn await_finish_within(
        &self,
        token: &CancellationToken,
        after: Duration,
    ) -> Result<(), SpreaderError> {
        tokio::time::timeout(after, self.await_finish(token))
            .await
            .unwrap_or(Err(SpreaderError::TimedOut { after }))
    }

    /// Close every destination and stop accepting writes
    ///
    /// Each chain finishes its queued work before its sink is closed. Also
    /// sets the completion gate so no waiter is left behind.
    #[instrument(name = "spreader_close", skip(self))]
    pub async fn close(&self) -> Result<(), SpreaderError> {
        let chains = lock(&self.registry).close();
        self.gate.finish();

        let count = chains.len();
        let mut failures = Vec::new();
        for chain in chains {
            if let Err(failure) = chain.shutdown().await {
                failures.push(failure);
            }
        }

        info!(destinations = count, failed = failures.len(), "Spreader closed");
        into_result(failures)
    }

    /// Reading is not meaningful for a write-only spreader
    pub fn read(&self, _buf: &mut [u8]) -> Result<usize, SpreaderError> {
        Err(SpreaderError::unsupported("read"))
    }

    /// Seeking is not meaningful for a write-only spreader
    pub fn seek(&self, _pos: SeekFrom) -> Result<u64, SpreaderError> {
        Err(SpreaderError::unsupported("seek"))
    }

    /// Truncation is not meaningful for a write-only spreader
    pub fn set_length(&self, _len: u64) -> Result<(), SpreaderError> {
        Err(SpreaderError::unsupported("set_length"))
    }

    async fn until_cancelled<F: Future>(
        &self,
        token: &CancellationToken,
        fut: F,
    ) -> Result<F::Output, SpreaderError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SpreaderError::Cancelled),
            _ = token.cancelled() => Err(SpreaderError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

/// Build a spreader and its destinations from configuration
#[instrument(name = "spreader_create", skip(config, cancel), fields(destinations = config.destinations.len()))]
pub fn create_spreader(
    config: SpreaderConfig,
    cancel: CancellationToken,
) -> Result<StreamSpreader, SpreaderError> {
    let sinks = config
        .destinations
        .iter()
        .map(|d| ConfiguredSink::from_config(d).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;
    StreamSpreader::with_destinations(config, cancel, sinks)
}

fn into_result(failures: Vec<DestinationFailure>) -> Result<(), SpreaderError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(SpreaderError::DestinationFailures(failures))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

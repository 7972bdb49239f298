//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 扇出语义（完整性、顺序、补发、去重、幂等 flush）
//! - 并发写入与慢目标隔离
//! - 配置 -> spreader -> 文件目标 e2e

#[cfg(test)]
mod support {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use contracts::{ByteSink, ContractError};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use spreader::MemorySink;

    pub fn payload(len: usize, seed: u64) -> Vec<u8> {
        let mut data = vec![0u8; len];
        StdRng::seed_from_u64(seed).fill(&mut data[..]);
        data
    }

    pub fn memory_sinks(count: usize) -> Vec<Arc<MemorySink>> {
        (0..count)
            .map(|i| Arc::new(MemorySink::new(format!("dest-{i}"))))
            .collect()
    }

    /// Sink that sleeps before every write
    pub struct SlowSink {
        pub inner: MemorySink,
        pub delay: Duration,
    }

    impl SlowSink {
        pub fn new(name: &str, delay: Duration) -> Self {
            Self {
                inner: MemorySink::new(name),
                delay,
            }
        }
    }

    impl ByteSink for SlowSink {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn write_blocking(&self, buf: &[u8]) -> Result<(), ContractError> {
            std::thread::sleep(self.delay);
            self.inner.write_blocking(buf)
        }

        async fn write(&self, buf: &[u8]) -> Result<(), ContractError> {
            tokio::time::sleep(self.delay).await;
            self.inner.write(buf).await
        }

        fn flush_blocking(&self) -> Result<(), ContractError> {
            self.inner.flush_blocking()
        }

        async fn flush(&self) -> Result<(), ContractError> {
            self.inner.flush().await
        }

        async fn close(&self) -> Result<(), ContractError> {
            self.inner.close().await
        }
    }

    /// Sink whose writes fail from the `fail_at`-th call on
    pub struct FailingSink {
        pub inner: MemorySink,
        fail_at: u64,
        calls: AtomicU64,
    }

    impl FailingSink {
        pub fn new(name: &str, fail_at: u64) -> Self {
            Self {
                inner: MemorySink::new(name),
                fail_at,
                calls: AtomicU64::new(0),
            }
        }

        fn accept(&self) -> Result<(), ContractError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_at {
                Err(ContractError::sink_write(self.inner.name(), "disk full"))
            } else {
                Ok(())
            }
        }
    }

    impl ByteSink for FailingSink {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn write_blocking(&self, buf: &[u8]) -> Result<(), ContractError> {
            self.accept()?;
            self.inner.write_blocking(buf)
        }

        async fn write(&self, buf: &[u8]) -> Result<(), ContractError> {
            self.accept()?;
            self.inner.write(buf).await
        }

        fn flush_blocking(&self) -> Result<(), ContractError> {
            self.inner.flush_blocking()
        }

        async fn flush(&self) -> Result<(), ContractError> {
            self.inner.flush().await
        }

        async fn close(&self) -> Result<(), ContractError> {
            self.inner.close().await
        }
    }
}

#[cfg(test)]
mod fanout_tests {
    use std::io::SeekFrom;
    use std::sync::Arc;

    use contracts::SpreaderConfig;
    use spreader::{MemorySink, SpreaderError, StreamSpreader};
    use tokio_util::sync::CancellationToken;

    use crate::support::{memory_sinks, payload};

    fn spreader_with(config: SpreaderConfig, sinks: &[Arc<MemorySink>]) -> StreamSpreader {
        StreamSpreader::with_destinations(config, CancellationToken::new(), sinks.to_vec()).unwrap()
    }

    /// Every destination receives exactly the written bytes
    #[tokio::test]
    async fn test_fidelity_64_destinations() {
        let data = payload(4096, 1);
        for asynchronous in [false, true] {
            let sinks = memory_sinks(64);
            let spreader =
                spreader_with(SpreaderConfig::default().asynchronous(asynchronous), &sinks);

            spreader.write(&data).unwrap();
            spreader.flush().await.unwrap();

            for sink in &sinks {
                assert_eq!(sink.contents(), data, "mismatch at {}", sink.len());
            }
        }
    }

    /// Many small writes arrive whole and in order
    #[tokio::test]
    async fn test_fragmented_writes_keep_order() {
        let data = payload(4096, 2);
        let sinks = memory_sinks(8);
        let spreader = spreader_with(SpreaderConfig::default(), &sinks);

        for piece in data.chunks(64) {
            spreader.write(piece).unwrap();
        }
        spreader.flush().await.unwrap();

        assert_eq!(spreader.chunks_written(), 64);
        for sink in &sinks {
            assert_eq!(sink.contents(), data);
            assert_eq!(sink.write_calls(), 64);
        }
    }

    #[tokio::test]
    async fn test_large_payload_async() {
        let data = payload(16 * 1024 * 1024, 3);
        let sinks = memory_sinks(4);
        let spreader = spreader_with(SpreaderConfig::default().asynchronous(true), &sinks);

        for piece in data.chunks(64 * 1024) {
            spreader.write(piece).unwrap();
        }
        spreader.flush().await.unwrap();

        assert_eq!(spreader.bytes_written(), data.len() as u64);
        for sink in &sinks {
            assert_eq!(sink.len(), data.len());
            assert!(sink.contents() == data);
        }
    }

    /// Late joiners get history only with the cache on
    #[tokio::test]
    async fn test_replay_depends_on_cache() {
        for keep_cached in [true, false] {
            let early = Arc::new(MemorySink::new("early"));
            let spreader = spreader_with(
                SpreaderConfig::default().keep_cached(keep_cached),
                std::slice::from_ref(&early),
            );

            spreader.write(b"C1").unwrap();
            spreader.write(b"").unwrap();
            spreader.write(b"C2").unwrap();

            let late = Arc::new(MemorySink::new("late"));
            spreader.add_destination(Arc::clone(&late)).unwrap();
            spreader.write(b"C3").unwrap();
            spreader.flush().await.unwrap();

            assert_eq!(early.contents(), b"C1C2C3");
            let expected: &[u8] = if keep_cached { b"C1C2C3" } else { b"C3" };
            assert_eq!(late.contents(), expected);
        }
    }

    /// Re-adding the same sink fails and leaves it attached once
    #[tokio::test]
    async fn test_duplicate_destination() {
        let sink = Arc::new(MemorySink::new("only-once"));
        let spreader = spreader_with(SpreaderConfig::default(), std::slice::from_ref(&sink));

        assert!(matches!(
            spreader.add_destination(Arc::clone(&sink)),
            Err(SpreaderError::DuplicateDestination { .. })
        ));
        spreader.write(b"x").unwrap();
        spreader.flush().await.unwrap();

        assert_eq!(spreader.destination_count(), 1);
        assert_eq!(sink.contents(), b"x");
    }

    /// A second flush delivers nothing new
    #[tokio::test]
    async fn test_flush_idempotent() {
        let sinks = memory_sinks(3);
        let spreader = spreader_with(SpreaderConfig::default(), &sinks);

        spreader.write(b"payload").unwrap();
        spreader.flush().await.unwrap();
        spreader.flush().await.unwrap();

        for sink in &sinks {
            assert_eq!(sink.contents(), b"payload");
            assert_eq!(sink.write_calls(), 1);
        }
    }

    /// Read, seek and truncate fail and change nothing
    #[tokio::test]
    async fn test_unsupported_operations_have_no_effect() {
        let sinks = memory_sinks(1);
        let spreader = spreader_with(SpreaderConfig::default(), &sinks);
        spreader.write(b"abc").unwrap();

        let mut buf = [0u8; 8];
        assert!(spreader.read(&mut buf).is_err());
        assert!(spreader.seek(SeekFrom::End(0)).is_err());
        assert!(spreader.set_length(0).is_err());

        spreader.flush().await.unwrap();
        assert_eq!(sinks[0].contents(), b"abc");
        assert_eq!(spreader.chunks_written(), 1);
    }

    #[tokio::test]
    async fn test_write_without_destinations_then_replay() {
        let spreader = StreamSpreader::new(SpreaderConfig::default().keep_cached(true)).unwrap();
        spreader.write(b"buffered ").unwrap();
        spreader.write(b"until someone listens").unwrap();

        let sink = Arc::new(MemorySink::new("listener"));
        spreader.add_destination(Arc::clone(&sink)).unwrap();
        spreader.flush().await.unwrap();

        assert_eq!(sink.contents(), b"buffered until someone listens");
    }

    #[tokio::test]
    async fn test_close_closes_every_destination() {
        let sinks = memory_sinks(5);
        let spreader = spreader_with(SpreaderConfig::default().asynchronous(true), &sinks);
        spreader.write(b"last words").unwrap();
        spreader.close().await.unwrap();

        for sink in &sinks {
            assert!(sink.is_closed());
            assert_eq!(sink.contents(), b"last words");
        }
        assert!(matches!(spreader.write(b"more"), Err(SpreaderError::Closed)));
    }
}

#[cfg(test)]
mod concurrency_tests {
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    use contracts::SpreaderConfig;
    use spreader::{FailureKind, StreamSpreader};
    use tokio_util::sync::CancellationToken;

    use crate::support::{memory_sinks, payload, FailingSink, SlowSink};

    /// Concurrent writers: all destinations agree on one interleaving
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_serialize() {
        const WRITERS: usize = 8;
        const PER_WRITER: usize = 100;

        let sinks = memory_sinks(4);
        let spreader = StreamSpreader::with_destinations(
            SpreaderConfig::default().asynchronous(true),
            CancellationToken::new(),
            sinks.clone(),
        )
        .unwrap();

        let barrier = Barrier::new(WRITERS);
        std::thread::scope(|scope| {
            for writer in 0..WRITERS {
                let spreader = &spreader;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    for i in 0..PER_WRITER {
                        let record = [writer as u8, i as u8, 0xAA, 0x55];
                        spreader.write(&record).unwrap();
                    }
                });
            }
        });
        spreader.flush().await.unwrap();

        let reference = sinks[0].contents();
        assert_eq!(reference.len(), WRITERS * PER_WRITER * 4);
        for sink in &sinks[1..] {
            assert_eq!(sink.contents(), reference);
        }

        // Records are never torn and each writer's own order holds
        let mut next = [0usize; WRITERS];
        for record in reference.chunks(4) {
            assert_eq!(&record[2..], &[0xAA, 0x55]);
            let writer = record[0] as usize;
            assert_eq!(record[1] as usize, next[writer]);
            next[writer] += 1;
        }
        assert!(next.iter().all(|&n| n == PER_WRITER));
    }

    /// Destinations joining mid-stream with the cache on see every chunk once
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_join_replays_full_sequence() {
        const ROUNDS: usize = 20;
        const RECORDS: u32 = 2000;
        const JOINERS: usize = 16;

        for _ in 0..ROUNDS {
            let spreader =
                StreamSpreader::new(SpreaderConfig::default().keep_cached(true)).unwrap();
            let late = memory_sinks(JOINERS);

            let barrier = Barrier::new(JOINERS + 1);
            std::thread::scope(|scope| {
                let spreader = &spreader;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    for i in 0..RECORDS {
                        spreader.write(&i.to_be_bytes()).unwrap();
                    }
                });
                for sink in &late {
                    scope.spawn(move || {
                        barrier.wait();
                        spreader.add_destination(Arc::clone(sink)).unwrap();
                    });
                }
            });
            spreader.flush().await.unwrap();

            let expected: Vec<u8> = (0..RECORDS).flat_map(u32::to_be_bytes).collect();
            for sink in &late {
                assert_eq!(sink.contents(), expected, "{} saw a gap or duplicate", sink.len());
            }
            spreader.close().await.unwrap();
        }
    }

    /// A slow destination does not hold back a fast one
    #[tokio::test]
    async fn test_slow_destination_isolated() {
        let data = payload(1000, 4);
        let fast = memory_sinks(1).remove(0);
        let slow = Arc::new(SlowSink::new("slow", Duration::from_millis(200)));

        let spreader = StreamSpreader::new(SpreaderConfig::default().asynchronous(true)).unwrap();
        spreader.add_destination(Arc::clone(&fast)).unwrap();
        spreader.add_destination(Arc::clone(&slow)).unwrap();

        for piece in data.chunks(100) {
            spreader.write(piece).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while fast.len() < data.len() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fast destination should finish independently");
        assert!(slow.inner.len() < data.len());

        spreader.flush().await.unwrap();
        assert_eq!(slow.inner.contents(), data);
        assert_eq!(fast.contents(), data);
    }

    /// One failing destination does not affect the others
    #[tokio::test]
    async fn test_failure_isolation() {
        let healthy = memory_sinks(2);
        let failing = Arc::new(FailingSink::new("failing", 2));

        let spreader = StreamSpreader::new(SpreaderConfig::default()).unwrap();
        for sink in &healthy {
            spreader.add_destination(Arc::clone(sink)).unwrap();
        }
        spreader.add_destination(Arc::clone(&failing)).unwrap();

        for piece in [b"aa".as_slice(), b"bb", b"cc", b"dd"] {
            spreader.write(piece).unwrap();
        }
        let err = spreader.flush().await.unwrap_err();

        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.failures()[0].name, "failing");
        assert!(matches!(err.failures()[0].kind, FailureKind::WriteFailed { seq: 2, .. }));
        assert_eq!(failing.inner.contents(), b"aabb");
        for sink in &healthy {
            assert_eq!(sink.contents(), b"aabbccdd");
        }
    }

    /// After cancellation each destination holds a prefix of the stream
    #[tokio::test]
    async fn test_cancellation_leaves_prefixes() {
        let data = payload(64 * 1024, 5);
        let cancel = CancellationToken::new();
        let sinks: Vec<Arc<SlowSink>> = (0..3)
            .map(|i| Arc::new(SlowSink::new(&format!("slow-{i}"), Duration::from_millis(2))))
            .collect();
        let spreader = StreamSpreader::with_destinations(
            SpreaderConfig::default().asynchronous(true),
            cancel.clone(),
            sinks.clone(),
        )
        .unwrap();

        for piece in data.chunks(1024) {
            spreader.write(piece).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert!(spreader.flush().await.is_err());
        spreader.close().await.unwrap();

        for sink in &sinks {
            let received = sink.inner.contents();
            assert!(received.len() < data.len());
            assert_eq!(received[..], data[..received.len()]);
        }
    }

    /// Flush waits for the producer when configured to
    #[tokio::test]
    async fn test_flush_waits_for_finish() {
        let sinks = memory_sinks(2);
        let spreader = Arc::new(
            StreamSpreader::with_destinations(
                SpreaderConfig::default().wait_for_finish(true),
                CancellationToken::new(),
                sinks.clone(),
            )
            .unwrap(),
        );

        let producer = {
            let spreader = Arc::clone(&spreader);
            tokio::spawn(async move {
                for i in 0..10u8 {
                    spreader.write(&[i]).unwrap();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                spreader.finish_writing();
            })
        };

        spreader.flush().await.unwrap();
        // Flush returned only after the producer finished
        assert!(spreader.is_finished());
        producer.await.unwrap();

        let expected: Vec<u8> = (0..10).collect();
        for sink in &sinks {
            assert_eq!(sink.contents(), expected);
        }
    }

    #[tokio::test]
    async fn test_flush_deadline_expires() {
        let spreader = StreamSpreader::new(SpreaderConfig {
            wait_for_finish: true,
            flush_timeout_ms: Some(25),
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(
            spreader.flush().await,
            Err(spreader::SpreaderError::TimedOut { .. })
        ));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use spreader::{StreamSpreader, create_spreader};
    use tokio_util::sync::CancellationToken;

    use crate::support::payload;

    /// Config file -> spreader -> file destinations
    #[tokio::test]
    async fn test_config_to_file_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("nested/b.bin");
        let toml = format!(
            r#"
asynchronous = true
chunk_size = 1000

[[destinations]]
name = "a"
kind = "file"
params = {{ path = "{}" }}

[[destinations]]
name = "b"
kind = "file"
params = {{ path = "{}" }}

[[destinations]]
name = "trace"
kind = "log"
"#,
            a.display(),
            b.display()
        );

        let config = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        let spreader = create_spreader(config, CancellationToken::new()).unwrap();
        assert!(spreader.is_asynchronous());
        assert_eq!(spreader.destination_count(), 3);

        let data = payload(10_500, 6);
        let mut reader = data.as_slice();
        let copied = spreader.copy_from(&mut reader).await.unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(spreader.chunks_written(), 11);

        spreader.finish_writing();
        spreader.flush().await.unwrap();
        spreader.close().await.unwrap();

        assert_eq!(std::fs::read(&a).unwrap(), data);
        assert_eq!(std::fs::read(&b).unwrap(), data);
    }

    #[tokio::test]
    async fn test_copy_from_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.bin");
        let target = dir.path().join("target.bin");
        let data = payload(200_000, 7);
        std::fs::write(&source, &data).unwrap();

        let json = format!(
            r#"{{"destinations": [{{"name": "out", "kind": "file", "params": {{"path": "{}"}}}}]}}"#,
            target.display()
        );
        let config = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        let spreader: StreamSpreader = create_spreader(config, CancellationToken::new()).unwrap();

        let mut file = tokio::fs::File::open(&source).await.unwrap();
        spreader.copy_from(&mut file).await.unwrap();
        spreader.flush().await.unwrap();
        // Never finished: the gate stays shut
        assert!(spreader
            .await_finish_within(&CancellationToken::new(), Duration::from_millis(10))
            .await
            .is_err());
        spreader.close().await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), data);
    }

    #[tokio::test]
    async fn test_bad_destination_config_rejected() {
        let toml = r#"
[[destinations]]
name = "broken"
kind = "file"
params = { path = "/tmp/x.bin", append = "maybe" }
"#;
        let config = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        assert!(create_spreader(config, CancellationToken::new()).is_err());
    }
}

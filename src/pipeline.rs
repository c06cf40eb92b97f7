//! Pipeline orchestrator — wires the capture producer and the batch
//! consumer together and guarantees a final persist on shutdown.
//!
//! Two cooperative units share one `PacketBuffer`: the producer iterates
//! the packet source and appends extracted records; the consumer polls on
//! a fixed interval and, once the threshold is reached, atomically drains
//! the buffer and dispatches the batch (prompt → generate → archive) on
//! its own task. Dispatch never blocks the next poll, so multiple
//! generation calls may be in flight at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::archive::{ArchiveEntry, PoetryArchive};
use crate::buffer::PacketBuffer;
use crate::capture::PacketSource;
use crate::config;
use crate::extract::extract_packet_data;
use crate::generate::{generate_or_fallback, PoetryGenerator};
use crate::prompt::{craft_prompt, PoetryStyle};

/// Tunable timings and thresholds, defaulted from `config`.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Buffer size that triggers a drain.
    pub threshold: usize,
    /// Consumer poll interval.
    pub poll_interval: Duration,
    /// Cooperative pause after each captured packet.
    pub capture_pacing: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            threshold: config::BATCH_THRESHOLD,
            poll_interval: config::POLL_INTERVAL,
            capture_pacing: config::CAPTURE_PACING,
        }
    }
}

/// Owns the buffer, the archive handle, and the generator; runs the
/// producer loop and the consumer task.
pub struct PoetryPipeline<G> {
    buffer: Arc<PacketBuffer>,
    archive: Arc<PoetryArchive>,
    generator: Arc<G>,
    style: PoetryStyle,
    settings: PipelineSettings,
}

impl<G> PoetryPipeline<G>
where
    G: PoetryGenerator + Send + Sync + 'static,
{
    pub fn new(
        archive: Arc<PoetryArchive>,
        generator: G,
        style: PoetryStyle,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            buffer: Arc::new(PacketBuffer::new()),
            archive,
            generator: Arc::new(generator),
            style,
            settings,
        }
    }

    /// Run until the stop signal fires or the source is exhausted, then
    /// wind down the consumer and persist the archive exactly once.
    pub async fn run<S: PacketSource>(&self, mut source: S, stop: watch::Receiver<bool>) {
        // The consumer watches its own channel so that source exhaustion
        // (not just an external stop) also winds it down.
        let (done_tx, done_rx) = watch::channel(false);

        let consumer = tokio::spawn(consumer_loop(
            Arc::clone(&self.buffer),
            Arc::clone(&self.archive),
            Arc::clone(&self.generator),
            self.style,
            self.settings.clone(),
            done_rx,
        ));

        self.producer_loop(&mut source, stop).await;

        let _ = done_tx.send(true);
        if let Err(e) = consumer.await {
            tracing::error!(error = %e, "Consumer task failed");
        }

        // Scoped cleanup: the archive hits disk exactly once here, no
        // matter how many batches were in flight.
        if let Err(e) = self.archive.persist() {
            tracing::error!(error = %e, "Error saving poetry archive");
        }
    }

    async fn producer_loop<S: PacketSource>(&self, source: &mut S, mut stop: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        tracing::info!("Stopping packet capture");
                        return;
                    }
                }
                packet = source.next_packet() => {
                    let Some(raw) = packet else {
                        tracing::info!("Packet source exhausted");
                        return;
                    };
                    if let Some(record) = extract_packet_data(&raw) {
                        self.buffer.append(record);
                    }
                    if !self.settings.capture_pacing.is_zero() {
                        tokio::time::sleep(self.settings.capture_pacing).await;
                    }
                }
            }
        }
    }
}

async fn consumer_loop<G>(
    buffer: Arc<PacketBuffer>,
    archive: Arc<PoetryArchive>,
    generator: Arc<G>,
    style: PoetryStyle,
    settings: PipelineSettings,
    mut done: watch::Receiver<bool>,
) where
    G: PoetryGenerator + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(settings.poll_interval);
    loop {
        tokio::select! {
            changed = done.changed() => {
                if changed.is_err() || *done.borrow() {
                    tracing::debug!("Batch consumer shutting down");
                    return;
                }
            }
            _ = ticker.tick() => {
                if let Some(batch) = buffer.take_if_ready(settings.threshold) {
                    tracing::debug!(n = batch.len(), "Buffer drained");
                    let archive = Arc::clone(&archive);
                    let generator = Arc::clone(&generator);
                    tokio::spawn(async move {
                        dispatch_batch(batch, style, &*generator, &archive).await;
                    });
                }
            }
        }
    }
}

/// Prompt → generate → archive for one drained batch. Generation failure
/// still archives the batch, with fallback text.
pub async fn dispatch_batch<G: PoetryGenerator>(
    batch: Vec<crate::extract::PacketRecord>,
    style: PoetryStyle,
    generator: &G,
    archive: &PoetryArchive,
) {
    let prompt = craft_prompt(&batch, style);
    let poetry = generate_or_fallback(generator, &prompt).await;

    let entry = ArchiveEntry::new(poetry, batch, style);
    tracing::info!(
        generated_at = %entry.generated_at,
        style = %style,
        packets = entry.packets.len(),
        "New poetry generated:\n{}",
        entry.poetry,
    );
    archive.record_entry(entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{NetworkLayer, RawPacket, TransportLayer};
    use crate::generate::{MockPoetryGenerator, FALLBACK_POETRY};
    use std::collections::VecDeque;
    use std::future::Future;

    /// Test packet source: yields its queue, then either hangs like a
    /// quiet live interface or reports exhaustion.
    struct ScriptedSource {
        packets: VecDeque<RawPacket>,
        end_when_drained: bool,
    }

    impl ScriptedSource {
        fn new(packets: Vec<RawPacket>) -> Self {
            Self {
                packets: packets.into(),
                end_when_drained: false,
            }
        }

        fn ending(packets: Vec<RawPacket>) -> Self {
            Self {
                packets: packets.into(),
                end_when_drained: true,
            }
        }
    }

    impl PacketSource for ScriptedSource {
        fn next_packet(&mut self) -> impl Future<Output = Option<RawPacket>> + Send {
            let packet = self.packets.pop_front();
            let end_when_drained = self.end_when_drained;
            async move {
                match packet {
                    Some(p) => Some(p),
                    None if end_when_drained => None,
                    // A live interface with no traffic never resolves.
                    None => std::future::pending().await,
                }
            }
        }
    }

    fn tcp_packet(n: u32) -> RawPacket {
        RawPacket {
            network: Some(NetworkLayer {
                src: format!("10.0.0.{n}"),
                dst: "10.0.0.1".into(),
            }),
            transport: Some(TransportLayer {
                label: "TCP".into(),
                src_port: Some((40000 + n).to_string()),
                dst_port: Some("443".into()),
                flags: None,
            }),
            length: Some("1500".into()),
        }
    }

    fn malformed_packet() -> RawPacket {
        RawPacket {
            network: None,
            transport: None,
            length: None,
        }
    }

    fn fast_settings() -> PipelineSettings {
        PipelineSettings {
            threshold: 5,
            poll_interval: Duration::from_millis(5),
            capture_pacing: Duration::ZERO,
        }
    }

    fn test_archive(dir: &tempfile::TempDir) -> Arc<PoetryArchive> {
        Arc::new(PoetryArchive::new(dir.path().join("archive.json")))
    }

    async fn run_to_completion<G>(
        pipeline: &PoetryPipeline<G>,
        source: ScriptedSource,
    ) where
        G: PoetryGenerator + Send + Sync + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let archive = Arc::clone(&pipeline.archive);

        // Stop once the batch lands in the archive (or give up).
        let watcher = tokio::spawn(async move {
            for _ in 0..500 {
                if !archive.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            let _ = stop_tx.send(true);
        });

        tokio::time::timeout(Duration::from_secs(5), pipeline.run(source, stop_rx))
            .await
            .expect("pipeline did not shut down");
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn five_packets_produce_one_archive_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = test_archive(&dir);
        let pipeline = PoetryPipeline::new(
            Arc::clone(&archive),
            MockPoetryGenerator::with_poem("five packets, one poem"),
            PoetryStyle::Pessoa,
            fast_settings(),
        );

        let source = ScriptedSource::new((0..5).map(tcp_packet).collect());
        run_to_completion(&pipeline, source).await;

        assert_eq!(archive.len(), 1);
        let entries = PoetryArchive::load(&dir.path().join("archive.json")).unwrap();
        let entry = entries.values().next().unwrap();
        assert_eq!(entry.poetry, "five packets, one poem");
        assert_eq!(entry.packets.len(), 5);
        assert_eq!(entry.style, PoetryStyle::Pessoa);
    }

    #[tokio::test]
    async fn malformed_packets_are_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = test_archive(&dir);
        let pipeline = PoetryPipeline::new(
            Arc::clone(&archive),
            MockPoetryGenerator::with_poem("poem"),
            PoetryStyle::Whitman,
            fast_settings(),
        );

        // 3 malformed + 5 good: only the good ones count toward the batch.
        let mut packets = vec![malformed_packet(), malformed_packet(), malformed_packet()];
        packets.extend((0..5).map(tcp_packet));
        run_to_completion(&pipeline, ScriptedSource::new(packets)).await;

        assert_eq!(archive.len(), 1);
        let key = {
            let entries = PoetryArchive::load(&dir.path().join("archive.json")).unwrap();
            entries.keys().next().unwrap().clone()
        };
        assert_eq!(archive.get(&key).unwrap().packets.len(), 5);
    }

    #[tokio::test]
    async fn generation_failure_still_archives_batch() {
        let dir = tempfile::tempdir().unwrap();
        let archive = test_archive(&dir);
        let pipeline = PoetryPipeline::new(
            Arc::clone(&archive),
            MockPoetryGenerator::failing("service down"),
            PoetryStyle::Dickinson,
            fast_settings(),
        );

        let source = ScriptedSource::new((0..5).map(tcp_packet).collect());
        run_to_completion(&pipeline, source).await;

        assert_eq!(archive.len(), 1);
        let entries = PoetryArchive::load(&dir.path().join("archive.json")).unwrap();
        let entry = entries.values().next().unwrap();
        assert_eq!(entry.poetry, FALLBACK_POETRY);
        assert_eq!(entry.packets.len(), 5);
    }

    #[tokio::test]
    async fn below_threshold_archives_nothing_but_persists_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let archive = test_archive(&dir);
        let pipeline = PoetryPipeline::new(
            Arc::clone(&archive),
            MockPoetryGenerator::with_poem("poem"),
            PoetryStyle::Pessoa,
            fast_settings(),
        );

        // Source drains after 3 packets; run() returns on exhaustion.
        let source = ScriptedSource::ending((0..3).map(tcp_packet).collect());
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(5), pipeline.run(source, stop_rx))
            .await
            .expect("pipeline did not shut down");

        assert!(archive.is_empty());
        // Final persist still ran: the artifact exists and holds no entries.
        let entries = PoetryArchive::load(&dir.path().join("archive.json")).unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn dispatch_batch_archives_directly() {
        let dir = tempfile::tempdir().unwrap();
        let archive = PoetryArchive::new(dir.path().join("archive.json"));
        let generator = MockPoetryGenerator::with_poem("direct dispatch");

        let batch: Vec<_> = (0..5)
            .map(tcp_packet)
            .filter_map(|p| crate::extract::extract_packet_data(&p))
            .collect();
        dispatch_batch(batch, PoetryStyle::Whitman, &generator, &archive).await;

        assert_eq!(archive.len(), 1);
    }

    #[tokio::test]
    async fn stop_signal_halts_an_infinite_source() {
        // A source that never runs dry: the stop signal is the only way out.
        struct EndlessSource {
            n: u32,
        }
        impl PacketSource for EndlessSource {
            fn next_packet(&mut self) -> impl Future<Output = Option<RawPacket>> + Send {
                self.n = self.n.wrapping_add(1);
                let packet = tcp_packet(self.n % 200);
                async move { Some(packet) }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let archive = test_archive(&dir);
        let pipeline = PoetryPipeline::new(
            Arc::clone(&archive),
            MockPoetryGenerator::with_poem("poem"),
            PoetryStyle::Pessoa,
            PipelineSettings {
                capture_pacing: Duration::from_millis(1),
                ..fast_settings()
            },
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = stop_tx.send(true);
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.run(EndlessSource { n: 0 }, stop_rx),
        )
        .await
        .expect("stop signal did not halt the pipeline");

        // Shutdown persisted whatever had been archived by then.
        assert!(dir.path().join("archive.json").exists());
    }
}

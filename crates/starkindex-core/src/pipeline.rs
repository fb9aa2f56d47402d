//! Block pipeline: feeds candidate blocks to an application supervisor.
//!
//! # Phase A: REPLAY
//! Re-deliver, in ascending order, the blocks a contract's checkpoint marks
//! as having contained matches. Only those blocks are fetched, not the whole
//! range since the start block.
//!
//! # Phase B: LIVE
//! Fetch blocks one at a time in strictly increasing order from the resume
//! point, forever. A block that cannot be fetched yet is asked for again
//! after `block_poll_interval_ms`; it is never skipped.
//!
//! Both phases of every contract run as separate tasks writing into one
//! shared channel of capacity 1, so a producer waits until the supervisor
//! takes its block. Every fetch, wait and send races against the scope's
//! cancellation signal.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::address::normalize_address;
use crate::checkpoint::CheckpointManager;
use crate::config::Configuration;
use crate::error::IndexerResult;
use crate::indexer::IndexerConfig;
use crate::ports::BlockSource;
use crate::shutdown::{cancellable, CancelSignal};
use crate::types::Block;

/// Which phase produced a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Replay,
    Live,
}

/// A block on its way to the supervisor.
#[derive(Debug, Clone)]
pub struct PipelineBlock {
    /// Normalized address of the contract whose pipeline fetched the block.
    pub origin: String,
    pub phase: IndexPhase,
    pub block: Block,
}

/// The producer tasks of one configuration.
pub struct BlockPipeline {
    tasks: Vec<JoinHandle<()>>,
}

impl BlockPipeline {
    /// Read every contract's checkpoint, then spawn its replay and live tasks.
    ///
    /// Checkpoints are all read before anything is spawned, so an error
    /// leaves no task behind.
    pub async fn start(
        config: &Configuration,
        checkpoints: &CheckpointManager,
        source: Arc<dyn BlockSource>,
        settings: &IndexerConfig,
        tx: mpsc::Sender<PipelineBlock>,
        signal: CancelSignal,
    ) -> IndexerResult<Self> {
        let mut resume = Vec::with_capacity(config.contracts.len());
        for contract in &config.contracts {
            let address = normalize_address(&contract.address);
            let point = checkpoints.resume_point(&address, config.start_block).await?;
            info!(
                app = %config.app_name,
                contract = %address,
                replay = point.replay.len(),
                live_from = point.live_from,
                "contract pipeline resuming"
            );
            resume.push((address, point));
        }

        let mut tasks = Vec::with_capacity(resume.len() * 2);
        for (address, point) in resume {
            let producer = Producer {
                origin: address.clone(),
                source: source.clone(),
                tx: tx.clone(),
                signal: signal.clone(),
                poll_interval: settings.block_poll_interval(),
            };

            let span = info_span!("replay", app = %config.app_name, contract = %address);
            tasks.push(tokio::spawn(
                producer
                    .clone()
                    .replay(point.replay, settings.replay_retry_limit.max(1))
                    .instrument(span),
            ));

            let span = info_span!("live", app = %config.app_name, contract = %address);
            tasks.push(tokio::spawn(producer.iterate(point.live_from).instrument(span)));
        }

        Ok(Self { tasks })
    }

    /// Number of producer tasks (two per contract).
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every producer to finish. Call after cancelling the scope.
    pub async fn join(self) {
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                error!(error = %e, "pipeline task failed");
            }
        }
    }
}

#[derive(Clone)]
struct Producer {
    origin: String,
    source: Arc<dyn BlockSource>,
    tx: mpsc::Sender<PipelineBlock>,
    signal: CancelSignal,
    poll_interval: Duration,
}

impl Producer {
    /// Returns `false` once the scope is cancelled or the consumer is gone.
    async fn deliver(&mut self, phase: IndexPhase, block: Block) -> bool {
        let item = PipelineBlock {
            origin: self.origin.clone(),
            phase,
            block,
        };
        matches!(
            cancellable(&mut self.signal, self.tx.send(item)).await,
            Some(Ok(()))
        )
    }

    async fn pause(&mut self) -> bool {
        cancellable(&mut self.signal, tokio::time::sleep(self.poll_interval))
            .await
            .is_some()
    }

    async fn replay(mut self, blocks: Vec<u64>, attempts: u32) {
        for number in blocks {
            let mut attempt = 0;
            let block = loop {
                attempt += 1;
                match cancellable(&mut self.signal, self.source.fetch_block(number)).await {
                    None => return,
                    Some(Ok(block)) => break Some(block),
                    Some(Err(e)) if attempt < attempts => {
                        warn!(block = number, attempt, error = %e, "replay fetch failed, retrying");
                        if !self.pause().await {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(block = number, error = %e, "replay fetch failed, skipping block");
                        break None;
                    }
                }
            };
            if let Some(block) = block {
                if !self.deliver(IndexPhase::Replay, block).await {
                    return;
                }
            }
        }
        debug!("replay complete");
    }

    async fn iterate(mut self, from: u64) {
        let mut next = from;
        loop {
            match cancellable(&mut self.signal, self.source.fetch_block(next)).await {
                None => return,
                Some(Ok(block)) => {
                    if !self.deliver(IndexPhase::Live, block).await {
                        return;
                    }
                    next += 1;
                }
                Some(Err(e)) => {
                    debug!(block = next, error = %e, "block not available yet");
                    if !self.pause().await {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexerError;
    use crate::memory::MemoryRecordStore;
    use crate::shutdown::CancelHandle;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves blocks up to `head`; later blocks are "not produced yet".
    struct Chain {
        head: u64,
        requested: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl BlockSource for Chain {
        async fn fetch_block(&self, n: u64) -> IndexerResult<Block> {
            self.requested.lock().unwrap().push(n);
            if n > self.head {
                return Err(IndexerError::Source(format!("block {n} not found")));
            }
            Ok(Block::empty(n, 1_000 + n))
        }
    }

    fn settings() -> IndexerConfig {
        IndexerConfig::default().block_poll_interval_ms(5)
    }

    async fn recv(rx: &mut mpsc::Receiver<PipelineBlock>) -> PipelineBlock {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("pipeline stalled")
            .expect("pipeline closed")
    }

    #[tokio::test]
    async fn fresh_contract_goes_live_from_start_block() {
        let source = Arc::new(Chain { head: 100, requested: Mutex::new(vec![]) });
        let config = Configuration::new("app", 50, ["0x1"]);
        let checkpoints = CheckpointManager::new(Arc::new(MemoryRecordStore::new()), "app");
        let (scope, signal) = CancelHandle::new();
        let (tx, mut rx) = mpsc::channel(1);

        let pipeline = BlockPipeline::start(&config, &checkpoints, source, &settings(), tx, signal)
            .await
            .unwrap();
        assert_eq!(pipeline.task_count(), 2);

        for expected in 50..55 {
            let item = recv(&mut rx).await;
            assert_eq!(item.phase, IndexPhase::Live);
            assert_eq!(item.block.block_number, expected);
            assert_eq!(item.origin, normalize_address("0x1"));
        }

        scope.cancel();
        tokio::time::timeout(Duration::from_secs(2), pipeline.join()).await.unwrap();
    }

    #[tokio::test]
    async fn replays_recorded_blocks_then_tails_after_latest() {
        let store = Arc::new(MemoryRecordStore::new());
        let checkpoints = CheckpointManager::new(store, "app");
        checkpoints.record_block("0x1", 5, true, true).await.unwrap();
        checkpoints.record_block("0x1", 9, true, true).await.unwrap();
        checkpoints.record_block("0x1", 12, false, true).await.unwrap();

        let source = Arc::new(Chain { head: 100, requested: Mutex::new(vec![]) });
        let config = Configuration::new("app", 0, ["0x1"]);
        let (scope, signal) = CancelHandle::new();
        let (tx, mut rx) = mpsc::channel(1);
        let pipeline =
            BlockPipeline::start(&config, &checkpoints, source.clone(), &settings(), tx, signal)
                .await
                .unwrap();

        let mut replayed = vec![];
        let mut live = vec![];
        while replayed.len() < 2 || live.len() < 3 {
            let item = recv(&mut rx).await;
            match item.phase {
                IndexPhase::Replay => replayed.push(item.block.block_number),
                IndexPhase::Live => live.push(item.block.block_number),
            }
        }
        assert_eq!(replayed, vec![5, 9]);
        assert_eq!(&live[..3], &[13, 14, 15]);

        scope.cancel();
        tokio::time::timeout(Duration::from_secs(2), pipeline.join()).await.unwrap();

        let requested = source.requested.lock().unwrap().clone();
        assert!(!requested.iter().any(|n| (10..=12).contains(n) || *n < 5));
    }

    #[tokio::test]
    async fn live_tail_waits_for_unproduced_blocks() {
        let source = Arc::new(Chain { head: 3, requested: Mutex::new(vec![]) });
        let config = Configuration::new("app", 3, ["0x1"]);
        let checkpoints = CheckpointManager::new(Arc::new(MemoryRecordStore::new()), "app");
        let (scope, signal) = CancelHandle::new();
        let (tx, mut rx) = mpsc::channel(1);
        let pipeline =
            BlockPipeline::start(&config, &checkpoints, source.clone(), &settings(), tx, signal)
                .await
                .unwrap();

        assert_eq!(recv(&mut rx).await.block.block_number, 3);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let asked_for_four = source
            .requested
            .lock()
            .unwrap()
            .iter()
            .filter(|n| **n == 4)
            .count();
        assert!(asked_for_four >= 2, "block 4 should be polled repeatedly");
        assert!(!source.requested.lock().unwrap().contains(&5));

        scope.cancel();
        tokio::time::timeout(Duration::from_secs(2), pipeline.join()).await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_unblocks_pending_send() {
        let source = Arc::new(Chain { head: 1_000, requested: Mutex::new(vec![]) });
        let config = Configuration::new("app", 0, ["0x1", "0x2"]);
        let checkpoints = CheckpointManager::new(Arc::new(MemoryRecordStore::new()), "app");
        let (scope, signal) = CancelHandle::new();
        let (tx, _rx) = mpsc::channel(1);
        let pipeline = BlockPipeline::start(&config, &checkpoints, source, &settings(), tx, signal)
            .await
            .unwrap();

        // Nobody reads: producers are parked on the full channel.
        tokio::time::sleep(Duration::from_millis(20)).await;
        scope.cancel();
        tokio::time::timeout(Duration::from_secs(2), pipeline.join())
            .await
            .expect("producers must stop once cancelled");
    }

    /// A node that accepts requests and never answers.
    struct Stalled;

    #[async_trait]
    impl BlockSource for Stalled {
        async fn fetch_block(&self, _n: u64) -> IndexerResult<Block> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_stalled_fetch() {
        let store = Arc::new(MemoryRecordStore::new());
        let checkpoints = CheckpointManager::new(store, "app");
        checkpoints.record_block("0x1", 5, true, true).await.unwrap();

        let config = Configuration::new("app", 0, ["0x1"]);
        let (scope, signal) = CancelHandle::new();
        let (tx, mut rx) = mpsc::channel(1);
        let pipeline =
            BlockPipeline::start(&config, &checkpoints, Arc::new(Stalled), &settings(), tx, signal)
                .await
                .unwrap();

        // Replay and live producers are both waiting on the node.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());

        scope.cancel();
        tokio::time::timeout(Duration::from_secs(2), pipeline.join())
            .await
            .expect("stalled fetches must not outlive the scope");
    }
}

//! Bounded-chunk read → transform → write loop
//!
//! A stage pulls items from an [`ItemReader`] one at a time, runs each through
//! an [`ItemProcessor`] and buffers the survivors until a chunk is full, then
//! hands the chunk to an [`ItemWriter`]. After each chunk the reader is told
//! how many items have been fully handled so it can persist its position.
//!
//! Quota exhaustion from the reader or processor is an end-of-input signal:
//! nothing more is read, the chunk in flight is still written, and the stage
//! ends `HALTED_QUOTA`.

use async_trait::async_trait;
use flik_common::types::{StageReport, StageState, StageStats};
use tracing::{debug, error, info, warn};

use super::error::{IngestError, IngestResult};

#[async_trait]
pub trait ItemReader: Send {
    type Item: Send;

    /// Next item, or `None` once the input is exhausted
    async fn read(&mut self) -> IngestResult<Option<Self::Item>>;

    /// Every item read so far, up to `consumed`, has been written or dropped
    async fn on_chunk_committed(&mut self, _consumed: u64) -> IngestResult<()> {
        Ok(())
    }

    /// A write failed; undo anything tied to items not yet committed
    async fn on_write_failed(&mut self) -> IngestResult<()> {
        Ok(())
    }

    fn api_calls(&self) -> u64 {
        0
    }

    /// Items dropped before they were handed out
    fn filtered(&self) -> u64 {
        0
    }
}

#[async_trait]
pub trait ItemProcessor: Send {
    type In: Send;
    type Out: Send + Sync;

    /// `Ok(None)` drops the item and counts it as skipped
    async fn process(&mut self, item: Self::In) -> IngestResult<Option<Self::Out>>;

    fn api_calls(&self) -> u64 {
        0
    }
}

#[async_trait]
pub trait ItemWriter: Send {
    type Item: Send + Sync;

    /// Persist one chunk atomically and return the number of rows written
    async fn write(&mut self, items: &[Self::Item]) -> IngestResult<usize>;

    async fn on_chunk_committed(&mut self, _written: usize) -> IngestResult<()> {
        Ok(())
    }

    async fn on_write_failed(&mut self, _error: &IngestError) {}
}

/// Passes items through unchanged
pub struct PassThrough<T>(std::marker::PhantomData<fn() -> T>);

impl<T> Default for PassThrough<T> {
    fn default() -> Self {
        Self(std::marker::PhantomData)
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> ItemProcessor for PassThrough<T> {
    type In = T;
    type Out = T;

    async fn process(&mut self, item: T) -> IngestResult<Option<T>> {
        Ok(Some(item))
    }
}

/// Final state of a stage run
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub name: String,
    pub state: StageState,
    pub stats: StageStats,
    pub error: Option<String>,
}

impl StageOutcome {
    pub fn report(&self) -> StageReport {
        StageReport {
            name: self.name.clone(),
            state: self.state,
            stats: self.stats.clone(),
        }
    }
}

/// Type-erased stage so pipelines can hold heterogeneous stages in order
#[async_trait]
pub trait Stage: Send {
    fn name(&self) -> &str;

    async fn run(self: Box<Self>) -> StageOutcome;
}

pub struct ChunkStage<R, P, W> {
    name: String,
    chunk_size: usize,
    reader: R,
    processor: P,
    writer: W,
}

/// How filling a chunk ended
enum FillEnd {
    Full,
    Exhausted,
    Quota(IngestError),
}

impl<R, P, W> ChunkStage<R, P, W>
where
    R: ItemReader,
    P: ItemProcessor<In = R::Item>,
    W: ItemWriter<Item = P::Out>,
{
    pub fn new(name: impl Into<String>, chunk_size: usize, reader: R, processor: P, writer: W) -> Self {
        Self {
            name: name.into(),
            chunk_size: chunk_size.max(1),
            reader,
            processor,
            writer,
        }
    }

    /// Read up to one chunk of processed items
    async fn fill(
        &mut self,
        chunk: &mut Vec<P::Out>,
        stats: &mut StageStats,
        consumed: &mut u64,
    ) -> IngestResult<FillEnd> {
        while chunk.len() < self.chunk_size {
            let item = match self.reader.read().await {
                Ok(Some(item)) => item,
                Ok(None) => return Ok(FillEnd::Exhausted),
                Err(e) if e.is_quota() => return Ok(FillEnd::Quota(e)),
                Err(e) => return Err(e),
            };
            stats.inc_read();

            match self.processor.process(item).await {
                Ok(Some(out)) => chunk.push(out),
                Ok(None) => stats.inc_skipped(),
                // The item that hit the quota was not handled, so it does not
                // count as consumed.
                Err(e) if e.is_quota() => return Ok(FillEnd::Quota(e)),
                Err(e) => return Err(e),
            }
            *consumed += 1;
        }

        Ok(FillEnd::Full)
    }

    pub async fn execute(mut self) -> StageOutcome {
        let mut stats = StageStats::new();
        let mut consumed: u64 = 0;
        let mut chunk: Vec<P::Out> = Vec::with_capacity(self.chunk_size);

        info!(stage = %self.name, chunk_size = self.chunk_size, "Stage started");

        let (state, error) = loop {
            chunk.clear();
            let end = match self.fill(&mut chunk, &mut stats, &mut consumed).await {
                Ok(end) => end,
                Err(e) => {
                    error!(stage = %self.name, error = %e, "Stage failed while reading");
                    if let Err(rollback) = self.reader.on_write_failed().await {
                        warn!(stage = %self.name, error = %rollback, "Reader compensation failed");
                    }
                    break (StageState::Failed, Some(e.to_string()));
                },
            };

            if !chunk.is_empty() {
                match self.writer.write(&chunk).await {
                    Ok(written) => {
                        stats.add_written(written as u64);
                        debug!(stage = %self.name, written, consumed, "Chunk written");
                        if let Err(e) = self.writer.on_chunk_committed(written).await {
                            warn!(stage = %self.name, error = %e, "Writer commit hook failed");
                        }
                    },
                    Err(e) => {
                        error!(stage = %self.name, error = %e, items = chunk.len(), "Chunk write failed");
                        self.writer.on_write_failed(&e).await;
                        if let Err(rollback) = self.reader.on_write_failed().await {
                            warn!(stage = %self.name, error = %rollback, "Reader compensation failed");
                        }
                        break (StageState::Failed, Some(e.to_string()));
                    },
                }
            }

            if let Err(e) = self.reader.on_chunk_committed(consumed).await {
                error!(stage = %self.name, error = %e, "Failed to record progress");
                break (StageState::Failed, Some(e.to_string()));
            }

            match end {
                FillEnd::Full => continue,
                FillEnd::Exhausted => break (StageState::Exhausted, None),
                FillEnd::Quota(e) => {
                    warn!(stage = %self.name, reason = %e, "Stage halted on quota");
                    break (StageState::HaltedQuota, Some(e.to_string()));
                },
            }
        };

        stats.add_api_calls(self.reader.api_calls() + self.processor.api_calls());
        stats.filter_count += self.reader.filtered();
        stats.complete();

        info!(
            stage = %self.name,
            state = ?state,
            read = stats.read_count,
            written = stats.write_count,
            skipped = stats.skip_count,
            filtered = stats.filter_count,
            api_calls = stats.api_calls,
            "Stage finished"
        );

        StageOutcome {
            name: self.name,
            state,
            stats,
            error,
        }
    }
}

#[async_trait]
impl<R, P, W> Stage for ChunkStage<R, P, W>
where
    R: ItemReader + 'static,
    P: ItemProcessor<In = R::Item> + 'static,
    W: ItemWriter<Item = P::Out> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(self: Box<Self>) -> StageOutcome {
        (*self).execute().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::error::QuotaSource;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Log {
        commits: Arc<Mutex<Vec<u64>>>,
        rollbacks: Arc<Mutex<u32>>,
        written: Arc<Mutex<Vec<Vec<u32>>>>,
    }

    struct VecReader {
        items: VecDeque<IngestResult<u32>>,
        log: Log,
    }

    impl VecReader {
        fn new(items: Vec<IngestResult<u32>>, log: &Log) -> Self {
            Self {
                items: items.into(),
                log: log.clone(),
            }
        }
    }

    #[async_trait]
    impl ItemReader for VecReader {
        type Item = u32;

        async fn read(&mut self) -> IngestResult<Option<u32>> {
            self.items.pop_front().transpose()
        }

        async fn on_chunk_committed(&mut self, consumed: u64) -> IngestResult<()> {
            self.log.commits.lock().unwrap().push(consumed);
            Ok(())
        }

        async fn on_write_failed(&mut self) -> IngestResult<()> {
            *self.log.rollbacks.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Drops odd numbers and fails with quota on 99
    struct EvenOnly;

    #[async_trait]
    impl ItemProcessor for EvenOnly {
        type In = u32;
        type Out = u32;

        async fn process(&mut self, item: u32) -> IngestResult<Option<u32>> {
            if item == 99 {
                return Err(IngestError::quota(QuotaSource::Provider));
            }
            Ok((item % 2 == 0).then_some(item))
        }
    }

    struct RecordingWriter {
        log: Log,
        fail_on_call: Option<usize>,
        calls: usize,
    }

    #[async_trait]
    impl ItemWriter for RecordingWriter {
        type Item = u32;

        async fn write(&mut self, items: &[u32]) -> IngestResult<usize> {
            self.calls += 1;
            if self.fail_on_call == Some(self.calls) {
                return Err(IngestError::Persistence(sqlx::Error::PoolTimedOut));
            }
            self.log.written.lock().unwrap().push(items.to_vec());
            Ok(items.len())
        }
    }

    fn writer(log: &Log, fail_on_call: Option<usize>) -> RecordingWriter {
        RecordingWriter {
            log: log.clone(),
            fail_on_call,
            calls: 0,
        }
    }

    #[tokio::test]
    async fn test_exhausts_input_in_chunks() {
        let log = Log::default();
        let reader = VecReader::new((0..7).map(Ok).collect(), &log);
        let outcome = ChunkStage::new("test", 2, reader, EvenOnly, writer(&log, None))
            .execute()
            .await;

        assert_eq!(outcome.state, StageState::Exhausted);
        assert_eq!(outcome.stats.read_count, 7);
        assert_eq!(outcome.stats.write_count, 4);
        assert_eq!(outcome.stats.skip_count, 3);
        assert_eq!(*log.written.lock().unwrap(), vec![vec![0, 2], vec![4, 6]]);
        assert_eq!(log.commits.lock().unwrap().last(), Some(&7));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_quota_during_transform_writes_in_flight_chunk() {
        let log = Log::default();
        let reader = VecReader::new(vec![Ok(2), Ok(4), Ok(6), Ok(99), Ok(8)], &log);
        let outcome = ChunkStage::new("test", 10, reader, EvenOnly, writer(&log, None))
            .execute()
            .await;

        assert_eq!(outcome.state, StageState::HaltedQuota);
        assert_eq!(*log.written.lock().unwrap(), vec![vec![2, 4, 6]]);
        // 99 was read but not handled; 8 was never read
        assert_eq!(outcome.stats.read_count, 4);
        assert_eq!(*log.commits.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_quota_from_reader_halts() {
        let log = Log::default();
        let reader = VecReader::new(
            vec![Ok(2), Err(IngestError::quota(QuotaSource::DailyBudget)), Ok(4)],
            &log,
        );
        let outcome = ChunkStage::new("test", 10, reader, EvenOnly, writer(&log, None))
            .execute()
            .await;

        assert_eq!(outcome.state, StageState::HaltedQuota);
        assert_eq!(outcome.stats.write_count, 1);
    }

    #[tokio::test]
    async fn test_write_failure_compensates_and_fails() {
        let log = Log::default();
        let reader = VecReader::new((0..8).map(|n| Ok(n * 2)).collect(), &log);
        let outcome = ChunkStage::new("test", 2, reader, EvenOnly, writer(&log, Some(2)))
            .execute()
            .await;

        assert_eq!(outcome.state, StageState::Failed);
        assert_eq!(outcome.stats.write_count, 2);
        assert_eq!(*log.rollbacks.lock().unwrap(), 1);
        assert_eq!(*log.commits.lock().unwrap(), vec![2]);
        assert!(outcome.error.unwrap().contains("Persistence"));
    }

    #[tokio::test]
    async fn test_boxed_stage_reports() {
        let log = Log::default();
        let reader = VecReader::new(vec![Ok(1), Ok(2)], &log);
        let stage: Box<dyn Stage> =
            Box::new(ChunkStage::new("boxed", 5, reader, PassThrough::default(), writer(&log, None)));
        assert_eq!(stage.name(), "boxed");

        let outcome = stage.run().await;
        let report = outcome.report();
        assert_eq!(report.name, "boxed");
        assert_eq!(report.state, StageState::Exhausted);
        assert_eq!(report.stats.write_count, 2);
    }
}

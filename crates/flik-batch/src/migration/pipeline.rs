//! Migration stage: eligible raw rows → spots

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::ingest::content_type::ContentType;
use crate::ingest::error::IngestResult;
use crate::ingest::raw_store::RawStore;
use crate::ingest::record::RawRecord;
use crate::ingest::stage::{ItemProcessor, ItemReader, ItemWriter};

use super::spot::NormalizedSpot;
use super::spot_store::SpotStore;
use super::transformer::transform;

/// Loads the eligible rows of one raw table on first read
pub struct EligibleReader {
    store: Arc<dyn RawStore>,
    content_type: ContentType,
    buffer: Option<VecDeque<RawRecord>>,
}

impl EligibleReader {
    pub fn new(store: Arc<dyn RawStore>, content_type: ContentType) -> Self {
        Self {
            store,
            content_type,
            buffer: None,
        }
    }
}

#[async_trait]
impl ItemReader for EligibleReader {
    type Item = RawRecord;

    async fn read(&mut self) -> IngestResult<Option<RawRecord>> {
        if self.buffer.is_none() {
            let records = self.store.load_eligible(self.content_type).await?;
            debug!(
                content_type = %self.content_type,
                count = records.len(),
                "Loaded records eligible for migration"
            );
            self.buffer = Some(records.into());
        }
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }
}

pub struct SpotProcessor {
    content_type: ContentType,
}

impl SpotProcessor {
    pub fn new(content_type: ContentType) -> Self {
        Self { content_type }
    }
}

#[async_trait]
impl ItemProcessor for SpotProcessor {
    type In = RawRecord;
    type Out = NormalizedSpot;

    async fn process(&mut self, record: RawRecord) -> IngestResult<Option<NormalizedSpot>> {
        transform(self.content_type, &record).map(Some)
    }
}

/// Counts only rows that were new to `spots`
pub struct SpotWriter {
    store: Arc<dyn SpotStore>,
}

impl SpotWriter {
    pub fn new(store: Arc<dyn SpotStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ItemWriter for SpotWriter {
    type Item = NormalizedSpot;

    async fn write(&mut self, items: &[NormalizedSpot]) -> IngestResult<usize> {
        let inserted = self.store.bulk_insert(items).await?;
        Ok(inserted as usize)
    }
}

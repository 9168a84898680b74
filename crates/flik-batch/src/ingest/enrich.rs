//! Detail backfill stages over already collected raw rows

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::IngestResult;
use super::field_mapping::map_intro;
use super::gateway::TourismApi;
use super::raw_store::{DetailUpdate, LabelUpdate, RawKey, RawStore};
use super::record::{CommonDetail, LabelDetail};
use super::stage::{ItemProcessor, ItemReader, ItemWriter};

/// Attach label names to a detail-common payload. A failed lookup leaves the
/// names empty rather than dropping the record.
pub async fn resolve_labels(store: &dyn RawStore, common: &CommonDetail) -> LabelDetail {
    let codes = [
        common.lcls_systm1.as_str(),
        common.lcls_systm2.as_str(),
        common.lcls_systm3.as_str(),
    ];
    let [label_depth1, label_depth2, label_depth3] = match store.label_names(codes).await {
        Ok(names) => names,
        Err(e) => {
            warn!(error = %e, "Classification label lookup failed");
            Default::default()
        },
    };

    LabelDetail {
        overview: common.overview.clone(),
        label_depth1,
        label_depth2,
        label_depth3,
    }
}

/// Which backlog a [`PendingReader`] drains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backlog {
    Detail,
    Labels,
}

/// Loads the backlog once, on first read, then hands out keys
pub struct PendingReader {
    store: Arc<dyn RawStore>,
    backlog: Backlog,
    limit: u32,
    buffer: Option<VecDeque<RawKey>>,
}

impl PendingReader {
    pub fn new(store: Arc<dyn RawStore>, backlog: Backlog, limit: u32) -> Self {
        Self {
            store,
            backlog,
            limit,
            buffer: None,
        }
    }
}

#[async_trait]
impl ItemReader for PendingReader {
    type Item = RawKey;

    async fn read(&mut self) -> IngestResult<Option<RawKey>> {
        if self.buffer.is_none() {
            let keys = match self.backlog {
                Backlog::Detail => self.store.pending_detail(self.limit).await?,
                Backlog::Labels => self.store.pending_labels(self.limit).await?,
            };
            debug!(backlog = ?self.backlog, count = keys.len(), "Loaded enrichment backlog");
            self.buffer = Some(keys.into());
        }

        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }
}

pub struct DetailIntroProcessor {
    api: Arc<dyn TourismApi>,
    api_calls: u64,
}

impl DetailIntroProcessor {
    pub fn new(api: Arc<dyn TourismApi>) -> Self {
        Self { api, api_calls: 0 }
    }
}

#[async_trait]
impl ItemProcessor for DetailIntroProcessor {
    type In = RawKey;
    type Out = DetailUpdate;

    async fn process(&mut self, key: RawKey) -> IngestResult<Option<DetailUpdate>> {
        let fields = self
            .api
            .fetch_detail_intro(&key.content_id, key.content_type)
            .await?;
        self.api_calls += 1;

        if fields.is_empty() {
            debug!(content_id = %key.content_id, "No detail-intro data");
            return Ok(None);
        }

        let detail = map_intro(key.content_type, &fields);
        Ok(Some(DetailUpdate { key, detail }))
    }

    fn api_calls(&self) -> u64 {
        self.api_calls
    }
}

pub struct LabelDetailProcessor {
    api: Arc<dyn TourismApi>,
    store: Arc<dyn RawStore>,
    api_calls: u64,
}

impl LabelDetailProcessor {
    pub fn new(api: Arc<dyn TourismApi>, store: Arc<dyn RawStore>) -> Self {
        Self {
            api,
            store,
            api_calls: 0,
        }
    }
}

#[async_trait]
impl ItemProcessor for LabelDetailProcessor {
    type In = RawKey;
    type Out = LabelUpdate;

    async fn process(&mut self, key: RawKey) -> IngestResult<Option<LabelUpdate>> {
        let common = self.api.fetch_detail_common(&key.content_id).await?;
        self.api_calls += 1;

        let Some(common) = common else {
            debug!(content_id = %key.content_id, "No detail-common data");
            return Ok(None);
        };

        let labels = resolve_labels(self.store.as_ref(), &common).await;
        Ok(Some(LabelUpdate { key, labels }))
    }

    fn api_calls(&self) -> u64 {
        self.api_calls
    }
}

pub struct DetailWriter {
    store: Arc<dyn RawStore>,
}

impl DetailWriter {
    pub fn new(store: Arc<dyn RawStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ItemWriter for DetailWriter {
    type Item = DetailUpdate;

    async fn write(&mut self, items: &[DetailUpdate]) -> IngestResult<usize> {
        self.store.update_details(items).await
    }
}

pub struct LabelWriter {
    store: Arc<dyn RawStore>,
}

impl LabelWriter {
    pub fn new(store: Arc<dyn RawStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ItemWriter for LabelWriter {
    type Item = LabelUpdate;

    async fn write(&mut self, items: &[LabelUpdate]) -> IngestResult<usize> {
        self.store.update_labels(items).await
    }
}

//! Collection stage: paged listing fetch with inline enrichment

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::content_type::ContentType;
use super::cursor::ResumableCursor;
use super::enrich::resolve_labels;
use super::error::IngestResult;
use super::field_mapping::map_intro;
use super::gateway::{TourismApi, SOURCE_URL};
use super::raw_store::RawStore;
use super::record::RawRecord;
use super::stage::{ItemProcessor, ItemReader, ItemWriter};

/// Pages through the area listing starting at the cursor's resume page
pub struct PageReader {
    api: Arc<dyn TourismApi>,
    cursor: ResumableCursor,
    content_type: ContentType,
    area_code: String,
    page_size: u32,
    next_page: u32,
    buffer: VecDeque<RawRecord>,
    handed_out: u64,
    exhausted: bool,
    api_calls: u64,
    filtered: u64,
}

impl PageReader {
    pub fn new(
        api: Arc<dyn TourismApi>,
        cursor: ResumableCursor,
        content_type: ContentType,
        area_code: impl Into<String>,
        page_size: u32,
    ) -> Self {
        let next_page = cursor.resume_page();
        Self {
            api,
            cursor,
            content_type,
            area_code: area_code.into(),
            page_size: page_size.max(1),
            next_page,
            buffer: VecDeque::new(),
            handed_out: 0,
            exhausted: false,
            api_calls: 0,
            filtered: 0,
        }
    }

    async fn fetch_next_page(&mut self) -> IngestResult<()> {
        let page = self.next_page;
        let listing = self
            .api
            .fetch_page(page, &self.area_code, self.content_type, self.page_size)
            .await?;
        self.api_calls += 1;

        if listing.received == 0 {
            info!(
                content_type = %self.content_type,
                area_code = %self.area_code,
                page,
                "Listing exhausted"
            );
            self.exhausted = true;
            return Ok(());
        }

        // Short pages end the listing; travel courses still count toward size
        let fetched = listing.received as u64;
        if listing.received < self.page_size as usize {
            self.exhausted = true;
        }

        let records = listing.records;
        let (kept, dropped): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|r| r.belongs_to(self.content_type));
        if !dropped.is_empty() {
            debug!(page, dropped = dropped.len(), "Dropped records of another content type");
        }
        self.filtered += dropped.len() as u64;

        let end_offset = self.handed_out + self.buffer.len() as u64 + kept.len() as u64;
        self.buffer.extend(kept);
        self.cursor.stage(page, fetched, end_offset);
        self.next_page = page.saturating_add(1);

        debug!(
            content_type = %self.content_type,
            area_code = %self.area_code,
            page,
            fetched,
            "Fetched listing page"
        );
        Ok(())
    }
}

#[async_trait]
impl ItemReader for PageReader {
    type Item = RawRecord;

    async fn read(&mut self) -> IngestResult<Option<RawRecord>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                self.handed_out += 1;
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_next_page().await?;
        }
    }

    async fn on_chunk_committed(&mut self, consumed: u64) -> IngestResult<()> {
        self.cursor.commit_through(consumed).await?;
        Ok(())
    }

    async fn on_write_failed(&mut self) -> IngestResult<()> {
        self.cursor.rollback().await
    }

    fn api_calls(&self) -> u64 {
        self.api_calls
    }

    fn filtered(&self) -> u64 {
        self.filtered
    }
}

/// Validates, stamps and enriches each listing
pub struct CollectionProcessor {
    api: Arc<dyn TourismApi>,
    store: Arc<dyn RawStore>,
    content_type: ContentType,
    api_calls: u64,
}

impl CollectionProcessor {
    pub fn new(api: Arc<dyn TourismApi>, store: Arc<dyn RawStore>, content_type: ContentType) -> Self {
        Self {
            api,
            store,
            content_type,
            api_calls: 0,
        }
    }
}

#[async_trait]
impl ItemProcessor for CollectionProcessor {
    type In = RawRecord;
    type Out = RawRecord;

    async fn process(&mut self, mut record: RawRecord) -> IngestResult<Option<RawRecord>> {
        if !record.is_valid() {
            warn!(content_id = %record.content_id, "Skipping listing without id or title");
            return Ok(None);
        }

        record.content_type_name = self.content_type.label().to_string();
        record.collected_at = Some(Utc::now());
        record.source = SOURCE_URL.to_string();

        let fields = self
            .api
            .fetch_detail_intro(&record.content_id, self.content_type)
            .await?;
        self.api_calls += 1;
        if !fields.is_empty() {
            record.detail = Some(map_intro(self.content_type, &fields));
        }

        let common = self.api.fetch_detail_common(&record.content_id).await?;
        self.api_calls += 1;
        if let Some(common) = common {
            let labels = resolve_labels(self.store.as_ref(), &common).await;
            record.overview = labels.overview.clone();
            record.labels = Some(labels);
        }

        Ok(Some(record))
    }

    fn api_calls(&self) -> u64 {
        self.api_calls
    }
}

pub struct RawRecordWriter {
    store: Arc<dyn RawStore>,
    content_type: ContentType,
}

impl RawRecordWriter {
    pub fn new(store: Arc<dyn RawStore>, content_type: ContentType) -> Self {
        Self { store, content_type }
    }
}

#[async_trait]
impl ItemWriter for RawRecordWriter {
    type Item = RawRecord;

    async fn write(&mut self, items: &[RawRecord]) -> IngestResult<usize> {
        self.store.upsert_chunk(self.content_type, items).await
    }
}

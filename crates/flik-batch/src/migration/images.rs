//! Spot image stage: provider galleries for spots that have no images
//!
//! Spots are read in id order with a keyset, so a spot whose gallery call
//! failed softly is passed over for the rest of the run and asked again on
//! the next one.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ingest::error::IngestResult;
use crate::ingest::gateway::TourismApi;
use crate::ingest::stage::{ItemProcessor, ItemReader, ItemWriter};

use super::spot_store::{SpotImageTarget, SpotImageUpdate, SpotStore};
use super::transformer::encode_image_urls;

/// Spots per gallery write
pub const IMAGE_CHUNK_SIZE: usize = 50;

/// Spots fetched per backlog query
const READ_PAGE_SIZE: u32 = 200;

pub struct SpotImageReader {
    store: Arc<dyn SpotStore>,
    limit: u32,
    after_id: i64,
    loaded: u32,
    buffer: VecDeque<SpotImageTarget>,
    exhausted: bool,
}

impl SpotImageReader {
    pub fn new(store: Arc<dyn SpotStore>, limit: u32) -> Self {
        Self {
            store,
            limit,
            after_id: 0,
            loaded: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    async fn load_page(&mut self) -> IngestResult<()> {
        let wanted = READ_PAGE_SIZE.min(self.limit.saturating_sub(self.loaded));
        if wanted == 0 {
            self.exhausted = true;
            return Ok(());
        }

        let page = self.store.pending_images(self.after_id, wanted).await?;
        if (page.len() as u32) < wanted {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.after_id = last.id;
        }
        self.loaded += page.len() as u32;
        debug!(after_id = self.after_id, count = page.len(), "Loaded spots without images");
        self.buffer.extend(page);
        Ok(())
    }
}

#[async_trait]
impl ItemReader for SpotImageReader {
    type Item = SpotImageTarget;

    async fn read(&mut self) -> IngestResult<Option<SpotImageTarget>> {
        loop {
            if let Some(target) = self.buffer.pop_front() {
                return Ok(Some(target));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.load_page().await?;
        }
    }
}

pub struct SpotImageProcessor {
    api: Arc<dyn TourismApi>,
    api_calls: u64,
}

impl SpotImageProcessor {
    pub fn new(api: Arc<dyn TourismApi>) -> Self {
        Self { api, api_calls: 0 }
    }
}

#[async_trait]
impl ItemProcessor for SpotImageProcessor {
    type In = SpotImageTarget;
    type Out = SpotImageUpdate;

    async fn process(&mut self, target: SpotImageTarget) -> IngestResult<Option<SpotImageUpdate>> {
        if target.content_id.trim().is_empty() {
            warn!(spot_id = target.id, "Skipping spot without content id");
            return Ok(None);
        }

        let urls = self.api.fetch_detail_images(&target.content_id).await?;
        self.api_calls += 1;

        let Some(urls) = urls else {
            return Ok(None);
        };
        if urls.is_empty() {
            debug!(content_id = %target.content_id, "Provider has no images for spot");
        }

        Ok(Some(SpotImageUpdate {
            id: target.id,
            image_urls: encode_image_urls(urls.as_slice())?,
        }))
    }

    fn api_calls(&self) -> u64 {
        self.api_calls
    }
}

/// Counts only spots that received images
pub struct SpotImageWriter {
    store: Arc<dyn SpotStore>,
}

impl SpotImageWriter {
    pub fn new(store: Arc<dyn SpotStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ItemWriter for SpotImageWriter {
    type Item = SpotImageUpdate;

    async fn write(&mut self, items: &[SpotImageUpdate]) -> IngestResult<usize> {
        let with_images = self.store.update_images(items).await?;
        Ok(with_images as usize)
    }
}

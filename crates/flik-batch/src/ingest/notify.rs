//! Outbound run notifications
//!
//! Delivery is fire-and-forget. [`dispatch`] spawns the send and only logs
//! a failure; the run outcome is already recorded by then.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use flik_common::types::RunState;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::error::{IngestError, IngestResult};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> IngestResult<()>;
}

/// Posts `{"content": message}` to a Discord webhook
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IngestError::Notification(e.to_string()))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, message: &str) -> IngestResult<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "content": message }))
            .send()
            .await
            .map_err(|e| IngestError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IngestError::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Used when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> IngestResult<()> {
        info!(message = %message, "Notification");
        Ok(())
    }
}

/// Send in the background; failures are logged and dropped
pub fn dispatch(notifier: Arc<dyn Notifier>, message: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&message).await {
            warn!(error = %e, "Failed to deliver notification");
        }
    })
}

pub fn completion_message(
    job_name: &str,
    state: RunState,
    written: u64,
    at: DateTime<FixedOffset>,
) -> String {
    let icon = if state == RunState::Completed { "✅" } else { "❌" };
    format!(
        "{} **배치 작업 완료**\n**작업명**: {}\n**상태**: {}\n**수집 건수**: {}건\n**완료 시간**: {}",
        icon,
        job_name,
        state,
        written,
        at.format(TIMESTAMP_FORMAT)
    )
}

pub fn empty_result_message(job_name: &str, at: DateTime<FixedOffset>) -> String {
    format!(
        "⚠️ **배치 작업 알림**\n**작업명**: {}\n**상태**: 수집 데이터 없음\n**시간**: {}\n**메시지**: 더 이상 수집할 새로운 데이터가 없습니다.",
        job_name,
        at.format(TIMESTAMP_FORMAT)
    )
}

pub fn quota_message(job_name: &str, used: u32, limit: u32, at: DateTime<FixedOffset>) -> String {
    format!(
        "⚠️ **API 제한 도달**\n**작업명**: {}\n**사용량**: {}/{}건\n**상태**: 내일 자동 재시작 예정\n**시간**: {}",
        job_name,
        used,
        limit,
        at.format(TIMESTAMP_FORMAT)
    )
}

//! Post-recording analysis hook.

use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use super::{RecordingSession, SessionStore, StoreError};

/// Produces a free-text analysis of a finished session.
///
/// Implementors must be `Send + Sync` so they can be shared behind
/// `Arc<dyn SessionSummarizer>`.
#[async_trait]
pub trait SessionSummarizer: Send + Sync {
    async fn summarize(&self, session: &RecordingSession, artifact: &Path)
        -> anyhow::Result<String>;
}

/// Summarizer that only restates the recorded metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSummarizer;

#[async_trait]
impl SessionSummarizer for MetricsSummarizer {
    async fn summarize(
        &self,
        session: &RecordingSession,
        _artifact: &Path,
    ) -> anyhow::Result<String> {
        let mut summary = format!(
            "{:.1}s of practice, {} throw{}",
            session.duration_secs,
            session.throw_count,
            if session.throw_count == 1 { "" } else { "s" }
        );
        match session.average_angle {
            Some(angle) => summary.push_str(&format!(", average elbow angle {angle:.0}°")),
            None => summary.push_str(", no arm angle captured"),
        }
        summary.push('.');
        Ok(summary)
    }
}

/// Run `summarizer` on session `id` and store the result, marking the
/// session analyzed.
pub async fn summarize_and_store(
    store: &SessionStore,
    summarizer: &dyn SessionSummarizer,
    id: Uuid,
) -> Result<String, StoreError> {
    let session = store.get(id).ok_or(StoreError::NotFound(id))?;
    let artifact = store.artifact_path(&session);

    let summary = summarizer
        .summarize(&session, &artifact)
        .await
        .map_err(|e| StoreError::Summary(e.to_string()))?;

    store.mark_analyzed(id, Some(summary.clone()))?;
    log::debug!("store: summarized {id}");
    Ok(summary)
}

//! Site publish pipeline: render the current collection, then hand it to a sink.
//!
//! The pipeline is never transactional with the article store. A failed render
//! or sink call leaves already-saved articles in place and is reported as
//! [`PublishOutcome::Degraded`]; the next publish re-renders everything.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    errors::Error, media::MediaSink, site::SiteRenderer, store::write_atomic,
    store::ArticleStore, Result,
};

pub const INDEX_FILE: &str = "index.html";

/// A rendered site, already written to disk.
#[derive(Clone, Debug)]
pub struct SiteArtifact {
    pub index_path: PathBuf,
    pub article_count: usize,
    /// Short human description of what triggered the publish (used as commit message).
    pub summary: String,
}

/// External system that makes a rendered site visible to readers.
#[async_trait]
pub trait PublishSink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, site: &SiteArtifact, media_dir: &Path) -> Result<()>;
}

/// Sink that only keeps the rendered files on disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalOnlySink;

#[async_trait]
impl PublishSink for LocalOnlySink {
    fn name(&self) -> &str {
        "local"
    }

    async fn publish(&self, _site: &SiteArtifact, _media_dir: &Path) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    Degraded(String),
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, PublishOutcome::Published)
    }
}

#[derive(Clone, Debug)]
pub struct PublishConfig {
    pub site_dir: PathBuf,
    pub sink_timeout: Duration,
}

pub struct PublishPipeline {
    cfg: PublishConfig,
    store: Arc<ArticleStore>,
    media: Arc<dyn MediaSink>,
    renderer: Arc<dyn SiteRenderer>,
    sink: Arc<dyn PublishSink>,
    state: std::sync::Mutex<PipelineState>,
    in_flight: Mutex<()>,
}

#[derive(Debug, Default)]
struct PipelineState {
    /// Incremented on every `run` request.
    requested: u64,
    /// Request number the most recent finished run started after.
    completed: u64,
    last_outcome: Option<PublishOutcome>,
}

impl PublishPipeline {
    pub fn new(
        cfg: PublishConfig,
        store: Arc<ArticleStore>,
        media: Arc<dyn MediaSink>,
        renderer: Arc<dyn SiteRenderer>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        Self {
            cfg,
            store,
            media,
            renderer,
            sink,
            state: std::sync::Mutex::new(PipelineState::default()),
            in_flight: Mutex::new(()),
        }
    }

    /// Render and publish the current collection.
    ///
    /// Calls overlapping an in-flight run wait for it. If a run that started
    /// after this request finished in the meantime, its outcome is reused,
    /// since it already included this caller's change.
    pub async fn run(&self, summary: &str) -> PublishOutcome {
        let ticket = {
            let mut st = self.lock_state();
            st.requested += 1;
            st.requested
        };

        let _guard = self.in_flight.lock().await;

        let started_at = {
            let st = self.lock_state();
            if st.completed >= ticket {
                if let Some(outcome) = st.last_outcome.clone() {
                    info!(ticket, "publish coalesced into a later run");
                    return outcome;
                }
            }
            st.requested
        };

        let outcome = match self.render_and_publish(summary).await {
            Ok(()) => {
                info!(sink = self.sink.name(), "site published");
                PublishOutcome::Published
            }
            Err(e) => {
                warn!(sink = self.sink.name(), error = %e, "site publish failed");
                PublishOutcome::Degraded(e.to_string())
            }
        };

        let mut st = self.lock_state();
        st.completed = started_at;
        st.last_outcome = Some(outcome.clone());
        outcome
    }

    async fn render_and_publish(&self, summary: &str) -> Result<()> {
        let artifact = self.render(summary).await?;
        match tokio::time::timeout(
            self.cfg.sink_timeout,
            self.sink.publish(&artifact, self.media.dir()),
        )
        .await
        {
            Ok(res) => res,
            Err(_) => Err(Error::Publish(format!(
                "{} sink timed out after {}s",
                self.sink.name(),
                self.cfg.sink_timeout.as_secs()
            ))),
        }
    }

    async fn render(&self, summary: &str) -> Result<SiteArtifact> {
        let articles = self.store.list().await;

        let mut available = HashSet::new();
        for m in articles.iter().filter_map(|a| a.image.as_ref()) {
            if self.media.exists(m).await {
                available.insert(m.clone());
            } else {
                warn!(media = %m, "article image missing, rendering placeholder");
            }
        }

        let html = self
            .renderer
            .render(&articles, &available)
            .map_err(|e| Error::Publish(format!("render failed: {e}")))?;

        let index_path = self.cfg.site_dir.join(INDEX_FILE);
        write_atomic(&index_path, html.as_bytes())
            .await
            .map_err(|e| Error::Publish(format!("cannot write {}: {e}", index_path.display())))?;

        Ok(SiteArtifact {
            index_path,
            article_count: articles.len(),
            summary: summary.to_string(),
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

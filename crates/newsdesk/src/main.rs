use std::sync::Arc;

use tracing::{info, warn};

use newsdesk_core::{
    audit::AuditLogger,
    clock::{Clock, SystemClock},
    config::{Config, PublishMode},
    conversation::{ConversationEngine, EngineConfig, EngineDeps},
    media::{FsMediaSink, MediaSink},
    publish::{LocalOnlySink, PublishConfig, PublishPipeline, PublishSink},
    site::{HtmlSiteRenderer, MEDIA_URL_PREFIX},
    store::ArticleStore,
    Error,
};
use newsdesk_git::{GitPublishSink, GitSinkConfig};

#[tokio::main]
async fn main() -> Result<(), Error> {
    newsdesk_core::logging::init("newsdesk")?;

    let cfg = Arc::new(Config::load()?);
    cfg.ensure_dirs()?;
    if cfg.media_dir != cfg.site_dir.join(MEDIA_URL_PREFIX) {
        warn!(
            media = %cfg.media_dir.display(),
            site = %cfg.site_dir.display(),
            "media directory is not the site's media folder; published images may not resolve"
        );
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(ArticleStore::new(cfg.articles_file.clone(), clock.clone()));
    let media: Arc<dyn MediaSink> = Arc::new(FsMediaSink::new(cfg.media_dir.clone()));

    let renderer = HtmlSiteRenderer {
        footer_html: cfg.site_footer_html.clone(),
        ..HtmlSiteRenderer::new(cfg.site_title.clone())
    };
    let sink: Arc<dyn PublishSink> = match cfg.publish_mode {
        PublishMode::Git => Arc::new(GitPublishSink::new(GitSinkConfig {
            git_path: cfg.git_path.clone(),
            repo_dir: cfg.site_dir.clone(),
            remote: cfg.git_remote.clone(),
            branch: cfg.git_branch.clone(),
            extra_paths: vec![cfg.articles_file.clone()],
        })),
        PublishMode::None => Arc::new(LocalOnlySink),
    };
    info!(sink = sink.name(), "publish sink selected");

    let pipeline = Arc::new(PublishPipeline::new(
        PublishConfig {
            site_dir: cfg.site_dir.clone(),
            sink_timeout: cfg.publish_timeout,
        },
        store.clone(),
        media.clone(),
        Arc::new(renderer),
        sink,
    ));

    let (bot, messenger) = newsdesk_telegram::router::connect(&cfg);

    let engine = Arc::new(ConversationEngine::new(
        EngineDeps {
            store,
            media,
            pipeline,
            messenger,
            clock,
            audit: Some(Arc::new(AuditLogger::new(
                cfg.audit_log_path.clone(),
                cfg.audit_log_json,
            ))),
        },
        EngineConfig::from_config(&cfg),
    ));

    newsdesk_telegram::router::run_polling(cfg, bot, engine)
        .await
        .map_err(|e| Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}

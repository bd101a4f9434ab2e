use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use newsdesk_core::{
    config::Config,
    conversation::ConversationEngine,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub engine: Arc<ConversationEngine>,
}

/// Bot handle plus the outbound messenger the engine replies through.
pub fn connect(cfg: &Config) -> (Bot, Arc<dyn MessagingPort>) {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Throttle outbound calls to stay under Telegram's flood limits; the
    // adapter still retries once on RetryAfter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));
    (bot, messenger)
}

pub async fn run_polling(
    cfg: Arc<Config>,
    bot: Bot,
    engine: Arc<ConversationEngine>,
) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "newsdesk bot started"),
        Err(e) => warn!(error = %e, "get_me failed; continuing"),
    }
    info!(
        admins = cfg.admin_user_ids.len(),
        articles = %cfg.articles_file.display(),
        site = %cfg.site_dir.display(),
        "configuration loaded"
    );

    let cancel = CancellationToken::new();
    let sweeper = engine.spawn_sweeper(cfg.session_sweep_interval, cancel.clone());

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        engine,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "session sweeper task failed");
    }
    Ok(())
}

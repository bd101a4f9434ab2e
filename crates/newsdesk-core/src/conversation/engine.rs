//! The conversation state machine.
//!
//! Every inbound update is handled under a per-user lock: the user's session is
//! taken out of the table, the transition for its current step is applied, and
//! the resulting session (if any) is put back. Store writes, media writes and
//! publishing all happen inside that transition.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    article::{validate_content, validate_title, Article, ArticlePatch, NewArticle},
    audit::{AuditEvent, AuditLogger},
    clock::Clock,
    config::Config,
    conversation::session::{ImageChange, Session, Step, UserLocks},
    domain::{ArticleId, ChatId, MediaRef, UserId},
    errors::Error,
    formatting::{escape_html, format_article_card, format_article_list, split_message, truncate_text},
    media::MediaSink,
    messaging::{
        port::MessagingPort,
        types::{Command, IncomingUpdate, PhotoPayload, UpdateKind},
    },
    publish::{PublishOutcome, PublishPipeline},
    security::AccessPolicy,
    store::ArticleStore,
};

const HELP_TEXT: &str = "📰 <b>News desk</b>\n\n\
/add - write a new article (photo, title, text)\n\
/list - list articles\n\
/show &lt;id&gt; - show one article\n\
/edit &lt;id&gt; - edit an article (admins)\n\
/delete &lt;id&gt; - delete an article (admins)\n\
/publish - publish the site again (admins)\n\
/cancel - abandon the current draft";

const IDLE_HINT: &str = "Send /add to write an article, or /help to see all commands.";

/// Collaborators the engine drives.
#[derive(Clone)]
pub struct EngineDeps {
    pub store: Arc<ArticleStore>,
    pub media: Arc<dyn MediaSink>,
    pub pipeline: Arc<PublishPipeline>,
    pub messenger: Arc<dyn MessagingPort>,
    pub clock: Arc<dyn Clock>,
    pub audit: Option<Arc<AuditLogger>>,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub access: AccessPolicy,
    pub session_timeout: Duration,
    pub media_download_timeout: Duration,
    /// Upper bound for one outbound message (further capped by the transport).
    pub reply_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            access: AccessPolicy::default(),
            session_timeout: Duration::from_secs(30 * 60),
            media_download_timeout: Duration::from_secs(30),
            reply_limit: 4000,
        }
    }
}

impl EngineConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            access: AccessPolicy::new(cfg.admin_user_ids.clone(), cfg.authoring),
            session_timeout: cfg.session_timeout,
            media_download_timeout: cfg.media_download_timeout,
            reply_limit: cfg.telegram_safe_limit,
        }
    }
}

pub struct ConversationEngine {
    deps: EngineDeps,
    cfg: EngineConfig,
    sessions: Mutex<HashMap<i64, Session>>,
    locks: UserLocks,
}

impl ConversationEngine {
    pub fn new(deps: EngineDeps, cfg: EngineConfig) -> Self {
        Self {
            deps,
            cfg,
            sessions: Mutex::new(HashMap::new()),
            locks: UserLocks::default(),
        }
    }

    /// Apply one inbound update. Failures are reported to the user, never returned.
    pub async fn handle(&self, update: IncomingUpdate) {
        let _guard = self.locks.lock_user(update.user_id).await;
        let now = self.deps.clock.now();

        let current = self.sessions.lock().await.remove(&update.user_id.0);
        let current = match current {
            Some(s) if s.is_expired(now, self.cfg.session_timeout) => {
                self.expire(s).await;
                None
            }
            other => other,
        };

        let next = match current {
            None => self.handle_idle(&update).await,
            Some(session) => self.handle_in_session(session, &update).await,
        };

        if let Some(mut session) = next {
            session.last_activity = self.deps.clock.now();
            debug!(user_id = update.user_id.0, step = session.step.name(), "session updated");
            self.sessions.lock().await.insert(update.user_id.0, session);
        }
    }

    /// Current step of a user's session, if one is open.
    pub async fn session_step(&self, user_id: i64) -> Option<Step> {
        self.sessions
            .lock()
            .await
            .get(&user_id)
            .map(|s| s.step.clone())
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Drop sessions idle for longer than the timeout and clean their uploads.
    ///
    /// Each eviction holds that user's lock, so it never overlaps an update
    /// from the same user.
    pub async fn evict_expired(&self) -> usize {
        let now = self.deps.clock.now();
        let candidates: Vec<i64> = self
            .sessions
            .lock()
            .await
            .iter()
            .filter(|(_, s)| s.is_expired(now, self.cfg.session_timeout))
            .map(|(k, _)| *k)
            .collect();

        let mut evicted = 0;
        for user_id in candidates {
            let _guard = self.locks.lock_user(UserId(user_id)).await;
            let session = {
                let mut map = self.sessions.lock().await;
                let still_expired = map
                    .get(&user_id)
                    .is_some_and(|s| s.is_expired(now, self.cfg.session_timeout));
                if still_expired {
                    map.remove(&user_id)
                } else {
                    None
                }
            };
            if let Some(s) = session {
                self.expire(s).await;
                evicted += 1;
            }
        }
        evicted
    }

    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let n = engine.evict_expired().await;
                        if n > 0 {
                            info!(evicted = n, "idle sessions evicted");
                        }
                    }
                }
            }
        })
    }

    // ============== Idle (no session) ==============

    async fn handle_idle(&self, update: &IncomingUpdate) -> Option<Session> {
        match &update.kind {
            UpdateKind::Command(cmd) => self.idle_command(update, cmd).await,
            UpdateKind::Photo(photo) => self.start_with_photo(update, photo).await,
            UpdateKind::Text(_) | UpdateKind::Unsupported => {
                self.reply(update.chat_id, IDLE_HINT).await;
                None
            }
        }
    }

    async fn idle_command(&self, update: &IncomingUpdate, cmd: &Command) -> Option<Session> {
        match cmd.name.as_str() {
            "start" | "help" => {
                self.reply(update.chat_id, HELP_TEXT).await;
                None
            }
            "add" => self.cmd_add(update).await,
            "edit" => self.cmd_edit(update, &cmd.args).await,
            "list" => {
                self.cmd_list(update.chat_id).await;
                None
            }
            "show" => {
                self.cmd_show(update.chat_id, &cmd.args).await;
                None
            }
            "delete" => {
                self.cmd_delete(update, &cmd.args).await;
                None
            }
            "publish" => {
                self.cmd_publish(update).await;
                None
            }
            "cancel" => {
                self.reply(update.chat_id, "Nothing to cancel.").await;
                None
            }
            other => {
                self.reply(
                    update.chat_id,
                    &format!("Unknown command /{}. {IDLE_HINT}", escape_html(other)),
                )
                .await;
                None
            }
        }
    }

    async fn cmd_add(&self, update: &IncomingUpdate) -> Option<Session> {
        if !self.cfg.access.can_author(update.user_id) {
            self.deny(update, "add").await;
            return None;
        }
        let id = self.deps.store.reserve_id().await;
        let step = Step::AwaitingPhoto { id };
        info!(user_id = update.user_id.0, article_id = %id, "add flow started");
        self.reply(
            update.chat_id,
            &format!("🆕 New article #{id}.\n{}", step.prompt()),
        )
        .await;
        Some(self.new_session(update, step))
    }

    async fn start_with_photo(
        &self,
        update: &IncomingUpdate,
        photo: &PhotoPayload,
    ) -> Option<Session> {
        if !self.cfg.access.can_author(update.user_id) {
            self.deny(update, "add").await;
            return None;
        }
        let id = self.deps.store.reserve_id().await;
        info!(user_id = update.user_id.0, article_id = %id, "add flow started with a photo");
        let step = match self.receive_photo(update, photo).await {
            Some(image) => {
                let step = Step::AwaitingTitle { id, image };
                self.reply(
                    update.chat_id,
                    &format!("🆕 New article #{id} with this photo.\n{}", step.prompt()),
                )
                .await;
                step
            }
            // The failure was already reported; wait for another photo.
            None => Step::AwaitingPhoto { id },
        };
        Some(self.new_session(update, step))
    }

    async fn cmd_edit(&self, update: &IncomingUpdate, args: &str) -> Option<Session> {
        if !self.cfg.access.is_admin(update.user_id) {
            self.deny(update, "edit").await;
            return None;
        }
        let Some(id) = parse_id(args) else {
            self.reply(update.chat_id, "Usage: /edit &lt;id&gt;").await;
            return None;
        };
        match self.deps.store.get(id).await {
            Ok(target) => {
                let header = format!("✏️ <b>{}</b>", escape_html(&target.title));
                let step = Step::EditAwaitingPhotoOrSkip { target };
                info!(user_id = update.user_id.0, article_id = %id, "edit flow started");
                self.reply(update.chat_id, &format!("{header}\n{}", step.prompt()))
                    .await;
                Some(self.new_session(update, step))
            }
            Err(e) => {
                self.reply(update.chat_id, &error_message(&e)).await;
                None
            }
        }
    }

    async fn cmd_list(&self, chat_id: ChatId) {
        let articles = self.deps.store.list().await;
        self.reply(chat_id, &format_article_list(&articles)).await;
    }

    async fn cmd_show(&self, chat_id: ChatId, args: &str) {
        let Some(id) = parse_id(args) else {
            self.reply(chat_id, "Usage: /show &lt;id&gt;").await;
            return;
        };
        let article = match self.deps.store.get(id).await {
            Ok(a) => a,
            Err(e) => {
                self.reply(chat_id, &error_message(&e)).await;
                return;
            }
        };

        if let Some(image) = &article.image {
            if self.deps.media.exists(image).await {
                self.send_image(chat_id, image, &article).await;
            }
        }
        self.reply(chat_id, &format_article_card(&article, self.reply_limit() / 2))
            .await;
    }

    async fn cmd_delete(&self, update: &IncomingUpdate, args: &str) {
        if !self.cfg.access.is_admin(update.user_id) {
            self.deny(update, "delete").await;
            return;
        }
        let Some(id) = parse_id(args) else {
            self.reply(update.chat_id, "Usage: /delete &lt;id&gt;").await;
            return;
        };

        let removed = match self.deps.store.remove(id).await {
            Ok(Some(a)) => a,
            Ok(None) => {
                self.reply(update.chat_id, &error_message(&Error::NotFound(id)))
                    .await;
                return;
            }
            Err(e) => {
                warn!(article_id = %id, error = %e, "delete failed");
                self.reply(
                    update.chat_id,
                    &format!("❌ Could not delete article #{id}: {}", escape_html(&e.to_string())),
                )
                .await;
                return;
            }
        };

        if let Some(image) = &removed.image {
            self.discard_media(image).await;
        }
        self.audit(AuditEvent::article_deleted(
            update.user_id.0,
            &update.display_name,
            id,
        ));

        let outcome = self
            .publish(update, &format!("Delete article #{id}"))
            .await;
        let msg = match outcome {
            PublishOutcome::Published => format!("🗑 Article #{id} deleted."),
            PublishOutcome::Degraded(reason) => format!(
                "⚠️ Article #{id} deleted, but the site was not updated: {}\nUse /publish to retry.",
                escape_html(&reason)
            ),
        };
        self.reply(update.chat_id, &msg).await;
    }

    async fn cmd_publish(&self, update: &IncomingUpdate) {
        if !self.cfg.access.is_admin(update.user_id) {
            self.deny(update, "publish").await;
            return;
        }
        let msg = match self.publish(update, "Publish site").await {
            PublishOutcome::Published => "✅ Site published.".to_string(),
            PublishOutcome::Degraded(reason) => format!(
                "⚠️ The site was not updated: {}",
                escape_html(&reason)
            ),
        };
        self.reply(update.chat_id, &msg).await;
    }

    // ============== Active session ==============

    async fn handle_in_session(
        &self,
        session: Session,
        update: &IncomingUpdate,
    ) -> Option<Session> {
        let UpdateKind::Command(cmd) = &update.kind else {
            return self.advance(session, update).await;
        };

        match cmd.name.as_str() {
            "cancel" => {
                self.discard_pending(&session.step).await;
                info!(user_id = update.user_id.0, step = session.step.name(), "session cancelled");
                self.reply(update.chat_id, "❌ Cancelled. Nothing was saved.")
                    .await;
                None
            }
            "help" | "start" => {
                self.reply(
                    update.chat_id,
                    &format!("{HELP_TEXT}\n\n{}", session.step.prompt()),
                )
                .await;
                Some(session)
            }
            _ => {
                self.reply(
                    update.chat_id,
                    &format!(
                        "You have an unfinished draft. Finish it or send /cancel first.\n{}",
                        session.step.prompt()
                    ),
                )
                .await;
                Some(session)
            }
        }
    }

    /// Apply a non-command update to the current step.
    async fn advance(&self, session: Session, update: &IncomingUpdate) -> Option<Session> {
        let chat_id = update.chat_id;
        let next: Option<Step> = match (&session.step, &update.kind) {
            (Step::AwaitingPhoto { id }, UpdateKind::Photo(photo)) => {
                match self.receive_photo(update, photo).await {
                    Some(image) => self.moved_to(chat_id, Step::AwaitingTitle { id: *id, image }).await,
                    None => Some(session.step.clone()),
                }
            }
            (Step::AwaitingPhoto { .. }, _) => {
                self.reprompt(chat_id, "Please send a photo.", &session.step)
                    .await
            }

            (Step::AwaitingTitle { id, image }, UpdateKind::Text(text)) => {
                match validate_title(text) {
                    Ok(title) => {
                        self.moved_to(
                            chat_id,
                            Step::AwaitingContent {
                                id: *id,
                                image: image.clone(),
                                title,
                            },
                        )
                        .await
                    }
                    Err(e) => self.rejected(chat_id, &e, "title", &session.step).await,
                }
            }
            (Step::AwaitingTitle { .. }, _) => {
                self.reprompt(chat_id, "Please send the title as text.", &session.step)
                    .await
            }

            (Step::AwaitingContent { id, image, title }, UpdateKind::Text(text)) => {
                match validate_content(text) {
                    Ok(content) => {
                        let draft = NewArticle {
                            reserved_id: Some(*id),
                            title: title.clone(),
                            content,
                            image: Some(image.clone()),
                            author: session.author.clone(),
                        };
                        if self.commit_new(update, draft).await {
                            None
                        } else {
                            Some(session.step.clone())
                        }
                    }
                    Err(e) => self.rejected(chat_id, &e, "text", &session.step).await,
                }
            }
            (Step::AwaitingContent { .. }, _) => {
                self.reprompt(chat_id, "Please send the article text.", &session.step)
                    .await
            }

            (Step::EditAwaitingPhotoOrSkip { target }, UpdateKind::Text(text))
                if is_keyword(text, "skip") =>
            {
                self.moved_to(
                    chat_id,
                    Step::EditAwaitingTitle {
                        target: target.clone(),
                        image: ImageChange::Keep,
                    },
                )
                .await
            }
            (Step::EditAwaitingPhotoOrSkip { target }, UpdateKind::Text(text))
                if is_keyword(text, "remove") =>
            {
                let image = if target.image.is_some() {
                    ImageChange::Remove
                } else {
                    ImageChange::Keep
                };
                self.moved_to(
                    chat_id,
                    Step::EditAwaitingTitle {
                        target: target.clone(),
                        image,
                    },
                )
                .await
            }
            (Step::EditAwaitingPhotoOrSkip { target }, UpdateKind::Photo(photo)) => {
                match self.receive_photo(update, photo).await {
                    Some(image) => {
                        self.moved_to(
                            chat_id,
                            Step::EditAwaitingTitle {
                                target: target.clone(),
                                image: ImageChange::Replace(image),
                            },
                        )
                        .await
                    }
                    None => Some(session.step.clone()),
                }
            }
            (Step::EditAwaitingPhotoOrSkip { .. }, _) => {
                self.reprompt(
                    chat_id,
                    "Please send a photo or <code>skip</code>.",
                    &session.step,
                )
                .await
            }

            (Step::EditAwaitingTitle { target, image }, UpdateKind::Text(text)) => {
                let title = if is_keyword(text, "skip") {
                    Ok(None)
                } else {
                    validate_title(text).map(Some)
                };
                match title {
                    Ok(title) => {
                        self.moved_to(
                            chat_id,
                            Step::EditAwaitingContent {
                                target: target.clone(),
                                image: image.clone(),
                                title,
                            },
                        )
                        .await
                    }
                    Err(e) => self.rejected(chat_id, &e, "title", &session.step).await,
                }
            }
            (Step::EditAwaitingTitle { .. }, _) => {
                self.reprompt(
                    chat_id,
                    "Please send the title as text or <code>skip</code>.",
                    &session.step,
                )
                .await
            }

            (
                Step::EditAwaitingContent {
                    target,
                    image,
                    title,
                },
                UpdateKind::Text(text),
            ) => {
                let content = if is_keyword(text, "skip") {
                    Ok(None)
                } else {
                    validate_content(text).map(Some)
                };
                match content {
                    Ok(content) => {
                        let patch = ArticlePatch {
                            title: title.clone(),
                            content,
                            image: match image {
                                ImageChange::Keep => None,
                                ImageChange::Replace(m) => Some(Some(m.clone())),
                                ImageChange::Remove => Some(None),
                            },
                        };
                        if self.commit_edit(update, target.id, image, patch).await {
                            None
                        } else {
                            Some(session.step.clone())
                        }
                    }
                    Err(e) => self.rejected(chat_id, &e, "text", &session.step).await,
                }
            }
            (Step::EditAwaitingContent { .. }, _) => {
                self.reprompt(
                    chat_id,
                    "Please send the article text or <code>skip</code>.",
                    &session.step,
                )
                .await
            }
        };

        next.map(|step| Session { step, ..session })
    }

    /// Create the article, publish, report. Returns `false` when nothing was
    /// saved and the user should resend.
    async fn commit_new(&self, update: &IncomingUpdate, draft: NewArticle) -> bool {
        let article = match self.deps.store.create(draft).await {
            Ok(a) => a,
            Err(e) => {
                warn!(user_id = update.user_id.0, error = %e, "saving new article failed");
                self.reply(
                    update.chat_id,
                    &format!(
                        "❌ Could not save the article: {}\nSend the text again or /cancel.",
                        escape_html(&e.to_string())
                    ),
                )
                .await;
                return false;
            }
        };

        self.audit(AuditEvent::article_created(
            update.user_id.0,
            &update.display_name,
            article.id,
            &article.title,
        ));
        let outcome = self
            .publish(
                update,
                &format!("Add article #{}: {}", article.id, article.title),
            )
            .await;
        self.reply(update.chat_id, &saved_message("added", &article, &outcome))
            .await;
        true
    }

    /// Apply an edit. Returns `false` only when the session should stay open.
    async fn commit_edit(
        &self,
        update: &IncomingUpdate,
        id: ArticleId,
        image: &ImageChange,
        patch: ArticlePatch,
    ) -> bool {
        let (previous_image, updated) =
            match self.deps.store.update_with_previous(id, patch).await {
                Ok((before, after)) => (before.image, after),
                Err(e @ Error::NotFound(_)) => {
                    return self.edit_target_gone(update, id, image, &e).await
                }
                Err(e) => {
                    warn!(user_id = update.user_id.0, article_id = %id, error = %e, "saving edit failed");
                    self.reply(
                        update.chat_id,
                        &format!(
                            "❌ Could not save the changes: {}\nSend the text again or /cancel.",
                            escape_html(&e.to_string())
                        ),
                    )
                    .await;
                    return false;
                }
            };

        if *image != ImageChange::Keep {
            if let Some(old) = previous_image {
                if updated.image.as_ref() != Some(&old) {
                    self.discard_media(&old).await;
                }
            }
        }

        self.audit(AuditEvent::article_updated(
            update.user_id.0,
            &update.display_name,
            updated.id,
            &updated.title,
        ));
        let outcome = self
            .publish(
                update,
                &format!("Edit article #{}: {}", updated.id, updated.title),
            )
            .await;
        self.reply(update.chat_id, &saved_message("updated", &updated, &outcome))
            .await;
        true
    }

    async fn edit_target_gone(
        &self,
        update: &IncomingUpdate,
        id: ArticleId,
        image: &ImageChange,
        err: &Error,
    ) -> bool {
        info!(user_id = update.user_id.0, article_id = %id, "edit target vanished");
        if let ImageChange::Replace(m) = image {
            self.discard_media(m).await;
        }
        self.reply(update.chat_id, &error_message(err)).await;
        true
    }

    // ============== Helpers ==============

    fn new_session(&self, update: &IncomingUpdate, step: Step) -> Session {
        Session {
            user_id: update.user_id,
            chat_id: update.chat_id,
            author: update.display_name.clone(),
            step,
            last_activity: self.deps.clock.now(),
        }
    }

    async fn moved_to(&self, chat_id: ChatId, step: Step) -> Option<Step> {
        self.reply(chat_id, &step.prompt()).await;
        Some(step)
    }

    async fn reprompt(&self, chat_id: ChatId, hint: &str, step: &Step) -> Option<Step> {
        self.reply(chat_id, &format!("{hint}\n{}", step.prompt()))
            .await;
        Some(step.clone())
    }

    async fn rejected(&self, chat_id: ChatId, err: &Error, field: &str, step: &Step) -> Option<Step> {
        self.reply(
            chat_id,
            &format!("⚠️ {} Send the {field} again.", escape_html(&err.to_string())),
        )
        .await;
        Some(step.clone())
    }

    /// Download a photo and store it. Failures are reported; `None` means "ask again".
    async fn receive_photo(
        &self,
        update: &IncomingUpdate,
        photo: &PhotoPayload,
    ) -> Option<MediaRef> {
        let download = tokio::time::timeout(
            self.cfg.media_download_timeout,
            self.deps.messenger.fetch_media(&photo.file_id),
        )
        .await;

        let bytes = match download {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(user_id = update.user_id.0, error = %e, "photo download failed");
                self.reply(
                    update.chat_id,
                    "⚠️ Could not download the photo. Please send it again.",
                )
                .await;
                return None;
            }
            Err(_) => {
                warn!(user_id = update.user_id.0, "photo download timed out");
                self.reply(
                    update.chat_id,
                    "⚠️ Downloading the photo timed out. Please send it again.",
                )
                .await;
                return None;
            }
        };

        match self.deps.media.store(update.user_id, &bytes).await {
            Ok(media) => Some(media),
            Err(e) => {
                warn!(user_id = update.user_id.0, error = %e, "storing photo failed");
                self.reply(
                    update.chat_id,
                    &format!(
                        "⚠️ Could not save the photo: {}\nPlease send it again.",
                        escape_html(&e.to_string())
                    ),
                )
                .await;
                None
            }
        }
    }

    async fn discard_pending(&self, step: &Step) {
        if let Some(m) = step.pending_media() {
            self.discard_media(m).await;
        }
    }

    /// Remove a blob unless a saved article still points at it.
    async fn discard_media(&self, media: &MediaRef) {
        if self.deps.store.is_media_referenced(media).await {
            debug!(media = %media, "media still referenced, keeping it");
            return;
        }
        self.deps.media.remove(media).await;
    }

    async fn expire(&self, session: Session) {
        info!(
            user_id = session.user_id.0,
            step = session.step.name(),
            "session expired"
        );
        self.discard_pending(&session.step).await;
        let minutes = self.cfg.session_timeout.as_secs() / 60;
        self.reply(
            session.chat_id,
            &format!(
                "⌛ Your unfinished draft was discarded after {minutes} minutes of inactivity."
            ),
        )
        .await;
    }

    async fn publish(&self, update: &IncomingUpdate, summary: &str) -> PublishOutcome {
        let outcome = self.deps.pipeline.run(summary).await;
        let reason = match &outcome {
            PublishOutcome::Published => None,
            PublishOutcome::Degraded(r) => Some(r.as_str()),
        };
        self.audit(AuditEvent::publish(
            update.user_id.0,
            &update.display_name,
            outcome.is_published(),
            reason,
        ));
        outcome
    }

    async fn deny(&self, update: &IncomingUpdate, command: &str) {
        info!(user_id = update.user_id.0, command, "command denied");
        self.audit(AuditEvent::denied(
            update.user_id.0,
            &update.display_name,
            command,
        ));
        let msg = if command == "add" {
            "⛔ Only admins can add articles.".to_string()
        } else {
            format!("⛔ Only admins can use /{command}.")
        };
        self.reply(update.chat_id, &msg).await;
    }

    fn audit(&self, event: AuditEvent) {
        if let Some(log) = &self.deps.audit {
            if let Err(e) = log.write(event) {
                warn!(path = %log.path().display(), error = %e, "audit write failed");
            }
        }
    }

    fn reply_limit(&self) -> usize {
        self.cfg
            .reply_limit
            .min(self.deps.messenger.capabilities().max_message_len)
    }

    async fn send_image(&self, chat_id: ChatId, image: &MediaRef, article: &Article) {
        let path = match self.deps.media.path(image) {
            Ok(p) => p,
            Err(e) => {
                warn!(media = %image, error = %e, "bad media reference");
                return;
            }
        };
        let max_caption = self.deps.messenger.capabilities().max_caption_len;
        let caption = format!(
            "<b>{}</b>",
            escape_html(&truncate_text(&article.title, max_caption.saturating_sub(16)))
        );
        if let Err(e) = self
            .deps
            .messenger
            .send_photo(chat_id, &path, &caption)
            .await
        {
            warn!(chat_id = chat_id.0, error = %e, "send_photo failed");
        }
    }

    async fn reply(&self, chat_id: ChatId, html: &str) {
        for chunk in split_message(html, self.reply_limit()) {
            if let Err(e) = self.deps.messenger.send_html(chat_id, &chunk).await {
                warn!(chat_id = chat_id.0, error = %e, "reply failed");
                return;
            }
        }
    }
}

fn parse_id(args: &str) -> Option<ArticleId> {
    args.trim()
        .trim_start_matches('#')
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
        .map(ArticleId)
}

fn is_keyword(text: &str, keyword: &str) -> bool {
    text.trim().eq_ignore_ascii_case(keyword)
}

fn error_message(err: &Error) -> String {
    match err {
        Error::NotFound(id) => format!("❌ Article #{id} not found."),
        other => format!("❌ {}", escape_html(&other.to_string())),
    }
}

fn saved_message(verb: &str, article: &Article, outcome: &PublishOutcome) -> String {
    let title = escape_html(&article.title);
    match outcome {
        PublishOutcome::Published => {
            format!("✅ Article #{} \"{title}\" {verb} and published.", article.id)
        }
        PublishOutcome::Degraded(reason) => format!(
            "⚠️ Article #{} \"{title}\" saved, but the site was not updated: {}\nUse /publish to retry.",
            article.id,
            escape_html(reason)
        ),
    }
}

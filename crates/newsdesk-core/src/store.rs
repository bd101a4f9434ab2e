//! File-backed article repository.
//!
//! The whole collection lives in one pretty-printed JSON file that is rewritten
//! atomically (temp file + fsync + rename) on every mutation. All operations go
//! through a single async mutex, so read-modify-write cycles never interleave.
//!
//! Id policy: a persisted high-water counter (`next_id`) that only moves
//! forward. Collections written by older versions of the bot (a bare JSON array,
//! records possibly without ids) are normalized on load.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::{io::AsyncWriteExt, sync::Mutex};
use tracing::{info, warn};

use crate::{
    article::{Article, ArticlePatch, NewArticle},
    clock::Clock,
    domain::{ArticleId, MediaRef},
    errors::Error,
    Result,
};

const FORMAT_VERSION: u32 = 2;

pub struct ArticleStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    /// Ids handed out by `reserve_id` that may not be persisted yet.
    reserved_high_water: u64,
}

#[derive(Debug, Default)]
struct Collection {
    next_id: u64,
    articles: Vec<Article>,
}

impl Collection {
    fn effective_next_id(&self, reserved_high_water: u64) -> u64 {
        let after_max = self.articles.iter().map(|a| a.id.0).max().unwrap_or(0) + 1;
        self.next_id.max(after_max).max(reserved_high_water).max(1)
    }

    fn position(&self, id: ArticleId) -> Option<usize> {
        self.articles.iter().position(|a| a.id == id)
    }
}

#[derive(Serialize)]
struct StoredCollection<'a> {
    version: u32,
    next_id: u64,
    articles: &'a [Article],
}

#[derive(Deserialize)]
struct StoredEnvelope {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    articles: Vec<StoredArticle>,
}

/// Lenient record shape; older files lack ids, authors and images.
#[derive(Default, Deserialize)]
#[serde(default)]
struct StoredArticle {
    id: Option<u64>,
    title: Option<String>,
    content: Option<String>,
    image: Option<String>,
    date: Option<String>,
    author: Option<String>,
}

impl ArticleStore {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All articles, newest date first; equal dates ordered by id, highest first.
    pub async fn list(&self) -> Vec<Article> {
        let _guard = self.state.lock().await;
        let mut articles = self.load_lenient().await.articles;
        sort_for_display(&mut articles);
        articles
    }

    pub async fn get(&self, id: ArticleId) -> Result<Article> {
        let _guard = self.state.lock().await;
        self.load_lenient()
            .await
            .articles
            .into_iter()
            .find(|a| a.id == id)
            .ok_or(Error::NotFound(id))
    }

    /// Hand out the next id without creating a record.
    ///
    /// The id is burnt even if no article is ever created with it.
    pub async fn reserve_id(&self) -> ArticleId {
        let mut st = self.state.lock().await;
        let coll = self.load_lenient().await;
        let id = coll.effective_next_id(st.reserved_high_water);
        st.reserved_high_water = id + 1;
        ArticleId(id)
    }

    pub async fn create(&self, draft: NewArticle) -> Result<Article> {
        let st = self.state.lock().await;
        let mut coll = self.load_for_write().await?;

        let next = coll.effective_next_id(st.reserved_high_water);
        let id = match draft.reserved_id {
            Some(id) if id.0 > 0 && coll.position(id).is_none() => id,
            _ => ArticleId(next),
        };

        let article = Article {
            id,
            title: draft.title,
            content: draft.content,
            image: draft.image,
            date: self.clock.today(),
            author: draft.author,
        };
        coll.articles.push(article.clone());
        coll.next_id = next.max(id.0 + 1);

        self.persist(&coll).await?;
        info!(article_id = %id, "article created");
        Ok(article)
    }

    pub async fn update(&self, id: ArticleId, patch: ArticlePatch) -> Result<Article> {
        Ok(self.update_with_previous(id, patch).await?.1)
    }

    /// Apply a patch and return `(before, after)`, both read under the same lock.
    pub async fn update_with_previous(
        &self,
        id: ArticleId,
        patch: ArticlePatch,
    ) -> Result<(Article, Article)> {
        let st = self.state.lock().await;
        let mut coll = self.load_for_write().await?;
        let idx = coll.position(id).ok_or(Error::NotFound(id))?;

        let previous = coll.articles[idx].clone();
        let article = &mut coll.articles[idx];
        if let Some(title) = patch.title {
            article.title = title;
        }
        if let Some(content) = patch.content {
            article.content = content;
        }
        if let Some(image) = patch.image {
            article.image = image;
        }
        article.date = self.clock.today();
        let updated = article.clone();

        coll.next_id = coll.effective_next_id(st.reserved_high_water);
        self.persist(&coll).await?;
        info!(article_id = %id, "article updated");
        Ok((previous, updated))
    }

    /// Remove a record and return it. Media is left for the caller to clean up.
    pub async fn remove(&self, id: ArticleId) -> Result<Option<Article>> {
        let st = self.state.lock().await;
        let mut coll = self.load_for_write().await?;
        let Some(idx) = coll.position(id) else {
            return Ok(None);
        };

        coll.next_id = coll.effective_next_id(st.reserved_high_water);
        let removed = coll.articles.remove(idx);
        self.persist(&coll).await?;
        info!(article_id = %id, "article deleted");
        Ok(Some(removed))
    }

    pub async fn delete(&self, id: ArticleId) -> Result<bool> {
        Ok(self.remove(id).await?.is_some())
    }

    pub async fn is_media_referenced(&self, media: &MediaRef) -> bool {
        let _guard = self.state.lock().await;
        self.load_lenient()
            .await
            .articles
            .iter()
            .any(|a| a.image.as_ref() == Some(media))
    }

    /// Read the collection; unreadable or corrupt files read as empty.
    async fn load_lenient(&self) -> Collection {
        match self.read_collection().await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "article collection unreadable, treating as empty");
                Collection::default()
            }
        }
    }

    /// Like `load_lenient`, but a corrupt file is moved aside first so the
    /// following write cannot destroy it.
    async fn load_for_write(&self) -> Result<Collection> {
        match self.read_collection().await {
            Ok(c) => Ok(c),
            Err(Error::Io(e)) => Err(Error::Storage(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
            Err(e) => {
                let aside = self.path.with_extension(format!(
                    "json.corrupt-{}",
                    self.clock.now().format("%Y%m%d%H%M%S")
                ));
                warn!(
                    path = %self.path.display(),
                    aside = %aside.display(),
                    error = %e,
                    "article collection corrupt, preserving a copy and starting empty"
                );
                tokio::fs::rename(&self.path, &aside)
                    .await
                    .map_err(|e| Error::Storage(format!("cannot move corrupt file aside: {e}")))?;
                Ok(Collection::default())
            }
        }
    }

    async fn read_collection(&self) -> Result<Collection> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Collection::default())
            }
            Err(e) => return Err(Error::Io(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Collection::default());
        }
        parse_collection(&raw)
    }

    async fn persist(&self, coll: &Collection) -> Result<()> {
        let body = serde_json::to_string_pretty(&StoredCollection {
            version: FORMAT_VERSION,
            next_id: coll.next_id,
            articles: &coll.articles,
        })?;
        write_atomic(&self.path, body.as_bytes())
            .await
            .map_err(|e| Error::Storage(format!("cannot write {}: {e}", self.path.display())))
    }
}

pub(crate) fn sort_for_display(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
}

fn parse_collection(raw: &str) -> Result<Collection> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let (next_id, records) = match value {
        serde_json::Value::Array(_) => (0, serde_json::from_value::<Vec<StoredArticle>>(value)?),
        serde_json::Value::Object(_) => {
            let env: StoredEnvelope = serde_json::from_value(value)?;
            (env.next_id, env.articles)
        }
        _ => {
            return Err(Error::Storage(
                "article collection is neither an array nor an object".to_string(),
            ))
        }
    };
    Ok(normalize(next_id, records))
}

/// Give every record a unique id. Records without an id, or whose id was
/// already taken by an earlier record, get fresh ids after the maximum, in
/// file order.
fn normalize(next_id: u64, records: Vec<StoredArticle>) -> Collection {
    let max_id = records
        .iter()
        .filter_map(|r| r.id)
        .max()
        .unwrap_or(0)
        .max(next_id.saturating_sub(1));
    let mut fresh = max_id + 1;
    let mut seen = HashSet::new();
    let mut reassigned = 0usize;

    let articles = records
        .into_iter()
        .map(|r| {
            let id = match r.id {
                Some(id) if id > 0 && seen.insert(id) => id,
                _ => {
                    let id = fresh;
                    fresh += 1;
                    seen.insert(id);
                    reassigned += 1;
                    id
                }
            };
            Article {
                id: ArticleId(id),
                title: r.title.unwrap_or_default(),
                content: r.content.unwrap_or_default(),
                image: r.image.as_deref().and_then(legacy_media_ref),
                date: r.date.as_deref().and_then(parse_date).unwrap_or(undated()),
                author: r.author.unwrap_or_default(),
            }
        })
        .collect::<Vec<_>>();

    if reassigned > 0 {
        warn!(reassigned, "assigned ids to articles from an older collection format");
    }

    Collection {
        next_id: fresh.max(next_id),
        articles,
    }
}

/// Records without a usable date sort after everything else.
fn undated() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Older files stored paths like `media/123_abc.jpg`; keep only the file name.
fn legacy_media_ref(s: &str) -> Option<MediaRef> {
    let name = s.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == ".." {
        return None;
    }
    Some(MediaRef(name.to_string()))
}

/// Write `bytes` to `path` via a temp file in the same directory, fsync, rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let tmp = parent.join(format!(".{file_name}.tmp-{}", std::process::id()));

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

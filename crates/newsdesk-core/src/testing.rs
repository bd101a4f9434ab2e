//! Test doubles shared by the unit tests in this crate.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::{
    clock::Clock,
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    publish::{PublishSink, SiteArtifact},
    Result,
};

static TMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fresh, empty directory under the system temp dir.
pub fn tmp_dir(prefix: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_nanos();
    let pid = std::process::id();
    let n = TMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("newsdesk-{prefix}-{pid}-{n}-{ts}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    today: Mutex<NaiveDate>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()),
            today: Mutex::new(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn set_today(&self, y: i32, m: u32, d: u32) {
        *self.today.lock().unwrap() = NaiveDate::from_ymd_opt(y, m, d).unwrap();
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap()
    }
}

#[derive(Default)]
pub struct FakeSink {
    fail_with: Option<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<SiteArtifact>>,
    current: AtomicUsize,
    max_seen: AtomicUsize,
}

impl FakeSink {
    pub fn failing(msg: &str) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SiteArtifact> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublishSink for FakeSink {
    fn name(&self) -> &str {
        "fake"
    }

    async fn publish(&self, site: &SiteArtifact, _media_dir: &Path) -> Result<()> {
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(running, Ordering::SeqCst);
        self.calls.lock().unwrap().push(site.clone());

        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        match &self.fail_with {
            Some(msg) => Err(Error::Publish(msg.clone())),
            None => Ok(()),
        }
    }
}

/// Records everything the engine sends. Downloads return `img:<file_id>`.
#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<(ChatId, String)>>,
    photos: Mutex<Vec<(ChatId, PathBuf, String)>>,
    fail_downloads: AtomicBool,
    download_delay: Mutex<Option<Duration>>,
}

impl FakeMessenger {
    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        }
    }

    pub fn sent_html(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn last_html(&self) -> String {
        self.sent_html().last().cloned().unwrap_or_default()
    }

    pub fn sent_photos(&self) -> Vec<(ChatId, PathBuf, String)> {
        self.photos.lock().unwrap().clone()
    }

    pub fn fail_downloads(&self) {
        self.fail_downloads.store(true, Ordering::SeqCst);
    }

    pub fn delay_downloads(&self, by: Duration) {
        *self.download_delay.lock().unwrap() = Some(by);
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.sends.lock().unwrap().push((chat_id, html.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption_html: &str,
    ) -> Result<MessageRef> {
        self.photos
            .lock()
            .unwrap()
            .push((chat_id, path.to_path_buf(), caption_html.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn fetch_media(&self, file_id: &str) -> Result<Vec<u8>> {
        let delay = *self.download_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(Error::External("download failed".to_string()));
        }
        Ok(format!("img:{file_id}").into_bytes())
    }
}

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::ArticleId, errors::Error, formatting::truncate_text, Result};

const AUDIT_MAX_TEXT: usize = 500;

/// RFC3339 timestamp in UTC.
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn base(event: &str, user_id: i64, username: &str) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: event.to_string(),
            user_id: Some(user_id),
            username: Some(username.to_string()),
            article_id: None,
            title: None,
            command: None,
            authorized: None,
            published: None,
            reason: None,
        }
    }

    pub fn article_created(user_id: i64, username: &str, id: ArticleId, title: &str) -> Self {
        Self {
            article_id: Some(id.0),
            title: Some(title.to_string()),
            ..Self::base("article_created", user_id, username)
        }
    }

    pub fn article_updated(user_id: i64, username: &str, id: ArticleId, title: &str) -> Self {
        Self {
            article_id: Some(id.0),
            title: Some(title.to_string()),
            ..Self::base("article_updated", user_id, username)
        }
    }

    pub fn article_deleted(user_id: i64, username: &str, id: ArticleId) -> Self {
        Self {
            article_id: Some(id.0),
            ..Self::base("article_deleted", user_id, username)
        }
    }

    pub fn publish(user_id: i64, username: &str, published: bool, reason: Option<&str>) -> Self {
        Self {
            published: Some(published),
            reason: reason.map(|s| s.to_string()),
            ..Self::base("publish", user_id, username)
        }
    }

    pub fn denied(user_id: i64, username: &str, command: &str) -> Self {
        Self {
            command: Some(command.to_string()),
            authorized: Some(false),
            ..Self::base("denied", user_id, username)
        }
    }
}

/// Append-only audit trail of content changes. One file, opened per write.
#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if let Some(s) = &event.title {
            event.title = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }
        if let Some(s) = &event.reason {
            event.reason = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}

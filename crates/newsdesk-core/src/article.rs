//! Article records and their validation rules.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ArticleId, MediaRef},
    errors::Error,
    Result,
};

pub const TITLE_MAX_CHARS: usize = 100;
pub const CONTENT_MAX_CHARS: usize = 4000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaRef>,
    pub date: NaiveDate,
    pub author: String,
}

/// Input for `ArticleStore::create`.
#[derive(Clone, Debug)]
pub struct NewArticle {
    /// Id previously handed out by `ArticleStore::reserve_id`, if any.
    pub reserved_id: Option<ArticleId>,
    pub title: String,
    pub content: String,
    pub image: Option<MediaRef>,
    pub author: String,
}

/// Partial update for `ArticleStore::update`. `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct ArticlePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    /// `Some(None)` clears the image.
    pub image: Option<Option<MediaRef>>,
}

pub fn validate_title(raw: &str) -> Result<String> {
    validate_field("Title", raw, TITLE_MAX_CHARS)
}

pub fn validate_content(raw: &str) -> Result<String> {
    validate_field("Text", raw, CONTENT_MAX_CHARS)
}

fn validate_field(label: &str, raw: &str, max: usize) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::Validation(format!("{label} cannot be empty.")));
    }
    let len = value.chars().count();
    if len > max {
        return Err(Error::Validation(format!(
            "{label} is too long ({len} characters, the limit is {max})."
        )));
    }
    Ok(value.to_string())
}

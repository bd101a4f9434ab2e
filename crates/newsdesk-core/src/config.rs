use std::{
    env,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, security::AuthoringPolicy, Result};

/// Where the rendered site goes after it is written to `site_dir`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishMode {
    /// `git add` + `git commit` + `git push` in the site directory.
    Git,
    /// Keep the rendered files on disk only.
    None,
}

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_safe_limit: usize,

    // Access control
    pub admin_user_ids: Vec<i64>,
    pub authoring: AuthoringPolicy,

    // Storage
    pub data_dir: PathBuf,
    pub articles_file: PathBuf,
    pub media_dir: PathBuf,

    // Site + publishing
    pub site_dir: PathBuf,
    pub site_title: String,
    pub site_footer_html: Option<String>,
    pub publish_mode: PublishMode,
    pub git_path: PathBuf,
    pub git_remote: String,
    pub git_branch: Option<String>,
    pub publish_timeout: Duration,

    // Conversation
    pub media_download_timeout: Duration,
    pub session_timeout: Duration,
    pub session_sweep_interval: Duration,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(&|k| env::var(k).ok())
    }

    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let str_of = |k: &str| get(k).and_then(non_empty);

        let telegram_bot_token = str_of("TELEGRAM_BOT_TOKEN")
            .or_else(|| str_of("BOT_TOKEN"))
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;
        let telegram_safe_limit = parse_or(get, "TELEGRAM_SAFE_LIMIT", 4000usize)?;

        let admin_user_ids = parse_csv_i64(get("ADMIN_USER_IDS"))?;
        let authoring = match str_of("AUTHORING").map(|s| s.trim().to_lowercase()) {
            None => AuthoringPolicy::Open,
            Some(s) if s == "open" => AuthoringPolicy::Open,
            Some(s) if s == "admins" => AuthoringPolicy::AdminsOnly,
            Some(other) => {
                return Err(Error::Config(format!(
                    "AUTHORING must be `open` or `admins`, got `{other}`"
                )))
            }
        };
        if authoring == AuthoringPolicy::AdminsOnly && admin_user_ids.is_empty() {
            return Err(Error::Config(
                "AUTHORING=admins requires ADMIN_USER_IDS".to_string(),
            ));
        }

        let data_dir = str_of("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let articles_file = str_of("ARTICLES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("articles.json"));
        let media_dir = str_of("MEDIA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("media"));
        let site_dir = str_of("SITE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.clone());

        let site_title = str_of("SITE_TITLE").unwrap_or_else(|| "GeniusBar".to_string());
        let site_footer_html = str_of("SITE_FOOTER_HTML");

        let publish_mode = match str_of("PUBLISH_MODE").map(|s| s.trim().to_lowercase()) {
            None => PublishMode::Git,
            Some(s) if s == "git" => PublishMode::Git,
            Some(s) if s == "none" || s == "local" => PublishMode::None,
            Some(other) => {
                return Err(Error::Config(format!(
                    "PUBLISH_MODE must be `git` or `none`, got `{other}`"
                )))
            }
        };
        let git_path = str_of("GIT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("git"));
        let git_remote = str_of("GIT_REMOTE").unwrap_or_else(|| "origin".to_string());
        let git_branch = str_of("GIT_BRANCH");
        let publish_timeout = Duration::from_millis(parse_or(get, "PUBLISH_TIMEOUT_MS", 60_000u64)?);

        let media_download_timeout =
            Duration::from_millis(parse_or(get, "MEDIA_DOWNLOAD_TIMEOUT_MS", 30_000u64)?);
        let session_timeout = Duration::from_secs(parse_or(get, "SESSION_TIMEOUT_SECS", 1800u64)?);
        let session_sweep_interval =
            Duration::from_secs(parse_or(get, "SESSION_SWEEP_INTERVAL_SECS", 60u64)?.max(1));

        let audit_log_path = str_of("AUDIT_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("newsdesk-audit.log"));
        let audit_log_json = get("AUDIT_LOG_JSON").map(|s| parse_bool(&s)).unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            telegram_safe_limit,
            admin_user_ids,
            authoring,
            data_dir,
            articles_file,
            media_dir,
            site_dir,
            site_title,
            site_footer_html,
            publish_mode,
            git_path,
            git_remote,
            git_branch,
            publish_timeout,
            media_download_timeout,
            session_timeout,
            session_sweep_interval,
            audit_log_path,
            audit_log_json,
        })
    }

    /// Create the directories the bot writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.media_dir)?;
        fs::create_dir_all(&self.site_dir)?;
        if let Some(parent) = self.articles_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key).and_then(non_empty) {
        None => Ok(default),
        Some(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {s}"))),
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_csv_i64(v: Option<String>) -> Result<Vec<i64>> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("ADMIN_USER_IDS has an invalid id: {s}")))
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(&|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_follow_data_dir() {
        let cfg = load(&[("BOT_TOKEN", "t"), ("DATA_DIR", "/srv/news")]).unwrap();
        assert_eq!(cfg.telegram_bot_token, "t");
        assert_eq!(cfg.articles_file, PathBuf::from("/srv/news/articles.json"));
        assert_eq!(cfg.media_dir, PathBuf::from("/srv/news/media"));
        assert_eq!(cfg.site_dir, PathBuf::from("/srv/news"));
        assert_eq!(cfg.authoring, AuthoringPolicy::Open);
        assert_eq!(cfg.publish_mode, PublishMode::Git);
        assert_eq!(cfg.session_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn token_is_required() {
        assert!(matches!(load(&[]), Err(Error::Config(_))));
    }

    #[test]
    fn admins_policy_needs_admins() {
        let err = load(&[("BOT_TOKEN", "t"), ("AUTHORING", "admins")]).unwrap_err();
        assert!(err.to_string().contains("ADMIN_USER_IDS"));

        let cfg = load(&[
            ("BOT_TOKEN", "t"),
            ("AUTHORING", "admins"),
            ("ADMIN_USER_IDS", "1, 2"),
        ])
        .unwrap();
        assert_eq!(cfg.admin_user_ids, vec![1, 2]);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = load(&[("BOT_TOKEN", "t"), ("PUBLISH_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("PUBLISH_TIMEOUT_MS"));
    }
}

//! Session cookies persisted between runs.
//!
//! The file is a JSON object mapping the URL a login finished on to the
//! cookies the jar held for it. It is read once when the session is opened and
//! rewritten whole on every save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::core::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
}

type CookieFile = BTreeMap<String, Vec<StoredCookie>>;

pub struct CookieSession {
    jar: Arc<Jar>,
    path: PathBuf,
    stored: Mutex<CookieFile>,
}

impl CookieSession {
    /// Loads `path` into a fresh jar. A missing or unreadable file starts an
    /// empty session.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let jar = Arc::new(Jar::default());

        let stored = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => CookieFile::new(),
            Ok(bytes) => serde_json::from_slice::<CookieFile>(&bytes).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable cookie file");
                CookieFile::new()
            }),
            Err(_) => CookieFile::new(),
        };

        for (raw_url, cookies) in &stored {
            let Ok(url) = Url::parse(raw_url) else {
                tracing::debug!(url = %raw_url, "skipping cookies for invalid url");
                continue;
            };
            for cookie in cookies {
                jar.add_cookie_str(&format!("{}={}", cookie.name, cookie.value), &url);
            }
        }

        Self {
            jar,
            path,
            stored: Mutex::new(stored),
        }
    }

    /// Jar to install as the HTTP client's cookie provider.
    pub fn jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cookies the jar would send to `url`.
    pub fn cookies_for(&self, url: &Url) -> Vec<StoredCookie> {
        let Some(header) = self.jar.cookies(url) else {
            return Vec::new();
        };
        let Ok(header) = header.to_str() else {
            return Vec::new();
        };

        header
            .split("; ")
            .filter_map(|pair| pair.split_once('='))
            .map(|(name, value)| StoredCookie {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect()
    }

    /// Replaces the stored entry for `url` with the jar's current cookies and
    /// rewrites the file.
    pub async fn save(&self, url: &Url) -> Result<()> {
        let cookies = self.cookies_for(url);

        let mut stored = self.stored.lock().await;
        stored.insert(url.to_string(), cookies);

        let bytes = serde_json::to_vec(&*stored)?;
        tokio::fs::write(&self.path, bytes).await?;

        tracing::debug!(path = %self.path.display(), url = %url, "session cookies saved");
        Ok(())
    }
}

impl std::fmt::Debug for CookieSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSession").field("path", &self.path).finish()
    }
}

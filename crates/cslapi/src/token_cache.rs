//! File-backed watcher token cache.
//!
//! One JSON file per profile so successive invocations reuse a token until
//! it expires. Any read or parse failure behaves as a cache miss.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use crowdsec_lapi::{Token, TokenCache};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct FileTokenCache {
    path: PathBuf,
    // Serialises read-modify-write within this process.
    lock: Mutex<()>,
}

impl FileTokenCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> BTreeMap<String, StoredToken> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn write(&self, entries: &BTreeMap<String, StoredToken>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(entries).map_err(std::io::Error::other)?;
        open_private(&self.path)?.write_all(raw.as_bytes())
    }
}

/// Open for rewriting, readable by the owner only before any byte lands.
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies when the file is created.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

impl TokenCache for FileTokenCache {
    fn get(&self, key: &str) -> Option<Token> {
        let _guard = self.lock.lock().ok()?;
        let stored = self.read().remove(key)?;
        let token = Token::new(stored.token, stored.expires_at);
        (!token.is_expired()).then_some(token)
    }

    fn set(&self, key: &str, token: Token) {
        let Ok(_guard) = self.lock.lock() else {
            return;
        };
        let mut entries = self.read();
        entries.retain(|_, t| t.expires_at > Utc::now());
        entries.insert(
            key.to_owned(),
            StoredToken {
                token: token.value().expose_secret().to_owned(),
                expires_at: token.expires_at(),
            },
        );
        if let Err(e) = self.write(&entries) {
            tracing::warn!(path = %self.path.display(), error = %e, "could not persist token");
        }
    }
}

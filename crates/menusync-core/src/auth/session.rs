use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Identity;

/// Session file name in the config directory
const SESSION_FILE: &str = "session.json";

/// Token lifetime when the session file does not say otherwise.
const DEFAULT_EXPIRY_MINUTES: i64 = 7 * 24 * 60;

fn default_expiry_minutes() -> i64 {
    DEFAULT_EXPIRY_MINUTES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_expiry_minutes")]
    pub expires_in_minutes: i64,
}

impl SessionData {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
            expires_in_minutes: DEFAULT_EXPIRY_MINUTES,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::minutes(self.expires_in_minutes)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        (self.expires_at() - Utc::now()).num_minutes().max(0)
    }
}

#[derive(Debug)]
pub struct Session {
    dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            data: None,
        }
    }

    /// Load from disk. Returns whether a valid, unexpired session was found.
    pub fn load(&mut self) -> Result<bool> {
        let path = self.path();
        if !path.exists() {
            return Ok(false);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;

        if data.is_expired() {
            return Ok(false);
        }
        self.data = Some(data);
        Ok(true)
    }

    pub fn save(&self) -> Result<()> {
        let Some(ref data) = self.data else {
            return Ok(());
        };
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(self.path(), contents).context("Failed to write session file")?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }

    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Bearer token of an unexpired session.
    pub fn token(&self) -> Option<&str> {
        self.valid().map(|d| d.token.as_str())
    }

    pub fn is_valid(&self) -> bool {
        self.valid().is_some()
    }

    fn valid(&self) -> Option<&SessionData> {
        self.data.as_ref().filter(|d| !d.is_expired())
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Identity for Session {
    fn current_user_id(&self) -> Option<String> {
        self.valid().map(|d| d.user_id.clone())
    }
}

//! Storage layer for moderation settings and warning history
//!
//! Data lives in a single pretty-printed JSON file. Ids are written as
//! decimal-string object keys:
//!
//! ```json
//! {
//!   "enabled_servers": { "1234": true },
//!   "user_warnings": { "1234": { "5678": 2 } },
//!   "moderation_log": []
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::MODERATION_LOG_LIMIT;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One executed moderation action
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModerationLogEntry {
    /// Unique id of the action
    pub id: Uuid,
    /// Guild the message was posted in
    pub guild_id: u64,
    /// Author of the offending message
    pub user_id: u64,
    /// Channel the message was posted in
    pub channel_id: u64,
    /// Score that triggered the action
    pub score: f32,
    /// Warning count after this infraction
    pub warning_count: u32,
    /// Length of the applied timeout
    pub timeout_secs: u64,
    /// Whether the message was removed
    pub message_deleted: bool,
    /// Whether the timeout was applied
    pub user_timed_out: bool,
    /// When the action happened
    pub timestamp: DateTime<Utc>,
}

/// Per-guild warning totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuildStats {
    /// Sum of all warning counts
    pub total_warnings: u64,
    /// Number of users with at least one recorded warning entry
    pub warned_users: usize,
}

/// Everything the bot persists
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct ModerationData {
    /// Guild id → moderation enabled
    #[serde(default)]
    pub enabled_servers: BTreeMap<u64, bool>,
    /// Guild id → (user id → warning count)
    #[serde(default)]
    pub user_warnings: BTreeMap<u64, BTreeMap<u64, u32>>,
    /// Executed actions, oldest first
    #[serde(default)]
    pub moderation_log: Vec<ModerationLogEntry>,
}

impl ModerationData {
    /// Whether moderation is enabled in `guild_id`. Unknown guilds are disabled.
    #[must_use]
    pub fn is_enabled(&self, guild_id: u64) -> bool {
        self.enabled_servers.get(&guild_id).copied().unwrap_or(false)
    }

    /// Enable or disable moderation in `guild_id`
    pub fn set_enabled(&mut self, guild_id: u64, enabled: bool) {
        self.enabled_servers.insert(guild_id, enabled);
    }

    /// Number of guilds with moderation enabled
    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.enabled_servers.values().filter(|enabled| **enabled).count()
    }

    /// Warning count of `user_id` in `guild_id`
    #[must_use]
    pub fn user_warnings(&self, guild_id: u64, user_id: u64) -> u32 {
        self.user_warnings
            .get(&guild_id)
            .and_then(|users| users.get(&user_id))
            .copied()
            .unwrap_or(0)
    }

    /// Add one warning and return the new count
    pub fn increment_warning(&mut self, guild_id: u64, user_id: u64) -> u32 {
        let count = self
            .user_warnings
            .entry(guild_id)
            .or_default()
            .entry(user_id)
            .or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Forget the warnings of one user in one guild
    pub fn reset_user(&mut self, guild_id: u64, user_id: u64) {
        if let Some(users) = self.user_warnings.get_mut(&guild_id) {
            users.remove(&user_id);
        }
    }

    /// Forget all warnings in one guild
    pub fn reset_guild(&mut self, guild_id: u64) {
        if let Some(users) = self.user_warnings.get_mut(&guild_id) {
            users.clear();
        }
    }

    /// Totals for the status command
    #[must_use]
    pub fn guild_stats(&self, guild_id: u64) -> GuildStats {
        self.user_warnings
            .get(&guild_id)
            .map(|users| GuildStats {
                total_warnings: users.values().map(|c| u64::from(*c)).sum(),
                warned_users: users.len(),
            })
            .unwrap_or_default()
    }

    /// Up to `limit` users with the most warnings, highest first.
    /// Ties are ordered by user id.
    #[must_use]
    pub fn top_warned(&self, guild_id: u64, limit: usize) -> Vec<(u64, u32)> {
        let Some(users) = self.user_warnings.get(&guild_id) else {
            return Vec::new();
        };
        let mut ranked: Vec<(u64, u32)> = users.iter().map(|(u, c)| (*u, *c)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    /// Append to the moderation log, dropping the oldest entries past the cap
    pub fn record_action(&mut self, entry: ModerationLogEntry) {
        self.moderation_log.push(entry);
        if self.moderation_log.len() > MODERATION_LOG_LIMIT {
            let excess = self.moderation_log.len() - MODERATION_LOG_LIMIT;
            self.moderation_log.drain(..excess);
        }
    }
}

/// File-backed moderation data shared by all event handlers
pub struct ModerationStore {
    path: PathBuf,
    data: RwLock<ModerationData>,
    /// Held across snapshot, write and rename so saves never interleave
    save_lock: Mutex<()>,
}

impl ModerationStore {
    /// Load data from `path`.
    ///
    /// A missing file is created with empty data. A corrupt file is logged
    /// and replaced with empty data.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the replacement
    /// cannot be written.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let (data, needs_write) = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<ModerationData>(&content) {
                Ok(data) => {
                    info!("Moderation data loaded successfully");
                    (data, false)
                }
                Err(e) => {
                    error!("Error parsing {}: {}. Starting fresh.", path.display(), e);
                    (ModerationData::default(), true)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Created new moderation data file");
                (ModerationData::default(), true)
            }
            Err(e) => return Err(e.into()),
        };

        let store = Self {
            path,
            data: RwLock::new(data),
            save_lock: Mutex::new(()),
        };
        if needs_write {
            store.save().await?;
        }
        Ok(store)
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current data to disk atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub async fn save(&self) -> Result<(), StorageError> {
        let _guard = self.save_lock.lock().await;
        let body = {
            let data = self.data.read().await;
            serde_json::to_string_pretty(&*data)?
        };

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Copy of the current data
    pub async fn snapshot(&self) -> ModerationData {
        self.data.read().await.clone()
    }

    /// See [`ModerationData::is_enabled`]
    pub async fn is_enabled(&self, guild_id: u64) -> bool {
        self.data.read().await.is_enabled(guild_id)
    }

    /// See [`ModerationData::set_enabled`]; persists immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub async fn set_enabled(&self, guild_id: u64, enabled: bool) -> Result<(), StorageError> {
        self.data.write().await.set_enabled(guild_id, enabled);
        self.save().await
    }

    /// See [`ModerationData::enabled_count`]
    pub async fn enabled_count(&self) -> usize {
        self.data.read().await.enabled_count()
    }

    /// See [`ModerationData::user_warnings`]
    pub async fn user_warnings(&self, guild_id: u64, user_id: u64) -> u32 {
        self.data.read().await.user_warnings(guild_id, user_id)
    }

    /// See [`ModerationData::increment_warning`]. Not persisted until the
    /// infraction is recorded.
    pub async fn increment_warning(&self, guild_id: u64, user_id: u64) -> u32 {
        self.data.write().await.increment_warning(guild_id, user_id)
    }

    /// Reset one user (`Some`) or the whole guild (`None`); persists immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub async fn reset_warnings(
        &self,
        guild_id: u64,
        user_id: Option<u64>,
    ) -> Result<(), StorageError> {
        {
            let mut data = self.data.write().await;
            match user_id {
                Some(user_id) => data.reset_user(guild_id, user_id),
                None => data.reset_guild(guild_id),
            }
        }
        self.save().await
    }

    /// See [`ModerationData::guild_stats`]
    pub async fn guild_stats(&self, guild_id: u64) -> GuildStats {
        self.data.read().await.guild_stats(guild_id)
    }

    /// See [`ModerationData::top_warned`]
    pub async fn top_warned(&self, guild_id: u64, limit: usize) -> Vec<(u64, u32)> {
        self.data.read().await.top_warned(guild_id, limit)
    }

    /// Append a log entry and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub async fn record_action(&self, entry: ModerationLogEntry) -> Result<(), StorageError> {
        self.data.write().await.record_action(entry);
        self.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u64) -> ModerationLogEntry {
        ModerationLogEntry {
            id: Uuid::new_v4(),
            guild_id: 1,
            user_id: n,
            channel_id: 3,
            score: 0.9,
            warning_count: 1,
            timeout_secs: 600,
            message_deleted: true,
            user_timed_out: true,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_enable_flags() {
        let mut data = ModerationData::default();
        assert!(!data.is_enabled(10));
        data.set_enabled(10, true);
        data.set_enabled(11, false);
        data.set_enabled(12, true);
        assert!(data.is_enabled(10));
        assert!(!data.is_enabled(11));
        assert_eq!(data.enabled_count(), 2);
    }

    #[test]
    fn test_warnings_are_per_guild() {
        let mut data = ModerationData::default();
        assert_eq!(data.increment_warning(1, 100), 1);
        assert_eq!(data.increment_warning(1, 100), 2);
        assert_eq!(data.increment_warning(2, 100), 1);
        assert_eq!(data.user_warnings(1, 100), 2);
        assert_eq!(data.user_warnings(2, 100), 1);
        assert_eq!(data.user_warnings(3, 100), 0);
    }

    #[test]
    fn test_resets() {
        let mut data = ModerationData::default();
        data.increment_warning(1, 100);
        data.increment_warning(1, 200);
        data.increment_warning(2, 100);

        data.reset_user(1, 100);
        assert_eq!(data.user_warnings(1, 100), 0);
        assert_eq!(data.user_warnings(1, 200), 1);

        data.reset_guild(1);
        assert_eq!(data.guild_stats(1), GuildStats::default());
        assert_eq!(data.user_warnings(2, 100), 1);
    }

    #[test]
    fn test_stats_and_leaderboard() {
        let mut data = ModerationData::default();
        for _ in 0..3 {
            data.increment_warning(1, 300);
        }
        data.increment_warning(1, 100);
        data.increment_warning(1, 200);
        data.increment_warning(1, 200);

        let stats = data.guild_stats(1);
        assert_eq!(stats.total_warnings, 6);
        assert_eq!(stats.warned_users, 3);

        assert_eq!(data.top_warned(1, 10), vec![(300, 3), (200, 2), (100, 1)]);
        assert_eq!(data.top_warned(1, 1), vec![(300, 3)]);
        assert!(data.top_warned(9, 10).is_empty());
    }

    #[test]
    fn test_log_is_capped() {
        let mut data = ModerationData::default();
        for n in 0..(MODERATION_LOG_LIMIT as u64 + 5) {
            data.record_action(entry(n));
        }
        assert_eq!(data.moderation_log.len(), MODERATION_LOG_LIMIT);
        assert_eq!(data.moderation_log[0].user_id, 5);
    }

    #[test]
    fn test_reads_string_keyed_file_format() -> Result<(), serde_json::Error> {
        let json = r#"{
            "enabled_servers": {"123": true, "456": false},
            "user_warnings": {"123": {"789": 2}}
        }"#;
        let data: ModerationData = serde_json::from_str(json)?;
        assert!(data.is_enabled(123));
        assert!(!data.is_enabled(456));
        assert_eq!(data.user_warnings(123, 789), 2);
        assert!(data.moderation_log.is_empty());

        let out = serde_json::to_string(&data)?;
        assert!(out.contains(r#""123":true"#));
        Ok(())
    }

    #[tokio::test]
    async fn test_store_creates_and_reloads_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("moderation_data.json");

        let store = ModerationStore::load(&path).await?;
        assert!(path.exists());

        store.set_enabled(42, true).await?;
        store.increment_warning(42, 7).await;
        store.record_action(entry(7)).await?;

        let reloaded = ModerationStore::load(&path).await?;
        assert!(reloaded.is_enabled(42).await);
        assert_eq!(reloaded.user_warnings(42, 7).await, 1);
        assert_eq!(reloaded.snapshot().await.moderation_log.len(), 1);

        reloaded.reset_warnings(42, Some(7)).await?;
        let again = ModerationStore::load(&path).await?;
        assert_eq!(again.user_warnings(42, 7).await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_recovers_from_corrupt_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("moderation_data.json");
        tokio::fs::write(&path, "{ not json").await?;

        let store = ModerationStore::load(&path).await?;
        assert_eq!(store.snapshot().await, ModerationData::default());

        let content = tokio::fs::read_to_string(&path).await?;
        let _: ModerationData = serde_json::from_str(&content)?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_all_succeed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("moderation_data.json");
        let store = std::sync::Arc::new(ModerationStore::load(&path).await?);

        for round in 0..20u64 {
            let mut tasks = Vec::new();
            for guild in 0..8u64 {
                let store = std::sync::Arc::clone(&store);
                tasks.push(tokio::spawn(async move {
                    store.set_enabled(round * 8 + guild + 1, true).await
                }));
            }
            for task in tasks {
                task.await??;
            }
        }

        let reloaded = ModerationStore::load(&path).await?;
        assert_eq!(reloaded.enabled_count().await, 160);
        assert_eq!(reloaded.snapshot().await, store.snapshot().await);
        Ok(())
    }
}

//! Conversation history keyed by the bot's newest reply in each thread.
//!
//! A reply to one of the bot's posts carries that post's id as its parent
//! reference, so looking up the parent id directly yields the whole prior
//! exchange without walking the reply chain. After the bot answers, the
//! extended history is stored again under the id of the new reply. Older
//! keys stay in the map; nothing is evicted.
//!
//! The whole map is written to a single JSON file after every mutation.
//! Mutation and save happen under one lock so concurrent handlers cannot
//! overwrite each other's entries.

use crate::ai::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub messages: Vec<Message>,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug)]
pub enum HistoryError {
    /// The file exists but could not be read
    Io(std::io::Error),
    /// The file was read but is not a valid history map
    Malformed(serde_json::Error),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::Io(e) => write!(f, "failed to read history file: {}", e),
            HistoryError::Malformed(e) => write!(f, "history file is malformed: {}", e),
        }
    }
}

impl std::error::Error for HistoryError {}

pub struct HistoryStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, ConversationHistory>>,
}

impl HistoryStore {
    /// Read the persisted map. A missing file is a first run and yields an
    /// empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice::<HashMap<String, ConversationHistory>>(&bytes)
                    .map_err(HistoryError::Malformed)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("[HISTORY] No history at {}, starting empty", path.display());
                HashMap::new()
            }
            Err(e) => return Err(HistoryError::Io(e)),
        };

        log::info!(
            "[HISTORY] Loaded {} conversation(s) from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// History stored under `key`, or an empty one.
    pub async fn get(&self, key: &str) -> ConversationHistory {
        self.entries
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Extend the history found at `old_key` with one user/assistant pair,
    /// store it under `new_key`, and persist the map. `old_key` equals
    /// `new_key` when a thread starts.
    pub async fn append_and_rekey(
        &self,
        old_key: &str,
        new_key: &str,
        user: Message,
        assistant: Message,
    ) -> ConversationHistory {
        let mut entries = self.entries.lock().await;

        let mut history = entries.get(old_key).cloned().unwrap_or_default();
        history.messages.push(user);
        history.messages.push(assistant);
        history.last_used = Utc::now();
        entries.insert(new_key.to_string(), history.clone());

        log::debug!(
            "[HISTORY] {} -> {} now holds {} message(s)",
            old_key,
            new_key,
            history.messages.len()
        );

        self.persist(&entries).await;
        history
    }

    /// Write the current map to disk.
    pub async fn save(&self) {
        let entries = self.entries.lock().await;
        self.persist(&entries).await;
    }

    /// Best effort: errors are logged and the in-memory state is kept.
    async fn persist(&self, entries: &HashMap<String, ConversationHistory>) {
        if let Err(e) = write_atomically(&self.path, entries).await {
            log::error!("[HISTORY] Failed to save {}: {}", self.path.display(), e);
        }
    }
}

async fn write_atomically(
    path: &Path,
    entries: &HashMap<String, ConversationHistory>,
) -> Result<(), String> {
    let bytes = serde_json::to_vec(entries).map_err(|e| format!("serialize: {}", e))?;

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| format!("write {}: {}", tmp_path.display(), e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| format!("rename {}: {}", tmp_path.display(), e))
}

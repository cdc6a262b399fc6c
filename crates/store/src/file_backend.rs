//! File-based backends — persistent JSON storage under one directory.
//!
//! Layout:
//! - `threads/<thread-id>.jsonl`: one JSON-encoded `Message` per line
//! - `checkpoints/<thread-id>.json`: the latest `GraphState` snapshot
//!
//! Thread ids are escaped before being used as file names.

use async_trait::async_trait;
use ripple_core::checkpoint::{CheckpointStore, GraphState};
use ripple_core::conversation::ConversationStore;
use ripple_core::error::StoreError;
use ripple_core::message::{Message, ThreadId};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Map a thread id to a file stem, one-to-one.
///
/// Lowercase ASCII letters, digits and `-` are kept. Every other byte,
/// `_` included, becomes `_XX` (uppercase hex), so distinct ids never share
/// a file, even on case-insensitive filesystems.
fn file_stem(thread_id: &ThreadId) -> String {
    let mut stem = String::with_capacity(thread_id.as_str().len());
    for b in thread_id.as_str().bytes() {
        if b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' {
            stem.push(char::from(b));
        } else {
            stem.push_str(&format!("_{b:02X}"));
        }
    }
    stem
}

async fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StoreError::Storage(format!("Failed to create {}: {e}", dir.display())))
}

/// Append-only JSONL conversation log, one file per thread.
pub struct FileConversationStore {
    dir: PathBuf,
    // Serializes appends so concurrent writers never interleave lines.
    write_lock: Mutex<()>,
}

impl FileConversationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let dir = root.into().join("threads");
        debug!(path = %dir.display(), "File conversation store ready");
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    fn thread_path(&self, thread_id: &ThreadId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", file_stem(thread_id)))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, thread_id: &ThreadId, message: Message) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(&message)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize message: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        ensure_dir(&self.dir).await?;

        let path = self.thread_path(thread_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open {}: {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write {}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to flush {}: {e}", path.display())))?;
        Ok(())
    }

    async fn list(&self, thread_id: &ThreadId) -> Result<Vec<Message>, StoreError> {
        let path = self.thread_path(thread_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Message>(line) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(thread = %thread_id, error = %e, "Skipping corrupted message line");
                    None
                }
            })
            .collect())
    }
}

/// One JSON snapshot file per thread, replaced on every save.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            dir: root.into().join("checkpoints"),
        }
    }

    fn state_path(&self, thread_id: &ThreadId) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(thread_id)))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Option<GraphState>, StoreError> {
        let path = self.state_path(thread_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupted(format!("{}: {e}", path.display())))
    }

    async fn save(&self, thread_id: &ThreadId, state: GraphState) -> Result<(), StoreError> {
        ensure_dir(&self.dir).await?;
        let json = serde_json::to_vec(&state)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize checkpoint: {e}")))?;

        // Write-then-rename so a crash never leaves a half-written snapshot.
        let path = self.state_path(thread_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace {}: {e}", path.display())))?;
        Ok(())
    }
}

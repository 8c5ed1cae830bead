use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(with = "iso_millis")]
    pub create_time: DateTime<Utc>,
}

impl Message {
    pub fn new(name: &str, content: &str) -> Message {
        Message {
            id: Uuid::new_v4().to_string(),
            name: name.to_owned(),
            content: content.to_owned(),
            // Stored with millisecond precision, so keep only that much.
            create_time: Utc::now().trunc_subsecs(3),
        }
    }
}

pub type Messages = Vec<Message>;

/// RFC 3339 in UTC with exactly three fractional digits, e.g.
/// `2024-05-01T12:00:00.123Z`. Any offset is accepted on the way in.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}

// Serialization objects for the dump file. Top-level keys other than
// `messages` are carried through rewrites untouched.
#[derive(Serialize)]
struct MessagesDso<'a> {
    messages: &'a [Message],
    #[serde(flatten)]
    rest: &'a Map<String, Value>,
}

#[derive(Default, Deserialize)]
struct StoredMessages {
    messages: Option<Messages>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed message file {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not serialize messages: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("message store lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum RemoveError {
    #[error("message not found")]
    NotFound,
    #[error("name does not match the author of the message")]
    Forbidden,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// File backed message collection.
///
/// The file is the only copy. Every operation takes the lock, re-reads the
/// dump file and, for mutations, writes the whole collection back before
/// releasing the lock. A failed write leaves the file as it was.
#[derive(Debug)]
pub struct MessageDatabase {
    path: PathBuf,
    mlock: Mutex<()>,
}

impl MessageDatabase {
    /// Reads the dump file, creating it (and its parent directories) when it
    /// does not exist yet. A file that is not valid JSON is an error and is
    /// left as it is.
    pub fn load(path: impl Into<PathBuf>) -> Result<MessageDatabase, StoreError> {
        let path = path.into();
        let dir = parent_dir(&path);
        fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        match read_messages(&path)? {
            Some(StoredMessages {
                messages: Some(_), ..
            }) => {}
            other => {
                tracing::info!(path = %path.display(), "initialising message file");
                let rest = other.map(|s| s.rest).unwrap_or_default();
                write_messages(&path, &[], &rest)?;
            }
        }

        Ok(MessageDatabase {
            path,
            mlock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All messages, most recent first. Messages created in the same
    /// millisecond keep their file order.
    pub fn list(&self) -> Result<Messages, StoreError> {
        let _guard = self.lock()?;
        let mut messages = self.reload()?.messages.unwrap_or_default();
        messages.sort_by(|a, b| b.create_time.cmp(&a.create_time));
        Ok(messages)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let _guard = self.lock()?;
        Ok(self.reload()?.messages.map_or(0, |m| m.len()))
    }

    pub fn append(&self, name: &str, content: &str) -> Result<Message, StoreError> {
        let _guard = self.lock()?;
        let StoredMessages { messages, rest } = self.reload()?;
        let mut messages = messages.unwrap_or_default();

        let message = Message::new(name, content);
        messages.push(message.clone());
        write_messages(&self.path, &messages, &rest)?;

        Ok(message)
    }

    /// Removes the message with `id` if it was posted under `name`.
    pub fn remove_if_authorized(&self, id: &str, name: &str) -> Result<Message, RemoveError> {
        let _guard = self.lock()?;
        let StoredMessages { messages, rest } = self.reload()?;
        let mut messages = messages.unwrap_or_default();

        let idx = messages
            .iter()
            .position(|m| m.id == id)
            .ok_or(RemoveError::NotFound)?;
        if messages[idx].name != name {
            return Err(RemoveError::Forbidden);
        }

        let removed = messages.remove(idx);
        write_messages(&self.path, &messages, &rest)?;

        Ok(removed)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.mlock.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Current file contents. A missing file reads as an empty collection.
    /// Only called with the lock held.
    fn reload(&self) -> Result<StoredMessages, StoreError> {
        Ok(read_messages(&self.path)?.unwrap_or_default())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// `None` when the file is absent or holds `null`.
fn read_messages(path: &Path) -> Result<Option<StoredMessages>, StoreError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&data).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Replaces the dump file in one step: write a sibling temp file, sync it,
/// rename it over the old one.
fn write_messages(
    path: &Path,
    messages: &[Message],
    rest: &Map<String, Value>,
) -> Result<(), StoreError> {
    let io_err = |source: io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let messages_ser = serde_json::to_string_pretty(&MessagesDso { messages, rest })?;

    let mut tmp = NamedTempFile::new_in(parent_dir(path)).map_err(io_err)?;
    tmp.write_all(messages_ser.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

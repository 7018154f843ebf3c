//! Optimistic concurrency for document writes.
//!
//! A writer presents the version it last saw. If the document moved on since
//! then, the write is refused and the caller gets the server's current state
//! back so it can show a conflict instead of silently clobbering it.
//!
//! Writers going through this process are serialized per path, so the
//! version check and the write happen as one step. Writers outside the
//! process (editors, sync tools) are not coordinated and win by writing last.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{Result, WorkspaceError};
use crate::models::Version;
use crate::store::DocumentStore;

/// Result of a conditional write. A conflict is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum WriteOutcome {
    Committed {
        version: Version,
    },
    #[serde(rename_all = "camelCase")]
    Conflict {
        server_content: String,
        server_version: Version,
    },
}

pub struct ConcurrencyController {
    store: DocumentStore,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConcurrencyController {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    /// Writes `content` if `expected` is `None` or matches the live version.
    ///
    /// A document that does not exist has no live version: a write expecting
    /// one conflicts with `server_content = ""` and `server_version = 0`.
    pub async fn write(
        &self,
        path: &str,
        content: &str,
        expected: Option<Version>,
    ) -> Result<WriteOutcome> {
        // Keyed by resolved path so `a.md` and `./a.md` share a lock.
        let key = self.store.sandbox().resolve(path)?.to_string_lossy().into_owned();

        let lock = self.lock_for(&key);
        let outcome = {
            let _guard = lock.lock().await;
            self.check_and_write(path, content, expected).await
        };
        self.release(&key, &lock);
        outcome
    }

    async fn check_and_write(
        &self,
        path: &str,
        content: &str,
        expected: Option<Version>,
    ) -> Result<WriteOutcome> {
        if let Some(expected) = expected {
            match self.store.read(path).await {
                Ok(current) if current.version != expected => {
                    tracing::info!(
                        path,
                        expected,
                        actual = current.version,
                        "write refused: version conflict"
                    );
                    return Ok(WriteOutcome::Conflict {
                        server_content: current.content,
                        server_version: current.version,
                    });
                }
                Ok(_) => {}
                Err(WorkspaceError::NotFound(_)) => {
                    tracing::info!(path, expected, "write refused: document no longer exists");
                    return Ok(WriteOutcome::Conflict {
                        server_content: String::new(),
                        server_version: 0,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let version = self.store.write(path, content).await?;
        Ok(WriteOutcome::Committed { version })
    }

    fn lock_for(&self, path: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the lock entry when no other writer holds a handle to it.
    fn release(&self, path: &str, lock: &Arc<Mutex<()>>) {
        // Two strong refs: the map's and the caller's.
        self.locks
            .remove_if(path, |_, held| Arc::ptr_eq(held, lock) && Arc::strong_count(held) <= 2);
    }
}

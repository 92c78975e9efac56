//! Per-owner selection sessions.
//!
//! Each owner has one slot behind its own async mutex, so operations for one
//! owner are serialized while different owners never contend. The map itself
//! is only touched to look a slot up.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use unpackr_archive::ExtractedFileSet;

use crate::error::SessionError;

pub type OwnerId = u64;

type Result<T> = std::result::Result<T, SessionError>;

/// Files offered to an owner and the subset currently chosen.
#[derive(Clone, Debug)]
pub struct SelectionSession {
    owner: OwnerId,
    files: ExtractedFileSet,
    selected: BTreeSet<usize>,
    created_at: Instant,
}

impl SelectionSession {
    fn new(owner: OwnerId, files: ExtractedFileSet) -> Self {
        let selected = (0..files.len()).collect();
        Self {
            owner,
            files,
            selected,
            created_at: Instant::now(),
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn files(&self) -> &ExtractedFileSet {
        &self.files
    }

    pub fn destination(&self) -> &Path {
        self.files.root()
    }

    pub fn selected(&self) -> &BTreeSet<usize> {
        &self.selected
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Idle,
    /// A job holds the reservation; `cancelled` is set when the owner gives up meanwhile.
    Extracting { cancelled: bool },
    Active(SelectionSession),
}

/// What [`SessionRegistry::start`] did with a finished extraction.
#[derive(Debug, PartialEq, Eq)]
pub enum Started {
    Active { files: usize },
    /// The owner cancelled during extraction; the result was deleted.
    Discarded,
}

/// The selected files, handed over for upload. The session is gone once this exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub files: Vec<PathBuf>,
    pub destination: PathBuf,
}

/// One row of the selection keyboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRow {
    pub index: usize,
    /// Path relative to the destination directory.
    pub name: String,
    pub size: u64,
    pub selected: bool,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: DashMap<OwnerId, Arc<Mutex<Slot>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock(&self, owner: OwnerId) -> OwnedMutexGuard<Slot> {
        // Clone the Arc out first: the shard lock must not be held across the await.
        let slot = Arc::clone(self.slots.entry(owner).or_default().value());
        slot.lock_owned().await
    }

    /// Claim the owner's slot for a new extraction.
    pub async fn reserve(&self, owner: OwnerId) -> Result<()> {
        let mut slot = self.lock(owner).await;
        match *slot {
            Slot::Idle => {
                *slot = Slot::Extracting { cancelled: false };
                Ok(())
            }
            _ => Err(SessionError::Busy),
        }
    }

    /// Drop a reservation whose extraction failed.
    pub async fn release(&self, owner: OwnerId) {
        let mut slot = self.lock(owner).await;
        if matches!(*slot, Slot::Extracting { .. }) {
            *slot = Slot::Idle;
        }
    }

    /// Open a session with every file selected.
    ///
    /// A stale Active session is replaced without touching its directory. If
    /// the owner cancelled while extracting, `files` is deleted instead.
    pub async fn start(&self, owner: OwnerId, files: ExtractedFileSet) -> Started {
        let mut slot = self.lock(owner).await;
        match &*slot {
            Slot::Extracting { cancelled: true } => {
                *slot = Slot::Idle;
                drop(slot);
                tracing::info!(owner, "extraction finished after cancel, discarding");
                purge(files.root()).await;
                return Started::Discarded;
            }
            Slot::Active(stale) => {
                tracing::warn!(owner, stale = %stale.destination().display(), "replacing stale session");
            }
            _ => {}
        }
        let count = files.len();
        *slot = Slot::Active(SelectionSession::new(owner, files));
        Started::Active { files: count }
    }

    /// Flip one index. Returns whether it is selected afterwards.
    pub async fn toggle(&self, owner: OwnerId, index: usize) -> Result<bool> {
        let mut slot = self.lock(owner).await;
        let Slot::Active(session) = &mut *slot else {
            return Err(SessionError::SessionExpired);
        };
        let len = session.files.len();
        if index >= len {
            return Err(SessionError::IndexOutOfRange { index, len });
        }
        if session.selected.remove(&index) {
            Ok(false)
        } else {
            session.selected.insert(index);
            Ok(true)
        }
    }

    pub async fn select_all(&self, owner: OwnerId) -> Result<()> {
        let mut slot = self.lock(owner).await;
        let Slot::Active(session) = &mut *slot else {
            return Err(SessionError::SessionExpired);
        };
        session.selected = (0..session.files.len()).collect();
        Ok(())
    }

    pub async fn select_none(&self, owner: OwnerId) -> Result<()> {
        let mut slot = self.lock(owner).await;
        let Slot::Active(session) = &mut *slot else {
            return Err(SessionError::SessionExpired);
        };
        session.selected.clear();
        Ok(())
    }

    /// End the owner's session and delete its directory. A no-op when there is none.
    ///
    /// During extraction this only marks the reservation; [`start`](Self::start)
    /// discards the result once the worker returns.
    pub async fn cancel(&self, owner: OwnerId) -> bool {
        let mut slot = self.lock(owner).await;
        match std::mem::take(&mut *slot) {
            Slot::Idle => false,
            Slot::Extracting { .. } => {
                *slot = Slot::Extracting { cancelled: true };
                true
            }
            Slot::Active(session) => {
                drop(slot);
                tracing::info!(owner, "selection cancelled");
                purge(session.destination()).await;
                true
            }
        }
    }

    /// Take the session and return the selected files, in index order.
    ///
    /// An empty selection leaves the session untouched so the owner can fix it.
    pub async fn commit(&self, owner: OwnerId) -> Result<Commit> {
        let mut slot = self.lock(owner).await;
        match std::mem::take(&mut *slot) {
            Slot::Active(session) if session.selected.is_empty() => {
                *slot = Slot::Active(session);
                Err(SessionError::EmptySelection)
            }
            Slot::Active(session) => {
                let files = session
                    .selected
                    .iter()
                    .filter_map(|&i| session.files.get(i).map(Path::to_path_buf))
                    .collect();
                Ok(Commit {
                    files,
                    destination: session.files.root().to_path_buf(),
                })
            }
            other => {
                *slot = other;
                Err(SessionError::SessionExpired)
            }
        }
    }

    /// Rows for the owner's selection keyboard.
    pub async fn view(&self, owner: OwnerId) -> Result<Vec<FileRow>> {
        let slot = self.lock(owner).await;
        let Slot::Active(session) = &*slot else {
            return Err(SessionError::SessionExpired);
        };
        let mut rows = Vec::with_capacity(session.files.len());
        for (index, path) in session.files.iter().enumerate() {
            let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
            let name = session
                .files
                .relative(index)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();
            rows.push(FileRow {
                index,
                name,
                size,
                selected: session.selected.contains(&index),
            });
        }
        Ok(rows)
    }

    /// Whether the owner currently has an Active session.
    pub async fn is_active(&self, owner: OwnerId) -> bool {
        matches!(*self.lock(owner).await, Slot::Active(_))
    }

    /// Remove Active sessions older than `ttl` and delete their directories.
    /// Returns how many were reclaimed.
    pub async fn sweep(&self, ttl: Duration) -> usize {
        let slots: Vec<(OwnerId, Arc<Mutex<Slot>>)> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut reclaimed = 0;
        for (owner, slot) in slots {
            let mut slot = slot.lock().await;
            let expired = matches!(&*slot, Slot::Active(session) if session.age() >= ttl);
            if !expired {
                continue;
            }
            if let Slot::Active(session) = std::mem::take(&mut *slot) {
                drop(slot);
                tracing::info!(owner, age = ?session.age(), "reclaiming abandoned session");
                purge(session.destination()).await;
                reclaimed += 1;
            }
        }

        // Forget idle slots nobody else holds; a held Arc means someone is about to lock it.
        self.slots.retain(|_, slot| {
            Arc::strong_count(slot) > 1 || !matches!(slot.try_lock().as_deref(), Ok(Slot::Idle))
        });
        reclaimed
    }

    /// Run [`sweep`](Self::sweep) every `interval`.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, ttl: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reclaimed = registry.sweep(ttl).await;
                if reclaimed > 0 {
                    tracing::info!(reclaimed, "session sweep finished");
                }
            }
        })
    }
}

/// Recursively delete a destination directory. Already gone is fine.
pub(crate) async fn purge(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "directory purged"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to purge directory"),
    }
}

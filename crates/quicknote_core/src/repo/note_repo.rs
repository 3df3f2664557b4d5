//! Note repository contract and key-value implementation.
//!
//! # Responsibility
//! - Provide upsert/delete/get/page APIs over individually stored records.
//! - Keep the ordered id index consistent with stored records.
//!
//! # Invariants
//! - After `upsert` returns `Ok`, the record exists and its id appears in the
//!   index exactly once.
//! - `delete` is idempotent.
//! - Index reads and the writes derived from them go through one
//!   `KvStore::update`, so concurrent writers cannot drop each other's ids
//!   on stores that isolate updates.
//! - `list_page` only returns ids whose record exists, appends stored records
//!   missing from the index, and persists the corrected index on a
//!   best-effort basis.
//! - No note data is cached between calls; every call re-reads the store.

use crate::model::note::{
    compare_note_ids, generate_note_id, note_id_from_key, note_key, Note, NoteDraft, NoteId,
    NOTES_INDEX_KEY, NOTE_KEY_PREFIX,
};
use crate::store::{KvOp, KvStore, StoreError};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Why a stored value could not be read.
#[derive(Debug)]
pub enum ReadFailure {
    /// The store `get` itself failed.
    Store(StoreError),
    /// The stored value is not valid JSON for its key.
    Malformed(serde_json::Error),
}

impl Display for ReadFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Malformed(err) => write!(f, "malformed JSON: {err}"),
        }
    }
}

/// Repository error for note persistence and paging.
#[derive(Debug)]
pub enum RepoError {
    /// A store read failed or returned malformed JSON.
    StorageRead { key: String, cause: ReadFailure },
    /// A store put/delete (or batch) failed; partial success must not be assumed.
    StorageWrite { keys: String, source: StoreError },
    /// Value could not be encoded before writing.
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StorageRead { key, cause } => write!(f, "failed to read `{key}`: {cause}"),
            Self::StorageWrite { keys, source } => write!(f, "failed to write `{keys}`: {source}"),
            Self::Encode { key, source } => write!(f, "failed to encode `{key}`: {source}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageRead { cause, .. } => match cause {
                ReadFailure::Store(err) => Some(err),
                ReadFailure::Malformed(err) => Some(err),
            },
            Self::StorageWrite { source, .. } => Some(source),
            Self::Encode { source, .. } => Some(source),
        }
    }
}

/// One page of notes in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePage {
    pub notes: Vec<Note>,
    /// `ceil(indexed notes / page_size)`; `0` for an empty store.
    pub total_pages: u32,
    /// The page that was requested (after clamping to `>= 1`).
    pub page: u32,
}

/// Outcome of a full index repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Index entries whose record exists.
    pub kept: usize,
    /// Index entries removed (missing record or duplicate).
    pub dropped: Vec<NoteId>,
    /// Stored records that were missing from the index and got appended.
    pub adopted: Vec<NoteId>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.dropped.is_empty() || !self.adopted.is_empty()
    }
}

/// Repository interface for note persistence.
pub trait NoteRepository {
    /// Stores a note, assigning an id when the draft has none.
    fn upsert(&self, draft: NoteDraft) -> RepoResult<Note>;
    /// Removes a note record and its index entry. Absent ids are a no-op.
    fn delete(&self, id: &str) -> RepoResult<()>;
    /// Gets one note by id.
    fn get(&self, id: &str) -> RepoResult<Option<Note>>;
    /// Returns one page of notes from the self-healed index.
    fn list_page(&self, page: u32, page_size: u32) -> RepoResult<NotePage>;
    /// Drops stale index entries and adopts orphan records.
    fn reconcile(&self) -> RepoResult<ReconcileReport>;
}

/// Index entries after dropping ids without a record.
struct SyncedIndex {
    ids: Vec<NoteId>,
    notes: Vec<Note>,
    dropped: Vec<NoteId>,
    adopted: Vec<NoteId>,
}

impl SyncedIndex {
    /// Appends orphan records after the indexed ones.
    fn adopt(&mut self, orphans: Vec<(NoteId, Note)>) {
        for (id, note) in orphans {
            self.ids.push(id.clone());
            self.notes.push(note);
            self.adopted.push(id);
        }
    }
}

/// Note repository over any [`KvStore`].
pub struct KvNoteRepository<S: KvStore> {
    store: S,
    clock: fn() -> i64,
}

impl<S: KvStore> KvNoteRepository<S> {
    /// Creates a repository that stamps new ids from the system clock.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, current_epoch_ms)
    }

    /// Creates a repository with an explicit epoch-millisecond clock.
    pub fn with_clock(store: S, clock: fn() -> i64) -> Self {
        Self { store, clock }
    }

    fn read_index(&self) -> RepoResult<Vec<NoteId>> {
        match self.read_json::<Vec<NoteId>>(NOTES_INDEX_KEY)? {
            Some(index) => Ok(index),
            None => Ok(Vec::new()),
        }
    }

    fn read_note(&self, id: &str) -> RepoResult<Option<Note>> {
        self.read_json::<Note>(&note_key(id))
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> RepoResult<Option<T>> {
        let raw = self.store.get(key).map_err(|err| RepoError::StorageRead {
            key: key.to_string(),
            cause: ReadFailure::Store(err),
        })?;
        raw.map(|value| {
            serde_json::from_str(&value).map_err(|err| RepoError::StorageRead {
                key: key.to_string(),
                cause: ReadFailure::Malformed(err),
            })
        })
        .transpose()
    }

    fn encode_index(index: &[NoteId]) -> RepoResult<String> {
        serde_json::to_string(index).map_err(|source| RepoError::Encode {
            key: NOTES_INDEX_KEY.to_string(),
            source,
        })
    }

    /// Runs `plan` through [`KvStore::update`] and names the planned keys on
    /// write failures.
    fn update<T>(&self, plan: impl FnOnce() -> RepoResult<(Vec<KvOp>, T)>) -> RepoResult<T> {
        let mut keys = NOTES_INDEX_KEY.to_string();
        self.store
            .update::<T, UpdateFailure, _>(|| {
                let (ops, output) = plan().map_err(UpdateFailure::Plan)?;
                keys = ops.iter().map(KvOp::key).collect::<Vec<_>>().join(", ");
                Ok((ops, output))
            })
            .map_err(|failure| match failure {
                UpdateFailure::Plan(err) => err,
                UpdateFailure::Store(source) => RepoError::StorageWrite { keys, source },
            })
    }

    /// Picks a timestamp id that is neither indexed nor stored.
    fn free_id(&self, index: &[NoteId]) -> RepoResult<NoteId> {
        let mut lookup_error = None;
        let id = generate_note_id((self.clock)(), |candidate| {
            if index.iter().any(|existing| existing == candidate) {
                return true;
            }
            match self.store.get(&note_key(candidate)) {
                Ok(found) => found.is_some(),
                Err(err) => {
                    lookup_error.get_or_insert(err);
                    false
                }
            }
        });
        match lookup_error {
            Some(err) => Err(RepoError::StorageRead {
                key: note_key(&id),
                cause: ReadFailure::Store(err),
            }),
            None => Ok(id),
        }
    }

    /// Reads every indexed id and keeps those with a record, first occurrence wins.
    fn synchronize(&self, stored: &[NoteId]) -> RepoResult<SyncedIndex> {
        let mut seen = HashSet::with_capacity(stored.len());
        let mut synced = SyncedIndex {
            ids: Vec::with_capacity(stored.len()),
            notes: Vec::with_capacity(stored.len()),
            dropped: Vec::new(),
            adopted: Vec::new(),
        };

        for id in stored {
            if !seen.insert(id.as_str()) {
                synced.dropped.push(id.clone());
                continue;
            }
            match self.read_note(id)? {
                Some(note) => {
                    synced.ids.push(id.clone());
                    synced.notes.push(note);
                }
                None => synced.dropped.push(id.clone()),
            }
        }

        Ok(synced)
    }

    /// Stored records whose id is missing from `indexed`, in id order.
    fn find_orphans(&self, indexed: &[NoteId]) -> RepoResult<Vec<(NoteId, Note)>> {
        let keys = self
            .store
            .keys_with_prefix(NOTE_KEY_PREFIX)
            .map_err(|err| RepoError::StorageRead {
                key: format!("{NOTE_KEY_PREFIX}*"),
                cause: ReadFailure::Store(err),
            })?;
        let indexed: HashSet<&str> = indexed.iter().map(String::as_str).collect();
        let mut ids: Vec<&str> = keys
            .iter()
            .filter_map(|key| note_id_from_key(key))
            .filter(|id| !indexed.contains(id))
            .collect();
        ids.sort_by(|left, right| compare_note_ids(left, right));

        let mut orphans = Vec::with_capacity(ids.len());
        for id in ids {
            // Deleted since the key scan.
            if let Some(note) = self.read_note(id)? {
                orphans.push((id.to_string(), note));
            }
        }
        Ok(orphans)
    }

    /// Writes the corrected index unless another writer changed it since `stored` was read.
    fn persist_index_best_effort(&self, stored: &[NoteId], synced: &SyncedIndex) {
        let result = self.update(|| {
            if self.read_index()? != stored {
                return Ok((Vec::new(), false));
            }
            let value = Self::encode_index(&synced.ids)?;
            Ok((vec![KvOp::put(NOTES_INDEX_KEY, value)], true))
        });
        let kept = synced.ids.len();
        let dropped = synced.dropped.len();
        let adopted = synced.adopted.len();
        match result {
            Ok(true) => info!(
                "event=index_heal module=repo status=ok kept={kept} dropped={dropped} adopted={adopted}"
            ),
            Ok(false) => debug!("event=index_heal module=repo status=skipped reason=index_changed"),
            Err(err) => warn!(
                "event=index_heal module=repo status=error kept={kept} dropped={dropped} adopted={adopted} error={err}"
            ),
        }
    }
}

/// Splits a failed [`KvStore::update`] into repository and store causes.
enum UpdateFailure {
    Plan(RepoError),
    Store(StoreError),
}

impl From<StoreError> for UpdateFailure {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl<S: KvStore> NoteRepository for KvNoteRepository<S> {
    fn upsert(&self, draft: NoteDraft) -> RepoResult<Note> {
        let (note, created, index_len) = self.update(|| {
            let mut index = self.read_index()?;
            let id = match draft.id.clone() {
                Some(id) => id,
                None => self.free_id(&index)?,
            };

            let record_key = note_key(&id);
            let note = draft.into_note(id.clone());
            let record = serde_json::to_string(&note).map_err(|source| RepoError::Encode {
                key: record_key.clone(),
                source,
            })?;

            let mut ops = vec![KvOp::put(record_key, record)];
            let created = !index.contains(&id);
            if created {
                index.push(id);
                ops.push(KvOp::put(NOTES_INDEX_KEY, Self::encode_index(&index)?));
            }
            Ok((ops, (note, created, index.len())))
        })?;

        debug!(
            "event=note_upsert module=repo status=ok id={} created={created} index_len={index_len}",
            note.id
        );
        Ok(note)
    }

    fn delete(&self, id: &str) -> RepoResult<()> {
        let index_len = self.update(|| {
            let index = self.read_index()?;
            let mut ops = vec![KvOp::delete(note_key(id))];
            let remaining: Vec<NoteId> =
                index.iter().filter(|entry| *entry != id).cloned().collect();
            if remaining.len() != index.len() {
                ops.push(KvOp::put(NOTES_INDEX_KEY, Self::encode_index(&remaining)?));
            }
            Ok((ops, remaining.len()))
        })?;

        debug!("event=note_delete module=repo status=ok id={id} index_len={index_len}");
        Ok(())
    }

    fn get(&self, id: &str) -> RepoResult<Option<Note>> {
        self.read_note(id)
    }

    fn list_page(&self, page: u32, page_size: u32) -> RepoResult<NotePage> {
        let page = page.max(1);
        let page_size = page_size.max(1);

        let stored = self.read_index()?;
        let mut synced = self.synchronize(&stored)?;
        match self.find_orphans(&synced.ids) {
            Ok(orphans) => synced.adopt(orphans),
            Err(err) => warn!("event=index_adopt module=repo status=error error={err}"),
        }
        if synced.ids != stored {
            self.persist_index_best_effort(&stored, &synced);
        }

        let total = synced.ids.len();
        let per_page = page_size as usize;
        let total_pages = u32::try_from(total.div_ceil(per_page)).unwrap_or(u32::MAX);
        let start = (page as usize - 1).saturating_mul(per_page);
        let notes = synced
            .notes
            .into_iter()
            .skip(start)
            .take(per_page)
            .collect();

        Ok(NotePage {
            notes,
            total_pages,
            page,
        })
    }

    fn reconcile(&self) -> RepoResult<ReconcileReport> {
        let report = self.update(|| {
            let stored = self.read_index()?;
            let mut synced = self.synchronize(&stored)?;
            let kept = synced.ids.len();
            // Malformed orphans surface here instead of silently staying out of pages.
            synced.adopt(self.find_orphans(&synced.ids)?);

            let mut ops = Vec::new();
            if synced.ids != stored {
                ops.push(KvOp::put(NOTES_INDEX_KEY, Self::encode_index(&synced.ids)?));
            }
            let report = ReconcileReport {
                kept,
                dropped: synced.dropped,
                adopted: synced.adopted,
            };
            Ok((ops, report))
        })?;

        info!(
            "event=index_reconcile module=repo status=ok kept={} dropped={} adopted={}",
            report.kept,
            report.dropped.len(),
            report.adopted.len()
        );
        Ok(report)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn current_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

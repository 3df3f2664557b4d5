//! Note domain model.
//!
//! # Responsibility
//! - Define the JSON shape stored at `note:<id>` and exchanged over HTTP.
//! - Provide caller-side validation for titles and content.
//! - Generate timestamp-derived ids for new notes.
//!
//! # Invariants
//! - Ids are decimal strings; numeric ids from older clients are accepted
//!   on input and normalized to strings.
//! - `NoteDraft::validate` is a caller concern; repositories do not call it.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable note identifier (epoch milliseconds at creation, decimal string).
pub type NoteId = String;

/// Key prefix for individually stored note records.
pub const NOTE_KEY_PREFIX: &str = "note:";
/// Key holding the ordered JSON array of note ids.
pub const NOTES_INDEX_KEY: &str = "notesIndex";

/// Returns the record key for one note id.
pub fn note_key(id: &str) -> String {
    format!("{NOTE_KEY_PREFIX}{id}")
}

/// Extracts the note id from a record key, if it is one.
pub fn note_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(NOTE_KEY_PREFIX).filter(|id| !id.is_empty())
}

/// Persisted note record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(deserialize_with = "deserialize_note_id")]
    pub id: NoteId,
    pub title: String,
    pub content: String,
    /// Human-readable timestamp set by the caller on every save.
    #[serde(default)]
    pub date: String,
}

/// Upsert input: a note whose id may not be assigned yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    #[serde(
        default,
        deserialize_with = "deserialize_optional_note_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<NoteId>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub date: String,
}

impl NoteDraft {
    /// Creates a draft for a new note (id assigned on upsert).
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            date: String::new(),
        }
    }

    /// Creates a draft that replaces the note stored under `id`.
    pub fn with_id(
        id: impl Into<NoteId>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(title, content)
        }
    }

    /// Trims title/content/id in place; a blank id becomes `None`.
    pub fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.content = self.content.trim().to_string();
        self.id = self
            .id
            .take()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
    }

    /// Checks the non-empty title/content contract.
    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.title.trim().is_empty() {
            return Err(NoteValidationError::EmptyTitle);
        }
        if self.content.trim().is_empty() {
            return Err(NoteValidationError::EmptyContent);
        }
        Ok(())
    }

    /// Binds the draft to its final id.
    pub fn into_note(self, id: NoteId) -> Note {
        Note {
            id,
            title: self.title,
            content: self.content,
            date: self.date,
        }
    }
}

/// Caller-side validation failures for note input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteValidationError {
    EmptyTitle,
    EmptyContent,
    EmptyId,
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "title must not be empty"),
            Self::EmptyContent => write!(f, "content must not be empty"),
            Self::EmptyId => write!(f, "note id must not be empty"),
        }
    }
}

impl Error for NoteValidationError {}

/// Picks the first free id at or after `now_ms`.
///
/// `taken` reports whether an id is already in use; the candidate is bumped
/// by one millisecond until it is free.
pub fn generate_note_id(now_ms: i64, mut taken: impl FnMut(&str) -> bool) -> NoteId {
    let mut candidate = u64::try_from(now_ms).unwrap_or(0);
    loop {
        let id = candidate.to_string();
        if !taken(&id) {
            return id;
        }
        candidate = candidate.saturating_add(1);
    }
}

/// Orders ids numerically when both are decimal, lexicographically otherwise.
pub fn compare_note_ids(left: &str, right: &str) -> Ordering {
    let numeric = |id: &str| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit());
    if numeric(left) && numeric(right) {
        let left = left.trim_start_matches('0');
        let right = right.trim_start_matches('0');
        left.len().cmp(&right.len()).then_with(|| left.cmp(right))
    } else {
        left.cmp(right)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNoteId {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

impl RawNoteId {
    fn into_id(self) -> NoteId {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Unsigned(value) => value.to_string(),
            Self::Signed(value) => value.to_string(),
        }
    }
}

/// Deserializes a required id given as a JSON string or integer.
pub fn deserialize_note_id<'de, D>(deserializer: D) -> Result<NoteId, D::Error>
where
    D: Deserializer<'de>,
{
    let id = RawNoteId::deserialize(deserializer)?.into_id();
    if id.is_empty() {
        return Err(de::Error::custom("note id must not be empty"));
    }
    Ok(id)
}

/// Deserializes an optional id; `null` and blank strings become `None`.
pub fn deserialize_optional_note_id<'de, D>(deserializer: D) -> Result<Option<NoteId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawNoteId>::deserialize(deserializer)?;
    Ok(raw.map(RawNoteId::into_id).filter(|id| !id.is_empty()))
}

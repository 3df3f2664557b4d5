//! Note use-case service.
//!
//! # Responsibility
//! - Validate and normalize note input before it reaches the repository.
//! - Stamp the human-readable `date` on every save.
//! - Normalize paging arguments.
//!
//! # Invariants
//! - Saved notes always have non-empty trimmed title and content.
//! - Page defaults to 1, page size defaults to 10 and is capped at 50.

use crate::model::note::{Note, NoteDraft, NoteId, NoteValidationError};
use crate::repo::note_repo::{NoteRepository, ReconcileReport, RepoError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PAGE_SIZE: u32 = 10;
const PAGE_SIZE_MAX: u32 = 50;
const DATE_FORMAT: &str = "%Y/%-m/%-d %H:%M:%S";

/// Service error for note use-cases.
#[derive(Debug)]
pub enum NoteServiceError {
    /// Input failed caller-side validation.
    Validation(NoteValidationError),
    /// Target note does not exist.
    NotFound(NoteId),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl NoteServiceError {
    /// Whether the failure was caused by the request rather than storage.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid note: {err}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<RepoError> for NoteServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<NoteValidationError> for NoteServiceError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Page envelope returned to HTTP/CLI callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesPage {
    /// Notes in index (insertion) order.
    pub notes: Vec<Note>,
    pub total_pages: u32,
    pub current_page: u32,
    /// Effective page size after defaulting and capping.
    pub applied_page_size: u32,
}

/// Note service facade over repository implementations.
pub struct NoteService<R: NoteRepository> {
    repo: R,
}

impl<R: NoteRepository> NoteService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates or replaces a note.
    ///
    /// Title and content are trimmed and must be non-empty; `date` is always
    /// overwritten with the current local time.
    pub fn save_note(&self, mut draft: NoteDraft) -> Result<Note, NoteServiceError> {
        draft.normalize();
        draft.validate()?;
        draft.date = current_display_date();

        let is_update = draft.id.is_some();
        let note = self.repo.upsert(draft)?;
        info!(
            "event=note_save module=service status=ok id={} update={is_update}",
            note.id
        );
        Ok(note)
    }

    /// Deletes a note. Deleting an unknown id succeeds.
    pub fn delete_note(&self, id: &str) -> Result<(), NoteServiceError> {
        let id = normalize_id(id)?;
        self.repo.delete(id)?;
        info!("event=note_delete module=service status=ok id={id}");
        Ok(())
    }

    /// Gets one note, failing with `NotFound` when absent.
    pub fn get_note(&self, id: &str) -> Result<Note, NoteServiceError> {
        let id = normalize_id(id)?;
        self.repo
            .get(id)?
            .ok_or_else(|| NoteServiceError::NotFound(id.to_string()))
    }

    /// Lists one page of notes using default/capped paging arguments.
    pub fn list_notes(
        &self,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<NotesPage, NoteServiceError> {
        let page = normalize_page(page);
        let applied_page_size = normalize_page_size(page_size);
        let listed = self.repo.list_page(page, applied_page_size)?;
        Ok(NotesPage {
            notes: listed.notes,
            total_pages: listed.total_pages,
            current_page: listed.page,
            applied_page_size,
        })
    }

    /// Runs a full index repair pass.
    pub fn reconcile(&self) -> Result<ReconcileReport, NoteServiceError> {
        Ok(self.repo.reconcile()?)
    }
}

/// Normalizes a requested page number (`None`/`0` -> 1).
pub fn normalize_page(page: Option<u32>) -> u32 {
    match page {
        Some(0) | None => DEFAULT_PAGE,
        Some(value) => value,
    }
}

/// Normalizes a requested page size (`None`/`0` -> 10, capped at 50).
pub fn normalize_page_size(page_size: Option<u32>) -> u32 {
    match page_size {
        Some(0) | None => DEFAULT_PAGE_SIZE,
        Some(value) if value > PAGE_SIZE_MAX => PAGE_SIZE_MAX,
        Some(value) => value,
    }
}

/// Formats the current local time the way note cards display it.
pub fn current_display_date() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}

fn normalize_id(id: &str) -> Result<&str, NoteServiceError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(NoteValidationError::EmptyId.into());
    }
    Ok(trimmed)
}

//! `/api/notes` endpoints.
//!
//! Canonical delete is `DELETE /api/notes/{id}`; `POST /api/notes` with
//! `{ "action": "delete", "id": ... }` is accepted for older clients.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use quicknote_core::model::note::{deserialize_note_id, NoteDraft, NoteId};
use quicknote_core::Note;
use serde::{Deserialize, Serialize};

const SAVED_MESSAGE: &str = "Note saved successfully";
const DELETED_MESSAGE: &str = "Note deleted successfully";

pub fn note_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notes", get(list_notes).post(post_note))
        .route("/api/notes/{id}", get(get_note).delete(delete_note))
}

/// Raw query strings so malformed numbers map to a JSON 400.
#[derive(Debug, Default, Deserialize)]
struct ListNotesQuery {
    page: Option<String>,
    #[serde(rename = "pageSize", alias = "page_size")]
    page_size: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotesListResponse {
    notes: Vec<Note>,
    total_pages: u32,
    current_page: u32,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<NoteId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PostAction {
    Delete,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PostNoteBody {
    Action {
        action: PostAction,
        #[serde(deserialize_with = "deserialize_note_id")]
        id: NoteId,
    },
    Upsert(NoteDraft),
}

async fn list_notes(
    State(state): State<AppState>,
    Query(query): Query<ListNotesQuery>,
) -> Result<Json<NotesListResponse>, ApiError> {
    let page = parse_paging_value("page", query.page.as_deref())?;
    let page_size = parse_paging_value("pageSize", query.page_size.as_deref())?;

    let listed = state
        .with_service(move |service| service.list_notes(page, page_size))
        .await?;
    Ok(Json(NotesListResponse {
        notes: listed.notes,
        total_pages: listed.total_pages,
        current_page: listed.current_page,
    }))
}

async fn get_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Note>, ApiError> {
    let note = state
        .with_service(move |service| service.get_note(&id))
        .await?;
    Ok(Json(note))
}

async fn post_note(
    State(state): State<AppState>,
    body: Result<Json<PostNoteBody>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    match body {
        PostNoteBody::Action {
            action: PostAction::Delete,
            id,
        } => {
            state
                .with_service(move |service| service.delete_note(&id))
                .await?;
            Ok(Json(MessageResponse {
                message: DELETED_MESSAGE,
                id: None,
            }))
        }
        PostNoteBody::Upsert(draft) => {
            let saved = state
                .with_service(move |service| service.save_note(draft))
                .await?;
            Ok(Json(MessageResponse {
                message: SAVED_MESSAGE,
                id: Some(saved.id),
            }))
        }
    }
}

async fn delete_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .with_service(move |service| service.delete_note(&id))
        .await?;
    Ok(Json(MessageResponse {
        message: DELETED_MESSAGE,
        id: None,
    }))
}

fn parse_paging_value(name: &str, raw: Option<&str>) -> Result<Option<u32>, ApiError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse::<u32>().map(Some).map_err(|_| {
            ApiError::BadRequest(format!("`{name}` must be a positive integer, got `{value}`"))
        }),
    }
}

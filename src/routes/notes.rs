//! Note endpoints, all behind a session
//!
//! - GET    /note      - list own notes (`since_id`, `before_id`, `since_date`, `before_date`, `count`)
//! - POST   /note      - post a note
//! - GET    /note/{id} - read a note
//! - PUT    /note/{id} - edit own note
//! - DELETE /note/{id} - delete own note

use std::sync::Arc;

use chrono::Utc;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};

use super::envelope::{auth_header, data_response, error_response, no_content, parse_form, BoxBody};
use crate::notes::{NoteForm, NoteListParams};
use crate::server::AppState;
use crate::types::ImpError;

/// GET /note
pub async fn handle_list_notes(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let session = match state.auth.authenticate(auth_header(&req)).await {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };

    let params: NoteListParams = match serde_urlencoded::from_str(req.uri().query().unwrap_or(""))
    {
        Ok(params) => params,
        Err(e) => return error_response(&ImpError::Validation(format!("Invalid query: {}", e))),
    };

    match state.notes.list(&session, &params).await {
        Ok(notes) => data_response(StatusCode::OK, &notes),
        Err(e) => error_response(&e),
    }
}

/// POST /note
pub async fn handle_post_note(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let session = match state.auth.authenticate(auth_header(&req)).await {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };

    let form: NoteForm = match parse_form(req).await {
        Ok(form) => form,
        Err(e) => return error_response(&e),
    };

    match state.notes.post(&session, &form, Utc::now()).await {
        Ok(note) => data_response(StatusCode::CREATED, &note),
        Err(e) => error_response(&e),
    }
}

/// GET /note/{id}
pub async fn handle_get_note(
    req: Request<Incoming>,
    state: Arc<AppState>,
    note_id: &str,
) -> Response<BoxBody> {
    if let Err(e) = state.auth.authenticate(auth_header(&req)).await {
        return error_response(&e);
    }

    match state.notes.get(note_id).await {
        Ok(note) => data_response(StatusCode::OK, &note),
        Err(e) => error_response(&e),
    }
}

/// PUT /note/{id}
pub async fn handle_put_note(
    req: Request<Incoming>,
    state: Arc<AppState>,
    note_id: &str,
) -> Response<BoxBody> {
    let session = match state.auth.authenticate(auth_header(&req)).await {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };

    let form: NoteForm = match parse_form(req).await {
        Ok(form) => form,
        Err(e) => return error_response(&e),
    };

    match state.notes.edit(&session, note_id, &form).await {
        Ok(note) => data_response(StatusCode::OK, &note),
        Err(e) => error_response(&e),
    }
}

/// DELETE /note/{id}
pub async fn handle_delete_note(
    req: Request<Incoming>,
    state: Arc<AppState>,
    note_id: &str,
) -> Response<BoxBody> {
    let session = match state.auth.authenticate(auth_header(&req)).await {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };

    match state.notes.delete(&session, note_id).await {
        Ok(()) => no_content(),
        Err(e) => error_response(&e),
    }
}

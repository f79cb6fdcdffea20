//! HTTP surface: the worker protocol (spec.md §4.6) and the public read API
//! (spec.md §4.7), as two independent `axum` routers sharing one
//! [`AppState`]. The teacher's own request framework (`proxmox::api::Router`,
//! a macro-driven schema/permission system internal to Proxmox) isn't
//! republishable outside that project; `axum` is the ecosystem-standard
//! router-with-extractors crate the rest of the example pack reaches for
//! (see DESIGN.md), so handlers here read as idiomatic `axum` rather than
//! an imitation of the teacher's macro surface.

pub mod public;
pub mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{Error, ErrorKind};
use crate::index::Index;
use crate::library::MountedLibrary;
use crate::scheduler::Scheduler;

/// Shared handle passed to every route; cheap to clone (all fields are
/// already `Arc`-backed or small maps fixed at startup).
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub index: Arc<Index>,
    pub libraries: Arc<HashMap<String, MountedLibrary>>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

/// Maps the core's `ErrorKind` taxonomy onto HTTP status codes per
/// spec.md §7's propagation policy: caller-actionable kinds return
/// verbatim `4xx`; everything else is a `5xx`.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::IntegrityError => StatusCode::OK,
            ErrorKind::IOError | ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody { error: self.kind.to_string(), message: self.message };
        (status, Json(body)).into_response()
    }
}

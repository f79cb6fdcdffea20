//! Worker HTTP protocol (spec.md §4.6, §6). A worker process long-polls
//! `GET /api/v1/jobs`, reports lifecycle transitions via
//! `PUT /api/v1/jobs/{id}`, and streams artifacts/manifests into its
//! assigned snapshot through the two capability-token-scoped `POST`
//! endpoints below.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Error;
use crate::scheduler::Job;

use super::AppState;

/// How long `GET /api/v1/jobs` blocks before replying 204 (spec.md §4.6:
/// "workers long-poll"). A worker that wants a different cadence simply
/// reconnects; this is not a negotiated client timeout.
const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(25);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/jobs", get(get_job_request))
        .route("/api/v1/jobs/:id", put(update_job))
        .route("/api/v1/snapshots/:origin/:id/artifacts", post(upload_artifact))
        .route("/api/v1/snapshots/:origin/:id/manifests", post(upload_manifest))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /api/v1/jobs` -> 200 with a `JobRequest` body, or 204 if none
/// arrives within the long-poll window. Cancellation takes the form of a
/// fresh per-request token rather than a client-disconnect signal -- axum
/// doesn't expose socket-level disconnection to handlers without extra
/// plumbing, and the deadline sweep (`Scheduler::sweep_deadlines`) already
/// reclaims jobs a worker never finishes reporting on.
async fn get_job_request(State(state): State<AppState>) -> Response {
    let cancel = CancellationToken::new();
    match tokio::time::timeout(LONG_POLL_TIMEOUT, state.scheduler.get_job_request(&cancel)).await {
        Ok(Ok(request)) => (StatusCode::OK, Json(request)).into_response(),
        Ok(Err(err)) => err.into_response(),
        Err(_elapsed) => StatusCode::NO_CONTENT.into_response(),
    }
}

/// `PUT /api/v1/jobs/{id}` -> 200, or 400 if the path id and body id
/// disagree (spec.md §4.6).
async fn update_job(State(state): State<AppState>, Path(id): Path<Uuid>, Json(job): Json<Job>) -> Result<StatusCode, Error> {
    if job.id != id {
        return Err(Error::invalid_argument(format!("path job id {} does not match body job id {}", id, job.id)));
    }
    state.scheduler.update_job(job).await?;
    Ok(StatusCode::OK)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Error> {
    headers
        .get(name)
        .ok_or_else(|| Error::invalid_argument(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| Error::invalid_argument(format!("malformed {} header", name)))
}

/// Extracts the bearer token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, Error> {
    header_str(headers, "authorization")?
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::unauthorized("expected 'Authorization: Bearer <token>'"))
}

/// `POST /api/v1/snapshots/{origin}/{id}/artifacts`: raw body, `X-Larch-Name`
/// header, `Authorization: Bearer <token>` scoping the write. Responds 201
/// with `X-Larch-Size`/`X-Larch-Digest` computed server-side.
async fn upload_artifact(
    State(state): State<AppState>,
    Path((origin, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, Error> {
    let token = bearer_token(&headers)?;
    let library_id = state.scheduler.authorize(token, &origin, &id)?;
    let name = header_str(&headers, "x-larch-name")?;

    let mounted = state
        .scheduler
        .library(&library_id)
        .ok_or_else(|| Error::invalid_argument(format!("unknown library '{}'", library_id)))?;
    let writer_handle = mounted
        .writer
        .as_ref()
        .ok_or_else(|| Error::invalid_argument(format!("library '{}' is read-only", library_id)))?;

    let mut writer = writer_handle.write_snapshot(&origin, &id).await?;
    let (size, digest) = writer.write_artifact(name, &body).await?;
    writer.close().await?;

    let mut response = StatusCode::CREATED.into_response();
    let headers = response.headers_mut();
    headers.insert("x-larch-size", size.to_string().parse().expect("decimal number is a valid header value"));
    headers.insert("x-larch-digest", digest.to_string().parse().expect("digest string is a valid header value"));
    Ok(response)
}

/// `POST /api/v1/snapshots/{origin}/{id}/manifests`: `ArtifactManifest`
/// JSON body, same token scoping as artifact uploads.
async fn upload_manifest(
    State(state): State<AppState>,
    Path((origin, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(manifest): Json<crate::snapshot::ArtifactManifest>,
) -> Result<StatusCode, Error> {
    let token = bearer_token(&headers)?;
    let library_id = state.scheduler.authorize(token, &origin, &id)?;
    let mounted = state
        .scheduler
        .library(&library_id)
        .ok_or_else(|| Error::invalid_argument(format!("unknown library '{}'", library_id)))?;
    let writer_handle = mounted
        .writer
        .as_ref()
        .ok_or_else(|| Error::invalid_argument(format!("library '{}' is read-only", library_id)))?;

    let mut writer = writer_handle.write_snapshot(&origin, &id).await?;
    writer.write_artifact_manifest(manifest).await?;
    writer.close().await?;
    Ok(StatusCode::CREATED)
}

//! Public read API (spec.md §4.7): paginated, HAL-like JSON browsing over
//! the in-memory index, plus raw blob streaming.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use crate::digest::Digest;
use crate::error::Error;
use crate::index::IndexedSnapshot;
use crate::snapshot::ArtifactManifest;

use super::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/snapshots", get(list_snapshots))
        .route("/api/v1/snapshots/:origin", get(list_snapshots_for_origin))
        .route("/api/v1/snapshots/:origin/:id", get(get_snapshot))
        .route("/api/v1/snapshots/:origin/:id/artifacts", get(list_artifacts))
        .route("/api/v1/snapshots/:origin/:id/artifacts/:algo/:digest", get(get_artifact))
        .route("/api/v1/blobs/:algo/:digest", get(get_blob))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

/// A HAL-like page: the slice of `items` requested plus the `total` count
/// across the whole (unfiltered-by-pagination) result set.
#[derive(Serialize)]
struct Page<T> {
    items: Vec<T>,
    total: usize,
    limit: usize,
    offset: usize,
}

fn paginate<T>(mut items: Vec<T>, query: PageQuery) -> Page<T> {
    let total = items.len();
    let offset = query.offset.unwrap_or(0).min(total);
    let limit = query.limit.unwrap_or(50).min(500);
    let end = (offset + limit).min(total);
    items.rotate_left(offset);
    items.truncate(end - offset);
    Page { items, total, limit, offset }
}

async fn list_snapshots(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Json<Page<IndexedSnapshot>> {
    Json(paginate(state.index.list_snapshots(None), query))
}

async fn list_snapshots_for_origin(
    State(state): State<AppState>,
    Path(origin): Path<String>,
    Query(query): Query<PageQuery>,
) -> Json<Page<IndexedSnapshot>> {
    Json(paginate(state.index.list_snapshots(Some(&origin)), query))
}

async fn get_snapshot(State(state): State<AppState>, Path((origin, id)): Path<(String, String)>) -> Result<Json<IndexedSnapshot>, Error> {
    Ok(Json(state.index.get_snapshot(&origin, &id)?))
}

async fn list_artifacts(
    State(state): State<AppState>,
    Path((origin, id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ArtifactManifest>>, Error> {
    let snapshot = state.index.get_snapshot(&origin, &id)?;
    Ok(Json(paginate(snapshot.artifacts, query)))
}

async fn get_artifact(
    State(state): State<AppState>,
    Path((origin, id, algo, hex)): Path<(String, String, String, String)>,
) -> Result<Json<ArtifactManifest>, Error> {
    let digest: Digest = format!("{}:{}", algo, hex).parse()?;
    Ok(Json(state.index.get_artifact(&origin, &id, &digest)?))
}

/// `HEAD`/`GET /api/v1/blobs/{algo}/{digest}`. Axum dispatches `HEAD`
/// through the same `get` handler and discards the body, which already
/// gives `HEAD` the `Content-Length`/`Content-Type` headers this endpoint
/// needs without a second handler. The well-known empty-blob digest is
/// served as 204 (spec.md §4.7); any other digest not present in any
/// mounted library is a plain 404.
async fn get_blob(State(state): State<AppState>, Path((algo, hex)): Path<(String, String)>) -> Result<Response, Error> {
    let digest: Digest = format!("{}:{}", algo, hex).parse()?;
    if digest == Digest::empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let blob = state.index.get_blob(&digest)?;
    let library_id = blob
        .libraries
        .iter()
        .next()
        .ok_or_else(|| Error::not_found(format!("blob {} not found in any mounted library", digest)))?;
    let mounted = state
        .libraries
        .get(library_id)
        .ok_or_else(|| Error::not_found(format!("library '{}' not mounted", library_id)))?;

    let mut reader = mounted.reader.read_artifact(&digest).await?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await.map_err(Error::from)?;
    if let Some(observed) = reader.digest() {
        if observed != digest {
            tracing::warn!(requested = %digest, observed = %observed, "blob integrity mismatch on GET");
        }
    }

    let content_type = content_type_for(&state, &digest).unwrap_or_else(|| "application/octet-stream".to_string());
    let mut response = (StatusCode::OK, bytes).into_response();
    response.headers_mut().insert(header::CONTENT_TYPE, content_type.parse().expect("media type is a valid header value"));
    Ok(response)
}

/// Blobs carry no content type of their own (spec.md §3: that belongs to
/// the artifact manifest referencing them); look it up by scanning the
/// indexed snapshots for a manifest pointing at this digest.
fn content_type_for(state: &AppState, digest: &Digest) -> Option<String> {
    state
        .index
        .list_snapshots(None)
        .into_iter()
        .flat_map(|s| s.artifacts)
        .find(|a| &a.digest == digest)
        .map(|a| a.content_type)
}

//! `larch-worker`: pulls job requests from a scheduler's worker API and
//! runs the matching archiver (spec.md §4.6 "A worker process"). Chrome/CDP
//! driving, the archive.org capture API, and HTML fetching are external
//! collaborators per spec.md §1 -- the concrete archivers below are the
//! external-collaborator surface that plugs into the core's `Archiver`
//! trait, grounded in `examples/original_source/internal/archivers/{archiveorg.go,opengraph/archiver.go}`.

use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use larch::archiver::{Archiver, ArchiverSpec};
use larch::error::Error;
use larch::library::remote::RemoteLibrary;
use larch::library::{LibraryWriter, SnapshotWriterHandle};
use larch::scheduler::{Job, JobRequest, JobStatus};

/// Records the archive.org capture URL a worker *would* submit for
/// archival, without actually driving the remote capture API (spec.md §1:
/// outbound HTTP fetching against remote origins is an external
/// collaborator). Ported from the original's `ArchiveOrgArchiver`, which
/// likewise only ever built the URL and never called out to archive.org.
struct ArchiveOrgArchiver;

#[async_trait::async_trait]
impl Archiver for ArchiveOrgArchiver {
    async fn archive(&self, writer: &mut dyn SnapshotWriterHandle, url: &str) -> larch::error::Result<()> {
        let mut parsed = Url::parse(url).map_err(|err| Error::invalid_argument(format!("bad url '{}': {}", url, err)))?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        let path = format!("web/{}{}", host, parsed.path());
        parsed.set_host(Some("web.archive.org")).ok();
        parsed.set_scheme("https").ok();
        parsed.set_path(&path);
        parsed.set_query(None);

        let (size, digest) = writer.write_artifact("archive.org.txt", parsed.as_str().as_bytes()).await?;
        writer
            .write_artifact_manifest(
                larch::snapshot::ArtifactManifest::new("text/plain", digest, size)
                    .with_annotation(larch::snapshot::ANNOTATION_ARTIFACT_PATH, "archive.org.txt")
                    .with_annotation(larch::snapshot::ANNOTATION_ARTIFACT_TYPE, "vnd.larch.archive.org.url.v1"),
            )
            .await
    }
}

/// Fetches the target URL and records its raw OpenGraph `og:*` meta tags as
/// a JSON artifact. The enrichment that turns `og:title` into a snapshot's
/// display title happens at index time (`larch::index`), not here, per
/// spec.md §9's design note against double work.
struct OpenGraphArchiver {
    client: reqwest::Client,
}

#[async_trait::async_trait]
impl Archiver for OpenGraphArchiver {
    async fn archive(&self, writer: &mut dyn SnapshotWriterHandle, url: &str) -> larch::error::Result<()> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html")
            .send()
            .await
            .map_err(|err| Error::with_source(larch::error::ErrorKind::IOError, "fetching url for opengraph extraction", err.into()))?;

        let content_type = response.headers().get("content-type").and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
        if !content_type.starts_with("text/html") {
            tracing::debug!(%url, %content_type, "skipping opengraph: not an html document");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .map_err(|err| Error::with_source(larch::error::ErrorKind::IOError, "reading opengraph response body", err.into()))?;

        let properties = extract_og_properties(&body);
        let document = serde_json::to_vec_pretty(&properties)?;

        let (size, digest) = writer.write_artifact("opengraph.json", &document).await?;
        writer
            .write_artifact_manifest(
                larch::snapshot::ArtifactManifest::new("application/json", digest, size)
                    .with_annotation(larch::snapshot::ANNOTATION_ARTIFACT_PATH, "opengraph.json")
                    .with_annotation(larch::snapshot::ANNOTATION_ARTIFACT_TYPE, larch::snapshot::OPENGRAPH_META_ARTIFACT_TYPE),
            )
            .await
    }
}

/// Minimal `<meta property="og:*" content="...">` scraper -- real OpenGraph
/// extraction (full HTML parsing, relative-URL resolution for `og:image`)
/// is an external collaborator per spec.md §1; this is just enough to
/// produce a realistic artifact for the worker loop below.
fn extract_og_properties(html: &str) -> std::collections::BTreeMap<String, Vec<String>> {
    let mut properties: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    for tag_start in html.match_indices("<meta").map(|(i, _)| i) {
        let Some(tag_end) = html[tag_start..].find('>').map(|i| tag_start + i) else { continue };
        let tag = &html[tag_start..tag_end];
        let Some(property) = extract_attr(tag, "property") else { continue };
        if !property.starts_with("og:") {
            continue;
        }
        let content = extract_attr(tag, "content").unwrap_or_default();
        properties.entry(property).or_default().push(content);
    }
    properties
}

fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    let needle = format!("{}=", attr);
    let start = tag.find(&needle)? + needle.len();
    let rest = &tag[start..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let end = rest[1..].find(quote)?;
    Some(rest[1..1 + end].to_string())
}

fn archiver_for(spec: &ArchiverSpec, client: &reqwest::Client) -> Result<Box<dyn Archiver>, Error> {
    match spec {
        ArchiverSpec::ArchiveOrg => Ok(Box::new(ArchiveOrgArchiver)),
        ArchiverSpec::OpenGraph => Ok(Box::new(OpenGraphArchiver { client: client.clone() })),
        ArchiverSpec::Chrome { .. } => Err(Error::new(
            larch::error::ErrorKind::InternalError,
            "chrome archiver requires an external Chrome/CDP integration not provided by this crate",
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("larch_worker=info".parse().unwrap()))
        .init();

    let endpoint = std::env::args().nth(1).unwrap_or_else(|| "http://127.0.0.1:8081".to_string());
    let client = reqwest::Client::new();

    tracing::info!(%endpoint, "worker starting");

    loop {
        match pull_job(&client, &endpoint).await {
            Ok(Some(request)) => {
                if let Err(err) = run_job(&client, &endpoint, request).await {
                    tracing::error!(error = %err, "job execution failed");
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to pull job, backing off");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

async fn pull_job(client: &reqwest::Client, endpoint: &str) -> Result<Option<JobRequest>> {
    let response = client.get(format!("{}/api/v1/jobs", endpoint)).send().await.context("GET /api/v1/jobs")?;
    match response.status() {
        reqwest::StatusCode::OK => Ok(Some(response.json().await.context("decoding job request")?)),
        reqwest::StatusCode::NO_CONTENT => Ok(None),
        status => anyhow::bail!("unexpected status from job pull: {}", status),
    }
}

async fn report(client: &reqwest::Client, endpoint: &str, job: &Job) -> Result<()> {
    let response = client
        .put(format!("{}/api/v1/jobs/{}", endpoint, job.id))
        .json(job)
        .send()
        .await
        .context("PUT /api/v1/jobs/{id}")?;
    if !response.status().is_success() {
        anyhow::bail!("unexpected status reporting job: {}", response.status());
    }
    Ok(())
}

/// Drives one job through `accepted -> started -> succeeded|failed`
/// (spec.md §4.6 "A worker process"), dispatching to the archiver named by
/// its `ArchiverSpec` and streaming artifacts through a [`RemoteLibrary`]
/// scoped by the job's capability token.
async fn run_job(client: &reqwest::Client, endpoint: &str, request: JobRequest) -> Result<()> {
    let JobRequest { token, archiver, mut job } = request;
    tracing::info!(job_id = %job.id, kind = archiver.kind(), "accepted job");

    job.status = JobStatus::Accepted;
    job.accepted = Some(chrono::Utc::now());
    report(client, endpoint, &job).await?;

    job.status = JobStatus::Started;
    job.started = Some(chrono::Utc::now());
    report(client, endpoint, &job).await?;

    let remote = RemoteLibrary::new(endpoint, token);
    let outcome = async {
        let mut writer = remote.write_snapshot(&job.origin, &job.snapshot_id).await?;
        let archiver = archiver_for(&archiver, client)?;
        archiver.archive(&mut *writer, &job.url).await?;
        writer.close().await
    }
    .await;

    match outcome {
        Ok(()) => {
            job.status = JobStatus::Succeeded;
            job.error = None;
        }
        Err(err) => {
            tracing::warn!(job_id = %job.id, error = %err, "archiver failed");
            job.status = JobStatus::Failed;
            job.error = Some(err.to_string());
        }
    }
    job.ended = Some(chrono::Utc::now());
    report(client, endpoint, &job).await?;
    Ok(())
}

//! `larch`: starts the public read API on `:8080` and the worker API on
//! `:8081` against a config file (spec.md §6 "CLI surface"). Mounting
//! libraries, wiring the scheduler/index, and serving both routers is the
//! core's job; parsing command-line flags and the exact config schema
//! beyond what `larch::config` defines is intentionally thin here, per
//! spec.md §1's "the CLI layer... [is] treated as an external collaborator".

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use larch::api::{self, AppState};
use larch::config::{Config, LibraryConfig};
use larch::index::Index;
use larch::library::{ArchiveBoxLibrary, DiskLibrary, MountedLibrary};
use larch::scheduler::{AbandonedJobPolicy, Scheduler};

const PUBLIC_ADDR: &str = "0.0.0.0:8080";
const WORKER_ADDR: &str = "0.0.0.0:8081";
const DEADLINE_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("larch=info".parse().unwrap()))
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "larch.toml".to_string());
    let config = Config::load(&config_path).await.with_context(|| format!("loading config '{}'", config_path))?;

    let mut libraries = HashMap::new();
    for (id, entry) in &config.libraries {
        let mounted = match entry {
            LibraryConfig::Disk { path } => MountedLibrary::read_write(Arc::new(DiskLibrary::new(path.clone()))),
            LibraryConfig::ArchiveBox { path } => MountedLibrary::read_only(Arc::new(
                ArchiveBoxLibrary::open(path.clone()).await.with_context(|| format!("opening archivebox library '{}'", id))?,
            )),
        };
        libraries.insert(id.clone(), mounted);
    }

    let index = Arc::new(Index::new());
    for (id, mounted) in &libraries {
        index.index_library(id, mounted.reader.as_ref()).await.with_context(|| format!("indexing library '{}'", id))?;
    }
    tracing::info!(libraries = libraries.len(), "initial index scan complete");

    let scheduler = Arc::new(Scheduler::new(libraries.clone(), index.clone(), AbandonedJobPolicy::default()));

    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DEADLINE_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                scheduler.sweep_deadlines().await;
            }
        });
    }

    let state = AppState { scheduler, index, libraries: Arc::new(libraries) };

    let public_router = api::public::router(state.clone());
    let worker_router = api::worker::router(state);

    let public_addr: std::net::SocketAddr = PUBLIC_ADDR.parse().expect("constant address parses");
    let worker_addr: std::net::SocketAddr = WORKER_ADDR.parse().expect("constant address parses");

    tracing::info!(addr = PUBLIC_ADDR, "public read API listening");
    tracing::info!(addr = WORKER_ADDR, "worker API listening");

    let public = axum::Server::bind(&public_addr).serve(public_router.into_make_service());
    let worker = axum::Server::bind(&worker_addr).serve(worker_router.into_make_service());

    tokio::try_join!(
        async { public.await.context("public API server failed") },
        async { worker.await.context("worker API server failed") },
    )?;

    Ok(())
}

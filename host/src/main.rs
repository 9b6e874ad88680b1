mod config;
mod harness;
mod script;

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tabletop_shared::{MapCatalog, MapSetData, SessionData};
use tracing_subscriber::EnvFilter;

use crate::config::HarnessSettings;
use crate::script::Script;

async fn read_json<T: DeserializeOwned + Default>(path: Option<&Path>, what: &str) -> anyhow::Result<T> {
    let Some(path) = path else {
        tracing::info!("no {what} file configured; using an empty one");
        return Ok(T::default());
    };
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {what} {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing {what} {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = HarnessSettings::from_env();
    tracing::info!(
        replicas = settings.replicas,
        bus_capacity = settings.engine.bus_capacity,
        dm_width = settings.dm_container.width,
        dm_height = settings.dm_container.height,
        "starting tabletop harness"
    );

    let map_set: MapSetData = read_json(settings.mapset.as_deref(), "map set").await?;
    let session: SessionData = read_json(settings.session.as_deref(), "session").await?;
    let catalog = MapCatalog::new(map_set, session);

    let script = match settings.script.as_deref() {
        Some(path) => Script::load(path).await?,
        None => {
            tracing::info!("TABLETOP_SCRIPT not set; running the built-in demo");
            Script::demo()
        }
    };
    tracing::info!(steps = script.steps.len(), "script loaded");

    let started = chrono::Utc::now();
    let outcome = harness::run(&settings, catalog, script).await?;
    outcome.log();
    tracing::info!(
        elapsed_ms = (chrono::Utc::now() - started).num_milliseconds(),
        "harness finished"
    );

    if let Some(path) = settings.mask_out.as_deref() {
        match outcome.mask_png.as_deref() {
            Some(png) => {
                tokio::fs::write(path, png)
                    .await
                    .with_context(|| format!("writing fog mask {}", path.display()))?;
                tracing::info!(path = %path.display(), bytes = png.len(), "fog mask written");
            }
            None => tracing::warn!("fog disabled on the final map; no mask written"),
        }
    }

    outcome.ensure_converged()
}

//! Point Cluster - command line replay of map viewports
//!
//! Loads a GeoJSON collection, replays each `--view` as a settled viewport and
//! prints the resulting marker instructions as JSON lines on stdout.

mod logging;
mod settings;
mod sink;

use point_cluster_lib::tiles::covering_tiles;
use point_cluster_lib::{ClusterNode, FileSource, MapSession};
use settings::Settings;
use sink::JsonLinesSink;
use std::io::Write;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::setup_logging();
    let settings = Settings::from_cli();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(settings))
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let config = settings.config();
    let viewports = settings.viewports(&config);
    let sink = JsonLinesSink::new(std::io::stdout().lock());
    let mut session = MapSession::with_policy(config.clone(), settings.policy(), sink)?;

    let report = session.ingest(&FileSource::new(&settings.geojson)).await;
    if let Some(failure) = &report.failure {
        tracing::error!("Starting with an empty map: {}", failure);
    }
    for skipped in &report.skipped {
        tracing::debug!(
            "Skipped feature #{} ({:?}): {}",
            skipped.position,
            skipped.id,
            skipped.reason
        );
    }

    if let Some(provider) = settings.tiles {
        tracing::info!(
            "Basemap tiles from {} ({})",
            provider.name(),
            provider.attribution()
        );
    }

    for (frame, viewport) in viewports.into_iter().enumerate() {
        session.sink_mut().set_frame(frame);
        session.set_viewport_now(viewport)?;
        let features: usize = session.visible().iter().map(ClusterNode::count).sum();
        tracing::info!(
            "Frame {}: {} markers for {} features at zoom {}",
            frame,
            session.visible().len(),
            features,
            viewport.zoom
        );

        if let Some(provider) = settings.tiles {
            let writer = session.sink_mut().writer_mut();
            for key in covering_tiles(&viewport, config.tile_size) {
                let line = serde_json::json!({
                    "frame": frame,
                    "op": "tile",
                    "tile": key,
                    "url": provider.url(key),
                });
                writeln!(writer, "{line}")?;
            }
        }
    }

    tracing::info!("Done: {} features indexed", session.index().len());
    Ok(())
}

use clap::Parser;
use point_cluster_lib::tiles::TileProvider;
use point_cluster_lib::{Config, IdentityMode, Viewport, ZoomThresholdPolicy};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Point Cluster - Replay map viewports over a GeoJSON collection and print marker instructions
pub struct Settings {
    /// GeoJSON FeatureCollection to load
    #[clap(value_name = "FILE")]
    pub geojson: PathBuf,

    /// Clustering radius in pixels
    #[clap(short, long, default_value = "80.0")]
    pub radius: f64,

    /// First zoom level at which every feature is shown on its own
    #[clap(short, long, default_value = "18")]
    pub unclustered_zoom: u8,

    /// Viewports to replay in order (defaults to the initial view)
    #[clap(long = "view", value_name = "LAT,LON,ZOOM", value_parser = parse_view)]
    pub views: Vec<ViewArg>,

    /// Screen size in pixels
    #[clap(
        long,
        value_name = "WIDTHxHEIGHT",
        default_value = "1024x768",
        value_parser = parse_screen
    )]
    pub screen: (f64, f64),

    /// Keep group ids across viewports while member overlap (0-1] stays at least this high
    #[clap(long, value_name = "OVERLAP")]
    pub stable_ids: Option<f64>,

    /// Also print the basemap tiles of each viewport from this provider
    #[clap(long, value_name = "PROVIDER", value_parser = parse_provider)]
    pub tiles: Option<TileProvider>,

    /// Maximum points per quadtree node before subdivision
    #[clap(long, default_value = "16")]
    pub max_points_per_node: usize,
}

/// A `lat,lon,zoom` triple from the command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewArg {
    pub lat: f64,
    pub lon: f64,
    pub zoom: f64,
}

impl Settings {
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    pub fn config(&self) -> Config {
        Config {
            max_points_per_node: self.max_points_per_node,
            identity: match self.stable_ids {
                Some(min_overlap) => IdentityMode::Stable { min_overlap },
                None => IdentityMode::ContentHash,
            },
            screen_px: self.screen,
            ..Config::default()
        }
    }

    pub fn policy(&self) -> ZoomThresholdPolicy {
        ZoomThresholdPolicy {
            radius_px: self.radius,
            unclustered_zoom: self.unclustered_zoom,
        }
    }

    /// Viewports to replay, in order
    pub fn viewports(&self, config: &Config) -> Vec<Viewport> {
        if self.views.is_empty() {
            return vec![config.initial_viewport()];
        }
        self.views
            .iter()
            .map(|view| {
                Viewport::around(view.lat, view.lon, view.zoom, self.screen, config.tile_size)
            })
            .collect()
    }
}

fn parse_view(value: &str) -> Result<ViewArg, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [lat, lon, zoom] = parts.as_slice() else {
        return Err(format!("expected LAT,LON,ZOOM, got '{value}'"));
    };
    let number = |text: &str| {
        text.parse::<f64>()
            .map_err(|e| format!("invalid number '{text}': {e}"))
    };
    Ok(ViewArg {
        lat: number(lat)?,
        lon: number(lon)?,
        zoom: number(zoom)?,
    })
}

fn parse_screen(value: &str) -> Result<(f64, f64), String> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: f64 = width.parse().map_err(|e| format!("invalid width: {e}"))?;
    let height: f64 = height.parse().map_err(|e| format!("invalid height: {e}"))?;
    Ok((width, height))
}

fn parse_provider(value: &str) -> Result<TileProvider, String> {
    TileProvider::from_name(value).ok_or_else(|| {
        let names: Vec<&str> = TileProvider::all().iter().map(TileProvider::name).collect();
        let names = names.join(", ");
        format!("unknown provider '{value}', expected one of: {names}")
    })
}

//! Argument model for the `tileview` binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use foundation::ScaleKind;
use layers::raster::{HeatmapConfig, HeatmapLayer};
use layers::symbology::TileImage;
use layers::{HasParams, HasTimeRange, HasTopics, LayerMeta, TileLayer, TimeRange};
use serde_json::Value;
use streaming::{TileCoord, TileRequestKey};

#[derive(Debug, Parser)]
#[command(name = "tileview", about = "Fetch, key and render aggregate map tiles")]
pub struct Cli {
    /// Page URL the tile channel address is derived from.
    #[arg(long, default_value = "http://localhost:8080/batch")]
    pub origin: String,

    /// Base URL serving tile payloads over HTTP.
    #[arg(long)]
    pub tile_base: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the request key for a tile without contacting the server.
    Key(TileArgs),
    /// Render a heatmap tile to PNG.
    Heatmap(HeatmapArgs),
    /// Lay out a word-cloud tile.
    Wordcloud(LabelArgs),
    /// Lay out a topic-frequency tile.
    Topics(TopicArgs),
}

#[derive(Debug, Args)]
pub struct TileArgs {
    #[arg(long)]
    pub endpoint: String,

    #[arg(long)]
    pub index: String,

    /// Request type; each subcommand has its own default.
    #[arg(long = "type")]
    pub tile_type: Option<String>,

    #[arg(short, long)]
    pub z: u8,

    /// Column, wrapped into range at zoom `z`.
    #[arg(short, long, allow_negative_numbers = true)]
    pub x: i64,

    /// Row, wrapped into range at zoom `z`.
    #[arg(short, long, allow_negative_numbers = true)]
    pub y: i64,

    /// Extra request parameter as `name=value`; repeatable.
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    #[arg(long)]
    pub from: Option<i64>,

    #[arg(long)]
    pub to: Option<i64>,

    #[arg(long, value_delimiter = ',')]
    pub topics: Vec<String>,
}

#[derive(Debug, Args)]
pub struct HeatmapArgs {
    #[command(flatten)]
    pub tile: TileArgs,

    #[arg(long, default_value_t = 64)]
    pub resolution: u32,

    #[arg(long, default_value = "log")]
    pub scale: ScaleKind,

    #[arg(long, default_value_t = 256)]
    pub tile_size: u32,

    #[arg(short, long)]
    pub out: PathBuf,
}

#[derive(Debug, Args)]
pub struct LabelArgs {
    #[command(flatten)]
    pub tile: TileArgs,

    #[arg(long)]
    pub highlight: Option<String>,

    /// Emit the HTML fragment instead of JSON.
    #[arg(long)]
    pub html: bool,
}

#[derive(Debug, Args)]
pub struct TopicArgs {
    #[command(flatten)]
    pub label: LabelArgs,

    /// Time bucket interval, e.g. `day` or `week`.
    #[arg(long)]
    pub interval: Option<String>,
}

/// Parse `name=value`. Values that read as JSON scalars keep their type;
/// anything else is a string.
pub fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    let value = match serde_json::from_str::<Value>(value) {
        Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
        _ => Value::String(value.to_string()),
    };
    Ok((name.to_string(), value))
}

impl TileArgs {
    pub fn coord(&self) -> TileCoord {
        TileCoord::wrapped(self.x, self.y, self.z)
    }

    pub fn meta(&self, default_type: &str) -> LayerMeta {
        LayerMeta::new(
            self.endpoint.clone(),
            self.index.clone(),
            self.tile_type.clone().unwrap_or_else(|| default_type.to_string()),
        )
    }

    /// Copy the parameter flags onto `layer`.
    pub fn apply<L: HasTimeRange + HasTopics>(&self, layer: &mut L) {
        for (name, value) in &self.params {
            layer.layer_state_mut().set_param(name, value.clone());
        }
        if self.from.is_some() || self.to.is_some() {
            layer.set_time_range(TimeRange {
                from: self.from,
                to: self.to,
            });
        }
        if !self.topics.is_empty() {
            layer.set_topics(&self.topics);
        }
    }

    pub fn request_key(&self, default_type: &str) -> TileRequestKey {
        let mut layer = HeatmapLayer::new(0, self.meta(default_type), HeatmapConfig::default());
        self.apply(&mut layer);
        TileRequestKey::for_request(&layer.tile_request(self.coord()))
    }
}

pub fn to_png_buffer(tile: TileImage) -> Result<image::RgbaImage> {
    let (width, height) = (tile.width(), tile.height());
    image::RgbaImage::from_raw(width, height, tile.into_raw())
        .with_context(|| format!("pixel buffer does not match {width}x{height}"))
}

//! Stacked per-topic frequency charts: one row per topic with a bar per time
//! bucket and a label sized by the topic's total.

use std::collections::BTreeMap;

use foundation::{Extrema, ScaleKind, normalize, percent_bucket};
use serde::{Deserialize, Serialize};
use streaming::{FetchedTile, TileCoord, TileData, TileSource};
use tracing::{debug, warn};

use crate::capabilities::*;
use crate::error::LayerError;
use crate::labels::escape_html;
use crate::layer::{Layer, LayerId, LayerMeta, RenderOutcome, TileLayer, fetch_tile};
use crate::state::{DrawnTiles, ExtremaPolicy, LayerState, Observation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicFrequencyConfig {
    pub tile_size: f64,
    pub max_topics: usize,
    pub min_font_size: f64,
    pub max_font_size: f64,
    pub scale: ScaleKind,
    pub min_bar_px: f64,
    pub policy: ExtremaPolicy,
}

impl Default for TopicFrequencyConfig {
    fn default() -> Self {
        Self {
            tile_size: 256.0,
            max_topics: 8,
            min_font_size: 16.0,
            max_font_size: 22.0,
            scale: ScaleKind::Log,
            min_bar_px: 3.0,
            policy: ExtremaPolicy::Redraw,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum BarHeight {
    /// Share of the row height.
    Percent(f64),
    /// Floor applied when the share would be thinner than this many pixels.
    Pixels(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicBar {
    pub count: f64,
    /// Count relative to the row's largest bucket, in percent.
    pub relative: f64,
    pub percent: u32,
    pub visible: bool,
    pub height: BarHeight,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicEntry {
    pub topic: String,
    pub total: f64,
    pub max: f64,
    /// Row height, also the label font size.
    pub height: f64,
    pub percent: u32,
    pub bars: Vec<TopicBar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicFrequencyLayout {
    /// Offset of the block from the tile top so it sits vertically centred.
    pub top: f64,
    pub total_height: f64,
    pub entries: Vec<TopicEntry>,
}

fn topic_totals(frequencies: &BTreeMap<String, Vec<f64>>) -> Vec<f64> {
    frequencies.values().map(|counts| counts.iter().sum()).collect()
}

pub fn layout_topic_frequency(
    frequencies: &BTreeMap<String, Vec<f64>>,
    extrema: Extrema,
    config: &TopicFrequencyConfig,
) -> TopicFrequencyLayout {
    let mut rows: Vec<(&String, &Vec<f64>, f64)> = frequencies
        .iter()
        .map(|(topic, counts)| (topic, counts, counts.iter().sum()))
        .collect();
    rows.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(b.0)));
    rows.truncate(config.max_topics);

    let mut total_height = 0.0;
    let entries: Vec<TopicEntry> = rows
        .into_iter()
        .map(|(topic, counts, total)| {
            let t = normalize(total, extrema, config.scale);
            let height = config.min_font_size + t * (config.max_font_size - config.min_font_size);
            total_height += height;
            let max = counts.iter().copied().fold(0.0, f64::max);
            let bars = counts
                .iter()
                .map(|&count| {
                    let relative = if max != 0.0 { count / max * 100.0 } else { 0.0 };
                    let bar_height = if relative / 100.0 * height < config.min_bar_px {
                        BarHeight::Pixels(config.min_bar_px)
                    } else {
                        BarHeight::Percent(relative)
                    };
                    TopicBar {
                        count,
                        relative,
                        percent: percent_bucket(relative / 100.0),
                        visible: relative != 0.0,
                        height: bar_height,
                    }
                })
                .collect();
            TopicEntry {
                topic: topic.clone(),
                total,
                max,
                height,
                percent: percent_bucket(t),
                bars,
            }
        })
        .collect();

    TopicFrequencyLayout {
        top: config.tile_size / 2.0 - total_height / 2.0,
        total_height,
        entries,
    }
}

pub fn render_topic_frequency_html(layout: &TopicFrequencyLayout, highlight: Option<&str>) -> String {
    let mut html = String::new();
    html.push_str(&format!(
        r#"<div class="topic-frequencies" style="display:inline-block;top:{}px">"#,
        layout.top
    ));
    for entry in &layout.entries {
        let topic = escape_html(&entry.topic);
        let highlight_class = if highlight == Some(entry.topic.as_str()) { " highlight" } else { "" };
        html.push_str(&format!(
            r#"<div class="topic-frequency-entry{highlight_class}" data-word="{topic}" style="height:{}px"><div class="topic-frequency-left" data-word="{topic}">"#,
            entry.height
        ));
        let width = 100.0 / entry.bars.len().max(1) as f64;
        for bar in &entry.bars {
            let (height, top) = match bar.height {
                BarHeight::Pixels(px) => (format!("{px}px"), format!("calc(100% - {px}px)")),
                BarHeight::Percent(p) => (format!("{p}%"), format!("{}%", 100.0 - p)),
            };
            let visibility = if bar.visible { "" } else { "hidden" };
            html.push_str(&format!(
                r#"<div class="topic-frequency-bar topic-frequency-bar-{}" data-word="{topic}" style="visibility:{visibility};width:calc({width}% - 2px);height:{height};top:{top}"></div>"#,
                bar.percent
            ));
        }
        html.push_str(&format!(
            r#"</div><div class="topic-frequency-right"><div class="topic-frequency-label topic-frequency-label-{}" data-word="{topic}" style="font-size:{h}px;line-height:{h}px;height:{h}px">{topic}</div></div></div>"#,
            entry.percent,
            h = entry.height
        ));
    }
    html.push_str("</div>");
    html
}

/// Per-tile topic frequency charts.
#[derive(Debug, Clone)]
pub struct TopicFrequencyLayer {
    id: LayerId,
    meta: LayerMeta,
    state: LayerState,
    highlight: Option<String>,
    pub config: TopicFrequencyConfig,
    drawn: DrawnTiles<BTreeMap<String, Vec<f64>>>,
}

impl TopicFrequencyLayer {
    pub fn new(id: u64, meta: LayerMeta, config: TopicFrequencyConfig) -> Self {
        Self {
            id: LayerId(id),
            meta,
            state: LayerState::new(),
            highlight: None,
            config,
            drawn: DrawnTiles::new(),
        }
    }

    pub fn highlight(&self) -> Option<&str> {
        self.highlight.as_deref()
    }

    pub fn set_highlight(&mut self, topic: Option<String>) {
        self.highlight = topic;
    }

    pub fn on_zoom(&mut self) {
        self.highlight = None;
    }

    pub async fn draw(&mut self, source: &TileSource, coord: TileCoord) -> RenderOutcome<TopicFrequencyLayout> {
        let Some(tile) = fetch_tile(&*self, source, coord).await else {
            return RenderOutcome::Blank;
        };
        self.render(coord, &tile).unwrap_or_else(|err| {
            warn!(layer = self.id.0, x = coord.x, y = coord.y, z = coord.z, %err, "topic frequency tile not drawn");
            RenderOutcome::Blank
        })
    }

    pub fn render(
        &mut self,
        coord: TileCoord,
        tile: &FetchedTile,
    ) -> Result<RenderOutcome<TopicFrequencyLayout>, LayerError> {
        let frequencies = match &tile.data {
            TileData::Frequencies(f) if !f.is_empty() => f,
            TileData::Frequencies(_) | TileData::Empty => return Ok(RenderOutcome::Blank),
            _ => return Err(LayerError::UnexpectedData { expected: "topic frequencies" }),
        };

        let mut observed = Extrema::of(&topic_totals(frequencies)).unwrap_or(Extrema::EMPTY);
        if let Some(reported) = tile.extrema {
            observed.widen(reported);
        }

        self.drawn.sync(self.state.generation());
        let invalidated = match self.state.observe(observed, self.config.policy) {
            Observation::Unchanged => Vec::new(),
            Observation::Widened => self.drawn.others(coord),
            Observation::Abort => {
                debug!(layer = self.id.0, "extrema widened; topic chart abandoned");
                return Ok(RenderOutcome::Aborted);
            }
        };

        let layout = layout_topic_frequency(frequencies, self.state.extrema(), &self.config);
        self.drawn.insert(coord, frequencies.clone());
        Ok(RenderOutcome::Drawn {
            output: layout,
            invalidated,
        })
    }

    pub fn redraw(&mut self, coord: TileCoord) -> Option<TopicFrequencyLayout> {
        self.drawn.sync(self.state.generation());
        let frequencies = self.drawn.get(&coord)?;
        Some(layout_topic_frequency(frequencies, self.state.extrema(), &self.config))
    }

    pub fn unload(&mut self, coord: TileCoord) {
        self.drawn.remove(&coord);
    }

    pub fn to_html(&self, layout: &TopicFrequencyLayout) -> String {
        render_topic_frequency_html(layout, self.highlight())
    }
}

impl Layer for TopicFrequencyLayer {
    fn id(&self) -> LayerId {
        self.id
    }
}

impl HasParams for TopicFrequencyLayer {
    fn layer_state(&self) -> &LayerState {
        &self.state
    }

    fn layer_state_mut(&mut self) -> &mut LayerState {
        &mut self.state
    }
}

impl TileLayer for TopicFrequencyLayer {
    fn meta(&self) -> &LayerMeta {
        &self.meta
    }
}

impl HasExtrema for TopicFrequencyLayer {}
impl HasTiling for TopicFrequencyLayer {}
impl HasTimeRange for TopicFrequencyLayer {}
impl HasTimeBucket for TopicFrequencyLayer {}
impl HasTopics for TopicFrequencyLayer {}

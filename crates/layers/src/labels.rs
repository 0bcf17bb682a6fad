//! Word-cloud layout for per-tile term counts.
//!
//! Words are sized by count, measured, then placed one at a time along an
//! Archimedean spiral from the tile centre until a spot clear of earlier words
//! and inside the tile's inset bounding box turns up. Coordinates are
//! tile-local with the tile centre as origin.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use foundation::{CenteredBox, Extrema, ScaleKind, normalize, percent_bucket};
use serde::{Deserialize, Serialize};
use streaming::{FetchedTile, TileCoord, TileData, TileSource};
use tracing::{debug, trace, warn};

use crate::capabilities::*;
use crate::error::LayerError;
use crate::layer::{Layer, LayerId, LayerMeta, RenderOutcome, TileLayer, fetch_tile};
use crate::state::{DrawnTiles, ExtremaPolicy, LayerState, Observation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordCloudConfig {
    pub tile_size: f64,
    pub horizontal_offset: f64,
    pub vertical_offset: f64,
    pub max_words: usize,
    pub min_font_size: f64,
    pub max_font_size: f64,
    pub scale: ScaleKind,
    /// Boundary hits a word may take before it is dropped.
    pub max_collisions: u32,
    pub start_radius: f64,
    pub radius_increment: f64,
    pub arc_length: f64,
    pub policy: ExtremaPolicy,
}

impl Default for WordCloudConfig {
    fn default() -> Self {
        Self {
            tile_size: 256.0,
            horizontal_offset: 10.0,
            vertical_offset: 24.0,
            max_words: 15,
            min_font_size: 10.0,
            max_font_size: 20.0,
            scale: ScaleKind::Log,
            max_collisions: 1,
            start_radius: 1.0,
            radius_increment: 5.0,
            arc_length: 10.0,
            policy: ExtremaPolicy::Redraw,
        }
    }
}

impl WordCloudConfig {
    /// Region words must fit inside, centred on the tile.
    pub fn bounding_box(&self) -> CenteredBox {
        CenteredBox::new(
            0.0,
            0.0,
            self.tile_size - self.horizontal_offset * 2.0,
            self.tile_size - self.vertical_offset * 2.0,
        )
    }
}

/// Measures rendered label text.
pub trait TextMeasurer {
    /// `(width, height)` in pixels of `text` at `font_size`.
    fn measure(&self, text: &str, font_size: f64) -> (f64, f64);
}

/// Fixed-advance approximation for when no text engine is around.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EstimatedMeasurer {
    pub advance: f64,
    pub line_height: f64,
}

impl Default for EstimatedMeasurer {
    fn default() -> Self {
        Self {
            advance: 0.6,
            line_height: 1.0,
        }
    }
}

impl TextMeasurer for EstimatedMeasurer {
    fn measure(&self, text: &str, font_size: f64) -> (f64, f64) {
        let count = text.chars().count().max(1) as f64;
        (font_size * self.advance * count, font_size * self.line_height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordBox {
    pub text: String,
    pub count: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    /// Count normalised into `[0, 1]` against the layer extrema.
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedWord {
    pub text: String,
    pub count: f64,
    pub font_size: f64,
    /// `percent` rounded to the nearest 10, for styling.
    pub percent: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PlacedWord {
    pub fn bounds(&self) -> CenteredBox {
        CenteredBox::new(self.x, self.y, self.width, self.height)
    }
}

/// Top `max_words` by count (ties by text), sized and measured.
pub fn measure_words<M: TextMeasurer + ?Sized>(
    counts: &BTreeMap<String, f64>,
    extrema: Extrema,
    config: &WordCloudConfig,
    measurer: &M,
) -> Vec<WordBox> {
    let mut ranked: Vec<(&String, f64)> = counts.iter().map(|(t, c)| (t, *c)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(config.max_words);

    ranked
        .into_iter()
        .map(|(text, count)| {
            let percent = normalize(count, extrema, config.scale);
            let font_size = config.min_font_size + percent * (config.max_font_size - config.min_font_size);
            let (width, height) = measurer.measure(text, font_size);
            WordBox {
                text: text.clone(),
                count,
                width,
                height,
                font_size,
                percent,
            }
        })
        .collect()
}

struct Spiral {
    radius: f64,
    radius_increment: f64,
    arc_length: f64,
    t: f64,
    x: f64,
    y: f64,
    collisions: u32,
}

impl Spiral {
    fn new(config: &WordCloudConfig) -> Self {
        Self {
            radius: config.start_radius.max(f64::EPSILON),
            radius_increment: config.radius_increment.max(f64::EPSILON),
            arc_length: config.arc_length.max(f64::EPSILON),
            t: 0.0,
            x: 0.0,
            y: 0.0,
            collisions: 0,
        }
    }

    /// Advance one arc step; a full turn pushes the radius out.
    fn step(&mut self) {
        let circumference = TAU * self.radius;
        let inc = self.arc_length.min(circumference / 10.0);
        let mut t = self.t + inc / self.radius;
        if t > TAU {
            t %= TAU;
            self.radius += self.radius_increment;
        }
        self.t = t;
        self.x = self.radius * t.cos();
        self.y = self.radius * t.sin();
    }

    /// True if `word` at the current position hits a placed word or leaves `bounds`.
    fn blocked(&mut self, word: &WordBox, placed: &[PlacedWord], bounds: &CenteredBox) -> bool {
        let candidate = CenteredBox::new(self.x, self.y, word.width, word.height);
        if placed.iter().any(|p| candidate.intersects(&p.bounds())) {
            return true;
        }
        if candidate.exceeds(bounds) {
            self.collisions += 1;
            self.arc_length = self.radius;
            return true;
        }
        false
    }
}

/// Place measured words in order. Words that exhaust the collision budget are dropped.
pub fn pack_words(words: &[WordBox], config: &WordCloudConfig) -> Vec<PlacedWord> {
    let bounds = config.bounding_box();
    let mut placed: Vec<PlacedWord> = Vec::with_capacity(words.len());

    for word in words {
        let mut spiral = Spiral::new(config);
        let mut position = None;
        while spiral.collisions < config.max_collisions {
            spiral.step();
            if !spiral.blocked(word, &placed, &bounds) {
                position = Some((spiral.x, spiral.y));
                break;
            }
        }
        match position {
            Some((x, y)) => placed.push(PlacedWord {
                text: word.text.clone(),
                count: word.count,
                font_size: word.font_size,
                percent: percent_bucket(word.percent),
                x,
                y,
                width: word.width,
                height: word.height,
            }),
            None => trace!(word = %word.text, "no room in word cloud; dropped"),
        }
    }
    placed
}

/// Measure and pack in one go.
pub fn word_cloud<M: TextMeasurer + ?Sized>(
    counts: &BTreeMap<String, f64>,
    extrema: Extrema,
    config: &WordCloudConfig,
    measurer: &M,
) -> Vec<PlacedWord> {
    if counts.is_empty() {
        return Vec::new();
    }
    let words = measure_words(counts, extrema, config, measurer);
    pack_words(&words, config)
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Absolutely positioned label divs for one tile.
pub fn render_word_cloud_html(words: &[PlacedWord], tile_size: f64, highlight: Option<&str>) -> String {
    let half = tile_size / 2.0;
    let mut html = String::new();
    for word in words {
        let mut class = format!("word-cloud-label word-cloud-label-{}", word.percent);
        if highlight == Some(word.text.as_str()) {
            class.push_str(" highlight");
        }
        let text = escape_html(&word.text);
        html.push_str(&format!(
            r#"<div class="{class}" style="font-size:{}px;left:{}px;top:{}px;width:{}px;height:{}px" data-word="{text}">{text}</div>"#,
            word.font_size,
            half + word.x - word.width / 2.0,
            half + word.y - word.height / 2.0,
            word.width,
            word.height,
        ));
    }
    html
}

/// Per-tile word clouds of term counts.
pub struct WordCloudLayer<M: TextMeasurer = EstimatedMeasurer> {
    id: LayerId,
    meta: LayerMeta,
    state: LayerState,
    measurer: M,
    highlight: Option<String>,
    pub config: WordCloudConfig,
    drawn: DrawnTiles<BTreeMap<String, f64>>,
}

impl WordCloudLayer<EstimatedMeasurer> {
    pub fn new(id: u64, meta: LayerMeta, config: WordCloudConfig) -> Self {
        Self::with_measurer(id, meta, config, EstimatedMeasurer::default())
    }
}

impl<M: TextMeasurer> WordCloudLayer<M> {
    pub fn with_measurer(id: u64, meta: LayerMeta, config: WordCloudConfig, measurer: M) -> Self {
        Self {
            id: LayerId(id),
            meta,
            state: LayerState::new(),
            measurer,
            highlight: None,
            config,
            drawn: DrawnTiles::new(),
        }
    }

    pub fn highlight(&self) -> Option<&str> {
        self.highlight.as_deref()
    }

    pub fn set_highlight(&mut self, word: Option<String>) {
        self.highlight = word;
    }

    /// Zoom changes drop the highlighted word.
    pub fn on_zoom(&mut self) {
        self.highlight = None;
    }

    pub async fn draw(&mut self, source: &TileSource, coord: TileCoord) -> RenderOutcome<Vec<PlacedWord>> {
        let Some(tile) = fetch_tile(&*self, source, coord).await else {
            return RenderOutcome::Blank;
        };
        self.render(coord, &tile).unwrap_or_else(|err| {
            warn!(layer = self.id.0, x = coord.x, y = coord.y, z = coord.z, %err, "word cloud tile not drawn");
            RenderOutcome::Blank
        })
    }

    pub fn render(&mut self, coord: TileCoord, tile: &FetchedTile) -> Result<RenderOutcome<Vec<PlacedWord>>, LayerError> {
        let counts = match &tile.data {
            TileData::Counts(counts) if !counts.is_empty() => counts,
            TileData::Counts(_) | TileData::Empty => return Ok(RenderOutcome::Blank),
            _ => return Err(LayerError::UnexpectedData { expected: "term counts" }),
        };

        let values: Vec<f64> = counts.values().copied().collect();
        let mut observed = Extrema::of(&values).unwrap_or(Extrema::EMPTY);
        if let Some(reported) = tile.extrema {
            observed.widen(reported);
        }

        self.drawn.sync(self.state.generation());
        let invalidated = match self.state.observe(observed, self.config.policy) {
            Observation::Unchanged => Vec::new(),
            Observation::Widened => self.drawn.others(coord),
            Observation::Abort => {
                debug!(layer = self.id.0, "extrema widened; word cloud abandoned");
                return Ok(RenderOutcome::Aborted);
            }
        };

        let words = word_cloud(counts, self.state.extrema(), &self.config, &self.measurer);
        if words.len() < counts.len().min(self.config.max_words) {
            debug!(
                layer = self.id.0,
                placed = words.len(),
                offered = counts.len().min(self.config.max_words),
                "word cloud dropped words"
            );
        }
        self.drawn.insert(coord, counts.clone());
        Ok(RenderOutcome::Drawn {
            output: words,
            invalidated,
        })
    }

    /// Re-layout a previously drawn tile against the current extrema.
    pub fn redraw(&mut self, coord: TileCoord) -> Option<Vec<PlacedWord>> {
        self.drawn.sync(self.state.generation());
        let counts = self.drawn.get(&coord)?;
        Some(word_cloud(counts, self.state.extrema(), &self.config, &self.measurer))
    }

    pub fn unload(&mut self, coord: TileCoord) {
        self.drawn.remove(&coord);
    }

    pub fn to_html(&self, words: &[PlacedWord]) -> String {
        render_word_cloud_html(words, self.config.tile_size, self.highlight())
    }
}

impl<M: TextMeasurer> Layer for WordCloudLayer<M> {
    fn id(&self) -> LayerId {
        self.id
    }
}

impl<M: TextMeasurer> HasParams for WordCloudLayer<M> {
    fn layer_state(&self) -> &LayerState {
        &self.state
    }

    fn layer_state_mut(&mut self) -> &mut LayerState {
        &mut self.state
    }
}

impl<M: TextMeasurer> TileLayer for WordCloudLayer<M> {
    fn meta(&self) -> &LayerMeta {
        &self.meta
    }
}

impl<M: TextMeasurer> HasExtrema for WordCloudLayer<M> {}
impl<M: TextMeasurer> HasTiling for WordCloudLayer<M> {}
impl<M: TextMeasurer> HasTimeRange for WordCloudLayer<M> {}
impl<M: TextMeasurer> HasTopics for WordCloudLayer<M> {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn counts(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(t, c)| (t.to_string(), *c)).collect()
    }

    fn assert_valid_layout(words: &[PlacedWord], config: &WordCloudConfig) {
        let bounds = config.bounding_box();
        for (i, a) in words.iter().enumerate() {
            assert!(!a.bounds().exceeds(&bounds), "{} leaves the tile", a.text);
            for b in &words[i + 1..] {
                assert!(!a.bounds().intersects(&b.bounds()), "{} overlaps {}", a.text, b.text);
            }
        }
    }

    #[test]
    fn words_are_ranked_and_truncated() {
        let config = WordCloudConfig {
            max_words: 3,
            ..WordCloudConfig::default()
        };
        let c = counts(&[("d", 1.0), ("b", 5.0), ("a", 5.0), ("c", 9.0), ("e", 2.0)]);
        let words = measure_words(&c, Extrema::new(1.0, 9.0), &config, &EstimatedMeasurer::default());
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["c", "a", "b"]);
        assert_eq!(words[0].font_size, 20.0);
        assert_eq!(words[0].percent, 1.0);
    }

    #[test]
    fn font_size_follows_log_scale() {
        let config = WordCloudConfig::default();
        let c = counts(&[("low", 1.0), ("mid", 10.0), ("high", 100.0)]);
        let words = measure_words(&c, Extrema::new(1.0, 100.0), &config, &EstimatedMeasurer::default());
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "mid", "low"]);
        for (word, size) in words.iter().zip([20.0, 15.0, 10.0]) {
            assert!((word.font_size - size).abs() < 1e-9, "{} sized {}", word.text, word.font_size);
        }
        assert!((words[1].width - 27.0).abs() < 1e-9);
        assert!((words[1].height - 15.0).abs() < 1e-9);
    }

    #[test]
    fn first_word_lands_on_first_spiral_step() {
        let config = WordCloudConfig::default();
        let c = counts(&[("solo", 4.0)]);
        let cloud = word_cloud(&c, Extrema::new(1.0, 4.0), &config, &EstimatedMeasurer::default());
        assert_eq!(cloud.len(), 1);
        let step = TAU / 10.0;
        assert!((cloud[0].x - step.cos()).abs() < 1e-9);
        assert!((cloud[0].y - step.sin()).abs() < 1e-9);
        assert_eq!(cloud[0].percent, 100);
    }

    #[test]
    fn small_sets_are_fully_placed() {
        let config = WordCloudConfig::default();
        let c = counts(&[("rust", 40.0), ("tile", 25.0), ("cloud", 12.0), ("map", 3.0), ("zoom", 1.0)]);
        let cloud = word_cloud(&c, Extrema::new(1.0, 40.0), &config, &EstimatedMeasurer::default());
        assert_eq!(cloud.len(), 5);
        assert_valid_layout(&cloud, &config);
    }

    #[test]
    fn oversized_words_are_dropped() {
        let config = WordCloudConfig::default();
        let long = "x".repeat(60);
        let c = counts(&[(long.as_str(), 10.0), ("fits", 1.0)]);
        let cloud = word_cloud(&c, Extrema::new(1.0, 10.0), &config, &EstimatedMeasurer::default());
        let texts: Vec<&str> = cloud.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["fits"]);
    }

    #[test]
    fn zero_budget_places_nothing() {
        let config = WordCloudConfig {
            max_collisions: 0,
            ..WordCloudConfig::default()
        };
        let c = counts(&[("a", 1.0)]);
        assert!(word_cloud(&c, Extrema::new(1.0, 1.0), &config, &EstimatedMeasurer::default()).is_empty());
    }

    #[test]
    fn random_clouds_never_overlap() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for budget in [1, 4] {
            let config = WordCloudConfig {
                max_collisions: budget,
                ..WordCloudConfig::default()
            };
            for _ in 0..40 {
                let n = rng.gen_range(1..30);
                let mut c = BTreeMap::new();
                for i in 0..n {
                    let len = rng.gen_range(1..14);
                    let word: String = (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
                    c.insert(format!("{word}{i}"), rng.gen_range(1.0..500.0));
                }
                let values: Vec<f64> = c.values().copied().collect();
                let extrema = Extrema::of(&values).expect("non-empty");
                let cloud = word_cloud(&c, extrema, &config, &EstimatedMeasurer::default());
                assert!(cloud.len() <= config.max_words);
                assert_valid_layout(&cloud, &config);
            }
        }
    }

    fn random_box(rng: &mut StdRng, i: usize, font: std::ops::Range<f64>, chars: std::ops::Range<usize>) -> WordBox {
        let font_size = rng.gen_range(font);
        let len = rng.gen_range(chars);
        let (width, height) = EstimatedMeasurer::default().measure(&"w".repeat(len), font_size);
        WordBox {
            text: format!("w{i}"),
            count: 1.0,
            width,
            height,
            font_size,
            percent: rng.gen_range(0.0..=1.0),
        }
    }

    #[test]
    fn sparse_sets_are_fully_placed() {
        let config = WordCloudConfig::default();
        let budget = config.bounding_box().area() * 0.2;
        let mut rng = StdRng::seed_from_u64(0x5ba5e);
        for _ in 0..200 {
            let n = rng.gen_range(2..20);
            let mut words = Vec::new();
            let mut area = 0.0;
            for i in 0..n {
                let word = random_box(&mut rng, i, 10.0..20.0, 2..10);
                if area + word.width * word.height > budget {
                    break;
                }
                area += word.width * word.height;
                words.push(word);
            }
            let placed = pack_words(&words, &config);
            assert_eq!(placed.len(), words.len(), "area {area} of {budget}");
            assert_valid_layout(&placed, &config);
        }
    }

    #[test]
    fn crowded_sets_drop_words_without_overlap() {
        let config = WordCloudConfig {
            max_collisions: 4,
            ..WordCloudConfig::default()
        };
        let capacity = config.bounding_box().area();
        let mut rng = StdRng::seed_from_u64(0xc0ffee);
        for _ in 0..20 {
            let mut words = Vec::new();
            let mut area = 0.0;
            while area <= capacity * 1.2 {
                let word = random_box(&mut rng, words.len(), 14.0..24.0, 3..8);
                area += word.width * word.height;
                words.push(word);
            }
            let placed = pack_words(&words, &config);
            assert!(placed.len() < words.len());
            assert_valid_layout(&placed, &config);
        }
    }

    #[test]
    fn html_marks_highlight_and_escapes() {
        let words = vec![
            PlacedWord {
                text: "a<b".into(),
                count: 3.0,
                font_size: 12.0,
                percent: 40,
                x: 0.0,
                y: 0.0,
                width: 20.0,
                height: 12.0,
            },
            PlacedWord {
                text: "rust".into(),
                count: 9.0,
                font_size: 20.0,
                percent: 100,
                x: 10.0,
                y: -20.0,
                width: 48.0,
                height: 20.0,
            },
        ];
        let html = render_word_cloud_html(&words, 256.0, Some("rust"));
        assert_eq!(
            html,
            concat!(
                r#"<div class="word-cloud-label word-cloud-label-40" style="font-size:12px;left:118px;top:122px;width:20px;height:12px" data-word="a&lt;b">a&lt;b</div>"#,
                r#"<div class="word-cloud-label word-cloud-label-100 highlight" style="font-size:20px;left:114px;top:98px;width:48px;height:20px" data-word="rust">rust</div>"#,
            )
        );
    }

    #[test]
    fn layer_tracks_extrema_and_redraws() {
        let mut layer = WordCloudLayer::new(3, LayerMeta::new("e", "i", "topiccount"), WordCloudConfig::default());
        layer.set_topics(["Rust"]);
        let a = TileCoord::new(0, 0, 1);
        let b = TileCoord::new(1, 0, 1);
        let tile = |pairs: &[(&str, f64)]| FetchedTile {
            data: TileData::Counts(counts(pairs)),
            extrema: None,
        };

        let first = layer.render(a, &tile(&[("rust", 10.0), ("go", 2.0)])).expect("render");
        assert_eq!(first.output().map(Vec::len), Some(2));
        let second = layer.render(b, &tile(&[("rust", 50.0)])).expect("render");
        assert_eq!(second.invalidated(), &[a]);
        assert_eq!(layer.extrema(), Extrema::new(2.0, 50.0));

        let redrawn = layer.redraw(a).expect("cached");
        assert!(redrawn[0].font_size < 20.0);

        layer.set_highlight(Some("rust".into()));
        assert!(layer.to_html(&redrawn).contains("highlight"));
        layer.on_zoom();
        assert!(!layer.to_html(&redrawn).contains("highlight"));
    }
}

use foundation::{Extrema, ScaleKind, normalize};
use serde::{Deserialize, Serialize};

use crate::error::LayerError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT_WHITE: Rgba = Rgba::new(255, 255, 255, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Two-stop colour ramp.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRamp {
    pub from: Rgba,
    pub to: Rgba,
}

impl ColorRamp {
    pub const DEFAULT_FROM: Rgba = Rgba::new(150, 0, 0, 150);
    pub const DEFAULT_TO: Rgba = Rgba::new(255, 255, 50, 255);

    /// Replace whichever endpoints `update` carries. Returns true if either changed.
    pub fn apply(&mut self, update: ColorRampUpdate) -> bool {
        let before = *self;
        if let Some(from) = update.from {
            self.from = from;
        }
        if let Some(to) = update.to {
            self.to = to;
        }
        *self != before
    }
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self {
            from: Self::DEFAULT_FROM,
            to: Self::DEFAULT_TO,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRampUpdate {
    #[serde(default)]
    pub from: Option<Rgba>,
    #[serde(default)]
    pub to: Option<Rgba>,
}

fn blend(from: u8, to: u8, t: f64) -> u8 {
    let v = f64::from(to) * t + f64::from(from) * (1.0 - t);
    v.round().clamp(0.0, 255.0) as u8
}

/// Colour for one bin value. Zero is fully transparent.
pub fn color_for(value: f64, extrema: Extrema, ramp: &ColorRamp, scale: ScaleKind) -> Rgba {
    if value == 0.0 {
        return Rgba::TRANSPARENT_WHITE;
    }
    let t = normalize(value, extrema, scale);
    Rgba::new(
        blend(ramp.from.r, ramp.to.r, t),
        blend(ramp.from.g, ramp.to.g, t),
        blend(ramp.from.b, ramp.to.b, t),
        blend(ramp.from.a, ramp.to.a, t),
    )
}

/// Row-major RGBA8 pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TileImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        let i = self.offset(x, y);
        Rgba::new(self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3])
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgba) {
        let i = self.offset(x, y);
        self.pixels[i..i + 4].copy_from_slice(&color.to_array());
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.pixels
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }
}

/// Colour `resolution * resolution` row-major bins into a `resolution`-square image.
pub fn rasterize(
    bins: &[f64],
    resolution: u32,
    extrema: Extrema,
    ramp: &ColorRamp,
    scale: ScaleKind,
) -> Result<TileImage, LayerError> {
    let expected = resolution as usize * resolution as usize;
    if bins.len() != expected {
        return Err(LayerError::BinCount {
            resolution,
            expected,
            actual: bins.len(),
        });
    }
    let mut image = TileImage::new(resolution, resolution);
    for (i, bin) in bins.iter().enumerate() {
        let x = (i % resolution as usize) as u32;
        let y = (i / resolution as usize) as u32;
        image.put_pixel(x, y, color_for(*bin, extrema, ramp, scale));
    }
    Ok(image)
}

/// Nearest-neighbour resample, no smoothing.
pub fn scale_nearest(src: &TileImage, width: u32, height: u32) -> TileImage {
    if src.width == width && src.height == height {
        return src.clone();
    }
    let mut out = TileImage::new(width, height);
    if src.width == 0 || src.height == 0 {
        return out;
    }
    for y in 0..height {
        let sy = (u64::from(y) * u64::from(src.height) / u64::from(height)) as u32;
        for x in 0..width {
            let sx = (u64::from(x) * u64::from(src.width) / u64::from(width)) as u32;
            out.put_pixel(x, y, src.pixel(sx, sy));
        }
    }
    out
}

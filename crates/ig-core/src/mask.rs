use std::io::Cursor;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
use crate::request::UploadedImage;

const MASKED: Luma<u8> = Luma([255]);
const UNMASKED: Luma<u8> = Luma([0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushMode {
    Paint,
    Erase,
}

/// Per-pixel inpainting selection. Origin is the top-left corner, `x` grows
/// to the right and `y` downwards; pixel centres sit on integer coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskRaster {
    pixels: GrayImage,
}

impl MaskRaster {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::from_pixel(width, height, UNMASKED),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn is_masked(&self, x: u32, y: u32) -> bool {
        self.pixels
            .get_pixel_checked(x, y)
            .is_some_and(|p| *p == MASKED)
    }

    pub fn masked_count(&self) -> usize {
        self.pixels.pixels().filter(|p| **p == MASKED).count()
    }

    pub fn is_blank(&self) -> bool {
        !self.pixels.pixels().any(|p| *p == MASKED)
    }

    /// Sets every pixel whose centre lies within `radius` of `(cx, cy)`.
    /// Returns how many pixels actually changed.
    fn fill_disc(&mut self, cx: f32, cy: f32, radius: f32, value: Luma<u8>) -> usize {
        if self.width() == 0 || self.height() == 0 {
            return 0;
        }

        let (cx, cy, r) = (f64::from(cx), f64::from(cy), f64::from(radius));
        let max_x = f64::from(self.width() - 1);
        let max_y = f64::from(self.height() - 1);

        let x0 = (cx - r).ceil().max(0.0);
        let x1 = (cx + r).floor().min(max_x);
        let y0 = (cy - r).ceil().max(0.0);
        let y1 = (cy + r).floor().min(max_y);
        if x0 > x1 || y0 > y1 {
            return 0;
        }

        let r2 = r * r;
        let mut changed = 0;
        for py in (y0 as u32)..=(y1 as u32) {
            let dy = f64::from(py) - cy;
            for px in (x0 as u32)..=(x1 as u32) {
                let dx = f64::from(px) - cx;
                if dx * dx + dy * dy <= r2 {
                    let pixel = self.pixels.get_pixel_mut(px, py);
                    if *pixel != value {
                        *pixel = value;
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    /// Red channel carries the mask: masked pixels are opaque red, the rest
    /// transparent black.
    pub fn to_rgba(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width(), self.height(), |x, y| {
            if self.pixels.get_pixel(x, y) == &MASKED {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }
}

/// Freehand brush surface for inpainting, sized to the uploaded image.
#[derive(Debug, Clone)]
pub struct MaskEncoder {
    raster: MaskRaster,
    strokes: usize,
}

impl MaskEncoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            raster: MaskRaster::new(width, height),
            strokes: 0,
        }
    }

    pub fn for_image(image: &UploadedImage) -> Self {
        Self::new(image.width, image.height)
    }

    /// Paints or erases a disc. Repeating the same stroke is a no-op.
    /// Non-finite coordinates and negative radii are ignored.
    pub fn stroke(&mut self, x: f32, y: f32, radius: f32, mode: BrushMode) {
        if !(x.is_finite() && y.is_finite() && radius.is_finite()) || radius < 0.0 {
            log::debug!("Ignoring degenerate stroke at ({x}, {y}) radius {radius}");
            return;
        }

        let value = match mode {
            BrushMode::Paint => MASKED,
            BrushMode::Erase => UNMASKED,
        };
        let changed = self.raster.fill_disc(x, y, radius, value);
        self.strokes += 1;
        log::trace!("{mode:?} stroke at ({x}, {y}) r={radius} changed {changed} pixels");
    }

    pub fn clear(&mut self) {
        self.raster = MaskRaster::new(self.raster.width(), self.raster.height());
        self.strokes = 0;
    }

    pub fn raster(&self) -> &MaskRaster {
        &self.raster
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes
    }

    pub fn masked_pixel_count(&self) -> usize {
        self.raster.masked_count()
    }

    pub fn is_blank(&self) -> bool {
        self.raster.is_blank()
    }

    /// Encodes the raster as a PNG `data:` URL, the form the backend's
    /// `mask_image` field accepts.
    pub fn export(&self) -> image::ImageResult<String> {
        let png = self.export_png()?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
    }

    pub fn export_png(&self) -> image::ImageResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.raster.to_rgba().write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}

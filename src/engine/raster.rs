use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::command::options::{CompositeOptions, ConvertOptions, Rotation};
use crate::engine::{ImageEngine, ImageHandle};
use crate::error::{MillError, MillResult};
use crate::sniff::ImageKind;

/// In-process engine backed by the `image` crate decoders and encoders.
#[derive(Clone, Copy, Debug, Default)]
pub struct RasterEngine;

impl RasterEngine {
    /// Create a raster engine.
    pub fn new() -> Self {
        Self
    }
}

impl ImageEngine for RasterEngine {
    fn decode(&self, bytes: &[u8]) -> MillResult<Box<dyn ImageHandle>> {
        let format = image::guess_format(bytes)
            .map_err(|e| MillError::decode(format!("unrecognized image data: {e}")))?;
        let target = kind_for(format)
            .ok_or_else(|| MillError::decode(format!("unsupported source format {format:?}")))?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| MillError::decode(e.to_string()))?;
        Ok(Box::new(RasterHandle { image, target }))
    }
}

fn kind_for(format: ImageFormat) -> Option<ImageKind> {
    match format {
        ImageFormat::Jpeg => Some(ImageKind::Jpeg),
        ImageFormat::Gif => Some(ImageKind::Gif),
        ImageFormat::Png => Some(ImageKind::Png),
        ImageFormat::WebP => Some(ImageKind::Webp),
        _ => None,
    }
}

/// Working image plus the format it will re-encode into.
struct RasterHandle {
    image: DynamicImage,
    target: ImageKind,
}

impl ImageHandle for RasterHandle {
    fn convert(&mut self, opts: &ConvertOptions) -> MillResult<()> {
        if let Some(geometry) = opts.resize
            && let Some((w, h)) = geometry.target_for(self.image.width(), self.image.height())
        {
            self.image = self.image.resize_exact(w, h, FilterType::Lanczos3);
        }
        if let Some(rotation) = opts.rotate {
            self.image = match rotation {
                Rotation::Cw90 => self.image.rotate90(),
                Rotation::Cw180 => self.image.rotate180(),
                Rotation::Cw270 => self.image.rotate270(),
            };
        }
        if let Some(format) = opts.format {
            self.target = format;
        }
        Ok(())
    }

    fn composite(&mut self, opts: &CompositeOptions) -> MillResult<()> {
        let overlay = image::load_from_memory(&opts.overlay)
            .map_err(|e| MillError::decode(format!("overlay decode failed: {e}")))?;
        let mut overlay = overlay.to_rgba8();
        if let Some(percent) = opts.dissolve {
            let percent = u16::from(percent.min(100));
            for px in overlay.pixels_mut() {
                px[3] = ((u16::from(px[3]) * percent + 50) / 100) as u8;
            }
        }
        let (x, y) = opts
            .gravity
            .position(self.image.dimensions(), overlay.dimensions(), opts.offset);
        let mut base = self.image.to_rgba8();
        image::imageops::overlay(&mut base, &overlay, x, y);
        self.image = DynamicImage::ImageRgba8(base);
        Ok(())
    }

    fn encode(&self, quality: u8) -> MillResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        match self.target {
            ImageKind::Jpeg => {
                // JPEG carries no alpha channel; flatten first.
                let rgb = DynamicImage::ImageRgb8(self.image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
                rgb.write_with_encoder(encoder)
                    .map_err(|e| MillError::encode(e.to_string()))?;
            }
            ImageKind::Gif => {
                let rgba = DynamicImage::ImageRgba8(self.image.to_rgba8());
                rgba.write_to(&mut out, ImageFormat::Gif)
                    .map_err(|e| MillError::encode(e.to_string()))?;
            }
            ImageKind::Png => {
                self.image
                    .write_to(&mut out, ImageFormat::Png)
                    .map_err(|e| MillError::encode(e.to_string()))?;
            }
            ImageKind::Webp => {
                // The webp encoder in `image` is lossless and takes no quality.
                let rgba = DynamicImage::ImageRgba8(self.image.to_rgba8());
                rgba.write_to(&mut out, ImageFormat::WebP)
                    .map_err(|e| MillError::encode(e.to_string()))?;
            }
        }
        Ok(out.into_inner())
    }

    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

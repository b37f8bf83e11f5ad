//! Image transform stage: crop a raw photo down to its caption region and
//! adjust it photometrically for the OCR engine.
//!
//! Pure over bytes: nothing here touches the filesystem or the network.

use crate::defaults;
use crate::error::{OcrelayError, Result};
use crate::media::asset::MediaAsset;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Pixel margins removed before OCR.
///
/// Margins must be strictly smaller than the matching image dimension.
/// `bottom_exclusion` is a fixed band tied to one screenshot layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropSpec {
    pub top_margin: u32,
    pub right_margin: u32,
    pub bottom_exclusion: u32,
}

impl Default for CropSpec {
    fn default() -> Self {
        Self {
            top_margin: defaults::TOP_MARGIN,
            right_margin: defaults::RIGHT_MARGIN,
            bottom_exclusion: defaults::BOTTOM_EXCLUSION,
        }
    }
}

/// Effective crop rectangle inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropSpec {
    /// Compute the crop rectangle for a `width` x `height` image.
    ///
    /// # Errors
    /// `Geometry` when a margin reaches the image edge or the resulting
    /// width or height would be zero.
    pub fn rect_for(&self, width: u32, height: u32) -> Result<CropRect> {
        if self.top_margin >= height {
            return Err(OcrelayError::Geometry {
                message: format!(
                    "top margin {} >= image height {}",
                    self.top_margin, height
                ),
            });
        }
        if self.right_margin >= width {
            return Err(OcrelayError::Geometry {
                message: format!(
                    "right margin {} >= image width {}",
                    self.right_margin, width
                ),
            });
        }

        let y = self.top_margin.min(height - 1);
        let crop_width = i64::from(width) - i64::from(self.right_margin.min(width - 1));
        let crop_height = i64::from(height) - i64::from(y) - i64::from(self.bottom_exclusion);

        if crop_width <= 0 || crop_height <= 0 {
            return Err(OcrelayError::Geometry {
                message: format!(
                    "crop of {}x{} image leaves {}x{} (top {}, right {}, bottom {})",
                    width,
                    height,
                    crop_width,
                    crop_height,
                    self.top_margin,
                    self.right_margin,
                    self.bottom_exclusion
                ),
            });
        }

        Ok(CropRect {
            x: 0,
            y,
            width: crop_width as u32,
            height: crop_height as u32,
        })
    }
}

/// Colour channel targeted by the channel correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChannel {
    Red,
    Green,
    Blue,
}

impl ColorChannel {
    fn index(self) -> usize {
        match self {
            ColorChannel::Red => 0,
            ColorChannel::Green => 1,
            ColorChannel::Blue => 2,
        }
    }
}

/// Photometric parameters: greyscale, then a brightness gain, then a gain on one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotometricSpec {
    pub brightness: f32,
    pub channel: ColorChannel,
    pub channel_gain: f32,
}

impl Default for PhotometricSpec {
    fn default() -> Self {
        Self {
            brightness: defaults::BRIGHTNESS,
            channel: ColorChannel::Green,
            channel_gain: defaults::CHANNEL_GAIN,
        }
    }
}

/// Greyscale a pixel buffer in place and apply the brightness and channel gains.
pub fn apply_photometric(image: &mut RgbaImage, spec: &PhotometricSpec) {
    let corrected = spec.channel.index();
    for pixel in image.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        // ITU-R BT.601 luma, the same weights image::imageops::grayscale uses.
        let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
        let level = luma * spec.brightness;
        for (i, value) in pixel.0.iter_mut().take(3).enumerate() {
            let v = if i == corrected {
                level * spec.channel_gain
            } else {
                level
            };
            *value = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// An OCR-ready image: a valid encoded buffer with non-zero dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    asset: MediaAsset,
}

impl ProcessedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.asset.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.asset.mime_type
    }

    pub fn width(&self) -> u32 {
        self.asset.width
    }

    pub fn height(&self) -> u32 {
        self.asset.height
    }

    pub fn as_asset(&self) -> &MediaAsset {
        &self.asset
    }

    pub fn into_asset(self) -> MediaAsset {
        self.asset
    }
}

/// Crop + photometric transform, configured once and shared by all events.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImageTransform {
    pub crop: CropSpec,
    pub photometric: PhotometricSpec,
}

impl ImageTransform {
    pub fn new(crop: CropSpec, photometric: PhotometricSpec) -> Self {
        Self { crop, photometric }
    }

    /// Transform raw image bytes into an OCR-ready image.
    ///
    /// Output is PNG when the source has an alpha channel, JPEG otherwise.
    ///
    /// # Errors
    /// - `InvalidMedia` if the bytes are not a decodable image
    /// - `Geometry` if the crop would leave an empty image
    pub fn apply(&self, bytes: &[u8]) -> Result<ProcessedImage> {
        let format = image::guess_format(bytes).map_err(|e| OcrelayError::InvalidMedia {
            message: format!("content is not a recognised image format: {e}"),
        })?;
        let source = image::load_from_memory_with_format(bytes, format).map_err(|e| {
            OcrelayError::InvalidMedia {
                message: format!("failed to decode {}: {e}", format.to_mime_type()),
            }
        })?;

        let (width, height) = source.dimensions();
        let rect = self.crop.rect_for(width, height)?;
        let has_alpha = source.color().has_alpha();

        let mut pixels = source
            .crop_imm(rect.x, rect.y, rect.width, rect.height)
            .to_rgba8();
        apply_photometric(&mut pixels, &self.photometric);

        let (output, out_format) = if has_alpha {
            (DynamicImage::ImageRgba8(pixels), ImageFormat::Png)
        } else {
            (
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(pixels).to_rgb8()),
                ImageFormat::Jpeg,
            )
        };

        let mut encoded = Cursor::new(Vec::new());
        output
            .write_to(&mut encoded, out_format)
            .map_err(|e| OcrelayError::InvalidMedia {
                message: format!("failed to encode processed image: {e}"),
            })?;

        Ok(ProcessedImage {
            asset: MediaAsset {
                bytes: encoded.into_inner(),
                mime_type: out_format.to_mime_type().to_string(),
                width: rect.width,
                height: rect.height,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::asset::sniff_image;
    use crate::media::asset::test_images::{jpeg, png, rgba_png};
    use image::Rgba;

    fn spec(top: u32, right: u32, bottom: u32) -> CropSpec {
        CropSpec {
            top_margin: top,
            right_margin: right,
            bottom_exclusion: bottom,
        }
    }

    #[test]
    fn test_rect_for_typical_screenshot() {
        let rect = CropSpec::default().rect_for(1080, 2400).unwrap();
        assert_eq!(
            rect,
            CropRect {
                x: 0,
                y: 310,
                width: 960,
                height: 2400 - 310 - 950
            }
        );
    }

    #[test]
    fn test_rect_for_zero_margins_is_identity() {
        let rect = spec(0, 0, 0).rect_for(10, 20).unwrap();
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (0, 0, 10, 20));
    }

    #[test]
    fn test_top_margin_at_or_beyond_height_is_geometry_error() {
        for top in [20, 21, 500] {
            let result = spec(top, 0, 0).rect_for(10, 20);
            assert!(
                matches!(result, Err(OcrelayError::Geometry { .. })),
                "top={top} should fail"
            );
        }
    }

    #[test]
    fn test_right_margin_at_width_is_geometry_error() {
        let result = spec(0, 10, 0).rect_for(10, 20);
        assert!(matches!(result, Err(OcrelayError::Geometry { .. })));
    }

    #[test]
    fn test_bottom_exclusion_collapsing_height_is_geometry_error() {
        // 20 - 5 - 15 = 0
        let result = spec(5, 0, 15).rect_for(10, 20);
        assert!(matches!(result, Err(OcrelayError::Geometry { .. })));
        assert!(spec(5, 0, 14).rect_for(10, 20).is_ok());
    }

    #[test]
    fn test_rect_dimensions_always_positive_when_ok() {
        for (w, h) in [(1, 1), (3, 7), (64, 64), (1080, 1920)] {
            for (top, right, bottom) in [(0, 0, 0), (1, 1, 1), (2, 0, 3), (300, 100, 900)] {
                if let Ok(rect) = spec(top, right, bottom).rect_for(w, h) {
                    assert!(rect.width > 0 && rect.height > 0);
                    assert!(rect.y + rect.height <= h);
                    assert!(rect.x + rect.width <= w);
                }
            }
        }
    }

    #[test]
    fn test_apply_crops_to_expected_size() {
        let transform = ImageTransform::new(spec(10, 5, 20), PhotometricSpec::default());
        let processed = transform.apply(&png(60, 100)).unwrap();

        assert_eq!((processed.width(), processed.height()), (55, 70));
        let (_, w, h) = sniff_image(processed.bytes()).unwrap();
        assert_eq!((w, h), (55, 70));
    }

    #[test]
    fn test_apply_encodes_jpeg_for_opaque_source() {
        let transform = ImageTransform::new(spec(0, 0, 0), PhotometricSpec::default());
        let processed = transform.apply(&jpeg(8, 8)).unwrap();
        assert_eq!(processed.mime_type(), "image/jpeg");
    }

    #[test]
    fn test_apply_encodes_png_for_alpha_source() {
        let transform = ImageTransform::new(spec(0, 0, 0), PhotometricSpec::default());
        let processed = transform.apply(&rgba_png(8, 8)).unwrap();
        assert_eq!(processed.mime_type(), "image/png");
        let (format, _, _) = sniff_image(processed.bytes()).unwrap();
        assert_eq!(format, ImageFormat::Png);
    }

    #[test]
    fn test_apply_rejects_non_image() {
        let transform = ImageTransform::default();
        let result = transform.apply(b"%PDF-1.7 not an image");
        assert!(matches!(result, Err(OcrelayError::InvalidMedia { .. })));
    }

    #[test]
    fn test_apply_rejects_truncated_image() {
        let mut bytes = png(32, 32);
        bytes.truncate(40);
        let result = ImageTransform::new(spec(0, 0, 0), PhotometricSpec::default()).apply(&bytes);
        assert!(matches!(result, Err(OcrelayError::InvalidMedia { .. })));
    }

    #[test]
    fn test_apply_small_image_with_default_margins_is_geometry_error() {
        let result = ImageTransform::default().apply(&png(200, 300));
        assert!(matches!(result, Err(OcrelayError::Geometry { .. })));
    }

    #[test]
    fn test_photometric_greyscale_identity() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([100, 100, 100, 255]));
        let spec = PhotometricSpec {
            brightness: 1.0,
            channel: ColorChannel::Green,
            channel_gain: 1.0,
        };
        apply_photometric(&mut img, &spec);
        assert_eq!(img.get_pixel(0, 0).0, [100, 100, 100, 255]);
    }

    #[test]
    fn test_photometric_attenuates_selected_channel() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([100, 100, 100, 77]));
        let spec = PhotometricSpec {
            brightness: 1.0,
            channel: ColorChannel::Green,
            channel_gain: 0.3,
        };
        apply_photometric(&mut img, &spec);
        assert_eq!(img.get_pixel(0, 0).0, [100, 30, 100, 77]);
    }

    #[test]
    fn test_photometric_brightness_saturates() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([200, 200, 200, 255]));
        let spec = PhotometricSpec {
            brightness: 2.0,
            channel: ColorChannel::Blue,
            channel_gain: 1.0,
        };
        apply_photometric(&mut img, &spec);
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_color_channel_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            channel: ColorChannel,
        }
        let w: Wrapper = toml::from_str("channel = \"blue\"").unwrap();
        assert_eq!(w.channel, ColorChannel::Blue);
    }
}

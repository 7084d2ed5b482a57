//! # Raster Module
//!
//! Page images as they flow through the enhancement pipeline. A [`Raster`]
//! is either single-channel luma or three-channel RGB. Every stage takes a
//! raster by reference and returns a new one.

use image::{DynamicImage, GrayImage, RgbImage};

/// A page image with explicit channel layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Raster {
    /// Single-channel 8-bit intensity samples
    Gray(GrayImage),
    /// Three-channel 8-bit RGB samples
    Rgb(RgbImage),
}

impl Raster {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        match self {
            Raster::Gray(img) => img.width(),
            Raster::Rgb(img) => img.width(),
        }
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        match self {
            Raster::Gray(img) => img.height(),
            Raster::Rgb(img) => img.height(),
        }
    }

    /// Number of samples per pixel (1 or 3).
    pub fn channels(&self) -> u8 {
        match self {
            Raster::Gray(_) => 1,
            Raster::Rgb(_) => 3,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Returns a grayscale copy of this raster.
    pub fn to_gray(&self) -> GrayImage {
        match self {
            Raster::Gray(img) => img.clone(),
            Raster::Rgb(img) => DynamicImage::ImageRgb8(img.clone()).to_luma8(),
        }
    }

    /// Returns a grayscale raster; single-channel input is cloned unchanged.
    pub fn to_gray_raster(&self) -> Raster {
        Raster::Gray(self.to_gray())
    }

    /// Converts into an `image` crate dynamic image (used for encoding).
    pub fn to_dynamic(&self) -> DynamicImage {
        match self {
            Raster::Gray(img) => DynamicImage::ImageLuma8(img.clone()),
            Raster::Rgb(img) => DynamicImage::ImageRgb8(img.clone()),
        }
    }

    /// Encodes the raster as PNG bytes for engines that take encoded images.
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        self.to_dynamic()
            .write_to(&mut buffer, image::ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

impl From<GrayImage> for Raster {
    fn from(img: GrayImage) -> Self {
        Raster::Gray(img)
    }
}

impl From<RgbImage> for Raster {
    fn from(img: RgbImage) -> Self {
        Raster::Rgb(img)
    }
}

impl From<DynamicImage> for Raster {
    /// Luma images (with or without alpha) become `Gray`; everything else is
    /// flattened to 8-bit RGB. Alpha is dropped.
    fn from(img: DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(gray) => Raster::Gray(gray),
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
                Raster::Gray(img.to_luma8())
            }
            DynamicImage::ImageRgb8(rgb) => Raster::Rgb(rgb),
            other => Raster::Rgb(other.to_rgb8()),
        }
    }
}

//! The owned image value that flows through the pipeline.
//!
//! An [`ImageHandle`] is moved into every transform and a new one is moved
//! out, so a pre-transform handle can never be observed after the call.

use super::params::OutputFormat;
use image::{ColorType, DynamicImage};

/// Decoded pixels plus the metadata a transform or encoder may need.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    image: DynamicImage,
    source_format: Option<OutputFormat>,
    icc_profile: Option<Vec<u8>>,
}

impl ImageHandle {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            source_format: None,
            icc_profile: None,
        }
    }

    pub fn with_source_format(mut self, format: Option<OutputFormat>) -> Self {
        self.source_format = format;
        self
    }

    pub fn with_icc_profile(mut self, profile: Option<Vec<u8>>) -> Self {
        self.icc_profile = profile;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn color(&self) -> ColorType {
        self.image.color()
    }

    /// Format the pixels were decoded from, if known.
    pub fn source_format(&self) -> Option<OutputFormat> {
        self.source_format
    }

    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc_profile.as_deref()
    }

    pub fn has_metadata(&self) -> bool {
        self.icc_profile.is_some()
    }

    /// Drop embedded profiles so the encoder writes bare pixels.
    pub fn strip(mut self) -> Self {
        self.icc_profile = None;
        self
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Replace the pixels, keeping format and profile.
    pub fn map_image(self, f: impl FnOnce(DynamicImage) -> DynamicImage) -> Self {
        Self {
            image: f(self.image),
            ..self
        }
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn strip_removes_profile_only() {
        let handle = ImageHandle::new(DynamicImage::ImageRgb8(RgbImage::new(4, 3)))
            .with_source_format(Some(OutputFormat::Png))
            .with_icc_profile(Some(vec![1, 2, 3]));
        assert!(handle.has_metadata());

        let stripped = handle.strip();
        assert!(!stripped.has_metadata());
        assert_eq!(stripped.dimensions(), (4, 3));
        assert_eq!(stripped.source_format(), Some(OutputFormat::Png));
    }

    #[test]
    fn map_image_keeps_metadata() {
        let handle = ImageHandle::new(DynamicImage::ImageRgb8(RgbImage::new(4, 3)))
            .with_icc_profile(Some(vec![9]));
        let mapped = handle.map_image(|img| img.grayscale());
        assert_eq!(mapped.color(), ColorType::L8);
        assert_eq!(mapped.icc_profile(), Some(&[9u8][..]));
    }
}

//! Parameter types for image operations and encoding.
//!
//! These structs describe *what* to do and *how a result is written*, not how
//! the pixels are produced. They are the interface between the pipeline driver,
//! the [`transforms`](super::transforms) and the [`backend`](super::backend).
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`OutputFormat`]: Encodable formats, parsed from names like `"jpg"` or `"webp"`.
//! - [`Background`]: Opaque fill color parsed from `#rrggbb` / `#rgb` hex.
//! - [`EncodeOptions`]: Everything the backend needs to write one file.
//! - [`Params`]: The open parameter set of one operation, handed whole to
//!   every transform. Numeric fields accept JSON numbers or numeric strings.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Output encodings compiled into the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Tiff,
    Avif,
}

impl OutputFormat {
    /// Canonical file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Tiff => "tiff",
            Self::Avif => "avif",
        }
    }

    /// Guess the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }

    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Tiff => Some(Self::Tiff),
            image::ImageFormat::Avif => Some(Self::Avif),
            _ => None,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            "tif" | "tiff" => Ok(Self::Tiff),
            "avif" => Ok(Self::Avif),
            other => Err(format!("unsupported output format '{other}'")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Opaque background color used to fill padding and flatten transparency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Background(pub [u8; 3]);

impl Background {
    /// The dark gray the thumbnail and offerize operations pad with.
    pub const DEFAULT: Background = Background([0x23, 0x23, 0x23]);

    pub fn rgba(self) -> image::Rgba<u8> {
        let [r, g, b] = self.0;
        image::Rgba([r, g, b, 255])
    }
}

impl FromStr for Background {
    type Err = String;

    /// Parse `#rrggbb` or `#rgb` (the leading `#` is optional).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(format!("invalid color '{s}', expected #rrggbb"));
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return Err(format!("invalid color '{s}', expected #rrggbb")),
        };
        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .map_err(|_| format!("invalid color '{s}', expected #rrggbb"))
        };
        Ok(Self([channel(0)?, channel(2)?, channel(4)?]))
    }
}

/// Parameters for writing one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub format: OutputFormat,
    /// `None` keeps the encoder's own default.
    pub quality: Option<Quality>,
}

/// Named parameters of one operation.
///
/// Every field is optional: each transform applies its own defaults under
/// whatever the caller supplied, and reports the fields it cannot default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, alias = "bg_color", skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub hue: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub black_point: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub white_point: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub num_tiles_width: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub num_tiles_height: Option<f64>,
    /// Tile only: also reassemble the grid into one composite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// Accept `150`, `1.125` or `"150"` for a numeric parameter.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected a number, got '{text}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn format_parses_aliases() {
        assert_eq!("JPG".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert_eq!("jpeg".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert_eq!("tif".parse::<OutputFormat>(), Ok(OutputFormat::Tiff));
        assert!("bmp".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn format_from_path_uses_extension() {
        assert_eq!(
            OutputFormat::from_path(Path::new("out/thumb.webp")),
            Some(OutputFormat::WebP)
        );
        assert_eq!(OutputFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn background_parses_long_and_short_hex() {
        assert_eq!("#232323".parse::<Background>(), Ok(Background::DEFAULT));
        assert_eq!("#fff".parse::<Background>(), Ok(Background([255, 255, 255])));
        assert_eq!("00ff00".parse::<Background>(), Ok(Background([0, 255, 0])));
    }

    #[test]
    fn params_accept_numeric_strings() {
        let params: Params = serde_json::from_str(
            r##"{"width": "150", "height": 90, "gamma": "1.125", "bg_color": "#000"}"##,
        )
        .unwrap();
        assert_eq!(params.width, Some(150.0));
        assert_eq!(params.height, Some(90.0));
        assert_eq!(params.gamma, Some(1.125));
        assert_eq!(params.background_color.as_deref(), Some("#000"));
        assert_eq!(params.brightness, None);
    }

    #[test]
    fn params_reject_non_numeric_text() {
        let result = serde_json::from_str::<Params>(r#"{"width": "wide"}"#);
        assert!(result.unwrap_err().to_string().contains("expected a number"));
    }

    #[test]
    fn params_serialize_only_present_fields() {
        let params = Params {
            width: Some(100.0),
            ..Params::default()
        };
        assert_eq!(serde_json::to_string(&params).unwrap(), r#"{"width":100.0}"#);
    }

    #[test]
    fn background_rejects_garbage() {
        assert!("#12345".parse::<Background>().is_err());
        assert!("#zzzzzz".parse::<Background>().is_err());
    }
}

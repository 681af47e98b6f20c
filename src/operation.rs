//! Operation descriptors: one entry of the configured operation list.
//!
//! A descriptor is an immutable value built once from configuration:
//!
//! ```json
//! {
//!   "op": "thumbnail",
//!   "width": 100, "height": "100",
//!   "destination": "poster_thumb.jpg",
//!   "destination_path": "offers/42",
//!   "version": "thumbnail",
//!   "format": "jpg", "quality": 80, "strip": true
//! }
//! ```
//!
//! `op` selects the transform, the transform parameters land in
//! [`Params`], and the remaining keys are output directives. Defaults are
//! computed by the accessor methods below and never written back.

use crate::imaging::{OutputFormat, Params, Quality, TransformError};
use crate::imaging::params::lenient_number;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the operation routed to the tiler instead of the registry.
pub const TILE_OPERATION: &str = "tile";

/// Version label used when a descriptor does not declare one.
pub const DEFAULT_VERSION: &str = "original";

/// Where and how an operation's result is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputDirectives {
    /// Output file name. Defaults to `<source stem>_<op>.<ext>`.
    pub destination: Option<String>,
    /// Key prefix in the bucket.
    pub destination_path: Option<String>,
    pub version: Option<String>,
    pub format: Option<String>,
    pub quality: Option<f64>,
    pub strip: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireDescriptor", into = "WireDescriptor")]
pub struct OperationDescriptor {
    pub op: String,
    pub params: Params,
    pub output: OutputDirectives,
}

/// Flat on-the-wire shape: parameters and directives share one object.
#[derive(Clone, Serialize, Deserialize)]
struct WireDescriptor {
    op: String,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    width: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    height: Option<f64>,
    #[serde(default, alias = "bg_color", skip_serializing_if = "Option::is_none")]
    background_color: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    brightness: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    saturation: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    hue: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    gamma: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    black_point: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    white_point: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    num_tiles_width: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    num_tiles_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merge: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    strip: Option<bool>,
}

impl From<WireDescriptor> for OperationDescriptor {
    fn from(w: WireDescriptor) -> Self {
        Self {
            op: w.op,
            params: Params {
                width: w.width,
                height: w.height,
                background_color: w.background_color,
                brightness: w.brightness,
                saturation: w.saturation,
                hue: w.hue,
                gamma: w.gamma,
                black_point: w.black_point,
                white_point: w.white_point,
                num_tiles_width: w.num_tiles_width,
                num_tiles_height: w.num_tiles_height,
                merge: w.merge,
            },
            output: OutputDirectives {
                destination: w.destination,
                destination_path: w.destination_path,
                version: w.version,
                format: w.format,
                quality: w.quality,
                strip: w.strip,
            },
        }
    }
}

impl From<OperationDescriptor> for WireDescriptor {
    fn from(d: OperationDescriptor) -> Self {
        let Params {
            width,
            height,
            background_color,
            brightness,
            saturation,
            hue,
            gamma,
            black_point,
            white_point,
            num_tiles_width,
            num_tiles_height,
            merge,
        } = d.params;
        let OutputDirectives {
            destination,
            destination_path,
            version,
            format,
            quality,
            strip,
        } = d.output;
        Self {
            op: d.op,
            width,
            height,
            background_color,
            brightness,
            saturation,
            hue,
            gamma,
            black_point,
            white_point,
            num_tiles_width,
            num_tiles_height,
            merge,
            destination,
            destination_path,
            version,
            format,
            quality,
            strip,
        }
    }
}

impl OperationDescriptor {
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            params: Params::default(),
            output: OutputDirectives::default(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_output(mut self, output: OutputDirectives) -> Self {
        self.output = output;
        self
    }

    pub fn is_tile(&self) -> bool {
        self.op == TILE_OPERATION
    }

    pub fn version_label(&self) -> &str {
        self.output.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }

    /// Metadata is stripped unless the descriptor says `strip: false`.
    pub fn strips_metadata(&self) -> bool {
        self.output.strip != Some(false)
    }

    /// Resolve the encoding: explicit `format`, then the destination's
    /// extension, then the source format, then JPEG.
    pub fn output_format(&self, source: Option<OutputFormat>) -> Result<OutputFormat, TransformError> {
        if let Some(name) = &self.output.format {
            return name.parse().map_err(|reason| TransformError::InvalidParameter {
                parameter: "format",
                reason,
            });
        }
        Ok(self
            .output
            .destination
            .as_deref()
            .and_then(|d| OutputFormat::from_path(Path::new(d)))
            .or(source)
            .unwrap_or(OutputFormat::Jpeg))
    }

    /// Encode quality, or `None` to keep the encoder default.
    ///
    /// Always `None` for `original`, whatever the descriptor says.
    pub fn quality(&self) -> Result<Option<Quality>, TransformError> {
        if self.op == "original" {
            return Ok(None);
        }
        match self.output.quality {
            None => Ok(None),
            Some(q) if (1.0..=100.0).contains(&q) => Ok(Some(Quality::new(q.round() as u32))),
            Some(q) => Err(TransformError::InvalidParameter {
                parameter: "quality",
                reason: format!("{q} is not a quality in 1..=100"),
            }),
        }
    }

    /// Output file name for this operation's result.
    ///
    /// Without a `destination` the name is `<stem>_<op>.<ext>`; a
    /// `disambiguator` (the operation's position) is appended when an
    /// earlier operation already took that name.
    pub fn destination_filename(
        &self,
        source_filename: &str,
        format: OutputFormat,
        disambiguator: Option<usize>,
    ) -> String {
        match &self.output.destination {
            Some(name) => name.clone(),
            None => {
                let stem = file_stem(source_filename);
                match disambiguator {
                    Some(n) => format!("{stem}_{}_{n}.{}", self.op, format.extension()),
                    None => format!("{stem}_{}.{}", self.op, format.extension()),
                }
            }
        }
    }

    /// Basename for tile files: the stem of `destination`, else the source
    /// stem, suffixed with `disambiguator` when given.
    pub fn tile_basename(&self, source_filename: &str, disambiguator: Option<usize>) -> String {
        if let Some(destination) = &self.output.destination {
            return file_stem(destination).to_string();
        }
        let stem = file_stem(source_filename);
        match disambiguator {
            Some(n) => format!("{stem}_{n}"),
            None => stem.to_string(),
        }
    }

    /// Requested tile grid as `(columns, rows)`.
    pub fn grid(&self) -> Result<(i64, i64), TransformError> {
        let read = |value: Option<f64>, parameter: &'static str| {
            let v = value.ok_or(TransformError::MissingParameter {
                operation: TILE_OPERATION,
                parameter,
            })?;
            if !v.is_finite() || v.fract() != 0.0 {
                return Err(TransformError::InvalidParameter {
                    parameter,
                    reason: format!("{v} is not a whole number"),
                });
            }
            Ok(v as i64)
        };
        Ok((
            read(self.params.num_tiles_width, "num_tiles_width")?,
            read(self.params.num_tiles_height, "num_tiles_height")?,
        ))
    }

    /// Compact JSON of the whole descriptor, for reports.
    pub fn describe(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"op\":\"{}\"}}", self.op))
    }
}

/// File name without its last extension.
pub fn file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

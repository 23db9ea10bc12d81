//! Filter parameters: the raw request shape and the validated, normalized spec.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::DarkroomError;

/// Encoded output formats the codec can produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive). `jpg` and `jpeg` are the same format.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Canonical name, as it appears in fingerprints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }

    /// File extension for artifact names.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    /// MIME type of the encoded bytes.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated filter request, as it arrives from a caller.
///
/// Numeric fields are wide so out-of-range values (including negatives) reach
/// validation instead of failing deserialization with an opaque message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub brightness: Option<i64>,
    pub contrast: Option<i64>,
    pub saturation: Option<i64>,
    pub blur: Option<i64>,
    pub sharpen: Option<bool>,
    pub vintage: Option<bool>,
    #[serde(alias = "edgeDetection")]
    pub edge_detect: Option<bool>,
    #[serde(alias = "faceDetection")]
    pub face_detect: Option<bool>,
    pub output_format: Option<String>,
}

/// A validated, normalized set of filter parameters plus the output format.
///
/// Unset numeric parameters, `false` toggles and a zero blur all mean "skip
/// this step", and all normalize to the same (absent) canonical field, so two
/// specs that produce the same image compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FilterParams", into = "FilterParams")]
pub struct FilterSpec {
    brightness: Option<u8>,
    contrast: Option<u8>,
    saturation: Option<u8>,
    blur: Option<u8>,
    sharpen: bool,
    vintage: bool,
    edge_detect: bool,
    face_detect: bool,
    output_format: OutputFormat,
}

const PERCENT_MAX: i64 = 100;
const BLUR_MAX: i64 = 50;

impl FilterSpec {
    /// Validate and normalize raw parameters.
    pub fn new(params: FilterParams) -> Result<Self, DarkroomError> {
        let output_format = match params.output_format.as_deref() {
            None => OutputFormat::default(),
            Some(s) => OutputFormat::parse(s).ok_or_else(|| {
                DarkroomError::Validation(format!(
                    "output_format must be one of png, jpg, jpeg, webp (got {s:?})"
                ))
            })?,
        };

        Ok(Self {
            brightness: bounded("brightness", params.brightness, PERCENT_MAX)?,
            contrast: bounded("contrast", params.contrast, PERCENT_MAX)?,
            saturation: bounded("saturation", params.saturation, PERCENT_MAX)?,
            blur: bounded("blur", params.blur, BLUR_MAX)?.filter(|&b| b > 0),
            sharpen: params.sharpen.unwrap_or(false),
            vintage: params.vintage.unwrap_or(false),
            edge_detect: params.edge_detect.unwrap_or(false),
            face_detect: params.face_detect.unwrap_or(false),
            output_format,
        })
    }

    pub fn brightness(&self) -> Option<u8> {
        self.brightness
    }

    pub fn contrast(&self) -> Option<u8> {
        self.contrast
    }

    pub fn saturation(&self) -> Option<u8> {
        self.saturation
    }

    pub fn blur(&self) -> Option<u8> {
        self.blur
    }

    pub fn sharpen(&self) -> bool {
        self.sharpen
    }

    pub fn vintage(&self) -> bool {
        self.vintage
    }

    pub fn edge_detect(&self) -> bool {
        self.edge_detect
    }

    pub fn face_detect(&self) -> bool {
        self.face_detect
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    /// Gaussian kernel size for the blur step: even requests round up to odd.
    pub fn blur_kernel_size(&self) -> Option<u32> {
        self.blur.map(|b| {
            let k = u32::from(b);
            if k % 2 == 0 {
                k + 1
            } else {
                k
            }
        })
    }

    /// Deterministic serialization: sorted keys, unset fields omitted.
    ///
    /// This string is what the fingerprint hashes and what gets stored in
    /// the artifact's `params` column.
    pub fn canonical_json(&self) -> String {
        let mut fields: BTreeMap<&'static str, Value> = BTreeMap::new();
        let numeric = [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
            ("blur", self.blur),
        ];
        for (name, value) in numeric {
            if let Some(v) = value {
                fields.insert(name, Value::from(v));
            }
        }
        let toggles = [
            ("sharpen", self.sharpen),
            ("vintage", self.vintage),
            ("edge_detect", self.edge_detect),
            ("face_detect", self.face_detect),
        ];
        for (name, on) in toggles {
            if on {
                fields.insert(name, Value::Bool(true));
            }
        }
        fields.insert("output_format", Value::from(self.output_format.as_str()));

        // Serializing a BTreeMap of plain JSON values cannot fail.
        serde_json::to_string(&fields).unwrap_or_default()
    }
}

impl TryFrom<FilterParams> for FilterSpec {
    type Error = DarkroomError;

    fn try_from(params: FilterParams) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

impl From<FilterSpec> for FilterParams {
    fn from(spec: FilterSpec) -> Self {
        let flag = |on: bool| on.then_some(true);
        Self {
            brightness: spec.brightness.map(i64::from),
            contrast: spec.contrast.map(i64::from),
            saturation: spec.saturation.map(i64::from),
            blur: spec.blur.map(i64::from),
            sharpen: flag(spec.sharpen),
            vintage: flag(spec.vintage),
            edge_detect: flag(spec.edge_detect),
            face_detect: flag(spec.face_detect),
            output_format: Some(spec.output_format.as_str().to_string()),
        }
    }
}

fn bounded(name: &str, value: Option<i64>, max: i64) -> Result<Option<u8>, DarkroomError> {
    match value {
        None => Ok(None),
        Some(v) if (0..=max).contains(&v) => Ok(Some(v as u8)),
        Some(v) => Err(DarkroomError::Validation(format!(
            "{name} must be between 0 and {max} (got {v})"
        ))),
    }
}

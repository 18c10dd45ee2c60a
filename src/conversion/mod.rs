//! Validation of codec conversion requests.
//!
//! A request is a JSON object whose `codec` field selects the target codec.
//! It is checked against that codec's [`Schema`] and only then turned into a
//! typed [`ConversionOptions`]. Nothing is applied on failure.

pub mod schema;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use schema::{Domain, FieldSpec, Schema};

use crate::error::ConversionError;

/// Closed set of audio codecs a conversion may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Opus,
    Aac,
    Ac3,
    Eac3,
    Flac,
    Mp3,
    Vorbis,
}

impl AudioCodec {
    pub fn name(&self) -> &'static str {
        match self {
            AudioCodec::Opus => "opus",
            AudioCodec::Aac => "aac",
            AudioCodec::Ac3 => "ac3",
            AudioCodec::Eac3 => "eac3",
            AudioCodec::Flac => "flac",
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Vorbis => "vorbis",
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AudioCodec {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opus" => Ok(AudioCodec::Opus),
            "aac" => Ok(AudioCodec::Aac),
            "ac3" => Ok(AudioCodec::Ac3),
            "eac3" => Ok(AudioCodec::Eac3),
            "flac" => Ok(AudioCodec::Flac),
            "mp3" => Ok(AudioCodec::Mp3),
            "vorbis" => Ok(AudioCodec::Vorbis),
            other => Err(ConversionError::UnsupportedCodec {
                codec: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpusVbr {
    Off,
    On,
    Constrained,
}

impl OpusVbr {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpusVbr::Off => "off",
            OpusVbr::On => "on",
            OpusVbr::Constrained => "constrained",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpusOptions {
    #[serde(default)]
    pub bitrate: Option<u64>,
    #[serde(default)]
    pub compression_level: Option<u8>,
    /// Frame duration in milliseconds
    #[serde(default)]
    pub frame_duration: Option<f64>,
    #[serde(default)]
    pub vbr: Option<OpusVbr>,
    #[serde(default)]
    pub channels: Option<u32>,
}

/// A validated conversion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "codec", rename_all = "lowercase")]
pub enum ConversionOptions {
    Opus(OpusOptions),
}

impl ConversionOptions {
    pub fn codec(&self) -> AudioCodec {
        match self {
            ConversionOptions::Opus(_) => AudioCodec::Opus,
        }
    }

    pub fn bitrate(&self) -> Option<u64> {
        match self {
            ConversionOptions::Opus(opts) => opts.bitrate,
        }
    }

    pub fn channels(&self) -> Option<u32> {
        match self {
            ConversionOptions::Opus(opts) => opts.channels,
        }
    }
}

/// Validate a raw conversion request.
///
/// Fails with [`ConversionError::UnsupportedCodec`] for any codec without a
/// concrete conversion path, and with [`ConversionError::InvalidOptions`]
/// listing every offending field when the request does not fit the schema.
pub fn validate(request: &Value) -> Result<ConversionOptions, ConversionError> {
    let invalid = |fields: Vec<String>| ConversionError::InvalidOptions { fields };

    let object = request
        .as_object()
        .ok_or_else(|| invalid(vec!["codec".to_string()]))?;
    let codec_name = object
        .get("codec")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(vec!["codec".to_string()]))?;

    let codec: AudioCodec = codec_name.parse()?;
    let schema = Schema::for_codec(codec).ok_or_else(|| ConversionError::UnsupportedCodec {
        codec: codec_name.to_string(),
    })?;

    let offending = schema.violations(object);
    if !offending.is_empty() {
        return Err(invalid(offending.into_iter().collect()));
    }

    // The schema only declares a number; the engine needs a positive integer rate
    if let Some(bitrate) = object.get("bitrate")
        && !bitrate.as_u64().is_some_and(|b| b > 0)
    {
        return Err(invalid(vec!["bitrate".to_string()]));
    }

    serde_json::from_value(request.clone()).map_err(|e| {
        tracing::debug!("Conversion request passed schema but not decoding: {}", e);
        invalid(object.keys().cloned().collect())
    })
}

use crate::conversion::{ConversionOptions, OpusOptions};

/// A conversion request recorded on an audio track
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// Target codec; becomes the track's effective codec
    pub codec: String,
    /// Validated codec parameters, absent when the codec was only pinned
    pub options: Option<ConversionOptions>,
}

impl Conversion {
    pub fn validated(options: ConversionOptions) -> Self {
        Self {
            codec: options.codec().name().to_string(),
            options: Some(options),
        }
    }

    /// Keep the given codec but re-encode, e.g. to change the bitrate
    pub fn pinned(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            options: None,
        }
    }
}

/// Pending audio-specific edits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioEdit {
    pub conversion: Option<Conversion>,
    pub bitrate: Option<u64>,
    pub channels: Option<u32>,
}

impl AudioEdit {
    /// Codec selection plus the bitrate/channel overrides for output slot `out`
    pub fn build_options(&self, out: usize) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(conversion) = &self.conversion {
            match &conversion.options {
                Some(ConversionOptions::Opus(opts)) => args.extend(opus_options(opts, out)),
                None => args.extend([format!("-c:{}", out), conversion.codec.clone()]),
            }
        }

        if let Some(bitrate) = self.bitrate {
            args.extend([format!("-b:{}", out), bitrate.to_string()]);
        }
        if let Some(channels) = self.channels {
            args.extend([format!("-ac:{}", out), channels.to_string()]);
        }

        args
    }
}

fn opus_options(opts: &OpusOptions, out: usize) -> Vec<String> {
    let mut args = vec![format!("-c:{}", out), "libopus".to_string()];

    if let Some(level) = opts.compression_level {
        args.extend([format!("-compression_level:{}", out), level.to_string()]);
    }
    if let Some(duration) = opts.frame_duration {
        args.extend([format!("-frame_duration:{}", out), duration.to_string()]);
    }
    if let Some(vbr) = opts.vbr {
        args.extend([format!("-vbr:{}", out), vbr.as_str().to_string()]);
    }

    args
}

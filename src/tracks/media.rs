use std::collections::BTreeMap;

use crate::analyzer::{CodecType, StreamProbe};

/// Type-specific probed attributes
#[derive(Debug, Clone, PartialEq)]
pub enum MediaInfo {
    Video {
        width: Option<u32>,
        height: Option<u32>,
    },
    Audio {
        sample_rate: Option<u64>,
        channels: Option<u32>,
    },
    Subtitle,
    Attachment {
        filename: Option<String>,
        mimetype: Option<String>,
    },
    Data,
}

/// Immutable probed snapshot of one stream.
///
/// Shared between a track and all of its copies; never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedStream {
    pub index: usize,
    pub codec: Option<String>,
    /// Duration in seconds as reported on the stream itself
    pub duration_secs: Option<f64>,
    pub bitrate: Option<u64>,
    pub size: Option<u64>,
    pub tags: BTreeMap<String, String>,
    pub disposition: BTreeMap<String, i64>,
    pub media: MediaInfo,
}

impl ProbedStream {
    pub fn from_probe(stream: &StreamProbe) -> Self {
        let media = match stream.codec_type {
            CodecType::Video => MediaInfo::Video {
                width: stream.width,
                height: stream.height,
            },
            CodecType::Audio => MediaInfo::Audio {
                sample_rate: stream.sample_rate,
                channels: stream.channels,
            },
            CodecType::Subtitle => MediaInfo::Subtitle,
            CodecType::Attachment => MediaInfo::Attachment {
                filename: stream.tags.get("filename").cloned(),
                mimetype: stream.tags.get("mimetype").cloned(),
            },
            CodecType::Data => MediaInfo::Data,
        };

        // Matroska muxers record the payload size as a statistics tag
        let size = stream
            .tags
            .get("NUMBER_OF_BYTES")
            .and_then(|s| s.trim().parse().ok());

        Self {
            index: stream.index,
            codec: stream.codec_name.clone(),
            duration_secs: stream.duration,
            bitrate: stream.bit_rate.or_else(|| {
                stream
                    .tags
                    .get("BPS")
                    .and_then(|s| s.trim().parse().ok())
            }),
            size,
            tags: stream.tags.clone(),
            disposition: stream.disposition.clone(),
            media,
        }
    }

    /// The `DURATION` statistics tag, optionally language-suffixed
    pub fn duration_tag(&self) -> Option<&str> {
        self.tags
            .get("DURATION")
            .or_else(|| {
                self.tags
                    .iter()
                    .find(|(key, _)| key.starts_with("DURATION-"))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    /// Flags equal to 1 become `true`; anything else is absent
    pub fn dispositions(&self) -> BTreeMap<String, bool> {
        self.disposition
            .iter()
            .filter(|&(_, &flag)| flag == 1)
            .map(|(name, _)| (name.clone(), true))
            .collect()
    }
}

/// Parse an `HH:MM:SS[.fraction]` clock into seconds.
///
/// Anything without exactly three segments, or with an unparsable segment,
/// resolves to 0.
pub fn parse_clock(clock: &str) -> f64 {
    let segments: Vec<&str> = clock.trim().split(':').collect();
    if segments.len() != 3 {
        return 0.0;
    }
    let hours = segments[0].parse::<f64>();
    let minutes = segments[1].parse::<f64>();
    let seconds = segments[2].parse::<f64>();
    match (hours, minutes, seconds) {
        (Ok(h), Ok(m), Ok(s)) => h * 3600.0 + m * 60.0 + s,
        _ => 0.0,
    }
}

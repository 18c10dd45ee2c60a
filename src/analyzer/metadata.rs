use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

/// Codec type discriminant of a probed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    Video,
    Audio,
    Subtitle,
    Attachment,
    Data,
}

/// Full probe result for one file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeResult {
    #[serde(default)]
    pub streams: Vec<StreamProbe>,
    #[serde(default)]
    pub format: FormatProbe,
    #[serde(default)]
    pub chapters: Vec<ChapterProbe>,
}

/// Container-level attributes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatProbe {
    #[serde(default)]
    pub format_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub bit_rate: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub size: Option<u64>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// One probed stream
#[derive(Debug, Clone, Deserialize)]
pub struct StreamProbe {
    pub index: usize,
    pub codec_type: CodecType,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub bit_rate: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub sample_rate: Option<u64>,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Stream duration in seconds, when the container records one
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Engine-native flags, each 0 or 1
    #[serde(default)]
    pub disposition: BTreeMap<String, i64>,
}

/// One probed chapter
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterProbe {
    pub id: i64,
    pub time_base: String,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ChapterProbe {
    pub fn title(&self) -> Option<&str> {
        self.tags.get("title").map(String::as_str)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Text(String),
    Unsigned(u64),
    Float(f64),
}

// ffprobe prints most numbers as strings and uses "N/A" for unknown values
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(
        Option::<Lenient>::deserialize(deserializer)?.and_then(|value| match value {
            Lenient::Text(text) => text.trim().parse().ok(),
            Lenient::Unsigned(n) => Some(n),
            Lenient::Float(f) if f >= 0.0 => Some(f as u64),
            Lenient::Float(_) => None,
        }),
    )
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(
        Option::<Lenient>::deserialize(deserializer)?.and_then(|value| match value {
            Lenient::Text(text) => text.trim().parse().ok(),
            Lenient::Unsigned(n) => Some(n as f64),
            Lenient::Float(f) => Some(f),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0, "codec_type": "video", "codec_name": "h264",
                "width": 1920, "height": 1080,
                "disposition": {"default": 1, "forced": 0},
                "tags": {"DURATION": "00:01:30.000000000"}
            },
            {
                "index": 1, "codec_type": "audio", "codec_name": "aac",
                "sample_rate": "48000", "channels": 2, "bit_rate": "N/A",
                "tags": {"language": "eng"}
            }
        ],
        "format": {"format_name": "matroska,webm", "duration": "90.000", "size": "1048576"},
        "chapters": [
            {"id": 1, "time_base": "1/1000", "start": 0, "end": 45000, "tags": {"title": "One"}}
        ]
    }"#;

    #[test]
    fn parses_ffprobe_json() {
        let probe: ProbeResult = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(probe.streams.len(), 2);
        assert_eq!(probe.streams[0].codec_type, CodecType::Video);
        assert_eq!(probe.streams[0].disposition.get("default"), Some(&1));
        assert_eq!(probe.streams[1].sample_rate, Some(48000));
        assert_eq!(probe.streams[1].bit_rate, None);
        assert_eq!(probe.format.size, Some(1_048_576));
        assert_eq!(probe.format.duration, Some(90.0));
        assert_eq!(probe.chapters[0].title(), Some("One"));
    }
}

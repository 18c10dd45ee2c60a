//! Declarative per-codec schemas for conversion requests.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::AudioCodec;

/// Allowed values for one field
#[derive(Debug, Clone, Copy)]
pub enum Domain {
    /// Whole number within inclusive bounds
    Integer { min: i64, max: i64 },
    /// Any number not below `min`
    Number { min: f64 },
    /// One of a fixed set of numbers
    OneOf(&'static [f64]),
    /// One of a fixed set of strings
    Enum(&'static [&'static str]),
}

impl Domain {
    pub fn admits(&self, value: &Value) -> bool {
        match *self {
            // JSON integers only; `10.0` does not decode into an integer field
            Domain::Integer { min, max } => value.as_i64().is_some_and(|n| (min..=max).contains(&n)),
            Domain::Number { min } => value.as_f64().is_some_and(|n| n >= min),
            Domain::OneOf(allowed) => value
                .as_f64()
                .is_some_and(|n| allowed.iter().any(|a| (a - n).abs() < f64::EPSILON)),
            Domain::Enum(allowed) => value.as_str().is_some_and(|s| allowed.contains(&s)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub domain: Domain,
}

/// Schema of a conversion request for one target codec.
///
/// `codec` is the required discriminant; every other field is optional and
/// fields outside the list are rejected.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub codec: AudioCodec,
    pub fields: &'static [FieldSpec],
}

pub const OPUS: Schema = Schema {
    codec: AudioCodec::Opus,
    fields: &[
        FieldSpec {
            name: "bitrate",
            domain: Domain::Number { min: 0.0 },
        },
        FieldSpec {
            name: "compression_level",
            domain: Domain::Integer { min: 0, max: 10 },
        },
        FieldSpec {
            name: "frame_duration",
            domain: Domain::OneOf(&[2.5, 5.0, 10.0, 20.0, 40.0, 60.0]),
        },
        FieldSpec {
            name: "vbr",
            domain: Domain::Enum(&["off", "on", "constrained"]),
        },
        FieldSpec {
            name: "channels",
            domain: Domain::Integer { min: 1, max: 8 },
        },
    ],
};

impl Schema {
    /// Schema for a codec with a concrete conversion path
    pub fn for_codec(codec: AudioCodec) -> Option<&'static Schema> {
        match codec {
            AudioCodec::Opus => Some(&OPUS),
            _ => None,
        }
    }

    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of every field that violates the schema
    pub fn violations(&self, request: &Map<String, Value>) -> BTreeSet<String> {
        let mut offending = BTreeSet::new();

        match request.get("codec").and_then(Value::as_str) {
            Some(codec) if codec == self.codec.name() => {}
            _ => {
                offending.insert("codec".to_string());
            }
        }

        for (name, value) in request {
            if name == "codec" {
                continue;
            }
            match self.field(name) {
                Some(spec) if spec.domain.admits(value) => {}
                _ => {
                    offending.insert(name.clone());
                }
            }
        }

        offending
    }
}

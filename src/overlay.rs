//! Precedence rule between probed values and pending edits.
//!
//! Every editable attribute is a pair of plain values: the immutable probed
//! one and an optional overlay edit. Reads go through [`effective`]; writes
//! only ever touch the overlay side.

use std::collections::BTreeMap;

/// The overlay value if one was set, otherwise the probed value.
pub fn effective<'a, T: ?Sized>(probed: Option<&'a T>, overlay: Option<&'a T>) -> Option<&'a T> {
    overlay.or(probed)
}

/// A pending tag change.
///
/// `Unset` is an explicit removal and must reach the engine as a cleared
/// key, which is different from a tag that was never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEdit {
    Set(String),
    Unset,
}

impl TagEdit {
    pub fn value(&self) -> Option<&str> {
        match self {
            TagEdit::Set(value) => Some(value),
            TagEdit::Unset => None,
        }
    }

    /// `key=value`, or `key=` for a cleared tag
    pub fn render(&self, key: &str) -> String {
        format!("{}={}", key, self.value().unwrap_or_default())
    }
}

/// Probed tags with pending edits applied
pub fn effective_tags(
    probed: &BTreeMap<String, String>,
    edits: &BTreeMap<String, TagEdit>,
) -> BTreeMap<String, String> {
    let mut tags = probed.clone();
    for (key, edit) in edits {
        match edit {
            TagEdit::Set(value) => {
                tags.insert(key.clone(), value.clone());
            }
            TagEdit::Unset => {
                tags.remove(key);
            }
        }
    }
    tags
}

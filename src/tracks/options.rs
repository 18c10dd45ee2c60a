use std::collections::BTreeMap;

use crate::overlay::TagEdit;

/// Rendering quirks of the engine's argument handling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArgStyle {
    /// Append a padding space to values with interior whitespace so they
    /// survive engines that re-tokenize option strings.
    pub pad_spaced_values: bool,
}

impl ArgStyle {
    /// `key=value` token for a metadata argument
    pub fn metadata(&self, key: &str, edit: &TagEdit) -> String {
        let mut token = edit.render(key);
        if self.pad_spaced_values && edit.value().is_some_and(has_interior_whitespace) {
            token.push(' ');
        }
        token
    }

    pub fn metadata_value(&self, key: &str, value: &str) -> String {
        self.metadata(key, &TagEdit::Set(value.to_string()))
    }
}

fn has_interior_whitespace(value: &str) -> bool {
    value.trim().contains(char::is_whitespace)
}

/// One combined disposition value: `+flag` for set, `-flag` for cleared.
///
/// An empty set clears every flag, which the engine spells `0`.
pub fn render_dispositions(flags: &BTreeMap<String, bool>) -> String {
    if flags.is_empty() {
        return "0".to_string();
    }
    flags
        .iter()
        .map(|(name, &set)| format!("{}{}", if set { '+' } else { '-' }, name))
        .collect()
}

/// Offset in whole milliseconds rendered as decimal seconds
pub fn render_offset(delay_ms: i64) -> String {
    (delay_ms as f64 / 1000.0).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_only_applies_to_spaced_values() {
        let style = ArgStyle {
            pad_spaced_values: true,
        };
        assert_eq!(style.metadata_value("title", "Two Words"), "title=Two Words ");
        assert_eq!(style.metadata_value("title", "Single"), "title=Single");
        assert_eq!(style.metadata("title", &TagEdit::Unset), "title=");

        let plain = ArgStyle::default();
        assert_eq!(plain.metadata_value("title", "Two Words"), "title=Two Words");
    }

    #[test]
    fn dispositions_render_sorted_with_signs() {
        let flags = BTreeMap::from([
            ("forced".to_string(), false),
            ("default".to_string(), true),
        ]);
        assert_eq!(render_dispositions(&flags), "+default-forced");
        assert_eq!(render_dispositions(&BTreeMap::new()), "0");
    }

    #[test]
    fn offsets_render_as_seconds() {
        assert_eq!(render_offset(2000), "2");
        assert_eq!(render_offset(1500), "1.5");
        assert_eq!(render_offset(-250), "-0.25");
    }
}

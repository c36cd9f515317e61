//! Defensive parsing of free-form model output.

use serde::de::DeserializeOwned;

/// Parse the outermost `[...]` in `text` as a JSON array.
///
/// Models often wrap JSON in prose or code fences; everything before the
/// first `[` and after the last `]` is ignored.
pub(crate) fn parse_json_array<T: DeserializeOwned>(text: &str) -> Option<Vec<T>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_inside_prose() {
        let parsed: Vec<String> =
            parse_json_array("Sure!\n```json\n[\"a?\", \"b?\"]\n```").unwrap();
        assert_eq!(parsed, vec!["a?", "b?"]);
    }

    #[test]
    fn test_not_an_array() {
        assert!(parse_json_array::<String>("no brackets here").is_none());
        assert!(parse_json_array::<String>("] backwards [").is_none());
        assert!(parse_json_array::<String>("[1, 2]").is_none());
    }
}

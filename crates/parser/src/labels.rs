//! DCGM label-string parsing

use std::collections::HashMap;

/// Parse a DCGM-style label string into a map.
///
/// Accepts `key=value,key2=value2` with optionally quoted values, as
/// exporters emit them: `driver="550.54",arch=hopper`.
pub fn parse_labels(raw: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();

    for part in raw.split(',') {
        let part = part.trim();
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        labels.insert(key.to_owned(), value.to_owned());
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_and_bare_values() {
        let labels = parse_labels(r#"driver="550.54",arch=hopper, rack='r12'"#);
        assert_eq!(labels.len(), 3);
        assert_eq!(labels["driver"], "550.54");
        assert_eq!(labels["arch"], "hopper");
        assert_eq!(labels["rack"], "r12");
    }

    #[test]
    fn skips_malformed_parts() {
        let labels = parse_labels("no-equals-sign,=empty-key,ok=1");
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["ok"], "1");
    }

    #[test]
    fn empty_input_gives_empty_map() {
        assert!(parse_labels("").is_empty());
    }
}

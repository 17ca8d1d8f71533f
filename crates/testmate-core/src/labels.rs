//! Display label disambiguation

use std::collections::HashMap;

/// Give every label that occurs more than once a `"{n}) "` prefix
///
/// Numbering starts at 1 per group and follows input order. Labels that are
/// unique are returned unchanged.
pub fn disambiguate<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        *totals.entry(label.as_ref()).or_default() += 1;
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    labels
        .iter()
        .map(|label| {
            let label = label.as_ref();
            if totals[label] < 2 {
                return label.to_string();
            }
            let index = seen.entry(label).or_default();
            *index += 1;
            format!("{index}) {label}")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_labels_unchanged() {
        assert_eq!(disambiguate(&["a", "b"]), ["a", "b"]);
        assert!(disambiguate::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_duplicates_are_numbered_in_order() {
        assert_eq!(
            disambiguate(&["Tests", "other", "Tests", "Tests"]),
            ["1) Tests", "other", "2) Tests", "3) Tests"]
        );
    }

    #[test]
    fn test_groups_are_numbered_independently() {
        assert_eq!(
            disambiguate(&["x", "y", "x", "y"]),
            ["1) x", "1) y", "2) x", "2) y"]
        );
    }

    #[test]
    fn test_idempotent_on_original_labels() {
        let orig = ["Tests", "Tests"];
        assert_eq!(disambiguate(&orig), disambiguate(&orig));
    }
}

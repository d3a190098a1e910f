//! Word tokenization and overlap helpers shared by the reducers.

use std::collections::HashSet;

/// Words of this length or shorter carry no topical signal.
const MIN_TOKEN_CHARS: usize = 2;

/// Lower-cased, whitespace-split words longer than two characters.
#[must_use]
pub fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > MIN_TOKEN_CHARS)
        .collect()
}

/// Jaccard similarity `|a ∩ b| / |a ∪ b|`; two empty sets score 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_words_are_dropped() {
        let tokens = token_set("I am on the Deploy box");
        assert!(tokens.contains("deploy"));
        assert!(tokens.contains("the"));
        assert!(!tokens.contains("am"));
        assert!(!tokens.contains("i"));
    }

    #[test]
    fn jaccard_of_identical_sets_is_one() {
        let a = token_set("restart the build server");
        assert!((jaccard(&a, &a) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_counts_shared_over_union() {
        let a = token_set("restart the build server");
        let b = token_set("restart the test server");
        // shared: restart, the, server; union adds build, test
        assert!((jaccard(&a, &b) - 0.6).abs() < 1e-9);
        assert!(jaccard(&token_set(""), &token_set("ok")).abs() < f64::EPSILON);
    }
}

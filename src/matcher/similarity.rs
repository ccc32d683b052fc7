use std::collections::HashSet;
use std::str::FromStr;

use strsim::{jaro, levenshtein};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::MatchError;

const JARO_WINKLER_PREFIX_CAP: usize = 4;
const JARO_WINKLER_SCALING: f64 = 0.1;
const NGRAM_PAD: char = ' ';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, EnumIter)]
pub enum Algorithm {
    #[strum(serialize = "Levenshtein Distance")]
    Levenshtein,
    #[strum(serialize = "Jaccard Similarity")]
    Jaccard,
    #[default]
    #[strum(serialize = "Jaro-Winkler Distance")]
    JaroWinkler,
}

impl Algorithm {
    pub fn from_name(name: &str) -> Result<Self, MatchError> {
        Algorithm::from_str(name).map_err(|_| MatchError::UnsupportedAlgorithm(name.to_string()))
    }
}

/// Similarity of `a` and `b` in `[0, 100]`, rounded to two decimals.
pub fn score(a: &str, b: &str, algorithm: Algorithm) -> f64 {
    let raw = match algorithm {
        Algorithm::Levenshtein => levenshtein_similarity(a, b),
        Algorithm::Jaccard => jaccard_similarity(a, b),
        Algorithm::JaroWinkler => jaro_winkler_similarity(a, b),
    };

    round2(raw.clamp(0.0, 100.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100.0;
    }

    let distance = levenshtein(a, b);
    (1.0 - distance as f64 / max_len as f64) * 100.0
}

fn ngrams(text: &str, n: usize) -> HashSet<String> {
    let pad = std::iter::repeat(NGRAM_PAD).take(n - 1);
    let padded = pad
        .clone()
        .chain(text.chars())
        .chain(pad)
        .collect::<Vec<char>>();

    padded
        .windows(n)
        .map(|window| window.iter().collect::<String>())
        .collect()
}

fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let min_len = a.chars().count().min(b.chars().count());
    let n = if min_len < 2 { 1 } else { 2 };

    let a_grams = ngrams(a, n);
    let b_grams = ngrams(b, n);

    let union = a_grams.union(&b_grams).count();
    if union == 0 {
        return 0.0;
    }

    let intersection = a_grams.intersection(&b_grams).count();
    intersection as f64 / union as f64 * 100.0
}

fn jaro_winkler_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let jaro_sim = jaro(a, b);
    let prefix = a
        .chars()
        .zip(b.chars())
        .take_while(|(a_char, b_char)| a_char == b_char)
        .take(JARO_WINKLER_PREFIX_CAP)
        .count();

    (jaro_sim + prefix as f64 * JARO_WINKLER_SCALING * (1.0 - jaro_sim)) * 100.0
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    const PAIRS: &[(&str, &str)] = &[
        ("sonic2", "sonik2"),
        ("Super Mario World (USA)", "Super Mario World"),
        ("zelda", "Legend of Zelda, The"),
        ("a", "b"),
        ("ab", "ba"),
        ("Castlevania", "Castlevania - Symphony of the Night"),
        ("x", "xylophone"),
    ];

    #[test]
    fn test_algorithm_names() {
        assert_eq!(
            Algorithm::from_name("Levenshtein Distance").unwrap(),
            Algorithm::Levenshtein
        );
        assert_eq!(
            Algorithm::from_name("Jaccard Similarity").unwrap(),
            Algorithm::Jaccard
        );
        assert_eq!(
            Algorithm::from_name("Jaro-Winkler Distance").unwrap(),
            Algorithm::JaroWinkler
        );
        assert_eq!(Algorithm::default(), Algorithm::JaroWinkler);
        assert_eq!(Algorithm::JaroWinkler.to_string(), "Jaro-Winkler Distance");
    }

    #[test]
    fn test_unsupported_algorithm() {
        match Algorithm::from_name("Soundex") {
            Err(MatchError::UnsupportedAlgorithm(name)) => assert_eq!(name, "Soundex"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_identity_is_100() {
        for algorithm in Algorithm::iter() {
            for text in ["a", "sonic2", "Final Fantasy VII (Disc 1)", "ポケモン"] {
                assert_eq!(score(text, text, algorithm), 100.0, "{} {}", algorithm, text);
            }
        }
    }

    #[test]
    fn test_range() {
        for algorithm in Algorithm::iter() {
            for (a, b) in PAIRS {
                let s = score(a, b, algorithm);
                assert!((0.0..=100.0).contains(&s), "{} {} {} = {}", algorithm, a, b, s);
            }
        }
    }

    #[test]
    fn test_symmetry() {
        for algorithm in Algorithm::iter() {
            for (a, b) in PAIRS {
                assert_eq!(score(a, b, algorithm), score(b, a, algorithm), "{}", algorithm);
            }
        }
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(score("", "", Algorithm::Levenshtein), 100.0);
        assert_eq!(score("kitten", "sitting", Algorithm::Levenshtein), 57.14);
        assert_eq!(score("abc", "", Algorithm::Levenshtein), 0.0);
        assert_eq!(score("sonic2", "sonik2", Algorithm::Levenshtein), 83.33);
    }

    #[test]
    fn test_jaccard() {
        // " a", "ab", "b " vs " a", "ac", "c "
        assert_eq!(score("ab", "ac", Algorithm::Jaccard), 20.0);
        // Unigrams when either side is shorter than two chars.
        assert_eq!(score("a", "abc", Algorithm::Jaccard), 33.33);
        assert_eq!(score("", "", Algorithm::Jaccard), 0.0);
        assert_eq!(score("", "abc", Algorithm::Jaccard), 0.0);
    }

    #[test]
    fn test_jaccard_padding_matches_spaces() {
        let grams = ngrams("a b", 2);
        assert!(grams.contains(" a"));
        assert!(grams.contains("a "));
        assert!(grams.contains(" b"));
        assert!(grams.contains("b "));
        assert_eq!(grams.len(), 4);
    }

    #[test]
    fn test_jaro_winkler() {
        assert_eq!(score("", "abc", Algorithm::JaroWinkler), 0.0);
        assert_eq!(score("", "", Algorithm::JaroWinkler), 0.0);
        assert_eq!(score("MARTHA", "MARHTA", Algorithm::JaroWinkler), 96.11);
        assert_eq!(score("DIXON", "DICKSONX", Algorithm::JaroWinkler), 81.33);
        assert_eq!(score("sonic2", "sonik2", Algorithm::JaroWinkler), 93.33);
    }

    #[test]
    fn test_jaro_winkler_prefix_is_capped() {
        // jaro = 0.9167 and the shared prefix is 7 long, only 4 count
        assert_eq!(score("abcdefgh", "abcdefgx", Algorithm::JaroWinkler), 95.0);
    }
}

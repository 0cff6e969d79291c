//! Title folding for exact title comparison.
//!
//! Two titles are considered equal when their keys match: NFKC-normalized,
//! case-folded, with typographic punctuation mapped to ASCII and all
//! whitespace removed. Nothing else is stripped, so "Title II" and
//! "Title 2" stay distinct.

use unicode_normalization::UnicodeNormalization;

/// Comparison key for a title.
pub fn title_key(s: &str) -> String {
    s.nfkc()
        .flat_map(char::to_lowercase)
        .filter(|c| !c.is_whitespace())
        .map(transliterate)
        .collect()
}

/// Whether two titles are the same ignoring case and spacing.
pub fn same_title(a: &str, b: &str) -> bool {
    let a = title_key(a);
    !a.is_empty() && a == title_key(b)
}

fn transliterate(c: char) -> char {
    match c {
        '\u{2019}' | '\u{2018}' | '\u{02BC}' => '\'', // curly quotes → straight
        '\u{201C}' | '\u{201D}' => '"',
        '\u{2013}' | '\u{2014}' => '-', // en/em dash → hyphen
        '\u{00D7}' => 'x',              // ×
        c => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullwidth_ascii() {
        assert_eq!(title_key("ＦＵＬＬＷＩＤＴＨ"), "fullwidth");
    }

    #[test]
    fn case_and_space_insensitive() {
        assert!(same_title("Sousou no Frieren", "sousou  no FRIEREN"));
        assert!(same_title("Bocchi the Rock!", "Bocchi the  Rock!"));
    }

    #[test]
    fn punctuation_is_significant() {
        assert!(!same_title("Bocchi the Rock!", "Bocchi the Rock"));
        assert!(!same_title("Title II", "Title 2"));
    }

    #[test]
    fn typographic_quotes() {
        assert!(same_title("Frieren: Beyond Journey\u{2019}s End", "Frieren: Beyond Journey's End"));
    }

    #[test]
    fn multiplication_sign() {
        assert!(same_title("Hunter\u{00D7}Hunter", "hunterxhunter"));
    }

    #[test]
    fn empty_never_matches() {
        assert!(!same_title("", ""));
        assert!(!same_title("   ", ""));
    }
}

//! Capitalization variants of a guess.
//!
//! Only word fragments are touched, digits and symbols always keep their
//! original form.

use crate::grammar::tagging::is_gap_tag;

/// Upper cases the first character of `s`
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Expands a decoded guess into its capitalization variants.
///
/// `fragments` pairs every terminal with whether it is a gap. The variants are
/// all lower case, all upper case, each word capitalized (when different from
/// upper case) and only the first character capitalized (when different from
/// the previous one). A guess made only of gaps has the single variant of its
/// concatenation.
///
/// ```rust
/// use semantic_guesser_rs::guesser::mangle::mangle;
///
/// let variants = mangle(&[("i", false), ("love", false), ("you", false), ("123", true)]);
/// assert!(variants == vec!["iloveyou123", "ILOVEYOU123", "ILoveYou123", "Iloveyou123"]);
///
/// let gaps = mangle(&[("123", true), ("!", true)]);
/// assert!(gaps == vec!["123!"]);
/// ```
pub fn mangle(fragments: &[(&str, bool)]) -> Vec<String> {
    if fragments.iter().all(|&(_, gap)| gap) {
        return vec![fragments.iter().map(|&(t, _)| t).collect()];
    }

    let mut lower = String::new();
    let mut upper = String::new();
    let mut camel = String::new();
    for &(terminal, gap) in fragments {
        if gap {
            lower.push_str(terminal);
            upper.push_str(terminal);
            camel.push_str(terminal);
        } else {
            let lowered = terminal.to_lowercase();
            upper.push_str(&terminal.to_uppercase());
            camel.push_str(&capitalize(&lowered));
            lower.push_str(&lowered);
        }
    }
    let title = capitalize(&lower);
    let title = (title != camel).then_some(title);
    let camel = (camel != upper).then_some(camel);

    [Some(lower), Some(upper), camel, title]
        .into_iter()
        .flatten()
        .collect()
}

/// Whether each tag of a rule is a gap
pub fn gap_flags<S: AsRef<str>>(tags: &[S]) -> Vec<bool> {
    tags.iter().map(|tag| is_gap_tag(tag.as_ref())).collect()
}

use std::sync::LazyLock;

use regex::Regex;

/// Clause delimiters: punctuation, newlines and common conjunctions.
static CLAUSE_DELIMITERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[,;.\n]|\band\b|\bwith\b|\bbut\b").unwrap());

/// Leading cues that mark a fragment as a negated finding.
static NEGATION_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:no|not|without|denies|denied|negative\s+for|absent|absence\s+of)\b").unwrap()
});

/// True when the fragment states an absent finding ("No hearing loss").
/// Such fragments belong to exclusion extraction, never to observed terms.
pub fn is_negated(fragment: &str) -> bool {
    NEGATION_CUE.is_match(fragment.trim_start())
}

/// Split free text into candidate phenotype fragments. Fragments are trimmed;
/// empty ones are dropped.
pub fn split_fragments(text: &str) -> Vec<String> {
    CLAUSE_DELIMITERS
        .split(text)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

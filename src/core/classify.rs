//! Free-text classification of crews and outcomes
//!
//! Operators type labels in Cyrillic, storage and integrations use Latin;
//! both spellings of the same word must land on the same token before any
//! rule runs.

use crate::core::types::{Category, Outcome};

const MOLNIYA_TOKEN: &str = "МОЛНІЯ";
const OPTIC_TOKEN: &str = "OPTIC";
const FPV_TOKEN: &str = "FPV";

/// Known spellings folded to a canonical token, longest first within a token
const SCRIPT_VARIANTS: &[(&str, &str)] = &[
    ("MOLNIYA", MOLNIYA_TOKEN),
    ("MOLNIJA", MOLNIYA_TOKEN),
    ("MOLNIA", MOLNIYA_TOKEN),
    ("МОЛНИЯ", MOLNIYA_TOKEN),
    ("ОПТОВОЛОКНО", OPTIC_TOKEN),
    ("ОПТИКА", OPTIC_TOKEN),
    ("ОПТИК", OPTIC_TOKEN),
    ("FIBRE", OPTIC_TOKEN),
    ("FIBER", OPTIC_TOKEN),
    // OPTIC after look-alike folding
    ("ОРТІС", OPTIC_TOKEN),
    ("ФПВ", FPV_TOKEN),
];

/// Outcome keywords in priority order; matched against lowercased text
const OUTCOME_KEYWORDS: &[(Outcome, &[&str])] = &[
    (Outcome::Destroyed, &["збито", "shot down", "destroyed"]),
    (Outcome::Suppressed, &["подавл", "реб", "suppress", "jammed"]),
    (Outcome::Lost, &["зник", "lost"]),
    (Outcome::Strike, &["удар", "strike"]),
];

fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}')
}

/// Latin capital that renders identically to a Cyrillic one
fn cyrillic_twin(c: char) -> Option<char> {
    let twin = match c {
        'A' => 'А',
        'B' => 'В',
        'C' => 'С',
        'E' => 'Е',
        'H' => 'Н',
        'I' => 'І',
        'K' => 'К',
        'M' => 'М',
        'O' => 'О',
        'P' => 'Р',
        'T' => 'Т',
        'X' => 'Х',
        'Y' => 'У',
        _ => return None,
    };
    Some(twin)
}

/// Append a run of letters, folded to Cyrillic if it mixes Cyrillic with Latin look-alikes only
fn push_run(out: &mut String, run: &mut String) {
    let foldable = run.chars().any(is_cyrillic)
        && run.chars().all(|c| is_cyrillic(c) || cyrillic_twin(c).is_some());
    if foldable {
        out.extend(run.chars().map(|c| cyrillic_twin(c).unwrap_or(c)));
    } else {
        out.push_str(run);
    }
    run.clear();
}

/// Swap Latin look-alikes for their Cyrillic twins inside mixed-script runs of letters.
///
/// Any non-letter ends a run, so "MOLNIYA-ФПВ" keeps its Latin half intact.
fn fold_homoglyphs(upper: &str) -> String {
    let mut out = String::with_capacity(upper.len());
    let mut run = String::new();
    for c in upper.chars() {
        if c.is_alphabetic() {
            run.push(c);
        } else {
            push_run(&mut out, &mut run);
            out.push(c);
        }
    }
    push_run(&mut out, &mut run);
    out
}

/// Trim, uppercase, fold look-alike letters and known spellings to canonical tokens
pub(crate) fn normalize_label(raw: &str) -> String {
    let mut text = fold_homoglyphs(&raw.trim().to_uppercase());
    for (variant, token) in SCRIPT_VARIANTS {
        if text.contains(variant) {
            text = text.replace(variant, token);
        }
    }
    text
}

/// Assign exactly one category. MOLNIYA wins over OPTIC; FPV is everything else.
pub(crate) fn classify(category_raw: &str) -> Category {
    let normalized = normalize_label(category_raw);
    if normalized.contains(MOLNIYA_TOKEN) {
        Category::Molniya
    } else if normalized.contains(OPTIC_TOKEN) {
        Category::Optic
    } else {
        Category::Fpv
    }
}

/// Outcome beyond DETECTED, if any keyword matches; first in priority order wins
pub(crate) fn classify_outcome(outcome_raw: &str) -> Option<Outcome> {
    let lower = outcome_raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    OUTCOME_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(outcome, _)| *outcome)
}

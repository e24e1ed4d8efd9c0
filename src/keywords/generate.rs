//! Keyword combination generator. Classified tokens are combined at three
//! specificity levels, joined in the marketplace's canonical category order,
//! scored by summed weight, and deduplicated case-insensitively.

use std::collections::HashSet;

use crate::keywords::classify::{ClassifiedToken, TokenCategory};

const MAX_KEYWORD_LEN: usize = 50;
const MIN_WORDS: usize = 2;
const MAX_WORDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Specific,
    Medium,
    Broad,
}

#[derive(Debug, Clone)]
pub struct GeneratedKeyword {
    pub keyword: String,
    pub score: i32,
    pub level: Level,
}

pub fn generate_keywords(tokens: &[ClassifiedToken], max_count: usize) -> Vec<GeneratedKeyword> {
    // Promotional noise never makes it into a candidate.
    let valid: Vec<&ClassifiedToken> = tokens
        .iter()
        .filter(|t| t.category != TokenCategory::Modifier)
        .collect();
    if valid.is_empty() {
        return Vec::new();
    }

    let first_of = |cat: TokenCategory| valid.iter().find(|t| t.category == cat).copied();
    let models = first_of(TokenCategory::Model);
    let brands = first_of(TokenCategory::Brand);
    let types = first_of(TokenCategory::Type);
    let series = first_of(TokenCategory::Series);
    let features: Vec<&ClassifiedToken> = valid
        .iter()
        .filter(|t| t.category == TokenCategory::Feature)
        .copied()
        .collect();
    let extra = first_of(TokenCategory::Capacity).or_else(|| first_of(TokenCategory::Quantity));

    let mut candidates: Vec<GeneratedKeyword> = Vec::new();

    // Specific — anchored on the model number.
    if let Some(model) = models {
        if let Some(t) = types {
            push_combo(&mut candidates, &[t, model], Level::Specific);
        }
        if let Some(b) = brands {
            push_combo(&mut candidates, &[b, model], Level::Specific);
        }
        if candidates.len() < 2 {
            candidates.push(GeneratedKeyword {
                keyword: model.text.clone(),
                score: model.weight,
                level: Level::Specific,
            });
        }
    }

    // Medium — brand/series pairs, optionally suffixed by capacity/quantity.
    if let (Some(b), Some(t)) = (brands, types) {
        push_combo(&mut candidates, &[b, t], Level::Medium);
        if let Some(x) = extra {
            push_combo(&mut candidates, &[b, t, x], Level::Medium);
        }
    }
    if let (Some(s), Some(t)) = (series, types) {
        push_combo(&mut candidates, &[s, t], Level::Medium);
    }
    if let (Some(b), Some(s)) = (brands, series) {
        push_combo(&mut candidates, &[b, s], Level::Medium);
    }

    // Broad — generic discovery terms.
    if let Some(t) = types {
        if let Some(f) = features.first() {
            push_combo(&mut candidates, &[f, t], Level::Broad);
        } else {
            candidates.push(GeneratedKeyword {
                keyword: t.text.clone(),
                score: t.weight,
                level: Level::Broad,
            });
        }
    } else if features.len() >= 2 {
        push_combo(&mut candidates, &features[..2], Level::Broad);
    }

    // Fallback: whole-name combination when the structured combos are thin.
    if candidates.len() < 2 {
        let head: Vec<&ClassifiedToken> = valid.iter().take(MAX_WORDS).copied().collect();
        let text = join_ordered(&head);
        if !text.is_empty() && text.len() <= MAX_KEYWORD_LEN {
            candidates.push(GeneratedKeyword {
                score: head.iter().map(|t| t.weight).sum(),
                keyword: text,
                level: Level::Medium,
            });
        }
    }

    candidates.sort_by_key(|c| -c.score);
    let mut seen: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.keyword.to_lowercase()))
        .take(max_count)
        .collect()
}

fn push_combo(candidates: &mut Vec<GeneratedKeyword>, tokens: &[&ClassifiedToken], level: Level) {
    let text = join_ordered(tokens);
    if text.is_empty() || text.len() > MAX_KEYWORD_LEN {
        return;
    }
    // Single-word candidates only make sense at the specific level (a bare
    // model number is searchable; a bare color is not).
    if text.split_whitespace().count() < MIN_WORDS && level != Level::Specific {
        return;
    }
    candidates.push(GeneratedKeyword {
        score: tokens.iter().map(|t| t.weight).sum(),
        keyword: text,
        level,
    });
}

fn join_ordered(tokens: &[&ClassifiedToken]) -> String {
    let mut sorted: Vec<&ClassifiedToken> = tokens.to_vec();
    sorted.sort_by_key(|t| t.category.canonical_order());
    sorted
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

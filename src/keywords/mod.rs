//! Keyword generation: product name → ranked search keyword candidates.
//! Token classification feeds the combination generator; a DB-derived
//! brand/category dictionary (24-h TTL) supplements the static word lists.

pub mod classify;
pub mod dictionary;
pub mod generate;

use std::collections::HashSet;

pub use classify::{classify_tokens, ClassifiedToken, TokenCategory};
pub use dictionary::DictCache;
pub use generate::{generate_keywords, GeneratedKeyword};

/// Full pipeline: strip the tenant's store label off the product name,
/// classify, combine. Returns at most `max_count` keyword texts, best first.
pub fn suggest_keywords(
    product_name: &str,
    store_label: Option<&str>,
    db_brands: &HashSet<String>,
    db_types: &HashSet<String>,
    max_count: usize,
) -> Vec<String> {
    let name = strip_store_label(product_name, store_label);
    let tokens = classify_tokens(&name, db_brands, db_types);
    generate_keywords(&tokens, max_count)
        .into_iter()
        .map(|k| k.keyword)
        .collect()
}

/// Remove the store's own label (and its spaceless variant) from a product
/// name so it never leaks into generated keywords.
pub fn strip_store_label(name: &str, store_label: Option<&str>) -> String {
    let mut out = name.to_string();
    if let Some(label) = store_label {
        let label = label.trim();
        if !label.is_empty() {
            out = remove_ignore_case(&out, label);
            let compact = label.replace(' ', "");
            if compact != label {
                out = remove_ignore_case(&out, &compact);
            }
        }
    }
    out.trim().to_string()
}

fn remove_ignore_case(haystack: &str, needle: &str) -> String {
    let lower_hay = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    // Lowercasing can shift byte offsets for a handful of characters; bail
    // out to exact matching when it does.
    if lower_hay.len() != haystack.len() || lower_needle.len() != needle.len() {
        return haystack.replace(needle, "");
    }
    let mut out = String::with_capacity(haystack.len());
    let mut pos = 0;
    while let Some(found) = lower_hay[pos..].find(&lower_needle) {
        let start = pos + found;
        out.push_str(&haystack[pos..start]);
        pos = start + lower_needle.len();
    }
    out.push_str(&haystack[pos..]);
    out
}

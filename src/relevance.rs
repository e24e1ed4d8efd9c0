use std::collections::HashSet;

use crate::db::models::ProductRow;
use crate::types::{Listing, RelevanceReason, Verdict};

/// Everything the classifier needs besides the listing itself. Sets are
/// preloaded per product by the coordinator's plan phase.
pub struct RelevanceContext<'a> {
    pub product: &'a ProductRow,
    /// Blacklisted listing_ids for this product.
    pub blacklist: &'a HashSet<String>,
    /// Force-included listing_ids for this product.
    pub include_overrides: &'a HashSet<String>,
    /// Every own_listing_id registered under the tenant, across products.
    pub own_listing_ids: &'a HashSet<String>,
}

/// Decide whether a listing competes with the catalog product. Pure and
/// total; first matching rule wins and its reason is persisted verbatim.
pub fn classify(listing: &Listing, ctx: &RelevanceContext<'_>) -> Verdict {
    let id = listing.listing_id.as_str();

    if !id.is_empty() && ctx.blacklist.contains(id) {
        return rejected(RelevanceReason::ManualBlacklist);
    }

    // The tenant's other SKUs are not competitors.
    if !id.is_empty() && ctx.own_listing_ids.contains(id) {
        return rejected(RelevanceReason::MyProduct);
    }

    if !id.is_empty() && ctx.include_overrides.contains(id) {
        return Verdict {
            relevant: true,
            reason: Some(RelevanceReason::IncludedOverride),
        };
    }

    let total = listing.price + listing.shipping_fee;
    let selling = ctx.product.selling_price;
    if let Some(min_pct) = ctx.product.price_filter_min_pct {
        if total < selling * min_pct / 100 {
            return rejected(RelevanceReason::PriceFilterMin);
        }
    }
    if let Some(max_pct) = ctx.product.price_filter_max_pct {
        if total > selling * max_pct / 100 {
            return rejected(RelevanceReason::PriceFilterMax);
        }
    }

    if let Some(model_code) = ctx.product.model_code.as_deref() {
        if !model_code.is_empty() && !contains_ignore_case(&listing.title, model_code) {
            return rejected(RelevanceReason::ModelCode);
        }
    }

    for required in ctx.product.spec_keyword_list() {
        if !contains_ignore_case(&listing.title, &required) {
            return rejected(RelevanceReason::SpecKeywords);
        }
    }

    Verdict {
        relevant: true,
        reason: None,
    }
}

fn rejected(reason: RelevanceReason) -> Verdict {
    Verdict {
        relevant: false,
        reason: Some(reason),
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ProductRow;
    use crate::types::now_secs;

    fn product() -> ProductRow {
        ProductRow {
            id: 1,
            tenant_id: 1,
            name: "테스트 상품".to_string(),
            category: None,
            cost_price: 10000,
            selling_price: 20000,
            own_listing_id: Some("OWN1".to_string()),
            model_code: None,
            spec_keywords: None,
            price_filter_min_pct: None,
            price_filter_max_pct: None,
            price_locked: false,
            is_active: true,
            created_at: now_secs(),
            updated_at: now_secs(),
        }
    }

    fn listing(id: &str, title: &str, price: i64) -> Listing {
        Listing {
            listing_id: id.to_string(),
            title: title.to_string(),
            price,
            ..Default::default()
        }
    }

    fn ctx<'a>(
        product: &'a ProductRow,
        blacklist: &'a HashSet<String>,
        includes: &'a HashSet<String>,
        own: &'a HashSet<String>,
    ) -> RelevanceContext<'a> {
        RelevanceContext {
            product,
            blacklist,
            include_overrides: includes,
            own_listing_ids: own,
        }
    }

    #[test]
    fn blacklist_wins_over_model_code() {
        let mut p = product();
        p.model_code = Some("X7".to_string());
        let blacklist: HashSet<String> = ["B1".to_string()].into();
        let empty = HashSet::new();

        let v = classify(&listing("B1", "X7 gadget", 15000), &ctx(&p, &blacklist, &empty, &empty));
        assert!(!v.relevant);
        assert_eq!(v.reason, Some(RelevanceReason::ManualBlacklist));
    }

    #[test]
    fn own_listing_excluded_as_my_product() {
        let p = product();
        let empty = HashSet::new();
        let own: HashSet<String> = ["OWN1".to_string()].into();

        let v = classify(&listing("OWN1", "내 상품", 19500), &ctx(&p, &empty, &empty, &own));
        assert!(!v.relevant);
        assert_eq!(v.reason, Some(RelevanceReason::MyProduct));
    }

    #[test]
    fn include_override_bypasses_filters() {
        let mut p = product();
        p.model_code = Some("ZZ9".to_string());
        p.price_filter_min_pct = Some(50);
        let empty = HashSet::new();
        let includes: HashSet<String> = ["I1".to_string()].into();

        // Fails both the model-code and min-price filters, but is forced in.
        let v = classify(&listing("I1", "다른 상품", 100), &ctx(&p, &empty, &includes, &empty));
        assert!(v.relevant);
        assert_eq!(v.reason, Some(RelevanceReason::IncludedOverride));
    }

    #[test]
    fn price_filters_use_total_with_shipping() {
        let mut p = product();
        p.price_filter_min_pct = Some(50);
        p.price_filter_max_pct = Some(200);
        let empty = HashSet::new();

        let mut cheap = listing("C1", "상품", 9000);
        cheap.shipping_fee = 500;
        let v = classify(&cheap, &ctx(&p, &empty, &empty, &empty));
        assert_eq!(v.reason, Some(RelevanceReason::PriceFilterMin));

        // 9_500 + 600 shipping crosses the 10_000 floor.
        cheap.shipping_fee = 1100;
        let v = classify(&cheap, &ctx(&p, &empty, &empty, &empty));
        assert!(v.relevant);

        let expensive = listing("C2", "상품", 50000);
        let v = classify(&expensive, &ctx(&p, &empty, &empty, &empty));
        assert_eq!(v.reason, Some(RelevanceReason::PriceFilterMax));
    }

    #[test]
    fn model_code_match_is_case_insensitive() {
        let mut p = product();
        p.model_code = Some("rf85b".to_string());
        let empty = HashSet::new();

        let v = classify(
            &listing("M1", "삼성 냉장고 RF85B9121AP", 18000),
            &ctx(&p, &empty, &empty, &empty),
        );
        assert!(v.relevant);

        let v = classify(&listing("M2", "삼성 냉장고", 18000), &ctx(&p, &empty, &empty, &empty));
        assert_eq!(v.reason, Some(RelevanceReason::ModelCode));
    }

    #[test]
    fn spec_keywords_all_required() {
        let mut p = product();
        p.spec_keywords = Some(r#"["무선","청소기"]"#.to_string());
        let empty = HashSet::new();

        let v = classify(
            &listing("S1", "무선 청소기 신형", 18000),
            &ctx(&p, &empty, &empty, &empty),
        );
        assert!(v.relevant);

        let v = classify(&listing("S2", "유선 청소기", 18000), &ctx(&p, &empty, &empty, &empty));
        assert_eq!(v.reason, Some(RelevanceReason::SpecKeywords));
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let p = product();
        let empty = HashSet::new();
        let l = listing("D1", "상품", 18000);
        let first = classify(&l, &ctx(&p, &empty, &empty, &empty));
        for _ in 0..10 {
            assert_eq!(classify(&l, &ctx(&p, &empty, &empty, &empty)), first);
        }
    }
}

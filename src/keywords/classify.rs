//! Token classification for the keyword generator. Pattern checks are plain
//! character scans in a fixed order; static word lists cover the common
//! Korean retail vocabulary and the DB dictionary catches the long tail.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenCategory {
    Model,
    Brand,
    Type,
    Series,
    Capacity,
    Quantity,
    Size,
    Color,
    Material,
    Feature,
    Modifier,
}

impl TokenCategory {
    pub fn weight(self) -> i32 {
        match self {
            TokenCategory::Model => 10,
            TokenCategory::Brand => 9,
            TokenCategory::Type => 9,
            TokenCategory::Series => 7,
            TokenCategory::Capacity => 5,
            TokenCategory::Quantity => 4,
            TokenCategory::Size => 4,
            TokenCategory::Color => 3,
            TokenCategory::Material => 3,
            TokenCategory::Feature => 3,
            TokenCategory::Modifier => -2,
        }
    }

    /// Position in the marketplace's standard product-name ordering; keyword
    /// candidates join their tokens in this order.
    pub fn canonical_order(self) -> usize {
        match self {
            TokenCategory::Brand => 0,
            TokenCategory::Series => 1,
            TokenCategory::Model => 2,
            TokenCategory::Type => 3,
            TokenCategory::Color => 4,
            TokenCategory::Material => 5,
            TokenCategory::Quantity => 6,
            TokenCategory::Size => 7,
            TokenCategory::Capacity => 8,
            TokenCategory::Feature => 9,
            TokenCategory::Modifier => 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedToken {
    pub text: String,
    pub category: TokenCategory,
    pub weight: i32,
}

impl ClassifiedToken {
    fn new(text: &str, category: TokenCategory) -> Self {
        Self {
            text: text.to_string(),
            weight: category.weight(),
            category,
        }
    }
}

const CAPACITY_UNITS: &[&str] = &["ml", "l", "g", "kg", "oz", "cc", "리터"];

const SIZE_UNITS: &[&str] = &["cm", "mm", "m", "인치", "inch"];

const SIZE_WORDS: &[&str] = &[
    "소형", "중형", "대형", "특대형", "특대", "미니", "점보", "슬림", "와이드", "컴팩트",
    "mini", "slim", "wide", "compact", "small", "medium", "large", "jumbo",
];

const QUANTITY_UNITS: &[&str] = &[
    "개입", "개", "매", "장", "롤", "팩", "박스", "캔", "병", "봉", "포", "세트", "묶음",
    "켤레", "족", "입", "ea", "pcs", "pack",
];

const BRANDS: &[&str] = &[
    // 한국 대형 브랜드
    "삼성", "삼성전자", "lg", "lg전자", "현대", "sk", "cj", "롯데", "카카오", "쿠쿠",
    "위니아", "대우", "한화", "코웨이",
    // 글로벌
    "apple", "아이폰", "갤럭시", "sony", "소니", "philips", "필립스", "dyson", "다이슨",
    "bosch", "보쉬", "panasonic", "파나소닉", "xiaomi", "샤오미", "lenovo", "레노버",
    "hp", "dell", "asus", "nike", "나이키", "adidas", "아디다스", "뉴발란스",
    // 식품/생활
    "오뚜기", "농심", "풀무원", "해태", "크라운", "빙그레", "매일유업", "남양유업",
    "동서식품", "삼양", "오리온", "하림", "청정원", "비비고",
    // 가구/뷰티/유아
    "한샘", "이케아", "시디즈", "일룸", "리바트", "아모레", "이니스프리", "설화수",
    "라네즈", "미샤", "하기스", "팸퍼스", "유한킴벌리", "깨끗한나라",
    // 기타
    "3m", "듀라셀", "에너자이저", "코카콜라", "펩시", "무인양품", "다이소", "모나미",
    "스타벅스",
];

const COLORS: &[&str] = &[
    "빨강", "빨간", "레드", "red", "파랑", "파란", "블루", "blue", "초록", "그린",
    "green", "노랑", "노란", "옐로우", "yellow", "검정", "검은", "블랙", "black",
    "흰", "화이트", "white", "회색", "그레이", "gray", "grey", "핑크", "pink",
    "보라", "퍼플", "purple", "오렌지", "orange", "베이지", "beige", "브라운",
    "brown", "갈색", "네이비", "navy", "민트", "mint", "아이보리", "ivory", "골드",
    "gold", "실버", "silver", "로즈골드",
];

const MATERIALS: &[&str] = &[
    "스테인리스", "스틸", "알루미늄", "실리콘", "나무", "원목", "대나무", "유리",
    "도자기", "세라믹", "플라스틱", "가죽", "천연가죽", "인조가죽", "면", "실크",
    "린넨", "폴리에스터", "나일론", "울", "캐시미어", "고무", "티타늄", "구리", "황동",
];

const MODIFIERS: &[&str] = &[
    "무료배송", "당일배송", "즉시배송", "빠른배송", "할인", "특가", "세일", "이벤트",
    "프로모션", "정품", "병행수입", "국내배송", "해외직구", "추천", "인기", "베스트",
    "1위", "판매1위", "새상품", "리퍼", "중고", "전시품", "무료", "사은품", "증정",
    "덤", "국산", "수입", "정식수입",
];

/// Split a product name into tokens and classify each. `db_brands` and
/// `db_types` are the lowercased DB-dictionary sets.
pub fn classify_tokens(
    product_name: &str,
    db_brands: &HashSet<String>,
    db_types: &HashSet<String>,
) -> Vec<ClassifiedToken> {
    tokenize(product_name)
        .iter()
        .map(|token| classify_single(token, db_brands, db_types))
        .collect()
}

pub fn tokenize(name: &str) -> Vec<String> {
    let name = crate::fetcher::strip_html(name);
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | '(' | ')' | '{' | '}' => ' ',
            ',' | '·' | '/' | '+' | '|' | '~' | '!' | '@' | '#' | '$' | '%' | '^' | '&'
            | '*' | '=' => ' ',
            _ => c,
        })
        .collect();

    cleaned
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

fn classify_single(
    token: &str,
    db_brands: &HashSet<String>,
    db_types: &HashSet<String>,
) -> ClassifiedToken {
    let lower = token.to_lowercase();

    // Pattern stage. Capacity/size/quantity run before model so "870L" stays
    // a capacity and "2030W" a model.
    if is_capacity(&lower) {
        return ClassifiedToken::new(token, TokenCategory::Capacity);
    }
    if is_size(&lower) {
        return ClassifiedToken::new(token, TokenCategory::Size);
    }
    if is_quantity(&lower) {
        return ClassifiedToken::new(token, TokenCategory::Quantity);
    }
    if is_model(token) {
        return ClassifiedToken::new(token, TokenCategory::Model);
    }

    // Static dictionaries.
    if MODIFIERS.contains(&lower.as_str()) {
        return ClassifiedToken::new(token, TokenCategory::Modifier);
    }
    if COLORS.contains(&lower.as_str()) {
        return ClassifiedToken::new(token, TokenCategory::Color);
    }
    if MATERIALS.contains(&lower.as_str()) {
        return ClassifiedToken::new(token, TokenCategory::Material);
    }
    if BRANDS.contains(&lower.as_str()) {
        return ClassifiedToken::new(token, TokenCategory::Brand);
    }

    // DB dictionary.
    if db_brands.contains(&lower) {
        return ClassifiedToken::new(token, TokenCategory::Brand);
    }
    if db_types.contains(&lower) {
        return ClassifiedToken::new(token, TokenCategory::Type);
    }

    ClassifiedToken::new(token, TokenCategory::Feature)
}

/// Digits (optionally fractional) followed by a capacity unit: 200ml, 1.5L.
fn is_capacity(lower: &str) -> bool {
    numeric_with_suffix(lower, CAPACITY_UNITS, true)
}

/// Digits + length unit (45cm) or a bare size word (미니, slim).
fn is_size(lower: &str) -> bool {
    numeric_with_suffix(lower, SIZE_UNITS, true) || SIZE_WORDS.contains(&lower)
}

/// Digits + counter suffix: 10개입, 2팩, 30pcs.
fn is_quantity(lower: &str) -> bool {
    numeric_with_suffix(lower, QUANTITY_UNITS, false)
}

fn numeric_with_suffix(lower: &str, suffixes: &[&str], allow_fraction: bool) -> bool {
    for suffix in suffixes {
        if let Some(head) = lower.strip_suffix(suffix) {
            if head.is_empty() {
                continue;
            }
            let mut seen_dot = false;
            let numeric = head.chars().all(|c| {
                if c == '.' && allow_fraction && !seen_dot {
                    seen_dot = true;
                    true
                } else {
                    c.is_ascii_digit()
                }
            });
            if numeric && head.chars().any(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }
    false
}

/// Model-number shapes, ASCII alphanumerics only:
/// - alpha prefix (1..=5) + digits + at least 2 more alphanumerics (RF85B9121AP)
/// - up to 3 alpha + a run of 5+ digits + anything (SL12345, 88231)
/// - 3-4 digits + 2+ alpha + optional digits (2030WX)
fn is_model(token: &str) -> bool {
    if token.len() < 4 || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    let bytes = token.as_bytes();

    let alpha_prefix = bytes.iter().take_while(|b| b.is_ascii_alphabetic()).count();
    let after_prefix = &bytes[alpha_prefix..];
    let digit_run = after_prefix.iter().take_while(|b| b.is_ascii_digit()).count();

    // Alpha prefix + digits + >=2 trailing characters. Trailing may itself
    // contain digits (SL2030W = SL + 203 + 0W), so count from the first digit.
    if (1..=5).contains(&alpha_prefix) && digit_run >= 1 && bytes.len() - alpha_prefix - 1 >= 2 {
        return true;
    }

    // A 5+ digit run anywhere behind at most 3 leading alphas.
    if alpha_prefix <= 3 && digit_run >= 5 {
        return true;
    }

    // 3-4 digits, then letters, then optional digits.
    if alpha_prefix == 0 && (3..=4).contains(&digit_run) {
        let rest = &bytes[digit_run..];
        let alpha_run = rest.iter().take_while(|b| b.is_ascii_alphabetic()).count();
        if alpha_run >= 2 && rest[alpha_run..].iter().all(|b| b.is_ascii_digit()) {
            return true;
        }
    }

    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_one(token: &str) -> TokenCategory {
        let empty = HashSet::new();
        classify_single(token, &empty, &empty).category
    }

    #[test]
    fn capacity_checked_before_model() {
        assert_eq!(classify_one("870L"), TokenCategory::Capacity);
        assert_eq!(classify_one("200ml"), TokenCategory::Capacity);
        assert_eq!(classify_one("1.5L"), TokenCategory::Capacity);
    }

    #[test]
    fn quantity_and_size_tokens() {
        assert_eq!(classify_one("10개입"), TokenCategory::Quantity);
        assert_eq!(classify_one("2팩"), TokenCategory::Quantity);
        assert_eq!(classify_one("30pcs"), TokenCategory::Quantity);
        assert_eq!(classify_one("45cm"), TokenCategory::Size);
        assert_eq!(classify_one("미니"), TokenCategory::Size);
        assert_eq!(classify_one("slim"), TokenCategory::Size);
    }

    #[test]
    fn model_shapes() {
        assert_eq!(classify_one("RF85B9121AP"), TokenCategory::Model);
        assert_eq!(classify_one("SL2030W"), TokenCategory::Model);
        assert_eq!(classify_one("88231457"), TokenCategory::Model);
        assert_eq!(classify_one("2030WX"), TokenCategory::Model);
        // Too short / not alphanumeric.
        assert_ne!(classify_one("ab1"), TokenCategory::Model);
        assert_ne!(classify_one("무선"), TokenCategory::Model);
    }

    #[test]
    fn dictionary_stages_in_order() {
        assert_eq!(classify_one("삼성"), TokenCategory::Brand);
        assert_eq!(classify_one("블랙"), TokenCategory::Color);
        assert_eq!(classify_one("스테인리스"), TokenCategory::Material);
        assert_eq!(classify_one("무료배송"), TokenCategory::Modifier);
        assert_eq!(classify_one("청소기"), TokenCategory::Feature);
    }

    #[test]
    fn db_dictionary_supplies_brand_and_type() {
        let brands: HashSet<String> = ["브랜드엑스".to_string()].into();
        let types: HashSet<String> = ["가습기".to_string()].into();
        assert_eq!(
            classify_single("브랜드엑스", &brands, &types).category,
            TokenCategory::Brand
        );
        assert_eq!(
            classify_single("가습기", &brands, &types).category,
            TokenCategory::Type
        );
    }

    #[test]
    fn tokenizer_preserves_units_and_drops_brackets() {
        let tokens = tokenize("[특가] 삼성·무선청소기 (200ml) 10개입");
        assert_eq!(tokens, vec!["특가", "삼성", "무선청소기", "200ml", "10개입"]);
    }

    #[test]
    fn tokenizer_strips_html() {
        let tokens = tokenize("<b>삼성</b> 청소기");
        assert_eq!(tokens, vec!["삼성", "청소기"]);
    }
}

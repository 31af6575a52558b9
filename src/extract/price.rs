// src/extract/price.rs
//! Price text → integer minor units.
//!
//! Accepts ASCII or full-width digits, thousands separators, currency glyphs and
//! surrounding words ("税込 ￥２，８００円"). Anything without a readable amount is
//! an error; there is no zero fallback.
//!
//! Amounts touching kanji numerals ("1万円"), negative amounts and broken digit
//! groups ("12,34") are rejected rather than read as the leading digits.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ExtractionError;
use crate::model::Currency;

static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{1,3}(?:[,'][0-9]{3})+|[0-9]+)(?:\.([0-9]+))?").expect("amount regex")
});

/// Full-width digits and separators to their ASCII forms.
pub fn fold_numerals(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '，' | '、' => ',',
            '．' => '.',
            _ => c,
        })
        .collect()
}

pub fn parse_price(raw: &str, currency: Currency) -> Result<i64, ExtractionError> {
    let bad = || ExtractionError::BadPrice(raw.to_string());

    let folded = fold_numerals(raw);
    let caps = RE_AMOUNT.captures(&folded).ok_or_else(bad)?;
    let amount = caps.get(0).ok_or_else(bad)?;
    if !amount_stands_alone(&folded, amount.start(), amount.end()) {
        return Err(bad());
    }

    let whole: String = caps
        .get(1)
        .map(|m| m.as_str())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let frac = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    let exp = currency.minor_unit_exponent() as usize;
    let frac = frac.trim_end_matches('0');
    if frac.len() > exp {
        return Err(bad());
    }
    let mut minor_digits = whole;
    minor_digits.push_str(frac);
    minor_digits.extend(std::iter::repeat('0').take(exp - frac.len()));

    minor_digits.parse::<i64>().map_err(|_| bad())
}

fn is_kanji_numeral(c: char) -> bool {
    matches!(
        c,
        '〇' | '一' | '二' | '三' | '四' | '五' | '六' | '七' | '八' | '九' | '十' | '百' | '千'
            | '万' | '萬' | '億' | '兆'
    )
}

/// The matched amount must be the whole number: no sign in front, no kanji
/// multiplier on either side, no digit group continuing past the match.
fn amount_stands_alone(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let mut after = text[end..].chars();
    let next = after.next();
    let next_next = after.next();

    if matches!(before, Some('-' | '−' | '－' | '▲')) {
        return false;
    }
    if before.is_some_and(is_kanji_numeral) || next.is_some_and(is_kanji_numeral) {
        return false;
    }
    match next {
        Some(c) if c.is_ascii_digit() => false,
        Some(',' | '\'' | '.') => !next_next.is_some_and(|c| c.is_ascii_digit()),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpy(s: &str) -> Result<i64, ExtractionError> {
        parse_price(s, Currency::Jpy)
    }

    #[test]
    fn ascii_with_glyphs_and_separators() {
        assert_eq!(jpy("¥2,800"), Ok(2800));
        assert_eq!(jpy("2,800円"), Ok(2800));
        assert_eq!(jpy("JPY 12,345,678"), Ok(12_345_678));
        assert_eq!(jpy("  980 円(税込)"), Ok(980));
    }

    #[test]
    fn full_width_numerals() {
        assert_eq!(jpy("￥２，８００"), Ok(2800));
        assert_eq!(jpy("税込 １５００円"), Ok(1500));
    }

    #[test]
    fn trailing_zero_decimals_are_fine_for_jpy() {
        assert_eq!(jpy("2800.00円"), Ok(2800));
    }

    #[test]
    fn fractional_yen_is_rejected() {
        assert!(jpy("2800.5").is_err());
    }

    #[test]
    fn no_digits_is_an_error_not_zero() {
        assert_eq!(
            jpy("価格未定"),
            Err(ExtractionError::BadPrice("価格未定".to_string()))
        );
        assert!(jpy("").is_err());
    }

    #[test]
    fn kanji_multipliers_are_rejected_not_truncated() {
        assert!(jpy("1万円").is_err());
        assert!(jpy("1万2千円").is_err());
        assert!(jpy("￥３万").is_err());
        assert!(jpy("二千500円").is_err());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(jpy("-500円").is_err());
        assert!(jpy("¥－１，２００").is_err());
    }

    #[test]
    fn malformed_digit_groups_are_rejected() {
        assert!(jpy("12,34円").is_err());
        assert!(jpy("1,2345円").is_err());
        assert!(jpy("2,800.5.0").is_err());
    }

    #[test]
    fn punctuation_after_amount_is_fine() {
        assert_eq!(jpy("¥2,800."), Ok(2800));
        assert_eq!(jpy("2,800円、送料別"), Ok(2800));
        assert_eq!(jpy("(2,800)"), Ok(2800));
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(jpy("99999999999999999999999").is_err());
    }
}

//! Price extraction from recognized text
//!
//! Two phases: find the first price-shaped substring in the full text, then
//! trace it back to the token that carries it so the overlay has a box.
//! Only the first match is considered. Receipts with several amounts will
//! pick whichever comes first in reading order.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::ocr::{RecognitionResult, Token};
use crate::capture::frame::PixelBox;
use crate::conversion::CurrencyCode;

/// Symbol then number, or number then optional symbol. The number has
/// optional thousands grouping and optional cents.
static PRICE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"([$€£¥₱])\s?\d{1,3}(?:,\d{3})*(?:\.\d{2})?",
        r"|\d{1,3}(?:,\d{3})*(?:\.\d{2})?(?:\s?([$€£¥₱]))?",
    ))
    .expect("price pattern is valid")
});

/// A price found in a frame
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedPrice {
    /// Matched substring as it appeared in the text
    pub raw_match: String,
    /// Digits and at most one decimal point
    pub normalized_amount: String,
    /// Currency implied by the symbol, if there was one
    pub currency_hint: Option<CurrencyCode>,
    /// Box of the token that carried the match
    pub source_box: PixelBox,
}

/// Extract the first price in `result`, or `None` if there is no match or
/// the match cannot be tied to a token.
pub fn extract(result: &RecognitionResult) -> Option<DetectedPrice> {
    let caps = PRICE_PATTERN.captures(&result.text)?;
    let raw_match = caps.get(0)?.as_str().trim().to_string();

    let Some(token) = find_token(&result.tokens, &raw_match) else {
        debug!("Price {:?} matched but no token carries it", raw_match);
        return None;
    };

    let normalized_amount = normalize_amount(&raw_match)?;

    let currency_hint = caps
        .get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().chars().next())
        .and_then(CurrencyCode::from_symbol);

    debug!(
        "Detected price {:?} -> {} ({:?}) in token {:?}",
        raw_match, normalized_amount, currency_hint, token.text
    );

    Some(DetectedPrice {
        raw_match,
        normalized_amount,
        currency_hint,
        source_box: token.bbox,
    })
}

/// First token containing the match, directly or once commas and spaces are
/// ignored on both sides
fn find_token<'a>(tokens: &'a [Token], raw_match: &str) -> Option<&'a Token> {
    if let Some(token) = tokens.iter().find(|t| t.text.contains(raw_match)) {
        return Some(token);
    }

    let needle = strip_separators(raw_match);
    if needle.is_empty() {
        return None;
    }
    tokens
        .iter()
        .find(|t| strip_separators(&t.text).contains(&needle))
}

fn strip_separators(s: &str) -> String {
    s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect()
}

/// Keep digits and the decimal point; reject anything that is not a number
fn normalize_amount(raw: &str) -> Option<String> {
    let amount: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let valid = !amount.is_empty()
        && amount.matches('.').count() <= 1
        && amount.chars().any(|c| c.is_ascii_digit())
        && amount.parse::<f64>().is_ok();

    valid.then_some(amount)
}

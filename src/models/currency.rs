//! ISO 4217 currency codes and the single "which currency is this priced in" rule,
//! plus the lenient readers for priced columns of stored rows

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::PlannerError;

/// Pivot used for every cross-currency conversion
pub const PIVOT_CURRENCY: &str = "USD";

/// Three-letter uppercase currency code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse a code, accepting surrounding whitespace and lowercase input
    pub fn parse(input: &str) -> crate::Result<Self> {
        let code = input.trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PlannerError::validation(format!(
                "Currency code must be three letters, got '{input}'"
            )));
        }
        Ok(Self(code))
    }

    #[must_use]
    pub fn usd() -> Self {
        Self(PIVOT_CURRENCY.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = PlannerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CurrencyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Currency an item is actually priced in: its own if set, the journey's otherwise
#[must_use]
pub fn effective_currency(item: Option<&CurrencyCode>, journey: &CurrencyCode) -> CurrencyCode {
    item.unwrap_or(journey).clone()
}

/// Reads an optional currency, treating `null` and `""` as unset.
///
/// Stored rows written by older clients use empty strings for "no currency".
pub fn deserialize_optional_currency<'de, D>(
    deserializer: D,
) -> Result<Option<CurrencyCode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(code) => CurrencyCode::parse(code)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredAmount {
    Number(f64),
    Text(String),
}

/// Reads an optional amount stored either as a number or as a numeric string.
///
/// `null`, `""` and text that is not a number all read as unset, so one
/// hand-edited row cannot make a whole table unreadable.
pub fn deserialize_optional_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<StoredAmount> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(StoredAmount::Number(amount)) => Some(amount),
        Some(StoredAmount::Text(text)) => text.trim().parse::<f64>().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("EUR", "EUR")]
    #[case("eur", "EUR")]
    #[case("  pln ", "PLN")]
    fn test_parse_valid_codes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(CurrencyCode::parse(input).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("EU")]
    #[case("EURO")]
    #[case("U$D")]
    fn test_parse_invalid_codes(#[case] input: &str) {
        assert!(matches!(
            CurrencyCode::parse(input),
            Err(PlannerError::Validation { .. })
        ));
    }

    #[test]
    fn test_effective_currency_prefers_item() {
        let journey = CurrencyCode::parse("PLN").unwrap();
        let item = CurrencyCode::parse("EUR").unwrap();
        assert_eq!(effective_currency(Some(&item), &journey), item);
        assert_eq!(effective_currency(None, &journey), journey);
    }

    #[derive(Deserialize)]
    struct Row {
        #[serde(default, deserialize_with = "deserialize_optional_currency")]
        currency: Option<CurrencyCode>,
    }

    #[test]
    fn test_empty_string_currency_is_unset() {
        let row: Row = serde_json::from_str(r#"{"currency": ""}"#).unwrap();
        assert!(row.currency.is_none());

        let row: Row = serde_json::from_str(r#"{"currency": null}"#).unwrap();
        assert!(row.currency.is_none());

        let row: Row = serde_json::from_str("{}").unwrap();
        assert!(row.currency.is_none());

        let row: Row = serde_json::from_str(r#"{"currency": "gbp"}"#).unwrap();
        assert_eq!(row.currency.unwrap().as_str(), "GBP");
    }

    #[derive(Deserialize)]
    struct PricedRow {
        #[serde(default, deserialize_with = "deserialize_optional_amount")]
        price: Option<f64>,
    }

    #[rstest]
    #[case(r#"{"price": 120.5}"#, Some(120.5))]
    #[case(r#"{"price": 80}"#, Some(80.0))]
    #[case(r#"{"price": "120.50"}"#, Some(120.5))]
    #[case(r#"{"price": " 42 "}"#, Some(42.0))]
    #[case(r#"{"price": ""}"#, None)]
    #[case(r#"{"price": "about 30"}"#, None)]
    #[case(r#"{"price": null}"#, None)]
    #[case("{}", None)]
    fn test_amounts_accept_numbers_and_numeric_strings(
        #[case] raw: &str,
        #[case] expected: Option<f64>,
    ) {
        let row: PricedRow = serde_json::from_str(raw).unwrap();
        assert_eq!(row.price, expected);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let code = CurrencyCode::parse("CHF").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"CHF\"");
    }
}

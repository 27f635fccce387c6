use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

/// Parse a decimal string into an amount.
/// Example: "50.00" -> 50, "12.5" -> 12.5, "100" -> 100
pub fn parse_amount(input: &str) -> Result<Decimal, ParseAmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseAmountError::InvalidFormat);
    }
    Decimal::from_str(input).map_err(|_| ParseAmountError::InvalidFormat)
}

/// Format an amount as a human-readable string with at least two
/// decimal places. Example: 50 -> "50.00", 12.345 -> "12.345"
pub fn format_amount(amount: Decimal) -> String {
    if amount.scale() <= 2 {
        format!("{:.2}", amount)
    } else {
        amount.normalize().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    InvalidFormat,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::InvalidFormat => write!(f, "invalid amount format"),
        }
    }
}

impl std::error::Error for ParseAmountError {}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("50.00"), Ok(dec!(50.00)));
        assert_eq!(parse_amount("50"), Ok(dec!(50)));
        assert_eq!(parse_amount("12.34"), Ok(dec!(12.34)));
        assert_eq!(parse_amount("12.5"), Ok(dec!(12.5)));
        assert_eq!(parse_amount("0.0001"), Ok(dec!(0.0001)));
        assert_eq!(parse_amount(" 7.25 "), Ok(dec!(7.25)));
        assert_eq!(parse_amount("-50.00"), Ok(dec!(-50.00)));
    }

    #[test]
    fn test_parse_amount_invalid() {
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("12.34.56").is_err());
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(50)), "50.00");
        assert_eq!(format_amount(dec!(12.34)), "12.34");
        assert_eq!(format_amount(dec!(0.5)), "0.50");
        assert_eq!(format_amount(dec!(-1)), "-1.00");
        assert_eq!(format_amount(dec!(1.2345)), "1.2345");
    }
}

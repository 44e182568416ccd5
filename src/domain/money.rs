use std::fmt;

/// Money is represented as integer cents to avoid floating-point precision issues.
/// For EUR/USD, 1 unit = 100 cents, so €50.00 = 5000 cents.
pub type Cents = i64;

/// Format cents as a human-readable currency string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.abs();
    let units = abs_cents / 100;
    let remainder = abs_cents % 100;
    format!("{}{}.{:02}", sign, units, remainder)
}

/// Parse a decimal string into cents.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000, "99.995" -> 10000
///
/// Extra fraction digits are rounded half away from zero.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let (negative, input) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let parts: Vec<&str> = input.split('.').collect();
    let cents = match parts.len() {
        1 => {
            // No decimal point, treat as whole units
            parse_digits(parts[0])?
                .checked_mul(100)
                .ok_or(ParseCentsError::Overflow)?
        }
        2 => {
            if parts[0].is_empty() && parts[1].is_empty() {
                return Err(ParseCentsError::InvalidFormat);
            }
            let units = if parts[0].is_empty() {
                0
            } else {
                parse_digits(parts[0])?
            };

            let decimal_str = parts[1];
            if !decimal_str.is_empty() && !decimal_str.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseCentsError::InvalidFormat);
            }
            let decimal_cents: i64 = match decimal_str.len() {
                0 => 0,
                // Single digit like "5" means 50 cents
                1 => parse_digits(decimal_str)? * 10,
                2 => parse_digits(decimal_str)?,
                _ => {
                    let kept = parse_digits(&decimal_str[..2])?;
                    let round_up = decimal_str.as_bytes()[2] >= b'5';
                    kept + i64::from(round_up)
                }
            };

            units
                .checked_mul(100)
                .and_then(|c| c.checked_add(decimal_cents))
                .ok_or(ParseCentsError::Overflow)?
        }
        _ => return Err(ParseCentsError::InvalidFormat),
    };

    Ok(if negative { -cents } else { cents })
}

fn parse_digits(s: &str) -> Result<i64, ParseCentsError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseCentsError::InvalidFormat);
    }
    s.parse().map_err(|_| ParseCentsError::Overflow)
}

/// Divide an amount by `divisor`, rounding half away from zero to the cent.
///
/// `divisor` must be positive.
pub fn divide_rounded(cents: Cents, divisor: i64) -> Cents {
    debug_assert!(divisor > 0, "divisor must be positive");
    let quotient = cents / divisor;
    let remainder = (cents % divisor).abs();
    if remainder * 2 >= divisor {
        quotient + cents.signum()
    } else {
        quotient
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    Overflow,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::Overflow => write!(f, "amount out of range"),
        }
    }
}

impl std::error::Error for ParseCentsError {}

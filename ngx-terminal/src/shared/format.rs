/// Display helpers for naira amounts, percentages and volumes
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

pub const CURRENCY_SYMBOL: &str = "₦";

/// Round to 2 dp (kobo), halves away from zero
pub fn to_kobo(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
        .map(|amount| amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Format as `₦1,234,567.89`, `-₦48.50` for negatives
pub fn format_naira(value: f64) -> String {
    let Some(amount) = to_kobo(value) else {
        return format!("{CURRENCY_SYMBOL}-");
    };

    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{CURRENCY_SYMBOL}{}", group_thousands(amount.abs()))
}

/// Format with an explicit sign, eg/ P&L `+₦4,850.00`
pub fn format_signed_naira(value: f64) -> String {
    match to_kobo(value) {
        Some(amount) if amount.is_sign_positive() && !amount.is_zero() => {
            format!("+{}", format_naira(value))
        }
        _ => format_naira(value),
    }
}

/// Format percentage with sign, eg/ `+3.45%`
pub fn format_percent(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    format!("{:+.2}%", value)
}

/// Format volume with K/M suffix
pub fn format_volume(volume: u64) -> String {
    let value = volume as f64;
    if value >= 1_000_000.0 {
        format!("{:.2}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else {
        format!("{}", volume)
    }
}

fn group_thousands(amount: Decimal) -> String {
    let whole = amount.trunc();
    let kobo = ((amount - whole) * Decimal::ONE_HUNDRED)
        .round()
        .to_u64()
        .unwrap_or_default();

    let digits = whole.to_u64().unwrap_or_default().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{grouped}.{kobo:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_naira() {
        struct TestCase {
            input: f64,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: starting balance
                input: 1_000_000.0,
                expected: "₦1,000,000.00",
            },
            TestCase {
                // TC1: balance after buying 100 ZENITH @ 48.50
                input: 995_150.0,
                expected: "₦995,150.00",
            },
            TestCase {
                // TC2: sub-thousand
                input: 48.5,
                expected: "₦48.50",
            },
            TestCase {
                // TC3: negative
                input: -1234.567,
                expected: "-₦1,234.57",
            },
            TestCase {
                // TC4: zero
                input: 0.0,
                expected: "₦0.00",
            },
            TestCase {
                // TC5: not representable
                input: f64::NAN,
                expected: "₦-",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(format_naira(test.input), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_format_signed_naira() {
        assert_eq!(format_signed_naira(4850.0), "+₦4,850.00");
        assert_eq!(format_signed_naira(-12.0), "-₦12.00");
        assert_eq!(format_signed_naira(0.0), "₦0.00");
    }

    #[test]
    fn test_format_percent_and_volume() {
        assert_eq!(format_percent(3.456), "+3.46%");
        assert_eq!(format_percent(-1.2), "-1.20%");
        assert_eq!(format_percent(f64::INFINITY), "-");

        assert_eq!(format_volume(1_250_000), "1.25M");
        assert_eq!(format_volume(950_000), "950.0K");
        assert_eq!(format_volume(999), "999");
    }
}

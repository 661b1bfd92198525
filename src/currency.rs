// USD/JPY conversion and display formatting. Pure functions over a rate; the
// rate itself comes from `exchange_rate`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Jpy,
}

impl Currency {
    fn symbol(&self) -> &'static str {
        match self {
            Currency::Usd => "$",
            Currency::Jpy => "¥",
        }
    }

    fn decimals(&self) -> usize {
        match self {
            Currency::Usd => 2,
            Currency::Jpy => 0,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => f.write_str("USD"),
            Currency::Jpy => f.write_str("JPY"),
        }
    }
}

/// USD to JPY, rounded to whole yen.
pub fn convert(amount_usd: f64, rate: f64) -> f64 {
    (amount_usd * rate).round()
}

/// JPY to USD, rounded to cents. A non-positive rate yields 0.
pub fn convert_back(amount_jpy: f64, rate: f64) -> f64 {
    if rate <= 0.0 || !rate.is_finite() {
        return 0.0;
    }
    (amount_jpy / rate * 100.0).round() / 100.0
}

/// `¥1,234,568` / `$1,234.57`.
pub fn format(amount: f64, currency: Currency) -> String {
    let decimals = currency.decimals();
    let fixed = format!("{:.*}", decimals, amount.abs());
    let (whole, fraction) = match fixed.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut out = String::with_capacity(fixed.len() + whole.len() / 3 + 2);
    // "-0" after rounding is just zero
    if amount < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        out.push('-');
    }
    out.push_str(currency.symbol());
    out.push_str(&group_thousands(whole));
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

// Price normalization for extracted listing and detail records
use serde_json::Value;

const CURRENCY_MARKERS: &[&str] = &["грн", "₴", "UAH", "USD", "EUR", "руб", "₽", "$", "€"];

/// Parse a price as reported by the extraction service.
///
/// Numbers are taken as-is, strings are stripped of currency markers and
/// whitespace. Anything non-positive or unparseable is `None`.
pub fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_price_str(s)?,
        _ => return None,
    };
    if price.is_finite() && price > 0.0 {
        Some(price)
    } else {
        None
    }
}

pub fn parse_price_str(raw: &str) -> Option<f64> {
    let mut s = raw.to_string();
    for marker in CURRENCY_MARKERS {
        s = s.replace(marker, "");
    }
    let mut s: String = s.chars().filter(|c| !c.is_whitespace()).collect();

    // "1,500.50": the comma groups thousands. Otherwise it is the decimal mark.
    if s.contains(',') && s.contains('.') {
        s = s.replace(',', "");
    } else {
        s = s.replace(',', ".");
    }
    let s = s.trim_matches('.');
    if s.is_empty() {
        return None;
    }

    let price: f64 = s.parse().ok()?;
    if price.is_finite() && price > 0.0 {
        Some(price)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers() {
        assert_eq!(parse_price(&json!(1299)), Some(1299.0));
        assert_eq!(parse_price(&json!(12.5)), Some(12.5));
        assert_eq!(parse_price(&json!(0)), None);
        assert_eq!(parse_price(&json!(-3)), None);
    }

    #[test]
    fn test_formatted_strings() {
        assert_eq!(parse_price(&json!("25 999 грн")), Some(25999.0));
        assert_eq!(parse_price(&json!("25 999 грн.")), Some(25999.0));
        assert_eq!(parse_price(&json!("₴12 345,50")), Some(12345.5));
        assert_eq!(parse_price(&json!("$1,500.50")), Some(1500.5));
        assert_eq!(parse_price(&json!("99 EUR")), Some(99.0));
        assert_eq!(parse_price(&json!("1\u{a0}200 ₽")), Some(1200.0));
    }

    #[test]
    fn test_unusable() {
        assert_eq!(parse_price(&json!("call for price")), None);
        assert_eq!(parse_price(&json!("")), None);
        assert_eq!(parse_price(&json!("0,00 грн")), None);
        assert_eq!(parse_price(&json!(null)), None);
        assert_eq!(parse_price(&json!({"amount": 5})), None);
    }
}

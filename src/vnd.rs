//! Vietnamese đồng helpers. Amounts are whole đồng; products round half up.

/// Group thousands with `.`, e.g. `1234567` -> `"1.234.567"`
pub fn format(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if amount < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

pub fn format_money(amount: i64) -> String {
    format!("{} VNĐ", format(amount))
}

/// Quantity rounded half up to at most two decimals, grouped like money
pub fn format_quantity(quantity: f64) -> String {
    // Settle at thousandths first so 2.995 is not read as 2.99499...
    let thousandths = (quantity.abs() * 1000.0).round() as i64;
    let hundredths = (thousandths + 5) / 10;
    let sign = if quantity < 0.0 && hundredths != 0 { "-" } else { "" };

    let whole = format(hundredths / 100);
    match hundredths % 100 {
        0 => format!("{}{}", sign, whole),
        fraction if fraction % 10 == 0 => format!("{}{},{}", sign, whole, fraction / 10),
        fraction => format!("{}{},{:02}", sign, whole, fraction),
    }
}

/// `quantity * unit_price`, rounded half up to whole đồng
pub fn multiply(quantity: f64, unit_price: i64) -> i64 {
    (quantity * unit_price as f64).round() as i64
}

/// `amount / divisor` rounded half up; zero divisor yields zero
pub fn divide(amount: i64, divisor: f64) -> i64 {
    if divisor == 0.0 {
        return 0;
    }
    (amount as f64 / divisor).round() as i64
}

/// Ratio with four decimal places; zero divisor yields zero
pub fn ratio(dividend: i64, divisor: i64) -> f64 {
    if divisor == 0 {
        return 0.0;
    }
    (dividend as f64 / divisor as f64 * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands_with_dots() {
        assert_eq!(format(0), "0");
        assert_eq!(format(999), "999");
        assert_eq!(format(1_000), "1.000");
        assert_eq!(format(15_800_000), "15.800.000");
        assert_eq!(format(-1_234_567), "-1.234.567");
        assert_eq!(format_money(150_000), "150.000 VNĐ");
    }

    #[test]
    fn quantities_keep_significant_decimals() {
        assert_eq!(format_quantity(3.0), "3");
        assert_eq!(format_quantity(1500.5), "1.500,5");
        assert_eq!(format_quantity(2.25), "2,25");
    }

    #[test]
    fn quantity_rounding_carries_into_whole_part() {
        assert_eq!(format_quantity(1.999), "2");
        assert_eq!(format_quantity(2.995), "3");
        assert_eq!(format_quantity(999.996), "1.000");
        assert_eq!(format_quantity(0.004), "0");
    }

    #[test]
    fn negative_quantities_keep_their_sign() {
        assert_eq!(format_quantity(-0.5), "-0,5");
        assert_eq!(format_quantity(-1234.25), "-1.234,25");
        assert_eq!(format_quantity(-0.001), "0");
    }

    #[test]
    fn multiply_rounds_half_up() {
        assert_eq!(multiply(2.0, 150_000), 300_000);
        assert_eq!(multiply(0.5, 3), 2);
        assert_eq!(multiply(1.25, 2), 3);
        assert_eq!(multiply(72.5, 7_000), 507_500);
    }

    #[test]
    fn division_guards_zero() {
        assert_eq!(divide(1_000, 0.0), 0);
        assert_eq!(divide(1_000, 3.0), 333);
        assert_eq!(ratio(1, 0), 0.0);
        assert_eq!(ratio(1, 3), 0.3333);
    }
}

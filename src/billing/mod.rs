//! Service pricing and monthly invoice drafting.
//!
//! Everything here is pure: the database layer loads apartments, readings,
//! prices and pending fees, and these functions decide what gets billed.

pub mod usage_import;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ApartmentWithBuilding, ExtraFee, InvoiceStatus, LineItem, PriceModel, PriceTier, ServiceCode,
    ServicePrice, UsageRecord,
};
use crate::vnd;

#[derive(Debug, Error, PartialEq)]
pub enum BillingError {
    #[error("No price in force for {0}")]
    MissingPrice(ServiceCode),

    #[error("Price list for {0} has no tiers")]
    NoTiers(ServiceCode),

    #[error("Quantity can not be negative")]
    NegativeQuantity,

    #[error("Invalid billing period {month}/{year}")]
    InvalidPeriod { month: u32, year: i32 },

    #[error("Payment amount must be positive")]
    NonPositivePayment,

    #[error("Invoice is already paid")]
    AlreadyPaid,
}

/// Priced quantity of one service
#[derive(Debug, Clone, PartialEq)]
pub struct Charge {
    pub quantity: f64,
    pub unit_price: i64,
    pub amount: i64,
    pub line_items: Vec<LineItem>,
}

/// Last calendar day of the billing period
pub fn period_end(month: u32, year: i32) -> Result<NaiveDate, BillingError> {
    let (next_month, next_year) = if month == 12 { (1, year + 1) } else { (month + 1, year) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .filter(|_| (1..=12).contains(&month))
        .ok_or(BillingError::InvalidPeriod { month, year })
}

/// The period before `month/year`, wrapping January into December
pub fn previous_period(month: u32, year: i32) -> (u32, i32) {
    if month == 1 { (12, year - 1) } else { (month - 1, year) }
}

/// Price list of `code` in force on `date`; the latest start wins
pub fn effective_price(
    prices: &[ServicePrice],
    code: ServiceCode,
    date: NaiveDate,
) -> Option<&ServicePrice> {
    prices
        .iter()
        .filter(|p| p.code == code)
        .filter(|p| p.start_date <= date && p.end_date.is_none_or(|end| end >= date))
        .max_by_key(|p| p.start_date)
}

/// Price `quantity` against a price list
pub fn charge(price: &ServicePrice, quantity: f64) -> Result<Charge, BillingError> {
    if quantity < 0.0 {
        return Err(BillingError::NegativeQuantity);
    }

    let mut tiers: Vec<&PriceTier> = price.tiers.iter().collect();
    tiers.sort_by_key(|t| t.min_usage);
    let first = *tiers.first().ok_or(BillingError::NoTiers(price.code))?;

    match price.model {
        PriceModel::Flat | PriceModel::PerArea => {
            let amount = vnd::multiply(quantity, first.unit_price);
            Ok(Charge {
                quantity,
                unit_price: first.unit_price,
                amount,
                line_items: vec![LineItem {
                    description: price.code.label().to_string(),
                    quantity,
                    unit_price: first.unit_price,
                    amount,
                }],
            })
        }
        PriceModel::Tiered => {
            let mut line_items = Vec::new();

            for (index, tier) in tiers.iter().enumerate() {
                let lower = f64::from(tier.min_usage);
                let upper = tier.max_usage.map(f64::from).unwrap_or(f64::INFINITY);
                let slice = (quantity.min(upper) - lower).max(0.0);
                if slice <= 0.0 {
                    continue;
                }

                line_items.push(LineItem {
                    description: tier_description(tier, index),
                    quantity: slice,
                    unit_price: tier.unit_price,
                    amount: vnd::multiply(slice, tier.unit_price),
                });
            }

            let amount = line_items.iter().map(|item| item.amount).sum();
            let unit_price = if quantity > 0.0 {
                vnd::divide(amount, quantity)
            } else {
                first.unit_price
            };

            Ok(Charge {
                quantity,
                unit_price,
                amount,
                line_items,
            })
        }
    }
}

fn tier_description(tier: &PriceTier, index: usize) -> String {
    let name = tier
        .code
        .clone()
        .unwrap_or_else(|| format!("Bậc {}", index + 1));
    match tier.max_usage {
        Some(max) => format!("{} ({}-{})", name, tier.min_usage, max),
        None => format!("{} ({}+)", name, tier.min_usage),
    }
}

/// Detail row of a drafted invoice
#[derive(Debug, Clone, PartialEq)]
pub struct DetailDraft {
    pub service_type_id: Option<Uuid>,
    pub extra_fee_id: Option<Uuid>,
    pub quantity: f64,
    pub unit_price: i64,
    pub amount: i64,
    pub old_index: Option<f64>,
    pub new_index: Option<f64>,
    pub description: String,
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDraft {
    pub apartment_id: Uuid,
    pub month: u32,
    pub year: i32,
    pub details: Vec<DetailDraft>,
    pub total_amount: i64,
}

impl InvoiceDraft {
    /// Extra fees folded into this invoice
    pub fn billed_fee_ids(&self) -> Vec<Uuid> {
        self.details.iter().filter_map(|d| d.extra_fee_id).collect()
    }
}

/// Build the invoice of one apartment for `month/year`.
///
/// Meter readings of the period are priced by their service's price list,
/// the management fee follows the apartment area, and every unbilled extra
/// fee dated up to the end of the period is added. Returns `None` when there
/// is nothing to bill.
pub fn draft_invoice(
    apartment: &ApartmentWithBuilding,
    usages: &[UsageRecord],
    prices: &[ServicePrice],
    extra_fees: &[ExtraFee],
    month: u32,
    year: i32,
) -> Result<Option<InvoiceDraft>, BillingError> {
    let billing_date = period_end(month, year)?;
    let mut details = Vec::new();

    // Metered services
    for usage in usages.iter().filter(|u| {
        u.apartment_id == apartment.id && u.month == month as i32 && u.year == year
    }) {
        let price = effective_price(prices, usage.code, billing_date)
            .ok_or(BillingError::MissingPrice(usage.code))?;
        let charge = charge(price, usage.quantity)?;

        details.push(DetailDraft {
            service_type_id: Some(usage.service_type_id),
            extra_fee_id: None,
            quantity: charge.quantity,
            unit_price: charge.unit_price,
            amount: charge.amount,
            old_index: Some(usage.old_index),
            new_index: Some(usage.new_index),
            description: format!("{} tháng {}/{}", usage.code.label(), month, year),
            line_items: charge.line_items,
        });
    }

    // Management fee by floor area
    if let Some(price) = effective_price(prices, ServiceCode::Management, billing_date) {
        let charge = charge(price, apartment.area)?;
        details.push(DetailDraft {
            service_type_id: Some(price.service_type_id),
            extra_fee_id: None,
            quantity: charge.quantity,
            unit_price: charge.unit_price,
            amount: charge.amount,
            old_index: None,
            new_index: None,
            description: format!("{} tháng {}/{}", ServiceCode::Management.label(), month, year),
            line_items: charge.line_items,
        });
    }

    // Pending one-off fees
    for fee in extra_fees.iter().filter(|f| {
        f.apartment_id == apartment.id && !f.is_billed && f.fee_date <= billing_date
    }) {
        details.push(DetailDraft {
            service_type_id: None,
            extra_fee_id: Some(fee.id),
            quantity: fee.quantity,
            unit_price: fee.unit_price,
            amount: fee.amount,
            old_index: None,
            new_index: None,
            description: fee.title.clone(),
            line_items: vec![LineItem {
                description: fee.title.clone(),
                quantity: fee.quantity,
                unit_price: fee.unit_price,
                amount: fee.amount,
            }],
        });
    }

    if details.is_empty() {
        return Ok(None);
    }

    let total_amount = details.iter().map(|d| d.amount).sum();
    Ok(Some(InvoiceDraft {
        apartment_id: apartment.id,
        month,
        year,
        details,
        total_amount,
    }))
}

/// Outcome of recording a payment against an invoice
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub paid_amount: i64,
    pub status: InvoiceStatus,
}

/// Accumulate `amount` onto an invoice; fully covered invoices become PAID
pub fn apply_payment(
    total_amount: i64,
    paid_amount: i64,
    status: InvoiceStatus,
    amount: i64,
) -> Result<PaymentOutcome, BillingError> {
    if status == InvoiceStatus::Paid {
        return Err(BillingError::AlreadyPaid);
    }
    if amount <= 0 {
        return Err(BillingError::NonPositivePayment);
    }

    let paid_amount = paid_amount + amount;
    let status = if paid_amount >= total_amount {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::Partial
    };

    Ok(PaymentOutcome { paid_amount, status })
}

/// Billed and collected amounts of one month
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    pub month: u32,
    pub total_revenue: i64,
    pub paid_revenue: i64,
    /// Share of the billed amount already collected
    pub collection_rate: f64,
}

impl MonthlyRevenue {
    fn new(month: u32, total_revenue: i64, paid_revenue: i64) -> Self {
        MonthlyRevenue {
            month,
            total_revenue,
            paid_revenue,
            collection_rate: vnd::ratio(paid_revenue, total_revenue),
        }
    }
}

/// Expand sparse `(month, total, paid)` rows into all twelve months
pub fn fill_revenue_year(rows: &[(i32, i64, i64)]) -> Vec<MonthlyRevenue> {
    (1..=12u32)
        .map(|month| {
            rows.iter()
                .find(|(m, _, _)| *m == month as i32)
                .map(|&(_, total, paid)| MonthlyRevenue::new(month, total, paid))
                .unwrap_or_else(|| MonthlyRevenue::new(month, 0, 0))
        })
        .collect()
}

/// Label used for the period column of statements, e.g. "Tháng 11/2024"
pub fn period_label(month: i32, year: i32) -> String {
    format!("Tháng {}/{}", month, year)
}

/// Default due date of an invoice created on `created`
pub fn due_date(created: NaiveDate, due_days: i64) -> NaiveDate {
    created + chrono::Duration::days(due_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tier(min: i32, max: Option<i32>, price: i64) -> PriceTier {
        PriceTier {
            id: Uuid::new_v4(),
            service_price_id: Uuid::nil(),
            code: None,
            min_usage: min,
            max_usage: max,
            unit_price: price,
        }
    }

    fn price(code: ServiceCode, model: PriceModel, start: NaiveDate, tiers: Vec<PriceTier>) -> ServicePrice {
        ServicePrice {
            id: Uuid::new_v4(),
            service_type_id: Uuid::from_u128(code as u128 + 1),
            code,
            start_date: start,
            end_date: None,
            model,
            tiers,
        }
    }

    fn electricity() -> ServicePrice {
        price(
            ServiceCode::Electricity,
            PriceModel::Tiered,
            date(2020, 1, 1),
            vec![
                tier(100, Some(200), 2_000),
                tier(0, Some(50), 1_000),
                tier(50, Some(100), 1_500),
                tier(200, None, 3_000),
            ],
        )
    }

    fn apartment() -> ApartmentWithBuilding {
        ApartmentWithBuilding {
            id: Uuid::from_u128(7),
            room_number: 101,
            floor: 1,
            area: 70.0,
            building_id: Uuid::nil(),
            building_name: "A".to_string(),
            owner_id: None,
        }
    }

    fn usage(code: ServiceCode, old: f64, new: f64, month: i32, year: i32) -> UsageRecord {
        UsageRecord {
            id: Uuid::new_v4(),
            apartment_id: Uuid::from_u128(7),
            service_type_id: Uuid::from_u128(code as u128 + 1),
            code,
            month,
            year,
            old_index: old,
            new_index: new,
            quantity: new - old,
            reading_date: NaiveDateTime::default(),
        }
    }

    fn fee(amount: i64, fee_date: NaiveDate, is_billed: bool) -> ExtraFee {
        ExtraFee {
            id: Uuid::new_v4(),
            apartment_id: Uuid::from_u128(7),
            title: "Sửa khóa".to_string(),
            description: None,
            quantity: 1.0,
            unit_price: amount,
            amount,
            fee_date,
            is_billed,
            invoice_id: None,
            apartment_label: "101 - A".to_string(),
        }
    }

    #[test]
    fn tiered_charge_splits_consumption_across_bands() {
        let charge = charge(&electricity(), 130.0).unwrap();

        // 50 * 1000 + 50 * 1500 + 30 * 2000
        assert_eq!(charge.amount, 50_000 + 75_000 + 60_000);
        assert_eq!(charge.line_items.len(), 3);
        assert_eq!(charge.line_items[0].quantity, 50.0);
        assert_eq!(charge.line_items[2].quantity, 30.0);
        assert_eq!(charge.line_items[0].description, "Bậc 1 (0-50)");
        assert_eq!(charge.unit_price, vnd::divide(185_000, 130.0));
    }

    #[test]
    fn open_ended_tier_takes_the_rest() {
        let charge = charge(&electricity(), 250.0).unwrap();
        let last = charge.line_items.last().unwrap();

        assert_eq!(last.quantity, 50.0);
        assert_eq!(last.unit_price, 3_000);
        assert_eq!(last.description, "Bậc 4 (200+)");
    }

    #[test]
    fn zero_consumption_costs_nothing() {
        let charge = charge(&electricity(), 0.0).unwrap();
        assert_eq!(charge.amount, 0);
        assert!(charge.line_items.is_empty());
        assert_eq!(charge.unit_price, 1_000);
    }

    #[test]
    fn per_area_and_flat_use_first_tier() {
        let management = price(
            ServiceCode::Management,
            PriceModel::PerArea,
            date(2020, 1, 1),
            vec![tier(0, None, 7_000)],
        );
        let charge = charge(&management, 72.5).unwrap();
        assert_eq!(charge.amount, 507_500);
        assert_eq!(charge.line_items.len(), 1);
    }

    #[test]
    fn charge_rejects_bad_input() {
        let empty = price(ServiceCode::Water, PriceModel::Flat, date(2020, 1, 1), vec![]);
        assert_eq!(charge(&empty, 1.0), Err(BillingError::NoTiers(ServiceCode::Water)));
        assert_eq!(charge(&electricity(), -1.0), Err(BillingError::NegativeQuantity));
    }

    #[test]
    fn effective_price_respects_validity_window() {
        let mut old = electricity();
        old.end_date = Some(date(2023, 12, 31));
        let mut new = electricity();
        new.start_date = date(2024, 1, 1);
        let prices = vec![old.clone(), new.clone()];

        let picked = effective_price(&prices, ServiceCode::Electricity, date(2023, 6, 30)).unwrap();
        assert_eq!(picked.id, old.id);

        let picked = effective_price(&prices, ServiceCode::Electricity, date(2024, 2, 29)).unwrap();
        assert_eq!(picked.id, new.id);

        assert!(effective_price(&prices, ServiceCode::Water, date(2024, 2, 29)).is_none());
        assert!(effective_price(&prices, ServiceCode::Electricity, date(2019, 1, 1)).is_none());
    }

    #[test]
    fn period_helpers() {
        assert_eq!(period_end(2, 2024).unwrap(), date(2024, 2, 29));
        assert_eq!(period_end(12, 2024).unwrap(), date(2024, 12, 31));
        assert!(period_end(13, 2024).is_err());
        assert!(period_end(0, 2024).is_err());
        assert_eq!(previous_period(1, 2025), (12, 2024));
        assert_eq!(previous_period(7, 2025), (6, 2025));
        assert_eq!(period_label(11, 2024), "Tháng 11/2024");
        assert_eq!(due_date(date(2024, 11, 25), 15), date(2024, 12, 10));
    }

    #[test]
    fn draft_collects_usage_management_and_pending_fees() {
        let management = price(
            ServiceCode::Management,
            PriceModel::PerArea,
            date(2020, 1, 1),
            vec![tier(0, None, 7_000)],
        );
        let prices = vec![electricity(), management];
        let usages = vec![
            usage(ServiceCode::Electricity, 1_000.0, 1_040.0, 11, 2024),
            // Other period, ignored
            usage(ServiceCode::Electricity, 960.0, 1_000.0, 10, 2024),
        ];
        let fees = vec![
            fee(200_000, date(2024, 11, 20), false),
            fee(50_000, date(2024, 11, 21), true),
            fee(80_000, date(2024, 12, 1), false),
        ];

        let draft = draft_invoice(&apartment(), &usages, &prices, &fees, 11, 2024)
            .unwrap()
            .unwrap();

        assert_eq!(draft.details.len(), 3);
        assert_eq!(draft.details[0].amount, 40_000);
        assert_eq!(draft.details[0].old_index, Some(1_000.0));
        assert_eq!(draft.details[1].amount, 490_000);
        assert_eq!(draft.details[2].amount, 200_000);
        assert_eq!(draft.total_amount, 40_000 + 490_000 + 200_000);
        assert_eq!(draft.billed_fee_ids(), vec![fees[0].id]);
    }

    #[test]
    fn draft_fails_without_price_for_metered_usage() {
        let usages = vec![usage(ServiceCode::Water, 10.0, 15.0, 11, 2024)];
        let result = draft_invoice(&apartment(), &usages, &[electricity()], &[], 11, 2024);
        assert_eq!(result, Err(BillingError::MissingPrice(ServiceCode::Water)));
    }

    #[test]
    fn draft_is_empty_when_nothing_to_bill() {
        let result = draft_invoice(&apartment(), &[], &[electricity()], &[], 11, 2024).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn payments_accumulate_until_paid() {
        let partial = apply_payment(1_000_000, 0, InvoiceStatus::Unpaid, 400_000).unwrap();
        assert_eq!(partial.paid_amount, 400_000);
        assert_eq!(partial.status, InvoiceStatus::Partial);

        let paid = apply_payment(1_000_000, 400_000, InvoiceStatus::Overdue, 600_000).unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);

        assert_eq!(
            apply_payment(1_000_000, 1_000_000, InvoiceStatus::Paid, 1),
            Err(BillingError::AlreadyPaid)
        );
        assert_eq!(
            apply_payment(1_000_000, 0, InvoiceStatus::Unpaid, 0),
            Err(BillingError::NonPositivePayment)
        );
    }

    #[test]
    fn revenue_year_is_zero_filled() {
        let months = fill_revenue_year(&[(3, 500, 200), (11, 900, 900)]);

        assert_eq!(months.len(), 12);
        assert_eq!(months[0], MonthlyRevenue::new(1, 0, 0));
        assert_eq!(months[0].collection_rate, 0.0);
        assert_eq!(months[2].total_revenue, 500);
        assert_eq!(months[2].paid_revenue, 200);
        assert_eq!(months[2].collection_rate, 0.4);
        assert_eq!(months[10].paid_revenue, 900);
    }
}

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::Database;
use super::notifications::{NewNotification, insert_notification};
use crate::billing::{self, BillingError, InvoiceDraft, PaymentOutcome};
use crate::models::{
    ApartmentWithBuilding, ExtraFee, Invoice, InvoiceDetail, InvoiceExportRow, InvoiceStatus,
    InvoiceSummary, PaymentMethod, PaymentTransaction, PriceTier, ServicePrice,
};

const SUMMARY_SELECT: &str = r#"
    SELECT i.id, i.apartment_id,
           a.room_number::text || ' - ' || b.name AS apartment_label,
           i.month, i.year, i.total_amount, i.paid_amount, i.status,
           i.paid_at AS payment_date, i.created_date AS created_time, i.overdue_date
    FROM invoices i
    JOIN apartments a ON a.id = i.apartment_id
    JOIN buildings b ON b.id = a.building_id
"#;

/// Count and sum of invoices in a status bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTotal {
    pub total_amount: i64,
    pub invoice_count: i64,
}

impl StatusTotal {
    fn add(&mut self, amount: i64, count: i64) {
        self.total_amount += amount;
        self.invoice_count += count;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTotals {
    pub revenue: StatusTotal,
    pub receivable: StatusTotal,
    pub pending: StatusTotal,
    pub total_invoices: i64,
}

impl DashboardTotals {
    /// Fold `(status, count, amount)` rows into the three buckets
    pub fn from_rows(rows: &[(InvoiceStatus, i64, i64)]) -> Self {
        let mut totals = DashboardTotals::default();
        for &(status, count, amount) in rows {
            totals.total_invoices += count;
            match status {
                InvoiceStatus::Paid => totals.revenue.add(amount, count),
                InvoiceStatus::Pending => totals.pending.add(amount, count),
                InvoiceStatus::Unpaid | InvoiceStatus::Partial | InvoiceStatus::Overdue => {
                    totals.receivable.add(amount, count)
                }
            }
        }
        totals
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub amount: i64,
    pub method: PaymentMethod,
    pub transaction_code: Option<String>,
    pub note: Option<String>,
}

/// Invoice close to or past its due date, with whom to tell
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DueInvoice {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub apartment_label: String,
    pub month: i32,
    pub year: i32,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub overdue_date: NaiveDate,
}

impl Database {
    pub async fn list_invoices(
        &self,
        month: Option<i32>,
        year: Option<i32>,
    ) -> sqlx::Result<Vec<InvoiceSummary>> {
        sqlx::query_as::<_, InvoiceSummary>(&format!(
            r#"{}
            WHERE ($1::int IS NULL OR i.month = $1)
              AND ($2::int IS NULL OR i.year = $2)
            ORDER BY i.year DESC, i.month DESC, b.name ASC, a.room_number ASC
            "#,
            SUMMARY_SELECT
        ))
        .bind(month)
        .bind(year)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn invoices_for_apartment(&self, apartment_id: Uuid) -> sqlx::Result<Vec<InvoiceSummary>> {
        sqlx::query_as::<_, InvoiceSummary>(&format!(
            "{} WHERE i.apartment_id = $1 ORDER BY i.year DESC, i.month DESC",
            SUMMARY_SELECT
        ))
        .bind(apartment_id)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn get_invoice(&self, id: Uuid) -> sqlx::Result<Invoice> {
        sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_one(self.get_pool())
            .await
    }

    pub async fn get_invoice_details(&self, invoice_id: Uuid) -> sqlx::Result<Vec<InvoiceDetail>> {
        sqlx::query_as::<_, InvoiceDetail>(
            r#"
            SELECT id, invoice_id, service_type_id, extra_fee_id, quantity, unit_price, amount,
                   old_index, new_index, description, line_items
            FROM invoice_details
            WHERE invoice_id = $1
            ORDER BY service_type_id NULLS LAST, description ASC
            "#,
        )
        .bind(invoice_id)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn payments_for_invoice(&self, invoice_id: Uuid) -> sqlx::Result<Vec<PaymentTransaction>> {
        sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE invoice_id = $1 ORDER BY payment_date ASC",
        )
        .bind(invoice_id)
        .fetch_all(self.get_pool())
        .await
    }

    /// Every price list with its tiers attached
    pub async fn service_prices(&self) -> sqlx::Result<Vec<ServicePrice>> {
        let mut prices = sqlx::query_as::<_, ServicePrice>(
            r#"
            SELECT p.id, p.service_type_id, s.code, p.start_date, p.end_date, p.model
            FROM service_prices p
            JOIN service_types s ON s.id = p.service_type_id
            "#,
        )
        .fetch_all(self.get_pool())
        .await?;

        let tiers = sqlx::query_as::<_, PriceTier>(
            "SELECT * FROM price_tiers ORDER BY service_price_id, min_usage ASC",
        )
        .fetch_all(self.get_pool())
        .await?;

        let mut by_price: HashMap<Uuid, Vec<PriceTier>> = HashMap::new();
        for tier in tiers {
            by_price.entry(tier.service_price_id).or_default().push(tier);
        }
        for price in &mut prices {
            price.tiers = by_price.remove(&price.id).unwrap_or_default();
        }

        Ok(prices)
    }

    /// Unbilled fees dated on or before `until`
    pub async fn pending_extra_fees(&self, until: NaiveDate) -> sqlx::Result<Vec<ExtraFee>> {
        sqlx::query_as::<_, ExtraFee>(
            r#"
            SELECT f.id, f.apartment_id, f.title, f.description, f.quantity, f.unit_price,
                   f.amount, f.fee_date, f.is_billed, f.invoice_id,
                   a.room_number::text || ' - ' || b.name AS apartment_label
            FROM extra_fees f
            JOIN apartments a ON a.id = f.apartment_id
            JOIN buildings b ON b.id = a.building_id
            WHERE NOT f.is_billed AND f.fee_date <= $1
            "#,
        )
        .bind(until)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn apartments_without_invoice(
        &self,
        month: u32,
        year: i32,
    ) -> sqlx::Result<Vec<ApartmentWithBuilding>> {
        sqlx::query_as::<_, ApartmentWithBuilding>(
            r#"
            SELECT a.id, a.room_number, a.floor, a.area, a.building_id, b.name AS building_name, a.owner_id
            FROM apartments a
            JOIN buildings b ON b.id = a.building_id
            WHERE NOT EXISTS (
                SELECT 1 FROM invoices i
                WHERE i.apartment_id = a.id AND i.month = $1 AND i.year = $2
            )
            ORDER BY b.name ASC, a.room_number ASC
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .fetch_all(self.get_pool())
        .await
    }

    /// Persist a drafted invoice and mark its fees billed.
    ///
    /// Returns `None` when the apartment already has an invoice for the period.
    pub async fn insert_invoice(
        &self,
        draft: &InvoiceDraft,
        created: NaiveDate,
        overdue_date: NaiveDate,
    ) -> sqlx::Result<Option<Uuid>> {
        // Start a transaction
        let mut tx = self.get_pool().begin().await?;

        let invoice_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO invoices (id, apartment_id, month, year, total_amount, status, created_date, overdue_date)
            VALUES ($1, $2, $3, $4, $5, 'UNPAID', $6, $7)
            ON CONFLICT (apartment_id, month, year) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(draft.apartment_id)
        .bind(draft.month as i32)
        .bind(draft.year)
        .bind(draft.total_amount)
        .bind(created)
        .bind(overdue_date)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(invoice_id) = invoice_id else {
            tx.rollback().await?;
            return Ok(None);
        };

        for detail in &draft.details {
            sqlx::query(
                r#"
                INSERT INTO invoice_details
                    (id, invoice_id, service_type_id, extra_fee_id, quantity, unit_price, amount,
                     old_index, new_index, description, line_items)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice_id)
            .bind(detail.service_type_id)
            .bind(detail.extra_fee_id)
            .bind(detail.quantity)
            .bind(detail.unit_price)
            .bind(detail.amount)
            .bind(detail.old_index)
            .bind(detail.new_index)
            .bind(&detail.description)
            .bind(Json(&detail.line_items))
            .execute(&mut *tx)
            .await?;
        }

        let fee_ids = draft.billed_fee_ids();
        if !fee_ids.is_empty() {
            sqlx::query("UPDATE extra_fees SET is_billed = TRUE, invoice_id = $1 WHERE id = ANY($2)")
                .bind(invoice_id)
                .bind(fee_ids)
                .execute(&mut *tx)
                .await?;
        }

        // Commit the transaction
        tx.commit().await?;

        Ok(Some(invoice_id))
    }

    /// Record a payment and roll the invoice status forward.
    ///
    /// The invoice row is locked for the duration so concurrent payments add up.
    pub async fn record_payment(
        &self,
        invoice_id: Uuid,
        input: &PaymentInput,
        verified_by: &str,
        paid_at: NaiveDateTime,
    ) -> sqlx::Result<Result<PaymentOutcome, BillingError>> {
        // Start a transaction
        let mut tx = self.get_pool().begin().await?;

        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
            .bind(invoice_id)
            .fetch_one(&mut *tx)
            .await?;

        let outcome = match billing::apply_payment(
            invoice.total_amount,
            invoice.paid_amount,
            invoice.status,
            input.amount,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                tx.rollback().await?;
                return Ok(Err(err));
            }
        };

        sqlx::query(
            r#"
            INSERT INTO payment_transactions
                (id, invoice_id, amount, payment_method, transaction_code, payment_date, note, verified_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(input.amount)
        .bind(input.method)
        .bind(&input.transaction_code)
        .bind(paid_at)
        .bind(&input.note)
        .bind(verified_by)
        .execute(&mut *tx)
        .await?;

        let paid_at = (outcome.status == InvoiceStatus::Paid).then_some(paid_at);
        sqlx::query("UPDATE invoices SET paid_amount = $1, status = $2, paid_at = $3 WHERE id = $4")
            .bind(outcome.paid_amount)
            .bind(outcome.status)
            .bind(paid_at)
            .bind(invoice_id)
            .execute(&mut *tx)
            .await?;

        // Commit the transaction
        tx.commit().await?;

        Ok(Ok(outcome))
    }

    pub async fn dashboard_totals(&self) -> sqlx::Result<DashboardTotals> {
        let rows = sqlx::query_as::<_, (InvoiceStatus, i64, i64)>(
            r#"
            SELECT status, COUNT(*), COALESCE(SUM(total_amount), 0)::bigint
            FROM invoices
            GROUP BY status
            "#,
        )
        .fetch_all(self.get_pool())
        .await?;

        Ok(DashboardTotals::from_rows(&rows))
    }

    /// `(month, billed, collected)` for each month of `year` that has invoices
    pub async fn revenue_by_month(&self, year: i32) -> sqlx::Result<Vec<(i32, i64, i64)>> {
        sqlx::query_as::<_, (i32, i64, i64)>(
            r#"
            SELECT month,
                   COALESCE(SUM(total_amount), 0)::bigint,
                   COALESCE(SUM(paid_amount), 0)::bigint
            FROM invoices
            WHERE year = $1
            GROUP BY month
            ORDER BY month
            "#,
        )
        .bind(year)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn invoice_export_rows(
        &self,
        month: Option<i32>,
        year: Option<i32>,
    ) -> sqlx::Result<Vec<InvoiceExportRow>> {
        sqlx::query_as::<_, InvoiceExportRow>(
            r#"
            SELECT b.name AS building_name, a.room_number, o.full_name AS owner_name,
                   i.month, i.year, i.total_amount, i.status, i.paid_at
            FROM invoices i
            JOIN apartments a ON a.id = i.apartment_id
            JOIN buildings b ON b.id = a.building_id
            LEFT JOIN residents o ON o.id = a.owner_id
            WHERE ($1::int IS NULL OR i.month = $1)
              AND ($2::int IS NULL OR i.year = $2)
            ORDER BY b.name ASC, a.room_number ASC, i.year ASC, i.month ASC
            "#,
        )
        .bind(month)
        .bind(year)
        .fetch_all(self.get_pool())
        .await
    }

    /// Open invoices due in `[from, until]` that have not been reminded yet
    pub async fn invoices_due_between(&self, from: NaiveDate, until: NaiveDate) -> sqlx::Result<Vec<DueInvoice>> {
        sqlx::query_as::<_, DueInvoice>(
            r#"
            SELECT i.id, a.owner_id, a.room_number::text || ' - ' || b.name AS apartment_label,
                   i.month, i.year, i.total_amount, i.paid_amount, i.overdue_date
            FROM invoices i
            JOIN apartments a ON a.id = i.apartment_id
            JOIN buildings b ON b.id = a.building_id
            WHERE i.status IN ('UNPAID', 'PARTIAL')
              AND i.overdue_date BETWEEN $1 AND $2
              AND NOT EXISTS (
                  SELECT 1 FROM notifications n
                  WHERE n.reference_id = i.id AND n.reference_type = 'INVOICE_REMINDER'
              )
            "#,
        )
        .bind(from)
        .bind(until)
        .fetch_all(self.get_pool())
        .await
    }

    /// Open invoices whose due date is before `today`, plus overdue ones whose owner was never told
    pub async fn invoices_past_due(&self, today: NaiveDate) -> sqlx::Result<Vec<DueInvoice>> {
        sqlx::query_as::<_, DueInvoice>(
            r#"
            SELECT i.id, a.owner_id, a.room_number::text || ' - ' || b.name AS apartment_label,
                   i.month, i.year, i.total_amount, i.paid_amount, i.overdue_date
            FROM invoices i
            JOIN apartments a ON a.id = i.apartment_id
            JOIN buildings b ON b.id = a.building_id
            WHERE i.overdue_date < $1
              AND (
                  i.status IN ('UNPAID', 'PARTIAL')
                  OR (
                      i.status = 'OVERDUE'
                      AND NOT EXISTS (
                          SELECT 1 FROM notifications n
                          WHERE n.reference_id = i.id AND n.reference_type = 'INVOICE_OVERDUE'
                      )
                  )
              )
            "#,
        )
        .bind(today)
        .fetch_all(self.get_pool())
        .await
    }

    /// Flag an invoice overdue and store its notice in one transaction.
    /// Returns the id of the notice when one was written.
    pub async fn mark_overdue(
        &self,
        id: Uuid,
        notice: Option<&NewNotification>,
    ) -> sqlx::Result<Option<Uuid>> {
        // Start a transaction
        let mut tx = self.get_pool().begin().await?;

        sqlx::query("UPDATE invoices SET status = 'OVERDUE' WHERE id = $1 AND status IN ('UNPAID', 'PARTIAL')")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let mut created = None;
        if let Some(item) = notice {
            let sent = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM notifications WHERE reference_id = $1 AND reference_type = $2)",
            )
            .bind(id)
            .bind(&item.reference_type)
            .fetch_one(&mut *tx)
            .await?;

            if !sent {
                created = Some(insert_notification(&mut tx, item).await?);
            }
        }

        // Commit the transaction
        tx.commit().await?;

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_buckets_statuses() {
        let totals = DashboardTotals::from_rows(&[
            (InvoiceStatus::Paid, 3, 3_000),
            (InvoiceStatus::Unpaid, 2, 1_500),
            (InvoiceStatus::Partial, 1, 700),
            (InvoiceStatus::Overdue, 1, 300),
            (InvoiceStatus::Pending, 4, 400),
        ]);

        assert_eq!(totals.revenue, StatusTotal { total_amount: 3_000, invoice_count: 3 });
        assert_eq!(totals.receivable, StatusTotal { total_amount: 2_500, invoice_count: 4 });
        assert_eq!(totals.pending, StatusTotal { total_amount: 400, invoice_count: 4 });
        assert_eq!(totals.total_invoices, 11);
    }

    #[test]
    fn dashboard_serializes_camel_case() {
        let json = serde_json::to_value(DashboardTotals::default()).unwrap();
        assert_eq!(json["totalInvoices"], 0);
        assert_eq!(json["revenue"]["invoiceCount"], 0);
        assert_eq!(json["receivable"]["totalAmount"], 0);
    }

    #[test]
    fn payment_input_reads_method() {
        let input: PaymentInput = serde_json::from_value(serde_json::json!({
            "amount": 500000,
            "method": "BANK_TRANSFER",
            "transactionCode": "FT24001"
        }))
        .unwrap();

        assert_eq!(input.amount, 500_000);
        assert_eq!(input.method, PaymentMethod::BankTransfer);
        assert_eq!(input.transaction_code.as_deref(), Some("FT24001"));
        assert!(input.note.is_none());
    }
}

//! Background jobs: payment reminders, overdue marking and notification cleanup.
//!
//! Times are server-local wall clock.

use std::future::Future;

use anyhow::Result;
use chrono::{Datelike, Days, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::AppState;
use crate::db::{DueInvoice, NewNotification};
use crate::models::NotificationType;
use crate::vnd;

pub const REMINDER_REFERENCE: &str = "INVOICE_REMINDER";
pub const OVERDUE_REFERENCE: &str = "INVOICE_OVERDUE";

/// First occurrence of `at` strictly after `now`
pub fn next_daily_run(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// First occurrence of `weekday` at `at` strictly after `now`
pub fn next_weekly_run(now: NaiveDateTime, weekday: Weekday, at: NaiveTime) -> NaiveDateTime {
    let ahead = (7 + weekday.num_days_from_monday() as i64
        - now.weekday().num_days_from_monday() as i64)
        % 7;
    let candidate = (now.date() + Duration::days(ahead)).and_time(at);
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(7)
    }
}

fn date_vn(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Reminder for an invoice coming due; `None` when the apartment has no owner
pub fn reminder_notification(invoice: &DueInvoice) -> Option<NewNotification> {
    Some(NewNotification {
        recipient_id: invoice.owner_id?,
        title: "Nhắc nhở thanh toán hóa đơn".to_string(),
        message: format!(
            "Hóa đơn tháng {}/{} của căn hộ {} ({}) sẽ hết hạn vào ngày {}. \
             Vui lòng thanh toán để tránh bị tính phí trễ hạn.",
            invoice.month,
            invoice.year,
            invoice.apartment_label,
            vnd::format_money(invoice.total_amount - invoice.paid_amount),
            date_vn(invoice.overdue_date)
        ),
        notification_type: NotificationType::BillReminder,
        reference_id: Some(invoice.id),
        reference_type: Some(REMINDER_REFERENCE.to_string()),
    })
}

/// Notice for an invoice past its due date; `None` when the apartment has no owner
pub fn overdue_notification(invoice: &DueInvoice) -> Option<NewNotification> {
    Some(NewNotification {
        recipient_id: invoice.owner_id?,
        title: "Hóa đơn quá hạn".to_string(),
        message: format!(
            "Hóa đơn tháng {}/{} của căn hộ {} ({}) đã quá hạn từ ngày {}. \
             Vui lòng thanh toán ngay để tránh bị cắt dịch vụ.",
            invoice.month,
            invoice.year,
            invoice.apartment_label,
            vnd::format_money(invoice.total_amount - invoice.paid_amount),
            date_vn(invoice.overdue_date)
        ),
        notification_type: NotificationType::BillOverdue,
        reference_id: Some(invoice.id),
        reference_type: Some(OVERDUE_REFERENCE.to_string()),
    })
}

/// Remind owners of open invoices due within the lead window
pub async fn send_payment_reminders(state: &AppState, today: NaiveDate) -> Result<usize> {
    let until = today + Duration::days(state.config.reminder_lead_days);
    let due = state.db.invoices_due_between(today, until).await?;

    let items: Vec<NewNotification> = due.iter().filter_map(reminder_notification).collect();
    let created = state.db.create_notifications(&items).await?;
    state.push.publish(&created);

    tracing::info!(count = created.len(), "sent payment reminders");
    Ok(created.len())
}

/// Each overdue invoice paired with the notice that must land together with its status change
pub fn overdue_batch(invoices: &[DueInvoice]) -> Vec<(Uuid, Option<NewNotification>)> {
    invoices
        .iter()
        .map(|invoice| (invoice.id, overdue_notification(invoice)))
        .collect()
}

/// Flag open invoices past their due date and tell the owners once
pub async fn mark_overdue_invoices(state: &AppState, today: NaiveDate) -> Result<usize> {
    let overdue = state.db.invoices_past_due(today).await?;

    let mut notice_ids = Vec::new();
    for (id, notice) in overdue_batch(&overdue) {
        if let Some(notice_id) = state.db.mark_overdue(id, notice.as_ref()).await? {
            notice_ids.push(notice_id);
        }
    }

    let created = state.db.notifications_by_ids(&notice_ids).await?;
    state.push.publish(&created);

    tracing::info!(invoices = overdue.len(), notified = created.len(), "marked overdue invoices");
    Ok(overdue.len())
}

/// Delete notifications older than the retention window
pub async fn cleanup_notifications(state: &AppState, now: NaiveDateTime) -> Result<u64> {
    let cutoff = now
        .checked_sub_days(Days::new(state.config.notification_retention_days.max(0) as u64))
        .unwrap_or(now);
    let deleted = state.db.delete_notifications_before(cutoff).await?;

    let sessions = state.sessions.purge_expired().await;
    tracing::info!(deleted, sessions, "cleaned up old notifications");
    Ok(deleted)
}

fn schedule<N, F, Fut>(name: &'static str, next_run: N, job: F) -> JoinHandle<()>
where
    N: Fn(NaiveDateTime) -> NaiveDateTime + Send + 'static,
    F: Fn(NaiveDateTime) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let now = Local::now().naive_local();
            let at = next_run(now);
            tracing::debug!(job = name, next_run = %at, "job scheduled");

            tokio::time::sleep((at - now).to_std().unwrap_or_default()).await;

            // A failed run is retried at the next slot
            if let Err(err) = job(Local::now().naive_local()).await {
                tracing::error!(job = name, error = ?err, "scheduled job failed");
            }
        }
    })
}

/// Start every background job
pub fn spawn(state: AppState) -> Vec<JoinHandle<()>> {
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN);
    let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN);
    let two = NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN);

    let reminders = state.clone();
    let overdue = state.clone();
    let cleanup = state;

    vec![
        schedule("payment-reminders", move |now| next_daily_run(now, nine), move |now| {
            let state = reminders.clone();
            async move { send_payment_reminders(&state, now.date()).await.map(|_| ()) }
        }),
        schedule("overdue-invoices", move |now| next_daily_run(now, ten), move |now| {
            let state = overdue.clone();
            async move { mark_overdue_invoices(&state, now.date()).await.map(|_| ()) }
        }),
        schedule(
            "notification-cleanup",
            move |now| next_weekly_run(now, Weekday::Sun, two),
            move |now| {
                let state = cleanup.clone();
                async move { cleanup_notifications(&state, now).await.map(|_| ()) }
            },
        ),
    ]
}

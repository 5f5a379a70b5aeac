use anyhow::Result;
use rust_xlsxwriter::{Color, Format, Workbook};

use crate::billing::period_label;
use crate::models::{InvoiceExportRow, InvoiceStatus, InvoiceSummary};
use crate::vnd;

const NO_OWNER: &str = "Apartment has no owner";
const SERVICE_INVOICE: &str = "Hóa đơn dịch vụ";
const DATE_FORMAT: &str = "%d/%m/%Y";

const SHEET_COLUMNS: [&str; 8] = [
    "Tòa nhà",
    "Căn hộ",
    "Chủ hộ",
    "Tháng",
    "Năm",
    "Tổng tiền (VNĐ)",
    "Trạng thái",
    "Ngày thanh toán",
];

const CSV_COLUMNS: [&str; 6] = [
    "Loại hóa đơn",
    "Kỳ",
    "Số tiền",
    "Hạn thanh toán",
    "Trạng thái",
    "Ngày thanh toán",
];

/// Sheet title, e.g. "Hóa đơn T11-2024"
pub fn sheet_name(month: Option<i32>, year: Option<i32>) -> String {
    match (month, year) {
        (Some(month), Some(year)) => format!("Hóa đơn T{}-{}", month, year),
        (None, Some(year)) => format!("Hóa đơn {}", year),
        _ => "Hóa đơn".to_string(),
    }
}

/// Build the accounting workbook: a bold grey header row, one invoice per row
pub fn invoice_workbook(rows: &[InvoiceExportRow], sheet: &str) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD9D9D9));

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet)?;

    for (col, title) in SHEET_COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let line = index as u32 + 1;
        worksheet.write_string(line, 0, &row.building_name)?;
        worksheet.write_number(line, 1, row.room_number)?;
        worksheet.write_string(line, 2, row.owner_name.as_deref().unwrap_or(NO_OWNER))?;
        worksheet.write_number(line, 3, row.month)?;
        worksheet.write_number(line, 4, row.year)?;
        worksheet.write_number(line, 5, row.total_amount as f64)?;
        worksheet.write_string(line, 6, row.status.as_str())?;
        if let Some(paid_at) = row.paid_at {
            worksheet.write_string(line, 7, paid_at.format(DATE_FORMAT).to_string())?;
        }
    }

    worksheet.autofit();

    Ok(workbook.save_to_buffer()?)
}

/// Resident statement as UTF-8 CSV; the BOM lets spreadsheet apps pick the encoding
pub fn statement_csv(invoices: &[InvoiceSummary]) -> String {
    let mut csv = String::from('\u{FEFF}');
    csv.push_str(&CSV_COLUMNS.join(","));

    for invoice in invoices {
        let status = if invoice.status == InvoiceStatus::Paid {
            "Đã thanh toán"
        } else {
            "Chưa thanh toán"
        };
        let due = invoice
            .overdue_date
            .map(|date| date.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());
        let paid = invoice
            .payment_date
            .map(|date| date.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());

        let fields = [
            SERVICE_INVOICE.to_string(),
            period_label(invoice.month, invoice.year),
            vnd::format(invoice.total_amount),
            due,
            status.to_string(),
            paid,
        ];

        csv.push('\n');
        csv.push_str(
            &fields
                .iter()
                .map(|field| csv_field(field))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    csv
}

/// Quote a field when it holds a separator, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Data, Reader, Xlsx};
    use chrono::NaiveDate;
    use std::io::Cursor;
    use uuid::Uuid;

    fn export_row(owner: Option<&str>, status: InvoiceStatus) -> InvoiceExportRow {
        InvoiceExportRow {
            building_name: "A".to_string(),
            room_number: 101,
            owner_name: owner.map(str::to_string),
            month: 11,
            year: 2024,
            total_amount: 1_250_000,
            status,
            paid_at: NaiveDate::from_ymd_opt(2024, 12, 2).and_then(|d| d.and_hms_opt(9, 30, 0)),
        }
    }

    fn summary(status: InvoiceStatus, paid: bool) -> InvoiceSummary {
        InvoiceSummary {
            id: Uuid::nil(),
            apartment_id: Uuid::nil(),
            apartment_label: "101 - A".to_string(),
            month: 11,
            year: 2024,
            total_amount: 1_250_000,
            paid_amount: 0,
            status,
            payment_date: if paid {
                NaiveDate::from_ymd_opt(2024, 12, 2).and_then(|d| d.and_hms_opt(9, 30, 0))
            } else {
                None
            },
            created_time: NaiveDate::from_ymd_opt(2024, 11, 25).unwrap(),
            overdue_date: NaiveDate::from_ymd_opt(2024, 12, 10),
        }
    }

    #[test]
    fn sheet_names_follow_period() {
        assert_eq!(sheet_name(Some(11), Some(2024)), "Hóa đơn T11-2024");
        assert_eq!(sheet_name(None, Some(2024)), "Hóa đơn 2024");
        assert_eq!(sheet_name(None, None), "Hóa đơn");
    }

    #[test]
    fn workbook_has_header_and_rows() {
        let bytes = invoice_workbook(
            &[
                export_row(Some("Nguyễn Văn A"), InvoiceStatus::Paid),
                export_row(None, InvoiceStatus::Unpaid),
            ],
            "Hóa đơn T11-2024",
        )
        .unwrap();

        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range("Hóa đơn T11-2024").unwrap();

        assert_eq!(range.get_size(), (3, 8));
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("Tòa nhà".to_string())));
        assert_eq!(range.get_value((1, 2)), Some(&Data::String("Nguyễn Văn A".to_string())));
        assert_eq!(range.get_value((1, 5)), Some(&Data::Float(1_250_000.0)));
        assert_eq!(range.get_value((1, 7)), Some(&Data::String("02/12/2024".to_string())));
        assert_eq!(range.get_value((2, 2)), Some(&Data::String(NO_OWNER.to_string())));
        assert_eq!(range.get_value((2, 6)), Some(&Data::String("UNPAID".to_string())));
    }

    #[test]
    fn statement_starts_with_bom_and_header() {
        let csv = statement_csv(&[summary(InvoiceStatus::Paid, true), summary(InvoiceStatus::Overdue, false)]);
        let mut lines = csv.lines();

        assert_eq!(
            lines.next().unwrap(),
            "\u{FEFF}Loại hóa đơn,Kỳ,Số tiền,Hạn thanh toán,Trạng thái,Ngày thanh toán"
        );
        assert_eq!(
            lines.next().unwrap(),
            "Hóa đơn dịch vụ,Tháng 11/2024,1.250.000,10/12/2024,Đã thanh toán,02/12/2024"
        );
        assert_eq!(
            lines.next().unwrap(),
            "Hóa đơn dịch vụ,Tháng 11/2024,1.250.000,10/12/2024,Chưa thanh toán,-"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn csv_fields_are_quoted_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}

//! Meter readings uploaded as `.xlsx`: parse, validate against last month,
//! then keep the valid rows.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ServiceCode, UsageHistory, apartment_key};

const NOT_METERED: &str = "Error service code, must be ELECTRICITY/WATER!";
const NEW_BELOW_OLD: &str = "New index < Old index!";
const OLD_MISMATCH: &str = "Old index is different from previous month!";
const HIGH_CONSUMPTION: &str = "Warning: Unusually high consumption!";

/// A data row as read from the sheet, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based line number in the sheet
    pub line: u32,
    pub room: String,
    pub building: String,
    pub service: String,
    pub old_index: Option<f64>,
    pub new_index: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageImportRow {
    pub apartment_code: String,
    pub building_code: String,
    pub service_code: String,
    pub old_index: Option<f64>,
    pub new_index: Option<f64>,
    pub quantity: Option<f64>,
    pub is_valid: bool,
    #[serde(default)]
    pub has_warning: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl UsageImportRow {
    pub fn key(&self) -> String {
        apartment_key(&self.apartment_code, &self.building_code)
    }
}

/// Last month's reading of one apartment and service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviousReading {
    pub new_index: f64,
    pub quantity: f64,
}

/// Index last month's readings by `(apartment key, service)`
pub fn previous_readings(history: &[UsageHistory]) -> HashMap<(String, ServiceCode), PreviousReading> {
    let mut readings = HashMap::new();
    for record in history {
        let key = apartment_key(&record.room_number.to_string(), &record.building_name);
        readings.entry((key, record.code)).or_insert(PreviousReading {
            new_index: record.new_index,
            quantity: record.quantity,
        });
    }
    readings
}

/// Read the first worksheet. Row 1 is a header and blank rows are skipped.
pub fn read_sheet(bytes: &[u8]) -> ApiResult<Vec<SheetRow>> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| ApiError::Spreadsheet(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ApiError::Spreadsheet("workbook has no sheets".to_string()))?
        .map_err(|e| ApiError::Spreadsheet(e.to_string()))?;

    Ok(sheet_rows(&range))
}

fn sheet_rows(range: &Range<Data>) -> Vec<SheetRow> {
    let (Some((first_row, _)), Some((last_row, _))) = (range.start(), range.end()) else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for row in first_row.max(1)..=last_row {
        let cell = |col: u32| range.get_value((row, col));

        if (0..5).all(|col| cell(col).map(cell_text).unwrap_or_default().trim().is_empty()) {
            continue;
        }

        rows.push(SheetRow {
            line: row + 1,
            room: cell(0).map(cell_text).unwrap_or_default().trim().to_string(),
            building: cell(1).map(cell_text).unwrap_or_default().trim().to_string(),
            service: cell(2)
                .map(cell_text)
                .unwrap_or_default()
                .trim()
                .to_uppercase(),
            old_index: cell(3).and_then(cell_number),
            new_index: cell(4).and_then(cell_number),
        });
    }
    rows
}

/// Text of a cell; whole numbers lose their `.0` so room 101 reads "101"
fn cell_text(data: &Data) -> String {
    match data {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn cell_number(data: &Data) -> Option<f64> {
    match data {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn metered_code(code: &str) -> Option<ServiceCode> {
    match code {
        "ELECTRICITY" => Some(ServiceCode::Electricity),
        "WATER" => Some(ServiceCode::Water),
        _ => None,
    }
}

/// Check each row against known apartments and last month's readings
pub fn validate(
    rows: Vec<SheetRow>,
    apartments: &HashMap<String, Uuid>,
    previous: &HashMap<(String, ServiceCode), PreviousReading>,
) -> Vec<UsageImportRow> {
    rows.into_iter()
        .map(|row| validate_row(row, apartments, previous))
        .collect()
}

fn validate_row(
    row: SheetRow,
    apartments: &HashMap<String, Uuid>,
    previous: &HashMap<(String, ServiceCode), PreviousReading>,
) -> UsageImportRow {
    let mut result = UsageImportRow {
        apartment_code: row.room,
        building_code: row.building,
        service_code: row.service,
        old_index: row.old_index,
        new_index: row.new_index,
        quantity: None,
        is_valid: true,
        has_warning: false,
        message: None,
    };

    let (Some(old_index), Some(new_index)) = (row.old_index, row.new_index) else {
        result.is_valid = false;
        result.message = Some(format!(
            "Error in line {}: old index and new index must be numbers",
            row.line
        ));
        return result;
    };
    let quantity = new_index - old_index;
    result.quantity = Some(quantity);

    let key = result.key();
    let mut errors = Vec::new();

    if !apartments.contains_key(&key) {
        errors.push(format!(
            "Not found apartment {} of building {}!",
            result.apartment_code, result.building_code
        ));
    }

    if new_index < old_index {
        errors.push(NEW_BELOW_OLD.to_string());
    }

    let last = match metered_code(&result.service_code) {
        Some(code) => previous.get(&(key, code)),
        None => {
            errors.push(NOT_METERED.to_string());
            None
        }
    };

    if let Some(last) = last {
        if quantity > last.quantity * 2.0 {
            result.has_warning = true;
            result.message = Some(HIGH_CONSUMPTION.to_string());
        }
        if old_index != last.new_index {
            errors.push(OLD_MISMATCH.to_string());
        }
    }

    if !errors.is_empty() {
        result.is_valid = false;
        result.message = Some(errors.join(", "));
    }
    result
}

/// Run rows sent back by a client through validation again
pub fn recheck(
    rows: &[UsageImportRow],
    apartments: &HashMap<String, Uuid>,
    previous: &HashMap<(String, ServiceCode), PreviousReading>,
) -> Vec<UsageImportRow> {
    let sheet_rows = rows
        .iter()
        .enumerate()
        .map(|(index, row)| SheetRow {
            line: index as u32 + 2,
            room: row.apartment_code.trim().to_string(),
            building: row.building_code.trim().to_string(),
            service: row.service_code.trim().to_uppercase(),
            old_index: row.old_index,
            new_index: row.new_index,
        })
        .collect();

    validate(sheet_rows, apartments, previous)
}

/// A reading ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct UsageUpsert {
    pub apartment_id: Uuid,
    pub code: ServiceCode,
    pub old_index: f64,
    pub new_index: f64,
    pub quantity: f64,
}

/// Keep valid rows that still resolve; quantity is recomputed here
pub fn prepare_save(rows: &[UsageImportRow], apartments: &HashMap<String, Uuid>) -> Vec<UsageUpsert> {
    rows.iter()
        .filter(|row| row.is_valid)
        .filter_map(|row| {
            let apartment_id = *apartments.get(&row.key())?;
            let code = metered_code(row.service_code.trim().to_uppercase().as_str())?;
            let (old_index, new_index) = (row.old_index?, row.new_index?);
            Some(UsageUpsert {
                apartment_id,
                code,
                old_index,
                new_index,
                quantity: new_index - old_index,
            })
        })
        .collect()
}

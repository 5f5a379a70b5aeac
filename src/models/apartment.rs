use serde::Serialize;
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Apartment {
    pub id: Uuid,
    pub room_number: i32,
    pub floor: i32,
    pub area: f64,
    pub building_id: Uuid,
    pub owner_id: Option<Uuid>,
}

/// Apartment joined with its building name, the shape most queries need.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApartmentWithBuilding {
    pub id: Uuid,
    pub room_number: i32,
    pub floor: i32,
    pub area: f64,
    pub building_id: Uuid,
    pub building_name: String,
    pub owner_id: Option<Uuid>,
}

impl ApartmentWithBuilding {
    pub fn label(&self) -> String {
        format!("{} - {}", self.room_number, self.building_name)
    }

    /// Key used to match spreadsheet rows: `ROOM_BUILDING`, upper-cased
    pub fn import_key(&self) -> String {
        apartment_key(&self.room_number.to_string(), &self.building_name)
    }
}

pub(crate) fn apartment_key(room: &str, building: &str) -> String {
    format!("{}_{}", room.trim(), building.trim()).to_uppercase()
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApartmentSummary {
    pub id: Uuid,
    pub label: String,
    pub floor: i32,
    pub area: f64,
    pub building_name: String,
    pub owner_name: Option<String>,
    pub resident_number: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_key_trims_and_uppercases() {
        assert_eq!(apartment_key(" 101 ", " tower a"), "101_TOWER A");

        let apartment = ApartmentWithBuilding {
            id: Uuid::nil(),
            room_number: 502,
            floor: 5,
            area: 72.5,
            building_id: Uuid::nil(),
            building_name: "b1".to_string(),
            owner_id: None,
        };
        assert_eq!(apartment.import_key(), "502_B1");
        assert_eq!(apartment.label(), "502 - b1");
    }
}

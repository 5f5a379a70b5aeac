mod user;
mod building;
mod apartment;
mod resident;
mod service;
mod usage_record;
mod invoice;
mod extra_fee;
mod payment;
mod announcement;
mod issue;
mod notification;

use serde::Serialize;
use uuid::Uuid;

pub use user::{User, UserRole};
pub use building::Building;
pub use apartment::{Apartment, ApartmentSummary, ApartmentWithBuilding};
pub(crate) use apartment::apartment_key;
pub use resident::{Resident, ResidentRelationship, ResidentStatus, ResidentSummary};
pub use service::{PriceModel, PriceTier, ServiceCode, ServicePrice};
pub use usage_record::{UsageHistory, UsageRecord};
pub use invoice::{Invoice, InvoiceDetail, InvoiceExportRow, InvoiceStatus, InvoiceSummary, LineItem};
pub use extra_fee::{ExtraFee, ExtraFeeSummary};
pub use payment::{PaymentMethod, PaymentTransaction};
pub use announcement::{Announcement, AnnouncementRecipient, ResidentAnnouncement};
pub use issue::{Issue, IssueStatus, IssueSummary, IssueType};
pub use notification::{Notification, NotificationType};

/// Id/label pair backing the search-as-you-type selects.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct Dropdown {
    pub id: Uuid,
    pub label: String,
}

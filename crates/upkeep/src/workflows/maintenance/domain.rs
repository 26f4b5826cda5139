use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier for a maintenance request.
    MaintenanceId
);
string_id!(
    /// Identifier for a vendor quote.
    QuoteId
);
string_id!(
    /// Identifier for a vendor-category service subscription.
    SubscriptionId
);
string_id!(
    /// Identifier for a landlord whitelist entry.
    WhitelistId
);
string_id!(VendorId);
string_id!(LandlordId);
string_id!(TenantId);
string_id!(PropertyId);
string_id!(ApartmentId);
string_id!(CategoryId);
string_id!(SubcategoryId);

/// Lifecycle status of a maintenance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceStatus {
    Unassigned,
    Assigned,
    Completed,
    Cancel,
}

impl MaintenanceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
            Self::Cancel => "cancel",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancel)
    }

    /// The only edges the lifecycle ever takes.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unassigned, Self::Assigned)
                | (Self::Assigned, Self::Completed)
                | (Self::Unassigned, Self::Cancel)
                | (Self::Assigned, Self::Cancel)
        )
    }
}

impl fmt::Display for MaintenanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Landlord verdict on a request routed to them by the whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LandlordDecision {
    Pending,
    Approved,
    Declined,
}

impl LandlordDecision {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
        }
    }
}

/// Settlement state written by the payment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Rejected,
}

impl QuoteStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    #[default]
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentState {
    Assigned,
}

/// A reported maintenance issue tracked from routing through closure.
///
/// `version` increases on every committed write and backs optimistic concurrency in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub id: MaintenanceId,
    pub description: String,
    pub category_id: CategoryId,
    pub subcategory_id: Option<SubcategoryId>,
    pub property_id: PropertyId,
    pub apartment_id: Option<ApartmentId>,
    /// Owner of the referenced property, resolved at creation.
    pub landlord_id: LandlordId,
    /// Absent when the landlord filed the request.
    pub tenant_id: Option<TenantId>,
    pub vendor_id: Option<VendorId>,
    pub subscription_id: Option<SubscriptionId>,
    pub status: MaintenanceStatus,
    pub handle_by_landlord: bool,
    pub landlord_decision: Option<LandlordDecision>,
    pub amount: Option<u64>,
    pub payment_status: PaymentStatus,
    pub schedule_date: Option<DateTime<Utc>>,
    pub reschedule_remaining: u8,
    pub work_suspended: bool,
    pub resume_at: Option<DateTime<Utc>>,
    pub tenant_consent_cancellation: bool,
    pub vendor_consent_cancellation: bool,
    pub cancel_reason: Option<String>,
    pub start_attachments: Vec<String>,
    pub end_attachments: Vec<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl MaintenanceRequest {
    pub fn is_assigned_to(&self, vendor_id: &VendorId) -> bool {
        self.vendor_id.as_ref() == Some(vendor_id)
    }

    pub fn cancellation_pending(&self) -> bool {
        !self.status.is_terminal()
            && (self.tenant_consent_cancellation || self.vendor_consent_cancellation)
    }
}

/// Single priced line of a quote breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLineItem {
    pub item: String,
    pub description: String,
    pub cost: u64,
    pub quantity: u32,
}

/// A vendor's priced bid on a maintenance request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub maintenance_id: MaintenanceId,
    pub vendor_id: VendorId,
    pub amount: u64,
    pub description: Option<String>,
    pub breakdown: Vec<QuoteLineItem>,
    pub attachments: Vec<String>,
    pub status: QuoteStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTiers {
    pub standard: u64,
    #[serde(default)]
    pub medium: Option<u64>,
    #[serde(default)]
    pub premium: Option<u64>,
}

/// A vendor's registration for a category, carrying availability and concurrent-job load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorServiceSubscription {
    pub id: SubscriptionId,
    pub vendor_id: VendorId,
    pub category_id: CategoryId,
    pub subcategory_id: Option<SubcategoryId>,
    pub availability: Availability,
    pub current_jobs: u32,
    pub price_tiers: PriceTiers,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Landlord pre-approval to self-handle a class of issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceWhitelist {
    pub id: WhitelistId,
    pub landlord_id: LandlordId,
    pub category_id: CategoryId,
    pub subcategory_id: Option<SubcategoryId>,
    pub property_id: Option<PropertyId>,
    pub apartment_id: Option<ApartmentId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MaintenanceWhitelist {
    /// Unscoped dimensions on the entry act as wildcards.
    pub fn covers(&self, query: &WhitelistQuery) -> bool {
        fn scoped<T: PartialEq>(entry: &Option<T>, requested: &Option<T>) -> bool {
            match entry {
                None => true,
                Some(value) => requested.as_ref() == Some(value),
            }
        }

        self.is_active
            && self.landlord_id == query.landlord_id
            && self.category_id == query.category_id
            && scoped(&self.subcategory_id, &query.subcategory_id)
            && scoped(&self.property_id, &query.property_id)
            && scoped(&self.apartment_id, &query.apartment_id)
    }
}

/// Append-only audit row written on every successful assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentHistoryEntry {
    pub maintenance_id: MaintenanceId,
    pub vendor_id: VendorId,
    pub assigned_at: DateTime<Utc>,
    pub state: AssignmentState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleHistoryEntry {
    pub maintenance_id: MaintenanceId,
    pub old_date: Option<DateTime<Utc>>,
    pub new_date: DateTime<Utc>,
    pub rescheduled_at: DateTime<Utc>,
}

/// Payload accepted when a tenant or landlord reports an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceSubmission {
    pub description: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub subcategory_id: Option<SubcategoryId>,
    pub property_id: PropertyId,
    #[serde(default)]
    pub apartment_id: Option<ApartmentId>,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub landlord_id: Option<LandlordId>,
    #[serde(default)]
    pub schedule_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSubmission {
    pub vendor_id: VendorId,
    pub amount: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub breakdown: Vec<QuoteLineItem>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Partial edit of a pending quote; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteUpdate {
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub breakdown: Option<Vec<QuoteLineItem>>,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistInput {
    pub category_id: CategoryId,
    #[serde(default)]
    pub subcategory_id: Option<SubcategoryId>,
    #[serde(default)]
    pub property_id: Option<PropertyId>,
    #[serde(default)]
    pub apartment_id: Option<ApartmentId>,
}

/// Tuple the router asks the whitelist about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistQuery {
    pub landlord_id: LandlordId,
    pub category_id: CategoryId,
    #[serde(default)]
    pub subcategory_id: Option<SubcategoryId>,
    #[serde(default)]
    pub property_id: Option<PropertyId>,
    #[serde(default)]
    pub apartment_id: Option<ApartmentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRegistration {
    pub vendor_id: VendorId,
    pub category_id: CategoryId,
    #[serde(default)]
    pub subcategory_id: Option<SubcategoryId>,
    #[serde(default)]
    pub availability: Availability,
    pub price_tiers: PriceTiers,
}

/// Party giving consent in the cancellation handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "party", content = "actor_id", rename_all = "snake_case")]
pub enum CancellationActor {
    Tenant(TenantId),
    Vendor(VendorId),
}

impl CancellationActor {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Tenant(_) => "tenant",
            Self::Vendor(_) => "vendor",
        }
    }
}

/// Read-side filter over maintenance requests; empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    #[serde(default)]
    pub vendor_id: Option<VendorId>,
    #[serde(default)]
    pub landlord_id: Option<LandlordId>,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub status: Option<MaintenanceStatus>,
}

impl RequestFilter {
    pub fn matches(&self, request: &MaintenanceRequest) -> bool {
        !request.is_deleted
            && self
                .vendor_id
                .as_ref()
                .map_or(true, |vendor| request.vendor_id.as_ref() == Some(vendor))
            && self
                .landlord_id
                .as_ref()
                .map_or(true, |landlord| &request.landlord_id == landlord)
            && self
                .tenant_id
                .as_ref()
                .map_or(true, |tenant| request.tenant_id.as_ref() == Some(tenant))
            && self
                .category_id
                .as_ref()
                .map_or(true, |category| &request.category_id == category)
            && self.status.map_or(true, |status| request.status == status)
    }
}

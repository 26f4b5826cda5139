//! Maintenance-request lifecycle and vendor marketplace.
//!
//! A new request is routed either to the landlord (when a whitelist entry covers it) or into the
//! marketplace, where vendors quote or self-assign. Assignment happens exactly once under
//! concurrent demand; afterwards the lifecycle state machine drives the request to `COMPLETED`
//! (gated on payment) or `CANCEL` (dual consent).

pub mod alerts;
pub mod assignment;
pub mod capacity;
pub mod directory;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod quotes;
pub mod repository;
pub mod router;
pub mod routing;
pub mod service;
pub mod whitelist;

#[cfg(test)]
mod tests;

pub use alerts::{AlertError, AlertPublisher, MaintenanceAlert, RecordingAlertPublisher};
pub use assignment::AssignmentEngine;
pub use capacity::{EligibilityCheck, IneligibleReason, VendorCapacityTracker};
pub use directory::{DirectoryLoadError, ReferenceDirectory, StaticDirectory};
pub use domain::{
    ApartmentId, AssignmentHistoryEntry, AssignmentState, Availability, CancellationActor,
    CategoryId, LandlordDecision, LandlordId, MaintenanceId, MaintenanceRequest,
    MaintenanceStatus, MaintenanceSubmission, MaintenanceWhitelist, PaymentStatus, PriceTiers,
    PropertyId, Quote, QuoteId, QuoteLineItem, QuoteStatus, QuoteSubmission, QuoteUpdate,
    RequestFilter, RescheduleHistoryEntry, SubcategoryId, SubscriptionId,
    SubscriptionRegistration, TenantId, VendorId, VendorServiceSubscription, WhitelistId,
    WhitelistInput, WhitelistQuery,
};
pub use error::MaintenanceError;
pub use lifecycle::{CancellationOutcome, LifecycleStateMachine};
pub use memory::InMemoryMaintenanceStore;
pub use quotes::QuoteMarketplace;
pub use repository::{MaintenanceStore, RepositoryError, StoreTransaction, StoreView};
pub use router::maintenance_router;
pub use routing::RoutingOrchestrator;
pub use service::MaintenanceService;
pub use whitelist::WhitelistResolver;

//! Persistence boundary for the maintenance marketplace.
//!
//! Every write goes through [`MaintenanceStore::atomically`], which hands the caller a
//! [`StoreTransaction`] and applies everything it did as one all-or-nothing unit. Reads that do
//! not need to be combined with a write go through [`MaintenanceStore::read`].

use super::domain::{
    AssignmentHistoryEntry, Availability, CategoryId, LandlordId, MaintenanceId,
    MaintenanceRequest, MaintenanceStatus, MaintenanceWhitelist, Quote, QuoteId, RequestFilter,
    RescheduleHistoryEntry, SubscriptionId, VendorId, VendorServiceSubscription, WhitelistId,
};

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// A uniqueness constraint or optimistic version check failed.
    #[error("record already exists or was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to the marketplace tables.
pub trait StoreView {
    fn request(&self, id: &MaintenanceId) -> Result<Option<MaintenanceRequest>, RepositoryError>;
    fn requests(&self, filter: &RequestFilter) -> Result<Vec<MaintenanceRequest>, RepositoryError>;

    fn quote(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError>;
    /// Non-deleted quotes on a request, newest first.
    fn quotes_for_maintenance(&self, id: &MaintenanceId) -> Result<Vec<Quote>, RepositoryError>;
    /// Non-deleted quotes from a vendor, newest first.
    fn quotes_for_vendor(&self, vendor_id: &VendorId) -> Result<Vec<Quote>, RepositoryError>;

    fn subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<VendorServiceSubscription>, RepositoryError>;
    fn subscription_for(
        &self,
        vendor_id: &VendorId,
        category_id: &CategoryId,
    ) -> Result<Option<VendorServiceSubscription>, RepositoryError>;

    fn whitelist_entry(
        &self,
        id: &WhitelistId,
    ) -> Result<Option<MaintenanceWhitelist>, RepositoryError>;
    fn whitelist_for(
        &self,
        landlord_id: &LandlordId,
    ) -> Result<Vec<MaintenanceWhitelist>, RepositoryError>;

    fn assignment_history(
        &self,
        id: &MaintenanceId,
    ) -> Result<Vec<AssignmentHistoryEntry>, RepositoryError>;
    fn reschedule_history(
        &self,
        id: &MaintenanceId,
    ) -> Result<Vec<RescheduleHistoryEntry>, RepositoryError>;
}

/// Mutations available inside a unit of work.
pub trait StoreTransaction: StoreView {
    fn insert_request(&mut self, request: MaintenanceRequest) -> Result<(), RepositoryError>;

    /// Conditional update: `apply` runs only if the stored status still equals `expected`.
    /// Returns `None` when the guard did not hold (zero rows affected).
    fn update_request_if(
        &mut self,
        id: &MaintenanceId,
        expected: MaintenanceStatus,
        apply: &mut dyn FnMut(&mut MaintenanceRequest),
    ) -> Result<Option<MaintenanceRequest>, RepositoryError>;

    /// Versioned rewrite; fails with `Conflict` if the stored version moved.
    fn save_request(
        &mut self,
        request: MaintenanceRequest,
    ) -> Result<MaintenanceRequest, RepositoryError>;

    /// Fails with `Conflict` when the vendor already holds a live quote on the request.
    fn insert_quote(&mut self, quote: Quote) -> Result<(), RepositoryError>;
    /// Versioned rewrite; fails with `Conflict` if the stored version moved.
    fn save_quote(&mut self, quote: Quote) -> Result<Quote, RepositoryError>;

    /// Fails with `Conflict` when the vendor is already subscribed to the category.
    fn insert_subscription(
        &mut self,
        subscription: VendorServiceSubscription,
    ) -> Result<(), RepositoryError>;
    fn set_availability(
        &mut self,
        id: &SubscriptionId,
        availability: Availability,
    ) -> Result<VendorServiceSubscription, RepositoryError>;
    /// Adds one job if the subscription is available and below `limit`; `None` otherwise.
    fn increment_jobs_within(
        &mut self,
        id: &SubscriptionId,
        limit: u32,
    ) -> Result<Option<VendorServiceSubscription>, RepositoryError>;
    /// Removes one job, never going below zero.
    fn decrement_jobs(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<VendorServiceSubscription, RepositoryError>;

    fn insert_whitelist(&mut self, entry: MaintenanceWhitelist) -> Result<(), RepositoryError>;
    fn save_whitelist(&mut self, entry: MaintenanceWhitelist) -> Result<(), RepositoryError>;

    fn append_assignment(&mut self, entry: AssignmentHistoryEntry)
        -> Result<(), RepositoryError>;
    fn append_reschedule(&mut self, entry: RescheduleHistoryEntry)
        -> Result<(), RepositoryError>;
}

/// Storage abstraction so the marketplace can be exercised against any backend.
pub trait MaintenanceStore: Send + Sync {
    /// Runs `work` as one unit: if it returns `Err`, none of its writes are visible.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<RepositoryError>;

    fn read<T, F>(&self, query: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&dyn StoreView) -> Result<T, RepositoryError>;
}


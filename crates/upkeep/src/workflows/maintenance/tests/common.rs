use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::config::MarketplaceConfig;
use crate::workflows::maintenance::alerts::{
    AlertError, AlertPublisher, MaintenanceAlert, RecordingAlertPublisher,
};
use crate::workflows::maintenance::directory::{ReferenceDirectory, StaticDirectory};
use crate::workflows::maintenance::domain::{
    ApartmentId, AssignmentHistoryEntry, Availability, CategoryId, LandlordId, MaintenanceId,
    MaintenanceRequest, MaintenanceStatus, MaintenanceSubmission, MaintenanceWhitelist,
    PaymentStatus, PriceTiers, PropertyId, Quote, QuoteId, QuoteSubmission, RequestFilter,
    RescheduleHistoryEntry, SubcategoryId, SubscriptionId, SubscriptionRegistration, TenantId,
    VendorId, VendorServiceSubscription, WhitelistId,
};
use crate::workflows::maintenance::memory::InMemoryMaintenanceStore;
use crate::workflows::maintenance::repository::{
    MaintenanceStore, RepositoryError, StoreTransaction, StoreView,
};
use crate::workflows::maintenance::service::MaintenanceService;

pub(super) const LANDLORD: &str = "landlord-1";
pub(super) const OTHER_LANDLORD: &str = "landlord-2";
pub(super) const TENANT: &str = "tenant-1";
pub(super) const PROPERTY: &str = "prop-1";
pub(super) const APARTMENT: &str = "apt-1a";
pub(super) const PLUMBING: &str = "plumbing";
pub(super) const ELECTRICAL: &str = "electrical";

pub(super) type TestService =
    MaintenanceService<InMemoryMaintenanceStore, StaticDirectory, RecordingAlertPublisher>;

pub(super) fn directory() -> StaticDirectory {
    StaticDirectory::default()
        .with_property(PROPERTY, LANDLORD)
        .with_property("prop-2", OTHER_LANDLORD)
        .with_apartment(PROPERTY, APARTMENT)
        .with_apartment(PROPERTY, "apt-1b")
        .with_category(PLUMBING)
        .with_category(ELECTRICAL)
        .with_subcategory(PLUMBING, "leak")
}

pub(super) fn build_service() -> (
    TestService,
    Arc<InMemoryMaintenanceStore>,
    Arc<RecordingAlertPublisher>,
) {
    let store = Arc::new(InMemoryMaintenanceStore::default());
    let alerts = Arc::new(RecordingAlertPublisher::default());
    let service = MaintenanceService::new(
        store.clone(),
        Arc::new(directory()),
        alerts.clone(),
        MarketplaceConfig::default(),
    );
    (service, store, alerts)
}

pub(super) fn landlord() -> LandlordId {
    LandlordId::new(LANDLORD)
}

pub(super) fn vendor(name: &str) -> VendorId {
    VendorId::new(name)
}

pub(super) fn submission(category: &str) -> MaintenanceSubmission {
    MaintenanceSubmission {
        description: "Kitchen sink is leaking under the cabinet".to_string(),
        category_id: CategoryId::new(category),
        subcategory_id: None,
        property_id: PropertyId::new(PROPERTY),
        apartment_id: None,
        tenant_id: Some(TenantId::new(TENANT)),
        landlord_id: None,
        schedule_date: None,
        attachments: vec!["https://files.example.com/sink.jpg".to_string()],
    }
}

pub(super) fn create_request<S, A>(
    service: &MaintenanceService<S, StaticDirectory, A>,
) -> MaintenanceRequest
where
    S: MaintenanceStore + 'static,
    A: AlertPublisher + 'static,
{
    service
        .routing()
        .create_request(submission(PLUMBING))
        .expect("request created")
}

pub(super) fn subscribe<S, A>(
    service: &MaintenanceService<S, StaticDirectory, A>,
    vendor_id: &str,
    standard: u64,
) -> VendorServiceSubscription
where
    S: MaintenanceStore + 'static,
    A: AlertPublisher + 'static,
{
    service
        .capacity()
        .register(SubscriptionRegistration {
            vendor_id: vendor(vendor_id),
            category_id: CategoryId::new(PLUMBING),
            subcategory_id: None,
            availability: Availability::Yes,
            price_tiers: PriceTiers {
                standard,
                medium: Some(standard + 40),
                premium: None,
            },
        })
        .expect("subscription registered")
}

pub(super) fn quote_submission(vendor_id: &str, amount: u64) -> QuoteSubmission {
    QuoteSubmission {
        vendor_id: vendor(vendor_id),
        amount,
        description: Some(format!("{vendor_id} can fix it this week")),
        breakdown: Vec::new(),
        attachments: Vec::new(),
    }
}

/// Creates a request and assigns it to `vendor_id` through direct accept.
pub(super) fn assigned_request(service: &TestService, vendor_id: &str) -> MaintenanceRequest {
    let request = create_request(service);
    subscribe(service, vendor_id, 150);
    service
        .assignment()
        .direct_accept(&request.id, &vendor(vendor_id))
        .expect("vendor assigned")
}

pub(super) fn settle_payment(service: &TestService, maintenance_id: &MaintenanceId) {
    service
        .lifecycle()
        .record_payment(maintenance_id, PaymentStatus::Completed)
        .expect("payment recorded");
}

pub(super) fn stored_request(
    store: &InMemoryMaintenanceStore,
    maintenance_id: &MaintenanceId,
) -> MaintenanceRequest {
    store
        .read(|view| view.request(maintenance_id))
        .expect("read succeeds")
        .expect("request present")
}

pub(super) fn stored_subscription(
    store: &InMemoryMaintenanceStore,
    subscription_id: &SubscriptionId,
) -> VendorServiceSubscription {
    store
        .read(|view| view.subscription(subscription_id))
        .expect("read succeeds")
        .expect("subscription present")
}

pub(super) fn days_from_now(days: i64) -> DateTime<Utc> {
    Utc::now() + Duration::days(days)
}

pub(super) fn assert_status(request: &MaintenanceRequest, status: MaintenanceStatus) {
    assert_eq!(
        request.status, status,
        "request {} expected {status}, found {}",
        request.id, request.status
    );
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Publisher whose transport is always down.
#[derive(Default, Clone)]
pub(super) struct OfflineAlerts;

impl AlertPublisher for OfflineAlerts {
    fn publish(&self, _alert: MaintenanceAlert) -> Result<(), AlertError> {
        Err(AlertError::Transport("smtp relay offline".to_string()))
    }
}

/// Store whose assignment-history table rejects writes, so any unit of work that appends an
/// assignment row fails after its earlier writes were staged.
#[derive(Default, Clone)]
pub(super) struct HistoryOfflineStore {
    pub(super) inner: InMemoryMaintenanceStore,
}

impl MaintenanceStore for HistoryOfflineStore {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.inner.atomically(|tx| {
            let mut guarded = HistoryOffline { inner: tx };
            work(&mut guarded)
        })
    }

    fn read<T, F>(&self, query: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&dyn StoreView) -> Result<T, RepositoryError>,
    {
        self.inner.read(query)
    }
}

struct HistoryOffline<'a> {
    inner: &'a mut dyn StoreTransaction,
}

impl StoreView for HistoryOffline<'_> {
    fn request(&self, id: &MaintenanceId) -> Result<Option<MaintenanceRequest>, RepositoryError> {
        self.inner.request(id)
    }

    fn requests(&self, filter: &RequestFilter) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        self.inner.requests(filter)
    }

    fn quote(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        self.inner.quote(id)
    }

    fn quotes_for_maintenance(&self, id: &MaintenanceId) -> Result<Vec<Quote>, RepositoryError> {
        self.inner.quotes_for_maintenance(id)
    }

    fn quotes_for_vendor(&self, vendor_id: &VendorId) -> Result<Vec<Quote>, RepositoryError> {
        self.inner.quotes_for_vendor(vendor_id)
    }

    fn subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<VendorServiceSubscription>, RepositoryError> {
        self.inner.subscription(id)
    }

    fn subscription_for(
        &self,
        vendor_id: &VendorId,
        category_id: &CategoryId,
    ) -> Result<Option<VendorServiceSubscription>, RepositoryError> {
        self.inner.subscription_for(vendor_id, category_id)
    }

    fn whitelist_entry(
        &self,
        id: &WhitelistId,
    ) -> Result<Option<MaintenanceWhitelist>, RepositoryError> {
        self.inner.whitelist_entry(id)
    }

    fn whitelist_for(
        &self,
        landlord_id: &LandlordId,
    ) -> Result<Vec<MaintenanceWhitelist>, RepositoryError> {
        self.inner.whitelist_for(landlord_id)
    }

    fn assignment_history(
        &self,
        id: &MaintenanceId,
    ) -> Result<Vec<AssignmentHistoryEntry>, RepositoryError> {
        self.inner.assignment_history(id)
    }

    fn reschedule_history(
        &self,
        id: &MaintenanceId,
    ) -> Result<Vec<RescheduleHistoryEntry>, RepositoryError> {
        self.inner.reschedule_history(id)
    }
}

impl StoreTransaction for HistoryOffline<'_> {
    fn insert_request(&mut self, request: MaintenanceRequest) -> Result<(), RepositoryError> {
        self.inner.insert_request(request)
    }

    fn update_request_if(
        &mut self,
        id: &MaintenanceId,
        expected: MaintenanceStatus,
        apply: &mut dyn FnMut(&mut MaintenanceRequest),
    ) -> Result<Option<MaintenanceRequest>, RepositoryError> {
        self.inner.update_request_if(id, expected, apply)
    }

    fn save_request(
        &mut self,
        request: MaintenanceRequest,
    ) -> Result<MaintenanceRequest, RepositoryError> {
        self.inner.save_request(request)
    }

    fn insert_quote(&mut self, quote: Quote) -> Result<(), RepositoryError> {
        self.inner.insert_quote(quote)
    }

    fn save_quote(&mut self, quote: Quote) -> Result<Quote, RepositoryError> {
        self.inner.save_quote(quote)
    }

    fn insert_subscription(
        &mut self,
        subscription: VendorServiceSubscription,
    ) -> Result<(), RepositoryError> {
        self.inner.insert_subscription(subscription)
    }

    fn set_availability(
        &mut self,
        id: &SubscriptionId,
        availability: Availability,
    ) -> Result<VendorServiceSubscription, RepositoryError> {
        self.inner.set_availability(id, availability)
    }

    fn increment_jobs_within(
        &mut self,
        id: &SubscriptionId,
        limit: u32,
    ) -> Result<Option<VendorServiceSubscription>, RepositoryError> {
        self.inner.increment_jobs_within(id, limit)
    }

    fn decrement_jobs(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<VendorServiceSubscription, RepositoryError> {
        self.inner.decrement_jobs(id)
    }

    fn insert_whitelist(&mut self, entry: MaintenanceWhitelist) -> Result<(), RepositoryError> {
        self.inner.insert_whitelist(entry)
    }

    fn save_whitelist(&mut self, entry: MaintenanceWhitelist) -> Result<(), RepositoryError> {
        self.inner.save_whitelist(entry)
    }

    fn append_assignment(
        &mut self,
        _entry: AssignmentHistoryEntry,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable(
            "assignment history offline".to_string(),
        ))
    }

    fn append_reschedule(
        &mut self,
        entry: RescheduleHistoryEntry,
    ) -> Result<(), RepositoryError> {
        self.inner.append_reschedule(entry)
    }
}

/// Directory whose property ownership can change after requests were filed.
pub(super) struct TransferableDirectory {
    inner: StaticDirectory,
    transfers: Mutex<HashMap<PropertyId, LandlordId>>,
}

impl TransferableDirectory {
    pub(super) fn new() -> Self {
        Self {
            inner: directory(),
            transfers: Mutex::new(HashMap::new()),
        }
    }

    pub(super) fn transfer(&self, property_id: &str, landlord_id: &str) {
        self.transfers
            .lock()
            .expect("transfer lock")
            .insert(PropertyId::new(property_id), LandlordId::new(landlord_id));
    }
}

impl ReferenceDirectory for TransferableDirectory {
    fn property_owner(&self, property_id: &PropertyId) -> Option<LandlordId> {
        let transferred = self
            .transfers
            .lock()
            .expect("transfer lock")
            .get(property_id)
            .cloned();
        transferred.or_else(|| self.inner.property_owner(property_id))
    }

    fn apartment_exists(&self, property_id: &PropertyId, apartment_id: &ApartmentId) -> bool {
        self.inner.apartment_exists(property_id, apartment_id)
    }

    fn category_exists(&self, category_id: &CategoryId) -> bool {
        self.inner.category_exists(category_id)
    }

    fn subcategory_exists(
        &self,
        category_id: &CategoryId,
        subcategory_id: &SubcategoryId,
    ) -> bool {
        self.inner.subcategory_exists(category_id, subcategory_id)
    }
}

/// One `tracing` event as seen by [`EventCapture`].
#[derive(Debug, Clone)]
pub(super) struct CapturedEvent {
    pub(super) message: String,
    pub(super) fields: BTreeMap<String, String>,
}

/// Layer recording every event emitted while it is the default subscriber.
#[derive(Default, Clone)]
pub(super) struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    pub(super) fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().expect("capture lock").clone()
    }
}

#[derive(Default)]
struct FieldRecorder {
    fields: BTreeMap<String, String>,
}

impl Visit for FieldRecorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for EventCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        let message = recorder.fields.remove("message").unwrap_or_default();
        self.events
            .lock()
            .expect("capture lock")
            .push(CapturedEvent {
                message,
                fields: recorder.fields,
            });
    }
}

/// Runs `work` with a capturing subscriber installed on this thread.
pub(super) fn capture_events<T>(work: impl FnOnce() -> T) -> (T, Vec<CapturedEvent>) {
    let capture = EventCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let outcome = tracing::subscriber::with_default(subscriber, work);
    (outcome, capture.events())
}

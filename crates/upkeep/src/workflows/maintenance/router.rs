use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::alerts::AlertPublisher;
use super::capacity::EligibilityCheck;
use super::directory::ReferenceDirectory;
use super::domain::{
    Availability, CancellationActor, CategoryId, LandlordDecision, LandlordId, MaintenanceId,
    MaintenanceRequest, MaintenanceSubmission, MaintenanceWhitelist, PaymentStatus, Quote,
    QuoteId, QuoteSubmission, QuoteUpdate, RequestFilter, SubscriptionId,
    SubscriptionRegistration, TenantId, VendorId, VendorServiceSubscription, WhitelistId,
    WhitelistInput, WhitelistQuery,
};
use super::error::MaintenanceError;
use super::lifecycle::CancellationOutcome;
use super::repository::MaintenanceStore;
use super::service::MaintenanceService;

type Shared<S, D, A> = State<Arc<MaintenanceService<S, D, A>>>;
type Reply<T> = Result<Json<T>, MaintenanceError>;
type Created<T> = Result<(StatusCode, Json<T>), MaintenanceError>;

/// Router builder exposing the maintenance marketplace over JSON.
pub fn maintenance_router<S, D, A>(service: Arc<MaintenanceService<S, D, A>>) -> Router
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/maintenance",
            post(create_handler::<S, D, A>).get(list_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id",
            get(get_handler::<S, D, A>).delete(delete_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/history",
            get(history_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/reschedules",
            get(reschedule_history_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/accept",
            post(direct_accept_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/quotes",
            post(submit_quote_handler::<S, D, A>).get(list_quotes_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/complete",
            post(complete_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/pause",
            post(pause_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/resume",
            post(resume_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/cancellation",
            post(cancellation_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/reschedule",
            post(reschedule_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/decision",
            post(decision_handler::<S, D, A>),
        )
        .route(
            "/api/v1/maintenance/:maintenance_id/payment",
            post(payment_handler::<S, D, A>),
        )
        .route(
            "/api/v1/quotes/:quote_id",
            put(update_quote_handler::<S, D, A>).delete(delete_quote_handler::<S, D, A>),
        )
        .route(
            "/api/v1/quotes/:quote_id/accept",
            post(accept_quote_handler::<S, D, A>),
        )
        .route(
            "/api/v1/quotes/:quote_id/reject",
            post(reject_quote_handler::<S, D, A>),
        )
        .route(
            "/api/v1/vendors/:vendor_id/quotes",
            get(vendor_quotes_handler::<S, D, A>),
        )
        .route(
            "/api/v1/vendors/:vendor_id/eligibility",
            get(eligibility_handler::<S, D, A>),
        )
        .route(
            "/api/v1/subscriptions",
            post(register_subscription_handler::<S, D, A>),
        )
        .route(
            "/api/v1/subscriptions/:subscription_id",
            get(subscription_handler::<S, D, A>),
        )
        .route(
            "/api/v1/subscriptions/:subscription_id/availability",
            put(availability_handler::<S, D, A>),
        )
        .route(
            "/api/v1/landlords/:landlord_id/whitelist",
            post(create_whitelist_handler::<S, D, A>).get(list_whitelist_handler::<S, D, A>),
        )
        .route(
            "/api/v1/landlords/:landlord_id/whitelist/:whitelist_id",
            put(update_whitelist_handler::<S, D, A>),
        )
        .route(
            "/api/v1/landlords/:landlord_id/whitelist/:whitelist_id/toggle",
            post(toggle_whitelist_handler::<S, D, A>),
        )
        .route(
            "/api/v1/whitelist/resolve",
            post(resolve_whitelist_handler::<S, D, A>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct VendorBody {
    pub vendor_id: VendorId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LandlordBody {
    pub landlord_id: LandlordId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompleteBody {
    pub vendor_id: VendorId,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PauseBody {
    pub vendor_id: VendorId,
    pub resume_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum CancellationParty {
    Tenant,
    Vendor,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancellationBody {
    pub party: CancellationParty,
    pub actor_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl CancellationBody {
    fn actor(&self) -> CancellationActor {
        match self.party {
            CancellationParty::Tenant => CancellationActor::Tenant(TenantId::new(&self.actor_id)),
            CancellationParty::Vendor => CancellationActor::Vendor(VendorId::new(&self.actor_id)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RescheduleBody {
    pub schedule_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionBody {
    pub landlord_id: LandlordId,
    pub decision: LandlordDecision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentBody {
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuoteEditBody {
    pub vendor_id: VendorId,
    #[serde(flatten)]
    pub update: QuoteUpdate,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailabilityBody {
    pub vendor_id: VendorId,
    pub availability: Availability,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoryQuery {
    pub category_id: CategoryId,
}

pub(crate) async fn create_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Json(submission): Json<MaintenanceSubmission>,
) -> Created<MaintenanceRequest>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let request = service.routing().create_request(submission)?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub(crate) async fn list_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Query(filter): Query<RequestFilter>,
) -> Reply<Vec<MaintenanceRequest>>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    Ok(Json(service.list(&filter)?))
}

pub(crate) async fn get_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
) -> Reply<MaintenanceRequest>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    Ok(Json(service.get(&MaintenanceId(maintenance_id))?))
}

pub(crate) async fn delete_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
) -> Result<StatusCode, MaintenanceError>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    service
        .lifecycle()
        .delete_request(&MaintenanceId(maintenance_id))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn history_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
) -> Reply<Value>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let id = MaintenanceId(maintenance_id);
    let history = service.assignment_history(&id)?;
    Ok(Json(json!({
        "maintenance_id": id,
        "assignments": history,
    })))
}

pub(crate) async fn reschedule_history_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
) -> Reply<Value>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let id = MaintenanceId(maintenance_id);
    let history = service.reschedule_history(&id)?;
    Ok(Json(json!({
        "maintenance_id": id,
        "reschedules": history,
    })))
}

pub(crate) async fn direct_accept_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
    Json(body): Json<VendorBody>,
) -> Reply<MaintenanceRequest>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let request = service
        .assignment()
        .direct_accept(&MaintenanceId(maintenance_id), &body.vendor_id)?;
    Ok(Json(request))
}

pub(crate) async fn submit_quote_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
    Json(submission): Json<QuoteSubmission>,
) -> Created<Quote>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let quote = service
        .quotes()
        .submit(&MaintenanceId(maintenance_id), submission)?;
    Ok((StatusCode::CREATED, Json(quote)))
}

pub(crate) async fn list_quotes_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
) -> Reply<Vec<Quote>>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let quotes = service
        .quotes()
        .for_maintenance(&MaintenanceId(maintenance_id))?;
    Ok(Json(quotes))
}

pub(crate) async fn complete_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
    Json(body): Json<CompleteBody>,
) -> Reply<MaintenanceRequest>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let request = service.lifecycle().complete(
        &MaintenanceId(maintenance_id),
        &body.vendor_id,
        body.attachments,
    )?;
    Ok(Json(request))
}

pub(crate) async fn pause_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
    Json(body): Json<PauseBody>,
) -> Reply<MaintenanceRequest>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let request = service.lifecycle().pause(
        &MaintenanceId(maintenance_id),
        &body.vendor_id,
        body.resume_at,
    )?;
    Ok(Json(request))
}

pub(crate) async fn resume_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
    Json(body): Json<VendorBody>,
) -> Reply<MaintenanceRequest>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let request = service
        .lifecycle()
        .resume(&MaintenanceId(maintenance_id), &body.vendor_id)?;
    Ok(Json(request))
}

pub(crate) async fn cancellation_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
    Json(body): Json<CancellationBody>,
) -> Reply<Value>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let actor = body.actor();
    let CancellationOutcome { request, cancelled } = service.lifecycle().request_cancellation(
        &MaintenanceId(maintenance_id),
        actor,
        body.reason,
    )?;
    Ok(Json(json!({
        "cancelled": cancelled,
        "request": request,
    })))
}

pub(crate) async fn reschedule_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
    Json(body): Json<RescheduleBody>,
) -> Reply<MaintenanceRequest>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let request = service
        .lifecycle()
        .reschedule(&MaintenanceId(maintenance_id), body.schedule_date)?;
    Ok(Json(request))
}

pub(crate) async fn decision_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Reply<MaintenanceRequest>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let request = service.lifecycle().decide(
        &MaintenanceId(maintenance_id),
        &body.landlord_id,
        body.decision,
    )?;
    Ok(Json(request))
}

pub(crate) async fn payment_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(maintenance_id): Path<String>,
    Json(body): Json<PaymentBody>,
) -> Reply<MaintenanceRequest>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let request = service
        .lifecycle()
        .record_payment(&MaintenanceId(maintenance_id), body.payment_status)?;
    Ok(Json(request))
}

pub(crate) async fn update_quote_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(quote_id): Path<String>,
    Json(body): Json<QuoteEditBody>,
) -> Reply<Quote>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let quote = service
        .quotes()
        .update(&QuoteId(quote_id), &body.vendor_id, body.update)?;
    Ok(Json(quote))
}

pub(crate) async fn delete_quote_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(quote_id): Path<String>,
    Query(body): Query<VendorBody>,
) -> Result<StatusCode, MaintenanceError>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    service
        .quotes()
        .delete(&QuoteId(quote_id), &body.vendor_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn accept_quote_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(quote_id): Path<String>,
    Json(body): Json<LandlordBody>,
) -> Reply<Quote>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let quote = service
        .quotes()
        .accept(&QuoteId(quote_id), &body.landlord_id)?;
    Ok(Json(quote))
}

pub(crate) async fn reject_quote_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(quote_id): Path<String>,
    Json(body): Json<LandlordBody>,
) -> Reply<Quote>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let quote = service
        .quotes()
        .reject(&QuoteId(quote_id), &body.landlord_id)?;
    Ok(Json(quote))
}

pub(crate) async fn vendor_quotes_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(vendor_id): Path<String>,
) -> Reply<Vec<Quote>>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    Ok(Json(service.quotes().for_vendor(&VendorId(vendor_id))?))
}

pub(crate) async fn eligibility_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(vendor_id): Path<String>,
    Query(query): Query<CategoryQuery>,
) -> Reply<EligibilityCheck>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let check = service
        .capacity()
        .check_eligibility(&VendorId(vendor_id), &query.category_id)?;
    Ok(Json(check))
}

pub(crate) async fn register_subscription_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Json(registration): Json<SubscriptionRegistration>,
) -> Created<VendorServiceSubscription>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let subscription = service.capacity().register(registration)?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

pub(crate) async fn subscription_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(subscription_id): Path<String>,
) -> Reply<VendorServiceSubscription>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let subscription = service
        .capacity()
        .subscription(&SubscriptionId(subscription_id))?;
    Ok(Json(subscription))
}

pub(crate) async fn availability_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(subscription_id): Path<String>,
    Json(body): Json<AvailabilityBody>,
) -> Reply<VendorServiceSubscription>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let subscription = service.capacity().set_availability(
        &body.vendor_id,
        &SubscriptionId(subscription_id),
        body.availability,
    )?;
    Ok(Json(subscription))
}

pub(crate) async fn create_whitelist_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(landlord_id): Path<String>,
    Json(input): Json<WhitelistInput>,
) -> Created<MaintenanceWhitelist>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let entry = service
        .whitelist()
        .create(&LandlordId(landlord_id), input)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub(crate) async fn list_whitelist_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path(landlord_id): Path<String>,
) -> Reply<Vec<MaintenanceWhitelist>>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    Ok(Json(service.whitelist().list(&LandlordId(landlord_id))?))
}

pub(crate) async fn update_whitelist_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path((landlord_id, whitelist_id)): Path<(String, String)>,
    Json(input): Json<WhitelistInput>,
) -> Reply<MaintenanceWhitelist>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let entry = service.whitelist().update(
        &LandlordId(landlord_id),
        &WhitelistId(whitelist_id),
        input,
    )?;
    Ok(Json(entry))
}

pub(crate) async fn toggle_whitelist_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Path((landlord_id, whitelist_id)): Path<(String, String)>,
) -> Reply<MaintenanceWhitelist>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let entry = service
        .whitelist()
        .toggle(&LandlordId(landlord_id), &WhitelistId(whitelist_id))?;
    Ok(Json(entry))
}

pub(crate) async fn resolve_whitelist_handler<S, D, A>(
    State(service): Shared<S, D, A>,
    Json(query): Json<WhitelistQuery>,
) -> Reply<Value>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    let matched = service.whitelist().resolve(&query)?;
    Ok(Json(json!({ "matched": matched })))
}

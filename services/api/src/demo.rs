use crate::infra::{demo_directory, ApiService};
use chrono::{Duration, Utc};
use clap::Args;
use std::sync::Arc;
use upkeep::config::MarketplaceConfig;
use upkeep::error::AppError;
use upkeep::workflows::maintenance::{
    ApartmentId, Availability, CancellationActor, CategoryId, InMemoryMaintenanceStore, LandlordId,
    MaintenanceError, MaintenanceService, MaintenanceSubmission, PaymentStatus, PriceTiers,
    PropertyId, QuoteSubmission, RecordingAlertPublisher, SubscriptionRegistration, TenantId,
    VendorId, WhitelistInput,
};

const LANDLORD: &str = "landlord-harbor";
const PROPERTY: &str = "prop-harbor";
const TENANT: &str = "tenant-7";
const CATEGORY: &str = "plumbing";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Concurrent active jobs allowed per vendor subscription (defaults to 3)
    #[arg(long)]
    pub(crate) vendor_job_limit: Option<u32>,
    /// Skip the dual-consent cancellation walkthrough at the end
    #[arg(long)]
    pub(crate) skip_cancellation: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        vendor_job_limit,
        skip_cancellation,
    } = args;

    let mut config = MarketplaceConfig::default();
    if let Some(limit) = vendor_job_limit.filter(|limit| *limit > 0) {
        config.vendor_job_limit = limit;
    }

    let alerts = Arc::new(RecordingAlertPublisher::default());
    let service: ApiService = MaintenanceService::new(
        Arc::new(InMemoryMaintenanceStore::default()),
        Arc::new(demo_directory()),
        alerts.clone(),
        config,
    );
    let landlord = LandlordId::new(LANDLORD);
    let vendor_a = VendorId::new("vendor-a");
    let vendor_b = VendorId::new("vendor-b");
    let vendor_c = VendorId::new("vendor-c");

    println!("Maintenance marketplace demo");
    println!(
        "- vendor job limit {} | reschedule allowance {}",
        config.vendor_job_limit, config.reschedule_limit
    );

    service.whitelist().create(
        &landlord,
        WhitelistInput {
            category_id: CategoryId::new(CATEGORY),
            subcategory_id: None,
            property_id: Some(PropertyId::new(PROPERTY)),
            apartment_id: None,
        },
    )?;
    for (vendor, price) in [(&vendor_a, 100), (&vendor_b, 120), (&vendor_c, 90)] {
        service.capacity().register(SubscriptionRegistration {
            vendor_id: vendor.clone(),
            category_id: CategoryId::new(CATEGORY),
            subcategory_id: None,
            availability: Availability::Yes,
            price_tiers: PriceTiers {
                standard: price,
                medium: None,
                premium: None,
            },
        })?;
    }
    println!("- {LANDLORD} whitelisted {CATEGORY} on {PROPERTY}; three vendors subscribed");

    let request = service.routing().create_request(tenant_submission(
        "Water pooling under the bathroom sink",
    ))?;
    println!(
        "\n1. Request {} created -> status {} | handle_by_landlord={} | decision {:?}",
        request.id, request.status, request.handle_by_landlord, request.landlord_decision
    );

    let quote_a = service.quotes().submit(&request.id, quote(&vendor_a, 100))?;
    let quote_b = service.quotes().submit(&request.id, quote(&vendor_b, 120))?;
    println!(
        "2. Quotes received: {} from {} ({}), {} from {} ({})",
        quote_a.id, quote_a.vendor_id, quote_a.amount, quote_b.id, quote_b.vendor_id, quote_b.amount
    );

    service.quotes().accept(&quote_a.id, &landlord)?;
    let request = service.get(&request.id)?;
    println!(
        "3. {LANDLORD} accepted {} -> request {} | vendor {} | amount {}",
        quote_a.id,
        request.status,
        display_or_dash(request.vendor_id.as_ref()),
        display_or_dash(request.amount.as_ref())
    );
    for quote in service.quotes().for_maintenance(&request.id)? {
        println!("   - {} from {}: {:?}", quote.id, quote.vendor_id, quote.status);
    }

    match service.assignment().direct_accept(&request.id, &vendor_c) {
        Ok(_) => println!("4. Unexpected: {vendor_c} took an assigned job"),
        Err(err) => println!("4. {vendor_c} direct accept refused: {err}"),
    }

    match service
        .lifecycle()
        .complete(&request.id, &vendor_a, Vec::new())
    {
        Err(MaintenanceError::PaymentNotCompleted) => {
            println!("5. Completion before payment refused: payment not completed")
        }
        Err(err) => return Err(err.into()),
        Ok(_) => println!("5. Unexpected: completion accepted before payment"),
    }

    service
        .lifecycle()
        .record_payment(&request.id, PaymentStatus::Completed)?;
    let completed = service.lifecycle().complete(
        &request.id,
        &vendor_a,
        vec!["after-repair.jpg".to_string()],
    )?;
    let active_jobs = service
        .capacity()
        .subscription_for(&vendor_a, &CategoryId::new(CATEGORY))?
        .map_or(0, |subscription| subscription.current_jobs);
    println!(
        "6. Payment recorded; request {} -> {} | {} active jobs for {}",
        completed.id, completed.status, active_jobs, vendor_a
    );

    if !skip_cancellation {
        run_cancellation(&service, &vendor_c)?;
    }

    println!("\nAlerts dispatched:");
    for alert in alerts.events() {
        println!("  - {} -> {}", alert.template, alert.maintenance_id);
    }

    Ok(())
}

fn run_cancellation(service: &ApiService, vendor: &VendorId) -> Result<(), AppError> {
    let request = service
        .routing()
        .create_request(tenant_submission("Toilet keeps running after every flush"))?;
    service.assignment().direct_accept(&request.id, vendor)?;
    println!("\nCancellation handshake on {} (assigned to {vendor})", request.id);

    let first = service.lifecycle().request_cancellation(
        &request.id,
        CancellationActor::Tenant(TenantId::new(TENANT)),
        Some("fixed it myself".to_string()),
    )?;
    println!(
        "- tenant consented -> status {} (cancelled={})",
        first.request.status, first.cancelled
    );

    let second = service.lifecycle().request_cancellation(
        &request.id,
        CancellationActor::Vendor(vendor.clone()),
        None,
    )?;
    println!(
        "- vendor consented -> status {} (cancelled={})",
        second.request.status, second.cancelled
    );
    Ok(())
}

fn tenant_submission(description: &str) -> MaintenanceSubmission {
    MaintenanceSubmission {
        description: description.to_string(),
        category_id: CategoryId::new(CATEGORY),
        subcategory_id: None,
        property_id: PropertyId::new(PROPERTY),
        apartment_id: Some(ApartmentId::new("apt-101")),
        tenant_id: Some(TenantId::new(TENANT)),
        landlord_id: None,
        schedule_date: Some(Utc::now() + Duration::days(2)),
        attachments: Vec::new(),
    }
}

fn quote(vendor: &VendorId, amount: u64) -> QuoteSubmission {
    QuoteSubmission {
        vendor_id: vendor.clone(),
        amount,
        description: Some(format!("{vendor} can be on site tomorrow")),
        breakdown: Vec::new(),
        attachments: Vec::new(),
    }
}

fn display_or_dash<T: std::fmt::Display>(value: Option<&T>) -> String {
    value.map_or_else(|| "-".to_string(), ToString::to_string)
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::directory::ReferenceDirectory;
use super::domain::{
    LandlordDecision, MaintenanceId, MaintenanceRequest, MaintenanceStatus,
    MaintenanceSubmission, PaymentStatus, WhitelistQuery,
};
use super::error::MaintenanceError;
use super::repository::MaintenanceStore;
use super::whitelist::{require_apartment, require_category, WhitelistResolver};

static MAINTENANCE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_maintenance_id() -> MaintenanceId {
    let id = MAINTENANCE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    MaintenanceId(format!("mnt-{id:06}"))
}

/// Entry point for new requests: validates references and decides who handles the issue.
pub struct RoutingOrchestrator<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    whitelist: Arc<WhitelistResolver<S, D>>,
    reschedule_limit: u8,
}

impl<S, D> RoutingOrchestrator<S, D>
where
    S: MaintenanceStore,
    D: ReferenceDirectory,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        whitelist: Arc<WhitelistResolver<S, D>>,
        reschedule_limit: u8,
    ) -> Self {
        Self {
            store,
            directory,
            whitelist,
            reschedule_limit,
        }
    }

    pub fn create_request(
        &self,
        submission: MaintenanceSubmission,
    ) -> Result<MaintenanceRequest, MaintenanceError> {
        let description = submission.description.trim();
        if description.is_empty() {
            return Err(MaintenanceError::Validation(
                "description is required".to_string(),
            ));
        }
        if submission.tenant_id.is_none() && submission.landlord_id.is_none() {
            return Err(MaintenanceError::Validation(
                "a request must be filed by a tenant or a landlord".to_string(),
            ));
        }

        let owner = self
            .directory
            .property_owner(&submission.property_id)
            .ok_or_else(|| MaintenanceError::not_found("property", &submission.property_id))?;
        if let Some(filed_by) = &submission.landlord_id {
            if filed_by != &owner {
                return Err(MaintenanceError::Unauthorized(format!(
                    "landlord '{filed_by}' does not own property '{}'",
                    submission.property_id
                )));
            }
        }
        if let Some(apartment_id) = &submission.apartment_id {
            require_apartment(self.directory.as_ref(), &submission.property_id, apartment_id)?;
        }
        require_category(
            self.directory.as_ref(),
            &submission.category_id,
            submission.subcategory_id.as_ref(),
        )?;

        let handle_by_landlord = self.whitelist.resolve(&WhitelistQuery {
            landlord_id: owner.clone(),
            category_id: submission.category_id.clone(),
            subcategory_id: submission.subcategory_id.clone(),
            property_id: Some(submission.property_id.clone()),
            apartment_id: submission.apartment_id.clone(),
        })?;

        let now = Utc::now();
        let request = MaintenanceRequest {
            id: next_maintenance_id(),
            description: description.to_string(),
            category_id: submission.category_id,
            subcategory_id: submission.subcategory_id,
            property_id: submission.property_id,
            apartment_id: submission.apartment_id,
            landlord_id: owner,
            tenant_id: submission.tenant_id,
            vendor_id: None,
            subscription_id: None,
            status: MaintenanceStatus::Unassigned,
            handle_by_landlord,
            landlord_decision: handle_by_landlord.then_some(LandlordDecision::Pending),
            amount: None,
            payment_status: PaymentStatus::Pending,
            schedule_date: submission.schedule_date,
            reschedule_remaining: self.reschedule_limit,
            work_suspended: false,
            resume_at: None,
            tenant_consent_cancellation: false,
            vendor_consent_cancellation: false,
            cancel_reason: None,
            start_attachments: submission.attachments,
            end_attachments: Vec::new(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        self.store.atomically(|tx| {
            tx.insert_request(request.clone())
                .map_err(MaintenanceError::from)
        })?;

        info!(
            maintenance_id = %request.id,
            property_id = %request.property_id,
            category_id = %request.category_id,
            handle_by_landlord,
            "maintenance request created"
        );
        Ok(request)
    }
}

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::alerts::{dispatch, AlertPublisher, MaintenanceAlert};
use super::capacity::VendorCapacityTracker;
use super::directory::ReferenceDirectory;
use super::domain::{
    AssignmentHistoryEntry, AssignmentState, MaintenanceId, MaintenanceRequest,
    MaintenanceStatus, VendorId,
};
use super::error::MaintenanceError;
use super::quotes::reject_pending_quotes;
use super::repository::MaintenanceStore;

pub(crate) const ALREADY_ASSIGNED: &str = "job already assigned";

/// Race-safe vendor self-assignment.
pub struct AssignmentEngine<S, D, A> {
    store: Arc<S>,
    capacity: Arc<VendorCapacityTracker<S, D>>,
    alerts: Arc<A>,
}

impl<S, D, A> AssignmentEngine<S, D, A>
where
    S: MaintenanceStore,
    D: ReferenceDirectory,
    A: AlertPublisher,
{
    pub fn new(
        store: Arc<S>,
        capacity: Arc<VendorCapacityTracker<S, D>>,
        alerts: Arc<A>,
    ) -> Self {
        Self {
            store,
            capacity,
            alerts,
        }
    }

    /// Assigns the request to `vendor_id` if it is still unassigned at write time.
    ///
    /// The write is guarded by the status observed on read; if another caller assigned the
    /// request in between, the guard fails and the call returns `Conflict` with no effects.
    /// The status change, the capacity increment, and the history row commit together.
    pub fn direct_accept(
        &self,
        maintenance_id: &MaintenanceId,
        vendor_id: &VendorId,
    ) -> Result<MaintenanceRequest, MaintenanceError> {
        let request = self
            .store
            .read(|view| view.request(maintenance_id))?
            .filter(|request| !request.is_deleted)
            .ok_or_else(|| MaintenanceError::not_found("maintenance request", maintenance_id))?;

        let observed = request.status;
        match observed {
            MaintenanceStatus::Unassigned => {}
            MaintenanceStatus::Assigned => {
                return Err(MaintenanceError::Conflict(ALREADY_ASSIGNED.to_string()))
            }
            terminal => {
                return Err(MaintenanceError::InvalidState(format!(
                    "maintenance request is {terminal}"
                )))
            }
        }

        let subscription = self
            .capacity
            .check_eligibility(vendor_id, &request.category_id)?
            .into_subscription()?;
        let limit = self.capacity.job_limit();
        let now = Utc::now();

        let outcome = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut assign = |row: &mut MaintenanceRequest| {
                row.vendor_id = Some(vendor_id.clone());
                row.subscription_id = Some(subscription.id.clone());
                row.amount = Some(subscription.price_tiers.standard);
                row.status = MaintenanceStatus::Assigned;
                row.updated_at = now;
            };
            let assigned = tx
                .update_request_if(maintenance_id, observed, &mut assign)?
                .ok_or_else(|| MaintenanceError::Conflict(ALREADY_ASSIGNED.to_string()))?;

            let subscription = tx
                .increment_jobs_within(&subscription.id, limit)?
                .ok_or_else(|| {
                    MaintenanceError::CapacityExceeded(format!(
                        "vendor '{vendor_id}' reached {limit} active jobs"
                    ))
                })?;

            tx.append_assignment(AssignmentHistoryEntry {
                maintenance_id: maintenance_id.clone(),
                vendor_id: vendor_id.clone(),
                assigned_at: now,
                state: AssignmentState::Assigned,
            })?;
            reject_pending_quotes(tx, maintenance_id, now)?;

            Ok((assigned, subscription))
        });

        let (assigned, subscription) = match outcome {
            Ok(committed) => committed,
            Err(error) => {
                warn!(%maintenance_id, %vendor_id, %error, "direct accept refused");
                return Err(error);
            }
        };

        info!(
            %maintenance_id,
            %vendor_id,
            subscription_id = %subscription.id,
            current_jobs = subscription.current_jobs,
            "maintenance request assigned by direct accept"
        );
        dispatch(
            self.alerts.as_ref(),
            MaintenanceAlert::new("maintenance_assigned", maintenance_id)
                .with_detail("vendor_id", vendor_id)
                .with_detail("source", "direct_accept"),
        );

        Ok(assigned)
    }
}

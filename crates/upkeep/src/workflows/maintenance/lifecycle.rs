use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::alerts::{dispatch, AlertPublisher, MaintenanceAlert};
use super::directory::ReferenceDirectory;
use super::domain::{
    CancellationActor, LandlordDecision, LandlordId, MaintenanceId, MaintenanceRequest,
    MaintenanceStatus, PaymentStatus, RescheduleHistoryEntry, VendorId,
    VendorServiceSubscription,
};
use super::error::MaintenanceError;
use super::quotes::{ensure_landlord, live_request, reject_pending_quotes};
use super::repository::{MaintenanceStore, StoreTransaction};

/// Owns every status change after assignment, plus the pause and cancellation sub-states.
pub struct LifecycleStateMachine<S, D, A> {
    store: Arc<S>,
    directory: Arc<D>,
    alerts: Arc<A>,
}

/// Result of one consent write in the cancellation handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct CancellationOutcome {
    pub request: MaintenanceRequest,
    pub cancelled: bool,
}

impl<S, D, A> LifecycleStateMachine<S, D, A>
where
    S: MaintenanceStore,
    D: ReferenceDirectory,
    A: AlertPublisher,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, alerts: Arc<A>) -> Self {
        Self {
            store,
            directory,
            alerts,
        }
    }

    /// Closes an assigned request once payment has settled and frees one slot on the vendor's
    /// subscription in the same unit of work.
    pub fn complete(
        &self,
        maintenance_id: &MaintenanceId,
        vendor_id: &VendorId,
        attachments: Vec<String>,
    ) -> Result<MaintenanceRequest, MaintenanceError> {
        let now = Utc::now();
        let outcome = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let request = live_request(&*tx, maintenance_id)?;
            if request.payment_status != PaymentStatus::Completed {
                return Err(MaintenanceError::PaymentNotCompleted);
            }
            ensure_assigned_vendor(&request, vendor_id)?;
            match request.status {
                MaintenanceStatus::Assigned => {}
                MaintenanceStatus::Completed => {
                    return Err(MaintenanceError::Conflict(
                        "maintenance request already completed".to_string(),
                    ))
                }
                other => return Err(transition_refused(other, MaintenanceStatus::Completed)),
            }

            let mut close = |row: &mut MaintenanceRequest| {
                row.status = MaintenanceStatus::Completed;
                row.work_suspended = false;
                row.resume_at = None;
                row.end_attachments = attachments.clone();
                row.updated_at = now;
            };
            let completed = tx
                .update_request_if(maintenance_id, MaintenanceStatus::Assigned, &mut close)?
                .ok_or_else(|| {
                    MaintenanceError::Conflict(
                        "maintenance request changed before completion".to_string(),
                    )
                })?;

            let released = release_slot(tx, &completed)?;
            Ok((completed, released))
        });

        let (completed, released) = match outcome {
            Ok(committed) => committed,
            Err(error) => {
                warn!(%maintenance_id, %vendor_id, %error, "completion refused");
                return Err(error);
            }
        };

        info!(
            %maintenance_id,
            %vendor_id,
            subscription_id = released.as_ref().map(|sub| sub.id.as_str()),
            current_jobs = released.as_ref().map(|sub| sub.current_jobs),
            "maintenance request completed"
        );
        dispatch(
            self.alerts.as_ref(),
            MaintenanceAlert::new("maintenance_completed", maintenance_id)
                .with_detail("vendor_id", vendor_id),
        );
        Ok(completed)
    }

    pub fn pause(
        &self,
        maintenance_id: &MaintenanceId,
        vendor_id: &VendorId,
        resume_at: DateTime<Utc>,
    ) -> Result<MaintenanceRequest, MaintenanceError> {
        let now = Utc::now();
        if resume_at <= now {
            return Err(MaintenanceError::Validation(
                "resume date must be in the future".to_string(),
            ));
        }

        let paused = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut request = live_request(&*tx, maintenance_id)?;
            require_status(&request, MaintenanceStatus::Assigned)?;
            ensure_assigned_vendor(&request, vendor_id)?;
            if request.work_suspended {
                return Err(MaintenanceError::InvalidState(
                    "work is already paused".to_string(),
                ));
            }
            request.work_suspended = true;
            request.resume_at = Some(resume_at);
            request.updated_at = now;
            Ok(tx.save_request(request)?)
        })?;

        info!(%maintenance_id, %vendor_id, %resume_at, "work paused");
        dispatch(
            self.alerts.as_ref(),
            MaintenanceAlert::new("work_paused", maintenance_id)
                .with_detail("resume_at", resume_at.to_rfc3339()),
        );
        Ok(paused)
    }

    pub fn resume(
        &self,
        maintenance_id: &MaintenanceId,
        vendor_id: &VendorId,
    ) -> Result<MaintenanceRequest, MaintenanceError> {
        let resumed = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut request = live_request(&*tx, maintenance_id)?;
            ensure_assigned_vendor(&request, vendor_id)?;
            if !request.work_suspended {
                return Err(MaintenanceError::InvalidState(
                    "work is not paused".to_string(),
                ));
            }
            request.work_suspended = false;
            request.resume_at = None;
            request.updated_at = Utc::now();
            Ok(tx.save_request(request)?)
        })?;

        info!(%maintenance_id, %vendor_id, "work resumed");
        dispatch(
            self.alerts.as_ref(),
            MaintenanceAlert::new("work_resumed", maintenance_id),
        );
        Ok(resumed)
    }

    /// Records one party's consent to cancel.
    ///
    /// The request moves to `CANCEL` in the same write that makes both consents true. A single
    /// consent leaves the status untouched with no expiry. On an unassigned request there is no
    /// vendor to ask, so the tenant's consent alone cancels it.
    pub fn request_cancellation(
        &self,
        maintenance_id: &MaintenanceId,
        actor: CancellationActor,
        reason: Option<String>,
    ) -> Result<CancellationOutcome, MaintenanceError> {
        let outcome = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut request = live_request(&*tx, maintenance_id)?;
            if request.status.is_terminal() {
                return Err(MaintenanceError::InvalidState(format!(
                    "maintenance request is {}",
                    request.status
                )));
            }

            match &actor {
                CancellationActor::Tenant(tenant_id) => {
                    if request.tenant_id.as_ref() != Some(tenant_id) {
                        return Err(MaintenanceError::Unauthorized(format!(
                            "tenant '{tenant_id}' did not file request '{maintenance_id}'"
                        )));
                    }
                    request.tenant_consent_cancellation = true;
                    if request.vendor_id.is_none() {
                        request.vendor_consent_cancellation = true;
                    }
                }
                CancellationActor::Vendor(vendor_id) => {
                    ensure_assigned_vendor(&request, vendor_id)?;
                    request.vendor_consent_cancellation = true;
                }
            }

            if let Some(reason) = reason.as_deref().map(str::trim) {
                if !reason.is_empty() {
                    request.cancel_reason = Some(reason.to_string());
                }
            }

            let cancelled =
                request.tenant_consent_cancellation && request.vendor_consent_cancellation;
            if cancelled {
                if !request.status.can_transition_to(MaintenanceStatus::Cancel) {
                    return Err(transition_refused(request.status, MaintenanceStatus::Cancel));
                }
                request.status = MaintenanceStatus::Cancel;
                request.work_suspended = false;
                request.resume_at = None;
            }
            let now = Utc::now();
            request.updated_at = now;
            if cancelled {
                reject_pending_quotes(tx, maintenance_id, now)?;
            }

            Ok(CancellationOutcome {
                request: tx.save_request(request)?,
                cancelled,
            })
        })?;

        if outcome.cancelled {
            info!(%maintenance_id, party = actor.label(), "maintenance request cancelled");
            dispatch(
                self.alerts.as_ref(),
                MaintenanceAlert::new("maintenance_cancelled", maintenance_id)
                    .with_detail("final_party", actor.label()),
            );
        } else {
            info!(%maintenance_id, party = actor.label(), "cancellation consent recorded");
            dispatch(
                self.alerts.as_ref(),
                MaintenanceAlert::new("cancellation_requested", maintenance_id)
                    .with_detail("party", actor.label()),
            );
        }
        Ok(outcome)
    }

    /// Moves the schedule date of an assigned request, spending one reschedule.
    pub fn reschedule(
        &self,
        maintenance_id: &MaintenanceId,
        new_date: DateTime<Utc>,
    ) -> Result<MaintenanceRequest, MaintenanceError> {
        let now = Utc::now();
        if new_date <= now {
            return Err(MaintenanceError::Validation(
                "schedule date must be in the future".to_string(),
            ));
        }

        let rescheduled = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut request = live_request(&*tx, maintenance_id)?;
            require_status(&request, MaintenanceStatus::Assigned)?;
            if request.reschedule_remaining == 0 {
                return Err(MaintenanceError::Validation(
                    "maximum reschedules reached".to_string(),
                ));
            }

            let old_date = request.schedule_date.replace(new_date);
            request.reschedule_remaining -= 1;
            request.updated_at = now;
            let saved = tx.save_request(request)?;
            tx.append_reschedule(RescheduleHistoryEntry {
                maintenance_id: maintenance_id.clone(),
                old_date,
                new_date,
                rescheduled_at: now,
            })?;
            Ok(saved)
        })?;

        info!(
            %maintenance_id,
            %new_date,
            remaining = rescheduled.reschedule_remaining,
            "maintenance rescheduled"
        );
        dispatch(
            self.alerts.as_ref(),
            MaintenanceAlert::new("maintenance_rescheduled", maintenance_id)
                .with_detail("new_date", new_date.to_rfc3339()),
        );
        Ok(rescheduled)
    }

    /// Landlord verdict on a request the whitelist routed to them. Status is unchanged.
    pub fn decide(
        &self,
        maintenance_id: &MaintenanceId,
        landlord_id: &LandlordId,
        decision: LandlordDecision,
    ) -> Result<MaintenanceRequest, MaintenanceError> {
        if decision == LandlordDecision::Pending {
            return Err(MaintenanceError::Validation(
                "decision must be APPROVED or DECLINED".to_string(),
            ));
        }

        let decided = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut request = live_request(&*tx, maintenance_id)?;
            ensure_landlord(self.directory.as_ref(), &request, landlord_id)?;
            if !request.handle_by_landlord {
                return Err(MaintenanceError::InvalidState(
                    "maintenance request is not handled by the landlord".to_string(),
                ));
            }
            if request.status.is_terminal() {
                return Err(MaintenanceError::InvalidState(format!(
                    "maintenance request is {}",
                    request.status
                )));
            }
            if request.landlord_decision != Some(LandlordDecision::Pending) {
                return Err(MaintenanceError::InvalidState(
                    "landlord decision already recorded".to_string(),
                ));
            }
            request.landlord_decision = Some(decision);
            request.updated_at = Utc::now();
            Ok(tx.save_request(request)?)
        })?;

        info!(
            %maintenance_id,
            %landlord_id,
            decision = decision.label(),
            "landlord decision recorded"
        );
        dispatch(
            self.alerts.as_ref(),
            MaintenanceAlert::new("landlord_decision", maintenance_id)
                .with_detail("decision", decision.label()),
        );
        Ok(decided)
    }

    /// Intake for the payment collaborator. A settled payment is final.
    pub fn record_payment(
        &self,
        maintenance_id: &MaintenanceId,
        payment_status: PaymentStatus,
    ) -> Result<MaintenanceRequest, MaintenanceError> {
        let updated = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut request = live_request(&*tx, maintenance_id)?;
            if request.payment_status == PaymentStatus::Completed
                && payment_status != PaymentStatus::Completed
            {
                return Err(MaintenanceError::InvalidState(
                    "a completed payment cannot be reverted".to_string(),
                ));
            }
            request.payment_status = payment_status;
            request.updated_at = Utc::now();
            Ok(tx.save_request(request)?)
        })?;

        info!(%maintenance_id, payment_status = ?payment_status, "payment status recorded");
        Ok(updated)
    }

    /// Soft delete; an assigned request has to be completed or cancelled first.
    pub fn delete_request(&self, maintenance_id: &MaintenanceId) -> Result<(), MaintenanceError> {
        self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut request = live_request(&*tx, maintenance_id)?;
            if request.status == MaintenanceStatus::Assigned {
                return Err(MaintenanceError::InvalidState(
                    "an assigned request cannot be deleted".to_string(),
                ));
            }
            let now = Utc::now();
            request.is_deleted = true;
            request.updated_at = now;
            tx.save_request(request)?;
            reject_pending_quotes(tx, maintenance_id, now)?;
            Ok(())
        })?;

        info!(%maintenance_id, "maintenance request deleted");
        Ok(())
    }
}

/// Decrements the counter on the subscription the job was booked against. Jobs assigned without
/// a booked subscription never held a slot and release nothing.
fn release_slot(
    tx: &mut dyn StoreTransaction,
    request: &MaintenanceRequest,
) -> Result<Option<VendorServiceSubscription>, MaintenanceError> {
    match &request.subscription_id {
        Some(subscription_id) => Ok(Some(tx.decrement_jobs(subscription_id)?)),
        None => Ok(None),
    }
}

fn ensure_assigned_vendor(
    request: &MaintenanceRequest,
    vendor_id: &VendorId,
) -> Result<(), MaintenanceError> {
    if request.is_assigned_to(vendor_id) {
        Ok(())
    } else {
        Err(MaintenanceError::Unauthorized(format!(
            "vendor '{vendor_id}' is not assigned to request '{}'",
            request.id
        )))
    }
}

fn require_status(
    request: &MaintenanceRequest,
    expected: MaintenanceStatus,
) -> Result<(), MaintenanceError> {
    if request.status == expected {
        Ok(())
    } else {
        Err(MaintenanceError::InvalidState(format!(
            "maintenance request is {}, expected {expected}",
            request.status
        )))
    }
}

fn transition_refused(from: MaintenanceStatus, to: MaintenanceStatus) -> MaintenanceError {
    MaintenanceError::InvalidState(format!("cannot move a request from {from} to {to}"))
}

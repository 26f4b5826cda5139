use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::alerts::{dispatch, AlertPublisher, MaintenanceAlert};
use super::assignment::ALREADY_ASSIGNED;
use super::directory::ReferenceDirectory;
use super::domain::{
    AssignmentHistoryEntry, AssignmentState, LandlordId, MaintenanceId, MaintenanceRequest,
    MaintenanceStatus, Quote, QuoteId, QuoteStatus, QuoteSubmission, QuoteUpdate, VendorId,
};
use super::error::MaintenanceError;
use super::repository::{MaintenanceStore, RepositoryError, StoreTransaction, StoreView};

static QUOTE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_quote_id() -> QuoteId {
    let id = QUOTE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    QuoteId(format!("quo-{id:06}"))
}

/// Vendor bids on open requests and the landlord's atomic acceptance of one of them.
pub struct QuoteMarketplace<S, D, A> {
    store: Arc<S>,
    directory: Arc<D>,
    alerts: Arc<A>,
    job_limit: u32,
}

impl<S, D, A> QuoteMarketplace<S, D, A>
where
    S: MaintenanceStore,
    D: ReferenceDirectory,
    A: AlertPublisher,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, alerts: Arc<A>, job_limit: u32) -> Self {
        Self {
            store,
            directory,
            alerts,
            job_limit,
        }
    }

    pub fn submit(
        &self,
        maintenance_id: &MaintenanceId,
        submission: QuoteSubmission,
    ) -> Result<Quote, MaintenanceError> {
        if submission.amount == 0 {
            return Err(MaintenanceError::Validation(
                "quote amount must be greater than zero".to_string(),
            ));
        }

        let now = Utc::now();
        let quote = Quote {
            id: next_quote_id(),
            maintenance_id: maintenance_id.clone(),
            vendor_id: submission.vendor_id,
            amount: submission.amount,
            description: submission.description,
            breakdown: submission.breakdown,
            attachments: submission.attachments,
            status: QuoteStatus::Pending,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let request = live_request(&*tx, maintenance_id)?;
            if request.status != MaintenanceStatus::Unassigned {
                return Err(MaintenanceError::InvalidState(format!(
                    "quotes are closed on a request that is {}",
                    request.status
                )));
            }
            tx.insert_quote(quote.clone()).map_err(|error| match error {
                RepositoryError::Conflict => MaintenanceError::Conflict(format!(
                    "vendor '{}' already quoted on request '{maintenance_id}'",
                    quote.vendor_id
                )),
                other => MaintenanceError::from(other),
            })
        })?;

        info!(
            quote_id = %quote.id,
            %maintenance_id,
            vendor_id = %quote.vendor_id,
            amount = quote.amount,
            "quote submitted"
        );
        Ok(quote)
    }

    /// Edits a pending quote owned by `vendor_id`.
    pub fn update(
        &self,
        quote_id: &QuoteId,
        vendor_id: &VendorId,
        update: QuoteUpdate,
    ) -> Result<Quote, MaintenanceError> {
        if update.amount == Some(0) {
            return Err(MaintenanceError::Validation(
                "quote amount must be greater than zero".to_string(),
            ));
        }

        let saved = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut quote = pending_vendor_quote(&*tx, quote_id, vendor_id)?;
            if let Some(amount) = update.amount {
                quote.amount = amount;
            }
            if let Some(description) = update.description {
                quote.description = Some(description);
            }
            if let Some(breakdown) = update.breakdown {
                quote.breakdown = breakdown;
            }
            if let Some(attachments) = update.attachments {
                quote.attachments = attachments;
            }
            quote.updated_at = Utc::now();
            Ok(tx.save_quote(quote)?)
        })?;

        info!(%quote_id, %vendor_id, amount = saved.amount, "quote updated");
        Ok(saved)
    }

    /// Soft-deletes a pending quote, which frees the vendor to quote on the request again.
    pub fn delete(
        &self,
        quote_id: &QuoteId,
        vendor_id: &VendorId,
    ) -> Result<(), MaintenanceError> {
        self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut quote = pending_vendor_quote(&*tx, quote_id, vendor_id)?;
            quote.is_deleted = true;
            quote.updated_at = Utc::now();
            tx.save_quote(quote)?;
            Ok(())
        })?;

        info!(%quote_id, %vendor_id, "quote deleted");
        Ok(())
    }

    /// Accepts a quote and assigns its vendor in one unit of work.
    ///
    /// The target quote becomes `ACCEPTED`, the request takes the quote's vendor and amount and
    /// moves to `ASSIGNED`, every other pending sibling becomes `REJECTED`, and one assignment
    /// history row is appended. Guards are re-checked inside the unit; if the quote stopped being
    /// pending, a sibling was already accepted, or the request left `UNASSIGNED`, the call fails
    /// with `Conflict` and nothing is written.
    ///
    /// When the vendor holds a subscription for the request's category, the job is booked against
    /// it in the same unit; a full or unavailable subscription fails with `CapacityExceeded`.
    pub fn accept(
        &self,
        quote_id: &QuoteId,
        landlord_id: &LandlordId,
    ) -> Result<Quote, MaintenanceError> {
        let (quote, request) = self.store.read(|view| {
            let quote = view.quote(quote_id)?;
            let request = match &quote {
                Some(quote) => view.request(&quote.maintenance_id)?,
                None => None,
            };
            Ok((quote, request))
        })?;

        let quote = quote
            .filter(|quote| !quote.is_deleted)
            .ok_or_else(|| MaintenanceError::not_found("quote", quote_id))?;
        let request = request.filter(|request| !request.is_deleted).ok_or_else(|| {
            MaintenanceError::not_found("maintenance request", &quote.maintenance_id)
        })?;
        ensure_landlord(self.directory.as_ref(), &request, landlord_id)?;
        if quote.status != QuoteStatus::Pending {
            return Err(MaintenanceError::Conflict(format!(
                "quote '{quote_id}' is already {}",
                quote.status.label()
            )));
        }
        if request.status != MaintenanceStatus::Unassigned {
            return Err(assignment_lost(request.status));
        }

        let maintenance_id = quote.maintenance_id.clone();
        let now = Utc::now();
        let outcome = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let current = tx
                .quote(quote_id)?
                .filter(|current| !current.is_deleted)
                .ok_or_else(|| MaintenanceError::not_found("quote", quote_id))?;
            if current.status != QuoteStatus::Pending || current.version != quote.version {
                return Err(MaintenanceError::Conflict(format!(
                    "quote '{quote_id}' changed before it could be accepted"
                )));
            }

            let siblings = tx.quotes_for_maintenance(&maintenance_id)?;
            if siblings
                .iter()
                .any(|sibling| sibling.status == QuoteStatus::Accepted)
            {
                return Err(MaintenanceError::Conflict(format!(
                    "another quote was already accepted on request '{maintenance_id}'"
                )));
            }

            let mut accepted = current;
            accepted.status = QuoteStatus::Accepted;
            accepted.updated_at = now;
            let accepted = tx.save_quote(accepted)?;

            let booked = tx.subscription_for(&accepted.vendor_id, &request.category_id)?;
            let mut assign = |row: &mut MaintenanceRequest| {
                row.vendor_id = Some(accepted.vendor_id.clone());
                row.subscription_id = booked.as_ref().map(|subscription| subscription.id.clone());
                row.amount = Some(accepted.amount);
                row.status = MaintenanceStatus::Assigned;
                row.updated_at = now;
            };
            if tx
                .update_request_if(&maintenance_id, MaintenanceStatus::Unassigned, &mut assign)?
                .is_none()
            {
                let status = live_request(&*tx, &maintenance_id)?.status;
                return Err(assignment_lost(status));
            }

            if let Some(subscription) = &booked {
                tx.increment_jobs_within(&subscription.id, self.job_limit)?
                    .ok_or_else(|| {
                        MaintenanceError::CapacityExceeded(format!(
                            "vendor '{}' cannot take another {} job",
                            accepted.vendor_id, request.category_id
                        ))
                    })?;
            }

            let rejected = reject_pending_quotes(tx, &maintenance_id, now)?;

            tx.append_assignment(AssignmentHistoryEntry {
                maintenance_id: maintenance_id.clone(),
                vendor_id: accepted.vendor_id.clone(),
                assigned_at: now,
                state: AssignmentState::Assigned,
            })?;

            Ok((accepted, rejected))
        });

        let (accepted, rejected) = match outcome {
            Ok(committed) => committed,
            Err(error) => {
                warn!(%quote_id, %maintenance_id, %error, "quote acceptance refused");
                return Err(error);
            }
        };

        info!(
            %quote_id,
            %maintenance_id,
            vendor_id = %accepted.vendor_id,
            amount = accepted.amount,
            rejected_siblings = rejected,
            "quote accepted and request assigned"
        );
        dispatch(
            self.alerts.as_ref(),
            MaintenanceAlert::new("quote_accepted", &maintenance_id)
                .with_detail("quote_id", quote_id)
                .with_detail("vendor_id", &accepted.vendor_id)
                .with_detail("amount", accepted.amount),
        );
        dispatch(
            self.alerts.as_ref(),
            MaintenanceAlert::new("maintenance_assigned", &maintenance_id)
                .with_detail("vendor_id", &accepted.vendor_id)
                .with_detail("source", "quote"),
        );

        Ok(accepted)
    }

    /// Declines a single pending quote without touching the request.
    pub fn reject(
        &self,
        quote_id: &QuoteId,
        landlord_id: &LandlordId,
    ) -> Result<Quote, MaintenanceError> {
        let rejected = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut quote = tx
                .quote(quote_id)?
                .filter(|quote| !quote.is_deleted)
                .ok_or_else(|| MaintenanceError::not_found("quote", quote_id))?;
            let request = live_request(&*tx, &quote.maintenance_id)?;
            ensure_landlord(self.directory.as_ref(), &request, landlord_id)?;
            if quote.status != QuoteStatus::Pending {
                return Err(MaintenanceError::InvalidState(format!(
                    "quote '{quote_id}' is already {}",
                    quote.status.label()
                )));
            }
            quote.status = QuoteStatus::Rejected;
            quote.updated_at = Utc::now();
            Ok(tx.save_quote(quote)?)
        })?;

        info!(%quote_id, %landlord_id, "quote rejected");
        Ok(rejected)
    }

    pub fn quote(&self, quote_id: &QuoteId) -> Result<Quote, MaintenanceError> {
        self.store
            .read(|view| view.quote(quote_id))?
            .filter(|quote| !quote.is_deleted)
            .ok_or_else(|| MaintenanceError::not_found("quote", quote_id))
    }

    /// Live quotes on a request, newest first.
    pub fn for_maintenance(
        &self,
        maintenance_id: &MaintenanceId,
    ) -> Result<Vec<Quote>, MaintenanceError> {
        let (request, quotes) = self.store.read(|view| {
            Ok((
                view.request(maintenance_id)?,
                view.quotes_for_maintenance(maintenance_id)?,
            ))
        })?;
        match request {
            Some(request) if !request.is_deleted => Ok(quotes),
            _ => Err(MaintenanceError::not_found(
                "maintenance request",
                maintenance_id,
            )),
        }
    }

    pub fn for_vendor(&self, vendor_id: &VendorId) -> Result<Vec<Quote>, MaintenanceError> {
        Ok(self.store.read(|view| view.quotes_for_vendor(vendor_id))?)
    }
}

/// Every still-pending quote on the request becomes `REJECTED`; returns how many changed.
pub(crate) fn reject_pending_quotes(
    tx: &mut dyn StoreTransaction,
    maintenance_id: &MaintenanceId,
    now: DateTime<Utc>,
) -> Result<usize, MaintenanceError> {
    let mut rejected = 0;
    for mut quote in tx.quotes_for_maintenance(maintenance_id)? {
        if quote.status != QuoteStatus::Pending {
            continue;
        }
        quote.status = QuoteStatus::Rejected;
        quote.updated_at = now;
        tx.save_quote(quote)?;
        rejected += 1;
    }
    Ok(rejected)
}

fn assignment_lost(status: MaintenanceStatus) -> MaintenanceError {
    match status {
        MaintenanceStatus::Assigned => MaintenanceError::Conflict(ALREADY_ASSIGNED.to_string()),
        other => MaintenanceError::Conflict(format!("maintenance request is {other}")),
    }
}

pub(crate) fn live_request<V: StoreView + ?Sized>(
    view: &V,
    maintenance_id: &MaintenanceId,
) -> Result<MaintenanceRequest, MaintenanceError> {
    view.request(maintenance_id)?
        .filter(|request| !request.is_deleted)
        .ok_or_else(|| MaintenanceError::not_found("maintenance request", maintenance_id))
}

/// The property's current owner per the directory, not the landlord recorded at filing time.
pub(crate) fn ensure_landlord<D: ReferenceDirectory + ?Sized>(
    directory: &D,
    request: &MaintenanceRequest,
    landlord_id: &LandlordId,
) -> Result<(), MaintenanceError> {
    let owner = directory
        .property_owner(&request.property_id)
        .ok_or_else(|| MaintenanceError::not_found("property", &request.property_id))?;
    if &owner == landlord_id {
        Ok(())
    } else {
        Err(MaintenanceError::Unauthorized(format!(
            "landlord '{landlord_id}' does not own property '{}'",
            request.property_id
        )))
    }
}

fn pending_vendor_quote<V: StoreView + ?Sized>(
    view: &V,
    quote_id: &QuoteId,
    vendor_id: &VendorId,
) -> Result<Quote, MaintenanceError> {
    let quote = view
        .quote(quote_id)?
        .filter(|quote| !quote.is_deleted && &quote.vendor_id == vendor_id)
        .ok_or_else(|| MaintenanceError::not_found("quote", quote_id))?;
    if quote.status != QuoteStatus::Pending {
        return Err(MaintenanceError::InvalidState(format!(
            "cannot modify a quote that is already {}",
            quote.status.label()
        )));
    }
    Ok(quote)
}

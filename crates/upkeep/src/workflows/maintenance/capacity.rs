use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::directory::ReferenceDirectory;
use super::domain::{
    Availability, CategoryId, SubscriptionId, SubscriptionRegistration, VendorId,
    VendorServiceSubscription,
};
use super::error::MaintenanceError;
use super::repository::{MaintenanceStore, RepositoryError};
use super::whitelist::require_category;

static SUBSCRIPTION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_subscription_id() -> SubscriptionId {
    let id = SUBSCRIPTION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SubscriptionId(format!("svc-{id:06}"))
}

/// Why a vendor cannot take another job in a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IneligibleReason {
    NotSubscribed,
    Unavailable,
    AtCapacity { current_jobs: u32, limit: u32 },
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSubscribed => write!(f, "vendor is not subscribed to this category"),
            Self::Unavailable => write!(f, "vendor marked unavailable for this category"),
            Self::AtCapacity {
                current_jobs,
                limit,
            } => write!(f, "job level exceeded ({current_jobs} of {limit} active jobs)"),
        }
    }
}

/// Read-time eligibility snapshot. Advisory only: assignment re-validates capacity atomically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityCheck {
    pub eligible: bool,
    pub subscription: Option<VendorServiceSubscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IneligibleReason>,
}

impl EligibilityCheck {
    /// Converts into the subscription to assign against, or `CapacityExceeded`.
    pub fn into_subscription(self) -> Result<VendorServiceSubscription, MaintenanceError> {
        match (self.eligible, self.subscription, self.reason) {
            (true, Some(subscription), _) => Ok(subscription),
            (_, _, Some(reason)) => Err(MaintenanceError::CapacityExceeded(reason.to_string())),
            _ => Err(MaintenanceError::CapacityExceeded(
                IneligibleReason::NotSubscribed.to_string(),
            )),
        }
    }
}

pub(crate) fn evaluate(
    subscription: Option<VendorServiceSubscription>,
    limit: u32,
) -> EligibilityCheck {
    let reason = match &subscription {
        None => Some(IneligibleReason::NotSubscribed),
        Some(sub) if sub.availability == Availability::No => Some(IneligibleReason::Unavailable),
        Some(sub) if sub.current_jobs >= limit => Some(IneligibleReason::AtCapacity {
            current_jobs: sub.current_jobs,
            limit,
        }),
        Some(_) => None,
    };

    EligibilityCheck {
        eligible: reason.is_none(),
        subscription,
        reason,
    }
}

/// Per (vendor, category) subscription records and their concurrent-job counters.
pub struct VendorCapacityTracker<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    job_limit: u32,
}

impl<S, D> VendorCapacityTracker<S, D>
where
    S: MaintenanceStore,
    D: ReferenceDirectory,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, job_limit: u32) -> Self {
        Self {
            store,
            directory,
            job_limit,
        }
    }

    pub fn job_limit(&self) -> u32 {
        self.job_limit
    }

    pub fn register(
        &self,
        registration: SubscriptionRegistration,
    ) -> Result<VendorServiceSubscription, MaintenanceError> {
        require_category(
            self.directory.as_ref(),
            &registration.category_id,
            registration.subcategory_id.as_ref(),
        )?;

        let now = Utc::now();
        let subscription = VendorServiceSubscription {
            id: next_subscription_id(),
            vendor_id: registration.vendor_id,
            category_id: registration.category_id,
            subcategory_id: registration.subcategory_id,
            availability: registration.availability,
            current_jobs: 0,
            price_tiers: registration.price_tiers,
            created_at: now,
            updated_at: now,
        };

        self.store
            .atomically(|tx| tx.insert_subscription(subscription.clone()))
            .map_err(|error| match error {
                RepositoryError::Conflict => MaintenanceError::Conflict(format!(
                    "vendor '{}' is already subscribed to category '{}'",
                    subscription.vendor_id, subscription.category_id
                )),
                other => MaintenanceError::from(other),
            })?;

        info!(
            subscription_id = %subscription.id,
            vendor_id = %subscription.vendor_id,
            category_id = %subscription.category_id,
            "vendor subscription registered"
        );
        Ok(subscription)
    }

    pub fn subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<VendorServiceSubscription, MaintenanceError> {
        self.store
            .read(|view| view.subscription(subscription_id))?
            .ok_or_else(|| MaintenanceError::not_found("subscription", subscription_id))
    }

    /// Subscription the vendor holds for the category, if any.
    pub fn subscription_for(
        &self,
        vendor_id: &VendorId,
        category_id: &CategoryId,
    ) -> Result<Option<VendorServiceSubscription>, MaintenanceError> {
        Ok(self
            .store
            .read(|view| view.subscription_for(vendor_id, category_id))?)
    }

    pub fn set_availability(
        &self,
        vendor_id: &VendorId,
        subscription_id: &SubscriptionId,
        availability: Availability,
    ) -> Result<VendorServiceSubscription, MaintenanceError> {
        let updated = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let current = tx
                .subscription(subscription_id)?
                .ok_or_else(|| MaintenanceError::not_found("subscription", subscription_id))?;
            if &current.vendor_id != vendor_id {
                return Err(MaintenanceError::Unauthorized(format!(
                    "subscription '{subscription_id}' belongs to another vendor"
                )));
            }
            Ok(tx.set_availability(subscription_id, availability)?)
        })?;

        info!(%subscription_id, ?availability, "vendor availability updated");
        Ok(updated)
    }

    pub fn check_eligibility(
        &self,
        vendor_id: &VendorId,
        category_id: &CategoryId,
    ) -> Result<EligibilityCheck, MaintenanceError> {
        let subscription = self.subscription_for(vendor_id, category_id)?;
        let check = evaluate(subscription, self.job_limit);
        debug!(
            %vendor_id,
            %category_id,
            eligible = check.eligible,
            reason = ?check.reason,
            "vendor eligibility checked"
        );
        Ok(check)
    }

    /// Atomic +1, refused with `CapacityExceeded` once the subscription is full or unavailable.
    pub fn increment_jobs(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<VendorServiceSubscription, MaintenanceError> {
        let limit = self.job_limit;
        self.store.atomically(|tx| {
            tx.increment_jobs_within(subscription_id, limit)
                .map_err(|error| match error {
                    RepositoryError::NotFound => {
                        MaintenanceError::not_found("subscription", subscription_id)
                    }
                    other => MaintenanceError::from(other),
                })?
                .ok_or_else(|| {
                    MaintenanceError::CapacityExceeded(format!(
                        "subscription '{subscription_id}' cannot take another job"
                    ))
                })
        })
    }

    /// Atomic -1, floored at zero.
    pub fn decrement_jobs(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<VendorServiceSubscription, MaintenanceError> {
        self.store
            .atomically(|tx| tx.decrement_jobs(subscription_id))
            .map_err(|error| match error {
                RepositoryError::NotFound => {
                    MaintenanceError::not_found("subscription", subscription_id)
                }
                other => MaintenanceError::from(other),
            })
    }
}

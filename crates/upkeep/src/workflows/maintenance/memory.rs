use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    AssignmentHistoryEntry, Availability, CategoryId, LandlordId, MaintenanceId,
    MaintenanceRequest, MaintenanceStatus, MaintenanceWhitelist, Quote, QuoteId, RequestFilter,
    RescheduleHistoryEntry, SubscriptionId, VendorId, VendorServiceSubscription, WhitelistId,
};
use super::repository::{MaintenanceStore, RepositoryError, StoreTransaction, StoreView};

/// Process-local store backing the API binary, the demo, and tests.
///
/// A single mutex guards every table, so each unit of work is serializable. Units of work run
/// against a copy of the tables which replaces the live copy only when the work succeeds.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMaintenanceStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryMaintenanceStore {
    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("maintenance store lock poisoned".into()))
    }
}

impl MaintenanceStore for InMemoryMaintenanceStore {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut live = self.lock()?;
        let mut working = live.clone();
        let value = work(&mut working)?;
        *live = working;
        Ok(value)
    }

    fn read<T, F>(&self, query: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&dyn StoreView) -> Result<T, RepositoryError>,
    {
        let live = self.lock()?;
        query(&*live)
    }
}

#[derive(Debug, Default, Clone)]
struct Tables {
    requests: HashMap<MaintenanceId, MaintenanceRequest>,
    quotes: HashMap<QuoteId, Quote>,
    subscriptions: HashMap<SubscriptionId, VendorServiceSubscription>,
    whitelist: HashMap<WhitelistId, MaintenanceWhitelist>,
    assignments: Vec<AssignmentHistoryEntry>,
    reschedules: Vec<RescheduleHistoryEntry>,
}

fn newest_first(mut quotes: Vec<Quote>) -> Vec<Quote> {
    quotes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    quotes
}

impl StoreView for Tables {
    fn request(&self, id: &MaintenanceId) -> Result<Option<MaintenanceRequest>, RepositoryError> {
        Ok(self.requests.get(id).cloned())
    }

    fn requests(&self, filter: &RequestFilter) -> Result<Vec<MaintenanceRequest>, RepositoryError> {
        let mut matched: Vec<_> = self
            .requests
            .values()
            .filter(|request| filter.matches(request))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }

    fn quote(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        Ok(self.quotes.get(id).cloned())
    }

    fn quotes_for_maintenance(&self, id: &MaintenanceId) -> Result<Vec<Quote>, RepositoryError> {
        Ok(newest_first(
            self.quotes
                .values()
                .filter(|quote| &quote.maintenance_id == id && !quote.is_deleted)
                .cloned()
                .collect(),
        ))
    }

    fn quotes_for_vendor(&self, vendor_id: &VendorId) -> Result<Vec<Quote>, RepositoryError> {
        Ok(newest_first(
            self.quotes
                .values()
                .filter(|quote| &quote.vendor_id == vendor_id && !quote.is_deleted)
                .cloned()
                .collect(),
        ))
    }

    fn subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<VendorServiceSubscription>, RepositoryError> {
        Ok(self.subscriptions.get(id).cloned())
    }

    fn subscription_for(
        &self,
        vendor_id: &VendorId,
        category_id: &CategoryId,
    ) -> Result<Option<VendorServiceSubscription>, RepositoryError> {
        Ok(self
            .subscriptions
            .values()
            .find(|sub| &sub.vendor_id == vendor_id && &sub.category_id == category_id)
            .cloned())
    }

    fn whitelist_entry(
        &self,
        id: &WhitelistId,
    ) -> Result<Option<MaintenanceWhitelist>, RepositoryError> {
        Ok(self.whitelist.get(id).cloned())
    }

    fn whitelist_for(
        &self,
        landlord_id: &LandlordId,
    ) -> Result<Vec<MaintenanceWhitelist>, RepositoryError> {
        let mut entries: Vec<_> = self
            .whitelist
            .values()
            .filter(|entry| &entry.landlord_id == landlord_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    fn assignment_history(
        &self,
        id: &MaintenanceId,
    ) -> Result<Vec<AssignmentHistoryEntry>, RepositoryError> {
        Ok(self
            .assignments
            .iter()
            .filter(|entry| &entry.maintenance_id == id)
            .cloned()
            .collect())
    }

    fn reschedule_history(
        &self,
        id: &MaintenanceId,
    ) -> Result<Vec<RescheduleHistoryEntry>, RepositoryError> {
        Ok(self
            .reschedules
            .iter()
            .filter(|entry| &entry.maintenance_id == id)
            .cloned()
            .collect())
    }
}

impl StoreTransaction for Tables {
    fn insert_request(&mut self, request: MaintenanceRequest) -> Result<(), RepositoryError> {
        if self.requests.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        self.requests.insert(request.id.clone(), request);
        Ok(())
    }

    fn update_request_if(
        &mut self,
        id: &MaintenanceId,
        expected: MaintenanceStatus,
        apply: &mut dyn FnMut(&mut MaintenanceRequest),
    ) -> Result<Option<MaintenanceRequest>, RepositoryError> {
        let stored = self.requests.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if stored.is_deleted || stored.status != expected {
            return Ok(None);
        }

        apply(stored);
        stored.version += 1;
        Ok(Some(stored.clone()))
    }

    fn save_request(
        &mut self,
        mut request: MaintenanceRequest,
    ) -> Result<MaintenanceRequest, RepositoryError> {
        let stored = self
            .requests
            .get_mut(&request.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != request.version {
            return Err(RepositoryError::Conflict);
        }

        request.version += 1;
        *stored = request.clone();
        Ok(request)
    }

    fn insert_quote(&mut self, quote: Quote) -> Result<(), RepositoryError> {
        let duplicate = self.quotes.contains_key(&quote.id)
            || self.quotes.values().any(|existing| {
                !existing.is_deleted
                    && existing.maintenance_id == quote.maintenance_id
                    && existing.vendor_id == quote.vendor_id
            });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        self.quotes.insert(quote.id.clone(), quote);
        Ok(())
    }

    fn save_quote(&mut self, mut quote: Quote) -> Result<Quote, RepositoryError> {
        let stored = self
            .quotes
            .get_mut(&quote.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != quote.version {
            return Err(RepositoryError::Conflict);
        }

        quote.version += 1;
        *stored = quote.clone();
        Ok(quote)
    }

    fn insert_subscription(
        &mut self,
        subscription: VendorServiceSubscription,
    ) -> Result<(), RepositoryError> {
        let duplicate = self.subscriptions.contains_key(&subscription.id)
            || self.subscriptions.values().any(|existing| {
                existing.vendor_id == subscription.vendor_id
                    && existing.category_id == subscription.category_id
            });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        self.subscriptions
            .insert(subscription.id.clone(), subscription);
        Ok(())
    }

    fn set_availability(
        &mut self,
        id: &SubscriptionId,
        availability: Availability,
    ) -> Result<VendorServiceSubscription, RepositoryError> {
        let stored = self
            .subscriptions
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        stored.availability = availability;
        Ok(stored.clone())
    }

    fn increment_jobs_within(
        &mut self,
        id: &SubscriptionId,
        limit: u32,
    ) -> Result<Option<VendorServiceSubscription>, RepositoryError> {
        let stored = self
            .subscriptions
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.availability == Availability::No || stored.current_jobs >= limit {
            return Ok(None);
        }

        stored.current_jobs += 1;
        Ok(Some(stored.clone()))
    }

    fn decrement_jobs(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<VendorServiceSubscription, RepositoryError> {
        let stored = self
            .subscriptions
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        stored.current_jobs = stored.current_jobs.saturating_sub(1);
        Ok(stored.clone())
    }

    fn insert_whitelist(&mut self, entry: MaintenanceWhitelist) -> Result<(), RepositoryError> {
        if self.whitelist.contains_key(&entry.id) {
            return Err(RepositoryError::Conflict);
        }
        self.whitelist.insert(entry.id.clone(), entry);
        Ok(())
    }

    fn save_whitelist(&mut self, entry: MaintenanceWhitelist) -> Result<(), RepositoryError> {
        match self.whitelist.get_mut(&entry.id) {
            Some(stored) => {
                *stored = entry;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn append_assignment(
        &mut self,
        entry: AssignmentHistoryEntry,
    ) -> Result<(), RepositoryError> {
        self.assignments.push(entry);
        Ok(())
    }

    fn append_reschedule(
        &mut self,
        entry: RescheduleHistoryEntry,
    ) -> Result<(), RepositoryError> {
        self.reschedules.push(entry);
        Ok(())
    }
}

use std::sync::Arc;

use crate::config::MarketplaceConfig;

use super::alerts::AlertPublisher;
use super::assignment::AssignmentEngine;
use super::capacity::VendorCapacityTracker;
use super::directory::ReferenceDirectory;
use super::domain::{
    AssignmentHistoryEntry, MaintenanceId, MaintenanceRequest, RequestFilter,
    RescheduleHistoryEntry,
};
use super::error::MaintenanceError;
use super::lifecycle::LifecycleStateMachine;
use super::quotes::QuoteMarketplace;
use super::repository::MaintenanceStore;
use super::routing::RoutingOrchestrator;
use super::whitelist::WhitelistResolver;

/// Facade wiring the marketplace components over one store, directory, and alert hook.
pub struct MaintenanceService<S, D, A> {
    store: Arc<S>,
    whitelist: Arc<WhitelistResolver<S, D>>,
    capacity: Arc<VendorCapacityTracker<S, D>>,
    routing: RoutingOrchestrator<S, D>,
    assignment: AssignmentEngine<S, D, A>,
    quotes: QuoteMarketplace<S, D, A>,
    lifecycle: LifecycleStateMachine<S, D, A>,
}

impl<S, D, A> MaintenanceService<S, D, A>
where
    S: MaintenanceStore + 'static,
    D: ReferenceDirectory + 'static,
    A: AlertPublisher + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        alerts: Arc<A>,
        config: MarketplaceConfig,
    ) -> Self {
        let whitelist = Arc::new(WhitelistResolver::new(store.clone(), directory.clone()));
        let capacity = Arc::new(VendorCapacityTracker::new(
            store.clone(),
            directory.clone(),
            config.vendor_job_limit,
        ));
        let routing = RoutingOrchestrator::new(
            store.clone(),
            directory.clone(),
            whitelist.clone(),
            config.reschedule_limit,
        );
        let assignment = AssignmentEngine::new(store.clone(), capacity.clone(), alerts.clone());
        let quotes = QuoteMarketplace::new(
            store.clone(),
            directory.clone(),
            alerts.clone(),
            config.vendor_job_limit,
        );
        let lifecycle = LifecycleStateMachine::new(store.clone(), directory, alerts);

        Self {
            store,
            whitelist,
            capacity,
            routing,
            assignment,
            quotes,
            lifecycle,
        }
    }

    pub fn whitelist(&self) -> &WhitelistResolver<S, D> {
        &self.whitelist
    }

    pub fn capacity(&self) -> &VendorCapacityTracker<S, D> {
        &self.capacity
    }

    pub fn routing(&self) -> &RoutingOrchestrator<S, D> {
        &self.routing
    }

    pub fn assignment(&self) -> &AssignmentEngine<S, D, A> {
        &self.assignment
    }

    pub fn quotes(&self) -> &QuoteMarketplace<S, D, A> {
        &self.quotes
    }

    pub fn lifecycle(&self) -> &LifecycleStateMachine<S, D, A> {
        &self.lifecycle
    }

    /// Fetch a live request; soft-deleted requests read as missing.
    pub fn get(
        &self,
        maintenance_id: &MaintenanceId,
    ) -> Result<MaintenanceRequest, MaintenanceError> {
        let request = self.store.read(|view| view.request(maintenance_id))?;
        live(request, maintenance_id)
    }

    pub fn list(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<MaintenanceRequest>, MaintenanceError> {
        Ok(self.store.read(|view| view.requests(filter))?)
    }

    pub fn assignment_history(
        &self,
        maintenance_id: &MaintenanceId,
    ) -> Result<Vec<AssignmentHistoryEntry>, MaintenanceError> {
        let (request, history) = self.store.read(|view| {
            Ok((
                view.request(maintenance_id)?,
                view.assignment_history(maintenance_id)?,
            ))
        })?;
        live(request, maintenance_id)?;
        Ok(history)
    }

    pub fn reschedule_history(
        &self,
        maintenance_id: &MaintenanceId,
    ) -> Result<Vec<RescheduleHistoryEntry>, MaintenanceError> {
        let (request, history) = self.store.read(|view| {
            Ok((
                view.request(maintenance_id)?,
                view.reschedule_history(maintenance_id)?,
            ))
        })?;
        live(request, maintenance_id)?;
        Ok(history)
    }
}

fn live(
    request: Option<MaintenanceRequest>,
    maintenance_id: &MaintenanceId,
) -> Result<MaintenanceRequest, MaintenanceError> {
    request
        .filter(|request| !request.is_deleted)
        .ok_or_else(|| MaintenanceError::not_found("maintenance request", maintenance_id))
}

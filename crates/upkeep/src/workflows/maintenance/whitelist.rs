use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use super::directory::ReferenceDirectory;
use super::domain::{
    ApartmentId, CategoryId, LandlordId, MaintenanceWhitelist, PropertyId, SubcategoryId,
    WhitelistId, WhitelistInput, WhitelistQuery,
};
use super::error::MaintenanceError;
use super::repository::{MaintenanceStore, StoreView};

static WHITELIST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_whitelist_id() -> WhitelistId {
    let id = WHITELIST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    WhitelistId(format!("wl-{id:06}"))
}

/// Decides whether a landlord has pre-approved self-handling a class of issue, and manages
/// the landlord's whitelist entries.
pub struct WhitelistResolver<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
}

impl<S, D> WhitelistResolver<S, D>
where
    S: MaintenanceStore,
    D: ReferenceDirectory,
{
    pub fn new(store: Arc<S>, directory: Arc<D>) -> Self {
        Self { store, directory }
    }

    /// True when an active entry covers the tuple. A missing entry is a plain `false`.
    pub fn resolve(&self, query: &WhitelistQuery) -> Result<bool, MaintenanceError> {
        let matched = self.store.read(|view| {
            Ok(view
                .whitelist_for(&query.landlord_id)?
                .into_iter()
                .find(|entry| entry.covers(query)))
        })?;

        debug!(
            landlord_id = %query.landlord_id,
            category_id = %query.category_id,
            whitelist_id = matched.as_ref().map(|entry| entry.id.as_str()),
            "whitelist resolved"
        );
        Ok(matched.is_some())
    }

    pub fn create(
        &self,
        landlord_id: &LandlordId,
        input: WhitelistInput,
    ) -> Result<MaintenanceWhitelist, MaintenanceError> {
        self.validate_scope(landlord_id, &input)?;

        let now = Utc::now();
        let entry = MaintenanceWhitelist {
            id: next_whitelist_id(),
            landlord_id: landlord_id.clone(),
            category_id: input.category_id,
            subcategory_id: input.subcategory_id,
            property_id: input.property_id,
            apartment_id: input.apartment_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.store.atomically(|tx| {
            tx.insert_whitelist(entry.clone())
                .map_err(MaintenanceError::from)
        })?;
        info!(
            whitelist_id = %entry.id,
            %landlord_id,
            category_id = %entry.category_id,
            "whitelist entry created"
        );
        Ok(entry)
    }

    /// Replaces the scope of an entry the landlord owns.
    pub fn update(
        &self,
        landlord_id: &LandlordId,
        whitelist_id: &WhitelistId,
        input: WhitelistInput,
    ) -> Result<MaintenanceWhitelist, MaintenanceError> {
        self.validate_scope(landlord_id, &input)?;

        let entry = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut entry = owned_entry(&*tx, landlord_id, whitelist_id)?;
            entry.category_id = input.category_id;
            entry.subcategory_id = input.subcategory_id;
            entry.property_id = input.property_id;
            entry.apartment_id = input.apartment_id;
            entry.updated_at = Utc::now();
            tx.save_whitelist(entry.clone())?;
            Ok(entry)
        })?;

        info!(
            %whitelist_id,
            %landlord_id,
            category_id = %entry.category_id,
            "whitelist entry updated"
        );
        Ok(entry)
    }

    /// Flips `is_active` on an entry the landlord owns.
    pub fn toggle(
        &self,
        landlord_id: &LandlordId,
        whitelist_id: &WhitelistId,
    ) -> Result<MaintenanceWhitelist, MaintenanceError> {
        let entry = self.store.atomically(|tx| -> Result<_, MaintenanceError> {
            let mut entry = owned_entry(&*tx, landlord_id, whitelist_id)?;
            entry.is_active = !entry.is_active;
            entry.updated_at = Utc::now();
            tx.save_whitelist(entry.clone())?;
            Ok(entry)
        })?;

        info!(
            %whitelist_id,
            %landlord_id,
            is_active = entry.is_active,
            "whitelist entry toggled"
        );
        Ok(entry)
    }

    pub fn list(
        &self,
        landlord_id: &LandlordId,
    ) -> Result<Vec<MaintenanceWhitelist>, MaintenanceError> {
        Ok(self.store.read(|view| view.whitelist_for(landlord_id))?)
    }

    fn validate_scope(
        &self,
        landlord_id: &LandlordId,
        input: &WhitelistInput,
    ) -> Result<(), MaintenanceError> {
        require_category(
            self.directory.as_ref(),
            &input.category_id,
            input.subcategory_id.as_ref(),
        )?;

        match (&input.property_id, &input.apartment_id) {
            (Some(property_id), apartment_id) => {
                let owner = self
                    .directory
                    .property_owner(property_id)
                    .ok_or_else(|| MaintenanceError::not_found("property", property_id))?;
                if &owner != landlord_id {
                    return Err(MaintenanceError::Unauthorized(format!(
                        "landlord '{landlord_id}' does not own property '{property_id}'"
                    )));
                }
                if let Some(apartment_id) = apartment_id {
                    require_apartment(self.directory.as_ref(), property_id, apartment_id)?;
                }
                Ok(())
            }
            (None, Some(_)) => Err(MaintenanceError::Validation(
                "an apartment scope requires a property".to_string(),
            )),
            (None, None) => Ok(()),
        }
    }
}

fn owned_entry<V: StoreView + ?Sized>(
    view: &V,
    landlord_id: &LandlordId,
    whitelist_id: &WhitelistId,
) -> Result<MaintenanceWhitelist, MaintenanceError> {
    let entry = view
        .whitelist_entry(whitelist_id)?
        .ok_or_else(|| MaintenanceError::not_found("whitelist entry", whitelist_id))?;
    if &entry.landlord_id != landlord_id {
        return Err(MaintenanceError::Unauthorized(format!(
            "whitelist entry '{whitelist_id}' belongs to another landlord"
        )));
    }
    Ok(entry)
}

pub(crate) fn require_category<D: ReferenceDirectory + ?Sized>(
    directory: &D,
    category_id: &CategoryId,
    subcategory_id: Option<&SubcategoryId>,
) -> Result<(), MaintenanceError> {
    if !directory.category_exists(category_id) {
        return Err(MaintenanceError::not_found("category", category_id));
    }
    if let Some(subcategory_id) = subcategory_id {
        if !directory.subcategory_exists(category_id, subcategory_id) {
            return Err(MaintenanceError::not_found("subcategory", subcategory_id));
        }
    }
    Ok(())
}

pub(crate) fn require_apartment<D: ReferenceDirectory + ?Sized>(
    directory: &D,
    property_id: &PropertyId,
    apartment_id: &ApartmentId,
) -> Result<(), MaintenanceError> {
    if directory.apartment_exists(property_id, apartment_id) {
        Ok(())
    } else {
        Err(MaintenanceError::not_found("apartment", apartment_id))
    }
}

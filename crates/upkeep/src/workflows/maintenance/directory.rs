//! Reference lookups owned by other parts of the platform (properties, service catalog).

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::domain::{ApartmentId, CategoryId, LandlordId, PropertyId, SubcategoryId};

/// Existence and ownership checks consumed from the property and catalog services.
pub trait ReferenceDirectory: Send + Sync {
    /// Landlord owning the property, or `None` when the property does not exist.
    fn property_owner(&self, property_id: &PropertyId) -> Option<LandlordId>;
    fn apartment_exists(&self, property_id: &PropertyId, apartment_id: &ApartmentId) -> bool;
    fn category_exists(&self, category_id: &CategoryId) -> bool;
    fn subcategory_exists(&self, category_id: &CategoryId, subcategory_id: &SubcategoryId)
        -> bool;
}

/// Fixed in-memory directory, built in code or loaded from a CSV export.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    properties: HashMap<PropertyId, LandlordId>,
    apartments: HashSet<(PropertyId, ApartmentId)>,
    categories: HashSet<CategoryId>,
    subcategories: HashSet<(CategoryId, SubcategoryId)>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryLoadError {
    #[error("failed to read directory export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid directory CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
}

#[derive(Debug, Deserialize)]
struct DirectoryRow {
    kind: String,
    id: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    owner: Option<String>,
}

impl StaticDirectory {
    pub fn with_property(mut self, property_id: &str, landlord_id: &str) -> Self {
        self.properties
            .insert(PropertyId::new(property_id), LandlordId::new(landlord_id));
        self
    }

    pub fn with_apartment(mut self, property_id: &str, apartment_id: &str) -> Self {
        self.apartments
            .insert((PropertyId::new(property_id), ApartmentId::new(apartment_id)));
        self
    }

    pub fn with_category(mut self, category_id: &str) -> Self {
        self.categories.insert(CategoryId::new(category_id));
        self
    }

    pub fn with_subcategory(mut self, category_id: &str, subcategory_id: &str) -> Self {
        self.subcategories.insert((
            CategoryId::new(category_id),
            SubcategoryId::new(subcategory_id),
        ));
        self
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryLoadError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Loads `kind,id,parent,owner` rows where kind is one of `property` (owner = landlord),
    /// `apartment` (parent = property), `category`, or `subcategory` (parent = category).
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DirectoryLoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut directory = Self::default();

        for (index, record) in csv_reader.deserialize::<DirectoryRow>().enumerate() {
            let row = record?;
            let row_number = index + 2;
            let parent = row.parent.filter(|value| !value.is_empty());
            let owner = row.owner.filter(|value| !value.is_empty());
            let missing = |field: &str| DirectoryLoadError::InvalidRow {
                row: row_number,
                reason: format!("{} '{}' requires a {field}", row.kind, row.id),
            };

            directory = match row.kind.to_ascii_lowercase().as_str() {
                "property" => {
                    let owner = owner.ok_or_else(|| missing("owner"))?;
                    directory.with_property(&row.id, &owner)
                }
                "apartment" => {
                    let parent = parent.ok_or_else(|| missing("parent"))?;
                    directory.with_apartment(&parent, &row.id)
                }
                "category" => directory.with_category(&row.id),
                "subcategory" => {
                    let parent = parent.ok_or_else(|| missing("parent"))?;
                    directory.with_subcategory(&parent, &row.id)
                }
                other => {
                    return Err(DirectoryLoadError::InvalidRow {
                        row: row_number,
                        reason: format!("unknown kind '{other}'"),
                    })
                }
            };
        }

        Ok(directory)
    }
}

impl ReferenceDirectory for StaticDirectory {
    fn property_owner(&self, property_id: &PropertyId) -> Option<LandlordId> {
        self.properties.get(property_id).cloned()
    }

    fn apartment_exists(&self, property_id: &PropertyId, apartment_id: &ApartmentId) -> bool {
        self.apartments
            .contains(&(property_id.clone(), apartment_id.clone()))
    }

    fn category_exists(&self, category_id: &CategoryId) -> bool {
        self.categories.contains(category_id)
    }

    fn subcategory_exists(
        &self,
        category_id: &CategoryId,
        subcategory_id: &SubcategoryId,
    ) -> bool {
        self.subcategories
            .contains(&(category_id.clone(), subcategory_id.clone()))
    }
}

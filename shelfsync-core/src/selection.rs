// Catalog selection for batch parses and listings
use crate::model::{CatalogEntry, Competitor, ProductStatus, find_node};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Criteria for picking catalog entries. Unset criteria match everything;
/// the set ones must all hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFilter {
    /// Case-insensitive substring of the entry name.
    pub name: Option<String>,
    /// Competitor id or name.
    pub competitor: Option<String>,
    /// Category ids from any competitor tree. An entry matches when its
    /// category path holds the name of one of them.
    pub category_ids: Vec<String>,
    pub status: Option<ProductStatus>,
    pub availability: Option<String>,
    pub price_from: Option<f64>,
    pub price_to: Option<f64>,
    pub problematic: bool,
}

impl ProductFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_competitor(mut self, competitor: impl Into<String>) -> Self {
        self.competitor = Some(competitor.into());
        self
    }

    pub fn with_category(mut self, id: impl Into<String>) -> Self {
        self.category_ids.push(id.into());
        self
    }

    pub fn with_status(mut self, status: ProductStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_availability(mut self, availability: impl Into<String>) -> Self {
        self.availability = Some(availability.into());
        self
    }

    pub fn with_price_range(mut self, from: Option<f64>, to: Option<f64>) -> Self {
        self.price_from = from;
        self.price_to = to;
        self
    }

    pub fn only_problematic(mut self) -> Self {
        self.problematic = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Matching entries in catalog order.
    pub fn select<'a>(
        &self,
        catalog: &'a [CatalogEntry],
        competitors: &[Competitor],
    ) -> Vec<&'a CatalogEntry> {
        let competitor_id = self
            .competitor
            .as_deref()
            .map(|key| resolve_competitor(key, competitors));
        let category_names = category_names(&self.category_ids, competitors);
        if !self.category_ids.is_empty() && category_names.is_empty() {
            warn!(
                "None of the category ids {:?} exist, ignoring the category criterion",
                self.category_ids
            );
        }

        catalog
            .iter()
            .filter(|entry| self.matches(entry, competitor_id.as_deref(), &category_names))
            .collect()
    }

    fn matches(
        &self,
        entry: &CatalogEntry,
        competitor_id: Option<&str>,
        category_names: &[String],
    ) -> bool {
        if let Some(name) = &self.name {
            if !entry.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(id) = competitor_id {
            if entry.competitor_id.as_deref() != Some(id) {
                return false;
            }
        }
        if !category_names.is_empty()
            && !entry.category_path.iter().any(|c| category_names.contains(c))
        {
            return false;
        }
        if let Some(status) = self.status {
            if entry.status != status {
                return false;
            }
        }
        if let Some(availability) = &self.availability {
            let wanted = availability.to_lowercase();
            if entry.availability.as_deref().unwrap_or_default().to_lowercase() != wanted {
                return false;
            }
        }
        if let Some(from) = self.price_from {
            if !entry.price.is_some_and(|p| p >= from) {
                return false;
            }
        }
        if let Some(to) = self.price_to {
            if !entry.price.is_some_and(|p| p <= to) {
                return false;
            }
        }
        !self.problematic || is_problematic(entry)
    }
}

/// A failed parse, or a parse that came back without price or availability.
pub fn is_problematic(entry: &CatalogEntry) -> bool {
    match entry.status {
        ProductStatus::Error => true,
        ProductStatus::Parsed => entry.price.is_none() || entry.availability.is_none(),
        ProductStatus::Pending | ProductStatus::Delisted => false,
    }
}

/// The competitor id for an id or a name; unknown keys are compared as ids.
fn resolve_competitor(key: &str, competitors: &[Competitor]) -> String {
    let lowered = key.to_lowercase();
    competitors
        .iter()
        .find(|c| c.id == key || c.name.to_lowercase() == lowered)
        .map(|c| c.id.clone())
        .unwrap_or_else(|| key.to_string())
}

fn category_names(ids: &[String], competitors: &[Competitor]) -> Vec<String> {
    let mut names = Vec::new();
    for competitor in competitors {
        for id in ids {
            if let Some(node) = find_node(&competitor.categories, id) {
                names.push(node.name.clone());
            }
        }
    }
    names
}

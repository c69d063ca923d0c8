// Job runner: wires the pipelines to the task registry and the store
use crate::categories::{build_tree, delete_nodes, manual_category, select_nodes};
use crate::data::{
    DocumentStore, load_catalog, load_competitors, save_catalog, save_competitors,
};
use crate::discovery::{DiscoveryPipeline, DiscoveryStats, PageReport};
use crate::error::{CoreError, Result};
use crate::model::{CatalogEntry, CategoryNode, Competitor, PriceObservation, ProductStatus, TaskStatus};
use crate::price::parse_price;
use crate::progress::{TaskRegistry, TaskUpdate, UnitTally};
use crate::reconcile::{ReconcileStats, reconcile};
use crate::selection::ProductFilter;
use crate::url_identity::normalize_absolute;
use chrono::Utc;
use shelfsync_scanner::{ExtractionService, ProductDetail, ScanError};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const KIND_UPDATE_CATEGORIES: &str = "update_categories";
pub const KIND_DISCOVER_PRODUCTS: &str = "discover_products";
pub const KIND_PARSE_DISCOVERED: &str = "parse_discovered_products";
pub const KIND_PARSE_PRODUCTS: &str = "parse_products";
pub const KIND_PARSE_ALL: &str = "parse_all_products";
pub const KIND_PARSE_FILTERED: &str = "parse_filtered_products";

pub const NO_EXTRACTION_SERVICE: &str = "no extraction endpoint configured";

/// Background parse launched by a discovery run.
pub struct FollowUp {
    pub task_id: String,
    pub product_ids: Vec<String>,
    pub handle: JoinHandle<Result<UnitTally>>,
}

pub struct DiscoveryOutcome {
    pub entries: Vec<CatalogEntry>,
    pub pages: Vec<PageReport>,
    pub stats: DiscoveryStats,
    pub status: TaskStatus,
    pub follow_up: Option<FollowUp>,
}

#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn DocumentStore>,
    registry: TaskRegistry,
    service: Option<Arc<dyn ExtractionService>>,
}

impl JobRunner {
    /// A runner over `store`. Jobs that extract pages also need
    /// [`JobRunner::with_service`]; without one they fail before any unit.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            registry: TaskRegistry::new(store.clone()),
            store,
            service: None,
        }
    }

    pub fn with_service(mut self, service: Arc<dyn ExtractionService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    fn service(&self) -> Result<Arc<dyn ExtractionService>> {
        self.service
            .clone()
            .ok_or_else(|| CoreError::Invariant(NO_EXTRACTION_SERVICE.to_string()))
    }

    /// Register a job and return its fresh id.
    pub fn submit(&self, kind: &str, total_hint: usize) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.registry.create(&id, kind, total_hint)?;
        info!("Submitted {} task {} (total {})", kind, id, total_hint);
        Ok(id)
    }

    /// Mark a job failed, record the error and hand it back.
    fn fail(&self, task_id: &str, err: CoreError) -> CoreError {
        error!("Task {} failed: {}", task_id, err);
        let update = TaskUpdate::new().status(TaskStatus::Failed).error(err.to_string());
        if let Err(e) = self.registry.advance(task_id, update) {
            warn!("Could not record failure of task {}: {}", task_id, e);
        }
        err
    }

    /// Record per-unit progress; a registry write error is only logged.
    fn note(&self, task_id: &str, update: TaskUpdate) {
        if let Err(e) = self.registry.advance(task_id, update) {
            warn!("Could not record progress of task {}: {}", task_id, e);
        }
    }

    // Competitors

    pub fn add_competitor(&self, name: &str, url: &str, notes: Option<&str>) -> Result<Competitor> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("competitor name is required".to_string()));
        }
        let Some(key) = normalize_absolute(url) else {
            return Err(CoreError::Validation(format!(
                "invalid competitor URL '{}'",
                url
            )));
        };

        let mut competitors = load_competitors(self.store())?;
        let lowered = name.to_lowercase();
        if competitors.iter().any(|c| {
            c.name.to_lowercase() == lowered
                || normalize_absolute(&c.url).as_deref() == Some(key.as_str())
        }) {
            return Err(CoreError::Validation(format!(
                "competitor '{}' ({}) already exists",
                name, key
            )));
        }

        let mut competitor = Competitor::new(name, key);
        competitor.notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        competitors.push(competitor.clone());
        save_competitors(self.store(), &competitors)?;
        info!("Added competitor {} ({})", competitor.name, competitor.id);
        Ok(competitor)
    }

    pub fn list_competitors(&self) -> Result<Vec<Competitor>> {
        load_competitors(self.store())
    }

    /// Look a competitor up by id, or by name ignoring case.
    pub fn get_competitor(&self, key: &str) -> Result<Option<Competitor>> {
        let key = key.trim();
        Ok(load_competitors(self.store())?
            .into_iter()
            .find(|c| c.id == key || c.name.to_lowercase() == key.to_lowercase()))
    }

    fn require_competitor(&self, key: &str) -> Result<Competitor> {
        self.get_competitor(key)?
            .ok_or_else(|| CoreError::Invariant(format!("competitor '{}' not found", key)))
    }

    /// Re-read the collection, apply `edit` to one competitor and save.
    fn update_competitor<T>(
        &self,
        id: &str,
        edit: impl FnOnce(&mut Competitor) -> Result<T>,
    ) -> Result<T> {
        let mut competitors = load_competitors(self.store())?;
        let competitor = competitors
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| CoreError::Invariant(format!("competitor '{}' not found", id)))?;
        let value = edit(competitor)?;
        save_competitors(self.store(), &competitors)?;
        Ok(value)
    }

    // Categories

    /// Crawl the competitor's category tree and merge it into the stored one.
    pub async fn run_category_sync(&self, task_id: &str, competitor: &str) -> Result<ReconcileStats> {
        let service = self.service().map_err(|e| self.fail(task_id, e))?;
        let competitor = self
            .require_competitor(competitor)
            .map_err(|e| self.fail(task_id, e))?;
        self.registry
            .advance(
                task_id,
                TaskUpdate::new().status(TaskStatus::Running).total(1).done(0),
            )
            .map_err(|e| self.fail(task_id, e))?;

        info!("Updating categories of {} from {}", competitor.name, competitor.url);
        let raw = match service.extract_tree(&competitor.url).await {
            Ok(raw) => raw,
            Err(e) => {
                let message = format!("competitor '{}': {}", competitor.name, e);
                self.note(
                    task_id,
                    TaskUpdate::new()
                        .done(1)
                        .status(TaskStatus::Failed)
                        .error(message),
                );
                return Err(e.into());
            }
        };

        let fresh = build_tree(&raw, &competitor.url);
        let stats = self
            .update_competitor(&competitor.id, |c| {
                let (merged, stats) = reconcile(&c.categories, &fresh);
                c.categories = merged;
                c.last_parsed = Some(Utc::now());
                Ok(stats)
            })
            .map_err(|e| self.fail(task_id, e))?;

        info!(
            "Categories of {}: found={}, not_found={}, new={}",
            competitor.name, stats.found, stats.not_found, stats.new
        );
        self.registry
            .advance(
                task_id,
                TaskUpdate::new()
                    .done(1)
                    .status(TaskStatus::Finished)
                    .summary(stats.summary()),
            )
            .map_err(|e| self.fail(task_id, e))?;
        Ok(stats)
    }

    pub fn add_manual_category(&self, competitor: &str, name: &str, url: &str) -> Result<CategoryNode> {
        let competitor = self.require_competitor(competitor)?;
        self.update_competitor(&competitor.id, |c| {
            let node = manual_category(&c.categories, &c.url, name, url)?;
            c.categories.push(node.clone());
            Ok(node)
        })
    }

    pub fn delete_categories(&self, competitor: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Err(CoreError::Validation("no category ids given".to_string()));
        }
        let competitor = self.require_competitor(competitor)?;
        self.update_competitor(&competitor.id, |c| {
            let (kept, deleted) = delete_nodes(&c.categories, ids);
            c.categories = kept;
            Ok(deleted)
        })
    }

    // Catalog

    /// Add a catalog entry by hand. The URL must be absolute and new to the
    /// catalog; the entry waits for its first detail parse.
    pub fn add_product(&self, name: &str, url: &str, competitor: Option<&str>) -> Result<CatalogEntry> {
        let Some(key) = normalize_absolute(url) else {
            return Err(CoreError::Validation(format!("invalid product URL '{}'", url)));
        };
        let competitor = competitor.map(|c| self.require_competitor(c)).transpose()?;

        let mut catalog = load_catalog(self.store())?;
        if catalog
            .iter()
            .any(|p| normalize_absolute(&p.url).as_deref() == Some(key.as_str()))
        {
            return Err(CoreError::Validation(format!(
                "product {} is already in the catalog",
                key
            )));
        }

        let mut entry = CatalogEntry::pending(name, key);
        if let Some(competitor) = competitor {
            entry.competitor_id = Some(competitor.id);
            entry.competitor_name = Some(competitor.name);
        }
        entry.log("add", "success", "added manually");
        catalog.push(entry.clone());
        save_catalog(self.store(), &catalog)?;
        info!("Added product {} ({})", entry.name, entry.url);
        Ok(entry)
    }

    /// Catalog entries matching `filter`, in catalog order.
    pub fn select_products(&self, filter: &ProductFilter) -> Result<Vec<CatalogEntry>> {
        let catalog = load_catalog(self.store())?;
        let competitors = load_competitors(self.store())?;
        Ok(filter
            .select(&catalog, &competitors)
            .into_iter()
            .cloned()
            .collect())
    }

    // Discovery

    /// Discover products in the selected categories and append the new ones
    /// to the catalog. With `follow_up`, a detail parse of the new entries is
    /// spawned once discovery is done.
    pub async fn run_discovery(
        &self,
        task_id: &str,
        competitor: &str,
        category_ids: &[String],
        follow_up: bool,
    ) -> Result<DiscoveryOutcome> {
        let service = self.service().map_err(|e| self.fail(task_id, e))?;
        let competitor = self
            .require_competitor(competitor)
            .map_err(|e| self.fail(task_id, e))?;
        let pages = select_nodes(&competitor.categories, category_ids);
        if pages.is_empty() {
            let err = CoreError::Invariant(format!(
                "none of the selected categories exist for '{}'",
                competitor.name
            ));
            return Err(self.fail(task_id, err));
        }
        let existing: Vec<String> = load_catalog(self.store())
            .map_err(|e| self.fail(task_id, e))?
            .into_iter()
            .map(|p| p.url)
            .collect();

        self.registry
            .advance(
                task_id,
                TaskUpdate::new()
                    .status(TaskStatus::Running)
                    .total(pages.len())
                    .done(0),
            )
            .map_err(|e| self.fail(task_id, e))?;

        let registry = self.registry.clone();
        let progress_task = task_id.to_string();
        let pipeline = DiscoveryPipeline::new(service).with_page_callback(Arc::new(
            move |done: usize, report: &PageReport| {
                let mut update = TaskUpdate::new().done(done);
                if let Some(error) = &report.error {
                    update = update.error(error.clone());
                }
                if let Err(e) = registry.advance(&progress_task, update) {
                    warn!("Could not record progress of task {}: {}", progress_task, e);
                }
            },
        ));

        let run = pipeline.run(&pages, existing).await;

        let mut entries = run.entries;
        for entry in &mut entries {
            entry.competitor_id = Some(competitor.id.clone());
            entry.competitor_name = Some(competitor.name.clone());
        }

        if !entries.is_empty() {
            let (before, after) = self
                .append_to_catalog(&entries)
                .map_err(|e| self.fail(task_id, e))?;
            info!(
                "Saved {} new products (catalog {} -> {})",
                entries.len(),
                before,
                after
            );
        } else {
            warn!("Discovery in {} found no new products", competitor.name);
        }

        let mut tally = UnitTally::default();
        for page in &run.pages {
            if page.is_success() {
                tally.record_success();
            } else {
                tally.record_failure();
            }
        }
        let status = tally.final_status();
        let summary = format!(
            "Processed {} of {} categories, {} new products",
            tally.succeeded,
            pages.len(),
            entries.len()
        );
        self.registry
            .advance(
                task_id,
                TaskUpdate::new()
                    .status(status)
                    .products_found(entries.len())
                    .summary(summary),
            )
            .map_err(|e| self.fail(task_id, e))?;

        let follow_up = if follow_up && !entries.is_empty() {
            match self.spawn_follow_up(&entries) {
                Ok(f) => Some(f),
                Err(e) => {
                    error!("Could not start detail parse of new products: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(DiscoveryOutcome {
            entries,
            pages: run.pages,
            stats: run.stats,
            status,
            follow_up,
        })
    }

    /// Append to a freshly loaded catalog; returns the sizes before and after.
    fn append_to_catalog(&self, entries: &[CatalogEntry]) -> Result<(usize, usize)> {
        let mut catalog = load_catalog(self.store())?;
        let before = catalog.len();
        catalog.extend(entries.iter().cloned());
        save_catalog(self.store(), &catalog)?;
        Ok((before, catalog.len()))
    }

    fn spawn_follow_up(&self, entries: &[CatalogEntry]) -> Result<FollowUp> {
        let product_ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        let task_id = self.submit(KIND_PARSE_DISCOVERED, product_ids.len())?;

        let runner = self.clone();
        let ids = product_ids.clone();
        let spawned_id = task_id.clone();
        let handle = tokio::spawn(async move { runner.run_detail_parse(&spawned_id, &ids).await });

        info!(
            "Started detail parse of {} new products (task {})",
            product_ids.len(),
            task_id
        );
        Ok(FollowUp {
            task_id,
            product_ids,
            handle,
        })
    }

    // Detail parse

    /// Extract product details for the given catalog entries, one unit each.
    ///
    /// A 404 marks the entry delisted and counts as a success. Each finished
    /// unit is written back to the catalog right away; a unit whose write
    /// fails counts as failed and the run goes on.
    pub async fn run_detail_parse(&self, task_id: &str, product_ids: &[String]) -> Result<UnitTally> {
        let service = self.service().map_err(|e| self.fail(task_id, e))?;
        let catalog = load_catalog(self.store()).map_err(|e| self.fail(task_id, e))?;
        self.registry
            .advance(
                task_id,
                TaskUpdate::new()
                    .status(TaskStatus::Running)
                    .total(product_ids.len())
                    .done(0),
            )
            .map_err(|e| self.fail(task_id, e))?;

        let mut tally = UnitTally::default();
        let mut delisted = 0;
        for (idx, product_id) in product_ids.iter().enumerate() {
            let update = TaskUpdate::new().done(idx + 1);
            match self.parse_unit(service.as_ref(), &catalog, product_id).await {
                Ok(gone) => {
                    tally.record_success();
                    if gone {
                        delisted += 1;
                    }
                    self.note(task_id, update);
                }
                Err(message) => {
                    tally.record_failure();
                    self.note(task_id, update.error(message));
                }
            }
        }

        let summary = format!(
            "Parsed {} of {} products ({} delisted)",
            tally.succeeded,
            product_ids.len(),
            delisted
        );
        self.registry
            .advance(
                task_id,
                TaskUpdate::new().status(tally.final_status()).summary(summary),
            )
            .map_err(|e| self.fail(task_id, e))?;
        Ok(tally)
    }

    /// Refresh every catalog entry. Entries parsed before only get price and
    /// availability updated.
    pub async fn run_parse_all(&self, task_id: &str) -> Result<UnitTally> {
        let ids: Vec<String> = load_catalog(self.store())
            .map_err(|e| self.fail(task_id, e))?
            .into_iter()
            .map(|p| p.id)
            .collect();
        info!("Parsing all {} catalog entries", ids.len());
        self.run_detail_parse(task_id, &ids).await
    }

    /// Parse the catalog entries matching `filter`.
    pub async fn run_parse_filtered(&self, task_id: &str, filter: &ProductFilter) -> Result<UnitTally> {
        let ids: Vec<String> = self
            .select_products(filter)
            .map_err(|e| self.fail(task_id, e))?
            .into_iter()
            .map(|p| p.id)
            .collect();
        info!("Filter selected {} catalog entries", ids.len());
        self.run_detail_parse(task_id, &ids).await
    }

    /// One detail-parse unit. `Ok(true)` when the product turned out
    /// delisted; `Err` carries the message for the task's error list.
    async fn parse_unit(
        &self,
        service: &dyn ExtractionService,
        catalog: &[CatalogEntry],
        product_id: &str,
    ) -> std::result::Result<bool, String> {
        let Some(mut entry) = catalog.iter().find(|p| p.id == product_id).cloned() else {
            return Err(format!("product {}: not in catalog", product_id));
        };

        let outcome = match service.extract_detail(&entry.url).await {
            Ok(detail) => {
                apply_detail(&mut entry, detail);
                Ok(false)
            }
            Err(e) if e.is_not_found() => {
                warn!("Product {} is gone: {}", entry.url, e);
                entry.status = ProductStatus::Delisted;
                entry.last_parsed_at = Some(Utc::now());
                entry.log("parse", "delisted", e.to_string());
                Ok(true)
            }
            Err(e) => {
                warn!("Detail parse failed for {}: {}", entry.url, e);
                entry.status = ProductStatus::Error;
                entry.log("parse", "error", e.to_string());
                Err(unit_error(&entry, &e))
            }
        };

        if let Err(e) = self.write_entry(&entry) {
            error!("Could not save product {}: {}", entry.url, e);
            return Err(format!("product '{}': not saved: {}", entry.name, e));
        }
        outcome
    }

    /// Replace one entry in a freshly loaded catalog.
    fn write_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let mut catalog = load_catalog(self.store())?;
        match catalog.iter_mut().find(|p| p.id == entry.id) {
            Some(slot) => *slot = entry.clone(),
            None => catalog.push(entry.clone()),
        }
        save_catalog(self.store(), &catalog)
    }
}

fn unit_error(entry: &CatalogEntry, e: &ScanError) -> String {
    format!("product '{}': {}", entry.name, e)
}

/// Fold a detail extraction into an entry. The first successful parse fills
/// every field; later ones refresh price and availability only. Every parse
/// appends a history observation.
pub fn apply_detail(entry: &mut CatalogEntry, detail: ProductDetail) {
    let price = detail.price.as_ref().and_then(parse_price);
    let first_parse = !entry.name_parsed;

    if first_parse {
        if let Some(name) = detail.name.filter(|n| !n.trim().is_empty()) {
            entry.name = name;
        }
        if detail.sku.is_some() {
            entry.sku = detail.sku;
        }
        if !detail.category_path.is_empty() {
            entry.category_path = detail.category_path;
        }
        entry.name_parsed = true;
    }
    entry.price = price;
    entry.availability = detail.availability;

    let now = Utc::now();
    entry.history.push(PriceObservation {
        date: now,
        price: entry.price,
        availability: entry.availability.clone(),
    });
    entry.status = ProductStatus::Parsed;
    entry.last_parsed_at = Some(now);
    entry.log(
        "parse",
        "success",
        if first_parse { "first parse" } else { "price refresh" },
    );
}

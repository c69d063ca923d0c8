// Product discovery: turns category pages into new, deduplicated catalog entries
use crate::model::{CatalogEntry, CategoryNode};
use crate::price::parse_price;
use crate::url_identity::{looks_like_listing_control, normalize, normalize_absolute};
use serde::{Deserialize, Serialize};
use shelfsync_scanner::{ExtractionService, RawListing};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    ProductList,
    CategoryList,
    Mixed,
    Unknown,
}

impl PageKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "product_list" => Some(PageKind::ProductList),
            "category_list" => Some(PageKind::CategoryList),
            "mixed" => Some(PageKind::Mixed),
            "unknown" => Some(PageKind::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::ProductList => "product_list",
            PageKind::CategoryList => "category_list",
            PageKind::Mixed => "mixed",
            PageKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCandidate {
    pub name: String,
    pub url: String,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub availability: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCandidate {
    pub name: String,
    pub url: String,
}

/// The reported tag when it is one of the four known kinds, otherwise a
/// kind inferred from which candidate lists are non-empty.
pub fn classify_page(
    reported: Option<&str>,
    products: &[ProductCandidate],
    categories: &[CategoryCandidate],
) -> PageKind {
    if let Some(kind) = reported.and_then(PageKind::parse) {
        return kind;
    }
    match (products.is_empty(), categories.is_empty()) {
        (false, false) => PageKind::Mixed,
        (false, true) => PageKind::ProductList,
        (true, false) => PageKind::CategoryList,
        (true, true) => PageKind::Unknown,
    }
}

/// Dedup state carried from one page to the next within a run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryAccumulator {
    existing_products: HashSet<String>,
    seen_products: HashSet<String>,
    seen_categories: HashSet<String>,
}

impl DiscoveryAccumulator {
    /// Seeds the accumulator with catalog URLs, normalized on the way in.
    pub fn new<I, S>(existing_product_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let existing_products = existing_product_urls
            .into_iter()
            .filter_map(|u| normalize_absolute(u.as_ref()))
            .collect();
        Self {
            existing_products,
            ..Self::default()
        }
    }

    pub fn is_known_product(&self, url: &str) -> bool {
        self.existing_products.contains(url) || self.seen_products.contains(url)
    }

    /// Products emitted so far in this run.
    pub fn emitted_count(&self) -> usize {
        self.seen_products.len()
    }
}

/// What one category page contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub page_id: String,
    pub page_name: String,
    pub page_url: String,
    pub kind: Option<PageKind>,
    /// Valid product candidates on the page before catalog dedup.
    pub products_seen: usize,
    pub products_added: usize,
    pub categories: Vec<CategoryCandidate>,
    pub error: Option<String>,
}

impl PageReport {
    fn new(page: &CategoryNode) -> Self {
        Self {
            page_id: page.id.clone(),
            page_name: page.name.clone(),
            page_url: page.url.clone(),
            kind: None,
            products_seen: 0,
            products_added: 0,
            categories: Vec::new(),
            error: None,
        }
    }

    fn failed(page: &CategoryNode, message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::new(page)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub pages_total: usize,
    pub pages_failed: usize,
    pub products_seen: usize,
    pub products_new: usize,
    pub categories_found: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryRun {
    pub entries: Vec<CatalogEntry>,
    pub pages: Vec<PageReport>,
    pub stats: DiscoveryStats,
}

/// Classify and dedup one page's extraction output.
///
/// The page kind is decided on the page's own valid candidates, before any
/// catalog or in-run dedup, so a page of already-known products still reads
/// as a product list.
pub fn process_page(
    page: &CategoryNode,
    listing: RawListing,
    mut acc: DiscoveryAccumulator,
) -> (PageReport, Vec<CatalogEntry>, DiscoveryAccumulator) {
    let mut report = PageReport::new(page);
    let base = page.url.as_str();
    let page_key = normalize_absolute(base);
    let is_self = |url: &str| page_key.as_deref() == Some(url);

    let mut products: Vec<ProductCandidate> = Vec::new();
    let mut page_product_urls: HashSet<String> = HashSet::new();
    for raw in listing.products {
        let Some(url) = raw.url.as_deref().and_then(|u| normalize(u, base)) else {
            continue;
        };
        if is_self(&url) || !page_product_urls.insert(url.clone()) {
            continue;
        }
        products.push(ProductCandidate {
            name: raw.name.unwrap_or_default(),
            url,
            sku: raw.sku,
            price: raw.price.as_ref().and_then(parse_price),
            availability: raw.availability,
        });
    }

    let mut categories: Vec<CategoryCandidate> = Vec::new();
    let mut page_category_urls: HashSet<String> = HashSet::new();
    for raw in listing.categories {
        let Some(url) = raw.url.as_deref().and_then(|u| normalize(u, base)) else {
            continue;
        };
        if is_self(&url) || looks_like_listing_control(&url) {
            continue;
        }
        let Some(name) = raw.name.filter(|n| !n.trim().is_empty()) else {
            continue;
        };
        if !page_category_urls.insert(url.clone()) {
            continue;
        }
        categories.push(CategoryCandidate { name, url });
    }

    let kind = classify_page(listing.page_type.as_deref(), &products, &categories);
    report.kind = Some(kind);
    report.products_seen = products.len();

    let mut entries = Vec::new();
    for candidate in products {
        if acc.is_known_product(&candidate.url) {
            debug!("Product already known, skipping: {}", candidate.url);
            continue;
        }
        acc.seen_products.insert(candidate.url.clone());

        let mut entry = CatalogEntry::pending(&candidate.name, candidate.url);
        entry.sku = candidate.sku;
        entry.price = candidate.price;
        entry.availability = candidate.availability;
        entry.category_path = vec![page.name.clone()];
        entry.from_category_discovery = true;
        entries.push(entry);
    }
    report.products_added = entries.len();

    report.categories = categories
        .into_iter()
        .filter(|c| acc.seen_categories.insert(c.url.clone()))
        .collect();

    (report, entries, acc)
}

pub type PageCallback = Arc<dyn Fn(usize, &PageReport) + Send + Sync>;

/// Runs extraction over category pages in order and collects new entries.
pub struct DiscoveryPipeline {
    service: Arc<dyn ExtractionService>,
    page_callback: Option<PageCallback>,
}

impl DiscoveryPipeline {
    pub fn new(service: Arc<dyn ExtractionService>) -> Self {
        Self {
            service,
            page_callback: None,
        }
    }

    /// Called after every page, with the 1-based count of pages handled.
    pub fn with_page_callback(mut self, callback: PageCallback) -> Self {
        self.page_callback = Some(callback);
        self
    }

    /// Extract and process one page. Failures land in the report; the
    /// accumulator comes back untouched in that case.
    pub async fn discover_page(
        &self,
        page: &CategoryNode,
        acc: DiscoveryAccumulator,
    ) -> (PageReport, Vec<CatalogEntry>, DiscoveryAccumulator) {
        if page.url.trim().is_empty() {
            return (
                PageReport::failed(page, format!("category '{}': URL missing", page.name)),
                Vec::new(),
                acc,
            );
        }

        info!("Discovering products in '{}' ({})", page.name, page.url);
        match self.service.extract_listing(&page.url).await {
            Ok(listing) => process_page(page, listing, acc),
            Err(e) => {
                warn!("Discovery failed for '{}': {}", page.name, e);
                (
                    PageReport::failed(page, format!("category '{}': {}", page.name, e)),
                    Vec::new(),
                    acc,
                )
            }
        }
    }

    pub async fn run<I, S>(&self, pages: &[CategoryNode], existing_product_urls: I) -> DiscoveryRun
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut acc = DiscoveryAccumulator::new(existing_product_urls);
        let mut run = DiscoveryRun::default();
        run.stats.pages_total = pages.len();

        for (idx, page) in pages.iter().enumerate() {
            let (report, entries, next) = self.discover_page(page, acc).await;
            acc = next;

            if report.is_success() {
                run.stats.products_seen += report.products_seen;
                run.stats.categories_found += report.categories.len();
                info!(
                    "'{}' ({}): {} new of {} products, {} sub-categories",
                    report.page_name,
                    report.kind.map(|k| k.as_str()).unwrap_or("unknown"),
                    report.products_added,
                    report.products_seen,
                    report.categories.len()
                );
            } else {
                run.stats.pages_failed += 1;
            }

            if let Some(callback) = &self.page_callback {
                callback(idx + 1, &report);
            }
            run.entries.extend(entries);
            run.pages.push(report);
        }

        run.stats.products_new = acc.emitted_count();
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelfsync_scanner::{RawCategory, RawProduct};

    fn page() -> CategoryNode {
        CategoryNode::new("phones", "Phones", "https://shop.example/catalog/phones")
    }

    fn product(url: &str) -> RawProduct {
        RawProduct {
            name: Some(format!("Product {}", url)),
            url: Some(url.to_string()),
            ..RawProduct::default()
        }
    }

    fn category(name: &str, url: &str) -> RawCategory {
        RawCategory {
            name: Some(name.to_string()),
            url: Some(url.to_string()),
        }
    }

    #[test]
    fn test_classify_keeps_valid_tag() {
        assert_eq!(classify_page(Some("mixed"), &[], &[]), PageKind::Mixed);
        assert_eq!(classify_page(Some("unknown"), &[], &[]), PageKind::Unknown);
    }

    #[test]
    fn test_classify_infers_from_lists() {
        let p = vec![ProductCandidate {
            name: "A".into(),
            url: "https://shop.example/a".into(),
            sku: None,
            price: None,
            availability: None,
        }];
        let c = vec![CategoryCandidate {
            name: "B".into(),
            url: "https://shop.example/b".into(),
        }];
        assert_eq!(classify_page(Some("products!"), &p, &[]), PageKind::ProductList);
        assert_eq!(classify_page(None, &[], &c), PageKind::CategoryList);
        assert_eq!(classify_page(None, &p, &c), PageKind::Mixed);
        assert_eq!(classify_page(Some(""), &[], &[]), PageKind::Unknown);
    }

    #[test]
    fn test_self_reference_and_unusable_urls_dropped() {
        let listing = RawListing {
            page_type: None,
            products: vec![
                product("/catalog/phones/"),
                product("mailto:x@shop.example"),
                RawProduct::default(),
                product("/p/7"),
            ],
            categories: vec![],
        };
        let (report, entries, _) = process_page(&page(), listing, DiscoveryAccumulator::default());
        assert_eq!(report.products_seen, 1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://shop.example/p/7");
        assert!(entries[0].from_category_discovery);
        assert_eq!(entries[0].category_path, vec!["Phones".to_string()]);
    }

    #[test]
    fn test_blank_name_gets_placeholder_and_price_parsed() {
        let listing = RawListing {
            page_type: Some("product_list".into()),
            products: vec![RawProduct {
                name: None,
                url: Some("/p/9".into()),
                price: Some(json!("1 299 грн")),
                ..RawProduct::default()
            }],
            categories: vec![],
        };
        let (_, entries, _) = process_page(&page(), listing, DiscoveryAccumulator::default());
        assert_eq!(entries[0].name, crate::model::UNTITLED_PRODUCT);
        assert_eq!(entries[0].price, Some(1299.0));
    }

    #[test]
    fn test_category_filters() {
        let listing = RawListing {
            page_type: None,
            products: vec![],
            categories: vec![
                category("Android", "android"),
                category("Page 2", "/catalog/phones/page/2"),
                category("Cheapest", "/catalog/phones/sort-price"),
                category("", "/catalog/nameless"),
                category("Android again", "android/?utm=1"),
                category("Self", "https://shop.example/catalog/phones"),
            ],
        };
        let (report, entries, _) = process_page(&page(), listing, DiscoveryAccumulator::default());
        assert!(entries.is_empty());
        assert_eq!(report.kind, Some(PageKind::CategoryList));
        assert_eq!(
            report.categories,
            vec![CategoryCandidate {
                name: "Android".into(),
                url: "https://shop.example/catalog/android".into(),
            }]
        );
    }

    #[test]
    fn test_categories_deduped_across_pages() {
        let listing = || RawListing {
            page_type: None,
            products: vec![],
            categories: vec![category("Cases", "/catalog/cases")],
        };
        let (first, _, acc) = process_page(&page(), listing(), DiscoveryAccumulator::default());
        let (second, _, _) = process_page(&page(), listing(), acc);
        assert_eq!(first.categories.len(), 1);
        assert!(second.categories.is_empty());
        assert_eq!(second.kind, Some(PageKind::CategoryList));
    }

    #[test]
    fn test_known_products_still_classify_page() {
        let acc = DiscoveryAccumulator::new(["https://shop.example/p/1/"]);
        let listing = RawListing {
            page_type: Some("???".into()),
            products: vec![product("/p/1")],
            categories: vec![],
        };
        let (report, entries, _) = process_page(&page(), listing, acc);
        assert!(entries.is_empty());
        assert_eq!(report.kind, Some(PageKind::ProductList));
        assert_eq!(report.products_seen, 1);
        assert_eq!(report.products_added, 0);
    }
}

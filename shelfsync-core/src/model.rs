// Catalog data model: competitors, category trees, catalog entries and tasks
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const UNTITLED_PRODUCT: &str = "untitled product";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub children: Vec<CategoryNode>,
    #[serde(default)]
    pub needs_manual_review: bool,
    #[serde(default)]
    pub manually_added: bool,
}

impl CategoryNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            children: Vec::new(),
            needs_manual_review: false,
            manually_added: false,
        }
    }

    pub fn with_children(mut self, children: Vec<CategoryNode>) -> Self {
        self.children = children;
        self
    }

    /// Number of nodes in this subtree, the node itself included.
    pub fn subtree_size(&self) -> usize {
        1 + tree_size(&self.children)
    }

    /// Copy of this subtree with every node flagged for review.
    pub fn flagged(&self) -> CategoryNode {
        CategoryNode {
            needs_manual_review: true,
            children: self.children.iter().map(CategoryNode::flagged).collect(),
            ..self.clone()
        }
    }
}

pub fn tree_size(nodes: &[CategoryNode]) -> usize {
    nodes.iter().map(CategoryNode::subtree_size).sum()
}

/// Depth-first search by id.
pub fn find_node<'a>(nodes: &'a [CategoryNode], id: &str) -> Option<&'a CategoryNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_node(&node.children, id) {
            return Some(found);
        }
    }
    None
}

/// Every node in pre-order.
pub fn walk(nodes: &[CategoryNode]) -> Vec<&CategoryNode> {
    let mut out = Vec::new();
    for node in nodes {
        out.push(node);
        out.extend(walk(&node.children));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub categories: Vec<CategoryNode>,
    #[serde(default)]
    pub last_parsed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Competitor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            url: url.into(),
            categories: Vec::new(),
            last_parsed: None,
            notes: None,
            active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    /// Created by discovery, waiting for a detail parse.
    Pending,
    Parsed,
    Error,
    /// The storefront answered 404 for the product page.
    Delisted,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Pending => "pending",
            ProductStatus::Parsed => "parsed",
            ProductStatus::Error => "error",
            ProductStatus::Delisted => "delisted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Some(ProductStatus::Pending),
            "parsed" => Some(ProductStatus::Parsed),
            "error" => Some(ProductStatus::Error),
            "delisted" => Some(ProductStatus::Delisted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub date: DateTime<Utc>,
    pub price: Option<f64>,
    pub availability: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryLog {
    pub date: DateTime<Utc>,
    pub operation: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    /// Normalized identity URL.
    pub url: String,
    pub status: ProductStatus,
    #[serde(default)]
    pub name_parsed: bool,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub competitor_id: Option<String>,
    #[serde(default)]
    pub competitor_name: Option<String>,
    #[serde(default)]
    pub category_path: Vec<String>,
    #[serde(default)]
    pub from_category_discovery: bool,
    #[serde(default)]
    pub history: Vec<PriceObservation>,
    #[serde(default)]
    pub logs: Vec<EntryLog>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_parsed_at: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// A fresh entry in the `pending` state. A blank name gets the
    /// placeholder so every entry stays displayable.
    pub fn pending(name: &str, url: impl Into<String>) -> Self {
        let name = name.trim();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: if name.is_empty() {
                UNTITLED_PRODUCT.to_string()
            } else {
                name.to_string()
            },
            url: url.into(),
            status: ProductStatus::Pending,
            name_parsed: false,
            sku: None,
            price: None,
            availability: None,
            competitor_id: None,
            competitor_name: None,
            category_path: Vec::new(),
            from_category_discovery: false,
            history: Vec::new(),
            logs: Vec::new(),
            created_at: Utc::now(),
            last_parsed_at: None,
        }
    }

    pub fn log(&mut self, operation: &str, status: &str, message: impl Into<String>) {
        self.logs.push(EntryLog {
            date: Utc::now(),
            operation: operation.to_string(),
            status: status.to_string(),
            message: message.into(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Finished,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Finished => "finished",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub total: usize,
    pub done: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub products_found: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, total: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind: kind.into(),
            total,
            done: 0,
            errors: Vec::new(),
            status: TaskStatus::Running,
            summary: None,
            products_found: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Vec<CategoryNode> {
        vec![
            CategoryNode::new("phones", "Phones", "https://shop.example/phones").with_children(vec![
                CategoryNode::new("android", "Android", "https://shop.example/phones/android"),
                CategoryNode::new("ios", "iOS", "https://shop.example/phones/ios"),
            ]),
            CategoryNode::new("tv", "TV", "https://shop.example/tv"),
        ]
    }

    #[test]
    fn test_tree_size_and_walk() {
        let tree = sample_tree();
        assert_eq!(tree_size(&tree), 4);
        let ids: Vec<_> = walk(&tree).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["phones", "android", "ios", "tv"]);
    }

    #[test]
    fn test_find_node_nested() {
        let tree = sample_tree();
        assert_eq!(find_node(&tree, "ios").map(|n| n.name.as_str()), Some("iOS"));
        assert!(find_node(&tree, "missing").is_none());
    }

    #[test]
    fn test_flagged_covers_descendants() {
        let flagged = sample_tree()[0].flagged();
        assert!(walk(std::slice::from_ref(&flagged))
            .iter()
            .all(|n| n.needs_manual_review));
    }

    #[test]
    fn test_category_flags_default_when_missing() {
        let node: CategoryNode =
            serde_json::from_str(r#"{"id":"a","name":"A","url":"https://shop.example/a"}"#)
                .unwrap();
        assert!(!node.needs_manual_review);
        assert!(!node.manually_added);
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_pending_entry_placeholder_name() {
        let entry = CatalogEntry::pending("  ", "https://shop.example/p/1");
        assert_eq!(entry.name, UNTITLED_PRODUCT);
        assert_eq!(entry.status, ProductStatus::Pending);
    }

    #[test]
    fn test_task_serializes_kind_as_type() {
        let task = Task::new("t1", "discover_products", 3);
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["type"], "discover_products");
        assert_eq!(value["status"], "running");
    }
}

// Category tree building and manual curation
use crate::error::{CoreError, Result};
use crate::model::{CategoryNode, find_node, walk};
use crate::url_identity::{normalize, normalize_absolute, path_slug, same_identity, same_site};
use shelfsync_scanner::RawTreeNode;
use std::collections::HashSet;
use url::Url;
use uuid::Uuid;

/// Stable id for a category: the URL path as a slug, or a short hash of the
/// URL (or name) when the path is empty.
pub fn derive_category_id(url: &str, name: &str) -> String {
    if let Some(slug) = path_slug(url) {
        return slug;
    }
    let seed = if url.trim().is_empty() { name } else { url };
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.trim().as_bytes()).simple().to_string();
    digest[..12].to_string()
}

/// Convert an extracted tree into category nodes.
///
/// URLs at every depth are resolved against the competitor's `base` and
/// normalized, missing ids are derived,
/// and sibling id collisions get a numeric suffix. Nodes with neither name
/// nor URL are dropped.
pub fn build_tree(raw: &[RawTreeNode], base: &str) -> Vec<CategoryNode> {
    let mut used: HashSet<String> = HashSet::new();
    let mut nodes = Vec::with_capacity(raw.len());

    for item in raw {
        let url = item
            .url
            .as_deref()
            .and_then(|u| normalize(u, base))
            .unwrap_or_default();
        let name = item.name.clone().unwrap_or_default();
        if name.is_empty() && url.is_empty() {
            continue;
        }
        let name = if name.is_empty() { url.clone() } else { name };

        let base_id = item
            .id
            .clone()
            .unwrap_or_else(|| derive_category_id(&url, &name));
        let mut id = base_id.clone();
        let mut n = 2;
        while !used.insert(id.clone()) {
            id = format!("{}-{}", base_id, n);
            n += 1;
        }

        let children = build_tree(&item.children, base);
        nodes.push(CategoryNode::new(id, name, url.clone()).with_children(children));
    }

    nodes
}

/// Create a manually curated root category for a competitor's tree.
///
/// The URL must belong to the competitor's site (a `www.` prefix is ignored)
/// and neither its id nor its URL may already appear anywhere in the tree.
pub fn manual_category(
    tree: &[CategoryNode],
    competitor_url: &str,
    name: &str,
    url: &str,
) -> Result<CategoryNode> {
    let name = name.trim();
    let url = url.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("category name is required".to_string()));
    }

    let parsed = Url::parse(url)
        .map_err(|e| CoreError::Validation(format!("invalid URL '{}': {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(CoreError::Validation(format!(
            "invalid URL '{}': expected an http(s) address",
            url
        )));
    }

    if !competitor_url.trim().is_empty() && !same_site(url, competitor_url) {
        return Err(CoreError::Validation(format!(
            "URL '{}' belongs to another site than {}",
            url, competitor_url
        )));
    }

    let id = derive_category_id(url, name);
    if find_node(tree, &id).is_some() {
        return Err(CoreError::Validation(format!(
            "a category with id '{}' already exists",
            id
        )));
    }
    if walk(tree)
        .iter()
        .any(|n| n.url.trim() == url || same_identity(&n.url, url, competitor_url))
    {
        return Err(CoreError::Validation(format!(
            "a category with URL '{}' already exists",
            url
        )));
    }

    let key = normalize_absolute(url).unwrap_or_else(|| url.to_string());
    let mut node = CategoryNode::new(id, name, key);
    node.manually_added = true;
    Ok(node)
}

/// Remove every node whose id is listed, along with its subtree. The count
/// covers the listed nodes only.
pub fn delete_nodes(tree: &[CategoryNode], ids: &[String]) -> (Vec<CategoryNode>, usize) {
    let mut deleted = 0;
    let mut kept = Vec::with_capacity(tree.len());
    for node in tree {
        if ids.iter().any(|id| id == &node.id) {
            deleted += 1;
            continue;
        }
        let (children, removed) = delete_nodes(&node.children, ids);
        deleted += removed;
        kept.push(CategoryNode {
            children,
            ..node.clone()
        });
    }
    (kept, deleted)
}

/// Nodes whose id is listed, searched at every depth, in tree order.
pub fn select_nodes(tree: &[CategoryNode], ids: &[String]) -> Vec<CategoryNode> {
    walk(tree)
        .into_iter()
        .filter(|n| ids.iter().any(|id| id == &n.id))
        .cloned()
        .collect()
}

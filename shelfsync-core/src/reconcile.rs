// Category tree reconciliation: merges a fresh crawl into the stored tree
use crate::model::{CategoryNode, tree_size, walk};
use crate::url_identity::normalize_absolute;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::debug;

/// How many flagged nodes [`ReconcileStats::summary`] lists by name.
pub const FLAGGED_REPORT_LIMIT: usize = 10;

/// Which rule paired an old node with a node of the fresh crawl. The index
/// points into the new level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    MatchedById(usize),
    MatchedByUrl(usize),
    MatchedByName(usize),
    Unmatched,
}

impl MatchOutcome {
    pub fn index(&self) -> Option<usize> {
        match self {
            MatchOutcome::MatchedById(i)
            | MatchOutcome::MatchedByUrl(i)
            | MatchOutcome::MatchedByName(i) => Some(*i),
            MatchOutcome::Unmatched => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedNode {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub found: usize,
    pub not_found: usize,
    pub new: usize,
    pub flagged: Vec<FlaggedNode>,
}

impl ReconcileStats {
    /// Human-readable outcome, listing at most [`FLAGGED_REPORT_LIMIT`]
    /// flagged nodes.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Category update finished: {} found, {} flagged for review, {} new",
            self.found, self.not_found, self.new
        );
        if !self.flagged.is_empty() {
            out.push_str("\nFlagged for manual review:");
            for node in self.flagged.iter().take(FLAGGED_REPORT_LIMIT) {
                let _ = write!(out, "\n- {} (id: {}, {})", node.name, node.id, node.url);
            }
            if self.flagged.len() > FLAGGED_REPORT_LIMIT {
                let _ = write!(
                    out,
                    "\n... and {} more",
                    self.flagged.len() - FLAGGED_REPORT_LIMIT
                );
            }
        }
        out
    }
}

fn url_key(node: &CategoryNode) -> Option<String> {
    normalize_absolute(&node.url)
}

fn name_key(node: &CategoryNode) -> Option<String> {
    let name = node.name.trim();
    if name.is_empty() { None } else { Some(name.to_lowercase()) }
}

fn id_key(node: &CategoryNode) -> Option<&str> {
    let id = node.id.trim();
    if id.is_empty() { None } else { Some(id) }
}

/// Pair each old node of one level with at most one new node.
///
/// Rules are applied as whole-level passes: every id match is settled before
/// any URL match, and every URL match before any name match. A new node is
/// claimed by at most one old node, first come first served within a pass.
pub fn match_level(old: &[CategoryNode], new: &[CategoryNode]) -> Vec<MatchOutcome> {
    let mut outcomes = vec![MatchOutcome::Unmatched; old.len()];
    let mut claimed = vec![false; new.len()];

    let new_urls: Vec<Option<String>> = new.iter().map(url_key).collect();
    let new_names: Vec<Option<String>> = new.iter().map(name_key).collect();

    for (i, old_node) in old.iter().enumerate() {
        let Some(id) = id_key(old_node) else { continue };
        if let Some(j) = (0..new.len()).find(|&j| !claimed[j] && id_key(&new[j]) == Some(id)) {
            claimed[j] = true;
            outcomes[i] = MatchOutcome::MatchedById(j);
        }
    }

    for (i, old_node) in old.iter().enumerate() {
        if outcomes[i] != MatchOutcome::Unmatched {
            continue;
        }
        let Some(url) = url_key(old_node) else { continue };
        if let Some(j) =
            (0..new.len()).find(|&j| !claimed[j] && new_urls[j].as_deref() == Some(url.as_str()))
        {
            claimed[j] = true;
            outcomes[i] = MatchOutcome::MatchedByUrl(j);
        }
    }

    for (i, old_node) in old.iter().enumerate() {
        if outcomes[i] != MatchOutcome::Unmatched {
            continue;
        }
        let Some(name) = name_key(old_node) else { continue };
        if let Some(j) =
            (0..new.len()).find(|&j| !claimed[j] && new_names[j].as_deref() == Some(name.as_str()))
        {
            claimed[j] = true;
            outcomes[i] = MatchOutcome::MatchedByName(j);
        }
    }

    outcomes
}

/// Whether `node` resembles any old node by id, URL or name.
fn resembles_any(node: &CategoryNode, old: &[CategoryNode]) -> bool {
    let id = id_key(node);
    let url = url_key(node);
    let name = name_key(node);
    old.iter().any(|o| {
        (id.is_some() && id_key(o) == id)
            || (url.is_some() && url_key(o) == url)
            || (name.is_some() && name_key(o) == name)
    })
}

/// Merge a freshly crawled tree into the stored one.
///
/// Matched nodes take the crawl's id, name, URL and review flag and keep
/// their `manually_added` flag. Old nodes with no counterpart are kept with their
/// whole subtree flagged `needs_manual_review`. Crawled nodes resembling no
/// old node are appended after the old ones. Neither input is modified.
pub fn reconcile(old: &[CategoryNode], new: &[CategoryNode]) -> (Vec<CategoryNode>, ReconcileStats) {
    let mut stats = ReconcileStats::default();

    if old.is_empty() {
        stats.new = new.len();
        return (new.to_vec(), stats);
    }

    let merged = merge_level(old, new, &mut stats);
    debug!(
        "Reconciled {} old / {} new nodes: found={}, not_found={}, new={}",
        tree_size(old),
        tree_size(new),
        stats.found,
        stats.not_found,
        stats.new
    );
    (merged, stats)
}

fn merge_level(
    old: &[CategoryNode],
    new: &[CategoryNode],
    stats: &mut ReconcileStats,
) -> Vec<CategoryNode> {
    let outcomes = match_level(old, new);
    let mut claimed = vec![false; new.len()];
    let mut merged = Vec::with_capacity(old.len() + new.len());

    for (old_node, outcome) in old.iter().zip(&outcomes) {
        match outcome.index() {
            Some(j) => {
                claimed[j] = true;
                stats.found += 1;
                merged.push(merge_matched(old_node, &new[j], stats));
            }
            None => merged.push(flag_subtree(old_node, stats)),
        }
    }

    for (j, new_node) in new.iter().enumerate() {
        if claimed[j] {
            continue;
        }
        if resembles_any(new_node, old) {
            debug!(
                "Skipping crawled category '{}' ({}): resembles an existing node already paired",
                new_node.name, new_node.url
            );
            continue;
        }
        stats.new += new_node.subtree_size();
        merged.push(new_node.clone());
    }

    merged
}

fn merge_matched(
    old: &CategoryNode,
    new: &CategoryNode,
    stats: &mut ReconcileStats,
) -> CategoryNode {
    let children = if !old.children.is_empty() && new.children.is_empty() {
        old.children
            .iter()
            .map(|child| flag_subtree(child, stats))
            .collect()
    } else {
        merge_level(&old.children, &new.children, stats)
    };

    CategoryNode {
        id: new.id.clone(),
        name: new.name.clone(),
        url: new.url.clone(),
        children,
        needs_manual_review: new.needs_manual_review,
        manually_added: old.manually_added || new.manually_added,
    }
}

/// Flag a whole unmatched subtree and record every node of it.
fn flag_subtree(node: &CategoryNode, stats: &mut ReconcileStats) -> CategoryNode {
    let flagged = node.flagged();
    for n in walk(std::slice::from_ref(&flagged)) {
        stats.not_found += 1;
        stats.flagged.push(FlaggedNode {
            id: n.id.clone(),
            name: n.name.clone(),
            url: n.url.clone(),
        });
    }
    flagged
}

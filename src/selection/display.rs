//! Pure list transformations used by the composer.
//!
//! None of these touch storage; they take and return owned item lists so the
//! composer can chain them and stay deterministic for a given input order.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use crate::domain::{ProcessedItem, Tier};

/// Per-source limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiversityLimits {
    pub max_per_source: usize,
    /// A source may reach this count only if the extra item is a deep dive
    pub max_with_deep_dive: usize,
}

impl Default for DiversityLimits {
    fn default() -> Self {
        Self {
            max_per_source: 2,
            max_with_deep_dive: 3,
        }
    }
}

/// Group items by source in first-seen order.
fn group_by_source(items: Vec<ProcessedItem>) -> Vec<Vec<ProcessedItem>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<ProcessedItem>> = Vec::new();
    for item in items {
        match index.get(&item.source_id) {
            Some(&i) => groups[i].push(item),
            None => {
                index.insert(item.source_id.clone(), groups.len());
                groups.push(vec![item]);
            }
        }
    }
    groups
}

/// Keep at most `max_per_source` items per source, plus further items up to
/// `max_with_deep_dive` when they are deep dives. Returns `(kept, dropped)`.
pub fn enforce_source_diversity(
    items: Vec<ProcessedItem>,
    limits: DiversityLimits,
) -> (Vec<ProcessedItem>, Vec<ProcessedItem>) {
    let mut kept = Vec::new();
    let mut dropped = Vec::new();

    for mut group in group_by_source(items) {
        group.sort_by_key(|i| i.tier.priority());
        for (rank, item) in group.into_iter().enumerate() {
            if rank < limits.max_per_source || (rank < limits.max_with_deep_dive && item.tier == Tier::DeepDive) {
                kept.push(item);
            } else {
                dropped.push(item);
            }
        }
    }
    (kept, dropped)
}

/// Ranking among deep dives: longest first, then most recent, then lower id.
pub fn deep_dive_rank(a: &ProcessedItem, b: &ProcessedItem) -> Ordering {
    b.word_count
        .cmp(&a.word_count)
        .then_with(|| b.published_at.cmp(&a.published_at))
        .then_with(|| a.content_id.cmp(&b.content_id))
}

/// Split of a candidate list around the deep-dive ceiling.
#[derive(Debug, Clone, Default)]
pub struct CeilingSplit {
    pub kept_deep: Vec<ProcessedItem>,
    pub rest: Vec<ProcessedItem>,
    /// Deep dives over the ceiling, still carrying their old tier
    pub over_ceiling: Vec<ProcessedItem>,
}

/// Partition items so that at most `max_deep_dives` deep dives are kept.
pub fn split_deep_dive_ceiling(items: Vec<ProcessedItem>, max_deep_dives: usize) -> CeilingSplit {
    let (mut deep, rest): (Vec<_>, Vec<_>) = items.into_iter().partition(|i| i.tier == Tier::DeepDive);
    if deep.len() <= max_deep_dives {
        return CeilingSplit {
            kept_deep: deep,
            rest,
            over_ceiling: Vec::new(),
        };
    }
    deep.sort_by(deep_dive_rank);
    let over_ceiling = deep.split_off(max_deep_dives);
    CeilingSplit {
        kept_deep: deep,
        rest,
        over_ceiling,
    }
}

/// Keep the `cap` best items by tier, stable within a tier.
pub fn cap_by_tier(mut items: Vec<ProcessedItem>, cap: usize) -> (Vec<ProcessedItem>, Vec<ProcessedItem>) {
    if items.len() <= cap {
        return (items, Vec::new());
    }
    items.sort_by_key(|i| i.tier.priority());
    let cut = items.split_off(cap);
    (items, cut)
}

/// Display order: tiers best first; within a tier fresh before backlog, then
/// a round robin over sources so one source does not cluster.
pub fn order_for_display(items: Vec<ProcessedItem>) -> Vec<ProcessedItem> {
    let mut ordered = Vec::with_capacity(items.len());

    for tier in Tier::ALL {
        let mut tier_items: Vec<ProcessedItem> = items.iter().filter(|i| i.tier == tier).cloned().collect();
        if tier_items.is_empty() {
            continue;
        }
        tier_items.sort_by_key(|i| i.is_backlog);
        ordered.extend(round_robin_by_source(tier_items));
    }
    ordered
}

/// One item per source per pass; queues with more remaining go first.
fn round_robin_by_source(items: Vec<ProcessedItem>) -> Vec<ProcessedItem> {
    let mut queues: Vec<VecDeque<ProcessedItem>> = group_by_source(items).into_iter().map(VecDeque::from).collect();
    let mut out = Vec::new();

    while !queues.is_empty() {
        queues.sort_by(|a, b| b.len().cmp(&a.len()));
        for queue in queues.iter_mut() {
            if let Some(item) = queue.pop_front() {
                out.push(item);
            }
        }
        queues.retain(|q| !q.is_empty());
    }
    out
}

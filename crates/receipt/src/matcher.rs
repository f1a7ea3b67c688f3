use std::cmp::Ordering;

use crate::config::MatchingConfig;
use crate::model::{InventoryItem, MatchDecision, MatchResult};
use crate::normalize::Normalizer;

/// Inventory snapshot keyed for matching: each item's canonical name, or its
/// normalized display name while the canonical name is unset.
pub struct CandidateIndex<'a> {
    entries: Vec<(String, &'a InventoryItem)>,
}

impl<'a> CandidateIndex<'a> {
    pub fn build(snapshot: &'a [InventoryItem], normalizer: &Normalizer) -> Self {
        let entries = snapshot
            .iter()
            .map(|item| {
                let key = match &item.canonical_name {
                    Some(c) if !c.is_empty() => c.clone(),
                    _ => normalizer.canonical_name(&item.name),
                };
                (key, item)
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct Matcher {
    config: MatchingConfig,
}

impl Matcher {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    /// Best candidate for `canonical_name`.
    ///
    /// Candidates within `tie_epsilon` of the top score are tied; the most
    /// recently updated wins, then the lowest id. Below the review threshold
    /// no candidate is returned.
    pub fn find<'a>(&self, canonical_name: &str, index: &CandidateIndex<'a>) -> MatchResult<'a> {
        let scored: Vec<(f64, &'a InventoryItem)> = index
            .entries
            .iter()
            .map(|(key, item)| (self.score(canonical_name, key), *item))
            .collect();

        let Some(top) = scored.iter().map(|(s, _)| *s).reduce(f64::max) else {
            return MatchResult {
                candidate: None,
                score: 0.0,
                decision: MatchDecision::New,
            };
        };

        let best = scored
            .iter()
            .filter(|(s, _)| *s >= top - self.config.tie_epsilon)
            .min_by(|(_, a), (_, b)| prefer(a, b))
            .map(|(s, item)| (*s, *item));

        match best {
            Some((score, item)) if score >= self.config.auto_threshold => MatchResult {
                candidate: Some(item),
                score,
                decision: MatchDecision::Auto,
            },
            Some((score, item)) if score >= self.config.review_threshold => MatchResult {
                candidate: Some(item),
                score,
                decision: MatchDecision::Review,
            },
            _ => MatchResult {
                candidate: None,
                score: top,
                decision: MatchDecision::New,
            },
        }
    }

    /// Similarity in [0, 1]; identical names score exactly 1.0.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let w = self.config.token_weight;
        let blended = w * soft_token_overlap(a, b) + (1.0 - w) * edit_ratio(a, b);
        blended.clamp(0.0, 1.0)
    }
}

/// Most recently updated first, then lowest id.
fn prefer(a: &InventoryItem, b: &InventoryItem) -> Ordering {
    b.last_updated
        .cmp(&a.last_updated)
        .then_with(|| a.id.cmp(&b.id))
}

/// Symmetric soft overlap: each token's best edit similarity against the
/// other side's tokens, averaged over both sides.
fn soft_token_overlap(a: &str, b: &str) -> f64 {
    let left: Vec<&str> = a.split_whitespace().collect();
    let right: Vec<&str> = b.split_whitespace().collect();
    match (left.is_empty(), right.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let best_against = |token: &str, others: &[&str]| {
        others
            .iter()
            .map(|o| edit_ratio(token, o))
            .fold(0.0_f64, f64::max)
    };

    let sum: f64 = left.iter().map(|t| best_against(t, &right)).sum::<f64>()
        + right.iter().map(|t| best_against(t, &left)).sum::<f64>();
    sum / (left.len() + right.len()) as f64
}

/// 1 - levenshtein / longer length.
fn edit_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

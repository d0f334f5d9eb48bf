// Per-category eligibility: apply each prize rule to that category's
// subtotals, then drop anyone who has already won a draw this session.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::{PrizeCategory, PrizeRule};
use crate::prize::aggregate::{category_subtotals, CategorySubtotal};
use crate::prize::draw::DrawState;
use crate::scoring::ScoredEntry;

/// The eligible pool for one category, in subtotal (name) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryEligibility {
    pub category: String,
    pub eligible: Vec<String>,
}

/// Eligible pools for every category that has at least one candidate,
/// in configuration order. A category with nobody eligible is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EligibilitySet {
    categories: Vec<CategoryEligibility>,
}

impl EligibilitySet {
    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.eligible.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryEligibility> {
        self.categories.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }
}

/// Select candidates from `subtotals` under `rule`, skipping `excluded`.
///
/// For `Maximum` the target is the highest subtotal over every row, taken
/// before exclusions. When the top scorer is an earlier winner the pool can
/// therefore be empty rather than falling back to the runner-up.
pub fn apply_rule(
    subtotals: &[CategorySubtotal],
    rule: &PrizeRule,
    excluded: &BTreeSet<String>,
) -> Vec<String> {
    let qualifies: Box<dyn Fn(u32) -> bool> = match *rule {
        PrizeRule::Threshold { min_points } => Box::new(move |p| p >= min_points),
        PrizeRule::Maximum => match subtotals.iter().map(|s| s.points).max() {
            Some(max) => Box::new(move |p| p == max),
            None => return Vec::new(),
        },
    };

    subtotals
        .iter()
        .filter(|s| qualifies(s.points))
        .filter(|s| !excluded.contains(&s.name))
        .map(|s| s.name.clone())
        .collect()
}

/// Resolve the eligible pool of every configured prize category.
pub fn resolve_eligibility(
    entries: &[ScoredEntry],
    prizes: &[PrizeCategory],
    draw_state: &DrawState,
) -> EligibilitySet {
    let excluded = draw_state.all_time_winners();
    let categories = prizes
        .iter()
        .filter_map(|prize| {
            let subtotals = category_subtotals(entries, prize);
            let eligible = apply_rule(&subtotals, &prize.rule, excluded);
            if eligible.is_empty() {
                None
            } else {
                Some(CategoryEligibility {
                    category: prize.name.clone(),
                    eligible,
                })
            }
        })
        .collect();
    EligibilitySet { categories }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Urgent needs aggregation.
//!
//! Folds every active need in the system into groups keyed by
//! `(category, item, unit, priority)` and ranks them so the most pressing
//! requests across all shelters come first.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use shelter_map_database_models::{ActiveNeedRow, URGENT_NEEDS_LIMIT};
use shelter_map_shelter_models::NeedPriority;

/// One ranked entry of the urgent needs list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrgentNeedGroup {
    /// Need category.
    pub category: String,
    /// Need item.
    pub item: String,
    /// Unit shared by every need in the group.
    pub unit: Option<String>,
    /// Priority shared by every need in the group.
    pub priority: NeedPriority,
    /// Sum of the tracked quantities, `None` when no member tracks one.
    pub total_quantity: Option<f64>,
    /// Number of distinct locations requesting this need.
    pub shelters_count: u32,
    /// Number of need records in the group.
    pub needs_count: u32,
    /// Location to link to: the owner of the most recently updated member.
    pub target_shelter_id: String,
    /// Name of [`Self::target_shelter_id`].
    pub target_shelter_name: String,
}

impl UrgentNeedGroup {
    fn compare_rank(&self, other: &Self) -> Ordering {
        other
            .priority
            .severity()
            .cmp(&self.priority.severity())
            .then_with(|| {
                other
                    .total_quantity
                    .unwrap_or(0.0)
                    .total_cmp(&self.total_quantity.unwrap_or(0.0))
            })
            .then_with(|| other.shelters_count.cmp(&self.shelters_count))
    }
}

type GroupKey = (String, String, Option<String>, NeedPriority);

struct Accumulator {
    group: UrgentNeedGroup,
    shelters: BTreeSet<String>,
}

/// Groups and ranks active needs.
///
/// `rows` are expected most recently updated first; the first row seen for
/// a group decides its target location, and groups that tie on every
/// ranking key keep the order in which they were first seen. The result
/// holds at most [`URGENT_NEEDS_LIMIT`] groups and is empty when there are
/// no rows.
#[must_use]
pub fn aggregate(rows: &[ActiveNeedRow]) -> Vec<UrgentNeedGroup> {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<Accumulator> = Vec::new();

    for row in rows {
        let key = (
            row.category.clone(),
            row.item.clone(),
            row.unit.clone(),
            row.priority,
        );

        let position = *index.entry(key).or_insert_with(|| {
            groups.push(Accumulator {
                group: UrgentNeedGroup {
                    category: row.category.clone(),
                    item: row.item.clone(),
                    unit: row.unit.clone(),
                    priority: row.priority,
                    total_quantity: None,
                    shelters_count: 0,
                    needs_count: 0,
                    target_shelter_id: row.shelter_id.clone(),
                    target_shelter_name: row.shelter_name.clone(),
                },
                shelters: BTreeSet::new(),
            });
            groups.len() - 1
        });

        let acc = &mut groups[position];
        if let Some(quantity) = row.quantity {
            acc.group.total_quantity = Some(acc.group.total_quantity.unwrap_or(0.0) + quantity);
        }
        acc.group.needs_count += 1;
        acc.shelters.insert(row.shelter_id.clone());
    }

    let mut ranked: Vec<UrgentNeedGroup> = groups
        .into_iter()
        .map(|acc| UrgentNeedGroup {
            shelters_count: u32::try_from(acc.shelters.len()).unwrap_or(u32::MAX),
            ..acc.group
        })
        .collect();

    ranked.sort_by(UrgentNeedGroup::compare_rank);
    log::debug!(
        "Aggregated {} active needs into {} groups",
        rows.len(),
        ranked.len()
    );
    ranked.truncate(URGENT_NEEDS_LIMIT);
    ranked
}

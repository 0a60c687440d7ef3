// SPDX-License-Identifier: MIT

//! Contributor ranking and leaderboard views.

use crate::models::Challenge;
use serde::Serialize;
use std::collections::HashMap;

/// Fixed page size for the full leaderboard view.
pub const PAGE_SIZE: usize = 10;

/// Number of entries in the summary view.
pub const TOP_N: usize = 3;

/// Which exercises count toward a contributor's total.
///
/// The two variants deliberately coexist: the historical leaderboard summed
/// every exercise key present in the stored record, while progress views
/// restricted to enabled exercises. If an exercise is later disabled, its
/// reps still count under `AllRecorded` but not under `EnabledOnly`. The
/// caller picks; neither is silently "fixed" to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankScope {
    /// Sum every exercise key in the contribution record
    #[default]
    AllRecorded,
    /// Sum only exercises currently enabled by the challenge
    EnabledOnly,
}

/// One ranked contributor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorRank {
    pub user_id: String,
    /// Display name, when the caller resolved one
    pub username: Option<String>,
    pub total_reps: u64,
    pub reps_by_exercise: HashMap<String, u64>,
}

/// Rank every user present in the contribution record, descending by total
/// reps under the given scope.
///
/// Tie-break policy: the sort is stable over a user-id-ordered base, so
/// equal totals rank in user id order.
pub fn rank_contributors(challenge: &Challenge, scope: RankScope) -> Vec<ContributorRank> {
    let mut entries: Vec<ContributorRank> = challenge
        .contributions
        .iter()
        .map(|(user_id, record)| {
            let total_reps = record
                .iter()
                .filter(|(exercise, _)| match scope {
                    RankScope::AllRecorded => true,
                    RankScope::EnabledOnly => {
                        challenge.enabled_exercises.iter().any(|e| e == *exercise)
                    }
                })
                .map(|(_, &reps)| reps)
                .sum();
            ContributorRank {
                user_id: user_id.clone(),
                username: None,
                total_reps,
                reps_by_exercise: record.clone(),
            }
        })
        .collect();

    entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    entries.sort_by(|a, b| b.total_reps.cmp(&a.total_reps));
    entries
}

/// Truncated ranking for summary displays.
pub fn top_contributors(challenge: &Challenge, scope: RankScope, n: usize) -> Vec<ContributorRank> {
    let mut ranked = rank_contributors(challenge, scope);
    ranked.truncate(n);
    ranked
}

/// Sort key for the full leaderboard view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Total,
    /// Rep count of a single exercise
    Exercise(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One page of the leaderboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub entries: Vec<ContributorRank>,
    /// 1-indexed
    pub page: usize,
    pub page_size: usize,
    pub total_entries: usize,
    pub total_pages: usize,
}

/// Filter, re-sort and paginate ranked entries.
///
/// `filter` matches case-insensitively against the display name, or as a
/// suffix of the user id. Re-sorting is stable, so an already-descending
/// list sorted by total again is unchanged.
pub fn paginate(
    mut entries: Vec<ContributorRank>,
    filter: Option<&str>,
    sort_key: &SortKey,
    order: SortOrder,
    page: usize,
) -> LeaderboardPage {
    if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
        let needle = filter.to_lowercase();
        entries.retain(|entry| {
            entry
                .username
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(&needle))
                || entry.user_id.ends_with(filter)
        });
    }

    entries.sort_by(|a, b| {
        let (ka, kb) = match sort_key {
            SortKey::Total => (a.total_reps, b.total_reps),
            SortKey::Exercise(exercise) => (
                a.reps_by_exercise.get(exercise).copied().unwrap_or(0),
                b.reps_by_exercise.get(exercise).copied().unwrap_or(0),
            ),
        };
        match order {
            SortOrder::Ascending => ka.cmp(&kb),
            SortOrder::Descending => kb.cmp(&ka),
        }
    });

    let total_entries = entries.len();
    let total_pages = total_entries.div_ceil(PAGE_SIZE).max(1);
    let page = page.max(1);
    let start = (page - 1).saturating_mul(PAGE_SIZE);
    let paged = if start < entries.len() {
        let end = start.saturating_add(PAGE_SIZE).min(entries.len());
        entries[start..end].to_vec()
    } else {
        vec![]
    };

    LeaderboardPage {
        entries: paged,
        page,
        page_size: PAGE_SIZE,
        total_entries,
        total_pages,
    }
}

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::access::CumulativeCount;
use crate::models::CohortMember;
use crate::presence::ratio_pct;

/// Multi-select filter over the roster; empty lists select everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterFilter {
    pub states: Vec<String>,
    pub cities: Vec<String>,
    pub accessed: Option<bool>,
}

impl RosterFilter {
    pub fn selects(&self, member: &CohortMember) -> bool {
        (self.states.is_empty() || self.states.iter().any(|s| s.eq_ignore_ascii_case(&member.state)))
            && (self.cities.is_empty() || self.cities.iter().any(|c| c == &member.city))
            && self.accessed.map_or(true, |accessed| accessed == member.accessed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterGroup {
    State,
    City,
    Cohort,
}

impl RosterGroup {
    fn key(self, member: &CohortMember) -> &str {
        match self {
            RosterGroup::State => &member.state,
            RosterGroup::City => &member.city,
            RosterGroup::Cohort => &member.cohort_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessShare {
    pub group: String,
    /// Second grouping level: the cohort inside a state, or a city's state.
    pub subgroup: Option<String>,
    pub accessed: usize,
    pub never_accessed: usize,
    pub total: usize,
    pub accessed_pct: Option<f64>,
    pub never_accessed_pct: Option<f64>,
}

impl AccessShare {
    fn new(group: &str, subgroup: Option<&str>, accessed: usize, never_accessed: usize) -> Self {
        let total = accessed + never_accessed;
        Self {
            group: group.to_string(),
            subgroup: subgroup.map(str::to_string),
            accessed,
            never_accessed,
            total,
            accessed_pct: ratio_pct(accessed, total),
            never_accessed_pct: ratio_pct(never_accessed, total),
        }
    }
}

pub fn select<'a>(members: &'a [CohortMember], filter: &RosterFilter) -> Vec<&'a CohortMember> {
    members.iter().filter(|member| filter.selects(member)).collect()
}

/// Members per group, largest first, ties by name.
pub fn counts_by(members: &[&CohortMember], group: RosterGroup) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for member in members {
        *counts.entry(group.key(member)).or_insert(0) += 1;
    }
    let mut rows: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(key, count)| (key.to_string(), count))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

pub fn top_cities(members: &[&CohortMember], limit: usize) -> Vec<(String, usize)> {
    let mut rows = counts_by(members, RosterGroup::City);
    rows.truncate(limit);
    rows
}

fn tally<'a, K: Ord>(
    members: &[&'a CohortMember],
    key: impl Fn(&'a CohortMember) -> K,
) -> BTreeMap<K, (usize, usize)> {
    let mut groups: BTreeMap<K, (usize, usize)> = BTreeMap::new();
    for &member in members {
        let entry = groups.entry(key(member)).or_insert((0, 0));
        if member.accessed {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }
    groups
}

/// Accessed and never-accessed counts per group, ordered by group.
pub fn access_by(members: &[&CohortMember], group: RosterGroup) -> Vec<AccessShare> {
    tally(members, |member| group.key(member))
        .into_iter()
        .map(|(key, (accessed, never))| AccessShare::new(key, None, accessed, never))
        .collect()
}

/// Access per cohort inside each state, ordered by state then cohort.
pub fn access_by_state_and_cohort(members: &[&CohortMember]) -> Vec<AccessShare> {
    tally(members, |member| (member.state.as_str(), member.cohort_id.as_str()))
        .into_iter()
        .map(|((state, cohort), (accessed, never))| {
            AccessShare::new(state, Some(cohort), accessed, never)
        })
        .collect()
}

/// Cities with the largest share of students who never logged in first.
pub fn never_accessed_ranking(members: &[&CohortMember]) -> Vec<AccessShare> {
    let mut rows: Vec<AccessShare> =
        tally(members, |member| (member.city.as_str(), member.state.as_str()))
            .into_iter()
            .map(|((city, state), (accessed, never))| {
                AccessShare::new(city, Some(state), accessed, never)
            })
            .collect();
    rows.sort_by(|a, b| {
        b.never_accessed_pct
            .unwrap_or(0.0)
            .partial_cmp(&a.never_accessed_pct.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.total.cmp(&a.total))
            .then_with(|| a.group.cmp(&b.group))
    });
    rows
}

/// Students per cohort in one state and city, smallest cohort first.
pub fn cohort_sizes(members: &[&CohortMember], state: &str, city: &str) -> Vec<(String, usize)> {
    let local: Vec<&CohortMember> = members
        .iter()
        .copied()
        .filter(|m| m.state.eq_ignore_ascii_case(state) && m.city == city)
        .collect();
    let mut rows = counts_by(&local, RosterGroup::Cohort);
    rows.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

/// Case-insensitive substring search over names.
pub fn search_by_name<'a>(members: &'a [CohortMember], query: &str) -> Vec<&'a CohortMember> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    members
        .iter()
        .filter(|member| member.name.to_lowercase().contains(&query))
        .collect()
}

/// Running count of last-access days among the cohort's students who have
/// logged in. Members without a readable last access are left out.
pub fn cohort_cumulative(
    members: &[&CohortMember],
    state: &str,
    city: &str,
    cohort_id: &str,
) -> Vec<CumulativeCount> {
    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for member in members.iter().filter(|m| {
        m.accessed && m.state.eq_ignore_ascii_case(state) && m.city == city && m.cohort_id == cohort_id
    }) {
        if let Some(last_access) = member.last_access {
            *per_day.entry(last_access.date()).or_insert(0) += 1;
        }
    }

    let mut running = 0;
    per_day
        .into_iter()
        .map(|(day, accesses)| {
            running += accesses;
            CumulativeCount {
                day,
                accesses,
                cumulative: running,
            }
        })
        .collect()
}

/// Distinct states and cities in the selection.
pub fn coverage(members: &[&CohortMember]) -> (usize, usize) {
    let states: BTreeSet<&str> = members.iter().map(|m| m.state.as_str()).collect();
    let cities: BTreeSet<&str> = members.iter().map(|m| m.city.as_str()).collect();
    (states.len(), cities.len())
}

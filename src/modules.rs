use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::config::ModuleSchedule;
use crate::models::{CompletionState, Course, ModuleCompletion, Region};
use crate::presence::ratio_pct;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCompleters {
    pub course_id: String,
    pub course_name: String,
    pub region: String,
    pub module_name: String,
    pub completers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateGrouping {
    ActivityType,
    ClassAndType,
    RegionAndType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRate {
    /// Class or region, absent when grouping by activity type alone.
    pub group: Option<String>,
    pub activity_type: String,
    pub total: usize,
    pub completed: usize,
    pub pct: Option<f64>,
}

/// Multi-select filter over completion-state rows; empty lists select everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateFilter {
    pub classes: Vec<String>,
    pub activity_types: Vec<String>,
    pub regions: Vec<String>,
}

impl StateFilter {
    fn selects(&self, state: &CompletionState) -> bool {
        let allowed = |list: &[String], value: &str| list.is_empty() || list.iter().any(|v| v == value);
        allowed(&self.classes, &state.class_name)
            && allowed(&self.activity_types, &state.activity_type)
            && allowed(&self.regions, &state.region)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleMinimum {
    pub module: String,
    pub hours: f64,
    pub minimum_hours: f64,
}

/// Hours of every module in the region's schedule and the share of them a
/// student must complete.
pub fn module_minimums(schedule: &ModuleSchedule, region: &Region) -> Vec<ModuleMinimum> {
    schedule
        .modules_for(region.code())
        .iter()
        .map(|module| ModuleMinimum {
            module: module.module.clone(),
            hours: module.hours,
            minimum_hours: module.hours * schedule.minimum_share,
        })
        .collect()
}

/// Distinct students with a completed state per course and module.
pub fn module_completers(completions: &[ModuleCompletion], courses: &[Course]) -> Vec<ModuleCompleters> {
    let by_id: HashMap<&str, &Course> = courses.iter().map(|c| (c.course_id.as_str(), c)).collect();
    let mut students: BTreeMap<(&str, &str), BTreeSet<&str>> = BTreeMap::new();

    for completion in completions.iter().filter(|c| c.completed) {
        students
            .entry((completion.course_id.as_str(), completion.module_name.as_str()))
            .or_default()
            .insert(completion.student_id.as_str());
    }

    students
        .into_iter()
        .map(|((course_id, module_name), completers)| {
            let course = by_id.get(course_id);
            ModuleCompleters {
                course_id: course_id.to_string(),
                course_name: course.map(|c| c.course_name.clone()).unwrap_or_default(),
                region: course
                    .map(|c| c.region.code().to_string())
                    .unwrap_or_else(|| Region::UNKNOWN.to_string()),
                module_name: module_name.to_string(),
                completers: completers.len(),
            }
        })
        .collect()
}

/// The `limit` course/module pairs with the fewest completers.
pub fn lowest_completion(rows: &[ModuleCompleters], limit: usize) -> Vec<ModuleCompleters> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| {
        a.completers
            .cmp(&b.completers)
            .then_with(|| a.course_name.cmp(&b.course_name))
            .then_with(|| a.module_name.cmp(&b.module_name))
    });
    sorted.truncate(limit);
    sorted
}

pub fn completers_by_region(rows: &[ModuleCompleters]) -> Vec<(String, usize)> {
    let mut totals: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *totals.entry(row.region.as_str()).or_insert(0) += row.completers;
    }
    let mut totals: Vec<(String, usize)> = totals
        .into_iter()
        .map(|(region, completers)| (region.to_string(), completers))
        .collect();
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    totals
}

pub fn completion_rates(
    states: &[CompletionState],
    filter: &StateFilter,
    grouping: RateGrouping,
) -> Vec<CompletionRate> {
    let mut groups: BTreeMap<(Option<&str>, &str), (usize, usize)> = BTreeMap::new();

    for state in states.iter().filter(|state| filter.selects(state)) {
        let group = match grouping {
            RateGrouping::ActivityType => None,
            RateGrouping::ClassAndType => Some(state.class_name.as_str()),
            RateGrouping::RegionAndType => Some(state.region.as_str()),
        };
        let entry = groups.entry((group, state.activity_type.as_str())).or_insert((0, 0));
        entry.0 += 1;
        if state.completed {
            entry.1 += 1;
        }
    }

    groups
        .into_iter()
        .map(|((group, activity_type), (total, completed))| CompletionRate {
            group: group.map(str::to_string),
            activity_type: activity_type.to_string(),
            total,
            completed,
            pct: ratio_pct(completed, total),
        })
        .collect()
}

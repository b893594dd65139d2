use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::InactivityPolicy;
use crate::models::{Course, EnrollmentRecord, UserAccess};
use crate::presence::ratio_pct;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Active,
    Inactive,
    NeverAccessed,
}

impl AccessStatus {
    pub fn label(self) -> &'static str {
        match self {
            AccessStatus::Active => "Active",
            AccessStatus::Inactive => "Inactive",
            AccessStatus::NeverAccessed => "Never accessed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Region,
    Course,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBreakdown {
    pub group: String,
    pub active: usize,
    pub inactive: usize,
    pub never_accessed: usize,
    pub total: usize,
    pub active_pct: Option<f64>,
    pub never_accessed_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Headline {
    pub courses: usize,
    pub enrolled_students: usize,
    pub active: usize,
    pub inactive: usize,
    pub never_accessed: usize,
}

pub fn classify_access(
    last_access: Option<NaiveDateTime>,
    policy: InactivityPolicy,
    as_of: NaiveDate,
) -> AccessStatus {
    let Some(last_access) = last_access else {
        return AccessStatus::NeverAccessed;
    };
    match policy.inactive_after_days {
        Some(days) if (as_of - last_access.date()).num_days() > i64::from(days) => {
            AccessStatus::Inactive
        }
        _ => AccessStatus::Active,
    }
}

/// Users missing from the user table are counted as never accessed.
fn status_lookup<'a>(
    users: &'a [UserAccess],
    policy: InactivityPolicy,
    as_of: NaiveDate,
) -> impl Fn(&str) -> AccessStatus + 'a {
    let by_id: HashMap<&str, Option<NaiveDateTime>> = users
        .iter()
        .map(|user| (user.student_id.as_str(), user.last_access))
        .collect();
    move |student_id| match by_id.get(student_id) {
        Some(last_access) => classify_access(*last_access, policy, as_of),
        None => {
            log::warn!("student {student_id} is enrolled but has no user record");
            AccessStatus::NeverAccessed
        }
    }
}

pub fn status_breakdown(
    enrollments: &[EnrollmentRecord],
    users: &[UserAccess],
    policy: InactivityPolicy,
    as_of: NaiveDate,
    group_by: GroupBy,
) -> Vec<StatusBreakdown> {
    let status_of = status_lookup(users, policy, as_of);
    let mut groups: BTreeMap<String, [usize; 3]> = BTreeMap::new();

    for enrollment in enrollments {
        let group = match group_by {
            GroupBy::Region => enrollment.region.code().to_string(),
            GroupBy::Course if enrollment.course_name.is_empty() => enrollment.course_id.clone(),
            GroupBy::Course => enrollment.course_name.clone(),
        };
        let counts = groups.entry(group).or_insert([0; 3]);
        match status_of(&enrollment.student_id) {
            AccessStatus::Active => counts[0] += 1,
            AccessStatus::Inactive => counts[1] += 1,
            AccessStatus::NeverAccessed => counts[2] += 1,
        }
    }

    let mut rows: Vec<StatusBreakdown> = groups
        .into_iter()
        .map(|(group, [active, inactive, never_accessed])| {
            let total = active + inactive + never_accessed;
            StatusBreakdown {
                group,
                active,
                inactive,
                never_accessed,
                total,
                active_pct: ratio_pct(active, total),
                never_accessed_pct: ratio_pct(never_accessed, total),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.group.cmp(&b.group)));
    rows
}

/// Counts distinct enrolled students once each, whatever their course count.
pub fn headline(
    courses: &[Course],
    enrollments: &[EnrollmentRecord],
    users: &[UserAccess],
    policy: InactivityPolicy,
    as_of: NaiveDate,
) -> Headline {
    let status_of = status_lookup(users, policy, as_of);
    let students: BTreeSet<&str> = enrollments.iter().map(|e| e.student_id.as_str()).collect();

    let mut headline = Headline {
        courses: courses.len(),
        enrolled_students: students.len(),
        active: 0,
        inactive: 0,
        never_accessed: 0,
    };
    for student in students {
        match status_of(student) {
            AccessStatus::Active => headline.active += 1,
            AccessStatus::Inactive => headline.inactive += 1,
            AccessStatus::NeverAccessed => headline.never_accessed += 1,
        }
    }
    headline
}

/// Number of classes per region, largest first.
pub fn classes_per_region(courses: &[Course]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for course in courses {
        *counts.entry(course.region.code()).or_insert(0) += 1;
    }
    let mut rows: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(region, count)| (region.to_string(), count))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

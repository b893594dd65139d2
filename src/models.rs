use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Region tag decoded from a course or cohort name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    Recognized(String),
    Unknown,
}

impl Region {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn code(&self) -> &str {
        match self {
            Region::Recognized(code) => code,
            Region::Unknown => Self::UNKNOWN,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub course_id: String,
    pub course_name: String,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRecord {
    pub student_id: String,
    pub display_name: String,
    pub course_id: String,
    pub course_name: String,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEvent {
    pub student_id: String,
    pub display_name: String,
    pub course_name: String,
    pub timestamp: NaiveDateTime,
}

impl AccessEvent {
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionEvent {
    pub student_id: String,
    pub display_name: String,
    pub course_id: String,
    pub activity_name: String,
    pub timestamp: NaiveDateTime,
}

impl SubmissionEvent {
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Last platform access for a user; `None` when the user never logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccess {
    pub student_id: String,
    pub last_access: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCompletion {
    pub student_id: String,
    pub course_id: String,
    pub module_name: String,
    pub completed: bool,
}

/// Pre-classified completion row as exported per class, activity type and region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionState {
    pub class_name: String,
    pub activity_type: String,
    pub region: String,
    pub completed: bool,
}

/// One line of the cohort access roster: where a student is placed and
/// whether they have ever logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortMember {
    pub name: String,
    pub city: String,
    pub cohort_id: String,
    /// Upper-cased state name or code.
    pub state: String,
    pub accessed: bool,
    pub last_access: Option<NaiveDateTime>,
}

/// A student as presented in output tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StudentRef {
    pub display_name: String,
    pub student_id: String,
}

impl StudentRef {
    pub fn new(student_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            student_id: student_id.into(),
        }
    }
}

/// Inclusive calendar window. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from.map_or(true, |from| day >= from) && self.to.map_or(true, |to| day <= to)
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |day: Option<NaiveDate>| {
            day.map(|d| d.format(crate::report::DAY_FORMAT).to_string())
                .unwrap_or_else(|| "…".to_string())
        };
        write!(f, "{} to {}", bound(self.from), bound(self.to))
    }
}

/// Immutable filter selection handed to every pipeline request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    pub course: Option<String>,
    pub window: DateWindow,
    pub student: Option<String>,
    pub regions: Vec<String>,
}

impl FilterConfig {
    pub fn for_course(course: impl Into<String>) -> Self {
        Self {
            course: Some(course.into()),
            ..Self::default()
        }
    }

    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_student(mut self, student: impl Into<String>) -> Self {
        self.student = Some(student.into());
        self
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    /// An empty region list selects every region.
    pub fn selects_region(&self, region: &str) -> bool {
        self.regions.is_empty() || self.regions.iter().any(|r| r.eq_ignore_ascii_case(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let window = DateWindow::new(Some(day(2024, 3, 1)), Some(day(2024, 3, 3)));
        assert!(window.contains(day(2024, 3, 1)));
        assert!(window.contains(day(2024, 3, 3)));
        assert!(!window.contains(day(2024, 3, 4)));
        assert!(DateWindow::default().contains(day(1999, 1, 1)));
    }

    #[test]
    fn unknown_region_renders_sentinel() {
        assert_eq!(Region::Unknown.to_string(), "unknown");
        assert_eq!(Region::Recognized("CE".into()).code(), "CE");
    }

    #[test]
    fn empty_region_filter_selects_everything() {
        let filter = FilterConfig::default();
        assert!(filter.selects_region("PI"));
        let filter = filter.with_regions(vec!["ce".into()]);
        assert!(filter.selects_region("CE"));
        assert!(!filter.selects_region("MA"));
    }
}

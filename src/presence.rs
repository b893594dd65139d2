use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::error::{EngineError, EngineResult};
use crate::models::{AccessEvent, DateWindow, StudentRef};

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRow {
    pub student: StudentRef,
    /// One flag per entry of the day axis.
    pub days: Vec<bool>,
    pub present: usize,
    pub absent: usize,
    /// `None` when the day axis is empty.
    pub frequency: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceMatrix {
    pub course: String,
    pub window: DateWindow,
    pub day_axis: Vec<NaiveDate>,
    pub rows: Vec<PresenceRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyPresence {
    pub day: NaiveDate,
    pub present: usize,
    pub students: usize,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseStats {
    pub students: usize,
    pub class_days: usize,
    pub presences: usize,
    pub absences: usize,
    /// Presences over students × class days.
    pub mean_frequency: Option<f64>,
}

pub fn ratio_pct(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 / whole as f64 * 100.0)
    }
}

/// Sorted distinct course names, for building selectors.
pub fn course_names(events: &[AccessEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| event.course_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Builds the presence matrix of one course over a window.
///
/// The day axis is every day inside the window on which anyone in the course
/// had an access. Students are everyone with an access to the course at any
/// time plus the optional roster, so a student silent during the window
/// still gets a row at 0%.
pub fn compute_presence(
    events: &[AccessEvent],
    course: &str,
    window: DateWindow,
    roster: &[StudentRef],
) -> EngineResult<PresenceMatrix> {
    let course = course.trim();
    let mut names: BTreeMap<&str, &str> = BTreeMap::new();
    let mut day_axis: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut attended: HashMap<&str, BTreeSet<NaiveDate>> = HashMap::new();

    for event in events.iter().filter(|event| event.course_name == course) {
        names
            .entry(event.student_id.as_str())
            .or_insert(event.display_name.as_str());

        let day = event.day();
        if window.contains(day) {
            day_axis.insert(day);
            attended
                .entry(event.student_id.as_str())
                .or_default()
                .insert(day);
        }
    }
    for student in roster {
        names
            .entry(student.student_id.as_str())
            .or_insert(student.display_name.as_str());
    }

    if names.is_empty() {
        return Err(EngineError::EmptySelection {
            dataset: "access events".to_string(),
            selection: format!("course `{course}`"),
        });
    }

    let day_axis: Vec<NaiveDate> = day_axis.into_iter().collect();
    let no_days = BTreeSet::new();

    let mut rows: Vec<PresenceRow> = names
        .into_iter()
        .map(|(student_id, display_name)| {
            let seen = attended.get(student_id).unwrap_or(&no_days);
            let days: Vec<bool> = day_axis.iter().map(|day| seen.contains(day)).collect();
            let present = days.iter().filter(|&&flag| flag).count();
            PresenceRow {
                student: StudentRef::new(student_id, display_name),
                absent: days.len() - present,
                frequency: ratio_pct(present, days.len()),
                present,
                days,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.student.cmp(&b.student));

    log::debug!(
        "presence for `{course}` ({window}): {} students over {} class days",
        rows.len(),
        day_axis.len()
    );

    Ok(PresenceMatrix {
        course: course.to_string(),
        window,
        day_axis,
        rows,
    })
}

impl PresenceMatrix {
    pub fn row(&self, student_id: &str) -> Option<&PresenceRow> {
        self.rows.iter().find(|row| row.student.student_id == student_id)
    }

    /// Share of the course's students present on each class day.
    pub fn daily_rates(&self) -> Vec<DailyPresence> {
        self.day_axis
            .iter()
            .enumerate()
            .map(|(index, day)| {
                let present = self.rows.iter().filter(|row| row.days[index]).count();
                DailyPresence {
                    day: *day,
                    present,
                    students: self.rows.len(),
                    rate: ratio_pct(present, self.rows.len()),
                }
            })
            .collect()
    }

    pub fn stats(&self) -> CourseStats {
        let presences: usize = self.rows.iter().map(|row| row.present).sum();
        let absences: usize = self.rows.iter().map(|row| row.absent).sum();
        CourseStats {
            students: self.rows.len(),
            class_days: self.day_axis.len(),
            presences,
            absences,
            mean_frequency: ratio_pct(presences, self.rows.len() * self.day_axis.len()),
        }
    }
}

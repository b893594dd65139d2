use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::models::{AccessEvent, DateWindow, StudentRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseDayCount {
    pub course_name: String,
    pub day: NaiveDate,
    pub accesses: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentAccessCount {
    pub student: StudentRef,
    pub accesses: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourCount {
    pub hour: u32,
    pub accesses: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativeCount {
    pub day: NaiveDate,
    pub accesses: usize,
    pub cumulative: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTrends {
    pub total_accesses: usize,
    pub per_course_day: Vec<CourseDayCount>,
    pub top_students: Vec<StudentAccessCount>,
    pub per_hour: Vec<HourCount>,
    pub cumulative: Vec<CumulativeCount>,
}

/// Accesses inside the window for the given courses. An empty course list
/// selects every course.
pub fn filter_accesses<'a>(
    events: &'a [AccessEvent],
    courses: &[String],
    window: DateWindow,
) -> Vec<&'a AccessEvent> {
    events
        .iter()
        .filter(|event| courses.is_empty() || courses.iter().any(|c| c == &event.course_name))
        .filter(|event| window.contains(event.day()))
        .collect()
}

pub fn accesses_per_course_day(events: &[&AccessEvent]) -> Vec<CourseDayCount> {
    let mut counts: BTreeMap<(&str, NaiveDate), usize> = BTreeMap::new();
    for event in events {
        *counts.entry((event.course_name.as_str(), event.day())).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|((course_name, day), accesses)| CourseDayCount {
            course_name: course_name.to_string(),
            day,
            accesses,
        })
        .collect()
}

/// Students with the most accesses; ties are broken by name.
pub fn top_students(events: &[&AccessEvent], limit: usize) -> Vec<StudentAccessCount> {
    let mut counts: HashMap<&str, (&str, usize)> = HashMap::new();
    for event in events {
        counts
            .entry(event.student_id.as_str())
            .or_insert((event.display_name.as_str(), 0))
            .1 += 1;
    }

    let mut ranked: Vec<StudentAccessCount> = counts
        .into_iter()
        .map(|(id, (name, accesses))| StudentAccessCount {
            student: StudentRef::new(id, name),
            accesses,
        })
        .collect();
    ranked.sort_by(|a, b| b.accesses.cmp(&a.accesses).then_with(|| a.student.cmp(&b.student)));
    ranked.truncate(limit);
    ranked
}

/// Hours of the day that saw at least one access.
pub fn accesses_per_hour(events: &[&AccessEvent]) -> Vec<HourCount> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.hour()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(hour, accesses)| HourCount { hour, accesses })
        .collect()
}

pub fn cumulative_daily(events: &[&AccessEvent]) -> Vec<CumulativeCount> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.day()).or_insert(0) += 1;
    }
    let mut running = 0;
    counts
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

pub fn access_trends(
    events: &[AccessEvent],
    courses: &[String],
    window: DateWindow,
    top_n: usize,
) -> AccessTrends {
    let selected = filter_accesses(events, courses, window);
    log::debug!("access trends over {} of {} events", selected.len(), events.len());
    AccessTrends {
        total_accesses: selected.len(),
        per_course_day: accesses_per_course_day(&selected),
        top_students: top_students(&selected, top_n),
        per_hour: accesses_per_hour(&selected),
        cumulative: cumulative_daily(&selected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(student: &str, course: &str, day: u32, hour: u32) -> AccessEvent {
        AccessEvent {
            student_id: student.to_string(),
            display_name: format!("Student {student}"),
            course_name: course.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(hour, 30, 0)
                .unwrap(),
        }
    }

    fn events() -> Vec<AccessEvent> {
        vec![
            access("1", "Turma A", 1, 9),
            access("1", "Turma A", 1, 9),
            access("2", "Turma A", 1, 14),
            access("2", "Turma A", 2, 14),
            access("3", "Turma B", 2, 20),
            access("3", "Turma B", 9, 20),
        ]
    }

    #[test]
    fn counts_per_course_and_day() {
        let events = events();
        let selected = filter_accesses(&events, &[], DateWindow::default());
        let per_day = accesses_per_course_day(&selected);
        assert_eq!(per_day.len(), 4);
        assert_eq!(per_day[0].course_name, "Turma A");
        assert_eq!(per_day[0].accesses, 3);
    }

    #[test]
    fn top_students_break_ties_by_name() {
        let events = events();
        let trends = access_trends(&events, &[], DateWindow::default(), 2);
        let ids: Vec<&str> = trends
            .top_students
            .iter()
            .map(|s| s.student.student_id.as_str())
            .collect();
        assert_eq!(ids, ["1", "2"]);
        assert_eq!(trends.total_accesses, 6);
    }

    #[test]
    fn course_and_window_filters_apply() {
        let events = events();
        let window = DateWindow::new(None, NaiveDate::from_ymd_opt(2024, 3, 5));
        let trends = access_trends(&events, &["Turma B".to_string()], window, 10);
        assert_eq!(trends.total_accesses, 1);
        assert_eq!(trends.per_hour, vec![HourCount { hour: 20, accesses: 1 }]);
    }

    #[test]
    fn cumulative_counts_accumulate() {
        let events = events();
        let selected = filter_accesses(&events, &[], DateWindow::default());
        let totals: Vec<usize> = cumulative_daily(&selected).iter().map(|c| c.cumulative).collect();
        assert_eq!(totals, vec![3, 5, 6]);
    }
}

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::classify::{Classification, Classifier};
use crate::config::ActivityRequirement;
use crate::models::{StudentRef, SubmissionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Complete,
    Partial,
    None,
}

impl CompletionStatus {
    /// Complete at or above the minimum, partial with anything below it.
    pub fn from_counts(items_completed: usize, minimum_items: u32) -> Self {
        if items_completed >= minimum_items as usize {
            CompletionStatus::Complete
        } else if items_completed > 0 {
            CompletionStatus::Partial
        } else {
            CompletionStatus::None
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            CompletionStatus::Complete => "✅",
            CompletionStatus::Partial => "⚠️",
            CompletionStatus::None => "❌",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StudentSelector {
    All,
    Student(String),
}

impl StudentSelector {
    fn selects(&self, student_id: &str) -> bool {
        match self {
            StudentSelector::All => true,
            StudentSelector::Student(id) => id == student_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCompletion {
    pub category: String,
    pub items_completed: usize,
    pub items_required: f64,
    pub minimum_items: u32,
    pub hours: f64,
    pub hours_per_item: Option<f64>,
    pub completed_hours: f64,
    pub completion_pct: f64,
    pub status: CompletionStatus,
    pub mandatory: bool,
    pub counts_toward_frequency: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionSummary {
    pub course_id: String,
    pub selector: StudentSelector,
    /// In requirement-table order.
    pub categories: Vec<CategoryCompletion>,
    pub total_submissions: usize,
    pub unrecognized: BTreeSet<String>,
    /// Completed hours summed over the categories that count toward frequency.
    pub attendance_hours: f64,
}

impl CompletionSummary {
    pub fn category(&self, name: &str) -> Option<&CategoryCompletion> {
        self.categories.iter().find(|c| c.category == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionDetail {
    pub activity_name: String,
    pub category: Option<String>,
    pub submitted_on: NaiveDate,
    pub hours_per_item: Option<f64>,
    pub counts_toward_frequency: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryOverview {
    pub category: String,
    pub students: usize,
    pub students_meeting_minimum: usize,
    pub mean_items: f64,
    /// Mean of per-student completion, each capped at 100%.
    pub mean_pct: f64,
}

/// Completed share of a category; zero required items is trivially satisfied.
pub fn completion_ratio(items_completed: usize, items_required: f64) -> f64 {
    if items_required <= 0.0 {
        1.0
    } else {
        items_completed as f64 / items_required
    }
}

pub fn credited_hours(items_completed: usize, requirement: &ActivityRequirement) -> f64 {
    completion_ratio(items_completed, requirement.items_required()).min(1.0) * requirement.hours
}

fn category_of(
    classifier: &Classifier,
    requirements: &[ActivityRequirement],
    activity_name: &str,
) -> Option<String> {
    match classifier.classify(activity_name) {
        Classification::Recognized(category)
            if requirements.iter().any(|r| r.category == category) =>
        {
            Some(category)
        }
        _ => None,
    }
}

/// Counts completed items per category for one course and selection, then
/// credits hours proportionally against the requirement table.
pub fn summarize(
    submissions: &[SubmissionEvent],
    course_id: &str,
    selector: &StudentSelector,
    classifier: &Classifier,
    requirements: &[ActivityRequirement],
) -> CompletionSummary {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut unrecognized = BTreeSet::new();
    let mut total_submissions = 0;

    for submission in submissions
        .iter()
        .filter(|s| s.course_id == course_id && selector.selects(&s.student_id))
    {
        total_submissions += 1;
        match category_of(classifier, requirements, &submission.activity_name) {
            Some(category) => *counts.entry(category).or_insert(0) += 1,
            None => {
                unrecognized.insert(submission.activity_name.to_lowercase());
            }
        }
    }

    let categories: Vec<CategoryCompletion> = requirements
        .iter()
        .map(|requirement| {
            let items_completed = counts.get(&requirement.category).copied().unwrap_or(0);
            let items_required = requirement.items_required();
            CategoryCompletion {
                category: requirement.category.clone(),
                items_completed,
                items_required,
                minimum_items: requirement.minimum_items,
                hours: requirement.hours,
                hours_per_item: requirement.hours_per_item,
                completed_hours: credited_hours(items_completed, requirement),
                completion_pct: completion_ratio(items_completed, items_required) * 100.0,
                status: CompletionStatus::from_counts(items_completed, requirement.minimum_items),
                mandatory: requirement.mandatory,
                counts_toward_frequency: requirement.counts_toward_frequency,
            }
        })
        .collect();

    let attendance_hours = categories
        .iter()
        .filter(|c| c.counts_toward_frequency)
        .map(|c| c.completed_hours)
        .sum();

    if !unrecognized.is_empty() {
        log::debug!(
            "course {course_id}: {} unrecognized activity names",
            unrecognized.len()
        );
    }

    CompletionSummary {
        course_id: course_id.to_string(),
        selector: selector.clone(),
        categories,
        total_submissions,
        unrecognized,
        attendance_hours,
    }
}

/// Students with at least one submission in the course, sorted by name.
pub fn course_students(submissions: &[SubmissionEvent], course_id: &str) -> Vec<StudentRef> {
    let mut by_id: BTreeMap<&str, &str> = BTreeMap::new();
    for submission in submissions.iter().filter(|s| s.course_id == course_id) {
        by_id
            .entry(submission.student_id.as_str())
            .or_insert(submission.display_name.as_str());
    }
    let mut students: Vec<StudentRef> = by_id
        .into_iter()
        .map(|(id, name)| StudentRef::new(id, name))
        .collect();
    students.sort();
    students
}

pub fn summarize_students(
    submissions: &[SubmissionEvent],
    course_id: &str,
    classifier: &Classifier,
    requirements: &[ActivityRequirement],
) -> Vec<(StudentRef, CompletionSummary)> {
    course_students(submissions, course_id)
        .into_iter()
        .map(|student| {
            let selector = StudentSelector::Student(student.student_id.clone());
            let summary = summarize(submissions, course_id, &selector, classifier, requirements);
            (student, summary)
        })
        .collect()
}

/// One line per submission of a student, oldest first.
pub fn submission_details(
    submissions: &[SubmissionEvent],
    course_id: &str,
    student_id: &str,
    classifier: &Classifier,
    requirements: &[ActivityRequirement],
) -> Vec<SubmissionDetail> {
    let mut selected: Vec<&SubmissionEvent> = submissions
        .iter()
        .filter(|s| s.course_id == course_id && s.student_id == student_id)
        .collect();
    selected.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.activity_name.cmp(&b.activity_name))
    });

    selected
        .into_iter()
        .map(|submission| {
            let category = category_of(classifier, requirements, &submission.activity_name);
            let requirement = category
                .as_deref()
                .and_then(|name| requirements.iter().find(|r| r.category == name));
            SubmissionDetail {
                activity_name: submission.activity_name.clone(),
                submitted_on: submission.day(),
                hours_per_item: requirement.and_then(|r| r.hours_per_item),
                counts_toward_frequency: requirement.map_or(false, |r| r.counts_toward_frequency),
                category,
            }
        })
        .collect()
}

/// Per-category class view over the categories that count toward frequency.
pub fn class_overview(summaries: &[CompletionSummary]) -> Vec<CategoryOverview> {
    let Some(first) = summaries.first() else {
        return Vec::new();
    };

    first
        .categories
        .iter()
        .filter(|c| c.counts_toward_frequency)
        .map(|template| {
            let rows: Vec<&CategoryCompletion> = summaries
                .iter()
                .filter_map(|summary| summary.category(&template.category))
                .collect();
            let students = rows.len();
            let divisor = students.max(1) as f64;
            CategoryOverview {
                category: template.category.clone(),
                students,
                students_meeting_minimum: rows
                    .iter()
                    .filter(|c| c.items_completed >= c.minimum_items as usize)
                    .count(),
                mean_items: rows.iter().map(|c| c.items_completed as f64).sum::<f64>() / divisor,
                mean_pct: rows.iter().map(|c| c.completion_pct.min(100.0)).sum::<f64>() / divisor,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierRule, EngineConfig};

    fn submission(student: &str, course: &str, activity: &str, day: u32) -> SubmissionEvent {
        SubmissionEvent {
            student_id: student.to_string(),
            display_name: format!("Student {student}"),
            course_id: course.to_string(),
            activity_name: activity.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        }
    }

    fn webinar_setup() -> (Classifier, Vec<ActivityRequirement>) {
        let classifier = Classifier::new(vec![
            ClassifierRule::new("webinar", "Webinars"),
            ClassifierRule::new("leitura", "Reading"),
            ClassifierRule::new("encontro", "Meetings"),
        ]);
        let requirements = vec![
            ActivityRequirement::new("Webinars", 12.0).per_item(3.0, 4),
            ActivityRequirement::new("Reading", 20.0).not_counting(),
            ActivityRequirement::new("Meetings", 21.0).requiring(0.0),
        ];
        (classifier, requirements)
    }

    #[test]
    fn two_of_four_items_credits_half_the_hours() {
        let (classifier, requirements) = webinar_setup();
        let submissions = vec![
            submission("1", "10", "Webinar 1", 1),
            submission("1", "10", "Webinar 2", 2),
        ];
        let summary = summarize(
            &submissions,
            "10",
            &StudentSelector::Student("1".into()),
            &classifier,
            &requirements,
        );
        let webinars = summary.category("Webinars").unwrap();
        assert_eq!(webinars.items_required, 4.0);
        assert!((webinars.completed_hours - 6.0).abs() < 1e-9);
        assert_eq!(webinars.status, CompletionStatus::Partial);
        assert!((webinars.completion_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn zero_required_items_credits_full_hours() {
        let (classifier, requirements) = webinar_setup();
        let summary = summarize(&[], "10", &StudentSelector::All, &classifier, &requirements);
        let meetings = summary.category("Meetings").unwrap();
        assert_eq!(meetings.completed_hours, 21.0);
        assert_eq!(meetings.completion_pct, 100.0);
        assert_eq!(summary.attendance_hours, 21.0);
    }

    #[test]
    fn hours_are_capped_at_category_hours() {
        let (classifier, requirements) = webinar_setup();
        let submissions: Vec<SubmissionEvent> = (1..=9)
            .map(|d| submission("1", "10", &format!("Webinar {d}"), d))
            .collect();
        let summary = summarize(&submissions, "10", &StudentSelector::All, &classifier, &requirements);
        let webinars = summary.category("Webinars").unwrap();
        assert_eq!(webinars.items_completed, 9);
        assert_eq!(webinars.completed_hours, 12.0);
        assert_eq!(webinars.status, CompletionStatus::Complete);
        for category in &summary.categories {
            assert!(category.completed_hours >= 0.0 && category.completed_hours <= category.hours);
        }
    }

    #[test]
    fn non_counting_categories_are_reported_but_not_summed() {
        let (classifier, requirements) = webinar_setup();
        let submissions = vec![submission("1", "10", "Leitura obrigatória", 1)];
        let summary = summarize(&submissions, "10", &StudentSelector::All, &classifier, &requirements);
        let reading = summary.category("Reading").unwrap();
        assert_eq!(reading.items_completed, 1);
        assert!(!reading.counts_toward_frequency);
        // Meetings (21h) only.
        assert_eq!(summary.attendance_hours, 21.0);
    }

    #[test]
    fn unrecognized_names_still_count_as_submissions() {
        let (classifier, requirements) = webinar_setup();
        let submissions = vec![
            submission("1", "10", "Questionário", 1),
            submission("1", "10", "Webinar 1", 1),
            submission("1", "11", "Webinar 2", 1),
        ];
        let summary = summarize(&submissions, "10", &StudentSelector::All, &classifier, &requirements);
        assert_eq!(summary.total_submissions, 2);
        assert_eq!(
            summary.unrecognized.iter().collect::<Vec<_>>(),
            vec!["questionário"]
        );
        assert_eq!(summary.category("Webinars").unwrap().items_completed, 1);
    }

    #[test]
    fn classified_category_without_requirement_is_unrecognized() {
        let classifier = Classifier::new(vec![ClassifierRule::new("quiz", "Quizzes")]);
        let requirements = vec![ActivityRequirement::new("Webinars", 12.0)];
        let summary = summarize(
            &[submission("1", "10", "Quiz 3", 1)],
            "10",
            &StudentSelector::All,
            &classifier,
            &requirements,
        );
        assert!(summary.unrecognized.contains("quiz 3"));
    }

    #[test]
    fn status_follows_minimum_items() {
        assert_eq!(CompletionStatus::from_counts(5, 5), CompletionStatus::Complete);
        assert_eq!(CompletionStatus::from_counts(2, 5), CompletionStatus::Partial);
        assert_eq!(CompletionStatus::from_counts(0, 5), CompletionStatus::None);
        assert_eq!(CompletionStatus::from_counts(0, 0), CompletionStatus::Complete);
    }

    #[test]
    fn details_list_each_submission_in_order() {
        let config = EngineConfig::default();
        let submissions = vec![
            submission("1", "10", "Portfólio", 5),
            submission("1", "10", "Avaliação 1", 2),
            submission("1", "10", "Enquete", 3),
            submission("2", "10", "Avaliação 1", 1),
        ];
        let details = submission_details(
            &submissions,
            "10",
            "1",
            &config.classifier(),
            &config.requirements,
        );
        let names: Vec<&str> = details.iter().map(|d| d.activity_name.as_str()).collect();
        assert_eq!(names, ["Avaliação 1", "Enquete", "Portfólio"]);
        assert_eq!(details[0].category.as_deref(), Some("Module Activities"));
        assert_eq!(details[0].hours_per_item, Some(4.0));
        assert!(details[0].counts_toward_frequency);
        assert_eq!(details[1].category, None);
        assert!(!details[1].counts_toward_frequency);
        assert_eq!(details[2].hours_per_item, None);
    }

    #[test]
    fn overview_averages_students_per_category() {
        let (classifier, requirements) = webinar_setup();
        let submissions = vec![
            submission("1", "10", "Webinar 1", 1),
            submission("1", "10", "Webinar 2", 2),
            submission("1", "10", "Webinar 3", 3),
            submission("1", "10", "Webinar 4", 4),
            submission("1", "10", "Webinar 5", 5),
            submission("2", "10", "Webinar 1", 1),
        ];
        let summaries: Vec<CompletionSummary> =
            summarize_students(&submissions, "10", &classifier, &requirements)
                .into_iter()
                .map(|(_, summary)| summary)
                .collect();
        let overview = class_overview(&summaries);
        let categories: Vec<&str> = overview.iter().map(|o| o.category.as_str()).collect();
        assert_eq!(categories, ["Webinars", "Meetings"]);

        let webinars = &overview[0];
        assert_eq!(webinars.students, 2);
        assert_eq!(webinars.students_meeting_minimum, 1);
        assert!((webinars.mean_items - 3.0).abs() < 1e-9);
        // 100% (capped from 125%) and 25%.
        assert!((webinars.mean_pct - 62.5).abs() < 1e-9);
    }

    #[test]
    fn class_overview_of_nothing_is_empty() {
        assert!(class_overview(&[]).is_empty());
    }
}

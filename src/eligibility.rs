use serde::Serialize;

use crate::classify::Classifier;
use crate::completion::{summarize_students, CompletionSummary};
use crate::config::{ActivityRequirement, CertificationRules};
use crate::error::{EngineError, EngineResult};
use crate::models::{StudentRef, SubmissionEvent};
use crate::presence::ratio_pct;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityResult {
    pub attendance_hours: f64,
    pub hour_threshold: f64,
    pub hours_met: bool,
    pub mandatory_category: String,
    pub mandatory_completed: usize,
    pub mandatory_met: bool,
    pub eligible: bool,
    /// Attendance hours relative to the full program hours.
    pub program_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentProgress {
    pub student_id: String,
    pub display_name: String,
    pub summary: CompletionSummary,
    pub eligibility: EligibilityResult,
}

/// Certification needs both the hour threshold and at least one completed
/// item of the mandatory category.
pub fn is_eligible(attendance_hours: f64, hour_threshold: f64, mandatory_completed: usize) -> bool {
    attendance_hours >= hour_threshold && mandatory_completed >= 1
}

pub fn evaluate(
    summary: &CompletionSummary,
    rules: &CertificationRules,
) -> EngineResult<EligibilityResult> {
    let mandatory = summary
        .category(&rules.mandatory_category)
        .ok_or_else(|| EngineError::MissingCategory(rules.mandatory_category.clone()))?;

    let hours_met = summary.attendance_hours >= rules.hour_threshold;
    let mandatory_met = mandatory.items_completed >= 1;
    let program_pct = if rules.program_hours > 0.0 {
        Some(summary.attendance_hours / rules.program_hours * 100.0)
    } else {
        None
    };

    Ok(EligibilityResult {
        attendance_hours: summary.attendance_hours,
        hour_threshold: rules.hour_threshold,
        hours_met,
        mandatory_category: rules.mandatory_category.clone(),
        mandatory_completed: mandatory.items_completed,
        mandatory_met,
        eligible: is_eligible(
            summary.attendance_hours,
            rules.hour_threshold,
            mandatory.items_completed,
        ),
        program_pct,
    })
}

/// Evaluates every student with submissions in the course, most hours first.
pub fn class_progress(
    submissions: &[SubmissionEvent],
    course_id: &str,
    classifier: &Classifier,
    requirements: &[ActivityRequirement],
    rules: &CertificationRules,
) -> EngineResult<Vec<StudentProgress>> {
    let mut progress = summarize_students(submissions, course_id, classifier, requirements)
        .into_iter()
        .map(|(StudentRef { display_name, student_id }, summary)| {
            let eligibility = evaluate(&summary, rules)?;
            Ok(StudentProgress {
                student_id,
                display_name,
                summary,
                eligibility,
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    progress.sort_by(|a, b| {
        b.eligibility
            .attendance_hours
            .partial_cmp(&a.eligibility.attendance_hours)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });

    let eligible = progress.iter().filter(|p| p.eligibility.eligible).count();
    log::info!(
        "course {course_id}: {eligible} of {} students eligible ({})",
        progress.len(),
        ratio_pct(eligible, progress.len())
            .map(|pct| format!("{pct:.1}%"))
            .unwrap_or_else(|| "n/a".to_string())
    );

    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CategoryCompletion, CompletionStatus, StudentSelector};
    use crate::config::{EngineConfig, FINAL_ACTIVITY};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn summary_with(attendance_hours: f64, final_items: usize) -> CompletionSummary {
        CompletionSummary {
            course_id: "10".to_string(),
            selector: StudentSelector::Student("1".to_string()),
            categories: vec![CategoryCompletion {
                category: FINAL_ACTIVITY.to_string(),
                items_completed: final_items,
                items_required: 21.0,
                minimum_items: 0,
                hours: 21.0,
                hours_per_item: None,
                completed_hours: 0.0,
                completion_pct: 0.0,
                status: CompletionStatus::from_counts(final_items, 0),
                mandatory: true,
                counts_toward_frequency: true,
            }],
            total_submissions: final_items,
            unrecognized: BTreeSet::new(),
            attendance_hours,
        }
    }

    #[test]
    fn hours_without_final_activity_fail() {
        let rules = CertificationRules::default();
        let result = evaluate(&summary_with(95.0, 0), &rules).unwrap();
        assert!(result.hours_met);
        assert!(!result.mandatory_met);
        assert!(!result.eligible);
    }

    #[test]
    fn verdict_is_the_and_of_both_conditions() {
        let rules = CertificationRules::default();
        for hours in [0.0, 89.0, 89.999, 90.0, 90.001, 120.0] {
            for final_items in [0, 1, 2] {
                let result = evaluate(&summary_with(hours, final_items), &rules).unwrap();
                let expected = hours >= 90.0 && final_items >= 1;
                assert_eq!(result.eligible, expected, "hours {hours}, final {final_items}");
                assert_eq!(result.eligible, result.hours_met && result.mandatory_met);
            }
        }
    }

    #[test]
    fn evaluation_is_repeatable() {
        let rules = CertificationRules::default();
        let summary = summary_with(91.5, 1);
        let first = evaluate(&summary, &rules).unwrap();
        for _ in 0..5 {
            assert_eq!(evaluate(&summary, &rules).unwrap(), first);
        }
        assert!((first.program_pct.unwrap() - 76.25).abs() < 1e-9);
    }

    #[test]
    fn missing_mandatory_category_is_a_contract_violation() {
        let rules = CertificationRules {
            mandatory_category: "Capstone".to_string(),
            ..CertificationRules::default()
        };
        assert_eq!(
            evaluate(&summary_with(100.0, 1), &rules),
            Err(EngineError::MissingCategory("Capstone".to_string()))
        );
    }

    #[test]
    fn class_progress_orders_by_hours() {
        let config = EngineConfig::default();
        let at = |day: u32| {
            NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap()
        };
        let submission = |student: &str, name: &str, activity: &str, day: u32| SubmissionEvent {
            student_id: student.to_string(),
            display_name: name.to_string(),
            course_id: "10".to_string(),
            activity_name: activity.to_string(),
            timestamp: at(day),
        };
        let submissions = vec![
            submission("1", "Ana Lima", "Avaliação 1", 1),
            submission("2", "Bruno Reis", "Avaliação 1", 1),
            submission("2", "Bruno Reis", "Avaliação 2", 2),
            submission("2", "Bruno Reis", "Portfólio", 3),
        ];
        let progress = class_progress(
            &submissions,
            "10",
            &config.classifier(),
            &config.requirements,
            &config.certification,
        )
        .unwrap();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].display_name, "Bruno Reis");
        // 2 of 5 module activities (8h) + 1 of 21 final items (1h).
        assert!((progress[0].eligibility.attendance_hours - 9.0).abs() < 1e-9);
        assert!(progress[0].eligibility.mandatory_met);
        assert!(!progress[0].eligibility.eligible);
        assert!((progress[1].eligibility.attendance_hours - 4.0).abs() < 1e-9);
    }
}

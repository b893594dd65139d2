use chrono::NaiveDate;

use crate::access::{access_trends, AccessTrends};
use crate::classify::Classifier;
use crate::cohorts::{
    access_by, access_by_state_and_cohort, counts_by, coverage, never_accessed_ranking, top_cities,
    AccessShare, RosterFilter, RosterGroup,
};
use crate::completion::{
    class_overview, submission_details, summarize, CategoryOverview, CompletionSummary,
    StudentSelector, SubmissionDetail,
};
use crate::config::EngineConfig;
use crate::eligibility::{class_progress, evaluate, EligibilityResult, StudentProgress};
use crate::error::{EngineError, EngineResult};
use crate::models::{CohortMember, Course, FilterConfig, Region, StudentRef, SubmissionEvent};
use crate::modules::{
    completers_by_region, completion_rates, lowest_completion, module_completers, module_minimums,
    CompletionRate, ModuleCompleters, ModuleMinimum, RateGrouping, StateFilter,
};
use crate::normalize::{
    normalize_accesses, normalize_cohort_members, normalize_completion_states, normalize_courses, normalize_enrollments,
    normalize_module_completions, normalize_submissions, normalize_users, ExcludedRow,
    RegionMatcher,
};
use crate::presence::{compute_presence, PresenceMatrix};
use crate::status::{
    classes_per_region, headline, status_breakdown, GroupBy, Headline, StatusBreakdown,
};
use crate::table::Table;

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceReport {
    pub matrix: PresenceMatrix,
    pub excluded: Vec<ExcludedRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CertificationReport {
    pub course: Course,
    /// Whole-class completion, or the selected student's.
    pub summary: CompletionSummary,
    pub progress: Vec<StudentProgress>,
    pub overview: Vec<CategoryOverview>,
    /// Present only when the filter selects a student.
    pub student: Option<(Vec<SubmissionDetail>, EligibilityResult)>,
    pub excluded: Vec<ExcludedRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessStatusReport {
    pub headline: Headline,
    pub breakdown: Vec<StatusBreakdown>,
    pub classes_per_region: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleReport {
    pub modules: Vec<ModuleCompleters>,
    pub lowest: Vec<ModuleCompleters>,
    /// Completers summed per region over the lowest modules only.
    pub lowest_by_region: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortOverview {
    pub students: usize,
    pub states: usize,
    pub cities: usize,
    pub by_state: Vec<(String, usize)>,
    pub top_cities: Vec<(String, usize)>,
    pub access_by_state: Vec<AccessShare>,
    pub access_by_cohort: Vec<AccessShare>,
    pub state_cohort_detail: Vec<AccessShare>,
    pub never_accessed_ranking: Vec<AccessShare>,
}

/// Runs normalize, classify, aggregate and evaluate for one request at a
/// time. Holds only configuration, so one engine serves any number of
/// filters over the same base tables.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    classifier: Classifier,
    regions: RegionMatcher,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            classifier: config.classifier(),
            regions: config.region_matcher(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn courses(&self, courses: &Table) -> EngineResult<Vec<Course>> {
        Ok(normalize_courses(courses, &self.regions)?.records)
    }

    /// Looks the selected course up by name, falling back to its id.
    fn resolve_course(&self, courses: &[Course], filter: &FilterConfig) -> EngineResult<Course> {
        let wanted = selected_course(filter)?;
        courses
            .iter()
            .find(|c| c.course_name == wanted)
            .or_else(|| courses.iter().find(|c| c.course_id == wanted))
            .cloned()
            .ok_or_else(|| EngineError::UnknownCourse(wanted.to_string()))
    }

    /// Enrolled students of one course, for padding the presence matrix with
    /// students who never accessed it.
    pub fn roster(
        &self,
        enrollments: &Table,
        courses: &Table,
        filter: &FilterConfig,
    ) -> EngineResult<Vec<StudentRef>> {
        let courses = self.courses(courses)?;
        let course = self.resolve_course(&courses, filter)?;
        let enrollments = normalize_enrollments(enrollments, &courses)?.records;
        Ok(enrollments
            .into_iter()
            .filter(|e| e.course_id == course.course_id)
            .map(|e| StudentRef::new(e.student_id, e.display_name))
            .collect())
    }

    pub fn presence(
        &self,
        accesses: &Table,
        roster: &[StudentRef],
        filter: &FilterConfig,
    ) -> EngineResult<PresenceReport> {
        let course = selected_course(filter)?;
        let region = self.regions.extract(course);
        if !filter.selects_region(region.code()) {
            return Err(EngineError::EmptySelection {
                dataset: "access events".to_string(),
                selection: format!("course `{course}` in regions {}", filter.regions.join(", ")),
            });
        }

        let normalized = normalize_accesses(accesses)?;
        let matrix = compute_presence(&normalized.records, course, filter.window, roster)?;
        if let Some(student) = &filter.student {
            if matrix.row(student).is_none() {
                return Err(EngineError::EmptySelection {
                    dataset: "access events".to_string(),
                    selection: format!("student `{student}` in course `{course}`"),
                });
            }
        }

        Ok(PresenceReport {
            matrix,
            excluded: normalized.excluded,
        })
    }

    pub fn certification(
        &self,
        submissions: &Table,
        courses: &Table,
        filter: &FilterConfig,
    ) -> EngineResult<CertificationReport> {
        let courses = self.courses(courses)?;
        let course = self.resolve_course(&courses, filter)?;

        let normalized = normalize_submissions(submissions)?;
        let records: Vec<SubmissionEvent> = normalized
            .records
            .into_iter()
            .filter(|s| filter.window.contains(s.day()))
            .collect();

        let requirements = &self.config.requirements;
        let rules = &self.config.certification;
        let progress =
            class_progress(&records, &course.course_id, &self.classifier, requirements, rules)?;
        let summaries: Vec<CompletionSummary> = progress.iter().map(|p| p.summary.clone()).collect();
        let overview = class_overview(&summaries);

        let (summary, student) = match &filter.student {
            Some(student_id) => {
                let selector = StudentSelector::Student(student_id.clone());
                let summary =
                    summarize(&records, &course.course_id, &selector, &self.classifier, requirements);
                if summary.total_submissions == 0 {
                    log::info!(
                        "student {student_id} has no submissions in {}",
                        course.course_name
                    );
                }
                let details = submission_details(
                    &records,
                    &course.course_id,
                    student_id,
                    &self.classifier,
                    requirements,
                );
                let eligibility = evaluate(&summary, rules)?;
                (summary, Some((details, eligibility)))
            }
            None => {
                let selector = StudentSelector::All;
                let summary =
                    summarize(&records, &course.course_id, &selector, &self.classifier, requirements);
                (summary, None)
            }
        };

        for name in &summary.unrecognized {
            log::warn!("unrecognized activity in {}: {name}", course.course_name);
        }

        Ok(CertificationReport {
            course,
            summary,
            progress,
            overview,
            student,
            excluded: normalized.excluded,
        })
    }

    /// Trends over the given courses; an empty list selects every course.
    pub fn access_trends(
        &self,
        accesses: &Table,
        courses: &[String],
        filter: &FilterConfig,
        top_n: usize,
    ) -> EngineResult<AccessTrends> {
        let normalized = normalize_accesses(accesses)?;
        let events: Vec<_> = normalized
            .records
            .into_iter()
            .filter(|event| filter.selects_region(self.regions.extract(&event.course_name).code()))
            .collect();
        Ok(access_trends(&events, courses, filter.window, top_n))
    }

    pub fn access_status(
        &self,
        courses: &Table,
        enrollments: &Table,
        users: &Table,
        filter: &FilterConfig,
        as_of: NaiveDate,
        group_by: GroupBy,
    ) -> EngineResult<AccessStatusReport> {
        let courses: Vec<Course> = self
            .courses(courses)?
            .into_iter()
            .filter(|c| filter.selects_region(c.region.code()))
            .collect();
        let enrollments: Vec<_> = normalize_enrollments(enrollments, &courses)?
            .records
            .into_iter()
            .filter(|e| filter.selects_region(e.region.code()))
            .collect();
        let users = normalize_users(users)?.records;
        let policy = self.config.inactivity;

        Ok(AccessStatusReport {
            headline: headline(&courses, &enrollments, &users, policy, as_of),
            breakdown: status_breakdown(&enrollments, &users, policy, as_of, group_by),
            classes_per_region: classes_per_region(&courses),
        })
    }

    pub fn modules(
        &self,
        completions: &Table,
        courses: &Table,
        filter: &FilterConfig,
        limit: usize,
    ) -> EngineResult<ModuleReport> {
        let courses = self.courses(courses)?;
        let completions = normalize_module_completions(completions)?.records;
        let modules: Vec<ModuleCompleters> = module_completers(&completions, &courses)
            .into_iter()
            .filter(|row| filter.selects_region(&row.region))
            .collect();
        let lowest = lowest_completion(&modules, limit);
        let lowest_by_region = completers_by_region(&lowest);

        Ok(ModuleReport {
            modules,
            lowest,
            lowest_by_region,
        })
    }

    pub fn region_of(&self, course_name: &str) -> Region {
        self.regions.extract(course_name)
    }

    /// Module hours of the region's schedule with the minimum to complete.
    pub fn module_hours(&self, region: &Region) -> Vec<ModuleMinimum> {
        module_minimums(&self.config.module_hours, region)
    }

    pub fn completion_rates(
        &self,
        states: &Table,
        filter: &StateFilter,
        grouping: RateGrouping,
    ) -> EngineResult<Vec<CompletionRate>> {
        let states = normalize_completion_states(states)?.records;
        Ok(completion_rates(&states, filter, grouping))
    }

    /// Roster rows that pass `filter`, for the per-city and per-cohort views.
    pub fn cohort_members(
        &self,
        roster: &Table,
        filter: &RosterFilter,
    ) -> EngineResult<Vec<CohortMember>> {
        let normalized = normalize_cohort_members(roster)?;
        let members: Vec<CohortMember> = normalized
            .records
            .into_iter()
            .filter(|member| filter.selects(member))
            .collect();
        if members.is_empty() {
            return Err(EngineError::EmptySelection {
                dataset: "cohort roster".to_string(),
                selection: "the current state, city and access filter".to_string(),
            });
        }
        Ok(members)
    }

    pub fn cohort_overview(
        &self,
        roster: &Table,
        filter: &RosterFilter,
        city_limit: usize,
    ) -> EngineResult<CohortOverview> {
        let members = self.cohort_members(roster, filter)?;
        let selected: Vec<&CohortMember> = members.iter().collect();
        let (states, cities) = coverage(&selected);

        Ok(CohortOverview {
            students: selected.len(),
            states,
            cities,
            by_state: counts_by(&selected, RosterGroup::State),
            top_cities: top_cities(&selected, city_limit),
            access_by_state: access_by(&selected, RosterGroup::State),
            access_by_cohort: access_by(&selected, RosterGroup::Cohort),
            state_cohort_detail: access_by_state_and_cohort(&selected),
            never_accessed_ranking: never_accessed_ranking(&selected),
        })
    }
}

fn selected_course(filter: &FilterConfig) -> EngineResult<&str> {
    filter
        .course
        .as_deref()
        .map(str::trim)
        .filter(|course| !course.is_empty())
        .ok_or_else(|| EngineError::EmptySelection {
            dataset: "course".to_string(),
            selection: "an empty course filter".to_string(),
        })
}

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::RegionRule;
use crate::error::{EngineResult, ParseError};
use crate::models::{
    AccessEvent, CohortMember, CompletionState, Course, EnrollmentRecord, ModuleCompletion,
    Region, SubmissionEvent, UserAccess,
};
use crate::table::{ColumnSpec, Table};

const STUDENT_ID: ColumnSpec = ColumnSpec::new("student_id", &["user_id", "userid"]);
const FIRST_NAME: ColumnSpec = ColumnSpec::new("first_name", &["firstname"]);
const LAST_NAME: ColumnSpec = ColumnSpec::new("last_name", &["lastname"]);
const COURSE_ID: ColumnSpec = ColumnSpec::new("course_id", &["courseid", "course"]);

pub const ACCESS_COLUMNS: &[ColumnSpec] = &[
    STUDENT_ID,
    FIRST_NAME,
    LAST_NAME,
    ColumnSpec::new("course_name", &["coursename", "fullname"]),
    ColumnSpec::new("access_timestamp", &["access_time", "timecreated"]),
];

pub const SUBMISSION_COLUMNS: &[ColumnSpec] = &[
    STUDENT_ID,
    FIRST_NAME,
    LAST_NAME,
    COURSE_ID,
    ColumnSpec::new("activity_name", &["name_atividade", "assignment_name"]),
    ColumnSpec::new("submission_timestamp", &["timemodified", "submission_time"]),
];

pub const COURSE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("course_id", &["courseid", "id"]),
    ColumnSpec::new("course_name", &["fullname", "coursename"]),
];

pub const USER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("student_id", &["user_id", "userid", "id"]),
    ColumnSpec::new("last_access_timestamp", &["lastaccess", "last_access"]),
];

pub const ENROLLMENT_COLUMNS: &[ColumnSpec] = &[STUDENT_ID, COURSE_ID];

pub const MODULE_COMPLETION_COLUMNS: &[ColumnSpec] = &[
    STUDENT_ID,
    COURSE_ID,
    ColumnSpec::new("module_name", &["modulename"]),
    ColumnSpec::new("completion_state", &["completionstate"]),
];

pub const COMPLETION_STATE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("class_name", &["turma"]),
    ColumnSpec::new("activity_type", &["tipo_atividade"]),
    ColumnSpec::new("region", &["estado", "state"]),
    ColumnSpec::new("completed", &["estado_conclusao"]),
];

pub const COHORT_MEMBER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("name", &["nome", "student_name"]),
    ColumnSpec::new("city", &["cidade"]),
    ColumnSpec::new("cohort_id", &["id_coorte", "cohort"]),
    ColumnSpec::new("access_status", &["acesso", "access"]),
    ColumnSpec::new("state", &["estado"]),
    ColumnSpec::new("last_access", &["ultimo_acesso"]),
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Input row dropped during normalization. `row` is 1-based over data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedRow {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub excluded: Vec<ExcludedRow>,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            excluded: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionMatcher {
    rules: Vec<RegionRule>,
}

impl RegionMatcher {
    pub fn new(rules: Vec<RegionRule>) -> Self {
        Self { rules }
    }

    /// First matching rule wins.
    pub fn extract(&self, name: &str) -> Region {
        let trimmed = name.trim();
        let upper = trimmed.to_uppercase();

        for rule in &self.rules {
            match rule {
                RegionRule::Prefix { prefix, code_len } => {
                    let Some(rest) = trimmed.strip_prefix(prefix.as_str()) else {
                        continue;
                    };
                    let code: String = rest.chars().take(*code_len).collect();
                    if *code_len > 0 && code.chars().count() == *code_len {
                        return Region::Recognized(code);
                    }
                }
                RegionRule::Token { token, code } => {
                    if !token.is_empty() && contains_word(&upper, &token.to_uppercase()) {
                        return Region::Recognized(code.clone());
                    }
                }
            }
        }

        Region::Unknown
    }
}

/// `word` occurs in `text` with no letter or digit directly on either side.
fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

pub fn display_name(first: &str, last: &str) -> String {
    first
        .split_whitespace()
        .chain(last.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Epoch seconds, RFC 3339, or one of the common export layouts. Offsets are
/// dropped: the local wall-clock time is kept.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ParseError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ParseError::Blank("timestamp"));
    }

    if let Ok(seconds) = value.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0)
            .map(|ts| ts.naive_utc())
            .ok_or_else(|| ParseError::Timestamp(value.to_string()));
    }
    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() {
            return DateTime::from_timestamp(seconds.trunc() as i64, 0)
                .map(|ts| ts.naive_utc())
                .ok_or_else(|| ParseError::Timestamp(value.to_string()));
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.naive_local());
    }
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(day) = NaiveDate::parse_from_str(value, format) {
            if let Some(ts) = day.and_hms_opt(0, 0, 0) {
                return Ok(ts);
            }
        }
    }

    Err(ParseError::Timestamp(value.to_string()))
}

/// Completion flags arrive as 0/1 states, booleans or yes/no words. Only a
/// state of exactly 1 counts as completed.
pub fn parse_flag(raw: &str) -> Result<bool, ParseError> {
    let value = raw.trim().to_lowercase();
    if value.is_empty() {
        return Ok(false);
    }
    if let Ok(number) = value.parse::<f64>() {
        return Ok(number == 1.0);
    }
    match value.as_str() {
        "true" | "yes" | "y" | "sim" => Ok(true),
        "false" | "no" | "n" | "não" | "nao" => Ok(false),
        _ => Err(ParseError::Number(raw.trim().to_string())),
    }
}

/// Roster access statuses are phrases ("já acessou", "nunca acessou") or
/// the usual flag values.
pub fn parse_access_status(raw: &str) -> Result<bool, ParseError> {
    match raw.trim().to_lowercase().as_str() {
        "já acessou" | "ja acessou" | "accessed" => Ok(true),
        "nunca acessou" | "never accessed" => Ok(false),
        "" => Err(ParseError::Blank("access status")),
        _ => parse_flag(raw),
    }
}

fn required<'a>(value: &'a str, what: &'static str) -> Result<&'a str, ParseError> {
    if value.is_empty() {
        Err(ParseError::Blank(what))
    } else {
        Ok(value)
    }
}

fn collect_rows<T>(
    dataset: &str,
    table: &Table,
    mut convert: impl FnMut(&[String]) -> Result<T, ParseError>,
) -> Normalized<T> {
    let mut normalized = Normalized::default();
    let columns = table.headers().len();
    for (index, row) in table.rows().iter().enumerate() {
        let converted = if row.len() > columns {
            Err(ParseError::ExtraCells {
                cells: row.len(),
                columns,
            })
        } else {
            convert(row)
        };
        match converted {
            Ok(record) => normalized.records.push(record),
            Err(err) => {
                log::warn!("{dataset}: excluding row {}: {err}", index + 1);
                normalized.excluded.push(ExcludedRow {
                    row: index + 1,
                    reason: err.to_string(),
                });
            }
        }
    }
    log::debug!(
        "{dataset}: normalized {} rows, excluded {}",
        normalized.records.len(),
        normalized.excluded.len()
    );
    normalized
}

pub fn normalize_accesses(table: &Table) -> EngineResult<Normalized<AccessEvent>> {
    let columns = table.columns("access events", ACCESS_COLUMNS)?;
    Ok(collect_rows("access events", table, |row| {
        Ok(AccessEvent {
            student_id: required(columns.cell(row, 0), "student_id")?.to_string(),
            display_name: display_name(columns.cell(row, 1), columns.cell(row, 2)),
            course_name: required(columns.cell(row, 3), "course_name")?.to_string(),
            timestamp: parse_timestamp(columns.cell(row, 4))?,
        })
    }))
}

pub fn normalize_submissions(table: &Table) -> EngineResult<Normalized<SubmissionEvent>> {
    let columns = table.columns("submission events", SUBMISSION_COLUMNS)?;
    Ok(collect_rows("submission events", table, |row| {
        Ok(SubmissionEvent {
            student_id: required(columns.cell(row, 0), "student_id")?.to_string(),
            display_name: display_name(columns.cell(row, 1), columns.cell(row, 2)),
            course_id: required(columns.cell(row, 3), "course_id")?.to_string(),
            activity_name: columns.cell(row, 4).to_string(),
            timestamp: parse_timestamp(columns.cell(row, 5))?,
        })
    }))
}

pub fn normalize_courses(table: &Table, regions: &RegionMatcher) -> EngineResult<Normalized<Course>> {
    let columns = table.columns("courses", COURSE_COLUMNS)?;
    Ok(collect_rows("courses", table, |row| {
        let course_name = columns.cell(row, 1).to_string();
        Ok(Course {
            course_id: required(columns.cell(row, 0), "course_id")?.to_string(),
            region: regions.extract(&course_name),
            course_name,
        })
    }))
}

/// A blank or zero last access means the user never logged in.
pub fn normalize_users(table: &Table) -> EngineResult<Normalized<UserAccess>> {
    let columns = table.columns("users", USER_COLUMNS)?;
    Ok(collect_rows("users", table, |row| {
        let raw = columns.cell(row, 1);
        let last_access = if raw.is_empty() || raw.parse::<f64>().map_or(false, |v| v == 0.0) {
            None
        } else {
            Some(parse_timestamp(raw)?)
        };
        Ok(UserAccess {
            student_id: required(columns.cell(row, 0), "student_id")?.to_string(),
            last_access,
        })
    }))
}

/// Enrollments joined to the course table. Courses missing from the table
/// keep a blank name and an unknown region.
pub fn normalize_enrollments(
    table: &Table,
    courses: &[Course],
) -> EngineResult<Normalized<EnrollmentRecord>> {
    let columns = table.columns("enrollments", ENROLLMENT_COLUMNS)?;
    let first_name = table.optional_column(&FIRST_NAME);
    let last_name = table.optional_column(&LAST_NAME);
    let by_id: HashMap<&str, &Course> = courses.iter().map(|c| (c.course_id.as_str(), c)).collect();

    Ok(collect_rows("enrollments", table, |row| {
        let optional = |index: Option<usize>| {
            index
                .and_then(|i| row.get(i))
                .map(|cell| cell.trim())
                .unwrap_or("")
        };
        let course_id = required(columns.cell(row, 1), "course_id")?;
        let course = by_id.get(course_id);
        Ok(EnrollmentRecord {
            student_id: required(columns.cell(row, 0), "student_id")?.to_string(),
            display_name: display_name(optional(first_name), optional(last_name)),
            course_id: course_id.to_string(),
            course_name: course.map(|c| c.course_name.clone()).unwrap_or_default(),
            region: course.map(|c| c.region.clone()).unwrap_or(Region::Unknown),
        })
    }))
}

pub fn normalize_module_completions(table: &Table) -> EngineResult<Normalized<ModuleCompletion>> {
    let columns = table.columns("module completions", MODULE_COMPLETION_COLUMNS)?;
    Ok(collect_rows("module completions", table, |row| {
        Ok(ModuleCompletion {
            student_id: required(columns.cell(row, 0), "student_id")?.to_string(),
            course_id: required(columns.cell(row, 1), "course_id")?.to_string(),
            module_name: required(columns.cell(row, 2), "module_name")?.to_string(),
            completed: parse_flag(columns.cell(row, 3))?,
        })
    }))
}

/// Region codes are upper-cased the way the state dashboards compare them.
pub fn normalize_completion_states(table: &Table) -> EngineResult<Normalized<CompletionState>> {
    let columns = table.columns("completion states", COMPLETION_STATE_COLUMNS)?;
    Ok(collect_rows("completion states", table, |row| {
        Ok(CompletionState {
            class_name: columns.cell(row, 0).to_string(),
            activity_type: columns.cell(row, 1).to_string(),
            region: columns.cell(row, 2).to_uppercase(),
            completed: parse_flag(columns.cell(row, 3))?,
        })
    }))
}

/// A last access that does not parse is kept as unknown, never excluded:
/// the access status column alone decides the counts.
pub fn normalize_cohort_members(table: &Table) -> EngineResult<Normalized<CohortMember>> {
    let columns = table.columns("cohort roster", COHORT_MEMBER_COLUMNS)?;
    Ok(collect_rows("cohort roster", table, |row| {
        Ok(CohortMember {
            name: required(columns.cell(row, 0), "name")?.to_string(),
            city: columns.cell(row, 1).to_string(),
            cohort_id: columns.cell(row, 2).to_string(),
            accessed: parse_access_status(columns.cell(row, 3))?,
            state: columns.cell(row, 4).to_uppercase(),
            last_access: parse_timestamp(columns.cell(row, 5)).ok(),
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::EngineError;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn parses_supported_timestamp_layouts() {
        assert_eq!(parse_timestamp("1709294400").unwrap(), ts("2024-03-01 12:00:00"));
        assert_eq!(parse_timestamp("1709294400.75").unwrap(), ts("2024-03-01 12:00:00"));
        assert_eq!(parse_timestamp("2024-03-01 08:15:00").unwrap(), ts("2024-03-01 08:15:00"));
        assert_eq!(parse_timestamp("2024-03-01T08:15:00").unwrap(), ts("2024-03-01 08:15:00"));
        assert_eq!(parse_timestamp("2024-03-01T23:30:00-03:00").unwrap(), ts("2024-03-01 23:30:00"));
        assert_eq!(parse_timestamp("01/03/2024 08:15").unwrap(), ts("2024-03-01 08:15:00"));
        assert_eq!(parse_timestamp("2024-03-01").unwrap(), ts("2024-03-01 00:00:00"));
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert_eq!(
            parse_timestamp("yesterday"),
            Err(ParseError::Timestamp("yesterday".to_string()))
        );
        assert_eq!(parse_timestamp("  "), Err(ParseError::Blank("timestamp")));
    }

    #[test]
    fn display_name_collapses_whitespace() {
        assert_eq!(display_name(" Maria ", "da  Silva"), "Maria da Silva");
        assert_eq!(display_name("Solo", ""), "Solo");
    }

    #[test]
    fn region_prefix_wins_over_tokens() {
        let matcher = EngineConfig::default().region_matcher();
        assert_eq!(matcher.extract(" [NFPI] Turma 03"), Region::Recognized("PI".into()));
        assert_eq!(matcher.extract("Formação Turma CE 01"), Region::Recognized("CE".into()));
        assert_eq!(matcher.extract("[NF"), Region::Unknown);
        assert_eq!(matcher.extract("Curso 12"), Region::Unknown);
    }

    #[test]
    fn region_tokens_match_whole_words_only() {
        let matcher = EngineConfig::default().region_matcher();
        assert_eq!(matcher.extract("Turma PI 02"), Region::Recognized("PI".into()));
        assert_eq!(matcher.extract("Formação PE 03"), Region::Recognized("PE".into()));
        assert_eq!(matcher.extract("Turma 12"), Region::Unknown);
        assert_eq!(matcher.extract("Polo (CE)"), Region::Recognized("CE".into()));
        assert_eq!(matcher.extract("CECAP 4"), Region::Unknown);
    }

    #[test]
    fn region_tokens_follow_rule_order() {
        let matcher = EngineConfig::default().region_matcher();
        // Contains both MA and PE; MA is listed first.
        assert_eq!(matcher.extract("Turma MA-PE"), Region::Recognized("MA".into()));
    }

    #[test]
    fn unparseable_rows_are_excluded_not_fatal() {
        let table = Table::with_rows(
            vec!["user_id", "firstname", "lastname", "course_name", "access_time"],
            vec![
                vec!["1".into(), "Ana".into(), "Lima".into(), "Turma A".into(), "2024-03-01 10:00:00".into()],
                vec!["2".into(), "Bia".into(), "Reis".into(), "Turma A".into(), "not a date".into()],
                vec!["".into(), "Caio".into(), "Melo".into(), "Turma A".into(), "2024-03-01".into()],
            ],
        );
        let normalized = normalize_accesses(&table).unwrap();
        assert_eq!(normalized.records.len(), 1);
        assert_eq!(normalized.records[0].display_name, "Ana Lima");
        assert_eq!(
            normalized.excluded,
            vec![
                ExcludedRow { row: 2, reason: "unparseable timestamp `not a date`".into() },
                ExcludedRow { row: 3, reason: "blank student_id".into() },
            ]
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let table = Table::with_rows(
            vec!["student_id", "first_name", "last_name", "course_name", "access_timestamp"],
            vec![vec!["1".into(), "Ana".into(), "Lima".into(), "Turma A".into(), "1709294400".into()]],
        );
        assert_eq!(normalize_accesses(&table).unwrap(), normalize_accesses(&table).unwrap());
    }

    #[test]
    fn missing_columns_fail_fast() {
        let table = Table::new(vec!["student_id", "course_id"]);
        let err = normalize_submissions(&table).unwrap_err();
        assert_eq!(
            err,
            EngineError::MissingColumns {
                dataset: "submission events".into(),
                missing: vec![
                    "first_name".into(),
                    "last_name".into(),
                    "activity_name".into(),
                    "submission_timestamp".into(),
                ],
            }
        );
    }

    #[test]
    fn zero_last_access_means_never() {
        let table = Table::with_rows(
            vec!["userid", "lastaccess"],
            vec![
                vec!["1".into(), "0".into()],
                vec!["2".into(), "1709294400".into()],
            ],
        );
        let users = normalize_users(&table).unwrap().records;
        assert_eq!(users[0].last_access, None);
        assert_eq!(users[1].last_access, Some(ts("2024-03-01 12:00:00")));
    }

    #[test]
    fn enrollments_join_course_region() {
        let matcher = EngineConfig::default().region_matcher();
        let courses = normalize_courses(
            &Table::with_rows(
                vec!["courseid", "fullname"],
                vec![vec!["10".into(), "[NFCE] Turma 1".into()]],
            ),
            &matcher,
        )
        .unwrap()
        .records;
        let enrollments = normalize_enrollments(
            &Table::with_rows(
                vec!["userid", "courseid"],
                vec![vec!["1".into(), "10".into()], vec!["2".into(), "99".into()]],
            ),
            &courses,
        )
        .unwrap()
        .records;
        assert_eq!(enrollments[0].region, Region::Recognized("CE".into()));
        assert_eq!(enrollments[0].course_name, "[NFCE] Turma 1");
        assert_eq!(enrollments[1].region, Region::Unknown);
    }

    #[test]
    fn cohort_roster_reads_access_phrases() {
        let table = Table::with_rows(
            vec!["nome", "cidade", "id_coorte", "acesso", "estado", "ultimo_acesso"],
            vec![
                vec!["Ana".into(), " Sobral ".into(), "301".into(), "Já acessou".into(), " ce ".into(), "2024-03-01 10:00:00".into()],
                vec!["Bia".into(), "Crato".into(), "302".into(), "nunca acessou".into(), "CE".into(), "NaT".into()],
                vec!["Caio".into(), "Crato".into(), "302".into(), "talvez".into(), "CE".into(), "".into()],
            ],
        );
        let normalized = normalize_cohort_members(&table).unwrap();
        assert_eq!(normalized.records.len(), 2);
        let ana = &normalized.records[0];
        assert_eq!((ana.city.as_str(), ana.state.as_str()), ("Sobral", "CE"));
        assert!(ana.accessed);
        assert_eq!(ana.last_access, Some(ts("2024-03-01 10:00:00")));
        assert!(!normalized.records[1].accessed);
        assert_eq!(normalized.records[1].last_access, None);
        assert_eq!(normalized.excluded[0].row, 3);
    }

    #[test]
    fn rows_wider_than_the_header_are_excluded() {
        let csv = "nome,cidade,id_coorte,acesso,estado,ultimo_acesso\n\
                   Ana,Sobral,301,Já acessou,CE,2024-03-01 10:00:00\n\
                   Bia,Crato,302,Nunca acessou,CE,,Crato\n";
        let table = Table::from_csv_reader(csv.as_bytes()).unwrap();
        let normalized = normalize_cohort_members(&table).unwrap();
        assert_eq!(normalized.records.len(), 1);
        assert_eq!(normalized.excluded[0].row, 2);
        assert_eq!(
            normalized.excluded[0].reason,
            "row has 7 cells but the header has 6"
        );
    }

    #[test]
    fn completion_flags() {
        assert_eq!(parse_flag("1"), Ok(true));
        assert_eq!(parse_flag("2"), Ok(false));
        assert_eq!(parse_flag("Sim"), Ok(true));
        assert_eq!(parse_flag(""), Ok(false));
        assert!(parse_flag("maybe").is_err());
    }
}

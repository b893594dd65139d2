use cohort_attendance::config::{ActivityRequirement, ClassifierRule, FINAL_ACTIVITY};
use cohort_attendance::report::{class_progress_table, presence_table};
use cohort_attendance::status::GroupBy;
use cohort_attendance::{Engine, EngineConfig, EngineError, FilterConfig, Table};
use chrono::NaiveDate;

fn table(csv: &str) -> Table {
    Table::from_csv_reader(csv.as_bytes()).unwrap()
}

const ACCESSES: &str = "\
student_id,first_name,last_name,course_name,access_timestamp
1,Ana,Lima,[NFCE] Turma 1,2024-03-01 08:00:00
1,Ana,Lima,[NFCE] Turma 1,2024-03-01 19:30:00
2,Bruno,Reis,[NFCE] Turma 1,2024-03-02 10:00:00
1,Ana,Lima,[NFCE] Turma 1,2024-03-03 09:15:00
3,Caio,Melo,[NFCE] Turma 1,2024-02-20 09:00:00
";

const COURSES: &str = "\
course_id,course_name
10,[NFCE] Turma 1
11,[NFPI] Turma 2
";

#[test]
fn presence_matrix_matches_the_worked_scenario() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let from = NaiveDate::from_ymd_opt(2024, 3, 1);
    let filter = FilterConfig::for_course("[NFCE] Turma 1")
        .with_window(cohort_attendance::DateWindow::new(from, None));
    let report = engine.presence(&table(ACCESSES), &[], &filter).unwrap();

    let csv = presence_table(&report.matrix).to_csv_string().unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "Student,01/03/2024,02/03/2024,03/03/2024,Total Present,Total Absent,Frequency"
    );
    assert_eq!(lines[1], "Ana Lima,✅,❌,✅,2,1,66.7%");
    assert_eq!(lines[2], "Bruno Reis,❌,✅,❌,1,2,33.3%");
    // Accessed the course only before the window.
    assert_eq!(lines[3], "Caio Melo,❌,❌,❌,0,3,0.0%");
}

#[test]
fn missing_columns_are_named() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let accesses = table("student_id,course_name\n1,Turma\n");
    let err = engine
        .presence(&accesses, &[], &FilterConfig::for_course("Turma"))
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::MissingColumns {
            dataset: "access events".to_string(),
            missing: vec![
                "first_name".to_string(),
                "last_name".to_string(),
                "access_timestamp".to_string()
            ],
        }
    );
}

fn workshop_config() -> EngineConfig {
    EngineConfig {
        classifier: vec![
            ClassifierRule::new("workshop", "Workshops"),
            ClassifierRule::new("portfólio", FINAL_ACTIVITY),
        ],
        requirements: vec![
            ActivityRequirement::new("Workshops", 95.0).requiring(1.0),
            ActivityRequirement::new(FINAL_ACTIVITY, 21.0).mandatory(),
        ],
        ..EngineConfig::default()
    }
}

const SUBMISSIONS: &str = "\
student_id,first_name,last_name,course_id,activity_name,submission_timestamp
1,Ana,Lima,10,Workshop de abertura,1709283600
2,Bruno,Reis,10,Workshop de abertura,1709283600
2,Bruno,Reis,10,Portfólio final,1709888400
3,Caio,Melo,11,Workshop de abertura,1709283600
";

#[test]
fn hours_alone_do_not_certify() {
    let engine = Engine::new(workshop_config()).unwrap();
    let report = engine
        .certification(&table(SUBMISSIONS), &table(COURSES), &FilterConfig::for_course("10"))
        .unwrap();

    assert_eq!(report.course.course_name, "[NFCE] Turma 1");
    assert_eq!(report.progress.len(), 2);

    let bruno = &report.progress[0];
    assert_eq!(bruno.display_name, "Bruno Reis");
    assert!((bruno.eligibility.attendance_hours - 96.0).abs() < 1e-9);
    assert!(bruno.eligibility.eligible);

    let ana = &report.progress[1];
    assert!((ana.eligibility.attendance_hours - 95.0).abs() < 1e-9);
    assert!(ana.eligibility.hours_met);
    assert!(!ana.eligibility.eligible);

    let csv = class_progress_table(&report.progress).to_csv_string().unwrap();
    assert!(csv.contains("Ana Lima,95.0,❌,79.2%,❌"));
}

#[test]
fn access_status_counts_never_accessed_users() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let enrollments = table("student_id,course_id\n1,10\n2,10\n3,11\n4,11\n");
    let users = table("id,lastaccess\n1,1709283600\n2,0\n3,1709283600\n");
    let as_of = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

    let status = engine
        .access_status(
            &table(COURSES),
            &enrollments,
            &users,
            &FilterConfig::default(),
            as_of,
            GroupBy::Region,
        )
        .unwrap();

    assert_eq!(status.headline.enrolled_students, 4);
    assert_eq!(status.headline.active, 2);
    assert_eq!(status.headline.never_accessed, 2);
    assert_eq!(status.breakdown.len(), 2);
    assert!(status.breakdown.iter().all(|row| row.active == 1 && row.never_accessed == 1));
}

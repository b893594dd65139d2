use std::fmt::Write;

use crate::access::{AccessTrends, CumulativeCount};
use crate::cohorts::AccessShare;
use crate::completion::{CategoryOverview, CompletionSummary, SubmissionDetail};
use crate::eligibility::StudentProgress;
use crate::models::CohortMember;
use crate::modules::{CompletionRate, ModuleCompleters, ModuleMinimum};
use crate::presence::PresenceMatrix;
use crate::status::StatusBreakdown;
use crate::table::Table;

pub const DAY_FORMAT: &str = "%d/%m/%Y";

const PRESENT: &str = "✅";
const ABSENT: &str = "❌";

pub fn fmt_pct(value: Option<f64>) -> String {
    value
        .map(|pct| format!("{pct:.1}%"))
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn fmt_hours(hours: f64) -> String {
    format!("{hours:.1}h")
}

fn glyph(flag: bool) -> &'static str {
    if flag {
        PRESENT
    } else {
        ABSENT
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Students as rows, class days as columns, then totals and frequency.
pub fn presence_table(matrix: &PresenceMatrix) -> Table {
    let mut headers = vec!["Student".to_string()];
    headers.extend(matrix.day_axis.iter().map(|day| day.format(DAY_FORMAT).to_string()));
    headers.extend(["Total Present", "Total Absent", "Frequency"].map(String::from));

    let mut table = Table::new(headers);
    for row in &matrix.rows {
        let mut cells = vec![row.student.display_name.clone()];
        cells.extend(row.days.iter().map(|&flag| glyph(flag).to_string()));
        cells.push(row.present.to_string());
        cells.push(row.absent.to_string());
        cells.push(fmt_pct(row.frequency));
        table.push_row(cells);
    }
    table
}

pub fn individual_presence_table(matrix: &PresenceMatrix, student_id: &str) -> Option<Table> {
    let row = matrix.row(student_id)?;
    let mut table = Table::new(["Date", "Presence"]);
    for (day, &flag) in matrix.day_axis.iter().zip(&row.days) {
        table.push_row([day.format(DAY_FORMAT).to_string(), glyph(flag).to_string()]);
    }
    Some(table)
}

pub fn course_summary_table(matrix: &PresenceMatrix) -> Table {
    let stats = matrix.stats();
    let mut table = Table::new([
        "Course",
        "Period",
        "Total Students",
        "Class Days",
        "Total Presences",
        "Total Absences",
        "Mean Frequency",
    ]);
    table.push_row([
        matrix.course.clone(),
        matrix.window.to_string(),
        stats.students.to_string(),
        stats.class_days.to_string(),
        stats.presences.to_string(),
        stats.absences.to_string(),
        fmt_pct(stats.mean_frequency),
    ]);
    table
}

pub fn daily_presence_table(matrix: &PresenceMatrix) -> Table {
    let mut table = Table::new(["Day", "Present", "Total Students", "% Present"]);
    for daily in matrix.daily_rates() {
        table.push_row([
            daily.day.format(DAY_FORMAT).to_string(),
            daily.present.to_string(),
            daily.students.to_string(),
            fmt_pct(daily.rate),
        ]);
    }
    table
}

pub fn completion_table(summary: &CompletionSummary) -> Table {
    let mut table = Table::new([
        "Activity Type",
        "Items Completed",
        "Items Required",
        "Minimum Required",
        "Completed Hours",
        "Required Hours",
        "% Completed",
        "Counts Toward Frequency",
        "Status",
    ]);
    for category in &summary.categories {
        table.push_row([
            category.category.clone(),
            category.items_completed.to_string(),
            format!("{:.0}", category.items_required),
            category.minimum_items.to_string(),
            fmt_hours(category.completed_hours),
            fmt_hours(category.hours),
            fmt_pct(Some(category.completion_pct)),
            yes_no(category.counts_toward_frequency).to_string(),
            category.status.glyph().to_string(),
        ]);
    }
    table
}

pub fn submission_detail_table(details: &[SubmissionDetail]) -> Table {
    let mut table = Table::new([
        "Activity",
        "Detected Type",
        "Submitted On",
        "Hours per Item",
        "Counts Toward Frequency",
    ]);
    for detail in details {
        table.push_row([
            detail.activity_name.clone(),
            detail
                .category
                .clone()
                .unwrap_or_else(|| "Unrecognized".to_string()),
            detail.submitted_on.format(DAY_FORMAT).to_string(),
            detail
                .hours_per_item
                .map(fmt_hours)
                .unwrap_or_else(|| "N/A".to_string()),
            yes_no(detail.counts_toward_frequency).to_string(),
        ]);
    }
    table
}

pub fn class_progress_table(progress: &[StudentProgress]) -> Table {
    let mut table = Table::new([
        "Student",
        "Completed Hours",
        "Final Activity",
        "% Completed",
        "Eligible",
    ]);
    for student in progress {
        let eligibility = &student.eligibility;
        table.push_row([
            student.display_name.clone(),
            format!("{:.1}", eligibility.attendance_hours),
            glyph(eligibility.mandatory_met).to_string(),
            fmt_pct(eligibility.program_pct),
            glyph(eligibility.eligible).to_string(),
        ]);
    }
    table
}

pub fn class_overview_table(overview: &[CategoryOverview]) -> Table {
    let mut table = Table::new([
        "Activity Type",
        "Students Meeting Minimum",
        "Mean Items Completed",
        "Mean % Completed",
    ]);
    for category in overview {
        table.push_row([
            category.category.clone(),
            format!("{}/{}", category.students_meeting_minimum, category.students),
            format!("{:.1}", category.mean_items),
            fmt_pct(Some(category.mean_pct)),
        ]);
    }
    table
}

pub fn status_table(group_label: &str, rows: &[StatusBreakdown]) -> Table {
    let mut table = Table::new([
        group_label,
        "Active",
        "Inactive",
        "Never Accessed",
        "Total",
        "% Active",
        "% Never Accessed",
    ]);
    for row in rows {
        table.push_row([
            row.group.clone(),
            row.active.to_string(),
            row.inactive.to_string(),
            row.never_accessed.to_string(),
            row.total.to_string(),
            fmt_pct(row.active_pct),
            fmt_pct(row.never_accessed_pct),
        ]);
    }
    table
}

pub fn module_table(rows: &[ModuleCompleters]) -> Table {
    let mut table = Table::new(["Course", "Module", "Completers", "Region"]);
    for row in rows {
        table.push_row([
            row.course_name.clone(),
            row.module_name.clone(),
            row.completers.to_string(),
            row.region.clone(),
        ]);
    }
    table
}

pub fn module_hours_table(minimum_share: f64, rows: &[ModuleMinimum]) -> Table {
    let minimum_label = format!("Minimum ({}%)", minimum_share * 100.0);
    let mut table = Table::new(["Module".to_string(), "Hours".to_string(), minimum_label]);
    for row in rows {
        table.push_row([
            row.module.clone(),
            row.hours.to_string(),
            row.minimum_hours.to_string(),
        ]);
    }
    table
}

pub fn completion_rate_table(group_label: Option<&str>, rates: &[CompletionRate]) -> Table {
    let mut headers: Vec<&str> = group_label.into_iter().collect();
    headers.extend(["Activity Type", "Total Activities", "Completed Activities", "% Completion"]);

    let mut table = Table::new(headers);
    for rate in rates {
        let mut cells: Vec<String> = Vec::new();
        if group_label.is_some() {
            cells.push(rate.group.clone().unwrap_or_default());
        }
        cells.extend([
            rate.activity_type.clone(),
            rate.total.to_string(),
            rate.completed.to_string(),
            fmt_pct(rate.pct),
        ]);
        table.push_row(cells);
    }
    table
}

/// Per-course daily counts, top students, hourly peaks and the cumulative
/// curve, in that order.
pub fn access_tables(trends: &AccessTrends) -> [Table; 4] {
    let mut per_day = Table::new(["Course", "Day", "Accesses"]);
    for row in &trends.per_course_day {
        per_day.push_row([
            row.course_name.clone(),
            row.day.format(DAY_FORMAT).to_string(),
            row.accesses.to_string(),
        ]);
    }

    let mut top = Table::new(["Student", "Accesses"]);
    for row in &trends.top_students {
        top.push_row([row.student.display_name.clone(), row.accesses.to_string()]);
    }

    let mut per_hour = Table::new(["Hour", "Accesses"]);
    for row in &trends.per_hour {
        per_hour.push_row([row.hour.to_string(), row.accesses.to_string()]);
    }

    [per_day, top, per_hour, cumulative_table(&trends.cumulative)]
}

pub fn cumulative_table(curve: &[CumulativeCount]) -> Table {
    let mut table = Table::new(["Day", "Accesses", "Cumulative Accesses"]);
    for row in curve {
        table.push_row([
            row.day.format(DAY_FORMAT).to_string(),
            row.accesses.to_string(),
            row.cumulative.to_string(),
        ]);
    }
    table
}

/// Two-column count listing, such as students per state or per cohort.
pub fn count_table(group_label: &str, count_label: &str, rows: &[(String, usize)]) -> Table {
    let mut table = Table::new([group_label, count_label]);
    for (group, count) in rows {
        table.push_row([group.clone(), count.to_string()]);
    }
    table
}

/// Access shares; `subgroup_label` adds a column for the second grouping
/// level when the rows carry one.
pub fn access_share_table(
    group_label: &str,
    subgroup_label: Option<&str>,
    rows: &[AccessShare],
) -> Table {
    let mut headers = vec![group_label];
    headers.extend(subgroup_label);
    headers.extend([
        "Accessed",
        "Never Accessed",
        "Total",
        "% Accessed",
        "% Never Accessed",
    ]);

    let mut table = Table::new(headers);
    for row in rows {
        let mut cells = vec![row.group.clone()];
        if subgroup_label.is_some() {
            cells.push(row.subgroup.clone().unwrap_or_default());
        }
        cells.extend([
            row.accessed.to_string(),
            row.never_accessed.to_string(),
            row.total.to_string(),
            fmt_pct(row.accessed_pct),
            fmt_pct(row.never_accessed_pct),
        ]);
        table.push_row(cells);
    }
    table
}

pub fn cohort_member_table(members: &[&CohortMember]) -> Table {
    let mut table = Table::new(["Name", "City", "Cohort", "State", "Access", "Last Access"]);
    for member in members {
        table.push_row([
            member.name.clone(),
            member.city.clone(),
            member.cohort_id.clone(),
            member.state.clone(),
            if member.accessed { "Accessed" } else { "Never accessed" }.to_string(),
            member
                .last_access
                .map(|at| at.format("%d/%m/%Y %H:%M").to_string())
                .unwrap_or_default(),
        ]);
    }
    table
}

pub fn build_presence_report(matrix: &PresenceMatrix) -> String {
    let stats = matrix.stats();
    let mut output = String::new();

    let _ = writeln!(output, "# Presence Report");
    let _ = writeln!(output, "Course {} ({})", matrix.course, matrix.window);
    let _ = writeln!(output);
    let _ = writeln!(output, "- Students: {}", stats.students);
    let _ = writeln!(output, "- Class days: {}", stats.class_days);
    let _ = writeln!(output, "- Presences: {}", stats.presences);
    let _ = writeln!(output, "- Absences: {}", stats.absences);
    let _ = writeln!(output, "- Mean frequency: {}", fmt_pct(stats.mean_frequency));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Lowest Frequency");

    let mut rows: Vec<_> = matrix.rows.iter().collect();
    rows.sort_by(|a, b| {
        a.frequency
            .unwrap_or(0.0)
            .partial_cmp(&b.frequency.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.student.cmp(&b.student))
    });

    if rows.is_empty() {
        let _ = writeln!(output, "No students in this course.");
    } else {
        for row in rows.iter().take(10) {
            let _ = writeln!(
                output,
                "- {}: {} present, {} absent ({})",
                row.student.display_name,
                row.present,
                row.absent,
                fmt_pct(row.frequency)
            );
        }
    }

    output
}

pub fn build_certification_report(
    course_label: &str,
    region_label: &str,
    progress: &[StudentProgress],
    summary: &CompletionSummary,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Certification Report");
    let _ = writeln!(output, "Class {course_label} - Region {region_label}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Eligible Students");

    let eligible: Vec<&StudentProgress> = progress.iter().filter(|p| p.eligibility.eligible).collect();
    if eligible.is_empty() {
        let _ = writeln!(output, "No student meets both requirements yet.");
    } else {
        for student in eligible {
            let _ = writeln!(
                output,
                "- {} with {}",
                student.display_name,
                fmt_hours(student.eligibility.attendance_hours)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Missing Requirements");
    let pending: Vec<&StudentProgress> = progress.iter().filter(|p| !p.eligibility.eligible).collect();
    if pending.is_empty() {
        let _ = writeln!(output, "Every student is eligible.");
    } else {
        for student in pending {
            let eligibility = &student.eligibility;
            let mut missing = Vec::new();
            if !eligibility.hours_met {
                missing.push(format!(
                    "{} below the {} minimum",
                    fmt_hours(eligibility.hour_threshold - eligibility.attendance_hours),
                    fmt_hours(eligibility.hour_threshold)
                ));
            }
            if !eligibility.mandatory_met {
                missing.push(format!("no {} submitted", eligibility.mandatory_category));
            }
            let _ = writeln!(output, "- {}: {}", student.display_name, missing.join("; "));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Unrecognized Activities");
    if summary.unrecognized.is_empty() {
        let _ = writeln!(output, "Every submitted activity was classified.");
    } else {
        for name in &summary.unrecognized {
            let _ = writeln!(output, "- {name}");
        }
    }

    output
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

use cohort_attendance::cohorts::{cohort_cumulative, cohort_sizes, search_by_name, RosterFilter};
use cohort_attendance::models::{CohortMember, Region};
use cohort_attendance::modules::{RateGrouping, StateFilter};
use cohort_attendance::report;
use cohort_attendance::status::GroupBy;
use cohort_attendance::{DateWindow, Engine, EngineConfig, FilterConfig, Table};

#[derive(Parser)]
#[command(name = "cohort-attendance")]
#[command(about = "Attendance, completion and certification rollups over course exports", long_about = None)]
struct Cli {
    /// TOML rule file; the built-in rules are used when omitted
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PresenceView {
    Matrix,
    Summary,
    Daily,
}

#[derive(Clone, Copy, ValueEnum)]
enum CertificationView {
    Completion,
    Details,
    Progress,
    Overview,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusBy {
    Region,
    Course,
}

#[derive(Clone, Copy, ValueEnum)]
enum RatesBy {
    Type,
    Class,
    Region,
}

#[derive(Clone, Copy, ValueEnum)]
enum CohortView {
    States,
    Cities,
    AccessByState,
    AccessByCohort,
    Detail,
    NeverAccessed,
    Sizes,
    Search,
    Cumulative,
}

#[derive(Clone, Copy, ValueEnum)]
enum AccessFilter {
    Accessed,
    Never,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the presence matrix of a course
    Presence {
        #[arg(long)]
        accesses: PathBuf,
        #[arg(long)]
        course: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Show one student's day-by-day presence
        #[arg(long)]
        student: Option<String>,
        #[arg(long = "region")]
        regions: Vec<String>,
        /// Enrollment export used to list students who never accessed the course
        #[arg(long, requires = "courses")]
        enrollments: Option<PathBuf>,
        /// Course export resolving the enrollment rows; only used with --enrollments
        #[arg(long, requires = "enrollments")]
        courses: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = PresenceView::Matrix)]
        view: PresenceView,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write a markdown summary
        #[arg(long)]
        markdown: Option<PathBuf>,
    },
    /// Activity completion and certification eligibility
    #[command(group(
        ArgGroup::new("format")
            .args(["json", "markdown"])
            .multiple(false)
    ))]
    Certification {
        #[arg(long)]
        submissions: PathBuf,
        #[arg(long)]
        courses: PathBuf,
        #[arg(long)]
        course: String,
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = CertificationView::Completion)]
        view: CertificationView,
        /// Print eligibility results as JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Write the markdown certification report instead of a table
        #[arg(long)]
        markdown: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Access counts per course and day, top students, peak hours
    AccessTrends {
        #[arg(long)]
        accesses: PathBuf,
        #[arg(long = "course")]
        courses: Vec<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long = "region")]
        regions: Vec<String>,
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Directory receiving one CSV per table; stdout when omitted
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Active, inactive and never-accessed students
    AccessStatus {
        #[arg(long)]
        courses: PathBuf,
        #[arg(long)]
        enrollments: PathBuf,
        #[arg(long)]
        users: PathBuf,
        #[arg(long = "region")]
        regions: Vec<String>,
        #[arg(long, value_enum, default_value_t = StatusBy::Region)]
        by: StatusBy,
        /// Reference date for inactivity, today when omitted
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Overrides the configured inactivity threshold
        #[arg(long)]
        inactive_after_days: Option<u32>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Modules with the fewest completers
    Modules {
        #[arg(long)]
        completions: PathBuf,
        #[arg(long)]
        courses: PathBuf,
        #[arg(long = "region")]
        regions: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// List every module instead of the lowest ones
        #[arg(long)]
        all: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Completion rates of classified activities
    CompletionRates {
        #[arg(long)]
        states: PathBuf,
        #[arg(long, value_enum, default_value_t = RatesBy::Type)]
        by: RatesBy,
        #[arg(long = "class")]
        classes: Vec<String>,
        #[arg(long = "activity-type")]
        activity_types: Vec<String>,
        #[arg(long = "region")]
        regions: Vec<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Access of the cohort roster by state, city and cohort
    Cohorts {
        #[arg(long)]
        roster: PathBuf,
        #[arg(long, value_enum, default_value_t = CohortView::States)]
        view: CohortView,
        #[arg(long = "state")]
        states: Vec<String>,
        #[arg(long = "city")]
        cities: Vec<String>,
        #[arg(long, value_enum)]
        access: Option<AccessFilter>,
        /// Cohort whose cumulative access curve is shown
        #[arg(long)]
        cohort: Option<String>,
        /// Name fragment for --view search
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Module hours and the minimum to complete for a region
    #[command(group(
        ArgGroup::new("target")
            .args(["region", "course"])
            .required(true)
    ))]
    ModuleHours {
        #[arg(long)]
        region: Option<String>,
        /// Course name the region is read from
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write the built-in rules to a TOML file
    InitConfig {
        #[arg(long, default_value = "cohort-attendance.toml")]
        out: String,
        #[arg(long)]
        force: bool,
    },
}

fn load_table(path: &Path) -> anyhow::Result<Table> {
    Table::from_csv_path(path).with_context(|| format!("failed to read {}", path.display()))
}

fn emit(table: &Table, out: Option<&Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            table.write_csv(file)?;
            log::info!("{} rows written to {}", table.len(), path.display());
        }
        None => table.write_csv(std::io::stdout().lock())?,
    }
    Ok(())
}

/// The one value of a filter that must name exactly one state or city.
fn single<'a>(values: &'a [String], flag: &str) -> anyhow::Result<&'a str> {
    match values {
        [value] => Ok(value.as_str()),
        _ => anyhow::bail!("this view needs exactly one {flag}"),
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("failed to load rules from {path}")),
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Commands::AccessStatus {
        inactive_after_days: Some(days),
        ..
    } = &cli.command
    {
        config.inactivity.inactive_after_days = Some(*days);
    }
    let engine = Engine::new(config).context("invalid rule configuration")?;

    match cli.command {
        Commands::Presence {
            accesses,
            course,
            from,
            to,
            student,
            regions,
            enrollments,
            courses,
            view,
            out,
            markdown,
        } => {
            let mut filter = FilterConfig::for_course(course)
                .with_window(DateWindow::new(from, to))
                .with_regions(regions);
            if let Some(student) = student {
                filter = filter.with_student(student);
            }

            let roster = match (enrollments, courses) {
                (Some(enrollments), Some(courses)) => engine.roster(
                    &load_table(&enrollments)?,
                    &load_table(&courses)?,
                    &filter,
                )?,
                _ => Vec::new(),
            };
            let presence = engine.presence(&load_table(&accesses)?, &roster, &filter)?;

            let table = match (&filter.student, view) {
                (Some(student), _) => report::individual_presence_table(&presence.matrix, student)
                    .with_context(|| format!("student {student} has no presence row"))?,
                (None, PresenceView::Matrix) => report::presence_table(&presence.matrix),
                (None, PresenceView::Summary) => report::course_summary_table(&presence.matrix),
                (None, PresenceView::Daily) => report::daily_presence_table(&presence.matrix),
            };
            emit(&table, out.as_deref())?;

            if let Some(path) = markdown {
                std::fs::write(&path, report::build_presence_report(&presence.matrix))
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Report written to {}.", path.display());
            }
        }
        Commands::Certification {
            submissions,
            courses,
            course,
            student,
            from,
            to,
            view,
            json,
            markdown,
            out,
        } => {
            let mut filter = FilterConfig::for_course(course).with_window(DateWindow::new(from, to));
            if let Some(student) = student {
                filter = filter.with_student(student);
            }
            let certification =
                engine.certification(&load_table(&submissions)?, &load_table(&courses)?, &filter)?;

            if json {
                let payload = match &certification.student {
                    Some((_, eligibility)) => serde_json::to_string_pretty(eligibility)?,
                    None => serde_json::to_string_pretty(&certification.progress)?,
                };
                println!("{payload}");
                return Ok(());
            }

            if let Some(path) = markdown {
                let region = certification.course.region.code();
                let markdown = report::build_certification_report(
                    &certification.course.course_name,
                    engine.config().region_name(region),
                    &certification.progress,
                    &certification.summary,
                );
                std::fs::write(&path, markdown)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Report written to {}.", path.display());
                return Ok(());
            }

            let table = match view {
                CertificationView::Completion => report::completion_table(&certification.summary),
                CertificationView::Details => {
                    let (details, _) = certification
                        .student
                        .as_ref()
                        .context("--view details needs --student")?;
                    report::submission_detail_table(details)
                }
                CertificationView::Progress => report::class_progress_table(&certification.progress),
                CertificationView::Overview => report::class_overview_table(&certification.overview),
            };
            emit(&table, out.as_deref())?;
        }
        Commands::AccessTrends {
            accesses,
            courses,
            from,
            to,
            regions,
            top,
            out_dir,
        } => {
            let filter = FilterConfig::default()
                .with_window(DateWindow::new(from, to))
                .with_regions(regions);
            let trends = engine.access_trends(&load_table(&accesses)?, &courses, &filter, top)?;
            if trends.total_accesses == 0 {
                println!("No accesses found for this selection.");
                return Ok(());
            }

            let names = ["per_course_day.csv", "top_students.csv", "per_hour.csv", "cumulative.csv"];
            let tables = report::access_tables(&trends);
            match out_dir {
                Some(dir) => {
                    std::fs::create_dir_all(&dir)
                        .with_context(|| format!("failed to create {}", dir.display()))?;
                    for (name, table) in names.iter().zip(&tables) {
                        emit(table, Some(dir.join(name).as_path()))?;
                    }
                }
                None => {
                    for table in &tables {
                        emit(table, None)?;
                        println!();
                    }
                }
            }
        }
        Commands::AccessStatus {
            courses,
            enrollments,
            users,
            regions,
            by,
            as_of,
            out,
            ..
        } => {
            let filter = FilterConfig::default().with_regions(regions);
            let as_of = as_of.unwrap_or_else(|| chrono::Local::now().date_naive());
            let (group_by, label) = match by {
                StatusBy::Region => (GroupBy::Region, "Region"),
                StatusBy::Course => (GroupBy::Course, "Course"),
            };
            let status = engine.access_status(
                &load_table(&courses)?,
                &load_table(&enrollments)?,
                &load_table(&users)?,
                &filter,
                as_of,
                group_by,
            )?;

            let headline = status.headline;
            log::info!(
                "{} courses, {} enrolled students: {} active, {} inactive, {} never accessed",
                headline.courses,
                headline.enrolled_students,
                headline.active,
                headline.inactive,
                headline.never_accessed
            );
            for (region, classes) in &status.classes_per_region {
                log::info!("{}: {classes} classes", engine.config().region_name(region));
            }
            emit(&report::status_table(label, &status.breakdown), out.as_deref())?;
        }
        Commands::Modules {
            completions,
            courses,
            regions,
            limit,
            all,
            out,
        } => {
            let filter = FilterConfig::default().with_regions(regions);
            let modules =
                engine.modules(&load_table(&completions)?, &load_table(&courses)?, &filter, limit)?;
            if all {
                emit(&report::module_table(&modules.modules), out.as_deref())?;
            } else {
                emit(&report::module_table(&modules.lowest), out.as_deref())?;
                for (region, completers) in &modules.lowest_by_region {
                    log::info!("{}: {completers} completers", engine.config().region_name(region));
                }
            }
        }
        Commands::CompletionRates {
            states,
            by,
            classes,
            activity_types,
            regions,
            out,
        } => {
            let filter = StateFilter {
                classes,
                activity_types,
                regions,
            };
            let (grouping, label) = match by {
                RatesBy::Type => (RateGrouping::ActivityType, None),
                RatesBy::Class => (RateGrouping::ClassAndType, Some("Class")),
                RatesBy::Region => (RateGrouping::RegionAndType, Some("Region")),
            };
            let rates = engine.completion_rates(&load_table(&states)?, &filter, grouping)?;
            emit(&report::completion_rate_table(label, &rates), out.as_deref())?;
        }
        Commands::Cohorts {
            roster,
            view,
            states,
            cities,
            access,
            cohort,
            name,
            top,
            out,
        } => {
            let filter = RosterFilter {
                states,
                cities,
                accessed: access.map(|access| matches!(access, AccessFilter::Accessed)),
            };
            let roster = load_table(&roster)?;
            let table = match view {
                CohortView::Sizes | CohortView::Search | CohortView::Cumulative => {
                    let members = engine.cohort_members(&roster, &filter)?;
                    let selected: Vec<&CohortMember> = members.iter().collect();
                    match view {
                        CohortView::Sizes => {
                            let state = single(&filter.states, "--state")?;
                            let city = single(&filter.cities, "--city")?;
                            let sizes = cohort_sizes(&selected, state, city);
                            report::count_table("Cohort", "Students", &sizes)
                        }
                        CohortView::Search => {
                            let query = name.as_deref().context("--view search needs --name")?;
                            report::cohort_member_table(&search_by_name(&members, query))
                        }
                        _ => {
                            let state = single(&filter.states, "--state")?;
                            let city = single(&filter.cities, "--city")?;
                            let cohort = cohort.as_deref().context("--view cumulative needs --cohort")?;
                            report::cumulative_table(&cohort_cumulative(&selected, state, city, cohort))
                        }
                    }
                }
                _ => {
                    let overview = engine.cohort_overview(&roster, &filter, top)?;
                    log::info!(
                        "{} students in {} states and {} cities",
                        overview.students,
                        overview.states,
                        overview.cities
                    );
                    match view {
                        CohortView::Cities => {
                            report::count_table("City", "Students", &overview.top_cities)
                        }
                        CohortView::AccessByState => {
                            report::access_share_table("State", None, &overview.access_by_state)
                        }
                        CohortView::AccessByCohort => {
                            report::access_share_table("Cohort", None, &overview.access_by_cohort)
                        }
                        CohortView::Detail => report::access_share_table(
                            "State",
                            Some("Cohort"),
                            &overview.state_cohort_detail,
                        ),
                        CohortView::NeverAccessed => report::access_share_table(
                            "City",
                            Some("State"),
                            &overview.never_accessed_ranking,
                        ),
                        _ => report::count_table("State", "Students", &overview.by_state),
                    }
                }
            };
            emit(&table, out.as_deref())?;
        }
        Commands::ModuleHours {
            region,
            course,
            out,
        } => {
            let region = match (region, course) {
                (Some(code), _) => Region::Recognized(code.trim().to_uppercase()),
                (None, Some(course)) => engine.region_of(&course),
                (None, None) => anyhow::bail!("pass --region or --course"),
            };
            let minimums = engine.module_hours(&region);
            log::info!("module hours for {}", engine.config().region_name(region.code()));
            emit(
                &report::module_hours_table(engine.config().module_hours.minimum_share, &minimums),
                out.as_deref(),
            )?;
        }
        Commands::InitConfig { out, force } => {
            if Path::new(&out).exists() && !force {
                anyhow::bail!("{out} already exists, pass --force to overwrite it");
            }
            engine.config().save_to_file(&out)?;
            println!("Rules written to {out}.");
        }
    }

    Ok(())
}

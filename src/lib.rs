//! Attendance and completion aggregation over learning-platform exports.
//!
//! Raw access, submission and enrollment tables are normalized into typed
//! records, activity names are classified, and the records are rolled up
//! into presence matrices, completion summaries and certification verdicts.
//! Every operation is a pure function of its inputs; [`pipeline::Engine`]
//! wires the stages together for a given [`models::FilterConfig`].

pub mod access;
pub mod classify;
pub mod cohorts;
pub mod completion;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod models;
pub mod modules;
pub mod normalize;
pub mod pipeline;
pub mod presence;
pub mod report;
pub mod status;
pub mod table;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ParseError};
pub use models::{DateWindow, FilterConfig};
pub use pipeline::Engine;
pub use table::Table;

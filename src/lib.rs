//! Stroke patient data service.
//!
//! Loads the stroke dataset once, then answers filtered patient queries,
//! global statistics and chart series over HTTP.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod filters;
pub mod query;
pub mod records;
pub mod stats;
pub mod table;

pub use aggregate::{
    comorbidity_matrix, stroke_count_by_age, stroke_count_by_bmi_bucket,
    stroke_rate_by_comorbidity, stroke_rate_by_gender, stroke_scatter, ChartSummary,
};
pub use config::StrokeConfig;
pub use error::{QueryError, StrokeError};
pub use filters::{
    filter_by_age_range, filter_by_gender, filter_by_stroke, filter_patients, PatientFilter, Rows,
};
pub use query::{PatientQuery, Selection};
pub use records::{BmiCategory, Column, PatientRecord};
pub use stats::{global_statistics, GlobalStatistics};
pub use table::PatientTable;

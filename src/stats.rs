use std::collections::BTreeMap;

use polars::prelude::{DataFrame, DataType, PolarsResult};
use serde::Serialize;

use crate::aggregate::gender_groups;
use crate::records::Column;

/// Headline numbers shown on the statistics page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStatistics {
    pub total_patients: usize,
    pub stroke_true: usize,
    pub stroke_false: usize,
    /// Patients per gender, grouped case-insensitively like the gender filter.
    pub gender_distribution: BTreeMap<String, usize>,
    pub average_age: f64,
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Mean age rounded to 2 decimals, 0 for no patients.
pub fn average_age(frame: &DataFrame) -> PolarsResult<f64> {
    let mean = frame.column(Column::Age.name())?.mean();
    Ok(mean.map_or(0.0, |mean| round_to(mean, 2)))
}

/// Statistics over `frame`. Stroke flags are 0 or 1, which the table guarantees.
pub fn global_statistics(frame: &DataFrame) -> PolarsResult<GlobalStatistics> {
    let total_patients = frame.height();
    let stroke_true = frame
        .column(Column::Stroke.name())?
        .cast(&DataType::Int64)?
        .i64()?
        .into_iter()
        .flatten()
        .filter(|&stroke| stroke == 1)
        .count();
    let gender_distribution = gender_groups(frame)?
        .into_iter()
        .map(|(gender, (_, patients))| (gender, patients))
        .collect();

    Ok(GlobalStatistics {
        total_patients,
        stroke_true,
        stroke_false: total_patients - stroke_true,
        gender_distribution,
        average_age: average_age(frame)?,
    })
}

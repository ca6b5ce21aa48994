use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Columns of the stroke dataset, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Id,
    Gender,
    Age,
    Hypertension,
    HeartDisease,
    EverMarried,
    WorkType,
    ResidenceType,
    AvgGlucoseLevel,
    Bmi,
    SmokingStatus,
    Stroke,
}

lazy_static! {
    static ref COLUMNS_BY_NAME: HashMap<&'static str, Column> =
        Column::ALL.iter().map(|column| (column.name(), *column)).collect();
}

impl Column {
    pub const ALL: [Column; 12] = [
        Column::Id,
        Column::Gender,
        Column::Age,
        Column::Hypertension,
        Column::HeartDisease,
        Column::EverMarried,
        Column::WorkType,
        Column::ResidenceType,
        Column::AvgGlucoseLevel,
        Column::Bmi,
        Column::SmokingStatus,
        Column::Stroke,
    ];

    /// Header name as it appears in the data files.
    pub fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Gender => "gender",
            Column::Age => "age",
            Column::Hypertension => "hypertension",
            Column::HeartDisease => "heart_disease",
            Column::EverMarried => "ever_married",
            Column::WorkType => "work_type",
            Column::ResidenceType => "Residence_type",
            Column::AvgGlucoseLevel => "avg_glucose_level",
            Column::Bmi => "bmi",
            Column::SmokingStatus => "smoking_status",
            Column::Stroke => "stroke",
        }
    }

    pub fn from_name(name: &str) -> Option<Column> {
        COLUMNS_BY_NAME.get(name).copied()
    }

    pub fn description(self) -> &'static str {
        match self {
            Column::Id => "Unique patient identifier",
            Column::Gender => "Patient gender (Male, Female, Other)",
            Column::Age => "Age in years",
            Column::Hypertension => "1 = hypertension, 0 = none",
            Column::HeartDisease => "1 = heart disease, 0 = none",
            Column::EverMarried => "Ever married (Yes / No)",
            Column::WorkType => "Type of employment",
            Column::ResidenceType => "Urban or rural residence",
            Column::AvgGlucoseLevel => "Average blood glucose level",
            Column::Bmi => "Body mass index",
            Column::SmokingStatus => "Smoking habits",
            Column::Stroke => "1 = stroke, 0 = none",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the stroke dataset.
///
/// Every column but `id` may be absent from a data file; absent or unparsable
/// values fall back to `None` (or 0 for the flags and age). The raw CSV export
/// writes `N/A` for unknown BMI, which `csv::invalid_option` turns into `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientRecord {
    pub id: i64,
    pub gender: Option<String>,
    pub age: f64,
    pub hypertension: u8,
    pub heart_disease: u8,
    pub ever_married: Option<String>,
    pub work_type: Option<String>,
    #[serde(rename = "Residence_type")]
    pub residence_type: Option<String>,
    pub avg_glucose_level: Option<f64>,
    pub bmi: Option<f64>,
    pub smoking_status: Option<String>,
    pub stroke: u8,
}

impl PatientRecord {
    /// A record with only the identifier set.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            gender: None,
            age: 0.0,
            hypertension: 0,
            heart_disease: 0,
            ever_married: None,
            work_type: None,
            residence_type: None,
            avg_glucose_level: None,
            bmi: None,
            smoking_status: None,
            stroke: 0,
        }
    }

    /// The 0/1 indicator columns with their values.
    pub fn flags(&self) -> [(Column, u8); 3] {
        [
            (Column::Hypertension, self.hypertension),
            (Column::HeartDisease, self.heart_disease),
            (Column::Stroke, self.stroke),
        ]
    }
}

pub const UNKNOWN: &str = "Unknown";

/// Folds a stored gender onto one spelling: "male", "MALE" and "Male" all
/// become "Male". Missing or blank values become "Unknown".
pub fn canonical_gender(raw: Option<&str>) -> String {
    let trimmed = match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return UNKNOWN.to_string(),
    };
    let lower = trimmed.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => UNKNOWN.to_string(),
    }
}

/// Smoking status as grouped on the charts. Missing or blank values become "Unknown".
pub fn smoking_label(raw: Option<&str>) -> String {
    match raw {
        Some(status) if !status.trim().is_empty() => status.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Body mass index bands, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BmiCategory {
    #[serde(rename = "Maigreur")]
    Underweight,
    #[serde(rename = "Normal")]
    Normal,
    #[serde(rename = "Surpoids")]
    Overweight,
    #[serde(rename = "Obésité modérée")]
    ModerateObesity,
    #[serde(rename = "Obésité sévère")]
    SevereObesity,
}

impl BmiCategory {
    pub fn classify(bmi: f64) -> Self {
        if bmi < 18.5 {
            BmiCategory::Underweight
        } else if bmi < 25.0 {
            BmiCategory::Normal
        } else if bmi < 30.0 {
            BmiCategory::Overweight
        } else if bmi < 35.0 {
            BmiCategory::ModerateObesity
        } else {
            BmiCategory::SevereObesity
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BmiCategory::Underweight => "Maigreur",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Surpoids",
            BmiCategory::ModerateObesity => "Obésité modérée",
            BmiCategory::SevereObesity => "Obésité sévère",
        }
    }
}

/// Entry of the data dictionary served to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct VariableDescription {
    pub name: &'static str,
    pub description: &'static str,
}

pub fn variable_descriptions() -> Vec<VariableDescription> {
    Column::ALL
        .iter()
        .map(|column| VariableDescription {
            name: column.name(),
            description: column.description(),
        })
        .collect()
}

//! Grouped counts and rates behind the dashboard charts.
//!
//! Every reducer takes a frame of patients with the full dataset schema,
//! usually the output of [`crate::filters::Rows::frame`], and groups it with
//! polars. Only [`stroke_rate_by_comorbidity`] depends on row order: its output
//! follows first occurrence.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use polars::prelude::{
    col, count, lit, DataFrame, DataType, IntoLazy, LazyFrame, PolarsResult, SortOptions,
};
use serde::Serialize;

use crate::records::{canonical_gender, smoking_label, BmiCategory, Column};

const STROKES: &str = "strokes";
const PATIENTS: &str = "patients";

fn percent(strokes: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        strokes as f64 / total as f64 * 100.0
    }
}

fn stroke_patients(frame: &DataFrame) -> LazyFrame {
    frame
        .clone()
        .lazy()
        .filter(col(Column::Stroke.name()).eq(lit(1)))
}

fn counts(df: &DataFrame, name: &str) -> PolarsResult<Vec<usize>> {
    let values = df
        .column(name)?
        .cast(&DataType::Int64)?
        .i64()?
        .into_iter()
        .map(|value| value.and_then(|v| usize::try_from(v).ok()).unwrap_or(0))
        .collect();
    Ok(values)
}

/// (strokes, patients) per canonical gender label.
pub(crate) fn gender_groups(frame: &DataFrame) -> PolarsResult<BTreeMap<String, (usize, usize)>> {
    let gender = Column::Gender.name();
    let groups = frame
        .clone()
        .lazy()
        .groupby_stable([col(gender).str().to_lowercase().alias(gender)])
        .agg([
            col(Column::Stroke.name()).sum().alias(STROKES),
            count().alias(PATIENTS),
        ])
        .collect()?;

    let strokes = counts(&groups, STROKES)?;
    let patients = counts(&groups, PATIENTS)?;
    let mut merged: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    // " male" and "male" are separate polars groups but one label
    for ((label, strokes), patients) in groups
        .column(gender)?
        .utf8()?
        .into_iter()
        .zip(strokes)
        .zip(patients)
    {
        let entry = merged.entry(canonical_gender(label)).or_default();
        entry.0 += strokes;
        entry.1 += patients;
    }
    Ok(merged)
}

/// Stroke rate (percent) per gender. Missing genders fall in "Unknown".
pub fn stroke_rate_by_gender(frame: &DataFrame) -> PolarsResult<BTreeMap<String, f64>> {
    let rates = gender_groups(frame)?
        .into_iter()
        .map(|(gender, (strokes, total))| (gender, percent(strokes, total)))
        .collect();
    Ok(rates)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeCount {
    pub age: f64,
    pub count: usize,
}

/// Number of strokes per exact age, youngest first. Rows without a stroke are ignored.
pub fn stroke_count_by_age(frame: &DataFrame) -> PolarsResult<Vec<AgeCount>> {
    let age = Column::Age.name();
    let groups = stroke_patients(frame)
        .groupby([col(age)])
        .agg([count().alias(PATIENTS)])
        .sort(age, SortOptions::default())
        .collect()?;

    let ages = groups
        .column(age)?
        .f64()?
        .into_iter()
        .zip(counts(&groups, PATIENTS)?)
        .map(|(age, count)| AgeCount {
            age: age.unwrap_or(0.0),
            count,
        })
        .collect();
    Ok(ages)
}

/// Number of strokes per BMI band. A missing BMI counts as 0.
pub fn stroke_count_by_bmi_bucket(frame: &DataFrame) -> PolarsResult<BTreeMap<BmiCategory, usize>> {
    let bmi = Column::Bmi.name();
    let strokes = stroke_patients(frame)
        .select([col(bmi).fill_null(lit(0.0))])
        .collect()?;

    let mut buckets: BTreeMap<BmiCategory, usize> = BTreeMap::new();
    for value in strokes.column(bmi)?.f64()? {
        *buckets
            .entry(BmiCategory::classify(value.unwrap_or(0.0)))
            .or_default() += 1;
    }
    Ok(buckets)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComorbidityRate {
    pub heart_disease: u8,
    pub smoking_status: String,
    pub stroke_rate: f64,
}

/// Stroke rate per (heart disease, smoking status) pair, in order of first appearance.
pub fn stroke_rate_by_comorbidity(frame: &DataFrame) -> PolarsResult<Vec<ComorbidityRate>> {
    let heart_disease = Column::HeartDisease.name();
    let smoking = Column::SmokingStatus.name();
    let groups = frame
        .clone()
        .lazy()
        .groupby_stable([col(heart_disease), col(smoking)])
        .agg([
            col(Column::Stroke.name()).sum().alias(STROKES),
            count().alias(PATIENTS),
        ])
        .collect()?;

    let flags = counts(&groups, heart_disease)?;
    let statuses = groups.column(smoking)?.utf8()?;
    let strokes = counts(&groups, STROKES)?;
    let patients = counts(&groups, PATIENTS)?;

    // missing and blank statuses are separate polars groups but share the
    // "Unknown" label, which keeps the slot of the first one seen
    let mut index: HashMap<(u8, String), usize> = HashMap::new();
    let mut merged: Vec<((u8, String), usize, usize)> = Vec::new();
    for (((flag, status), strokes), patients) in flags
        .into_iter()
        .zip(statuses.into_iter())
        .zip(strokes)
        .zip(patients)
    {
        let key = (u8::from(flag == 1), smoking_label(status));
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            merged.push((key, 0, 0));
            merged.len() - 1
        });
        let (_, group_strokes, group_patients) = &mut merged[slot];
        *group_strokes += strokes;
        *group_patients += patients;
    }

    let rates = merged
        .into_iter()
        .map(|((heart_disease, smoking_status), strokes, total)| ComorbidityRate {
            heart_disease,
            smoking_status,
            stroke_rate: percent(strokes, total),
        })
        .collect();
    Ok(rates)
}

/// Heatmap layout of comorbidity rates: one row per heart disease flag (0 then 1),
/// one column per smoking status in lexical order. Missing pairs are 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComorbidityMatrix {
    pub heart_disease: Vec<u8>,
    pub smoking_statuses: Vec<String>,
    pub rates: Vec<Vec<f64>>,
}

pub fn comorbidity_matrix(rates: &[ComorbidityRate]) -> ComorbidityMatrix {
    let smoking_statuses: Vec<String> = rates
        .iter()
        .map(|rate| rate.smoking_status.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let heart_disease = vec![0, 1];
    let cells = heart_disease
        .iter()
        .map(|&flag| {
            smoking_statuses
                .iter()
                .map(|status| {
                    rates
                        .iter()
                        .find(|rate| rate.heart_disease == flag && &rate.smoking_status == status)
                        .map_or(0.0, |rate| rate.stroke_rate)
                })
                .collect()
        })
        .collect();
    ComorbidityMatrix {
        heart_disease,
        smoking_statuses,
        rates: cells,
    }
}

/// A stroke patient on the BMI against age scatter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub id: i64,
    pub age: f64,
    pub bmi: Option<f64>,
    pub gender: String,
}

pub fn stroke_scatter(frame: &DataFrame) -> PolarsResult<Vec<ScatterPoint>> {
    let strokes = stroke_patients(frame)
        .select([
            col(Column::Id.name()),
            col(Column::Age.name()),
            col(Column::Bmi.name()),
            col(Column::Gender.name()),
        ])
        .collect()?;

    let ids = strokes.column(Column::Id.name())?.i64()?;
    let ages = strokes.column(Column::Age.name())?.f64()?;
    let bmis = strokes.column(Column::Bmi.name())?.f64()?;
    let genders = strokes.column(Column::Gender.name())?.utf8()?;
    let points = ids
        .into_iter()
        .zip(ages)
        .zip(bmis)
        .zip(genders)
        .filter_map(|(((id, age), bmi), gender)| {
            Some(ScatterPoint {
                id: id?,
                age: age.unwrap_or(0.0),
                bmi,
                gender: canonical_gender(gender),
            })
        })
        .collect();
    Ok(points)
}

/// Every chart series for one filtered set of patients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSummary {
    pub patients: usize,
    pub stroke_rate_by_gender: BTreeMap<String, f64>,
    pub stroke_count_by_age: Vec<AgeCount>,
    pub stroke_count_by_bmi: BTreeMap<BmiCategory, usize>,
    pub stroke_rate_by_comorbidity: Vec<ComorbidityRate>,
    pub comorbidity_matrix: ComorbidityMatrix,
    pub stroke_scatter: Vec<ScatterPoint>,
}

impl ChartSummary {
    pub fn from_frame(frame: &DataFrame) -> PolarsResult<Self> {
        let comorbidity = stroke_rate_by_comorbidity(frame)?;
        Ok(Self {
            patients: frame.height(),
            stroke_rate_by_gender: stroke_rate_by_gender(frame)?,
            stroke_count_by_age: stroke_count_by_age(frame)?,
            stroke_count_by_bmi: stroke_count_by_bmi_bucket(frame)?,
            comorbidity_matrix: comorbidity_matrix(&comorbidity),
            stroke_rate_by_comorbidity: comorbidity,
            stroke_scatter: stroke_scatter(frame)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::PatientRecord;
    use crate::table::PatientTable;

    fn patient(id: i64, gender: Option<&str>, age: f64, stroke: u8) -> PatientRecord {
        PatientRecord {
            gender: gender.map(str::to_string),
            age,
            stroke,
            ..PatientRecord::new(id)
        }
    }

    fn comorbid(id: i64, heart_disease: u8, smoking: Option<&str>, stroke: u8) -> PatientRecord {
        PatientRecord {
            heart_disease,
            smoking_status: smoking.map(str::to_string),
            stroke,
            ..PatientRecord::new(id)
        }
    }

    fn frame(rows: Vec<PatientRecord>) -> DataFrame {
        PatientTable::from_records(rows).unwrap().frame().clone()
    }

    #[test]
    fn gender_rates_reconcile_with_overall_rate() {
        let rows = vec![
            patient(1, Some("Male"), 45.0, 1),
            patient(2, Some("Male"), 50.0, 0),
            patient(3, Some("Male"), 61.0, 0),
            patient(4, Some("Female"), 70.0, 1),
            patient(5, Some("female"), 30.0, 0),
            patient(6, None, 52.0, 1),
        ];
        let frame = frame(rows);
        let rates = stroke_rate_by_gender(&frame).unwrap();

        assert_eq!(rates.len(), 3);
        assert!((rates["Male"] - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(rates["Female"], 50.0);
        assert_eq!(rates["Unknown"], 100.0);

        let groups = gender_groups(&frame).unwrap();
        let weighted: f64 = rates
            .iter()
            .map(|(gender, rate)| rate * groups[gender].1 as f64)
            .sum::<f64>()
            / frame.height() as f64;
        assert!((weighted - 50.0).abs() < 1e-9);
    }

    #[test]
    fn padded_genders_share_a_label() {
        let frame = frame(vec![
            patient(1, Some(" male"), 45.0, 1),
            patient(2, Some("MALE"), 50.0, 0),
            patient(3, Some(""), 61.0, 0),
        ]);
        let groups = gender_groups(&frame).unwrap();
        assert_eq!(groups["Male"], (1, 2));
        assert_eq!(groups["Unknown"], (0, 1));
    }

    #[test]
    fn age_counts_only_strokes() {
        let frame = frame(vec![
            patient(1, None, 67.0, 1),
            patient(2, None, 67.0, 1),
            patient(3, None, 1.32, 1),
            patient(4, None, 80.0, 0),
        ]);
        let counts = stroke_count_by_age(&frame).unwrap();
        assert_eq!(
            counts,
            vec![
                AgeCount { age: 1.32, count: 1 },
                AgeCount { age: 67.0, count: 2 },
            ]
        );
    }

    #[test]
    fn bmi_buckets_count_strokes_with_missing_as_zero() {
        let mut rows = vec![
            patient(1, None, 45.0, 1),
            patient(2, None, 70.0, 0),
            patient(3, None, 60.0, 1),
            patient(4, None, 55.0, 1),
        ];
        rows[1].bmi = Some(32.0);
        rows[2].bmi = Some(22.0);
        rows[3].bmi = Some(36.6);

        let counts = stroke_count_by_bmi_bucket(&frame(rows)).unwrap();
        assert_eq!(counts.len(), 3);
        assert_eq!(counts[&BmiCategory::Underweight], 1);
        assert_eq!(counts[&BmiCategory::Normal], 1);
        assert_eq!(counts[&BmiCategory::SevereObesity], 1);
        assert!(!counts.contains_key(&BmiCategory::ModerateObesity));

        let json = serde_json::to_value(&counts).unwrap();
        assert_eq!(json["Maigreur"], 1);
        assert_eq!(json["Obésité sévère"], 1);
    }

    #[test]
    fn comorbidity_groups_follow_first_occurrence() {
        let frame = frame(vec![
            comorbid(1, 1, Some("smokes"), 1),
            comorbid(2, 0, Some("never smoked"), 0),
            comorbid(3, 1, Some("smokes"), 0),
            comorbid(4, 0, None, 1),
            comorbid(5, 0, Some("never smoked"), 1),
            comorbid(6, 0, Some(" "), 0),
        ]);
        let rates = stroke_rate_by_comorbidity(&frame).unwrap();
        assert_eq!(
            rates,
            vec![
                ComorbidityRate {
                    heart_disease: 1,
                    smoking_status: "smokes".into(),
                    stroke_rate: 50.0,
                },
                ComorbidityRate {
                    heart_disease: 0,
                    smoking_status: "never smoked".into(),
                    stroke_rate: 50.0,
                },
                ComorbidityRate {
                    heart_disease: 0,
                    smoking_status: "Unknown".into(),
                    stroke_rate: 50.0,
                },
            ]
        );
    }

    #[test]
    fn matrix_fills_absent_pairs_with_zero() {
        let frame = frame(vec![
            comorbid(1, 1, Some("smokes"), 1),
            comorbid(2, 0, Some("never smoked"), 0),
            comorbid(3, 0, Some("never smoked"), 1),
        ]);
        let matrix = comorbidity_matrix(&stroke_rate_by_comorbidity(&frame).unwrap());
        assert_eq!(matrix.heart_disease, vec![0, 1]);
        assert_eq!(matrix.smoking_statuses, vec!["never smoked", "smokes"]);
        assert_eq!(matrix.rates, vec![vec![50.0, 0.0], vec![0.0, 100.0]]);
    }

    #[test]
    fn aggregates_of_nothing_are_empty() {
        let summary = ChartSummary::from_frame(&frame(Vec::new())).unwrap();
        assert_eq!(summary.patients, 0);
        assert!(summary.stroke_rate_by_gender.is_empty());
        assert!(summary.stroke_count_by_age.is_empty());
        assert!(summary.stroke_count_by_bmi.is_empty());
        assert!(summary.stroke_rate_by_comorbidity.is_empty());
        assert!(summary.comorbidity_matrix.smoking_statuses.is_empty());
        assert_eq!(summary.comorbidity_matrix.rates, vec![Vec::<f64>::new(); 2]);
    }

    #[test]
    fn scatter_keeps_stroke_patients() {
        let mut rows = vec![patient(1, Some("male"), 45.0, 1), patient(2, None, 70.0, 0)];
        rows[0].bmi = Some(28.1);
        let points = stroke_scatter(&frame(rows)).unwrap();
        assert_eq!(
            points,
            vec![ScatterPoint {
                id: 1,
                age: 45.0,
                bmi: Some(28.1),
                gender: "Male".into(),
            }]
        );
    }
}

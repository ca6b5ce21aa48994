//! Row predicates and the filter pipeline built on them.
//!
//! Each predicate adds a polars expression to a lazy [`Rows`] view of the
//! table. Nothing is evaluated until the view is collected, and a predicate on
//! a column the table does not carry leaves the view untouched.

use polars::prelude::{col, lit, DataFrame, DataType, Expr, IntoLazy, LazyFrame, PolarsResult};

use crate::error::QueryError;
use crate::records::{Column, PatientRecord};
use crate::table::PatientTable;

/// Gender values the dashboard sends to mean "no gender filter".
const ALL_GENDERS: [&str; 2] = ["all", "tous"];

const ROW_NR: &str = "row_nr";

/// Filtered view of a [`PatientTable`], in table order.
#[derive(Debug, Clone)]
pub struct Rows<'a> {
    table: &'a PatientTable,
    predicate: Option<Expr>,
}

impl<'a> Rows<'a> {
    pub fn new(table: &'a PatientTable) -> Self {
        Self {
            table,
            predicate: None,
        }
    }

    fn lazy(&self) -> LazyFrame {
        let rows = self.table.frame().clone().lazy();
        match &self.predicate {
            Some(predicate) => rows.filter(predicate.clone()),
            None => rows,
        }
    }

    /// The kept rows with every table column.
    pub fn frame(&self) -> PolarsResult<DataFrame> {
        self.lazy().collect()
    }

    /// Positions of the kept rows in the table.
    pub fn positions(&self) -> PolarsResult<Vec<usize>> {
        let rows = self.table.frame().clone().lazy().with_row_count(ROW_NR, None);
        let rows = match &self.predicate {
            Some(predicate) => rows.filter(predicate.clone()),
            None => rows,
        };
        let df = rows.select([col(ROW_NR)]).collect()?;
        let positions = df
            .column(ROW_NR)?
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .flatten()
            .filter_map(|position| usize::try_from(position).ok())
            .collect();
        Ok(positions)
    }

    pub fn to_records(&self) -> PolarsResult<Vec<PatientRecord>> {
        let positions = self.positions()?;
        Ok(self.table.rows(&positions).cloned().collect())
    }

    fn and(mut self, column: Column, predicate: Expr) -> Self {
        if self.table.has_column(column) {
            self.predicate = Some(match self.predicate.take() {
                Some(current) => current.and(predicate),
                None => predicate,
            });
        }
        self
    }
}

pub fn filter_by_stroke(rows: Rows<'_>, stroke: u8) -> Rows<'_> {
    rows.and(
        Column::Stroke,
        col(Column::Stroke.name()).eq(lit(i32::from(stroke))),
    )
}

/// Case-insensitive match. Records without a gender never match.
pub fn filter_by_gender<'a>(rows: Rows<'a>, gender: &str) -> Rows<'a> {
    rows.and(
        Column::Gender,
        col(Column::Gender.name())
            .str()
            .to_lowercase()
            .eq(lit(gender.to_lowercase())),
    )
}

/// Keeps `min_age <= age <= max_age`.
pub fn filter_by_age_range(rows: Rows<'_>, min_age: f64, max_age: f64) -> Rows<'_> {
    let age = col(Column::Age.name());
    rows.and(
        Column::Age,
        age.clone().gt_eq(lit(min_age)).and(age.lt_eq(lit(max_age))),
    )
}

/// Validates a stroke flag coming from outside the crate.
pub fn parse_stroke_flag(value: i64) -> Result<u8, QueryError> {
    match value {
        0 => Ok(0),
        1 => Ok(1),
        _ => Err(QueryError::InvalidStroke { value }),
    }
}

/// Optional criteria of a patient query. Unset criteria do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientFilter {
    pub gender: Option<String>,
    pub stroke: Option<u8>,
    pub min_age: Option<f64>,
    pub max_age: Option<f64>,
}

impl PatientFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gender criterion. Blank values and the "all" sentinel clear it.
    pub fn gender(mut self, gender: impl Into<String>) -> Self {
        let gender = gender.into();
        let trimmed = gender.trim();
        self.gender = if trimmed.is_empty()
            || ALL_GENDERS
                .iter()
                .any(|all| trimmed.eq_ignore_ascii_case(all))
        {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn stroke(mut self, stroke: u8) -> Self {
        self.stroke = Some(stroke);
        self
    }

    pub fn min_age(mut self, min_age: f64) -> Self {
        self.min_age = Some(min_age);
        self
    }

    pub fn max_age(mut self, max_age: f64) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn age_range(self, min_age: f64, max_age: f64) -> Self {
        self.min_age(min_age).max_age(max_age)
    }

    /// Age bounds, only when both are set. A single bound is ignored.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.min_age.zip(self.max_age)
    }

    /// Runs gender, then stroke, then age range over the whole table.
    pub fn apply<'a>(&self, table: &'a PatientTable) -> Rows<'a> {
        let mut rows = Rows::new(table);
        if let Some(gender) = &self.gender {
            rows = filter_by_gender(rows, gender);
        }
        if let Some(stroke) = self.stroke {
            rows = filter_by_stroke(rows, stroke);
        }
        if let Some((min_age, max_age)) = self.bounds() {
            rows = filter_by_age_range(rows, min_age, max_age);
        }
        rows
    }

    /// Canonical form of the criteria: filters selecting the same rows share a key.
    pub fn key(&self) -> FilterKey {
        FilterKey {
            gender: self.gender.as_ref().map(|gender| gender.to_lowercase()),
            stroke: self.stroke,
            age_range: self
                .bounds()
                .map(|(min_age, max_age)| (min_age.to_bits(), max_age.to_bits())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterKey {
    gender: Option<String>,
    stroke: Option<u8>,
    age_range: Option<(u64, u64)>,
}

/// Records matching `filter`, in table order. Empty when nothing matches.
pub fn filter_patients(
    table: &PatientTable,
    filter: &PatientFilter,
) -> PolarsResult<Vec<PatientRecord>> {
    filter.apply(table).to_records()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(id: i64, gender: Option<&str>, age: f64, stroke: u8) -> PatientRecord {
        PatientRecord {
            gender: gender.map(str::to_string),
            age,
            stroke,
            ..PatientRecord::new(id)
        }
    }

    fn table() -> PatientTable {
        PatientTable::from_records(vec![
            patient(1, Some("Male"), 45.0, 1),
            patient(2, Some("female"), 70.0, 0),
            patient(3, Some("MALE"), 80.0, 0),
            patient(4, None, 50.0, 1),
            patient(5, Some("Female"), 0.08, 1),
            patient(6, Some("Other"), 30.0, 0),
        ])
        .unwrap()
    }

    fn ids(records: &[PatientRecord]) -> Vec<i64> {
        records.iter().map(|p| p.id).collect()
    }

    fn kept(rows: Rows<'_>) -> Vec<i64> {
        ids(&rows.to_records().unwrap())
    }

    #[test]
    fn gender_filter_is_case_insensitive_subset() {
        let table = table();
        let males = kept(filter_by_gender(Rows::new(&table), "male"));
        assert_eq!(males, vec![1, 3]);

        for record in table.records() {
            let matches = record
                .gender
                .as_deref()
                .map_or(false, |g| g.eq_ignore_ascii_case("male"));
            assert_eq!(males.contains(&record.id), matches);
        }
    }

    #[test]
    fn age_range_is_inclusive() {
        let table = table();
        assert_eq!(kept(filter_by_age_range(Rows::new(&table), 45.0, 70.0)), vec![1, 2, 4]);
        assert_eq!(kept(filter_by_age_range(Rows::new(&table), 0.0, 1.0)), vec![5]);
    }

    #[test]
    fn stroke_filter_keeps_flag() {
        let table = table();
        assert_eq!(kept(filter_by_stroke(Rows::new(&table), 1)), vec![1, 4, 5]);
        assert_eq!(kept(filter_by_stroke(Rows::new(&table), 0)), vec![2, 3, 6]);
    }

    #[test]
    fn predicate_order_does_not_change_result() {
        let table = table();
        let gender_first = filter_by_age_range(
            filter_by_stroke(filter_by_gender(Rows::new(&table), "female"), 1),
            0.0,
            100.0,
        );
        let age_first = filter_by_gender(
            filter_by_stroke(filter_by_age_range(Rows::new(&table), 0.0, 100.0), 1),
            "female",
        );
        let stroke_first = filter_by_gender(
            filter_by_age_range(filter_by_stroke(Rows::new(&table), 1), 0.0, 100.0),
            "female",
        );
        assert_eq!(kept(gender_first), vec![5]);
        assert_eq!(kept(age_first), vec![5]);
        assert_eq!(kept(stroke_first), vec![5]);
    }

    #[test]
    fn missing_columns_make_predicates_no_ops() {
        let records = vec![patient(1, Some("Male"), 45.0, 1), patient(2, None, 70.0, 0)];
        let columns = [Column::Id, Column::Age].into_iter().collect();
        let table = PatientTable::new(columns, records).unwrap();

        assert_eq!(kept(filter_by_gender(Rows::new(&table), "Female")), vec![1, 2]);
        assert_eq!(kept(filter_by_stroke(Rows::new(&table), 1)), vec![1, 2]);
        assert_eq!(
            kept(filter_by_age_range(Rows::new(&table), 60.0, 80.0)),
            vec![2]
        );
    }

    #[test]
    fn pipeline_applies_supplied_criteria() {
        let table = table();
        let males = filter_patients(&table, &PatientFilter::new().gender("Male")).unwrap();
        assert_eq!(ids(&males), vec![1, 3]);

        let everyone = filter_patients(&table, &PatientFilter::new()).unwrap();
        assert_eq!(everyone, table.records());

        let old_without_stroke = filter_patients(
            &table,
            &PatientFilter::new().stroke(0).age_range(60.0, 100.0),
        )
        .unwrap();
        assert_eq!(ids(&old_without_stroke), vec![2, 3]);
    }

    #[test]
    fn single_age_bound_is_ignored() {
        let table = table();
        let only_min = filter_patients(&table, &PatientFilter::new().min_age(75.0)).unwrap();
        let only_max = filter_patients(&table, &PatientFilter::new().max_age(10.0)).unwrap();
        assert_eq!(only_min.len(), table.len());
        assert_eq!(only_max.len(), table.len());
    }

    #[test]
    fn no_match_is_empty_not_error() {
        let table = table();
        let filter = PatientFilter::new().gender("Other").stroke(1);
        assert!(filter_patients(&table, &filter).unwrap().is_empty());
        assert!(filter.apply(&table).positions().unwrap().is_empty());
    }

    #[test]
    fn positions_index_the_table() {
        let table = table();
        let rows = PatientFilter::new().stroke(1).apply(&table);
        assert_eq!(rows.positions().unwrap(), vec![0, 3, 4]);
        assert_eq!(rows.frame().unwrap().height(), 3);
    }

    #[test]
    fn all_sentinel_clears_gender() {
        assert_eq!(PatientFilter::new().gender("all").gender, None);
        assert_eq!(PatientFilter::new().gender("Tous").gender, None);
        assert_eq!(PatientFilter::new().gender("  ").gender, None);
        assert_eq!(
            PatientFilter::new().gender("Female").gender.as_deref(),
            Some("Female")
        );
    }

    #[test]
    fn equivalent_filters_share_a_key() {
        let a = PatientFilter::new().gender("MALE").min_age(30.0);
        let b = PatientFilter::new().gender("male");
        assert_eq!(a.key(), b.key());

        let c = PatientFilter::new().gender("male").age_range(30.0, 60.0);
        assert_ne!(b.key(), c.key());
    }

    #[test]
    fn stroke_flag_must_be_binary() {
        assert_eq!(parse_stroke_flag(1), Ok(1));
        assert_eq!(parse_stroke_flag(0), Ok(0));
        assert_eq!(
            parse_stroke_flag(2),
            Err(QueryError::InvalidStroke { value: 2 })
        );
    }
}

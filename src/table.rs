use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use polars::prelude::{DataFrame, DataType, NamedFrom, PolarsResult, Series};
use polars_io::parquet::{ParquetReader, ParquetWriter};
use polars_io::SerReader;
use serde::Deserialize;
use sysinfo::{get_current_pid, ProcessExt, System, SystemExt};

use crate::error::StrokeError;
use crate::records::{Column, PatientRecord};

/// The in-memory patient dataset. Built once, then only read.
///
/// `frame` carries every row under the full dataset schema and is what the
/// predicates and aggregations evaluate. `records` holds the same rows in the
/// same order and is only used to serialise results. `columns` records which
/// columns the source file actually carried, so the predicates can skip
/// filters on columns that were never loaded.
#[derive(Debug, Clone)]
pub struct PatientTable {
    columns: BTreeSet<Column>,
    frame: DataFrame,
    records: Vec<PatientRecord>,
}

impl PatientTable {
    /// Fails when an indicator column holds anything but 0 or 1.
    pub fn new(
        columns: BTreeSet<Column>,
        records: Vec<PatientRecord>,
    ) -> Result<Self, StrokeError> {
        for record in &records {
            if let Some((column, value)) = record.flags().into_iter().find(|(_, value)| *value > 1) {
                return Err(StrokeError::InvalidFlag {
                    column: column.name(),
                    id: record.id,
                    value: i64::from(value),
                });
            }
        }
        let frame = table_to_frame(&records)?;
        Ok(Self {
            columns,
            frame,
            records,
        })
    }

    /// Table with the full dataset schema.
    pub fn from_records(records: Vec<PatientRecord>) -> Result<Self, StrokeError> {
        Self::new(Column::ALL.into_iter().collect(), records)
    }

    pub fn columns(&self) -> &BTreeSet<Column> {
        &self.columns
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    /// Records at `positions`, in that order.
    pub fn rows<'a>(&'a self, positions: &'a [usize]) -> impl Iterator<Item = &'a PatientRecord> + 'a {
        positions
            .iter()
            .filter_map(move |&position| self.records.get(position))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record carrying `id`. Ids are assumed unique in the source data.
    pub fn find(&self, id: i64) -> Option<&PatientRecord> {
        self.records.iter().find(|record| record.id == id)
    }
}

/// One row as it appears in a data file. Unparsable values (the `N/A` bmi)
/// and absent columns load as `None`.
#[derive(Debug, Default, Deserialize)]
struct RawRow {
    #[serde(default, deserialize_with = "csv::invalid_option")]
    id: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    gender: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    age: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    hypertension: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    heart_disease: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    ever_married: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    work_type: Option<String>,
    #[serde(
        rename = "Residence_type",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    residence_type: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    avg_glucose_level: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    bmi: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    smoking_status: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    stroke: Option<i64>,
}

/// A missing indicator is 0. Anything but 0 or 1 is rejected.
fn flag(column: Column, id: i64, value: Option<i64>) -> Result<u8, StrokeError> {
    match value.unwrap_or(0) {
        0 => Ok(0),
        1 => Ok(1),
        value => Err(StrokeError::InvalidFlag {
            column: column.name(),
            id,
            value,
        }),
    }
}

impl RawRow {
    /// `None` for a row without an id. A missing age counts as 0.
    fn into_record(self) -> Result<Option<PatientRecord>, StrokeError> {
        let Some(id) = self.id else {
            return Ok(None);
        };
        Ok(Some(PatientRecord {
            id,
            gender: self.gender,
            age: self.age.filter(|age| !age.is_nan()).unwrap_or(0.0),
            hypertension: flag(Column::Hypertension, id, self.hypertension)?,
            heart_disease: flag(Column::HeartDisease, id, self.heart_disease)?,
            ever_married: self.ever_married,
            work_type: self.work_type,
            residence_type: self.residence_type,
            avg_glucose_level: self.avg_glucose_level,
            bmi: self.bmi,
            smoking_status: self.smoking_status,
            stroke: flag(Column::Stroke, id, self.stroke)?,
        }))
    }
}

/// Bad-row policy shared by every reader: rows without an id are skipped
/// with a warning, the rest go through [`RawRow::into_record`].
fn build_table(
    columns: BTreeSet<Column>,
    rows: Vec<RawRow>,
    path: &Path,
) -> Result<PatientTable, StrokeError> {
    let mut records = Vec::with_capacity(rows.len());
    for (row, raw) in rows.into_iter().enumerate() {
        match raw.into_record()? {
            Some(record) => records.push(record),
            None => log::warn!("{:?}: skipping row {} without id", path, row),
        }
    }
    PatientTable::new(columns, records)
}

/// Resident memory of this process in bytes, 0 when it cannot be read.
pub fn monitor_memory() -> u64 {
    let pid = match get_current_pid() {
        Ok(pid) => pid,
        Err(_) => return 0,
    };
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return 0;
    }
    system.process(pid).map(|process| process.memory()).unwrap_or(0)
}

fn open(path: &Path) -> Result<File, StrokeError> {
    File::open(path).map_err(|source| StrokeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn present_columns<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<Column> {
    names.into_iter().filter_map(Column::from_name).collect()
}

fn require_id(columns: &BTreeSet<Column>, path: &Path) -> Result<(), StrokeError> {
    if columns.contains(&Column::Id) {
        Ok(())
    } else {
        Err(StrokeError::MissingColumn {
            column: Column::Id.name(),
            path: path.to_path_buf(),
        })
    }
}

fn int_values(df: &DataFrame, column: Column) -> PolarsResult<Vec<Option<i64>>> {
    if !df.get_column_names().contains(&column.name()) {
        return Ok(vec![None; df.height()]);
    }
    let cast = df.column(column.name())?.cast(&DataType::Int64)?;
    let values = cast.i64()?.into_iter().collect();
    Ok(values)
}

fn float_values(df: &DataFrame, column: Column) -> PolarsResult<Vec<Option<f64>>> {
    if !df.get_column_names().contains(&column.name()) {
        return Ok(vec![None; df.height()]);
    }
    // Utf8 columns such as the raw "N/A" bmi cast to null
    let cast = df.column(column.name())?.cast(&DataType::Float64)?;
    let values = cast
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| !v.is_nan()))
        .collect();
    Ok(values)
}

fn text_values(df: &DataFrame, column: Column) -> PolarsResult<Vec<Option<String>>> {
    if !df.get_column_names().contains(&column.name()) {
        return Ok(vec![None; df.height()]);
    }
    let cast = df.column(column.name())?.cast(&DataType::Utf8)?;
    let values = cast
        .utf8()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect();
    Ok(values)
}

/// Builds a table out of a dataframe, under the same row policy as the CSV reader.
pub fn frame_to_table(df: &DataFrame, path: &Path) -> Result<PatientTable, StrokeError> {
    let columns = present_columns(df.get_column_names());
    require_id(&columns, path)?;

    let ids = int_values(df, Column::Id)?;
    let mut genders = text_values(df, Column::Gender)?;
    let ages = float_values(df, Column::Age)?;
    let hypertension = int_values(df, Column::Hypertension)?;
    let heart_disease = int_values(df, Column::HeartDisease)?;
    let mut ever_married = text_values(df, Column::EverMarried)?;
    let mut work_type = text_values(df, Column::WorkType)?;
    let mut residence_type = text_values(df, Column::ResidenceType)?;
    let glucose = float_values(df, Column::AvgGlucoseLevel)?;
    let bmi = float_values(df, Column::Bmi)?;
    let mut smoking = text_values(df, Column::SmokingStatus)?;
    let stroke = int_values(df, Column::Stroke)?;

    let rows = (0..df.height())
        .map(|row| RawRow {
            id: ids[row],
            gender: genders[row].take(),
            age: ages[row],
            hypertension: hypertension[row],
            heart_disease: heart_disease[row],
            ever_married: ever_married[row].take(),
            work_type: work_type[row].take(),
            residence_type: residence_type[row].take(),
            avg_glucose_level: glucose[row],
            bmi: bmi[row],
            smoking_status: smoking[row].take(),
            stroke: stroke[row],
        })
        .collect();

    build_table(columns, rows, path)
}

/// Dataframe with the full dataset schema, in file column order.
fn table_to_frame(records: &[PatientRecord]) -> PolarsResult<DataFrame> {
    fn collect<T>(records: &[PatientRecord], f: impl Fn(&PatientRecord) -> T) -> Vec<T> {
        records.iter().map(f).collect()
    }

    DataFrame::new(vec![
        Series::new(Column::Id.name(), collect(records, |r| r.id)),
        Series::new(Column::Gender.name(), collect(records, |r| r.gender.clone())),
        Series::new(Column::Age.name(), collect(records, |r| r.age)),
        Series::new(
            Column::Hypertension.name(),
            collect(records, |r| i32::from(r.hypertension)),
        ),
        Series::new(
            Column::HeartDisease.name(),
            collect(records, |r| i32::from(r.heart_disease)),
        ),
        Series::new(
            Column::EverMarried.name(),
            collect(records, |r| r.ever_married.clone()),
        ),
        Series::new(Column::WorkType.name(), collect(records, |r| r.work_type.clone())),
        Series::new(
            Column::ResidenceType.name(),
            collect(records, |r| r.residence_type.clone()),
        ),
        Series::new(
            Column::AvgGlucoseLevel.name(),
            collect(records, |r| r.avg_glucose_level),
        ),
        Series::new(Column::Bmi.name(), collect(records, |r| r.bmi)),
        Series::new(
            Column::SmokingStatus.name(),
            collect(records, |r| r.smoking_status.clone()),
        ),
        Series::new(Column::Stroke.name(), collect(records, |r| i32::from(r.stroke))),
    ])
}

pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<PatientTable, StrokeError> {
    let path = path.as_ref();
    let df = ParquetReader::new(open(path)?).finish()?;
    frame_to_table(&df, path)
}

/// Reads the raw CSV export.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<PatientTable, StrokeError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_reader(open(path)?);
    let columns = present_columns(reader.headers()?.iter());
    require_id(&columns, path)?;

    let rows = reader
        .deserialize()
        .collect::<Result<Vec<RawRow>, csv::Error>>()?;

    build_table(columns, rows, path)
}

pub fn write_parquet<P: AsRef<Path>>(path: P, table: &PatientTable) -> Result<(), StrokeError> {
    let path = path.as_ref();
    let mut df = table.frame().clone();
    let mut file = File::create(path).map_err(|source| StrokeError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    ParquetWriter::new(&mut file).finish(&mut df)?;

    Ok(())
}

/// Picks the reader from the file extension.
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<PatientTable, StrokeError> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("parquet") => read_parquet(path),
        Some(ext) if ext.eq_ignore_ascii_case("csv") => read_csv(path),
        _ => Err(StrokeError::InputFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Loads the table on the blocking pool and logs what it cost.
pub async fn load_table(path: PathBuf) -> Result<PatientTable, StrokeError> {
    let start_time = Instant::now();
    let start_memory = monitor_memory();

    let source = path.clone();
    let table = tokio::task::spawn_blocking(move || read_table(&source)).await??;

    let end_memory = monitor_memory();
    log::info!(
        "loaded {} patients ({} columns) from {:?} in {:?}",
        table.len(),
        table.columns().len(),
        path,
        start_time.elapsed()
    );
    log::debug!(
        "memory used by table load: {} KiB",
        end_memory.saturating_sub(start_memory) / 1024
    );

    Ok(table)
}

//! Query façade shared by the HTTP handlers and the CLI.
//!
//! Filter results and chart summaries are memoized per canonical
//! [`FilterKey`] in bounded memos that evict their oldest entry once full.
//! Nothing expires on its own: [`PatientQuery::invalidate`] and
//! [`PatientQuery::reload`] drop every entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Serializer};

use crate::aggregate::ChartSummary;
use crate::error::QueryError;
use crate::filters::{FilterKey, PatientFilter};
use crate::records::PatientRecord;
use crate::stats::{global_statistics, GlobalStatistics};
use crate::table::PatientTable;

pub const DEFAULT_MEMO_CAPACITY: usize = 256;

/// Results keyed by filter parameters, at most `capacity` of them.
struct Memo<V> {
    capacity: usize,
    entries: HashMap<FilterKey, V>,
    order: VecDeque<FilterKey>,
}

impl<V: Clone> Memo<V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::with_capacity(capacity),
        }
    }

    fn get(&self, key: &FilterKey) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Returns the stored value, which is the existing one when `key` is
    /// already present.
    fn insert(&mut self, key: FilterKey, value: V) -> V {
        if let Some(existing) = self.entries.get(&key) {
            return existing.clone();
        }
        if self.capacity == 0 {
            return value;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                log::trace!("evicting memo entry {:?}", oldest);
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value.clone());
        value
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Patients picked out of one table snapshot, by position.
#[derive(Debug, Clone)]
pub struct Selection {
    table: Arc<PatientTable>,
    positions: Arc<[usize]>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatientRecord> {
        self.table.rows(&self.positions)
    }

}

impl Serialize for Selection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

pub struct PatientQuery {
    table: RwLock<Arc<PatientTable>>,
    patients: RwLock<Memo<Arc<[usize]>>>,
    charts: RwLock<Memo<Arc<ChartSummary>>>,
    statistics: RwLock<Option<Arc<GlobalStatistics>>>,
}

impl PatientQuery {
    pub fn new(table: PatientTable) -> Self {
        Self::with_memo_capacity(table, DEFAULT_MEMO_CAPACITY)
    }

    pub fn with_memo_capacity(table: PatientTable, capacity: usize) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
            patients: RwLock::new(Memo::new(capacity)),
            charts: RwLock::new(Memo::new(capacity)),
            statistics: RwLock::new(None),
        }
    }

    /// Snapshot of the current table.
    pub fn table(&self) -> Arc<PatientTable> {
        self.table.read().clone()
    }

    /// Patients matching `filter`, in table order.
    pub fn filter_patients(&self, filter: &PatientFilter) -> Result<Selection, QueryError> {
        // the table guard is held until the entry is stored so a concurrent
        // reload cannot interleave and leave a stale entry behind
        let table = self.table.read();
        let key = filter.key();
        let cached = self.patients.read().get(&key);
        let positions = match cached {
            Some(hit) => hit,
            None => {
                let positions: Arc<[usize]> = filter.apply(&table).positions()?.into();
                log::debug!("memoized {} patients for {:?}", positions.len(), key);
                self.patients.write().insert(key, positions)
            }
        };
        Ok(Selection {
            table: Arc::clone(&table),
            positions,
        })
    }

    /// Chart series over the patients matching `filter`.
    pub fn charts(&self, filter: &PatientFilter) -> Result<Arc<ChartSummary>, QueryError> {
        let table = self.table.read();
        let key = filter.key();
        let cached = self.charts.read().get(&key);
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let frame = filter.apply(&table).frame()?;
        let summary = Arc::new(ChartSummary::from_frame(&frame)?);
        Ok(self.charts.write().insert(key, summary))
    }

    pub fn get_patient_by_id(&self, id: i64) -> Result<PatientRecord, QueryError> {
        self.table
            .read()
            .find(id)
            .cloned()
            .ok_or(QueryError::NotFound { id })
    }

    /// Looks a patient up from an untrusted identifier, rejecting anything
    /// that is not an integer before touching the table.
    pub fn lookup(&self, raw: &str) -> Result<PatientRecord, QueryError> {
        let id = raw.trim().parse::<i64>().map_err(|_| QueryError::InvalidId {
            raw: raw.to_string(),
        })?;
        self.get_patient_by_id(id)
    }

    /// Statistics over the whole table.
    pub fn global_statistics(&self) -> Result<Arc<GlobalStatistics>, QueryError> {
        let table = self.table.read();
        if let Some(stats) = self.statistics.read().as_ref() {
            return Ok(stats.clone());
        }

        let stats = Arc::new(global_statistics(table.frame())?);
        Ok(self.statistics.write().get_or_insert(stats).clone())
    }

    /// Drops every memoized result.
    pub fn invalidate(&self) {
        let _table = self.table.write();
        self.clear_memo();
    }

    /// Swaps in a new table and drops every memoized result.
    pub fn reload(&self, table: PatientTable) {
        let mut current = self.table.write();
        log::info!(
            "reloading patient table: {} -> {} patients",
            current.len(),
            table.len()
        );
        *current = Arc::new(table);
        self.clear_memo();
    }

    fn clear_memo(&self) {
        self.patients.write().clear();
        self.charts.write().clear();
        *self.statistics.write() = None;
    }

    /// Number of distinct filter results currently memoized.
    pub fn memoized_filters(&self) -> usize {
        self.patients.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::BmiCategory;

    fn ids(selection: &Selection) -> Vec<i64> {
        selection.iter().map(|record| record.id).collect()
    }

    fn scenario() -> PatientTable {
        PatientTable::from_records(vec![
            PatientRecord {
                gender: Some("Male".into()),
                age: 45.0,
                stroke: 1,
                bmi: Some(0.0),
                ..PatientRecord::new(1)
            },
            PatientRecord {
                gender: Some("female".into()),
                age: 70.0,
                stroke: 0,
                bmi: Some(32.0),
                ..PatientRecord::new(2)
            },
        ])
        .unwrap()
    }

    #[test]
    fn scenario_filters() {
        let query = PatientQuery::new(scenario());

        let males = query.filter_patients(&PatientFilter::new().gender("Male")).unwrap();
        assert_eq!(ids(&males), vec![1]);

        let older = query
            .filter_patients(&PatientFilter::new().age_range(50.0, 80.0))
            .unwrap();
        assert_eq!(ids(&older), vec![2]);
        assert_eq!(older.len(), 1);
    }

    #[test]
    fn scenario_statistics() {
        let query = PatientQuery::new(scenario());
        let stats = query.global_statistics().unwrap();

        assert_eq!(stats.total_patients, 2);
        assert_eq!(stats.stroke_true, 1);
        assert_eq!(stats.stroke_false, 1);
        assert_eq!(stats.average_age, 57.5);
    }

    #[test]
    fn scenario_bmi_buckets() {
        let query = PatientQuery::new(scenario());
        let charts = query.charts(&PatientFilter::new()).unwrap();

        assert_eq!(charts.stroke_count_by_bmi.len(), 1);
        assert_eq!(charts.stroke_count_by_bmi[&BmiCategory::Underweight], 1);
    }

    #[test]
    fn lookup_by_id() {
        let query = PatientQuery::new(scenario());

        assert_eq!(query.get_patient_by_id(2).unwrap().id, 2);
        assert_eq!(query.get_patient_by_id(2), query.get_patient_by_id(2));
        assert_eq!(
            query.get_patient_by_id(999),
            Err(QueryError::NotFound { id: 999 })
        );
        assert!(query.get_patient_by_id(999).unwrap_err().is_not_found());
    }

    #[test]
    fn lookup_rejects_non_integer_ids() {
        let query = PatientQuery::new(scenario());

        assert_eq!(query.lookup(" 1 ").unwrap().id, 1);
        assert_eq!(
            query.lookup("abc"),
            Err(QueryError::InvalidId { raw: "abc".into() })
        );
        assert!(matches!(query.lookup("1.5"), Err(QueryError::InvalidId { .. })));
        assert_eq!(query.lookup("999"), Err(QueryError::NotFound { id: 999 }));
    }

    #[test]
    fn equivalent_filters_hit_the_same_entry() {
        let query = PatientQuery::new(scenario());

        let first = query.filter_patients(&PatientFilter::new().gender("male")).unwrap();
        let second = query
            .filter_patients(&PatientFilter::new().gender("MALE").max_age(10.0))
            .unwrap();

        assert!(Arc::ptr_eq(&first.positions, &second.positions));
        assert_eq!(query.memoized_filters(), 1);
    }

    #[test]
    fn selections_borrow_the_table_rows() {
        let query = PatientQuery::new(scenario());
        let everyone = query.filter_patients(&PatientFilter::new()).unwrap();

        assert!(Arc::ptr_eq(&everyone.table, &query.table()));
        assert_eq!(&*everyone.positions, &[0, 1]);
        let json = serde_json::to_value(&everyone).unwrap();
        assert_eq!(json[1]["gender"], "female");
    }

    #[test]
    fn memo_is_bounded_by_capacity() {
        let query = PatientQuery::with_memo_capacity(scenario(), 4);
        let range = |min_age: u32| PatientFilter::new().age_range(f64::from(min_age), 100.0);

        for min_age in 0..50 {
            query.filter_patients(&range(min_age)).unwrap();
            query.charts(&range(min_age)).unwrap();
            assert!(query.memoized_filters() <= 4);
            assert!(query.charts.read().len() <= 4);
        }

        assert_eq!(query.memoized_filters(), 4);
        let patients = query.patients.read();
        assert!(patients.get(&range(49).key()).is_some());
        assert!(patients.get(&range(46).key()).is_some());
        assert!(patients.get(&range(45).key()).is_none());
        assert!(patients.get(&range(0).key()).is_none());
    }

    #[test]
    fn zero_capacity_memo_still_answers() {
        let query = PatientQuery::with_memo_capacity(scenario(), 0);
        let stroke = PatientFilter::new().stroke(1);

        assert_eq!(ids(&query.filter_patients(&stroke).unwrap()), vec![1]);
        assert_eq!(query.charts(&stroke).unwrap().patients, 1);
        assert_eq!(query.memoized_filters(), 0);
    }

    #[test]
    fn invalidate_clears_memo() {
        let query = PatientQuery::new(scenario());
        query.filter_patients(&PatientFilter::new()).unwrap();
        query.filter_patients(&PatientFilter::new().stroke(1)).unwrap();
        query.charts(&PatientFilter::new().stroke(1)).unwrap();
        assert_eq!(query.memoized_filters(), 2);

        query.invalidate();
        assert_eq!(query.memoized_filters(), 0);
        assert_eq!(query.charts.read().len(), 0);
    }

    #[test]
    fn reload_serves_new_table() {
        let query = PatientQuery::new(scenario());
        assert_eq!(query.global_statistics().unwrap().total_patients, 2);
        assert_eq!(query.filter_patients(&PatientFilter::new()).unwrap().len(), 2);

        query.reload(PatientTable::from_records(vec![PatientRecord::new(7)]).unwrap());

        assert_eq!(query.global_statistics().unwrap().total_patients, 1);
        assert_eq!(ids(&query.filter_patients(&PatientFilter::new()).unwrap()), vec![7]);
        assert!(query.get_patient_by_id(1).unwrap_err().is_not_found());
    }
}

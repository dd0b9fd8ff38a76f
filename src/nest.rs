//! Partitioning of tables into keyed sub-tables.

use crate::enrich::EnrichedRecord;
use crate::Cohort;
use std::borrow::Borrow;
use std::collections::BTreeMap;

/// Sub-tables keyed by their grouping value, in key order
pub type Nested<K, R> = BTreeMap<K, Vec<R>>;

/// Partitions `rows` by `key`.
///
/// Rows keep their input order inside each group. A row whose key is
/// `None` belongs to no group and is left out. Rows may be owned or
/// borrowed, `key` sees them as `&T` either way.
pub fn nest<T, R, K, I, F>(rows: I, key: F) -> Nested<K, R>
where
    T: ?Sized,
    R: Borrow<T>,
    I: IntoIterator<Item = R>,
    K: Ord,
    F: Fn(&T) -> Option<K>,
{
    let mut nested = Nested::new();
    for row in rows {
        if let Some(k) = key(row.borrow()) {
            nested.entry(k).or_insert_with(Vec::new).push(row);
        }
    }
    nested
}

pub fn by_locus(record: &EnrichedRecord) -> Option<String> {
    record.locus().map(String::from)
}

pub fn by_cohort_locus(record: &EnrichedRecord) -> Option<(Cohort, String)> {
    record.locus().map(|locus| (record.cohort, locus.to_owned()))
}

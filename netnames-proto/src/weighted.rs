//! Priority/weight ordered candidate selection for `SRV` and `MX` style records.
//!
//! See [RFC 2782](https://www.rfc-editor.org/rfc/rfc2782) for the selection rules implemented by
//! [`WeightedNameRecordList::take_next()`].

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;

use crate::record::NameRecord;

/// A set of records from which candidates are drawn in priority order, weighted-randomly within
/// one priority.
///
/// Records are grouped by priority (lower value first), and within one priority by weight.
/// Records without a priority (e.g. `A` records) end up in priority 0 with weight 0, so for them
/// the list degenerates into a uniformly shuffled queue.
///
/// # Examples
/// ```rust
/// use netnames_proto::{NameRecord, WeightedNameRecordList};
///
/// let mut list = WeightedNameRecordList::new();
/// list.append(NameRecord::srv_record("_x._tcp.example.", 60, "backup.example.", 1, 10, 0));
/// list.append(NameRecord::srv_record("_x._tcp.example.", 60, "main.example.", 1, 0, 0));
///
/// assert_eq!(list.take_next().unwrap().name(), "main.example.");
/// assert_eq!(list.take_next().unwrap().name(), "backup.example.");
/// assert!(list.take_next().is_none());
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WeightedNameRecordList {
    // priority -> weight -> records; emptied groups are removed right away, so the first
    // priority group is always the current one
    priority_groups: BTreeMap<u16, BTreeMap<u16, Vec<NameRecord>>>,
}

impl WeightedNameRecordList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.priority_groups.is_empty()
    }

    /// The number of records remaining.
    pub fn len(&self) -> usize {
        self.priority_groups
            .values()
            .flat_map(|group| group.values())
            .map(Vec::len)
            .sum()
    }

    pub fn clear(&mut self) {
        self.priority_groups.clear();
    }

    /// Adds a single record. Null records are ignored.
    pub fn append(&mut self, record: NameRecord) {
        if record.is_null() {
            return;
        }
        self.priority_groups
            .entry(record.priority())
            .or_default()
            .entry(record.weight())
            .or_default()
            .push(record);
    }

    /// Adds all records of `records`.
    pub fn append_all(&mut self, records: impl IntoIterator<Item = NameRecord>) {
        for record in records {
            self.append(record);
        }
    }

    /// Adds the remaining records of another list.
    pub fn append_list(&mut self, other: &WeightedNameRecordList) {
        self.append_all(other.records().cloned());
    }

    /// Adds `hostname:port` as a candidate that is only taken after everything else, i.e. with the
    /// lowest possible precedence and weight 0.
    pub fn append_host(&mut self, hostname: &str, port: u16) {
        self.append(NameRecord::srv_record(
            hostname, 0, hostname, port, u16::MAX, 0,
        ));
    }

    /// Iterates over the remaining records in priority order, without removing them.
    pub fn records(&self) -> impl Iterator<Item = &NameRecord> {
        self.priority_groups
            .values()
            .flat_map(|group| group.values())
            .flatten()
    }

    /// Removes and returns the next candidate, or [`None`] if the list is empty.
    pub fn take_next(&mut self) -> Option<NameRecord> {
        self.take_next_with(&mut rand::thread_rng())
    }

    /// Like [`Self::take_next()`], drawing from the given random number generator.
    pub fn take_next_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<NameRecord> {
        let mut current = self.priority_groups.first_entry()?;
        let group = current.get_mut();

        // u64: a tier of many heavy records overflows u32
        let total_weight: u64 = group
            .iter()
            .map(|(weight, records)| u64::from(*weight) * records.len() as u64)
            .sum();

        let (weight, index) = if total_weight == 0 {
            // nothing to weigh, every record is equally likely
            let count: usize = group.values().map(Vec::len).sum();
            let mut pick = rng.gen_range(0..count);
            let mut chosen = None;
            for (weight, records) in group.iter() {
                if pick < records.len() {
                    chosen = Some((*weight, pick));
                    break;
                }
                pick -= records.len();
            }
            chosen?
        } else {
            let draw = rng.gen_range(0..total_weight);
            let mut cumulative = 0;
            let mut chosen = None;
            'outer: for (weight, records) in group.iter() {
                for index in 0..records.len() {
                    cumulative += u64::from(*weight);
                    if cumulative > draw {
                        chosen = Some((*weight, index));
                        break 'outer;
                    }
                }
            }
            chosen?
        };

        let records = group.get_mut(&weight)?;
        let record = records.remove(index);
        if records.is_empty() {
            group.remove(&weight);
        }
        if group.is_empty() {
            current.remove();
        }
        Some(record)
    }
}

impl Extend<NameRecord> for WeightedNameRecordList {
    fn extend<T: IntoIterator<Item = NameRecord>>(&mut self, iter: T) {
        self.append_all(iter);
    }
}

impl FromIterator<NameRecord> for WeightedNameRecordList {
    fn from_iter<T: IntoIterator<Item = NameRecord>>(iter: T) -> Self {
        let mut list = Self::new();
        list.append_all(iter);
        list
    }
}

impl fmt::Debug for WeightedNameRecordList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "WeightedNameRecordList {{")?;
        for (priority, group) in &self.priority_groups {
            for (weight, records) in group {
                for record in records {
                    writeln!(
                        f,
                        "    priority {} weight {}: {}:{}",
                        priority,
                        weight,
                        record.name(),
                        record.port()
                    )?;
                }
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::WeightedNameRecordList;
    use crate::record::NameRecord;

    fn srv(target: &str, priority: u16, weight: u16) -> NameRecord {
        NameRecord::srv_record("_svc._tcp.example.", 300, target, 5222, priority, weight)
    }

    #[test]
    fn every_record_is_taken_exactly_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let targets = ["a.", "b.", "c.", "d.", "e."];
        let mut list: WeightedNameRecordList = targets
            .iter()
            .enumerate()
            .map(|(i, t)| srv(t, 0, i as u16 * 10))
            .collect();
        assert_eq!(list.len(), 5);

        let mut seen = HashSet::new();
        while let Some(record) = list.take_next_with(&mut rng) {
            assert!(seen.insert(record.name().to_string()));
        }
        assert_eq!(seen.len(), targets.len());
        assert!(list.is_empty());
    }

    #[test]
    fn lower_priority_value_always_first() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut list = WeightedNameRecordList::new();
            list.append(srv("late-1.", 20, 100));
            list.append(srv("early-1.", 10, 1));
            list.append(srv("late-2.", 20, 0));
            list.append(srv("early-2.", 10, 0));

            let order: Vec<_> = std::iter::from_fn(|| list.take_next_with(&mut rng))
                .map(|r| r.priority())
                .collect();
            assert_eq!(order, vec![10, 10, 20, 20]);
        }
    }

    #[test]
    fn zero_weight_comes_after_nonzero_weights() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut list = WeightedNameRecordList::new();
            list.append(srv("zero.", 0, 0));
            list.append(srv("light.", 0, 1));
            list.append(srv("heavy.", 0, 60));

            let first = list.take_next_with(&mut rng).unwrap();
            let second = list.take_next_with(&mut rng).unwrap();
            let third = list.take_next_with(&mut rng).unwrap();
            assert_ne!(first.name(), "zero.");
            assert_ne!(second.name(), "zero.");
            assert_eq!(third.name(), "zero.");
        }
    }

    #[test]
    fn heavier_records_are_preferred() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut heavy_first = 0;
        for _ in 0..1000 {
            let mut list = WeightedNameRecordList::new();
            list.append(srv("light.", 0, 10));
            list.append(srv("heavy.", 0, 90));
            if list.take_next_with(&mut rng).unwrap().name() == "heavy." {
                heavy_first += 1;
            }
        }
        assert!(heavy_first > 800, "heavy first only {} times", heavy_first);
    }

    #[test]
    fn appended_host_is_the_last_resort() {
        let mut list = WeightedNameRecordList::new();
        list.append_host("example.com.", 5222);
        list.append(srv("a.", 65534, 0));
        list.append(srv("b.", 3, 0));

        let names: Vec<_> = std::iter::from_fn(|| list.take_next())
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["b.", "a.", "example.com."]);
    }

    #[test]
    fn null_records_are_ignored() {
        let mut list = WeightedNameRecordList::new();
        list.append(NameRecord::default());
        assert!(list.is_empty());
    }

    #[test]
    fn append_list_copies_remaining_records() {
        let mut first = WeightedNameRecordList::new();
        first.append(srv("a.", 0, 0));
        let mut second = WeightedNameRecordList::new();
        second.append(srv("b.", 1, 0));
        second.append_list(&first);
        assert_eq!(second.len(), 2);
        assert_eq!(first.len(), 1);
        assert_eq!(second.take_next().unwrap().name(), "a.");
    }

    #[test]
    fn huge_heavy_tier_does_not_overflow() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut list: WeightedNameRecordList =
            (0..70_000).map(|_| srv("heavy.", 0, u16::MAX)).collect();
        list.append(srv("light.", 0, 1));
        assert_eq!(list.len(), 70_001);

        assert!(list.take_next_with(&mut rng).is_some());
        assert_eq!(list.len(), 70_000);
    }
}

//! Ordered alarm lists, one per clock class.
//!
//! Each [`AlarmList`] is kept sorted by `trigger_at` at all times. Inserts go
//! after every record with an equal trigger time, so ties fire in insertion
//! order. Because the list is sorted, the due records always form a prefix.

use std::collections::VecDeque;

use alarmd_core::{AlarmRecord, ClassMask, ClockClass, Target};

/// Sorted alarms for a single clock class.
#[derive(Debug, Clone)]
pub struct AlarmList {
    class: ClockClass,
    records: VecDeque<AlarmRecord>,
}

impl AlarmList {
    pub fn new(class: ClockClass) -> Self {
        Self {
            class,
            records: VecDeque::new(),
        }
    }

    pub fn class(&self) -> ClockClass {
        self.class
    }

    /// Insert in sorted position and return that position.
    pub fn insert(&mut self, record: AlarmRecord) -> usize {
        debug_assert_eq!(record.class, self.class);
        let pos = self
            .records
            .partition_point(|r| r.trigger_at <= record.trigger_at);
        self.records.insert(pos, record);
        pos
    }

    pub fn peek_earliest(&self) -> Option<&AlarmRecord> {
        self.records.front()
    }

    /// Remove and return, in ascending order, every record with
    /// `trigger_at <= now`.
    pub fn take_due(&mut self, now: i64) -> Vec<AlarmRecord> {
        let split = self.records.partition_point(|r| r.trigger_at <= now);
        self.records.drain(..split).collect()
    }

    /// Remove every record matching `pred`, returning how many went.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&AlarmRecord) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !pred(r));
        before - self.records.len()
    }

    pub fn any(&self, mut pred: impl FnMut(&AlarmRecord) -> bool) -> bool {
        self.records.iter().any(|r| pred(r))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlarmRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The four per-class lists.
#[derive(Debug, Clone)]
pub struct AlarmStore {
    lists: [AlarmList; 4],
}

impl Default for AlarmStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmStore {
    pub fn new() -> Self {
        Self {
            lists: ClockClass::ALL.map(AlarmList::new),
        }
    }

    pub fn list(&self, class: ClockClass) -> &AlarmList {
        &self.lists[class.index()]
    }

    pub fn list_mut(&mut self, class: ClockClass) -> &mut AlarmList {
        &mut self.lists[class.index()]
    }

    /// Insert into the record's class list; returns the sorted position.
    pub fn insert(&mut self, record: AlarmRecord) -> usize {
        self.list_mut(record.class).insert(record)
    }

    pub fn peek_earliest(&self, class: ClockClass) -> Option<&AlarmRecord> {
        self.list(class).peek_earliest()
    }

    pub fn take_due(&mut self, class: ClockClass, now: i64) -> Vec<AlarmRecord> {
        self.list_mut(class).take_due(now)
    }

    /// Remove `target` from every list selected by `scope`.
    /// Returns whether anything was removed.
    pub fn remove_target(&mut self, target: &Target, scope: ClassMask) -> bool {
        let mut found = false;
        for class in scope.classes() {
            if self.list_mut(class).remove_where(|r| &r.target == target) > 0 {
                found = true;
            }
        }
        found
    }

    /// Remove every alarm owned by `principal` from all four lists.
    pub fn remove_principal(&mut self, principal: &str) -> usize {
        self.remove_all_where(|r| r.target.principal == principal)
    }

    /// Remove every alarm whose creator belongs to `user_id`.
    pub fn remove_user(&mut self, user_id: u32) -> usize {
        self.remove_all_where(|r| r.target.user_id() == user_id)
    }

    pub fn contains_principal(&self, principal: &str) -> bool {
        self.lists
            .iter()
            .any(|list| list.any(|r| r.target.principal == principal))
    }

    /// Smallest head trigger time across all classes, compared raw.
    pub fn next_trigger(&self) -> Option<i64> {
        self.lists
            .iter()
            .filter_map(|list| list.peek_earliest().map(|r| r.trigger_at))
            .min()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlarmRecord> {
        self.lists.iter().flat_map(|list| list.iter())
    }

    pub fn len(&self) -> usize {
        self.lists.iter().map(AlarmList::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(AlarmList::is_empty)
    }

    fn remove_all_where(&mut self, mut pred: impl FnMut(&AlarmRecord) -> bool) -> usize {
        self.lists
            .iter_mut()
            .map(|list| list.remove_where(&mut pred))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(class: ClockClass, at: i64, principal: &str) -> AlarmRecord {
        AlarmRecord::new(class, at, 0, Target::new(principal, 10_001))
    }

    fn triggers(list: &AlarmList) -> Vec<i64> {
        list.iter().map(|r| r.trigger_at).collect()
    }

    fn assert_sorted(store: &AlarmStore) {
        for class in ClockClass::ALL {
            let t = triggers(store.list(class));
            assert!(t.windows(2).all(|w| w[0] <= w[1]), "{class} unsorted: {t:?}");
        }
    }

    #[test]
    fn insert_keeps_sorted_and_reports_position() {
        let mut list = AlarmList::new(ClockClass::Rtc);
        assert_eq!(list.insert(record(ClockClass::Rtc, 50, "a")), 0);
        assert_eq!(list.insert(record(ClockClass::Rtc, 10, "b")), 0);
        assert_eq!(list.insert(record(ClockClass::Rtc, 30, "c")), 1);
        assert_eq!(list.insert(record(ClockClass::Rtc, 99, "d")), 3);
        assert_eq!(triggers(&list), vec![10, 30, 50, 99]);
    }

    #[test]
    fn equal_trigger_times_keep_insertion_order() {
        let mut list = AlarmList::new(ClockClass::Elapsed);
        list.insert(record(ClockClass::Elapsed, 10, "first"));
        list.insert(record(ClockClass::Elapsed, 10, "second"));
        let pos = list.insert(record(ClockClass::Elapsed, 10, "third"));
        assert_eq!(pos, 2);
        let names: Vec<_> = list.iter().map(|r| r.target.principal.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn take_due_returns_maximal_prefix() {
        let mut list = AlarmList::new(ClockClass::Rtc);
        for at in [5, 10, 10, 11, 20] {
            list.insert(record(ClockClass::Rtc, at, "p"));
        }
        let due = list.take_due(10);
        assert_eq!(due.iter().map(|r| r.trigger_at).collect::<Vec<_>>(), vec![5, 10, 10]);
        assert_eq!(triggers(&list), vec![11, 20]);
        assert!(list.iter().all(|r| r.trigger_at > 10));
    }

    #[test]
    fn take_due_on_empty_or_future_list() {
        let mut list = AlarmList::new(ClockClass::Rtc);
        assert!(list.take_due(100).is_empty());
        list.insert(record(ClockClass::Rtc, 200, "p"));
        assert!(list.take_due(100).is_empty());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_target_respects_scope() {
        let mut store = AlarmStore::new();
        let target = Target::new("com.a", 10_001);
        store.insert(AlarmRecord::new(ClockClass::RtcWakeup, 10, 0, target.clone()));
        store.insert(AlarmRecord::new(ClockClass::Elapsed, 10, 0, target.clone()));

        assert!(store.remove_target(&target, ClassMask::wakeup()));
        assert!(store.list(ClockClass::RtcWakeup).is_empty());
        assert_eq!(store.list(ClockClass::Elapsed).len(), 1);

        assert!(!store.remove_target(&target, ClassMask::wakeup()));
        assert!(store.remove_target(&target, ClassMask::all()));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_principal_and_user() {
        let mut store = AlarmStore::new();
        store.insert(record(ClockClass::Rtc, 1, "com.a"));
        store.insert(record(ClockClass::Elapsed, 2, "com.a"));
        store.insert(record(ClockClass::Elapsed, 3, "com.b"));
        store.insert(AlarmRecord::new(
            ClockClass::RtcWakeup,
            4,
            0,
            Target::new("com.c", 1_010_001),
        ));

        assert!(store.contains_principal("com.a"));
        assert_eq!(store.remove_principal("com.a"), 2);
        assert!(!store.contains_principal("com.a"));

        assert_eq!(store.remove_user(10), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove_user(10), 0);
    }

    #[test]
    fn next_trigger_across_classes() {
        let mut store = AlarmStore::new();
        assert_eq!(store.next_trigger(), None);
        store.insert(record(ClockClass::Rtc, 500, "a"));
        store.insert(record(ClockClass::ElapsedWakeup, 40, "b"));
        store.insert(record(ClockClass::Elapsed, 70, "c"));
        assert_eq!(store.next_trigger(), Some(40));
    }

    #[test]
    fn mixed_operations_keep_every_list_sorted() {
        let mut store = AlarmStore::new();
        // Small LCG so the sequence is deterministic.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            seed >> 33
        };

        for step in 0..500 {
            let class = ClockClass::ALL[(next() % 4) as usize];
            let principal = format!("p{}", next() % 7);
            match next() % 5 {
                0 | 1 | 2 => {
                    store.insert(record(class, (next() % 1_000) as i64, &principal));
                }
                3 => {
                    let due = store.take_due(class, (next() % 1_000) as i64);
                    assert!(due.windows(2).all(|w| w[0].trigger_at <= w[1].trigger_at));
                }
                _ => {
                    store.remove_principal(&principal);
                }
            }
            if step % 25 == 0 {
                assert_sorted(&store);
            }
        }
        assert_sorted(&store);
    }
}

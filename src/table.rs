// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The bounded process table: one slot per live worker, coordinator-private.

use std::fmt;

use thiserror::Error;

use crate::clock::ClockValue;
use crate::spawn::WorkerId;

/// Fixed slot count; must stay above the maximum admissible concurrency.
pub const TABLE_CAPACITY: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TableFault {
    #[error("slot {0} is already occupied")]
    Occupied(usize),
    #[error("slot {0} is vacant")]
    Vacant(usize),
    #[error("slot index {0} out of range")]
    OutOfRange(usize),
}

/// One worker's launch record while its slot is occupied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchRecord {
    worker: WorkerId,
    start: ClockValue,
    deadline: ClockValue,
}

impl LaunchRecord {
    pub fn new(worker: WorkerId, start: ClockValue, deadline: ClockValue) -> Self {
        debug_assert!(deadline >= start);
        LaunchRecord {
            worker,
            start,
            deadline,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn start(&self) -> ClockValue {
        self.start
    }

    pub fn deadline(&self) -> ClockValue {
        self.deadline
    }
}

impl fmt::Display for LaunchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} start {} deadline {}",
            self.worker, self.start, self.deadline
        )
    }
}

pub struct ProcessTable {
    slots: Vec<Option<LaunchRecord>>,
}

impl ProcessTable {
    pub fn new(capacity: usize) -> Self {
        ProcessTable {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Lowest-index free slot, or `None` when the table is full. A full table
    /// is backpressure for the scheduler, not an error.
    pub fn allocate_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    pub fn occupy(&mut self, index: usize, record: LaunchRecord) -> Result<(), TableFault> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(TableFault::OutOfRange(index))?;
        if slot.is_some() {
            return Err(TableFault::Occupied(index));
        }
        *slot = Some(record);
        Ok(())
    }

    /// Clears a slot, returning its record. Releasing a vacant slot is a
    /// logic fault on the caller's side and is reported, never ignored.
    pub fn release(&mut self, index: usize) -> Result<LaunchRecord, TableFault> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(TableFault::OutOfRange(index))?;
        slot.take().ok_or(TableFault::Vacant(index))
    }

    /// Slot index holding the given worker, if any.
    pub fn find(&self, worker: WorkerId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.map(|r| r.worker()) == Some(worker))
    }

    /// Index-ordered view over every capacity slot, occupied or not, so
    /// reports always have the same shape.
    pub fn snapshot(&self) -> impl Iterator<Item = (usize, Option<&LaunchRecord>)> + '_ {
        self.slots.iter().enumerate().map(|(i, s)| (i, s.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: u32) -> LaunchRecord {
        LaunchRecord::new(
            WorkerId(id),
            ClockValue::from_parts(0, 10_000_000),
            ClockValue::from_parts(1, 10_000_000),
        )
    }

    #[test]
    fn allocates_lowest_free_index() {
        let mut table = ProcessTable::new(3);
        assert_eq!(table.allocate_slot(), Some(0));
        table.occupy(0, record(1)).unwrap();
        table.occupy(1, record(2)).unwrap();
        assert_eq!(table.allocate_slot(), Some(2));

        // freeing the head makes it the preferred slot again
        table.release(0).unwrap();
        assert_eq!(table.allocate_slot(), Some(0));
    }

    #[test]
    fn full_table_is_backpressure_not_error() {
        let mut table = ProcessTable::new(2);
        table.occupy(0, record(1)).unwrap();
        table.occupy(1, record(2)).unwrap();
        assert_eq!(table.allocate_slot(), None);
        assert_eq!(table.occupied(), 2);
    }

    #[test]
    fn occupying_an_occupied_slot_is_a_fault() {
        let mut table = ProcessTable::new(2);
        table.occupy(0, record(1)).unwrap();
        assert_eq!(table.occupy(0, record(2)), Err(TableFault::Occupied(0)));
    }

    #[test]
    fn double_release_is_a_fault() {
        let mut table = ProcessTable::new(2);
        table.occupy(0, record(1)).unwrap();
        let released = table.release(0).unwrap();
        assert_eq!(released.worker(), WorkerId(1));
        assert_eq!(table.release(0), Err(TableFault::Vacant(0)));
    }

    #[test]
    fn out_of_range_indexes_are_faults() {
        let mut table = ProcessTable::new(1);
        assert_eq!(table.occupy(5, record(1)), Err(TableFault::OutOfRange(5)));
        assert_eq!(table.release(5), Err(TableFault::OutOfRange(5)));
    }

    #[test]
    fn find_locates_a_worker_by_identity() {
        let mut table = ProcessTable::new(3);
        table.occupy(1, record(7)).unwrap();
        assert_eq!(table.find(WorkerId(7)), Some(1));
        assert_eq!(table.find(WorkerId(8)), None);
    }

    #[test]
    fn snapshot_visits_every_slot_in_order() {
        let mut table = ProcessTable::new(4);
        table.occupy(2, record(9)).unwrap();
        let view: Vec<(usize, bool)> = table
            .snapshot()
            .map(|(i, slot)| (i, slot.is_some()))
            .collect();
        assert_eq!(view, vec![(0, false), (1, false), (2, true), (3, false)]);
    }
}

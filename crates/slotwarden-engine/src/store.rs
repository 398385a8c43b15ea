//! Fixed-size slot table.
//!
//! Every slot 1..=N exists from construction and is never removed. Each cell
//! carries two locks:
//!
//! - `record`: a short synchronous lock guarding the slot itself. Mutators
//!   run against a copy and the copy is committed only if the mutator
//!   succeeds, so a rejected command leaves no partial update.
//! - `lane`: an async FIFO lock held by operator commands for their whole
//!   duration (including device I/O), so commands on one slot apply in
//!   submission order. Access events do not take the lane; they only need
//!   the record lock, which is never held across an await.

use std::sync::{Mutex, MutexGuard, PoisonError};

use slotwarden_core::{Error, Result, Slot, SlotId};
use tracing::warn;

#[derive(Debug)]
struct SlotCell {
    record: Mutex<Slot>,
    lane: tokio::sync::Mutex<()>,
}

impl SlotCell {
    fn new(slot: Slot) -> Self {
        Self {
            record: Mutex::new(slot),
            lane: tokio::sync::Mutex::new(()),
        }
    }

    fn record(&self) -> MutexGuard<'_, Slot> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard serializing operator commands on one slot.
pub type LaneGuard<'a> = tokio::sync::MutexGuard<'a, ()>;

/// In-memory table of slot records.
#[derive(Debug)]
pub struct SlotStore {
    cells: Vec<SlotCell>,
}

impl SlotStore {
    /// A table of `slot_count` unassigned slots.
    pub fn new(slot_count: u16) -> Self {
        Self::from_slots(slot_count, Vec::new())
    }

    /// A table of `slot_count` slots, filled from previously persisted
    /// records. Records outside the range are dropped with a warning.
    pub fn from_slots(slot_count: u16, slots: Vec<Slot>) -> Self {
        let mut table: Vec<Slot> = (1..=slot_count)
            .map(|id| Slot::unassigned(SlotId::new(id)))
            .collect();

        for slot in slots {
            match index_of(slot.id, table.len()) {
                Some(index) => table[index] = slot,
                None => warn!("Dropping persisted slot {} outside 1..={}", slot.id, slot_count),
            }
        }

        Self {
            cells: table.into_iter().map(SlotCell::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn cell(&self, id: SlotId) -> Result<&SlotCell> {
        index_of(id, self.cells.len())
            .map(|index| &self.cells[index])
            .ok_or_else(|| Error::not_found(id))
    }

    /// Check that `id` is inside `[1, N]`.
    pub fn contains(&self, id: SlotId) -> bool {
        index_of(id, self.cells.len()).is_some()
    }

    /// Current copy of a slot.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` outside `[1, N]`.
    pub fn get(&self, id: SlotId) -> Result<Slot> {
        Ok(self.cell(id)?.record().clone())
    }

    /// Apply `mutator` atomically and return the updated slot.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` outside `[1, N]`, or the mutator's error, in
    /// which case the slot is unchanged.
    pub fn upsert<F>(&self, id: SlotId, mutator: F) -> Result<Slot>
    where
        F: FnOnce(&mut Slot) -> Result<()>,
    {
        self.upsert_with(id, |slot| {
            mutator(slot)?;
            Ok(slot.clone())
        })
    }

    /// Like [`upsert`](Self::upsert), returning whatever the mutator returns.
    pub fn upsert_with<F, T>(&self, id: SlotId, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut Slot) -> Result<T>,
    {
        let cell = self.cell(id)?;
        let mut record = cell.record();

        let mut draft = record.clone();
        let value = mutator(&mut draft)?;
        *record = draft;

        Ok(value)
    }

    /// Every slot, ordered by id.
    pub fn all(&self) -> Vec<Slot> {
        self.cells.iter().map(|cell| cell.record().clone()).collect()
    }

    /// Wait for this slot's command lane.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` outside `[1, N]`.
    pub async fn lane(&self, id: SlotId) -> Result<LaneGuard<'_>> {
        Ok(self.cell(id)?.lane.lock().await)
    }

    /// Take every lane in id order, for whole-table commands.
    pub async fn lane_all(&self) -> Vec<LaneGuard<'_>> {
        let mut guards = Vec::with_capacity(self.cells.len());
        for cell in &self.cells {
            guards.push(cell.lane.lock().await);
        }
        guards
    }

    /// Overwrite the whole table. Callers hold every lane.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` unless `slots` holds exactly ids 1..=N in
    /// order.
    pub fn replace_all(&self, slots: Vec<Slot>) -> Result<()> {
        if slots.len() != self.cells.len()
            || slots
                .iter()
                .enumerate()
                .any(|(index, slot)| index_of(slot.id, self.cells.len()) != Some(index))
        {
            return Err(Error::validation(format!(
                "Replacement table must hold slots 1..={} in order",
                self.cells.len()
            )));
        }

        for (cell, slot) in self.cells.iter().zip(slots) {
            *cell.record() = slot;
        }
        Ok(())
    }
}

fn index_of(id: SlotId, len: usize) -> Option<usize> {
    let index = usize::from(id.as_u16()).checked_sub(1)?;
    (index < len).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_all_slots_exist_from_start() {
        let store = SlotStore::new(20);

        let slots = store.all();
        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0].id, SlotId::new(1));
        assert_eq!(slots[19].id, SlotId::new(20));
        assert!(slots.iter().all(|s| !s.is_assigned()));
    }

    #[test]
    fn test_out_of_range_is_not_found() {
        let store = SlotStore::new(20);

        for id in [0, 21] {
            let id = SlotId::new(id);
            assert_eq!(store.get(id), Err(Error::not_found(id)));
            assert!(store.upsert(id, |_| Ok(())).is_err());
        }
    }

    #[test]
    fn test_failed_mutator_leaves_slot_unchanged() {
        let store = SlotStore::new(3);
        let id = SlotId::new(2);

        let result = store.upsert(id, |slot| {
            slot.name = "half applied".to_string();
            Err(Error::validation("rejected"))
        });

        assert!(result.is_err());
        assert_eq!(store.get(id).unwrap().name, "");
    }

    #[test]
    fn test_from_slots_drops_out_of_range_records() {
        let mut kept = Slot::unassigned(SlotId::new(2));
        kept.name = "Kept".to_string();
        let dropped = Slot::unassigned(SlotId::new(9));

        let store = SlotStore::from_slots(3, vec![kept, dropped]);

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(SlotId::new(2)).unwrap().name, "Kept");
    }

    #[test]
    fn test_replace_all_requires_full_ordered_table() {
        let store = SlotStore::new(3);

        let short: Vec<Slot> = (1..=2).map(|id| Slot::unassigned(SlotId::new(id))).collect();
        assert!(store.replace_all(short).is_err());

        let mut reordered: Vec<Slot> = (1..=3).map(|id| Slot::unassigned(SlotId::new(id))).collect();
        reordered.swap(0, 2);
        assert!(store.replace_all(reordered).is_err());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_are_not_lost() {
        let store = Arc::new(SlotStore::new(1));
        let id = SlotId::new(1);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .upsert(id, |slot| {
                        slot.usage_count += 1;
                        Ok(())
                    })
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get(id).unwrap().usage_count, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lane_serializes_in_order() {
        let store = Arc::new(SlotStore::new(1));
        let id = SlotId::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let first_lane = store.lane(id).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..3 {
            let store = Arc::clone(&store);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _lane = store.lane(id).await.unwrap();
                order.lock().unwrap().push(n);
            }));
            // Let each waiter queue before spawning the next
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        drop(first_lane);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}

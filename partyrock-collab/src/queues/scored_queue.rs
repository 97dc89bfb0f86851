use std::cmp::Reverse;

use parking_lot::Mutex;

use crate::{PrimaryKey, QueueEntryData, QueuePositionUpdate, SongData};

pub type QueueEntryId = PrimaryKey;

/// A single entry in a [ScoredQueue]
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub song: SongData,
    /// Ordering key. Higher scores play sooner.
    pub score: i64,
    /// Rank within the queue. Always contiguous from zero.
    pub position: i32,
}

/// A queue ordered by descending score.
///
/// Entries with equal scores keep their submission order, using the entry id
/// as the tie-break since ids are assigned in submission order.
#[derive(Default)]
pub struct ScoredQueue {
    entries: Mutex<Vec<QueueEntry>>,
}

impl ScoredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a queue from persisted entries
    pub fn restore(persisted: Vec<QueueEntryData>) -> Self {
        let queue = Self::new();

        {
            let mut entries = queue.entries.lock();

            entries.extend(persisted.into_iter().map(|e| QueueEntry {
                id: e.id,
                song: e.song,
                score: e.score,
                position: e.position,
            }));

            sort_and_renumber(&mut entries);
        }

        queue
    }

    /// Returns the position a new entry with the given score would take.
    /// Equal scores order after existing entries, keeping submission order.
    pub fn insertion_position(&self, score: i64) -> i32 {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.score >= score)
            .count() as i32
    }

    pub fn push(&self, entry: QueueEntry) {
        let mut entries = self.entries.lock();
        entries.push(entry);
        sort_and_renumber(&mut entries);
    }

    /// The entry that plays next, if any
    pub fn front(&self) -> Option<QueueEntry> {
        self.entries.lock().first().cloned()
    }

    pub fn get(&self, entry_id: QueueEntryId) -> Option<QueueEntry> {
        self.entries.lock().iter().find(|e| e.id == entry_id).cloned()
    }

    /// Removes an entry, closing the position gap it leaves behind
    pub fn remove(&self, entry_id: QueueEntryId) -> Option<QueueEntry> {
        let mut entries = self.entries.lock();

        let index = entries.iter().position(|e| e.id == entry_id)?;
        let removed = entries.remove(index);

        sort_and_renumber(&mut entries);
        Some(removed)
    }

    /// Returns the queue as it would look with the entry rescored, without
    /// applying anything. The caller persists the plan first, then commits
    /// it with [ScoredQueue::replace].
    pub fn plan_rescore(&self, entry_id: QueueEntryId, new_score: i64) -> Option<Vec<QueueEntry>> {
        let mut plan = self.entries.lock().clone();

        let entry = plan.iter_mut().find(|e| e.id == entry_id)?;
        entry.score = new_score;

        sort_and_renumber(&mut plan);
        Some(plan)
    }

    /// Replaces the queue contents with a previously planned arrangement
    pub fn replace(&self, new_entries: Vec<QueueEntry>) {
        *self.entries.lock() = new_entries;
    }

    /// A consistent snapshot of the queue in play order
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn sort_and_renumber(entries: &mut [QueueEntry]) {
    entries.sort_by_key(|e| (Reverse(e.score), e.id));

    for (index, entry) in entries.iter_mut().enumerate() {
        entry.position = index as i32;
    }
}

pub fn updates_for(plan: &[QueueEntry]) -> Vec<QueuePositionUpdate> {
    plan.iter()
        .map(|e| QueuePositionUpdate {
            entry_id: e.id,
            score: e.score,
            position: e.position,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(id: QueueEntryId, title: &str, score: i64) -> QueueEntry {
        QueueEntry {
            id,
            song: SongData {
                id,
                title: title.to_string(),
                artist: None,
            },
            score,
            position: 0,
        }
    }

    fn titles(entries: &[QueueEntry]) -> Vec<String> {
        entries.iter().map(|e| e.song.title.clone()).collect()
    }

    #[test]
    fn orders_by_descending_score() {
        let queue = ScoredQueue::new();

        queue.push(entry(1, "strawberries", 5));
        queue.push(entry(2, "bananas", 10));
        queue.push(entry(3, "apples", 7));

        assert_eq!(
            titles(&queue.entries()),
            vec!["bananas", "apples", "strawberries"]
        );
    }

    #[test]
    fn equal_scores_keep_submission_order() {
        let queue = ScoredQueue::new();

        queue.push(entry(1, "strawberries", 5));
        queue.push(entry(2, "bananas", 5));
        queue.push(entry(3, "apples", 5));

        assert_eq!(
            titles(&queue.entries()),
            vec!["strawberries", "bananas", "apples"]
        );
    }

    #[test]
    fn positions_stay_contiguous() {
        let queue = ScoredQueue::new();

        queue.push(entry(1, "strawberries", 3));
        queue.push(entry(2, "bananas", 9));
        queue.push(entry(3, "apples", 6));
        queue.remove(2);
        queue.push(entry(4, "windows", 12));

        let positions: Vec<_> = queue.entries().iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn insertion_position_orders_after_equal_scores() {
        let queue = ScoredQueue::new();

        queue.push(entry(1, "strawberries", 5));
        queue.push(entry(2, "bananas", 5));

        assert_eq!(queue.insertion_position(10), 0);
        assert_eq!(queue.insertion_position(5), 2);
        assert_eq!(queue.insertion_position(1), 2);
    }

    #[test]
    fn rescore_reorders_with_stable_ties() {
        let queue = ScoredQueue::new();

        queue.push(entry(1, "strawberries", 5));
        queue.push(entry(2, "bananas", 10));
        queue.push(entry(3, "apples", 7));

        let plan = queue.plan_rescore(1, 10).expect("entry exists");
        queue.replace(plan);

        // Entry 1 ties with entry 2, and was submitted first
        assert_eq!(
            titles(&queue.entries()),
            vec!["strawberries", "bananas", "apples"]
        );

        assert!(queue.plan_rescore(99, 1).is_none());
    }
}

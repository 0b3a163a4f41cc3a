//! Fair weighted round-robin over load priority classes.

use std::collections::VecDeque;

use crate::types::LOAD_PRIORITY_COUNT;

use super::token::LoadPriority;

/// One FIFO per [`LoadPriority`], drained in weighted cycles.
///
/// A cycle visits Update, High, Normal and Low in that order and takes up
/// to [`LoadPriority::weight`] items from each nonempty class. Every
/// nonempty class is serviced once per cycle, so no class starves.
#[derive(Debug)]
pub struct LoadScheduler<T> {
    queues: [VecDeque<T>; LOAD_PRIORITY_COUNT],
}

impl<T> Default for LoadScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LoadScheduler<T> {
    /// Empty scheduler.
    pub fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| VecDeque::new()),
        }
    }

    /// Append `item` to the FIFO of `priority`.
    pub fn push(&mut self, priority: LoadPriority, item: T) {
        self.queues[priority.index()].push_back(item);
    }

    /// Pending items of every class.
    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Pending items of one class.
    pub fn len_of(&self, priority: LoadPriority) -> usize {
        self.queues[priority.index()].len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    /// Take the items of the next drain cycle, in service order.
    pub fn next_cycle(&mut self) -> Vec<(LoadPriority, T)> {
        let mut cycle = Vec::new();
        for priority in LoadPriority::ALL {
            let queue = &mut self.queues[priority.index()];
            let take = priority.weight().min(queue.len());
            cycle.extend(queue.drain(..take).map(|item| (priority, item)));
        }
        cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_is_weighted() {
        let mut scheduler = LoadScheduler::new();
        for i in 0..10 {
            for priority in LoadPriority::ALL {
                scheduler.push(priority, i);
            }
        }
        let cycle = scheduler.next_cycle();
        let count = |p| cycle.iter().filter(|(q, _)| *q == p).count();
        assert_eq!(count(LoadPriority::Update), 4);
        assert_eq!(count(LoadPriority::High), 3);
        assert_eq!(count(LoadPriority::Normal), 2);
        assert_eq!(count(LoadPriority::Low), 1);
        assert_eq!(scheduler.len(), 40 - 10);
    }

    #[test]
    fn test_fifo_within_class() {
        let mut scheduler = LoadScheduler::new();
        for i in 0..5 {
            scheduler.push(LoadPriority::Normal, i);
        }
        let mut order = Vec::new();
        while !scheduler.is_empty() {
            order.extend(scheduler.next_cycle().into_iter().map(|(_, i)| i));
        }
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_high_not_starved_by_low() {
        let mut scheduler = LoadScheduler::new();
        for i in 0..10 {
            scheduler.push(LoadPriority::Low, i);
        }
        scheduler.push(LoadPriority::High, 100);

        let mut low_before_high = 0;
        'drain: loop {
            for (priority, _) in scheduler.next_cycle() {
                if priority == LoadPriority::High {
                    break 'drain;
                }
                low_before_high += 1;
            }
        }
        assert!(low_before_high <= LoadPriority::Low.weight());
        assert_eq!(scheduler.len_of(LoadPriority::Low), 10 - low_before_high);
    }
}

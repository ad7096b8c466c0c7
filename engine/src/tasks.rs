//! The cooperative task scheduler that drives all time-based behaviour.
//!
//! Everything that happens "later" — monster AI wakeups, motion arrivals,
//! door timers, home healing — is a [`Task`] queued here. The scheduler owns
//! the global virtual time (GVT, integer milliseconds) and is the only thing
//! that advances it. A task runs to completion, may enqueue further tasks
//! (including itself, by moving itself back in), and never blocks.

use crate::world::World;
use std::cmp::Ordering;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Task priorities. Within one trigger time, `Normal` runs before `Low`.
/// Monster AI reschedules itself at `Low` so motion completion and damage
/// resolution are already settled when it looks around.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    Normal = 0,
    Low = 1,
}

/// A deferred action. `execute` consumes the box, so a task that wants to run
/// again simply re-adds itself.
pub trait Task: Send + Sync {
    fn execute(self: Box<Self>, world: &mut World, sched: &mut TaskScheduler);
}

struct Entry {
    time: i32,
    priority: TaskPriority,
    seq: u64,
    task: Box<dyn Task>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.priority, self.seq).cmp(&(other.time, other.priority, other.seq))
    }
}

/// The scheduler: a priority queue keyed by (trigger time, priority,
/// insertion order). The insertion order tie-break makes replays
/// reproducible.
#[derive(Default)]
pub struct TaskScheduler {
    queue: BinaryHeap<Reverse<Entry>>,
    gvt: i32,
    next_seq: u64,
}

impl TaskScheduler {
    pub fn new() -> Self {
        TaskScheduler::default()
    }

    /// The current global virtual time in milliseconds.
    pub fn gvt(&self) -> i32 {
        self.gvt
    }

    /// Queues a task. Scheduling into the past is a programmer error; in
    /// release builds the trigger is clamped to "now".
    pub fn add_task(&mut self, task: Box<dyn Task>, priority: TaskPriority, trigger_time: i32) {
        debug_assert!(
            trigger_time >= self.gvt,
            "task scheduled in the past ({trigger_time} < {})",
            self.gvt
        );
        let time = trigger_time.max(self.gvt);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry {
            time,
            priority,
            seq,
            task,
        }));
    }

    /// Executes every task with trigger time `<= end_time`, advancing GVT to
    /// each task's trigger before running it, and to `end_time` afterwards.
    /// With an empty queue this just moves the clock.
    pub fn run_until(&mut self, end_time: i32, world: &mut World) {
        loop {
            let due = matches!(self.queue.peek(), Some(Reverse(e)) if e.time <= end_time);
            if !due {
                break;
            }
            let Reverse(entry) = self.queue.pop().expect("peeked entry vanished");
            debug_assert!(entry.time >= self.gvt);
            self.gvt = self.gvt.max(entry.time);
            entry.task.execute(world, self);
        }
        self.gvt = self.gvt.max(end_time);
    }

    pub fn num_pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;
    use std::sync::{Arc, Mutex};

    type Trace = Arc<Mutex<Vec<(&'static str, i32)>>>;

    struct Recorder {
        name: &'static str,
        trace: Trace,
    }

    impl Task for Recorder {
        fn execute(self: Box<Self>, _world: &mut World, sched: &mut TaskScheduler) {
            self.trace.lock().unwrap().push((self.name, sched.gvt()));
        }
    }

    struct SelfRepeating {
        period: i32,
        remaining: u32,
        trace: Trace,
    }

    impl Task for SelfRepeating {
        fn execute(mut self: Box<Self>, _world: &mut World, sched: &mut TaskScheduler) {
            self.trace.lock().unwrap().push(("tick", sched.gvt()));
            self.remaining -= 1;
            if self.remaining > 0 {
                let when = sched.gvt() + self.period;
                sched.add_task(self, TaskPriority::Low, when);
            }
        }
    }

    fn recorder(name: &'static str, trace: &Trace) -> Box<Recorder> {
        Box::new(Recorder {
            name,
            trace: trace.clone(),
        })
    }

    #[test]
    fn tasks_run_in_time_priority_insertion_order() {
        let mut world = World::for_tests(8, 8, 2);
        let mut sched = TaskScheduler::new();
        let trace: Trace = Arc::default();

        sched.add_task(recorder("A", &trace), TaskPriority::Normal, 100);
        sched.add_task(recorder("B", &trace), TaskPriority::Low, 100);
        sched.add_task(recorder("C", &trace), TaskPriority::Normal, 50);
        sched.run_until(200, &mut world);

        assert_eq!(
            trace.lock().unwrap().as_slice(),
            &[("C", 50), ("A", 100), ("B", 100)]
        );
        assert_eq!(sched.gvt(), 200);
    }

    #[test]
    fn same_time_same_priority_keeps_insertion_order() {
        let mut world = World::for_tests(8, 8, 2);
        let mut sched = TaskScheduler::new();
        let trace: Trace = Arc::default();

        for name in ["first", "second", "third"] {
            sched.add_task(recorder(name, &trace), TaskPriority::Low, 70);
        }
        sched.run_until(70, &mut world);

        assert_eq!(
            trace.lock().unwrap().as_slice(),
            &[("first", 70), ("second", 70), ("third", 70)]
        );
    }

    #[test]
    fn run_until_with_empty_queue_just_moves_the_clock() {
        let mut world = World::for_tests(8, 8, 2);
        let mut sched = TaskScheduler::new();
        sched.run_until(1234, &mut world);
        assert_eq!(sched.gvt(), 1234);
        // Running backwards in time is a no-op.
        sched.run_until(1000, &mut world);
        assert_eq!(sched.gvt(), 1234);
    }

    #[test]
    fn tasks_can_reschedule_themselves() {
        let mut world = World::for_tests(8, 8, 2);
        let mut sched = TaskScheduler::new();
        let trace: Trace = Arc::default();

        sched.add_task(
            Box::new(SelfRepeating {
                period: 10,
                remaining: 4,
                trace: trace.clone(),
            }),
            TaskPriority::Low,
            10,
        );
        sched.run_until(100, &mut world);

        assert_eq!(
            trace.lock().unwrap().as_slice(),
            &[("tick", 10), ("tick", 20), ("tick", 30), ("tick", 40)]
        );
        assert_eq!(sched.num_pending(), 0);
    }

    #[test]
    fn tasks_past_the_horizon_stay_queued() {
        let mut world = World::for_tests(8, 8, 2);
        let mut sched = TaskScheduler::new();
        let trace: Trace = Arc::default();

        sched.add_task(recorder("late", &trace), TaskPriority::Normal, 500);
        sched.run_until(499, &mut world);
        assert!(trace.lock().unwrap().is_empty());
        assert_eq!(sched.num_pending(), 1);

        sched.run_until(500, &mut world);
        assert_eq!(trace.lock().unwrap().as_slice(), &[("late", 500)]);
    }
}

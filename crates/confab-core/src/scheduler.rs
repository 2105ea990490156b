use std::time::Instant;

use super::state::TurnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledStep {
    Progress,
    Completion,
}

impl ScheduledStep {
    pub fn label(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Completion => "completion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub handle: TaskHandle,
    pub turn_id: TurnId,
    pub step: ScheduledStep,
    pub due: Instant,
}

/// Deadline queue for stage progression, polled by the host loop.
///
/// Nothing runs on its own: the host asks for the next deadline, waits at
/// most that long for input, then pops whatever is due. Tasks fire in
/// deadline order, ties broken by scheduling order. A cancelled task is
/// removed outright and can never be popped.
#[derive(Debug, Clone)]
pub struct TurnScheduler {
    next_handle: u64,
    tasks: Vec<ScheduledTask>,
}

impl Default for TurnScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnScheduler {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            tasks: Vec::new(),
        }
    }

    pub fn schedule(&mut self, turn_id: TurnId, step: ScheduledStep, due: Instant) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        self.tasks.push(ScheduledTask {
            handle,
            turn_id,
            step,
            due,
        });
        tracing::trace!(
            handle = handle.0,
            turn = turn_id.0,
            step = step.label(),
            "scheduled stage task"
        );
        handle
    }

    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.handle != handle);
        before != self.tasks.len()
    }

    pub fn cancel_turn(&mut self, turn_id: TurnId) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.turn_id != turn_id);
        let removed = before - self.tasks.len();
        if removed > 0 {
            tracing::debug!(turn = turn_id.0, removed, "cancelled stage tasks");
        }
        removed
    }

    pub fn cancel_all(&mut self) -> usize {
        let removed = self.tasks.len();
        self.tasks.clear();
        if removed > 0 {
            tracing::debug!(removed, "cancelled all stage tasks");
        }
        removed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().map(|task| task.due).min()
    }

    /// Removes and returns the earliest task due at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<ScheduledTask> {
        let idx = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due <= now)
            .min_by_key(|(_, task)| (task.due, task.handle))
            .map(|(idx, _)| idx)?;
        Some(self.tasks.remove(idx))
    }

    pub fn pending_for(&self, turn_id: TurnId) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.turn_id == turn_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn pops_in_deadline_order_then_scheduling_order() {
        let t0 = Instant::now();
        let mut scheduler = TurnScheduler::new();
        scheduler.schedule(TurnId(1), ScheduledStep::Completion, ms(t0, 300));
        scheduler.schedule(TurnId(2), ScheduledStep::Progress, ms(t0, 100));
        scheduler.schedule(TurnId(3), ScheduledStep::Progress, ms(t0, 100));

        let fired: Vec<TurnId> = std::iter::from_fn(|| scheduler.pop_due(ms(t0, 500)))
            .map(|task| task.turn_id)
            .collect();
        assert_eq!(fired, vec![TurnId(2), TurnId(3), TurnId(1)]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn nothing_fires_before_deadline() {
        let t0 = Instant::now();
        let mut scheduler = TurnScheduler::new();
        scheduler.schedule(TurnId(1), ScheduledStep::Progress, ms(t0, 1_500));

        assert_eq!(scheduler.pop_due(ms(t0, 1_499)), None);
        let task = scheduler.pop_due(ms(t0, 1_500)).expect("due at deadline");
        assert_eq!(task.step, ScheduledStep::Progress);
    }

    #[test]
    fn cancelled_tasks_never_fire() {
        let t0 = Instant::now();
        let mut scheduler = TurnScheduler::new();
        let handle = scheduler.schedule(TurnId(1), ScheduledStep::Progress, ms(t0, 10));
        scheduler.schedule(TurnId(2), ScheduledStep::Progress, ms(t0, 20));
        scheduler.schedule(TurnId(2), ScheduledStep::Completion, ms(t0, 30));

        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        assert_eq!(scheduler.cancel_turn(TurnId(2)), 2);
        assert_eq!(scheduler.pop_due(ms(t0, 1_000)), None);
    }

    #[test]
    fn next_deadline_tracks_earliest_live_task() {
        let t0 = Instant::now();
        let mut scheduler = TurnScheduler::new();
        assert_eq!(scheduler.next_deadline(), None);

        let early = scheduler.schedule(TurnId(1), ScheduledStep::Progress, ms(t0, 50));
        scheduler.schedule(TurnId(1), ScheduledStep::Completion, ms(t0, 90));
        assert_eq!(scheduler.next_deadline(), Some(ms(t0, 50)));

        scheduler.cancel(early);
        assert_eq!(scheduler.next_deadline(), Some(ms(t0, 90)));
        assert_eq!(scheduler.pending_for(TurnId(1)), 1);

        assert_eq!(scheduler.cancel_all(), 1);
        assert_eq!(scheduler.next_deadline(), None);
    }
}

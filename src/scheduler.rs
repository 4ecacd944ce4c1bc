use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

/// The cooperative single-threaded scheduler behind deferred render passes.
///
/// Time is a virtual millisecond clock so deferral is deterministic: a task
/// scheduled with no delay is due immediately on the next [`drain_pending`]
/// call, a delayed task becomes due once [`advance`] has moved the clock far
/// enough. Nothing runs outside an explicit drain.
///
/// [`drain_pending`]: Scheduler::drain_pending
/// [`advance`]: Scheduler::advance
pub struct Scheduler;

struct Task {
    due: u64,
    seq: u64,
    canceled: Rc<Cell<bool>>,
    run: Box<dyn FnOnce()>,
}

struct SchedulerState {
    now: Cell<u64>,
    seq: Cell<u64>,
    tasks: RefCell<VecDeque<Task>>,
}

thread_local! {
    static SCHEDULER: SchedulerState = SchedulerState {
        now: Cell::new(0),
        seq: Cell::new(0),
        tasks: RefCell::new(VecDeque::new()),
    };
}

/// Cancels its task when asked; a canceled task never runs. Dropping the
/// handle does not cancel.
#[derive(Clone)]
pub struct TaskHandle {
    canceled: Rc<Cell<bool>>,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.canceled.set(true);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.get()
    }
}

impl Scheduler {
    /// Schedules `f` to run at the current virtual time plus `delay_ms`
    /// (or immediately due when `None`).
    pub fn schedule(delay_ms: Option<u64>, f: impl FnOnce() + 'static) -> TaskHandle {
        let canceled = Rc::new(Cell::new(false));
        SCHEDULER.with(|s| {
            let seq = s.seq.get();
            s.seq.set(seq + 1);
            s.tasks.borrow_mut().push_back(Task {
                due: s.now.get() + delay_ms.unwrap_or(0),
                seq,
                canceled: canceled.clone(),
                run: Box::new(f),
            });
        });
        TaskHandle { canceled }
    }

    /// Runs every task due at the current virtual time, including tasks those
    /// tasks schedule, until quiescent.
    pub fn drain_pending() {
        loop {
            let next = SCHEDULER.with(|s| {
                let now = s.now.get();
                let mut tasks = s.tasks.borrow_mut();
                let due = tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= now && !t.canceled.get())
                    .min_by_key(|(_, t)| (t.due, t.seq))
                    .map(|(i, _)| i);
                due.and_then(|i| tasks.remove(i))
            });
            match next {
                Some(task) => (task.run)(),
                None => break,
            }
        }
        // drop canceled stragglers so they don't accumulate
        SCHEDULER.with(|s| s.tasks.borrow_mut().retain(|t| !t.canceled.get()));
    }

    /// Advances the virtual clock by `ms` and drains everything newly due.
    pub fn advance(ms: u64) {
        SCHEDULER.with(|s| s.now.set(s.now.get() + ms));
        Self::drain_pending();
    }

    pub fn now() -> u64 {
        SCHEDULER.with(|s| s.now.get())
    }
}

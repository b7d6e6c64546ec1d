use log::{debug, trace};
use owo_colors::OwoColorize;
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::Rc,
};

use crate::Pass;

type Task = Box<dyn FnOnce()>;

struct State {
    current: Cell<Pass>,
    torn_down: Cell<bool>,
    queues: RefCell<Vec<VecDeque<Task>>>,
    teardown: RefCell<Vec<Task>>,
}

/// Handle used to schedule work and to check the current pass.
///
/// Cloning is cheap, every clone refers to the same scheduler.
#[derive(Clone)]
pub struct Executor {
    state: Rc<State>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("current", &self.state.current.get())
            .field("torn_down", &self.state.torn_down.get())
            .finish()
    }
}

impl Executor {
    fn new() -> Self {
        let queues = Pass::ALL.iter().map(|_| VecDeque::new()).collect();

        Self {
            state: Rc::new(State {
                current: Cell::new(Pass::FIRST),
                torn_down: Cell::new(false),
                queues: RefCell::new(queues),
                teardown: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The pass being executed. After teardown this is always [`Pass::LAST`].
    pub fn current_pass(&self) -> Pass {
        if self.state.torn_down.get() {
            Pass::LAST
        } else {
            self.state.current.get()
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.state.torn_down.get()
    }

    /// Panics unless `min <= current <= max`, absent bounds are open.
    #[track_caller]
    pub fn check_pass(&self, min: Option<Pass>, max: Option<Pass>) {
        let current = self.current_pass();

        if let Some(min) = min {
            assert!(
                current >= min,
                "pass check failed: current pass {current} is before {min}"
            );
        }

        if let Some(max) = max {
            assert!(
                current <= max,
                "pass check failed: current pass {current} is after {max}"
            );
        }
    }

    /// Schedules `task` to run during `pass`.
    ///
    /// Tasks of one pass run in submission order. A task for a pass more than
    /// one step ahead is forwarded through each intermediate pass.
    ///
    /// # Panics
    ///
    /// Panics unless the current pass is strictly before `pass`.
    #[track_caller]
    pub fn on_pass(&self, pass: Pass, task: impl FnOnce() + 'static) {
        let current = self.current_pass();
        assert!(
            !self.is_torn_down() && current < pass,
            "cannot schedule a task: current pass: {current} target pass: {pass}"
        );

        let next = current.next().unwrap_or(Pass::LAST);

        if pass == next {
            self.enqueue(pass, Box::new(task));
        } else {
            let executor = self.clone();
            self.enqueue(next, Box::new(move || executor.on_pass(pass, task)));
        }
    }

    pub(crate) fn on_teardown(&self, hook: impl FnOnce() + 'static) {
        self.state.teardown.borrow_mut().push(Box::new(hook));
    }

    fn enqueue(&self, pass: Pass, task: Task) {
        self.state.queues.borrow_mut()[pass.index()].push_back(task);
    }

    fn pop(&self, pass: Pass) -> Option<Task> {
        self.state.queues.borrow_mut()[pass.index()].pop_front()
    }
}

/// Owner of the pass queues. [`Scheduler::run`] consumes it, so the passes
/// are executed at most once.
#[derive(Debug)]
pub struct Scheduler {
    executor: Executor,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            executor: Executor::new(),
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Runs every pass in order, draining its queue. Tasks may schedule more
    /// work for the same run. Afterwards the scheduler is torn down and
    /// pending deferred values fall back to their defaults.
    pub fn run(self) {
        let executor = self.executor;

        for pass in Pass::ALL {
            executor.state.current.set(pass);
            debug!("{} {pass}", "Pass".bold().bright_white());

            let mut count = 0usize;
            // The queue borrow is released before the task runs, tasks re-enter `on_pass`
            while let Some(task) = executor.pop(pass) {
                task();
                count += 1;
            }

            trace!("Pass {pass} ran {count} tasks");
        }

        executor.state.torn_down.set(true);

        let hooks = std::mem::take(&mut *executor.state.teardown.borrow_mut());
        for hook in hooks {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn runs_tasks_in_pass_order() {
        let scheduler = Scheduler::new();
        let executor = scheduler.executor().clone();
        let events = log();

        for (pass, name) in [
            (Pass::Validation, "validation"),
            (Pass::Imports, "imports"),
            (Pass::Members, "members"),
        ] {
            let events = events.clone();
            executor.on_pass(pass, move || events.borrow_mut().push(name.to_owned()));
        }

        scheduler.run();

        assert_eq!(*events.borrow(), vec!["imports", "members", "validation"]);
        assert!(executor.is_torn_down());
        assert_eq!(executor.current_pass(), Pass::LAST);
    }

    #[test]
    fn tasks_can_schedule_later_tasks() {
        let scheduler = Scheduler::new();
        let executor = scheduler.executor().clone();
        let events = log();

        {
            let events = events.clone();
            let inner = executor.clone();
            executor.on_pass(Pass::Imports, move || {
                events.borrow_mut().push(format!("at {}", inner.current_pass()));
                let events = events.clone();
                let nested = inner.clone();
                inner.on_pass(Pass::Expressions, move || {
                    events.borrow_mut().push(format!("at {}", nested.current_pass()));
                });
            });
        }

        scheduler.run();

        assert_eq!(*events.borrow(), vec!["at Imports", "at Expressions"]);
    }

    #[test]
    fn forwarded_tasks_keep_submission_order() {
        let scheduler = Scheduler::new();
        let executor = scheduler.executor().clone();
        let events = log();

        {
            // Scheduled during Parsing for Members: forwarded through Imports and Modules
            let events = events.clone();
            executor.on_pass(Pass::Members, move || events.borrow_mut().push("far".into()));
        }
        {
            let events = events.clone();
            let inner = executor.clone();
            executor.on_pass(Pass::Imports, move || {
                let events = events.clone();
                let modules = inner.clone();
                inner.on_pass(Pass::Modules, move || {
                    let events = events.clone();
                    modules.on_pass(Pass::Members, move || events.borrow_mut().push("near".into()));
                });
            });
        }

        scheduler.run();

        assert_eq!(*events.borrow(), vec!["far", "near"]);
    }

    #[test]
    #[should_panic(expected = "cannot schedule a task")]
    fn scheduling_the_current_pass_panics() {
        let scheduler = Scheduler::new();
        scheduler.executor().on_pass(Pass::Parsing, || {});
    }

    #[test]
    #[should_panic(expected = "cannot schedule a task")]
    fn scheduling_a_past_pass_panics() {
        let scheduler = Scheduler::new();
        let executor = scheduler.executor().clone();
        let inner = executor.clone();
        executor.on_pass(Pass::Members, move || inner.on_pass(Pass::Imports, || {}));
        scheduler.run();
    }

    #[test]
    fn check_pass_accepts_open_bounds() {
        let scheduler = Scheduler::new();
        let executor = scheduler.executor();

        executor.check_pass(None, None);
        executor.check_pass(Some(Pass::Parsing), Some(Pass::Imports));
    }

    #[test]
    #[should_panic(expected = "is before")]
    fn check_pass_rejects_early_access() {
        let scheduler = Scheduler::new();
        scheduler.executor().check_pass(Some(Pass::Imports), None);
    }
}

use std::{
    cell::{OnceCell, RefCell},
    fmt,
    rc::Rc,
};

use crate::{Executor, Pass};

struct Slot<T> {
    executor: Executor,
    pass: Pass,
    value: RefCell<Option<T>>,
    fallback: RefCell<Option<T>>,
}

impl<T: Clone> Slot<T> {
    #[track_caller]
    fn get(&self) -> T {
        match self.pass.next() {
            Some(next) => self.executor.check_pass(Some(next), None),
            None => assert!(
                self.executor.is_torn_down(),
                "deferred value of the last pass {} read before teardown",
                self.pass
            ),
        }

        let mut value = self.value.borrow_mut();
        if value.is_none() {
            *value = self.fallback.borrow_mut().take();
        }

        match &*value {
            Some(value) => value.clone(),
            None => unreachable!("deferred value of pass {} has no fallback", self.pass),
        }
    }

    fn apply_fallback(&self) {
        let mut value = self.value.borrow_mut();
        if value.is_none() {
            *value = self.fallback.borrow_mut().take();
        }
    }
}

/// Value written during one pass and readable only once that pass is over.
///
/// If nothing was written by the time the scheduler tears down, the fallback
/// given at construction becomes the value.
pub struct Deferred<T> {
    slot: Rc<Slot<T>>,
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("pass", &self.slot.pass)
            .field("value", &self.slot.value.borrow())
            .finish()
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// # Panics
    ///
    /// Panics unless the current pass is before `pass`.
    #[track_caller]
    pub fn new(executor: &Executor, pass: Pass, fallback: T) -> Self {
        let Some(previous) = pass.previous() else {
            panic!("no deferred value can be bound to the first pass {pass}");
        };
        executor.check_pass(None, Some(previous));

        let slot = Rc::new(Slot {
            executor: executor.clone(),
            pass,
            value: RefCell::new(None),
            fallback: RefCell::new(Some(fallback)),
        });

        let weak = Rc::downgrade(&slot);
        executor.on_teardown(move || {
            if let Some(slot) = weak.upgrade() {
                slot.apply_fallback();
            }
        });

        Self { slot }
    }

    pub fn pass(&self) -> Pass {
        self.slot.pass
    }

    /// Writes the value, only allowed during the bound pass.
    #[track_caller]
    pub fn set(&self, value: T) {
        self.write(value, false)
    }

    /// Writes the value during or before the bound pass.
    #[track_caller]
    pub fn set_early(&self, value: T) {
        self.write(value, true)
    }

    #[track_caller]
    fn write(&self, value: T, allow_early: bool) {
        let min = (!allow_early).then_some(self.slot.pass);
        self.slot.executor.check_pass(min, Some(self.slot.pass));

        let mut slot = self.slot.value.borrow_mut();
        assert!(slot.is_none(), "value already set");
        *slot = Some(value);
        self.slot.fallback.borrow_mut().take();
    }

    /// Reads the value.
    ///
    /// # Panics
    ///
    /// Panics unless the bound pass is over.
    #[track_caller]
    pub fn get(&self) -> T {
        self.slot.get()
    }

    pub fn getter(&self) -> Getter<T> {
        Getter(GetterKind::Direct(self.slot.clone()))
    }
}

enum GetterKind<T> {
    Const(T),
    Direct(Rc<Slot<T>>),
    Mapped(Rc<dyn Fn() -> T>),
}

impl<T: Clone> Clone for GetterKind<T> {
    fn clone(&self) -> Self {
        match self {
            GetterKind::Const(value) => GetterKind::Const(value.clone()),
            GetterKind::Direct(slot) => GetterKind::Direct(slot.clone()),
            GetterKind::Mapped(f) => GetterKind::Mapped(f.clone()),
        }
    }
}

/// Shareable read side of a [`Deferred`], or a constant.
#[derive(Clone)]
pub struct Getter<T>(GetterKind<T>);

impl<T> fmt::Debug for Getter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0 {
            GetterKind::Const(_) => "const",
            GetterKind::Direct(_) => "direct",
            GetterKind::Mapped(_) => "mapped",
        };
        write!(f, "Getter({kind})")
    }
}

impl<T: Clone + 'static> Getter<T> {
    pub fn constant(value: T) -> Self {
        Self(GetterKind::Const(value))
    }

    #[track_caller]
    pub fn get(&self) -> T {
        match &self.0 {
            GetterKind::Const(value) => value.clone(),
            GetterKind::Direct(slot) => slot.get(),
            GetterKind::Mapped(f) => f(),
        }
    }

    /// Lazily derived getter. `f` runs on the first read only.
    pub fn map<R: Clone + 'static>(&self, f: impl Fn(T) -> R + 'static) -> Getter<R> {
        let source = self.clone();
        let memo = OnceCell::new();
        Getter(GetterKind::Mapped(Rc::new(move || {
            memo.get_or_init(|| f(source.get())).clone()
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scheduler;
    use std::cell::Cell;

    #[test]
    fn value_flows_from_producer_to_readers() {
        let scheduler = Scheduler::new();
        let executor = scheduler.executor().clone();

        let names = Rc::new(Deferred::new(&executor, Pass::Imports, Vec::<String>::new()));
        let getter = names.getter();
        let seen = Rc::new(RefCell::new(None));

        {
            let names = names.clone();
            executor.on_pass(Pass::Imports, move || names.set(vec!["a".into()]));
        }
        {
            let seen = seen.clone();
            executor.on_pass(Pass::Members, move || *seen.borrow_mut() = Some(getter.get()));
        }

        scheduler.run();

        assert_eq!(*seen.borrow(), Some(vec!["a".to_owned()]));
        assert_eq!(names.get(), vec!["a".to_owned()]);
    }

    #[test]
    fn fallback_applies_after_teardown() {
        let scheduler = Scheduler::new();
        let deferred = Deferred::new(scheduler.executor(), Pass::Validation, 7);

        scheduler.run();

        assert_eq!(deferred.get(), 7);
        assert_eq!(deferred.getter().get(), 7);
    }

    #[test]
    fn early_write_is_allowed_before_the_pass() {
        let scheduler = Scheduler::new();
        let deferred = Deferred::new(scheduler.executor(), Pass::Members, 0);

        deferred.set_early(3);
        scheduler.run();

        assert_eq!(deferred.get(), 3);
    }

    #[test]
    #[should_panic(expected = "is before")]
    fn plain_write_before_the_pass_panics() {
        let scheduler = Scheduler::new();
        let deferred = Deferred::new(scheduler.executor(), Pass::Members, 0);
        deferred.set(3);
    }

    #[test]
    #[should_panic(expected = "is before")]
    fn read_during_the_pass_panics() {
        let scheduler = Scheduler::new();
        let executor = scheduler.executor().clone();
        let deferred = Rc::new(Deferred::new(&executor, Pass::Imports, 0));

        let inner = deferred.clone();
        executor.on_pass(Pass::Imports, move || {
            inner.set(1);
            inner.get();
        });

        scheduler.run();
    }

    #[test]
    #[should_panic(expected = "read before teardown")]
    fn last_pass_value_is_unreadable_while_running() {
        let scheduler = Scheduler::new();
        let deferred = Deferred::new(scheduler.executor(), Pass::LAST, 1);
        deferred.get();
    }

    #[test]
    fn last_pass_value_is_readable_after_teardown() {
        let scheduler = Scheduler::new();
        let deferred = Deferred::new(scheduler.executor(), Pass::LAST, 1);
        scheduler.run();
        assert_eq!(deferred.get(), 1);
    }

    #[test]
    #[should_panic(expected = "is after")]
    fn write_after_the_pass_panics() {
        let scheduler = Scheduler::new();
        let executor = scheduler.executor().clone();
        let deferred = Rc::new(Deferred::new(&executor, Pass::Imports, 0));

        let inner = deferred.clone();
        executor.on_pass(Pass::Members, move || inner.set(1));

        scheduler.run();
    }

    #[test]
    #[should_panic(expected = "is after")]
    fn creation_during_the_previous_pass_is_too_late() {
        let scheduler = Scheduler::new();
        let executor = scheduler.executor().clone();

        let inner = executor.clone();
        executor.on_pass(Pass::Members, move || {
            Deferred::new(&inner, Pass::Members, 0);
        });

        scheduler.run();
    }

    #[test]
    #[should_panic(expected = "value already set")]
    fn second_write_panics() {
        let scheduler = Scheduler::new();
        let deferred = Deferred::new(scheduler.executor(), Pass::Members, 0);
        deferred.set_early(1);
        deferred.set_early(2);
    }

    #[test]
    #[should_panic(expected = "first pass")]
    fn first_pass_cannot_be_deferred() {
        let scheduler = Scheduler::new();
        Deferred::new(scheduler.executor(), Pass::Parsing, 0);
    }

    #[test]
    fn mapped_getter_is_memoized() {
        let scheduler = Scheduler::new();
        let deferred = Deferred::new(scheduler.executor(), Pass::Imports, 2);
        let calls = Rc::new(Cell::new(0));

        let doubled = {
            let calls = calls.clone();
            deferred.getter().map(move |n| {
                calls.set(calls.get() + 1);
                n * 2
            })
        };

        deferred.set_early(5);
        scheduler.run();

        assert_eq!(doubled.get(), 10);
        assert_eq!(doubled.get(), 10);
        assert_eq!(calls.get(), 1);
        assert_eq!(Getter::constant("x").get(), "x");
    }
}

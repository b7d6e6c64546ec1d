//! Abstract functions and their overrides.
//!
//! Both sides only learn about each other through [`Deferred`] values: an
//! override finds its abstract function during [`Pass::Members`], an abstract
//! function learns which override won during [`Pass::AbstractOverride`] and
//! fixes its implementation during [`Pass::Expressions`].

use std::{cell::Cell, fmt, rc::Rc};

use knit_pass::{Deferred, Executor, Getter, Pass};
use knit_span::Loc;

use crate::def::DefId;

pub struct AbstractFunction {
    pub def: DefId,
    /// Program-wide name used in diagnostics.
    pub name: String,
    pub loc: Loc,
    pub has_body: bool,
    overridden: Deferred<Option<DefId>>,
    implementation: Deferred<Option<DefId>>,
}

impl AbstractFunction {
    pub fn new(executor: &Executor, def: DefId, name: String, loc: Loc, has_body: bool) -> Self {
        Self {
            def,
            name,
            loc,
            has_body,
            overridden: Deferred::new(executor, Pass::AbstractOverride, None),
            implementation: Deferred::new(executor, Pass::Expressions, None),
        }
    }

    /// The override bound to this function, if any.
    pub fn overridden(&self) -> Option<DefId> {
        self.overridden.get()
    }

    /// Fixes the effective implementation: the bound override, else the
    /// function itself if it has a default body.
    pub fn resolve_implementation(&self) {
        let implementation = self
            .overridden
            .get()
            .or_else(|| self.has_body.then_some(self.def));
        self.implementation.set(implementation);
    }

    pub fn implementation(&self) -> Getter<Option<DefId>> {
        self.implementation.getter()
    }

    fn set_override(&self, def: DefId) {
        self.overridden.set(Some(def));
    }
}

impl fmt::Debug for AbstractFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbstractFunction")
            .field("def", &self.def)
            .field("name", &self.name)
            .field("has_body", &self.has_body)
            .finish()
    }
}

pub struct OverrideFunction {
    pub def: DefId,
    pub loc: Loc,
    target: Deferred<Option<Rc<AbstractFunction>>>,
    bound: Cell<bool>,
}

impl OverrideFunction {
    pub fn new(executor: &Executor, def: DefId, loc: Loc) -> Self {
        Self {
            def,
            loc,
            target: Deferred::new(executor, Pass::Members, None),
            bound: Cell::new(false),
        }
    }

    pub fn set_target(&self, target: Option<Rc<AbstractFunction>>) {
        self.target.set(target);
    }

    /// The abstract function this override refers to, once resolved.
    pub fn target(&self) -> Option<Rc<AbstractFunction>> {
        self.target.get()
    }

    /// Makes this override the implementation of its abstract function.
    ///
    /// # Panics
    ///
    /// Panics when called twice.
    pub fn bind(&self) -> Option<Rc<AbstractFunction>> {
        assert!(!self.bound.replace(true), "override {} already bound", self.def);

        let target = self.target.get();
        if let Some(target) = &target {
            target.set_override(self.def);
        }
        target
    }
}

impl fmt::Debug for OverrideFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideFunction")
            .field("def", &self.def)
            .field("bound", &self.bound.get())
            .finish()
    }
}

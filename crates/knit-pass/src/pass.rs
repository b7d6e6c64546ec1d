use derive_more::Display;

/// Compilation phases in execution order.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pass {
    Parsing,
    Imports,
    Modules,
    Members,
    AbstractOverride,
    Expressions,
    Validation,
    Documentation,
    Done,
}

impl Pass {
    pub const ALL: [Pass; 9] = [
        Pass::Parsing,
        Pass::Imports,
        Pass::Modules,
        Pass::Members,
        Pass::AbstractOverride,
        Pass::Expressions,
        Pass::Validation,
        Pass::Documentation,
        Pass::Done,
    ];

    pub const FIRST: Pass = Pass::Parsing;
    pub const LAST: Pass = Pass::Done;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn previous(self) -> Option<Pass> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn next(self) -> Option<Pass> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

//! Intrinsic library
//!
//! A process-wide table mapping names (`len`, `str::upper`, `codec::sha256`,
//! ...) to a prototype and an entry point. The table is built on first use
//! and never changes afterwards, so the compiler can check qualified names
//! against it and evaluators on any thread can share it.
//!
//! Every entry is written against the raw [`Val`] slice through [`Args`];
//! the prototype has already been checked when the entry runs.

mod assert;
mod builtin;
mod codec;
mod list;
mod map;
mod math;
mod random;
mod regexp;
mod string;
mod time;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::bytecode::{Closure, Val};
use crate::proto::{Args, FuncProto};
use crate::vm::{Evaluator, RuntimeErrorKind, RuntimeResult};

/// Entry point of an intrinsic
pub type IntrinsicFn = fn(&mut Evaluator, Args<'_>) -> RuntimeResult<Val>;

/// A registered intrinsic
pub struct Intrinsic {
    name: &'static str,
    proto: FuncProto,
    func: IntrinsicFn,
}

impl Intrinsic {
    /// Registered name
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Argument prototype
    #[must_use]
    pub fn proto(&self) -> &FuncProto {
        &self.proto
    }

    /// Check `args` against the prototype and run the entry point
    pub fn invoke(&self, eval: &mut Evaluator, args: &[Val]) -> RuntimeResult<Val> {
        self.proto.check(args).map_err(|source| RuntimeErrorKind::Proto {
            name: self.name.to_string(),
            source,
        })?;
        (self.func)(eval, Args::new(self.name, args))
    }
}

impl std::fmt::Debug for Intrinsic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intrinsic")
            .field("name", &self.name)
            .field("proto", &self.proto.source())
            .finish()
    }
}

/// Table under construction
pub(crate) struct Registry {
    entries: HashMap<&'static str, Intrinsic>,
}

impl Registry {
    /// Register `func` under `name`
    ///
    /// # Panics
    ///
    /// A malformed prototype is a bug in the library itself.
    fn add(&mut self, name: &'static str, proto: &str, func: IntrinsicFn) {
        let proto = match FuncProto::parse(proto) {
            Ok(proto) => proto,
            Err(e) => panic!("intrinsic {name}: {e}"),
        };
        let previous = self.entries.insert(name, Intrinsic { name, proto, func });
        assert!(previous.is_none(), "intrinsic {name} registered twice");
    }
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry = Registry {
            entries: HashMap::new(),
        };
        builtin::register(&mut registry);
        string::register(&mut registry);
        list::register(&mut registry);
        map::register(&mut registry);
        math::register(&mut registry);
        time::register(&mut registry);
        codec::register(&mut registry);
        regexp::register(&mut registry);
        random::register(&mut registry);
        assert::register(&mut registry);
        tracing::debug!(count = registry.entries.len(), "intrinsic library initialized");
        registry
    })
}

/// Look up an intrinsic by name
#[must_use]
pub fn lookup(name: &str) -> Option<&'static Intrinsic> {
    registry().entries.get(name)
}

/// Whether an intrinsic exists under `name`
#[must_use]
pub fn contains(name: &str) -> bool {
    registry().entries.contains_key(name)
}

/// Every registered name, sorted
#[must_use]
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = registry().entries.keys().copied().collect();
    names.sort_unstable();
    names
}

/// An intrinsic as a first-class native closure
#[must_use]
pub fn closure(name: &str) -> Option<Val> {
    let intrinsic = lookup(name)?;
    Some(Val::Closure(Arc::new(Closure::native(intrinsic.name, move |eval, args| {
        intrinsic.invoke(eval, args)
    }))))
}

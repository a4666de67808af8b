//! Iterators and generator state
//!
//! Every iterator follows the same protocol: `has` reports whether a current
//! item is available (producing it on demand), `next` consumes that item, and
//! `deref` exposes the last produced `(key, value)` pair. Items are produced
//! lazily, so a generator runs only as far as the consumer asks.

use std::sync::Arc;

use super::closure::UpvalueRef;
use super::program::Program;
use super::usr::UsrIter;
use super::value::{ListRef, MapRef, Val};
use crate::vm::{RuntimeErrorKind, RuntimeResult};

/// Saved execution state of a suspended generator
#[derive(Debug)]
pub struct Generator {
    /// The iterator program being run
    pub program: Arc<Program>,
    /// Captured variables of the iterator closure
    pub upvalues: Vec<UpvalueRef>,
    /// Instruction to resume at
    pub pc: usize,
    /// Snapshot of the generator's local slots
    pub locals: Vec<Val>,
    /// Snapshot of the generator's operand stack
    pub stack: Vec<Val>,
    /// Captures of the generator's own slots, parked while it is suspended
    pub parked: Vec<UpvalueRef>,
    /// Key handed out by the next `yield` without an explicit key
    pub next_index: i64,
}

impl Generator {
    /// Fresh generator with its parameters bound to the first local slots
    #[must_use]
    pub fn new(program: Arc<Program>, upvalues: Vec<UpvalueRef>, args: &[Val]) -> Self {
        let mut locals = vec![Val::Null; program.local_count.max(args.len())];
        for (slot, arg) in locals.iter_mut().zip(args) {
            *slot = arg.clone();
        }
        Self {
            program,
            upvalues,
            pc: 0,
            locals,
            stack: Vec::new(),
            parked: Vec::new(),
            next_index: 0,
        }
    }
}

/// Where an iterator's items come from
pub enum IterSource {
    /// `(index, element)` over a list
    List { list: ListRef, index: usize },
    /// `(key, value)` over a map, invalidated by mutation
    Map {
        map: MapRef,
        keys: Vec<String>,
        index: usize,
        version: u64,
    },
    /// `(index, char)` over a string
    Str { chars: Vec<char>, index: usize },
    /// `(0, first)` then `(1, second)`
    Pair { pair: Arc<(Val, Val)>, index: usize },
    /// `(index, n)` over an integer range
    Range { next: i64, end: i64, step: i64, index: i64 },
    /// A script generator; `None` while it is running
    Generator(Option<Box<Generator>>),
    /// A host object's iterator
    Usr(Box<dyn UsrIter>),
}

impl std::fmt::Debug for IterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IterSource::List { .. } => "List",
            IterSource::Map { .. } => "Map",
            IterSource::Str { .. } => "Str",
            IterSource::Pair { .. } => "Pair",
            IterSource::Range { .. } => "Range",
            IterSource::Generator(_) => "Generator",
            IterSource::Usr(_) => "Usr",
        };
        f.write_str(name)
    }
}

/// Position of an iterator in its protocol
#[derive(Debug, Clone)]
pub enum IterState {
    /// Nothing produced yet
    Pending,
    /// An item is available and has not been consumed
    Ready(Val, Val),
    /// The last item was consumed; the next `has` produces another
    Consumed(Val, Val),
    /// Exhausted; stays exhausted
    Done,
}

/// An iterator value
#[derive(Debug)]
pub struct Iter {
    pub source: IterSource,
    pub state: IterState,
}

impl Iter {
    /// Wrap a source in the pending state
    #[must_use]
    pub fn new(source: IterSource) -> Self {
        Self {
            source,
            state: IterState::Pending,
        }
    }

    /// Iterator over an integer range, `end` exclusive
    #[must_use]
    pub fn range(start: i64, end: i64, step: i64) -> Self {
        Self::new(IterSource::Range {
            next: start,
            end,
            step,
            index: 0,
        })
    }

    /// Whether the source is a generator (whose advance needs an evaluator)
    #[must_use]
    pub fn is_generator(&self) -> bool {
        matches!(self.source, IterSource::Generator(_))
    }

    /// Whether the state machine has to produce a new item before `has`
    /// can answer
    #[must_use]
    pub fn needs_advance(&self) -> bool {
        matches!(self.state, IterState::Pending | IterState::Consumed(..))
    }

    /// Record the outcome of producing an item
    pub fn settle(&mut self, item: Option<(Val, Val)>) {
        self.state = match item {
            Some((k, v)) => IterState::Ready(k, v),
            None => IterState::Done,
        };
    }

    /// Consume the ready item, if any
    pub fn take_ready(&mut self) -> Option<(Val, Val)> {
        match std::mem::replace(&mut self.state, IterState::Done) {
            IterState::Ready(k, v) => {
                self.state = IterState::Consumed(k.clone(), v.clone());
                Some((k, v))
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// The last produced pair
    #[must_use]
    pub fn deref(&self) -> Option<(Val, Val)> {
        match &self.state {
            IterState::Ready(k, v) | IterState::Consumed(k, v) => Some((k.clone(), v.clone())),
            IterState::Pending | IterState::Done => None,
        }
    }

    /// Produce the next item from a non-generator source
    pub fn advance_plain(&mut self) -> RuntimeResult<Option<(Val, Val)>> {
        match &mut self.source {
            IterSource::List { list, index } => {
                let list = list.read();
                let item = list.get(*index).map(|v| (Val::Int(*index as i64), v.clone()));
                *index += 1;
                Ok(item)
            }
            IterSource::Map {
                map,
                keys,
                index,
                version,
            } => {
                let map = map.read();
                if map.version() != *version {
                    return Err(RuntimeErrorKind::IteratorInvalidated.into());
                }
                let Some(key) = keys.get(*index) else {
                    return Ok(None);
                };
                *index += 1;
                let value = map.get(key).cloned().unwrap_or(Val::Null);
                Ok(Some((Val::string(key), value)))
            }
            IterSource::Str { chars, index } => {
                let item = chars
                    .get(*index)
                    .map(|c| (Val::Int(*index as i64), Val::string(c.to_string())));
                *index += 1;
                Ok(item)
            }
            IterSource::Pair { pair, index } => {
                let item = match *index {
                    0 => Some((Val::Int(0), pair.0.clone())),
                    1 => Some((Val::Int(1), pair.1.clone())),
                    _ => None,
                };
                *index += 1;
                Ok(item)
            }
            IterSource::Range {
                next,
                end,
                step,
                index,
            } => {
                let more = if *step > 0 { *next < *end } else { *next > *end };
                if !more {
                    return Ok(None);
                }
                let item = (Val::Int(*index), Val::Int(*next));
                *next = next.saturating_add(*step);
                *index += 1;
                Ok(Some(item))
            }
            IterSource::Usr(iter) => iter.advance(),
            IterSource::Generator(_) => Err(crate::vm::RuntimeError::invalid(
                "generator advanced without an evaluator",
            )),
        }
    }
}

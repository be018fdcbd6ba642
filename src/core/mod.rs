//! Core data structures: terms, schemas, bindings and wire messages

pub mod binding;
pub mod encoding;
pub mod message;
pub mod rule;
pub mod term;

pub use binding::{Binding, JoinKeySet, Schema};
pub use message::{
    now_millis, BindingMessage, FactMessage, FireEvent, GraphRef, InferredFact, Message, Meta,
    BASE_FIELDS,
};
pub use rule::Rule;
pub use term::{ClauseEntry, Functor, Literal, NumericValue, Term, Triple, TriplePattern};

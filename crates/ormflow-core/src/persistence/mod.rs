//! Cascading persistence.
//!
//! A persist or remove call walks the entity graph along cascading
//! relations ([`graph`]), orders the resulting operations by foreign-key
//! dependencies ([`plan`]) and executes them in one transaction
//! ([`executor`]).

mod executor;
mod graph;
mod plan;
mod snapshot;

pub(crate) use executor::Persister;
pub(crate) use snapshot::take_snapshot;

//! Lily is an embedded key-value / document store built around a fixed-depth
//! hashed index tree.
//!
//! A coordinate is a 32-bit hash of a key (or a value projected along a
//! `key_structure` path for secondary indexes), decomposed into five fixed
//! digits that address a five-level tree: mall (16-wide, direct) → trolley
//! (128-wide, direct) → purse (sparse) → purse (sparse) → box (sparse,
//! holding up to 128 things). Every mutation is appended to a per-index log
//! before it is durable; recovery rebuilds the tree by replaying those logs.
//!
//! The top-level handle is [`Lily`]; it owns a catalog of databases, each a
//! namespace of forms, each form a primary index plus however many
//! secondary indexes its callers have created.

#![warn(missing_docs)]
#![allow(unknown_lints)]

extern crate byteorder;
#[macro_use]
extern crate error_chain;
extern crate fs2;
extern crate itertools;
#[macro_use]
extern crate log;
extern crate md5;
extern crate parking_lot;
extern crate rand;
extern crate rayon;
extern crate tiny_keccak;
#[cfg(test)]
#[macro_use]
extern crate matches;
#[cfg(test)]
#[macro_use]
extern crate quickcheck;
#[cfg(test)]
extern crate tempdir;

mod catalog;
mod coordinate;
mod database;
mod error;
mod form;
mod hash;
mod index;
mod index_log;
mod node;
mod options;
mod registry;
mod selector;
mod value;

pub use coordinate::Coordinate;
pub use database::Database;
pub use error::{Error, ErrorKind, Result};
pub use form::FormType;
pub use node::PutMode;
pub use options::Options;
pub use registry::Lily;
pub use selector::{Cond, Condition, Match, MatchedThing, Scope, Selector, Sort};
pub use value::Value;

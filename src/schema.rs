//! Type-to-schema compiler.
//!
//! [`classify`] decides what a type is built as, [`SchemaBuilder`] does the
//! recursive conversion, and [`SchemaRegistry`] memoizes nominal types so
//! each one is defined once per compilation and cycles close over a `Ref`.
pub mod builder;
pub mod classify;
pub mod node;
pub mod registry;

pub use builder::{SchemaBuilder, SchemaError};
pub use classify::{classify, Shape};
pub use node::{DefinitionId, EnumValue, Property, SchemaNode};
pub use registry::{sanitize, Entry, EntryState, SchemaRegistry, DRAFT_07};

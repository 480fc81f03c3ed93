//! Compile-time rewriter for `validate<T>(raw)` calls.
//!
//! Sources are parsed into a [`host::Program`], every validate call is
//! located and its target type compiled to JSON Schema, and the calls are
//! rewritten to carry a reference into one shared root schema. The runtime
//! module that resolves those references is emitted alongside.
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod emit;
pub mod host;
pub mod path_de;
pub mod runtime;
pub mod schema;
pub mod syntax;
pub mod transform;

pub use config::Config;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use host::Program;
pub use transform::{Compilation, TransformOutput};

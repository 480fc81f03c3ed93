//! The call-site rewriting pass.
//!
//! [`locate`] finds validate calls and the imports that bring the validate
//! functions in, [`rewrite`] turns them into source splices, [`print`]
//! renders schema arguments, and [`Compilation`] drives all of it over a
//! program with one registry.
pub mod locate;
pub mod pipeline;
pub mod print;
pub mod rewrite;

pub use locate::{is_validate_function, locate, CallShape, CallSite, Located, NO_TYPE_FOUND, UNSUPPORTED_USAGE};
pub use pipeline::{Compilation, RewrittenFile, TransformOutput};
pub use rewrite::{apply, generated_module_specifier, Replacement};

//! # safran
//!
//! Compile passes for a registry of parsed templates:
//!
//! - **Data-reference validation** proves every variable read is backed
//!   by a declared param, an in-scope let binding, a loop variable, or
//!   the injected-data marker, and that every cross-template call
//!   supplies the parameters its callee requires.
//! - **Autoescaping** rewrites every emission point with the escaping
//!   directive matching its surrounding markup context (plain text,
//!   attribute value, script, stylesheet, or URL), inferred statically
//!   across the whole call graph when contextual mode is requested, or a
//!   generic HTML escape otherwise.
//!
//! Parsing and rendering live outside this crate. The external parser
//! builds [`TemplateFile`]s and adds them to a [`Registry`]; [`compile`]
//! validates and rewrites the registry in place; the execution engine
//! then renders the rewritten trees, applying print directives
//! left-to-right.
//!
//! # Example
//!
//! ```ignore
//! use safran::{compile, Registry};
//!
//! let mut registry = Registry::new();
//! for file in parsed_files {
//!     registry.add_file(file)?;
//! }
//! compile(&mut registry)?;
//! // registry is now safe to hand to the execution engine
//! ```
//!
//! The pipeline is fail-fast: the first violation anywhere in the
//! registry aborts the run with a diagnostic naming the offending
//! template. A registry that fails to compile must not be served.

pub mod ast;
pub mod datarefs;
pub mod directives;
pub mod error;
pub mod escape;
pub mod graph;
pub mod registry;
pub mod scope;

pub use error::{CompileError, Result};
pub use registry::{
    DelTemplate, DelTemplateDef, Namespace, Param, Registry, Template, TemplateDef, TemplateFile,
};

/// Run both passes over the registry: data-reference validation, then
/// autoescaping. One-shot, synchronous, fail-fast.
pub fn compile(registry: &mut Registry) -> Result<()> {
    datarefs::check(registry)?;
    escape::rewrite(registry)
}

//! Error types for the compile passes.
//!
//! Every violation is fatal: the first one aborts the run for the whole
//! registry. Each variant names the offending template and, where the
//! node is known, labels its span in the template's source file so the
//! diagnostic renders against the original text.

use std::sync::Arc;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Result type alias for the compile passes.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Handle on a template's source file, shared by all templates from the
/// same file. Cheap to clone; errors snapshot it into a [`NamedSource`].
#[derive(Debug, Clone)]
pub struct TemplateSource {
    name: String,
    text: Arc<String>,
}

impl TemplateSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Arc::new(text.into()),
        }
    }

    /// The file name this source was registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw source text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Snapshot into a miette source for attaching to a diagnostic
    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(&self.name, self.text.to_string())
    }
}

/// A fatal compile error from the validation or escaping pass.
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    /// A template file was added without declaring a namespace
    #[error("file {file}: namespace required")]
    #[diagnostic(code(safran::missing_namespace))]
    MissingNamespace { file: String },

    /// A declared `kind` attribute is not in the fixed vocabulary
    #[error("template {template}: kind {kind:?} not recognized")]
    #[diagnostic(code(safran::unrecognized_content_kind))]
    UnrecognizedContentKind {
        template: String,
        kind: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("declared here")]
        span: Option<SourceSpan>,
    },

    /// A data reference is not backed by a param, local binding, or loop variable
    #[error("template {template}: data ref {key:?} not found")]
    #[diagnostic(code(safran::undeclared_data_ref))]
    UndeclaredDataReference {
        template: String,
        key: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("referenced here")]
        span: Option<SourceSpan>,
    },

    /// A declared parameter is never read by its template
    #[error("template {template}: param {param:?} is unused")]
    #[diagnostic(code(safran::unused_param))]
    UnusedParameter {
        template: String,
        param: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("in this template")]
        span: Option<SourceSpan>,
    },

    /// A local binding goes out of scope without ever being read
    #[error("template {template}: let variable {name:?} is not used")]
    #[diagnostic(code(safran::unused_let))]
    UnusedLocalBinding {
        template: String,
        name: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("bound here")]
        span: Option<SourceSpan>,
    },

    /// A local binding tries to rebind the reserved injected-data name
    #[error("template {template}: invalid variable name {name:?} in let")]
    #[diagnostic(code(safran::reserved_binding_name))]
    ReservedBindingName {
        template: String,
        name: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("bound here")]
        span: Option<SourceSpan>,
    },

    /// A loop variable uses the reserved injected-data name
    #[error("template {template}: invalid loop variable name {name:?}")]
    #[diagnostic(code(safran::loop_variable_misuse))]
    LoopVariableMisuse {
        template: String,
        name: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("bound here")]
        span: Option<SourceSpan>,
    },

    /// A call names a template the registry does not contain
    #[error("template {template}: call target {callee:?} not found")]
    #[diagnostic(code(safran::call_target_not_found))]
    CallTargetNotFound {
        template: String,
        callee: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("called here")]
        span: Option<SourceSpan>,
    },

    /// A delegate call names a (name, variant) pair the registry does not contain
    #[error("template {template}: delegate {callee:?} with variant {variant:?} not found")]
    #[diagnostic(code(safran::delegate_target_not_found))]
    DelegateTargetNotFound {
        template: String,
        callee: String,
        variant: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("called here")]
        span: Option<SourceSpan>,
    },

    /// A call passes a parameter the callee does not declare
    #[error("template {template}: param {param:?} is not declared by {callee:?}")]
    #[diagnostic(code(safran::undeclared_call_param))]
    UndeclaredCallParameter {
        template: String,
        callee: String,
        param: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("passed here")]
        span: Option<SourceSpan>,
    },

    /// A call fails to cover a required parameter of the callee
    #[error("template {template}: required param {param:?} is not passed to {callee:?}")]
    #[diagnostic(code(safran::missing_required_call_param))]
    MissingRequiredCallParameter {
        template: String,
        callee: String,
        param: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("call is missing the param")]
        span: Option<SourceSpan>,
    },

    /// Two call sites pin the same callee to different starting contexts
    #[error(
        "template {template}: called in context {second} but already pinned to {first}"
    )]
    #[diagnostic(code(safran::context_conflict))]
    ContextConflictAtSharedCallee {
        template: String,
        first: String,
        second: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("conflicting call site")]
        span: Option<SourceSpan>,
    },

    /// A call cycle re-enters a template in a context other than its pinned one
    #[error(
        "template {template}: call cycle re-enters in context {required}, pinned to {start}"
    )]
    #[diagnostic(code(safran::non_convergent_cycle))]
    NonConvergentContextCycle {
        template: String,
        start: String,
        required: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("cyclic call site")]
        span: Option<SourceSpan>,
    },

    /// A kind-typed callee is called from a context that cannot accept its kind
    #[error("template {template}: cannot call {callee:?} (kind {kind}) from context {context}")]
    #[diagnostic(code(safran::incompatible_callee_kind))]
    IncompatibleCalleeContentKind {
        template: String,
        callee: String,
        kind: String,
        context: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("called here")]
        span: Option<SourceSpan>,
    },
}

impl CompileError {
    /// The name of the template the error is attributed to, if any.
    pub fn template(&self) -> Option<&str> {
        match self {
            CompileError::MissingNamespace { .. } => None,
            CompileError::UnrecognizedContentKind { template, .. }
            | CompileError::UndeclaredDataReference { template, .. }
            | CompileError::UnusedParameter { template, .. }
            | CompileError::UnusedLocalBinding { template, .. }
            | CompileError::ReservedBindingName { template, .. }
            | CompileError::LoopVariableMisuse { template, .. }
            | CompileError::CallTargetNotFound { template, .. }
            | CompileError::DelegateTargetNotFound { template, .. }
            | CompileError::UndeclaredCallParameter { template, .. }
            | CompileError::MissingRequiredCallParameter { template, .. }
            | CompileError::ContextConflictAtSharedCallee { template, .. }
            | CompileError::NonConvergentContextCycle { template, .. }
            | CompileError::IncompatibleCalleeContentKind { template, .. } => Some(template),
        }
    }
}

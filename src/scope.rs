//! Nested scope tracking for the reference validator.
//!
//! Bindings live in three layers: declared params (outermost, fixed for
//! the whole template), local let-bindings, and loop variables. Blocks
//! are bracketed with [`ScopeStack::enter`]/[`ScopeStack::leave`]; leave
//! pops exactly the bindings introduced since the matching enter and
//! hands back the expired lets that were never read.
//!
//! Usage attribution is exact: a usage recorded while a let was in scope
//! belongs to that let, and is not passed through to an outer binding of
//! the same name when the let expires.

use crate::ast::Span;

/// The reserved injected-data key. Always resolvable, never bindable.
pub const INJECTED_DATA_KEY: &str = "ij";

/// A named binding with the span where it was introduced
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub span: Span,
}

/// Marks the state of the stack at a block boundary.
/// Returned by [`ScopeStack::enter`], consumed by [`ScopeStack::leave`].
#[derive(Debug, Clone, Copy)]
pub struct ScopeMark {
    lets: usize,
    loop_vars: usize,
    used: usize,
}

/// Bindings visible at a point in a template body, plus the record of
/// which keys have been read so far.
#[derive(Debug)]
pub struct ScopeStack {
    params: Vec<String>,
    lets: Vec<Binding>,
    loop_vars: Vec<Binding>,
    used: Vec<String>,
}

impl ScopeStack {
    /// Seed a stack with the template's declared parameters.
    pub fn new(params: impl IntoIterator<Item = String>) -> Self {
        Self {
            params: params.into_iter().collect(),
            lets: Vec::new(),
            loop_vars: Vec::new(),
            used: Vec::new(),
        }
    }

    /// Snapshot the stack at the start of a block.
    pub fn enter(&self) -> ScopeMark {
        ScopeMark {
            lets: self.lets.len(),
            loop_vars: self.loop_vars.len(),
            used: self.used.len(),
        }
    }

    /// Bind a let variable, visible until the enclosing block is left.
    pub fn push_let(&mut self, name: impl Into<String>, span: Span) {
        self.lets.push(Binding {
            name: name.into(),
            span,
        });
    }

    /// Bind a loop variable, visible until the enclosing block is left.
    pub fn push_loop_var(&mut self, name: impl Into<String>, span: Span) {
        self.loop_vars.push(Binding {
            name: name.into(),
            span,
        });
    }

    /// Record a read of `key` and report whether it resolves.
    ///
    /// Resolution order: injected-data marker, lets (innermost first),
    /// loop variables, declared params.
    pub fn record_use(&mut self, key: &str) -> bool {
        self.used.push(key.to_string());
        self.resolves(key)
    }

    /// Record that a param was forwarded by a `data="all"` expansion.
    pub fn mark_param_used(&mut self, name: &str) {
        self.used.push(name.to_string());
    }

    fn resolves(&self, key: &str) -> bool {
        key == INJECTED_DATA_KEY
            || self.lets.iter().rev().any(|b| b.name == key)
            || self.loop_vars.iter().any(|b| b.name == key)
            || self.params.iter().any(|p| p == key)
    }

    /// Leave a block: pop every binding introduced since `mark` and
    /// return the expired lets that were never read while in scope.
    ///
    /// Usages of an expiring let are consumed with it; usages of
    /// anything else recorded inside the block are kept so params can be
    /// checked once the whole body is walked.
    pub fn leave(&mut self, mark: ScopeMark) -> Vec<Binding> {
        self.loop_vars.truncate(mark.loop_vars);

        if self.lets.len() == mark.lets {
            return Vec::new();
        }

        let expiring: Vec<Binding> = self.lets.split_off(mark.lets);
        let recent: Vec<String> = self.used.split_off(mark.used);
        let mut used_lets: Vec<&str> = Vec::new();
        for key in &recent {
            if expiring.iter().any(|b| &b.name == key) {
                used_lets.push(key);
            } else {
                self.used.push(key.clone());
            }
        }

        expiring
            .into_iter()
            .filter(|b| !used_lets.contains(&b.name.as_str()))
            .collect()
    }

    /// Params that were never read. Valid once the whole body is walked.
    pub fn unused_params(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| !self.used.iter().any(|u| &u == p))
            .map(String::as_str)
            .collect()
    }
}

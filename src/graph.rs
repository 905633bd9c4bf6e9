//! Call graph over the template registry.
//!
//! Nodes are [`TemplateId`]s (regular templates, then delegate
//! variants); edges record which template bodies call which targets. A
//! delegate call resolves to every registered variant of the name, since
//! variant selection happens at render time and any variant is
//! statically reachable from the call site.
//!
//! Roots (templates never named as a call target) seed context
//! inference. Unreachable templates raise no error here; they are valid
//! independent entry points.

use crate::ast::{CallParamValue, Node};
use crate::registry::{Registry, TemplateId};

/// Caller/callee adjacency over all template bodies in a registry
#[derive(Debug)]
pub struct CallGraph {
    callees: Vec<Vec<TemplateId>>,
    callers: Vec<Vec<TemplateId>>,
}

impl CallGraph {
    /// Scan every template body and record its resolvable call targets.
    /// Calls to names the registry does not contain produce no edge; the
    /// passes report those when they reach the call site.
    pub fn build(registry: &Registry) -> Self {
        let count = registry.node_count();
        let mut callees: Vec<Vec<TemplateId>> = vec![Vec::new(); count];
        let mut callers: Vec<Vec<TemplateId>> = vec![Vec::new(); count];

        for (id, template) in registry.nodes() {
            let mut targets = Vec::new();
            collect_targets(&template.body, &mut targets);
            for target in targets {
                let resolved: Vec<TemplateId> = match target {
                    Target::Template(name) => registry.template_id(name).into_iter().collect(),
                    Target::Delegate(name) => registry.del_variant_ids(name),
                };
                for callee in resolved {
                    if !callees[id].contains(&callee) {
                        callees[id].push(callee);
                    }
                    if !callers[callee].contains(&id) {
                        callers[callee].push(id);
                    }
                }
            }
        }

        Self { callees, callers }
    }

    /// Targets called from the given template body
    pub fn callees(&self, id: TemplateId) -> &[TemplateId] {
        &self.callees[id]
    }

    /// Template bodies that call the given target
    pub fn callers(&self, id: TemplateId) -> &[TemplateId] {
        &self.callers[id]
    }

    /// True if nothing in the registry calls this template
    pub fn is_root(&self, id: TemplateId) -> bool {
        self.callers[id].is_empty()
    }

    /// Every template never named as a call target, in id order
    pub fn roots(&self) -> Vec<TemplateId> {
        (0..self.callers.len())
            .filter(|&id| self.callers[id].is_empty())
            .collect()
    }
}

enum Target<'a> {
    Template(&'a str),
    Delegate(&'a str),
}

fn collect_targets<'a>(body: &'a [Node], out: &mut Vec<Target<'a>>) {
    for node in body {
        match node {
            Node::Call(call) => {
                out.push(Target::Template(&call.name));
                collect_param_targets(&call.params, out);
            }
            Node::DelCall(del_call) => {
                out.push(Target::Delegate(&del_call.call.name));
                collect_param_targets(&del_call.call.params, out);
            }
            Node::If(n) => {
                for branch in &n.branches {
                    collect_targets(&branch.body, out);
                }
                if let Some(else_body) = &n.else_body {
                    collect_targets(else_body, out);
                }
            }
            Node::For(n) => {
                collect_targets(&n.body, out);
                if let Some(empty_body) = &n.empty_body {
                    collect_targets(empty_body, out);
                }
            }
            Node::LetContent(n) => collect_targets(&n.body, out),
            Node::Region(n) => collect_targets(&n.body, out),
            Node::Text(_) | Node::Print(_) | Node::LetValue(_) => {}
        }
    }
}

fn collect_param_targets<'a>(params: &'a [crate::ast::CallParam], out: &mut Vec<Target<'a>>) {
    for param in params {
        if let CallParamValue::Content(body) = &param.value {
            collect_targets(body, out);
        }
    }
}

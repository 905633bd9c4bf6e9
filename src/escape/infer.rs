//! Context propagation over the call graph.
//!
//! Starting from the call-graph roots, each template body is walked once
//! in document order, threading the current [`Context`] explicitly
//! through every step. The context a template starts in is pinned the
//! first time the template is reached; every later call site must agree
//! with the pin. The walk records the resolved context of every print
//! node, in document order, for the rewrite phase to replay.
//!
//! Cycle rules: re-entering a template that is still being inferred is a
//! no-op when the context matches its pin, a non-convergence error when
//! it does not. A second call site reaching an already-finished template
//! in a different context is a context conflict.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::ast::{CallNode, CallParamValue, Node, Span};
use crate::error::{CompileError, Result};
use crate::graph::CallGraph;
use crate::registry::{Registry, Template, TemplateId};

use super::context::{Context, State};

/// Resolved print-node contexts per template, in document order
pub type PrintContexts = HashMap<TemplateId, Vec<Context>>;

/// Infer the context of every print node in the registry.
pub fn infer(registry: &Registry, graph: &CallGraph) -> Result<PrintContexts> {
    let mut engine = Engine {
        registry,
        records: HashMap::new(),
    };
    for root in graph.roots() {
        let template = registry.node(root);
        let start = Context::start_for(template.kind);
        debug!(template = %template.name, context = %start, "seeding root context");
        engine.infer_template(root, start, None)?;
    }
    // call components with no root (mutual recursion only) are still
    // valid entry points; seed them from their declared kinds
    for id in 0..registry.node_count() {
        if !engine.records.contains_key(&id) {
            let template = registry.node(id);
            engine.infer_template(id, Context::start_for(template.kind), None)?;
        }
    }
    Ok(engine
        .records
        .into_iter()
        .map(|(id, record)| (id, record.prints))
        .collect())
}

/// Where a template was reached from, for error attribution. Roots have
/// no site; their own header is labeled instead.
type CallSite<'a> = Option<(&'a Template, Span)>;

struct Record {
    start: Context,
    end: Option<Context>,
    reentered: bool,
    prints: Vec<Context>,
}

struct Engine<'a> {
    registry: &'a Registry,
    records: HashMap<TemplateId, Record>,
}

impl<'a> Engine<'a> {
    /// Resolve the template's contexts starting from `start`, returning
    /// the context it ends in.
    fn infer_template(
        &mut self,
        id: TemplateId,
        start: Context,
        site: CallSite<'a>,
    ) -> Result<Context> {
        let registry = self.registry;
        let template = registry.node(id);

        if let Some(record) = self.records.get_mut(&id) {
            if record.start != start {
                let (src, span) = site_or_header(site, template);
                return Err(if record.end.is_none() {
                    CompileError::NonConvergentContextCycle {
                        template: template.name.clone(),
                        start: record.start.to_string(),
                        required: start.to_string(),
                        src,
                        span,
                    }
                } else {
                    CompileError::ContextConflictAtSharedCallee {
                        template: template.name.clone(),
                        first: record.start.to_string(),
                        second: start.to_string(),
                        src,
                        span,
                    }
                });
            }
            return match record.end {
                Some(end) => Ok(end),
                // same-context re-entry of an in-progress template: the
                // cycle is stable, treat the call as a no-op
                None => {
                    record.reentered = true;
                    Ok(record.start)
                }
            };
        }

        trace!(template = %template.name, context = %start, "pinning start context");
        self.records.insert(
            id,
            Record {
                start,
                end: None,
                reentered: false,
                prints: Vec::new(),
            },
        );

        let mut prints = Vec::new();
        let end = self.walk_block(template, &template.body, start, &mut prints)?;

        let mut reentered = false;
        if let Some(record) = self.records.get_mut(&id) {
            record.prints = prints;
            record.end = Some(end);
            reentered = record.reentered;
        }
        if reentered && end != start {
            let (src, span) = site_or_header(site, template);
            return Err(CompileError::NonConvergentContextCycle {
                template: template.name.clone(),
                start: start.to_string(),
                required: end.to_string(),
                src,
                span,
            });
        }
        Ok(end)
    }

    fn walk_block(
        &mut self,
        template: &'a Template,
        nodes: &'a [Node],
        mut ctx: Context,
        prints: &mut Vec<Context>,
    ) -> Result<Context> {
        for node in nodes {
            ctx = self.walk_node(template, node, ctx, prints)?;
        }
        Ok(ctx)
    }

    fn walk_node(
        &mut self,
        template: &'a Template,
        node: &'a Node,
        ctx: Context,
        prints: &mut Vec<Context>,
    ) -> Result<Context> {
        match node {
            Node::Text(_) | Node::LetValue(_) => Ok(ctx),
            Node::Print(_) => {
                prints.push(ctx);
                Ok(ctx)
            }
            Node::If(n) => {
                for branch in &n.branches {
                    self.walk_block(template, &branch.body, ctx, prints)?;
                }
                if let Some(else_body) = &n.else_body {
                    self.walk_block(template, else_body, ctx, prints)?;
                }
                Ok(ctx)
            }
            Node::For(n) => {
                self.walk_block(template, &n.body, ctx, prints)?;
                if let Some(empty_body) = &n.empty_body {
                    self.walk_block(template, empty_body, ctx, prints)?;
                }
                Ok(ctx)
            }
            Node::LetContent(n) => {
                // a content binding is a self-contained fragment in its
                // own declared kind; it emits nothing here
                let inner = Context::start_for(n.kind);
                self.walk_block(template, &n.body, inner, prints)?;
                Ok(ctx)
            }
            Node::Region(n) => {
                let inner = Context {
                    state: State::for_region(n.kind),
                };
                self.walk_block(template, &n.body, inner, prints)?;
                Ok(ctx)
            }
            Node::Call(call) => self.walk_call(template, call, None, ctx, prints),
            Node::DelCall(del_call) => {
                self.walk_call(template, &del_call.call, Some(del_call.variant.as_str()), ctx, prints)
            }
        }
    }

    fn walk_call(
        &mut self,
        template: &'a Template,
        call: &'a CallNode,
        variant: Option<&str>,
        ctx: Context,
        prints: &mut Vec<Context>,
    ) -> Result<Context> {
        // content params are self-contained markup fragments
        for param in &call.params {
            if let CallParamValue::Content(body) = &param.value {
                self.walk_block(template, body, Context::start_for(None), prints)?;
            }
        }

        let registry = self.registry;
        let targets: Vec<TemplateId> = if let Some(variant) = variant {
            let variants = registry.del_variant_ids(&call.name);
            if variants.is_empty() {
                return Err(CompileError::DelegateTargetNotFound {
                    template: template.name.clone(),
                    callee: call.name.clone(),
                    variant: variant.to_string(),
                    src: template.source.named_source(),
                    span: Some(call.span),
                });
            }
            variants
        } else {
            match registry.template_id(&call.name) {
                Some(id) => vec![id],
                None => {
                    return Err(CompileError::CallTargetNotFound {
                        template: template.name.clone(),
                        callee: call.name.clone(),
                        src: template.source.named_source(),
                        span: Some(call.span),
                    });
                }
            }
        };

        let mut after: Option<Context> = None;
        for target in targets {
            let callee = registry.node(target);
            let site = Some((template, call.span));
            let result = match callee.kind {
                // a kind-typed fragment is self-contained: the call site
                // must accept its kind, and the surrounding context is
                // unchanged by the call
                Some(kind) => {
                    let callee_state = State::for_kind(kind);
                    if callee_state != ctx.state {
                        return Err(CompileError::IncompatibleCalleeContentKind {
                            template: template.name.clone(),
                            callee: callee.name.clone(),
                            kind: kind.as_attr_value().to_string(),
                            context: ctx.to_string(),
                            src: template.source.named_source(),
                            span: Some(call.span),
                        });
                    }
                    self.infer_template(target, Context { state: callee_state }, site)?;
                    ctx
                }
                // an untyped callee starts in the calling context and
                // carries its end context back to the call site
                None => self.infer_template(target, ctx, site)?,
            };
            match after {
                None => after = Some(result),
                Some(previous) if previous != result => {
                    // delegate variants sharing the call sites must also
                    // share an end context
                    return Err(CompileError::ContextConflictAtSharedCallee {
                        template: call.name.clone(),
                        first: previous.to_string(),
                        second: result.to_string(),
                        src: template.source.named_source(),
                        span: Some(call.span),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(after.unwrap_or(ctx))
    }
}

fn site_or_header(
    site: CallSite<'_>,
    callee: &Template,
) -> (miette::NamedSource<String>, Option<Span>) {
    match site {
        Some((caller, span)) => (caller.source.named_source(), Some(span)),
        None => (callee.source.named_source(), Some(callee.span)),
    }
}

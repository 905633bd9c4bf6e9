//! Autoescaping rewrite pass.
//!
//! If any template or namespace in the registry asks for contextual
//! escaping, the contextual engine runs over the whole registry: context
//! inference from the call-graph roots, then an in-place rewrite of
//! print nodes with the directive matching each node's resolved context.
//! Otherwise every template independently gets the flat treatment: a
//! generic HTML-escaping directive on every print node.
//!
//! Either way the rewrite is append-only: author-written directives are
//! preserved and run first, and a directive that cancels autoescaping
//! suppresses the append entirely. Since the appended escaping
//! directives themselves cancel autoescaping, running the pass twice is
//! a no-op.

pub mod context;
mod infer;

use tracing::debug;

use crate::ast::{self, DirectiveCall, EscapeMode};
use crate::directives;
use crate::error::Result;
use crate::graph::CallGraph;
use crate::registry::Registry;

pub use context::{Context, State};

/// Rewrite every print node in the registry with its escaping directive.
pub fn rewrite(registry: &mut Registry) -> Result<()> {
    let contextual = registry.nodes().any(|(_, t)| {
        t.autoescape == EscapeMode::Contextual
            || t.namespace_autoescape == EscapeMode::Contextual
    });
    if contextual {
        debug!("contextual autoescaping requested; inferring contexts");
        rewrite_contextual(registry)
    } else {
        rewrite_flat(registry);
        Ok(())
    }
}

fn rewrite_contextual(registry: &mut Registry) -> Result<()> {
    let graph = CallGraph::build(registry);
    let print_contexts = infer::infer(registry, &graph)?;

    for (id, contexts) in print_contexts {
        // mode off suppresses the rewrite, not the inference: the
        // template's calls still pinned its callees above
        let skip = registry.node(id).resolved_mode() == EscapeMode::Off;
        let template = registry.node_mut(id);
        let mut remaining = contexts.into_iter();
        ast::for_each_print_mut(&mut template.body, &mut |print| {
            let Some(ctx) = remaining.next() else {
                return;
            };
            if skip || has_cancelling_directive(print) {
                return;
            }
            print.directives.push(DirectiveCall {
                name: ctx.state.escaping_directive().to_string(),
                args: vec![],
                span: print.span,
            });
        });
        debug_assert!(remaining.next().is_none(), "print walk out of sync");
    }
    Ok(())
}

/// Flat fallback: no cross-template propagation, one generic
/// HTML-escaping directive per print node.
fn rewrite_flat(registry: &mut Registry) {
    for id in 0..registry.node_count() {
        if registry.node(id).resolved_mode() == EscapeMode::Off {
            continue;
        }
        let template = registry.node_mut(id);
        ast::for_each_print_mut(&mut template.body, &mut |print| {
            if has_cancelling_directive(print) {
                return;
            }
            print.directives.push(DirectiveCall {
                name: "escapeHtml".to_string(),
                args: vec![],
                span: print.span,
            });
        });
    }
}

fn has_cancelling_directive(print: &ast::PrintNode) -> bool {
    print
        .directives
        .iter()
        .any(|d| directives::cancels_autoescape(&d.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::registry::{Namespace, Param, TemplateDef, TemplateFile};

    fn sp() -> Span {
        span(0, 1)
    }

    fn print_of(key: &str) -> Node {
        Node::Print(PrintNode {
            expr: Expr::DataRef(DataRefExpr {
                key: key.into(),
                span: sp(),
            }),
            directives: vec![],
            span: sp(),
        })
    }

    fn print_with_directive(key: &str, directive: &str) -> Node {
        Node::Print(PrintNode {
            expr: Expr::DataRef(DataRefExpr {
                key: key.into(),
                span: sp(),
            }),
            directives: vec![DirectiveCall {
                name: directive.into(),
                args: vec![],
                span: sp(),
            }],
            span: sp(),
        })
    }

    fn tpl(name: &str, mode: EscapeMode, kind: Option<&str>, body: Vec<Node>) -> TemplateDef {
        TemplateDef {
            name: name.into(),
            kind: kind.map(String::from),
            autoescape: mode,
            params: vec![Param {
                name: "x".into(),
                required: false,
            }],
            body,
            span: sp(),
        }
    }

    fn registry(namespace_mode: EscapeMode, templates: Vec<TemplateDef>) -> Registry {
        let mut reg = Registry::new();
        reg.add_file(TemplateFile {
            name: "test.soy".into(),
            source: String::new(),
            namespace: Namespace {
                name: "test".into(),
                autoescape: namespace_mode,
            },
            templates,
            del_templates: vec![],
        })
        .unwrap();
        reg
    }

    fn directive_names(reg: &Registry, template: &str) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        let body = &reg.template(template).unwrap().body;
        let mut body = body.clone();
        ast::for_each_print_mut(&mut body, &mut |p| {
            out.push(p.directives.iter().map(|d| d.name.clone()).collect());
        });
        out
    }

    #[test]
    fn flat_mode_appends_generic_html_escaping() {
        let mut reg = registry(
            EscapeMode::Unspecified,
            vec![tpl(
                "test.main",
                EscapeMode::Unspecified,
                None,
                vec![print_of("x"), print_with_directive("x", "noAutoescape")],
            )],
        );
        rewrite(&mut reg).unwrap();
        assert_eq!(
            directive_names(&reg, "test.main"),
            vec![vec!["escapeHtml".to_string()], vec!["noAutoescape".to_string()]]
        );
    }

    #[test]
    fn flat_mode_off_leaves_prints_untouched() {
        let mut reg = registry(
            EscapeMode::On,
            vec![tpl(
                "test.raw",
                EscapeMode::Off,
                None,
                vec![print_of("x")],
            )],
        );
        rewrite(&mut reg).unwrap();
        assert_eq!(directive_names(&reg, "test.raw"), vec![Vec::<String>::new()]);
    }

    #[test]
    fn flat_mode_preserves_existing_directives_first() {
        let mut reg = registry(
            EscapeMode::On,
            vec![tpl(
                "test.main",
                EscapeMode::Unspecified,
                None,
                vec![print_with_directive("x", "truncate")],
            )],
        );
        rewrite(&mut reg).unwrap();
        assert_eq!(
            directive_names(&reg, "test.main"),
            vec![vec!["truncate".to_string(), "escapeHtml".to_string()]]
        );
    }

    #[test]
    fn flat_mode_is_idempotent() {
        let mut reg = registry(
            EscapeMode::On,
            vec![tpl(
                "test.main",
                EscapeMode::Unspecified,
                None,
                vec![print_of("x")],
            )],
        );
        rewrite(&mut reg).unwrap();
        let once = directive_names(&reg, "test.main");
        rewrite(&mut reg).unwrap();
        assert_eq!(directive_names(&reg, "test.main"), once);
    }

    #[test]
    fn contextual_mode_escapes_by_region() {
        let mut reg = registry(
            EscapeMode::Contextual,
            vec![tpl(
                "test.main",
                EscapeMode::Unspecified,
                None,
                vec![
                    print_of("x"),
                    Node::Region(RegionNode {
                        kind: RegionKind::Script,
                        body: vec![print_of("x")],
                        span: sp(),
                    }),
                    Node::Region(RegionNode {
                        kind: RegionKind::Url,
                        body: vec![print_of("x")],
                        span: sp(),
                    }),
                ],
            )],
        );
        rewrite(&mut reg).unwrap();
        assert_eq!(
            directive_names(&reg, "test.main"),
            vec![
                vec!["escapeHtml".to_string()],
                vec!["escapeJsValue".to_string()],
                vec!["escapeUri".to_string()],
            ]
        );
    }

    #[test]
    fn contextual_mode_uses_declared_kind_for_roots() {
        let mut reg = registry(
            EscapeMode::Contextual,
            vec![tpl(
                "test.styles",
                EscapeMode::Unspecified,
                Some("css"),
                vec![print_of("x")],
            )],
        );
        rewrite(&mut reg).unwrap();
        assert_eq!(
            directive_names(&reg, "test.styles"),
            vec![vec!["filterCssValue".to_string()]]
        );
    }

    #[test]
    fn contextual_mode_is_idempotent() {
        let mut reg = registry(
            EscapeMode::Contextual,
            vec![tpl(
                "test.main",
                EscapeMode::Unspecified,
                None,
                vec![Node::Region(RegionNode {
                    kind: RegionKind::AttrValue,
                    body: vec![print_of("x")],
                    span: sp(),
                })],
            )],
        );
        rewrite(&mut reg).unwrap();
        let once = directive_names(&reg, "test.main");
        rewrite(&mut reg).unwrap();
        assert_eq!(directive_names(&reg, "test.main"), once);
        assert_eq!(once, vec![vec!["escapeHtmlAttribute".to_string()]]);
    }

    #[test]
    fn contextual_mode_off_template_is_skipped() {
        let mut reg = registry(
            EscapeMode::Contextual,
            vec![tpl(
                "test.raw",
                EscapeMode::Off,
                None,
                vec![print_of("x")],
            )],
        );
        rewrite(&mut reg).unwrap();
        assert_eq!(directive_names(&reg, "test.raw"), vec![Vec::<String>::new()]);
    }
}

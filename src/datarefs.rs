//! Scope and data-reference validation.
//!
//! One pass over every template in the registry, independent of
//! escaping. Checks that:
//!
//! 1. every data ref is backed by a param, a let binding, a loop
//!    variable, or the injected-data marker
//! 2. every declared param is read at least once (directly or through a
//!    `data="all"` expansion)
//! 3. every explicitly passed call param is declared by the callee
//! 4. every required callee param is covered by the call, unless the
//!    call supplies an opaque data expression
//! 5. called templates exist in the registry
//! 6. every let binding is read before it goes out of scope
//! 7. bindings never reuse the reserved injected-data name
//!
//! The first violation anywhere aborts the pass for the whole registry.

use tracing::debug;

use crate::ast::{CallNode, DelCallNode, Expr, Node};
use crate::error::{CompileError, Result};
use crate::registry::{Param, Registry, Template};
use crate::scope::{Binding, ScopeStack, INJECTED_DATA_KEY};

/// Validate every template (and delegate variant) in the registry.
pub fn check(registry: &Registry) -> Result<()> {
    for (_, template) in registry.nodes() {
        debug!(template = %template.name, "checking data refs");
        TemplateChecker::new(registry, template).check()?;
    }
    Ok(())
}

struct TemplateChecker<'a> {
    registry: &'a Registry,
    template: &'a Template,
    scopes: ScopeStack,
}

impl<'a> TemplateChecker<'a> {
    fn new(registry: &'a Registry, template: &'a Template) -> Self {
        let scopes = ScopeStack::new(template.params.iter().map(|p| p.name.clone()));
        Self {
            registry,
            template,
            scopes,
        }
    }

    fn check(mut self) -> Result<()> {
        let template = self.template;
        self.check_block(&template.body)?;

        if let Some(param) = self.scopes.unused_params().first() {
            return Err(CompileError::UnusedParameter {
                template: template.name.clone(),
                param: param.to_string(),
                src: template.source.named_source(),
                span: Some(template.span),
            });
        }
        Ok(())
    }

    /// Walk a block of nodes in its own scope; expired lets must have
    /// been read.
    fn check_block(&mut self, nodes: &'a [Node]) -> Result<()> {
        let mark = self.scopes.enter();
        for node in nodes {
            self.check_node(node)?;
        }
        let unused = self.scopes.leave(mark);
        self.unused_lets_err(unused)
    }

    fn check_node(&mut self, node: &'a Node) -> Result<()> {
        match node {
            Node::Text(_) => Ok(()),
            Node::Print(p) => {
                self.check_expr(&p.expr)?;
                for directive in &p.directives {
                    for arg in &directive.args {
                        self.check_expr(arg)?;
                    }
                }
                Ok(())
            }
            Node::If(n) => {
                for branch in &n.branches {
                    self.check_expr(&branch.condition)?;
                    self.check_block(&branch.body)?;
                }
                if let Some(else_body) = &n.else_body {
                    self.check_block(else_body)?;
                }
                Ok(())
            }
            Node::For(n) => {
                self.check_expr(&n.iter)?;
                if n.var.name == INJECTED_DATA_KEY {
                    return Err(CompileError::LoopVariableMisuse {
                        template: self.template.name.clone(),
                        name: n.var.name.clone(),
                        src: self.template.source.named_source(),
                        span: Some(n.var.span),
                    });
                }
                let mark = self.scopes.enter();
                self.scopes.push_loop_var(&n.var.name, n.var.span);
                for child in &n.body {
                    self.check_node(child)?;
                }
                let unused = self.scopes.leave(mark);
                self.unused_lets_err(unused)?;
                if let Some(empty_body) = &n.empty_body {
                    self.check_block(empty_body)?;
                }
                Ok(())
            }
            Node::LetValue(n) => {
                // the binding is not visible in its own initializer
                self.check_expr(&n.value)?;
                self.check_let_name(&n.name.name, n.name.span)?;
                self.scopes.push_let(&n.name.name, n.name.span);
                Ok(())
            }
            Node::LetContent(n) => {
                self.check_block(&n.body)?;
                self.check_let_name(&n.name.name, n.name.span)?;
                self.scopes.push_let(&n.name.name, n.name.span);
                Ok(())
            }
            Node::Call(n) => self.check_call(n),
            Node::DelCall(n) => self.check_del_call(n),
            Node::Region(n) => self.check_block(&n.body),
        }
    }

    fn check_let_name(&self, name: &str, span: crate::ast::Span) -> Result<()> {
        if name == INJECTED_DATA_KEY {
            return Err(CompileError::ReservedBindingName {
                template: self.template.name.clone(),
                name: name.to_string(),
                src: self.template.source.named_source(),
                span: Some(span),
            });
        }
        Ok(())
    }

    fn check_call(&mut self, call: &'a CallNode) -> Result<()> {
        let registry = self.registry;
        let Some(callee) = registry.template(&call.name) else {
            return Err(CompileError::CallTargetNotFound {
                template: self.template.name.clone(),
                callee: call.name.clone(),
                src: self.template.source.named_source(),
                span: Some(call.span),
            });
        };
        self.check_call_against(call, &callee.params)
    }

    fn check_del_call(&mut self, del_call: &'a DelCallNode) -> Result<()> {
        let registry = self.registry;
        let call = &del_call.call;
        let Some(callee) = registry.del_template(&call.name, &del_call.variant) else {
            return Err(CompileError::DelegateTargetNotFound {
                template: self.template.name.clone(),
                callee: call.name.clone(),
                variant: del_call.variant.clone(),
                src: self.template.source.named_source(),
                span: Some(call.span),
            });
        };
        self.check_call_against(call, &callee.template.params)
    }

    fn check_call_against(&mut self, call: &'a CallNode, callee_params: &[Param]) -> Result<()> {
        let template = self.template;

        // names counting toward the callee's required-param coverage
        let mut covering: Vec<&str> = Vec::new();

        // expand data="all" into the caller params the callee also
        // declares; an optional caller param is forwarded (and counts as
        // used) but does not guarantee coverage
        if call.all_data {
            for caller_param in &template.params {
                if callee_params.iter().any(|p| p.name == caller_param.name) {
                    self.scopes.mark_param_used(&caller_param.name);
                    if caller_param.required {
                        covering.push(&caller_param.name);
                    }
                }
            }
        }

        for call_param in &call.params {
            let key = &call_param.key;
            if !callee_params.iter().any(|p| p.name == key.name) {
                return Err(CompileError::UndeclaredCallParameter {
                    template: template.name.clone(),
                    callee: call.name.clone(),
                    param: key.name.clone(),
                    src: template.source.named_source(),
                    span: Some(key.span),
                });
            }
            covering.push(&key.name);
        }

        // an opaque data expression makes coverage unverifiable; skip it
        if call.data_expr.is_none() {
            for required in callee_params.iter().filter(|p| p.required) {
                if !covering.contains(&required.name.as_str()) {
                    return Err(CompileError::MissingRequiredCallParameter {
                        template: template.name.clone(),
                        callee: call.name.clone(),
                        param: required.name.clone(),
                        src: template.source.named_source(),
                        span: Some(call.span),
                    });
                }
            }
        }

        if let Some(data_expr) = &call.data_expr {
            self.check_expr(data_expr)?;
        }
        for call_param in &call.params {
            match &call_param.value {
                crate::ast::CallParamValue::Value(expr) => self.check_expr(expr)?,
                crate::ast::CallParamValue::Content(body) => self.check_block(body)?,
            }
        }
        Ok(())
    }

    fn check_expr(&mut self, expr: &'a Expr) -> Result<()> {
        let mut unresolved = None;
        let scopes = &mut self.scopes;
        expr.for_each_data_ref(&mut |data_ref| {
            if unresolved.is_none() && !scopes.record_use(&data_ref.key) {
                unresolved = Some(data_ref);
            }
        });
        if let Some(data_ref) = unresolved {
            return Err(CompileError::UndeclaredDataReference {
                template: self.template.name.clone(),
                key: data_ref.key.clone(),
                src: self.template.source.named_source(),
                span: Some(data_ref.span),
            });
        }
        Ok(())
    }

    fn unused_lets_err(&self, unused: Vec<Binding>) -> Result<()> {
        if let Some(binding) = unused.first() {
            return Err(CompileError::UnusedLocalBinding {
                template: self.template.name.clone(),
                name: binding.name.clone(),
                src: self.template.source.named_source(),
                span: Some(binding.span),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::registry::{DelTemplateDef, Namespace, TemplateDef, TemplateFile};

    fn sp() -> Span {
        span(0, 1)
    }

    fn ident(name: &str) -> Ident {
        Ident {
            name: name.into(),
            span: sp(),
        }
    }

    fn data_ref(key: &str) -> Expr {
        Expr::DataRef(DataRefExpr {
            key: key.into(),
            span: sp(),
        })
    }

    fn print(key: &str) -> Node {
        Node::Print(PrintNode {
            expr: data_ref(key),
            directives: vec![],
            span: sp(),
        })
    }

    fn let_value(name: &str, key: &str) -> Node {
        Node::LetValue(LetValueNode {
            name: ident(name),
            value: data_ref(key),
            span: sp(),
        })
    }

    fn call(name: &str) -> CallNode {
        CallNode {
            name: name.into(),
            all_data: false,
            data_expr: None,
            params: vec![],
            span: sp(),
        }
    }

    fn param(name: &str, required: bool) -> Param {
        Param {
            name: name.into(),
            required,
        }
    }

    fn tpl(name: &str, params: Vec<Param>, body: Vec<Node>) -> TemplateDef {
        TemplateDef {
            name: name.into(),
            kind: None,
            autoescape: EscapeMode::Unspecified,
            params,
            body,
            span: sp(),
        }
    }

    fn registry(templates: Vec<TemplateDef>) -> Registry {
        registry_with(templates, vec![])
    }

    fn registry_with(templates: Vec<TemplateDef>, dels: Vec<DelTemplateDef>) -> Registry {
        let mut reg = Registry::new();
        reg.add_file(TemplateFile {
            name: "test.soy".into(),
            source: "{template}".into(),
            namespace: Namespace {
                name: "test".into(),
                autoescape: EscapeMode::Unspecified,
            },
            templates,
            del_templates: dels,
        })
        .unwrap();
        reg
    }

    #[test]
    fn params_read_by_prints_pass() {
        let reg = registry(vec![tpl(
            "test.main",
            vec![param("title", true)],
            vec![print("title")],
        )]);
        check(&reg).unwrap();
    }

    #[test]
    fn injected_data_is_always_resolvable() {
        let reg = registry(vec![tpl("test.main", vec![], vec![print("ij")])]);
        check(&reg).unwrap();
    }

    #[test]
    fn undeclared_ref_fails() {
        let reg = registry(vec![tpl("test.main", vec![], vec![print("ghost")])]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UndeclaredDataReference { ref key, ref template, .. }
                if key == "ghost" && template == "test.main"
        ));
    }

    #[test]
    fn unused_param_fails() {
        let reg = registry(vec![tpl("test.main", vec![param("title", true)], vec![])]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnusedParameter { ref param, .. } if param == "title"
        ));
    }

    #[test]
    fn unused_let_fails() {
        let reg = registry(vec![tpl(
            "test.main",
            vec![],
            vec![let_value("x", "ij")],
        )]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnusedLocalBinding { ref name, .. } if name == "x"
        ));
    }

    #[test]
    fn let_shadowing_param_does_not_satisfy_it() {
        // {let $title: $ij}{print $title}: the read belongs to the let,
        // so the param is still unused once the let expires.
        let reg = registry(vec![tpl(
            "test.main",
            vec![param("title", true)],
            vec![let_value("title", "ij"), print("title")],
        )]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnusedParameter { ref param, .. } if param == "title"
        ));
    }

    #[test]
    fn reserved_let_name_fails() {
        let reg = registry(vec![tpl(
            "test.main",
            vec![],
            vec![let_value("ij", "ij")],
        )]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(err, CompileError::ReservedBindingName { .. }));
    }

    #[test]
    fn reserved_loop_var_fails() {
        let reg = registry(vec![tpl(
            "test.main",
            vec![param("items", true)],
            vec![Node::For(ForNode {
                var: ident("ij"),
                iter: data_ref("items"),
                body: vec![],
                empty_body: None,
                span: sp(),
            })],
        )]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(err, CompileError::LoopVariableMisuse { .. }));
    }

    #[test]
    fn loop_var_resolves_inside_body_only() {
        let reg = registry(vec![tpl(
            "test.main",
            vec![param("items", true)],
            vec![
                Node::For(ForNode {
                    var: ident("item"),
                    iter: data_ref("items"),
                    body: vec![print("item")],
                    empty_body: None,
                    span: sp(),
                }),
                print("item"),
            ],
        )]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UndeclaredDataReference { ref key, .. } if key == "item"
        ));
    }

    #[test]
    fn call_target_must_exist() {
        let reg = registry(vec![tpl(
            "test.main",
            vec![],
            vec![Node::Call(call("test.ghost"))],
        )]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::CallTargetNotFound { ref callee, .. } if callee == "test.ghost"
        ));
    }

    #[test]
    fn delegate_target_must_exist_by_variant() {
        let reg = registry_with(
            vec![tpl(
                "test.main",
                vec![],
                vec![Node::DelCall(DelCallNode {
                    call: call("test.widget"),
                    variant: "fancy".into(),
                })],
            )],
            vec![DelTemplateDef {
                template: tpl("test.widget", vec![], vec![]),
                variant: "plain".into(),
            }],
        );
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::DelegateTargetNotFound { ref variant, .. } if variant == "fancy"
        ));
    }

    #[test]
    fn delegate_call_with_matching_variant_passes() {
        let reg = registry_with(
            vec![tpl(
                "test.main",
                vec![],
                vec![Node::DelCall(DelCallNode {
                    call: call("test.widget"),
                    variant: "plain".into(),
                })],
            )],
            vec![DelTemplateDef {
                template: tpl("test.widget", vec![], vec![]),
                variant: "plain".into(),
            }],
        );
        check(&reg).unwrap();
    }

    #[test]
    fn undeclared_call_param_fails() {
        let mut c = call("test.leaf");
        c.params.push(CallParam {
            key: ident("bogus"),
            value: CallParamValue::Value(data_ref("ij")),
        });
        let reg = registry(vec![
            tpl("test.main", vec![], vec![Node::Call(c)]),
            tpl("test.leaf", vec![param("title", false)], vec![print("title")]),
        ]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UndeclaredCallParameter { ref param, .. } if param == "bogus"
        ));
    }

    #[test]
    fn missing_required_call_param_fails() {
        let reg = registry(vec![
            tpl("test.main", vec![], vec![Node::Call(call("test.leaf"))]),
            tpl("test.leaf", vec![param("title", true)], vec![print("title")]),
        ]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::MissingRequiredCallParameter { ref param, .. } if param == "title"
        ));
    }

    #[test]
    fn all_data_covers_required_param_and_marks_it_used() {
        let mut c = call("test.leaf");
        c.all_data = true;
        let reg = registry(vec![
            tpl("test.main", vec![param("title", true)], vec![Node::Call(c)]),
            tpl("test.leaf", vec![param("title", true)], vec![print("title")]),
        ]);
        check(&reg).unwrap();
    }

    #[test]
    fn all_data_optional_caller_param_does_not_cover() {
        // caller declares title as optional; forwarding it cannot
        // guarantee the callee's required title is present
        let mut c = call("test.leaf");
        c.all_data = true;
        let reg = registry(vec![
            tpl("test.main", vec![param("title", false)], vec![Node::Call(c)]),
            tpl("test.leaf", vec![param("title", true)], vec![print("title")]),
        ]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::MissingRequiredCallParameter { ref param, .. } if param == "title"
        ));
    }

    #[test]
    fn opaque_data_expr_skips_coverage() {
        let mut c = call("test.leaf");
        c.data_expr = Some(data_ref("ij"));
        let reg = registry(vec![
            tpl("test.main", vec![], vec![Node::Call(c)]),
            tpl("test.leaf", vec![param("title", true)], vec![print("title")]),
        ]);
        check(&reg).unwrap();
    }

    #[test]
    fn explicit_param_covers_required() {
        let mut c = call("test.leaf");
        c.params.push(CallParam {
            key: ident("title"),
            value: CallParamValue::Value(data_ref("ij")),
        });
        let reg = registry(vec![
            tpl("test.main", vec![], vec![Node::Call(c)]),
            tpl("test.leaf", vec![param("title", true)], vec![print("title")]),
        ]);
        check(&reg).unwrap();
    }

    #[test]
    fn content_param_body_is_its_own_scope() {
        let mut c = call("test.leaf");
        c.params.push(CallParam {
            key: ident("title"),
            value: CallParamValue::Content(vec![let_value("x", "ij")]),
        });
        let reg = registry(vec![
            tpl("test.main", vec![], vec![Node::Call(c)]),
            tpl("test.leaf", vec![param("title", true)], vec![print("title")]),
        ]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnusedLocalBinding { ref name, .. } if name == "x"
        ));
    }
}

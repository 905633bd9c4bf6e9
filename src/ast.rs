//! AST nodes for template bodies.
//!
//! The parser lives outside this crate; it hands us fully-built bodies.
//! Every node carries a [`Span`] into the template's source file for
//! precise error reporting. Nothing here is mutated by the passes except
//! the directive lists on [`PrintNode`]s, which the autoescaper extends
//! in place.

use miette::SourceSpan;

/// A span in the source (re-export from miette)
pub type Span = SourceSpan;

/// Create a span from offset and length
pub fn span(offset: usize, len: usize) -> Span {
    SourceSpan::new(offset.into(), len)
}

/// Escaping mode declared on a template or namespace.
///
/// An unspecified template mode falls back to its namespace; an
/// unspecified namespace mode falls back to [`EscapeMode::On`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeMode {
    #[default]
    Unspecified,
    On,
    Off,
    Contextual,
}

impl EscapeMode {
    /// Resolve this (template-level) mode against the namespace-level one.
    pub fn resolve(self, namespace: EscapeMode) -> EscapeMode {
        match self {
            EscapeMode::Unspecified => match namespace {
                EscapeMode::Unspecified => EscapeMode::On,
                other => other,
            },
            other => other,
        }
    }
}

/// Classification of the content a template fragment produces.
///
/// Declared via the fixed `kind` vocabulary on templates and content
/// bindings; used to seed and to validate escaping contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Html,
    Js,
    /// A string literal inside script content. Not part of the declared
    /// kind vocabulary; exists for directive compatibility tagging.
    JsStr,
    Css,
    Uri,
    Attributes,
}

impl ContentKind {
    /// The `kind` attribute spelling for diagnostics. `JsStr` has no
    /// attribute spelling and reports as script content.
    pub fn as_attr_value(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Html => "html",
            ContentKind::Js | ContentKind::JsStr => "js",
            ContentKind::Css => "css",
            ContentKind::Uri => "uri",
            ContentKind::Attributes => "attributes",
        }
    }

    /// Parse the declared `kind` attribute vocabulary.
    pub fn from_attr_value(s: &str) -> Option<ContentKind> {
        match s {
            "text" => Some(ContentKind::Text),
            "html" => Some(ContentKind::Html),
            "js" => Some(ContentKind::Js),
            "css" => Some(ContentKind::Css),
            "uri" => Some(ContentKind::Uri),
            "attributes" => Some(ContentKind::Attributes),
            _ => None,
        }
    }
}

/// A node in a template body
#[derive(Debug, Clone)]
pub enum Node {
    /// Raw text, emitted verbatim
    Text(TextNode),
    /// Emission of a dynamic value: {print expr}
    Print(PrintNode),
    /// Conditional with zero or more elseif branches
    If(IfNode),
    /// Loop over a sequence, binding a loop variable
    For(ForNode),
    /// Local binding of an expression value: {let $x: expr}
    LetValue(LetValueNode),
    /// Local binding of a rendered block: {let $x}...{/let}
    LetContent(LetContentNode),
    /// Call to another template by name
    Call(CallNode),
    /// Call to a delegate template by (name, variant)
    DelCall(DelCallNode),
    /// A block statically known to sit inside a markup sub-context
    Region(RegionNode),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Text(n) => n.span,
            Node::Print(n) => n.span,
            Node::If(n) => n.span,
            Node::For(n) => n.span,
            Node::LetValue(n) => n.span,
            Node::LetContent(n) => n.span,
            Node::Call(n) => n.span,
            Node::DelCall(n) => n.call.span,
            Node::Region(n) => n.span,
        }
    }
}

/// Raw text node
#[derive(Debug, Clone)]
pub struct TextNode {
    pub text: String,
    pub span: Span,
}

/// Emission node: writes a runtime value to output.
///
/// `directives` run left-to-right at render time. The autoescaper appends
/// at most one escaping directive; author-written directives are kept and
/// run first.
#[derive(Debug, Clone)]
pub struct PrintNode {
    pub expr: Expr,
    pub directives: Vec<DirectiveCall>,
    pub span: Span,
}

/// An applied print directive, e.g. `|escapeHtml` or `|truncate:40`
#[derive(Debug, Clone)]
pub struct DirectiveCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub span: Span,
}

/// Conditional node
#[derive(Debug, Clone)]
pub struct IfNode {
    /// The if branch followed by any elseif branches
    pub branches: Vec<IfBranch>,
    pub else_body: Option<Vec<Node>>,
    pub span: Span,
}

/// One condition/body pair of an [`IfNode`]
#[derive(Debug, Clone)]
pub struct IfBranch {
    pub condition: Expr,
    pub body: Vec<Node>,
    pub span: Span,
}

/// Loop node. The loop variable is visible only inside `body`;
/// `empty_body` runs instead when the sequence is empty.
#[derive(Debug, Clone)]
pub struct ForNode {
    pub var: Ident,
    pub iter: Expr,
    pub body: Vec<Node>,
    pub empty_body: Option<Vec<Node>>,
    pub span: Span,
}

/// Local binding of an expression value
#[derive(Debug, Clone)]
pub struct LetValueNode {
    pub name: Ident,
    pub value: Expr,
    pub span: Span,
}

/// Local binding of a rendered block, optionally kind-typed
#[derive(Debug, Clone)]
pub struct LetContentNode {
    pub name: Ident,
    pub kind: Option<ContentKind>,
    pub body: Vec<Node>,
    pub span: Span,
}

/// Call node. Data passing is one of:
/// - `all_data`: forward the caller params the callee also declares
/// - `data_expr`: an opaque expression supplying the whole data object
/// - neither: only the explicit `params` are passed
#[derive(Debug, Clone)]
pub struct CallNode {
    pub name: String,
    pub all_data: bool,
    pub data_expr: Option<Expr>,
    pub params: Vec<CallParam>,
    pub span: Span,
}

/// An explicitly passed call parameter
#[derive(Debug, Clone)]
pub struct CallParam {
    pub key: Ident,
    pub value: CallParamValue,
}

/// The value side of a call parameter
#[derive(Debug, Clone)]
pub enum CallParamValue {
    /// {param key: expr /}
    Value(Expr),
    /// {param key}...{/param}, a rendered block
    Content(Vec<Node>),
}

/// Delegate call: target selected by (name, variant) at render time.
/// For static analysis every variant of the name is treated as reachable.
#[derive(Debug, Clone)]
pub struct DelCallNode {
    pub call: CallNode,
    pub variant: String,
}

/// What sub-context a [`RegionNode`] statically implies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Inside an HTML attribute value
    AttrValue,
    /// Inside a script element or inline handler
    Script,
    /// Inside a style element or style attribute
    Style,
    /// Inside a URL-valued position
    Url,
}

/// A block whose static structure places it in a markup sub-context.
/// Entering pushes the implied context; leaving restores the enclosing one.
#[derive(Debug, Clone)]
pub struct RegionNode {
    pub kind: RegionKind,
    pub body: Vec<Node>,
    pub span: Span,
}

/// An identifier with its span
#[derive(Debug, Clone)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ============================================================================
// Expressions
// ============================================================================

/// An expression. Only as much structure as static analysis needs:
/// data references must be discoverable, nothing is type-checked.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Reference to a data key: $key
    DataRef(DataRefExpr),
    Str(StrLit),
    Int(IntLit),
    Bool(BoolLit),
    Null(NullLit),
    /// Logical negation
    Not(NotExpr),
    /// Binary concatenation/sequencing of two sub-expressions
    Concat(ConcatExpr),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::DataRef(e) => e.span,
            Expr::Str(l) => l.span,
            Expr::Int(l) => l.span,
            Expr::Bool(l) => l.span,
            Expr::Null(l) => l.span,
            Expr::Not(e) => e.span,
            Expr::Concat(e) => e.span,
        }
    }

    /// Visit every data reference in this expression, in source order.
    pub fn for_each_data_ref<'a>(&'a self, f: &mut impl FnMut(&'a DataRefExpr)) {
        match self {
            Expr::DataRef(r) => f(r),
            Expr::Not(e) => e.expr.for_each_data_ref(f),
            Expr::Concat(e) => {
                e.left.for_each_data_ref(f);
                e.right.for_each_data_ref(f);
            }
            Expr::Str(_) | Expr::Int(_) | Expr::Bool(_) | Expr::Null(_) => {}
        }
    }
}

/// Reference to a data key. `key` is the top-level name only; sub-path
/// access is opaque to the passes.
#[derive(Debug, Clone)]
pub struct DataRefExpr {
    pub key: String,
    pub span: Span,
}

/// String literal
#[derive(Debug, Clone)]
pub struct StrLit {
    pub value: String,
    pub span: Span,
}

/// Integer literal
#[derive(Debug, Clone)]
pub struct IntLit {
    pub value: i64,
    pub span: Span,
}

/// Boolean literal
#[derive(Debug, Clone)]
pub struct BoolLit {
    pub value: bool,
    pub span: Span,
}

/// Null literal
#[derive(Debug, Clone)]
pub struct NullLit {
    pub span: Span,
}

/// Logical not
#[derive(Debug, Clone)]
pub struct NotExpr {
    pub expr: Box<Expr>,
    pub span: Span,
}

/// Concatenation of two sub-expressions
#[derive(Debug, Clone)]
pub struct ConcatExpr {
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub span: Span,
}

/// Visit every print node under `body` mutably, in document order.
///
/// The visit order here is load-bearing: the contextual engine records
/// inferred contexts in its own document-order walk and replays them
/// against this one, so both must descend into nested bodies (branches,
/// loops, content bindings, regions, call param blocks) at the same
/// points.
pub fn for_each_print_mut(body: &mut [Node], f: &mut impl FnMut(&mut PrintNode)) {
    for node in body {
        match node {
            Node::Print(p) => f(p),
            Node::If(n) => {
                for branch in &mut n.branches {
                    for_each_print_mut(&mut branch.body, f);
                }
                if let Some(else_body) = &mut n.else_body {
                    for_each_print_mut(else_body, f);
                }
            }
            Node::For(n) => {
                for_each_print_mut(&mut n.body, f);
                if let Some(empty_body) = &mut n.empty_body {
                    for_each_print_mut(empty_body, f);
                }
            }
            Node::LetContent(n) => for_each_print_mut(&mut n.body, f),
            Node::Region(n) => for_each_print_mut(&mut n.body, f),
            Node::Call(n) => for_each_call_param_print_mut(n, f),
            Node::DelCall(n) => for_each_call_param_print_mut(&mut n.call, f),
            Node::Text(_) | Node::LetValue(_) => {}
        }
    }
}

fn for_each_call_param_print_mut(call: &mut CallNode, f: &mut impl FnMut(&mut PrintNode)) {
    for param in &mut call.params {
        if let CallParamValue::Content(body) = &mut param.value {
            for_each_print_mut(body, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_mode_falls_back_to_namespace_then_on() {
        assert_eq!(
            EscapeMode::Unspecified.resolve(EscapeMode::Contextual),
            EscapeMode::Contextual
        );
        assert_eq!(
            EscapeMode::Unspecified.resolve(EscapeMode::Unspecified),
            EscapeMode::On
        );
        assert_eq!(EscapeMode::Off.resolve(EscapeMode::On), EscapeMode::Off);
    }

    #[test]
    fn content_kind_vocabulary() {
        assert_eq!(ContentKind::from_attr_value("js"), Some(ContentKind::Js));
        assert_eq!(
            ContentKind::from_attr_value("attributes"),
            Some(ContentKind::Attributes)
        );
        assert_eq!(ContentKind::from_attr_value("markdown"), None);
    }

    #[test]
    fn for_each_data_ref_walks_nested_exprs() {
        let expr = Expr::Concat(ConcatExpr {
            left: Box::new(Expr::DataRef(DataRefExpr {
                key: "a".into(),
                span: span(0, 2),
            })),
            right: Box::new(Expr::Not(NotExpr {
                expr: Box::new(Expr::DataRef(DataRefExpr {
                    key: "b".into(),
                    span: span(6, 2),
                })),
                span: span(5, 3),
            })),
            span: span(0, 8),
        });
        let mut keys = Vec::new();
        expr.for_each_data_ref(&mut |r| keys.push(r.key.clone()));
        assert_eq!(keys, ["a", "b"]);
    }
}

//! The fixed print-directive table.
//!
//! Directive implementations live in the execution engine; the passes
//! only consult this table for two facts: which content kind a directive
//! produces, and whether it cancels automatic escaping (i.e. asserts its
//! output is already safe for its context).

use crate::ast::ContentKind;

/// A known print directive
#[derive(Debug, Clone, Copy)]
pub struct Directive {
    pub name: &'static str,
    /// Content kinds the directive's output is valid for. Empty means
    /// the directive is kind-neutral (cosmetic).
    pub kinds: &'static [ContentKind],
    /// True if the directive's output needs no further escaping
    pub cancels_autoescape: bool,
}

/// All directives the passes know about. The escaping directives cancel
/// further autoescaping: their output is, by contract, safe for the kind
/// they produce. This is what makes a second escaping pass a no-op.
pub const DIRECTIVES: &[Directive] = &[
    Directive {
        name: "escapeHtml",
        kinds: &[ContentKind::Html],
        cancels_autoescape: true,
    },
    Directive {
        name: "escapeHtmlAttribute",
        kinds: &[ContentKind::Attributes],
        cancels_autoescape: true,
    },
    Directive {
        name: "escapeJsValue",
        kinds: &[ContentKind::Js],
        cancels_autoescape: true,
    },
    Directive {
        name: "escapeJsString",
        kinds: &[ContentKind::JsStr],
        cancels_autoescape: true,
    },
    Directive {
        name: "filterCssValue",
        kinds: &[ContentKind::Css],
        cancels_autoescape: true,
    },
    Directive {
        name: "escapeUri",
        kinds: &[ContentKind::Uri],
        cancels_autoescape: true,
    },
    Directive {
        name: "noAutoescape",
        kinds: &[],
        cancels_autoescape: true,
    },
    Directive {
        name: "id",
        kinds: &[],
        cancels_autoescape: true,
    },
    Directive {
        name: "changeNewlineToBr",
        kinds: &[ContentKind::Html],
        cancels_autoescape: false,
    },
    Directive {
        name: "insertWordBreaks",
        kinds: &[ContentKind::Html],
        cancels_autoescape: false,
    },
    Directive {
        name: "truncate",
        kinds: &[],
        cancels_autoescape: false,
    },
];

/// Look up a directive by name
pub fn lookup(name: &str) -> Option<&'static Directive> {
    DIRECTIVES.iter().find(|d| d.name == name)
}

/// Whether the named directive suppresses automatic escaping.
/// Unknown directives do not.
pub fn cancels_autoescape(name: &str) -> bool {
    lookup(name).is_some_and(|d| d.cancels_autoescape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_directives_cancel() {
        assert!(cancels_autoescape("escapeHtml"));
        assert!(cancels_autoescape("escapeUri"));
        assert!(cancels_autoescape("noAutoescape"));
    }

    #[test]
    fn cosmetic_and_unknown_directives_do_not_cancel() {
        assert!(!cancels_autoescape("truncate"));
        assert!(!cancels_autoescape("changeNewlineToBr"));
        assert!(!cancels_autoescape("someCustomDirective"));
    }

    #[test]
    fn kind_tags_match_directive_purpose() {
        assert_eq!(lookup("escapeJsValue").unwrap().kinds, [ContentKind::Js]);
        assert_eq!(lookup("filterCssValue").unwrap().kinds, [ContentKind::Css]);
    }
}

//! Markup context states for the contextual escaper.
//!
//! The context is the markup state immediately before a point in a
//! template's output. The minimal state set distinguishes the five
//! places a dynamic value can land, each with exactly one correct
//! escaping directive. States are stable under sequencing: raw text
//! never changes the state, and sub-context regions are balanced.

use std::fmt;

use crate::ast::{ContentKind, RegionKind};

/// The markup state at a cursor position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Plain text / HTML PCDATA
    Text,
    /// Inside an HTML attribute value
    Attr,
    /// Inside script content
    Js,
    /// Inside stylesheet content
    Css,
    /// Inside a URL-valued position
    Url,
}

impl State {
    /// Starting state for a fragment of the given declared kind
    pub fn for_kind(kind: ContentKind) -> State {
        match kind {
            ContentKind::Text | ContentKind::Html => State::Text,
            ContentKind::Attributes => State::Attr,
            ContentKind::Js | ContentKind::JsStr => State::Js,
            ContentKind::Css => State::Css,
            ContentKind::Uri => State::Url,
        }
    }

    /// Sub-state implied by entering a structural region
    pub fn for_region(kind: RegionKind) -> State {
        match kind {
            RegionKind::AttrValue => State::Attr,
            RegionKind::Script => State::Js,
            RegionKind::Style => State::Css,
            RegionKind::Url => State::Url,
        }
    }

    /// The one escaping directive correct for a value emitted in this state
    pub fn escaping_directive(self) -> &'static str {
        match self {
            State::Text => "escapeHtml",
            State::Attr => "escapeHtmlAttribute",
            State::Js => "escapeJsValue",
            State::Css => "filterCssValue",
            State::Url => "escapeUri",
        }
    }

    /// The content kind produced by correctly escaping for this state
    pub fn content_kind(self) -> ContentKind {
        match self {
            State::Text => ContentKind::Html,
            State::Attr => ContentKind::Attributes,
            State::Js => ContentKind::Js,
            State::Css => ContentKind::Css,
            State::Url => ContentKind::Uri,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Text => "text",
            State::Attr => "attribute value",
            State::Js => "script",
            State::Css => "stylesheet",
            State::Url => "url",
        })
    }
}

/// The inferred context at a point in a template's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Context {
    pub state: State,
}

impl Context {
    /// Starting context for a template or fragment: its declared kind's
    /// state, or plain markup text by default.
    pub fn start_for(kind: Option<ContentKind>) -> Context {
        Context {
            state: kind.map_or(State::Text, State::for_kind),
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.fmt(f)
    }
}

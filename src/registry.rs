//! Registry of parsed template files.
//!
//! The external parser produces [`TemplateFile`] values; adding them here
//! flattens the files into templates and delegate templates, keeps the
//! per-file source text for diagnostics, and indexes lookup by name and
//! by (name, variant). The compile passes run over a fully-populated
//! registry and rewrite print nodes in place.

use std::collections::HashMap;

use crate::ast::{ContentKind, EscapeMode, Node, Span};
use crate::error::{CompileError, Result, TemplateSource};

/// A namespace declaration shared by all templates in a file
#[derive(Debug, Clone)]
pub struct Namespace {
    pub name: String,
    pub autoescape: EscapeMode,
}

/// A parsed template file, as handed over by the external parser
#[derive(Debug, Clone)]
pub struct TemplateFile {
    /// File name, used in diagnostics
    pub name: String,
    /// Raw source text, used in diagnostics
    pub source: String,
    pub namespace: Namespace,
    pub templates: Vec<TemplateDef>,
    pub del_templates: Vec<DelTemplateDef>,
}

/// A parsed template before registration. The `kind` attribute is still
/// the raw string from the source; it is validated on add.
#[derive(Debug, Clone)]
pub struct TemplateDef {
    /// Fully-qualified template name
    pub name: String,
    pub kind: Option<String>,
    pub autoescape: EscapeMode,
    pub params: Vec<Param>,
    pub body: Vec<Node>,
    pub span: Span,
}

/// A parsed delegate template variant before registration
#[derive(Debug, Clone)]
pub struct DelTemplateDef {
    pub template: TemplateDef,
    pub variant: String,
}

/// A declared template parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub required: bool,
}

/// A registered template with its file and namespace context resolved
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub namespace: String,
    pub namespace_autoescape: EscapeMode,
    pub autoescape: EscapeMode,
    pub kind: Option<ContentKind>,
    pub params: Vec<Param>,
    pub body: Vec<Node>,
    pub span: Span,
    pub source: TemplateSource,
}

impl Template {
    /// Effective escaping mode: template, then namespace, then on.
    pub fn resolved_mode(&self) -> EscapeMode {
        self.autoescape.resolve(self.namespace_autoescape)
    }
}

/// A registered delegate template variant
#[derive(Debug, Clone)]
pub struct DelTemplate {
    pub template: Template,
    pub variant: String,
}

/// Identifies one template body in the registry: regular templates come
/// first, delegate variants after. Ids are stable as long as no further
/// files are added, which holds for the duration of a compile run.
pub type TemplateId = usize;

/// All templates and delegate templates from the added files
#[derive(Debug, Default)]
pub struct Registry {
    pub templates: Vec<Template>,
    pub del_templates: Vec<DelTemplate>,
    by_name: HashMap<String, usize>,
    del_by_name_variant: HashMap<(String, String), usize>,
    del_variants: HashMap<String, Vec<usize>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parsed file and all templates it contains.
    ///
    /// Fails if the file declares no namespace or if any template's
    /// `kind` attribute is outside the fixed vocabulary.
    pub fn add_file(&mut self, file: TemplateFile) -> Result<()> {
        if file.namespace.name.is_empty() {
            return Err(CompileError::MissingNamespace { file: file.name });
        }
        let source = TemplateSource::new(&file.name, &file.source);
        for def in file.templates {
            let template = Self::register(def, &file.namespace, &source)?;
            self.by_name
                .insert(template.name.clone(), self.templates.len());
            self.templates.push(template);
        }
        for def in file.del_templates {
            let template = Self::register(def.template, &file.namespace, &source)?;
            let idx = self.del_templates.len();
            self.del_by_name_variant
                .insert((template.name.clone(), def.variant.clone()), idx);
            self.del_variants
                .entry(template.name.clone())
                .or_default()
                .push(idx);
            self.del_templates.push(DelTemplate {
                template,
                variant: def.variant,
            });
        }
        Ok(())
    }

    fn register(
        def: TemplateDef,
        namespace: &Namespace,
        source: &TemplateSource,
    ) -> Result<Template> {
        let kind = match def.kind {
            None => None,
            Some(raw) => match ContentKind::from_attr_value(&raw) {
                Some(kind) => Some(kind),
                None => {
                    return Err(CompileError::UnrecognizedContentKind {
                        template: def.name,
                        kind: raw,
                        src: source.named_source(),
                        span: Some(def.span),
                    });
                }
            },
        };
        Ok(Template {
            name: def.name,
            namespace: namespace.name.clone(),
            namespace_autoescape: namespace.autoescape,
            autoescape: def.autoescape,
            kind,
            params: def.params,
            body: def.body,
            span: def.span,
            source: source.clone(),
        })
    }

    /// Look up a template by fully-qualified name
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.by_name.get(name).map(|&i| &self.templates[i])
    }

    /// Look up a delegate template by (name, variant)
    pub fn del_template(&self, name: &str, variant: &str) -> Option<&DelTemplate> {
        self.del_by_name_variant
            .get(&(name.to_string(), variant.to_string()))
            .map(|&i| &self.del_templates[i])
    }

    /// Number of template bodies (regular + delegate variants)
    pub fn node_count(&self) -> usize {
        self.templates.len() + self.del_templates.len()
    }

    /// The template body behind an id
    pub fn node(&self, id: TemplateId) -> &Template {
        if id < self.templates.len() {
            &self.templates[id]
        } else {
            &self.del_templates[id - self.templates.len()].template
        }
    }

    /// Mutable access to the template body behind an id
    pub fn node_mut(&mut self, id: TemplateId) -> &mut Template {
        if id < self.templates.len() {
            &mut self.templates[id]
        } else {
            &mut self.del_templates[id - self.templates.len()].template
        }
    }

    /// Id of the regular template with the given name
    pub fn template_id(&self, name: &str) -> Option<TemplateId> {
        self.by_name.get(name).copied()
    }

    /// Ids of every delegate variant registered under the given name
    pub fn del_variant_ids(&self, name: &str) -> Vec<TemplateId> {
        match self.del_variants.get(name) {
            Some(indices) => indices.iter().map(|i| i + self.templates.len()).collect(),
            None => Vec::new(),
        }
    }

    /// Iterate over every template body with its id
    pub fn nodes(&self) -> impl Iterator<Item = (TemplateId, &Template)> {
        self.templates
            .iter()
            .chain(self.del_templates.iter().map(|d| &d.template))
            .enumerate()
    }

    /// Line number (1-based) of a span within the named template's source
    pub fn line_number(&self, template: &str, span: Span) -> usize {
        let Some(t) = self.template(template) else {
            return 0;
        };
        let offset = span.offset().min(t.source.text().len());
        1 + t.source.text()[..offset].matches('\n').count()
    }
}

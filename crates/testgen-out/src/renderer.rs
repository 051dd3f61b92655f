//! Handlebars rendering of artifact templates
//!
//! Output is markdown, so HTML escaping is off. Extra helper:
//! - default: value, or a fallback when it is missing or null

use crate::templates::TemplatesFile;
use crate::OutError;
use handlebars::{Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext};
use serde_json::Value;

/// Compiled templates with helpers registered
pub struct ArtifactRenderer {
    handlebars: Handlebars<'static>,
    templates: TemplatesFile,
}

impl ArtifactRenderer {
    pub fn new(templates: TemplatesFile) -> Result<Self, OutError> {
        templates.validate()?;

        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("default", Box::new(DefaultHelper));

        for (name, template) in &templates.templates {
            handlebars
                .register_template_string(name, &template.template)
                .map_err(|e| OutError::Template(format!("{}: {}", name, e)))?;
        }

        Ok(Self { handlebars, templates })
    }

    pub fn builtin() -> Result<Self, OutError> {
        Self::new(TemplatesFile::builtin()?)
    }

    pub fn render(&self, template_name: &str, data: &Value) -> Result<String, OutError> {
        self.handlebars
            .render(template_name, data)
            .map_err(|e| OutError::Render(e.to_string()))
    }

    pub fn list_templates(&self) -> Vec<&str> {
        self.templates.list_templates()
    }
}

struct DefaultHelper;

impl HelperDef for DefaultHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = h.param(0).map(|v| v.value());
        let default = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

        match value {
            Some(v) if !v.is_null() => match v.as_str() {
                Some(s) => out.write(s)?,
                None => out.write(&v.to_string())?,
            },
            _ => out.write(default)?,
        }
        Ok(())
    }
}

//! Template text loading for human-readable summaries
//!
//! Templates are never on a control-flow path: a missing or unreadable
//! template falls back to a built-in default so summary rendering cannot
//! fail an operation.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Error, Result};

/// Source of template text
pub trait TemplateLoader: Send + Sync {
    /// Load the raw text of a template by id
    fn load(&self, template_id: &str) -> Result<String>;
}

/// Loader reading `<root>/<id>.tmpl` files
#[derive(Debug, Clone)]
pub struct FsTemplateLoader {
    root: PathBuf,
}

impl FsTemplateLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateLoader for FsTemplateLoader {
    fn load(&self, template_id: &str) -> Result<String> {
        let path = self.root.join(format!("{template_id}.tmpl"));
        fs::read_to_string(&path).map_err(|e| {
            debug!(template_id, path = %path.display(), error = %e, "template not found");
            Error::Template(template_id.to_string())
        })
    }
}

/// Load a template, falling back to the given default text
pub fn load_or_default(loader: &dyn TemplateLoader, template_id: &str, default: &str) -> String {
    loader
        .load(template_id)
        .unwrap_or_else(|_| default.to_string())
}

/// Substitute `{{key}}` placeholders with the given values
pub fn render(template: &str, values: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

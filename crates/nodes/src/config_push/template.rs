use serde::Serialize;
use tera::{Context, Tera};
use tracing::debug;

use super::Result;

/// SSH public keys for the SR OS admin user.
pub const SROS_SSH_KEYS: &str = "vr_sros/ssh_keys.j2";

/// Templates compiled into the binary.
const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[(
    SROS_SSH_KEYS,
    include_str!("../../templates/vr_sros/ssh_keys.j2"),
)];

/// Renders per-kind configuration fragments.
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn from_embedded() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(EMBEDDED_TEMPLATES.iter().copied())?;
        debug!(count = EMBEDDED_TEMPLATES.len(), "Loaded embedded templates");
        Ok(Self { tera })
    }

    /// Render `template` with the fields of `data` as top-level variables.
    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<String> {
        let context = Context::from_serialize(data)?;
        let rendered = self.tera.render(template, &context)?;
        debug!(template, bytes = rendered.len(), "Rendered template");
        Ok(rendered)
    }

    pub fn list_templates(&self) -> Vec<String> {
        self.tera.get_template_names().map(String::from).collect()
    }
}

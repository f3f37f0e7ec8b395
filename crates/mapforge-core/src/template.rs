//! Seam to the external template engine.
//!
//! The engine never renders full artifact templates itself; it hands
//! downstream renderers a template name plus a resolved variable map. It
//! does evaluate two small classes of expressions during a run — output-path
//! templates and per-SLX template-variable expressions — and both go through
//! this trait so the real engine (and its per-bundle template loader) stays
//! outside the core.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::attr::AttributeValue;

/// Errors raised while rendering a template or expression.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TemplateError {
    /// No template with the given name could be loaded.
    #[error("unknown template '{name}'")]
    UnknownTemplate {
        /// The unresolvable template name.
        name: String,
    },
    /// A variable referenced by the template is not in the variable map.
    #[error("unresolved template variable '{name}'")]
    UnresolvedVariable {
        /// The unresolvable variable name.
        name: String,
    },
    /// The template engine failed for any other reason.
    #[error("template rendering failed: {reason}")]
    Render {
        /// Human-readable failure description.
        reason: String,
    },
}

/// Rendering capability injected into the engine.
pub trait TemplateRenderer: Send + Sync {
    /// Render a named template with the given variables.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if the template cannot be loaded or
    /// rendered.
    fn render(
        &self,
        template_name: &str,
        variables: &BTreeMap<String, AttributeValue>,
    ) -> Result<String, TemplateError>;

    /// Render an inline expression (an output-path template or a template
    /// variable expression) with the given variables.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if the expression cannot be rendered.
    fn render_inline(
        &self,
        source: &str,
        variables: &BTreeMap<String, AttributeValue>,
    ) -> Result<String, TemplateError>;
}

/// Visibly-marked placeholder substituted for a template variable that
/// failed to resolve. The artifact is still emitted; the marker makes the
/// failure obvious in rendered output.
#[must_use]
pub fn unresolved_placeholder(name: &str) -> String {
    format!("<<error: unresolved variable {name}>>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_names_the_variable() {
        let marker = unresolved_placeholder("cluster");
        assert!(marker.contains("cluster"));
        assert!(marker.starts_with("<<error:"));
    }
}

//! Error taxonomy for a generation run.
//!
//! Every variant here is recoverable at some scope: a resolution error
//! skips one rule, a template or path error degrades one variable or output
//! item. Nothing raised while processing one resource, rule, or output item
//! propagates out of the evaluation loop — the run always completes with
//! whatever could be computed, plus accumulated warnings. Document parse
//! problems never reach this type: they surface as
//! [`RuleConfigError`](crate::rules::RuleConfigError) before evaluation
//! starts.

use thiserror::Error;

use crate::template::TemplateError;

/// Errors the evaluator can encounter and degrade from.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// No handler is registered for a platform a rule references. Fatal for
    /// that rule only.
    #[error("no platform handler registered for '{platform}'")]
    UnknownPlatform {
        /// The unresolvable platform name.
        platform: String,
    },

    /// A referenced resource type could not be resolved. Fatal for that
    /// rule only.
    #[error("cannot resolve resource type '{resource_type}' on platform '{platform}': {reason}")]
    ResourceTypeResolution {
        /// Platform name.
        platform: String,
        /// Resource-type name.
        resource_type: String,
        /// Human-readable failure description.
        reason: String,
    },

    /// A template variable expression failed to resolve; the variable is
    /// substituted with a visibly-marked placeholder.
    #[error("template variable '{name}' failed to resolve: {source}")]
    TemplateVariable {
        /// The variable name.
        name: String,
        /// Underlying template failure.
        source: TemplateError,
    },

    /// An output-path template failed to render; a synthetic path derived
    /// from the artifact name and output type is used instead.
    #[error("output path template '{template}' failed to render: {source}")]
    PathRender {
        /// The path template source.
        template: String,
        /// Underlying template failure.
        source: TemplateError,
    },
}

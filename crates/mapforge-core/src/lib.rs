//! Generation rule engine: turns a catalog of discovered resources into a
//! set of named, templated configuration artifacts by evaluating
//! declarative generation rules.
//!
//! # Architecture
//!
//! ```text
//! discovery writers            rule documents          customization rules
//!         |                          |                          |
//!         v                          v                          v
//! +------------------+      +------------------+      +------------------+
//! | ResourceRegistry | ---> | GenerationEngine | ---> | groups/relations |
//! +------------------+      +------------------+      +------------------+
//!         ^                          |
//!         |                          v
//!   PlatformHandler         output path -> { template, variables }
//! ```
//!
//! Discovery populates the [`ResourceRegistry`]; platform specifics stay
//! behind [`PlatformHandler`]. The [`GenerationEngine`] then evaluates each
//! rule's match-predicate tree per candidate resource, folds matches into
//! named artifacts (SLXs) with collision-resistant names, and returns a
//! flat map of output path to rendering instructions plus group and
//! relationship assignments.
//!
//! # Error posture
//!
//! A run never aborts on a bad document, rule, resource, or output item.
//! Failures degrade in place (skip the document, skip the rule, substitute
//! a placeholder variable, fall back to a synthetic path) and surface as
//! warnings in the run output.

pub mod attr;
pub mod customization;
pub mod engine;
pub mod error;
pub mod naming;
pub mod platform;
pub mod resource;
pub mod rules;
pub mod template;

pub use attr::AttributeValue;
pub use customization::{
    Group, MapCustomizationRules, RelationshipEdge, RelationshipVerb, parse_customization_document,
};
pub use engine::{
    EngineConfig, GenerationEngine, OutputItem, RuleState, RunOutput, RunStats, SlxInfo,
};
pub use error::EngineError;
pub use platform::{
    HandlerError, HandlerRegistry, LevelOfDetail, PlatformHandler, ResourceTypeSpec,
};
pub use resource::{RegistryError, Resource, ResourceRef, ResourceRegistry};
pub use rules::{
    GenerationRule, MatchContext, MatchMode, MatchPredicate, OutputItemSpec, RuleConfigError,
    RuleDocument, SlxSpec, parse_rule_document, parse_rule_documents,
};
pub use template::{TemplateError, TemplateRenderer, unresolved_placeholder};

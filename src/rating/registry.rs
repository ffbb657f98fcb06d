//! Attribute registry
//!
//! Resolves a (model, attribute) pair to its validated rating settings. The
//! vote gate resolves once per request and passes the typed configuration
//! down to the store.

use crate::config::{AttributeSettings, RatingConfig};
use crate::error::{RatingError, Result};
use crate::types::{AttributeId, AttributeScope, ModelId};
use std::collections::HashMap;
use tracing::info;

/// Lookup of rating attribute configuration
#[cfg_attr(test, mockall::automock)]
pub trait AttributeRegistry: Send + Sync {
    /// Configuration of the attribute, `None` when it does not exist
    fn resolve(&self, model_id: ModelId, attribute_id: AttributeId) -> Option<RatingConfig>;

    /// Whether any attribute belongs to `model_id`
    fn has_model(&self, model_id: ModelId) -> bool;

    /// All known attribute scopes
    fn scopes(&self) -> Vec<AttributeScope>;
}

/// Registry built once from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticAttributeRegistry {
    attributes: HashMap<AttributeScope, RatingConfig>,
}

impl StaticAttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry, rejecting invalid scales and duplicate attributes
    pub fn from_settings(settings: &[AttributeSettings]) -> Result<Self> {
        let mut registry = Self::new();
        for attribute in settings {
            registry.register(attribute.scope(), attribute.rating)?;
        }

        info!(
            "Attribute registry loaded with {} rating attributes",
            registry.attributes.len()
        );
        Ok(registry)
    }

    pub fn register(&mut self, scope: AttributeScope, config: RatingConfig) -> Result<()> {
        config.validate().map_err(|e| {
            RatingError::configuration(format!("attribute {}: {}", scope, e))
        })?;

        if self.attributes.insert(scope, config).is_some() {
            return Err(RatingError::configuration(format!(
                "attribute {} is configured twice",
                scope
            )));
        }
        Ok(())
    }
}

impl AttributeRegistry for StaticAttributeRegistry {
    fn resolve(&self, model_id: ModelId, attribute_id: AttributeId) -> Option<RatingConfig> {
        self.attributes
            .get(&AttributeScope::new(model_id, attribute_id))
            .copied()
    }

    fn has_model(&self, model_id: ModelId) -> bool {
        self.attributes.keys().any(|scope| scope.model_id == model_id)
    }

    fn scopes(&self) -> Vec<AttributeScope> {
        let mut scopes: Vec<_> = self.attributes.keys().copied().collect();
        scopes.sort_by_key(|scope| (scope.model_id, scope.attribute_id));
        scopes
    }
}

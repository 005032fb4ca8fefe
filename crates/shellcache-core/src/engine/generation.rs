//! Generation context: the one live version of the store family.
//!
//! Store names are derived from the prefix and the generation tag, so stores
//! of different generations never collide and are never silently reused.

use super::router::RequestClass;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    tag: String,
    prefix: String,
    shell_store: String,
    dynamic_store: String,
}

impl Generation {
    pub fn new(prefix: &str, tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            prefix: prefix.to_string(),
            shell_store: format!("{}{}", prefix, tag),
            dynamic_store: format!("{}dynamic-{}", prefix, tag),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn shell_store(&self) -> &str {
        &self.shell_store
    }

    pub fn dynamic_store(&self) -> &str {
        &self.dynamic_store
    }

    /// Whether `name` belongs to this engine's store family (any generation).
    pub fn owns(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.shell_store || name == self.dynamic_store
    }

    /// Owned by this family but left over from another generation.
    pub fn is_stale(&self, name: &str) -> bool {
        self.owns(name) && !self.is_current(name)
    }

    pub fn store_for(&self, class: RequestClass) -> &str {
        match class {
            RequestClass::Api | RequestClass::DynamicAsset => &self.dynamic_store,
            RequestClass::Static => &self.shell_store,
        }
    }
}

//! Per-identifier gold transforms and the registry that looks them up.

use crate::error::{PipelineError, Result};
use polars::prelude::LazyFrame;
use std::collections::BTreeMap;

use super::sick_leave::SickLeaveTransform;

/// Turns a silver frame into a gold frame.
///
/// Transforms must be deterministic: the same silver table always yields the same
/// gold table, so re-running the stage is safe.
pub trait GoldTransform: Send + Sync {
    /// Identifier this transform is registered for.
    fn identifier(&self) -> &str;

    /// Short human-readable summary, used in logs and `medallion tables` output.
    fn description(&self) -> String;

    /// Builds the gold query on top of `frame`. The caller collects it and writes
    /// the result.
    fn apply(&self, frame: LazyFrame) -> Result<LazyFrame>;
}

/// Identifier → transform lookup.
#[derive(Default)]
pub struct TransformRegistry {
    transforms: BTreeMap<String, Box<dyn GoldTransform>>,
}

impl TransformRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every transform shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(SickLeaveTransform));
        registry
    }

    /// Adds `transform`, replacing any earlier one for the same identifier.
    pub fn register(&mut self, transform: Box<dyn GoldTransform>) {
        tracing::debug!("Registered gold transform for {}", transform.identifier());
        self.transforms
            .insert(transform.identifier().to_owned(), transform);
    }

    /// # Errors
    ///
    /// [`PipelineError::TransformNotImplemented`] when nothing is registered.
    pub fn get(&self, identifier: &str) -> Result<&dyn GoldTransform> {
        self.transforms
            .get(identifier)
            .map(|t| &**t)
            .ok_or_else(|| PipelineError::TransformNotImplemented(identifier.to_owned()))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.transforms.contains_key(identifier)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.transforms.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    impl GoldTransform for Passthrough {
        fn identifier(&self) -> &str {
            "83415NED"
        }

        fn description(&self) -> String {
            "no-op".to_owned()
        }

        fn apply(&self, frame: LazyFrame) -> Result<LazyFrame> {
            Ok(frame)
        }
    }

    #[test]
    fn test_builtins_cover_sick_leave() {
        let registry = TransformRegistry::with_builtins();
        assert!(registry.contains("80072ned"));
        assert_eq!(registry.identifiers().collect::<Vec<_>>(), vec!["80072ned"]);
    }

    #[test]
    fn test_unregistered_identifier_fails() {
        let registry = TransformRegistry::with_builtins();
        assert!(matches!(
            registry.get("83415NED"),
            Err(PipelineError::TransformNotImplemented(id)) if id == "83415NED"
        ));
    }

    #[test]
    fn test_register_custom_transform() {
        let mut registry = TransformRegistry::empty();
        assert!(registry.is_empty());
        registry.register(Box::new(Passthrough));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("83415NED").unwrap().description(), "no-op");
    }
}

//! Name → transform dispatch table.
//!
//! The registry is built once (normally [`TransformRegistry::builtin`]) and
//! never mutated afterwards: [`with`](TransformRegistry::with) consumes the
//! registry and returns a new one, so registration can only happen while
//! the value is still being constructed. Lookups never fall back to a
//! default transform.

use super::handle::ImageHandle;
use super::params::Params;
use super::transforms::{self, TransformError, TransformFn};
use std::collections::BTreeMap;

const CATALOG: &[(&str, TransformFn)] = &[
    ("original", transforms::original),
    ("resize", transforms::resize),
    ("thumbnail", transforms::thumbnail),
    ("sketch", transforms::sketch),
    ("offerize", transforms::offerize),
    ("normalize", transforms::normalize),
    ("charcoal", transforms::charcoal),
    ("level", transforms::level),
];

#[derive(Debug, Clone)]
pub struct TransformRegistry {
    table: BTreeMap<&'static str, TransformFn>,
}

impl TransformRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// The fixed catalog of transforms.
    pub fn builtin() -> Self {
        CATALOG
            .iter()
            .fold(Self::empty(), |registry, &(name, f)| registry.with(name, f))
    }

    /// Register `f` under `name`, replacing any previous entry.
    pub fn with(mut self, name: &'static str, f: TransformFn) -> Self {
        self.table.insert(name, f);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<TransformFn, TransformError> {
        self.table
            .get(name)
            .copied()
            .ok_or_else(|| TransformError::UnknownOperation(name.to_string()))
    }

    /// Resolve `name` and run it against `handle`.
    pub fn apply(
        &self,
        name: &str,
        handle: ImageHandle,
        params: &Params,
    ) -> Result<ImageHandle, TransformError> {
        let transform = self.resolve(name)?;
        transform(handle, params)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.keys().copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::gradient_handle;

    #[test]
    fn builtin_has_full_catalog() {
        let names: Vec<_> = TransformRegistry::builtin().names().collect();
        assert_eq!(
            names,
            vec![
                "charcoal",
                "level",
                "normalize",
                "offerize",
                "original",
                "resize",
                "sketch",
                "thumbnail"
            ]
        );
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = TransformRegistry::builtin();
        assert_eq!(
            registry.resolve("sepia").unwrap_err(),
            TransformError::UnknownOperation("sepia".into())
        );
        // Names are exact: no case folding, no fallback.
        assert!(registry.resolve("Thumbnail").is_err());
        assert!(registry.resolve("").is_err());
    }

    #[test]
    fn resolved_transforms_honor_geometry_contracts() {
        let registry = TransformRegistry::builtin();
        let expectations = [
            ("original", (64, 48)),
            ("resize", (64, 48)),
            ("thumbnail", (150, 150)),
            ("sketch", (64, 48)),
            ("offerize", (350, 350)),
            ("normalize", (64, 48)),
            ("charcoal", (64, 48)),
        ];
        for (name, dims) in expectations {
            let out = registry
                .apply(name, gradient_handle(64, 48), &Params::default())
                .unwrap();
            assert_eq!(out.dimensions(), dims, "{name}");
        }
    }

    #[test]
    fn with_extends_catalog() {
        fn flip(handle: ImageHandle, _: &Params) -> Result<ImageHandle, TransformError> {
            Ok(handle.map_image(|img| img.fliph()))
        }
        let registry = TransformRegistry::builtin().with("flip", flip);
        assert!(registry.contains("flip"));
        assert!(registry.contains("level"));
        let out = registry
            .apply("flip", gradient_handle(10, 4), &Params::default())
            .unwrap();
        assert_eq!(out.dimensions(), (10, 4));
    }
}

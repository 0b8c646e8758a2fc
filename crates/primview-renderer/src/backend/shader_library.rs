//! Named shader sources.

use std::borrow::Cow;
use std::collections::HashMap;

use super::DeviceError;

/// Bindings declared by every built-in source (matrix block, locals, texture unit 0).
pub const COMMON_WGSL: &str = include_str!("../shaders/common.wgsl");

/// WGSL sources addressed by id, e.g. `"circle.frag"`.
///
/// Each stored source is one shader stage; [`ShaderLibrary::module_source`]
/// prepends [`COMMON_WGSL`] so every stage sees the same bindings.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    sources: HashMap<String, Cow<'static, str>>,
}

impl ShaderLibrary {
    /// Empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Library holding the sources of the four built-in programs.
    pub fn builtin() -> Self {
        let mut lib = Self::new();
        lib.insert("simple.vert", include_str!("../shaders/simple.vert.wgsl"));
        lib.insert(
            "uniform_color.frag",
            include_str!("../shaders/uniform_color.frag.wgsl"),
        );
        lib.insert("circle.vert", include_str!("../shaders/circle.vert.wgsl"));
        lib.insert("circle.frag", include_str!("../shaders/circle.frag.wgsl"));
        lib.insert("lines.vert", include_str!("../shaders/lines.vert.wgsl"));
        lib.insert("lines.frag", include_str!("../shaders/lines.frag.wgsl"));
        lib.insert("textured.frag", include_str!("../shaders/textured.frag.wgsl"));
        lib
    }

    /// Adds or replaces a source.
    pub fn insert(&mut self, id: impl Into<String>, source: impl Into<Cow<'static, str>>) {
        self.sources.insert(id.into(), source.into());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.sources.get(id).map(|s| s.as_ref())
    }

    /// Full module text for a stage: common bindings followed by the stage source.
    pub fn module_source(&self, id: &str) -> Result<String, DeviceError> {
        let stage = self
            .get(id)
            .ok_or_else(|| DeviceError::UnknownShaderSource(id.to_string()))?;
        Ok(format!("{COMMON_WGSL}\n{stage}"))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sources() {
        let lib = ShaderLibrary::builtin();
        for id in [
            "simple.vert",
            "uniform_color.frag",
            "circle.vert",
            "circle.frag",
            "lines.vert",
            "lines.frag",
            "textured.frag",
        ] {
            assert!(lib.contains(id), "missing {id}");
        }
        assert_eq!(lib.len(), 7);
    }

    #[test]
    fn test_module_source_prepends_bindings() {
        let lib = ShaderLibrary::builtin();
        let module = lib.module_source("circle.frag").unwrap();
        assert!(module.starts_with(COMMON_WGSL));
        assert!(module.contains("fn fs_main"));
    }

    #[test]
    fn test_unknown_source() {
        let lib = ShaderLibrary::new();
        assert_eq!(
            lib.module_source("missing.vert"),
            Err(DeviceError::UnknownShaderSource("missing.vert".to_string()))
        );
    }
}

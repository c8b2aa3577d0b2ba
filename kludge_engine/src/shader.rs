/// Compiled-shader loader
///
/// Shaders are compiled offline to SPIR-V and laid out as
/// `<root>/<name>/shader.<vert|frag|comp>.spv`. Binaries are validated
/// (word alignment, magic number) and cached by name and stage.

use std::path::{Path, PathBuf};
use rustc_hash::FxHashMap;

use crate::device::types::ShaderStage;
use crate::error::{Error, Result};
use crate::{engine_debug, engine_error};

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// A validated SPIR-V module for one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderCode {
    name: String,
    stage: ShaderStage,
    words: Vec<u32>,
}

impl ShaderCode {
    /// Validate raw SPIR-V bytes
    pub fn from_bytes(name: impl Into<String>, stage: ShaderStage, bytes: &[u8]) -> Result<Self> {
        let name = name.into();
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            engine_error!(
                "kludge::shader",
                "Shader '{}' ({:?}) not 4-byte aligned (size: {} bytes)",
                name,
                stage,
                bytes.len()
            );
            return Err(Error::InvalidResource(format!(
                "shader '{}' is not a whole number of SPIR-V words ({} bytes)",
                name,
                bytes.len()
            )));
        }
        let words: Vec<u32> = bytemuck::pod_collect_to_vec(bytes);
        Self::from_words(name, stage, words)
    }

    /// Validate SPIR-V already split into words
    pub fn from_words(name: impl Into<String>, stage: ShaderStage, words: Vec<u32>) -> Result<Self> {
        let name = name.into();
        match words.first() {
            Some(&SPIRV_MAGIC) => Ok(Self { name, stage, words }),
            Some(&other) => Err(Error::InvalidResource(format!(
                "shader '{}' has bad SPIR-V magic {:#010x}",
                name, other
            ))),
            None => Err(Error::InvalidResource(format!("shader '{}' is empty", name))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

/// File-system backed cache of compiled shaders
pub struct ShaderLibrary {
    root: PathBuf,
    cache: FxHashMap<(String, ShaderStage), ShaderCode>,
}

impl ShaderLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: FxHashMap::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the binary for `name` at `stage`
    pub fn path_for(&self, name: &str, stage: ShaderStage) -> PathBuf {
        self.root.join(name).join(format!("shader.{}.spv", stage.file_stem()))
    }

    /// Load (or fetch from cache) the module for `name` at `stage`
    pub fn load(&mut self, name: &str, stage: ShaderStage) -> Result<ShaderCode> {
        if let Some(code) = self.cache.get(&(name.to_string(), stage)) {
            return Ok(code.clone());
        }
        let path = self.path_for(name, stage);
        let bytes = std::fs::read(&path).map_err(|e| {
            engine_error!("kludge::shader", "Failed to read {}: {}", path.display(), e);
            Error::InvalidResource(format!("cannot read shader {}: {}", path.display(), e))
        })?;
        let code = ShaderCode::from_bytes(name, stage, &bytes)?;
        engine_debug!(
            "kludge::shader",
            "Loaded {} ({} words)",
            path.display(),
            code.words().len()
        );
        self.cache.insert((name.to_string(), stage), code.clone());
        Ok(code)
    }

    /// Register an in-memory module under its name and stage
    pub fn insert(&mut self, code: ShaderCode) {
        self.cache.insert((code.name.clone(), code.stage), code);
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;

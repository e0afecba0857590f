// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::gpu::{Gpu, Owned};

const SPIRV_MAGIC: u32 = 0x0723_0203;

pub enum ShaderRelease<'a> {
    Path(&'a Path),
    All,
}

/// Shader modules keyed by the path they were loaded from.
///
/// Lives only as long as pipeline building needs it: modules are released
/// once baked into a pipeline.
#[derive(Default)]
pub struct ShaderCache {
    modules: HashMap<PathBuf, Owned<vk::ShaderModule>>,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&mut self, gpu: &Rc<dyn Gpu>, path: &Path) -> RenderResult<vk::ShaderModule> {
        if let Some(module) = self.modules.get(path) {
            return Ok(module.raw());
        }

        let code = read_words(path)?;
        let module = gpu
            .create_shader_module(&code)
            .map_err(|e| RenderError::ShaderModule {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        debug!("loaded shader module {}", path.display());

        let module = Owned::new(gpu, module);
        let raw = module.raw();
        self.modules.insert(path.to_path_buf(), module);
        Ok(raw)
    }

    /// Destroys the selected modules; returns how many went away.
    pub fn release(&mut self, which: ShaderRelease<'_>) -> usize {
        match which {
            ShaderRelease::Path(path) => usize::from(self.modules.remove(path).is_some()),
            ShaderRelease::All => {
                let n = self.modules.len();
                self.modules.clear();
                n
            }
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn read_words(path: &Path) -> RenderResult<Vec<u32>> {
    let mut file = File::open(path).map_err(|source| RenderError::ShaderRead {
        path: path.to_path_buf(),
        source,
    })?;
    let words = ash::util::read_spv(&mut file).map_err(|e| RenderError::ShaderModule {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        _ => Err(RenderError::ShaderModule {
            path: path.to_path_buf(),
            reason: "not a SPIR-V binary".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Kind, MockGpu};
    use std::fs;

    fn spirv_file(name: &str, words: &[u32]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "trident-shader-{}-{name}.spv",
            std::process::id()
        ));
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn loads_lazily_and_once() {
        let mock = Rc::new(MockGpu::new());
        let gpu: Rc<dyn Gpu> = mock.clone();
        let path = spirv_file("once", &[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let mut cache = ShaderCache::new();

        let a = cache.get_or_load(&gpu, &path).unwrap();
        let b = cache.get_or_load(&gpu, &path).unwrap();
        assert_eq!(a, b);
        assert_eq!(mock.live_of(Kind::ShaderModule), 1);

        assert_eq!(cache.release(ShaderRelease::Path(&path)), 1);
        assert_eq!(cache.release(ShaderRelease::Path(&path)), 0);
        assert_eq!(mock.live_of(Kind::ShaderModule), 0);
        fs::remove_file(path).ok();
    }

    #[test]
    fn release_all_empties_the_cache() {
        let mock = Rc::new(MockGpu::new());
        let gpu: Rc<dyn Gpu> = mock.clone();
        let vert = spirv_file("all-vert", &[SPIRV_MAGIC, 1]);
        let frag = spirv_file("all-frag", &[SPIRV_MAGIC, 2]);
        let mut cache = ShaderCache::new();
        cache.get_or_load(&gpu, &vert).unwrap();
        cache.get_or_load(&gpu, &frag).unwrap();
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.release(ShaderRelease::All), 2);
        assert!(cache.is_empty());
        assert_eq!(mock.live_count(), 0);
        fs::remove_file(vert).ok();
        fs::remove_file(frag).ok();
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let gpu: Rc<dyn Gpu> = Rc::new(MockGpu::new());
        let mut cache = ShaderCache::new();
        let err = cache
            .get_or_load(&gpu, Path::new("/nonexistent/trident/none.spv"))
            .unwrap_err();
        assert!(matches!(err, RenderError::ShaderRead { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        let gpu: Rc<dyn Gpu> = Rc::new(MockGpu::new());
        let path = spirv_file("garbage", &[0xdead_beef, 0]);
        let mut cache = ShaderCache::new();
        let err = cache.get_or_load(&gpu, &path).unwrap_err();
        assert!(matches!(err, RenderError::ShaderModule { .. }));
        fs::remove_file(path).ok();
    }
}

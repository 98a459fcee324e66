//! In-process terrain from a dynamically loaded library
//!
//! The library exports
//! `int32_t voxels_generate(int32_t x, int32_t z, int32_t seed, uint8_t *out, size_t len)`
//! which writes one block code per cell in `x + width * (y + height * z)`
//! order and returns 0 on success. [`TerrainGenerator::mark_dirty`] unloads
//! the library so a rebuilt copy is picked up on the next chunk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use libloading::{Library, Symbol};
use parking_lot::RwLock;

use super::{GenerationError, GenerationResult, TerrainGenerator};
use crate::constants::core::BLOCKS_PER_CHUNK;
use crate::world::core::{BlockType, ChunkId};
use crate::world::storage::Terrain;

pub const GENERATE_SYMBOL: &[u8] = b"voxels_generate\0";

type GenerateFn = unsafe extern "C" fn(i32, i32, i32, *mut u8, usize) -> i32;

pub struct NativeGenerator {
    path: PathBuf,
    library: RwLock<Option<Library>>,
    dirty: AtomicBool,
}

impl NativeGenerator {
    /// The library is opened lazily on the first chunk
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            library: RwLock::new(None),
            dirty: AtomicBool::new(true),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> GenerationResult<Library> {
        // SAFETY: loading runs the library's initialisers; the path is operator supplied
        let library = unsafe { Library::new(path) }.map_err(|e| GenerationError::Library {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // Resolve once up front so a bad library fails on load rather than per chunk
        // SAFETY: the signature matches the documented export
        unsafe { library.get::<GenerateFn>(GENERATE_SYMBOL) }.map_err(|e| {
            GenerationError::Library {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        log::info!("[NativeGenerator] Loaded {}", path.display());
        Ok(library)
    }

    fn ensure_loaded(&self) -> GenerationResult<()> {
        if !self.dirty.load(Ordering::Acquire) && self.library.read().is_some() {
            return Ok(());
        }

        let mut library = self.library.write();
        if self.dirty.swap(false, Ordering::AcqRel) || library.is_none() {
            // Old handle is closed before the rebuilt library is opened
            *library = None;
            match Self::open(&self.path) {
                Ok(loaded) => *library = Some(loaded),
                Err(e) => {
                    self.dirty.store(true, Ordering::Release);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

impl TerrainGenerator for NativeGenerator {
    fn generate(&self, chunk: ChunkId, seed: i32, terrain: &mut Terrain) -> GenerationResult<()> {
        self.ensure_loaded()?;

        let mut codes = vec![0u8; BLOCKS_PER_CHUNK];
        {
            let guard = self.library.read();
            let library = guard.as_ref().ok_or_else(|| GenerationError::Library {
                path: self.path.clone(),
                reason: "unloaded while generating".to_string(),
            })?;
            // SAFETY: symbol verified on load; `codes` is exactly `len` bytes
            let status = unsafe {
                let generate: Symbol<GenerateFn> =
                    library.get(GENERATE_SYMBOL).map_err(|e| GenerationError::Library {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    })?;
                generate(chunk.x(), chunk.z(), seed, codes.as_mut_ptr(), codes.len())
            };
            if status != 0 {
                return Err(GenerationError::Native { code: status });
            }
        }

        let cells = terrain.blocks().dims();
        for (index, &code) in codes.iter().enumerate() {
            let block_type = BlockType::from_code(code as i32).ok_or(
                GenerationError::UnknownBlockCode {
                    code: code as i32,
                    index,
                },
            )?;
            if block_type != BlockType::Air {
                let x = index % cells[0];
                let y = (index / cells[0]) % cells[1];
                let z = index / (cells[0] * cells[1]);
                terrain.set_block_type([x, y, z], block_type);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "native"
    }

    fn mark_dirty(&self) {
        log::info!(
            "[NativeGenerator] {} marked dirty, reloading on next chunk",
            self.path.display()
        );
        self.dirty.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_reports_path() {
        let generator = NativeGenerator::new(PathBuf::from("/nonexistent/libnothing.so"));
        let mut terrain = Terrain::new();
        let err = generator
            .generate(ChunkId::new(0, 0), 0, &mut terrain)
            .unwrap_err();
        match err {
            GenerationError::Library { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/libnothing.so"))
            }
            other => panic!("unexpected error {other}"),
        }

        // still dirty, so the next call retries the load
        generator.mark_dirty();
        assert!(generator.generate(ChunkId::new(0, 0), 0, &mut terrain).is_err());
    }
}

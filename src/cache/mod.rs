//! Shader cache — compiled pipelines keyed by structural signature.
//!
//! Translation and device compilation are the expensive path; the cache
//! makes every dispatch after the first a hash-and-lookup. Entries are
//! immutable once inserted and the cache is unbounded: kernel shapes are
//! static program text, so the population is small and never evicted.
//!
//! Concurrent misses on the same signature may both compile; the first
//! insert wins and later compiles of the same shape are discarded. Both
//! results are behaviorally identical, so racing is cheaper than holding
//! a lock across device compilation.

pub mod signature;

pub use signature::{signature_of, Signature};

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::closure::Inspection;
use crate::error::KernelError;
use crate::gpu::GpuDevice;
use crate::wgsl::{render, ShaderProgram};

/// A compiled kernel: the device pipeline plus the rendered program it was
/// built from. Shared immutably between all dispatches of the same shape.
pub struct CompiledShader {
    pub pipeline: wgpu::ComputePipeline,
    pub program: ShaderProgram,
}

/// Process-wide signature → pipeline map.
pub struct ShaderCache {
    entries: RwLock<HashMap<Signature, Arc<CompiledShader>>>,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide cache instance.
    pub fn global() -> &'static ShaderCache {
        static CACHE: OnceLock<ShaderCache> = OnceLock::new();
        CACHE.get_or_init(ShaderCache::new)
    }

    /// Look up a compiled shader by signature.
    pub fn lookup(&self, signature: &Signature) -> Option<Arc<CompiledShader>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(signature)
            .cloned()
    }

    /// Insert a freshly compiled shader, returning the cache's entry for
    /// the signature. If another thread inserted first, its entry is kept
    /// and returned and `shader` is dropped.
    pub fn insert(&self, signature: Signature, shader: CompiledShader) -> Arc<CompiledShader> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(signature)
            .or_insert_with(|| Arc::new(shader))
            .clone()
    }

    /// Resolve an inspected kernel to a compiled shader: signature lookup
    /// first, translate + render + compile on a miss. At most one retained
    /// compilation per signature.
    pub fn get_or_compile(
        &self,
        device: &GpuDevice,
        inspection: &Inspection,
    ) -> Result<Arc<CompiledShader>, KernelError> {
        let signature = signature_of(inspection);
        if let Some(shader) = self.lookup(&signature) {
            return Ok(shader);
        }
        let program = render(inspection)?;
        let compiled = device.compile(program)?;
        Ok(self.insert(signature, compiled))
    }

    /// Number of cached shaders.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ShaderCache {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

//! Read-only asset access (model weights, tokenizer configuration).

use std::collections::HashMap;
use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use memmap2::{Mmap, MmapOptions};

/// Bytes of one asset, either memory-mapped from disk or held in memory.
pub enum AssetBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for AssetBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            AssetBytes::Mapped(m) => m,
            AssetBytes::Owned(v) => v,
        }
    }
}

impl std::fmt::Debug for AssetBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            AssetBytes::Mapped(_) => "mapped",
            AssetBytes::Owned(_) => "owned",
        };
        write!(f, "AssetBytes({kind}, {} bytes)", self.len())
    }
}

/// Supplies asset byte streams keyed by file name.
pub trait AssetSource: Send + Sync {
    fn open(&self, name: &str) -> anyhow::Result<AssetBytes>;

    /// Human-readable location for log lines.
    fn describe(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Assets stored as plain files under one directory.
#[derive(Clone, Debug)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(name);
        if rel.is_absolute() || rel.components().any(|c| c.as_os_str() == "..") {
            return Err(anyhow!("asset name escapes asset dir: {name}"));
        }
        Ok(self.root.join(rel))
    }
}

impl AssetSource for DirAssets {
    fn open(&self, name: &str) -> anyhow::Result<AssetBytes> {
        let path = self.resolve(name)?;
        let file =
            File::open(&path).with_context(|| format!("open asset: {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("stat asset: {}", path.display()))?
            .len();
        if len == 0 {
            return Ok(AssetBytes::Owned(Vec::new()));
        }
        // SAFETY: assets are read-only inputs; the mapping is dropped with the AssetBytes.
        let map = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("mmap asset: {}", path.display()))?;
        Ok(AssetBytes::Mapped(map))
    }

    fn describe(&self, name: &str) -> String {
        self.root.join(name).display().to_string()
    }
}

/// In-memory asset table for embedding hosts and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), bytes.into());
    }
}

impl AssetSource for MemoryAssets {
    fn open(&self, name: &str) -> anyhow::Result<AssetBytes> {
        self.files
            .get(name)
            .cloned()
            .map(AssetBytes::Owned)
            .ok_or_else(|| anyhow!("asset not found: {name}"))
    }

    fn describe(&self, name: &str) -> String {
        format!("memory:{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::{AssetSource, DirAssets, MemoryAssets};

    #[test]
    fn memory_assets_return_copies() {
        let assets = MemoryAssets::new().with("tokenizer.json", b"{}".to_vec());
        assert_eq!(&*assets.open("tokenizer.json").expect("open"), b"{}");
        assert!(assets.open("model.safetensors").is_err());
    }

    #[test]
    fn dir_assets_map_files() {
        let dir = std::env::temp_dir().join(format!("lt-assets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("a.bin"), [1u8, 2, 3]).expect("write");
        std::fs::write(dir.join("empty.bin"), []).expect("write");

        let assets = DirAssets::new(&dir);
        assert_eq!(&*assets.open("a.bin").expect("open"), &[1, 2, 3]);
        assert!(assets.open("empty.bin").expect("open").is_empty());
        assert!(assets.open("missing.bin").is_err());
        assert!(assets.open("../a.bin").is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Identity hasher: image locator to [`IdentityKey`].
//!
//! Resolution order:
//!
//! 1. Structural: the locator embeds a stable id (`questions/<id>/picture`)
//! 2. Content: load the image, downsample to a small grid and write one hex
//!    nibble of average luminance per cell
//! 3. Fallback: a fixed-length suffix of the locator, when the image cannot
//!    be loaded or decoded
//!
//! Results are memoized per locator; a repeated locator never reloads.

use crate::config::HasherConfig;
use crate::error::Result;
use crate::host::ImageLoader;
use crate::types::IdentityKey;
use image::imageops::FilterType;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest downsampling grid side; larger configured values are clamped
pub const MAX_GRID_SIZE: u32 = 64;

/// Which tier produced a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Cached,
    Structural,
    Content,
    Suffix,
}

pub struct IdentityHasher {
    loader: Arc<dyn ImageLoader>,
    pattern: Regex,
    prefix: String,
    grid: u32,
    suffix_len: usize,
    cache: HashMap<String, IdentityKey>,
    /// Locators in first-hashed order, for the debug view
    order: Vec<String>,
    content_derivations: u64,
}

impl IdentityHasher {
    pub fn new(config: &HasherConfig, loader: Arc<dyn ImageLoader>) -> Result<Self> {
        Ok(Self {
            loader,
            pattern: Regex::new(&config.structural_pattern)?,
            prefix: config.structural_prefix.clone(),
            grid: config.grid_size.clamp(1, MAX_GRID_SIZE),
            suffix_len: config.suffix_len.max(1),
            cache: HashMap::new(),
            order: Vec::new(),
            content_derivations: 0,
        })
    }

    pub async fn hash(&mut self, locator: &str) -> IdentityKey {
        self.hash_with_source(locator).await.0
    }

    pub async fn hash_with_source(&mut self, locator: &str) -> (IdentityKey, KeySource) {
        if let Some(key) = self.cache.get(locator) {
            return (key.clone(), KeySource::Cached);
        }

        let (key, source) = match self.structural_key(locator) {
            Some(key) => (key, KeySource::Structural),
            None => match self.content_key(locator).await {
                Ok(key) => (key, KeySource::Content),
                Err(e) => {
                    warn!("Image hash failed for {}, using locator suffix: {}", locator, e);
                    (suffix_key(locator, self.suffix_len), KeySource::Suffix)
                }
            },
        };

        debug!("Hashed {} -> {} ({:?})", locator, key, source);
        self.cache.insert(locator.to_string(), key.clone());
        self.order.push(locator.to_string());
        (key, source)
    }

    fn structural_key(&self, locator: &str) -> Option<IdentityKey> {
        let id = self.pattern.captures(locator)?.get(1)?;
        Some(IdentityKey::new(format!("{}{}", self.prefix, id.as_str())))
    }

    async fn content_key(&mut self, locator: &str) -> Result<IdentityKey> {
        let bytes = self.loader.load(locator).await?;
        self.content_derivations += 1;
        key_from_image_bytes(&bytes, self.grid)
    }

    pub fn cached(&self, locator: &str) -> Option<&IdentityKey> {
        self.cache.get(locator)
    }

    pub fn grid_size(&self) -> u32 {
        self.grid
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Last `n` cached entries, oldest first
    pub fn recent_entries(&self, n: usize) -> Vec<(String, IdentityKey)> {
        let start = self.order.len().saturating_sub(n);
        self.order[start..]
            .iter()
            .filter_map(|loc| self.cache.get(loc).map(|k| (loc.clone(), k.clone())))
            .collect()
    }

    /// Times image bytes were actually loaded and reduced
    pub fn content_derivations(&self) -> u64 {
        self.content_derivations
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.order.clear();
    }
}

/// Downsample to `grid`×`grid` and quantize each cell's luminance to a hex digit
pub fn key_from_image_bytes(bytes: &[u8], grid: u32) -> Result<IdentityKey> {
    let image = image::load_from_memory(bytes)?;
    let small = image.resize_exact(grid, grid, FilterType::Triangle).to_rgba8();

    let mut key = String::with_capacity(grid as usize * grid as usize);
    for pixel in small.pixels() {
        let [r, g, b, _] = pixel.0;
        let luminance = (u16::from(r) + u16::from(g) + u16::from(b)) / 3;
        let _ = write!(key, "{:x}", luminance >> 4);
    }
    Ok(IdentityKey::new(key))
}

/// Last `len` characters of the locator
pub fn suffix_key(locator: &str, len: usize) -> IdentityKey {
    let count = locator.chars().count();
    let suffix: String = locator.chars().skip(count.saturating_sub(len)).collect();
    IdentityKey::new(suffix)
}

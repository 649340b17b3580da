//! Image identity hashing
//!
//! Turns the raw bytes of a quiz photo into an [`ImageHash`]. Two
//! implementations are provided:
//! - [`Sha256Identifier`]: exact content hash of the bytes
//! - [`AverageHashIdentifier`]: 64-bit perceptual average hash of the
//!   decoded picture, decoded in memory
//!
//! Neither depends on the declared content type, so a photo served twice
//! under different MIME types keeps one identity.

use crate::error::{Error, Result};
use crate::types::ImageHash;
use faces_common::config::HashAlgorithm;
use image::imageops::FilterType;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Side length of the average hash grid (8x8 = 64 bits)
const AHASH_SIDE: u32 = 8;

/// Image MIME kinds accepted from the quiz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
}

impl ImageKind {
    /// Parse a declared `Content-Type`, ignoring parameters and case
    pub fn from_mime(content_type: &str) -> Option<Self> {
        match mime_essence(content_type).as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageKind::Jpeg),
            "image/png" => Some(ImageKind::Png),
            "image/gif" => Some(ImageKind::Gif),
            "image/webp" => Some(ImageKind::Webp),
            "image/bmp" | "image/x-ms-bmp" => Some(ImageKind::Bmp),
            _ => None,
        }
    }

    /// Detect the kind from magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        infer::get(bytes).and_then(|t| Self::from_mime(t.mime_type()))
    }

    /// Declared type first; generic declarations fall back to sniffing
    ///
    /// Returns `None` for anything that should not be hashed.
    pub fn classify(content_type: &str, bytes: &[u8]) -> Option<Self> {
        if let Some(kind) = Self::from_mime(content_type) {
            return Some(kind);
        }

        match mime_essence(content_type).as_str() {
            "" | "application/octet-stream" | "binary/octet-stream" => Self::sniff(bytes),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
            ImageKind::Webp => "image/webp",
            ImageKind::Bmp => "image/bmp",
        }
    }
}

fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Deterministic function from image bytes to an identity hash
pub trait Identifier: Send + Sync {
    /// Short algorithm name for logs
    fn algorithm(&self) -> &'static str;

    /// Compute the hash of one image
    ///
    /// Pure: no state is shared between calls, so any number of
    /// computations may run concurrently.
    fn hash(&self, bytes: &[u8], kind: ImageKind) -> Result<ImageHash>;
}

/// Lowercase hex SHA-256 of the raw bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Identifier;

impl Identifier for Sha256Identifier {
    fn algorithm(&self) -> &'static str {
        "sha256"
    }

    fn hash(&self, bytes: &[u8], _kind: ImageKind) -> Result<ImageHash> {
        if bytes.is_empty() {
            return Err(Error::Identifier("empty image".to_string()));
        }

        let digest = Sha256::digest(bytes);
        Ok(ImageHash::new(format!("{:x}", digest)))
    }
}

/// Perceptual average hash (aHash)
///
/// **Algorithm:**
/// 1. Decode in memory (format sniffed from the bytes)
/// 2. Convert to grayscale and shrink to 8x8
/// 3. Each pixel brighter than the mean sets one bit, row-major, MSB first
/// 4. Return the 64 bits as 16 lowercase hex chars
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageHashIdentifier;

impl Identifier for AverageHashIdentifier {
    fn algorithm(&self) -> &'static str {
        "average"
    }

    fn hash(&self, bytes: &[u8], kind: ImageKind) -> Result<ImageHash> {
        if bytes.is_empty() {
            return Err(Error::Identifier("empty image".to_string()));
        }

        let decoded = image::load_from_memory(bytes).map_err(|e| {
            Error::Identifier(format!("failed to decode {} image: {}", kind.mime(), e))
        })?;

        let thumbnail = decoded
            .grayscale()
            .resize_exact(AHASH_SIDE, AHASH_SIDE, FilterType::Triangle)
            .to_luma8();

        let levels: Vec<u32> = thumbnail.pixels().map(|p| u32::from(p.0[0])).collect();
        let mean = levels.iter().sum::<u32>() / levels.len() as u32;

        let bits = levels
            .iter()
            .fold(0u64, |acc, &level| (acc << 1) | u64::from(level > mean));

        Ok(ImageHash::new(format!("{:016x}", bits)))
    }
}

/// Identifier implementation for a configured algorithm
pub fn identifier_for(algorithm: HashAlgorithm) -> Arc<dyn Identifier> {
    match algorithm {
        HashAlgorithm::Sha256 => Arc::new(Sha256Identifier),
        HashAlgorithm::Average => Arc::new(AverageHashIdentifier),
    }
}

/// Hash on the blocking pool so decoding never stalls the async tasks
pub async fn compute_hash(
    identifier: Arc<dyn Identifier>,
    bytes: Vec<u8>,
    kind: ImageKind,
) -> Result<ImageHash> {
    tokio::task::spawn_blocking(move || identifier.hash(&bytes, kind))
        .await
        .map_err(|e| Error::Internal(format!("Hash calculation task failed: {}", e)))?
}

//! Locating and unpacking the layer that holds a bundle entry.
//!
//! Every layer of a Tekton bundle is a single-file tar archive annotated
//! with the kind, name and API version of the object it holds.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::{BundleError, Result};
use crate::registry::{Descriptor, Manifest};

/// Layer annotation naming the object's kind.
pub const BUNDLE_ANNOTATION_KIND: &str = "dev.tekton.image.kind";
/// Layer annotation naming the object.
pub const BUNDLE_ANNOTATION_NAME: &str = "dev.tekton.image.name";
/// Layer annotation naming the object's API version.
pub const BUNDLE_ANNOTATION_API_VERSION: &str = "dev.tekton.image.apiVersion";

/// Most bytes a layer may unpack to.
pub const MAX_LAYER_BYTES: u64 = 20 * 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const USTAR_MAGIC: &[u8] = b"ustar";
const USTAR_MAGIC_OFFSET: usize = 257;

/// The identifying annotations of one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerEntry<'a> {
    pub index: usize,
    pub kind: &'a str,
    pub name: &'a str,
    pub api_version: &'a str,
    pub descriptor: &'a Descriptor,
}

/// Find the layer holding `kind`/`name`.
///
/// Every layer must carry all three annotations; a bundle with an
/// unannotated layer is rejected even if another layer matches.
pub fn select_layer<'a>(manifest: &'a Manifest, kind: &str, name: &str) -> Result<LayerEntry<'a>> {
    let entries = manifest
        .layers
        .iter()
        .enumerate()
        .map(|(index, descriptor)| -> Result<LayerEntry<'a>> {
            let annotation = move |key: &'static str| {
                descriptor
                    .annotations
                    .get(key)
                    .map(String::as_str)
                    .ok_or(BundleError::MissingAnnotation {
                        annotation: short_name(key),
                        layer: index,
                    })
            };
            Ok(LayerEntry {
                index,
                kind: annotation(BUNDLE_ANNOTATION_KIND)?,
                name: annotation(BUNDLE_ANNOTATION_NAME)?,
                api_version: annotation(BUNDLE_ANNOTATION_API_VERSION)?,
                descriptor,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    entries
        .into_iter()
        .find(|entry| entry.kind == kind && entry.name == name)
        .ok_or_else(|| BundleError::NoMatchingLayer {
            kind: kind.to_string(),
            name: name.to_string(),
        })
}

fn short_name(key: &'static str) -> &'static str {
    key.rsplit('.').next().unwrap_or(key)
}

/// Contents of a layer blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerContent {
    /// The first entry of a tar archive.
    Entry(Vec<u8>),
    /// A layer that is not a tar archive, returned as-is.
    Raw(Vec<u8>),
}

impl LayerContent {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Entry(bytes) | Self::Raw(bytes) => bytes,
        }
    }
}

/// Decompress a layer blob and pull out its first tar entry.
///
/// Neither the decompressed layer nor the entry may exceed `limit` bytes.
pub fn extract(blob: &[u8], limit: u64) -> Result<LayerContent> {
    let bytes = if blob.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        GzDecoder::new(blob)
            .take(limit.saturating_add(1))
            .read_to_end(&mut decoded)?;
        decoded
    } else {
        blob.to_vec()
    };
    if bytes.len() as u64 > limit {
        return Err(BundleError::TooLarge { limit });
    }

    let is_tar = bytes
        .get(USTAR_MAGIC_OFFSET..USTAR_MAGIC_OFFSET + USTAR_MAGIC.len())
        .is_some_and(|magic| magic == USTAR_MAGIC);
    if !is_tar {
        return Ok(LayerContent::Raw(bytes));
    }

    let mut archive = tar::Archive::new(bytes.as_slice());
    let mut entry = archive
        .entries()?
        .next()
        .ok_or(BundleError::EmptyArchive)??;
    let expected = entry.header().size()?;
    if expected > limit {
        return Err(BundleError::TooLarge { limit });
    }
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    let received = data.len() as u64;
    if received != expected {
        return Err(BundleError::SizeMismatch { expected, received });
    }
    Ok(LayerContent::Entry(data))
}

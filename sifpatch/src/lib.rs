//! Patches for apktool-decoded School Idol Festival APKs.
//!
//! Two edits are applied to a decoded tree:
//!
//! * [`smali::patch_root_detection`] stubs out the game's root checks so they
//!   always return `false`.
//! * [`manifest::patch_permissions`] makes sure `WRITE_EXTERNAL_STORAGE` is
//!   requested.
//!
//! Both are idempotent. [`apply_patches`] runs them in order.

use std::path::Path;

use log::info;

mod error;
pub mod manifest;
pub mod smali;

pub use error::{Error, Result};
pub use manifest::PermissionPatch;
pub use smali::RootPatch;

/// What [`apply_patches`] did to a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub root: RootPatch,
    pub permission: PermissionPatch,
}

/// Apply the root-detection patch, then the permission patch, to the decoded
/// tree at `dir`.
///
/// There is no rollback: if the manifest patch fails the smali file stays
/// modified. Callers work on a throwaway copy.
pub fn apply_patches(dir: &Path) -> Result<PatchReport> {
    info!("Applying patches to {}", dir.display());

    let root = smali::patch_root_detection(dir)?;
    let permission = manifest::patch_permissions(dir)?;

    Ok(PatchReport { root, permission })
}

//! Permission patch for the decoded `AndroidManifest.xml`.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use log::info;
use xmlem::{Document, NewElement};

use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "AndroidManifest.xml";
pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";
pub const ANDROID_PREFIX: &str = "android";
pub const USES_PERMISSION: &str = "uses-permission";

/// Needed for the game to write its downloaded assets to shared storage.
pub const WRITE_EXTERNAL_STORAGE: &str = "android.permission.WRITE_EXTERNAL_STORAGE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPatch {
    AlreadyPresent,
    Added,
}

/// Make sure the manifest root has a `<uses-permission>` child whose
/// Android-namespaced `name` is `permission`, appending one if needed.
///
/// Entries are matched through whichever prefix the root binds to
/// [`ANDROID_NS`]. Only direct children of the root are considered.
pub fn ensure_permission(doc: &mut Document, permission: &str) -> Result<PermissionPatch> {
    let root = doc.root();

    let (prefix, declared) = match android_prefix(doc) {
        Some(prefix) => (prefix, true),
        None => {
            let ns_attr = format!("xmlns:{ANDROID_PREFIX}");
            if let Some(uri) = root.attribute(doc, &ns_attr) {
                return Err(Error::Namespace {
                    prefix: ANDROID_PREFIX.to_string(),
                    uri: uri.to_string(),
                });
            }
            (ANDROID_PREFIX.to_string(), false)
        }
    };
    let name_attr = format!("{prefix}:name");

    let present = {
        let doc: &Document = doc;
        root.children(doc)
            .into_iter()
            .filter(|child| child.name(doc) == USES_PERMISSION)
            .any(|child| child.attribute(doc, &name_attr) == Some(permission))
    };

    if present {
        return Ok(PermissionPatch::AlreadyPresent);
    }

    if !declared {
        let ns_attr = format!("xmlns:{prefix}");
        root.set_attribute(doc, ns_attr.as_str(), ANDROID_NS);
    }

    let entry = root.append_new_element(
        doc,
        NewElement {
            name: element_name(USES_PERMISSION)?,
            attrs: Default::default(),
        },
    );
    entry.set_attribute(doc, name_attr.as_str(), permission);

    Ok(PermissionPatch::Added)
}

/// Prefix the root element binds to [`ANDROID_NS`], if any.
fn android_prefix(doc: &Document) -> Option<String> {
    for (key, value) in doc.root().attributes(doc) {
        if value != ANDROID_NS {
            continue;
        }
        if let Some(prefix) = key.prefixed_name().strip_prefix("xmlns:") {
            return Some(prefix.to_string());
        }
    }
    None
}

fn element_name<T>(raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| Error::Manifest {
        path: MANIFEST_FILE.into(),
        message: format!("invalid element name '{raw}': {e}"),
    })
}

/// Ensure [`WRITE_EXTERNAL_STORAGE`] is requested by the manifest in `root`.
///
/// The file is only rewritten when the permission had to be added.
pub fn patch_permissions(root: &Path) -> Result<PermissionPatch> {
    info!("Fixing app permissions");

    let path = root.join(MANIFEST_FILE);
    let text = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;

    let mut doc = Document::from_reader(std::io::Cursor::new(&text)).map_err(|e| {
        Error::Manifest {
            path: path.clone(),
            message: e.to_string(),
        }
    })?;

    let outcome = ensure_permission(&mut doc, WRITE_EXTERNAL_STORAGE)?;
    match outcome {
        PermissionPatch::AlreadyPresent => {
            info!("Permissions look ok, not touching the manifest");
        }
        PermissionPatch::Added => {
            info!("Adding missing permission: {WRITE_EXTERNAL_STORAGE}");
            std::fs::write(&path, doc.to_string_pretty()).map_err(|e| Error::io(&path, e))?;
        }
    }

    Ok(outcome)
}

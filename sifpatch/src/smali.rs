//! Root-detection patch for `GameEngineActivity.smali`.
//!
//! The game checks for an `su` binary and for a "suspicious" environment in two
//! private boolean methods. Both bodies are swapped for a stub that returns
//! `false`, leaving the rest of the class untouched.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{Error, Result};

/// Location of the activity class inside an apktool-decoded tree. The middle
/// component is the region-specific package (`jp`, `en`, ...).
pub const TARGET_GLOB: &str = "smali/klb/android/*/GameEngineActivity.smali";

/// Methods whose bodies are replaced.
pub const TARGET_METHODS: [&str; 2] = ["isSuBinaryPresent", "isInappropriateEnvSuspected"];

/// Body inserted between the declaration and `.end method`: one local,
/// `v0 = 0`, return `v0`.
pub const STUB: &str = "
    .locals 1

    const/4 v0, 0x0

    return v0
";

static METHOD_BODY: Lazy<Regex> = Lazy::new(|| {
    let names = TARGET_METHODS
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&format!(
        r"(?s)(\.method private ({names})\(\)Z)(.*?)(\.end method)"
    ))
    .expect("method body pattern is valid")
});

/// Result of rewriting smali text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedSource {
    pub text: String,
    /// Target methods found and stubbed, in file order.
    pub stubbed: Vec<String>,
}

/// Outcome of [`patch_root_detection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPatch {
    pub path: PathBuf,
    pub stubbed: Vec<String>,
}

/// Replace the body of every target method in `source` with [`STUB`].
///
/// Declaration and `.end method` lines are kept verbatim; anything outside a
/// matched method is returned byte for byte.
pub fn patch_source(source: &str) -> PatchedSource {
    let mut stubbed = Vec::new();

    let text = METHOD_BODY
        .replace_all(source, |caps: &Captures| {
            stubbed.push(caps[2].to_string());
            format!("{}{}{}", &caps[1], STUB, &caps[4])
        })
        .into_owned();

    PatchedSource { text, stubbed }
}

/// Find the single file under `root` matching [`TARGET_GLOB`].
pub fn find_target(root: &Path) -> Result<PathBuf> {
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        TARGET_GLOB
    );

    let mut matches = Vec::new();
    for entry in glob::glob(&pattern)? {
        match entry {
            Ok(path) => matches.push(path),
            Err(e) => {
                let path = e.path().to_path_buf();
                return Err(Error::io(path, std::io::Error::from(e)));
            }
        }
    }
    matches.sort();

    match matches.len() {
        0 => Err(Error::TargetNotFound {
            pattern: TARGET_GLOB.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::AmbiguousTarget {
            pattern: TARGET_GLOB.to_string(),
            matches,
        }),
    }
}

/// Stub out the root-detection methods in the decoded tree at `root`.
pub fn patch_root_detection(root: &Path) -> Result<RootPatch> {
    info!("Removing root detection code");

    let path = find_target(root)?;
    debug!("Root detection lives in {}", path.display());

    let source = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    let patched = patch_source(&source);

    for method in TARGET_METHODS {
        if !patched.stubbed.iter().any(|m| m == method) {
            warn!("Method {method} not found in {}", path.display());
        }
    }

    std::fs::write(&path, &patched.text).map_err(|e| Error::io(&path, e))?;

    Ok(RootPatch {
        path,
        stubbed: patched.stubbed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVITY: &str = r#".class public Lklb/android/GameEngine/GameEngineActivity;
.super Landroid/app/Activity;

.method private isInappropriateEnvSuspected()Z
    .locals 3

    invoke-static {}, Lklb/android/GameEngine/Env;->check()I
    move-result v0

    if-eqz v0, :cond_0
    const/4 v1, 0x1
    return v1

    :cond_0
    const/4 v1, 0x0
    return v1
.end method

.method public onCreate(Landroid/os/Bundle;)V
    .locals 0

    invoke-super {p0, p1}, Landroid/app/Activity;->onCreate(Landroid/os/Bundle;)V

    return-void
.end method

.method private isSuBinaryPresent()Z
    .locals 2

    const-string v0, "/system/xbin/su"
    invoke-static {v0}, Lklb/android/GameEngine/Files;->exists(Ljava/lang/String;)Z
    move-result v1

    return v1
.end method

.method public isSuBinaryPresent(Ljava/lang/String;)Z
    .locals 1

    const/4 v0, 0x1

    return v0
.end method
"#;

    fn stubbed(name: &str) -> String {
        format!(".method private {name}()Z{STUB}.end method")
    }

    #[test]
    fn stubs_su_binary_check() {
        let source = ".method private isSuBinaryPresent()Z\n    .locals 4\n    nop\n    nop\n    return v3\n.end method\n";
        let patched = patch_source(source);

        assert_eq!(
            patched.text,
            ".method private isSuBinaryPresent()Z\n    .locals 1\n\n    const/4 v0, 0x0\n\n    return v0\n.end method\n"
        );
        assert_eq!(patched.stubbed, vec!["isSuBinaryPresent"]);
    }

    #[test]
    fn leaves_other_methods_untouched() {
        let patched = patch_source(ACTIVITY);

        assert_eq!(
            patched.stubbed,
            vec!["isInappropriateEnvSuspected", "isSuBinaryPresent"]
        );
        assert!(patched.text.contains(&stubbed("isSuBinaryPresent")));
        assert!(patched.text.contains(&stubbed("isInappropriateEnvSuspected")));

        // Splice the original bodies back in by hand and compare everything.
        let env_start = ACTIVITY.find(".method private isInappropriateEnvSuspected").unwrap();
        let env_end = ACTIVITY[env_start..].find(".end method").unwrap() + env_start + 11;
        let su_start = ACTIVITY.find(".method private isSuBinaryPresent").unwrap();
        let su_end = ACTIVITY[su_start..].find(".end method").unwrap() + su_start + 11;

        let expected = format!(
            "{}{}{}{}{}",
            &ACTIVITY[..env_start],
            stubbed("isInappropriateEnvSuspected"),
            &ACTIVITY[env_end..su_start],
            stubbed("isSuBinaryPresent"),
            &ACTIVITY[su_end..],
        );
        assert_eq!(patched.text, expected);
    }

    #[test]
    fn public_overload_is_not_a_target() {
        let patched = patch_source(ACTIVITY);
        assert!(patched.text.contains(
            ".method public isSuBinaryPresent(Ljava/lang/String;)Z\n    .locals 1\n\n    const/4 v0, 0x1\n"
        ));
    }

    #[test]
    fn patching_twice_is_stable() {
        let once = patch_source(ACTIVITY);
        let twice = patch_source(&once.text);
        assert_eq!(once.text, twice.text);
    }

    #[test]
    fn source_without_targets_is_unchanged() {
        let source = ".class public LFoo;\n.method public bar()V\n    return-void\n.end method\n";
        let patched = patch_source(source);
        assert_eq!(patched.text, source);
        assert!(patched.stubbed.is_empty());
    }

    #[test]
    fn missing_target_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("smali/klb/android/GameEngine")).unwrap();

        let err = find_target(dir.path()).unwrap_err();
        assert!(matches!(err, Error::TargetNotFound { .. }), "{err:?}");
    }

    #[test]
    fn two_candidates_are_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        for region in ["GameEngine", "GameEngineEn"] {
            let class_dir = dir.path().join("smali/klb/android").join(region);
            std::fs::create_dir_all(&class_dir).unwrap();
            std::fs::write(class_dir.join("GameEngineActivity.smali"), ACTIVITY).unwrap();
        }

        let err = find_target(dir.path()).unwrap_err();
        match err {
            Error::AmbiguousTarget { matches, .. } => assert_eq!(matches.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rewrites_target_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let class_dir = dir.path().join("smali/klb/android/GameEngine");
        std::fs::create_dir_all(&class_dir).unwrap();
        let path = class_dir.join("GameEngineActivity.smali");
        std::fs::write(&path, ACTIVITY).unwrap();

        let report = patch_root_detection(dir.path()).unwrap();

        assert_eq!(report.path, path);
        assert_eq!(report.stubbed.len(), 2);
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, patch_source(ACTIVITY).text);
    }
}

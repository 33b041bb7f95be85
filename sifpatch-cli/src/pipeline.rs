use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use sifpatch::PatchReport;

use crate::tools::{ToolError, Toolchain};

pub const TEMP_PREFIX: &str = "sifpatch";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("cannot use input {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("patching failed: {0}")]
    Patch(#[from] sifpatch::Error),

    #[error("cannot replace existing output {}: {source}", path.display())]
    StaleOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("apktool reported success but {} was not written", .0.display())]
    MissingOutput(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signing {
    pub key_alias: String,
    pub keystore: Option<PathBuf>,
}

/// One patch run: where to read, where to write, and how to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
    pub signing: Option<Signing>,
}

#[derive(Debug)]
pub struct Outcome {
    pub output: PathBuf,
    pub report: PatchReport,
    pub signed: bool,
}

/// `<stem>_rootpatched<.ext>` next to `input`.
pub fn default_output(input: &Path) -> PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push("_rootpatched");
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    input.with_file_name(name)
}

/// Decode, patch, rebuild and optionally sign.
///
/// The decoded tree lives in a temporary directory that is removed when this
/// returns, whether or not a step failed.
pub async fn run(tools: &Toolchain, job: &Job) -> Result<Outcome, PipelineError> {
    let workdir = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempdir()
        .map_err(PipelineError::TempDir)?;
    let tree = workdir.path();

    info!("Decoding APK {} with {}", job.input.display(), tools.apktool.name());
    tools.decode(&job.input, tree).await?;

    let report = sifpatch::apply_patches(tree)?;

    // A file left over from an earlier run must not pass for this build's output.
    match std::fs::remove_file(&job.output) {
        Ok(()) => debug!("Removed previous output {}", job.output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(PipelineError::StaleOutput {
                path: job.output.clone(),
                source,
            });
        }
    }

    info!("Rebuilding APK {} with {}", job.output.display(), tools.apktool.name());
    tools.build(tree, &job.output).await?;
    if !job.output.exists() {
        return Err(PipelineError::MissingOutput(job.output.clone()));
    }

    let signed = match &job.signing {
        Some(signing) => {
            info!("Signing the new APK with key {}", signing.key_alias);
            tools
                .sign(&job.output, &signing.key_alias, signing.keystore.as_deref())
                .await?;
            true
        }
        None => {
            warn!(
                "You didn't tell me to sign the APK, you won't be able to install it until you sign it yourself"
            );
            false
        }
    };

    Ok(Outcome {
        output: job.output.clone(),
        report,
        signed,
    })
}

use std::path::PathBuf;

/// Errors raised while patching a decoded tree.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No file in the decoded tree matched the target pattern. Usually means the
    /// APK is a version these patches don't know about.
    #[error("no file matching '{pattern}' in decoded tree (incompatible APK version?)")]
    TargetNotFound { pattern: String },

    #[error("{} files match '{pattern}', expected exactly one", matches.len())]
    AmbiguousTarget {
        pattern: String,
        matches: Vec<PathBuf>,
    },

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("manifest binds xmlns:{prefix} to '{uri}', expected the Android namespace")]
    Namespace { prefix: String, uri: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

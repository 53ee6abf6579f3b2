use std::io;
use std::path::PathBuf;

/// Every way a bundling invocation can fail.
///
/// Failures are never retried: markup and code generation are deterministic
/// for a given input, so the first error is surfaced to the caller as is.
#[derive(Debug, thiserror::Error)]
pub enum MdxBundlerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration error: two virtual files resolve to `{}`", .path.display())]
    PathCollision { path: PathBuf },

    #[error("Failed to compile `{}`: {source}", .path.display())]
    Compile {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to transform `{}`: {source}", .path.display())]
    Transform {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("No loader is known for extension `.{extension}`")]
    UnsupportedLoader { extension: String },

    #[error("Failed to clean up build output `{}`: {source}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Bundling failed: {0}")]
    Bundle(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MdxBundlerError {
    /// Recovers an error raised by this crate from inside a host bundler
    /// callback. Anything else is reported as a bundle failure.
    pub fn from_host(err: anyhow::Error) -> Self {
        match err.downcast::<MdxBundlerError>() {
            Ok(err) => err,
            Err(err) => MdxBundlerError::Bundle(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, MdxBundlerError>;

//! Turns host bundler output into the returned [`ComponentBundle`].

use serde::{Deserialize, Serialize};

use crate::error::{MdxBundlerError, Result};
use crate::frontmatter::Frontmatter;
use crate::plugin::{BuildOutput, OutputMode};
use crate::registry::ENTRY_OUTPUT_NAME;

/// Global the bundle assigns the entry module's exports to.
pub const GLOBAL_NAME: &str = "Component";

/// The result of bundling one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentBundle {
    /// Function body evaluating to the document's default export. Expects
    /// the externalised globals (at least `vue`) to be in scope.
    pub code: String,
    pub frontmatter: Frontmatter,
}

/// Statement appended to the bundle so that evaluating it as a function body
/// returns the default export.
pub fn return_trailer() -> String {
    format!(";return {GLOBAL_NAME}.default;")
}

#[derive(Debug, Clone)]
pub struct OutputPackager {
    mode: OutputMode,
}

impl OutputPackager {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    /// Reads the bundle from wherever the host put it, appends the return
    /// trailer and pairs it with `frontmatter`.
    ///
    /// In written mode the single output file is removed after reading; the
    /// directory and anything else in it are left alone.
    pub async fn package(
        &self,
        output: BuildOutput,
        frontmatter: Frontmatter,
    ) -> Result<ComponentBundle> {
        let bytes = match &self.mode {
            OutputMode::InMemory => output
                .output_files
                .and_then(|files| files.into_iter().next())
                .map(|file| file.contents)
                .ok_or_else(|| {
                    MdxBundlerError::Bundle(anyhow::anyhow!(
                        "the host bundler returned no in-memory output files"
                    ))
                })?,
            OutputMode::Written { outdir } => {
                let path = outdir.join(ENTRY_OUTPUT_NAME);
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| MdxBundlerError::Cleanup {
                        path: path.clone(),
                        source,
                    })?;
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|source| MdxBundlerError::Cleanup {
                        path: path.clone(),
                        source,
                    })?;
                log::debug!("Removed intermediate output {}", path.display());
                bytes
            }
        };

        let mut code = String::from_utf8_lossy(&bytes).into_owned();
        code.push_str(&return_trailer());
        Ok(ComponentBundle { code, frontmatter })
    }
}

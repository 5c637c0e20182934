//! IPA artifact acquisition.
//!
//! An artifact is either a prebuilt file, the product of an
//! `xcodebuild archive` + `-exportArchive` run, or whatever a user supplied
//! build command leaves behind. Artifacts that live in a temporary directory
//! carry a disposal action that removes it.

use crate::bail;
use crate::delivery::{
    error::{Error, ErrorExt, Result},
    process::CommandRunner,
    utils::fs::{ScratchDir, absolute_path, copy_file, is_readable},
};
use async_trait::async_trait;
use futures_lite::future::Boxed;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

const DEFAULT_CONFIGURATION: &str = "Release";
const BUILD_SCRATCH_PREFIX: &str = "kodegen-ipa-build-";
const XCODEBUILD: &str = "xcodebuild";
const SHELL: &str = "zsh";

/// Native toolchain build settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XcodebuildSource {
    pub scheme: String,
    pub export_options_plist: PathBuf,
    pub workspace_path: Option<PathBuf>,
    pub project_path: Option<PathBuf>,
    /// Defaults to `Release`.
    pub configuration: Option<String>,
    /// Defaults to `archive.xcarchive` inside the build's temporary directory.
    pub archive_path: Option<PathBuf>,
    pub derived_data_path: Option<PathBuf>,
    /// When set, the exported IPA is copied here and the temporary directory
    /// is removed right away.
    pub output_ipa_path: Option<PathBuf>,
}

/// Where the IPA to upload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpaSource {
    Prebuilt {
        ipa_path: PathBuf,
    },
    Xcodebuild(XcodebuildSource),
    CustomCommand {
        build_command: String,
        generated_ipa_path: PathBuf,
        output_ipa_path: Option<PathBuf>,
    },
}

/// Deferred cleanup for an artifact.
pub type Dispose = Box<dyn FnOnce() -> Boxed<()> + Send>;

/// A resolved IPA on local disk.
pub struct IpaArtifact {
    pub path: PathBuf,
    dispose: Option<Dispose>,
}

impl IpaArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dispose: None,
        }
    }

    pub fn with_dispose(path: impl Into<PathBuf>, dispose: Dispose) -> Self {
        Self {
            path: path.into(),
            dispose: Some(dispose),
        }
    }

    pub fn has_dispose(&self) -> bool {
        self.dispose.is_some()
    }

    /// Runs the disposal action, if any. Consumes the artifact so it can run
    /// at most once.
    pub async fn dispose(self) {
        if let Some(dispose) = self.dispose {
            log::debug!("Disposing artifact {}", self.path.display());
            dispose().await;
        }
    }
}

impl fmt::Debug for IpaArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpaArtifact")
            .field("path", &self.path)
            .field("has_dispose", &self.dispose.is_some())
            .finish()
    }
}

/// Turns an [`IpaSource`] into an [`IpaArtifact`].
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    async fn resolve(&self, source: &IpaSource) -> Result<IpaArtifact>;
}

/// Resolves all [`IpaSource`] kinds, running build tools through a
/// [`CommandRunner`].
#[derive(Clone)]
pub struct DefaultArtifactProvider {
    runner: Arc<dyn CommandRunner>,
}

impl DefaultArtifactProvider {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn resolve_prebuilt(&self, ipa_path: &Path) -> Result<IpaArtifact> {
        let ipa_path = absolute_path(ipa_path)?;
        if !is_readable(&ipa_path).await {
            bail!("IPA file is not readable: {}", ipa_path.display());
        }
        Ok(IpaArtifact::new(ipa_path))
    }

    async fn resolve_xcodebuild(&self, source: &XcodebuildSource) -> Result<IpaArtifact> {
        if source.scheme.trim().is_empty() {
            bail!("scheme is required for xcodebuild IPA source.");
        }
        if source.export_options_plist.as_os_str().is_empty() {
            bail!("exportOptionsPlist is required for xcodebuild IPA source.");
        }
        if source.workspace_path.is_some() == source.project_path.is_some() {
            bail!("Exactly one of workspacePath or projectPath must be provided.");
        }

        let scratch = ScratchDir::new(BUILD_SCRATCH_PREFIX)?;
        let exported = match self.archive_and_export(source, scratch.path()).await {
            Ok(exported) => exported,
            Err(e) => {
                scratch.close().await;
                return Err(e);
            }
        };

        match &source.output_ipa_path {
            None => Ok(IpaArtifact::with_dispose(
                exported,
                Box::new(move || -> Boxed<()> { Box::pin(scratch.close()) }),
            )),
            Some(output) => {
                let output = absolute_path(output)?;
                let copied = copy_file(&exported, &output).await;
                scratch.close().await;
                copied?;
                Ok(IpaArtifact::new(output))
            }
        }
    }

    async fn archive_and_export(&self, source: &XcodebuildSource, scratch: &Path) -> Result<PathBuf> {
        let archive_path = match &source.archive_path {
            Some(path) => absolute_path(path)?,
            None => scratch.join("archive.xcarchive"),
        };
        let export_dir = scratch.join("export");

        let export_options = absolute_path(&source.export_options_plist)?;
        if !is_readable(&export_options).await {
            bail!(
                "Export options plist is not readable: {}",
                export_options.display()
            );
        }

        log::info!("Archiving scheme {}", source.scheme);
        self.runner
            .run(XCODEBUILD, &archive_args(source, &archive_path)?)
            .await?;

        tokio::fs::create_dir_all(&export_dir)
            .await
            .fs_context("creating directory", &export_dir)?;

        log::info!("Exporting {}", archive_path.display());
        let export_args = vec![
            "-exportArchive".to_string(),
            "-archivePath".to_string(),
            path_arg(&archive_path),
            "-exportOptionsPlist".to_string(),
            path_arg(&export_options),
            "-exportPath".to_string(),
            path_arg(&export_dir),
        ];
        self.runner.run(XCODEBUILD, &export_args).await?;

        find_ipa(&export_dir).await
    }

    async fn resolve_custom_command(
        &self,
        build_command: &str,
        generated_ipa_path: &Path,
        output_ipa_path: Option<&Path>,
    ) -> Result<IpaArtifact> {
        if build_command.trim().is_empty() {
            bail!("buildCommand is required for custom command IPA source.");
        }

        log::info!("Running build command");
        self.runner
            .run(SHELL, &["-lc".to_string(), build_command.to_string()])
            .await?;

        let generated = absolute_path(generated_ipa_path)?;
        if !is_readable(&generated).await {
            bail!("Generated IPA file is not readable: {}", generated.display());
        }

        match output_ipa_path {
            None => Ok(IpaArtifact::new(generated)),
            Some(output) => {
                let output = absolute_path(output)?;
                copy_file(&generated, &output).await?;
                Ok(IpaArtifact::new(output))
            }
        }
    }
}

#[async_trait]
impl ArtifactProvider for DefaultArtifactProvider {
    async fn resolve(&self, source: &IpaSource) -> Result<IpaArtifact> {
        match source {
            IpaSource::Prebuilt { ipa_path } => self.resolve_prebuilt(ipa_path).await,
            IpaSource::Xcodebuild(xcodebuild) => self.resolve_xcodebuild(xcodebuild).await,
            IpaSource::CustomCommand {
                build_command,
                generated_ipa_path,
                output_ipa_path,
            } => {
                self.resolve_custom_command(
                    build_command,
                    generated_ipa_path,
                    output_ipa_path.as_deref(),
                )
                .await
            }
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn archive_args(source: &XcodebuildSource, archive_path: &Path) -> Result<Vec<String>> {
    let mut args = vec![
        "archive".to_string(),
        "-scheme".to_string(),
        source.scheme.clone(),
        "-configuration".to_string(),
        source
            .configuration
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIGURATION.to_string()),
        "-archivePath".to_string(),
        path_arg(archive_path),
    ];
    if let Some(workspace) = &source.workspace_path {
        args.push("-workspace".to_string());
        args.push(path_arg(&absolute_path(workspace)?));
    }
    if let Some(project) = &source.project_path {
        args.push("-project".to_string());
        args.push(path_arg(&absolute_path(project)?));
    }
    if let Some(derived) = &source.derived_data_path {
        args.push("-derivedDataPath".to_string());
        args.push(path_arg(&absolute_path(derived)?));
    }
    Ok(args)
}

/// First `.ipa` file in `dir`, by file name.
async fn find_ipa(dir: &Path) -> Result<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .fs_context("reading directory", dir)?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && path.extension().is_some_and(|ext| ext == "ipa") {
            candidates.push(path);
        }
    }
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        Error::infrastructure(format!(
            "xcodebuild export did not produce an .ipa file in: {}",
            dir.display()
        ))
    })
}

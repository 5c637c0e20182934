//! Command line argument parsing and validation.
//!
//! This module provides CLI argument parsing using clap, with validation of
//! the artifact source combinations clap cannot express on its own.

use crate::delivery::{IpaSource, XcodebuildSource, utils::http::DEFAULT_BASE_URL};
use crate::error::CliError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Verifies iOS build artifacts and delivers them to App Store Connect
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_upload",
    version,
    about = "Verifies iOS build artifacts and delivers them to App Store Connect",
    long_about = "Verifies an .ipa (structure, checksums, Info.plist identity, code signature) and
uploads it through the App Store Connect build upload API.

Usage:
  kodegen_bundler_upload verify build/Demo.ipa --bundle-id com.example.demo
  kodegen_bundler_upload upload --ipa build/Demo.ipa --app-id 123 \\
      --bundle-id com.example.demo --version 1.0.0 --build-number 42 --wait --apply

Uploads are dry runs unless --apply is given.

Exit code 0 = success, 1 = infrastructure or usage failure, 2 = artifact rejected or processing failed."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Print per-step detail
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors and the final result
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run preflight verification on a local .ipa
    Verify(VerifyArgs),
    /// Verify an .ipa and upload it as a new build
    Upload(Box<UploadArgs>),
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Path to the .ipa file
    #[arg(value_name = "IPA")]
    pub ipa: PathBuf,

    /// Expected CFBundleIdentifier
    #[arg(long, value_name = "ID")]
    pub bundle_id: Option<String>,

    /// Expected CFBundleShortVersionString
    #[arg(long = "version", value_name = "VERSION")]
    pub app_version: Option<String>,

    /// Expected CFBundleVersion
    #[arg(long, value_name = "BUILD")]
    pub build_number: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// App Store Connect app identifier
    #[arg(long, value_name = "APP_ID")]
    pub app_id: String,

    /// Expected CFBundleIdentifier
    #[arg(long, value_name = "ID")]
    pub bundle_id: String,

    /// Expected CFBundleShortVersionString, also the uploaded version
    #[arg(long = "version", value_name = "VERSION")]
    pub app_version: String,

    /// Expected CFBundleVersion, also the uploaded build number
    #[arg(long, value_name = "BUILD")]
    pub build_number: String,

    /// Prebuilt .ipa to upload
    #[arg(long, value_name = "PATH", help_heading = "Artifact source")]
    pub ipa: Option<PathBuf>,

    /// Xcode scheme to archive and export
    #[arg(long, value_name = "SCHEME", help_heading = "Artifact source")]
    pub scheme: Option<String>,

    /// ExportOptions.plist for xcodebuild -exportArchive
    #[arg(long, value_name = "PATH", help_heading = "Artifact source")]
    pub export_options_plist: Option<PathBuf>,

    /// Xcode workspace (exclusive with --project)
    #[arg(long, value_name = "PATH", help_heading = "Artifact source")]
    pub workspace: Option<PathBuf>,

    /// Xcode project (exclusive with --workspace)
    #[arg(long, value_name = "PATH", help_heading = "Artifact source")]
    pub project: Option<PathBuf>,

    /// Build configuration [default: Release]
    #[arg(long, value_name = "NAME", help_heading = "Artifact source")]
    pub configuration: Option<String>,

    /// Where xcodebuild writes the .xcarchive
    #[arg(long, value_name = "PATH", help_heading = "Artifact source")]
    pub archive_path: Option<PathBuf>,

    /// xcodebuild -derivedDataPath
    #[arg(long, value_name = "PATH", help_heading = "Artifact source")]
    pub derived_data_path: Option<PathBuf>,

    /// Shell command that produces the .ipa (run with zsh -lc)
    #[arg(long, value_name = "COMMAND", help_heading = "Artifact source")]
    pub build_command: Option<String>,

    /// Path of the .ipa the build command produces
    #[arg(long, value_name = "PATH", help_heading = "Artifact source")]
    pub generated_ipa: Option<PathBuf>,

    /// Copy the built .ipa here (xcodebuild and build command sources)
    #[arg(long, value_name = "PATH", help_heading = "Artifact source")]
    pub output_ipa: Option<PathBuf>,

    /// Poll until App Store Connect finishes processing
    #[arg(long)]
    pub wait: bool,

    /// Perform the upload; without it only the plan is printed
    #[arg(long)]
    pub apply: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// App Store Connect API root
    #[arg(long, env = "ASC_BASE_URL", default_value = DEFAULT_BASE_URL, help_heading = "Service")]
    pub base_url: String,

    /// Bearer token for the App Store Connect API
    #[arg(long, env = "ASC_TOKEN", hide_env_values = true, help_heading = "Service")]
    pub token: Option<String>,

    /// Seconds between processing state reads
    #[arg(
        long,
        env = "ASC_POLL_INTERVAL_SECS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u64).range(1..),
        help_heading = "Service"
    )]
    pub poll_interval_secs: u64,

    /// Seconds to wait for processing before giving up
    #[arg(long, env = "ASC_POLL_TIMEOUT_SECS", default_value_t = 600, help_heading = "Service")]
    pub poll_timeout_secs: u64,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Result<Self, clap::Error> {
        Self::try_parse()
    }
}

impl UploadArgs {
    /// Validates the identity arguments and builds the artifact source.
    ///
    /// Exactly one of `--ipa`, `--scheme` or `--build-command` selects the
    /// source; the remaining source flags must belong to it.
    pub fn source(&self) -> Result<IpaSource, CliError> {
        for (name, value) in [
            ("--app-id", &self.app_id),
            ("--bundle-id", &self.bundle_id),
            ("--version", &self.app_version),
            ("--build-number", &self.build_number),
        ] {
            if value.trim().is_empty() {
                return Err(CliError::InvalidArguments {
                    reason: format!("{} cannot be empty", name),
                });
            }
        }

        let selected: Vec<String> = [
            ("--ipa", self.ipa.is_some()),
            ("--scheme", self.scheme.is_some()),
            ("--build-command", self.build_command.is_some()),
        ]
        .into_iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| name.to_string())
        .collect();

        if selected.len() > 1 {
            return Err(CliError::ConflictingArguments { arguments: selected });
        }

        if let Some(ipa_path) = &self.ipa {
            self.reject_unused(
                "--ipa",
                &[
                    ("--export-options-plist", self.export_options_plist.is_some()),
                    ("--workspace", self.workspace.is_some()),
                    ("--project", self.project.is_some()),
                    ("--configuration", self.configuration.is_some()),
                    ("--archive-path", self.archive_path.is_some()),
                    ("--derived-data-path", self.derived_data_path.is_some()),
                    ("--generated-ipa", self.generated_ipa.is_some()),
                    ("--output-ipa", self.output_ipa.is_some()),
                ],
            )?;
            return Ok(IpaSource::Prebuilt {
                ipa_path: ipa_path.clone(),
            });
        }

        if let Some(scheme) = &self.scheme {
            self.reject_unused("--scheme", &[("--generated-ipa", self.generated_ipa.is_some())])?;
            let export_options_plist =
                self.export_options_plist
                    .clone()
                    .ok_or_else(|| CliError::MissingArgument {
                        argument: "--export-options-plist".to_string(),
                    })?;
            if self.workspace.is_some() == self.project.is_some() {
                return Err(CliError::InvalidArguments {
                    reason: "exactly one of --workspace or --project is required with --scheme"
                        .to_string(),
                });
            }
            return Ok(IpaSource::Xcodebuild(XcodebuildSource {
                scheme: scheme.clone(),
                export_options_plist,
                workspace_path: self.workspace.clone(),
                project_path: self.project.clone(),
                configuration: self.configuration.clone(),
                archive_path: self.archive_path.clone(),
                derived_data_path: self.derived_data_path.clone(),
                output_ipa_path: self.output_ipa.clone(),
            }));
        }

        if let Some(build_command) = &self.build_command {
            self.reject_unused(
                "--build-command",
                &[
                    ("--export-options-plist", self.export_options_plist.is_some()),
                    ("--workspace", self.workspace.is_some()),
                    ("--project", self.project.is_some()),
                    ("--configuration", self.configuration.is_some()),
                    ("--archive-path", self.archive_path.is_some()),
                    ("--derived-data-path", self.derived_data_path.is_some()),
                ],
            )?;
            let generated_ipa_path =
                self.generated_ipa
                    .clone()
                    .ok_or_else(|| CliError::MissingArgument {
                        argument: "--generated-ipa".to_string(),
                    })?;
            return Ok(IpaSource::CustomCommand {
                build_command: build_command.clone(),
                generated_ipa_path,
                output_ipa_path: self.output_ipa.clone(),
            });
        }

        Err(CliError::InvalidArguments {
            reason: "one artifact source is required: --ipa, --scheme or --build-command"
                .to_string(),
        })
    }

    fn reject_unused(&self, source: &str, flags: &[(&str, bool)]) -> Result<(), CliError> {
        let mut arguments: Vec<String> = flags
            .iter()
            .filter(|(_, set)| *set)
            .map(|(name, _)| name.to_string())
            .collect();
        if arguments.is_empty() {
            return Ok(());
        }
        arguments.insert(0, source.to_string());
        Err(CliError::ConflictingArguments { arguments })
    }
}

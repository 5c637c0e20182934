//! `upload` command: verify, then deliver through the build upload API.

use super::print_report;
use crate::cli::{OutputManager, UploadArgs};
use crate::config::UploaderConfig;
use crate::delivery::{
    ApiBuildUploadsRepository, BuildUploadOrchestrator, DefaultArtifactProvider,
    HttpChunkedUploadExecutor, StrictPreflightVerifier, TokioCommandRunner, UploadMode,
    UploadRequest, UploadResult,
};
use crate::error::{EXIT_SUCCESS, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run(args: &UploadArgs, output: &OutputManager) -> Result<i32> {
    let source = args.source()?;
    let config = UploaderConfig::new(
        &args.base_url,
        args.token.clone(),
        args.poll_interval_secs,
        args.poll_timeout_secs,
    )?;
    if args.apply {
        config.require_token()?;
    }
    log::debug!("Using {:?}", config);

    let runner = Arc::new(TokioCommandRunner);
    let transport = Arc::new(config.transport()?);

    let cancellation = CancellationToken::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling upload");
            on_interrupt.cancel();
        }
    });

    let orchestrator = BuildUploadOrchestrator::new(
        Arc::new(DefaultArtifactProvider::new(runner.clone())),
        Arc::new(StrictPreflightVerifier::new(runner)),
        Arc::new(ApiBuildUploadsRepository::new(transport)),
        Arc::new(HttpChunkedUploadExecutor::new()),
    )
    .with_polling(config.polling)
    .with_cancellation(cancellation);

    let request = UploadRequest {
        source,
        app_id: args.app_id.clone(),
        expected_bundle_id: args.bundle_id.clone(),
        expected_version: args.app_version.clone(),
        expected_build_number: args.build_number.clone(),
        wait_for_processing: args.wait,
        apply: args.apply,
    };

    if !args.json {
        output.progress(if args.apply {
            "Uploading build"
        } else {
            "Planning build upload (dry run)"
        })?;
    }
    let result = orchestrator.execute(&request).await?;

    if args.json {
        output.json(&result)?;
    } else {
        print_result(output, &result)?;
    }
    Ok(EXIT_SUCCESS)
}

fn print_result(output: &OutputManager, result: &UploadResult) -> std::io::Result<()> {
    let mode = match result.mode {
        UploadMode::DryRun => "dry-run",
        UploadMode::Applied => "applied",
    };
    output.info(&format!("Mode: {}", mode))?;
    print_report(output, &result.preflight_report)?;

    output.section("Planned operations")?;
    for (index, step) in result.planned_operations.iter().enumerate() {
        output.indent(&format!("{}. {}", index + 1, step))?;
    }

    if let Some(id) = &result.build_upload_id {
        output.info(&format!("Build upload: {}", id))?;
    }
    if let Some(state) = &result.final_state {
        output.info(&format!("Final state: {}", state.state))?;
        for warning in &state.warnings {
            output.warn(warning)?;
        }
        for info in &state.infos {
            output.verbose(info)?;
        }
    }

    match result.mode {
        UploadMode::DryRun => {
            output.info("No mutation requests were sent. Re-run with --apply to upload.")
        }
        UploadMode::Applied => output.success("Build uploaded"),
    }
}

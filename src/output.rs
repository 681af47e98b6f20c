//! CLI output formatting for pipeline runs.
//!
//! Output is operation-centric: every operation leads with its 1-based
//! position and name, with files, URLs and failures shown as indented
//! context lines.
//!
//! ```text
//! Source: https://cdn.example.com/uploads/poster.jpg
//!     Local: /tmp/image-worker/poster.jpg
//! 001 thumbnail
//!     Params: {"op":"thumbnail","width":100.0,"height":100.0}
//!     poster_thumbnail.jpg: 100x100
//!     Published: https://cdn.example.com/offers/42/poster_thumbnail.jpg
//! 002 sepia
//!     Params: {"op":"sepia"}
//!     Failed (transforming): Unknown operation 'sepia'
//! Cleanup: uploads/poster.jpg deleted
//! Done: 1 succeeded, 1 failed, 1 published
//! ```
//!
//! Each `format_*` function returns `Vec<String>` and does no I/O; the
//! `print_*` wrappers write to stdout.

use crate::imaging::TransformRegistry;
use crate::pipeline::{PipelineEvent, RunReport};
use crate::publish::Removal;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Format a single pipeline event as display lines.
pub fn format_pipeline_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::SourceReady { identifier, path } => vec![
            format!("Source: {}", identifier),
            format!("{}Local: {}", indent(1), path.display()),
        ],
        PipelineEvent::OperationStarted { index, op, params } => vec![
            format!("{} {}", format_index(*index), op),
            format!("{}Params: {}", indent(1), params),
        ],
        PipelineEvent::OperationSucceeded { outputs, .. } => outputs
            .iter()
            .map(|o| {
                format!(
                    "{}{}: {}x{}",
                    indent(1),
                    display_name(&o.path),
                    o.width,
                    o.height
                )
            })
            .collect(),
        PipelineEvent::OperationFailed { stage, error, .. } => {
            vec![format!("{}Failed ({}): {}", indent(1), stage, error)]
        }
        PipelineEvent::Published(file) => {
            let suffix = if file.reused { " (unchanged)" } else { "" };
            let mut lines = vec![format!("{}Published: {}{}", indent(1), file.url, suffix)];
            if let Some(owner) = &file.recorded {
                lines.push(format!("{}Recorded: {} for {}", indent(2), file.version, owner));
            }
            lines
        }
        PipelineEvent::PublishFailed {
            path,
            target,
            error,
        } => vec![format!(
            "{}Publish failed: {} → {}: {}",
            indent(1),
            display_name(path),
            target,
            error
        )],
        PipelineEvent::CleanedUp { key, removal } => {
            let status = match removal {
                Removal::Deleted => "deleted",
                Removal::NothingToDelete => "nothing to delete",
            };
            vec![format!("Cleanup: {} {}", key, status)]
        }
        PipelineEvent::CleanupFailed { key, error } => {
            vec![format!("Cleanup failed: {}: {}", key, error)]
        }
        PipelineEvent::Finished {
            succeeded,
            failed,
            published,
        } => vec![format!(
            "Done: {} succeeded, {} failed, {} published",
            succeeded, failed, published
        )],
        PipelineEvent::Aborted { stage, error } => {
            vec![format!("Failed while {}: {}", stage, error)]
        }
    }
}

/// Summary lines for a finished run: one per failure, then totals.
pub fn format_run_summary(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();
    for operation in &report.operations {
        if let Err(failure) = &operation.outcome {
            lines.push(format!(
                "{} {} failed ({}): {}",
                format_index(operation.index),
                operation.op,
                failure.stage,
                failure.error
            ));
        }
    }
    for failure in &report.publish_failures {
        lines.push(format!("{} not published: {}", failure.target, failure.error));
    }
    lines.push(format!(
        "{} of {} operations succeeded, {} files published",
        report.succeeded(),
        report.operations.len(),
        report.published.len()
    ));
    lines
}

pub fn print_run_summary(report: &RunReport) {
    for line in format_run_summary(report) {
        println!("{}", line);
    }
}

/// The registered transform names, plus `tile`.
pub fn format_operation_list(registry: &TransformRegistry) -> Vec<String> {
    let mut lines: Vec<String> = registry.names().map(str::to_string).collect();
    lines.push(format!("{} (grid split, optional merge)", crate::operation::TILE_OPERATION));
    lines
}

pub fn print_operation_list(registry: &TransformRegistry) {
    for line in format_operation_list(registry) {
        println!("{}", line);
    }
}

//! Pipeline driver: one source image, an ordered list of operations.
//!
//! ```text
//! Idle → Downloading → Loading → [Loading → Transforming → PostProcessing → Emitting → Publishing]* → Cleanup → Done
//!             │            │
//!             └────────────┴──→ Failed
//! ```
//!
//! The source is fetched and decoded once up front; a source that cannot be
//! downloaded or decoded ends the run in `Failed` before any operation or
//! cleanup runs. Each operation then reopens the verified file, so it sees
//! the untouched original. Operations run one after another. A failing
//! operation is reported and the run moves on to the next one; a failed
//! publish is reported for that file only.
//!
//! Every output gets its own file name within a run. When a second operation
//! would default to a name an earlier one already took, its position in the
//! list is appended (`poster_resize_2.jpg`, `poster_3_0_0.jpg`). Explicit
//! `destination`s that collide fail the later operation.
//!
//! The `tile` operation does not go through the registry: the source is cut
//! into a grid, every cell is written as `<basename>_<row>_<col>.<ext>`, and
//! with `merge: true` the grid is reassembled into `<basename>_merged.<ext>`.
//!
//! Progress is reported as [`PipelineEvent`]s over an optional channel; the
//! CLI renders them with [`crate::output`].

use crate::config::WorkerConfig;
use crate::imaging::{
    EncodeOptions, ImageBackend, ImageHandle, ImagingError, RustBackend, TransformError,
    TransformRegistry, merge, tile, tile_filename, write_tiles,
};
use crate::operation::OperationDescriptor;
use crate::publish::{
    AssetOwner, BucketPublisher, PublishError, PublishedFile, Publisher, Removal, normalize_prefix,
};
use crate::source::{Downloader, SourceError, SourceProvider, source_filename};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

/// Errors that abort the whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that fail a single operation.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Imaging(#[from] ImagingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Downloading,
    Loading,
    Transforming,
    PostProcessing,
    Emitting,
    Publishing,
    Cleanup,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Downloading => "downloading",
            PipelineStage::Loading => "loading",
            PipelineStage::Transforming => "transforming",
            PipelineStage::PostProcessing => "post-processing",
            PipelineStage::Emitting => "emitting",
            PipelineStage::Publishing => "publishing",
            PipelineStage::Cleanup => "cleanup",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An operation failure and the stage it happened in.
#[derive(Error, Debug)]
#[error("{stage}: {error}")]
pub struct OperationFailure {
    pub stage: PipelineStage,
    pub error: OperationError,
}

fn at<E: Into<OperationError>>(stage: PipelineStage) -> impl FnOnce(E) -> OperationFailure {
    move |error| OperationFailure {
        stage,
        error: error.into(),
    }
}

/// A file written to the work directory.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedFile {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct OperationReport {
    /// 1-based position in the operation list.
    pub index: usize,
    pub op: String,
    pub outcome: Result<Vec<EmittedFile>, OperationFailure>,
}

#[derive(Debug)]
pub struct PublishFailure {
    pub path: PathBuf,
    pub target: String,
    pub error: PublishError,
}

#[derive(Debug)]
pub struct RunReport {
    pub source: PathBuf,
    pub operations: Vec<OperationReport>,
    pub published: Vec<PublishedFile>,
    pub publish_failures: Vec<PublishFailure>,
    /// `None` when cleanup was skipped.
    pub cleanup: Option<Removal>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.operations.iter().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.operations.len() - self.succeeded()
    }

    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.publish_failures.is_empty()
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    SourceReady {
        identifier: String,
        path: PathBuf,
    },
    OperationStarted {
        index: usize,
        op: String,
        params: String,
    },
    OperationSucceeded {
        index: usize,
        op: String,
        outputs: Vec<EmittedFile>,
    },
    OperationFailed {
        index: usize,
        op: String,
        params: String,
        stage: PipelineStage,
        error: String,
    },
    Published(PublishedFile),
    PublishFailed {
        path: PathBuf,
        target: String,
        error: String,
    },
    CleanedUp {
        key: String,
        removal: Removal,
    },
    CleanupFailed {
        key: String,
        error: String,
    },
    Finished {
        succeeded: usize,
        failed: usize,
        published: usize,
    },
    /// The run ended in [`PipelineStage::Failed`]; `stage` is where.
    Aborted {
        stage: PipelineStage,
        error: String,
    },
}

fn emit(progress: Option<&Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = progress {
        tx.send(event).ok();
    }
}

fn enter(stage: PipelineStage) {
    log::debug!("stage: {stage}");
}

fn abort(
    progress: Option<&Sender<PipelineEvent>>,
    stage: PipelineStage,
    error: impl Into<PipelineError>,
) -> PipelineError {
    let error = error.into();
    enter(PipelineStage::Failed);
    log::error!("run failed while {stage}: {error}");
    emit(
        progress,
        PipelineEvent::Aborted {
            stage,
            error: error.to_string(),
        },
    );
    error
}

/// Output file names taken so far in a run.
#[derive(Debug, Default)]
struct ClaimedNames(HashSet<String>);

impl ClaimedNames {
    fn is_taken(&self, filename: &str) -> bool {
        self.0.contains(filename)
    }

    fn claim(&mut self, filename: &str) -> Result<(), TransformError> {
        if self.0.insert(filename.to_string()) {
            Ok(())
        } else {
            Err(TransformError::InvalidParameter {
                parameter: "destination",
                reason: format!("{filename:?} is already written by an earlier operation"),
            })
        }
    }
}

/// Run `config` with the production collaborators.
///
/// With `disable_network` set the source must be local and nothing is
/// published or cleaned up.
pub fn run(
    config: &WorkerConfig,
    progress: Option<Sender<PipelineEvent>>,
) -> Result<RunReport, PipelineError> {
    let backend = RustBackend::new();
    let registry = TransformRegistry::builtin();
    let source = Downloader::new(config.disable_network);
    let publisher = (!config.disable_network).then(|| bucket_publisher(config));
    run_with(
        &backend,
        &registry,
        &source,
        publisher.as_ref().map(|p| p as &dyn Publisher),
        config,
        progress,
    )
}

/// Build the bucket publisher described by `config.publish`.
pub fn bucket_publisher(config: &WorkerConfig) -> BucketPublisher {
    let publisher = BucketPublisher::new(
        config.publish.bucket_dir.clone(),
        config.publish.public_base_url.clone(),
    );
    match &config.publish.ledger {
        Some(ledger) => publisher.with_ledger(
            ledger,
            AssetOwner::resolve(
                config.offer_id.as_deref(),
                config.change_request_id.as_deref(),
            ),
        ),
        None => publisher,
    }
}

/// Run the pipeline against explicit collaborators.
///
/// `publisher: None` skips publishing and cleanup.
pub fn run_with(
    backend: &impl ImageBackend,
    registry: &TransformRegistry,
    source: &impl SourceProvider,
    publisher: Option<&dyn Publisher>,
    config: &WorkerConfig,
    progress: Option<Sender<PipelineEvent>>,
) -> Result<RunReport, PipelineError> {
    let progress = progress.as_ref();
    let identifier = config.source_image_url.as_deref().unwrap_or_default();
    enter(PipelineStage::Idle);

    enter(PipelineStage::Downloading);
    let source_path = source
        .fetch(identifier, &config.work_dir)
        .map_err(|e| abort(progress, PipelineStage::Downloading, e))?;

    enter(PipelineStage::Loading);
    if let Err(e) = backend.open(&source_path) {
        return Err(abort(
            progress,
            PipelineStage::Loading,
            SourceError::unavailable(identifier, e),
        ));
    }
    emit(
        progress,
        PipelineEvent::SourceReady {
            identifier: identifier.to_string(),
            path: source_path.clone(),
        },
    );

    let output_dir = config.work_dir.join("output");
    std::fs::create_dir_all(&output_dir)
        .map_err(|e| abort(progress, PipelineStage::Emitting, e))?;
    let source_name = source_filename(identifier);

    let mut report = RunReport {
        source: source_path.clone(),
        operations: Vec::with_capacity(config.operations.len()),
        published: Vec::new(),
        publish_failures: Vec::new(),
        cleanup: None,
    };
    let mut claimed = ClaimedNames::default();

    for (offset, descriptor) in config.operations.iter().enumerate() {
        let index = offset + 1;
        let params = descriptor.describe();
        log::info!("operation {index}: {params}");
        emit(
            progress,
            PipelineEvent::OperationStarted {
                index,
                op: descriptor.op.clone(),
                params: params.clone(),
            },
        );

        let outcome = run_operation(
            backend,
            registry,
            descriptor,
            &source_path,
            source_name,
            &output_dir,
            Emission {
                index,
                claimed: &mut claimed,
            },
        );

        match &outcome {
            Ok(outputs) => {
                emit(
                    progress,
                    PipelineEvent::OperationSucceeded {
                        index,
                        op: descriptor.op.clone(),
                        outputs: outputs.clone(),
                    },
                );
                if let Some(publisher) = publisher {
                    enter(PipelineStage::Publishing);
                    for output in outputs {
                        publish_one(publisher, descriptor, output, &mut report, progress);
                    }
                }
            }
            Err(failure) => {
                log::warn!("operation {index} ({}) failed at {failure}", descriptor.op);
                emit(
                    progress,
                    PipelineEvent::OperationFailed {
                        index,
                        op: descriptor.op.clone(),
                        params,
                        stage: failure.stage,
                        error: failure.error.to_string(),
                    },
                );
            }
        }

        report.operations.push(OperationReport {
            index,
            op: descriptor.op.clone(),
            outcome,
        });
    }

    if let (Some(publisher), Some(key)) = (publisher, config.source_image_keypath.as_deref()) {
        enter(PipelineStage::Cleanup);
        match publisher.remove(key) {
            Ok(removal) => {
                report.cleanup = Some(removal);
                emit(
                    progress,
                    PipelineEvent::CleanedUp {
                        key: key.to_string(),
                        removal,
                    },
                );
            }
            Err(e) => emit(
                progress,
                PipelineEvent::CleanupFailed {
                    key: key.to_string(),
                    error: e.to_string(),
                },
            ),
        }
    }

    enter(PipelineStage::Done);
    emit(
        progress,
        PipelineEvent::Finished {
            succeeded: report.succeeded(),
            failed: report.failed(),
            published: report.published.len(),
        },
    );
    Ok(report)
}

/// Static checks that need no pixels: known op names, parseable output
/// directives, valid tile grids. Returns `(index, error)` per bad operation.
pub fn check_operations(
    registry: &TransformRegistry,
    operations: &[OperationDescriptor],
) -> Vec<(usize, TransformError)> {
    operations
        .iter()
        .enumerate()
        .filter_map(|(offset, descriptor)| {
            let dispatch = if descriptor.is_tile() {
                descriptor.grid().map(|_| ())
            } else {
                registry.resolve(&descriptor.op).map(|_| ())
            };
            dispatch
                .and_then(|_| descriptor.output_format(None).map(|_| ()))
                .and_then(|_| descriptor.quality().map(|_| ()))
                .err()
                .map(|e| (offset + 1, e))
        })
        .collect()
}

fn publish_one(
    publisher: &dyn Publisher,
    descriptor: &OperationDescriptor,
    output: &EmittedFile,
    report: &mut RunReport,
    progress: Option<&Sender<PipelineEvent>>,
) {
    let destination_path = descriptor.output.destination_path.as_deref();
    match publisher.publish(&output.path, destination_path, descriptor.version_label()) {
        Ok(file) => {
            emit(progress, PipelineEvent::Published(file.clone()));
            report.published.push(file);
        }
        Err(error) => {
            let filename = output
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = format!("{}{}", normalize_prefix(destination_path), filename);
            log::error!("publish of {} to {target} failed: {error}", output.path.display());
            emit(
                progress,
                PipelineEvent::PublishFailed {
                    path: output.path.clone(),
                    target: target.clone(),
                    error: error.to_string(),
                },
            );
            report.publish_failures.push(PublishFailure {
                path: output.path.clone(),
                target,
                error,
            });
        }
    }
}

/// Join a destination file name onto the output directory, refusing names
/// that are not a single path component.
fn output_path(output_dir: &Path, filename: &str) -> Result<PathBuf, TransformError> {
    let plain = Path::new(filename)
        .file_name()
        .is_some_and(|name| name == std::ffi::OsStr::new(filename));
    if !plain {
        return Err(TransformError::InvalidParameter {
            parameter: "destination",
            reason: format!("{filename:?} is not a plain file name"),
        });
    }
    Ok(output_dir.join(filename))
}

fn emitted(path: PathBuf, handle: &ImageHandle) -> EmittedFile {
    EmittedFile {
        path,
        width: handle.width(),
        height: handle.height(),
    }
}

fn post_process(
    descriptor: &OperationDescriptor,
    handle: ImageHandle,
) -> Result<(ImageHandle, EncodeOptions), OperationFailure> {
    enter(PipelineStage::PostProcessing);
    let format = descriptor
        .output_format(handle.source_format())
        .map_err(at(PipelineStage::PostProcessing))?;
    let quality = descriptor
        .quality()
        .map_err(at(PipelineStage::PostProcessing))?;
    let handle = if descriptor.strips_metadata() {
        handle.strip()
    } else {
        handle
    };
    Ok((handle, EncodeOptions { format, quality }))
}

/// Where an operation sits in the run, for picking unique output names.
struct Emission<'a> {
    index: usize,
    claimed: &'a mut ClaimedNames,
}

fn run_operation(
    backend: &impl ImageBackend,
    registry: &TransformRegistry,
    descriptor: &OperationDescriptor,
    source_path: &Path,
    source_name: &str,
    output_dir: &Path,
    emission: Emission<'_>,
) -> Result<Vec<EmittedFile>, OperationFailure> {
    if descriptor.is_tile() {
        return run_tile(backend, descriptor, source_path, source_name, output_dir, emission);
    }

    enter(PipelineStage::Loading);
    let handle = backend
        .open(source_path)
        .map_err(at(PipelineStage::Loading))?;

    enter(PipelineStage::Transforming);
    let handle = registry
        .apply(&descriptor.op, handle, &descriptor.params)
        .map_err(at(PipelineStage::Transforming))?;

    let (handle, options) = post_process(descriptor, handle)?;

    enter(PipelineStage::Emitting);
    let mut filename = descriptor.destination_filename(source_name, options.format, None);
    if descriptor.output.destination.is_none() && emission.claimed.is_taken(&filename) {
        filename =
            descriptor.destination_filename(source_name, options.format, Some(emission.index));
    }
    let path = output_path(output_dir, &filename).map_err(at(PipelineStage::Emitting))?;
    emission
        .claimed
        .claim(&filename)
        .map_err(at(PipelineStage::Emitting))?;
    backend
        .save(&handle, &path, &options)
        .map_err(at(PipelineStage::Emitting))?;
    Ok(vec![emitted(path, &handle)])
}

fn run_tile(
    backend: &impl ImageBackend,
    descriptor: &OperationDescriptor,
    source_path: &Path,
    source_name: &str,
    output_dir: &Path,
    emission: Emission<'_>,
) -> Result<Vec<EmittedFile>, OperationFailure> {
    let (columns, rows) = descriptor
        .grid()
        .map_err(at(PipelineStage::Transforming))?;

    enter(PipelineStage::Loading);
    let handle = backend
        .open(source_path)
        .map_err(at(PipelineStage::Loading))?;

    // Stripping before the split lets every tile inherit the decision.
    let (handle, options) = post_process(descriptor, handle)?;

    enter(PipelineStage::Transforming);
    let grid = tile(&handle, columns, rows).map_err(at(PipelineStage::Transforming))?;
    let merged = match descriptor.params.merge {
        Some(true) => Some(merge(columns, rows, &grid).map_err(at(PipelineStage::Transforming))?),
        _ => None,
    };

    enter(PipelineStage::Emitting);
    let extension = options.format.extension();
    let filenames = |basename: &str| -> Vec<String> {
        grid.iter()
            .map(|(col, row, _)| tile_filename(basename, row, col, extension))
            .chain(merged.is_some().then(|| format!("{basename}_merged.{extension}")))
            .collect()
    };
    let mut basename = descriptor.tile_basename(source_name, None);
    if descriptor.output.destination.is_none()
        && filenames(&basename).iter().any(|f| emission.claimed.is_taken(f))
    {
        basename = descriptor.tile_basename(source_name, Some(emission.index));
    }
    for filename in filenames(&basename) {
        output_path(output_dir, &filename).map_err(at(PipelineStage::Emitting))?;
        emission
            .claimed
            .claim(&filename)
            .map_err(at(PipelineStage::Emitting))?;
    }

    let written = write_tiles(backend, &grid, output_dir, &basename, &options)
        .map_err(at(PipelineStage::Emitting))?;
    let mut outputs: Vec<EmittedFile> = written
        .into_iter()
        .zip(grid.iter())
        .map(|(out, (_, _, cell))| emitted(out.path, cell))
        .collect();

    if let Some(merged) = merged {
        let filename = format!("{basename}_merged.{extension}");
        let path = output_path(output_dir, &filename).map_err(at(PipelineStage::Emitting))?;
        backend
            .save(&merged, &path, &options)
            .map_err(at(PipelineStage::Emitting))?;
        outputs.push(emitted(path, &merged));
    }
    Ok(outputs)
}

//! Production orchestration.
//!
//! [`ProductionRunner::run`] drives one volume end to end:
//!
//! 1. validate the configuration and discover inputs,
//! 2. pre-assign every Bates number ([`BatesAllocator`]),
//! 3. run the email family pass sequentially in Bates order,
//! 4. process files on a bounded rayon pool, one task per file,
//! 5. write the loadfile and page index from whatever was published,
//! 6. stamp images, if a stamper is configured,
//! 7. run the integrity battery and save its report.
//!
//! Numbers are fixed before step 4, so the artifacts do not depend on which task
//! finishes first. A failing file is reported and skipped; it never takes the run down.
//! When the run deadline passes, tasks that have not started yet skip themselves, the
//! runner stops waiting for the rest, and anything they finish later is not published.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use serde::{Deserialize, Serialize};

use crate::bates::{BatesAllocator, BatesFormat};
use crate::collaborators::{Deadline, Extractor, Rasterizer, Stamper, call_with_timeout};
use crate::config::ProductionConfig;
use crate::error::{Phase, ProductionError};
use crate::family::{EmailFamilies, FamilyResolver, file_name};
use crate::io::glob::discover_inputs;
use crate::io::layout::VolumeLayout;
use crate::io::loadfile::{LoadfileOptions, write_loadfile};
use crate::io::opt::write_opt;
use crate::metadata::FormatTag;
use crate::metrics::RunMetrics;
use crate::pages::{PageEntry, PageExpander, PageExpansion, PageJob};
use crate::record::{ProductionRecord, ProductionRecordBuilder, RecordInput, link_families};
use crate::stamp::{StampSummary, stamp_volume};
use crate::state::SharedState;
use crate::validation::{IntegrityReport, IntegrityValidator};

/// Why a file has no record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub phase: Phase,
    pub message: String,
}

/// Tally of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    /// Files not processed because the run deadline passed.
    pub skipped: usize,
    pub pages: usize,
    pub families: usize,
    pub elapsed: Duration,
    pub failures: Vec<FileFailure>,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub report: IntegrityReport,
    /// Records in BegBates order, as written to the loadfile.
    pub records: Vec<ProductionRecord>,
    /// Page entries grouped by document, as written to the page index.
    pub pages: Vec<PageEntry>,
    pub stamping: Option<StampSummary>,
    pub layout: VolumeLayout,
    pub metrics: Arc<RunMetrics>,
}

enum FileOutcome {
    Processed,
    Failed(FileFailure),
    Skipped,
}

/// Drives a production run with a given set of collaborators.
pub struct ProductionRunner {
    config: ProductionConfig,
    extractor: Arc<dyn Extractor>,
    rasterizer: Arc<dyn Rasterizer>,
    stamper: Option<Arc<dyn Stamper>>,
}

impl ProductionRunner {
    pub fn new(
        config: ProductionConfig,
        extractor: Arc<dyn Extractor>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        Self {
            config,
            extractor,
            rasterizer,
            stamper: None,
        }
    }

    /// Stamp every produced image after the artifacts are written.
    #[must_use]
    pub fn with_stamper(mut self, stamper: Arc<dyn Stamper>) -> Self {
        self.stamper = Some(stamper);
        self
    }

    pub fn config(&self) -> &ProductionConfig {
        &self.config
    }

    /// Produce every file under `input_dir` into `<output_dir>/<volume>`.
    ///
    /// # Errors
    ///
    /// Fails before any file is touched on a configuration error or a missing input
    /// directory, and afterwards only if an artifact cannot be written. Per-file
    /// failures are reported in [`RunSummary::failures`].
    pub fn run(&self, input_dir: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Result<RunOutput> {
        let input_dir = input_dir.as_ref();
        self.config.validate()?;
        let files = discover_inputs(input_dir)?;
        self.run_files(files, Some(input_dir), output_dir)
    }

    /// Produce an explicit list of files.
    ///
    /// `input_root`, when given, is stripped from each path for `Original FilePath`.
    ///
    /// # Errors
    ///
    /// See [`ProductionRunner::run`].
    pub fn run_files(
        &self,
        files: Vec<PathBuf>,
        input_root: Option<&Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<RunOutput> {
        self.config.validate()?;
        let processing = &self.config.processing;
        let metrics = Arc::new(RunMetrics::new());
        metrics.record_start();
        let started = Instant::now();
        let run_deadline = Deadline::after(processing.total_timeout());

        let layout = VolumeLayout::new(output_dir.as_ref(), self.config.volume_name.trim());
        layout.prepare()?;

        let allocator = BatesAllocator::assign(
            BatesFormat::from(&self.config.bates),
            self.config.bates.start,
            files,
        );
        let total = allocator.len();
        tracing::info!(
            volume = layout.volume(),
            files = total,
            workers = processing.workers(),
            "Starting production"
        );

        let state = Arc::new(SharedState::new());
        let resolver = FamilyResolver::new(processing.family_key_mode);
        let emails = if processing.email_family_grouping {
            let emails = resolver.resolve_emails(
                allocator.files(),
                &self.extractor,
                processing.family_pass_timeout(),
                state.families(),
            );
            tracing::info!(
                emails = emails.len(),
                families = emails.family_count(),
                fallbacks = emails.fallbacks,
                "Email family pass complete"
            );
            emails
        } else {
            EmailFamilies::default()
        };

        let ctx = Arc::new(TaskContext {
            config: self.config.clone(),
            input_root: input_root.map(Path::to_path_buf),
            layout: layout.clone(),
            allocator,
            emails,
            resolver,
            expander: PageExpander::from_config(processing),
            extractor: Arc::clone(&self.extractor),
            rasterizer: Arc::clone(&self.rasterizer),
            state: Arc::clone(&state),
            metrics: Arc::clone(&metrics),
            run_deadline,
            cutoff: AtomicBool::new(false),
        });

        let mut summary = dispatch(&ctx, processing.workers())?;
        summary.total = total;

        let mut records = state.records_sorted();
        link_families(&mut records);
        let pages = state.pages_sorted();

        let options = LoadfileOptions::from(&self.config.loadfile);
        write_loadfile(layout.loadfile_path(), &records, &options)
            .map_err(|e| e.context(ProductionError::Serialization("loadfile".into())))?;
        write_opt(layout.opt_path(), &pages)
            .map_err(|e| e.context(ProductionError::Serialization("page index".into())))?;

        let stamping = match &self.stamper {
            Some(stamper) => {
                let s = stamp_volume(&layout, stamper, &self.config.stamping)?;
                metrics.add_stamp_results(s.stamped as u64, s.failed as u64);
                Some(s)
            }
            None => None,
        };

        let report = IntegrityValidator::new(&layout, options).validate(&records);
        report.save_to_file(layout.report_path())?;

        metrics.record_end();
        metrics
            .save_to_file(layout.data_dir().join("run_metrics.json"))
            .context("save run metrics")?;

        summary.pages = pages.len();
        summary.families = state.families().len();
        summary.elapsed = started.elapsed();

        tracing::info!(
            total = summary.total,
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            pages = summary.pages,
            families = summary.families,
            integrity = report.passed(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Production complete"
        );

        Ok(RunOutput {
            summary,
            report,
            records,
            pages,
            stamping,
            layout,
            metrics,
        })
    }
}

/// Everything a task needs, shared by reference count.
struct TaskContext {
    config: ProductionConfig,
    input_root: Option<PathBuf>,
    layout: VolumeLayout,
    allocator: BatesAllocator,
    emails: EmailFamilies,
    resolver: FamilyResolver,
    expander: PageExpander,
    extractor: Arc<dyn Extractor>,
    rasterizer: Arc<dyn Rasterizer>,
    state: Arc<SharedState>,
    metrics: Arc<RunMetrics>,
    run_deadline: Deadline,
    cutoff: AtomicBool,
}

/// Spawn one task per file and collect outcomes until all report or the run deadline
/// passes.
fn dispatch(ctx: &Arc<TaskContext>, workers: usize) -> Result<RunSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("bates-worker-{i}"))
        .build()
        .context("build worker pool")?;

    let (tx, rx) = crossbeam_channel::unbounded::<(PathBuf, FileOutcome)>();
    for file in ctx.allocator.files() {
        let ctx = Arc::clone(ctx);
        let tx = tx.clone();
        let file = file.clone();
        pool.spawn(move || {
            let outcome = if ctx.cutoff.load(Ordering::SeqCst) || ctx.run_deadline.expired() {
                FileOutcome::Skipped
            } else {
                catch_unwind(AssertUnwindSafe(|| process_file(&ctx, &file))).unwrap_or_else(|_| {
                    tracing::error!(file = %file.display(), "Worker panicked");
                    FileOutcome::Failed(FileFailure {
                        file: file_name(&file),
                        phase: Phase::Extract,
                        message: "worker panicked".to_string(),
                    })
                })
            };
            // The receiver is gone once the run has been cut off.
            let _ = tx.send((file, outcome));
        });
    }
    drop(tx);

    let mut summary = RunSummary::default();
    let mut reported = 0;
    let expected = ctx.allocator.len();
    while reported < expected {
        match rx.recv_timeout(ctx.run_deadline.remaining()) {
            Ok((file, outcome)) => {
                reported += 1;
                match outcome {
                    FileOutcome::Processed => {
                        summary.processed += 1;
                        ctx.metrics.incr_processed();
                    }
                    FileOutcome::Skipped => {
                        summary.skipped += 1;
                        ctx.metrics.incr_skipped();
                        tracing::warn!(file = %file.display(), "Skipped, run deadline passed");
                    }
                    FileOutcome::Failed(failure) => {
                        summary.failed += 1;
                        ctx.metrics.incr_failed();
                        summary.failures.push(failure);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                ctx.cutoff.store(true, Ordering::SeqCst);
                let outstanding = expected - reported;
                tracing::error!(
                    outstanding,
                    "Run deadline passed, writing artifacts from completed files"
                );
                summary.skipped += outstanding;
                ctx.metrics.add_skipped(outstanding as u64);
                break;
            }
            Err(RecvTimeoutError::Disconnected) => {
                let lost = expected - reported;
                tracing::error!(lost, "Workers exited without reporting");
                summary.failed += lost;
                ctx.metrics.add_failed(lost as u64);
                break;
            }
        }
    }
    ctx.state.seal();

    summary.failures.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(summary)
}

fn process_file(ctx: &TaskContext, file: &Path) -> FileOutcome {
    let name = file_name(file);
    let processing = &ctx.config.processing;
    let bates = ctx.allocator.lookup(file);
    let deadline = Deadline::after(processing.file_timeout()).min(ctx.run_deadline);
    tracing::debug!(file = %name, bates = %bates, "Processing file");

    let fail = |phase: Phase, message: String| {
        tracing::error!(file = %name, bates = %bates, phase = %phase, error = %message, "File failed");
        FileOutcome::Failed(FileFailure {
            file: name.clone(),
            phase,
            message,
        })
    };

    let extracted = {
        let extractor = Arc::clone(&ctx.extractor);
        let path = file.to_path_buf();
        match call_with_timeout(
            Phase::Extract,
            &name,
            deadline.cap(processing.extract_timeout()),
            move || extractor.extract(&path),
        ) {
            Ok(doc) => doc,
            Err(e) => {
                if e.is_timeout() {
                    ctx.metrics.incr_timeouts();
                }
                return fail(Phase::Extract, e.to_string());
            }
        }
    };

    let family = ctx
        .resolver
        .resolve_file(file, &ctx.emails, ctx.state.families());

    let mut builder = ProductionRecordBuilder::new(&ctx.layout, &ctx.config.custodian);
    if let Some(root) = ctx.input_root.as_deref() {
        builder = builder.with_input_root(root);
    }
    let input = RecordInput {
        path: file,
        bates: bates.clone(),
        extracted: &extracted,
        family,
        page_count: None,
    };
    // Natives are stored before pages are rendered, so an image native that shares
    // its path with page 0 is replaced by the rendered page.
    let mut record = match builder.build(input) {
        Ok(record) => record,
        Err(e) => return fail(Phase::Store, format!("{e:#}")),
    };

    let format = FormatTag::from_path(file);
    let expansion = if format.is_paginated() {
        let job = PageJob {
            path: file,
            base: &bates,
            format,
            gap_after: ctx.allocator.gap_after(&bates),
        };
        match ctx.expander.expand(job, &ctx.rasterizer, &ctx.layout, &deadline) {
            Ok(expansion) => expansion,
            Err(e) => {
                if e.is_timeout() {
                    ctx.metrics.incr_timeouts();
                }
                tracing::warn!(
                    file = %name,
                    error = %e,
                    "Could not expand pages, producing without images"
                );
                PageExpansion::default()
            }
        }
    } else {
        PageExpansion::default()
    };
    ctx.metrics.add_failed_chunks(expansion.failed_chunks as u64);
    record.fill_page_count(expansion.page_count);

    if processing.advance_end_bates
        && let Some(last) = expansion.last_page.clone()
    {
        record.set_end_bates(last);
    }

    let pages = expansion.entries.len() as u64;
    if !ctx.state.publish(record, expansion.entries) {
        tracing::warn!(
            file = %name,
            bates = %bates,
            "Finished after the run deadline, not produced"
        );
        return FileOutcome::Skipped;
    }
    ctx.metrics.add_pages(pages);
    tracing::debug!(file = %name, bates = %bates, "File processed");
    FileOutcome::Processed
}

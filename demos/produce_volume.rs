//! Produce a volume from a folder of documents.
//!
//! Demonstrates:
//! - Loading a production configuration (or falling back to defaults)
//! - Plugging in collaborators: the filesystem extractor and a minimal PDF rasterizer
//! - Reading the run summary, integrity report, and metrics
//!
//! Run with: cargo run --example produce_volume -- <input_dir> <output_dir> [config.json]
//!
//! With no arguments, a small sample folder is generated in a temporary directory.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use ironbates::collaborators::{FsExtractor, RasterPage, Rasterizer};
use ironbates::config::ProductionConfig;
use ironbates::runner::ProductionRunner;
use ironbates::testing::InputFixture;
use regex::bytes::Regex;

static PAGE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Type\s*/Page[^s]").expect("valid page regex"));

/// Counts `/Type /Page` objects and emits a bare TIFF header per page.
///
/// Stands in for a real renderer so the demo runs without native libraries.
struct PageCountingRasterizer;

impl Rasterizer for PageCountingRasterizer {
    fn page_count(&self, path: &Path) -> Result<u32> {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        Ok(PAGE_OBJECT.find_iter(&bytes).count().max(1) as u32)
    }

    fn render(&self, _path: &Path, _dpi: u32, pages: Range<u32>) -> Result<Vec<RasterPage>> {
        Ok(pages
            .map(|_| RasterPage {
                bytes: b"II*\0".to_vec(),
            })
            .collect())
    }
}

fn sample_input() -> Result<InputFixture> {
    let pdf = "%PDF-1.4\n1 0 obj << /Type /Pages >>\n\
               2 0 obj << /Type /Page >>\n3 0 obj << /Type /Page >>\n4 0 obj << /Type /Page >>\n";
    InputFixture::new()?
        .file(
            "mail/kickoff.eml",
            "Subject: Project kickoff\nFrom: alice@example.com\nTo: bob@example.com\n\
             Date: Tue, 1 Jul 2003 10:52:37 +0200\nMessage-ID: <k1@example.com>\n\nSee attached.\n",
        )?
        .file(
            "mail/kickoff_reply.eml",
            "Subject: Project kickoff\nFrom: bob@example.com\n\nThanks!\n",
        )?
        .file("docs/contract_v1.pdf", pdf)?
        .file("docs/contract_v2.pdf", pdf)?
        .file("docs/notes.txt", "Meeting notes\n[REDACTED] figures below\n")
}

fn main() -> Result<()> {
    ironbates::init_tracing();
    println!("📦 Production Volume Example\n");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let sample;
    let (input, output): (PathBuf, PathBuf) = match args.as_slice() {
        [input, output, ..] => (input.into(), output.into()),
        _ => {
            sample = sample_input()?;
            println!("No input given, using a generated sample folder");
            (sample.input().to_path_buf(), sample.output().to_path_buf())
        }
    };
    let config = match args.get(2) {
        Some(path) => ProductionConfig::from_json_file(path)?,
        None => ProductionConfig {
            custodian: "Demo Custodian".to_string(),
            ..ProductionConfig::default()
        },
    };

    let runner = ProductionRunner::new(
        config,
        Arc::new(FsExtractor),
        Arc::new(PageCountingRasterizer),
    );
    let out = runner.run(&input, &output)?;

    println!("\n📊 Summary");
    println!("  files:     {}", out.summary.total);
    println!("  processed: {}", out.summary.processed);
    println!("  failed:    {}", out.summary.failed);
    println!("  pages:     {}", out.summary.pages);
    println!("  families:  {}", out.summary.families);
    for failure in &out.summary.failures {
        println!("  ✗ {} ({}): {}", failure.file, failure.phase, failure.message);
    }

    println!("\n🗂  Records");
    for record in &out.records {
        println!(
            "  {} {:<24} family={:<4} {}",
            record.beg_bates,
            record.file_name,
            record.family_id().map(|id| id.to_string()).unwrap_or_default(),
            record.doc_type.label()
        );
    }

    println!("\n✅ Integrity");
    for outcome in &out.report.checks {
        let mark = if outcome.passed { "✓" } else { "✗" };
        println!("  {mark} {:?} ({} issues)", outcome.check, outcome.issues.len());
    }

    out.metrics.print();
    println!("Loadfile:   {}", out.layout.loadfile_path().display());
    println!("Page index: {}", out.layout.opt_path().display());
    Ok(())
}

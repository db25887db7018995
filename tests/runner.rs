//! End-to-end production runs against fake collaborators.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ironbates::collaborators::Stamper;
use ironbates::error::{Phase, ProductionError};
use ironbates::io::{LoadfileOptions, read_loadfile, read_opt};
use ironbates::metadata::RawMetadata;
use ironbates::record::{LoadfileColumn, hash_file};
use ironbates::runner::ProductionRunner;
use ironbates::testing::*;
use ironbates::validation::Check;

fn runner(extractor: FakeExtractor, rasterizer: FakeRasterizer) -> ProductionRunner {
    ProductionRunner::new(
        test_config("ABC", 1000, 6),
        Arc::new(extractor),
        Arc::new(rasterizer),
    )
}

#[test]
fn test_three_file_volume() -> Result<()> {
    let fx = InputFixture::new()?
        .file("a.eml", "Subject: Hi\n\nbody")?
        .file("b.pdf", "%PDF-1.4")?
        .file("c.txt", "plain text")?;
    let extractor = FakeExtractor::new()
        .with_metadata(
            "a.eml",
            RawMetadata::new()
                .with("Subject", "Hi")
                .with("From", "alice@example.com")
                .with("Date", "2024-03-01T09:30:00Z"),
        )
        .with_content("c.txt", "plain text");

    let out = runner(extractor, FakeRasterizer::new()).run(fx.input(), fx.output())?;

    assert_eq!(out.summary.total, 3);
    assert_eq!(out.summary.processed, 3);
    assert_eq!(out.summary.failed, 0);
    assert_eq!(
        bates_map(&out.records),
        vec![
            ("ABC001000".to_string(), "a.eml".to_string()),
            ("ABC001001".to_string(), "b.pdf".to_string()),
            ("ABC001002".to_string(), "c.txt".to_string()),
        ]
    );
    assert_gapless(&out.records, 1000);
    assert_required_fields(&out.records);
    assert!(out.report.passed(), "{:#?}", out.report);

    let loadfile = read_loadfile(out.layout.loadfile_path(), &LoadfileOptions::default())?;
    assert_eq!(loadfile.header.len(), 40);
    assert_eq!(loadfile.rows.len(), 3);
    assert!(loadfile.rows.iter().all(|r| r.len() == 40));
    assert_eq!(loadfile.values(LoadfileColumn::From), vec!["alice@example.com", "", ""]);
    assert_eq!(loadfile.values(LoadfileColumn::DateSent), vec!["03/01/2024", "", ""]);
    assert_eq!(
        loadfile.values(LoadfileColumn::OriginalFilePath),
        vec!["a.eml", "b.pdf", "c.txt"]
    );
    assert_eq!(loadfile.values(LoadfileColumn::FamilyId), vec!["1", "", ""]);
    assert_eq!(
        loadfile.values(LoadfileColumn::ProductionVolume),
        vec!["TEST_VOL"; 3]
    );

    assert!(out.layout.root().join("NATIVES/0000/ABC001000.eml").is_file());
    assert!(out.layout.root().join("TEXT/0000/ABC001002.txt").is_file());
    assert!(out.layout.data_dir().join("run_metrics.json").is_file());
    assert_eq!(out.metrics.processed(), 3);
    Ok(())
}

#[test]
fn test_multi_page_document_gets_page_lines() -> Result<()> {
    let fx = InputFixture::new()?
        .file("a.eml", "x")?
        .file("b.pdf", "x")?
        .file("c.txt", "x")?
        .file("d.pdf", "x")?;
    let rasterizer = FakeRasterizer::new().with_pages("d.pdf", 3);

    let out = runner(FakeExtractor::new(), rasterizer).run(fx.input(), fx.output())?;

    let d = &out.records[3];
    assert_eq!(d.beg_bates.to_string(), "ABC001003");
    assert_eq!(d.end_bates.to_string(), "ABC001003");
    assert_eq!(d.metadata.get(ironbates::metadata::SchemaField::PageCount), Some("3"));

    let lines = read_opt(out.layout.opt_path())?;
    let d_lines: Vec<_> = lines.iter().filter(|l| l.bates.as_str() >= "ABC001003").collect();
    assert_eq!(d_lines.len(), 3);
    assert!(d_lines[0].first_page);
    assert_eq!(d_lines[0].page_count, Some(3));
    assert!(d_lines[1..].iter().all(|l| !l.first_page && l.page_count.is_none()));
    assert_eq!(
        std::fs::read_to_string(out.layout.opt_path())?
            .lines()
            .last()
            .unwrap(),
        "ABC001005,TEST_VOL,TEST_VOL/IMAGES/0000/ABC001005.tiff,,,"
    );
    assert_eq!(out.summary.pages, 4);
    assert!(out.report.passed(), "{:#?}", out.report);
    Ok(())
}

#[test]
fn test_overlapping_pages_are_reported_not_renumbered() -> Result<()> {
    let fx = InputFixture::new()?
        .file("a.pdf", "x")?
        .file("b.txt", "x")?
        .file("c.txt", "x")?;
    let rasterizer = FakeRasterizer::new().with_pages("a.pdf", 3);

    let out = runner(FakeExtractor::new(), rasterizer).run(fx.input(), fx.output())?;

    assert_gapless(&out.records, 1000);
    let page_index = out.report.outcome(Check::PageIndex).unwrap();
    assert!(!page_index.passed);
    assert_eq!(page_index.issues.len(), 2);
    assert!(page_index.issues[0].message.contains("b.txt"));
    Ok(())
}

#[test]
fn test_advance_end_bates() -> Result<()> {
    let fx = InputFixture::new()?.file("a.pdf", "x")?;
    let mut config = test_config("ABC", 1000, 6);
    config.processing.advance_end_bates = true;
    let runner = ProductionRunner::new(
        config,
        Arc::new(FakeExtractor::new()),
        Arc::new(FakeRasterizer::new().with_pages("a.pdf", 4)),
    );

    let out = runner.run(fx.input(), fx.output())?;
    assert_eq!(out.records[0].end_bates.to_string(), "ABC001003");
    Ok(())
}

#[test]
fn test_extractor_failure_is_reported_and_run_completes() -> Result<()> {
    let fx = InputFixture::new()?
        .file("a.txt", "x")?
        .file("b.pdf", "x")?
        .file("c.txt", "x")?;

    let out = runner(FakeExtractor::new().failing("b.pdf"), FakeRasterizer::new())
        .run(fx.input(), fx.output())?;

    assert_eq!(out.summary.processed, 2);
    assert_eq!(out.summary.failed, 1);
    assert_eq!(out.summary.failures[0].file, "b.pdf");
    assert_eq!(out.summary.failures[0].phase, Phase::Extract);
    assert_eq!(
        bates_map(&out.records),
        vec![
            ("ABC001000".to_string(), "a.txt".to_string()),
            ("ABC001002".to_string(), "c.txt".to_string()),
        ]
    );
    assert!(out.pages.is_empty());
    assert!(!out.report.outcome(Check::BatesSequence).unwrap().passed);
    assert!(out.layout.loadfile_path().is_file());
    assert_eq!(out.metrics.failed(), 1);
    Ok(())
}

#[test]
fn test_failed_chunk_keeps_the_record() -> Result<()> {
    let fx = InputFixture::new()?.file("big.pdf", "x")?;
    let rasterizer = FakeRasterizer::new()
        .with_pages("big.pdf", 7)
        .failing_page("big.pdf", 5);

    let out = runner(FakeExtractor::new(), rasterizer).run(fx.input(), fx.output())?;

    assert_eq!(out.summary.processed, 1);
    assert_eq!(out.pages.len(), 5);
    assert_eq!(out.metrics.failed_chunks(), 1);
    assert!(!out.report.outcome(Check::PageIndex).unwrap().passed);
    Ok(())
}

#[test]
fn test_worker_count_does_not_change_numbering() -> Result<()> {
    let mut fx = InputFixture::new()?;
    for i in 0..24 {
        let name = match i % 4 {
            0 => format!("Mail_{i:02}.eml"),
            1 => format!("scan_{i:02}.pdf"),
            2 => format!("memo_v{i}.docx"),
            _ => format!("notes{i:02}.txt"),
        };
        fx = fx.file(&format!("folder{}/{name}", i % 3), name.as_bytes())?;
    }

    let mut maps = Vec::new();
    for workers in [1, 4] {
        let mut config = test_config("ABC", 1000, 6);
        config.processing.max_workers = workers;
        let runner = ProductionRunner::new(
            config,
            Arc::new(FakeExtractor::new().stalling("scan_01.pdf", Duration::from_millis(50))),
            Arc::new(FakeRasterizer::new()),
        );
        let out = runner.run(fx.input(), fx.output())?;
        assert_eq!(out.summary.processed, 24);
        assert_gapless(&out.records, 1000);
        maps.push(bates_map(&out.records));
    }
    assert_eq!(maps[0], maps[1]);
    Ok(())
}

#[test]
fn test_email_thread_shares_family_and_attach_range() -> Result<()> {
    let fx = InputFixture::new()?
        .file("a.eml", "x")?
        .file("b.eml", "x")?
        .file("c.eml", "x")?;
    let extractor = FakeExtractor::new()
        .with_metadata("a.eml", RawMetadata::new().with("Thread-Index", "T1"))
        .with_metadata("b.eml", RawMetadata::new().with("Thread-Index", "T2"))
        .with_metadata("c.eml", RawMetadata::new().with("Thread-Index", "T1"));

    let out = runner(extractor, FakeRasterizer::new()).run(fx.input(), fx.output())?;

    let ids: Vec<Option<u64>> = out.records.iter().map(|r| r.family_id()).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(1)]);
    assert_eq!(out.records[0].beg_attach.as_deref(), Some("ABC001000"));
    assert_eq!(out.records[2].end_attach.as_deref(), Some("ABC001002"));
    assert_eq!(out.records[2].parent_id.as_deref(), Some("ABC001000"));
    assert_eq!(out.records[1].beg_attach, None);
    assert_eq!(out.summary.families, 2);
    Ok(())
}

#[test]
fn test_extraction_timeout_fails_only_that_file() -> Result<()> {
    let fx = InputFixture::new()?.file("a.txt", "x")?.file("slow.txt", "x")?;
    let mut config = test_config("ABC", 1000, 6);
    config.processing.timeout = 1;
    let runner = ProductionRunner::new(
        config,
        Arc::new(FakeExtractor::new().stalling("slow.txt", Duration::from_millis(2500))),
        Arc::new(FakeRasterizer::new()),
    );

    let out = runner.run(fx.input(), fx.output())?;

    assert_eq!(out.summary.processed, 1);
    assert_eq!(out.summary.failures.len(), 1);
    assert!(out.summary.failures[0].message.contains("timed out"));
    assert_eq!(out.metrics.timeouts(), 1);
    Ok(())
}

#[test]
fn test_run_deadline_writes_partial_volume() -> Result<()> {
    let fx = InputFixture::new()?
        .file("a.txt", "x")?
        .file("b.txt", "x")?
        .file("c.txt", "x")?;
    let mut config = test_config("ABC", 1000, 6);
    config.processing.max_workers = 1;
    config.processing.max_total_timeout = 1;
    let runner = ProductionRunner::new(
        config,
        Arc::new(FakeExtractor::new().stalling("a.txt", Duration::from_secs(3))),
        Arc::new(FakeRasterizer::new()),
    );

    let out = runner.run(fx.input(), fx.output())?;

    assert_eq!(out.summary.processed, 0);
    assert!(out.summary.skipped >= 2);
    assert_eq!(
        out.summary.processed + out.summary.failed + out.summary.skipped,
        out.summary.total
    );
    assert!(out.records.is_empty());
    let loadfile = read_loadfile(out.layout.loadfile_path(), &LoadfileOptions::default())?;
    assert_eq!(loadfile.header.len(), 40);
    assert!(loadfile.rows.is_empty());
    assert_eq!(out.metrics.processed(), out.summary.processed as u64);
    assert_eq!(out.metrics.failed(), out.summary.failed as u64);
    assert_eq!(out.metrics.skipped(), out.summary.skipped as u64);
    Ok(())
}

#[test]
fn test_stamping_pass_covers_pages_and_image_natives() -> Result<()> {
    let fx = InputFixture::new()?
        .file("a.pdf", "x")?
        .file("b.png", [0u8; 4])?
        .file("c.txt", "x")?;
    let stamper = Arc::new(FakeStamper::new());
    let dyn_stamper: Arc<dyn Stamper> = stamper.clone();
    let runner = runner(FakeExtractor::new(), FakeRasterizer::new().with_pages("a.pdf", 1))
        .with_stamper(dyn_stamper);

    let out = runner.run(fx.input(), fx.output())?;

    let stamping = out.stamping.unwrap();
    assert_eq!(stamping.stamped, 2);
    assert_eq!(stamping.failed, 0);
    let texts: Vec<String> = stamper.stamps().into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, vec!["ABC001000", "ABC001001"]);
    assert_eq!(out.metrics.stamped(), 2);
    Ok(())
}

#[test]
fn test_rerun_replaces_previous_volume() -> Result<()> {
    let fx = InputFixture::new()?.file("a.txt", "x")?.file("b.txt", "x")?;
    runner(FakeExtractor::new(), FakeRasterizer::new()).run(fx.input(), fx.output())?;
    std::fs::remove_file(fx.input().join("b.txt"))?;

    let out = runner(FakeExtractor::new(), FakeRasterizer::new()).run(fx.input(), fx.output())?;

    assert_eq!(out.records.len(), 1);
    assert!(!out.layout.root().join("TEXT/0000/ABC001001.txt").exists());
    Ok(())
}

#[test]
fn test_missing_input_dir_fails_before_output() -> Result<()> {
    let fx = InputFixture::new()?;
    let missing = fx.input().join("nope");

    let err = runner(FakeExtractor::new(), FakeRasterizer::new())
        .run(&missing, fx.output())
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ProductionError>(),
        Some(ProductionError::InputNotFound(_))
    ));
    assert!(!fx.output().join("TEST_VOL").exists());
    Ok(())
}

#[test]
fn test_invalid_config_fails_before_output() -> Result<()> {
    let fx = InputFixture::new()?.file("a.txt", "x")?;
    let mut config = test_config("ABC", 1000, 6);
    config.processing.pdf_chunk_size = 0;
    let runner = ProductionRunner::new(
        config,
        Arc::new(FakeExtractor::new()),
        Arc::new(FakeRasterizer::new()),
    );

    let err = runner.run(fx.input(), fx.output()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProductionError>(),
        Some(ProductionError::Config(_))
    ));
    assert!(!fx.output().join("TEST_VOL").exists());
    Ok(())
}

#[test]
fn test_empty_input_produces_empty_volume() -> Result<()> {
    let fx = InputFixture::new()?;
    let out = runner(FakeExtractor::new(), FakeRasterizer::new()).run(fx.input(), fx.output())?;
    assert_eq!(out.summary.total, 0);
    assert!(out.layout.loadfile_path().is_file());
    assert!(out.layout.opt_path().is_file());
    assert!(out.report.passed());
    Ok(())
}

#[test]
fn test_overlapping_page_index_ignores_completion_order() -> Result<()> {
    let produce = |stalled: &str| -> Result<(String, Vec<(String, bool)>)> {
        let fx = InputFixture::new()?.file("a.pdf", "x")?.file("b.pdf", "x")?;
        let mut config = test_config("ABC", 1000, 6);
        config.processing.max_workers = 2;
        let runner = ProductionRunner::new(
            config,
            Arc::new(FakeExtractor::new().stalling(stalled, Duration::from_millis(300))),
            Arc::new(FakeRasterizer::new().with_pages("a.pdf", 3)),
        );
        let out = runner.run(fx.input(), fx.output())?;
        let flags = read_opt(out.layout.opt_path())?
            .into_iter()
            .map(|l| (l.bates, l.first_page))
            .collect();
        Ok((std::fs::read_to_string(out.layout.opt_path())?, flags))
    };

    let (a_stalled, flags) = produce("a.pdf")?;
    let (b_stalled, _) = produce("b.pdf")?;

    assert_eq!(a_stalled, b_stalled);
    assert_eq!(
        flags,
        vec![
            ("ABC001000".to_string(), true),
            ("ABC001001".to_string(), false),
            ("ABC001002".to_string(), false),
            ("ABC001001".to_string(), true),
        ]
    );
    Ok(())
}

#[test]
fn test_multiline_subject_stays_on_one_row() -> Result<()> {
    let fx = InputFixture::new()?.file("a.eml", "x")?.file("b.txt", "x")?;
    let extractor = FakeExtractor::new().with_metadata(
        "a.eml",
        RawMetadata::new().with("Subject", "Line one\nLine two"),
    );

    let out = runner(extractor, FakeRasterizer::new()).run(fx.input(), fx.output())?;

    let loadfile = read_loadfile(out.layout.loadfile_path(), &LoadfileOptions::default())?;
    assert_eq!(loadfile.rows.len(), 2);
    assert!(loadfile.rows.iter().all(|r| r.len() == 40));
    assert_eq!(loadfile.values(LoadfileColumn::Subject), vec!["Line one®Line two", ""]);
    assert!(out.report.outcome(Check::LoadfileHeader).unwrap().passed);
    Ok(())
}

#[test]
fn test_tiff_native_is_replaced_by_rendered_first_page() -> Result<()> {
    let fx = InputFixture::new()?
        .file("a.TIF", "NATIVE-UPPER")?
        .file("scan.tiff", "NATIVE-MULTIFRAME")?;
    let rasterizer = FakeRasterizer::new()
        .with_pages("a.TIF", 1)
        .with_pages("scan.tiff", 3);

    let out = runner(FakeExtractor::new(), rasterizer).run(fx.input(), fx.output())?;

    let images = out.layout.images_dir().join("0000");
    assert_eq!(std::fs::read_to_string(images.join("ABC001000.tiff"))?, "a.TIF#0");
    assert!(!images.join("ABC001000.tif").exists());
    assert_eq!(std::fs::read_to_string(images.join("ABC001001.tiff"))?, "scan.tiff#0");
    assert_eq!(std::fs::read_to_string(images.join("ABC001002.tiff"))?, "scan.tiff#1");

    let upper = &out.records[0];
    assert_eq!(upper.extension, "TIF");
    assert_eq!(upper.native_location, "TEST_VOL/IMAGES/0000/ABC001000.tiff");
    assert_eq!(out.records[1].hash, hash_file(&fx.input().join("scan.tiff"))?);
    Ok(())
}

#[test]
fn test_page_count_failure_produces_record_without_pages() -> Result<()> {
    let fx = InputFixture::new()?.file("a.pdf", "PDF-NATIVE")?.file("b.txt", "x")?;
    let rasterizer = FakeRasterizer::new().failing_count("a.pdf");

    let out = runner(FakeExtractor::new(), rasterizer).run(fx.input(), fx.output())?;

    assert_eq!(out.summary.processed, 2);
    assert_eq!(out.summary.failed, 0);
    assert!(out.pages.is_empty());
    let a = &out.records[0];
    assert_eq!(a.file_name, "a.pdf");
    assert_eq!(a.metadata.get(ironbates::metadata::SchemaField::PageCount), None);
    assert_eq!(std::fs::read_to_string(out.layout.resolve(&a.native_location))?, "PDF-NATIVE");
    assert_eq!(out.metrics.processed(), 2);
    assert_eq!(out.metrics.failed(), 0);
    Ok(())
}

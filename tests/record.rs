//! Tests for record building and family linking.

use anyhow::Result;
use ironbates::bates::BatesFormat;
use ironbates::collaborators::ExtractedDocument;
use ironbates::family::FamilyAssignment;
use ironbates::io::VolumeLayout;
use ironbates::metadata::{RawMetadata, SchemaField};
use ironbates::record::{
    DocType, LoadfileColumn, NO_TEXT, ProductionRecordBuilder, RecordInput, RedactionType,
    hash_file, link_families,
};
use ironbates::testing::InputFixture;
use ironbates::validation::Validate;

#[test]
fn test_build_stores_native_and_text() -> Result<()> {
    let fx = InputFixture::new()?;
    let path = fx.write("mail/hello.txt", "hello")?;
    let layout = VolumeLayout::new(fx.output(), "VOL001");
    layout.prepare()?;

    let extracted = ExtractedDocument {
        metadata: RawMetadata::new(),
        content: Some("\n\nhello body\r\n".to_string()),
    };
    let record = ProductionRecordBuilder::new(&layout, "Jane Doe")
        .with_input_root(fx.input())
        .build(RecordInput {
            path: &path,
            bates: BatesFormat::new("ABC", 6).number(1000),
            extracted: &extracted,
            family: None,
            page_count: None,
        })?;

    assert_eq!(record.beg_bates, record.end_bates);
    assert_eq!(
        record.hash,
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(record.native_location, "VOL001/NATIVES/0000/ABC001000.txt");
    assert_eq!(record.text_location, "VOL001/TEXT/0000/ABC001000.txt");
    assert_eq!(record.original_path, "mail/hello.txt");
    assert_eq!(record.doc_type, DocType::TextDocument);
    assert_eq!(record.field(LoadfileColumn::Custodian).as_deref(), Some("Jane Doe"));
    assert_eq!(record.field(LoadfileColumn::DocType).as_deref(), Some("Text Document"));
    assert_eq!(record.field(LoadfileColumn::ProductionVolume).as_deref(), Some("VOL001"));
    assert_eq!(record.field(LoadfileColumn::DuplicateCustodian), None);
    assert_eq!(record.row().len(), 40);

    assert_eq!(std::fs::read_to_string(layout.resolve(&record.native_location))?, "hello");
    assert_eq!(
        std::fs::read_to_string(layout.resolve(&record.text_location))?,
        "hello body"
    );
    assert!(record.validate().is_ok());
    Ok(())
}

#[test]
fn test_missing_text_writes_placeholder() -> Result<()> {
    let fx = InputFixture::new()?;
    let path = fx.write("scan.PNG", [0u8, 1, 2, 3])?;
    let layout = VolumeLayout::new(fx.output(), "VOL001");
    layout.prepare()?;

    let record = ProductionRecordBuilder::new(&layout, "C").build(RecordInput {
        path: &path,
        bates: BatesFormat::new("ABC", 6).number(7),
        extracted: &ExtractedDocument::default(),
        family: None,
        page_count: None,
    })?;

    assert_eq!(record.native_location, "VOL001/IMAGES/0000/ABC000007.png");
    assert_eq!(record.extension, "PNG");
    assert_eq!(record.doc_type, DocType::Image);
    assert_eq!(std::fs::read_to_string(layout.resolve(&record.text_location))?, NO_TEXT);
    assert_eq!(hash_file(&path)?, record.hash);
    Ok(())
}

#[test]
fn test_page_count_and_name_tokens_fill_metadata() -> Result<()> {
    let fx = InputFixture::new()?;
    let path = fx.write("Privileged_Confidential_memo.pdf", "%PDF")?;
    let layout = VolumeLayout::new(fx.output(), "VOL001");
    layout.prepare()?;

    let record = ProductionRecordBuilder::new(&layout, "C").build(RecordInput {
        path: &path,
        bates: BatesFormat::new("ABC", 6).number(1),
        extracted: &ExtractedDocument::default(),
        family: None,
        page_count: Some(4),
    })?;

    assert_eq!(record.metadata.get(SchemaField::PageCount), Some("4"));
    assert_eq!(record.metadata.get(SchemaField::Confidentiality), Some("Confidential"));
    assert_eq!(record.metadata.get(SchemaField::Privilege), Some("Privileged"));
    assert_eq!(record.redaction, RedactionType::Privileged);
    Ok(())
}

#[test]
fn test_extractor_page_count_wins() -> Result<()> {
    let fx = InputFixture::new()?;
    let path = fx.write("a.pdf", "%PDF")?;
    let layout = VolumeLayout::new(fx.output(), "VOL001");
    layout.prepare()?;

    let extracted = ExtractedDocument {
        metadata: RawMetadata::new().with("xmpTPg:NPages", "9"),
        content: None,
    };
    let record = ProductionRecordBuilder::new(&layout, "C").build(RecordInput {
        path: &path,
        bates: BatesFormat::new("ABC", 6).number(1),
        extracted: &extracted,
        family: None,
        page_count: Some(4),
    })?;
    assert_eq!(record.metadata.get(SchemaField::PageCount), Some("9"));
    Ok(())
}

#[test]
fn test_redaction_classification() {
    assert_eq!(RedactionType::classify("a_REDACTED.pdf", None), RedactionType::Redacted);
    assert_eq!(
        RedactionType::classify("a.txt", Some("the [REDACTED] figure")),
        RedactionType::Redacted
    );
    assert_eq!(RedactionType::classify("confidential.txt", None), RedactionType::Confidential);
    assert_eq!(RedactionType::classify("a.txt", Some("plain")), RedactionType::None);
}

#[test]
fn test_link_families_sets_attach_range_and_parent() -> Result<()> {
    let fx = InputFixture::new()?;
    let layout = VolumeLayout::new(fx.output(), "V");
    layout.prepare()?;
    let format = BatesFormat::new("F", 3);
    let family = |id: u64| {
        Some(FamilyAssignment {
            key: format!("K{id}"),
            id,
        })
    };

    let mut records = Vec::new();
    for (i, (name, fam)) in [("a.txt", family(1)), ("b.txt", None), ("c.txt", family(1)), ("d.txt", family(2))]
        .into_iter()
        .enumerate()
    {
        let path = fx.write(name, name)?;
        records.push(ProductionRecordBuilder::new(&layout, "C").build(RecordInput {
            path: &path,
            bates: format.number(i as u64 + 1),
            extracted: &ExtractedDocument::default(),
            family: fam,
            page_count: None,
        })?);
    }
    records[2].set_end_bates(format.number(9));

    link_families(&mut records);

    assert_eq!(records[0].beg_attach.as_deref(), Some("F001"));
    assert_eq!(records[0].end_attach.as_deref(), Some("F009"));
    assert_eq!(records[0].parent_id, None);
    assert_eq!(records[2].parent_id.as_deref(), Some("F001"));
    assert_eq!(records[2].field(LoadfileColumn::FamilyId).as_deref(), Some("1"));
    assert_eq!(records[1].beg_attach, None);
    assert_eq!(records[3].beg_attach, None, "single-member family has no range");
    Ok(())
}

#[test]
fn test_end_bates_never_lowered() {
    let format = BatesFormat::new("F", 3);
    let mut record = sample_record(format.number(5));
    record.set_end_bates(format.number(3));
    assert_eq!(record.end_bates.value(), 5);
    record.set_end_bates(format.number(8));
    assert_eq!(record.end_bates.value(), 8);
}

fn sample_record(bates: ironbates::bates::BatesNumber) -> ironbates::record::ProductionRecord {
    ironbates::record::ProductionRecord {
        end_bates: bates.clone(),
        beg_bates: bates,
        hash: "h".into(),
        extension: "txt".into(),
        file_name: "a.txt".into(),
        native_location: "V/NATIVES/0000/a.txt".into(),
        text_location: "V/TEXT/0000/a.txt".into(),
        beg_attach: None,
        end_attach: None,
        custodian: String::new(),
        original_path: "a.txt".into(),
        metadata: ironbates::metadata::NormalizedMetadata::empty(),
        redaction: RedactionType::None,
        doc_type: DocType::TextDocument,
        family: None,
        parent_id: None,
        volume: "V".into(),
    }
}

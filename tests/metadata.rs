//! Tests for metadata normalization.

use ironbates::metadata::{
    FieldSource, FormatTag, MetaValue, RawMetadata, SchemaField, field_source, normalize,
    parse_timestamp,
};

#[test]
fn test_pdf_fields_map_through_the_table() {
    let raw = RawMetadata::new()
        .with("meta:author", "J. Smith")
        .with("title", "Quarterly Report")
        .with("Creation-Date", "2023-04-05T10:11:12.345")
        .with("xmpTPg:NPages", "3")
        .with("From", "ignored@example.com");
    let meta = normalize(FormatTag::Pdf, &raw);

    assert_eq!(meta.get(SchemaField::Author), Some("J. Smith"));
    assert_eq!(meta.get(SchemaField::Title), Some("Quarterly Report"));
    assert_eq!(meta.get(SchemaField::DateCreated), Some("04/05/2023"));
    assert_eq!(meta.get(SchemaField::TimeCreated), Some("10:11:12"));
    assert_eq!(meta.get(SchemaField::PageCount), Some("3"));
    assert_eq!(meta.get(SchemaField::From), None);
}

#[test]
fn test_every_field_present_even_when_unmapped() {
    let meta = normalize(FormatTag::Other, &RawMetadata::new());
    assert_eq!(meta.len(), SchemaField::ALL.len());
    for field in SchemaField::ALL {
        assert!(meta.contains(field), "{field:?} missing");
        assert_eq!(meta.get(field), None);
    }
}

#[test]
fn test_email_date_header_feeds_sent_and_received() {
    let raw = RawMetadata::new()
        .with("Date", "Tue, 1 Jul 2003 10:52:37 +0200")
        .with("From", "alice@example.com")
        .with("Subject", "Lunch");
    let meta = normalize(FormatTag::Eml, &raw);

    assert_eq!(meta.get(SchemaField::DateSent), Some("07/01/2003"));
    assert_eq!(meta.get(SchemaField::TimeSent), Some("08:52:37"));
    assert_eq!(meta.get(SchemaField::DateReceived), Some("07/01/2003"));
    assert_eq!(meta.get(SchemaField::Author), Some("alice@example.com"));
    assert_eq!(meta.get(SchemaField::Title), Some("Lunch"));
}

#[test]
fn test_list_values_join_for_text_and_take_first_for_dates() {
    let raw = RawMetadata::new()
        .with("To", vec!["a@x.com".to_string(), "b@x.com".to_string()])
        .with(
            "Date",
            vec!["2024-02-29T23:59:59Z".to_string(), "garbage".to_string()],
        );
    let meta = normalize(FormatTag::Msg, &raw);

    assert_eq!(meta.get(SchemaField::To), Some("a@x.com; b@x.com"));
    assert_eq!(meta.get(SchemaField::DateSent), Some("02/29/2024"));
}

#[test]
fn test_unparseable_dates_are_empty() {
    let raw = RawMetadata::new()
        .with("Creation-Date", "last tuesday")
        .with("Last-Modified", "");
    let meta = normalize(FormatTag::Word, &raw);
    assert_eq!(meta.get(SchemaField::DateCreated), None);
    assert_eq!(meta.get(SchemaField::TimeCreated), None);
    assert_eq!(meta.get(SchemaField::DateLastModified), None);
}

#[test]
fn test_timestamp_offsets_convert_to_utc() {
    let parts = parse_timestamp(&MetaValue::from("2023-01-01T23:30:00-02:00")).unwrap();
    assert_eq!(parts.date, "01/02/2023");
    assert_eq!(parts.time, "01:30:00");

    let parts = parse_timestamp(&MetaValue::from("2023-06-15T08:00:00")).unwrap();
    assert_eq!((parts.date.as_str(), parts.time.as_str()), ("06/15/2023", "08:00:00"));
}

#[test]
fn test_any_format_fields() {
    for tag in [FormatTag::Pdf, FormatTag::Spreadsheet, FormatTag::Other] {
        assert_eq!(
            field_source(SchemaField::Confidentiality, tag),
            FieldSource::AnyFormat("Confidentiality")
        );
    }
    assert_eq!(
        field_source(SchemaField::PageCount, FormatTag::Presentation),
        FieldSource::Key("Slide Count")
    );
    assert_eq!(field_source(SchemaField::Bcc, FormatTag::Pdf), FieldSource::Unmapped);
}

#[test]
fn test_format_tags() {
    assert_eq!(FormatTag::from_extension(".PDF"), FormatTag::Pdf);
    assert_eq!(FormatTag::from_extension("tif"), FormatTag::Tiff);
    assert!(FormatTag::from_extension("msg").is_email());
    assert!(FormatTag::Tiff.is_paginated());
    assert!(!FormatTag::Word.is_paginated());
}

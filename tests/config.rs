//! Tests for configuration loading and validation.

use anyhow::Result;
use ironbates::config::{FamilyKeyMode, HexByte, ProductionConfig, StampPosition, TextEncoding};
use ironbates::error::ProductionError;
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let config = ProductionConfig::default();
    assert_eq!(config.loadfile.delimiter, HexByte(0x14));
    assert_eq!(config.loadfile.wrapper.as_char(), 'þ');
    assert_eq!(config.loadfile.newline.as_char(), '®');
    assert_eq!(config.processing.pdf_chunk_size, 5);
    assert_eq!(config.processing.family_key_mode, FamilyKeyMode::Token { keyspace: 10_000 });
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_json_keeps_defaults() -> Result<()> {
    let config = ProductionConfig::from_json_str(
        r#"{
            "volume_name": "VOL9",
            "bates": { "prefix": "XYZ", "start": 500 },
            "loadfile": { "delimiter": "0x7C", "encoding": "latin-1" },
            "processing": { "family_key_mode": { "mode": "exact" } },
            "stamping": { "position": "top-left" }
        }"#,
    )?;
    assert_eq!(config.volume_name, "VOL9");
    assert_eq!(config.bates.prefix, "XYZ");
    assert_eq!(config.bates.start, 500);
    assert_eq!(config.bates.digits, 8);
    assert_eq!(config.loadfile.delimiter.as_char(), '|');
    assert_eq!(config.loadfile.wrapper, HexByte(0xFE));
    assert_eq!(config.loadfile.encoding, TextEncoding::Latin1);
    assert_eq!(config.processing.family_key_mode, FamilyKeyMode::Exact);
    assert_eq!(config.processing.max_workers, 4);
    assert_eq!(config.stamping.position, StampPosition::TopLeft);
    Ok(())
}

#[test]
fn test_save_and_reload() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("production.json");
    let mut config = ProductionConfig::default();
    config.custodian = "Legal Dept".into();
    config.processing.advance_end_bates = true;

    config.save_to_file(&path)?;
    let raw = std::fs::read_to_string(&path)?;
    assert!(raw.contains("\"0x14\""));
    assert_eq!(ProductionConfig::from_json_file(&path)?, config);
    Ok(())
}

#[test]
fn test_missing_file_gives_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let config = ProductionConfig::from_json_file(dir.path().join("nope.json"))?;
    assert_eq!(config, ProductionConfig::default());
    Ok(())
}

#[test]
fn test_malformed_file_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{ "loadfile": { "delimiter": "0xZZ" } }"#)?;
    assert!(ProductionConfig::from_json_file(&path).is_err());
    Ok(())
}

#[test]
fn test_validation_rejects_bad_values() {
    let check = |f: fn(&mut ProductionConfig)| {
        let mut config = ProductionConfig::default();
        f(&mut config);
        config.validate()
    };

    assert!(matches!(check(|c| c.volume_name = " ".into()), Err(ProductionError::Config(_))));
    assert!(check(|c| c.volume_name = "a/b".into()).is_err());
    assert!(check(|c| c.bates.prefix = "A,B".into()).is_err());
    assert!(check(|c| c.bates.digits = 0).is_err());
    assert!(check(|c| c.loadfile.wrapper = c.loadfile.delimiter).is_err());
    assert!(check(|c| c.loadfile.newline = c.loadfile.wrapper).is_err());
    assert!(check(|c| c.loadfile.newline = HexByte(b'\n')).is_err());
    assert!(check(|c| c.processing.pdf_chunk_size = 0).is_err());
    assert!(check(|c| c.processing.family_key_mode = FamilyKeyMode::Token { keyspace: 0 }).is_err());
    assert!(check(|c| c.bates.prefix = "VOL2-".into()).is_ok());
}

#[test]
fn test_hex_byte_parsing() -> Result<()> {
    assert_eq!("0x14".parse::<HexByte>()?, HexByte(0x14));
    assert_eq!("FE".parse::<HexByte>()?, HexByte(0xFE));
    assert_eq!(HexByte(0x7).to_string(), "0x07");
    assert!("0x100".parse::<HexByte>().is_err());
    Ok(())
}

#[test]
fn test_encodings() -> Result<()> {
    assert_eq!(TextEncoding::Latin1.encode("þé")?, vec![0xFE, 0xE9]);
    assert_eq!(TextEncoding::Latin1.decode(&[0xFE, 0xE9])?, "þé");
    assert!(TextEncoding::Latin1.encode("€").is_err());
    assert_eq!(TextEncoding::Utf8.encode("þ")?, vec![0xC3, 0xBE]);
    Ok(())
}

#[test]
fn test_workers_zero_means_cpu_count() {
    let mut config = ProductionConfig::default();
    config.processing.max_workers = 0;
    assert!(config.processing.workers() >= 1);
}

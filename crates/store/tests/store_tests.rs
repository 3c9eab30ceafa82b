//! Store integration tests across engines and formats

use anyhow::Result;
use chrono::{FixedOffset, TimeZone};
use codec::{AnyCodec, Codec, CodecConfig, Format, PrefixCheck, Timestamp};
use serde::{Deserialize, Serialize};
use store::{KvEngine, MemoryEngine, Record, SledEngine, Store, StoreConfig, StoreError};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    name: String,
    born: Timestamp,
    nicknames: Vec<String>,
}

impl Record for Person {
    const TYPE_NAME: &'static str = "Person";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersonX {
    label: String,
}

impl Record for PersonX {
    const TYPE_NAME: &'static str = "PersonX";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Car {
    plate: String,
}

impl Record for Car {
    const TYPE_NAME: &'static str = "Car";
}

fn config(format: Format) -> StoreConfig {
    StoreConfig {
        codec: CodecConfig { format },
        ..StoreConfig::default()
    }
}

fn person(name: &str, born_nanos: i64) -> Person {
    Person {
        name: name.to_string(),
        born: Timestamp::from_unix_nanos(born_nanos),
        nicknames: vec![name.to_lowercase()],
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_crud_every_format() -> Result<()> {
    init_tracing();
    for format in Format::ALL {
        let store = Store::open(MemoryEngine::new(), &config(format))?;
        assert_eq!(store.format(), format);

        let ada = person("Ada", -4_000_000_000_000_000_000);
        store.insert(&42u64, &ada)?;
        assert_eq!(store.get::<Person, _>(&42u64)?, ada);

        let err = store.insert(&42u64, &ada).unwrap_err();
        assert!(matches!(err, StoreError::KeyExists { type_name: "Person" }));

        let renamed = Person {
            name: "Ada L.".to_string(),
            ..ada.clone()
        };
        store.update(&42u64, &renamed)?;
        assert_eq!(store.get::<Person, _>(&42u64)?, renamed);

        store.upsert(&43u64, &ada)?;
        store.upsert(&43u64, &renamed)?;
        assert_eq!(store.count::<Person>()?, 2);

        store.delete::<Person, _>(&42u64)?;
        assert!(store.get::<Person, _>(&42u64).unwrap_err().is_not_found());
        assert!(store.delete::<Person, _>(&42u64).unwrap_err().is_not_found());
        assert_eq!(store.count::<Person>()?, 1);
    }
    Ok(())
}

#[test]
fn test_same_key_different_types_do_not_collide() -> Result<()> {
    let store = Store::open(MemoryEngine::new(), &StoreConfig::default())?;

    store.insert(&1u32, &person("Grace", 0))?;
    store.insert(
        &1u32,
        &Car {
            plate: "KH-001".to_string(),
        },
    )?;
    store.insert(
        &1u32,
        &PersonX {
            label: "shadow".to_string(),
        },
    )?;

    assert_eq!(store.get::<Person, _>(&1u32)?.name, "Grace");
    assert_eq!(store.get::<Car, _>(&1u32)?.plate, "KH-001");
    assert_eq!(store.get::<PersonX, _>(&1u32)?.label, "shadow");

    // "Person" and "PersonX" share leading bytes but not a prefix
    assert_eq!(store.count::<Person>()?, 1);
    assert_eq!(store.count::<PersonX>()?, 1);
    assert_eq!(store.count::<Car>()?, 1);
    Ok(())
}

#[test]
fn test_find_all_and_keys() -> Result<()> {
    for format in Format::ALL {
        let store = Store::open(MemoryEngine::new(), &config(format))?;
        for (id, name) in [(3u64, "Carol"), (1, "Alan"), (2, "Barbara")] {
            store.insert(&id, &person(name, id as i64 * 1_000))?;
        }
        store.insert(
            &1u64,
            &Car {
                plate: "not a person".to_string(),
            },
        )?;

        let mut all: Vec<(u64, Person)> = store.find_all::<Person, u64>()?;
        all.sort_by_key(|(id, _)| *id);
        let names: Vec<_> = all.iter().map(|(_, p)| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alan", "Barbara", "Carol"], "{}", format);
        assert_eq!(all[1].1.born, Timestamp::from_unix_nanos(2_000));

        let mut keys: Vec<u64> = store.keys::<Person, u64>()?;
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2, 3]);
    }
    Ok(())
}

#[test]
fn test_string_and_composite_keys() -> Result<()> {
    let store = Store::open(MemoryEngine::new(), &config(Format::Cbor))?;

    store.insert("ada@example.com", &person("Ada", 0))?;
    assert_eq!(store.get::<Person, _>("ada@example.com")?.name, "Ada");

    store.insert(
        &("eu", 7u16),
        &Car {
            plate: "EU-7".to_string(),
        },
    )?;
    let keys: Vec<(String, u16)> = store.keys::<Car, (String, u16)>()?;
    assert_eq!(keys, vec![("eu".to_string(), 7)]);
    Ok(())
}

#[test]
fn test_timestamp_offset_is_normalized() -> Result<()> {
    let store = Store::open(MemoryEngine::new(), &StoreConfig::default())?;

    let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
    let born = Timestamp::from(tokyo.with_ymd_and_hms(1990, 3, 1, 9, 0, 0).unwrap());
    let record = Person {
        name: "Kenji".to_string(),
        born,
        nicknames: vec![],
    };
    store.insert(&7u64, &record)?;

    let loaded = store.get::<Person, _>(&7u64)?;
    assert_eq!(loaded.born, born);
    assert_eq!(loaded.born.unix_nanos(), born.unix_nanos());
    assert_eq!(loaded.born.offset_seconds(), 0);
    Ok(())
}

#[test]
fn test_sled_store_persists_across_reopen() -> Result<()> {
    init_tracing();
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("records.db");

    {
        let store = Store::open_path(&path, &config(Format::Bincode))?;
        store.insert(&10u64, &person("Edsger", 1))?;
        store.flush()?;
    }

    let store = Store::open_path(&path, &config(Format::Bincode))?;
    assert_eq!(store.get::<Person, _>(&10u64)?.name, "Edsger");
    Ok(())
}

#[test]
fn test_sled_store_rejects_format_switch() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("records.db");

    {
        let store = Store::open_path(&path, &config(Format::MsgPack))?;
        store.insert(&10u64, &person("Barbara", 1))?;
        store.flush()?;
    }

    let err = Store::open_path(&path, &config(Format::Cbor)).err().unwrap();
    assert!(matches!(
        err,
        StoreError::FormatMismatch {
            configured: Format::Cbor,
            ..
        }
    ));
    assert!(err.to_string().contains("re-encode"));

    // The original format still opens
    let store = Store::open_path(&path, &config(Format::MsgPack))?;
    assert_eq!(store.count::<Person>()?, 1);
    Ok(())
}

#[test]
fn test_records_unreadable_under_other_format() -> Result<()> {
    // Raw records moved between engines bypass the format marker
    let source = Store::open(MemoryEngine::new(), &config(Format::MsgPack))?;
    source.insert(&5u64, &person("Alan", 5))?;

    let target = Store::open(MemoryEngine::new(), &config(Format::Bincode))?;
    let records = source.engine().scan_prefix(&codec::prefix("Person")?)?;
    assert_eq!(records.len(), 1);
    for (key, value) in records {
        assert!(target.codec().decode::<Person>(&value).is_err());
        target.engine().insert(&key, value)?;
    }

    assert!(target.find_all::<Person, u64>().is_err());
    Ok(())
}

#[test]
fn test_trusting_prefixes_on_shared_engine() -> Result<()> {
    let engine = SledEngine::temporary()?;
    let store = Store::with_codec(engine, AnyCodec::new(Format::MsgPack), PrefixCheck::Trust)?;

    store.insert(&1u64, &person("Ada", 0))?;
    assert_eq!(store.keys::<Person, u64>()?, vec![1]);
    assert_eq!(store.get::<Person, _>(&1u64)?.name, "Ada");
    Ok(())
}

#[test]
fn test_config_file_drives_store() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("store.toml");
    std::fs::write(&config_path, "[codec]\nformat = \"cbor\"\n")?;

    let config = StoreConfig::load(&config_path)?;
    let store = Store::open(MemoryEngine::new(), &config)?;
    assert_eq!(store.format(), Format::Cbor);

    store.insert(&1u8, &Car { plate: "C-1".to_string() })?;
    assert_eq!(store.get::<Car, _>(&1u8)?.plate, "C-1");
    Ok(())
}

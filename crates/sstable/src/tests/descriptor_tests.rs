use super::*;
use anyhow::Result;
use std::path::PathBuf;

#[test]
fn component_file_names() {
    let desc = Descriptor::new("/data/ks", "ks", "users", 7, true);
    assert_eq!(
        desc.filename_for(Component::Data),
        PathBuf::from("/data/ks/users-tmp-e-7-Data.db")
    );
    let published = desc.as_temporary(false);
    assert_eq!(
        published.filename_for(Component::PrimaryIndex),
        PathBuf::from("/data/ks/users-e-7-Index.db")
    );
    assert_eq!(published.filename_for(Component::Filter).file_name().unwrap(), "users-e-7-Filter.db");
    assert_eq!(
        published.filename_for(Component::Stats).file_name().unwrap(),
        "users-e-7-Statistics.db"
    );
    assert_eq!(desc.to_string(), "/data/ks/users-tmp-e-7");
}

#[test]
fn filenames_parse_back() -> Result<()> {
    let desc = Descriptor::new("/data/ks", "ks", "users", 42, true);
    for component in Component::ALL {
        for temporary in [true, false] {
            let d = desc.as_temporary(temporary);
            let (parsed, parsed_component) = Descriptor::from_filename(&d.filename_for(component))?;
            assert_eq!(parsed, d);
            assert_eq!(parsed_component, component);
        }
    }
    Ok(())
}

#[test]
fn keyspace_is_the_parent_directory() -> Result<()> {
    let (desc, component) = Descriptor::from_filename(std::path::Path::new("/var/lib/metrics/events-d-3-Index.db"))?;
    assert_eq!(desc.keyspace, "metrics");
    assert_eq!(desc.table, "events");
    assert_eq!(desc.version, "d");
    assert_eq!(desc.generation, 3);
    assert!(!desc.temporary);
    assert!(!desc.is_latest_version());
    assert_eq!(component, Component::PrimaryIndex);
    Ok(())
}

#[test]
fn malformed_names_are_rejected() {
    for name in [
        "users-e-7-Data.txt",
        "users-e-seven-Data.db",
        "users-e-7-Summary.db",
        "users-tmp-7-Data.db",
        "users-E-7-Data.db",
        "-e-7-Data.db",
        "users-x-tmp-e-7-Data.db",
        "Data.db",
    ] {
        let err = Descriptor::from_filename(&PathBuf::from("/ks").join(name)).unwrap_err();
        assert!(matches!(err, SSTableError::InvalidFilename(_)), "{name}");
    }
}

#[test]
fn row_size_width_depends_on_version() {
    let mut desc = Descriptor::new("/ks", "ks", "t", 1, false);
    assert!(desc.has_long_row_size());
    assert!(desc.is_latest_version());
    desc.version = "b".to_string();
    assert!(desc.has_long_row_size());
    desc.version = "a".to_string();
    assert!(!desc.has_long_row_size());
}

#[test]
fn components_for_lists_existing_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    assert!(components_for(&desc).is_empty());

    std::fs::write(desc.filename_for(Component::Data), b"")?;
    std::fs::write(desc.filename_for(Component::Filter), b"")?;
    let found: Vec<Component> = components_for(&desc).into_iter().collect();
    assert_eq!(found, vec![Component::Data, Component::Filter]);
    assert!(components_for(&desc.as_temporary(false)).is_empty());
    Ok(())
}

#[test]
fn component_display_drops_extension() {
    assert_eq!(Component::Data.to_string(), "Data");
    assert_eq!(Component::Stats.to_string(), "Statistics");
}

#[test]
fn table_names_must_round_trip() {
    assert!(Descriptor::new("/data/ks", "ks", "users", 1, true).validate().is_ok());
    assert!(Descriptor::new("/data/my-ks", "my-ks", "users", 1, true).validate().is_ok());
    for table in ["my-table", "", "a/b", "-"] {
        let err = Descriptor::new("/data/ks", "ks", table, 1, true).validate().unwrap_err();
        assert!(matches!(err, SSTableError::InvalidTableName(_)), "{table:?}");
    }
}

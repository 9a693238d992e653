use super::*;
use anyhow::Result;
use byteorder::{BigEndian, ReadBytesExt};
use std::fs;
use tempfile::tempdir;

#[test]
fn appended_rows_scan_back_in_order() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let keys = numbered_keys(50);

    let reader = write_rows(&desc, &keys, &test_config())?.close_and_open_reader()?;

    let mut scanned = Vec::new();
    for row in reader.scanner()? {
        let (header, body) = row?;
        let cf = ColumnFamily::deserialize(&mut body.as_slice())?;
        let expected = format!("value-of-{}", String::from_utf8_lossy(&header.key));
        assert_eq!(cf.get(b"value").map(|c| c.value.as_slice()), Some(expected.as_bytes()));
        scanned.push(header.key);
    }
    let expected: Vec<Vec<u8>> = keys.iter().map(|k| k.as_bytes().to_vec()).collect();
    assert_eq!(scanned, expected);
    Ok(())
}

#[test]
fn row_length_is_back_patched() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let mut cf = ColumnFamily::new();
    cf.add_column("a", "apple", 1);
    cf.add_column("b", "banana", 2);

    let mut writer = open_writer(&desc, 1, &test_config())?;
    writer.append(&key("fruit"), &cf)?;
    let end = writer.file_pointer();
    let reader = writer.close_and_open_reader()?;

    let bytes = fs::read(reader.descriptor().filename_for(Component::Data))?;
    assert_eq!(bytes.len() as u64, end);

    let mut input = bytes.as_slice();
    assert_eq!(read_short_bytes(&mut input)?, b"fruit");
    let row_len = input.read_i64::<BigEndian>()?;
    assert_eq!(row_len, (bytes.len() - 2 - 5 - 8) as i64);
    assert_eq!(input.len() as i64, row_len);
    assert_eq!(ColumnFamily::deserialize(&mut input)?, cf);
    Ok(())
}

#[test]
fn descending_key_is_rejected_without_side_effects() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let mut writer = open_writer(&desc, 2, &test_config())?;

    writer.append(&key("5"), &row("five"))?;
    let pointer = writer.file_pointer();

    let err = writer.append(&key("3"), &row("three")).unwrap_err();
    match err {
        SSTableError::OutOfOrder { last, current } => {
            assert_eq!(last.key(), b"5");
            assert_eq!(current.key(), b"3");
        }
        other => panic!("expected OutOfOrder, got {other:?}"),
    }
    assert_eq!(writer.file_pointer(), pointer);
    assert_eq!(writer.last_written_key().map(|k| k.key()), Some(&b"5"[..]));
    assert_eq!(writer.rows_written(), 1);

    let reader = writer.close_and_open_reader()?;
    assert_eq!(reader.estimated_keys(), 1);
    assert_eq!(read_index_file(reader.descriptor())?, vec![(b"5".to_vec(), 0)]);
    assert_eq!(scan_keys(reader.descriptor())?, vec![b"5".to_vec()]);

    // neither the summary nor the filter saw the rejected key
    let sampled: Vec<&[u8]> = reader.summary().entries().iter().map(|e| e.key.key()).collect();
    assert_eq!(sampled, vec![&b"5"[..]]);
    assert_eq!(reader.summary().key_count(), 1);
    let mut only_five = bloom::BloomFilterBuilder::new(2, test_config().bloom_fpr);
    only_five.insert(b"5");
    assert_eq!(reader.filter(), &only_five.build());
    Ok(())
}

#[test]
fn rejected_appends_leave_the_writer_usable() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let mut writer = open_writer(&desc, 3, &test_config())?;
    writer.append(&key("b"), &row("bee"))?;
    let pointer = writer.file_pointer();

    for (k, v) in [("a", "x"), ("", "x"), ("c", "")] {
        assert!(writer.append_value(&key(k), v.as_bytes()).is_err());
    }
    assert_eq!(writer.file_pointer(), pointer);

    writer.append_value(&key("c"), b"sea")?;
    let reader = writer.close_and_open_reader()?;
    assert_eq!(scan_keys(reader.descriptor())?, vec![b"b".to_vec(), b"c".to_vec()]);
    Ok(())
}

#[test]
fn equal_keys_are_accepted() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let mut writer = open_writer(&desc, 2, &test_config())?;
    writer.append(&key("dup"), &row("one"))?;
    writer.append(&key("dup"), &row("two"))?;
    assert_eq!(writer.rows_written(), 2);
    Ok(())
}

#[test]
fn empty_key_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let mut writer = open_writer(&desc, 1, &test_config())?;

    let err = writer.append(&key(""), &row("nothing")).unwrap_err();
    assert!(matches!(err, SSTableError::MissingKey));
    assert_eq!(writer.file_pointer(), 0);
    assert!(writer.last_written_key().is_none());
    Ok(())
}

#[test]
fn oversized_key_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let mut writer = open_writer(&desc, 1, &test_config())?;

    let long = ByteOrderedPartitioner.decorate_key(vec![b'k'; MAX_KEY_LEN + 1]);
    let err = writer.append(&long, &row("v")).unwrap_err();
    assert!(matches!(err, SSTableError::KeyTooLong(n) if n == MAX_KEY_LEN + 1));
    assert_eq!(writer.file_pointer(), 0);

    // the largest key that fits is fine
    let max = ByteOrderedPartitioner.decorate_key(vec![b'k'; MAX_KEY_LEN]);
    writer.append_value(&max, b"v")?;
    Ok(())
}

#[test]
fn empty_raw_value_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let mut writer = open_writer(&desc, 1, &test_config())?;

    let err = writer.append_value(&key("k"), b"").unwrap_err();
    assert!(matches!(err, SSTableError::EmptyValue));
    assert_eq!(writer.file_pointer(), 0);
    assert!(writer.last_written_key().is_none());
    Ok(())
}

#[test]
fn every_row_has_an_index_record_and_filter_hit() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let keys = numbered_keys(37);
    let reader = write_rows(&desc, &keys, &test_config())?.close_and_open_reader()?;

    let mut scanner = reader.scanner()?;
    let index = read_index_file(reader.descriptor())?;
    assert_eq!(index.len(), keys.len());
    for (k, (index_key, offset)) in keys.iter().zip(&index) {
        let header = scanner.next_header()?.expect("row for every index record");
        assert_eq!(index_key, k.as_bytes());
        assert_eq!(*offset, header.position);
        assert_eq!(reader.key_at(*offset)?, k.as_bytes());
        assert!(reader.may_contain(&key(k)));
    }
    assert!(scanner.next_header()?.is_none());
    Ok(())
}

#[test]
fn three_key_table_reopens_from_disk() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let mut writer = open_writer(&desc, 3, &test_config())?;
    for k in ["1", "2", "3"] {
        writer.append(&key(k), &row(k))?;
    }
    let published = writer.close_and_open_reader()?.descriptor().clone();

    let reader = SSTableReader::open(&published, metadata(), partitioner(), &test_config())?;
    assert_eq!(reader.estimated_keys(), 3);
    assert!(reader.may_contain(&key("2")));
    assert_eq!(reader.estimated_row_size().count(), 3);
    assert_eq!(reader.estimated_column_count().count(), 3);
    Ok(())
}

#[test]
fn statistics_count_every_row() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let keys = numbered_keys(120);
    let reader = write_rows(&desc, &keys, &test_config())?.close_and_open_reader()?;

    assert_eq!(reader.estimated_row_size().count(), 120);
    assert_eq!(reader.estimated_column_count().count(), 120);
    // one column per row
    assert_eq!(reader.estimated_column_count().buckets()[0], 120);

    let reopened = SSTableReader::open(reader.descriptor(), metadata(), partitioner(), &test_config())?;
    assert_eq!(reopened.estimated_row_size(), reader.estimated_row_size());
    assert_eq!(reopened.estimated_column_count(), reader.estimated_column_count());
    Ok(())
}

#[test]
fn append_variants_share_one_format() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let mut writer = open_writer(&desc, 3, &test_config())?;

    let precompacted = PrecompactedRow::new(key("a"), &row("alpha"))?;
    writer.append_row(&precompacted)?;
    writer.append(&key("b"), &row("alpha"))?;
    writer.append_value(&key("c"), precompacted.body())?;

    let reader = writer.close_and_open_reader()?;
    let bodies: Vec<Vec<u8>> = reader.scanner()?.map(|r| r.map(|(_, body)| body)).collect::<crate::Result<_>>()?;
    assert_eq!(bodies.len(), 3);
    assert!(bodies.iter().all(|b| b == precompacted.body()));

    // raw values have no known column count
    assert_eq!(reader.estimated_row_size().count(), 3);
    assert_eq!(reader.estimated_column_count().count(), 2);
    Ok(())
}

#[test]
fn publish_renames_every_component() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 7);
    let reader = write_rows(&desc, &numbered_keys(5), &test_config())?.close_and_open_reader()?;

    assert!(!reader.descriptor().temporary);
    assert_eq!(reader.descriptor().generation, 7);
    assert_eq!(reader.components().len(), Component::ALL.len());
    for component in Component::ALL {
        assert!(reader.descriptor().filename_for(component).exists());
        assert!(!desc.filename_for(component).exists(), "{component} left temporary");
    }
    assert!(components_for(&desc).is_empty());
    Ok(())
}

#[test]
fn close_without_publish_keeps_temporary_names() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let closed = write_rows(&desc, &numbered_keys(5), &test_config())?.close()?;

    assert_eq!(closed.descriptor(), &desc);
    assert_eq!(components_for(&desc), closed.components().clone());
    assert!(components_for(&desc.as_temporary(false)).is_empty());

    let reader = closed.publish(42)?;
    assert_eq!(reader.max_data_age(), 42);
    assert_eq!(components_for(reader.descriptor()).len(), 4);
    Ok(())
}

#[test]
fn create_parses_descriptor_from_path() -> Result<()> {
    let dir = tempdir()?;
    let ks_dir = dir.path().join("inventory");
    fs::create_dir(&ks_dir)?;
    let path = ks_dir.join("items-tmp-e-3-Data.db");

    let mut writer = SSTableWriter::create(&path, 1, partitioner(), &test_config())?;
    assert_eq!(writer.descriptor().keyspace, "inventory");
    assert_eq!(writer.descriptor().table, "items");
    assert_eq!(writer.descriptor().generation, 3);
    assert!(writer.descriptor().temporary);

    writer.append_value(&key("k"), b"v")?;
    let reader = writer.close_and_open_reader()?;
    assert!(ks_dir.join("items-e-3-Data.db").exists());
    assert_eq!(reader.metadata().keyspace, "inventory");
    Ok(())
}

#[test]
fn invalid_config_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let config = Config {
        index_interval: 0,
        ..test_config()
    };
    let err = open_writer(&desc, 1, &config).unwrap_err();
    assert!(matches!(err, SSTableError::Config(_)));
    assert!(!desc.filename_for(Component::Data).exists());
    Ok(())
}

#[test]
fn hash_partitioner_orders_by_token() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let hashed: Arc<dyn Partitioner> = Arc::new(HashPartitioner);
    let mut keys: Vec<DecoratedKey> = numbered_keys(20)
        .into_iter()
        .map(|k| hashed.decorate_key(k.into_bytes()))
        .collect();
    keys.sort();

    let mut writer = SSTableWriter::new(desc, keys.len() as u64, metadata(), hashed, &test_config())?;
    for k in &keys {
        writer.append_value(k, b"v")?;
    }
    let reader = writer.close_and_open_reader()?;
    let expected: Vec<Vec<u8>> = keys.into_iter().map(DecoratedKey::into_key).collect();
    assert_eq!(scan_keys(reader.descriptor())?, expected);
    Ok(())
}

#[test]
fn table_names_that_break_file_names_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    for table in ["my-table", "", "a/b"] {
        let desc = Descriptor::new(dir.path(), "ks", table, 1, true);
        let err = open_writer(&desc, 1, &test_config()).unwrap_err();
        assert!(matches!(err, SSTableError::InvalidTableName(ref t) if t == table), "{table:?}");
    }
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);

    let ok = Descriptor::new(dir.path(), "ks", "my_table", 1, true);
    drop(open_writer(&ok, 1, &test_config())?);
    Ok(())
}

#[test]
fn debug_output_describes_progress() -> Result<()> {
    let dir = tempdir()?;
    let desc = tmp_desc(dir.path(), 1);
    let writer = write_rows(&desc, &numbered_keys(2), &test_config())?;

    let debug = format!("{:?}", writer);
    assert!(debug.contains("SSTableWriter"));
    assert!(debug.contains("rows: 2"));
    assert!(debug.contains("users-tmp-e-1"));
    Ok(())
}

//! Point operations, batches and iteration on the default family.

mod common;

use chainkv::{Code, Db, Error, Options, Status, WriteBatch};
use common::{TestDb, collect_backward, collect_forward};

#[test]
fn test_put_get_delete_scenario() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let db = &t.db;

    db.put("key1", "val1")?;
    db.put("key2", "val2")?;
    assert_eq!(db.get("key1")?, Some(b"val1".to_vec()));

    db.delete("key1")?;
    assert_eq!(db.get("key1")?, None);
    assert!(Status::from_lookup(&db.get("key1")).is_not_found());

    db.put("key1", "back")?;
    assert_eq!(db.get("key1")?, Some(b"back".to_vec()));
    assert_eq!(db.get("key2")?, Some(b"val2".to_vec()));
    Ok(())
}

#[test]
fn test_exist_tracks_live_records() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let db = &t.db;

    assert!(!db.exist("k")?);
    db.put("k", "v")?;
    assert!(db.exist("k")?);
    db.delete("k")?;
    assert!(!db.exist("k")?);
    Ok(())
}

#[test]
fn test_delete_absent_key_is_ok() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    t.db.delete("never-written")?;
    t.db.delete("never-written")?;
    assert!(Status::from_result(&t.db.delete("never-written")).is_ok());
    Ok(())
}

#[test]
fn test_overwrite_replaces_value() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    t.db.put("k", "one")?;
    t.db.put("k", "two")?;
    assert_eq!(t.db.get("k")?, Some(b"two".to_vec()));
    assert_eq!(t.db.len()?, 1);
    Ok(())
}

#[test]
fn test_binary_keys_and_values() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let key = [0u8, 255, 0, 1];
    let value = vec![0u8; 1024];
    t.db.put(key, &value)?;
    assert_eq!(t.db.get(key)?, Some(value));

    t.db.put("empty-value", "")?;
    assert_eq!(t.db.get("empty-value")?, Some(Vec::new()));
    Ok(())
}

#[test]
fn test_rejects_bad_keys() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let err = t.db.put("", "v").unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(Status::from(err).code(), Code::InvalidArgument);

    let big = vec![b'x'; Options::MAX_KEY_SIZE + 1];
    assert!(t.db.put(&big, "v").unwrap_err().is_invalid_argument());
    Ok(())
}

#[test]
fn test_oversized_key_reads_are_absent() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let huge = vec![b'x'; 70_000];
    assert_eq!(t.db.get(&huge)?, None);
    assert!(!t.db.exist(&huge)?);
    assert!(t.db.delete(&huge).unwrap_err().is_invalid_argument());

    let cf = t.db.default_column_family();
    let err = t.db.new_range_iterator_cf(&cf, "a", &huge).err();
    assert!(err.is_some_and(|e| e.is_invalid_argument()));
    Ok(())
}

#[test]
fn test_key_limit_field_is_clamped_on_open() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let mut options = Options::new(dir.path());
    options.max_key_size = 100_000;
    let db = Db::open_with(options)?;
    assert_eq!(db.options().max_key_size, Options::MAX_KEY_SIZE);

    let huge = vec![b'x'; 70_000];
    assert!(db.put(&huge, "v").unwrap_err().is_invalid_argument());
    assert_eq!(db.get(&huge)?, None);
    Ok(())
}

#[test]
fn test_small_key_limit_from_options() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let db = Db::open_with(Options::new(dir.path()).max_key_size(4))?;
    db.put("abcd", "ok")?;
    assert!(db.put("abcde", "no").unwrap_err().is_invalid_argument());
    Ok(())
}

#[test]
fn test_batch_applies_all_operations() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let db = &t.db;
    db.put("B", "old")?;

    let mut batch = WriteBatch::new();
    batch.put("A", "1");
    batch.delete("B");
    batch.put("C", "3");
    db.write(&batch)?;

    assert_eq!(db.get("A")?, Some(b"1".to_vec()));
    assert_eq!(db.get("B")?, None);
    assert_eq!(db.get("C")?, Some(b"3".to_vec()));
    Ok(())
}

#[test]
fn test_batch_last_write_wins() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let db = &t.db;

    let mut batch = WriteBatch::new();
    batch.put("k", "first");
    batch.put("k", "second");
    batch.put("gone", "x");
    batch.delete("gone");
    batch.delete("back");
    batch.put("back", "again");
    db.write(&batch)?;

    assert_eq!(db.get("k")?, Some(b"second".to_vec()));
    assert_eq!(db.get("gone")?, None);
    assert_eq!(db.get("back")?, Some(b"again".to_vec()));
    Ok(())
}

#[test]
fn test_batch_is_buffered_until_write() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let mut batch = WriteBatch::new();
    batch.put("pending", "v");
    assert_eq!(t.db.get("pending")?, None);

    batch.clear();
    assert!(batch.is_empty());
    t.db.write(&batch)?;
    assert_eq!(t.db.get("pending")?, None);

    batch.put("pending", "v2");
    t.db.write(&batch)?;
    assert_eq!(t.db.get("pending")?, Some(b"v2".to_vec()));
    Ok(())
}

#[test]
fn test_batch_with_bad_key_writes_nothing() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let mut batch = WriteBatch::new();
    batch.put("good", "v");
    batch.put("", "bad");
    assert!(t.db.write(&batch).unwrap_err().is_invalid_argument());
    assert_eq!(t.db.get("good")?, None);
    Ok(())
}

#[test]
fn test_iterator_orders_keys() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    for key in ["b", "d", "a", "c", "ab"] {
        t.db.put(key, key.to_uppercase())?;
    }

    let mut it = t.db.new_iterator()?;
    assert!(!it.valid());

    it.seek_to_first();
    assert_eq!(it.value(), Some(b"A".as_slice()));
    let forward = collect_forward(&mut it);
    assert_eq!(
        forward,
        vec![b"a".to_vec(), b"ab".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]
    );
    assert!(!it.valid());

    it.seek_to_last();
    let backward = collect_backward(&mut it);
    let mut reversed = forward.clone();
    reversed.reverse();
    assert_eq!(backward, reversed);
    Ok(())
}

#[test]
fn test_iterator_seek() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    for key in ["key1", "key3", "key5"] {
        t.db.put(key, "v")?;
    }
    let mut it = t.db.new_iterator()?;

    it.seek("key3");
    assert_eq!(it.key(), Some(b"key3".as_slice()));
    it.seek("key4");
    assert_eq!(it.key(), Some(b"key5".as_slice()));
    it.seek("a");
    assert_eq!(it.key(), Some(b"key1".as_slice()));
    it.seek("key6");
    assert!(!it.valid());
    assert_eq!(it.key(), None);
    assert_eq!(it.value(), None);
    Ok(())
}

#[test]
fn test_iterator_on_empty_store() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let mut it = t.db.new_iterator()?;
    it.seek_to_first();
    assert!(!it.valid());
    it.seek_to_last();
    assert!(!it.valid());
    assert!(!it.next());
    Ok(())
}

#[test]
fn test_iterator_snapshot_ignores_later_writes() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    t.db.put("a", "1")?;
    t.db.put("b", "2")?;

    let mut it = t.db.new_iterator()?;
    t.db.put("c", "3")?;
    t.db.delete("a")?;

    it.seek_to_first();
    assert_eq!(collect_forward(&mut it), vec![b"a".to_vec(), b"b".to_vec()]);
    Ok(())
}

#[test]
fn test_reopen_keeps_records() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    t.db.put("persisted", "yes")?;
    let t = t.reopen()?;
    assert_eq!(t.db.get("persisted")?, Some(b"yes".to_vec()));
    Ok(())
}

#[test]
fn test_open_missing_store_without_create() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let options = Options::new(dir.path().join("nope")).create_if_missing(false);
    let err = Db::open_with(options).err();
    assert!(matches!(err, Some(Error::NotInitialized(_))));
    Ok(())
}

//! Batch replay scenarios and behavior under concurrent callers.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chainkv::WriteBatch;
use common::TestDb;

#[test]
fn test_two_batch_replay() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let db = &t.db;

    let mut first = WriteBatch::new();
    first.put("k1", "v1");
    first.put("k2", "v2");
    first.put("k3", "v3");
    db.write(&first)?;

    let mut second = WriteBatch::new();
    second.delete("k1");
    second.put("k2", "u2");
    second.delete("k3");
    second.put("k4", "v4");
    db.write(&second)?;

    assert_eq!(db.get("k1")?, None);
    assert_eq!(db.get("k2")?, Some(b"u2".to_vec()));
    assert_eq!(db.get("k3")?, None);
    assert_eq!(db.get("k4")?, Some(b"v4".to_vec()));

    // Replaying the second batch changes nothing.
    db.write(&second)?;
    assert_eq!(db.len()?, 2);
    Ok(())
}

#[test]
fn test_readers_never_see_partial_batches() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let db = &t.db;
    let done = AtomicBool::new(false);
    let torn = AtomicUsize::new(0);

    std::thread::scope(|s| {
        s.spawn(|| {
            for round in 0..200u32 {
                let value = round.to_string();
                let mut batch = WriteBatch::new();
                batch.put("A", &value);
                batch.delete("B");
                batch.put("C", &value);
                if db.write(&batch).is_err() {
                    break;
                }
                let mut undo = WriteBatch::new();
                undo.delete("A");
                undo.put("B", &value);
                undo.delete("C");
                if db.write(&undo).is_err() {
                    break;
                }
            }
            done.store(true, Ordering::SeqCst);
        });

        s.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                let Ok(mut it) = db.new_iterator() else {
                    continue;
                };
                it.seek_to_first();
                let mut keys = Vec::new();
                while let Some(key) = it.key() {
                    keys.push(key.to_vec());
                    it.next();
                }
                let consistent = keys.is_empty()
                    || keys == vec![b"A".to_vec(), b"C".to_vec()]
                    || keys == vec![b"B".to_vec()];
                if !consistent {
                    torn.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
    });

    assert_eq!(torn.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_writers_on_different_families_both_land() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let db = &t.db;
    let left = db.create_column_family("left")?;
    let right = db.create_column_family("right")?;

    std::thread::scope(|s| {
        for cf in [&left, &right] {
            s.spawn(move || {
                for i in 0..100u32 {
                    let key = format!("key{:03}", i);
                    db.put_cf(cf, &key, cf.name()).ok();
                }
            });
        }
    });

    assert_eq!(db.len_cf(&left)?, 100);
    assert_eq!(db.len_cf(&right)?, 100);
    assert_eq!(db.get_cf(&right, "key042")?, Some(b"right".to_vec()));
    Ok(())
}

#[test]
fn test_map_batches_on_one_map_are_serialized() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let db = &t.db;
    db.init_map("counter")?;
    let finished = AtomicBool::new(false);

    std::thread::scope(|s| -> anyhow::Result<()> {
        let mut first = db.start_map_batch("counter")?;
        first.put("owner", "first")?;

        let waiter = s.spawn(|| -> anyhow::Result<bool> {
            let mut second = db.start_map_batch("counter")?;
            let first_was_done = finished.load(Ordering::SeqCst);
            second.put("owner", "second")?;
            second.sync()?;
            second.write()?;
            Ok(first_was_done)
        });

        std::thread::sleep(Duration::from_millis(50));
        first.sync()?;
        first.write()?;
        finished.store(true, Ordering::SeqCst);
        drop(first);

        let first_was_done = waiter
            .join()
            .map_err(|_| anyhow::anyhow!("waiter panicked"))??;
        assert!(first_was_done);
        Ok(())
    })?;

    let head = db.versions().map_head("counter")?;
    let history = db.versions().history(chainkv::ResourceKind::Map, "counter")?;
    assert_eq!(history.len(), 2);
    assert_eq!(history.first().copied(), head);
    assert_eq!(db.get_map("counter", "owner")?, Some(b"second".to_vec()));
    Ok(())
}

#[test]
fn test_concurrent_blob_puts_form_one_chain() -> anyhow::Result<()> {
    let t = TestDb::new()?;
    let db = &t.db;

    std::thread::scope(|s| {
        for writer in 0..4u32 {
            s.spawn(move || {
                for i in 0..10u32 {
                    db.put_blob("shared", format!("{}-{}", writer, i)).ok();
                }
            });
        }
    });

    let versions = db.versions();
    assert_eq!(versions.history(chainkv::ResourceKind::Blob, "shared")?.len(), 40);
    assert_eq!(versions.verify_history(chainkv::ResourceKind::Blob, "shared")?, 40);
    Ok(())
}

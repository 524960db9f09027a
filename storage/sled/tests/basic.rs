use recordlayer_core::kv::{Database, RangeOptions, Transaction};
use recordlayer_storage_sled::SledDatabase;

#[tokio::test]
async fn set_get_commit_roundtrip() -> recordlayer_core::Result<()> {
    let db = SledDatabase::temporary()?;

    let mut txn = db.begin().await?;
    txn.set(b"widget/1", b"gizmo");
    assert_eq!(txn.get(b"widget/1").await?, Some(b"gizmo".to_vec()));
    txn.commit().await?;

    let txn2 = db.begin().await?;
    assert_eq!(txn2.get(b"widget/1").await?, Some(b"gizmo".to_vec()));
    txn2.cancel().await;
    Ok(())
}

#[tokio::test]
async fn atomic_add_accumulates_across_commits() -> recordlayer_core::Result<()> {
    let db = SledDatabase::temporary()?;

    let mut txn = db.begin().await?;
    txn.atomic_add(b"counter", 5);
    txn.atomic_add(b"counter", -2);
    txn.commit().await?;

    let mut txn2 = db.begin().await?;
    txn2.atomic_add(b"counter", 10);
    let seen_before_commit = txn2.get(b"counter").await?.unwrap();
    assert_eq!(i64::from_le_bytes(seen_before_commit.try_into().unwrap()), 13);
    txn2.commit().await?;

    let txn3 = db.begin().await?;
    let v = txn3.get(b"counter").await?.unwrap();
    assert_eq!(i64::from_le_bytes(v.try_into().unwrap()), 13);
    txn3.cancel().await;
    Ok(())
}

#[tokio::test]
async fn clear_range_removes_only_the_targeted_span() -> recordlayer_core::Result<()> {
    let db = SledDatabase::temporary()?;

    let mut txn = db.begin().await?;
    for i in 0..5u8 {
        txn.set(&[b'k', i], b"v");
    }
    txn.commit().await?;

    let mut txn2 = db.begin().await?;
    txn2.clear_range(&[b'k', 1], &[b'k', 3]);
    txn2.commit().await?;

    let txn3 = db.begin().await?;
    let rows = txn3.get_range(&[b'k', 0], &[b'k', 255], RangeOptions::new()).await?;
    txn3.cancel().await;
    let remaining: Vec<u8> = rows.into_iter().map(|(k, _)| k[1]).collect();
    assert_eq!(remaining, vec![0, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn set_versionstamped_key_substitutes_a_real_versionstamp() -> recordlayer_core::Result<()> {
    let db = SledDatabase::temporary()?;
    let mut template = b"log/".to_vec();
    template.extend_from_slice(&recordlayer_tuple::Versionstamp::INCOMPLETE.0);

    let mut txn = db.begin().await?;
    txn.set_versionstamped_key(&template, b"entry");
    let vs = txn.commit().await?.expect("versionstamp assigned");
    assert!(!vs.is_incomplete());

    let txn2 = db.begin().await?;
    let (begin, end) = (b"log/".to_vec(), b"log0".to_vec());
    let rows = txn2.get_range(&begin, &end, RangeOptions::new()).await?;
    txn2.cancel().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, b"entry");
    Ok(())
}

#[tokio::test]
async fn cancel_discards_buffered_mutations() -> recordlayer_core::Result<()> {
    let db = SledDatabase::temporary()?;

    let mut txn = db.begin().await?;
    txn.set(b"ghost", b"value");
    txn.cancel().await;

    let txn2 = db.begin().await?;
    assert_eq!(txn2.get(b"ghost").await?, None);
    txn2.cancel().await;
    Ok(())
}

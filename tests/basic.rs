use syncmap_rs::SyncMap;

#[test]
fn test_store_load_delete_string() {
    let m: SyncMap<String, String> = SyncMap::new();
    assert_eq!(m.load("a"), None);

    m.store("a".to_string(), "1".to_string());
    assert_eq!(m.load("a"), Some("1".to_string()));

    m.store("b".to_string(), "2".to_string());
    assert_eq!(m.load("b"), Some("2".to_string()));

    // overwrite
    m.store("a".to_string(), "10".to_string());
    assert_eq!(m.load("a"), Some("10".to_string()));

    assert_eq!(m.load_and_delete("b"), Some("2".to_string()));
    assert_eq!(m.load("b"), None);
    assert_eq!(m.load_and_delete("b"), None);
}

#[test]
fn test_int_map() {
    let m: SyncMap<i32, i32> = SyncMap::new();
    m.store(1, 2);
    assert!(m.contains_key(&1));
    m.delete(&1);
    assert!(!m.contains_key(&1));

    let (v, loaded) = m.load_or_store(1, 2);
    assert!(!loaded);
    assert_eq!(v, 2);

    let (v, loaded) = m.load_or_store(1, 3);
    assert!(loaded);
    assert_eq!(v, 2);

    assert_eq!(m.load_and_delete(&1), Some(2));
    assert_eq!(m.load_and_delete(&1), None);
}

#[test]
fn test_delete_then_resurrect() {
    let m: SyncMap<u64, u64> = SyncMap::new();
    m.store(7, 1);
    m.delete(&7);
    m.store(7, 2);
    assert_eq!(m.load(&7), Some(2));

    // same sequence once the key lives in the snapshot
    m.range(|_, _| true);
    m.delete(&7);
    m.store(7, 3);
    assert_eq!(m.load(&7), Some(3));
}

#[test]
fn test_expunged_key_is_stored_again() {
    let m: SyncMap<u64, &'static str> = SyncMap::new();
    m.store(1, "one");
    m.store(2, "two");
    m.range(|_, _| true); // both keys now in the snapshot

    m.delete(&1);
    // A new key forks the overflow, expunging the now empty slot of key 1.
    m.store(3, "three");
    // Misses against the overflow promote it, leaving key 1 out of the snapshot.
    for _ in 0..4 {
        assert_eq!(m.load(&3), Some("three"));
    }
    assert_eq!(m.load(&1), None);

    m.store(1, "uno");
    assert_eq!(m.load(&1), Some("uno"));

    let (v, loaded) = m.load_or_store(1, "ein");
    assert_eq!((v, loaded), ("uno", true));
}

#[test]
fn test_load_or_store_on_expunged_slot() {
    let m: SyncMap<u64, u64> = SyncMap::new();
    m.store(1, 1);
    m.store(2, 2);
    m.range(|_, _| true);

    m.delete(&1);
    m.store(3, 3); // expunges key 1's slot

    assert_eq!(m.load_or_store(1, 10), (10, false));
    assert_eq!(m.load_or_store(1, 11), (10, true));
    assert_eq!(m.load(&1), Some(10));
}

#[test]
fn test_range_early_termination() {
    let m: SyncMap<i32, i32> = SyncMap::new();
    for i in 0..20 {
        m.store(i, i * 3);
    }

    let mut count = 0;
    m.range(|_, _| {
        count += 1;
        count < 5
    });
    assert_eq!(count, 5);
}

#[test]
fn test_range_skips_deleted() {
    let m: SyncMap<i32, String> = SyncMap::new();
    for i in 0..100 {
        m.store(i, format!("value_{}", i));
    }
    for i in (0..100).step_by(2) {
        m.delete(&i);
    }

    let mut keys = Vec::new();
    m.range(|k, v| {
        assert_eq!(v, &format!("value_{}", k));
        keys.push(*k);
        true
    });
    keys.sort();
    assert_eq!(keys, (1..100).step_by(2).collect::<Vec<_>>());
}

#[test]
fn test_iter_and_traits() {
    let m: SyncMap<i32, String> = (0..10).map(|i| (i, format!("v{}", i))).collect();

    let mut collected = m.iter().collect::<Vec<(i32, String)>>();
    collected.sort_by_key(|(k, _)| *k);
    assert_eq!(collected.len(), 10);
    for i in 0..10 {
        assert_eq!(collected[i as usize].0, i);
        assert_eq!(collected[i as usize].1, format!("v{}", i));
    }

    let mut m = m;
    m.extend((10..15).map(|i| (i, format!("v{}", i))));
    assert_eq!((&m).into_iter().count(), 15);

    let small: SyncMap<u8, u8> = SyncMap::default();
    small.store(1, 2);
    assert_eq!(format!("{:?}", small), "{1: 2}");
}

#[test]
fn test_custom_hasher() {
    use std::collections::hash_map::RandomState;

    let m: SyncMap<&str, usize, RandomState> = SyncMap::with_hasher(RandomState::new());
    m.store("x", 1);
    m.store("y", 2);
    assert_eq!(m.load("x"), Some(1));
    assert_eq!(m.load("y"), Some(2));
    assert_eq!(m.load("z"), None);
}

//! Versioned Registry Tests
//!
//! Concurrent writers and readers against one logical key:
//! - Upserts from many threads never lose a retained version
//! - Readers never observe an empty or torn entry
//! - Retention is deterministic regardless of insertion order

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use plughost_core::VersionedPluginRegistry;
use plughost_sdk::{PluginIdentity, PluginKey, Version};

fn id(minor: u64) -> PluginIdentity {
    PluginIdentity::new("Test", "Alpha", Version::new(1, minor, 0)).unwrap()
}

#[test]
fn test_concurrent_upserts_keep_every_version() {
    let registry: Arc<VersionedPluginRegistry<u64>> = Arc::new(VersionedPluginRegistry::new(64));
    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..8u64 {
                    let minor = t * 8 + i;
                    registry.upsert(&id(minor), &format!("writer {}", t), minor);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let key = PluginKey::new("Test", "Alpha").unwrap();
    let versions = registry.versions(&key).unwrap();
    assert_eq!(versions.len(), 64);
    assert_eq!(registry.get_newest(&key).unwrap().1, 63);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_readers_never_see_empty_entry_under_eviction() {
    let registry: Arc<VersionedPluginRegistry<u64>> = Arc::new(VersionedPluginRegistry::new(2));
    registry.upsert(&id(0), "seed", 0);
    let key = PluginKey::new("Test", "Alpha").unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            let key = key.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut reads = 0u64;
                loop {
                    let (version, value) = registry.get_newest(&key).expect("entry never empty");
                    assert_eq!(version.minor, value);
                    let listed = registry.list_all();
                    assert_eq!(listed.len(), 1);
                    assert!(!listed[0].versions.is_empty() && listed[0].versions.len() <= 2);
                    reads += 1;
                    if done.load(Ordering::Acquire) {
                        return reads;
                    }
                }
            })
        })
        .collect();

    let writers: Vec<_> = (0..4u64)
        .map(|t| {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..250u64 {
                    let minor = 1 + t * 250 + i;
                    registry.upsert(&id(minor), "writer", minor);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }

    // The two highest versions survive whatever the interleaving
    assert_eq!(
        registry.versions(&key).unwrap(),
        vec![Version::new(1, 999, 0), Version::new(1, 1000, 0)]
    );
}

#[test]
fn test_retention_independent_of_insertion_order() {
    let forward: VersionedPluginRegistry<u64> = VersionedPluginRegistry::new(3);
    let backward: VersionedPluginRegistry<u64> = VersionedPluginRegistry::new(3);
    for minor in 0..10 {
        forward.upsert(&id(minor), "", minor);
    }
    for minor in (0..10).rev() {
        backward.upsert(&id(minor), "", minor);
    }

    let key = PluginKey::new("Test", "Alpha").unwrap();
    assert_eq!(forward.versions(&key), backward.versions(&key));
    assert_eq!(
        forward.versions(&key).unwrap(),
        vec![Version::new(1, 7, 0), Version::new(1, 8, 0), Version::new(1, 9, 0)]
    );
}

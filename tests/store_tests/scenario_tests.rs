//! End-to-end scenarios

use std::thread;
use std::time::Duration;

use emberkv::{now_nanos, EmberError};

use crate::{reopen, setup_temp_store};

#[test]
fn test_scenario_ttl_expiry() {
    let (_temp, store) = setup_temp_store();

    store.set_tx("k1", b"v1", 0).unwrap();
    store
        .set_tx("k2", b"v2", now_nanos() + 100_000_000)
        .unwrap();

    thread::sleep(Duration::from_millis(200));

    assert!(matches!(store.get("k2"), Err(EmberError::KeyNotFound)));
    assert_eq!(&store.get("k1").unwrap().0[..], b"v1");
}

#[test]
fn test_scenario_remove_only_key() {
    let (_temp, store) = setup_temp_store();
    store.set_tx("k1", b"v1", 0).unwrap();

    assert_eq!(store.remove(&["k1"]).unwrap(), 1);
    assert_eq!(store.len(), 0);
}

#[test]
fn test_scenario_shrink_close_reopen() {
    let (temp, store) = setup_temp_store();
    for i in 0..10_000 {
        store
            .set_tx(&format!("key:{}", i), format!("value:{}", i).as_bytes(), 0)
            .unwrap();
    }

    store.shrink().unwrap();
    store.close().unwrap();
    drop(store);

    let store = reopen(temp.path());
    assert_eq!(store.len(), 10_000);
    for i in 0..10_000 {
        let (value, _) = store.get(&format!("key:{}", i)).unwrap();
        assert_eq!(&value[..], format!("value:{}", i).as_bytes());
    }
}

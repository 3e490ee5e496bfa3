use std::sync::Arc;

use bytes::Bytes;
use jump_content_store::{
    ContentStore, FileContentStore, InMemoryContentStore, StoreError, StoreHandle, StoreUri,
};

fn uri(s: &str) -> StoreUri {
    StoreUri::parse(s).unwrap()
}

/// Every node reachable from the root, in depth-first order.
fn snapshot(store: &dyn ContentStore) -> Vec<(String, Option<Bytes>)> {
    let mut out = Vec::new();
    let mut pending = vec![StoreUri::root()];
    while let Some(next) = pending.pop() {
        let node = store.get_node(&next).unwrap().unwrap();
        for child in node.children() {
            pending.push(next.child(child).unwrap());
        }
        out.push((next.to_string(), node.as_data().cloned()));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

fn missing_ancestor_leaves_store_unchanged(store: Arc<dyn ContentStore>) {
    let handle = StoreHandle::new(Arc::clone(&store), true);
    handle.create_node(&uri("./apps")).unwrap();
    let before = snapshot(store.as_ref());

    let err = handle
        .create_data_node(&uri("./apps/App1/title"), Bytes::from_static(b"My App"))
        .unwrap_err();
    match err {
        StoreError::MissingAncestor { ancestor, .. } => assert_eq!(ancestor, uri("./apps/App1")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(snapshot(store.as_ref()), before);
}

fn delete_removes_whole_subtree(store: Arc<dyn ContentStore>) {
    let handle = StoreHandle::new(Arc::clone(&store), true);
    handle.create_nodes(&uri("./a/b/c")).unwrap();
    handle
        .create_data_node(&uri("./a/b/c/d"), Bytes::from_static(b"1"))
        .unwrap();
    handle
        .create_data_node(&uri("./a/e"), Bytes::from_static(b"2"))
        .unwrap();

    assert!(handle.delete_node(&uri("./a")).unwrap());
    for gone in ["./a", "./a/b", "./a/b/c", "./a/b/c/d", "./a/e"] {
        assert_eq!(handle.get_node(&uri(gone)).unwrap(), None, "{gone}");
    }
    assert!(!handle.delete_node(&uri("./a")).unwrap());
}

fn data_round_trips(store: Arc<dyn ContentStore>) {
    let handle = StoreHandle::new(store, true);
    handle.create_node(&uri("./blobs")).unwrap();
    let samples: [&[u8]; 4] = [b"", b"plain text", &[0, 255, 10, 13], b"line\nbreaks\n"];
    for (i, data) in samples.iter().enumerate() {
        let u = uri(&format!("./blobs/{i}"));
        handle.create_data_node(&u, Bytes::copy_from_slice(data)).unwrap();
        let node = handle.get_node(&u).unwrap().unwrap();
        assert_eq!(node.as_data().unwrap().as_ref(), *data);
    }
}

fn backends() -> Vec<(Arc<dyn ContentStore>, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().unwrap();
    let file: Arc<dyn ContentStore> = Arc::new(FileContentStore::open(dir.path()).unwrap());
    vec![
        (Arc::new(InMemoryContentStore::new()), None),
        (file, Some(dir)),
    ]
}

#[test]
fn missing_ancestor_scenario() {
    for (store, _dir) in backends() {
        missing_ancestor_leaves_store_unchanged(store);
    }
}

#[test]
fn delete_is_recursive() {
    for (store, _dir) in backends() {
        delete_removes_whole_subtree(store);
    }
}

#[test]
fn create_then_get_round_trips() {
    for (store, _dir) in backends() {
        data_round_trips(store);
    }
}

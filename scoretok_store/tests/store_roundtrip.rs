// Integration tests for scoretok_store through its public API only.

use scoretok_store::{
    DocumentSegments, SharedAppender, StoreError, append_ints, count_ints, read_all_ints,
    read_exact_ints, read_until_sentinel,
};

const END: u32 = 2;

#[test]
fn documents_written_by_appender_are_recovered_by_segments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compressed").join("train.bin");
    let appender = SharedAppender::new(&path);

    let docs = vec![vec![5, 5, 1, 0], vec![3], vec![4, 4, 4, 3]];
    for doc in &docs {
        let mut framed = doc.clone();
        framed.push(END);
        appender.append(&framed).unwrap();
    }

    let recovered: Vec<Vec<u32>> = DocumentSegments::new(&path, END)
        .collect::<scoretok_store::Result<_>>()
        .unwrap();
    assert_eq!(recovered, docs);
    assert_eq!(count_ints(&path).unwrap(), 12);
}

#[test]
fn sequential_scans_walk_every_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raw.bin");
    append_ints(&path, &[0, 1, 2, 1, 1, 0, 2, 0, 2]).unwrap();

    let mut offset = 0;
    let mut docs = Vec::new();
    loop {
        let scan = read_until_sentinel(&path, END, offset).unwrap();
        if !scan.ints.is_empty() {
            docs.push(scan.ints);
        }
        match scan.sentinel_index {
            Some(index) => offset = index + 1,
            None => break,
        }
    }
    assert_eq!(docs, vec![vec![0, 1], vec![1, 1, 0], vec![0]]);
}

#[test]
fn short_exact_read_is_reported_not_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raw.bin");
    append_ints(&path, &[1, 2, 3]).unwrap();

    assert!(matches!(
        read_exact_ints(&path, 4, 0),
        Err(StoreError::InsufficientData { available: 3, .. })
    ));
    assert_eq!(read_all_ints(&path).unwrap(), vec![1, 2, 3]);
}

use super::*;

fn payload(n: u32) -> Bytes {
    Bytes::from(format!(r#"{{"n":{n}}}"#))
}

#[test]
fn append_assigns_dense_offsets() {
    let log = MessageLog::new();

    for expected in 0..10u64 {
        let (_, offset) = log.append(payload(expected as u32)).unwrap();
        assert_eq!(offset, expected);
    }

    assert_eq!(log.len(), 10);
    for k in 0..10u64 {
        assert_eq!(log.at(k).unwrap().offset, k);
    }
}

#[test]
fn at_returns_stored_payload_byte_for_byte() {
    let log = MessageLog::new();
    let body = Bytes::from_static(br#"{"z": 1,  "a": [true]}"#);
    let (id, offset) = log.append(body.clone()).unwrap();

    let message = log.at(offset).unwrap();
    assert_eq!(message.id, id);
    assert_eq!(message.payload, body);
}

#[test]
fn at_out_of_range_is_none_not_error() {
    let log = MessageLog::new();
    assert!(log.at(0).is_none());
    log.append(payload(1)).unwrap();
    assert!(log.at(1).is_none());
    assert!(log.at(u64::MAX).is_none());
}

#[test]
fn append_batch_is_contiguous() {
    let log = MessageLog::new();
    log.append(payload(0)).unwrap();

    let payloads = (1..=4).map(payload).collect();
    let (first, count) = log.append_batch(payloads).unwrap();

    assert_eq!(first, 1);
    assert_eq!(count, 4);
    assert_eq!(log.len(), 5);
    for k in 0..5u64 {
        assert_eq!(log.at(k).unwrap().offset, k);
    }
}

#[test]
fn append_batch_of_nothing_is_a_no_op() {
    let log = MessageLog::new();
    let (first, count) = log.append_batch(Vec::new()).unwrap();
    assert_eq!((first, count), (0, 0));
    assert!(log.is_empty());
}

#[test]
fn resolve_maps_sentinels_and_clamps() {
    let log = MessageLog::new();
    for n in 0..5 {
        log.append(payload(n)).unwrap();
    }

    assert_eq!(log.resolve(Offset::EARLIEST), 0);
    assert_eq!(log.resolve(Offset::LATEST), 5);
    assert_eq!(log.resolve(Offset::specific(3)), 3);
    assert_eq!(log.resolve(Offset::specific(999)), 5);
    assert_eq!(log.resolve(Offset(-7)), 0);
}

#[test]
fn resolve_latest_on_empty_log_is_zero() {
    let log = MessageLog::new();
    assert_eq!(log.resolve(Offset::LATEST), 0);
    assert_eq!(log.resolve(Offset::EARLIEST), 0);
}

#[test]
fn append_after_shutdown_fails() {
    let log = MessageLog::new();
    log.append(payload(0)).unwrap();
    log.shut_down();

    assert_eq!(log.append(payload(1)), Err(BrokerError::Shutdown));
    assert_eq!(
        log.append_batch(vec![payload(1)]),
        Err(BrokerError::Shutdown)
    );
    // Reads still work.
    assert_eq!(log.at(0).unwrap().offset, 0);
    assert_eq!(log.len(), 1);
}

#[test]
fn concurrent_appends_keep_offsets_dense() {
    use std::sync::Arc;

    let log = Arc::new(MessageLog::with_capacity(1));
    let mut handles = Vec::new();
    for t in 0..8 {
        let log = Arc::clone(&log);
        handles.push(std::thread::spawn(move || {
            for i in 0..100 {
                log.append(payload(t * 100 + i)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(log.len(), 800);
    assert_eq!(log.total_appended(), 800);
    for k in 0..800u64 {
        assert_eq!(log.at(k).unwrap().offset, k);
    }
}

extern crate blockq_lib;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use blockq_lib::{BoundedBlockingQueue, CancellationToken, QueueError};

#[test]
fn test_cancelled_put_never_inserts() {
    let queue = Arc::new(BoundedBlockingQueue::with_capacity(1).unwrap());
    let token = CancellationToken::new();
    queue.add("occupant").unwrap();
    let producer = {
        let queue = queue.clone();
        let token = token.clone();
        thread::spawn(move || queue.put("intruder", &token))
    };
    thread::sleep(Duration::from_millis(50));
    token.cancel();
    assert_eq!(producer.join().unwrap(), Err(QueueError::Cancelled));
    assert_eq!(queue.remove(), Ok("occupant"));
    assert!(queue.is_empty());
}

#[test]
fn test_cancelled_take_never_removes() {
    let queue = Arc::new(BoundedBlockingQueue::<u8>::new());
    let token = CancellationToken::new();
    let consumer = {
        let queue = queue.clone();
        let token = token.clone();
        thread::spawn(move || queue.take(&token))
    };
    thread::sleep(Duration::from_millis(50));
    token.cancel();
    assert_eq!(consumer.join().unwrap(), Err(QueueError::Cancelled));
    queue.add(1).unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.signal_stats().space_signals, 0);
}

#[test]
fn test_cancel_interrupts_timed_waits_before_deadline() {
    let queue = Arc::new(BoundedBlockingQueue::with_capacity(1).unwrap());
    let token = CancellationToken::new();
    queue.add(0).unwrap();
    let producer = {
        let queue = queue.clone();
        let token = token.clone();
        thread::spawn(move || queue.offer_timeout(1, Duration::from_secs(30), &token))
    };
    let empty = Arc::new(BoundedBlockingQueue::<i32>::new());
    let consumer = {
        let empty = empty.clone();
        let token = token.clone();
        thread::spawn(move || empty.poll_timeout(Duration::from_secs(30), &token))
    };
    thread::sleep(Duration::from_millis(50));
    let start = Instant::now();
    token.cancel();
    assert_eq!(producer.join().unwrap(), Err(QueueError::Cancelled));
    assert_eq!(consumer.join().unwrap(), Err(QueueError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(queue.to_vec(), vec![0]);
    assert!(empty.is_empty());
}

#[test]
fn test_cancel_only_affects_its_own_token() {
    let queue = Arc::new(BoundedBlockingQueue::<i32>::new());
    let cancelled = CancellationToken::new();
    let untouched = CancellationToken::new();
    let doomed = {
        let queue = queue.clone();
        let token = cancelled.clone();
        thread::spawn(move || queue.take(&token))
    };
    let survivor = {
        let queue = queue.clone();
        let token = untouched.clone();
        thread::spawn(move || queue.take(&token))
    };
    thread::sleep(Duration::from_millis(50));
    cancelled.cancel();
    assert_eq!(doomed.join().unwrap(), Err(QueueError::Cancelled));
    queue.add(5).unwrap();
    assert_eq!(survivor.join().unwrap(), Ok(5));
}

#[test]
fn test_cancel_races_with_insertion() {
    // Whatever wins, an element is never both handed out and reported cancelled.
    for _ in 0..50 {
        let queue = Arc::new(BoundedBlockingQueue::<u32>::new());
        let token = CancellationToken::new();
        let consumer = {
            let queue = queue.clone();
            let token = token.clone();
            thread::spawn(move || queue.take(&token))
        };
        let canceller = {
            let token = token.clone();
            thread::spawn(move || token.cancel())
        };
        queue.add(9).unwrap();
        canceller.join().unwrap();
        match consumer.join().unwrap() {
            Ok(element) => {
                assert_eq!(element, 9);
                assert!(queue.is_empty());
            }
            Err(err) => {
                assert_eq!(err, QueueError::Cancelled);
                assert_eq!(queue.to_vec(), vec![9]);
            }
        }
    }
}

#[test]
fn test_noop_removals_issue_no_signal() {
    let queue = Arc::new(BoundedBlockingQueue::with_capacity(2).unwrap());
    let token = CancellationToken::new();
    queue.add_all([1, 2]).unwrap();
    let before = queue.signal_stats();
    let producer = {
        let queue = queue.clone();
        let token = token.clone();
        thread::spawn(move || queue.put(3, &token))
    };
    thread::sleep(Duration::from_millis(50));

    assert!(!queue.remove_item(&42));
    assert_eq!(queue.remove_all(&[7, 8]), 0);
    assert_eq!(queue.retain_all(&[1, 2]), 0);
    assert_eq!(queue.signal_stats(), before);
    thread::sleep(Duration::from_millis(50));
    assert!(!producer.is_finished());
    assert_eq!(queue.len(), 2);

    assert!(queue.remove_item(&1));
    assert_eq!(producer.join().unwrap(), Ok(()));
    assert_eq!(queue.to_vec(), vec![2, 3]);
    assert_eq!(queue.signal_stats().space_signals, before.space_signals + 1);
}

//! In-flight update guard tests

use std::sync::Arc;

use dockfleet::cache::updates::{stack_key, UpdateGuard};

#[test]
fn test_keys_are_independent() {
    let guard = UpdateGuard::new();
    let web = guard.try_acquire(stack_key("A1", "web")).unwrap();
    let db = guard.try_acquire(stack_key("A1", "db")).unwrap();
    let other_host = guard.try_acquire(stack_key("A2", "web")).unwrap();

    assert_eq!(guard.len(), 3);
    drop(web);
    assert!(!guard.is_held("A1/web"));
    assert!(guard.is_held(db.key()));
    assert!(guard.is_held(other_host.key()));
}

#[test]
fn test_exactly_one_thread_wins() {
    let guard = Arc::new(UpdateGuard::new());
    let barrier = Arc::new(std::sync::Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let guard = guard.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                // hold the ticket until every thread has tried
                let ticket = guard.try_acquire("A1/web");
                barrier.wait();
                ticket.is_some()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert!(guard.is_empty());
}

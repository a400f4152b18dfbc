use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use duplex_settle::{Promise, State};

const RACERS: usize = 16;

#[test]
fn racing_settlements_deliver_exactly_one_outcome() {
    for _ in 0..50 {
        let promise: Promise<usize, usize> = Promise::new();
        let observed = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..4 {
            let seen = Arc::clone(&observed);
            promise
                .on_resolve(move |v| seen.lock().unwrap().push(format!("ok{v}")))
                .unwrap();
            let seen = Arc::clone(&observed);
            promise
                .on_reject(move |e| seen.lock().unwrap().push(format!("err{e}")))
                .unwrap();
        }

        let barrier = Arc::new(Barrier::new(RACERS));
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..RACERS)
            .map(|i| {
                let promise = promise.clone();
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    barrier.wait();
                    let won = if i % 2 == 0 {
                        promise.resolve(i)
                    } else {
                        promise.reject(i)
                    };
                    if won {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        let observed = observed.lock().unwrap();
        assert_eq!(observed.len(), 4);
        assert!(observed.iter().all(|entry| entry == &observed[0]));
    }
}

#[test]
fn continuations_attached_during_settlement_each_fire_once() {
    for _ in 0..50 {
        let promise: Promise<u32, ()> = Promise::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(RACERS + 1));

        let attachers: Vec<_> = (0..RACERS)
            .map(|_| {
                let promise = promise.clone();
                let fired = Arc::clone(&fired);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    promise
                        .on_resolve(move |_| {
                            fired.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                })
            })
            .collect();

        barrier.wait();
        promise.resolve(1);
        for handle in attachers {
            handle.join().unwrap();
        }

        assert_eq!(fired.load(Ordering::SeqCst), RACERS);
    }
}

#[test]
fn finalizers_race_with_settlement_and_fire_once() {
    for _ in 0..50 {
        let promise: Promise<(), ()> = Promise::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(RACERS + 1));

        let attachers: Vec<_> = (0..RACERS)
            .map(|_| {
                let promise = promise.clone();
                let fired = Arc::clone(&fired);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    promise.on_finally(move || {
                        fired.fetch_add(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        barrier.wait();
        promise.reject(());
        for handle in attachers {
            handle.join().unwrap();
        }

        assert_eq!(fired.load(Ordering::SeqCst), RACERS);
        assert_eq!(promise.state(), State::Finalized);
    }
}

#[test]
fn settlement_delivery_completes_before_finalizers_from_other_threads() {
    let promise: Promise<u8, ()> = Promise::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = Arc::clone(&log);
    promise.on_finally(move || l.lock().unwrap().push("finally-queued".to_string()));

    let other = promise.clone();
    let l = Arc::clone(&log);
    promise
        .on_resolve(move |_| {
            l.lock().unwrap().push("resolve-a".to_string());
            let other = other.clone();
            let l = Arc::clone(&l);
            thread::spawn(move || {
                let seen = Arc::clone(&l);
                other
                    .on_resolve(move |v| seen.lock().unwrap().push(format!("resolve-late{v}")))
                    .expect("delivery in progress is not finalized");
                other.on_finally(move || l.lock().unwrap().push("finally-late".to_string()));
            })
            .join()
            .unwrap();
        })
        .unwrap();
    let l = Arc::clone(&log);
    promise
        .on_resolve(move |_| l.lock().unwrap().push("resolve-b".to_string()))
        .unwrap();

    assert!(promise.resolve(7));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "resolve-a",
            "resolve-late7",
            "resolve-b",
            "finally-queued",
            "finally-late"
        ]
    );
    assert_eq!(promise.state(), State::Finalized);
}

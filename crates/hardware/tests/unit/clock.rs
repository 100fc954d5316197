//! # Clock Coordinator Tests
//!
//! Two arrivals per cycle, the cycle count seen between them, parties joining
//! and leaving while others wait, and tearing the barrier down.

use std::thread;

use smpsim_core::common::error::SimError;
use smpsim_core::sim::clock::ClockCoordinator;

#[test]
fn test_parties_observe_the_same_cycle() {
    let clock = ClockCoordinator::new();
    let parties: Vec<_> = (0..3).map(|_| clock.register()).collect();
    let seen: Vec<Vec<u64>> = thread::scope(|s| {
        let handles: Vec<_> = parties
            .iter()
            .map(|me| {
                let clock = &clock;
                s.spawn(move || {
                    (0..50)
                        .map(|_| {
                            me.arrive().unwrap();
                            let cycle = clock.cycle();
                            me.arrive().unwrap();
                            cycle
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let expected: Vec<u64> = (1..=50).collect();
    for cycles in seen {
        assert_eq!(cycles, expected);
    }
}

#[test]
fn test_cycle_advances_at_the_first_arrival() {
    let clock = ClockCoordinator::new();
    assert_eq!(clock.cycle(), 0);
    let me = clock.register();
    me.arrive().unwrap();
    assert_eq!(clock.cycle(), 1);
    me.arrive().unwrap();
    assert_eq!(clock.cycle(), 1);
    me.arrive().unwrap();
    assert_eq!(clock.cycle(), 2);
}

#[test]
fn test_party_registered_between_cycles_runs_in_step() {
    let clock = ClockCoordinator::new();
    let core = clock.register();
    core.arrive().unwrap();
    core.arrive().unwrap();

    let helper = clock.register();
    assert_eq!(clock.parties(), 2);
    let helper_cycles = thread::scope(|s| {
        let h = s.spawn(|| {
            for _ in 0..10 {
                helper.arrive().unwrap();
                helper.arrive().unwrap();
            }
            clock.cycle()
        });
        for _ in 0..10 {
            core.arrive().unwrap();
            core.arrive().unwrap();
        }
        h.join().unwrap()
    });
    assert_eq!(helper_cycles, 11);
    helper.deregister();
    assert_eq!(clock.parties(), 1);
}

#[test]
fn test_dropping_registration_leaves_the_barrier() {
    let clock = ClockCoordinator::new();
    let stays = clock.register();
    {
        let _leaves = clock.register();
        assert_eq!(clock.parties(), 2);
    }
    assert_eq!(clock.parties(), 1);
    stays.arrive().unwrap();
    stays.arrive().unwrap();
    assert_eq!(clock.cycle(), 1);
}

#[test]
fn test_abort_releases_waiting_parties() {
    let clock = ClockCoordinator::new();
    let waiter = clock.register();
    let _silent = clock.register();
    let result = thread::scope(|s| {
        let h = s.spawn(|| waiter.arrive());
        clock.abort();
        h.join().unwrap()
    });
    assert!(matches!(result, Err(SimError::Aborted)));
    assert!(matches!(waiter.arrive(), Err(SimError::Aborted)));
}

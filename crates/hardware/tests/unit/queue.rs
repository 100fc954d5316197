//! # Ready Queue Tests

use pretty_assertions::assert_eq;

use smpsim_core::common::data::CoreId;
use smpsim_core::common::error::SimError;
use smpsim_core::common::sync::Resource;
use smpsim_core::core::{Context, ContextQueue, FinishedContexts};

use crate::common::harness::StubClock;

fn contexts(n: usize) -> Vec<Context> {
    (0..n).map(|id| Context::new(id, 384 + 4 * id as u32)).collect()
}

#[test]
fn test_queue_is_fifo() {
    let queue = ContextQueue::new(contexts(3));
    let mut clock = StubClock::default();
    let mut guard = queue.acquire(&mut clock).unwrap();
    let first = guard.pop_next().unwrap();
    guard.push(first);
    let order: Vec<usize> = std::iter::from_fn(|| guard.pop_next()).map(|c| c.id).collect();
    assert_eq!(order, vec![1, 2, 0]);
    assert!(guard.is_empty());
    assert_eq!(clock.elapsed(), 0);
}

#[test]
fn test_holder_cannot_reacquire() {
    let queue = ContextQueue::new(contexts(1));
    let _guard = queue.try_acquire().unwrap().unwrap();
    assert!(matches!(
        queue.try_acquire(),
        Err(SimError::LockProtocol {
            resource: Resource::ContextQueue
        })
    ));
}

#[test]
fn test_contended_queue_stalls_until_free() {
    let queue = ContextQueue::new(contexts(2));
    let (held_tx, held_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    std::thread::scope(|s| {
        let queue = &queue;
        let _ = s.spawn(move || {
            let guard = queue.try_acquire().unwrap().unwrap();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            drop(guard);
        });
        held_rx.recv().unwrap();
        assert!(queue.try_acquire().unwrap().is_none());
        release_tx.send(()).unwrap();
        let mut clock = StubClock::default();
        let mut guard = queue.acquire(&mut clock).unwrap();
        assert_eq!(guard.len(), 2);
        assert_eq!(guard.pop_next().map(|c| c.id), Some(0));
        assert_eq!(clock.ticks, 0);
    });
}

#[test]
fn test_blocking_accessors() {
    let queue = ContextQueue::new(contexts(2));
    assert_eq!(queue.len().unwrap(), 2);
    assert_eq!(queue.pop().unwrap().map(|c| c.id), Some(0));
    assert_eq!(queue.pop().unwrap().map(|c| c.id), Some(1));
    assert!(queue.pop().unwrap().is_none());
    assert!(queue.is_empty().unwrap());
}

#[test]
fn test_finished_keeps_retirement_order() {
    let finished = FinishedContexts::new();
    for mut ctx in contexts(3).into_iter().rev() {
        ctx.retired_by = Some(CoreId::BLOCKING);
        finished.push(ctx);
    }
    assert_eq!(finished.len(), 3);
    let ids: Vec<usize> = finished.snapshot().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![2, 1, 0]);
    assert_eq!(finished.take().len(), 3);
    assert!(finished.is_empty());
}

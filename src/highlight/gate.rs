//! Mutual exclusion for highlight sessions.
//!
//! Heavy rebuilds go through [`ConcurrencyGate::dispatch`], which refuses to start
//! while anything else holds the gate. Light updates go through
//! [`ConcurrencyGate::queue`] and wait their turn. Waiters are served strictly in
//! arrival order: a releasing holder hands its permit directly to the oldest waiter.

use futures::future::BoxFuture;
use smol::channel::{Receiver, Sender};
use smol::lock::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, MutexGuardArc};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use crate::highlight::collaborators::Notifier;
use crate::utils::debug_log;

pub const BUSY_MESSAGE: &str = "A command is still running. Please wait for it to finish.";

#[derive(Default)]
struct GateState {
    locked: bool,
    waiters: VecDeque<Sender<()>>,
}

pub struct ConcurrencyGate<T> {
    state: Mutex<GateState>,
    value: Arc<AsyncMutex<T>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl<T> ConcurrencyGate<T> {
    pub fn new(value: T) -> Self {
        ConcurrencyGate {
            state: Mutex::new(GateState::default()),
            value: Arc::new(AsyncMutex::new(value)),
            notifier: None,
        }
    }

    /// Rejected dispatches are reported through `notifier`
    pub fn with_notifier(value: T, notifier: Arc<dyn Notifier>) -> Self {
        ConcurrencyGate {
            notifier: Some(notifier),
            ..Self::new(value)
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state().locked
    }

    /// Enter immediately or not at all
    pub fn try_enter(&self) -> Option<GateGuard<'_, T>> {
        {
            let mut state = self.state();
            if state.locked {
                return None;
            }
            state.locked = true;
        }
        match self.value.try_lock() {
            Some(inner) => Some(GateGuard {
                gate: self,
                inner: Some(inner),
            }),
            None => {
                // The value is only ever locked by a permit holder
                self.release();
                None
            }
        }
    }

    /// Like `try_enter`, but the guard keeps the gate alive so it can move into a
    /// spawned task.
    pub fn try_enter_owned(self: &Arc<Self>) -> Option<OwnedGateGuard<T>> {
        {
            let mut state = self.state();
            if state.locked {
                return None;
            }
            state.locked = true;
        }
        match self.value.try_lock_arc() {
            Some(inner) => Some(OwnedGateGuard {
                gate: Arc::clone(self),
                inner: Some(inner),
            }),
            None => {
                self.release();
                None
            }
        }
    }

    /// Wait behind the current holder and every earlier waiter
    pub async fn enter(&self) -> GateGuard<'_, T> {
        let wait = {
            let mut state = self.state();
            if state.locked {
                let (tx, rx) = smol::channel::bounded(1);
                state.waiters.push_back(tx);
                Some(PermitWait {
                    gate: self,
                    rx,
                    granted: false,
                })
            } else {
                state.locked = true;
                None
            }
        };
        if let Some(mut wait) = wait {
            wait.granted().await;
        }
        GateGuard {
            gate: self,
            inner: Some(self.value.lock().await),
        }
    }

    /// Run `op` only if the gate is free. A busy gate yields `None` and a notice.
    pub async fn dispatch<F, R>(&self, op: F) -> Option<R>
    where
        F: for<'a> FnOnce(&'a mut T) -> BoxFuture<'a, R>,
    {
        match self.try_enter() {
            Some(mut guard) => Some(op(&mut guard).await),
            None => {
                self.notify_busy();
                None
            }
        }
    }

    /// Tell the user a heavyweight operation was refused
    pub fn notify_busy(&self) {
        debug_log("dispatch rejected: gate busy");
        if let Some(notifier) = &self.notifier {
            notifier.info(BUSY_MESSAGE);
        }
    }

    /// Run `op` once every earlier holder and waiter is done
    pub async fn queue<F, R>(&self, op: F) -> R
    where
        F: for<'a> FnOnce(&'a mut T) -> BoxFuture<'a, R>,
    {
        let mut guard = self.enter().await;
        op(&mut guard).await
    }

    fn state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self) {
        let mut state = self.state();
        while let Some(next) = state.waiters.pop_front() {
            // A closed channel means that waiter gave up; try the next one
            if next.try_send(()).is_ok() {
                return;
            }
        }
        state.locked = false;
    }
}

/// A queued `enter` call. If the caller stops waiting after the permit was
/// already handed over, the permit is passed on.
struct PermitWait<'g, T> {
    gate: &'g ConcurrencyGate<T>,
    rx: Receiver<()>,
    granted: bool,
}

impl<T> PermitWait<'_, T> {
    async fn granted(&mut self) {
        // Senders live in the gate state, so recv only fails if the gate is gone
        let _ = self.rx.recv().await;
        self.granted = true;
    }
}

impl<T> Drop for PermitWait<'_, T> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.gate.release();
        }
    }
}

pub struct GateGuard<'g, T> {
    gate: &'g ConcurrencyGate<T>,
    inner: Option<AsyncMutexGuard<'g, T>>,
}

impl<T> Deref for GateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.inner {
            Some(inner) => inner,
            None => unreachable!("gate guard accessed after release"),
        }
    }
}

impl<T> DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.inner {
            Some(inner) => inner,
            None => unreachable!("gate guard accessed after release"),
        }
    }
}

impl<T> Drop for GateGuard<'_, T> {
    fn drop(&mut self) {
        // Unlock the value before handing the permit on
        self.inner.take();
        self.gate.release();
    }
}

pub struct OwnedGateGuard<T> {
    gate: Arc<ConcurrencyGate<T>>,
    inner: Option<MutexGuardArc<T>>,
}

impl<T> Deref for OwnedGateGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.inner {
            Some(inner) => inner,
            None => unreachable!("gate guard accessed after release"),
        }
    }
}

impl<T> DerefMut for OwnedGateGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.inner {
            Some(inner) => inner,
            None => unreachable!("gate guard accessed after release"),
        }
    }
}

impl<T> Drop for OwnedGateGuard<T> {
    fn drop(&mut self) {
        self.inner.take();
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::collaborators::{Notice, RecordingNotifier};
    use futures::FutureExt;

    #[test]
    fn test_dispatch_rejected_while_busy() {
        smol::block_on(async {
            let notifier = Arc::new(RecordingNotifier::new(true));
            let gate = ConcurrencyGate::with_notifier(0u32, notifier.clone());
            let (tx, rx) = smol::channel::bounded::<()>(1);

            let first = gate.dispatch(move |count| {
                async move {
                    let _ = rx.recv().await;
                    *count += 1;
                    *count
                }
                .boxed()
            });
            let second = async {
                let rejected = gate
                    .dispatch(|count| {
                        async move {
                            *count += 100;
                            *count
                        }
                        .boxed()
                    })
                    .await;
                let _ = tx.send(()).await;
                rejected
            };

            let (first, second) = futures::join!(first, second);
            assert_eq!(first, Some(1));
            assert_eq!(second, None);
            assert_eq!(notifier.notices(), vec![Notice::Info(BUSY_MESSAGE.to_string())]);
            assert!(!gate.is_busy());
            assert_eq!(*gate.try_enter().unwrap(), 1);
        });
    }

    #[test]
    fn test_queue_runs_in_arrival_order() {
        smol::block_on(async {
            let gate = ConcurrencyGate::new(Vec::<u32>::new());
            let holder = gate.try_enter().unwrap();

            let push = |n: u32| gate.queue(move |v| async move { v.push(n) }.boxed());
            let release = async move {
                smol::future::yield_now().await;
                drop(holder);
            };

            futures::join!(push(1), push(2), push(3), release);
            assert_eq!(*gate.try_enter().unwrap(), vec![1, 2, 3]);
        });
    }

    #[test]
    fn test_abandoned_waiter_passes_permit_on() {
        smol::block_on(async {
            let gate = ConcurrencyGate::new(0u32);
            let holder = gate.try_enter().unwrap();
            {
                let mut abandoned = Box::pin(gate.enter());
                // Poll once so it registers as a waiter, then give up
                assert!(futures::poll!(abandoned.as_mut()).is_pending());
            }
            drop(holder);
            let mut guard = gate.enter().await;
            *guard += 1;
            drop(guard);
            assert!(!gate.is_busy());
        });
    }

    #[test]
    fn test_owned_guard_excludes_until_dropped() {
        let gate = Arc::new(ConcurrencyGate::new(1u32));
        let mut owned = gate.try_enter_owned().unwrap();
        assert!(gate.try_enter().is_none());
        assert!(gate.try_enter_owned().is_none());

        let task = smol::spawn(async move {
            *owned += 1;
        });
        smol::block_on(task);
        assert_eq!(*gate.try_enter().unwrap(), 2);
    }

    #[test]
    fn test_queue_runs_immediately_when_free() {
        let gate = ConcurrencyGate::new(String::from("a"));
        let len = smol::block_on(gate.queue(|s| {
            async move {
                s.push('b');
                s.len()
            }
            .boxed()
        }));
        assert_eq!(len, 2);
    }
}

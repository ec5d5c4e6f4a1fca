// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Promise chaining for asynchronous device operations.
//!
//! A promise carries a set of dependency events and the command queue they
//! were enqueued on. Appending an operation with [`Promise::then`] returns a
//! *new* promise whose single event depends on all events of the original;
//! the original promise stays valid, so chains can fork fan-out and be joined
//! again with [`Promise::merge`].
//!
//! Operations should be non-blocking at the point of enqueue: the only
//! blocking call is [`Promise::wait`] (or the [`crate::wait`] operation),
//! which also surfaces any error or panic raised by user callbacks earlier in
//! the chain.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::context::Context;
use crate::queue::{CommandQueue, JobBody};
use crate::{Error, Result};

/// A completion handle for one enqueued operation.
///
/// Events form the edges of the operation graph: each operation produces one
/// event and waits on the events of its predecessors.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

#[derive(Default)]
struct EventState {
    complete: bool,
    callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

#[derive(Default)]
struct EventInner {
    state: Mutex<EventState>,
    cond: Condvar,
}

impl Event {
    pub(crate) fn new() -> Event {
        Event {
            inner: Arc::new(EventInner::default()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().complete
    }

    /// Marks the event complete and runs registered callbacks.
    ///
    /// Signaling twice is a no-op; callbacks run exactly once, outside the
    /// state lock.
    pub(crate) fn signal(&self) {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.complete {
                return;
            }
            state.complete = true;
            self.inner.cond.notify_all();
            std::mem::take(&mut state.callbacks)
        };
        for cb in callbacks {
            cb();
        }
    }

    /// Runs `f` once the event completes; immediately if it already has.
    pub(crate) fn on_complete(&self, f: impl FnOnce() + Send + 'static) {
        let mut state = self.inner.state.lock();
        if state.complete {
            drop(state);
            f();
        } else {
            state.callbacks.push(Box::new(f));
        }
    }

    pub(crate) fn wait_blocking(&self) {
        let mut state = self.inner.state.lock();
        while !state.complete {
            self.inner.cond.wait(&mut state);
        }
    }

    /// Waits for completion up to `timeout`; returns whether it completed.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.inner.state.lock();
        if state.complete {
            return true;
        }
        let _ = self.inner.cond.wait_for(&mut state, timeout);
        state.complete
    }
}

/// A set of dependency events bound to a command queue.
#[derive(Clone)]
pub struct Promise {
    events: Vec<Event>,
    queue: CommandQueue,
}

impl Promise {
    /// An empty promise bound to the current context's command queue.
    pub fn new() -> Result<Promise> {
        let ctx = Context::current()?;
        Ok(Promise {
            events: Vec::new(),
            queue: ctx.queue().clone(),
        })
    }

    /// Union construction: flattens the event sets of all inputs.
    ///
    /// All inputs must share a command queue. An empty input behaves like
    /// [`Promise::new`].
    pub fn merge(promises: impl IntoIterator<Item = Promise>) -> Result<Promise> {
        let mut iter = promises.into_iter();
        let Some(first) = iter.next() else {
            return Promise::new();
        };
        let mut events = first.events;
        for p in iter {
            if !p.queue.same_queue(&first.queue) {
                return Err(Error::QueueMismatch);
            }
            events.extend(p.events);
        }
        Ok(Promise {
            events,
            queue: first.queue,
        })
    }

    /// The `then` combinator: enqueues `op` after this promise's events.
    pub fn then<R: Runnable>(&self, op: R) -> Result<Promise> {
        op.run(self)
    }

    /// Blocks until all dependency events complete; returns an empty promise.
    ///
    /// Errors from failed operations and panics from user callbacks earlier
    /// in the chain surface here.
    pub fn wait(&self) -> Result<Promise> {
        self.queue.wait_for(&self.events)?;
        Ok(Promise {
            events: Vec::new(),
            queue: self.queue.clone(),
        })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(crate) fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub(crate) fn from_parts(events: Vec<Event>, queue: CommandQueue) -> Promise {
        Promise { events, queue }
    }

    /// Schedules `body` after this promise's events and wraps the resulting
    /// event in a successor promise.
    pub(crate) fn enqueue(&self, body: JobBody) -> Result<Promise> {
        let event = self.queue.schedule(self.events.clone(), body);
        Ok(Promise::from_parts(vec![event], self.queue.clone()))
    }
}

/// An operation that can be appended to a promise.
///
/// Implementations enqueue their work against the promise's queue and return
/// the successor promise. Most code uses the concrete operations in
/// [`crate::ops`]; `Runnable` is the extension seam.
pub trait Runnable {
    fn run(self, p: &Promise) -> Result<Promise>;
}

type Listener = Box<dyn FnOnce(&Promise) -> Result<Promise> + Send>;

/// Wraps a runnable with optional pre/post listeners.
///
/// The pre listener runs (and may enqueue) before the operation body, the
/// post listener after it; either defaults to pass-through.
pub struct Hooked<R> {
    inner: R,
    pre: Option<Listener>,
    post: Option<Listener>,
}

impl<R: Runnable> Hooked<R> {
    pub fn new(inner: R) -> Self {
        Hooked {
            inner,
            pre: None,
            post: None,
        }
    }

    pub fn pre(mut self, f: impl FnOnce(&Promise) -> Result<Promise> + Send + 'static) -> Self {
        self.pre = Some(Box::new(f));
        self
    }

    pub fn post(mut self, f: impl FnOnce(&Promise) -> Result<Promise> + Send + 'static) -> Self {
        self.post = Some(Box::new(f));
        self
    }
}

impl<R: Runnable> Runnable for Hooked<R> {
    fn run(self, p: &Promise) -> Result<Promise> {
        let p = match self.pre {
            Some(f) => f(p)?,
            None => p.clone(),
        };
        let p = self.inner.run(&p)?;
        match self.post {
            Some(f) => f(&p),
            None => Ok(p),
        }
    }
}

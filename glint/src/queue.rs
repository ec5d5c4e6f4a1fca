// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-context command queue.
//!
//! Operations are scheduled as jobs carrying their dependency events; a job
//! becomes ready when every dependency has signaled and is then executed on
//! the queue's worker thread, in readiness order. Happens-before between
//! operations is therefore carried entirely by the event graph, which lets
//! independent branches interleave while chained operations stay ordered.
//!
//! Panics and errors raised inside job bodies are captured here and re-raised
//! on whichever thread waits on the queue.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::engine::{Engine, EngineKind};
use crate::promise::Event;
use crate::{Error, Result};

pub(crate) enum JobStatus {
    /// The job's work finished inside the body; the worker signals its event.
    Complete,
    /// The body handed its event to an engine-side completion callback.
    Deferred,
}

pub(crate) struct JobCtx<'a> {
    pub engine: &'a Engine,
    pub event: &'a Event,
}

pub(crate) type JobBody = Box<dyn FnOnce(&JobCtx) -> Result<JobStatus> + Send>;

struct Job {
    event: Event,
    body: JobBody,
}

enum Failure {
    Error(Error),
    Panic(Box<dyn std::any::Any + Send>),
}

struct QueueShared {
    engine: Engine,
    tx: Sender<Job>,
    failure: Mutex<Option<Failure>>,
}

/// An in-order-by-dependency command queue bound to one engine.
#[derive(Clone)]
pub(crate) struct CommandQueue {
    shared: Arc<QueueShared>,
}

impl CommandQueue {
    pub fn new(engine: Engine) -> Result<CommandQueue> {
        let (tx, rx) = unbounded::<Job>();
        let shared = Arc::new(QueueShared {
            engine: engine.clone(),
            tx,
            failure: Mutex::new(None),
        });
        let weak = Arc::downgrade(&shared);
        std::thread::Builder::new()
            .name("glint-comput".into())
            .spawn(move || worker_loop(rx, engine, weak))
            .map_err(|e| Error::Allocation(format!("failed to spawn queue worker: {e}")))?;
        Ok(CommandQueue { shared })
    }

    pub fn same_queue(&self, other: &CommandQueue) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Schedules `body` to run once all of `deps` have signaled.
    ///
    /// Returns the event that the job completes.
    pub fn schedule(&self, deps: Vec<Event>, body: JobBody) -> Event {
        let event = Event::new();
        let job = Job {
            event: event.clone(),
            body,
        };
        if deps.is_empty() {
            let _ = self.shared.tx.send(job);
            return event;
        }
        let remaining = Arc::new(AtomicUsize::new(deps.len()));
        let slot = Arc::new(Mutex::new(Some(job)));
        for dep in deps {
            let remaining = remaining.clone();
            let slot = slot.clone();
            let tx = self.shared.tx.clone();
            dep.on_complete(move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    if let Some(job) = slot.lock().take() {
                        let _ = tx.send(job);
                    }
                }
            });
        }
        event
    }

    /// Blocks until every event has signaled, then surfaces any captured
    /// failure: job errors return as `Err`, user-callback panics resume on
    /// this thread.
    pub fn wait_for(&self, events: &[Event]) -> Result<()> {
        match self.shared.engine.kind() {
            EngineKind::Cpu => {
                for ev in events {
                    ev.wait_blocking();
                }
            }
            EngineKind::Wgpu(state) => {
                // Completion callbacks only fire while the device is polled,
                // so pump it until the chain drains.
                for ev in events {
                    while !ev.is_complete() {
                        let _ = state.device.poll(wgpu::Maintain::Poll);
                        ev.wait_timeout(Duration::from_micros(200));
                    }
                }
            }
        }
        match self.shared.failure.lock().take() {
            None => Ok(()),
            Some(Failure::Error(e)) => Err(e),
            Some(Failure::Panic(payload)) => resume_unwind(payload),
        }
    }
}

fn worker_loop(rx: Receiver<Job>, engine: Engine, shared: Weak<QueueShared>) {
    while let Ok(job) = rx.recv() {
        let ctx = JobCtx {
            engine: &engine,
            event: &job.event,
        };
        match catch_unwind(AssertUnwindSafe(|| (job.body)(&ctx))) {
            Ok(Ok(JobStatus::Complete)) => job.event.signal(),
            Ok(Ok(JobStatus::Deferred)) => {}
            Ok(Err(e)) => {
                record_failure(&shared, Failure::Error(e));
                job.event.signal();
            }
            Err(payload) => {
                record_failure(&shared, Failure::Panic(payload));
                job.event.signal();
            }
        }
    }
}

fn record_failure(shared: &Weak<QueueShared>, failure: Failure) {
    if let Some(shared) = shared.upgrade() {
        let mut slot = shared.failure.lock();
        // Keep the first failure; later ones are usually fallout.
        if slot.is_none() {
            *slot = Some(failure);
        }
    }
}

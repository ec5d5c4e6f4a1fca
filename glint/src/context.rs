// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contexts and the scoped current-context capability.
//!
//! A context owns the execution engine for one device plus the command queue
//! operations are scheduled on. At most one context may be *current* per
//! thread; operations that allocate device resources (buffer handles,
//! promises) resolve it implicitly. [`ContextGuard`] makes a context current
//! for a lexical scope and is guaranteed to release it again, unwinding
//! included.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::backend::{Device, DeviceRepr};
use crate::engine::Engine;
use crate::queue::CommandQueue;
use crate::wgpu_engine::WgpuState;
use crate::{Error, Result};

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// An execution context for a single device.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    device: Device,
    engine: Engine,
    queue: CommandQueue,
}

impl Context {
    pub fn new(device: &Device) -> Result<Context> {
        let engine = match &device.repr {
            DeviceRepr::Cpu => Engine::cpu(),
            DeviceRepr::Adapter(adapter) => {
                let (dev, queue) = pollster::block_on(adapter.request_device(
                    &wgpu::DeviceDescriptor {
                        label: Some("glint device"),
                        required_features: wgpu::Features::empty(),
                        required_limits: wgpu::Limits::default(),
                        memory_hints: wgpu::MemoryHints::default(),
                    },
                    None,
                ))
                .map_err(|e| Error::Backend(format!("device request failed: {e}")))?;
                Engine::wgpu(WgpuState::new(dev, queue))
            }
        };
        let queue = CommandQueue::new(engine.clone())?;
        Ok(Context {
            inner: Arc::new(ContextInner {
                device: device.clone(),
                engine,
                queue,
            }),
        })
    }

    /// The context current on this thread.
    pub fn current() -> Result<Context> {
        CURRENT
            .with(|c| c.borrow().clone())
            .ok_or(Error::NoCurrentContext)
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    pub(crate) fn queue(&self) -> &CommandQueue {
        &self.inner.queue
    }

    fn set_current(&self) -> Result<()> {
        CURRENT.with(|c| {
            let mut slot = c.borrow_mut();
            if slot.is_some() {
                return Err(Error::RecursiveContext);
            }
            *slot = Some(self.clone());
            Ok(())
        })
    }

    fn unset_current() {
        CURRENT.with(|c| c.borrow_mut().take());
    }
}

/// Scoped acquire/release of the current context.
pub struct ContextGuard {
    // Tied to the acquiring thread; the release must happen where the
    // acquire did.
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    pub fn new(ctx: &Context) -> Result<ContextGuard> {
        ctx.set_current()?;
        Ok(ContextGuard {
            _not_send: PhantomData,
        })
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        Context::unset_current();
    }
}

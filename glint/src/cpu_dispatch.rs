// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Support for CPU implementations of compute kernels.
//!
//! A CPU kernel is a plain function taking the launch size and its bindings;
//! it is expected to loop over work items itself and may use ordinary
//! arithmetic where its device twin uses atomics, since a queue runs one
//! dispatch at a time.

use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::engine::ByteStore;

/// A CPU twin of a device kernel: `(global_size, bindings)`.
pub type CpuKernelFn = fn(u32, &KernelArgs);

/// The bindings of one CPU dispatch, indexed by kernel argument index.
pub struct KernelArgs {
    slots: Vec<Option<Arc<Mutex<ByteStore>>>>,
}

impl KernelArgs {
    pub(crate) fn new(slots: Vec<Option<Arc<Mutex<ByteStore>>>>) -> KernelArgs {
        KernelArgs { slots }
    }

    /// Whether argument `index` was left unbound (or explicitly nulled).
    pub fn is_null(&self, index: usize) -> bool {
        self.slots.get(index).map_or(true, |s| s.is_none())
    }

    /// A typed view of argument `index`.
    ///
    /// Holds the binding's lock for the guard's lifetime; a kernel must not
    /// request the same buffer twice at once. Panics if the argument is
    /// unbound; gate on [`KernelArgs::is_null`] for optional outputs.
    pub fn buf<T: Pod>(&self, index: usize) -> MappedMutexGuard<'_, [T]> {
        let slot = self
            .slots
            .get(index)
            .and_then(|s| s.as_ref())
            .unwrap_or_else(|| panic!("kernel argument {index} is not bound"));
        MutexGuard::map(slot.lock(), |store| {
            bytemuck::cast_slice_mut::<u8, T>(store.as_mut_slice())
        })
    }
}

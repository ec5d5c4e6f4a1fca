// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The execution engine behind a context: either the host worker that runs
//! registered CPU kernels, or a wgpu device/queue pair.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::wgpu_engine::WgpuState;

/// Handle to a context's execution engine.
#[derive(Clone)]
pub struct Engine {
    pub(crate) kind: Arc<EngineKind>,
}

pub(crate) enum EngineKind {
    /// Data-parallel execution emulated on the context's worker thread.
    Cpu,
    /// A wgpu logical device and its submission queue.
    Wgpu(WgpuState),
}

impl Engine {
    pub(crate) fn cpu() -> Engine {
        Engine {
            kind: Arc::new(EngineKind::Cpu),
        }
    }

    pub(crate) fn wgpu(state: WgpuState) -> Engine {
        Engine {
            kind: Arc::new(EngineKind::Wgpu(state)),
        }
    }

    pub(crate) fn kind(&self) -> &EngineKind {
        &self.kind
    }

    pub fn is_cpu(&self) -> bool {
        matches!(*self.kind, EngineKind::Cpu)
    }
}

/// Byte storage backed by 32-bit words, so typed views of device data are
/// always sufficiently aligned for the device element types.
pub struct ByteStore {
    words: Vec<u32>,
    len: usize,
}

impl ByteStore {
    pub fn zeroed(len: usize) -> ByteStore {
        ByteStore {
            words: vec![0; len.div_ceil(4)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }
}

/// A device-side buffer handle.
///
/// On the CPU device this is shared byte storage (for `HostMap` buffers, the
/// very allocation backing the host shadow); on a wgpu device it is a storage
/// buffer.
#[derive(Clone)]
pub struct DeviceBuffer {
    pub(crate) repr: DeviceRepr,
}

#[derive(Clone)]
pub(crate) enum DeviceRepr {
    Cpu(Arc<Mutex<ByteStore>>),
    Wgpu(Arc<wgpu::Buffer>),
}

impl DeviceBuffer {
    pub(crate) fn cpu(bytes: Arc<Mutex<ByteStore>>) -> Self {
        DeviceBuffer {
            repr: DeviceRepr::Cpu(bytes),
        }
    }

    pub(crate) fn wgpu(buf: Arc<wgpu::Buffer>) -> Self {
        DeviceBuffer {
            repr: DeviceRepr::Wgpu(buf),
        }
    }

    pub(crate) fn expect_cpu(&self) -> &Arc<Mutex<ByteStore>> {
        match &self.repr {
            DeviceRepr::Cpu(bytes) => bytes,
            DeviceRepr::Wgpu(_) => panic!("device buffer belongs to a wgpu device"),
        }
    }

    pub(crate) fn expect_wgpu(&self) -> &Arc<wgpu::Buffer> {
        match &self.repr {
            DeviceRepr::Wgpu(buf) => buf,
            DeviceRepr::Cpu(_) => panic!("device buffer belongs to the CPU device"),
        }
    }
}

// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed host/device buffers.
//!
//! A buffer owns up to three lazily created resources: the host array of `H`,
//! the device shadow (the `H::Dev` byte image the device sees), and the
//! device handle itself. Always go through [`Buffer::host`],
//! [`Buffer::shadow`] and the device accessors rather than assuming a
//! resource exists; each allocates on first touch.
//!
//! Host and device views are only guaranteed equal at synchronization points:
//! after a [`crate::push`] completes and before host writes resume, and after
//! a [`crate::pull`] completes and before host reads resume.

use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::context::Context;
use crate::convert::HostValue;
use crate::engine::{ByteStore, DeviceBuffer, DeviceRepr, Engine, EngineKind};
use crate::{Error, Result};

/// Where a buffer's device storage lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageClass {
    /// Request that the device handle be backed by the host shadow
    /// allocation. Honored zero-copy by the CPU device; a wgpu device falls
    /// back to `Direct` semantics.
    HostMap,
    /// The buffer is not accessed by the host after construction.
    NoAccess,
    /// A device-side buffer written and read through explicit transfers.
    #[default]
    Direct,
}

struct BufferInner<H: HostValue> {
    len: usize,
    class: StorageClass,
    host: Mutex<Option<Box<[H]>>>,
    shadow: Mutex<Option<Arc<Mutex<ByteStore>>>>,
    device: Mutex<Option<DeviceBuffer>>,
}

/// A typed buffer of `len` elements, cheap to clone (shared contents).
pub struct Buffer<H: HostValue> {
    inner: Arc<BufferInner<H>>,
}

impl<H: HostValue> Clone for Buffer<H> {
    fn clone(&self) -> Self {
        Buffer {
            inner: self.inner.clone(),
        }
    }
}

impl<H: HostValue> Buffer<H> {
    fn with_parts(len: usize, class: StorageClass, host: Option<Box<[H]>>) -> Buffer<H> {
        Buffer {
            inner: Arc::new(BufferInner {
                len,
                class,
                host: Mutex::new(host),
                shadow: Mutex::new(None),
                device: Mutex::new(None),
            }),
        }
    }

    /// A buffer initialized from literal values; storage class `Direct`.
    pub fn from_values(values: &[H]) -> Buffer<H> {
        Self::from_values_in(values, StorageClass::Direct)
    }

    pub fn from_values_in(values: &[H], class: StorageClass) -> Buffer<H> {
        Self::with_parts(values.len(), class, Some(values.to_vec().into_boxed_slice()))
    }

    /// An uninitialized buffer of `len` elements; storage class `NoAccess`.
    pub fn with_capacity(len: usize) -> Buffer<H> {
        Self::with_capacity_in(len, StorageClass::NoAccess)
    }

    pub fn with_capacity_in(len: usize, class: StorageClass) -> Buffer<H> {
        Self::with_parts(len, class, None)
    }

    /// A buffer holding `len` copies of `value`; storage class `HostMap`.
    pub fn filled(len: usize, value: H) -> Buffer<H> {
        Self::filled_in(len, value, StorageClass::HostMap)
    }

    pub fn filled_in(len: usize, value: H, class: StorageClass) -> Buffer<H> {
        Self::with_parts(len, class, Some(vec![value; len].into_boxed_slice()))
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    pub fn size_in_bytes(&self) -> usize {
        self.inner.len * std::mem::size_of::<H::Dev>()
    }

    pub fn storage_class(&self) -> StorageClass {
        self.inner.class
    }

    /// The host array, allocated (default-initialized) on first access.
    pub fn host(&self) -> MappedMutexGuard<'_, [H]> {
        let guard = self.inner.host.lock();
        MutexGuard::map(guard, |slot| {
            &mut **slot.get_or_insert_with(|| vec![H::default(); self.inner.len].into_boxed_slice())
        })
    }

    pub fn get(&self, index: usize) -> Result<H> {
        if index >= self.inner.len {
            return Err(Error::OutOfRange {
                index,
                len: self.inner.len,
            });
        }
        Ok(self.host()[index])
    }

    pub fn set(&self, index: usize, value: H) -> Result<()> {
        if index >= self.inner.len {
            return Err(Error::OutOfRange {
                index,
                len: self.inner.len,
            });
        }
        self.host()[index] = value;
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<H> {
        self.host().to_vec()
    }

    /// The device handle, created lazily against the current context.
    pub fn device(&self) -> Result<DeviceBuffer> {
        let ctx = Context::current()?;
        self.device_in(ctx.engine())
    }
}

/// Type-erased buffer surface used by operations, kernels and the pipeline
/// registry.
pub trait AnyBuffer: Send + Sync {
    fn len(&self) -> usize;
    fn size_in_bytes(&self) -> usize;
    fn storage_class(&self) -> StorageClass;
    /// The device-shadow byte image, allocated zeroed on first access.
    fn shadow(&self) -> Arc<Mutex<ByteStore>>;
    /// The device handle, created on first use against `engine`.
    fn device_in(&self, engine: &Engine) -> Result<DeviceBuffer>;
    /// Element-wise host → device conversion into the shadow.
    fn conv_host_to_dev(&self);
    /// Element-wise device → host conversion out of the shadow.
    fn conv_dev_to_host(&self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H: HostValue> AnyBuffer for Buffer<H> {
    fn len(&self) -> usize {
        self.inner.len
    }

    fn size_in_bytes(&self) -> usize {
        Buffer::size_in_bytes(self)
    }

    fn storage_class(&self) -> StorageClass {
        self.inner.class
    }

    fn shadow(&self) -> Arc<Mutex<ByteStore>> {
        let mut slot = self.inner.shadow.lock();
        slot.get_or_insert_with(|| {
            Arc::new(Mutex::new(ByteStore::zeroed(Buffer::size_in_bytes(self))))
        })
        .clone()
    }

    fn device_in(&self, engine: &Engine) -> Result<DeviceBuffer> {
        let mut slot = self.inner.device.lock();
        if let Some(dev) = &*slot {
            return Ok(dev.clone());
        }
        let dev = match engine.kind() {
            EngineKind::Cpu => match self.inner.class {
                StorageClass::HostMap => DeviceBuffer::cpu(self.shadow()),
                StorageClass::NoAccess | StorageClass::Direct => DeviceBuffer::cpu(Arc::new(
                    Mutex::new(ByteStore::zeroed(Buffer::size_in_bytes(self))),
                )),
            },
            EngineKind::Wgpu(state) => DeviceBuffer::wgpu(Arc::new(
                state.create_storage_buffer(Buffer::size_in_bytes(self))?,
            )),
        };
        *slot = Some(dev.clone());
        Ok(dev)
    }

    fn conv_host_to_dev(&self) {
        let host = self.host();
        let shadow = self.shadow();
        let mut store = shadow.lock();
        let dev: &mut [H::Dev] = bytemuck::cast_slice_mut(store.as_mut_slice());
        for (d, h) in dev.iter_mut().zip(host.iter()) {
            *d = h.to_device();
        }
    }

    fn conv_dev_to_host(&self) {
        let mut host = self.host();
        let shadow = self.shadow();
        let store = shadow.lock();
        let dev: &[H::Dev] = bytemuck::cast_slice(store.as_slice());
        for (h, d) in host.iter_mut().zip(dev.iter()) {
            *h = H::from_device(*d);
        }
    }
}

/// A cheap, type-erased handle to a buffer.
#[derive(Clone)]
pub struct BufferHandle(pub(crate) Arc<dyn AnyBuffer>);

impl<H: HostValue> From<&Buffer<H>> for BufferHandle {
    fn from(buf: &Buffer<H>) -> Self {
        BufferHandle(Arc::new(buf.clone()))
    }
}

impl From<Arc<dyn AnyBuffer>> for BufferHandle {
    fn from(buf: Arc<dyn AnyBuffer>) -> Self {
        BufferHandle(buf)
    }
}

impl std::ops::Deref for BufferHandle {
    type Target = dyn AnyBuffer;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// Copies the shadow image into a distinct CPU device allocation (no-op when
/// the device aliases the shadow, as with `HostMap`).
pub(crate) fn cpu_upload(buf: &dyn AnyBuffer, dev: &DeviceBuffer) {
    let shadow = buf.shadow();
    if let DeviceRepr::Cpu(bytes) = &dev.repr {
        if !Arc::ptr_eq(bytes, &shadow) {
            bytes
                .lock()
                .as_mut_slice()
                .copy_from_slice(shadow.lock().as_slice());
        }
    }
}

/// Copies a distinct CPU device allocation back into the shadow image.
pub(crate) fn cpu_download(buf: &dyn AnyBuffer, dev: &DeviceBuffer) {
    let shadow = buf.shadow();
    if let DeviceRepr::Cpu(bytes) = &dev.repr {
        if !Arc::ptr_eq(bytes, &shadow) {
            shadow
                .lock()
                .as_mut_slice()
                .copy_from_slice(bytes.lock().as_slice());
        }
    }
}

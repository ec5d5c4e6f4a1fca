// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! wgpu-backed execution: storage buffers, uploads, staged downloads and
//! compute dispatches.
//!
//! Submissions happen in job order on the context's worker thread, so device
//! ordering follows the event graph without extra fences; completion is
//! reported through `on_submitted_work_done` / `map_async` callbacks, which
//! fire while the device is polled (a promise `wait` pumps the poll loop).

use std::sync::{Arc, OnceLock};

use crate::engine::Engine;
use crate::program::Kernel;
use crate::promise::Event;
use crate::{Error, Result};

pub(crate) struct WgpuState {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    dummy: OnceLock<Arc<wgpu::Buffer>>,
}

impl WgpuState {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> WgpuState {
        WgpuState {
            device,
            queue,
            dummy: OnceLock::new(),
        }
    }

    pub fn create_storage_buffer(&self, bytes: usize) -> Result<wgpu::Buffer> {
        let limit = self.device.limits().max_storage_buffer_binding_size as usize;
        if bytes > limit {
            return Err(Error::Allocation(format!(
                "buffer of {bytes} bytes exceeds device storage limit of {limit}"
            )));
        }
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: (bytes.max(4)) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        }))
    }

    /// A 4-byte placeholder bound in place of null arguments. Bound to a
    /// runtime-sized array its `arrayLength` rounds down to zero, which is
    /// how kernels detect counting mode.
    pub fn dummy_buffer(&self) -> &Arc<wgpu::Buffer> {
        self.dummy.get_or_init(|| {
            Arc::new(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("glint null argument"),
                size: 4,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            }))
        })
    }

    /// Writes `bytes` into `dst` and signals `event` once the write has
    /// landed on the device timeline.
    pub fn upload(&self, dst: &wgpu::Buffer, bytes: &[u8], event: &Event) {
        if !bytes.is_empty() {
            self.queue.write_buffer(dst, 0, bytes);
        }
        self.flush_signal(event);
    }

    /// Copies `src` into a staging buffer, maps it, hands the mapped bytes to
    /// `on_mapped` and signals `event`.
    pub fn download(
        &self,
        src: &wgpu::Buffer,
        bytes: usize,
        on_mapped: impl FnOnce(&[u8]) + Send + 'static,
        event: &Event,
    ) {
        let staging = Arc::new(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glint download"),
            size: (bytes.max(4)) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_buffer_to_buffer(src, 0, &staging, 0, bytes as u64);
        self.queue.submit(Some(encoder.finish()));

        let event = event.clone();
        let mapped = staging.clone();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                match result {
                    Ok(()) => {
                        {
                            let view = mapped.slice(..).get_mapped_range();
                            on_mapped(&view[..bytes.min(view.len())]);
                        }
                        mapped.unmap();
                    }
                    Err(e) => log::error!("buffer download failed to map: {e}"),
                }
                event.signal();
            });
    }

    /// Launches `kernel` over `launch` work items and signals `event` when
    /// the dispatch completes on the device timeline.
    pub fn dispatch(
        &self,
        engine: &Engine,
        kernel: &Kernel,
        launch: usize,
        event: &Event,
    ) -> Result<()> {
        let pipeline = kernel.gpu_pipeline(self)?;
        let args = kernel.args_snapshot();

        // Resolve every binding the entry point uses, materializing device
        // handles on first touch; unbound arguments get the placeholder.
        let indices: Vec<u32> = kernel.arg_bindings().values().copied().collect();
        let mut resolved: Vec<Arc<wgpu::Buffer>> = Vec::with_capacity(indices.len());
        for index in &indices {
            let buf = match args.get(index) {
                Some(Some(handle)) => handle.device_in(engine)?.expect_wgpu().clone(),
                _ => self.dummy_buffer().clone(),
            };
            resolved.push(buf);
        }
        let entries: Vec<wgpu::BindGroupEntry> = indices
            .iter()
            .zip(&resolved)
            .map(|(&binding, buf)| wgpu::BindGroupEntry {
                binding,
                resource: buf.as_entire_binding(),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name()),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let wg = kernel.workgroup_size()[0].max(1) as usize;
        let groups = launch.div_ceil(wg) as u32;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        let event = event.clone();
        self.queue.on_submitted_work_done(move || event.signal());
        Ok(())
    }

    /// Flushes pending queue writes and signals `event` once the device
    /// timeline reaches them.
    pub fn flush_signal(&self, event: &Event) {
        self.queue.submit(std::iter::empty());
        let event = event.clone();
        self.queue.on_submitted_work_done(move || event.signal());
    }
}

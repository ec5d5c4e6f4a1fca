// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The staged rasterizer driver.
//!
//! A frame is a fixed chain: clear → vertex shading → mark-size probe →
//! mark-buffer resize → scanline marking → fragment-buffer resize →
//! scanline fill → depth test → fragment shading → pixel packing →
//! pixel pull. Device stages are `callc`-wrapped sub-promises so their
//! internal pushes and pulls are awaited before the next stage; host
//! bookkeeping (counter resets, reallocation) runs between them on the
//! completion-callback thread. [`Rasterizer::render`] appends a final wait,
//! so it is observably synchronous to its caller.
//!
//! The intermediate mark and fragment buffers are sized dynamically: a
//! counting-mode marker pass reports how many span endpoints and fragments a
//! frame needs, and the driver grows the buffers to the next power of two
//! when the current capacity falls short.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::{Buffer, BufferHandle, StorageClass};
use crate::convert::{Float4, Rgba8};
use crate::math::Vec4;
use crate::ops::{callc, fill, pull, push, run, wait};
use crate::pipeline::Pipeline;
use crate::program::{Kernel, Program};
use crate::promise::{Promise, Runnable};
use crate::{Error, Result};

const VERTEX_ENTRY: &str = "vertex_shader";
const FRAGMENT_ENTRY: &str = "fragment_shader";

const REQUIRED_VERTEX_ARGS: &[&str] = &[
    "AttributeVertex",
    "AttributeNormal",
    "UniformMatrix",
    "InterpPosition",
];
const REQUIRED_FRAGMENT_ARGS: &[&str] = &[
    "gclFragPos",
    "gclFragInfo",
    "gclColorBuffer",
    "gclBufferSize",
    "gclDepthBuffer",
];

struct Bufs {
    viewport: Buffer<f32>,
    buffer_size: Buffer<u32>,
    mark_size: Buffer<u32>,
    fragment_size: Buffer<u32>,
    mark_pos: Buffer<Vec4>,
    mark_info: Buffer<Vec4>,
    frag_pos: Buffer<Vec4>,
    frag_info: Buffer<Vec4>,
    depth: Buffer<i32>,
    color: Buffer<Float4>,
    pixel: Buffer<Rgba8>,
}

#[derive(Default)]
struct Kernels {
    mark: Option<Kernel>,
    fill: Option<Kernel>,
    depth: Option<Kernel>,
    adapt: Option<Kernel>,
    vertex: Option<Kernel>,
    fragment: Option<Kernel>,
}

struct State {
    base: Promise,
    pipeline: parking_lot::Mutex<Pipeline>,
    bufs: parking_lot::Mutex<Bufs>,
    krn: parking_lot::Mutex<Kernels>,
    vertex_count: AtomicUsize,
    size: parking_lot::Mutex<(u32, u32)>,
}

/// The rasterizer pipeline driver.
pub struct Rasterizer {
    state: Arc<State>,
}

impl Rasterizer {
    /// Builds a rasterizer targeting a `width × height` framebuffer, with
    /// the built-in stage program installed.
    ///
    /// Requires a current context.
    pub fn new(width: u32, height: u32) -> Result<Rasterizer> {
        let base = Promise::new()?;
        let bufs = Bufs {
            viewport: Buffer::from_values(&[0.0, 0.0, width as f32, height as f32]),
            buffer_size: Buffer::from_values(&[width, height]),
            mark_size: Buffer::from_values_in(&[0], StorageClass::HostMap),
            fragment_size: Buffer::from_values_in(&[0], StorageClass::HostMap),
            mark_pos: Buffer::with_capacity_in(1000, StorageClass::HostMap),
            mark_info: Buffer::with_capacity_in(1000, StorageClass::HostMap),
            frag_pos: Buffer::with_capacity_in(1000, StorageClass::HostMap),
            frag_info: Buffer::with_capacity_in(1000, StorageClass::HostMap),
            depth: Buffer::with_capacity((width * height) as usize),
            color: Buffer::with_capacity((width * height) as usize),
            pixel: Buffer::with_capacity_in((width * height) as usize, StorageClass::Direct),
        };
        let mut pipeline = Pipeline::new();
        bind_fixed(&mut pipeline, &bufs);
        bind_dynamic(&mut pipeline, &bufs);

        let rp = Rasterizer {
            state: Arc::new(State {
                base,
                pipeline: parking_lot::Mutex::new(pipeline),
                bufs: parking_lot::Mutex::new(bufs),
                krn: parking_lot::Mutex::new(Kernels::default()),
                vertex_count: AtomicUsize::new(3),
                size: parking_lot::Mutex::new((width, height)),
            }),
        };
        rp.set_rasterizer_program(&crate::shaders::rasterizer_program()?)?;
        Ok(rp)
    }

    /// Replaces the framebuffer-sized state for a new target size.
    pub fn set_size(&self, width: u32, height: u32) {
        let mut bufs = self.state.bufs.lock();
        bufs.viewport = Buffer::from_values(&[0.0, 0.0, width as f32, height as f32]);
        bufs.buffer_size = Buffer::from_values(&[width, height]);
        bufs.depth = Buffer::with_capacity((width * height) as usize);
        bufs.color = Buffer::with_capacity((width * height) as usize);
        bufs.pixel = Buffer::with_capacity_in((width * height) as usize, StorageClass::Direct);
        bind_fixed(&mut self.state.pipeline.lock(), &bufs);
        *self.state.size.lock() = (width, height);
    }

    pub fn size(&self) -> (u32, u32) {
        *self.state.size.lock()
    }

    /// The number of vertices the next frame draws (a multiple of 3).
    pub fn set_vertex_count(&self, n: usize) {
        self.state.vertex_count.store(n, Ordering::Relaxed);
    }

    /// Installs the fixed-function stage program.
    ///
    /// [`Rasterizer::new`] installs the built-in one; this is the hook for a
    /// custom stage implementation compiled elsewhere.
    pub fn set_rasterizer_program(&self, program: &Program) -> Result<()> {
        self.state.pipeline.lock().bind_kernels_from_program(program)?;
        let mut krn = self.state.krn.lock();
        krn.mark = Some(self.stage_kernel("mark_scanline")?);
        krn.fill = Some(self.stage_kernel("fill_scanline")?);
        krn.depth = Some(self.stage_kernel("depth_test")?);
        krn.adapt = Some(self.stage_kernel("adapt_pixel")?);
        Ok(())
    }

    /// Installs the user vertex program; its kernel must be named
    /// `vertex_shader` and declare the standard attribute arguments.
    pub fn set_vertex_shader_program(&self, program: &Program) -> Result<()> {
        self.state.pipeline.lock().bind_kernels_from_program(program)?;
        let kernel = self.checked_kernel(VERTEX_ENTRY, REQUIRED_VERTEX_ARGS)?;
        self.state.krn.lock().vertex = Some(kernel);
        Ok(())
    }

    /// Installs the user fragment program; its kernel must be named
    /// `fragment_shader` and declare the standard fragment arguments.
    pub fn set_fragment_shader_program(&self, program: &Program) -> Result<()> {
        self.state.pipeline.lock().bind_kernels_from_program(program)?;
        let kernel = self.checked_kernel(FRAGMENT_ENTRY, REQUIRED_FRAGMENT_ARGS)?;
        self.state.krn.lock().fragment = Some(kernel);
        Ok(())
    }

    /// Binds a user buffer (attributes, interpolants, uniforms) by name.
    pub fn bind_buffer(&self, name: &str, buf: impl Into<BufferHandle>) {
        self.state.pipeline.lock().bind_buffer(name, buf);
    }

    pub fn pixel_buffer(&self) -> Buffer<Rgba8> {
        self.state.bufs.lock().pixel.clone()
    }

    pub fn depth_buffer(&self) -> Buffer<i32> {
        self.state.bufs.lock().depth.clone()
    }

    pub fn color_buffer(&self) -> Buffer<Float4> {
        self.state.bufs.lock().color.clone()
    }

    /// Renders one frame; synchronous to the caller.
    pub fn render(&self) -> Result<()> {
        let st = &self.state;
        let frame = Instant::now();
        let p = st.base.clone();
        let p = p.then(stage(st, "setup", State::setup_stage))?;
        let p = p.then(stage(st, "clear_depth_buffer", State::clear_depth_buffer_stage))?;
        let p = p.then(stage(st, "clear_color_buffer", State::clear_color_buffer_stage))?;
        let p = p.then(stage(st, "vertex_shading", State::vertex_shading_stage))?;
        let p = p.then(stage(st, "estimate_mark_size", State::estimate_mark_size_stage))?;
        let p = p.then(stage(st, "check_mark_size", State::check_mark_size_stage))?;
        let p = p.then(stage(st, "mark_scanline", State::mark_scanline_stage))?;
        let p = p.then(stage(st, "check_fragment_size", State::check_fragment_size_stage))?;
        let p = p.then(stage(st, "fill_scanline", State::fill_scanline_stage))?;
        let p = p.then(stage(st, "depth_test", State::depth_test_stage))?;
        let p = p.then(stage(st, "fragment_shading", State::fragment_shading_stage))?;
        let p = p.then(stage(st, "retrieve_pixel_buffer", State::retrieve_pixel_buffer_stage))?;
        p.then(wait())?;
        log::debug!("frame rendered in {:?}", frame.elapsed());
        Ok(())
    }

    fn stage_kernel(&self, name: &str) -> Result<Kernel> {
        self.state
            .pipeline
            .lock()
            .get_kernel(name)
            .ok_or_else(|| Error::Backend(format!("rasterizer program lacks kernel '{name}'")))
    }

    fn checked_kernel(&self, name: &str, required: &[&str]) -> Result<Kernel> {
        let kernel = self.stage_kernel(name)?;
        let indices = kernel.arg_indices()?;
        for arg in required {
            if !indices.contains_key(*arg) {
                return Err(Error::ShaderContract {
                    kernel: name.to_string(),
                    arg: arg.to_string(),
                });
            }
        }
        Ok(kernel)
    }
}

/// Wraps a device stage in `callc`, logging how long issuing it took.
fn stage<F>(state: &Arc<State>, name: &'static str, f: F) -> impl Runnable
where
    F: FnOnce(&State) -> Result<Promise> + Send + 'static,
{
    let st = state.clone();
    callc(move || {
        let started = Instant::now();
        let p = f(&st)?;
        log::debug!("{name}: issued in {:?}", started.elapsed());
        Ok(p)
    })
}

fn bind_fixed(pipeline: &mut Pipeline, bufs: &Bufs) {
    pipeline.bind_buffer("gclViewport", &bufs.viewport);
    pipeline.bind_buffer("gclBufferSize", &bufs.buffer_size);
    pipeline.bind_buffer("gclDepthBuffer", &bufs.depth);
    pipeline.bind_buffer("gclColorBuffer", &bufs.color);
    pipeline.bind_buffer("gclPixelBuffer", &bufs.pixel);
}

fn bind_dynamic(pipeline: &mut Pipeline, bufs: &Bufs) {
    pipeline.bind_buffer("gclMarkSize", &bufs.mark_size);
    pipeline.bind_buffer("gclFragmentSize", &bufs.fragment_size);
    pipeline.bind_buffer("gclMarkPos", &bufs.mark_pos);
    pipeline.bind_buffer("gclMarkInfo", &bufs.mark_info);
    pipeline.bind_buffer("gclFragPos", &bufs.frag_pos);
    pipeline.bind_buffer("gclFragInfo", &bufs.frag_info);
}

impl State {
    fn vertex_count(&self) -> usize {
        self.vertex_count.load(Ordering::Relaxed)
    }

    fn kernel(&self, pick: fn(&Kernels) -> Option<Kernel>, what: &str) -> Kernel {
        pick(&self.krn.lock())
            .unwrap_or_else(|| panic!("{what} program has not been installed"))
    }

    fn setup_stage(&self) -> Result<Promise> {
        let bufs = self.bufs.lock();
        let mut p = self.base.then(push(&bufs.viewport))?;
        let matrix = self.pipeline.lock().get_buffer("UniformMatrix");
        if let Some(matrix) = matrix {
            p = p.then(push(matrix))?;
        }
        Ok(p)
    }

    fn clear_depth_buffer_stage(&self) -> Result<Promise> {
        let bufs = self.bufs.lock();
        self.base.then(fill(&bufs.depth, i32::MAX))
    }

    fn clear_color_buffer_stage(&self) -> Result<Promise> {
        let bufs = self.bufs.lock();
        self.base.then(fill(&bufs.color, Float4::splat(255.0)))
    }

    fn vertex_shading_stage(&self) -> Result<Promise> {
        let kernel = self.kernel(|k| k.vertex.clone(), "vertex shader");
        self.base.then(run(&kernel, self.vertex_count()))
    }

    fn estimate_mark_size_stage(&self) -> Result<Promise> {
        let bufs = self.bufs.lock();
        bufs.mark_size.set(0, 0)?;
        bufs.fragment_size.set(0, 0)?;

        let mark = self.kernel(|k| k.mark.clone(), "rasterizer");
        if let Some(index) = mark.arg_index("gclMarkInfo")? {
            mark.set_null(index);
        }

        self.base
            .then(push(&bufs.mark_size))?
            .then(push(&bufs.fragment_size))?
            .then(run(&mark, self.vertex_count() / 3))?
            .then(pull(&bufs.mark_size))
    }

    fn check_mark_size_stage(&self) -> Result<Promise> {
        let mut bufs = self.bufs.lock();
        let needed = bufs.mark_size.get(0)? as usize;
        if needed > bufs.mark_pos.len() || needed > bufs.mark_info.len() {
            let capacity = needed.next_power_of_two();
            log::debug!("growing mark buffers to {capacity}");
            bufs.mark_pos = Buffer::with_capacity_in(capacity, StorageClass::HostMap);
            bufs.mark_info = Buffer::with_capacity_in(capacity, StorageClass::HostMap);
        }
        // Rebinding gclMarkInfo also replaces the null argument the probe
        // installed on the marker.
        let mut pipeline = self.pipeline.lock();
        pipeline.bind_buffer("gclMarkPos", &bufs.mark_pos);
        pipeline.bind_buffer("gclMarkInfo", &bufs.mark_info);
        Ok(self.base.clone())
    }

    fn mark_scanline_stage(&self) -> Result<Promise> {
        let bufs = self.bufs.lock();
        bufs.mark_size.set(0, 0)?;
        bufs.fragment_size.set(0, 0)?;

        let mark = self.kernel(|k| k.mark.clone(), "rasterizer");
        self.base
            .then(push(&bufs.mark_size))?
            .then(push(&bufs.fragment_size))?
            .then(run(&mark, self.vertex_count() / 3))?
            .then(pull(&bufs.mark_size))?
            .then(pull(&bufs.fragment_size))
    }

    fn check_fragment_size_stage(&self) -> Result<Promise> {
        let mut bufs = self.bufs.lock();
        let fill_kernel = self.kernel(|k| k.fill.clone(), "rasterizer");
        fill_kernel.set_range(bufs.mark_size.get(0)? as usize / 2);

        let needed = bufs.fragment_size.get(0)? as usize;
        if needed > bufs.frag_pos.len() || needed > bufs.frag_info.len() {
            let capacity = needed.next_power_of_two();
            log::debug!("growing fragment buffers to {capacity}");
            bufs.frag_pos = Buffer::with_capacity_in(capacity, StorageClass::HostMap);
            bufs.frag_info = Buffer::with_capacity_in(capacity, StorageClass::HostMap);
            let mut pipeline = self.pipeline.lock();
            pipeline.bind_buffer("gclFragPos", &bufs.frag_pos);
            pipeline.bind_buffer("gclFragInfo", &bufs.frag_info);
        }
        bufs.fragment_size.set(0, 0)?;
        Ok(self.base.clone())
    }

    fn fill_scanline_stage(&self) -> Result<Promise> {
        let bufs = self.bufs.lock();
        let fill_kernel = self.kernel(|k| k.fill.clone(), "rasterizer");
        self.base
            .then(push(&bufs.fragment_size))?
            .then(run(&fill_kernel, 0))?
            .then(pull(&bufs.fragment_size))
    }

    fn depth_test_stage(&self) -> Result<Promise> {
        let bufs = self.bufs.lock();
        let depth = self.kernel(|k| k.depth.clone(), "rasterizer");
        let fragments = bufs.fragment_size.get(0)? as usize;
        self.base
            .then(push(&bufs.buffer_size))?
            .then(run(&depth, fragments))
    }

    fn fragment_shading_stage(&self) -> Result<Promise> {
        let bufs = self.bufs.lock();
        let fragment = self.kernel(|k| k.fragment.clone(), "fragment shader");
        let adapt = self.kernel(|k| k.adapt.clone(), "rasterizer");
        let fragments = bufs.fragment_size.get(0)? as usize;
        self.base
            .then(run(&fragment, fragments))?
            .then(run(&adapt, bufs.pixel.len()))
    }

    fn retrieve_pixel_buffer_stage(&self) -> Result<Promise> {
        let bufs = self.bufs.lock();
        self.base.then(pull(&bufs.pixel))
    }
}

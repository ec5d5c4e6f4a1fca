// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Programs and kernels.
//!
//! A program is a compiled WGSL unit. Compilation parses and validates the
//! source with naga and records, per compute entry point, the workgroup size
//! and the set of resource bindings the entry point actually uses: the
//! *argument-name → argument-index* map that drives pipeline auto-wiring.
//! The map is exposed only when the program was compiled with
//! [`CompileOptions::arg_info`]; kernels of a stripped program report
//! [`Error::ReflectionUnavailable`].
//!
//! A kernel may additionally carry a registered CPU twin, which the CPU
//! device invokes in place of a device pipeline.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use naga::valid::{Capabilities, ValidationFlags};
use parking_lot::Mutex;

use crate::buffer::BufferHandle;
use crate::cpu_dispatch::CpuKernelFn;
use crate::wgpu_engine::WgpuState;
use crate::{Error, Result};

/// Options controlling [`compile`].
#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    arg_info: bool,
}

impl CompileOptions {
    /// Retain the argument-name reflection tables.
    pub fn arg_info(mut self, keep: bool) -> Self {
        self.arg_info = keep;
        self
    }
}

#[derive(Clone)]
pub(crate) struct EntryMeta {
    pub name: String,
    pub workgroup_size: [u32; 3],
    /// Binding name → binding index, for the bindings this entry point uses.
    pub args: BTreeMap<String, u32>,
}

struct ProgramInner {
    source: String,
    entries: Vec<EntryMeta>,
    arg_info: bool,
    cpu: Mutex<HashMap<String, CpuKernelFn>>,
    module: Mutex<Option<Arc<wgpu::ShaderModule>>>,
}

/// A compiled kernel-source unit.
#[derive(Clone)]
pub struct Program {
    inner: Arc<ProgramInner>,
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program").finish_non_exhaustive()
    }
}

/// Compiles a WGSL source string.
///
/// On rejection the error carries the first ~50 characters of the source and
/// the compiler diagnostic rendered against it.
pub fn compile(source: &str, options: &CompileOptions) -> Result<Program> {
    let head = || source.chars().take(50).collect::<String>();
    let module = naga::front::wgsl::parse_str(source).map_err(|e| Error::Compile {
        head: head(),
        log: e.emit_to_string_with_path(source, "kernel"),
    })?;
    let info = naga::valid::Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| Error::Compile {
            head: head(),
            log: e.emit_to_string_with_path(source, "kernel"),
        })?;

    let mut entries = Vec::new();
    for (index, entry) in module.entry_points.iter().enumerate() {
        if entry.stage != naga::ShaderStage::Compute {
            continue;
        }
        let entry_info = info.get_entry_point(index);
        let mut args = BTreeMap::new();
        for (handle, var) in module.global_variables.iter() {
            if entry_info[handle].is_empty() {
                continue;
            }
            let Some(binding) = &var.binding else {
                continue;
            };
            if binding.group != 0 {
                continue;
            }
            let name = var.name.clone().unwrap_or_default();
            args.insert(name, binding.binding);
        }
        entries.push(EntryMeta {
            name: entry.name.clone(),
            workgroup_size: entry.workgroup_size,
            args,
        });
    }

    Ok(Program {
        inner: Arc::new(ProgramInner {
            source: source.to_string(),
            entries,
            arg_info: options.arg_info,
            cpu: Mutex::new(HashMap::new()),
            module: Mutex::new(None),
        }),
    })
}

impl Program {
    /// The names of the program's compute entry points.
    pub fn kernel_names(&self) -> Vec<String> {
        self.inner.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Registers a CPU twin under an entry-point name.
    pub fn register_cpu_kernel(&self, name: &str, f: CpuKernelFn) -> Result<()> {
        if !self.inner.entries.iter().any(|e| e.name == name) {
            return Err(Error::Backend(format!(
                "program has no kernel named '{name}'"
            )));
        }
        self.inner.cpu.lock().insert(name.to_string(), f);
        Ok(())
    }

    pub(crate) fn cpu_kernel(&self, name: &str) -> Option<CpuKernelFn> {
        self.inner.cpu.lock().get(name).copied()
    }

    pub(crate) fn entry(&self, name: &str) -> Option<&EntryMeta> {
        self.inner.entries.iter().find(|e| e.name == name)
    }

    pub(crate) fn arg_info(&self) -> bool {
        self.inner.arg_info
    }

    pub(crate) fn shader_module(&self, state: &WgpuState) -> Arc<wgpu::ShaderModule> {
        let mut slot = self.inner.module.lock();
        slot.get_or_insert_with(|| {
            Arc::new(
                state
                    .device
                    .create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: None,
                        source: wgpu::ShaderSource::Wgsl(self.inner.source.as_str().into()),
                    }),
            )
        })
        .clone()
    }
}

pub(crate) type ArgTable = BTreeMap<u32, Option<BufferHandle>>;

struct KernelInner {
    program: Program,
    meta: EntryMeta,
    range: AtomicUsize,
    /// Argument index → binding; `None` marks an explicit null binding.
    args: Mutex<ArgTable>,
    gpu: Mutex<Option<Arc<wgpu::ComputePipeline>>>,
}

/// A callable entry point of a [`Program`].
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Kernel {
    pub fn new(program: &Program, name: &str) -> Result<Kernel> {
        let meta = program
            .entry(name)
            .ok_or_else(|| Error::Backend(format!("program has no kernel named '{name}'")))?
            .clone();
        Ok(Kernel {
            inner: Arc::new(KernelInner {
                program: program.clone(),
                meta,
                range: AtomicUsize::new(1),
                args: Mutex::new(BTreeMap::new()),
                gpu: Mutex::new(None),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.meta.name
    }

    pub fn program(&self) -> &Program {
        &self.inner.program
    }

    /// The argument-name → argument-index map.
    pub fn arg_indices(&self) -> Result<&BTreeMap<String, u32>> {
        if !self.inner.program.arg_info() {
            return Err(Error::ReflectionUnavailable);
        }
        Ok(&self.inner.meta.args)
    }

    /// The index of argument `name`, or `None` when the kernel has no such
    /// argument.
    pub fn arg_index(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.arg_indices()?.get(name).copied())
    }

    pub fn set_buffer(&self, index: u32, buf: impl Into<BufferHandle>) {
        self.inner.args.lock().insert(index, Some(buf.into()));
    }

    /// Marks argument `index` as deliberately unbound.
    pub fn set_null(&self, index: u32) {
        self.inner.args.lock().insert(index, None);
    }

    /// The launch size used when `run` is not given an explicit one.
    pub fn range(&self) -> usize {
        self.inner.range.load(Ordering::Relaxed)
    }

    pub fn set_range(&self, range: usize) {
        self.inner.range.store(range, Ordering::Relaxed);
    }

    pub(crate) fn same(&self, other: &Kernel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn args_snapshot(&self) -> ArgTable {
        self.inner.args.lock().clone()
    }

    /// The internal binding table, independent of the `arg_info` gate.
    pub(crate) fn arg_bindings(&self) -> &BTreeMap<String, u32> {
        &self.inner.meta.args
    }

    pub(crate) fn workgroup_size(&self) -> [u32; 3] {
        self.inner.meta.workgroup_size
    }

    pub(crate) fn gpu_pipeline(&self, state: &WgpuState) -> Result<Arc<wgpu::ComputePipeline>> {
        let mut slot = self.inner.gpu.lock();
        if let Some(pipeline) = &*slot {
            return Ok(pipeline.clone());
        }
        let module = self.inner.program.shader_module(state);
        let pipeline = Arc::new(state.device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(&self.inner.meta.name),
                layout: None,
                module: &module,
                entry_point: &self.inner.meta.name,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            },
        ));
        *slot = Some(pipeline.clone());
        Ok(pipeline)
    }
}

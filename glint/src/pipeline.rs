// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Name-based wiring of buffers and kernels.
//!
//! A pipeline records buffer bindings by name and kernel bindings by name,
//! plus a reverse index from buffer names to every `(kernel, argument)` site
//! using that name. Binding is *late*: registering a kernel after the
//! buffers, or the buffers after the kernel, yields the same final wiring,
//! and rebinding a buffer under an existing name replaces it for every
//! kernel referencing it.

use std::collections::BTreeMap;

use crate::buffer::BufferHandle;
use crate::program::{Kernel, Program};
use crate::Result;

#[derive(Default)]
pub struct Pipeline {
    kernels: BTreeMap<String, Kernel>,
    buffers: BTreeMap<String, BufferHandle>,
    /// Buffer name → the argument sites it feeds.
    sites: BTreeMap<String, Vec<(Kernel, u32)>>,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline::default()
    }

    /// Binds `buf` under `name` and wires it into every known argument site.
    pub fn bind_buffer(&mut self, name: &str, buf: impl Into<BufferHandle>) {
        let buf = buf.into();
        if let Some(sites) = self.sites.get(name) {
            for (kernel, index) in sites {
                kernel.set_buffer(*index, buf.clone());
            }
        }
        self.buffers.insert(name.to_string(), buf);
    }

    /// Binds `kernel` under `name` and wires every already-bound buffer into
    /// its matching arguments.
    ///
    /// Fails when the kernel's program was compiled without argument
    /// reflection.
    pub fn bind_kernel(&mut self, name: &str, kernel: &Kernel) -> Result<()> {
        for (arg_name, &index) in kernel.arg_indices()? {
            let sites = self.sites.entry(arg_name.clone()).or_default();
            if !sites.iter().any(|(k, i)| k.same(kernel) && *i == index) {
                sites.push((kernel.clone(), index));
            }
            if let Some(buf) = self.buffers.get(arg_name) {
                kernel.set_buffer(index, buf.clone());
            }
        }
        self.kernels.insert(name.to_string(), kernel.clone());
        Ok(())
    }

    /// Creates and binds a kernel for every compute entry point of `program`,
    /// each under its function name.
    pub fn bind_kernels_from_program(&mut self, program: &Program) -> Result<()> {
        for name in program.kernel_names() {
            let kernel = Kernel::new(program, &name)?;
            self.bind_kernel(&name, &kernel)?;
        }
        Ok(())
    }

    pub fn get_kernel(&self, name: &str) -> Option<Kernel> {
        self.kernels.get(name).cloned()
    }

    pub fn get_buffer(&self, name: &str) -> Option<BufferHandle> {
        self.buffers.get(name).cloned()
    }
}

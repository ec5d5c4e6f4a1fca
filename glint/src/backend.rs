// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Platform and device enumeration.
//!
//! Two platforms exist: the host platform, whose single CPU device is always
//! available, and the GPU platform backed by a wgpu instance whose devices
//! are the enumerated adapters. A platform with no devices of the requested
//! kind contributes an empty slice, never an error.

use std::sync::Arc;

/// The kind of devices to enumerate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceKind {
    #[default]
    Default,
    Cpu,
    Gpu,
    All,
}

pub struct Platform {
    kind: PlatformKind,
}

enum PlatformKind {
    Host,
    Gpu(Arc<wgpu::Instance>),
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self.kind {
            PlatformKind::Host => "host",
            PlatformKind::Gpu(_) => "wgpu",
        }
    }
}

/// All available platforms.
pub fn platforms() -> Vec<Platform> {
    vec![
        Platform {
            kind: PlatformKind::Host,
        },
        Platform {
            kind: PlatformKind::Gpu(Arc::new(wgpu::Instance::new(
                wgpu::InstanceDescriptor::default(),
            ))),
        },
    ]
}

/// A compute device.
#[derive(Clone)]
pub struct Device {
    pub(crate) repr: DeviceRepr,
}

#[derive(Clone)]
pub(crate) enum DeviceRepr {
    Cpu,
    Adapter(Arc<wgpu::Adapter>),
}

impl Device {
    pub fn name(&self) -> String {
        match &self.repr {
            DeviceRepr::Cpu => "host worker".to_string(),
            DeviceRepr::Adapter(adapter) => adapter.get_info().name,
        }
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self.repr, DeviceRepr::Cpu)
    }
}

/// Enumerates the devices of `kind` across `platforms`.
///
/// The host device sorts first, so `devices(..).last()` prefers a GPU when
/// one exists.
pub fn devices(platforms: &[Platform], kind: DeviceKind) -> Vec<Device> {
    let mut out = Vec::new();
    for platform in platforms {
        match &platform.kind {
            PlatformKind::Host => {
                if matches!(kind, DeviceKind::Default | DeviceKind::Cpu | DeviceKind::All) {
                    out.push(Device {
                        repr: DeviceRepr::Cpu,
                    });
                }
            }
            PlatformKind::Gpu(instance) => {
                if matches!(kind, DeviceKind::Default | DeviceKind::Gpu | DeviceKind::All) {
                    for adapter in instance.enumerate_adapters(wgpu::Backends::all()) {
                        out.push(Device {
                            repr: DeviceRepr::Adapter(Arc::new(adapter)),
                        });
                    }
                }
            }
        }
    }
    out
}

//! Device contexts identifying where a resource or tensor lives.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    /// General-purpose host processor.
    Cpu,
    /// Accelerator device.
    Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    device: Device,
    id: u32,
}

impl Context {
    pub fn new(device: Device, id: u32) -> Self {
        Context { device, id }
    }

    pub fn cpu() -> Self {
        Context::new(Device::Cpu, 0)
    }

    pub fn gpu(id: u32) -> Self {
        Context::new(Device::Gpu, id)
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_accelerator(&self) -> bool {
        self.device == Device::Gpu
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::cpu()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device {
            Device::Cpu => write!(f, "cpu({})", self.id),
            Device::Gpu => write!(f, "gpu({})", self.id),
        }
    }
}

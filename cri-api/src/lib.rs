mod client;
mod error;
mod filter;
mod types;

pub use client::RuntimeClient;
pub use error::{Result, RuntimeError};
pub use filter::{SandboxFilter, StatsFilter};
pub use types::{
    CpuUsage, LinuxPodSandboxStats, MemoryUsage, PodSandboxStats, RuntimeVersion,
    SandboxDescriptor, SandboxState,
};

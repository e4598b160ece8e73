//! # Rig Control
//!
//! The rig's motion core: servo registry, safety system, preset engine,
//! timeline engine and the operator command surface.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  CommandProcessor (protocol-agnostic verbs)               │
//! ├──────────────┬───────────────┬────────────────────────────┤
//! │ PresetEngine │ TimelineEngine│ SafetySystem (watchdog,    │
//! │ (30 Hz)      │ (60 Hz)       │  poses, preflight, 100 ms) │
//! ├──────────────┴───────────────┴────────────────────────────┤
//! │  OutputStage: clamp → orient → drive                      │
//! ├──────────────────────────┬────────────────────────────────┤
//! │  ServoRegistry           │  ServoBus (single writer)      │
//! └──────────────────────────┴────────────────────────────────┘
//! ```
//!
//! Writes from the two engines are last-writer-wins per channel; the bus
//! serializes them but applies no priority.

pub mod command;
pub mod output;
pub mod preset;
pub mod registry;
pub mod rig;
pub mod safety;
pub mod status;
pub mod timeline;

pub use command::{Command, CommandOutput, CommandProcessor};
pub use output::OutputStage;
pub use registry::{Resolution, ServoRegistry, ServoView};
pub use rig::Rig;
pub use safety::SafetySystem;
pub use status::RigStatus;
pub use timeline::TimelineEngine;

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::warn;

/// Join a worker with a deadline; a stuck worker is detached, not waited
/// on forever.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = name, "worker did not stop in time, detaching");
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    let _ = handle.join();
}

//! Audio output backends for the voxgraph audio host.

mod cpal_backend;
mod null_backend;
mod ring;
mod traits;

pub use cpal_backend::CpalOutput;
pub use null_backend::NullBackend;
pub use ring::SlotRing;
pub use traits::{AudioError, Backend, BackendEvent};

//! The one-call DSP plugin contract.

use std::sync::Arc;

/// Buffers handed to a plugin for one tick, as normalized `f32`.
pub struct PluginIo<'a> {
    pub input: &'a [f32],
    pub output: &'a mut [f32],
}

/// A plugin instance that processes one tick at a time.
///
/// Input ports are pushed with `set_control` before `run`; output controls are
/// read back after it.
pub trait DspPlugin: Send {
    /// Receive the plain value of an input port.
    fn set_control(&mut self, _port: &str, _value: f64) {}

    /// Process `sample_count` samples from `io.input` into `io.output`.
    fn run(&mut self, io: PluginIo<'_>, sample_count: usize);

    /// Value of an output control after `run`.
    fn control_output(&self, _port: &str) -> Option<f64> {
        None
    }
}

/// Creates one plugin instance per runtime instance.
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn DspPlugin> + Send + Sync>;

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Multiplies by its `gain` control and reports the peak.
    #[derive(Default)]
    pub struct GainPlugin {
        pub gain: f64,
        pub peak: f64,
    }

    impl DspPlugin for GainPlugin {
        fn set_control(&mut self, port: &str, value: f64) {
            if port == "gain" {
                self.gain = value;
            }
        }

        fn run(&mut self, io: PluginIo<'_>, sample_count: usize) {
            self.peak = 0.0;
            for (o, i) in io.output.iter_mut().zip(io.input).take(sample_count) {
                *o = *i * self.gain as f32;
                self.peak = self.peak.max(f64::from(o.abs()));
            }
        }

        fn control_output(&self, port: &str) -> Option<f64> {
            (port == "peak").then_some(self.peak)
        }
    }
}

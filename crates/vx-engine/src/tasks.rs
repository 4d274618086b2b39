//! Built-in tasks the control side hands to the engine.

use std::sync::Arc;

use tracing::warn;
use vx_ir::SoundScope;

use crate::engine::Engine;
use crate::port::{Port, Units};
use crate::task_launcher::Task;
use crate::voice::VoiceSpec;

/// Start a voice on the next tick. The [`VoiceSpec`] is consumed on first
/// launch.
pub struct StartVoice {
    pub scope: SoundScope,
    pub spec: Option<VoiceSpec>,
    pub attack: usize,
}

impl StartVoice {
    pub fn new(scope: SoundScope, spec: VoiceSpec, attack: usize) -> Self {
        Self {
            scope,
            spec: Some(spec),
            attack,
        }
    }
}

impl Task<Engine> for StartVoice {
    fn launch(&mut self, engine: &mut Engine) {
        let Some(spec) = self.spec.take() else {
            return;
        };
        if let Err(e) = engine.start_voice(self.scope, spec, self.attack) {
            warn!(scope = self.scope.name(), error = %e, "voice start failed");
        }
    }
}

pub struct StopVoice {
    pub scope: SoundScope,
    pub tag: u64,
}

impl Task<Engine> for StopVoice {
    fn launch(&mut self, engine: &mut Engine) {
        engine.stop_voice(self.scope, self.tag);
    }
}

/// Cyclic: evaluate the port's bound automation at the current tick and
/// write the result through the port.
///
/// When several curves are bound the last one wins.
pub struct ApplyAutomation {
    pub port: Arc<Port>,
    pub units: Units,
}

impl Task<Engine> for ApplyAutomation {
    fn launch(&mut self, engine: &mut Engine) {
        let tick = engine.clock().note_offset();
        let Some(&value) = self.port.automation_values(tick).last() else {
            return;
        };
        if let Err(e) = self.port.write_scalar(f64::from(value), self.units) {
            warn!(port = self.port.name(), error = %e, "automation write rejected");
        }
    }
}

/// The backend fell behind; flag every mix target for resynchronization.
pub struct ReportBacklog;

impl Task<Engine> for ReportBacklog {
    fn launch(&mut self, engine: &mut Engine) {
        engine.report_backlog();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortValue;
    use crate::topology::{AudioFlags, Topology};
    use vx_ir::{Automation, AutomationPoint, Conversion, Presets, SampleFormat};

    fn engine() -> Engine {
        let presets = Presets::new(1, 48000, 8, SampleFormat::Float);
        let mut topo = Topology::new();
        let master = topo.add_audio("master", AudioFlags::all_abilities(), presets, (1, 1), (0, 0));
        topo.set_master(master);
        Engine::new(topo, presets, 120.0)
    }

    #[test]
    fn automation_writes_through_the_port() {
        let mut engine = engine();
        let port = Arc::new(
            Port::new("cutoff", PortValue::Float(0.0)).with_conversion(Conversion::linear(0.0, 100.0)),
        );
        port.bind_automation(Automation::new(&[AutomationPoint::linear(0, 0.5)], false));

        let launcher = engine.launcher();
        let id = launcher.add_cyclic_task(ApplyAutomation {
            port: port.clone(),
            units: Units::Normalized,
        });
        launcher.run(&mut engine);
        assert_eq!(port.read_f64(), 50.0);

        port.safe_write(PortValue::Float(10.0)).unwrap();
        launcher.run(&mut engine);
        assert_eq!(port.read_f64(), 50.0);
        launcher.remove_cyclic_task(id);
        port.safe_write(PortValue::Float(10.0)).unwrap();
        launcher.run(&mut engine);
        assert_eq!(port.read_f64(), 10.0);
    }

    #[test]
    fn unbound_port_is_left_alone() {
        let mut engine = engine();
        let port = Arc::new(Port::new("gain", PortValue::Double(0.3)));
        let mut task = ApplyAutomation {
            port: port.clone(),
            units: Units::Plain,
        };
        task.launch(&mut engine);
        assert_eq!(port.read_f64(), 0.3);
    }

    #[test]
    fn start_voice_launches_once() {
        let mut engine = engine();
        let bogus = VoiceSpec::new(1, Default::default(), &[]);
        let mut task = StartVoice::new(SoundScope::Playback, bogus, 0);
        task.launch(&mut engine);
        assert!(task.spec.is_none());
        task.launch(&mut engine);
        assert_eq!(engine.active_voices(), 0);
    }
}

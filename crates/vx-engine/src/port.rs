//! Ports: thread-safe named parameter cells.
//!
//! A port's value is only reached through `safe_read`/`safe_write`, which take
//! the port's lock for the duration of one copy. Values are stored in plain
//! units; a bound [`Conversion`] maps them to and from the normalized view.

use std::sync::{Mutex, PoisonError};

use tracing::warn;
use vx_ir::{Automation, Conversion};

/// A port value.
#[derive(Clone, Debug, PartialEq)]
pub enum PortValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f32),
    Double(f64),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
}

impl PortValue {
    fn same_kind(&self, other: &PortValue) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }

    /// Scalar view as `f64`. Arrays read their first element.
    pub fn as_f64(&self) -> f64 {
        match self {
            PortValue::Bool(b) => f64::from(u8::from(*b)),
            PortValue::Int(v) => *v as f64,
            PortValue::Uint(v) => *v as f64,
            PortValue::Float(v) => f64::from(*v),
            PortValue::Double(v) => *v,
            PortValue::FloatArray(a) => a.first().map_or(0.0, |v| f64::from(*v)),
            PortValue::DoubleArray(a) => a.first().copied().unwrap_or(0.0),
        }
    }

    /// A value of the same kind as `self` holding `value`.
    fn with_scalar(&self, value: f64) -> PortValue {
        match self {
            PortValue::Bool(_) => PortValue::Bool(value >= 0.5),
            PortValue::Int(_) => PortValue::Int(value.round() as i64),
            PortValue::Uint(_) => PortValue::Uint(value.max(0.0).round() as u64),
            PortValue::Float(_) => PortValue::Float(value as f32),
            PortValue::Double(_) => PortValue::Double(value),
            PortValue::FloatArray(a) => PortValue::FloatArray(vec![value as f32; a.len()]),
            PortValue::DoubleArray(a) => PortValue::DoubleArray(vec![value; a.len()]),
        }
    }

    /// Apply `f` to every floating point component. Other kinds are untouched.
    fn map_float(&self, f: impl Fn(f64) -> Option<f64>) -> Option<PortValue> {
        Some(match self {
            PortValue::Float(v) => PortValue::Float(f(f64::from(*v))? as f32),
            PortValue::Double(v) => PortValue::Double(f(*v)?),
            PortValue::FloatArray(a) => PortValue::FloatArray(
                a.iter()
                    .map(|v| f(f64::from(*v)).map(|x| x as f32))
                    .collect::<Option<_>>()?,
            ),
            PortValue::DoubleArray(a) => {
                PortValue::DoubleArray(a.iter().map(|v| f(*v)).collect::<Option<_>>()?)
            }
            other => other.clone(),
        })
    }
}

/// Which side of a port's conversion a value is expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Units {
    /// The port's own range, as the DSP code reads it.
    Plain,
    /// `[0, 1]`, as a control surface presents it.
    Normalized,
}

/// Port flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortFlags {
    /// Written by its recall only; control writes are rejected.
    pub output: bool,
    /// Callers of `safe_read`/`safe_write` always work in normalized units.
    pub convert_always: bool,
}

/// Errors from port access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    /// Write to an output port.
    ReadOnly(String),
    /// Value kind does not match the port's.
    TypeMismatch(String),
}

impl std::fmt::Display for PortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortError::ReadOnly(name) => write!(f, "Port {} is read-only", name),
            PortError::TypeMismatch(name) => write!(f, "Value kind mismatch on port {}", name),
        }
    }
}

impl std::error::Error for PortError {}

/// A named parameter cell.
#[derive(Debug)]
pub struct Port {
    name: String,
    flags: PortFlags,
    conversion: Option<Conversion>,
    value: Mutex<PortValue>,
    automation: Mutex<Vec<Automation>>,
}

impl Port {
    pub fn new(name: &str, value: PortValue) -> Self {
        Self {
            name: name.into(),
            flags: PortFlags::default(),
            conversion: None,
            value: Mutex::new(value),
            automation: Mutex::new(Vec::new()),
        }
    }

    pub fn with_flags(mut self, flags: PortFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = Some(conversion);
        self
    }

    pub fn output(mut self) -> Self {
        self.flags.output = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> PortFlags {
        self.flags
    }

    pub fn conversion(&self) -> Option<Conversion> {
        self.conversion
    }

    fn caller_units(&self) -> Units {
        if self.flags.convert_always {
            Units::Normalized
        } else {
            Units::Plain
        }
    }

    /// Read in the caller's default units.
    pub fn safe_read(&self) -> PortValue {
        self.safe_read_as(self.caller_units())
    }

    /// Read in the given units.
    pub fn safe_read_as(&self, units: Units) -> PortValue {
        let plain = self.safe_read_raw();
        match (units, self.conversion) {
            (Units::Normalized, Some(conversion)) => {
                match plain.map_float(|v| conversion.to_normalized(v)) {
                    Some(value) => value,
                    None => {
                        warn!(port = %self.name, "degenerate conversion range, reading plain value");
                        plain
                    }
                }
            }
            _ => plain,
        }
    }

    /// Read as `f64` in plain units.
    pub fn read_f64(&self) -> f64 {
        self.safe_read_as(Units::Plain).as_f64()
    }

    /// Write in the caller's default units.
    pub fn safe_write(&self, value: PortValue) -> Result<(), PortError> {
        self.safe_write_as(value, self.caller_units())
    }

    /// Write in the given units. Output ports reject the write.
    ///
    /// A degenerate conversion range skips the write and logs a warning.
    pub fn safe_write_as(&self, value: PortValue, units: Units) -> Result<(), PortError> {
        if self.flags.output {
            return Err(PortError::ReadOnly(self.name.clone()));
        }
        let plain = match (units, self.conversion) {
            (Units::Normalized, Some(conversion)) => {
                match value.map_float(|v| conversion.to_plain(v)) {
                    Some(plain) => plain,
                    None => {
                        warn!(port = %self.name, "degenerate conversion range, write skipped");
                        return Ok(());
                    }
                }
            }
            _ => value,
        };
        self.store(plain)
    }

    /// Write a scalar in `units`, adapting it to the port's value kind.
    pub fn write_scalar(&self, value: f64, units: Units) -> Result<(), PortError> {
        let shaped = self.safe_read_raw().with_scalar(value);
        self.safe_write_as(shaped, units)
    }

    /// Owner-side scalar write in plain units, adapted to the port's value kind.
    pub fn write_scalar_raw(&self, value: f64) -> Result<(), PortError> {
        let shaped = self.safe_read_raw().with_scalar(value);
        self.store(shaped)
    }

    /// Owner-side read of the stored plain value.
    pub fn safe_read_raw(&self) -> PortValue {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Owner-side write of a plain value; bypasses the output check.
    pub fn safe_write_raw(&self, value: PortValue) -> Result<(), PortError> {
        self.store(value)
    }

    fn store(&self, value: PortValue) -> Result<(), PortError> {
        let mut guard = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.same_kind(&value) {
            return Err(PortError::TypeMismatch(self.name.clone()));
        }
        *guard = value;
        Ok(())
    }

    /// Bind another automation curve.
    pub fn bind_automation(&self, automation: Automation) {
        self.automation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(automation);
    }

    pub fn unbind_automation(&self) {
        self.automation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Values of every bound curve at `tick`, in binding order.
    pub fn automation_values(&self, tick: u64) -> Vec<f32> {
        self.automation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|a| a.value_at(tick))
            .collect()
    }
}

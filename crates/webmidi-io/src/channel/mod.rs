//! Per-channel views of a port.

mod input;
mod output;

pub use input::InputChannel;
pub use output::{ControlValue, Controller, OutputChannel, Parameter, PolyphonicMode};

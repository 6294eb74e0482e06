// src/monitor/mod.rs
pub mod alarm;
pub mod buffer;
pub mod parser;
pub mod scope;
pub mod session;
pub mod synth;
pub mod transport;

pub use alarm::{LeadAlarm, ALARM_HOLD};
pub use buffer::{Sample, SampleBuffer, CAPACITY};
pub use parser::{LineParser, ParseEvent};
pub use scope::{ScopeSurface, GRID_STEP, WINDOW_MS};
pub use session::{
    epoch_ms, shared_scope, AcquisitionMode, ConnectFailure, MonitorSession, Rejection,
    ScopeState, SharedScope,
};
pub use synth::{WaveSynth, CYCLE_MS, FAULT_PROBABILITY, HEART_RATE_BPM, TICK_MS};
pub use transport::{
    available_ports, Chunk, SampleTransport, ScriptedTransport, SerialLink, TransportError,
    BAUD_RATE,
};

// src/types.rs
use crate::monitor::AcquisitionMode;

/// Requests the GUI sends to the acquisition engine.
#[derive(Clone, Debug)]
pub enum GuiCommand {
    /// Connect to the selected serial port; `None` means the user never
    /// picked one.
    Connect(Option<String>),
    Disconnect,
    ToggleMonitoring,
    EnableSynthetic,
    DisableSynthetic,
    Clear,
}

/// Feedback the engine publishes back to the GUI.
#[derive(Clone, Debug)]
pub enum EngineMessage {
    /// The session mode after a (possibly refused) transition request.
    Mode(AcquisitionMode),
    /// Informational notice for the event log.
    Log(String),
    /// Failure or rejection notice, rendered in the warning color.
    Alert(String),
}

// src/engine.rs
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::monitor::{
    AcquisitionMode, MonitorSession, SampleTransport, SerialLink, SharedScope, TransportError,
};
use crate::types::{EngineMessage, GuiCommand};

const IDLE_SLEEP: Duration = Duration::from_millis(50);
// Finer than the 10 ms synthesizer cadence; missed ticks are caught up.
const SYNTH_SLEEP: Duration = Duration::from_millis(2);

/// Starts the acquisition engine on its own thread. The engine owns the
/// session and is the only producer writing into the shared scope state;
/// it exits when the command channel closes.
pub fn spawn(
    scope: SharedScope,
    rx_cmd: Receiver<GuiCommand>,
    tx: Sender<EngineMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || run(scope, rx_cmd, tx))
}

fn run(scope: SharedScope, rx_cmd: Receiver<GuiCommand>, tx: Sender<EngineMessage>) {
    let mut session = MonitorSession::new(scope);
    tx.send(EngineMessage::Log("Acquisition engine ready.".to_owned()))
        .ok();

    loop {
        // Drain a bounded batch of commands per iteration.
        for _ in 0..10 {
            match rx_cmd.try_recv() {
                Ok(cmd) => handle_command(&mut session, cmd, &tx),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    session.disconnect();
                    info!("command channel closed, engine stopping");
                    return;
                }
            }
        }

        let now = Instant::now();
        match session.mode() {
            AcquisitionMode::Connected { .. } => {
                if session.stream_done() {
                    thread::sleep(IDLE_SLEEP);
                } else if let Err(err) = session.pump_live(now) {
                    // The session has already force-disconnected.
                    warn!("stream failure: {err}");
                    tx.send(EngineMessage::Alert(format!("Connection lost: {err}")))
                        .ok();
                    tx.send(EngineMessage::Mode(session.mode())).ok();
                }
                // pump_live blocks for at most the transport read timeout,
                // which paces this branch.
            }
            AcquisitionMode::Synthetic { monitoring: true } => {
                session.pump_synthetic(now);
                thread::sleep(SYNTH_SLEEP);
            }
            _ => thread::sleep(IDLE_SLEEP),
        }
    }
}

fn handle_command(session: &mut MonitorSession, cmd: GuiCommand, tx: &Sender<EngineMessage>) {
    match cmd {
        GuiCommand::Connect(port) => {
            let outcome = session.connect(move || {
                let port = port.ok_or(TransportError::UserCancelled)?;
                let link = SerialLink::open(&port)?;
                Ok(Box::new(link) as Box<dyn SampleTransport>)
            });
            match outcome {
                Ok(()) => {
                    tx.send(EngineMessage::Log("Connected to device.".to_owned()))
                        .ok();
                }
                Err(err) => {
                    warn!("connect failed: {err}");
                    tx.send(EngineMessage::Alert(format!("Connect failed: {err}")))
                        .ok();
                }
            }
        }
        GuiCommand::Disconnect => {
            session.disconnect();
            tx.send(EngineMessage::Log("Disconnected from device.".to_owned()))
                .ok();
        }
        GuiCommand::ToggleMonitoring => match session.toggle_monitoring(Instant::now()) {
            Ok(true) => {
                tx.send(EngineMessage::Log("Monitoring started.".to_owned()))
                    .ok();
            }
            Ok(false) => {
                tx.send(EngineMessage::Log("Monitoring stopped.".to_owned()))
                    .ok();
            }
            Err(rejection) => {
                tx.send(EngineMessage::Alert(rejection.to_string())).ok();
            }
        },
        GuiCommand::EnableSynthetic => match session.enable_synthetic(Instant::now()) {
            Ok(()) => {
                tx.send(EngineMessage::Log("Simulator enabled.".to_owned()))
                    .ok();
            }
            Err(rejection) => {
                tx.send(EngineMessage::Alert(rejection.to_string())).ok();
            }
        },
        GuiCommand::DisableSynthetic => match session.disable_synthetic() {
            Ok(()) => {
                tx.send(EngineMessage::Log("Simulator disabled.".to_owned()))
                    .ok();
            }
            Err(rejection) => {
                tx.send(EngineMessage::Alert(rejection.to_string())).ok();
            }
        },
        GuiCommand::Clear => {
            session.clear();
            tx.send(EngineMessage::Log("Data cleared.".to_owned())).ok();
        }
    }
    tx.send(EngineMessage::Mode(session.mode())).ok();
}

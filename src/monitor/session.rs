use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::info;
use thiserror::Error;

use super::alarm::LeadAlarm;
use super::buffer::{Sample, SampleBuffer};
use super::parser::{LineParser, ParseEvent};
use super::synth::{WaveSynth, TICK_MS};
use super::transport::{Chunk, SampleTransport, TransportError};

/// Mode of the acquisition session. A single tagged value, so invalid
/// combinations (connected and synthetic at once) are unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionMode {
    Disconnected,
    Connected { monitoring: bool },
    Synthetic { monitoring: bool },
}

impl AcquisitionMode {
    pub fn monitoring(&self) -> bool {
        matches!(
            self,
            AcquisitionMode::Connected { monitoring: true }
                | AcquisitionMode::Synthetic { monitoring: true }
        )
    }
}

/// State the renderer reads each frame: the sample history plus the
/// lead-off alarm.
#[derive(Debug)]
pub struct ScopeState {
    pub buffer: SampleBuffer,
    pub alarm: LeadAlarm,
}

impl Default for ScopeState {
    fn default() -> Self {
        Self {
            buffer: SampleBuffer::new(),
            alarm: LeadAlarm::new(),
        }
    }
}

pub type SharedScope = Arc<Mutex<ScopeState>>;

pub fn shared_scope() -> SharedScope {
    Arc::new(Mutex::new(ScopeState::default()))
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Synchronous, user-visible refusal of an invalid transition request.
/// Never a hard failure; state is left unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("connect to a device or enable the simulator first")]
    NotAcquiring,
    #[error("disconnect from the device first")]
    DeviceAttached,
    #[error("already connected to a device")]
    AlreadyConnected,
    #[error("the simulator is not active")]
    SimulatorInactive,
}

#[derive(Debug, Error)]
pub enum ConnectFailure {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

struct SynthEpoch {
    started: Instant,
    wall_start_ms: i64,
    ticks: u64,
}

/// Acquisition session state machine.
///
/// Owns the current mode and whichever producer is active, and is the only
/// writer into the shared scope state; at any instant at most one producer
/// (parser-fed transport or synthesizer) is alive by construction.
pub struct MonitorSession {
    mode: AcquisitionMode,
    scope: SharedScope,
    parser: LineParser,
    synth: WaveSynth,
    transport: Option<Box<dyn SampleTransport>>,
    stream_done: bool,
    epoch: Option<SynthEpoch>,
}

impl MonitorSession {
    pub fn new(scope: SharedScope) -> Self {
        Self {
            mode: AcquisitionMode::Disconnected,
            scope,
            parser: LineParser::new(),
            synth: WaveSynth::new(),
            transport: None,
            stream_done: false,
            epoch: None,
        }
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    /// True once the device has closed its stream; reading is paused but
    /// the session stays connected until the user disconnects.
    pub fn stream_done(&self) -> bool {
        self.stream_done
    }

    /// Acquires and opens a transport. Valid unless already connected;
    /// a connect while the simulator runs is accepted, and leaving
    /// `Synthetic` stops the synthesizer producer. On transport failure
    /// the state is left unchanged.
    pub fn connect(
        &mut self,
        open: impl FnOnce() -> Result<Box<dyn SampleTransport>, TransportError>,
    ) -> Result<(), ConnectFailure> {
        if let AcquisitionMode::Connected { .. } = self.mode {
            return Err(Rejection::AlreadyConnected.into());
        }
        let transport = open()?;
        info!("transport open on {}", transport.describe());
        self.transport = Some(transport);
        self.stream_done = false;
        self.parser = LineParser::new();
        self.epoch = None;
        self.mode = AcquisitionMode::Connected { monitoring: false };
        Ok(())
    }

    /// Flips the monitoring sub-state. Resuming in synthetic mode restarts
    /// the synthesizer's elapsed-time epoch.
    pub fn toggle_monitoring(&mut self, now: Instant) -> Result<bool, Rejection> {
        match self.mode {
            AcquisitionMode::Disconnected => Err(Rejection::NotAcquiring),
            AcquisitionMode::Connected { monitoring } => {
                self.mode = AcquisitionMode::Connected {
                    monitoring: !monitoring,
                };
                Ok(!monitoring)
            }
            AcquisitionMode::Synthetic { monitoring } => {
                let next = !monitoring;
                if next {
                    self.start_epoch(now);
                } else {
                    self.epoch = None;
                }
                self.mode = AcquisitionMode::Synthetic { monitoring: next };
                Ok(next)
            }
        }
    }

    /// Starts the synthesizer producer. Rejected while a device is
    /// connected; a no-op when the simulator is already running.
    pub fn enable_synthetic(&mut self, now: Instant) -> Result<(), Rejection> {
        match self.mode {
            AcquisitionMode::Connected { .. } => Err(Rejection::DeviceAttached),
            AcquisitionMode::Synthetic { .. } => Ok(()),
            AcquisitionMode::Disconnected => {
                self.start_epoch(now);
                self.mode = AcquisitionMode::Synthetic { monitoring: true };
                Ok(())
            }
        }
    }

    /// Stops the synthesizer, clears the history and the alarm.
    pub fn disable_synthetic(&mut self) -> Result<(), Rejection> {
        if !matches!(self.mode, AcquisitionMode::Synthetic { .. }) {
            return Err(Rejection::SimulatorInactive);
        }
        self.epoch = None;
        {
            let mut scope = self.lock_scope();
            scope.buffer.clear();
            scope.alarm.clear();
        }
        self.mode = AcquisitionMode::Disconnected;
        Ok(())
    }

    /// Closes the transport. Idempotent; a no-op unless a device is
    /// attached.
    pub fn disconnect(&mut self) {
        if let AcquisitionMode::Connected { .. } = self.mode {
            // Dropping the link closes the port.
            self.transport = None;
            self.stream_done = false;
            self.mode = AcquisitionMode::Disconnected;
        }
    }

    /// Empties the sample history and clears the alarm; the mode is left
    /// unchanged.
    pub fn clear(&mut self) {
        let mut scope = self.lock_scope();
        scope.buffer.clear();
        scope.alarm.clear();
    }

    /// One bounded transport read; decodes the chunk and applies every
    /// resulting event before returning. A read error is fatal for the
    /// connection: the transport is closed, the mode resets to
    /// `Disconnected` and the error is handed back to be surfaced.
    pub fn pump_live(&mut self, now: Instant) -> Result<(), TransportError> {
        if self.stream_done {
            return Ok(());
        }
        let chunk = match self.transport.as_mut() {
            Some(transport) => transport.read_chunk(),
            None => return Ok(()),
        };
        match chunk {
            Ok(Chunk::Data(text)) => {
                let events = self.parser.feed(&text);
                if events.is_empty() {
                    return Ok(());
                }
                let wall = epoch_ms();
                let mut scope = self.scope.lock().unwrap_or_else(|e| e.into_inner());
                for event in events {
                    match event {
                        ParseEvent::Sample(value) => {
                            scope.buffer.append(Sample { time: wall, value });
                        }
                        ParseEvent::FaultMarker => scope.alarm.trigger(now),
                    }
                }
                Ok(())
            }
            Ok(Chunk::Idle) => Ok(()),
            Ok(Chunk::Eof) => {
                info!("device stream ended");
                self.stream_done = true;
                Ok(())
            }
            Err(err) => {
                self.transport = None;
                self.stream_done = false;
                self.mode = AcquisitionMode::Disconnected;
                Err(err)
            }
        }
    }

    /// Runs every synthesizer tick that has come due by `now`, preserving
    /// the fixed cadence across late wakeups. Does nothing unless the
    /// session is in synthetic mode with monitoring on.
    pub fn pump_synthetic(&mut self, now: Instant) {
        if !matches!(self.mode, AcquisitionMode::Synthetic { monitoring: true }) {
            return;
        }
        let Some(epoch) = self.epoch.as_mut() else {
            return;
        };
        let mut scope = self.scope.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let due = epoch.started + Duration::from_millis((epoch.ticks + 1) * TICK_MS);
            if due > now {
                break;
            }
            epoch.ticks += 1;
            let elapsed_ms = epoch.ticks * TICK_MS;
            let value = self.synth.sample(elapsed_ms);
            scope.buffer.append(Sample {
                time: epoch.wall_start_ms + elapsed_ms as i64,
                value,
            });
            if self.synth.fault_due() {
                scope.alarm.trigger(due);
            }
        }
    }

    fn start_epoch(&mut self, now: Instant) {
        self.epoch = Some(SynthEpoch {
            started: now,
            wall_start_ms: epoch_ms(),
            ticks: 0,
        });
    }

    fn lock_scope(&self) -> std::sync::MutexGuard<'_, ScopeState> {
        self.scope.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::transport::ScriptedTransport;
    use std::io;

    fn scripted(
        script: Vec<Result<Chunk, TransportError>>,
    ) -> impl FnOnce() -> Result<Box<dyn SampleTransport>, TransportError> {
        move || Ok(Box::new(ScriptedTransport::new(script)) as Box<dyn SampleTransport>)
    }

    fn sample_count(scope: &SharedScope) -> usize {
        scope.lock().unwrap().buffer.len()
    }

    #[test]
    fn synthetic_run_fills_the_buffer_at_the_fixed_cadence() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope.clone());
        let t0 = Instant::now();

        session.enable_synthetic(t0).unwrap();
        assert_eq!(session.mode(), AcquisitionMode::Synthetic { monitoring: true });

        session.pump_synthetic(t0 + Duration::from_millis(1000));
        {
            let state = scope.lock().unwrap();
            let snapshot = state.buffer.snapshot();
            assert_eq!(snapshot.len(), 100);
            assert!(snapshot.iter().all(|s| (0..=1023).contains(&s.value)));
            // Timestamps advance by one tick period per sample.
            assert!(snapshot.windows(2).all(|w| w[1].time - w[0].time == 10));
        }

        session.disable_synthetic().unwrap();
        assert_eq!(session.mode(), AcquisitionMode::Disconnected);
        assert!(!session.mode().monitoring());
        assert_eq!(sample_count(&scope), 0);
    }

    #[test]
    fn pausing_monitoring_pauses_ticks_and_restarts_the_epoch() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope.clone());
        let t0 = Instant::now();

        session.enable_synthetic(t0).unwrap();
        session.pump_synthetic(t0 + Duration::from_millis(100));
        assert_eq!(sample_count(&scope), 10);

        assert_eq!(session.toggle_monitoring(t0).unwrap(), false);
        session.pump_synthetic(t0 + Duration::from_millis(900));
        assert_eq!(sample_count(&scope), 10);

        let t1 = t0 + Duration::from_millis(1000);
        assert_eq!(session.toggle_monitoring(t1).unwrap(), true);
        session.pump_synthetic(t1 + Duration::from_millis(50));
        assert_eq!(sample_count(&scope), 15);
    }

    #[test]
    fn monitoring_toggle_is_rejected_while_disconnected() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope);
        assert_eq!(
            session.toggle_monitoring(Instant::now()),
            Err(Rejection::NotAcquiring)
        );
        assert_eq!(session.mode(), AcquisitionMode::Disconnected);
    }

    #[test]
    fn enable_synthetic_is_rejected_while_connected() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope.clone());
        session.connect(scripted(vec![])).unwrap();

        assert_eq!(
            session.enable_synthetic(Instant::now()),
            Err(Rejection::DeviceAttached)
        );
        assert_eq!(session.mode(), AcquisitionMode::Connected { monitoring: false });
        assert_eq!(sample_count(&scope), 0);
    }

    #[test]
    fn connect_is_rejected_while_already_connected() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope);
        session.connect(scripted(vec![])).unwrap();
        assert!(matches!(
            session.connect(scripted(vec![])),
            Err(ConnectFailure::Rejected(Rejection::AlreadyConnected))
        ));
    }

    #[test]
    fn connect_from_synthetic_switches_producer() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope.clone());
        let t0 = Instant::now();

        session.enable_synthetic(t0).unwrap();
        session.pump_synthetic(t0 + Duration::from_millis(200));
        let before = sample_count(&scope);
        assert_eq!(before, 20);

        session.connect(scripted(vec![])).unwrap();
        assert_eq!(session.mode(), AcquisitionMode::Connected { monitoring: false });

        // The synthesizer no longer produces once the mode leaves Synthetic.
        session.pump_synthetic(t0 + Duration::from_millis(2000));
        assert_eq!(sample_count(&scope), before);
    }

    #[test]
    fn failed_open_leaves_the_session_disconnected() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope);
        let result = session.connect(|| {
            Err(TransportError::OpenFailure {
                port: "COM7".into(),
                reason: "busy".into(),
            })
        });
        assert!(matches!(
            result,
            Err(ConnectFailure::Transport(TransportError::OpenFailure { .. }))
        ));
        assert_eq!(session.mode(), AcquisitionMode::Disconnected);
    }

    #[test]
    fn live_chunks_append_samples_and_fault_markers_trigger_the_alarm() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope.clone());
        let now = Instant::now();

        session
            .connect(scripted(vec![Ok(Chunk::Data("512\n!\n300\n".into()))]))
            .unwrap();
        session.pump_live(now).unwrap();

        let state = scope.lock().unwrap();
        let snapshot = state.buffer.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].value, 512);
        assert_eq!(snapshot[1].value, 300);
        assert!(state.alarm.active_at(now));
    }

    #[test]
    fn live_appends_regardless_of_monitoring() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope.clone());
        session
            .connect(scripted(vec![Ok(Chunk::Data("7\n".into()))]))
            .unwrap();
        assert!(!session.mode().monitoring());
        session.pump_live(Instant::now()).unwrap();
        assert_eq!(sample_count(&scope), 1);
    }

    #[test]
    fn stream_error_force_disconnects() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope);
        session
            .connect(scripted(vec![Err(TransportError::Stream(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device removed",
            )))]))
            .unwrap();

        let result = session.pump_live(Instant::now());
        assert!(matches!(result, Err(TransportError::Stream(_))));
        assert_eq!(session.mode(), AcquisitionMode::Disconnected);

        // No further reads happen; the pump is now a no-op.
        session.pump_live(Instant::now()).unwrap();
    }

    #[test]
    fn end_of_stream_pauses_reading_but_stays_connected() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope.clone());
        session
            .connect(scripted(vec![Ok(Chunk::Data("1\n".into())), Ok(Chunk::Eof)]))
            .unwrap();

        session.pump_live(Instant::now()).unwrap();
        session.pump_live(Instant::now()).unwrap();
        assert!(session.stream_done());
        assert_eq!(session.mode(), AcquisitionMode::Connected { monitoring: false });
        assert_eq!(sample_count(&scope), 1);
    }

    #[test]
    fn partial_lines_carry_over_between_chunks() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope.clone());
        session
            .connect(scripted(vec![
                Ok(Chunk::Data("12".into())),
                Ok(Chunk::Data("3\n".into())),
            ]))
            .unwrap();

        let now = Instant::now();
        session.pump_live(now).unwrap();
        assert_eq!(sample_count(&scope), 0);
        session.pump_live(now).unwrap();

        let state = scope.lock().unwrap();
        assert_eq!(state.buffer.latest().map(|s| s.value), Some(123));
    }

    #[test]
    fn clear_empties_history_and_alarm_without_changing_mode() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope.clone());
        let t0 = Instant::now();

        session.enable_synthetic(t0).unwrap();
        session.pump_synthetic(t0 + Duration::from_millis(100));
        scope.lock().unwrap().alarm.trigger(t0);

        session.clear();
        let state = scope.lock().unwrap();
        assert!(state.buffer.is_empty());
        assert!(!state.alarm.active_at(t0));
        drop(state);
        assert_eq!(session.mode(), AcquisitionMode::Synthetic { monitoring: true });
    }

    #[test]
    fn disconnect_is_idempotent() {
        let scope = shared_scope();
        let mut session = MonitorSession::new(scope);
        session.disconnect();
        assert_eq!(session.mode(), AcquisitionMode::Disconnected);

        session.connect(scripted(vec![])).unwrap();
        session.disconnect();
        session.disconnect();
        assert_eq!(session.mode(), AcquisitionMode::Disconnected);
    }
}

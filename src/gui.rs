// src/gui.rs
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Instant;

use eframe::egui::{self, Color32, RichText};
use log::warn;

use crate::engine;
use crate::monitor::{
    available_ports, scope, shared_scope, AcquisitionMode, Sample, ScopeSurface, SharedScope,
    HEART_RATE_BPM,
};
use crate::types::{EngineMessage, GuiCommand};

const LOG_SCROLLBACK: usize = 8;
const MAX_MESSAGES_PER_FRAME: usize = 32;

const OK_COLOR: Color32 = Color32::from_rgb(80, 220, 120);
const WARN_COLOR: Color32 = Color32::from_rgb(255, 196, 0);
const ALERT_COLOR: Color32 = Color32::from_rgb(255, 110, 110);

pub struct EcgMonitorApp {
    // Mirrored session state
    mode: AcquisitionMode,

    // Port picker
    ports: Vec<String>,
    selected_port: Option<String>,

    // Scope
    surface: ScopeSurface,
    latest: Option<Sample>,

    // Event log
    log_messages: Vec<(String, bool)>,

    // Engine plumbing
    scope_state: SharedScope,
    rx: Receiver<EngineMessage>,
    tx_cmd: Sender<GuiCommand>,
}

impl EcgMonitorApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        let scope_state = shared_scope();

        engine::spawn(scope_state.clone(), rx_cmd, tx);

        let mut app = Self {
            mode: AcquisitionMode::Disconnected,
            ports: Vec::new(),
            selected_port: None,
            surface: ScopeSurface::new(),
            latest: None,
            log_messages: Vec::new(),
            scope_state,
            rx,
            tx_cmd,
        };
        app.refresh_ports();
        app
    }

    fn push_log(&mut self, text: String, alert: bool) {
        self.log_messages.push((format!("> {text}"), alert));
        if self.log_messages.len() > LOG_SCROLLBACK {
            self.log_messages.remove(0);
        }
    }

    fn refresh_ports(&mut self) {
        match available_ports() {
            Ok(ports) => {
                if let Some(selected) = &self.selected_port {
                    if !ports.contains(selected) {
                        self.selected_port = None;
                    }
                }
                self.ports = ports;
            }
            Err(err) => {
                warn!("port enumeration failed: {err}");
                self.ports.clear();
                self.selected_port = None;
                self.push_log(err.to_string(), true);
            }
        }
    }

    fn send(&self, cmd: GuiCommand) {
        self.tx_cmd.send(cmd).ok();
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        ui.add_space(10.0);
        ui.heading("Cardioscope");
        ui.label("Single-lead ECG monitor");
        ui.separator();

        match self.mode {
            AcquisitionMode::Disconnected => {
                let selected_text = self
                    .selected_port
                    .clone()
                    .unwrap_or_else(|| "Select port".to_owned());
                ui.horizontal(|ui| {
                    egui::ComboBox::from_id_source("port_picker")
                        .selected_text(selected_text)
                        .show_ui(ui, |ui| {
                            for port in &self.ports {
                                ui.selectable_value(
                                    &mut self.selected_port,
                                    Some(port.clone()),
                                    port,
                                );
                            }
                        });
                    if ui.button("🔄").on_hover_text("Rescan ports").clicked() {
                        self.refresh_ports();
                    }
                });
                if self.ports.is_empty() {
                    ui.label(
                        RichText::new("No serial ports found")
                            .color(WARN_COLOR)
                            .small(),
                    );
                }

                if ui.button("CONNECT").clicked() {
                    self.send(GuiCommand::Connect(self.selected_port.clone()));
                }
                if ui.button("ENABLE SIMULATOR").clicked() {
                    self.send(GuiCommand::EnableSynthetic);
                }
            }
            AcquisitionMode::Connected { monitoring } => {
                ui.label(RichText::new("● Connected").color(OK_COLOR));
                self.monitoring_controls(ui, monitoring);
                if ui.button("DISCONNECT").clicked() {
                    self.send(GuiCommand::Disconnect);
                }
            }
            AcquisitionMode::Synthetic { monitoring } => {
                ui.label(RichText::new("● Simulator").color(WARN_COLOR));
                self.monitoring_controls(ui, monitoring);
                if ui.button("EXIT SIMULATOR").clicked() {
                    self.send(GuiCommand::DisableSynthetic);
                }
            }
        }

        ui.add_space(20.0);
        ui.separator();
        egui::ScrollArea::vertical()
            .max_height(140.0)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for (message, alert) in &self.log_messages {
                    if *alert {
                        ui.monospace(RichText::new(message).color(ALERT_COLOR));
                    } else {
                        ui.monospace(message);
                    }
                }
            });
    }

    fn monitoring_controls(&self, ui: &mut egui::Ui, monitoring: bool) {
        let label = if monitoring {
            "STOP MONITORING"
        } else {
            "START MONITORING"
        };
        if ui.button(label).clicked() {
            self.send(GuiCommand::ToggleMonitoring);
        }
        if ui.button("CLEAR DATA").clicked() {
            self.send(GuiCommand::Clear);
        }
    }

    fn scope_panel(&mut self, ui: &mut egui::Ui, samples: &[Sample], alarm: bool) {
        if alarm {
            egui::Frame::none()
                .fill(Color32::from_rgb(60, 12, 12))
                .rounding(4.0)
                .inner_margin(8.0)
                .show(ui, |ui| {
                    ui.colored_label(ALERT_COLOR, "⚠ Leads Off! Check electrode connections.");
                });
            ui.add_space(6.0);
        }

        let monitoring = self.mode.monitoring();
        ui.horizontal(|ui| {
            ui.heading("ECG Waveform");
            if monitoring {
                ui.separator();
                ui.label("Signal:");
                let value = self
                    .latest
                    .map(|s| s.value.to_string())
                    .unwrap_or_else(|| "--".to_owned());
                ui.monospace(RichText::new(value).color(OK_COLOR));
                ui.label("HR:");
                ui.monospace(RichText::new(format!("{HEART_RATE_BPM} BPM")).color(OK_COLOR));
            }
        });

        if monitoring {
            scope::show(ui, &mut self.surface, samples, alarm);
        } else {
            ui.centered_and_justified(|ui| {
                let hint = match self.mode {
                    AcquisitionMode::Disconnected => {
                        "Connect to a device or enable the simulator"
                    }
                    _ => "Start monitoring to begin",
                };
                ui.label(RichText::new(hint).weak());
            });
        }
    }
}

impl eframe::App for EcgMonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut drained = 0;
        while let Ok(message) = self.rx.try_recv() {
            match message {
                EngineMessage::Mode(mode) => self.mode = mode,
                EngineMessage::Log(text) => self.push_log(text, false),
                EngineMessage::Alert(text) => self.push_log(text, true),
            }
            drained += 1;
            if drained >= MAX_MESSAGES_PER_FRAME {
                break;
            }
        }

        // One consistent view of the shared scope state per frame.
        let (samples, alarm) = {
            let state = self
                .scope_state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            (
                state.buffer.snapshot(),
                state.alarm.active_at(Instant::now()),
            )
        };
        self.latest = samples.last().copied();

        egui::SidePanel::left("controls")
            .min_width(260.0)
            .show(ctx, |ui| self.controls(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            self.scope_panel(ui, &samples, alarm);
        });

        // The trace only advances while monitoring; otherwise the scope is
        // suspended and no further frames are scheduled.
        if self.mode.monitoring() {
            ctx.request_repaint();
        }
    }
}

// src/main.rs
mod engine;
mod gui;
mod monitor;
mod types;

use eframe::egui;

fn main() -> eframe::Result<()> {
    env_logger::init();

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1180.0, 720.0])
        .with_min_inner_size([900.0, 560.0])
        .with_title("Cardioscope");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "cardioscope",
        options,
        Box::new(|cc| Box::new(gui::EcgMonitorApp::new(cc))),
    )
}

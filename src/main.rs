mod api;
mod app;
mod catalog;
mod config;
mod constants;
mod coords;
mod editor;
mod error;
mod image_loader;
mod jobs;
mod notice;
mod session;

use app::AnnotatorApp;
use config::AppConfig;
use eframe::egui;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load();
    log::info!("Using annotation backend at {}", config.api_base_url);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.window_width, config.window_height])
            .with_title("Wildlife Annotator"),
        ..Default::default()
    };

    eframe::run_native(
        "Wildlife Annotator",
        options,
        Box::new(|cc| Ok(Box::new(AnnotatorApp::new(cc, config)))),
    )
}

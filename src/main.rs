mod app;
mod application;
mod domain;
mod resolver;
mod transcoder;
mod ui;
mod utils;

use iced::window;
use image::{Rgba, RgbaImage};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const ICON_SIZE: u32 = 64;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Red rounded badge with a white play triangle.
fn render_icon() -> RgbaImage {
    let size = ICON_SIZE as f32;
    let center = size / 2.0;

    RgbaImage::from_fn(ICON_SIZE, ICON_SIZE, |x, y| {
        let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
        let dist = ((px - center).powi(2) + (py - center).powi(2)).sqrt();
        if dist > center - 1.0 {
            return Rgba([0, 0, 0, 0]);
        }

        // Triangle pointing right, spanning the middle half of the badge
        let left = size * 0.38;
        let right = size * 0.72;
        let half_height = (right - px) / (right - left) * size * 0.2;
        let inside = px >= left && px <= right && (py - center).abs() <= half_height;

        if inside {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([204, 32, 39, 255])
        }
    })
}

fn main() -> iced::Result {
    init_logging();

    let rgba = render_icon();
    let (width, height) = rgba.dimensions();
    let icon = window::icon::from_rgba(rgba.into_raw(), width, height).ok();

    iced::application(app::DownloadApp::default, app::update, app::view)
        .title("Video Audio Downloader")
        .subscription(app::subscription)
        .window(window::Settings {
            icon,
            ..Default::default()
        })
        .run()
}

// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use presto_core::init_tracing;
use presto_platform::winit::event_loop::EventLoop;

mod app;
mod config;

use app::App;
use config::{load_cfg, PresentMode};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; missing means built-in defaults
    #[arg(long, default_value = "presto.toml")]
    config: PathBuf,

    /// Overrides `[present] mode`
    #[arg(long, value_enum)]
    present_mode: Option<PresentMode>,

    /// Hides the frame-time overlay
    #[arg(long)]
    no_overlay: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = load_cfg(&args.config)?;
    if let Some(mode) = args.present_mode {
        cfg.present.mode = mode;
    }
    if args.no_overlay {
        cfg.render.overlay = false;
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;
    app.finish()
}

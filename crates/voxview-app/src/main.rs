// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::Result;
use clap::Parser;
use voxview_core::init_tracing;
use voxview_platform::winit::event_loop::EventLoop;

mod app;
mod cli;
mod config;
mod viewer;

use app::App;
use cli::Args;

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = config::load(&args.config);
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App::new(args, cfg);
    event_loop.run_app(&mut app)?;

    match app.take_fatal() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

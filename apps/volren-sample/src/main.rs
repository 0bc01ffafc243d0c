//! Ray-direction volume rendering sample.
//!
//! Renders a generated density volume by rasterizing a proxy cube twice, once
//! for the exit point of every view ray and once for the entry point, then
//! marching each pixel's segment through the volume in a fullscreen pass.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p volren-sample -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod controls;
mod params;
mod sample;

use volren_app::{run_app, AppConfig};

use crate::params::SampleParams;
use crate::sample::VolumeRender;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    // Parsed again in `prepare`; checked here so bad options fail before a
    // window opens
    let params = SampleParams::from_args()?;
    if params.help {
        print_help();
        return Ok(());
    }

    run_app::<VolumeRender>(
        AppConfig::new("Volume Render - Ray Directions")
            .with_size(WIDTH, HEIGHT)
            .with_vsync(params.vsync),
    )
}

fn print_help() {
    eprintln!(
        "Ray-direction volume rendering sample

USAGE:
    cargo run -p volren-sample -- [OPTIONS]

VOLUME OPTIONS:
    --volume-size <N>       Edge length of the volume in voxels (default: 128)
    --pattern <NAME>        crosshair or sphere (default: crosshair)
    --half-width <N>        Cross-hair bar half width (default: size / 16)

COMPOSITING OPTIONS:
    --order <ORDER>         front or back (default: front)
    --steps <N>             Samples along a full ray segment (default: 128)
    --no-lighting           Skip the compositing pass; the window is cleared only

OTHER:
    --vsync                 Enable vsync
    -h, --help              Print this help message

CONTROLS:
    W/A/S/D, Q/E            Move
    Right mouse button      Look around
    Shift                   Move faster
    F3                      Cycle debug views
    R                       Reset the camera

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

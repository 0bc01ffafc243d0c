//! Command line options of the sample.

use anyhow::{bail, Context};
use volren_core::constants::DEFAULT_VOLUME_SIZE;
use volren_volume::{CompositeOrder, CompositeParams, PatternKind, VolumeExtent};

/// Options read from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleParams {
    /// Edge length of the cubic volume in voxels.
    pub volume_size: u32,
    /// Cross-hair bar half width, `None` for the size-derived default.
    pub half_width: Option<u32>,
    pub pattern: PatternKind,
    pub composite: CompositeParams,
    /// Build the pipeline with the compositing pass.
    pub lighting: bool,
    pub vsync: bool,
    pub help: bool,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self {
            volume_size: DEFAULT_VOLUME_SIZE,
            half_width: None,
            pattern: PatternKind::default(),
            composite: CompositeParams::default(),
            lighting: true,
            vsync: false,
            help: false,
        }
    }
}

impl SampleParams {
    /// Parse the process arguments.
    pub fn from_args() -> anyhow::Result<Self> {
        Self::parse_args(std::env::args().skip(1))
    }

    /// Parse arguments, excluding the program name.
    pub fn parse_args<I, S>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let arg = arg.as_ref();
            let mut value = || {
                args.next()
                    .map(|v| v.as_ref().to_owned())
                    .with_context(|| format!("{arg} requires a value"))
            };

            match arg {
                "--volume-size" => {
                    params.volume_size = parse_positive(arg, &value()?)?;
                }
                "--half-width" => {
                    params.half_width = Some(parse_positive(arg, &value()?)?);
                }
                "--pattern" => params.pattern = value()?.parse()?,
                "--order" => params.composite.order = value()?.parse::<CompositeOrder>()?,
                "--steps" => params.composite.steps = parse_positive(arg, &value()?)?,
                "--no-lighting" => params.lighting = false,
                "--vsync" => params.vsync = true,
                "-h" | "--help" => params.help = true,
                other => bail!("unknown option '{other}'"),
            }
        }

        Ok(params)
    }

    pub fn extent(&self) -> VolumeExtent {
        VolumeExtent::cube(self.volume_size)
    }
}

fn parse_positive(option: &str, value: &str) -> anyhow::Result<u32> {
    let parsed: u32 = value
        .parse()
        .with_context(|| format!("{option}: '{value}' is not a number"))?;
    if parsed == 0 {
        bail!("{option} must be greater than zero");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_arguments() {
        let params = SampleParams::parse_args(Vec::<String>::new()).unwrap();
        assert_eq!(params, SampleParams::default());
        assert!(params.lighting);
        assert_eq!(params.pattern, PatternKind::CrossHair);
    }

    #[test]
    fn parses_every_option() {
        let params = SampleParams::parse_args([
            "--volume-size",
            "64",
            "--half-width",
            "3",
            "--pattern",
            "sphere",
            "--order",
            "back",
            "--steps",
            "256",
            "--no-lighting",
            "--vsync",
        ])
        .unwrap();

        assert_eq!(params.volume_size, 64);
        assert_eq!(params.half_width, Some(3));
        assert_eq!(params.pattern, PatternKind::SphereShell);
        assert_eq!(params.composite.order, CompositeOrder::BackToFront);
        assert_eq!(params.composite.steps, 256);
        assert!(!params.lighting);
        assert!(params.vsync);
        assert_eq!(params.extent(), VolumeExtent::cube(64));
    }

    #[test]
    fn help_flag() {
        assert!(SampleParams::parse_args(["-h"]).unwrap().help);
        assert!(SampleParams::parse_args(["--help"]).unwrap().help);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(SampleParams::parse_args(["--volume-size"]).is_err());
        assert!(SampleParams::parse_args(["--volume-size", "0"]).is_err());
        assert!(SampleParams::parse_args(["--steps", "many"]).is_err());
        assert!(SampleParams::parse_args(["--pattern", "torus"]).is_err());
        assert!(SampleParams::parse_args(["--order", "sideways"]).is_err());
        assert!(SampleParams::parse_args(["--fullscreen"]).is_err());
    }
}

// ============================================================================
// spritecore CLI - headless stroke / fill on PNG files
// ============================================================================
//
// Usage examples:
//   spritecore stroke -i sprite.png -o out.png -p 2,2 -p 12,2 -p 12,9 --size 3 --color ff0000
//   spritecore stroke -i sprite.png -o out.png -p 0,0 -p 1,0 -p 1,1 --pixel-perfect
//   spritecore fill -i sprite.png -o out.png --seed 4,4 --color 00ff00 --tolerance 0 --eight
//
// Each invocation is one gesture through the editor core; the output file is
// written by the save tracker. `--verify` compares the preview surface with
// the CPU buffer afterwards and fails on any mismatch.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::Rgba;

use crate::brush::{BrushShape, Stroke};
use crate::canvas::{Origin, PixelRect};
use crate::fill::{Connectivity, FillRequest};
use crate::save::FileStore;
use crate::session::{EditorCore, EditorError};
use crate::settings::EngineSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// spritecore headless sprite editor.
#[derive(Parser, Debug)]
#[command(name = "spritecore", version, about = "Apply brush strokes and flood fills to PNG sprites")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Paint a polyline through the given points.
    Stroke(StrokeArgs),
    /// Flood fill from a seed pixel.
    Fill(FillArgs),
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Input PNG.
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output PNG. Defaults to overwriting the input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Paint color as RRGGBB or RRGGBBAA hex. Alpha 00 erases.
    #[arg(short, long, default_value = "000000ff", value_parser = parse_color)]
    pub color: Rgba<u8>,

    /// Restrict edits to x,y,w,h.
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_rect)]
    pub clip: Option<PixelRect>,

    /// Treat the buffer as bottom-row-first.
    #[arg(long, value_enum)]
    pub origin: Option<OriginArg>,

    /// Skip GPU initialisation and preview on the CPU.
    #[arg(long)]
    pub cpu: bool,

    /// Check that the preview surface matches the CPU buffer.
    #[arg(long)]
    pub verify: bool,

    /// Print timing and the changed region.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct StrokeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Stroke points, in order. One point stamps a dot.
    #[arg(short, long = "point", value_name = "X,Y", required = true, value_parser = parse_point)]
    pub points: Vec<(i32, i32)>,

    #[arg(short, long, default_value_t = 1)]
    pub size: u32,

    #[arg(long, value_enum, default_value_t = ShapeArg::Circle)]
    pub shape: ShapeArg,

    /// Drop L-shaped corners from 1px strokes.
    #[arg(long)]
    pub pixel_perfect: bool,
}

#[derive(Args, Debug)]
pub struct FillArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, value_name = "X,Y", value_parser = parse_point)]
    pub seed: (i32, i32),

    /// Per-channel tolerance. Defaults to the configured value.
    #[arg(short, long)]
    pub tolerance: Option<u8>,

    /// Include diagonal neighbours.
    #[arg(long)]
    pub eight: bool,

    /// Replace every matching pixel, connected or not.
    #[arg(long)]
    pub global: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ShapeArg {
    Circle,
    Square,
}

impl From<ShapeArg> for BrushShape {
    fn from(shape: ShapeArg) -> Self {
        match shape {
            ShapeArg::Circle => BrushShape::Circle,
            ShapeArg::Square => BrushShape::Square,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OriginArg {
    TopLeft,
    BottomLeft,
}

impl From<OriginArg> for Origin {
    fn from(origin: OriginArg) -> Self {
        match origin {
            OriginArg::TopLeft => Origin::TopLeft,
            OriginArg::BottomLeft => Origin::BottomLeft,
        }
    }
}

// ============================================================================
// Value parsers
// ============================================================================

fn parse_ints(s: &str, count: usize) -> Result<Vec<i64>, String> {
    let parts: Vec<_> = s.split(',').map(str::trim).collect();
    if parts.len() != count {
        return Err(format!("expected {count} comma-separated integers, got '{s}'"));
    }
    parts
        .iter()
        .map(|p| p.parse::<i64>().map_err(|e| format!("'{p}': {e}")))
        .collect()
}

pub fn parse_point(s: &str) -> Result<(i32, i32), String> {
    let v = parse_ints(s, 2)?;
    let x = i32::try_from(v[0]).map_err(|e| e.to_string())?;
    let y = i32::try_from(v[1]).map_err(|e| e.to_string())?;
    Ok((x, y))
}

pub fn parse_rect(s: &str) -> Result<PixelRect, String> {
    let v = parse_ints(s, 4)?;
    let mut u = [0u32; 4];
    for (dst, src) in u.iter_mut().zip(&v) {
        *dst = u32::try_from(*src).map_err(|_| format!("'{s}': values must be non-negative"))?;
    }
    Ok(PixelRect::new(u[0], u[1], u[2], u[3]))
}

pub fn parse_color(s: &str) -> Result<Rgba<u8>, String> {
    let hex = s.trim_start_matches('#');
    if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
        return Err(format!("'{s}': expected RRGGBB or RRGGBBAA"));
    }
    let mut c = [0u8, 0, 0, 255];
    for (i, slot) in c.iter_mut().enumerate().take(hex.len() / 2) {
        *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|e| format!("'{s}': {e}"))?;
    }
    Ok(Rgba(c))
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run one CLI command and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    match execute(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Command) -> Result<(), EditorError> {
    let common = match &command {
        Command::Stroke(a) => &a.common,
        Command::Fill(a) => &a.common,
    };

    let mut settings = EngineSettings::load();
    if common.cpu {
        settings.gpu_acceleration = false;
    }
    if let Some(origin) = common.origin {
        settings.origin = origin.into();
    }
    if let Command::Stroke(a) = &command {
        settings.pixel_perfect |= a.pixel_perfect;
    }

    let start = Instant::now();
    let mut core = EditorCore::new(settings, FileStore::new());
    let id = core.open_png(&common.input)?;
    if let Some(clip) = common.clip {
        core.set_clip(id, clip)?;
    }

    let changed = match &command {
        Command::Stroke(a) => {
            core.begin_gesture(id, "Brush")?;
            let shape = BrushShape::from(a.shape);
            let mut changed: Option<PixelRect> = None;
            let mut prev = a.points[0];
            for &point in &a.points {
                let segment = core.stroke(Stroke::new(prev, point, a.size, shape, common.color))?;
                changed = match (changed, segment) {
                    (Some(x), Some(y)) => Some(x.union(&y)),
                    (x, y) => x.or(y),
                };
                prev = point;
            }
            core.end_gesture()?;
            changed
        }
        Command::Fill(a) => {
            let settings = core.settings();
            let request = FillRequest::new(a.seed, common.color)
                .tolerance(a.tolerance.unwrap_or(settings.fill_tolerance))
                .connectivity(if a.eight { Connectivity::Eight } else { settings.fill_connectivity })
                .contiguous(settings.fill_contiguous && !a.global);
            core.begin_gesture(id, "Fill")?;
            let changed = core.fill_with(&request)?;
            core.end_gesture()?;
            changed
        }
    };

    if common.verify {
        core.check_preview(id)?;
    }

    let output = common.output.as_deref().unwrap_or(&common.input);
    core.save_as(id, output)?;

    if common.verbose {
        match changed {
            Some(rect) => println!("changed {rect}"),
            None => println!("no pixels changed"),
        }
        println!("wrote {} in {:.1} ms", output.display(), start.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(())
}

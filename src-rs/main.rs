use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use image::DynamicImage;
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use form_highlight::geometry::{fit_scale, overlay_size, ImageSize};
use form_highlight::overlay::compose_page;
use form_highlight::snapshot::load_snapshot;

const SNAPSHOT_HELP: &str = r##"Session snapshot JSON schema (every key optional):
{
  "view": {"scale": 0.5, "rotation": 90, "current_page": 1, "total_pages": 2, "show_filled": false},
  "image": {"width": 2550, "height": 3300},
  "container_width": 850,
  "active_field": {"label": "Last name", "bounding_box": [163, 257, 702, 20], "page": 1},
  "fields": [
    {"name": "First name", "label": "First name", "filled": true, "value": "Jane", "page": 1, "bounding_box": [163, 157, 702, 20]},
    {"name": "Last name", "label": "Last name", "filled": false, "page": 1, "bounding_box": [163, 257, 702, 20]}
  ],
  "style": {"highlight": "rgba(76, 175, 80, 0.3)", "value_color": "#000000", "height_pad": 15, "value_offset": 10, "value_size": 25}
}

Notes:
- bounding_box is [x, y, w, h] in page-image pixels (top-left origin).
- rotation must be 0, 90, 180 or 270; scale must be in (0, 2].
- image is required unless --page-image is given; the page image size wins.
- container_width (or --container-width) refits the scale to min(1, container / image width).
- only fields and the active field on view.current_page are drawn.
"##;

#[derive(Parser, Debug)]
#[command(
    name = "form-highlight",
    version,
    about = "Render form-field highlight overlays for scaled and rotated page previews"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Render the overlay for a session snapshot to PNG
    Render(RenderArgs),
    /// Print the fit-to-container scale and overlay size as JSON
    #[command(name = "fit-scale")]
    FitScale(FitScaleArgs),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Session snapshot JSON path (or - for stdin)
    session: Option<String>,
    /// Output PNG path (default: $FORM_HIGHLIGHT_OUT_DIR/overlay-p<page>-<ts>.png)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Rendered page image; its pixel size is the natural size
    #[arg(long)]
    page_image: Option<PathBuf>,
    /// Container width in px; refits the scale like a fresh page load
    #[arg(long)]
    container_width: Option<f64>,
    /// Draw the page image under the overlay
    #[arg(long, action = ArgAction::SetTrue)]
    compose: bool,
    /// Path to write the frame metadata sidecar (default: <out>.json)
    #[arg(long)]
    meta_out: Option<PathBuf>,
    /// Disable metadata sidecar output
    #[arg(long, action = ArgAction::SetTrue)]
    no_meta: bool,
    /// Print the snapshot schema and exit
    #[arg(long, action = ArgAction::SetTrue)]
    schema_help: bool,
}

#[derive(Args, Debug)]
struct FitScaleArgs {
    /// Natural page width in px
    #[arg(long)]
    natural_width: u32,
    /// Natural page height in px (adds the overlay size to the output)
    #[arg(long)]
    natural_height: Option<u32>,
    /// Container width in px
    #[arg(long)]
    container_width: f64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Render(args) => command_render(args),
        Commands::FitScale(args) => command_fit_scale(args),
    }
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "render",
            "description": "Render active-field highlight and filled values for a session snapshot."
        }),
        json!({
            "name": "fit-scale",
            "description": "Compute the fit-to-container scale and overlay size."
        }),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn command_render(args: RenderArgs) -> Result<()> {
    if args.schema_help {
        println!("{}", SNAPSHOT_HELP.trim());
        return Ok(());
    }
    let output = render_snapshot(&args)?;
    println!("{}", output.display());
    Ok(())
}

/// Writes the overlay (and sidecar) and returns the image's absolute path.
fn render_snapshot(args: &RenderArgs) -> Result<PathBuf> {
    let Some(session_path) = args.session.as_deref() else {
        bail!("session snapshot path is required (use - for stdin)");
    };
    if args.compose && args.page_image.is_none() {
        bail!("--compose needs --page-image");
    }

    let snapshot = load_snapshot(session_path)?;
    let page = match &args.page_image {
        Some(path) => Some(
            image::open(path)
                .with_context(|| format!("failed to open page image: {}", path.display()))?
                .to_rgba8(),
        ),
        None => None,
    };
    let natural = match (&page, snapshot.image) {
        (Some(page), _) => ImageSize {
            width: page.width(),
            height: page.height(),
        },
        (None, Some(size)) => size,
        (None, None) => bail!("natural page size unknown: pass --page-image or set \"image\""),
    };

    let viewer = snapshot.into_viewer(natural, args.container_width)?;
    let view = viewer.view();
    let Some(frame) = viewer.frame() else {
        bail!("overlay was not painted");
    };
    let overlay = viewer.renderer().surface().image();

    let output = args.out.clone().unwrap_or_else(|| {
        out_root().join(format!(
            "overlay-p{}-{}.png",
            view.current_page,
            timestamp_compact()
        ))
    });
    let rendered = match (&page, args.compose) {
        (Some(page), true) => compose_page(page, overlay, view.rotation),
        _ => overlay.clone(),
    };
    ensure_parent_dir(&output)?;
    DynamicImage::ImageRgba8(rendered)
        .save(&output)
        .with_context(|| format!("failed to save overlay image: {}", output.display()))?;
    tracing::info!(
        path = %output.display(),
        width = frame.width,
        height = frame.height,
        "overlay written"
    );

    if !args.no_meta {
        let meta_path = args
            .meta_out
            .clone()
            .unwrap_or_else(|| default_sidecar_for(&output));
        let session = viewer.session();
        let payload = json!({
            "overlay_meta_version": 1,
            "session_path": session_path,
            "page_image": args.page_image.as_deref().map(|p| abs_path(p).display().to_string()),
            "output_path": abs_path(&output).display().to_string(),
            "meta_path": abs_path(&meta_path).display().to_string(),
            "composed": args.compose,
            "generated_at": timestamp_iso(),
            "natural_size": {"width": natural.width, "height": natural.height, "units": "px"},
            "view": view,
            "state": session.state(),
            "step": session.step(),
            "progress": round_to(session.progress(), 4),
            "frame": frame,
        });
        write_json_pretty(&meta_path, &payload)?;
    }

    Ok(abs_path(&output))
}

fn command_fit_scale(args: FitScaleArgs) -> Result<()> {
    let Some(scale) = fit_scale(args.natural_width, args.container_width) else {
        bail!(
            "cannot fit width {} into container {}",
            args.natural_width,
            args.container_width
        );
    };
    let mut payload = json!({
        "natural_width": args.natural_width,
        "container_width": args.container_width,
        "scale": scale,
    });
    if let Some(height) = args.natural_height {
        let (w, h) = overlay_size(
            ImageSize {
                width: args.natural_width,
                height,
            },
            scale,
        );
        payload["overlay"] = json!({"width": w, "height": h});
    }
    println!("{}", serde_json::to_string(&payload)?);
    Ok(())
}

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn default_sidecar_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("overlay")
        .to_string();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}.json"))
}

fn out_root() -> PathBuf {
    env::var("FORM_HIGHLIGHT_OUT_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".form-highlight"))
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn timestamp_compact() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}

fn round_to(v: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (v * factor).round() / factor
}

// ============================================================================
// retouch CLI — headless edit-and-export via command-line arguments
// ============================================================================
//
// Usage examples:
//   retouch -i photo.jpg -o out.png                      (straight convert)
//   retouch -i photo.png -s edits.json -o result.jpg --quality 85
//   retouch -i photo.png -s edits.json -o result.png --cpu
//
// The edit state file is the JSON form of `EditState` — the same value the
// embedding host serializes.  All processing runs synchronously; no window
// is ever opened.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use retouch::compositor::{Compositor, ExportFormat};
use retouch::state::EditState;
use retouch::{log_err, log_info, logger};

/// Headless image retouching processor.
#[derive(Parser, Debug)]
#[command(
    name = "retouch",
    about = "Apply saved edits to an image and export the result",
    long_about = "Load an image, apply an edit-state JSON file (adjustments, crop,\n\
                  blur regions, stamps, annotations), and export as PNG or JPEG\n\
                  without opening a GUI.\n\n\
                  Example:\n  \
                  retouch -i photo.png -s edits.json -o result.jpg --quality 85"
)]
struct CliArgs {
    /// Input image (PNG or JPEG).
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Edit state JSON file.  When omitted, the image is exported unedited
    /// (useful for format conversion).
    #[arg(short, long, value_name = "STATE.json")]
    state: Option<PathBuf>,

    /// Output file path.  The format is inferred from the extension unless
    /// --format is given.
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Output format: png or jpeg.
    #[arg(short, long, value_name = "FORMAT")]
    format: Option<String>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    quality: u8,

    /// Force the CPU pixel path (skip GPU adapter initialization).
    #[arg(long, default_value_t = false)]
    cpu: bool,
}

fn parse_format(args: &CliArgs) -> Result<ExportFormat, String> {
    let name = match &args.format {
        Some(f) => f.to_lowercase(),
        None => args
            .output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_lowercase(),
    };
    match name.as_str() {
        "png" => Ok(ExportFormat::Png),
        "jpg" | "jpeg" => Ok(ExportFormat::Jpeg),
        other => Err(format!("unsupported output format '{}'", other)),
    }
}

fn load_state(path: &Path) -> Result<EditState, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid edit state {}: {}", path.display(), e))
}

fn run(args: &CliArgs) -> Result<(), String> {
    let started = Instant::now();

    let format = parse_format(args)?;
    let state = match &args.state {
        Some(path) => load_state(path)?,
        None => EditState::default(),
    };

    let source = image::open(&args.input)
        .map_err(|e| format!("cannot load {}: {}", args.input.display(), e))?
        .to_rgba8();
    log_info!(
        "loaded {} ({}x{})",
        args.input.display(),
        source.width(),
        source.height()
    );

    let mut compositor = Compositor::new(!args.cpu);
    let quality = (args.quality.clamp(1, 100) as f32) / 100.0;
    let bytes = compositor
        .export(&source, &state, format, quality)
        .map_err(|e| format!("export failed: {}", e))?;

    if let Some(parent) = args.output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
    }
    std::fs::write(&args.output, &bytes)
        .map_err(|e| format!("cannot write {}: {}", args.output.display(), e))?;

    println!(
        "wrote {} ({} bytes) in {:.1?}",
        args.output.display(),
        bytes.len(),
        started.elapsed()
    );
    Ok(())
}

fn main() -> ExitCode {
    logger::init();
    let args = CliArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            log_err!("{}", message);
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}

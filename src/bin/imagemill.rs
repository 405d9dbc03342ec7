use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use imagemill::{
    BodyChunk, CommandDirective, EngineKind, FeedOutcome, FilterDirectives, Gate, ImageFilter,
    ImageKind, ResponseHead, create_engine,
};

#[derive(Parser, Debug)]
#[command(name = "imagemill", version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream a file through the filter and write the transformed body.
    Transform(TransformArgs),
    /// Classify a file by signature and print its format.
    Sniff(SniffArgs),
}

#[derive(Parser, Debug)]
struct TransformArgs {
    /// Input image file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output file path.
    #[arg(long)]
    out: PathBuf,

    /// Directives JSON for the broad scope; command-line flags layer on top.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resize geometry, e.g. "640x480>".
    #[arg(long)]
    resize: Option<String>,

    /// Clockwise rotation in degrees (a multiple of 90).
    #[arg(long)]
    rotate: Option<i32>,

    /// Output format: jpeg, gif, png, or webp.
    #[arg(long)]
    format: Option<String>,

    /// Overlay image for a composite command, relative to the config root.
    #[arg(long)]
    composite: Option<String>,

    /// Overlay anchor, e.g. south_east.
    #[arg(long)]
    gravity: Option<String>,

    /// Overlay inward offset, e.g. "+10+10".
    #[arg(long)]
    geometry: Option<String>,

    /// Overlay opacity percent (0-100).
    #[arg(long)]
    dissolve: Option<u8>,

    /// Re-encode quality (0-100).
    #[arg(long)]
    quality: Option<u8>,

    /// Body accumulation limit in bytes.
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Chunk size used to stream the input through the filter.
    #[arg(long, default_value_t = 64 * 1024)]
    chunk_size: usize,
}

#[derive(Parser, Debug)]
struct SniffArgs {
    /// Input file.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.cmd {
        Command::Transform(args) => cmd_transform(args),
        Command::Sniff(args) => cmd_sniff(args),
    }
}

fn overrides_from(args: &TransformArgs) -> FilterDirectives {
    let mut commands = Vec::new();
    if args.resize.is_some() || args.rotate.is_some() || args.format.is_some() {
        commands.push(CommandDirective::Convert {
            resize: args.resize.clone(),
            rotate: args.rotate,
            format: args.format.clone(),
        });
    }
    if let Some(image) = &args.composite {
        commands.push(CommandDirective::Composite {
            image: image.clone(),
            gravity: args.gravity.clone(),
            geometry: args.geometry.clone(),
            dissolve: args.dissolve,
        });
    }
    FilterDirectives {
        commands: (!commands.is_empty()).then_some(commands),
        buffer_size: args.buffer_size,
        quality: args.quality,
    }
}

fn cmd_transform(args: TransformArgs) -> anyhow::Result<()> {
    let (base, assets_root) = match &args.config {
        Some(path) => (
            FilterDirectives::from_json_file(path)?,
            path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
        ),
        None => (FilterDirectives::default(), PathBuf::from(".")),
    };
    let layers = [base, overrides_from(&args)];
    let config = FilterDirectives::resolve(&layers, &assets_root)?;
    let filter = ImageFilter::new(config, create_engine(EngineKind::Raster));

    let body = std::fs::read(&args.in_path)
        .with_context(|| format!("read input '{}'", args.in_path.display()))?;
    let head = ResponseHead {
        content_length: Some(body.len() as u64),
        ..Default::default()
    };
    let mut session = match filter.gate(&head)? {
        Gate::Transform(session) => session,
        Gate::Pass => bail!("no transform commands configured; nothing to do"),
    };

    let chunk_size = args.chunk_size.max(1);
    let mut emitted = None;
    let mut offset = 0;
    loop {
        let end = (offset + chunk_size).min(body.len());
        let chunk = BodyChunk {
            data: &body[offset..end],
            last: end == body.len(),
        };
        if let FeedOutcome::Emit(out) = session.feed(&[chunk])? {
            emitted = Some(out);
        }
        offset = end;
        if offset >= body.len() {
            break;
        }
    }
    session.finish();
    let emitted = emitted.context("stream ended without a transformed body")?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let content_type = emitted.content_type;
    let body_out = emitted.package.into_bytes();
    std::fs::write(&args.out, &body_out)
        .with_context(|| format!("write output '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({} bytes, {})",
        args.out.display(),
        body_out.len(),
        content_type
    );
    Ok(())
}

fn cmd_sniff(args: SniffArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.in_path)
        .with_context(|| format!("read input '{}'", args.in_path.display()))?;
    let Some(kind) = ImageKind::sniff(&bytes) else {
        bail!("'{}' does not carry a supported image signature", args.in_path.display());
    };
    let handle = create_engine(EngineKind::Raster).decode(&bytes)?;
    let (width, height) = handle.dimensions();
    println!("{} {}x{}", kind.content_type(), width, height);
    Ok(())
}

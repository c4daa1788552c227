use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use parconv::{MagnitudeMode, PipelineConfig, PixelBuffer, Rgb, Strategy};
use sha2::Digest as _;

#[derive(Parser, Debug)]
#[command(name = "parconv", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Sobel edge pipeline on an image and write the result as PNG.
    Edges(EdgesArgs),
    /// Time every strategy on the same image and check that their outputs agree.
    Bench(BenchArgs),
    /// Print the default pipeline configuration as JSON.
    Config,
}

#[derive(Parser, Debug)]
struct PipelineArgs {
    /// Worker count (defaults to the host's available parallelism).
    #[arg(long)]
    threads: Option<u32>,

    /// Pipeline configuration JSON; command-line flags override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gradient combination.
    #[arg(long, value_enum)]
    magnitude: Option<MagnitudeChoice>,
}

#[derive(Parser, Debug)]
struct EdgesArgs {
    /// Input image (any format the `image` crate decodes).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Work distribution: name (`static-chunks`, ...) or numeric selector 1..=4.
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<Strategy>,

    /// Print the SHA-256 of the encoded RGBA8 output on stdout.
    #[arg(long)]
    digest: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Parser, Debug)]
struct BenchArgs {
    /// Input image; a synthetic test card is generated when omitted.
    #[arg(long = "in")]
    in_path: Option<PathBuf>,

    /// Side length of the synthetic test card.
    #[arg(long, default_value_t = 512)]
    size: u32,

    /// Runs per strategy; the fastest is reported.
    #[arg(long, default_value_t = 3)]
    repeat: u32,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MagnitudeChoice {
    Sum,
    Euclidean,
}

impl From<MagnitudeChoice> for MagnitudeMode {
    fn from(choice: MagnitudeChoice) -> Self {
        match choice {
            MagnitudeChoice::Sum => MagnitudeMode::Sum,
            MagnitudeChoice::Euclidean => MagnitudeMode::Euclidean,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Edges(args) => cmd_edges(args),
        Command::Bench(args) => cmd_bench(args),
        Command::Config => cmd_config(),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    s.parse::<Strategy>().map_err(|e| e.to_string())
}

fn host_parallelism() -> u32 {
    std::thread::available_parallelism()
        .map(|n| u32::try_from(n.get()).unwrap_or(u32::MAX))
        .unwrap_or(1)
}

fn resolve_config(args: &PipelineArgs) -> anyhow::Result<PipelineConfig> {
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("load pipeline config '{}'", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(threads) = args.threads {
        cfg.workers = Some(threads);
    }
    if let Some(m) = args.magnitude {
        cfg.magnitude = m.into();
    }
    Ok(cfg)
}

fn cmd_edges(args: EdgesArgs) -> anyhow::Result<()> {
    let mut cfg = resolve_config(&args.pipeline)?;
    if let Some(strategy) = args.strategy {
        cfg.strategy = strategy;
    }
    let pipeline = cfg.build_pipeline(host_parallelism())?;
    let workers = pipeline.stage().workers();

    eprintln!("loading image from {}", args.in_path.display());
    let input = parconv::codec::load_image(&args.in_path)
        .with_context(|| format!("load input image '{}'", args.in_path.display()))?;

    eprintln!(
        "processing {}x{} image using {workers} threads ({})",
        input.width(),
        input.height(),
        pipeline.stage().strategy()
    );
    let started = Instant::now();
    let (edges, report) = pipeline.run_with_report(&input)?;
    eprintln!(
        "completed processing in {} ms using {workers} threads",
        started.elapsed().as_millis()
    );
    for (kind, stats) in &report.stages {
        tracing::info!(
            stage = kind.name(),
            elapsed_us = stats.elapsed.as_micros() as u64,
            per_worker = ?stats.per_worker,
            "stage timing"
        );
    }

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    parconv::codec::save_png(&edges, &args.out)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    if args.digest {
        println!("{}", sha256_hex(&edges.to_rgba8()));
    }
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_bench(args: BenchArgs) -> anyhow::Result<()> {
    if args.repeat == 0 {
        anyhow::bail!("--repeat must be >= 1");
    }
    let cfg = resolve_config(&args.pipeline)?;
    let input = match &args.in_path {
        Some(path) => parconv::codec::load_image(path)
            .with_context(|| format!("load input image '{}'", path.display()))?,
        None => test_card(args.size)?,
    };
    let fallback = host_parallelism();

    eprintln!(
        "benchmarking {}x{} image, best of {} runs",
        input.width(),
        input.height(),
        args.repeat
    );

    let mut reference: Option<PixelBuffer> = None;
    for strategy in Strategy::ALL {
        let pipeline = PipelineConfig {
            strategy,
            ..cfg.clone()
        }
        .build_pipeline(fallback)?;

        let mut best = Duration::MAX;
        let mut output = None;
        for _ in 0..args.repeat {
            let started = Instant::now();
            let out = pipeline.run(&input)?;
            best = best.min(started.elapsed());
            output = Some(out);
        }
        let output = output.context("bench produced no output")?;

        match &reference {
            None => reference = Some(output),
            Some(expected) => {
                let diff = expected.max_abs_diff(&output)?;
                if diff > 1e-6 {
                    anyhow::bail!("{strategy} differs from sequential output by {diff}");
                }
            }
        }

        println!(
            "{:<16} {:>3} threads {:>10.3} ms",
            strategy.name(),
            pipeline.stage().workers(),
            best.as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&PipelineConfig::default())
        .context("serialize default config")?;
    println!("{json}");
    Ok(())
}

/// Deterministic synthetic input: colour ramps with a bright square in the middle.
fn test_card(size: u32) -> anyhow::Result<PixelBuffer> {
    let s = size.max(1) as f32;
    let lo = size / 4;
    let hi = size - lo;
    Ok(PixelBuffer::from_fn(size, size, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            Rgb::WHITE
        } else {
            Rgb::new(x as f32 / s, y as f32 / s, ((x ^ y) & 0xff) as f32 / 255.0)
        }
    })?)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

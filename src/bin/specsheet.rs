//! CLI binary for edgequake-specsheet.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig`, writes the PDFs and prints the batch summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_specsheet::{
    convert_to_dir, inspect, BatchOutput, BatchProgressCallback, LayoutOptions, OutputMode,
    PageFrame, PipelineConfig, ProductState, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished product.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Classification start times, keyed by product index.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` reports how many products there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading table…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_products: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} products  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_products as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_products} products…"))
        ));
    }

    fn on_product_start(&self, index: usize, _total: usize, name: &str) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_product_complete(&self, index: usize, total: usize, name: &str, pages: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(&format!("{pages} page(s)")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_product_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, done: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(done);
        if failed == 0 {
            eprintln!(
                "{} {} products rendered successfully",
                green("✔"),
                bold(&done.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} products rendered  ({} failed)",
                if done == 0 { red("✘") } else { cyan("⚠") },
                bold(&done.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One PDF per product into ./out
  specsheet products.md -o out/

  # Everything in a single PDF
  specsheet products.md --combined catalogue.pdf -o out/

  # Check how the table parses (no API key needed)
  specsheet --dry-run products.md

  # House style from a JSON file, with letterhead bands
  specsheet products.md --layout style.json --frame

  # Use a specific model
  specsheet --model gpt-4.1-mini --provider openai products.md

INPUT FORMAT:
  | Product        | Configurations | Price   |
  |----------------|----------------|---------|
  | Dell Latitude  | Base           | $999.00 |
  | NaN            | CPU            | i7      |
  | NaN            | RAM            | 16GB    |

  Rows whose first cell is the sentinel (default "NaN") continue the
  product above them.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override log filter (e.g. edgequake_specsheet=debug)
"#;

/// Render product spec-sheet PDFs from a markdown configuration table.
#[derive(Parser, Debug)]
#[command(
    name = "specsheet",
    version,
    about = "Render product spec-sheet PDFs from a markdown configuration table",
    long_about = "Parse a markdown pipe table of product configurations, group each product's \
rows into specification categories with an LLM, and render one two-column PDF spec sheet per \
product. Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible \
endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file containing the product table.
    input: PathBuf,

    /// Directory to write PDFs into.
    #[arg(short, long, env = "SPECSHEET_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Write one combined PDF instead of one per product.
    #[arg(long, env = "SPECSHEET_COMBINED", num_args = 0..=1,
          default_missing_value = "spec_sheets.pdf", value_name = "FILE")]
    combined: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Number of concurrent classifier calls.
    #[arg(short, long, env = "SPECSHEET_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Classifier calls per product before giving up.
    #[arg(long, env = "SPECSHEET_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Base delay for exponential backoff between attempts.
    #[arg(long, env = "SPECSHEET_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "SPECSHEET_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "SPECSHEET_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens per product.
    #[arg(long, env = "SPECSHEET_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// First-column marker for continuation rows.
    #[arg(long, env = "SPECSHEET_SENTINEL", default_value = "NaN")]
    sentinel: String,

    /// Comma-separated category vocabulary (replaces the default list).
    #[arg(long, env = "SPECSHEET_VOCABULARY", value_delimiter = ',')]
    vocabulary: Vec<String>,

    /// Print "<name> (continued)" at the top of continuation pages.
    #[arg(long, env = "SPECSHEET_REPEAT_HEADER")]
    repeat_header: bool,

    /// JSON file with layout options (margins, colours, fonts, ...).
    #[arg(long, env = "SPECSHEET_LAYOUT")]
    layout: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "SPECSHEET_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Draw shaded header and footer bands on every page.
    #[arg(long, env = "SPECSHEET_FRAME")]
    frame: bool,

    /// Print the batch summary (or dry-run parse) as JSON on stdout.
    #[arg(long, env = "SPECSHEET_JSON")]
    json: bool,

    /// Parse the table and report products; no LLM calls, no PDFs.
    #[arg(long)]
    dry_run: bool,

    /// Disable progress bar.
    #[arg(long, env = "SPECSHEET_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SPECSHEET_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SPECSHEET_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs unless --verbose.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.dry_run;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        let markdown = tokio::fs::read_to_string(&cli.input)
            .await
            .with_context(|| format!("Failed to read {}", cli.input.display()))?;
        let parsed = inspect(&markdown, &config);

        if cli.json {
            let json = serde_json::to_string_pretty(&parsed.blocks)
                .context("Failed to serialise parse output")?;
            println!("{json}");
        } else {
            for (i, block) in parsed.blocks.iter().enumerate() {
                let price = if block.base_price.is_empty() {
                    "-"
                } else {
                    block.base_price.as_str()
                };
                println!(
                    "{:>3}. {}  {}  {}",
                    i + 1,
                    bold(&block.name),
                    price,
                    dim(&format!("{} row(s), line {}", block.entries.len(), block.line))
                );
                for entry in &block.entries {
                    println!("       {}: {}", entry.label, entry.value);
                }
            }
        }
        for warning in &parsed.warnings {
            eprintln!("{} {}", cyan("⚠"), warning);
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let output = convert_to_dir(&cli.input, &cli.output_dir, &config)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json =
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, show_progress);
    }

    if output.summary.has_failures() {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Files written and failures, after the run.
fn print_summary(output: &BatchOutput, show_progress: bool) {
    let summary = &output.summary;
    if !show_progress {
        eprintln!(
            "Rendered {}/{} products in {}ms",
            summary.done, summary.products, summary.duration_ms
        );
    }
    for pdf in &output.documents {
        if let Some(ref path) = pdf.path {
            eprintln!(
                "   {}  {}",
                bold(&path.display().to_string()),
                dim(&format!("{} page(s)", pdf.pages))
            );
        }
    }
    for report in &output.reports {
        if let ProductState::Failed { stage, reason } = &report.state {
            eprintln!("   {} {} ({}): {}", red("✗"), report.name, stage, reason);
        }
    }
    if summary.degraded > 0 {
        eprintln!(
            "   {} {} product(s) could not be categorised and were rendered as Unclassified",
            cyan("⚠"),
            summary.degraded
        );
    }
    if summary.warnings > 0 {
        eprintln!("   {} {} table row(s) skipped", cyan("⚠"), summary.warnings);
    }
    eprintln!(
        "   {} tokens in  /  {} tokens out, {}ms total",
        dim(&summary.input_tokens.to_string()),
        dim(&summary.output_tokens.to_string()),
        summary.duration_ms,
    );
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut layout = if let Some(ref path) = cli.layout {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read layout from {:?}", path))?;
        serde_json::from_str::<LayoutOptions>(&json)
            .with_context(|| format!("Invalid layout JSON in {:?}", path))?
    } else {
        LayoutOptions::default()
    };
    if cli.frame && layout.frame.is_none() {
        layout.frame = Some(PageFrame::default());
    }
    if cli.repeat_header {
        layout.repeat_header = true;
    }

    let output_mode = match cli.combined {
        Some(ref file_name) => OutputMode::Combined {
            file_name: file_name.clone(),
        },
        None => OutputMode::PerProduct,
    };

    let mut builder = PipelineConfig::builder()
        .concurrency(cli.concurrency)
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .api_timeout_secs(cli.api_timeout)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .sentinel(cli.sentinel.clone())
        .layout(layout)
        .output_mode(output_mode);

    if !cli.vocabulary.is_empty() {
        builder = builder.vocabulary(cli.vocabulary.iter().map(|v| v.trim().to_string()));
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

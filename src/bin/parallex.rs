//! CLI binary for parallex.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ParallexConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use parallex::{
    parallex, parallex_to_file, BatchProgressCallback, BatchStatus, LogLevel, MissingPagePolicy,
    ParallexCallableOutput, ParallexConfig, ProgressCallback,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one spinner whose message follows the batch status.
///
/// A batch can take hours, so the spinner shows elapsed time and the number
/// of status queries rather than a page bar.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_pages_ready(&self, total_pages: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Submitting {total_pages} pages as one batch…"))
        ));
        self.bar.set_prefix("Submitting");
    }

    fn on_batch_submitted(&self, job_id: &str, total_pages: usize) {
        self.bar.println(format!(
            "  {} batch {} accepted ({} pages)",
            green("✓"),
            job_id,
            total_pages
        ));
        self.bar.set_prefix("Waiting");
        self.bar.set_message("first status check pending");
    }

    fn on_status(&self, job_id: &str, status: BatchStatus, polls: u32) {
        self.bar
            .set_message(format!("{job_id}: {status} (checked {polls}×)"));
    }

    fn on_batch_finished(&self, job_id: &str, status: BatchStatus) {
        let mark = if status == BatchStatus::Succeeded {
            green("✓")
        } else {
            red("✗")
        };
        self.bar.println(format!("  {mark} batch {job_id} {status}"));
        self.bar.set_prefix("Collecting");
        self.bar.set_message("downloading results");
    }

    fn on_output_ready(&self, answered_pages: usize, missing_pages: usize) {
        self.bar.finish_and_clear();
        if missing_pages == 0 {
            eprintln!(
                "{} {} pages converted successfully",
                green("✔"),
                bold(&answered_pages.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages converted  ({} without a response)",
                if answered_pages == 0 { red("✘") } else { cyan("⚠") },
                bold(&answered_pages.to_string()),
                answered_pages + missing_pages,
                red(&missing_pages.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (markdown on stdout)
  parallex document.pdf --model gpt-4o

  # JSON output with per-page results and missing-page report
  parallex document.pdf --json -o document.json

  # Convert from URL, fail if any page gets no answer
  parallex https://arxiv.org/pdf/1706.03762 --missing-pages fail

  # Poll every 30s and give up after 6 hours
  parallex big.pdf --poll-interval 30 --timeout 21600

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY               OpenAI API key
  OPENAI_BASE_URL              OpenAI-compatible base URL (default https://api.openai.com/v1)
  AZURE_OPENAI_API_KEY         Azure OpenAI key (takes precedence with AZURE_OPENAI_ENDPOINT)
  AZURE_OPENAI_ENDPOINT        Azure OpenAI resource endpoint
  AZURE_OPENAI_API_VERSION     Azure API version
  AZURE_OPENAI_API_DEPLOYMENT  Deployment used when --model is not given
  RUST_LOG                     Overrides --log-level

NOTES:
  Batch jobs complete within the provider's completion window (24h), not
  in seconds. Interrupting the CLI stops waiting but leaves the remote job
  running.
"#;

#[derive(Parser, Debug)]
#[command(
    name = "parallex",
    version,
    about = "Convert PDF files and URLs to Markdown through an LLM batch API",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF path or HTTP/HTTPS URL.
    input: String,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "PARALLEX_OUTPUT")]
    output: Option<PathBuf>,

    /// Model (or Azure deployment). Defaults to AZURE_OPENAI_API_DEPLOYMENT.
    #[arg(long, env = "PARALLEX_MODEL")]
    model: Option<String>,

    /// Pages rendered and encoded in parallel before submission.
    #[arg(short, long, env = "PARALLEX_CONCURRENCY", default_value_t = 20)]
    concurrency: usize,

    /// File holding a prompt that replaces the default.
    #[arg(long, env = "PARALLEX_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    #[arg(long, env = "PARALLEX_LOG_LEVEL", default_value = "error")]
    log_level: LogLevel,

    /// Seconds between status queries.
    #[arg(long, env = "PARALLEX_POLL_INTERVAL", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: u64,

    /// Seconds to wait before the first status query.
    #[arg(long, env = "PARALLEX_INITIAL_DELAY", default_value_t = 30)]
    initial_delay: u64,

    /// Give up polling after this many seconds. The remote job keeps running.
    #[arg(long, env = "PARALLEX_TIMEOUT")]
    timeout: Option<u64>,

    #[arg(long, env = "PARALLEX_MISSING_PAGES", value_enum, default_value = "partial")]
    missing_pages: MissingPagesArg,

    /// Do not delete uploaded and generated provider files.
    #[arg(long, env = "PARALLEX_KEEP_REMOTE_FILES")]
    keep_remote_files: bool,

    /// Print the full output as JSON instead of Markdown.
    #[arg(long, env = "PARALLEX_JSON")]
    json: bool,

    /// Text placed between pages in Markdown output.
    #[arg(long, env = "PARALLEX_SEPARATOR", default_value = "\n\n")]
    separator: String,

    #[arg(long, env = "PARALLEX_PASSWORD")]
    password: Option<String>,

    #[arg(long, env = "PARALLEX_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MissingPagesArg {
    Partial,
    Fail,
}

impl From<MissingPagesArg> for MissingPagePolicy {
    fn from(v: MissingPagesArg) -> Self {
        match v {
            MissingPagesArg::Partial => MissingPagePolicy::Partial,
            MissingPagesArg::Fail => MissingPagePolicy::Fail,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let show_progress = !cli.no_progress && cli.log_level <= LogLevel::Warn;
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    match (&cli.output, cli.json) {
        (Some(path), true) => {
            let output = parallex_to_file(&cli.input, path, &config)
                .await
                .context("Conversion failed")?;
            report_missing(&output);
            eprintln!("{} wrote {}", green("✔"), bold(&path.display().to_string()));
        }
        (Some(path), false) => {
            let output = parallex(&cli.input, &config)
                .await
                .context("Conversion failed")?;
            report_missing(&output);
            std::fs::write(path, output.markdown(&cli.separator) + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} wrote {}", green("✔"), bold(&path.display().to_string()));
        }
        (None, json) => {
            let output = parallex(&cli.input, &config)
                .await
                .context("Conversion failed")?;
            report_missing(&output);
            let rendered = if json {
                serde_json::to_string_pretty(&output).context("Failed to serialize output")?
            } else {
                output.markdown(&cli.separator)
            };
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{rendered}").context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

fn report_missing(output: &ParallexCallableOutput) {
    if !output.is_complete() {
        eprintln!(
            "{} pages without a response: {:?} (trace {})",
            cyan("⚠"),
            output.missing_pages,
            output.trace_id
        );
    }
}

async fn build_config(cli: &Cli, progress_cb: Option<ProgressCallback>) -> Result<ParallexConfig> {
    let mut builder = ParallexConfig::builder()
        .concurrency(cli.concurrency)
        .log_level(cli.log_level)
        .poll_interval(Duration::from_secs(cli.poll_interval))
        .initial_poll_delay(Duration::from_secs(cli.initial_delay))
        .missing_page_policy(cli.missing_pages.into())
        .cleanup_remote_files(!cli.keep_remote_files);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.poll_timeout(Duration::from_secs(secs));
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt file {}", path.display()))?;
        builder = builder.prompt_text(prompt);
    }
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

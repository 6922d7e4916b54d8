//! Command line interface for driving a NodeODM task end to end
//!
//! All orchestration lives in the library; this binary only parses
//! arguments, resolves inputs, renders per-stage progress bars, and
//! translates classified failures into exit codes.

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use odm_pilot::{
    Error, FailureKind, NodeClient, NodeConfig, ProgressSink, RunConfig, TaskOptions,
    fmt_elapsed_time, list_images, monitor, retrieve, submit, validate_output_dir,
};

/// Command line client for NodeODM processing nodes
#[derive(Debug, Parser)]
#[command(name = "odm-pilot", version, about)]
struct Cli {
    /// Photo folder
    folder: PathBuf,

    /// Hostname or IP address of the processing node
    #[arg(short = 's', long, default_value = "localhost")]
    server: String,

    /// Port of the processing node
    #[arg(short = 'p', long, default_value_t = 3000)]
    port: u16,

    /// Token to use for authentication
    #[arg(short = 't', long, default_value = "")]
    token: String,

    /// Absolute path to save output files (defaults to the photo folder)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// User-friendly name for the task
    #[arg(long)]
    name: Option<String>,

    /// Timeout value in seconds for network requests
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Seconds between status polls while the task is processing
    #[arg(long, default_value_t = 30)]
    interval: u64,

    /// Task settings (preset filename or JSON string)
    #[arg(long)]
    options: Option<String>,
}

/// Fixed-width terminal progress bar, one per pipeline stage
struct TermBar {
    label: &'static str,
    last_pct: Mutex<i64>,
}

impl TermBar {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            last_pct: Mutex::new(-1),
        }
    }

    /// Print the final newline once the stage is over
    fn close(&self) {
        println!();
    }
}

impl ProgressSink for TermBar {
    fn set(&self, percent: f32) {
        let pct = percent.round().clamp(0.0, 100.0) as i64;
        let mut last = match self.last_pct.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if pct == *last {
            return;
        }
        *last = pct;

        let filled = (pct / 5) as usize;
        print!(
            "\r{} [{}{}] {:3}%",
            self.label,
            "#".repeat(filled),
            "-".repeat(20 - filled),
            pct
        );
        std::io::stdout().flush().ok();
    }
}

fn report_failure(err: &Error) {
    match err.kind() {
        FailureKind::Connection => eprintln!("Cannot connect: {}", err),
        FailureKind::TaskFailed => {
            eprintln!("Task Error: {}", err);
            if let Error::TaskFailed { log_tail, .. } = err {
                for line in log_tail {
                    eprintln!("{}", line);
                }
            }
        }
        FailureKind::Canceled => eprintln!("Task Canceled"),
        FailureKind::Protocol | FailureKind::Storage => eprintln!("Error: {}", err),
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    if !cli.folder.is_dir() {
        return Err(Error::InvalidState(format!(
            "invalid photo folder '{}'",
            cli.folder.display()
        )));
    }

    let files = list_images(&cli.folder)?;
    if files.is_empty() {
        return Err(Error::NoInputFiles);
    }

    let task_name = match &cli.name {
        Some(name) => name.clone(),
        None => cli
            .folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "task".to_string()),
    };

    let destination = match &cli.output {
        Some(out) if validate_output_dir(out) => out.clone(),
        _ => std::path::absolute(&cli.folder)?,
    };

    let options = TaskOptions::load(cli.options.as_deref());

    let node = NodeClient::new(&NodeConfig {
        host: cli.server.clone(),
        port: cli.port,
        token: cli.token.clone(),
        timeout_secs: cli.timeout,
    })?;
    let run_config = RunConfig {
        poll_interval_secs: cli.interval,
        ..Default::default()
    };
    let cancel = odm_pilot::cancel_on_signal();

    let upload_bar = TermBar::new("Uploading images.......");
    let mut task = submit::submit(&node, &files, &task_name, &options, &upload_bar).await?;
    upload_bar.close();

    println!("Task unique identifier.: {}", task.id);
    println!("Number of images.......: {}", task.image_count);

    let processing_bar = TermBar::new("Processing.............");
    let monitored = monitor::await_completion(
        &node,
        &mut task,
        &processing_bar,
        run_config.poll_interval(),
        run_config.log_tail_lines,
        &cancel,
    )
    .await;
    processing_bar.close();
    monitored?;

    if let Some(ms) = task.processing_time_ms {
        println!("Task <{}> completed in {}", task.name, fmt_elapsed_time(ms));
    }

    let download_bar = TermBar::new("Downloading results....");
    retrieve::retrieve(&node, &task, &destination, &download_bar).await?;
    download_bar.close();

    println!("Assets saved in {}", destination.display());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_failure(&err);
            ExitCode::from(err.exit_code())
        }
    }
}

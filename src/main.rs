use clap::{Parser, Subcommand};
use image_worker::imaging::TransformRegistry;
use image_worker::{config, output, pipeline};
use std::path::PathBuf;

/// Flags shared by commands that read a worker config.
#[derive(clap::Args, Clone)]
struct ConfigArgs {
    /// Worker config file (JSON, or TOML with a .toml extension)
    #[arg(long, short = 'c', default_value = "worker.json")]
    config: PathBuf,

    /// Source image URL or path, overriding source_image_url
    #[arg(long)]
    source: Option<String>,

    /// Scratch directory, overriding work_dir
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Skip download and publishing; results stay in the work directory
    #[arg(long)]
    disable_network: bool,
}

#[derive(Parser)]
#[command(name = "image-worker")]
#[command(about = "Batch image worker: one source, many derivatives")]
#[command(long_about = "\
Batch image worker: one source, many derivatives

Fetches one source image, applies each configured operation to a fresh copy
of it, and publishes the results to a bucket directory.

Config:

  {
    \"source_image_url\": \"https://cdn.example.com/uploads/poster.jpg\",
    \"publish\": {\"bucket_dir\": \"bucket\", \"public_base_url\": \"https://cdn.example.com/\"},
    \"operations\": [
      {\"op\": \"thumbnail\", \"width\": 100, \"height\": 100, \"destination_path\": \"offers/42\"},
      {\"op\": \"tile\", \"num_tiles_width\": 3, \"num_tiles_height\": 3, \"merge\": true}
    ]
  }

Run 'image-worker ops' to list operation names.
Set RUST_LOG=debug for stage-by-stage diagnostics.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every configured operation and publish the results
    Run(ConfigArgs),
    /// Validate the config and operation list without touching images
    Check(ConfigArgs),
    /// List the available operations
    Ops,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let worker_config = load(&args)?;
            println!("==> Config");
            println!("{}", worker_config.to_pretty_json());
            init_thread_pool(&worker_config);

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_pipeline_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline::run(&worker_config, Some(tx));
            printer.join().ok();
            let report = result?;

            if !report.is_clean() {
                println!("==> Completed with errors");
                output::print_run_summary(&report);
                return Err(format!(
                    "{} operation(s) failed, {} file(s) not published",
                    report.failed(),
                    report.publish_failures.len()
                )
                .into());
            }
            println!("==> Run complete");
        }
        Command::Check(args) => {
            let worker_config = load(&args)?;
            println!("==> Checking {}", args.config.display());
            let registry = TransformRegistry::builtin();
            let problems = pipeline::check_operations(&registry, &worker_config.operations);
            for (index, error) in &problems {
                println!("{:0>3} {}", index, error);
            }
            if !problems.is_empty() {
                return Err(format!("{} invalid operation(s)", problems.len()).into());
            }
            println!(
                "==> Config is valid ({} operations)",
                worker_config.operations.len()
            );
        }
        Command::Ops => {
            output::print_operation_list(&TransformRegistry::builtin());
        }
    }

    Ok(())
}

/// Load the config, apply command-line overrides, then validate.
fn load(args: &ConfigArgs) -> Result<config::WorkerConfig, config::ConfigError> {
    let mut worker_config = config::load_config(&args.config)?;
    if let Some(source) = &args.source {
        worker_config.source_image_url = Some(source.clone());
    }
    if let Some(work_dir) = &args.work_dir {
        worker_config.work_dir = work_dir.clone();
    }
    if args.disable_network {
        worker_config.disable_network = true;
    }
    worker_config.validate()?;
    Ok(worker_config)
}

/// Initialize the rayon thread pool based on `max_threads`.
///
/// Caps at the number of available CPU cores: user can constrain down, not up.
fn init_thread_pool(worker_config: &config::WorkerConfig) {
    let threads = config::effective_threads(worker_config);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

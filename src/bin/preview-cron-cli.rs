use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures_util::future::join_all;

use preview_cron::config::{load_vercel_json, CronJob, PanelConfig};
use preview_cron::dispatch::{Dispatcher, JobRun, DEFAULT_RELAY_URL};
use preview_cron::lifecycle::signals;
use preview_cron::observability::logging;

#[derive(Parser)]
#[command(name = "preview-cron-cli")]
#[command(about = "Trigger vercel.json cron jobs against a preview deployment", long_about = None)]
struct Cli {
    #[arg(long, default_value = "vercel.json")]
    vercel_json: PathBuf,

    /// Base URL of the preview deployment.
    #[arg(short, long, default_value = "http://localhost:3000")]
    preview_url: String,

    /// Deployment-protection bypass token.
    #[arg(short, long)]
    token: Option<String>,

    /// Extra header as `Name: value`. Repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    #[arg(short, long, default_value = DEFAULT_RELAY_URL)]
    relay_url: String,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cron jobs found in vercel.json
    List,
    /// Run one job, by path or id
    Run { job: String },
    /// Run every job concurrently
    RunAll,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let jobs = load_vercel_json(&cli.vercel_json)?;

    let panel = PanelConfig {
        preview_url: cli.preview_url,
        deploy_protection_token: cli.token,
        custom_headers: (!cli.headers.is_empty()).then(|| cli.headers.join("\n")),
    };

    match cli.command {
        Commands::List => {
            for job in &jobs {
                println!("{:<40} {:<20} {}", job.path, job.schedule, job.id);
            }
        }
        Commands::Run { job } => {
            let dispatcher = build_dispatcher(panel, &cli.relay_url, cli.timeout_secs)?;
            let Some(job) = find_job(&jobs, &job) else {
                eprintln!("Error: no cron job matches {job}");
                std::process::exit(2);
            };
            match until_interrupted(&dispatcher, dispatcher.run_job(job)).await {
                Some(Some(run)) => print_run(job, &run),
                Some(None) => {}
                None => std::process::exit(130),
            }
        }
        Commands::RunAll => {
            let dispatcher = build_dispatcher(panel, &cli.relay_url, cli.timeout_secs)?;
            let all = join_all(jobs.iter().map(|job| dispatcher.run_job(job)));
            let Some(runs) = until_interrupted(&dispatcher, all).await else {
                std::process::exit(130);
            };
            for (job, run) in jobs.iter().zip(runs) {
                if let Some(run) = run {
                    print_run(job, &run);
                }
            }
        }
    }

    Ok(())
}

fn build_dispatcher(
    panel: PanelConfig,
    relay_url: &str,
    timeout_secs: u64,
) -> Result<Dispatcher, Box<dyn std::error::Error>> {
    let dispatcher =
        Dispatcher::new(panel, relay_url)?.with_timeout(Duration::from_secs(timeout_secs));
    for rejected in dispatcher.rejected_headers() {
        eprintln!("Warning: {rejected}");
    }
    Ok(dispatcher)
}

/// Drive `work` to completion unless a termination signal arrives first, in
/// which case every running job is aborted and `None` is returned.
async fn until_interrupted<F: Future>(dispatcher: &Dispatcher, work: F) -> Option<F::Output> {
    tokio::pin!(work);
    tokio::select! {
        output = &mut work => Some(output),
        _ = signals::shutdown_signal() => {
            let aborted = dispatcher.slots().abort_all();
            eprintln!("Interrupted: aborted {aborted} running job(s)");
            // Aborted runs resolve immediately, dropping their connections.
            work.await;
            None
        }
    }
}

fn find_job<'a>(jobs: &'a [CronJob], needle: &str) -> Option<&'a CronJob> {
    jobs.iter()
        .find(|j| j.id == needle)
        .or_else(|| jobs.iter().find(|j| j.path == needle))
}

fn print_run(job: &CronJob, run: &JobRun) {
    let mark = if run.outcome.success() { "ok" } else { "FAIL" };
    println!(
        "[{mark}] {} ({}) {} in {}ms",
        job.path,
        job.schedule,
        run.outcome.status_code(),
        run.duration.as_millis()
    );
    println!("       {}", run.outcome.message());
}

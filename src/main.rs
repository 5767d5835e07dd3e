use clap::{Parser, Subcommand};
use review_pulse::{AppConfig, PulseService};
use tracing::info;

#[derive(Parser)]
#[command(name = "review-pulse", about = "App review pulse pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once for a trailing window and print the summary.
    Run {
        /// Number of days to look back.
        #[arg(long, default_value_t = 28)]
        window_days: i64,
        /// Extra recipient, appended to the configured defaults.
        #[arg(long)]
        recipient: Option<String>,
    },
    /// Start the background scheduler and serve until interrupted.
    Schedule,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let service = PulseService::from_config(&config)?;

    match cli.command {
        Command::Run {
            window_days,
            recipient,
        } => {
            let output = service.run_manual(window_days, recipient).await?;
            println!(
                "Run {} finished with outcome {:?}",
                output.record.run_id, output.record.outcome
            );
            println!("Window: {}", output.report.window);
            println!("Pulse artifact: {}", output.pulse_artifact);
            for summary in &output.report.top_themes {
                println!("  {} ({} reviews)", summary.theme, summary.review_count);
            }
            println!();
            println!("{}", output.report.narrative);
        }
        Command::Schedule => {
            service.start_scheduler().await;
            let status = service.status().await;
            info!(
                "scheduler: enabled={} running={} schedule=\"{}\" tz={} next_fire_at={}",
                status.enabled, status.running, status.schedule, status.timezone, status.next_fire_at
            );
            tokio::signal::ctrl_c().await?;
            service.stop_scheduler().await;
        }
    }

    Ok(())
}

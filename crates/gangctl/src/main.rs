use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "gangctl",
    about = "Gangway — policy engine for distributed training jobs",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a job manifest and check its spec and elastic policy
    Validate {
        /// Job manifest (.toml or .json)
        #[arg(short, long)]
        job: String,
    },
    /// Run one evaluation tick for a job.
    ///
    /// Pods and metric readings are JSON arrays; omit them to evaluate a
    /// job with nothing observed yet.
    Evaluate {
        /// Job manifest (.toml or .json)
        #[arg(short, long)]
        job: String,
        /// Observed pods (JSON array)
        #[arg(short, long)]
        pods: Option<String>,
        /// Scaling-metric readings (JSON array)
        #[arg(short, long)]
        metrics: Option<String>,
        /// Engine configuration (TOML)
        #[arg(short, long)]
        config: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print the preemption label for one pod of a job
    Label {
        #[arg(short, long)]
        job: String,
        /// Replica role (coordinator or worker)
        #[arg(short, long)]
        role: String,
        /// Replica index
        #[arg(short, long)]
        index: String,
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Print the effective engine configuration as TOML
    Config {
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gangway=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { job } => commands::validate::validate(&job),
        Commands::Evaluate {
            job,
            pods,
            metrics,
            config,
            format,
        } => commands::evaluate::evaluate(
            &job,
            pods.as_deref(),
            metrics.as_deref(),
            config.as_deref(),
            &format,
        ),
        Commands::Label {
            job,
            role,
            index,
            config,
        } => commands::label::label(&job, &role, &index, config.as_deref()),
        Commands::Config { config } => commands::show_config(config.as_deref()),
    }
}

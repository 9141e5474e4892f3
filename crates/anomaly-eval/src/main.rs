use std::path::PathBuf;

use anomaly_eval::{
    backend::{create_device, create_labeler, get_backend_name, SelectedBackend},
    run_evaluation, EvaluationConfig,
};
use anomaly_util::Connectivity;
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "anomaly-eval")]
#[command(about = "Region-level evaluation of anomaly segmentation maps (AUPRO, IAPS)")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate score maps against ground-truth masks
    Evaluate {
        /// Directory of anomaly score maps (grayscale images)
        #[arg(long)]
        maps: PathBuf,

        /// Directory of ground-truth masks mirroring the maps directory
        #[arg(long)]
        masks: PathBuf,

        /// Largest global false positive rate integrated by AUPRO
        #[arg(long, default_value_t = 0.3)]
        fpr_limit: f64,

        /// Rank fraction of the pixel score representing a region
        #[arg(long, default_value_t = 0.5)]
        ioi_thresh: f64,

        /// Recall at which instance precision is reported
        #[arg(long, default_value_t = 0.9)]
        recall_thresh: f64,

        /// Pixel adjacency for splitting masks into regions
        #[arg(long, value_enum, default_value_t = ConnectivityArg::Eight)]
        connectivity: ConnectivityArg,

        /// Write PRO curve figure data as JSON to this file
        #[arg(long)]
        figure: Option<PathBuf>,
    },

    /// Show backend information
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConnectivityArg {
    Four,
    Eight,
}

impl From<ConnectivityArg> for Connectivity {
    fn from(value: ConnectivityArg) -> Self {
        match value {
            ConnectivityArg::Four => Self::Four,
            ConnectivityArg::Eight => Self::Eight,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let device = create_device();
    tracing::info!(backend = get_backend_name(), "using backend");

    match cli.command {
        Commands::Evaluate {
            maps,
            masks,
            fpr_limit,
            ioi_thresh,
            recall_thresh,
            connectivity,
            figure,
        } => {
            let mut config = EvaluationConfig::new(maps, masks).with_connectivity(connectivity.into());
            config.aupro.fpr_limit = fpr_limit;
            config.iaps.ioi_thresh = ioi_thresh;
            config.iaps.recall_thresh = recall_thresh;
            config.figure_path = figure;

            let labeler = create_labeler(config.connectivity());
            let report = run_evaluation::<SelectedBackend, _>(&config, &labeler, &device)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        Commands::Info => {
            println!("Anomaly evaluation information:");
            println!("  Backend: {}", get_backend_name());
            println!("  Device: {device:?}");
            println!("  Supported image formats: {}", anomaly_util::SUPPORTED_EXTENSIONS.join(", "));
            Ok(())
        }
    }
}

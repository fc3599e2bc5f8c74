use std::path::PathBuf;

use anyhow::Result;
use burn::backend::Autodiff;
use clap::{Parser, Subcommand};
use unet3d_burn::{Activation, ModelConfig};
use unet3d_demos::{
    inference::run_inference, logging::init_tracing, summary::print_summary,
    training::run_training, BackendInfo, SelectedBackend, TrainingConfig,
};

#[derive(Parser)]
#[command(name = "unet3d")]
#[command(about = "Attention residual 3D U-Net for volumetric segmentation")]
struct Cli {
    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// Input shape as channels,depth,height,width
    #[arg(long, value_delimiter = ',', default_values_t = [4, 128, 128, 128])]
    input_shape: Vec<usize>,

    #[arg(long, default_value_t = 16)]
    n_base_filters: usize,

    #[arg(long, default_value_t = 5)]
    depth: usize,

    #[arg(long, default_value_t = 3)]
    n_segmentation_levels: usize,

    #[arg(long, default_value_t = 4)]
    n_labels: usize,

    /// Final activation: sigmoid or softmax
    #[arg(long, default_value = "sigmoid")]
    activation: Activation,
}

impl ModelArgs {
    fn to_config(&self) -> Result<ModelConfig> {
        let input_shape: [usize; 4] = self
            .input_shape
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("input shape needs exactly 4 values"))?;

        Ok(ModelConfig::new()
            .with_input_shape(input_shape)
            .with_n_base_filters(self.n_base_filters)
            .with_depth(self.depth)
            .with_n_segmentation_levels(self.n_segmentation_levels)
            .with_n_labels(self.n_labels)
            .with_activation(self.activation.clone()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the module tree, parameter count and shape plan
    Summary {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Train on synthetic sphere phantoms
    Train {
        /// Training configuration file; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Segment a synthetic volume and report per-label statistics
    Infer {
        #[command(flatten)]
        model: ModelArgs,

        /// Saved model record to load
        #[arg(short, long)]
        record: Option<PathBuf>,

        /// Index of the synthetic volume
        #[arg(long, default_value_t = 0)]
        index: usize,
    },

    /// Show the backend and the activation memory of one forward pass
    Info {
        #[command(flatten)]
        model: ModelArgs,

        #[arg(long, default_value_t = 1)]
        batch_size: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let backend = BackendInfo::detect();
    tracing::info!(backend = %backend, "using backend");
    let device = backend.device.clone();

    match cli.command {
        Commands::Summary { model } => {
            print_summary::<SelectedBackend>(&model.to_config()?, &device)
        }

        Commands::Train { config } => {
            let config = match config {
                Some(path) => TrainingConfig::load(path)?,
                None => TrainingConfig::new(),
            };
            run_training::<Autodiff<SelectedBackend>>(config, device)
        }

        Commands::Infer {
            model,
            record,
            index,
        } => {
            let stats =
                run_inference::<SelectedBackend>(&model.to_config()?, record, index, &device)?;
            println!("Backend: {backend}");
            println!("label  mean     foreground  dice");
            for entry in stats {
                println!(
                    "{:<6} {:<8.4} {:<11.4} {:.4}",
                    entry.label, entry.mean, entry.foreground, entry.dice
                );
            }
            Ok(())
        }

        Commands::Info { model, batch_size } => {
            let plan = model.to_config()?.shape_plan()?;
            let bytes = backend.activation_bytes(&plan, batch_size);

            println!("Backend: {}", backend.name);
            println!("Device: {:?}", backend.device);
            println!("Float size: {} bytes", backend.float_bytes());
            println!(
                "Activations for batch {batch_size}: {:.1} MiB",
                bytes as f64 / (1024.0 * 1024.0)
            );
            Ok(())
        }
    }
}

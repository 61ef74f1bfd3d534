//! housing-mlp - Main Entry Point
//!
//! Offline training, export and prediction for the housing-price MLP.

use clap::Parser;
use housing_mlp::cli::{
    cmd_export_onnx, cmd_export_params, cmd_info, cmd_predict, cmd_preprocess, cmd_train, Cli, Commands,
};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "housing_mlp=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { data, config, output_dir, trials, epochs, seed, export } => {
            cmd_train(
                data.as_deref(),
                config.as_deref(),
                output_dir.as_deref(),
                trials,
                epochs,
                seed,
                export,
            )?;
        }
        Commands::ExportOnnx { model, output, opset } => {
            cmd_export_onnx(&model, &output, opset)?;
        }
        Commands::ExportParams { scaler, output } => {
            cmd_export_params(&scaler, &output)?;
        }
        Commands::Predict { model, scaler_params, input } => {
            cmd_predict(&model, &scaler_params, &input)?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
        Commands::Preprocess { data, output, config } => {
            cmd_preprocess(&data, &output, config.as_deref())?;
        }
    }

    Ok(())
}

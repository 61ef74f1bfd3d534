//! housing-mlp CLI Module
//!
//! Command-line interface for training, export, prediction and data inspection.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::export::{export_model_onnx, export_scaler_params, ONNXConfig};
use crate::inference::{parse_feature_list, Predictor};
use crate::pipeline::{PipelineSummary, TrainingPipeline};
use crate::utils::{DataLoader, DataSaver};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<18}", key)), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

/// `1234567.891` → `1,234,567.89`
fn format_thousands(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "housing-mlp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Housing price regression: train, export and run an MLP")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clean the data, search hyperparameters and train the final model
    Train {
        /// Input data file (CSV, JSON, or Parquet)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Pipeline config (JSON); flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for the model, scaler and study
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Number of search trials
        #[arg(long)]
        trials: Option<usize>,

        /// Maximum epochs per training run
        #[arg(long)]
        epochs: Option<usize>,

        /// Seed for the split, the sampler and the network
        #[arg(long)]
        seed: Option<u64>,

        /// Also write the ONNX model and scaler parameters
        #[arg(long)]
        export: bool,
    },

    /// Convert a saved model to ONNX
    ExportOnnx {
        /// Saved model (JSON)
        #[arg(short, long, default_value = "mlp_model.json")]
        model: PathBuf,

        /// Output ONNX file
        #[arg(short, long, default_value = "mlp_model.onnx")]
        output: PathBuf,

        /// ONNX opset version
        #[arg(long, default_value = "13")]
        opset: i64,
    },

    /// Write the scaler's mean and scale as JSON
    ExportParams {
        /// Saved scaler (JSON)
        #[arg(short, long, default_value = "scaler.json")]
        scaler: PathBuf,

        /// Output parameters file
        #[arg(short, long, default_value = "scaler_params.json")]
        output: PathBuf,
    },

    /// Predict a price from comma-separated feature values
    Predict {
        /// Model file (.onnx or saved .json model)
        #[arg(short, long, default_value = "mlp_model.onnx")]
        model: PathBuf,

        /// Scaler parameters file
        #[arg(short, long, default_value = "scaler_params.json")]
        scaler_params: PathBuf,

        /// Feature values, e.g. "3,2,85,120"
        #[arg(short, long)]
        input: String,
    },

    /// Show data information
    Info {
        /// Input data file
        #[arg(short, long, default_value = "PH_houses_v2.csv")]
        data: PathBuf,
    },

    /// Clean and encode the data without training
    Preprocess {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Pipeline config (JSON) with preprocessing settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    Ok(match path {
        Some(p) => PipelineConfig::from_file(p)?,
        None => PipelineConfig::default(),
    })
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_train(
    data: Option<&Path>,
    config_path: Option<&Path>,
    output_dir: Option<&Path>,
    trials: Option<usize>,
    epochs: Option<usize>,
    seed: Option<u64>,
    export: bool,
) -> anyhow::Result<()> {
    section("Train");

    let mut config = load_config(config_path)?;
    if let Some(d) = data {
        config = config.with_data_path(d);
    }
    if let Some(dir) = output_dir {
        config = config.with_output_dir(dir);
    }
    if let Some(n) = trials {
        config = config.with_n_trials(n);
    }
    if let Some(e) = epochs {
        config = config.with_epochs(e);
    }
    if let Some(s) = seed {
        config = config.with_seed(s);
    }
    if export {
        config = config.with_export(true);
    }

    println!("  {}", kv("Data", &config.data_path.display().to_string()));
    println!("  {}", kv("Trials", &config.search.optimization.n_trials.to_string()));
    println!("  {}", kv("Epochs", &config.training.epochs.to_string()));
    println!();

    let start = Instant::now();
    let pipeline = TrainingPipeline::new(config)?;
    let summary = pipeline.run()?;
    step_ok(&format!("Pipeline finished in {:.1}s", start.elapsed().as_secs_f64()));

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &PipelineSummary) {
    println!();
    line_box_top();
    line_box_center(&"Training Summary".white().bold().to_string());
    line_box_sep();
    line_box(&kv("Rows loaded", &summary.rows_loaded.to_string()));
    line_box(&kv("After cleaning", &summary.rows_after_cleaning.to_string()));
    line_box(&kv("After features", &summary.rows_after_features.to_string()));
    line_box(&kv("Train / valid", &format!("{} / {}", summary.n_train, summary.n_valid)));
    line_box(&kv("Features", &summary.n_features.to_string()));
    line_box_sep();
    line_box(&kv(
        "Trials",
        &format!("{} ({} failed)", summary.n_trials, summary.n_failed_trials),
    ));
    if let Some(best) = &summary.best_trial {
        line_box(&kv("Best trial", &format!("#{}  rmse {:.4}", best.trial_id, best.value)));
        for (name, value) in &best.params {
            line_box(&kv(&format!("  {}", name), &value.to_string()));
        }
    }
    line_box_sep();
    line_box(&kv("Valid RMSE", &format!("{:.4}", summary.metrics.rmse)));
    line_box(&kv("Valid MAE", &format!("{:.4}", summary.metrics.mae)));
    line_box(&kv("Valid R²", &format!("{:.4}", summary.metrics.r2)));
    line_box(&kv("Epochs", &summary.epochs_run.to_string()));
    line_box_bottom();

    println!();
    for path in &summary.artifacts {
        step_ok(&format!("{}", path.display()));
    }
    println!();
}

pub fn cmd_export_onnx(model: &Path, output: &Path, opset: i64) -> anyhow::Result<()> {
    section("Export ONNX");

    step_run(&format!("Exporting {} → {}", model.display(), output.display()));
    let start = Instant::now();
    export_model_onnx(model, output, ONNXConfig::default().with_opset(opset))?;
    step_done(&format!("opset {} in {:?}", opset, start.elapsed()));

    println!();
    Ok(())
}

pub fn cmd_export_params(scaler: &Path, output: &Path) -> anyhow::Result<()> {
    section("Export scaler parameters");

    step_run(&format!("Exporting {} → {}", scaler.display(), output.display()));
    let params = export_scaler_params(scaler, output)?;
    step_done(&format!("{} features", params.n_features()));

    println!();
    Ok(())
}

pub fn cmd_predict(model: &Path, scaler_params: &Path, input: &str) -> anyhow::Result<()> {
    section("Predict");

    let values = parse_feature_list(input)?;

    step_run("Loading model");
    let predictor = Predictor::load(scaler_params, model)?;
    step_done(&format!("{} features", predictor.n_features()));

    let millions = predictor.predict(&values)?;
    println!();
    if let Some(names) = predictor.feature_names() {
        for (name, value) in names.iter().zip(&values) {
            println!("  {}", kv(name, &value.to_string()));
        }
        println!();
    }
    println!("  {:<18} {}", muted("Price (millions)"), format!("{:.4}", millions).white().bold());
    println!(
        "  {:<18} {}",
        muted("Price (PHP)"),
        format!("₱{}", format_thousands(millions * 1e6)).white().bold()
    );
    println!();

    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Dataset");

    let loader = DataLoader::new();
    let info = loader.get_file_info(data_path)?;
    println!("  {}", kv("Path", &info.path));
    println!("  {}", kv("Size", &format!("{:.1} KB", info.file_size as f64 / 1024.0)));

    let df = loader.load_auto(data_path)?;
    println!("  {}", kv("Shape", &format!("{} rows × {} cols", df.height(), df.width())));

    section("Columns");
    println!("  {:<28} {:<10} {}", muted("name"), muted("dtype"), muted("nulls"));
    for column in df.get_columns() {
        let nulls = column.null_count();
        let nulls_str = if nulls > 0 {
            nulls.to_string().yellow()
        } else {
            nulls.to_string().normal()
        };
        println!("  {:<28} {:<10} {}", column.name().as_str().white(), dim(&column.dtype().to_string()), nulls_str);
    }
    println!();

    Ok(())
}

pub fn cmd_preprocess(data: &Path, output: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    section("Preprocess");

    let config = load_config(config_path)?.with_data_path(data);
    let pipeline = TrainingPipeline::new(config)?;

    step_run("Loading data");
    let df = DataLoader::new().load_auto(data)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    step_run("Cleaning and encoding");
    let start = Instant::now();
    let mut prepared = pipeline.prepare(&df)?;
    step_done(&format!("{:?}", start.elapsed()));

    let report = &prepared.cleaning;
    println!("  {}", kv("Duplicates", &report.duplicates_removed.to_string()));
    println!("  {}", kv("Missing essential", &report.missing_essential_removed.to_string()));
    for bounds in &prepared.outlier_bounds {
        println!(
            "  {}",
            kv(
                &bounds.column,
                &format!("[{:.2}, {:.2}] {} removed", bounds.lower, bounds.upper, bounds.affected)
            )
        );
    }

    step_run(&format!("Saving → {}", output.display()));
    DataSaver::save_csv(&mut prepared.frame, output)?;
    step_done(&format!(
        "{} rows × {} cols",
        prepared.frame.height(),
        prepared.frame.width()
    ));

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ONNXExporter;
    use crate::optimizer::TrialParams;
    use crate::pipeline::TrainedModel;
    use crate::preprocessing::StandardScaler;
    use crate::training::{MLPConfig, MLPRegressor, ModelMetrics};
    use ndarray::Array2;
    use tempfile::tempdir;

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(1234567.891), "1,234,567.89");
        assert_eq!(format_thousands(999.0), "999.00");
        assert_eq!(format_thousands(-4500000.0), "-4,500,000.00");
    }

    #[test]
    fn test_strip_ansi() {
        let colored = "abc".green().to_string();
        assert_eq!(strip_ansi(&colored), "abc");
    }

    #[test]
    fn test_cli_parses_predict() {
        let cli = Cli::try_parse_from(["housing-mlp", "predict", "--input", "3,2,85"]).unwrap();
        match cli.command {
            Commands::Predict { model, scaler_params, input } => {
                assert_eq!(model, PathBuf::from("mlp_model.onnx"));
                assert_eq!(scaler_params, PathBuf::from("scaler_params.json"));
                assert_eq!(input, "3,2,85");
            }
            _ => panic!("expected predict"),
        }
    }

    fn write_listings(dir: &Path) -> PathBuf {
        let mut csv = String::from("Price (PHP),Bedrooms,Bath,Floor_area (sqm),Land_area (sqm),Type\n");
        for i in 0..30 {
            csv.push_str(&format!(
                "\"₱{},500,000\",{},{},{},{},{}\n",
                2 + i % 5,
                1 + i % 3,
                if i == 4 { "NA".to_string() } else { (1 + i % 2).to_string() },
                35 + i * 4,
                50 + i * 5,
                if i % 3 == 0 { "Condo" } else { "House" }
            ));
        }
        let path = dir.join("listings.csv");
        std::fs::write(&path, csv).unwrap();
        path
    }

    fn saved_model(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
        let x = Array2::from_shape_fn((24, 3), |(i, j)| (i * (j + 1)) as f64 / 6.0);
        let y = x.column(0).mapv(|v| 2.0 + 0.5 * v);
        let names: Vec<String> = vec!["Bedrooms".into(), "Bath".into(), "Floor_area (sqm)".into()];

        let mut scaler = StandardScaler::new().with_feature_names(names.clone());
        let x_scaled = scaler.fit_transform(&x).unwrap();
        let params_path = dir.join("scaler_params.json");
        scaler.params().unwrap().save(&params_path).unwrap();

        let mut network = MLPRegressor::new(MLPConfig::default().with_hidden_layers(vec![4]).with_max_epochs(5));
        let history = network.fit(&x_scaled, &y).unwrap();
        let model = TrainedModel::new(network, names, TrialParams::new(), ModelMetrics::default(), history).unwrap();

        let json_path = dir.join("mlp_model.json");
        model.save(&json_path).unwrap();
        let onnx_path = dir.join("mlp_model.onnx");
        ONNXExporter::new().export(&model, &onnx_path).unwrap();
        (params_path, json_path, onnx_path)
    }

    #[test]
    fn test_cmd_info_reads_dataset() {
        let dir = tempdir().unwrap();
        let data = write_listings(dir.path());
        assert!(cmd_info(&data).is_ok());
        assert!(cmd_info(&dir.path().join("absent.csv")).is_err());
    }

    #[test]
    fn test_cmd_preprocess_writes_encoded_csv() {
        let dir = tempdir().unwrap();
        let data = write_listings(dir.path());
        let output = dir.path().join("prepared.csv");

        cmd_preprocess(&data, &output, None).unwrap();

        let prepared = DataLoader::new().load_csv(&output).unwrap();
        let names: Vec<String> = prepared.get_column_names().iter().map(|c| c.to_string()).collect();
        assert!(names.contains(&"Price_millions".to_string()));
        assert!(names.contains(&"Type_Condo".to_string()));
        assert!(names.contains(&"Type_House".to_string()));
        assert!(!names.contains(&"Price (PHP)".to_string()));
        assert!(prepared.height() > 0 && prepared.height() < 30);
    }

    #[test]
    fn test_cmd_predict_with_json_and_onnx_models() {
        let dir = tempdir().unwrap();
        let (params, json_model, onnx_model) = saved_model(dir.path());

        cmd_predict(&json_model, &params, "2, 1, 3.5").unwrap();
        cmd_predict(&onnx_model, &params, "2,1,3.5").unwrap();

        assert!(cmd_predict(&onnx_model, &params, "2,1").is_err());
        assert!(cmd_predict(&onnx_model, &params, "2,one,3").is_err());
    }

    #[test]
    fn test_cli_parses_train_overrides() {
        let cli = Cli::try_parse_from(["housing-mlp", "train", "--trials", "5", "--export"]).unwrap();
        assert!(matches!(cli.command, Commands::Train { trials: Some(5), export: true, .. }));
    }
}

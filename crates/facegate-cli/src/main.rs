mod observations;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::blur::sharpness;
use facegate_core::{
    compare, parse_stored_embedding, Engine, FaceGate, FaceGateConfig, Image, ValidationResponse,
    VerificationResponse,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facegate", about = "Face enrollment and verification diagnostics")]
struct Cli {
    /// TOML configuration file (FACEGATE_* variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enrollment pipeline on an image
    Validate {
        #[arg(long)]
        image: PathBuf,
        /// JSON file of recorded detector/landmark outputs
        #[arg(long)]
        observations: PathBuf,
        /// Directory holding arcface.onnx and/or mask.onnx
        #[arg(long)]
        models: Option<PathBuf>,
    },
    /// Run the verification pipeline against a stored embedding
    Verify {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        observations: PathBuf,
        /// JSON file holding the stored embedding (array of 512 numbers)
        #[arg(long)]
        embedding: PathBuf,
        /// Skip the liveness gate
        #[arg(long)]
        no_liveness: bool,
        #[arg(long)]
        models: Option<PathBuf>,
    },
    /// Print the blur (sharpness) score of an image
    Sharpness { image: PathBuf },
    /// Compare two stored embeddings
    Compare {
        a: PathBuf,
        b: PathBuf,
        /// Similarity threshold (defaults to the configured value)
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = FaceGateConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Validate {
            image,
            observations,
            models,
        } => {
            let engine = engine(&config, &observations, models.as_deref())?;
            let result = engine.validate_profile(open_image(&image)?).await?;
            print_json(&ValidationResponse::from(&result))?;
        }
        Commands::Verify {
            image,
            observations,
            embedding,
            no_liveness,
            models,
        } => {
            let stored = std::fs::read_to_string(&embedding)
                .with_context(|| format!("reading embedding {}", embedding.display()))?;
            let engine = engine(&config, &observations, models.as_deref())?;
            let result = engine
                .verify_face(open_image(&image)?, Some(stored), !no_liveness)
                .await?;
            print_json(&VerificationResponse::from(&result))?;
        }
        Commands::Sharpness { image } => {
            let score = sharpness(&open_image(&image)?);
            println!("sharpness: {score:.2}");
            println!(
                "  profile threshold:      {:.1} ({})",
                config.validation.blur_threshold,
                verdict(score >= config.validation.blur_threshold)
            );
            println!(
                "  verification threshold: {:.1} ({})",
                config.verification.blur_threshold,
                verdict(score >= config.verification.blur_threshold)
            );
        }
        Commands::Compare { a, b, threshold } => {
            let a = read_embedding(&a)?;
            let b = read_embedding(&b)?;
            let threshold = threshold.unwrap_or(config.verification.similarity_threshold);
            print_json(&compare(&a.values, &b.values, threshold))?;
        }
        Commands::Config => print_json(&config)?,
    }

    Ok(())
}

fn engine(config: &FaceGateConfig, recording: &Path, models: Option<&Path>) -> Result<Engine> {
    let recorded = observations::Observations::load(recording)?;
    let collaborators = observations::collaborators(recorded, models)?;
    Ok(Engine::new(
        FaceGate::new(collaborators, config),
        &config.engine,
    ))
}

fn open_image(path: &Path) -> Result<Image> {
    Image::open(path).with_context(|| format!("opening image {}", path.display()))
}

fn read_embedding(path: &Path) -> Result<facegate_core::Embedding> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading embedding {}", path.display()))?;
    parse_stored_embedding(Some(&raw)).with_context(|| path.display().to_string())
}

fn verdict(pass: bool) -> &'static str {
    if pass {
        "pass"
    } else {
        "fail"
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

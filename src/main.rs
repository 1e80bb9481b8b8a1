use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use image::ImageReader;

use currency_detector::logging::setup_logging;
use currency_detector::response::DetectionResponse;
use currency_detector::{DetectionError, DetectorConfig, Pipeline, PipelineOutput, ReplayScorer};

#[derive(Parser)]
#[command(name = "currency-detector")]
#[command(about = "Detect coins and banknotes in photographs and extract each item")]
struct Cli {
    /// Paths to input image files
    #[arg(value_name = "IMAGE", required = true)]
    images: Vec<PathBuf>,

    /// Recorded model outputs (defaults to <IMAGE>.detections.json next to each image)
    #[arg(long, value_name = "FILE")]
    detections: Option<PathBuf>,

    /// Detector configuration in TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write extracted items as PNG files to this directory
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Only detect, do not extract item images
    #[arg(long)]
    no_extract: bool,

    /// Print the API response as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Per-image time limit in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 30_000)]
    timeout_ms: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Everything needed to process one image on a blocking thread
struct Job {
    image_path: PathBuf,
    detections_path: PathBuf,
    config: DetectorConfig,
    extract: bool,
    debug_dir: Option<PathBuf>,
}

fn run_job(job: &Job) -> anyhow::Result<PipelineOutput> {
    let img = ImageReader::open(&job.image_path)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;

    tracing::debug!(
        path = %job.image_path.display(),
        width = img.width(),
        height = img.height(),
        "Image loaded"
    );

    let scorer = ReplayScorer::from_file(&job.detections_path)?;
    let mut pipeline = Pipeline::new(Arc::new(scorer), job.config.clone()).with_extraction(job.extract);
    if let Some(dir) = &job.debug_dir {
        pipeline = pipeline.with_debug(dir.clone())?;
    }

    Ok(pipeline.run(&img)?)
}

async fn process(job: Job, timeout: Duration) -> anyhow::Result<PipelineOutput> {
    let handle = tokio::task::spawn_blocking(move || run_job(&job));
    match tokio::time::timeout(timeout, handle).await {
        Ok(joined) => joined.context("Detection task panicked")?,
        Err(_) => Err(DetectionError::ScoringTimeout {
            elapsed_ms: timeout.as_millis() as u64,
        }
        .into()),
    }
}

fn item_filename(image_path: &Path, index: usize, label: &str) -> String {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let label: String = label
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{:02}_{}.png", stem, index + 1, label)
}

fn write_items(out_dir: &Path, image_path: &Path, output: &PipelineOutput) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    for (i, item) in output.items.iter().enumerate() {
        let path = out_dir.join(item_filename(image_path, i, &item.detection.label));
        item.image
            .save(&path)
            .map_err(|e| anyhow::anyhow!("Failed to save {}: {}", path.display(), e))?;
    }
    Ok(())
}

fn print_summary(image_path: &Path, output: &PipelineOutput) {
    let set = &output.detections;
    println!("\n=== {} ===", image_path.display());
    println!("Type: {}", set.currency_type());
    println!("Total detections: {}", set.len());

    if set.is_empty() {
        println!("No currency detected.");
    }
    for (i, det) in set.detections().iter().enumerate() {
        let [x1, y1, x2, y2] = det.bbox.to_array();
        println!(
            "  {}. {} - confidence: {:.2} at [{:.0}, {:.0}, {:.0}, {:.0}]",
            i + 1,
            det.label,
            det.confidence,
            x1,
            y1,
            x2,
            y2
        );
    }
    for failure in &output.failed_passes {
        println!("  (skipped {})", failure);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    setup_logging(args.verbose);

    let config = match &args.config {
        Some(path) => DetectorConfig::from_toml_file(path)?,
        None => DetectorConfig::default(),
    };
    let timeout = Duration::from_millis(args.timeout_ms);

    // Each image is an independent request sharing nothing but the config
    let mut handles = Vec::with_capacity(args.images.len());
    for image_path in &args.images {
        let detections_path = args
            .detections
            .clone()
            .unwrap_or_else(|| image_path.with_extension("detections.json"));
        let debug_dir = args.debug_out.as_ref().map(|dir| {
            if args.images.len() > 1 {
                dir.join(image_path.file_stem().unwrap_or_default())
            } else {
                dir.clone()
            }
        });

        let job = Job {
            image_path: image_path.clone(),
            detections_path,
            config: config.clone(),
            extract: !args.no_extract,
            debug_dir,
        };
        handles.push((image_path.clone(), tokio::spawn(process(job, timeout))));
    }

    let mut failed = 0;
    for (image_path, handle) in handles {
        let result = handle.await.context("Detection task panicked")?;

        match result {
            Ok(output) => {
                if let Some(out_dir) = &args.out {
                    write_items(out_dir, &image_path, &output)?;
                }
                if args.json {
                    println!("{}", DetectionResponse::from_output(&output, !args.no_extract)?.to_json()?);
                } else {
                    print_summary(&image_path, &output);
                }
            }
            Err(err) => {
                failed += 1;
                tracing::error!(path = %image_path.display(), "{:#}", err);
                if args.json {
                    let response = match err.downcast_ref::<DetectionError>() {
                        Some(detection_error) => DetectionResponse::from_error(detection_error),
                        None => DetectionResponse::failure(format!("{:#}", err)),
                    };
                    println!("{}", response.to_json()?);
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} images failed", failed, args.images.len());
    }
    Ok(())
}

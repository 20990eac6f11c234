use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use vipchakra_core::{annotate, gallery, SimilarityOutcome};
use vipchakrad::routes::TextResponse;
use vipchakrad::{state, Config};

#[derive(Parser)]
#[command(name = "vipchakra", about = "VipChakra ML service CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed text and check it for reuse against earlier embeddings
    Text {
        /// Text to analyze
        text: String,
        /// JSON file holding an array of earlier embeddings
        #[arg(short, long)]
        against: Option<PathBuf>,
    },
    /// Hash an image, detect faces and match them against the VIP gallery
    Image {
        /// Image file to analyze
        path: PathBuf,
        /// Write the full annotated JPEG here
        #[arg(short, long)]
        annotated: Option<PathBuf>,
    },
    /// List gallery identities and their reference images
    Gallery,
    /// Show configuration and which models load
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Text { text, against } => run_text(&config, &text, against.as_deref()),
        Commands::Image { path, annotated } => run_image(&config, &path, annotated.as_deref()),
        Commands::Gallery => run_gallery(&config),
        Commands::Status => run_status(&config),
    }
}

fn run_text(config: &Config, text: &str, against: Option<&Path>) -> Result<()> {
    let history: Vec<Vec<f32>> = match against {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of embeddings", path.display()))?
        }
        None => Vec::new(),
    };

    let detector = state::load_reuse_detector(config);
    let result = detector.check(text, &history)?;

    match &result.similarity {
        SimilarityOutcome::Compared { max_similarity } => {
            eprintln!("max similarity {max_similarity:.4} against {} embeddings", history.len())
        }
        SimilarityOutcome::Skipped => eprintln!("no history to compare against"),
        SimilarityOutcome::Failed { reason } => eprintln!("comparison skipped: {reason}"),
    }

    let response = TextResponse {
        is_reused_content: result.is_reused,
        new_embedding: result.embedding.values,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_image(config: &Config, path: &Path, annotated_out: Option<&Path>) -> Result<()> {
    let frame = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgb8();

    let (analyzer, _) = state::load_image_analyzer(config);
    let (result, annotated) = analyzer.analyze_frame(&frame)?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(out) = annotated_out {
        let jpeg = annotate::encode_jpeg(&annotated)?;
        std::fs::write(out, jpeg).with_context(|| format!("failed to write {}", out.display()))?;
        eprintln!("annotated image written to {}", out.display());
    }
    Ok(())
}

fn run_gallery(config: &Config) -> Result<()> {
    let references = gallery::discover(&config.gallery_dir)?;
    if references.is_empty() {
        bail!("no reference images under {}", config.gallery_dir.display());
    }

    let mut identities: BTreeMap<&str, Vec<&Path>> = BTreeMap::new();
    for reference in &references {
        identities.entry(&reference.identity).or_default().push(&reference.path);
    }

    println!("{} identities, {} reference images", identities.len(), references.len());
    for (name, paths) in identities {
        println!("  {name} ({})", paths.len());
        for path in paths {
            println!("    {}", path.display());
        }
    }
    Ok(())
}

fn run_status(config: &Config) -> Result<()> {
    println!("model dir:   {}", config.model_dir.display());
    println!("gallery dir: {}", config.gallery_dir.display());
    println!("bind addr:   {}", config.bind_addr);

    let state = vipchakrad::AppState::load(config.clone());
    match state.reuse.embedder().get() {
        Some(embedder) => println!("embedder:    ready ({} dims)", embedder.dimension()),
        None => println!("embedder:    {}", state.reuse.embedder().status()),
    }
    println!("detector:    {}", state.analyzer.detector().status());
    println!("recognizer:  {}", state.analyzer.matcher().status());
    println!(
        "gallery:     {} identities, {} entries",
        state.gallery.len(),
        state.gallery.values().sum::<usize>()
    );
    Ok(())
}

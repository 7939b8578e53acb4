//! clens-rs CLI: circuit analysis against a served explainer backend

use anyhow::Result;
use clap::Parser;
use clens_rs::types::{AblateHeadRequest, AblationResult, CompositionRequest};
use clens_rs::{
    synthetic_affinity, AnalysisConfig, AnalysisRunner, BackendClient, HighlightMode, ModelKey,
    DEFAULT_BACKEND_URL,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "clens-rs")]
#[command(about = "Attention-circuit analysis for induction-head explainers")]
#[command(version)]
struct Cli {
    /// Backend base URL
    #[arg(short, long, default_value = DEFAULT_BACKEND_URL)]
    backend: String,

    /// Input text to analyze
    #[arg(short, long, default_value = "My name is Regan. My name is")]
    text: String,

    /// Model to inspect
    #[arg(short, long, value_enum, default_value_t = ModelKey::T2)]
    model: ModelKey,

    /// Layer of the inspected head
    #[arg(short, long, default_value_t = 1)]
    layer: usize,

    /// Head index
    #[arg(long, default_value_t = 0)]
    head: usize,

    /// Highlight mode for the intensity column
    #[arg(long, value_enum, default_value_t = HighlightMode::Attention)]
    mode: HighlightMode,

    /// Query position to ablate (requires --ablate)
    #[arg(short, long)]
    position: Option<usize>,

    /// Run a head ablation at --position
    #[arg(long)]
    ablate: bool,

    /// Fetch and print Q/K/V composition scores
    #[arg(long)]
    composition: bool,

    /// Top-k size for prediction tables
    #[arg(short, long, default_value_t = 10)]
    k: usize,

    /// Run on synthetic data without a backend
    #[arg(long)]
    offline: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("=== clens-rs: Circuit Lens ===");
    println!("Model:  {} L{}H{}", cli.model, cli.layer, cli.head);
    println!("Text:   {:?}", cli.text);
    if cli.offline {
        println!("Mode:   offline (synthetic data)");
        return run_offline(&cli);
    }
    println!("Backend: {}", cli.backend);

    let config = AnalysisConfig {
        backend_url: cli.backend.clone(),
        model: cli.model,
        layer: cli.layer,
        head: cli.head,
        compute_ov: true,
    };
    let runner = AnalysisRunner::new(config)?;
    let report = runner.run(&cli.text)?;

    print_affinity(report.affinity.as_array(), &token_texts(&report));
    report.print_summary();

    if cli.composition {
        print_composition(runner.client(), cli.model)?;
    }
    if cli.ablate {
        let Some(position) = cli.position else {
            anyhow::bail!("--ablate requires --position");
        };
        run_ablation(runner.client(), &cli, position)?;
    }

    Ok(())
}

fn token_texts(report: &clens_rs::AnalysisReport) -> Vec<String> {
    report.tokens.iter().map(|t| t.text.clone()).collect()
}

fn run_offline(cli: &Cli) -> Result<()> {
    let n_tokens = 8;
    let affinity = synthetic_affinity(n_tokens, 42);
    let labels: Vec<String> = (0..n_tokens).map(|i| format!("t{i}")).collect();
    print_affinity(affinity.as_array(), &labels);

    println!("\n=== Strongest source per position ===");
    for position in 1..n_tokens {
        if let Some((attended, weight)) = affinity.argmax_attended(position) {
            println!("  pos {position} -> pos {attended} ({weight:.3})");
        }
    }
    info!("offline run complete; mode {:?} ignored without data", cli.mode);
    Ok(())
}

fn print_affinity(matrix: &ndarray::Array2<f32>, labels: &[String]) {
    println!("\n=== Affinity matrix (rows attend to columns, %) ===");
    for (row, label) in labels.iter().enumerate() {
        let cells: Vec<String> = (0..labels.len())
            .map(|col| {
                let value = matrix.get([row, col]).copied().unwrap_or(0.0);
                if col > row {
                    "  . ".to_string()
                } else {
                    format!("{:4.0}", value * 100.0)
                }
            })
            .collect();
        println!("  {:>10} |{}", truncate(label), cells.join(" "));
    }
}

fn truncate(label: &str) -> String {
    let clean = label.replace('\n', "\\n");
    if clean.chars().count() > 10 {
        clean.chars().take(9).collect::<String>() + "…"
    } else {
        clean
    }
}

fn print_composition(client: &BackendClient, model: ModelKey) -> Result<()> {
    info!("fetching composition scores");
    let scores = client.composition_scores(&CompositionRequest {
        model_name: model.as_str().to_string(),
    })?;
    for (title, matrix) in [
        ("K-composition", &scores.k_composition),
        ("Q-composition", &scores.q_composition),
        ("V-composition", &scores.v_composition),
    ] {
        println!("\n=== {title} (L1 head x L0 head) ===");
        for (l1_head, row) in matrix.iter().enumerate() {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:6.3}")).collect();
            println!("  L1H{l1_head} |{}", cells.join(" "));
        }
    }
    Ok(())
}

fn run_ablation(client: &BackendClient, cli: &Cli, position: usize) -> Result<()> {
    info!(position, "requesting head ablation");
    let result = client.ablate_head(&AblateHeadRequest {
        text: cli.text.clone(),
        position,
        model_name: cli.model.as_str().to_string(),
        layer: cli.layer,
        head: cli.head,
        k: cli.k,
    })?;
    print_ablation(&result);
    Ok(())
}

fn print_ablation(result: &AblationResult) {
    let panels = [
        ("With head", &result.with_head, false),
        ("Without head", &result.without_head, false),
        ("Most helped (+d)", &result.delta_positive, true),
        ("Most hurt (-d)", &result.delta_negative, true),
    ];
    for (title, items, is_delta) in panels {
        println!("\n=== {title} ===");
        for (rank, item) in items.iter().enumerate() {
            let value = if is_delta {
                format!("d{:+.2}", item.logit)
            } else {
                format!("p={:.4}", item.prob)
            };
            println!(
                "  {}. {:>12} {}",
                rank + 1,
                format!("\"{}\"", item.token.replace('\n', "\\n")),
                value
            );
        }
    }
}

//! Skin Flow CLI
//!
//! Runs the onboarding server, or pushes a single photo through the
//! classification API from the terminal.

use anyhow::{bail, Context};
use colored::Colorize;
use skin_flow::{
    Category, CategoryPrediction, ClassificationGateway, Config, ImageFile, ImageSubmission,
    ResultsView, Session,
};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    // Check for global flags
    let quiet = args.iter().any(|a| a == "--quiet" || a == "-q");

    // Remove only global flags (-q, --quiet), keep command-specific flags
    let args: Vec<String> = args
        .into_iter()
        .filter(|a| a != "-q" && a != "--quiet")
        .collect();

    init_logging(quiet);

    match args.get(1).map(|s| s.as_str()) {
        Some("serve") | Some("server") => cmd_serve(&args[2..])?,

        Some("classify") | Some("c") => cmd_classify(&args[2..])?,

        Some("check-place") | Some("place") => cmd_check_place(&args[2..])?,

        Some("version") | Some("-v") | Some("--version") => {
            println!("skin-flow v{}", VERSION);
        }

        Some("help") | Some("-h") | Some("--help") => {
            print_usage();
        }

        Some(cmd) => {
            eprintln!("{} Unknown command: {}", "error:".red().bold(), cmd);
            eprintln!("Run 'skin-flow help' for usage");
            std::process::exit(1);
        }

        None => {
            print_usage();
        }
    }

    Ok(())
}

fn init_logging(quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("skin_flow=info,tower_http=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!(
        r#"
Skin Flow v{} - Skincare analysis onboarding

USAGE:
    skin-flow <command> [options]

COMMANDS:
    serve, server        Run the onboarding web server
    classify, c <image>  Classify one photo and print the demographics
    check-place <types>  Check a comma separated place type list
    version              Show version
    help                 Show this help

OPTIONS:
    -q, --quiet          Only log warnings
    --host HOST          Bind address for serve (default: 127.0.0.1)
    --port PORT          Port for serve (default: 3030)
    --json               Print the raw classification as JSON

ENVIRONMENT:
    PLACES_API_KEY                   Key for the location lookup widget
    SKIN_FLOW_HOST, SKIN_FLOW_PORT   Bind address
    SKIN_FLOW_IDENTITY_URL           Upstream identity endpoint
    SKIN_FLOW_CLASSIFY_URL           Upstream classification endpoint
    SKIN_FLOW_MIN_LOADING_MS         Minimum loading time (default: 5000)
    SKIN_FLOW_UPSTREAM_TIMEOUT_SECS  Upstream timeout (default: 30)
    SKIN_FLOW_MAX_SESSIONS           Live browser sessions kept (default: 10000)
    SKIN_FLOW_PLACE_DENYLIST         Place types refused as home address

EXAMPLES:
    skin-flow serve --port 8080
    skin-flow classify ~/selfie.jpg
    skin-flow check-place street_address,premise
"#,
        VERSION
    );
}

/// Start HTTP server
fn cmd_serve(args: &[String]) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                if i + 1 < args.len() {
                    config.host = args[i + 1].clone();
                    i += 2;
                    continue;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.port = args[i + 1]
                        .parse()
                        .with_context(|| format!("invalid port: {}", args[i + 1]))?;
                    i += 2;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { skin_flow::server::start_server(config).await })
        .map_err(|e| anyhow::anyhow!(e.to_string()))
}

/// Push one photo through the submission sequence
fn cmd_classify(args: &[String]) -> anyhow::Result<()> {
    let as_json = args.iter().any(|a| a == "--json");
    let Some(path) = args.iter().find(|a| !a.starts_with("--")) else {
        bail!("Usage: skin-flow classify <image> [--json]");
    };

    let path = Path::new(path);
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut file = ImageFile::new(ImageFile::mime_for_path(path), bytes);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        file = file.with_name(name);
    }

    let config = Config::from_env()?;
    let gateway: Arc<dyn ClassificationGateway> = Arc::new(config.gateway());
    let submission = ImageSubmission::new(gateway).with_min_duration(Duration::ZERO);
    let session = Session::in_memory();

    let rt = tokio::runtime::Runtime::new()?;
    let completion = rt.block_on(submission.submit(&session, file, &CancellationToken::new()))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&completion.result)?);
        return Ok(());
    }

    let view = ResultsView::from_result(completion.result.clone());
    println!();
    println!("{}", "A. I. ANALYSIS - DEMOGRAPHICS".bold());
    for category in Category::ALL {
        let placeholder = completion.result.get(category).is_none();
        print_category(category, view.prediction(category), placeholder);
    }
    println!();
    println!("{}", format!("Analyzed in {:.1}s", completion.elapsed.as_secs_f64()).dimmed());

    Ok(())
}

fn print_category(category: Category, prediction: &CategoryPrediction, placeholder: bool) {
    println!();
    let title = format!("{} - {}", category.as_str().to_uppercase(), prediction.predicted);
    if placeholder {
        println!("{} {}", title.bold(), "(not returned, placeholder)".yellow());
    } else {
        println!("{}", title.bold());
    }

    for c in &prediction.confidences {
        let line = format!("  {:<20} {:>6.2}%  {}", c.label, c.value, bar(c.value));
        if c.label == prediction.predicted {
            println!("{}", line.cyan());
        } else {
            println!("{}", line);
        }
    }
}

fn bar(percent: f64) -> String {
    let filled = ((percent / 10.0).round() as usize).min(10);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(10 - filled))
}

/// Check place types against the configured denylist
fn cmd_check_place(args: &[String]) -> anyhow::Result<()> {
    let Some(list) = args.first() else {
        bail!("Usage: skin-flow check-place <type,type,...>");
    };

    let config = Config::from_env()?;
    let candidate = skin_flow::LocationCandidate::from_form("", list);
    if config.place_filter.is_disallowed(&candidate.place_types) {
        let hits: Vec<&String> = candidate
            .place_types
            .iter()
            .filter(|t| config.place_filter.denylist().contains(*t))
            .collect();
        println!("{} non-residential ({:?})", "rejected".red().bold(), hits);
    } else {
        println!("{} residential", "allowed".green().bold());
    }
    Ok(())
}

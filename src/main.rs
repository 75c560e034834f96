use std::path::PathBuf;
use std::time::Duration;

use agent_core::{resolve_settings, AgentRuntime, AgentSettings};
use anyhow::{bail, Context, Result};
use clap::Parser;
use page_tools::{PageExecutor, PageSnapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run one agent request against a page snapshot.
#[derive(Debug, Parser)]
#[command(name = "page-agent")]
#[command(about = "Ask the page agent a question about a web page")]
struct Args {
    /// The request to answer.
    prompt: String,

    /// Page URL. Fetched unless --html is given.
    #[arg(long)]
    url: Option<String>,

    /// Read the page markup from a local file instead of fetching it.
    #[arg(long)]
    html: Option<PathBuf>,

    /// Override the iteration cap.
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Print the run report as JSON instead of the transcript.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ai_agent=debug,agent_core=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut settings = resolve_settings(&AgentSettings::default());
    if let Some(max_iterations) = args.max_iterations {
        settings.max_iterations = max_iterations;
    }

    let page = load_page(args.url.as_deref(), args.html.as_ref()).await?;
    info!(url = %page.url, loaded = page.html.is_some(), "page ready");

    let (runtime, endpoint) = AgentRuntime::from_settings(&settings)?.build()?;
    let current_url = page.url.clone();
    let server = tokio::spawn(PageExecutor::new(page).serve(endpoint));

    let report = runtime.run_report(&args.prompt, &current_url).await;
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("serializing run report")?;
        println!("{json}");
    } else {
        println!("{}", report.render());
    }

    drop(runtime);
    let executor = server.await.context("page executor task failed")?;
    for click in executor.clicks() {
        info!(selector = %click.selector, element = %click.element, "recorded click");
    }
    Ok(())
}

async fn load_page(url: Option<&str>, html: Option<&PathBuf>) -> Result<PageSnapshot> {
    match (url, html) {
        (url, Some(path)) => {
            let markup = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let url = url
                .map(str::to_string)
                .unwrap_or_else(|| format!("file://{}", path.display()));
            Ok(PageSnapshot::loaded(url, markup))
        }
        (Some(url), None) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()?;
            let response = client
                .get(url)
                .send()
                .await
                .with_context(|| format!("fetching {url}"))?
                .error_for_status()
                .with_context(|| format!("fetching {url}"))?;
            let markup = response.text().await.context("reading page body")?;
            Ok(PageSnapshot::loaded(url, markup))
        }
        (None, None) => bail!("pass --url or --html so the agent has a page to work on"),
    }
}

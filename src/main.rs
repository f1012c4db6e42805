mod agent;
mod chartdata;
mod config;
mod engine;
mod error;
mod extraction;
mod fallback;
mod history;
mod llm;
mod nodes;
mod persist;
mod progress;
mod rag;
mod render;
mod search;
mod state;
#[cfg(test)]
mod testutil;
mod validate;

use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::agent::ResearchAgent;
use crate::config::Config;
use crate::error::EngineError;
use crate::extraction::{ExtractionLoop, ExtractionParams};
use crate::llm::DeepSeekClient;
use crate::rag::{EmbeddingReranker, RagSearchProvider};
use crate::search::{SearchProvider, TavilyClient};

const DEFAULT_TOPIC: &str = "中国应急管理产业发展趋势";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("history") {
        return print_history();
    }

    let topic = if args.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        args.join(" ")
    };

    let config = Config::load();

    let generator = DeepSeekClient::from_config(&config.llm)?;
    let tavily = TavilyClient::from_config(&config.search)?;
    let search: Box<dyn SearchProvider> = if config.rag.enabled {
        eprintln!("[main] RAG reranking enabled (top {})", config.rag.top_k);
        Box::new(RagSearchProvider::new(
            tavily,
            EmbeddingReranker::from_config(&config.rag),
        ))
    } else {
        Box::new(tavily)
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n[main] cancelling run...");
                cancel.cancel();
            }
        });
    }

    eprintln!("[main] research topic: {}", topic);

    // Phase 1: chart data, three shapes refined against the topic.
    let extraction = ExtractionLoop::new(
        &generator,
        search.as_ref(),
        ExtractionParams::from_config(&config),
        cancel.clone(),
    );
    let charts = match extraction.run(&topic).await {
        Ok(slots) => slots,
        Err(e) => return on_run_error(e),
    };
    for slot in &charts {
        eprintln!(
            "[main] {}: {} after {} attempt(s){}",
            slot.shape.label(),
            if slot.valid { "data ready" } else { "no data" },
            slot.attempts,
            if slot.degraded { " (fallback)" } else { "" },
        );
    }

    // Phase 2: the report itself.
    let mut agent = ResearchAgent::new(&generator, search.as_ref(), &config, cancel.clone());
    let report = match agent.run(&topic).await {
        Ok(report) => report,
        Err(e) => return on_run_error(e),
    };

    let summary = agent.progress();
    eprintln!(
        "[main] {}/{} sections complete ({:.1}%)",
        summary.completed_sections, summary.total_sections, summary.percent_complete
    );

    // Phase 3: files. Chart data reaches the renderer as a value, straight
    // from phase 1.
    let state = &agent.state;
    let output_dir = Path::new(&config.output.output_dir);
    let timestamp = state.created_at;

    let md_path = render::save_markdown_report(&report, &state.query, timestamp, output_dir)?;
    eprintln!("[main] markdown report: {}", md_path.display());

    let html = render::render_html(&state.report_title, &report, &charts);
    let html_path = render::save_html_report(&html, &state.query, timestamp, output_dir)?;
    eprintln!("[main] html report: {}", html_path.display());

    if config.output.save_intermediate_states {
        let state_path = output_dir.join(format!(
            "state_{}_{}.json",
            render::sanitize_for_filename(&state.query),
            timestamp
        ));
        persist::save_state(state, &state_path)?;
        eprintln!("[main] state snapshot: {}", state_path.display());
    }

    if config.output.record_history {
        if let Err(e) = history::add_run(&topic, &report) {
            eprintln!("[main] could not record run history: {}", e);
        }
    }

    println!("{}", report);
    Ok(())
}

fn on_run_error(e: EngineError) -> Result<()> {
    match e {
        EngineError::Cancelled => {
            eprintln!("[main] run cancelled");
            Ok(())
        }
        other => {
            eprintln!("[main] run failed: {}", other);
            let trail = progress::recent(15);
            if !trail.is_empty() {
                eprintln!("[main] last progress entries:");
                for entry in trail {
                    eprintln!("  {}", entry.text);
                }
            }
            Err(other.into())
        }
    }
}

fn print_history() -> Result<()> {
    let entries = history::list_runs(20)?;
    if entries.is_empty() {
        println!("No recorded runs.");
        return Ok(());
    }
    for entry in entries {
        let first_line = entry.report.lines().next().unwrap_or("");
        println!("[{}] {}: {}", entry.id, entry.topic, first_line);
    }
    Ok(())
}

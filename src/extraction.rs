//! Validity-driven refinement loop for chart-ready data.
//!
//! Same skeleton as the section loop (search, generate, check, repeat) but
//! bounded by a validity predicate instead of a round count: a slot finishes
//! as soon as its text validates, retries with alternate queries while the
//! attempt budget lasts, and degrades to canned data when it runs out.
//! Exhaustion is a designated terminal state, not an error.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::guard;
use crate::error::EngineError;
use crate::fallback;
use crate::llm::{self, TextGenerator};
use crate::nodes;
use crate::progress::{self, Kind};
use crate::search::{SearchProvider, SearchResult};
use crate::validate::{is_valid_chart_data, ChartShape};

// Queries that broaden the search when the topic itself yields no usable
// data. Applied verbatim; query quality beyond this is the provider's
// problem.
fn alternate_queries(topic: &str) -> Vec<String> {
    vec![
        format!("{} market size data", topic),
        format!("{} industry report", topic),
        format!("{} growth trend statistics", topic),
    ]
}

const DATA_KEYWORDS: [&str; 16] = [
    "数据",
    "统计",
    "报告",
    "图表",
    "分析",
    "趋势",
    "规模",
    "增长率",
    "data",
    "statistics",
    "report",
    "chart",
    "analysis",
    "trend",
    "market size",
    "growth rate",
];

/// Nudges a query toward quantified sources unless it already asks for them.
fn enhance_search_query(query: &str) -> String {
    let lower = query.to_lowercase();
    if DATA_KEYWORDS.iter().any(|k| lower.contains(k)) {
        query.to_string()
    } else {
        format!("{} statistics data report", query)
    }
}

/// Extraction state for one chart shape. Terminal when `valid` is true;
/// `degraded` marks synthetic text (canned fallback or sample data) so
/// downstream consumers can flag it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSlot {
    pub shape: ChartShape,
    pub best_text: Option<String>,
    pub valid: bool,
    pub attempts: u32,
    pub degraded: bool,
}

impl ExtractionSlot {
    fn new(shape: ChartShape) -> Self {
        ExtractionSlot {
            shape,
            best_text: None,
            valid: false,
            attempts: 0,
            degraded: false,
        }
    }

    pub fn text(&self) -> &str {
        self.best_text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionParams {
    pub max_attempts: u32,
    pub max_results_per_query: usize,
    pub search_timeout: Duration,
    pub max_content_length: usize,
    pub generation_retries: u32,
    pub retry_delay: Duration,
    pub query_delay: Duration,
}

impl ExtractionParams {
    pub fn from_config(config: &Config) -> Self {
        ExtractionParams {
            max_attempts: config.extraction.max_attempts,
            max_results_per_query: config.extraction.max_results_per_query,
            search_timeout: Duration::from_secs(config.search.timeout_secs),
            max_content_length: config.research.max_content_length,
            generation_retries: config.extraction.generation_retries,
            retry_delay: Duration::from_secs(config.extraction.retry_delay_secs),
            query_delay: Duration::from_millis(config.extraction.query_delay_ms),
        }
    }
}

pub struct ExtractionLoop<'a> {
    generator: &'a dyn TextGenerator,
    search: &'a dyn SearchProvider,
    params: ExtractionParams,
    cancel: CancellationToken,
}

impl<'a> ExtractionLoop<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        search: &'a dyn SearchProvider,
        params: ExtractionParams,
        cancel: CancellationToken,
    ) -> Self {
        ExtractionLoop {
            generator,
            search,
            params,
            cancel,
        }
    }

    /// Extracts chart data for every shape. The three slots share the
    /// initial query set but are otherwise independent, so they run
    /// concurrently and are joined before returning, in shape order.
    pub async fn run(&self, topic: &str) -> Result<Vec<ExtractionSlot>, EngineError> {
        progress::log_with(Kind::Extraction, format!("extracting chart data for \"{}\"", topic));
        let queries = self.initial_queries(topic).await?;
        eprintln!("[extraction] initial queries: {:?}", queries);

        let (categorical, time_series, part_of_whole) = tokio::join!(
            self.run_slot(topic, ChartShape::Categorical, queries.clone()),
            self.run_slot(topic, ChartShape::TimeSeries, queries.clone()),
            self.run_slot(topic, ChartShape::PartOfWhole, queries),
        );

        Ok(vec![categorical?, time_series?, part_of_whole?])
    }

    /// LLM-proposed search queries for the topic, enhanced with data
    /// keywords. A failed proposal degrades to searching the topic itself.
    async fn initial_queries(&self, topic: &str) -> Result<Vec<String>, EngineError> {
        let prompt = nodes::chart_query_prompt(topic);
        match guard(&self.cancel, self.generator.generate(&prompt)).await? {
            Ok(text) => {
                let queries = nodes::parse_query_lines(&text);
                if queries.is_empty() {
                    Ok(vec![enhance_search_query(topic)])
                } else {
                    Ok(queries.iter().map(|q| enhance_search_query(q)).collect())
                }
            }
            Err(e) => {
                eprintln!(
                    "[extraction] query proposal failed: {}; searching the topic directly",
                    e
                );
                Ok(vec![enhance_search_query(topic)])
            }
        }
    }

    async fn run_slot(
        &self,
        topic: &str,
        shape: ChartShape,
        mut queries: Vec<String>,
    ) -> Result<ExtractionSlot, EngineError> {
        let mut slot = ExtractionSlot::new(shape);

        while slot.attempts < self.params.max_attempts {
            slot.attempts += 1;
            progress::log_with(
                Kind::Extraction,
                format!(
                    "{}: attempt {}/{}",
                    shape.label(),
                    slot.attempts,
                    self.params.max_attempts
                ),
            );

            let results = self.gather(&queries).await?;
            let (candidate, synthetic) = if results.is_empty() {
                // no evidence at all: propose sample data instead of asking
                // the generator to extract from nothing
                (fallback::sample_data(shape, topic), true)
            } else {
                (self.extract(topic, shape, &results).await?, false)
            };

            if is_valid_chart_data(&candidate, shape) {
                if synthetic {
                    progress::log_with(
                        Kind::Fallback,
                        format!("{}: no search evidence, using sample data", shape.label()),
                    );
                }
                slot.best_text = Some(candidate);
                slot.valid = true;
                slot.degraded = synthetic;
                return Ok(slot);
            }

            if slot.attempts < self.params.max_attempts {
                progress::log_with(
                    Kind::Extraction,
                    format!("{}: data invalid, retrying with alternate queries", shape.label()),
                );
                queries = alternate_queries(topic);
                guard(&self.cancel, tokio::time::sleep(self.params.retry_delay)).await?;
            }
        }

        // Budget exhausted: degraded success with canned data, never an
        // error. Flagged so consumers know the numbers are synthetic.
        let canned = fallback::canned_for_topic(topic).for_shape(shape);
        progress::log_with(
            Kind::Fallback,
            format!("{}: attempt budget exhausted, using canned data", shape.label()),
        );
        slot.best_text = Some(canned.to_string());
        slot.valid = true;
        slot.degraded = true;
        Ok(slot)
    }

    /// Runs every query in sequence, pooling the results. A short pause
    /// between queries keeps the provider's rate limiter happy.
    async fn gather(&self, queries: &[String]) -> Result<Vec<SearchResult>, EngineError> {
        let mut pooled = Vec::new();
        for (i, query) in queries.iter().enumerate() {
            let results = guard(
                &self.cancel,
                self.search.search(
                    query,
                    self.params.max_results_per_query,
                    self.params.search_timeout,
                ),
            )
            .await?;
            pooled.extend(results);
            if i + 1 < queries.len() {
                guard(&self.cancel, tokio::time::sleep(self.params.query_delay)).await?;
            }
        }
        Ok(pooled)
    }

    /// One extraction call. Generation failure yields an empty candidate,
    /// which the attempt loop counts as invalid; the budget, not the error,
    /// decides what happens next.
    async fn extract(
        &self,
        topic: &str,
        shape: ChartShape,
        results: &[SearchResult],
    ) -> Result<String, EngineError> {
        let results_text =
            nodes::format_search_results_for_prompt(results, self.params.max_content_length);
        let prompt = nodes::extraction_prompt(shape, topic, &results_text);

        match guard(
            &self.cancel,
            llm::generate_with_retry(
                self.generator,
                &prompt,
                self.params.generation_retries,
                self.params.retry_delay,
            ),
        )
        .await?
        {
            Ok(text) => Ok(text),
            Err(e) => {
                eprintln!("[extraction] {} extraction failed: {}", shape.label(), e);
                Ok(String::new())
            }
        }
    }
}

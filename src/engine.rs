//! Count-driven refinement loop for report sections.
//!
//! A section goes `Init -> FirstPassDone -> Reflecting(k) -> Completed`: one
//! initial search-and-summarize pass, then exactly `max_reflections`
//! reflection rounds, then done. There is no validity gate; sections improve
//! by accreting search rounds, and the round count is fixed.

use anyhow::anyhow;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::EngineError;
use crate::llm::{self, TextGenerator};
use crate::nodes;
use crate::progress::{self, Kind};
use crate::search::SearchProvider;
use crate::state::Section;

/// Runs `fut` unless the token fires first. Every suspension point in the
/// loops goes through this so a cancelled run abandons in-flight provider
/// calls promptly.
pub(crate) async fn guard<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, EngineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        value = fut => Ok(value),
    }
}

#[derive(Debug, Clone)]
pub struct LoopParams {
    pub max_reflections: usize,
    pub max_search_results: usize,
    pub search_timeout: Duration,
    pub max_content_length: usize,
    pub generation_retries: u32,
    pub retry_delay: Duration,
}

impl LoopParams {
    pub fn from_config(config: &Config) -> Self {
        LoopParams {
            max_reflections: config.research.max_reflections,
            max_search_results: config.research.max_search_results,
            search_timeout: Duration::from_secs(config.search.timeout_secs),
            max_content_length: config.research.max_content_length,
            generation_retries: config.research.generation_retries,
            retry_delay: Duration::from_secs(config.research.retry_delay_secs),
        }
    }
}

pub struct SectionLoop<'a> {
    generator: &'a dyn TextGenerator,
    search: &'a dyn SearchProvider,
    params: LoopParams,
    cancel: CancellationToken,
}

impl<'a> SectionLoop<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        search: &'a dyn SearchProvider,
        params: LoopParams,
        cancel: CancellationToken,
    ) -> Self {
        SectionLoop {
            generator,
            search,
            params,
            cancel,
        }
    }

    /// Drives one section to completion. The first pass is required: if it
    /// cannot be generated within the retry budget the section is abandoned
    /// with an error. Reflection rounds degrade instead of failing.
    pub async fn run(&self, section: &mut Section) -> Result<(), EngineError> {
        self.first_pass(section).await?;

        for round in 0..self.params.max_reflections {
            progress::log_with(
                Kind::Reflection,
                format!(
                    "{}: reflection {}/{}",
                    section.title,
                    round + 1,
                    self.params.max_reflections
                ),
            );
            self.reflect(section, round).await?;
        }

        section.research.mark_completed();
        Ok(())
    }

    async fn first_pass(&self, section: &mut Section) -> Result<(), EngineError> {
        let proposal = self.first_query(section).await?;
        progress::log_with(
            Kind::Search,
            format!("{}: searching \"{}\"", section.title, proposal.search_query),
        );

        let results = guard(
            &self.cancel,
            self.search.search(
                &proposal.search_query,
                self.params.max_search_results,
                self.params.search_timeout,
            ),
        )
        .await?;
        if results.is_empty() {
            eprintln!(
                "[engine] no results for \"{}\", summarizing without evidence",
                proposal.search_query
            );
        }

        let formatted =
            nodes::format_search_results_for_prompt(&results, self.params.max_content_length);
        section.research.add_search_round(&proposal.search_query, results);

        let prompt = nodes::first_summary_prompt(
            &section.title,
            &section.guidance,
            &proposal.search_query,
            &formatted,
        );
        let summary = self.generate_required(&prompt).await?;
        section.research.latest_summary = summary;
        progress::log_with(Kind::Summary, format!("{}: initial draft written", section.title));
        Ok(())
    }

    /// One reflection round. Query-generation problems are tolerated by
    /// leaving the section untouched for the round; a failed revision keeps
    /// the previous draft while the round's search results stay recorded.
    async fn reflect(&self, section: &mut Section, round: usize) -> Result<(), EngineError> {
        let prompt = nodes::reflection_prompt(
            &section.title,
            &section.guidance,
            &section.research.latest_summary,
        );

        let output = match guard(&self.cancel, self.generator.generate(&prompt)).await? {
            Ok(text) => text,
            Err(e) => {
                eprintln!(
                    "[engine] reflection {} query generation failed: {}; keeping current draft",
                    round + 1,
                    e
                );
                return Ok(());
            }
        };

        let Some(proposal) = nodes::parse_query_proposal(&output) else {
            eprintln!(
                "[engine] reflection {} produced no usable query; keeping current draft",
                round + 1
            );
            return Ok(());
        };

        progress::log_with(
            Kind::Search,
            format!("{}: searching \"{}\"", section.title, proposal.search_query),
        );
        let results = guard(
            &self.cancel,
            self.search.search(
                &proposal.search_query,
                self.params.max_search_results,
                self.params.search_timeout,
            ),
        )
        .await?;

        let formatted =
            nodes::format_search_results_for_prompt(&results, self.params.max_content_length);
        section.research.add_search_round(&proposal.search_query, results);

        let summary_prompt = nodes::reflection_summary_prompt(
            &section.title,
            &section.guidance,
            &proposal.search_query,
            &formatted,
            &section.research.latest_summary,
        );
        match guard(&self.cancel, self.generator.generate(&summary_prompt)).await? {
            Ok(summary) if !summary.trim().is_empty() => {
                section.research.latest_summary = summary;
                progress::log_with(Kind::Summary, format!("{}: draft revised", section.title));
            }
            Ok(_) => eprintln!(
                "[engine] reflection {} returned an empty revision; keeping current draft",
                round + 1
            ),
            Err(e) => eprintln!(
                "[engine] reflection {} revision failed: {}; keeping current draft",
                round + 1,
                e
            ),
        }
        Ok(())
    }

    /// Generate-and-parse for the opening query, retried as one unit: an
    /// unparseable proposal is as useless as a failed call.
    async fn first_query(&self, section: &Section) -> Result<nodes::QueryProposal, EngineError> {
        let prompt = nodes::first_search_prompt(&section.title, &section.guidance);
        let attempts = self.params.generation_retries.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match guard(&self.cancel, self.generator.generate(&prompt)).await? {
                Ok(text) => match nodes::parse_query_proposal(&text) {
                    Some(proposal) => return Ok(proposal),
                    None => {
                        last_err = Some(anyhow!("no usable search query in generator output"))
                    }
                },
                Err(e) => last_err = Some(e),
            }
            if attempt < attempts {
                guard(&self.cancel, tokio::time::sleep(self.params.retry_delay)).await?;
            }
        }

        Err(EngineError::Generation {
            attempts,
            source: last_err.unwrap_or_else(|| anyhow!("query generation failed")),
        })
    }

    async fn generate_required(&self, prompt: &str) -> Result<String, EngineError> {
        guard(
            &self.cancel,
            llm::generate_with_retry(
                self.generator,
                prompt,
                self.params.generation_retries,
                self.params.retry_delay,
            ),
        )
        .await?
        .map_err(|source| EngineError::Generation {
            attempts: self.params.generation_retries,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{sample_results, ScriptedGenerator, ScriptedSearch};

    fn params(max_reflections: usize) -> LoopParams {
        LoopParams {
            max_reflections,
            max_search_results: 5,
            search_timeout: Duration::from_secs(1),
            max_content_length: 1000,
            generation_retries: 3,
            retry_delay: Duration::ZERO,
        }
    }

    fn query_json(q: &str) -> Result<String, String> {
        Ok(format!("{{\"search_query\": \"{}\", \"reasoning\": \"r\"}}", q))
    }

    #[tokio::test]
    async fn test_history_grows_to_one_plus_max_reflections() {
        let generator = ScriptedGenerator::new(vec![
            query_json("q0"),
            Ok("draft v1".into()),
            query_json("q1"),
            Ok("draft v2".into()),
            query_json("q2"),
            Ok("draft v3".into()),
        ]);
        let search = ScriptedSearch::with_results(sample_results(2));
        let section_loop = SectionLoop::new(
            &generator,
            &search,
            params(2),
            CancellationToken::new(),
        );

        let mut section = Section::new("Market", "size and growth");
        section_loop.run(&mut section).await.unwrap();

        assert_eq!(section.research.history.len(), 1 + 2);
        let queries: Vec<&str> = section
            .research
            .history
            .iter()
            .map(|r| r.query.as_str())
            .collect();
        assert_eq!(queries, vec!["q0", "q1", "q2"]);
        assert_eq!(section.research.latest_summary, "draft v3");
        assert!(section.research.completed);
        assert_eq!(search.query_count(), 3);
    }

    #[tokio::test]
    async fn test_unparseable_reflection_keeps_draft_and_skips_round() {
        let generator = ScriptedGenerator::new(vec![
            query_json("q0"),
            Ok("draft v1".into()),
            Ok("I have no idea what to search for.".into()), // reflection 1: no JSON
            query_json("q2"),
            Ok("draft v2".into()),
        ]);
        let search = ScriptedSearch::with_results(sample_results(1));
        let section_loop = SectionLoop::new(
            &generator,
            &search,
            params(2),
            CancellationToken::new(),
        );

        let mut section = Section::new("Market", "g");
        section_loop.run(&mut section).await.unwrap();

        // the failed round issued no search, so no round was recorded for it
        assert_eq!(section.research.history.len(), 2);
        assert_eq!(section.research.latest_summary, "draft v2");
        assert!(section.research.completed);
    }

    #[tokio::test]
    async fn test_empty_search_results_are_not_fatal() {
        let generator = ScriptedGenerator::new(vec![
            query_json("q0"),
            Ok("draft from general knowledge".into()),
        ]);
        let search = ScriptedSearch::empty();
        let section_loop = SectionLoop::new(
            &generator,
            &search,
            params(0),
            CancellationToken::new(),
        );

        let mut section = Section::new("Market", "g");
        section_loop.run(&mut section).await.unwrap();

        assert_eq!(section.research.history.len(), 1);
        assert!(section.research.history[0].results.is_empty());
        assert_eq!(section.research.latest_summary, "draft from general knowledge");
        assert!(section.research.completed);
    }

    #[tokio::test]
    async fn test_first_pass_exhaustion_surfaces_error() {
        let generator = ScriptedGenerator::failing("model overloaded");
        let search = ScriptedSearch::with_results(sample_results(1));
        let section_loop = SectionLoop::new(
            &generator,
            &search,
            params(2),
            CancellationToken::new(),
        );

        let mut section = Section::new("Market", "g");
        let err = section_loop.run(&mut section).await.unwrap_err();

        assert!(matches!(err, EngineError::Generation { attempts: 3, .. }));
        assert_eq!(generator.call_count(), 3);
        assert!(section.research.history.is_empty());
        assert!(!section.research.completed);
    }

    #[tokio::test]
    async fn test_first_summary_failure_keeps_audit_trail() {
        // query generation succeeds once, then everything fails
        let generator = ScriptedGenerator::with_failing_default(vec![query_json("q0")], "boom");
        let search = ScriptedSearch::with_results(sample_results(1));
        let section_loop = SectionLoop::new(
            &generator,
            &search,
            params(1),
            CancellationToken::new(),
        );

        let mut section = Section::new("Market", "g");
        let err = section_loop.run(&mut section).await.unwrap_err();

        assert!(matches!(err, EngineError::Generation { .. }));
        // the search that did happen stays recorded
        assert_eq!(section.research.history.len(), 1);
        assert!(!section.research.completed);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_without_completing() {
        let generator = ScriptedGenerator::always("{\"search_query\": \"q\"}");
        let search = ScriptedSearch::with_results(sample_results(1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let section_loop = SectionLoop::new(&generator, &search, params(2), cancel);

        let mut section = Section::new("Market", "g");
        let err = section_loop.run(&mut section).await.unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        assert!(!section.research.completed);
    }
}

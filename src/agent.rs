//! Orchestrates a full research run: structure proposal, per-section
//! refinement in order, final assembly.

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::{guard, LoopParams, SectionLoop};
use crate::error::EngineError;
use crate::llm::{self, TextGenerator};
use crate::nodes;
use crate::progress::{self, Kind};
use crate::search::SearchProvider;
use crate::state::{ProgressSummary, ReportState};

pub struct ResearchAgent<'a> {
    generator: &'a dyn TextGenerator,
    search: &'a dyn SearchProvider,
    params: LoopParams,
    cancel: CancellationToken,
    pub state: ReportState,
}

impl<'a> ResearchAgent<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        search: &'a dyn SearchProvider,
        config: &Config,
        cancel: CancellationToken,
    ) -> Self {
        ResearchAgent {
            generator,
            search,
            params: LoopParams::from_config(config),
            cancel,
            state: ReportState::new(""),
        }
    }

    /// Runs the whole pipeline for one topic and returns the final report.
    ///
    /// The only fatal failure is an unusable structure proposal; anything
    /// that goes wrong after that degrades the report's quality, never its
    /// presence. Cancellation aborts between and within sections without
    /// marking partial work complete.
    pub async fn run(&mut self, topic: &str) -> Result<String, EngineError> {
        self.state = ReportState::new(topic);

        progress::log_with(Kind::Structure, format!("planning report for \"{}\"", topic));
        let plan = self.generate_structure(topic).await?;
        self.state.report_title = plan.report_title;
        self.state.sections = plan.sections;

        eprintln!(
            "[agent] report structure ready: {} section(s)",
            self.state.sections.len()
        );
        for (i, section) in self.state.sections.iter().enumerate() {
            eprintln!("  {}. {}", i + 1, section.title);
        }

        let section_loop = SectionLoop::new(
            self.generator,
            self.search,
            self.params.clone(),
            self.cancel.clone(),
        );

        let total = self.state.sections.len();
        for i in 0..total {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            eprintln!(
                "[agent] section {}/{}: {}",
                i + 1,
                total,
                self.state.sections[i].title
            );

            match section_loop.run(&mut self.state.sections[i]).await {
                Ok(()) => {}
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    // a section whose generation budget is spent still ships,
                    // with whatever it has
                    eprintln!(
                        "[agent] section \"{}\" abandoned: {}",
                        self.state.sections[i].title, e
                    );
                    let section = &mut self.state.sections[i];
                    if section.research.latest_summary.is_empty() {
                        section.research.latest_summary = format!(
                            "No findings could be gathered for this section ({}).",
                            section.guidance
                        );
                    }
                    section.research.mark_completed();
                }
            }

            let summary = self.state.progress();
            progress::log(format!(
                "{}/{} sections complete ({:.1}%)",
                summary.completed_sections, summary.total_sections, summary.percent_complete
            ));
        }

        let report = self.format_report().await?;
        self.state.set_final_report(report.clone());
        progress::log("research run complete");
        Ok(report)
    }

    pub fn progress(&self) -> ProgressSummary {
        self.state.progress()
    }

    async fn generate_structure(&self, topic: &str) -> Result<nodes::ReportPlan, EngineError> {
        let prompt = nodes::structure_prompt(topic);
        let text = guard(
            &self.cancel,
            llm::generate_with_retry(
                self.generator,
                &prompt,
                self.params.generation_retries,
                self.params.retry_delay,
            ),
        )
        .await?
        .map_err(|source| EngineError::StructureParse {
            topic: topic.to_string(),
            source,
        })?;

        nodes::parse_report_plan(topic, &text).map_err(|source| EngineError::StructureParse {
            topic: topic.to_string(),
            source,
        })
    }

    /// Final assembly. The generator gets one shot at polishing the
    /// document; any problem falls back to the deterministic concatenation.
    async fn format_report(&self) -> Result<String, EngineError> {
        progress::log_with(Kind::Render, "assembling final report");
        let prompt = nodes::report_formatting_prompt(&self.state.report_title, &self.state.sections);

        match guard(&self.cancel, self.generator.generate(&prompt)).await? {
            Ok(report) if !report.trim().is_empty() => Ok(report),
            Ok(_) => {
                eprintln!("[agent] formatting step returned nothing, assembling manually");
                Ok(nodes::format_report_manually(
                    &self.state.report_title,
                    &self.state.sections,
                ))
            }
            Err(e) => {
                eprintln!("[agent] formatting step failed: {}; assembling manually", e);
                Ok(nodes::format_report_manually(
                    &self.state.report_title,
                    &self.state.sections,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TextGenerator;
    use crate::testutil::{sample_results, ScriptedGenerator, ScriptedSearch};
    use anyhow::anyhow;
    use async_trait::async_trait;

    /// Answers by prompt kind rather than call order, so tests stay
    /// independent of how many calls each phase makes.
    struct RoutedGenerator {
        section_count: usize,
        fail_first_queries: bool,
    }

    impl RoutedGenerator {
        fn new(section_count: usize) -> Self {
            RoutedGenerator {
                section_count,
                fail_first_queries: false,
            }
        }

        fn structure_json(&self) -> String {
            let sections: Vec<String> = (0..self.section_count)
                .map(|i| {
                    format!(
                        "{{\"title\": \"Section {}\", \"guidance\": \"guidance {}\"}}",
                        i, i
                    )
                })
                .collect();
            format!(
                "{{\"report_title\": \"The Report\", \"sections\": [{}]}}",
                sections.join(",")
            )
        }
    }

    #[async_trait]
    impl TextGenerator for RoutedGenerator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            if prompt.contains("research planner") {
                Ok(self.structure_json())
            } else if prompt.contains("single best web search query") {
                if self.fail_first_queries {
                    Err(anyhow!("query model offline"))
                } else {
                    Ok("{\"search_query\": \"initial query\", \"reasoning\": \"r\"}".to_string())
                }
            } else if prompt.contains("close the most important gap") {
                Ok("{\"search_query\": \"gap query\", \"reasoning\": \"r\"}".to_string())
            } else if prompt.contains("Write the first draft") {
                Ok("first draft".to_string())
            } else if prompt.contains("Revise one section") {
                Ok("revised draft".to_string())
            } else if prompt.contains("Assemble the final version") {
                // force the deterministic assembly path
                Err(anyhow!("formatter offline"))
            } else {
                Err(anyhow!("unexpected prompt: {}", prompt))
            }
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.research.max_reflections = 2;
        config.research.retry_delay_secs = 0;
        config
    }

    #[tokio::test]
    async fn test_full_run_completes_every_section() {
        let generator = RoutedGenerator::new(5);
        let search = ScriptedSearch::with_results(sample_results(2));
        let config = config();
        let mut agent =
            ResearchAgent::new(&generator, &search, &config, CancellationToken::new());

        let report = agent.run("ev market").await.unwrap();

        assert_eq!(agent.state.sections.len(), 5);
        for section in &agent.state.sections {
            assert!(section.research.completed);
            assert_eq!(section.research.history.len(), 1 + 2);
            assert_eq!(section.research.latest_summary, "revised draft");
        }

        // all titles present, in original order
        let mut last = 0;
        for i in 0..5 {
            let pos = report.find(&format!("## Section {}", i)).unwrap();
            assert!(pos >= last);
            last = pos;
        }
        assert!(report.starts_with("# The Report"));

        assert_eq!(agent.state.final_report.as_deref(), Some(report.as_str()));
        assert!(agent.state.completed_at.is_some());

        let progress = agent.progress();
        assert_eq!(progress.total_sections, 5);
        assert_eq!(progress.completed_sections, 5);
        assert!(progress.is_done);
    }

    #[tokio::test]
    async fn test_structure_parse_failure_is_fatal() {
        let generator = ScriptedGenerator::always("I cannot produce a structure right now.");
        let search = ScriptedSearch::empty();
        let config = config();
        let mut agent =
            ResearchAgent::new(&generator, &search, &config, CancellationToken::new());

        let err = agent.run("ev market").await.unwrap_err();

        match err {
            EngineError::StructureParse { ref topic, .. } => assert_eq!(topic, "ev market"),
            other => panic!("expected StructureParse, got {:?}", other),
        }
        assert!(agent.state.sections.is_empty());
        assert!(agent.state.final_report.is_none());
    }

    #[tokio::test]
    async fn test_abandoned_section_degrades_but_run_succeeds() {
        let mut generator = RoutedGenerator::new(2);
        generator.fail_first_queries = true;
        let search = ScriptedSearch::with_results(sample_results(1));
        let config = config();
        let mut agent =
            ResearchAgent::new(&generator, &search, &config, CancellationToken::new());

        let report = agent.run("ev market").await.unwrap();

        for section in &agent.state.sections {
            assert!(section.research.completed);
            assert!(section
                .research
                .latest_summary
                .contains("No findings could be gathered"));
        }
        assert!(report.contains("## Section 0"));
        assert!(report.contains("## Section 1"));
        assert!(agent.progress().is_done);
    }

    #[tokio::test]
    async fn test_cancelled_run_keeps_no_partial_sections() {
        let generator = RoutedGenerator::new(3);
        let search = ScriptedSearch::empty();
        let config = config();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut agent = ResearchAgent::new(&generator, &search, &config, cancel);

        let err = agent.run("ev market").await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(agent.state.final_report.is_none());
        assert!(agent.state.sections.iter().all(|s| !s.research.completed));
    }
}

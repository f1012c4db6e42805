use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::search::SearchResult;

pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// One query issued against the search provider and what it returned.
/// Rounds are append-only and never reordered; the newest round feeds the
/// next reflection prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRound {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionResearch {
    pub history: Vec<SearchRound>,
    pub latest_summary: String,
    pub completed: bool,
}

impl SectionResearch {
    pub fn add_search_round(&mut self, query: &str, results: Vec<SearchResult>) {
        self.history.push(SearchRound {
            query: query.to_string(),
            results,
            timestamp: unix_timestamp(),
        });
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }
}

/// One titled unit of the report, refined independently of its siblings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    /// What this section is supposed to cover, as proposed by the structure
    /// generation step.
    pub guidance: String,
    #[serde(default)]
    pub research: SectionResearch,
}

impl Section {
    pub fn new(title: impl Into<String>, guidance: impl Into<String>) -> Self {
        Section {
            title: title.into(),
            guidance: guidance.into(),
            research: SectionResearch::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressSummary {
    pub total_sections: usize,
    pub completed_sections: usize,
    pub percent_complete: f64,
    pub is_done: bool,
}

/// Everything accumulated over one research run. `final_report` is set
/// exactly once, after every section has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportState {
    pub report_title: String,
    pub query: String,
    pub sections: Vec<Section>,
    pub final_report: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl ReportState {
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        ReportState {
            report_title: query.clone(),
            query,
            sections: Vec::new(),
            final_report: None,
            created_at: unix_timestamp(),
            completed_at: None,
        }
    }

    pub fn set_final_report(&mut self, report: String) {
        debug_assert!(self.sections.iter().all(|s| s.research.completed));
        debug_assert!(self.final_report.is_none());
        self.final_report = Some(report);
        self.completed_at = Some(unix_timestamp());
    }

    pub fn progress(&self) -> ProgressSummary {
        let total = self.sections.len();
        let completed = self
            .sections
            .iter()
            .filter(|s| s.research.completed)
            .count();
        let percent = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        ProgressSummary {
            total_sections: total,
            completed_sections: completed,
            percent_complete: percent,
            is_done: self.final_report.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            url: format!("https://example.com/{}", title),
            content: "content".to_string(),
            score: Some(0.9),
        }
    }

    #[test]
    fn test_history_is_append_ordered() {
        let mut research = SectionResearch::default();
        research.add_search_round("first", vec![result("a")]);
        research.add_search_round("second", vec![]);
        research.add_search_round("third", vec![result("b"), result("c")]);

        let queries: Vec<&str> = research.history.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(queries, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_progress_summary() {
        let mut state = ReportState::new("topic");
        state.sections = vec![Section::new("a", "g"), Section::new("b", "g")];
        assert_eq!(state.progress().completed_sections, 0);
        assert!(!state.progress().is_done);

        state.sections[0].research.mark_completed();
        let progress = state.progress();
        assert_eq!(progress.total_sections, 2);
        assert_eq!(progress.completed_sections, 1);
        assert!((progress.percent_complete - 50.0).abs() < 1e-9);

        state.sections[1].research.mark_completed();
        state.set_final_report("# done".to_string());
        assert!(state.progress().is_done);
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = ReportState::new("新能源汽车");
        let mut section = Section::new("市场概况", "cover the market");
        section.research.add_search_round("q1", vec![result("r1")]);
        section
            .research
            .add_search_round("q2", vec![result("r2"), result("r3")]);
        section.research.latest_summary = "latest".to_string();
        section.research.mark_completed();
        state.sections.push(section);
        state.set_final_report("# report".to_string());

        let json = serde_json::to_string_pretty(&state).unwrap();
        let restored: ReportState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.query, state.query);
        assert_eq!(restored.sections.len(), 1);
        let research = &restored.sections[0].research;
        assert_eq!(research.history.len(), 2);
        assert_eq!(research.history[0].query, "q1");
        assert_eq!(research.history[1].results.len(), 2);
        assert_eq!(research.history[1].results[1].title, "r3");
        assert_eq!(research.latest_summary, "latest");
        assert!(research.completed);
        assert_eq!(restored.final_report.as_deref(), Some("# report"));
        assert_eq!(restored.completed_at, state.completed_at);
    }

    #[test]
    fn test_missing_score_round_trips() {
        let r = SearchResult {
            title: "t".into(),
            url: "u".into(),
            content: "c".into(),
            score: None,
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(!json.contains("score"));
        let restored: SearchResult = serde_json::from_str(&json).unwrap();
        assert!(restored.score.is_none());
    }
}

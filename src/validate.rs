use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Structural template a text blob must satisfy to be usable as chart-ready
/// data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartShape {
    /// Labeled values on one comparison axis (bar chart).
    Categorical,
    /// Values over an ordered time axis (line chart).
    TimeSeries,
    /// Percentage shares of one whole (pie chart).
    PartOfWhole,
}

impl ChartShape {
    pub const ALL: [ChartShape; 3] = [
        ChartShape::Categorical,
        ChartShape::TimeSeries,
        ChartShape::PartOfWhole,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ChartShape::Categorical => "bar chart",
            ChartShape::TimeSeries => "line chart",
            ChartShape::PartOfWhole => "pie chart",
        }
    }
}

// Phrases a generator emits when it cannot find data. Their presence is a
// signal to retry, not an error. The Chinese set is load-bearing for the
// canned fallback corpus; the English set covers English-prompted runs.
const FAILURE_PHRASES: [&str; 9] = [
    "未找到可提取的数据",
    "AI未能提取",
    "无法提取",
    "提取失败",
    "没有找到",
    "不包含",
    "无法找到",
    "错误",
    "失败",
];

const FAILURE_PHRASES_EN: [&str; 8] = [
    "no extractable data",
    "unable to extract",
    "could not extract",
    "extraction failed",
    "no data found",
    "cannot find",
    "does not contain",
    "not enough data",
];

const TEMPORAL_MARKERS: [&str; 7] = ["年", "月", "季度", "日", "期", "时间", "序列"];

const TEMPORAL_MARKERS_EN: [&str; 7] = [
    "year", "month", "quarter", "day", "period", "time", "sequence",
];

static NUMERIC_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(\.\d+)?%?").unwrap());
static PERCENT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(\.\d+)?%").unwrap());

fn contains_failure_phrase(text: &str) -> bool {
    if FAILURE_PHRASES.iter().any(|p| text.contains(p)) {
        return true;
    }
    let lower = text.to_lowercase();
    FAILURE_PHRASES_EN.iter().any(|p| lower.contains(p))
}

fn has_temporal_marker(text: &str) -> bool {
    if TEMPORAL_MARKERS.iter().any(|m| text.contains(m)) {
        return true;
    }
    let lower = text.to_lowercase();
    TEMPORAL_MARKERS_EN.iter().any(|m| lower.contains(m))
}

/// Syntactic gate deciding whether `data` can feed a chart of the given
/// shape. Pure; identical input always yields an identical verdict.
///
/// Thresholds (minimum line counts, the half-the-lines ratios) must not be
/// loosened: the fallback policy counts on them.
pub fn is_valid_chart_data(data: &str, shape: ChartShape) -> bool {
    if data.trim().is_empty() {
        return false;
    }

    if contains_failure_phrase(data) {
        return false;
    }

    let lines: Vec<&str> = data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    match shape {
        ChartShape::Categorical => {
            if lines.len() < 3 {
                return false;
            }
            let numeric_count = lines.iter().filter(|l| NUMERIC_TOKEN.is_match(l)).count();
            // at least half the lines carry a value
            numeric_count * 2 >= lines.len()
        }
        ChartShape::TimeSeries => {
            if lines.len() < 3 {
                return false;
            }
            has_temporal_marker(data) && NUMERIC_TOKEN.is_match(data)
        }
        ChartShape::PartOfWhole => {
            if lines.len() < 2 {
                return false;
            }
            let percentage_count = lines.iter().filter(|l| PERCENT_TOKEN.is_match(l)).count();
            percentage_count * 2 >= lines.len()
        }
    }
}

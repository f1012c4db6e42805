//! Parses a validated chart-data blob ("label: value" lines, optionally led
//! by a title line) into a renderable series.

use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+(\.[0-9]+)?").unwrap());

#[derive(Debug, Clone, Default)]
pub struct ChartSeries {
    pub title: Option<String>,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl ChartSeries {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn split_label_value(line: &str) -> Option<(&str, &str)> {
    // ASCII or fullwidth colon, whichever comes first
    let idx = line.find(':').into_iter().chain(line.find('：')).min()?;
    let label = line[..idx].trim();
    let value = line[idx..].trim_start_matches(&[':', '：'][..]).trim();
    if label.is_empty() {
        return None;
    }
    Some((label, value))
}

/// Best-effort extraction of (label, value) pairs. Lines that carry no
/// number contribute nothing; a leading "Something:" line with no value
/// becomes the series title. Units after the number are dropped.
pub fn parse_chart_series(text: &str) -> ChartSeries {
    let mut series = ChartSeries::default();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((label, value)) = split_label_value(line) else {
            continue;
        };

        if value.is_empty() {
            if series.title.is_none() && series.labels.is_empty() {
                series.title = Some(label.to_string());
            }
            continue;
        }

        if let Some(m) = NUMBER.find(value) {
            if let Ok(number) = m.as_str().parse::<f64>() {
                series.labels.push(label.to_string());
                series.values.push(number);
            }
        }
    }

    series
}

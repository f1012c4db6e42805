//! Turns finished, read-only run state into files: a markdown report, and an
//! HTML document with embedded Chart.js blocks for the extracted data.

use anyhow::Result;
use pulldown_cmark::{html, Options, Parser};
use std::fs;
use std::path::{Path, PathBuf};

use crate::chartdata;
use crate::extraction::ExtractionSlot;
use crate::validate::ChartShape;

const CHART_COLORS: &str = "[\"#4e79a7\", \"#f28e2b\", \"#e15759\", \"#76b7b2\", \"#59a14f\", \
                            \"#edc948\", \"#b07aa1\", \"#ff9da7\", \"#9c755f\", \"#bab0ac\"]";

/// Keeps alphanumerics (any script), spaces, dashes and underscores;
/// spaces become underscores; capped at 30 characters.
pub fn sanitize_for_filename(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect();
    cleaned
        .trim_end()
        .replace(' ', "_")
        .chars()
        .take(30)
        .collect()
}

pub fn report_basename(query: &str, timestamp: i64) -> String {
    format!("deep_search_report_{}_{}", sanitize_for_filename(query), timestamp)
}

pub fn save_markdown_report(
    report: &str,
    query: &str,
    timestamp: i64,
    output_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{}.md", report_basename(query, timestamp)));
    fs::write(&path, report)?;
    Ok(path)
}

pub fn save_html_report(
    html: &str,
    query: &str,
    timestamp: i64,
    output_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{}.html", report_basename(query, timestamp)));
    fs::write(&path, html)?;
    Ok(path)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

fn chart_js_type(shape: ChartShape) -> &'static str {
    match shape {
        ChartShape::Categorical => "bar",
        ChartShape::TimeSeries => "line",
        ChartShape::PartOfWhole => "pie",
    }
}

/// One canvas plus its Chart.js config. Returns None when the slot's text
/// has nothing plottable.
fn chart_block(index: usize, slot: &ExtractionSlot) -> Option<String> {
    if !slot.valid {
        return None;
    }
    let series = chartdata::parse_chart_series(slot.text());
    if series.is_empty() {
        return None;
    }

    let title = series
        .title
        .clone()
        .unwrap_or_else(|| slot.shape.label().to_string());
    let labels = serde_json::to_string(&series.labels).unwrap_or_else(|_| "[]".to_string());
    let values = serde_json::to_string(&series.values).unwrap_or_else(|_| "[]".to_string());

    let note = if slot.degraded {
        "<p class=\"degraded-note\">Shown with fallback data; live extraction did not \
         produce usable numbers.</p>"
    } else {
        ""
    };

    Some(format!(
        "<div class=\"chart-card\">\n\
         <h3>{title}</h3>\n\
         {note}\n\
         <canvas id=\"chart_{index}\"></canvas>\n\
         <script>\n\
         new Chart(document.getElementById('chart_{index}'), {{\n\
           type: '{chart_type}',\n\
           data: {{\n\
             labels: {labels},\n\
             datasets: [{{ label: '{title}', data: {values}, backgroundColor: {colors} }}]\n\
           }},\n\
           options: {{ responsive: true, plugins: {{ legend: {{ display: {legend} }} }} }}\n\
         }});\n\
         </script>\n\
         </div>",
        title = escape_html(&title),
        note = note,
        index = index,
        chart_type = chart_js_type(slot.shape),
        labels = labels,
        values = values,
        colors = CHART_COLORS,
        legend = slot.shape == ChartShape::PartOfWhole,
    ))
}

/// Full standalone HTML document: the report body rendered from markdown,
/// followed by a chart section when any slot produced plottable data.
pub fn render_html(report_title: &str, report_markdown: &str, charts: &[ExtractionSlot]) -> String {
    let body = markdown_to_html(report_markdown);

    let chart_blocks: Vec<String> = charts
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| chart_block(i, slot))
        .collect();

    let chart_section = if chart_blocks.is_empty() {
        String::new()
    } else {
        format!(
            "<section class=\"charts\">\n<h2>Data Charts</h2>\n{}\n</section>\n\
             <script src=\"https://cdn.jsdelivr.net/npm/chart.js\"></script>",
            chart_blocks.join("\n")
        )
    };

    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n\
         <style>\n\
         body {{ font-family: -apple-system, 'Segoe UI', 'PingFang SC', sans-serif; \
         max-width: 860px; margin: 2rem auto; padding: 0 1rem; line-height: 1.6; \
         color: #24292f; }}\n\
         h1 {{ border-bottom: 2px solid #d0d7de; padding-bottom: .3rem; }}\n\
         h2 {{ border-bottom: 1px solid #d0d7de; padding-bottom: .2rem; }}\n\
         .chart-card {{ margin: 2rem 0; padding: 1rem; border: 1px solid #d0d7de; \
         border-radius: 8px; }}\n\
         .degraded-note {{ color: #9a6700; font-size: .85rem; }}\n\
         </style>\n\
         </head>\n\
         <body>\n\
         {body}\n\
         {charts}\n\
         </body>\n\
         </html>\n",
        title = escape_html(report_title),
        body = body,
        charts = chart_section,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(shape: ChartShape, text: &str, degraded: bool) -> ExtractionSlot {
        ExtractionSlot {
            shape,
            best_text: Some(text.to_string()),
            valid: true,
            attempts: 1,
            degraded,
        }
    }

    #[test]
    fn test_sanitize_for_filename() {
        assert_eq!(sanitize_for_filename("ev market: 2024?"), "ev_market_2024");
        assert_eq!(sanitize_for_filename("新能源汽车"), "新能源汽车");
        let long = "a".repeat(50);
        assert_eq!(sanitize_for_filename(&long).chars().count(), 30);
    }

    #[test]
    fn test_report_basename() {
        assert_eq!(
            report_basename("ev market", 1700000000),
            "deep_search_report_ev_market_1700000000"
        );
    }

    #[test]
    fn test_render_html_contains_sections_and_charts() {
        let markdown = "# The Report\n\n## Market\n\nbody text";
        let charts = vec![
            slot(ChartShape::Categorical, "sales:\nA: 10\nB: 20\nC: 30", false),
            slot(ChartShape::PartOfWhole, "share:\nX: 60%\nY: 40%", true),
        ];

        let html = render_html("The Report", markdown, &charts);

        assert!(html.contains("<title>The Report</title>"));
        assert!(html.contains("<h2>Market</h2>"));
        assert!(html.contains("type: 'bar'"));
        assert!(html.contains("type: 'pie'"));
        assert!(html.contains("degraded-note"));
        assert!(html.contains("cdn.jsdelivr.net/npm/chart.js"));
    }

    #[test]
    fn test_render_html_without_plottable_data_omits_chart_section() {
        let charts = vec![ExtractionSlot {
            shape: ChartShape::TimeSeries,
            best_text: None,
            valid: false,
            attempts: 3,
            degraded: false,
        }];
        let html = render_html("T", "# T", &charts);
        assert!(!html.contains("chart.js"));
        assert!(!html.contains("<canvas"));
    }

    #[test]
    fn test_title_is_escaped() {
        let html = render_html("A <b>&</b> B", "# x", &[]);
        assert!(html.contains("<title>A &lt;b&gt;&amp;&lt;/b&gt; B</title>"));
    }
}

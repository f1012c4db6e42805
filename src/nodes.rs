//! Prompt assembly and output parsing for every generator-facing step.
//!
//! Nothing in this module performs I/O: each function either builds the
//! prompt for a step or parses what the generator returned. The loops in
//! `engine` and `extraction` own the actual calls.

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::search::SearchResult;
use crate::state::Section;
use crate::validate::ChartShape;

/// A proposed search query plus the generator's stated reason for it.
#[derive(Debug, Clone)]
pub struct QueryProposal {
    pub search_query: String,
    pub reasoning: String,
}

/// Parsed report structure proposal.
#[derive(Debug)]
pub struct ReportPlan {
    pub report_title: String,
    pub sections: Vec<Section>,
}

// ---------------------------------------------------------------------------
// JSON scraping helpers

/// Extracts the first balanced JSON object from free-form generator output.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut brace_count = 0;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in text[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }

        if ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '"' {
            in_string = !in_string;
        }

        if !in_string {
            match ch {
                '{' => brace_count += 1,
                '}' => {
                    brace_count -= 1;
                    if brace_count == 0 {
                        return Some(text[start..start + i + ch.len_utf8()].to_string());
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Extracts the outermost JSON array from free-form generator output.
pub fn extract_json_array(text: &str) -> Result<String> {
    if let Some(start) = text.find('[') {
        if let Some(end) = text.rfind(']') {
            if end > start {
                return Ok(text[start..=end].to_string());
            }
        }
    }

    if text.trim().starts_with('[') {
        return Ok(text.trim().to_string());
    }

    Err(anyhow!("no JSON array found in response"))
}

// ---------------------------------------------------------------------------
// Report structure

pub fn structure_prompt(topic: &str) -> String {
    format!(
        "You are a research planner. Propose the structure of a deep research report \
        on the topic below.\n\n\
        Topic: {}\n\n\
        Requirements:\n\
        - 4 to 7 sections, ordered so the report reads front to back\n\
        - each section needs a short title and one or two sentences of guidance \
        describing what it must cover\n\
        - sections must not overlap\n\n\
        Respond with a single JSON object and no other text:\n\
        {{\"report_title\": \"...\", \"sections\": [{{\"title\": \"...\", \"guidance\": \"...\"}}]}}",
        topic
    )
}

#[derive(Deserialize)]
struct PlanWire {
    report_title: Option<String>,
    sections: Vec<SectionWire>,
}

#[derive(Deserialize)]
struct SectionWire {
    title: String,
    #[serde(default, alias = "content")]
    guidance: String,
}

/// Parses the structure proposal. Failure here is the run's one fatal
/// precondition, so errors carry enough context to report upstream.
/// Generators that answer with a bare section array instead of the requested
/// object are tolerated.
pub fn parse_report_plan(topic: &str, text: &str) -> Result<ReportPlan> {
    let object_plan = extract_json_object(text)
        .and_then(|json| serde_json::from_str::<PlanWire>(&json).ok());

    let (report_title, wire_sections) = match object_plan {
        Some(wire) => (wire.report_title, wire.sections),
        None => {
            let json = extract_json_array(text)
                .map_err(|_| anyhow!("no usable JSON in structure proposal"))?;
            let sections: Vec<SectionWire> = serde_json::from_str(&json)
                .map_err(|e| anyhow!("structure proposal is not in the expected shape: {}", e))?;
            (None, sections)
        }
    };

    if wire_sections.is_empty() {
        return Err(anyhow!("structure proposal contained no sections"));
    }

    let sections = wire_sections
        .into_iter()
        .map(|s| Section::new(s.title, s.guidance))
        .collect();

    Ok(ReportPlan {
        report_title: report_title.unwrap_or_else(|| topic.to_string()),
        sections,
    })
}

// ---------------------------------------------------------------------------
// Query proposals (first pass and reflection)

pub fn first_search_prompt(title: &str, guidance: &str) -> String {
    format!(
        "You are researching one section of a report.\n\n\
        Section title: {}\n\
        Section guidance: {}\n\n\
        Propose the single best web search query to start researching this section.\n\n\
        Respond with a single JSON object and no other text:\n\
        {{\"search_query\": \"...\", \"reasoning\": \"...\"}}",
        title, guidance
    )
}

pub fn reflection_prompt(title: &str, guidance: &str, latest_summary: &str) -> String {
    format!(
        "You are improving one section of a research report.\n\n\
        Section title: {}\n\
        Section guidance: {}\n\n\
        Current draft of the section:\n{}\n\n\
        Identify what the draft is still missing or leaves vague, and propose one web \
        search query that would close the most important gap.\n\n\
        Respond with a single JSON object and no other text:\n\
        {{\"search_query\": \"...\", \"reasoning\": \"...\"}}",
        title, guidance, latest_summary
    )
}

#[derive(Deserialize)]
struct ProposalWire {
    search_query: String,
    #[serde(default)]
    reasoning: String,
}

/// Pulls a query proposal out of generator output. `None` means the output
/// carried nothing usable; callers degrade rather than fail.
pub fn parse_query_proposal(text: &str) -> Option<QueryProposal> {
    let json = extract_json_object(text)?;
    let wire: ProposalWire = serde_json::from_str(&json).ok()?;
    let search_query = wire.search_query.trim().to_string();
    if search_query.is_empty() {
        return None;
    }
    Some(QueryProposal {
        search_query,
        reasoning: wire.reasoning.trim().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Summaries

pub fn format_search_results_for_prompt(
    results: &[SearchResult],
    max_content_length: usize,
) -> String {
    if results.is_empty() {
        return "No search results were found.".to_string();
    }

    let mut out = String::new();
    for (i, result) in results.iter().enumerate() {
        let content: String = result.content.chars().take(max_content_length).collect();
        out.push_str(&format!("Result {}: {}\n", i + 1, result.title));
        out.push_str(&format!("Content: {}\n", content));
        out.push_str(&format!("Source: {}\n\n", result.url));
    }
    out
}

pub fn first_summary_prompt(
    title: &str,
    guidance: &str,
    search_query: &str,
    formatted_results: &str,
) -> String {
    format!(
        "Write the first draft of one section of a research report.\n\n\
        Section title: {}\n\
        Section guidance: {}\n\
        Search query used: {}\n\n\
        Search results:\n{}\n\
        Write a focused, factual draft of this section grounded in the results above. \
        Cite sources inline as [Source: url] where a claim comes from a specific result. \
        If the results are empty or irrelevant, write the best draft you can and state \
        plainly which data is missing.\n\n\
        Output only the section text, without headings.",
        title, guidance, search_query, formatted_results
    )
}

pub fn reflection_summary_prompt(
    title: &str,
    guidance: &str,
    search_query: &str,
    formatted_results: &str,
    latest_summary: &str,
) -> String {
    format!(
        "Revise one section of a research report using new search results.\n\n\
        Section title: {}\n\
        Section guidance: {}\n\
        Search query used: {}\n\n\
        New search results:\n{}\n\
        Current draft of the section:\n{}\n\n\
        Rewrite the draft so it absorbs whatever the new results add, keeps everything \
        that was already well supported, and keeps inline [Source: url] citations. The \
        revision replaces the current draft entirely.\n\n\
        Output only the section text, without headings.",
        title, guidance, search_query, formatted_results, latest_summary
    )
}

// ---------------------------------------------------------------------------
// Final report assembly

pub fn report_formatting_prompt(report_title: &str, sections: &[Section]) -> String {
    let mut body = String::new();
    for section in sections {
        body.push_str(&format!(
            "## {}\n{}\n\n",
            section.title, section.research.latest_summary
        ));
    }

    format!(
        "Assemble the final version of the research report below.\n\n\
        Report title: {}\n\n\
        Sections, in their required order:\n\n{}\
        Polish the wording for consistency across sections. Keep every section, in \
        order, under a `## ` heading with its title unchanged. Keep inline \
        [Source: url] citations. Start the document with `# {}`.\n\n\
        Output only the final markdown document.",
        report_title, body, report_title
    )
}

/// Deterministic assembly used when the formatting step fails: title plus
/// each section's latest fragment, in original order.
pub fn format_report_manually(report_title: &str, sections: &[Section]) -> String {
    let mut out = format!("# {}\n\n", report_title);
    for section in sections {
        out.push_str(&format!(
            "## {}\n\n{}\n\n",
            section.title,
            section.research.latest_summary.trim()
        ));
    }
    out.trim_end().to_string()
}

// ---------------------------------------------------------------------------
// Chart-data extraction

pub fn chart_query_prompt(topic: &str) -> String {
    format!(
        "The user needs data about \"{}\" suitable for building tables and charts \
        (bar, line, pie).\n\
        Generate 2-3 precise web search queries that:\n\
        1. target structured statistics: yearly figures, comparisons, breakdowns\n\
        2. look for quantified information: numbers, percentages, amounts, growth rates\n\
        3. prefer data with a clear category dimension (year, region, product category)\n\
        4. avoid vague phrasing\n\n\
        Output only the search queries, one per line, with no numbering and no other text.",
        topic
    )
}

/// Splits generator output into candidate queries, dropping list-prefixed
/// lines rather than trying to repair them.
pub fn parse_query_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            !line.starts_with("1.")
                && !line.starts_with("2.")
                && !line.starts_with("3.")
                && !line.starts_with('-')
                && !line.starts_with('*')
        })
        .map(str::to_string)
        .collect()
}

pub fn extraction_prompt(shape: ChartShape, topic: &str, results_text: &str) -> String {
    let (purpose, requirements, example) = match shape {
        ChartShape::Categorical => (
            "a bar chart. A bar chart compares values across categories",
            "1. extract at least 3 data points\n\
             2. every data point needs an explicit category label and a value\n\
             3. values must be concrete numbers (amounts, counts, percentages)\n\
             4. the points must belong to the same comparison dimension\n\
             5. if the results do not contain enough data, generate plausible example \
             data for the topic instead",
            "Data topic:\nCategory 1: value\nCategory 2: value\nCategory 3: value",
        ),
        ChartShape::TimeSeries => (
            "a line chart. A line chart shows how a value changes over time",
            "1. extract data for at least 3 points in time\n\
             2. every data point needs a time label and a value\n\
             3. the time labels must form a continuous or logically ordered sequence\n\
             4. the values must be able to show a trend\n\
             5. if the results do not contain enough data, generate plausible example \
             data for the topic instead",
            "Data topic:\nTime 1: value\nTime 2: value\nTime 3: value",
        ),
        ChartShape::PartOfWhole => (
            "a pie chart. A pie chart shows how parts make up a whole",
            "1. extract at least 2 parts\n\
             2. every part needs a name and a percentage\n\
             3. the percentages should sum to roughly 100%\n\
             4. the parts must belong to the same whole\n\
             5. if the results do not contain enough data, generate plausible example \
             data for the topic instead",
            "Data topic:\nPart 1: percentage%\nPart 2: percentage%\nPart 3: percentage%",
        ),
    };

    format!(
        "Extract data suitable for {}.\n\n\
        Topic: {}\n\n\
        Requirements:\n{}\n\n\
        Search results:\n{}\n\n\
        Output only the extracted data, one entry per line, in this format:\n{}",
        purpose, topic, requirements, results_text, example
    )
}

use crate::models::{AttendanceRecord, ExtractionResult, MAX_RECORDS};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

/// Subject used when nothing near the figure looks like a label.
pub const PLACEHOLDER_SUBJECT: &str = "Subject";

/// Subject for a single aggregate figure found in free text.
const OVERALL_SUBJECT: &str = "Attendance";

const MAX_ELEMENT_TEXT_CHARS: usize = 400;
const SHORT_TEXT_TOKENS: usize = 6;

static CONTAINER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span, div, td, th, label, li").expect("container selector is valid")
});
static TABLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("table selector is valid"));
static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("row selector is valid"));
static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("cell selector is valid"));

// "Attendance : 45 / 60 (74.6)"
static PARENTHESIZED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)attendance\s*:.*\(\s*(\d{1,3}(?:\.\d+)?)\s*\)")
        .expect("parenthesized regex is valid")
});
static PERCENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3}(?:\.\d+)?)\s*%").expect("percent regex is valid")
});
static NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3}(?:\.\d+)?)\b").expect("number regex is valid")
});
// "Mathematics : 82%", "Physics - 70.5 %"
static LABELLED_PERCENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z][A-Za-z0-9 &/().,'-]{0,48}?)\s*[:|–-]\s*(\d{1,3}(?:\.\d+)?)\s*%")
        .expect("labelled percent regex is valid")
});

type Strategy = fn(&Html) -> Vec<AttendanceRecord>;

const STRATEGIES: [(&str, Strategy); 3] = [
    ("element scan", scan_elements),
    ("table scan", scan_tables),
    ("free-text scan", scan_free_text),
];

/// Runs the strategy chain over `html`.
pub fn extract(html: &str) -> ExtractionResult {
    let document = Html::parse_document(html);

    for (name, strategy) in STRATEGIES {
        let records = strategy(&document);
        if records.is_empty() {
            debug!("{} found nothing", name);
            continue;
        }

        let records = dedupe_and_cap(records);
        debug!("{} found {} record(s)", name, records.len());
        return ExtractionResult::from_records(records);
    }

    ExtractionResult::NotFound
}

/// Pulls the percentage out of a piece of text.
///
/// Tries the parenthesized `Attendance : ... (74.6)` form, then a number
/// followed by `%`, then the first standalone 1–3 digit number. Values outside
/// `[0, 100]` are rejected here rather than filtered later.
pub fn parse_percentage(text: &str) -> Option<f64> {
    let captures = PARENTHESIZED_REGEX
        .captures(text)
        .or_else(|| PERCENT_REGEX.captures(text))
        .or_else(|| NUMBER_REGEX.captures(text))?;

    let value: f64 = captures[1].parse().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

/// Drops repeated `(subject, percentage)` pairs, keeping first-seen order, and
/// keeps at most [`MAX_RECORDS`].
pub fn dedupe_and_cap(records: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert((record.subject.clone(), record.percentage.to_bits())))
        .take(MAX_RECORDS)
        .collect()
}

/// Strategy 1: short container elements carrying a figure.
pub fn scan_elements(document: &Html) -> Vec<AttendanceRecord> {
    document
        .select(&CONTAINER_SELECTOR)
        .filter_map(|element| {
            let text = collapsed_text(element);
            if !is_candidate_text(&text) {
                return None;
            }

            let percentage = parse_percentage(&text)?;
            if inner_container_has(element, percentage) {
                return None;
            }
            let subject = infer_subject(element);
            AttendanceRecord::new(&subject, percentage)
        })
        .collect()
}

/// Strategy 2: every table row after the header, first column as subject and
/// last column as figure.
pub fn scan_tables(document: &Html) -> Vec<AttendanceRecord> {
    let mut records = Vec::new();

    for table in document.select(&TABLE_SELECTOR) {
        for row in table.select(&ROW_SELECTOR).skip(1) {
            let cells: Vec<ElementRef<'_>> = row.select(&CELL_SELECTOR).collect();
            if cells.len() < 2 {
                continue;
            }
            let (first, last) = (cells[0], cells[cells.len() - 1]);

            let record = parse_percentage(&collapsed_text(last))
                .and_then(|percentage| AttendanceRecord::new(&collapsed_text(first), percentage));
            records.extend(record);
        }
    }

    records
}

/// Strategy 3: `label : number %` anywhere in the visible text, or failing
/// that a single `Attendance : ... (74.6)` line.
pub fn scan_free_text(document: &Html) -> Vec<AttendanceRecord> {
    let text = visible_text(document);

    let records: Vec<AttendanceRecord> = LABELLED_PERCENT_REGEX
        .captures_iter(&text)
        .take(MAX_RECORDS)
        .filter_map(|caps| {
            let percentage: f64 = caps[2].parse().ok()?;
            AttendanceRecord::new(caps[1].trim(), percentage)
        })
        .collect();
    if !records.is_empty() {
        return records;
    }

    PARENTHESIZED_REGEX
        .captures(&text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .and_then(|percentage| AttendanceRecord::new(OVERALL_SUBJECT, percentage))
        .into_iter()
        .collect()
}

fn is_candidate_text(text: &str) -> bool {
    if text.is_empty() || text.chars().count() > MAX_ELEMENT_TEXT_CHARS {
        return false;
    }

    text.contains('%')
        || text.to_lowercase().contains("attendance")
        || (text.split(' ').count() <= SHORT_TEXT_TOKENS
            && text.chars().any(|c| c.is_ascii_digit()))
}

/// Whether a nested container already carries `percentage`, in which case the
/// inner one reports it.
fn inner_container_has(element: ElementRef<'_>, percentage: f64) -> bool {
    element.select(&CONTAINER_SELECTOR).any(|inner| {
        inner.id() != element.id() && parse_percentage(&collapsed_text(inner)) == Some(percentage)
    })
}

fn infer_subject(element: ElementRef<'_>) -> String {
    inner_label(element)
        .or_else(|| emphasized_sibling(element))
        .or_else(|| row_header(element))
        .or_else(|| preceding_text(element))
        .unwrap_or_else(|| PLACEHOLDER_SUBJECT.to_string())
}

/// A child element holding a label but no figure, e.g.
/// `<li><span>Physics</span> 71%</li>`.
fn inner_label(element: ElementRef<'_>) -> Option<String> {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| !is_invisible_tag(child.value().name()))
        .map(collapsed_text)
        .find(|text| is_label(text) && parse_percentage(text).is_none())
}

/// A `<b>`/`<strong>` sibling, nearest preceding first, e.g.
/// `<li><b>Physics</b> <span>71%</span></li>`.
fn emphasized_sibling(element: ElementRef<'_>) -> Option<String> {
    fn is_emphasis(sibling: &ElementRef<'_>) -> bool {
        matches!(sibling.value().name(), "b" | "strong")
    }

    element
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .filter(is_emphasis)
        .chain(element.next_siblings().filter_map(ElementRef::wrap).filter(is_emphasis))
        .map(collapsed_text)
        .find(|text| is_label(text))
}

/// The first cell of the row when `element` is a later cell of that row.
fn row_header(element: ElementRef<'_>) -> Option<String> {
    if !matches!(element.value().name(), "td" | "th") {
        return None;
    }

    let row = element.parent().and_then(ElementRef::wrap)?;
    let first_cell = row
        .children()
        .filter_map(ElementRef::wrap)
        .find(|child| matches!(child.value().name(), "td" | "th"))?;
    if first_cell.id() == element.id() {
        return None;
    }

    Some(collapsed_text(first_cell)).filter(|text| is_label(text))
}

/// The closest text before `element` in document order that reads like a label.
fn preceding_text(element: ElementRef<'_>) -> Option<String> {
    let mut cursor = Some(*element);

    while let Some(node) = cursor {
        for sibling in node.prev_siblings() {
            let subtree: Vec<_> = sibling.descendants().collect();
            for candidate in subtree.into_iter().rev() {
                let Some(text) = candidate.value().as_text() else {
                    continue;
                };
                let in_script = candidate
                    .parent()
                    .and_then(ElementRef::wrap)
                    .is_some_and(|parent| is_invisible_tag(parent.value().name()));
                if in_script {
                    continue;
                }

                let text = collapse_whitespace(text);
                if is_label(&text) {
                    return Some(text);
                }
            }
        }
        cursor = node.parent();
    }

    None
}

fn is_label(text: &str) -> bool {
    let Some(first) = text.chars().next() else {
        return false;
    };
    !first.is_ascii_digit() && text.chars().any(char::is_alphabetic)
}

fn is_invisible_tag(name: &str) -> bool {
    matches!(name, "script" | "style" | "noscript" | "template")
}

fn visible_text(document: &Html) -> String {
    document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(ElementRef::wrap)
                .is_some_and(|parent| is_invisible_tag(parent.value().name()));
            (!hidden).then(|| collapse_whitespace(text))
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapsed_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

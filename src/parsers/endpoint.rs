use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

/// Attendance report path on the portal family we target, relative to the portal URL.
pub const DEFAULT_ATTENDANCE_PATH: &str =
    "index.php?option=com_base_studentinfo&task=details&schoolid=1&Itemid=324";

const ATTENDANCE_TOKEN: &str = "attendance";

/// Attributes that front-end code commonly uses to stash navigation targets.
const HINT_ATTRIBUTES: [&str; 4] = ["data-href", "data-url", "data-target", "onclick"];

/// Words that make a link worth listing when the report page cannot be found.
const CANDIDATE_TOKENS: [&str; 3] = ["attend", "report", "student"];
const MAX_CANDIDATES: usize = 10;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a, button").expect("link selector is valid"));
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));
static HINT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-href], [data-url], [data-target], [onclick]")
        .expect("hint selector is valid")
});
static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("script selector is valid"));
static QUOTED_ATTENDANCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)["']([^"'\s]*attendance[^"'\s]*)["']"#).expect("quoted regex is valid")
});

/// Which rule produced the attendance URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Configured,
    Link,
    Attribute,
    Script,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub url: String,
    pub source: ResolutionSource,
}

/// Picks the attendance report URL from `html`, else `default_path`.
pub fn resolve(html: &str, base_url: &str, default_path: &str) -> Resolution {
    let document = Html::parse_document(html);

    let found = find_link(&document)
        .map(|target| (target, ResolutionSource::Link))
        .or_else(|| find_attribute_hint(&document).map(|t| (t, ResolutionSource::Attribute)))
        .or_else(|| find_script_hint(&document).map(|t| (t, ResolutionSource::Script)));

    let (target, source) = found.unwrap_or_else(|| (default_path.to_string(), ResolutionSource::Default));

    Resolution {
        url: join_url(base_url, &target),
        source,
    }
}

/// Links on `html` that look related to attendance or reports, absolute and deduplicated.
pub fn candidate_links(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut candidates: Vec<String> = Vec::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href").and_then(usable_target) else {
            continue;
        };
        let haystack = format!("{} {}", element_text(anchor), href).to_lowercase();
        if !CANDIDATE_TOKENS.iter().any(|token| haystack.contains(token)) {
            continue;
        }

        let url = join_url(base_url, href);
        if !candidates.contains(&url) {
            candidates.push(url);
        }
        if candidates.len() == MAX_CANDIDATES {
            break;
        }
    }

    candidates
}

fn find_link(document: &Html) -> Option<String> {
    document.select(&LINK_SELECTOR).find_map(|element| {
        let value = element.value();
        let target = if value.name() == "a" {
            value.attr("href")
        } else {
            value.attr("formaction").or_else(|| value.attr("data-href"))
        };

        let mentions_attendance = contains_token(&element_text(element))
            || target.is_some_and(contains_token);
        if !mentions_attendance {
            return None;
        }

        target.and_then(usable_target).map(str::to_string)
    })
}

fn find_attribute_hint(document: &Html) -> Option<String> {
    document.select(&HINT_SELECTOR).find_map(|element| {
        HINT_ATTRIBUTES.iter().find_map(|name| {
            let value = element.value().attr(name)?;
            if !contains_token(value) {
                return None;
            }
            if *name == "onclick" {
                // onclick="location.href='...attendance...'"
                return QUOTED_ATTENDANCE_REGEX
                    .captures(value)
                    .map(|caps| caps[1].to_string());
            }
            usable_target(value).map(str::to_string)
        })
    })
}

fn find_script_hint(document: &Html) -> Option<String> {
    document.select(&SCRIPT_SELECTOR).find_map(|script| {
        let body = script.text().collect::<String>();
        QUOTED_ATTENDANCE_REGEX
            .captures_iter(&body)
            .map(|caps| caps[1].to_string())
            .find(|candidate| candidate.contains(['/', '.', '?', '=']))
    })
}

fn contains_token(text: &str) -> bool {
    text.to_lowercase().contains(ATTENDANCE_TOKEN)
}

fn usable_target(target: &str) -> Option<&str> {
    let target = target.trim();
    let lowered = target.to_ascii_lowercase();
    if target.is_empty() || target.starts_with('#') || lowered.starts_with("javascript:") {
        None
    } else {
        Some(target)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

/// Resolves `target` against `base_url`, keeping `target` as-is when either does not parse.
pub(crate) fn join_url(base_url: &str, target: &str) -> String {
    Url::parse(base_url)
        .and_then(|base| base.join(target))
        .map(String::from)
        .unwrap_or_else(|_| target.to_string())
}

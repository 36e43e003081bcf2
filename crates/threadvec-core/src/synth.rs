//! Content synthesis: turns one [`Group`] into embeddable text plus a
//! metadata summary.
//!
//! Rendering rules differ per source type, so the entry point dispatches on
//! a closed set of [`Synthesizer`] variants:
//!
//! | Variant | Used for | Subject label | Member header |
//! |---------|----------|---------------|---------------|
//! | `Email` | [`SourceType::Email`] | `Subject:` | `From: … \| To: … \| Cc: … \| Bcc: …`, `Date:` |
//! | `Calendar` | [`SourceType::Calendar`] | `Event:` | `When:`, `Location:`, `Organizer:`, `Attendees:` |
//! | `Generic` | everything else | `Title:` | `Date:` |
//!
//! Bodies go through [`prepare_body`]: HTML is flattened to markdown-like
//! text, quoted replies are cut, and runs of blank lines are collapsed.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use serde_json::{json, Map, Value};

use crate::models::{Group, Item, SourceType};

/// Line placed between consecutive member blocks.
pub const BLOCK_DELIMITER: &str = "---";

const EMAIL_FIELDS: [(&str, &str); 4] = [("from", "From"), ("to", "To"), ("cc", "Cc"), ("bcc", "Bcc")];

static REPLY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:re|fwd|fw)\s*:\s*").expect("valid regex"));
// A closing tag, a void element, or a document marker. A lone `<x ...>` is
// too common in prose ("a<b and c>d") to count as markup.
static HTML_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</[a-z][a-z0-9]*\s*>|<(?:br|hr|img)\b[^<>]*>|<!doctype\s+html|<html[\s>]")
        .expect("valid regex")
});
static ON_WROTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^On\s.*\swrote:\s*$").expect("valid regex"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\n\u{a0}]+").expect("valid regex"));

/// Output of synthesis for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesized {
    pub content: String,
    pub metadata: Value,
}

/// Source-type specific rendering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthesizer {
    Email,
    Calendar,
    Generic,
}

/// Synthesize a group using the variant matching its source type.
pub fn synthesize(group: &Group) -> Synthesized {
    Synthesizer::for_source_type(&group.source_type).synthesize(group)
}

impl Synthesizer {
    pub fn for_source_type(source_type: &SourceType) -> Self {
        match source_type {
            SourceType::Email => Synthesizer::Email,
            SourceType::Calendar => Synthesizer::Calendar,
            SourceType::Document | SourceType::Other(_) => Synthesizer::Generic,
        }
    }

    fn subject_label(self) -> &'static str {
        match self {
            Synthesizer::Email => "Subject",
            Synthesizer::Calendar => "Event",
            Synthesizer::Generic => "Title",
        }
    }

    pub fn synthesize(self, group: &Group) -> Synthesized {
        let subject = if group.subject.is_empty() {
            "(no subject)"
        } else {
            group.subject.as_str()
        };

        let blocks: Vec<String> = group.items.iter().map(|item| self.render_block(item)).collect();
        let separator = format!("\n\n{}\n\n", BLOCK_DELIMITER);
        let content = format!(
            "{}: {}\n\n{}",
            self.subject_label(),
            subject,
            blocks.join(&separator)
        );

        let messages: Vec<Value> = group.items.iter().map(|item| self.member_record(item)).collect();
        let metadata = json!({
            "participants": group.participants.iter().collect::<Vec<_>>(),
            "message_ids": group.items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            "message_count": group.items.len(),
            "date_range": {
                "start": group.start_time.to_rfc3339(),
                "end": group.end_time.to_rfc3339(),
            },
            "messages": messages,
        });

        Synthesized { content, metadata }
    }

    fn render_block(self, item: &Item) -> String {
        let mut lines = self.header_lines(item);
        let body = prepare_body(&item.body);
        if !body.is_empty() {
            lines.push(String::new());
            lines.push(body);
        }
        lines.join("\n")
    }

    fn header_lines(self, item: &Item) -> Vec<String> {
        let mut lines = Vec::new();
        match self {
            Synthesizer::Email => {
                let parts: Vec<String> = EMAIL_FIELDS
                    .iter()
                    .filter_map(|(field, label)| {
                        let addrs = item.addresses(field);
                        (!addrs.is_empty()).then(|| format!("{}: {}", label, addrs.join(", ")))
                    })
                    .collect();
                if !parts.is_empty() {
                    lines.push(parts.join(" | "));
                }
                lines.push(format!("Date: {}", format_date(&item.created_at)));
            }
            Synthesizer::Calendar => {
                let when = match (item.meta_str("start"), item.meta_str("end")) {
                    (Some(start), Some(end)) => format!("{} to {}", start, end),
                    (Some(start), None) => start.to_string(),
                    _ => format_date(&item.created_at),
                };
                lines.push(format!("When: {}", when));
                if let Some(location) = item.meta_str("location") {
                    lines.push(format!("Location: {}", location));
                }
                let organizer = item.addresses("organizer");
                if !organizer.is_empty() {
                    lines.push(format!("Organizer: {}", organizer.join(", ")));
                }
                let attendees = item.addresses("attendees");
                if !attendees.is_empty() {
                    lines.push(format!("Attendees: {}", attendees.join(", ")));
                }
            }
            Synthesizer::Generic => {
                lines.push(format!("Date: {}", format_date(&item.created_at)));
            }
        }
        lines
    }

    fn member_record(self, item: &Item) -> Value {
        let mut record = Map::new();
        record.insert("id".into(), Value::from(item.id.as_str()));
        record.insert("date".into(), Value::from(item.created_at.to_rfc3339()));
        record.insert("subject".into(), Value::from(item.title.as_str()));
        for (field, _) in EMAIL_FIELDS {
            let addrs = item.addresses(field);
            if !addrs.is_empty() {
                record.insert(field.into(), Value::from(addrs.join(", ")));
            }
        }
        if self == Synthesizer::Calendar {
            for key in ["start", "end", "location"] {
                if let Some(v) = item.meta_str(key) {
                    record.insert(key.into(), Value::from(v));
                }
            }
            let organizer = item.addresses("organizer");
            if !organizer.is_empty() {
                record.insert("organizer".into(), Value::from(organizer.join(", ")));
            }
        }
        Value::Object(record)
    }
}

fn format_date(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Strip `Re:`/`Fwd:`/`Fw:` prefixes (any case, repeated) and trim.
pub fn clean_subject(raw: &str) -> String {
    let mut subject = raw.trim().to_string();
    while let Some(m) = REPLY_PREFIX.find(&subject) {
        subject = subject[m.end()..].to_string();
    }
    subject.trim().to_string()
}

/// Normalize a message body for embedding.
pub fn prepare_body(body: &str) -> String {
    let normalized = body.replace("\r\n", "\n");
    let text = if looks_like_html(&normalized) {
        html_to_text(&normalized).unwrap_or(normalized)
    } else {
        normalized
    };
    let stripped = strip_quoted_reply(&text);
    BLANK_RUNS.replace_all(&stripped, "\n\n").trim().to_string()
}

pub fn looks_like_html(text: &str) -> bool {
    HTML_TAG.is_match(text)
}

/// Cut the body at the first quoted line (`>`) or `On … wrote:` attribution.
pub fn strip_quoted_reply(text: &str) -> String {
    let mut kept = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('>') || ON_WROTE.is_match(trimmed.trim_end()) {
            break;
        }
        kept.push(line.trim_end());
    }
    kept.join("\n")
}

/// Flatten HTML into markdown-like plain text.
///
/// Returns `None` when the markup yields no text, so callers can fall back
/// to the raw body.
pub fn html_to_text(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    render_element(fragment.root_element(), &mut out);

    let lines: Vec<&str> = out.lines().map(str::trim).collect();
    let text = BLANK_RUNS.replace_all(&lines.join("\n"), "\n\n").trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn render_element(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = SPACE_RUNS.replace_all(text, " ");
                if collapsed.trim().is_empty() {
                    if !out.ends_with(char::is_whitespace) && !out.is_empty() {
                        out.push(' ');
                    }
                } else {
                    out.push_str(&collapsed);
                }
            }
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    render_tag(el, out);
                }
            }
            _ => {}
        }
    }
}

fn render_tag(el: ElementRef<'_>, out: &mut String) {
    let name = el.value().name();
    match name {
        "script" | "style" | "head" | "title" | "meta" | "link" => {}
        "br" => out.push('\n'),
        "hr" => out.push_str("\n\n---\n\n"),
        "p" | "div" | "section" | "article" | "header" | "footer" | "table" | "ul" | "ol"
        | "pre" | "tr" => {
            out.push('\n');
            render_element(el, out);
            out.push('\n');
        }
        "li" => {
            out.push_str("\n- ");
            render_element(el, out);
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            out.push_str("\n\n");
            out.push_str(&"#".repeat(level));
            out.push(' ');
            render_element(el, out);
            out.push_str("\n\n");
        }
        "blockquote" => {
            let mut inner = String::new();
            render_element(el, &mut inner);
            out.push('\n');
            for line in inner.trim().lines() {
                out.push_str("> ");
                out.push_str(line.trim());
                out.push('\n');
            }
        }
        "a" => {
            let mut inner = String::new();
            render_element(el, &mut inner);
            let text = inner.trim();
            match el.value().attr("href").map(str::trim) {
                Some(href) if !href.is_empty() && href != text && !href.starts_with('#') => {
                    if text.is_empty() {
                        out.push_str(href);
                    } else {
                        out.push_str(&format!("{} ({})", text, href));
                    }
                }
                _ => out.push_str(text),
            }
        }
        "td" | "th" => {
            render_element(el, out);
            out.push(' ');
        }
        "strong" | "b" => {
            out.push_str("**");
            render_element(el, out);
            out.push_str("**");
        }
        "em" | "i" => {
            out.push('_');
            render_element(el, out);
            out.push('_');
        }
        _ => render_element(el, out),
    }
}

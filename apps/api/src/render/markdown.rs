//! Line-oriented renderer for the small markdown subset the assistant emits:
//! `#`/`##`/`###` headings, `*`/`-`/`•` bullets and `**bold**` spans.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum InlineSpan {
    Plain(String),
    Bold(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderNode {
    Heading { level: u8, spans: Vec<InlineSpan> },
    BulletList { items: Vec<Vec<InlineSpan>> },
    Paragraph { spans: Vec<InlineSpan> },
}

const BULLET_MARKERS: [&str; 3] = ["* ", "- ", "• "];

// Longest marker first so "### " is never read as "# ".
const HEADING_MARKERS: [(&str, u8); 3] = [("### ", 3), ("## ", 2), ("# ", 1)];

fn bold_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern is valid"))
}

pub fn render_markdown(text: &str) -> Vec<RenderNode> {
    let mut nodes = Vec::new();
    let mut pending: Vec<Vec<InlineSpan>> = Vec::new();

    for line in text.split('\n') {
        let trimmed = line.trim();

        if let Some(item) = BULLET_MARKERS.iter().find_map(|m| trimmed.strip_prefix(m)) {
            pending.push(parse_inline(item));
            continue;
        }

        flush_list(&mut nodes, &mut pending);

        if let Some((rest, level)) = HEADING_MARKERS
            .iter()
            .find_map(|(marker, level)| trimmed.strip_prefix(marker).map(|rest| (rest, *level)))
        {
            nodes.push(RenderNode::Heading {
                level,
                spans: parse_inline(rest),
            });
        } else if !trimmed.is_empty() {
            nodes.push(RenderNode::Paragraph {
                spans: parse_inline(line),
            });
        }
    }

    flush_list(&mut nodes, &mut pending);
    nodes
}

fn flush_list(nodes: &mut Vec<RenderNode>, pending: &mut Vec<Vec<InlineSpan>>) {
    if !pending.is_empty() {
        nodes.push(RenderNode::BulletList {
            items: std::mem::take(pending),
        });
    }
}

/// Splits a line into plain and bold spans. Zero-length segments are dropped.
pub fn parse_inline(line: &str) -> Vec<InlineSpan> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    for caps in bold_pattern().captures_iter(line) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > cursor {
            spans.push(InlineSpan::Plain(line[cursor..whole.start()].to_string()));
        }
        if !inner.as_str().is_empty() {
            spans.push(InlineSpan::Bold(inner.as_str().to_string()));
        }
        cursor = whole.end();
    }

    if cursor < line.len() {
        spans.push(InlineSpan::Plain(line[cursor..].to_string()));
    }
    spans
}

//! Pull a JSON document out of free-form agent output.
//!
//! Extraction never fails: when no structure is found the trimmed raw text is
//! returned and schema validation reports the problem downstream.

use std::sync::LazyLock;

use regex::Regex;

/// Which heuristic produced the extracted text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionStrategy {
    FileRead,
    JsonBlock,
    AnyBlock,
    JsonBraces,
    RawText,
}

impl ExtractionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionStrategy::FileRead => "file_read",
            ExtractionStrategy::JsonBlock => "json_block",
            ExtractionStrategy::AnyBlock => "any_block",
            ExtractionStrategy::JsonBraces => "json_braces",
            ExtractionStrategy::RawText => "raw_text",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extraction {
    pub json: String,
    pub strategy: ExtractionStrategy,
    /// Output described writing a file instead of printing the document.
    pub tool_call_detected: bool,
}

static TOOL_CALL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\|\s*(?:Write|Edit)\b").expect("tool call regex")
});
static TOOL_CALL_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Wrote|Created|Updated) file:").expect("tool call phrase regex")
});
static JSON_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?i:json)[ \t]*\r?\n(.*?)```").expect("json block regex")
});
static ANY_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[^\n`]*\r?\n(.*?)```").expect("fenced block regex")
});

/// Whether the agent reported writing or editing a file through a tool.
pub fn detect_tool_calls(text: &str) -> bool {
    TOOL_CALL_LINE.is_match(text) || TOOL_CALL_PHRASE.is_match(text)
}

/// Text-only extraction. File reads are layered on top by the I/O adapter.
pub fn extract_from_text(text: &str) -> Extraction {
    let tool_call_detected = detect_tool_calls(text);
    let (json, strategy) = if let Some(body) = first_capture(&JSON_BLOCK, text) {
        (body, ExtractionStrategy::JsonBlock)
    } else if let Some(body) = first_capture(&ANY_BLOCK, text) {
        (body, ExtractionStrategy::AnyBlock)
    } else if let Some(span) = largest_brace_span(text) {
        (span.to_string(), ExtractionStrategy::JsonBraces)
    } else {
        (text.trim().to_string(), ExtractionStrategy::RawText)
    };
    Extraction {
        json,
        strategy,
        tool_call_detected,
    }
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
        .filter(|body| !body.is_empty())
}

/// Longest balanced `{ ... }` region, ignoring braces inside JSON strings.
///
/// Single pass over the text; unmatched braces never trigger a rescan.
fn largest_brace_span(text: &str) -> Option<&str> {
    let mut best: Option<(usize, usize)> = None;
    let mut opens: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (index, byte) in text.bytes().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' if !opens.is_empty() => in_string = true,
            b'{' => opens.push(index),
            b'}' => {
                if let Some(open) = opens.pop()
                    && best.is_none_or(|(s, e)| index - open > e - s)
                {
                    best = Some((open, index));
                }
            }
            _ => {}
        }
    }
    best.map(|(s, e)| &text[s..=e])
}

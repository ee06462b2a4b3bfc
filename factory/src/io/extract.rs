//! Agent output extraction with the tool-call file fallback.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::core::extract::{Extraction, ExtractionStrategy, extract_from_text};

/// Extract plan JSON from agent output.
///
/// Agents that write the plan with a file tool often print only a summary of
/// the write. When such phrasing is detected and `canonical` exists, the file
/// contents take priority over anything in the text.
pub fn extract_json(text: &str, canonical: Option<&Path>) -> Extraction {
    let extraction = extract_from_text(text);
    if extraction.tool_call_detected
        && let Some(path) = canonical
        && path.exists()
    {
        match fs::read_to_string(path) {
            Ok(contents) => {
                debug!(path = %path.display(), "tool call detected, using file contents");
                return Extraction {
                    json: contents.trim().to_string(),
                    strategy: ExtractionStrategy::FileRead,
                    tool_call_detected: true,
                };
            }
            Err(err) => {
                warn!(err = %err, path = %path.display(), "tool call detected but file unreadable");
            }
        }
    }
    extraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_with_existing_file_reads_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("prd.json");
        fs::write(&path, "{\"from\": \"file\"}\n").expect("write");

        let extraction = extract_json("Wrote file: prd.json\n```json\n{}\n```", Some(&path));
        assert_eq!(extraction.strategy, ExtractionStrategy::FileRead);
        assert_eq!(extraction.json, "{\"from\": \"file\"}");
    }

    #[test]
    fn tool_call_without_file_falls_back_to_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("prd.json");

        let extraction = extract_json("Wrote file: prd.json\n{\"a\": 1}", Some(&path));
        assert_eq!(extraction.strategy, ExtractionStrategy::JsonBraces);
        assert!(extraction.tool_call_detected);
    }

    #[test]
    fn no_tool_call_ignores_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("prd.json");
        fs::write(&path, "{}").expect("write");

        let extraction = extract_json("```json\n{\"a\": 1}\n```", Some(&path));
        assert_eq!(extraction.strategy, ExtractionStrategy::JsonBlock);
    }
}

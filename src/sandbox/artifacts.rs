use std::sync::OnceLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use regex::Regex;

/// Opening marker printed by the instrumentation preamble
pub const SENTINEL_OPEN: &str = "<PLOT_DATA:";
/// Closing marker printed by the instrumentation preamble
pub const SENTINEL_CLOSE: &str = ":PLOT_DATA>";

/// Sentinel grammar: `<PLOT_DATA:` + standard base64 + `:PLOT_DATA>`, plus
/// at most one newline. The payload alphabet has no `:` so a match can never
/// run past its own closing marker.
static SENTINEL_RE: OnceLock<Regex> = OnceLock::new();

fn sentinel_regex() -> &'static Regex {
    SENTINEL_RE.get_or_init(|| {
        Regex::new(r"<PLOT_DATA:([A-Za-z0-9+/]+={0,2}):PLOT_DATA>(\r?\n)?").expect("sentinel regex")
    })
}

/// One image found in a captured output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Position among the artifacts of the same stream, starting at 0
    pub index: usize,
    /// Base64-encoded PNG data, exactly as printed
    pub payload: String,
}

impl Artifact {
    /// Inline HTML image referencing the payload
    pub fn to_markup(&self) -> String {
        format!(
            "<img src=\"data:image/png;base64,{}\" style=\"max-width: 100%; height: auto; margin: 10px 0;\" />",
            self.payload
        )
    }
}

/// Output stream with sentinels replaced by trailing image markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedOutput {
    pub output: String,
    pub artifact_count: usize,
}

/// Splits `raw` into plain text and the artifacts embedded in it.
///
/// Every well-formed sentinel (and one newline right after it) is cut out of
/// the text. Occurrences whose payload is not valid base64 stay in the text
/// untouched.
pub fn scan(raw: &str) -> (String, Vec<Artifact>) {
    let mut text = String::with_capacity(raw.len());
    let mut artifacts = Vec::new();
    let mut last_end = 0;

    for caps in sentinel_regex().captures_iter(raw) {
        let (Some(whole), Some(payload)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if BASE64_ENGINE.decode(payload.as_str()).is_err() {
            continue;
        }

        text.push_str(&raw[last_end..whole.start()]);
        last_end = whole.end();
        artifacts.push(Artifact {
            index: artifacts.len(),
            payload: payload.as_str().to_owned(),
        });
    }
    text.push_str(&raw[last_end..]);

    (text, artifacts)
}

/// Removes sentinel blobs from `raw` and appends one image reference per
/// blob, in stream order, to the end of the remaining text.
pub fn extract(raw: &str) -> ExtractedOutput {
    let (mut output, artifacts) = scan(raw);
    for artifact in &artifacts {
        output.push('\n');
        output.push_str(&artifact.to_markup());
    }

    ExtractedOutput {
        output,
        artifact_count: artifacts.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sentinel(payload: &str) -> String {
        format!("{SENTINEL_OPEN}{payload}{SENTINEL_CLOSE}")
    }

    #[test]
    fn test_plain_text_is_untouched() {
        let raw = "hello\nworld\n";
        let extracted = extract(raw);
        assert_eq!(extracted.output, raw);
        assert_eq!(extracted.artifact_count, 0);
    }

    #[test]
    fn test_single_plot_is_moved_to_the_end() {
        let raw = format!("before\n{}\nafter\n", sentinel("aGVsbG8="));
        let extracted = extract(&raw);

        assert_eq!(extracted.artifact_count, 1);
        assert_eq!(
            extracted.output,
            "before\nafter\n\n<img src=\"data:image/png;base64,aGVsbG8=\" style=\"max-width: 100%; height: auto; margin: 10px 0;\" />"
        );
        assert!(!extracted.output.contains(SENTINEL_OPEN));
        assert!(!extracted.output.contains(SENTINEL_CLOSE));
    }

    #[test]
    fn test_multiple_plots_keep_stream_order() {
        let raw = format!("{}\nx\n{}\n", sentinel("Zmlyc3Q="), sentinel("c2Vjb25k"));
        let (text, artifacts) = scan(&raw);

        assert_eq!(text, "x\n");
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].payload, "Zmlyc3Q=");
        assert_eq!(artifacts[1].payload, "c2Vjb25k");
        assert_eq!(artifacts[1].index, 1);

        let extracted = extract(&raw);
        let first = extracted.output.find("Zmlyc3Q=").unwrap();
        let second = extracted.output.find("c2Vjb25k").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_only_one_trailing_newline_is_removed() {
        let raw = format!("{}\n\nend", sentinel("AAAA"));
        let (text, _) = scan(&raw);
        assert_eq!(text, "\nend");
    }

    #[test]
    fn test_adjacent_sentinels_are_separate_blobs() {
        let raw = format!("{}{}", sentinel("AAAA"), sentinel("BBBB"));
        let (text, artifacts) = scan(&raw);
        assert_eq!(text, "");
        assert_eq!(artifacts.len(), 2);
    }

    #[test]
    fn test_malformed_sentinels_are_left_alone() {
        let raw = [
            "<PLOT_DATA::PLOT_DATA>",
            "<PLOT_DATA:has space:PLOT_DATA>",
            "<PLOT_DATA:a:b:PLOT_DATA>",
            "<PLOT_DATA:AAA:PLOT_DATA>",
            "<PLOT_DATA:AAAA",
            "PLOT_DATA:AAAA:PLOT_DATA>",
        ]
        .join("\n");

        let extracted = extract(&raw);
        assert_eq!(extracted.output, raw);
        assert_eq!(extracted.artifact_count, 0);
    }

    #[test]
    fn test_extraction_is_idempotent_on_clean_text() {
        let raw = format!("a\n{}\nb\n{}\n", sentinel("aGk="), sentinel("eW8="));
        let once = extract(&raw).output;
        let twice = extract(&once);
        assert_eq!(twice.output, once);
        assert_eq!(twice.artifact_count, 0);
    }
}

use crate::pipeline::request::RenderRequest;
use std::fmt::Write as _;

/// Marker prefixing error lines in the typesetting tool's log.
const LOG_ERROR_MARKER: char = '!';

/// Synthesize the complete source document for one request.
///
/// Layout: header lines verbatim and in order, then the document wrapper
/// with a forced neutral foreground color so callers can recolor the
/// resulting geometry afterward, then the expression body.
pub fn synthesize_source(request: &RenderRequest) -> String {
    let mut out = String::new();
    for line in request.headers() {
        out.push_str(line);
        out.push('\n');
    }
    let _ = write!(
        out,
        "\\begin{{document}}\n\\color{{white}}\n{}\n\\end{{document}}\n",
        request.source()
    );
    out
}

/// Extract a concise diagnostic from the typesetting tool's log.
///
/// Returns the `!`-prefixed error lines joined by newlines, or `None` when
/// the log carries no recognizable errors (callers fall back to raw stderr).
pub fn parse_typeset_log(log: &str) -> Option<String> {
    let lines: Vec<&str> = log
        .lines()
        .filter(|l| l.starts_with(LOG_ERROR_MARKER))
        .map(str::trim_end)
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}

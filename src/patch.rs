use crate::span::SourceSpan;

/// Apply a single textual replacement to `code` based on `span`.
///
/// The `span` offsets are byte indices into `code`.
pub fn apply_span_patch(code: &str, span: SourceSpan, replacement: &str) -> String {
    debug_assert!(
        span.start <= span.end && span.end <= code.len(),
        "span [{}, {}) is out of bounds for code length {}",
        span.start,
        span.end,
        code.len()
    );

    let mut out = String::with_capacity(
        code.len() + replacement.len().saturating_sub(span.end.saturating_sub(span.start)),
    );

    out.push_str(&code[..span.start]);
    out.push_str(replacement);
    out.push_str(&code[span.end..]);

    out
}

/// Apply a replacement and, in debug builds, verify that the original slice matches `expected_original`.
///
/// Useful together with registered mutations, where the span is expected to
/// cover a specific statement.
pub fn apply_checked_patch(
    code: &str,
    span: SourceSpan,
    expected_original: &str,
    replacement: &str,
) -> String {
    debug_assert_eq!(
        &code[span.start..span.end],
        expected_original,
        "span [{}, {}) does not match expected original snippet",
        span.start,
        span.end,
    );

    apply_span_patch(code, span, replacement)
}

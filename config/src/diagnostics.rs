use miette::SourceSpan;

/// Short message and source location for a JSON5 error.
pub fn json5_error_span(source: &str, err: &json5::Error) -> (String, SourceSpan) {
    let json5::Error::Message { msg, location } = err;
    let span = match location {
        Some(location) => span_for_line_col(source, location.line, location.column),
        None => (source.len(), 0).into(),
    };
    (summarize_json5_error(msg), span)
}

// Parse errors carry a rendered code frame; its `= ...` line is the message.
fn summarize_json5_error(msg: &str) -> String {
    msg.lines()
        .find_map(|line| line.trim_start().strip_prefix("= "))
        .unwrap_or(msg)
        .trim()
        .to_string()
}

/// One-based line and column (in chars) to a byte span over that char.
fn span_for_line_col(source: &str, line: usize, column: usize) -> SourceSpan {
    if line == 0 || column == 0 {
        return (0usize, 0usize).into();
    }

    let mut line_start = 0usize;
    for _ in 1..line {
        match source[line_start..].find('\n') {
            Some(end) => line_start += end + 1,
            None => return (source.len(), 0).into(),
        }
    }

    let line_text = source[line_start..]
        .split('\n')
        .next()
        .unwrap_or_default();
    match line_text.char_indices().nth(column - 1) {
        Some((offset, c)) => (line_start + offset, c.len_utf8()).into(),
        None => (line_start + line_text.len(), 0).into(),
    }
}

use tracing::Level;

/// Shorten page text quoted in wait/timeout messages.
pub fn truncate_observed(text: &str) -> String {
    truncate_impl(text, 4, 200)
}

/// Shorten a console transcript before it goes into a log line.
pub fn truncate_transcript(log: &str) -> String {
    let (max_lines, max_chars) = if tracing::enabled!(Level::TRACE) {
        (2000, 100_000)
    } else if tracing::enabled!(Level::DEBUG) {
        (200, 15_000)
    } else {
        (20, 2_000)
    };
    truncate_impl(log, max_lines, max_chars)
}

fn truncate_impl(log: &str, max_lines: usize, max_chars: usize) -> String {
    let lines: Vec<&str> = log.lines().collect();

    let truncated_str = if lines.len() <= max_lines {
        log.to_string()
    } else {
        let keep_head = max_lines / 2;
        let keep_tail = max_lines - keep_head;
        let head = lines[0..keep_head].join("\n");
        let tail = lines[lines.len() - keep_tail..].join("\n");
        format!(
            "{}\n[... {} lines omitted ...]\n{}",
            head,
            lines.len() - max_lines,
            tail
        )
    };

    let char_count = truncated_str.chars().count();
    if char_count <= max_chars {
        truncated_str
    } else {
        let keep = max_chars / 2;
        let head: String = truncated_str.chars().take(keep).collect();
        let tail: String = truncated_str.chars().skip(char_count - keep).collect();
        format!(
            "{}[... {} characters omitted ...]{}",
            head,
            char_count - max_chars,
            tail
        )
    }
}

/// Filesystem-safe form of a scenario or artifact name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}

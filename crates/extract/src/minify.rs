pub const TRUNCATION_MARKER: &str = "\n[... truncated ...]\n";

/// Share of the character budget kept from the start of the text.
const HEAD_SHARE: f64 = 0.7;

/// Shrink text before it goes into a prompt.
///
/// Lines are trimmed, runs of spaces/tabs collapse to one space and runs of
/// blank lines collapse to one. If the result is still longer than
/// `max_chars`, the head and tail are kept around [`TRUNCATION_MARKER`].
pub fn minify(text: &str, max_chars: usize) -> String {
    let compressed = compress_whitespace(text);
    truncate_middle(&compressed, max_chars)
}

fn compress_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = false;

    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            blank_run = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run {
                out.push('\n');
            }
        }
        blank_run = false;
        out.push_str(&words.join(" "));
    }

    out
}

fn truncate_middle(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        // No room for the marker.
        return text.chars().take(max_chars).collect();
    }

    let budget = max_chars - marker_len;
    let head_len = (budget as f64 * HEAD_SHARE).floor() as usize;
    let tail_len = budget - head_len;

    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().skip(total - tail_len).collect();

    format!("{}{}{}", head, TRUNCATION_MARKER, tail)
}

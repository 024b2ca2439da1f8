//! Defensive cleanup of structured LLM output.
//!
//! Models wrap JSON in markdown fences, use single quotes, and leave
//! trailing commas. Every structured call scrubs the raw completion through
//! these helpers before parsing; a parse failure downstream is "no signal",
//! never a crash.

/// Strip markdown code fences, swap single quotes for double quotes, and
/// drop trailing commas before a closing brace or bracket.
pub fn clean_json_response(raw: &str) -> String {
    let mut text: String = raw
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !t.starts_with("```")
        })
        .collect::<Vec<_>>()
        .join("\n");

    text = text.trim().replace('\'', "\"");
    strip_trailing_commas(&text)
}

/// Extract the first top-level JSON object from surrounding prose.
/// Returns the `{ ... }` slice between the first `{` and last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Extract the first top-level JSON array from surrounding prose.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Remove commas that are followed only by whitespace and a `}` or `]`.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                continue;
            }
        }
        out.push(c);
    }
    out
}

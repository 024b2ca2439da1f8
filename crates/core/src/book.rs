//! Recursive book-text splitter.
//!
//! Thin pass-through feeding the vector store at upload time: splits on the
//! most structural separator available, merges pieces into chunks up to the
//! size limit, and seeds each new chunk with the tail of the previous one.

/// Separators tried in order, most structural first.
const SEPARATORS: &[&str] = &["\n\nChapter ", "\n\nSection ", "\n\n", "\n", ".", " "];

/// Split `text` into chunks of at most `chunk_size` characters with
/// roughly `overlap` characters of carry-over between adjacent chunks.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    split_recursive(text, SEPARATORS, chunk_size, &mut pieces);
    merge_pieces(&pieces, chunk_size, overlap)
}

fn split_recursive<'a>(
    text: &'a str,
    separators: &[&str],
    chunk_size: usize,
    out: &mut Vec<&'a str>,
) {
    if text.trim().is_empty() {
        return;
    }
    if text.chars().count() <= chunk_size || separators.is_empty() {
        out.push(text);
        return;
    }

    let sep = separators[0];
    let rest = &separators[1..];
    if !text.contains(sep) {
        split_recursive(text, rest, chunk_size, out);
        return;
    }
    for part in text.split(sep) {
        split_recursive(part, rest, chunk_size, out);
    }
}

fn merge_pieces(pieces: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let would_be = current.chars().count() + piece.chars().count() + 1;
        if !current.is_empty() && would_be > chunk_size {
            chunks.push(current.trim().to_string());
            current = tail_chars(&current, overlap);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(piece);
    }

    let last = current.trim();
    if !last.is_empty() {
        chunks.push(last.to_string());
    }
    chunks
}

/// Last `n` characters of `s`, starting on a char boundary.
fn tail_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    if count <= n {
        return s.to_string();
    }
    s.chars().skip(count - n).collect()
}

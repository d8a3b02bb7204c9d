/*!
 * Splitting documents into request-sized chunks.
 *
 * Chunks are built from whole lines: a line is never split, so a single
 * line longer than the limit becomes a chunk of its own. Blank lines at
 * chunk edges are dropped and restored as the `"\n\n"` separator on merge.
 */

/// Default upper bound on characters per translation request
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 8000;

/// Separator placed between translated chunks
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Split `content` into chunks of at most `max_chars` characters where possible
///
/// Each line costs its character count plus one for the newline. A chunk is
/// closed when the next line would push it over the limit and the chunk
/// already holds non-whitespace text.
pub fn chunk_content(content: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0usize;

    for line in content.split('\n') {
        let line_size = line.chars().count() + 1;
        if current_size + line_size > max_chars && has_text(&current) {
            push_chunk(&mut chunks, &current);
            current.clear();
            current_size = 0;
        }
        current.push(line);
        current_size += line_size;
    }
    push_chunk(&mut chunks, &current);

    chunks
}

/// Join translated chunks back into one document
pub fn merge_chunks(chunks: &[String]) -> String {
    chunks.join(CHUNK_SEPARATOR)
}

fn has_text(lines: &[&str]) -> bool {
    lines.iter().any(|line| !line.trim().is_empty())
}

fn push_chunk(chunks: &mut Vec<String>, lines: &[&str]) {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    if let (Some(start), Some(end)) = (start, end) {
        chunks.push(lines[start..=end].join("\n"));
    }
}

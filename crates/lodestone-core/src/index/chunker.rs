//! Markdown chunking
//!
//! Header-aware: the input splits into sections at headings of any
//! level, each chunk carrying the nearest heading as its section
//! title. Oversized sections subdivide at paragraph boundaries where
//! possible, falling back to character boundaries. Output is
//! deterministic for identical inputs.

/// Chunk of markdown with optional section title
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub section_title: Option<String>,
}

/// Split markdown into overlapping, header-aware chunks.
///
/// Section text is kept verbatim (including the heading line), so
/// concatenating chunks minus their overlap reproduces the input.
pub fn chunk_markdown(markdown: &str, chunk_size_chars: usize, chunk_overlap_chars: usize) -> Vec<Chunk> {
    let size = chunk_size_chars.max(1);
    let overlap = chunk_overlap_chars.min(size.saturating_sub(1));

    let mut chunks = Vec::new();
    for section in split_sections(markdown) {
        for text in split_with_overlap(&section.text, size, overlap) {
            if text.trim().is_empty() {
                continue;
            }
            chunks.push(Chunk {
                text,
                section_title: section.title.clone(),
            });
        }
    }
    chunks
}

struct Section {
    title: Option<String>,
    text: String,
}

/// Heading line: up to three leading spaces, 1-6 hashes, a space, text
fn heading_title(line: &str) -> Option<&str> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let hashes = trimmed.bytes().take_while(|b| *b == b'#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &trimmed[hashes..];
    rest.strip_prefix(' ').map(str::trim)
}

/// Split at heading lines, keeping the heading line inside its section
fn split_sections(markdown: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current_lines: Vec<&str> = Vec::new();
    let mut saw_heading = false;

    for line in markdown.split('\n') {
        if let Some(title) = heading_title(line) {
            if saw_heading || !current_lines.is_empty() {
                sections.push(Section {
                    title: current_title.take(),
                    text: current_lines.join("\n"),
                });
            }
            current_title = Some(title.to_string());
            current_lines = vec![line];
            saw_heading = true;
        } else {
            current_lines.push(line);
        }
    }
    sections.push(Section {
        title: current_title,
        text: current_lines.join("\n"),
    });
    sections
}

/// Find a valid char boundary at or before the given byte index
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find a valid char boundary at or after the given byte index
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Walk a section with a sliding window, preferring paragraph breaks
fn split_with_overlap(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let raw_end = (start + chunk_size).min(text.len());
        let end = floor_char_boundary(text, raw_end);
        let mut chunk_end = end;

        // Prefer a natural break in the last 30% of the window
        if end < text.len() {
            let search_start_raw = start + (chunk_size * 70 / 100);
            let search_start = ceil_char_boundary(text, search_start_raw);

            if search_start < end {
                let search_region = &text[search_start..end];

                if let Some(pos) = search_region.rfind("\n\n") {
                    chunk_end = search_start + pos + 2;
                } else if let Some(pos) = search_region.rfind(". ") {
                    chunk_end = search_start + pos + 2;
                } else if let Some(pos) = search_region.rfind('\n') {
                    chunk_end = search_start + pos + 1;
                } else if let Some(pos) = search_region.rfind(' ') {
                    chunk_end = search_start + pos + 1;
                }
            }
        }

        chunk_end = floor_char_boundary(text, chunk_end);
        if chunk_end <= start {
            chunk_end = end.max(ceil_char_boundary(text, start + 1));
        }

        chunks.push(text[start..chunk_end].to_string());

        if chunk_end >= text.len() {
            break;
        }

        let next_start = ceil_char_boundary(text, chunk_end.saturating_sub(overlap));
        // Guarantee forward progress even when overlap ~ chunk size
        start = if next_start > start { next_start } else { chunk_end };
    }

    chunks
}

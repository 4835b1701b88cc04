//! Markdown-aware text chunker (spec §4.C).
//!
//! Splits document text into [`ChunkPiece`]s bounded in size, retaining
//! enough section context (an H3 heading, when one applies) to be useful in
//! isolation. `markdown-h3` is the preferred strategy for the ingestion
//! pipeline; `character`, `paragraph`, and `token` remain as fallbacks for
//! unstructured input.

/// Approximate characters-per-token ratio used by the `token` strategy.
const CHARS_PER_TOKEN: usize = 4;

/// Default chunk size target: ~1,000 tokens, ~4,000 characters.
pub const DEFAULT_MAX_CHARS: usize = 4_000;

#[derive(Debug, Clone)]
pub enum ChunkStrategy {
    MarkdownH3 { max_chars: usize },
    Character { chunk_size: usize, overlap: usize },
    Paragraph { min_length: usize, max_length: usize },
    Token { max_tokens: usize },
}

impl Default for ChunkStrategy {
    fn default() -> Self {
        ChunkStrategy::MarkdownH3 { max_chars: DEFAULT_MAX_CHARS }
    }
}

/// One chunk of text produced by [`chunk`], before embedding or persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPiece {
    pub text: String,
    pub ordinal: usize,
    pub section_path: Option<String>,
}

pub fn chunk(text: &str, strategy: &ChunkStrategy) -> Vec<ChunkPiece> {
    match strategy {
        ChunkStrategy::MarkdownH3 { max_chars } => chunk_markdown_h3(text, *max_chars),
        ChunkStrategy::Character { chunk_size, overlap } => chunk_character(text, *chunk_size, *overlap),
        ChunkStrategy::Paragraph { min_length, max_length } => chunk_paragraph(text, *min_length, *max_length),
        ChunkStrategy::Token { max_tokens } => chunk_character(text, max_tokens * CHARS_PER_TOKEN, 0),
    }
}

/// Split text into H3-delimited sections; sections over `max_chars` are
/// subdivided by paragraph with the heading prepended to each sub-chunk.
fn chunk_markdown_h3(text: &str, max_chars: usize) -> Vec<ChunkPiece> {
    let sections = split_h3_sections(text);
    let mut pieces = Vec::new();
    let mut ordinal = 0;

    for (heading, body) in sections {
        let full = match &heading {
            Some(h) => format!("{h}\n{}", body.trim()),
            None => body.trim().to_string(),
        };
        if full.is_empty() {
            continue;
        }
        if full.len() <= max_chars {
            pieces.push(ChunkPiece { text: full, ordinal, section_path: heading.clone() });
            ordinal += 1;
        } else {
            for sub in paragraph_groups(&body, 0, max_chars.saturating_sub(heading.as_ref().map(|h| h.len() + 1).unwrap_or(0))) {
                let prefixed = match &heading {
                    Some(h) => format!("{h}\n{sub}"),
                    None => sub,
                };
                pieces.push(ChunkPiece { text: prefixed, ordinal, section_path: heading.clone() });
                ordinal += 1;
            }
        }
    }

    if pieces.is_empty() {
        pieces.push(ChunkPiece { text: text.trim().to_string(), ordinal: 0, section_path: None });
    }
    pieces
}

/// Splits `text` into `(heading_line, body)` pairs at `### ` boundaries. Any
/// content before the first heading is returned with `heading = None`.
fn split_h3_sections(text: &str) -> Vec<(Option<String>, String)> {
    let mut sections: Vec<(Option<String>, String)> = Vec::new();
    let mut current_heading: Option<String> = None;
    let mut current_body = String::new();

    for line in text.lines() {
        if let Some(title) = line.strip_prefix("### ") {
            if current_heading.is_some() || !current_body.trim().is_empty() {
                sections.push((current_heading.take(), std::mem::take(&mut current_body)));
            }
            current_heading = Some(format!("### {}", title.trim()));
        } else {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    if current_heading.is_some() || !current_body.trim().is_empty() {
        sections.push((current_heading, current_body));
    }
    sections
}

/// Splits blank-line-delimited paragraphs into reserved-size chunks,
/// keeping an atomic fenced code block with the chunk that precedes it
/// instead of ever splitting it, per §4.C's size policy.
fn paragraph_groups(text: &str, min_length: usize, max_length: usize) -> Vec<String> {
    let max_length = max_length.max(1);
    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    let mut groups = Vec::new();
    let mut buf = String::new();

    for para in paragraphs {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() { trimmed.len() } else { buf.len() + 2 + trimmed.len() };
        let is_code_block = is_fenced_code_block(trimmed);

        if would_be > max_length && buf.len() >= min_length && !buf.is_empty() && !is_code_block {
            groups.push(std::mem::take(&mut buf));
        }

        if trimmed.len() > max_length && !is_code_block {
            if !buf.is_empty() {
                groups.push(std::mem::take(&mut buf));
            }
            groups.extend(hard_split(trimmed, max_length));
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(trimmed);
    }

    if !buf.is_empty() {
        groups.push(buf);
    }
    if groups.is_empty() {
        groups.push(text.trim().to_string());
    }
    groups
}

fn is_fenced_code_block(paragraph: &str) -> bool {
    paragraph.starts_with("```") && paragraph.trim_end().ends_with("```") && paragraph.trim_end().len() > 3
}

fn chunk_paragraph(text: &str, min_length: usize, max_length: usize) -> Vec<ChunkPiece> {
    paragraph_groups(text, min_length, max_length)
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| ChunkPiece { text, ordinal, section_path: None })
        .collect()
}

/// Sliding window over `text` of `chunk_size` characters with `overlap`
/// characters shared between consecutive windows.
fn chunk_character(text: &str, chunk_size: usize, overlap: usize) -> Vec<ChunkPiece> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size.saturating_sub(1));
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![ChunkPiece { text: String::new(), ordinal: 0, section_path: None }];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut ordinal = 0usize;
    let step = chunk_size - overlap;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let text: String = chars[start..end].iter().collect();
        pieces.push(ChunkPiece { text, ordinal, section_path: None });
        ordinal += 1;
        if end == chars.len() {
            break;
        }
        start += step.max(1);
    }
    pieces
}

/// Hard-splits an oversized paragraph at the nearest newline/space boundary
/// before `max_length`, falling back to a raw character cut.
fn hard_split(text: &str, max_length: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = snap_to_char_boundary(remaining, remaining.len().min(max_length));
        let split_at = if split_at == 0 { next_char_boundary(remaining) } else { split_at };
        let actual = if split_at < remaining.len() {
            remaining[..split_at]
                .rfind('\n')
                .or_else(|| remaining[..split_at].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(split_at)
        } else {
            split_at
        };
        let actual = snap_to_char_boundary(remaining, actual);
        let actual = if actual == 0 { next_char_boundary(remaining) } else { actual };
        let piece = remaining[..actual].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = &remaining[actual..];
    }
    pieces
}

fn next_char_boundary(s: &str) -> usize {
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}

fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_h3_splits_on_headings() {
        let text = "### useState\nAdds state.\n### useEffect\nRuns effects.";
        let pieces = chunk(text, &ChunkStrategy::MarkdownH3 { max_chars: 4_000 });
        assert_eq!(pieces.len(), 2);
        assert!(pieces[0].text.starts_with("### useState"));
        assert!(pieces[1].text.starts_with("### useEffect"));
    }

    #[test]
    fn markdown_h3_preamble_before_first_heading_is_kept() {
        let text = "intro text\n### First\nbody";
        let pieces = chunk(text, &ChunkStrategy::MarkdownH3 { max_chars: 4_000 });
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].section_path, None);
        assert!(pieces[0].text.contains("intro text"));
    }

    #[test]
    fn markdown_h3_oversized_section_is_subdivided_with_heading_prefix() {
        let long_para = "word ".repeat(2_000);
        let text = format!("### Big\n{long_para}\n\nsecond paragraph");
        let pieces = chunk(&text, &ChunkStrategy::MarkdownH3 { max_chars: 200 });
        assert!(pieces.len() > 1);
        for p in &pieces {
            assert!(p.text.starts_with("### Big"));
        }
    }

    #[test]
    fn code_block_is_never_split_and_extends_preceding_chunk() {
        let code = format!("```\n{}\n```", "line\n".repeat(100));
        let text = format!("short para\n\n{code}");
        let groups = paragraph_groups(&text, 0, 50);
        let has_whole_block = groups.iter().any(|g| g.contains("```\nline"));
        assert!(has_whole_block, "code block must appear intact in some chunk");
    }

    #[test]
    fn character_strategy_respects_overlap() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let pieces = chunk(text, &ChunkStrategy::Character { chunk_size: 10, overlap: 3 });
        assert!(pieces.len() > 1);
        assert_eq!(pieces[0].text.len(), 10);
    }

    #[test]
    fn paragraph_strategy_coalesces_until_max_length() {
        let text = "one\n\ntwo\n\nthree\n\nfour";
        let pieces = chunk(text, &ChunkStrategy::Paragraph { min_length: 0, max_length: 9 });
        assert!(pieces.len() >= 2);
    }

    #[test]
    fn empty_text_yields_single_empty_piece() {
        let pieces = chunk("", &ChunkStrategy::MarkdownH3 { max_chars: 4_000 });
        assert_eq!(pieces.len(), 1);
    }

    #[test]
    fn deterministic_for_same_input() {
        let text = "### A\nAlpha\n\n### B\nBeta";
        let strategy = ChunkStrategy::MarkdownH3 { max_chars: 4_000 };
        let a = chunk(text, &strategy);
        let b = chunk(text, &strategy);
        assert_eq!(a, b);
    }

    #[test]
    fn multibyte_utf8_is_not_split_mid_character() {
        let text = "héllo wörld ".repeat(50);
        let pieces = chunk(&text, &ChunkStrategy::Character { chunk_size: 17, overlap: 2 });
        for p in &pieces {
            assert!(String::from_utf8(p.text.clone().into_bytes()).is_ok());
        }
    }
}

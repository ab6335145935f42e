//! Sliding-window text chunker.
//!
//! Splits extracted text into overlapping windows of at most `max_chars`
//! characters with a fixed `overlap_chars` overlap, preserving line and
//! byte-offset ranges for citation. Character boundaries and line starts
//! are collected in a single forward pass up front; window construction
//! then works purely from those position tables, never re-searching the
//! original text.
//!
//! Windows prefer to break at a line boundary inside the final fifth of
//! the window and fall back to a hard cut.

use crate::models::PositionRange;

/// One window of extracted text plus its position in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSlice {
    pub text: String,
    pub position: PositionRange,
}

pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<ChunkSlice> {
    assert!(max_chars > 0, "max_chars must be > 0");
    assert!(
        overlap_chars < max_chars,
        "overlap must be smaller than the window"
    );

    if text.is_empty() {
        return Vec::new();
    }

    // Single forward pass: byte offset of every char (plus the end
    // sentinel), and the char index starting each line.
    let mut char_offsets: Vec<usize> = Vec::with_capacity(text.len());
    let mut line_starts: Vec<usize> = vec![0];
    for (char_idx, (byte_idx, c)) in text.char_indices().enumerate() {
        char_offsets.push(byte_idx);
        if c == '\n' {
            line_starts.push(char_idx + 1);
        }
    }
    char_offsets.push(text.len());
    let total_chars = char_offsets.len() - 1;

    let line_of = |char_idx: usize| -> u32 {
        // index of the last line start at or before char_idx
        match line_starts.binary_search(&char_idx) {
            Ok(i) => i as u32 + 1,
            Err(i) => i as u32,
        }
    };

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total_chars {
        let hard_end = (start + max_chars).min(total_chars);

        // Prefer a newline break within the last 20% of a full window.
        let end = if hard_end < total_chars {
            let floor = start + max_chars - max_chars / 5;
            let mut cut = hard_end;
            let mut probe = hard_end;
            while probe > floor {
                probe -= 1;
                if text[char_offsets[probe]..].starts_with('\n') {
                    cut = probe + 1; // keep the newline with the left chunk
                    break;
                }
            }
            cut
        } else {
            hard_end
        };

        let start_byte = char_offsets[start];
        let end_byte = char_offsets[end];

        chunks.push(ChunkSlice {
            text: text[start_byte..end_byte].to_string(),
            position: PositionRange {
                start_line: line_of(start),
                // the line containing the window's last char
                end_line: line_of(end.saturating_sub(1).max(start)),
                start_offset: start_byte,
                end_offset: end_byte,
            },
        });

        if end >= total_chars {
            break;
        }
        // next window starts `overlap` back from this cut, always advancing
        start = end.saturating_sub(overlap_chars).max(start + 1);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].position.start_line, 1);
        assert_eq!(chunks[0].position.end_line, 1);
        assert_eq!(chunks[0].position.start_offset, 0);
        assert_eq!(chunks[0].position.end_offset, 13);
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn every_chunk_respects_max_size() {
        let text = "word ".repeat(2000);
        let chunks = chunk_text(&text, 1000, 200);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 1000);
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text: String = (0..3000).map(|i| ((b'a' + (i % 26) as u8) as char)).collect();
        let chunks = chunk_text(&text, 1000, 200);
        for pair in chunks.windows(2) {
            let prev = &pair[0];
            let next = &pair[1];
            let tail: String = prev.text.chars().rev().take(200).collect::<Vec<_>>()
                .into_iter().rev().collect();
            assert!(next.text.starts_with(&tail));
            assert!(next.position.start_offset < prev.position.end_offset);
        }
    }

    #[test]
    fn windows_are_in_document_order_and_cover_the_text() {
        let text = "line one\nline two\nline three\n".repeat(100);
        let chunks = chunk_text(&text, 300, 60);

        assert_eq!(chunks[0].position.start_offset, 0);
        assert_eq!(chunks.last().unwrap().position.end_offset, text.len());
        for pair in chunks.windows(2) {
            assert!(pair[0].position.start_offset < pair[1].position.start_offset);
        }
    }

    #[test]
    fn line_numbers_track_newlines() {
        let text = "alpha\nbeta\ngamma";
        let chunks = chunk_text(text, 1000, 200);
        assert_eq!(chunks[0].position.start_line, 1);
        assert_eq!(chunks[0].position.end_line, 3);
    }

    #[test]
    fn prefers_newline_breaks_near_window_end() {
        // lines of 50 chars; a 120-char window should cut on a newline
        let line = "x".repeat(49);
        let text = format!("{0}\n{0}\n{0}\n{0}\n", line);
        let chunks = chunk_text(&text, 120, 20);
        assert!(chunks[0].text.ends_with('\n'));
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllo wörld ".repeat(200);
        let chunks = chunk_text(&text, 100, 20);
        for c in &chunks {
            assert!(c.text.chars().count() <= 100);
            // would panic on a broken boundary
            let _ = &text[c.position.start_offset..c.position.end_offset];
        }
    }

    #[test]
    fn deterministic() {
        let text = "Alpha\nBeta\nGamma\nDelta\n".repeat(50);
        let a = chunk_text(&text, 200, 40);
        let b = chunk_text(&text, 200, 40);
        assert_eq!(a, b);
    }
}

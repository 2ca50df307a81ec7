// src/diff/chunk.rs
// Size-bounded grouping of file segments

use super::types::DiffFileSegment;
use serde::Serialize;
use tracing::debug;

/// An ordered group of file segments sent to a backend as one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub segments: Vec<DiffFileSegment>,
    pub approx_size_bytes: usize,
    /// A single segment larger than the chunk limit
    pub oversized: bool,
}

impl Chunk {
    /// Diff text for this chunk
    pub fn render(&self) -> String {
        self.segments.iter().map(DiffFileSegment::render).collect()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.path.as_str()).collect()
    }
}

/// Group segments into chunks of at most `max_chunk_bytes`.
///
/// File segments are never split. A segment that alone exceeds the limit
/// closes the chunk being built and becomes its own chunk flagged
/// `oversized`. Boundaries depend only on segment order and sizes.
pub fn chunk_segments(segments: Vec<DiffFileSegment>, max_chunk_bytes: usize) -> Vec<Chunk> {
    let limit = max_chunk_bytes.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<DiffFileSegment> = Vec::new();
    let mut current_size = 0usize;

    for segment in segments {
        let size = segment.size_bytes();

        if size > limit {
            close_chunk(&mut chunks, &mut current, &mut current_size);
            debug!(path = %segment.path, size, limit, "Segment exceeds chunk limit, sending alone");
            chunks.push(Chunk {
                index: chunks.len(),
                segments: vec![segment],
                approx_size_bytes: size,
                oversized: true,
            });
            continue;
        }

        if current_size + size > limit {
            close_chunk(&mut chunks, &mut current, &mut current_size);
        }
        current_size += size;
        current.push(segment);
    }
    close_chunk(&mut chunks, &mut current, &mut current_size);

    chunks
}

fn close_chunk(chunks: &mut Vec<Chunk>, current: &mut Vec<DiffFileSegment>, size: &mut usize) {
    if current.is_empty() {
        return;
    }
    chunks.push(Chunk {
        index: chunks.len(),
        segments: std::mem::take(current),
        approx_size_bytes: *size,
        oversized: false,
    });
    *size = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Segment whose rendered size is exactly `size` bytes
    fn sized(path: &str, size: usize) -> DiffFileSegment {
        let mut seg = DiffFileSegment::new(path);
        let header = "@@ -1 +1 @@\n+";
        assert!(size > header.len() + 1);
        let body = "x".repeat(size - header.len() - 1);
        seg.hunks.push(format!("{}{}", header, body));
        assert_eq!(seg.size_bytes(), size);
        seg
    }

    fn sizes(chunks: &[Chunk]) -> Vec<usize> {
        chunks.iter().map(|c| c.approx_size_bytes).collect()
    }

    #[test]
    fn test_three_files_example() {
        let segments = vec![sized("a.rs", 1200), sized("b.rs", 50), sized("c.rs", 9000)];
        let chunks = chunk_segments(segments, 2000);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].paths(), vec!["a.rs", "b.rs"]);
        assert_eq!(chunks[0].approx_size_bytes, 1250);
        assert!(!chunks[0].oversized);
        assert_eq!(chunks[1].paths(), vec!["c.rs"]);
        assert_eq!(chunks[1].approx_size_bytes, 9000);
        assert!(chunks[1].oversized);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_oversized_closes_open_chunk_first() {
        let segments = vec![
            sized("a.rs", 100),
            sized("big.rs", 5000),
            sized("b.rs", 100),
        ];
        let chunks = chunk_segments(segments, 1000);
        assert_eq!(sizes(&chunks), vec![100, 5000, 100]);
        assert_eq!(
            chunks.iter().map(|c| c.oversized).collect::<Vec<_>>(),
            vec![false, true, false]
        );
    }

    #[test]
    fn test_exact_fit_stays_in_chunk() {
        let chunks = chunk_segments(vec![sized("a.rs", 600), sized("b.rs", 400)], 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].approx_size_bytes, 1000);
    }

    #[test]
    fn test_overflow_starts_new_chunk() {
        let chunks = chunk_segments(
            vec![sized("a.rs", 600), sized("b.rs", 401), sized("c.rs", 300)],
            1000,
        );
        assert_eq!(sizes(&chunks), vec![600, 701]);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let make = || {
            (0..40)
                .map(|i| sized(&format!("f{}.rs", i), 50 + (i * 37) % 900))
                .collect::<Vec<_>>()
        };
        let first = chunk_segments(make(), 1500);
        let second = chunk_segments(make(), 1500);
        assert_eq!(first, second);
    }

    #[test]
    fn test_order_preserved_and_size_bounded() {
        let segments: Vec<_> = (0..30)
            .map(|i| sized(&format!("f{}.rs", i), 100 + (i * 131) % 1400))
            .collect();
        let expected: Vec<String> = segments.iter().map(|s| s.path.clone()).collect();

        let chunks = chunk_segments(segments, 1000);

        let flattened: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.segments.iter().map(|s| s.path.clone()))
            .collect();
        assert_eq!(flattened, expected);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            if chunk.oversized {
                assert_eq!(chunk.segments.len(), 1);
            } else {
                assert!(chunk.approx_size_bytes <= 1000);
            }
        }
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_segments(Vec::new(), 1000).is_empty());
    }

    #[test]
    fn test_render_concatenates_segments() {
        let chunks = chunk_segments(vec![sized("a.rs", 40), sized("b.rs", 60)], 1000);
        assert_eq!(chunks[0].render().len(), 100);
    }
}

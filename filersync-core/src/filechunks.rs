//! Chunk planning: turns the chunk list of an entry into an ordered list of [ChunkView]s, the
//! read windows that, streamed one after another, reproduce the file content.
//!
//! Chunks may overlap when a region of a file was rewritten. The newest chunk (by `mtime`, later
//! in the list on ties) owns the overlapping bytes, the older chunk is only visible where
//! nothing newer covers it.
use crate::entry::FileChunk;

/// The end of the furthest chunk.
pub fn total_size(chunks: &[FileChunk]) -> u64 {
    chunks
        .iter()
        .map(|c| c.offset.saturating_add(c.size))
        .max()
        .unwrap_or_default()
}

/// A part of a chunk that is not shadowed by any newer chunk, in file coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibleInterval {
    pub start: u64,
    pub stop: u64,
    pub file_id: String,
    /// File offset at which the whole chunk starts.
    pub chunk_offset: u64,
}

/// A bounded read window over one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkView {
    pub file_id: String,
    /// Where to start reading, relative to the beginning of the chunk.
    pub offset: u64,
    pub size: u64,
    /// Where the bytes land in the file.
    pub logic_offset: u64,
}

/// Resolves the chunks into sorted, non-overlapping visible intervals.
pub fn non_overlapping_visible_intervals(chunks: &[FileChunk]) -> Vec<VisibleInterval> {
    let mut sorted: Vec<&FileChunk> = chunks.iter().filter(|c| c.size > 0).collect();
    // stable, so equal mtimes keep the list order and the later chunk wins
    sorted.sort_by_key(|c| c.mtime);

    let mut visibles: Vec<VisibleInterval> = Vec::with_capacity(sorted.len());
    for chunk in sorted {
        let start = chunk.offset;
        let stop = chunk.offset.saturating_add(chunk.size);

        let mut next = Vec::with_capacity(visibles.len() + 2);
        for visible in visibles {
            if visible.stop <= start || visible.start >= stop {
                next.push(visible);
                continue;
            }
            if visible.start < start {
                next.push(VisibleInterval {
                    stop: start,
                    ..visible.clone()
                });
            }
            if visible.stop > stop {
                next.push(VisibleInterval {
                    start: stop,
                    ..visible
                });
            }
        }
        next.push(VisibleInterval {
            start,
            stop,
            file_id: chunk.file_id.clone(),
            chunk_offset: chunk.offset,
        });
        next.sort_by_key(|v| v.start);
        visibles = next;
    }

    visibles
}

/// Views covering `[offset, offset + size)` of the file, in ascending file order.
pub fn view_from_chunks(chunks: &[FileChunk], offset: u64, size: u64) -> Vec<ChunkView> {
    let visibles = non_overlapping_visible_intervals(chunks);
    view_from_visible_intervals(&visibles, offset, size)
}

/// Clips the intervals to `[offset, offset + size)`. Ranges no interval covers (holes in a
/// sparse file) produce no view, callers detect them through the gaps in `logic_offset`.
pub fn view_from_visible_intervals(
    visibles: &[VisibleInterval],
    offset: u64,
    size: u64,
) -> Vec<ChunkView> {
    let stop = offset.saturating_add(size);

    visibles
        .iter()
        .filter_map(|visible| {
            let view_start = visible.start.max(offset);
            let view_stop = visible.stop.min(stop);
            if view_start >= view_stop {
                return None;
            }
            Some(ChunkView {
                file_id: visible.file_id.clone(),
                offset: view_start - visible.chunk_offset,
                size: view_stop - view_start,
                logic_offset: view_start,
            })
        })
        .collect()
}

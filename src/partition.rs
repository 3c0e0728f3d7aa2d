use std::ops::Range;

/// Split `[0, len)` into at most `pieces` ordered, disjoint, contiguous
/// ranges of near-equal length. Computed once per image size and reused for
/// every wavelet level and channel.
pub fn partition(len: usize, pieces: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let pieces = pieces.clamp(1, len);
    let base = len / pieces;
    let remainder = len % pieces;

    let mut ranges = Vec::with_capacity(pieces);
    let mut start = 0;
    for piece in 0..pieces {
        let extra = usize::from(piece < remainder);
        let stop = start + base + extra;
        ranges.push(start..stop);
        start = stop;
    }
    ranges
}

/// Borrow one immutable sub-slice per partition range.
pub fn split_ranges<'a, T>(mut slice: &'a [T], ranges: &[Range<usize>]) -> Vec<&'a [T]> {
    let mut parts = Vec::with_capacity(ranges.len());
    for range in ranges {
        let (head, tail) = slice.split_at(range.len());
        parts.push(head);
        slice = tail;
    }
    parts
}

/// Borrow one mutable sub-slice per partition range. The ranges tile the
/// slice, so the workers of a parallel pass get disjoint memory and need no
/// synchronization.
pub fn split_ranges_mut<'a, T>(
    mut slice: &'a mut [T],
    ranges: &[Range<usize>],
) -> Vec<&'a mut [T]> {
    let mut parts = Vec::with_capacity(ranges.len());
    for range in ranges {
        let (head, tail) = slice.split_at_mut(range.len());
        parts.push(head);
        slice = tail;
    }
    parts
}

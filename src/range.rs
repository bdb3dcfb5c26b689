// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 seektar contributors

use thiserror::Error;

/// a directive that is shaped correctly but names an impossible interval
///
/// the protocol layer maps this to "416 Range Not Satisfiable"; it is never
/// fatal to the archive itself
#[derive(Debug, Error, PartialEq, Eq)]
#[error("range not satisfiable: bytes={start}-{end}")]
pub struct RangeUnsatisfiable {
    pub start: u64,
    pub end: u64,
}

/// resolve an optional `bytes=a-b` directive against a total size into a
/// half-open `[start, until)` interval
///
/// anything that does not look like a byte-range directive selects the whole
/// resource; a `start > end` pair is the only hard error
pub fn resolve(size: u64, directive: Option<&str>) -> Result<(u64, u64), RangeUnsatisfiable> {
    let Some((from, to)) = directive.and_then(parse_directive) else {
        return Ok((0, size));
    };

    if size == 0 {
        return Ok((0, 0));
    }

    // suffix form (bytes=-N): last N bytes, clamped to the whole resource
    let Some(mut start) = from else {
        let n = to.unwrap_or(0);
        return Ok((size.saturating_sub(n), size));
    };

    // a start past the end still requests the trailing byte
    if start >= size {
        start = size - 1;
    }

    // prefix form (bytes=N-): from N to the end
    let Some(mut end) = to else {
        return Ok((start, size));
    };

    if end < start {
        return Err(RangeUnsatisfiable { start, end });
    }
    if end >= size {
        end = size - 1;
    }

    Ok((start, end + 1))
}

/// split `bytes=<digits?>-<digits?>` into its optional bounds; returns None
/// for anything else, including `bytes=-` with both sides empty
fn parse_directive(directive: &str) -> Option<(Option<u64>, Option<u64>)> {
    let rest = directive.strip_prefix("bytes=")?;
    let (from, to) = rest.split_once('-')?;
    let from = parse_bound(from)?;
    let to = parse_bound(to)?;
    if from.is_none() && to.is_none() {
        return None;
    }
    Some((from, to))
}

fn parse_bound(field: &str) -> Option<Option<u64>> {
    if field.is_empty() {
        return Some(None);
    }
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok().map(Some)
}

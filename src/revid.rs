//! Revision identifiers
//!
//! A structured revision ID is `<generation>-<digest>`: a decimal generation of
//! at most eight digits, a hyphen, and a non-empty digest. The persisted tree
//! may also hold IDs in *compacted* form, where a single leading byte carries
//! the generation directly and the rest is the raw digest.
//!
//! Compacted generation byte:
//! - `1..=47` stored as-is
//! - `48..=245` stored as `generation + 10`, stepping over the ASCII digits so a
//!   compacted ID never looks like a structured one
//!
//! Anything that does not parse is still a usable ID: [`compare`] falls back to
//! plain byte ordering for it.

use std::cmp::Ordering;

/// Longest decimal generation prefix accepted by [`parse`]
pub const MAX_GENERATION_DIGITS: usize = 8;

/// Largest generation that fits the compacted one-byte form
pub const MAX_COMPACT_GENERATION: u32 = u8::MAX as u32 - 10;

/// Bytes of BLAKE3 output kept in a generated digest
const DIGEST_LEN: usize = 20;

/// A revision ID split into its generation and digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRevId<'a> {
    /// Generation number, always at least 1 for structured IDs
    pub generation: u32,
    /// Everything after the generation
    pub digest: &'a [u8],
}

/// Parse a structured `<generation>-<digest>` ID
pub fn parse(rev: &[u8]) -> Option<ParsedRevId<'_>> {
    let dash = rev.iter().position(|&b| b == b'-')?;
    if dash == 0 || dash > MAX_GENERATION_DIGITS || dash + 1 >= rev.len() {
        return None;
    }
    let generation = parse_digits(&rev[..dash])?;
    Some(ParsedRevId {
        generation,
        digest: &rev[dash + 1..],
    })
}

/// Parse an ID that may be in compacted form
///
/// A leading ASCII digit means the ID is structured and goes through
/// [`parse`]. Any other leading byte is a compacted generation, so this only
/// fails on empty input or a malformed structured ID.
pub fn parse_compacted(rev: &[u8]) -> Option<ParsedRevId<'_>> {
    let &first = rev.first()?;
    if first.is_ascii_digit() {
        return parse(rev);
    }
    let generation = if first > b'9' { first - 10 } else { first };
    Some(ParsedRevId {
        generation: generation as u32,
        digest: &rev[1..],
    })
}

/// Order two revision IDs
///
/// Generations compare numerically, then digests bytewise. If either side is
/// not a structured ID the whole byte strings are compared instead.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(pa), Some(pb)) => pa
            .generation
            .cmp(&pb.generation)
            .then_with(|| pa.digest.cmp(pb.digest)),
        _ => a.cmp(b),
    }
}

/// Convert a structured ID to compacted form
///
/// IDs that are not structured, or whose generation does not fit one byte,
/// come back unchanged.
pub fn compact(rev: &[u8]) -> Vec<u8> {
    let Some(parsed) = parse(rev) else {
        return rev.to_vec();
    };
    let byte = match parsed.generation {
        g @ 1..=47 => g as u8,
        g @ 48..=MAX_COMPACT_GENERATION => (g + 10) as u8,
        _ => return rev.to_vec(),
    };
    let mut out = Vec::with_capacity(1 + parsed.digest.len());
    out.push(byte);
    out.extend_from_slice(parsed.digest);
    out
}

/// Convert a compacted ID back to structured text form
pub fn expand(rev: &[u8]) -> Vec<u8> {
    match rev.first() {
        Some(first) if !first.is_ascii_digit() => {
            let Some(parsed) = parse_compacted(rev) else {
                return rev.to_vec();
            };
            let mut out = parsed.generation.to_string().into_bytes();
            out.push(b'-');
            out.extend_from_slice(parsed.digest);
            out
        }
        _ => rev.to_vec(),
    }
}

/// Mint the ID for a new child of `parent`
///
/// The digest is a truncated BLAKE3 hash over the parent ID, the deletion
/// flag and the body, so the same edit made on two replicas gets the same ID.
/// Returns `None` if the parent ID has no parseable generation.
pub fn generate(parent: Option<&[u8]>, body: &[u8], deleted: bool) -> Option<Vec<u8>> {
    let generation = match parent {
        Some(parent) => parse_compacted(parent)?.generation.checked_add(1)?,
        None => 1,
    };
    let parent = parent.unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(&[parent.len().min(u8::MAX as usize) as u8]);
    hasher.update(parent);
    hasher.update(&[deleted as u8]);
    hasher.update(body);
    let hash = hasher.finalize();

    let digest = hex::encode(&hash.as_bytes()[..DIGEST_LEN]);
    Some(format!("{generation}-{digest}").into_bytes())
}

/// Decimal digits to a non-zero number
fn parse_digits(digits: &[u8]) -> Option<u32> {
    let mut value: u32 = 0;
    for &d in digits {
        if !d.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (d - b'0') as u32;
    }
    (value != 0).then_some(value)
}

//! Persisted tree format
//!
//! A tree is a run of node records followed by a four-byte zero. Each record:
//!
//! ```text
//! size        u32 BE   whole record length, this field included
//! parent      u16 BE   0xFFFF = no parent
//! flags       u8       LEAF | DELETED, plus HAS_DATA / HAS_BODY_OFFSET
//! rev_id_len  u8
//! rev_id      [u8; rev_id_len]
//! sequence    varint
//! body        rest of record          if HAS_DATA
//! offset      varint                  else if HAS_BODY_OFFSET
//! ```
//!
//! Records are written in table order.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{trace, warn};

use super::node::{Body, RevFlags, RevNode};
use super::{RevTree, MAX_NODES};
use crate::codec::{self, Reader};
use crate::system::metrics::{Metrics, Timer};
use crate::types::{Error, Result, Sequence};

/// Record carries inline body bytes
const HAS_DATA: u8 = 0x80;
/// Record carries an old-body offset
const HAS_BODY_OFFSET: u8 = 0x40;
/// size + parent + flags + rev_id_len
pub(super) const RECORD_HEADER_LEN: usize = 4 + 2 + 1 + 1;
/// Zero size that ends the record run
const TRAILER_LEN: usize = 4;
const NO_PARENT: u16 = u16::MAX;

type DecodeResult<T> = std::result::Result<T, String>;

impl RevTree {
    /// Decode a stored tree
    ///
    /// Nodes stored with sequence 0 inherit `sequence`, the document's current
    /// sequence. `doc_offset` is where `raw` lives in storage and becomes the
    /// tree's body offset. Any inconsistency fails the whole decode.
    pub fn decode(raw: Bytes, sequence: Sequence, doc_offset: u64) -> Result<Self> {
        let metrics = Metrics::global();
        let nodes = match decode_nodes(&raw, sequence) {
            Ok(nodes) => nodes,
            Err(reason) => {
                warn!(len = raw.len(), sequence, %reason, "corrupt revision tree");
                metrics.tree.corrupt_trees.inc();
                return Err(Error::corrupt(reason));
            }
        };
        metrics.tree.trees_decoded.inc();
        Ok(Self {
            nodes,
            body_offset: doc_offset,
            sorted: true,
            changed: false,
        })
    }

    /// Encode the tree for storage
    ///
    /// Sorts first. Saved revisions that are no longer leaves give up their
    /// inline body in favour of a pointer to [`body_offset`](Self::body_offset),
    /// where the previous version of the document still holds it.
    ///
    /// Fails if a record would not fit its 32-bit size field.
    pub fn encode(&mut self) -> Result<Bytes> {
        let metrics = Metrics::global();
        let timer = Timer::start(metrics.tree.encode_duration.clone());
        self.sort();

        let body_offset = self.body_offset;
        let mut size = TRAILER_LEN;
        for node in &mut self.nodes {
            if node.body.inline().is_some() && !node.is_leaf() && !node.is_new() {
                node.body = if body_offset > 0 {
                    Body::Deferred(body_offset)
                } else {
                    Body::Empty
                };
            }
            size += record_len(node);
        }

        let mut out = BytesMut::with_capacity(size);
        for node in &self.nodes {
            let len = record_len(node);
            let len = u32::try_from(len).map_err(|_| Error::RecordTooLarge(len))?;
            write_record(&mut out, node, len);
        }
        codec::write_u32_be(&mut out, 0);
        debug_assert_eq!(out.len(), size);

        timer.finish();
        metrics.tree.trees_encoded.inc();
        Ok(out.freeze())
    }
}

fn record_len(node: &RevNode) -> usize {
    let mut len = RECORD_HEADER_LEN + node.rev_id.len() + codec::varint_len(node.sequence);
    if let Some(data) = node.body.inline() {
        len += data.len();
    } else if let Some(offset) = node.body.deferred_offset() {
        len += codec::varint_len(offset);
    }
    len
}

fn write_record(out: &mut BytesMut, node: &RevNode, len: u32) {
    let mut flags = node.flags.intersection(RevFlags::PERSISTENT).bits();
    if node.body.inline().is_some() {
        flags |= HAS_DATA;
    } else if node.body.deferred_offset().is_some() {
        flags |= HAS_BODY_OFFSET;
    }

    codec::write_u32_be(out, len);
    codec::write_u16_be(out, node.parent.unwrap_or(NO_PARENT));
    out.put_u8(flags);
    out.put_u8(node.rev_id.len() as u8);
    out.put_slice(&node.rev_id);
    codec::write_varint(out, node.sequence);
    if let Some(data) = node.body.inline() {
        out.put_slice(data);
    } else if let Some(offset) = node.body.deferred_offset() {
        codec::write_varint(out, offset);
    }
}

fn decode_nodes(raw: &Bytes, sequence: Sequence) -> DecodeResult<Vec<RevNode>> {
    let mut nodes = Vec::new();
    let mut reader = Reader::new(raw);
    loop {
        let start = reader.position();
        let size = reader
            .read_u32_be()
            .ok_or_else(|| format!("missing record size at byte {start}"))? as usize;
        if size == 0 {
            break;
        }
        if nodes.len() == MAX_NODES {
            return Err(format!("more than {MAX_NODES} nodes"));
        }
        if size < RECORD_HEADER_LEN || reader.read_bytes(size - 4).is_none() {
            return Err(format!("record at byte {start} has bad size {size}"));
        }
        nodes.push(decode_record(raw, start, reader.position(), sequence)?);
    }

    if !reader.is_empty() {
        return Err(format!("{} bytes after trailing marker", reader.remaining()));
    }
    check_parents(&nodes)?;
    Ok(nodes)
}

fn decode_record(raw: &Bytes, start: usize, end: usize, sequence: Sequence) -> DecodeResult<RevNode> {
    let base = start + 4;
    let mut reader = Reader::new(&raw[base..end]);
    let truncated = || format!("truncated record at byte {start}");

    let parent = reader.read_u16_be().ok_or_else(truncated)?;
    let raw_flags = reader.read_u8().ok_or_else(truncated)?;
    let id_len = reader.read_u8().ok_or_else(truncated)? as usize;
    if id_len == 0 {
        return Err(format!("empty revision ID at byte {start}"));
    }
    let id_start = base + reader.position();
    reader
        .read_bytes(id_len)
        .ok_or_else(|| format!("revision ID overruns record at byte {start}"))?;
    let rev_id = raw.slice(id_start..id_start + id_len);

    let stored_sequence = reader
        .read_varint()
        .ok_or_else(|| format!("bad sequence in record at byte {start}"))?;

    let body = if raw_flags & HAS_DATA != 0 {
        let data_start = base + reader.position();
        Body::from_bytes(raw.slice(data_start..end))
    } else {
        let body = if raw_flags & HAS_BODY_OFFSET != 0 {
            match reader.read_varint() {
                Some(0) => Body::Empty,
                Some(offset) => Body::Deferred(offset),
                None => return Err(format!("bad body offset in record at byte {start}")),
            }
        } else {
            Body::Empty
        };
        if !reader.is_empty() {
            return Err(format!("{} stray bytes in record at byte {start}", reader.remaining()));
        }
        body
    };

    trace!(rev_id = ?rev_id, parent, flags = raw_flags, "decoded revision record");
    Ok(RevNode {
        rev_id,
        flags: RevFlags::from_persisted(raw_flags),
        parent: (parent != NO_PARENT).then_some(parent),
        sequence: if stored_sequence == 0 { sequence } else { stored_sequence },
        body,
    })
}

/// Every parent link must land inside the table and no chain may loop.
fn check_parents(nodes: &[RevNode]) -> DecodeResult<()> {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const ROOTED: u8 = 2;

    for (index, node) in nodes.iter().enumerate() {
        if let Some(parent) = node.parent_index() {
            if parent >= nodes.len() {
                return Err(format!("node {index} has parent {parent} out of range"));
            }
        }
    }

    let mut state = vec![UNSEEN; nodes.len()];
    let mut path = Vec::new();
    for start in 0..nodes.len() {
        let mut cursor = Some(start);
        while let Some(index) = cursor {
            match state[index] {
                ROOTED => break,
                ON_PATH => return Err(format!("parent cycle through node {index}")),
                _ => {
                    state[index] = ON_PATH;
                    path.push(index);
                    cursor = nodes[index].parent_index();
                }
            }
        }
        for index in path.drain(..) {
            state[index] = ROOTED;
        }
    }
    Ok(())
}

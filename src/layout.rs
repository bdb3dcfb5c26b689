// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 seektar contributors

use std::collections::HashSet;
use std::sync::Arc;

use crate::constants::{BLOCK_SIZE, END_OF_ARCHIVE_BLOCKS};
use crate::header::{HEADER_LEN, directory_header, file_header};
use crate::sources::EntrySource;

/// one logical file to place in the archive
pub struct ArchiveEntry {
    /// relative path inside the archive, `/`-separated and unique; also
    /// seeds the synthesized parent directories
    pub name: String,
    /// declared byte length, authoritative for the layout even if the
    /// source later answers with fewer bytes
    pub size: u64,
    /// modification time, seconds since the epoch
    pub mtime: u64,
    pub source: Arc<dyn EntrySource>,
}

/// what a block produces when read
pub enum BlockKind {
    /// pre-encoded header, for a file or a synthesized directory
    Header(Box<[u8; HEADER_LEN]>),
    /// payload of the entry at this index in the planning entry list
    Payload { entry: usize },
    /// trailing zero blocks
    EndOfArchive,
}

pub struct Block {
    pub offset: u64,
    pub kind: BlockKind,
}

/// the complete block table plus total archive size
///
/// immutable once planned; holds nothing but plain data, so it can be shared
/// between any number of concurrent readers or rebuilt at will
pub struct ArchiveLayout {
    pub blocks: Vec<Block>,
    pub size: u64,
}

impl ArchiveLayout {
    /// plan the whole archive without reading a single payload byte
    ///
    /// entries are laid out in byte-wise lexicographic name order, so
    /// identical entry sets always produce byte-identical archives
    pub fn plan(entries: &[ArchiveEntry]) -> Self {
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by(|&a, &b| entries[a].name.as_bytes().cmp(entries[b].name.as_bytes()));

        let mut blocks = Vec::new();
        let mut size = 0u64;
        let mut emitted_dirs: HashSet<String> = HashSet::from([String::new()]);

        for &index in &order {
            let entry = &entries[index];

            // every ancestor gets a directory header the first time it is
            // needed; walking the full chain keeps deep single-child paths
            // correct independent of what else sorts nearby
            for dir in ancestors(&entry.name) {
                if emitted_dirs.contains(dir) {
                    continue;
                }
                emitted_dirs.insert(dir.to_string());
                blocks.push(Block {
                    offset: size,
                    kind: BlockKind::Header(Box::new(directory_header(dir, entry.mtime))),
                });
                size += BLOCK_SIZE;
            }

            blocks.push(Block {
                offset: size,
                kind: BlockKind::Header(Box::new(file_header(&entry.name, entry.size, entry.mtime))),
            });
            size += BLOCK_SIZE;

            let padded = entry.size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
            if padded > 0 {
                blocks.push(Block {
                    offset: size,
                    kind: BlockKind::Payload { entry: index },
                });
                size += padded;
            }
        }

        blocks.push(Block {
            offset: size,
            kind: BlockKind::EndOfArchive,
        });
        size += END_OF_ARCHIVE_BLOCKS * BLOCK_SIZE;

        ArchiveLayout { blocks, size }
    }

    /// where a block's extent ends: the next block's offset, or the archive
    /// size for the last one
    pub fn block_end(&self, index: usize) -> u64 {
        self.blocks.get(index + 1).map_or(self.size, |b| b.offset)
    }

    /// find the block containing `start` and the intra-block skip
    pub fn locate(&self, start: u64) -> BlockCursor {
        let mut block = 0;
        while block + 1 < self.blocks.len() && start >= self.blocks[block + 1].offset {
            block += 1;
        }
        BlockCursor {
            block,
            skip: start.saturating_sub(self.blocks[block].offset),
        }
    }

    /// the next read the cursor would perform against an exclusive range
    /// end, or None once the range is fully delivered
    pub fn next_read(&self, cursor: &BlockCursor, end: u64) -> Option<BlockRead> {
        let block = self.blocks.get(cursor.block)?;
        if block.offset >= end {
            return None;
        }
        let len = self.block_end(cursor.block).min(end) - block.offset - cursor.skip;
        Some(BlockRead {
            block: cursor.block,
            skip: cursor.skip,
            len,
        })
    }
}

/// explicit per-range iteration state: the current block plus the bytes
/// still to be discarded from the front of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCursor {
    pub block: usize,
    pub skip: u64,
}

impl BlockCursor {
    pub fn advance(self) -> BlockCursor {
        BlockCursor {
            block: self.block + 1,
            skip: 0,
        }
    }
}

/// one read against a block: discard `skip` bytes of its content, then
/// deliver `len`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRead {
    pub block: usize,
    pub skip: u64,
    pub len: u64,
}

fn ancestors(name: &str) -> impl Iterator<Item = &str> {
    name.match_indices('/').map(|(i, _)| &name[..i])
}

//! Block lists as JSON: an array of `[rows, start, end]` or `[rows, start, end, label]` entries.

use std::io::{BufRead, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blocks::{Block, RowSet};
use crate::blocks::source::MaximalBlockSource;
use crate::errors::PangeblocksError;
use crate::io::fasta::open_maybe_gzipped;
use crate::msa::{ColumnRange, Msa};

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawBlock {
    Labeled(RowSet, usize, usize, String),
    Unlabeled(RowSet, usize, usize),
}

impl TryFrom<RawBlock> for Block {
    type Error = PangeblocksError;

    fn try_from(value: RawBlock) -> Result<Self, Self::Error> {
        match value {
            RawBlock::Labeled(rows, start, end, label) => Block::new(rows, start, end)?.with_label(label),
            RawBlock::Unlabeled(rows, start, end) => Block::new(rows, start, end),
        }
    }
}

impl From<&Block> for RawBlock {
    fn from(block: &Block) -> Self {
        match block.label() {
            Some(label) => RawBlock::Labeled(block.rows().clone(), block.start(), block.end(), label.to_string()),
            None => RawBlock::Unlabeled(block.rows().clone(), block.start(), block.end()),
        }
    }
}

pub fn read_blocks<R: BufRead>(reader: R) -> Result<Vec<Block>, PangeblocksError> {
    let raw: Vec<RawBlock> = serde_json::from_reader(reader)?;

    raw.into_iter()
        .map(Block::try_from)
        .collect()
}

pub fn write_blocks<W: Write>(mut writer: W, blocks: &[Block]) -> Result<(), PangeblocksError> {
    let raw: Vec<RawBlock> = blocks.iter().map(RawBlock::from).collect();
    serde_json::to_writer(&mut writer, &raw)?;
    writeln!(writer)?;

    Ok(())
}

/// Maximal blocks read from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonBlockFile {
    blocks: Vec<Block>,
}

impl JsonBlockFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PangeblocksError> {
        let blocks = read_blocks(open_maybe_gzipped(&path)?)?;
        info!("Read {} maximal blocks from {:?}.", blocks.len(), path.as_ref());

        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

impl MaximalBlockSource for JsonBlockFile {
    fn maximal_blocks(&self, msa: &Msa, range: ColumnRange) -> Result<Vec<Block>, PangeblocksError> {
        self.blocks.maximal_blocks(msa, range)
    }
}

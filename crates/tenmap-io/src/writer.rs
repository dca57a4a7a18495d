//! Incremental writer for tensor map containers
//!
//! [`TensorMapWriter`] makes the container state machine explicit: the header,
//! then the keys, then exactly one block per key row, then [`finish`]. Calls in
//! any other order fail with [`IoError::InvalidState`], and any error moves the
//! writer to [`WriterState::Failed`], after which every call fails.
//!
//! [`finish`]: TensorMapWriter::finish

use std::io::Write;

use tenmap_core::{Labels, MapConfig, TensorBlock};
use tracing::{debug, trace};

use crate::config::WriteConfig;
use crate::error::{IoError, IoResult};
use crate::format::{ContainerKind, Header, FLAG_CHECKSUM, FLAG_HETEROGENEOUS_PROPERTIES};
use crate::primitives::Encoder;

/// Position of a [`TensorMapWriter`] in the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing written yet
    Idle,
    /// The header is being written
    WritingHeader,
    /// The header is written, the keys are next
    WritingKeys,
    /// The keys are written, block `i` is next
    WritingBlocks(usize),
    /// The container is complete
    Done,
    /// An error occurred, the output is unusable
    Failed,
}

/// Streaming writer for a single tensor map container
///
/// # Examples
///
/// ```
/// use tenmap_core::{DenseArray, Labels, MapConfig, TensorBlock};
/// use tenmap_io::{TensorMapWriter, WriteConfig, WriterState};
///
/// let block = TensorBlock::new(
///     DenseArray::zeros(&[1, 1]),
///     Labels::new(["s"], &[[0]]).unwrap(),
///     vec![],
///     Labels::new(["p"], &[[0]]).unwrap(),
/// )
/// .unwrap();
///
/// let mut writer = TensorMapWriter::new(Vec::new(), WriteConfig::default());
/// writer.write_header(MapConfig::default()).unwrap();
/// writer.write_keys(&Labels::single()).unwrap();
/// writer.write_block(&block).unwrap();
/// writer.finish().unwrap();
/// assert_eq!(writer.state(), WriterState::Done);
///
/// let bytes = writer.into_inner();
/// assert_eq!(&bytes[..4], b"TMAP");
/// ```
pub struct TensorMapWriter<W: Write> {
    encoder: Encoder<W>,
    config: WriteConfig,
    state: WriterState,
    block_count: usize,
}

impl<W: Write> TensorMapWriter<W> {
    /// Create a writer on top of `inner`
    pub fn new(inner: W, config: WriteConfig) -> Self {
        Self {
            encoder: Encoder::new(inner, config.byte_order),
            config,
            state: WriterState::Idle,
            block_count: 0,
        }
    }

    /// Current state of the writer
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Write the container header, recording the map configuration
    pub fn write_header(&mut self, map_config: MapConfig) -> IoResult<()> {
        self.expect_state(WriterState::Idle, "write_header")?;
        self.state = WriterState::WritingHeader;

        let mut flags = 0;
        if map_config.heterogeneous_properties {
            flags |= FLAG_HETEROGENEOUS_PROPERTIES;
        }
        if self.config.checksum {
            flags |= FLAG_CHECKSUM;
        }
        let header = Header::new(self.config.byte_order, ContainerKind::TensorMap, flags);

        let result = self.encoder.write_header(&header).map_err(IoError::from);
        self.advance(result, WriterState::WritingKeys)
    }

    /// Write the keys, and the number of blocks that will follow
    pub fn write_keys(&mut self, keys: &Labels) -> IoResult<()> {
        self.expect_state(WriterState::WritingKeys, "write_keys")?;

        let result = self
            .encoder
            .write_labels(keys)
            .and_then(|()| Ok(self.encoder.write_u64(keys.count() as u64)?));
        self.block_count = keys.count();
        debug!(keys = keys.count(), names = ?keys.names(), "wrote tensor map keys");
        self.advance(result, WriterState::WritingBlocks(0))
    }

    /// Write the next block, in key order
    pub fn write_block(&mut self, block: &TensorBlock) -> IoResult<()> {
        let index = match self.state {
            WriterState::WritingBlocks(i) if i < self.block_count => i,
            WriterState::WritingBlocks(_) => {
                self.state = WriterState::Failed;
                return Err(IoError::InvalidState(format!(
                    "all {} blocks have already been written",
                    self.block_count
                )));
            }
            state => return Err(self.fail_on(state, "write_block")),
        };

        trace!(index, shape = ?block.shape(), "writing block");
        let result = self.encoder.write_block(block);
        self.advance(result, WriterState::WritingBlocks(index + 1))
    }

    /// Complete the container, writing the checksum trailer if enabled
    pub fn finish(&mut self) -> IoResult<()> {
        match self.state {
            WriterState::WritingBlocks(i) if i == self.block_count => {}
            WriterState::WritingBlocks(i) => {
                self.state = WriterState::Failed;
                return Err(IoError::InvalidState(format!(
                    "only {} of {} blocks have been written",
                    i, self.block_count
                )));
            }
            state => return Err(self.fail_on(state, "finish")),
        }

        let mut result = Ok(());
        if self.config.checksum {
            result = self.encoder.write_checksum();
        }
        let result = result
            .and_then(|()| self.encoder.flush())
            .map_err(IoError::from);
        self.advance(result, WriterState::Done)
    }

    /// Write a complete map: header, keys, every block and the trailer
    pub fn write_map(&mut self, keys: &Labels, blocks: &[TensorBlock], config: MapConfig) -> IoResult<()> {
        self.write_header(config)?;
        self.write_keys(keys)?;
        for block in blocks {
            self.write_block(block)?;
        }
        self.finish()
    }

    /// Give back the underlying writer
    pub fn into_inner(self) -> W {
        self.encoder.into_inner()
    }

    fn expect_state(&mut self, expected: WriterState, operation: &str) -> IoResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.fail_on(self.state, operation))
        }
    }

    fn fail_on(&mut self, state: WriterState, operation: &str) -> IoError {
        self.state = WriterState::Failed;
        IoError::InvalidState(format!("can not call {} in state {:?}", operation, state))
    }

    fn advance(&mut self, result: IoResult<()>, next: WriterState) -> IoResult<()> {
        match result {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                self.state = WriterState::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenmap_core::DenseArray;

    fn block() -> TensorBlock {
        TensorBlock::new(
            DenseArray::zeros(&[1, 1]),
            Labels::new(["s"], &[[0]]).unwrap(),
            vec![],
            Labels::new(["p"], &[[0]]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let mut writer = TensorMapWriter::new(Vec::new(), WriteConfig::default());
        assert_eq!(writer.state(), WriterState::Idle);
        writer.write_header(MapConfig::default()).unwrap();
        assert_eq!(writer.state(), WriterState::WritingKeys);
        writer.write_keys(&Labels::single()).unwrap();
        assert_eq!(writer.state(), WriterState::WritingBlocks(0));
        writer.write_block(&block()).unwrap();
        assert_eq!(writer.state(), WriterState::WritingBlocks(1));
        writer.finish().unwrap();
        assert_eq!(writer.state(), WriterState::Done);
    }

    #[test]
    fn test_keys_before_header_fails() {
        let mut writer = TensorMapWriter::new(Vec::new(), WriteConfig::default());
        let result = writer.write_keys(&Labels::single());
        assert!(matches!(result, Err(IoError::InvalidState(_))));
        assert_eq!(writer.state(), WriterState::Failed);

        // every later call fails
        assert!(writer.write_header(MapConfig::default()).is_err());
    }

    #[test]
    fn test_too_many_blocks() {
        let mut writer = TensorMapWriter::new(Vec::new(), WriteConfig::default());
        writer.write_header(MapConfig::default()).unwrap();
        writer.write_keys(&Labels::single()).unwrap();
        writer.write_block(&block()).unwrap();
        assert!(matches!(
            writer.write_block(&block()),
            Err(IoError::InvalidState(_))
        ));
        assert_eq!(writer.state(), WriterState::Failed);
    }

    #[test]
    fn test_finish_with_missing_blocks() {
        let keys = Labels::new(["k"], &[[0], [1]]).unwrap();
        let mut writer = TensorMapWriter::new(Vec::new(), WriteConfig::default());
        writer.write_header(MapConfig::default()).unwrap();
        writer.write_keys(&keys).unwrap();
        writer.write_block(&block()).unwrap();
        assert!(matches!(writer.finish(), Err(IoError::InvalidState(_))));
    }

    #[test]
    fn test_checksum_flag_controls_trailer() {
        let mut with = TensorMapWriter::new(Vec::new(), WriteConfig::new().checksum(true));
        with.write_map(&Labels::single(), &[block()], MapConfig::default())
            .unwrap();
        let mut without = TensorMapWriter::new(Vec::new(), WriteConfig::new().checksum(false));
        without
            .write_map(&Labels::single(), &[block()], MapConfig::default())
            .unwrap();

        assert_eq!(with.into_inner().len(), without.into_inner().len() + 4);
    }
}

//! Streaming reader for tensor map containers
//!
//! [`TensorMapReader`] decodes a container one step at a time: header, keys,
//! then blocks on demand. It also implements [`Iterator`] over the blocks, so
//! a large map can be processed without holding every block in memory.
//!
//! Every block is rebuilt through the validating constructors of
//! `tenmap-core`, so a reader never yields an object breaking an invariant.

use std::io::Read;
use std::sync::Arc;

use tenmap_core::{Array, DenseArray, Labels, MapConfig, TensorBlock, TensorMap};
use tracing::{debug, debug_span, trace, warn};

use crate::config::ReadConfig;
use crate::error::{IoError, IoResult};
use crate::format::{ContainerKind, Header};
use crate::primitives::Decoder;

/// Allocator used for block values when none is given: a zero-filled
/// [`DenseArray`]
pub fn default_create_array(shape: &[usize]) -> Box<dyn Array> {
    DenseArray::zeros(shape).boxed()
}

/// Default array allocator type of [`TensorMapReader`]
pub type CreateArrayFn = fn(&[usize]) -> Box<dyn Array>;

/// Position of a [`TensorMapReader`] in the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Nothing read yet
    Idle,
    /// The header is being read
    ReadingHeader,
    /// The header is read and being checked
    Validating,
    /// The header is valid, the keys are next
    ReadingKeys,
    /// The keys are read, block `i` is next
    ReadingBlocks(usize),
    /// Every block and the trailer have been read
    Done,
    /// An error occurred, no more data can be read
    Failed,
}

/// Read and check the header of a container of the given kind
pub(crate) fn read_container_header<R: Read>(
    decoder: &mut Decoder<R>,
    kind: ContainerKind,
) -> IoResult<Header> {
    let header = decoder.read_header()?;
    check_header(&header, kind)?;
    Ok(header)
}

fn check_header(header: &Header, kind: ContainerKind) -> IoResult<()> {
    header.validate()?;
    if header.kind != kind {
        return Err(IoError::malformed(format!(
            "expected a {:?} container, found a {:?} container",
            kind, header.kind
        )));
    }
    Ok(())
}

/// Read the CRC32 trailer if the header declares one
pub(crate) fn read_trailer<R: Read>(
    decoder: &mut Decoder<R>,
    header: &Header,
    config: &ReadConfig,
) -> IoResult<()> {
    if !header.has_checksum() {
        return Ok(());
    }
    if !config.verify_checksum {
        warn!("checksum verification is disabled, skipping the container checksum");
    }
    decoder.read_checksum(config.verify_checksum)
}

/// Streaming reader for a single tensor map container
///
/// The type parameter `F` is the allocator called with the shape of every
/// value array before its data is filled in.
///
/// # Examples
///
/// ```
/// use tenmap_core::{DenseArray, Labels, TensorBlock, TensorMap};
/// use tenmap_io::{save_buffer, ReadConfig, TensorMapReader};
///
/// let block = TensorBlock::new(
///     DenseArray::from_elem(&[1, 1], 2.0),
///     Labels::new(["s"], &[[0]]).unwrap(),
///     vec![],
///     Labels::new(["p"], &[[0]]).unwrap(),
/// )
/// .unwrap();
/// let map = TensorMap::new(Labels::single(), vec![block]).unwrap();
/// let bytes = save_buffer(&map).unwrap();
///
/// let reader = TensorMapReader::new(bytes.as_slice(), ReadConfig::default());
/// let blocks: Vec<TensorBlock> = reader.collect::<Result<_, _>>().unwrap();
/// assert_eq!(blocks.len(), 1);
/// assert_eq!(blocks[0].values().data(), &[2.0]);
/// ```
pub struct TensorMapReader<R: Read, F = CreateArrayFn> {
    decoder: Decoder<R>,
    config: ReadConfig,
    create_array: F,
    state: ReaderState,
    header: Option<Header>,
    keys: Option<Arc<Labels>>,
    block_count: usize,
}

impl<R: Read> TensorMapReader<R> {
    /// Create a reader allocating values with [`default_create_array`]
    pub fn new(inner: R, config: ReadConfig) -> Self {
        Self::with_array_creator(inner, config, default_create_array as CreateArrayFn)
    }
}

impl<R, F> TensorMapReader<R, F>
where
    R: Read,
    F: FnMut(&[usize]) -> Box<dyn Array>,
{
    /// Create a reader allocating values through `create_array`
    pub fn with_array_creator(inner: R, config: ReadConfig, create_array: F) -> Self {
        Self {
            decoder: Decoder::new(inner),
            config,
            create_array,
            state: ReaderState::Idle,
            header: None,
            keys: None,
            block_count: 0,
        }
    }

    /// Current state of the reader
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Header of the container, once read
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Keys of the map, once read
    pub fn keys(&self) -> Option<&Arc<Labels>> {
        self.keys.as_ref()
    }

    /// Read and validate the header, returning the stored map configuration
    ///
    /// # Errors
    ///
    /// - [`IoError::CorruptHeader`] for bad magic bytes, markers or a
    ///   truncated header
    /// - [`IoError::UnsupportedVersion`] for containers newer than this reader
    pub fn read_header(&mut self) -> IoResult<MapConfig> {
        self.expect_state(ReaderState::Idle, "read_header")?;

        self.state = ReaderState::ReadingHeader;
        let header = self.decoder.read_header();
        let header = self.guard(header)?;

        self.state = ReaderState::Validating;
        let valid = check_header(&header, ContainerKind::TensorMap);
        self.guard(valid)?;

        debug!(
            version = header.version,
            byte_order = ?header.byte_order,
            flags = header.flags,
            "read container header"
        );
        self.header = Some(header);
        self.state = ReaderState::ReadingKeys;
        Ok(MapConfig::new().heterogeneous_properties(header.heterogeneous_properties()))
    }

    /// Read the keys of the map
    pub fn read_keys(&mut self) -> IoResult<Arc<Labels>> {
        self.expect_state(ReaderState::ReadingKeys, "read_keys")?;

        let keys = self.decoder.read_labels();
        let keys = Arc::new(self.guard(keys)?);
        let count = self.decoder.read_u64("block count");
        let count = self.guard(count)?;
        if count != keys.count() as u64 {
            let error = IoError::malformed(format!(
                "the container has {} blocks for {} keys",
                count,
                keys.count()
            ));
            return self.guard(Err(error));
        }

        debug!(keys = keys.count(), names = ?keys.names(), "read tensor map keys");
        self.block_count = keys.count();
        self.keys = Some(Arc::clone(&keys));
        self.state = ReaderState::ReadingBlocks(0);
        Ok(keys)
    }

    /// Read the next block, or `None` once every block has been read
    ///
    /// Reading past the last block consumes (and verifies) the checksum
    /// trailer.
    pub fn next_block(&mut self) -> IoResult<Option<TensorBlock>> {
        let index = match self.state {
            ReaderState::ReadingBlocks(i) => i,
            ReaderState::Done => return Ok(None),
            state => return Err(self.fail_on(state, "next_block")),
        };

        if index == self.block_count {
            let finished = self.finish();
            self.guard(finished)?;
            self.state = ReaderState::Done;
            return Ok(None);
        }

        let block = self.decoder.read_block(&mut self.create_array, 0);
        let block = self.guard(block)?;
        trace!(index, shape = ?block.shape(), "read block");
        self.state = ReaderState::ReadingBlocks(index + 1);
        Ok(Some(block))
    }

    /// Read the whole map, validating it with [`TensorMap::with_config`]
    ///
    /// Can be called on a fresh reader, or after [`read_header`] and
    /// [`read_keys`].
    ///
    /// [`read_header`]: TensorMapReader::read_header
    /// [`read_keys`]: TensorMapReader::read_keys
    pub fn read_map(&mut self) -> IoResult<TensorMap> {
        let _span = debug_span!("read_tensor_map").entered();

        if self.state == ReaderState::Idle {
            self.read_header()?;
        }
        let keys = match (self.state, self.keys.clone()) {
            (ReaderState::ReadingKeys, _) => self.read_keys()?,
            (ReaderState::ReadingBlocks(0), Some(keys)) => keys,
            (state, _) => return Err(self.fail_on(state, "read_map")),
        };

        let mut blocks = Vec::with_capacity(self.block_count.min(1024));
        while let Some(block) = self.next_block()? {
            blocks.push(block);
        }

        let config = self
            .header
            .map(|h| MapConfig::new().heterogeneous_properties(h.heterogeneous_properties()))
            .unwrap_or_default();
        let map = TensorMap::with_config(keys, blocks, config).map_err(IoError::from);
        let map = self.guard(map)?;
        debug!(blocks = map.len(), "read tensor map");
        Ok(map)
    }

    /// Check that nothing follows the container in the stream
    ///
    /// Only meaningful once the reader is [`ReaderState::Done`]; the
    /// streaming API itself stops at the end of the container, so several
    /// containers can follow each other in one stream.
    pub fn expect_end(&mut self) -> IoResult<()> {
        if self.state != ReaderState::Done {
            return Err(self.fail_on(self.state, "expect_end"));
        }
        let end = self.decoder.expect_end();
        self.guard(end)
    }

    /// Give back the underlying reader
    pub fn into_inner(self) -> R {
        self.decoder.into_inner()
    }

    fn finish(&mut self) -> IoResult<()> {
        match self.header {
            Some(header) => read_trailer(&mut self.decoder, &header, &self.config),
            None => Err(IoError::InvalidState("no header has been read".into())),
        }
    }

    fn expect_state(&mut self, expected: ReaderState, operation: &str) -> IoResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.fail_on(self.state, operation))
        }
    }

    fn fail_on(&mut self, state: ReaderState, operation: &str) -> IoError {
        self.state = ReaderState::Failed;
        IoError::InvalidState(format!("can not call {} in state {:?}", operation, state))
    }

    fn guard<T>(&mut self, result: IoResult<T>) -> IoResult<T> {
        if result.is_err() {
            self.state = ReaderState::Failed;
        }
        result
    }
}

impl<R, F> Iterator for TensorMapReader<R, F>
where
    R: Read,
    F: FnMut(&[usize]) -> Box<dyn Array>,
{
    type Item = IoResult<TensorBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == ReaderState::Idle {
            if let Err(e) = self.read_header() {
                return Some(Err(e));
            }
        }
        if self.state == ReaderState::ReadingKeys {
            if let Err(e) = self.read_keys() {
                return Some(Err(e));
            }
        }
        match self.state {
            ReaderState::Failed | ReaderState::Done => None,
            _ => self.next_block().transpose(),
        }
    }
}

//! High-level entry points for the container format
//!
//! Three kinds of containers share the same header and trailer: a full
//! [`TensorMap`], a single [`TensorBlock`] (with its gradients) and a single
//! [`Labels`]. Each kind has functions working on any [`Read`]/[`Write`]
//! stream, on in-memory buffers, and (for maps) on files.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Instant;

use tenmap_core::{Array, Labels, TensorBlock, TensorMap};
use tracing::debug_span;

use crate::config::{ReadConfig, WriteConfig};
use crate::error::IoResult;
use crate::format::{ContainerKind, Header, FLAG_CHECKSUM};
use crate::primitives::{Decoder, Encoder};
use crate::reader::{default_create_array, read_container_header, read_trailer, TensorMapReader};
use crate::tracing_support::{record_bytes, record_io};
use crate::writer::TensorMapWriter;

/// Write `map` to `writer`
pub fn write<W: Write>(writer: W, map: &TensorMap, config: &WriteConfig) -> IoResult<()> {
    let _span = debug_span!("write_tensor_map", blocks = map.len()).entered();
    let mut writer = TensorMapWriter::new(writer, *config);
    writer.write_map(map.keys(), map.blocks(), map.config())
}

/// Read a map from `reader`, allocating values as [`DenseArray`]s
///
/// Reading stops at the end of the container; bytes following it are left in
/// `reader`.
///
/// [`DenseArray`]: tenmap_core::DenseArray
pub fn read<R: Read>(reader: R, config: &ReadConfig) -> IoResult<TensorMap> {
    TensorMapReader::new(reader, *config).read_map()
}

/// Read a map from `reader`, allocating every value array with
/// `create_array`
///
/// `create_array` is called with the shape of each array and must return a
/// zero-filled array of exactly that shape.
pub fn load_with<R, F>(reader: R, config: &ReadConfig, create_array: F) -> IoResult<TensorMap>
where
    R: Read,
    F: FnMut(&[usize]) -> Box<dyn Array>,
{
    TensorMapReader::with_array_creator(reader, *config, create_array).read_map()
}

/// Save `map` to the file at `path`, with the default [`WriteConfig`]
pub fn save<P: AsRef<Path>>(path: P, map: &TensorMap) -> IoResult<()> {
    let path = path.as_ref();
    let _span = debug_span!("save", path = %path.display()).entered();
    let start = Instant::now();
    let mut file = BufWriter::new(File::create(path)?);
    write(&mut file, map, &WriteConfig::default())?;
    file.flush()?;

    let bytes = file.get_ref().metadata()?.len();
    record_io("save", &path.display().to_string(), bytes, start.elapsed().as_millis() as u64);
    Ok(())
}

/// Load a map from the file at `path`, with the default [`ReadConfig`]
///
/// The file must contain exactly one container.
pub fn load<P: AsRef<Path>>(path: P) -> IoResult<TensorMap> {
    let path = path.as_ref();
    let _span = debug_span!("load", path = %path.display()).entered();
    let start = Instant::now();
    let file = File::open(path)?;
    let bytes = file.metadata()?.len();
    let mut reader = TensorMapReader::new(BufReader::new(file), ReadConfig::default());
    let map = reader.read_map()?;
    reader.expect_end()?;

    record_io("load", &path.display().to_string(), bytes, start.elapsed().as_millis() as u64);
    Ok(map)
}

/// Serialize `map` to a new buffer, with the default [`WriteConfig`]
pub fn save_buffer(map: &TensorMap) -> IoResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write(&mut buffer, map, &WriteConfig::default())?;
    record_bytes("save_buffer", buffer.len());
    Ok(buffer)
}

/// Deserialize a map from `buffer`, which must contain exactly one container
pub fn load_buffer(buffer: &[u8]) -> IoResult<TensorMap> {
    record_bytes("load_buffer", buffer.len());
    let mut reader = TensorMapReader::new(buffer, ReadConfig::default());
    let map = reader.read_map()?;
    reader.expect_end()?;
    Ok(map)
}

/// Write a single block (and its gradients) to `writer`
pub fn write_block<W: Write>(writer: W, block: &TensorBlock, config: &WriteConfig) -> IoResult<()> {
    let mut encoder = Encoder::new(writer, config.byte_order);
    encoder.write_header(&header(ContainerKind::TensorBlock, config))?;
    encoder.write_block(block)?;
    finish(encoder, config)
}

/// Read a single block container from `reader`
///
/// Like [`read`], this stops at the end of the container.
pub fn read_block<R: Read>(reader: R, config: &ReadConfig) -> IoResult<TensorBlock> {
    decode_block(&mut Decoder::new(reader), config)
}

/// Serialize a single block to a new buffer
pub fn save_block_buffer(block: &TensorBlock) -> IoResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_block(&mut buffer, block, &WriteConfig::default())?;
    Ok(buffer)
}

/// Deserialize a single block from `buffer`
pub fn load_block_buffer(buffer: &[u8]) -> IoResult<TensorBlock> {
    let mut decoder = Decoder::new(buffer);
    let block = decode_block(&mut decoder, &ReadConfig::default())?;
    decoder.expect_end()?;
    Ok(block)
}

/// Write a single Labels to `writer`
pub fn write_labels<W: Write>(writer: W, labels: &Labels, config: &WriteConfig) -> IoResult<()> {
    let mut encoder = Encoder::new(writer, config.byte_order);
    encoder.write_header(&header(ContainerKind::Labels, config))?;
    encoder.write_labels(labels)?;
    finish(encoder, config)
}

/// Read a single Labels container from `reader`
///
/// Like [`read`], this stops at the end of the container.
pub fn read_labels<R: Read>(reader: R, config: &ReadConfig) -> IoResult<Labels> {
    decode_labels(&mut Decoder::new(reader), config)
}

/// Serialize a single Labels to a new buffer
pub fn save_labels_buffer(labels: &Labels) -> IoResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_labels(&mut buffer, labels, &WriteConfig::default())?;
    Ok(buffer)
}

/// Deserialize a single Labels from `buffer`
pub fn load_labels_buffer(buffer: &[u8]) -> IoResult<Labels> {
    let mut decoder = Decoder::new(buffer);
    let labels = decode_labels(&mut decoder, &ReadConfig::default())?;
    decoder.expect_end()?;
    Ok(labels)
}

fn header(kind: ContainerKind, config: &WriteConfig) -> Header {
    let flags = if config.checksum { FLAG_CHECKSUM } else { 0 };
    Header::new(config.byte_order, kind, flags)
}

fn finish<W: Write>(mut encoder: Encoder<W>, config: &WriteConfig) -> IoResult<()> {
    if config.checksum {
        encoder.write_checksum()?;
    }
    encoder.flush()?;
    Ok(())
}

fn decode_block<R: Read>(decoder: &mut Decoder<R>, config: &ReadConfig) -> IoResult<TensorBlock> {
    let header = read_container_header(decoder, ContainerKind::TensorBlock)?;
    let mut create_array = default_create_array;
    let block = decoder.read_block(&mut create_array, 0)?;
    read_trailer(decoder, &header, config)?;
    Ok(block)
}

fn decode_labels<R: Read>(decoder: &mut Decoder<R>, config: &ReadConfig) -> IoResult<Labels> {
    let header = read_container_header(decoder, ContainerKind::Labels)?;
    let labels = decoder.read_labels()?;
    read_trailer(decoder, &header, config)?;
    Ok(labels)
}

//! Byte-level encoding of Labels and blocks
//!
//! [`Encoder`] and [`Decoder`] wrap a stream, convert values to and from the
//! declared byte order, and keep a running CRC32 of every byte that goes
//! through them.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crc32fast::Hasher;
use tenmap_core::{Array, Labels, TensorBlock, TensorError};
use tracing::trace;

use crate::error::{DeserializationError, IoError, IoResult};
use crate::format::{ByteOrder, Header, HEADER_SIZE};

/// Maximum nesting of gradients of gradients accepted when decoding
pub const MAX_GRADIENT_DEPTH: usize = 16;

/// Number of elements converted per chunk when writing numeric arrays
const CHUNK_ELEMENTS: usize = 8192;

macro_rules! to_bytes {
    ($value:expr, $order:expr) => {
        match $order {
            ByteOrder::Little => $value.to_le_bytes(),
            ByteOrder::Big => $value.to_be_bytes(),
        }
    };
}

pub(crate) struct Encoder<W> {
    inner: W,
    byte_order: ByteOrder,
    hasher: Hasher,
}

impl<W: Write> Encoder<W> {
    pub(crate) fn new(inner: W, byte_order: ByteOrder) -> Self {
        Self {
            inner,
            byte_order,
            hasher: Hasher::new(),
        }
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.hasher.update(bytes);
        self.inner.write_all(bytes)
    }

    pub(crate) fn write_header(&mut self, header: &Header) -> io::Result<()> {
        self.write_bytes(&header.to_bytes())
    }

    pub(crate) fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_bytes(&to_bytes!(value, self.byte_order))
    }

    pub(crate) fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.write_bytes(&to_bytes!(value, self.byte_order))
    }

    pub(crate) fn write_len(&mut self, len: usize) -> IoResult<()> {
        let len = u32::try_from(len).map_err(|_| {
            IoError::InvalidState(format!("{} does not fit in a 32-bit length", len))
        })?;
        Ok(self.write_u32(len)?)
    }

    pub(crate) fn write_str(&mut self, value: &str) -> IoResult<()> {
        self.write_len(value.len())?;
        Ok(self.write_bytes(value.as_bytes())?)
    }

    fn write_i32_slice(&mut self, values: &[i32]) -> io::Result<()> {
        let mut buffer = Vec::with_capacity(4 * values.len().min(CHUNK_ELEMENTS));
        for chunk in values.chunks(CHUNK_ELEMENTS) {
            buffer.clear();
            for value in chunk {
                buffer.extend_from_slice(&to_bytes!(*value, self.byte_order));
            }
            self.write_bytes(&buffer)?;
        }
        Ok(())
    }

    fn write_f64_slice(&mut self, values: &[f64]) -> io::Result<()> {
        let mut buffer = Vec::with_capacity(8 * values.len().min(CHUNK_ELEMENTS));
        for chunk in values.chunks(CHUNK_ELEMENTS) {
            buffer.clear();
            for value in chunk {
                buffer.extend_from_slice(&to_bytes!(*value, self.byte_order));
            }
            self.write_bytes(&buffer)?;
        }
        Ok(())
    }

    pub(crate) fn write_labels(&mut self, labels: &Labels) -> IoResult<()> {
        self.write_len(labels.names().len())?;
        for name in labels.names() {
            self.write_str(name)?;
        }
        self.write_u64(labels.count() as u64)?;
        self.write_len(labels.size())?;
        self.write_i32_slice(labels.values())?;
        Ok(())
    }

    pub(crate) fn write_block(&mut self, block: &TensorBlock) -> IoResult<()> {
        self.write_labels(block.samples())?;
        self.write_len(block.components().len())?;
        for component in block.components() {
            self.write_labels(component)?;
        }
        self.write_labels(block.properties())?;

        let shape = block.shape();
        self.write_len(shape.len())?;
        for &dim in shape {
            self.write_u64(dim as u64)?;
        }
        self.write_f64_slice(block.values().data())?;

        self.write_len(block.gradient_count())?;
        for (parameter, gradient) in block.gradients() {
            trace!(parameter, shape = ?gradient.shape(), "writing gradient");
            self.write_str(parameter)?;
            self.write_block(gradient)?;
        }
        Ok(())
    }

    /// Append the CRC32 of everything written so far; the trailer itself is
    /// not part of the checksum
    pub(crate) fn write_checksum(&mut self) -> io::Result<()> {
        let checksum = self.hasher.clone().finalize();
        self.inner
            .write_all(&to_bytes!(checksum, self.byte_order))
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

pub(crate) struct Decoder<R> {
    inner: R,
    byte_order: ByteOrder,
    hasher: Hasher,
}

impl<R: Read> Decoder<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            byte_order: ByteOrder::default(),
            hasher: Hasher::new(),
        }
    }

    /// Read the raw header; the byte order of every following value is taken
    /// from it
    pub(crate) fn read_header(&mut self) -> IoResult<Header> {
        let mut bytes = [0u8; HEADER_SIZE];
        self.inner.read_exact(&mut bytes).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                IoError::corrupt_header("truncated header")
            } else {
                IoError::Io(e)
            }
        })?;
        self.hasher.update(&bytes);

        let header = Header::parse(&bytes)?;
        self.byte_order = header.byte_order;
        Ok(header)
    }

    fn read_array<const N: usize>(&mut self, what: &str) -> IoResult<[u8; N]> {
        let mut bytes = [0u8; N];
        self.inner
            .read_exact(&mut bytes)
            .map_err(|e| eof_as_truncated(e, what))?;
        self.hasher.update(&bytes);
        Ok(bytes)
    }

    pub(crate) fn read_u32(&mut self, what: &str) -> IoResult<u32> {
        let bytes = self.read_array::<4>(what)?;
        Ok(match self.byte_order {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }

    pub(crate) fn read_u64(&mut self, what: &str) -> IoResult<u64> {
        let bytes = self.read_array::<8>(what)?;
        Ok(match self.byte_order {
            ByteOrder::Little => u64::from_le_bytes(bytes),
            ByteOrder::Big => u64::from_be_bytes(bytes),
        })
    }

    fn read_usize(&mut self, what: &str) -> IoResult<usize> {
        let value = self.read_u64(what)?;
        usize::try_from(value)
            .map_err(|_| IoError::malformed(format!("{} {} does not fit in memory", what, value)))
    }

    /// Read exactly `len` bytes, growing the buffer only as data arrives
    fn read_payload(&mut self, len: usize, what: &str) -> IoResult<Vec<u8>> {
        let mut buffer = Vec::new();
        (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut buffer)?;
        if buffer.len() < len {
            return Err(IoError::truncated(what));
        }
        self.hasher.update(&buffer);
        Ok(buffer)
    }

    pub(crate) fn read_string(&mut self, what: &str) -> IoResult<String> {
        let len = self.read_u32(what)? as usize;
        let bytes = self.read_payload(len, what)?;
        String::from_utf8(bytes).map_err(|e| {
            IoError::Deserialization(DeserializationError::InvalidString(format!(
                "{} in {}",
                e, what
            )))
        })
    }

    pub(crate) fn read_labels(&mut self) -> IoResult<Labels> {
        let name_count = self.read_u32("Labels name count")? as usize;
        let mut names = Vec::new();
        for _ in 0..name_count {
            names.push(self.read_string("Labels dimension name")?);
        }

        let count = self.read_usize("Labels row count")?;
        let width = self.read_u32("Labels row width")? as usize;
        if width != name_count {
            return Err(IoError::malformed(format!(
                "Labels row width {} does not match the {} dimension names",
                width, name_count
            )));
        }
        if width == 0 && count != 0 {
            return Err(IoError::malformed(format!(
                "Labels without dimensions can not have {} rows",
                count
            )));
        }

        let len = count
            .checked_mul(width)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IoError::malformed("Labels size overflows"))?;
        let bytes = self.read_payload(len, "Labels values")?;
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| {
                let chunk = [chunk[0], chunk[1], chunk[2], chunk[3]];
                match self.byte_order {
                    ByteOrder::Little => i32::from_le_bytes(chunk),
                    ByteOrder::Big => i32::from_be_bytes(chunk),
                }
            })
            .collect();

        Ok(Labels::from_flat(&names, values)?)
    }

    pub(crate) fn read_block<F>(&mut self, create_array: &mut F, depth: usize) -> IoResult<TensorBlock>
    where
        F: FnMut(&[usize]) -> Box<dyn Array>,
    {
        let samples = self.read_labels()?;
        let component_count = self.read_u32("component count")? as usize;
        let mut components = Vec::new();
        for _ in 0..component_count {
            components.push(Arc::new(self.read_labels()?));
        }
        let properties = self.read_labels()?;

        let rank = self.read_u32("values rank")? as usize;
        if rank != component_count + 2 {
            return Err(IoError::malformed(format!(
                "values of rank {} can not hold {} component axes",
                rank, component_count
            )));
        }
        let mut shape = Vec::with_capacity(rank);
        for _ in 0..rank {
            shape.push(self.read_usize("values shape")?);
        }

        let mut expected = Vec::with_capacity(rank);
        expected.push(samples.count());
        expected.extend(components.iter().map(|component| component.count()));
        expected.push(properties.count());
        if shape != expected {
            return Err(TensorError::shape_mismatch("values", expected, shape).into());
        }

        // zero-length axes make the element count vanish, but an array of
        // this shape must still be allocatable
        let fits = shape
            .iter()
            .filter(|&&dim| dim != 0)
            .try_fold(8usize, |acc, &dim| acc.checked_mul(dim))
            .map_or(false, |bytes| bytes <= isize::MAX as usize);
        if !fits {
            return Err(IoError::malformed(format!("values shape {:?} overflows", shape)));
        }
        let count: usize = shape.iter().product();
        let bytes = self.read_payload(8 * count, "block values")?;

        let mut values = create_array(&shape);
        if values.shape() != shape.as_slice() {
            return Err(IoError::malformed(format!(
                "array allocator returned shape {:?}, expected {:?}",
                values.shape(),
                shape
            )));
        }
        if values.data().len() != count {
            return Err(IoError::malformed(format!(
                "array allocator returned {} values for shape {:?}",
                values.data().len(),
                shape
            )));
        }
        for (value, chunk) in values.data_mut().iter_mut().zip(bytes.chunks_exact(8)) {
            let chunk = [
                chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
            ];
            *value = match self.byte_order {
                ByteOrder::Little => f64::from_le_bytes(chunk),
                ByteOrder::Big => f64::from_be_bytes(chunk),
            };
        }

        let mut block = TensorBlock::new(values, samples, components, properties)?;

        let gradient_count = self.read_u32("gradient count")? as usize;
        if gradient_count > 0 && depth >= MAX_GRADIENT_DEPTH {
            return Err(IoError::malformed(format!(
                "gradients nested deeper than {} levels",
                MAX_GRADIENT_DEPTH
            )));
        }
        for _ in 0..gradient_count {
            let parameter = self.read_string("gradient parameter")?;
            trace!(parameter = %parameter, depth, "reading gradient");
            let gradient = self.read_block(create_array, depth + 1)?;
            block.add_gradient(&parameter, gradient)?;
        }

        Ok(block)
    }

    /// Check the CRC32 trailer against every byte read so far
    pub(crate) fn read_checksum(&mut self, verify: bool) -> IoResult<()> {
        let computed = self.hasher.clone().finalize();
        let mut bytes = [0u8; 4];
        self.inner
            .read_exact(&mut bytes)
            .map_err(|e| eof_as_truncated(e, "checksum"))?;
        let stored = match self.byte_order {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        };

        if verify && stored != computed {
            return Err(IoError::Deserialization(
                DeserializationError::ChecksumMismatch { stored, computed },
            ));
        }
        Ok(())
    }

    /// Fail if the stream has bytes left
    pub(crate) fn expect_end(&mut self) -> IoResult<()> {
        let mut byte = [0u8; 1];
        match self.inner.read(&mut byte)? {
            0 => Ok(()),
            _ => Err(IoError::malformed("unexpected data after the end of the container")),
        }
    }

    pub(crate) fn into_inner(self) -> R {
        self.inner
    }
}

fn eof_as_truncated(error: io::Error, what: &str) -> IoError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        IoError::truncated(what)
    } else {
        IoError::Io(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ContainerKind;
    use std::io::Cursor;
    use tenmap_core::DenseArray;

    fn encode_labels(labels: &Labels, byte_order: ByteOrder) -> Vec<u8> {
        let mut encoder = Encoder::new(Vec::new(), byte_order);
        encoder.write_labels(labels).unwrap();
        encoder.into_inner()
    }

    fn decoder(bytes: &[u8], byte_order: ByteOrder) -> Decoder<Cursor<&[u8]>> {
        let mut decoder = Decoder::new(Cursor::new(bytes));
        decoder.byte_order = byte_order;
        decoder
    }

    #[test]
    fn test_labels_layout() {
        let labels = Labels::new(["a"], &[[1], [2]]).unwrap();
        let bytes = encode_labels(&labels, ByteOrder::Little);
        assert_eq!(
            bytes,
            vec![
                1, 0, 0, 0, // one name
                1, 0, 0, 0, b'a', // "a"
                2, 0, 0, 0, 0, 0, 0, 0, // two rows
                1, 0, 0, 0, // width
                1, 0, 0, 0, 2, 0, 0, 0, // values
            ]
        );
    }

    #[test]
    fn test_labels_both_orders() {
        let labels = Labels::new(["a", "b"], &[[1, -2], [300, 4]]).unwrap();
        for byte_order in [ByteOrder::Little, ByteOrder::Big] {
            let bytes = encode_labels(&labels, byte_order);
            let decoded = decoder(&bytes, byte_order).read_labels().unwrap();
            assert!(decoded.is_identical(&labels));
        }
    }

    #[test]
    fn test_lying_row_count_fails_cleanly() {
        let labels = Labels::new(["a"], &[[1]]).unwrap();
        let mut bytes = encode_labels(&labels, ByteOrder::Little);
        // row count field starts after the name count and the name
        bytes[9..17].copy_from_slice(&(u64::MAX / 8).to_le_bytes());
        let result = decoder(&bytes, ByteOrder::Little).read_labels();
        assert!(matches!(
            result,
            Err(IoError::Deserialization(DeserializationError::Truncated(_)))
        ));
    }

    #[test]
    fn test_width_mismatch_is_malformed() {
        let labels = Labels::new(["a"], &[[1]]).unwrap();
        let mut bytes = encode_labels(&labels, ByteOrder::Little);
        bytes[17..21].copy_from_slice(&2u32.to_le_bytes());
        let result = decoder(&bytes, ByteOrder::Little).read_labels();
        assert!(matches!(
            result,
            Err(IoError::Deserialization(DeserializationError::Malformed(_)))
        ));
    }

    #[test]
    fn test_invalid_utf8_name() {
        let labels = Labels::new(["a"], &[[1]]).unwrap();
        let mut bytes = encode_labels(&labels, ByteOrder::Little);
        bytes[8] = 0xff;
        let result = decoder(&bytes, ByteOrder::Little).read_labels();
        assert!(matches!(
            result,
            Err(IoError::Deserialization(DeserializationError::InvalidString(_)))
        ));
    }

    #[test]
    fn test_duplicate_rows_are_invalid() {
        let labels = Labels::new(["a"], &[[1], [2]]).unwrap();
        let mut bytes = encode_labels(&labels, ByteOrder::Little);
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&1i32.to_le_bytes());
        let result = decoder(&bytes, ByteOrder::Little).read_labels();
        assert!(matches!(
            result,
            Err(IoError::Deserialization(DeserializationError::Invalid(_)))
        ));
    }

    #[test]
    fn test_block_with_gradient() {
        let properties = Arc::new(Labels::new(["n"], &[[0], [1]]).unwrap());
        let gradient = TensorBlock::new(
            DenseArray::from_vec(vec![1.0, 2.0], &[1, 2]).unwrap(),
            Labels::new(["sample"], &[[1]]).unwrap(),
            vec![],
            properties.clone(),
        )
        .unwrap();
        let block = TensorBlock::new(
            DenseArray::from_vec(vec![0.5, 1.5, 2.5, 3.5], &[2, 2]).unwrap(),
            Labels::new(["s"], &[[0], [1]]).unwrap(),
            vec![],
            properties,
        )
        .unwrap()
        .with_gradient("x", gradient)
        .unwrap();

        let mut encoder = Encoder::new(Vec::new(), ByteOrder::Big);
        encoder.write_block(&block).unwrap();
        let bytes = encoder.into_inner();

        let mut create = |shape: &[usize]| DenseArray::zeros(shape).boxed();
        let decoded = decoder(&bytes, ByteOrder::Big)
            .read_block(&mut create, 0)
            .unwrap();
        assert!(decoded.is_identical(&block));
    }

    #[test]
    fn test_shape_must_match_labels() {
        let mut encoder = Encoder::new(Vec::new(), ByteOrder::Little);
        encoder.write_labels(&Labels::empty(&["s"]).unwrap()).unwrap();
        encoder.write_u32(0).unwrap();
        encoder.write_labels(&Labels::new(["p"], &[[0], [1]]).unwrap()).unwrap();
        encoder.write_u32(2).unwrap();
        encoder.write_u64(0).unwrap();
        encoder.write_u64(1 << 63).unwrap();
        let bytes = encoder.into_inner();

        let mut create = |shape: &[usize]| DenseArray::zeros(shape).boxed();
        match decoder(&bytes, ByteOrder::Little).read_block(&mut create, 0) {
            Err(IoError::Deserialization(DeserializationError::Invalid(
                TensorError::ShapeMismatch { expected, got, .. },
            ))) => {
                assert_eq!(expected, vec![0, 2]);
                assert_eq!(got, vec![0, 1 << 63]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unallocatable_empty_shape() {
        // no samples, but the other axes multiply past isize::MAX
        let mut encoder = Encoder::new(Vec::new(), ByteOrder::Little);
        encoder.write_labels(&Labels::empty(&["s"]).unwrap()).unwrap();
        encoder.write_u32(5).unwrap();
        for name in ["c0", "c1", "c2", "c3", "c4"] {
            let component = Labels::from_flat(&[name], (0..10_000).collect()).unwrap();
            encoder.write_labels(&component).unwrap();
        }
        encoder.write_labels(&Labels::new(["p"], &[[0]]).unwrap()).unwrap();
        encoder.write_u32(7).unwrap();
        for dim in [0, 10_000, 10_000, 10_000, 10_000, 10_000, 1] {
            encoder.write_u64(dim).unwrap();
        }
        let bytes = encoder.into_inner();

        let mut calls = 0;
        let mut create = |shape: &[usize]| {
            calls += 1;
            DenseArray::zeros(shape).boxed()
        };
        let result = decoder(&bytes, ByteOrder::Little).read_block(&mut create, 0);
        assert!(matches!(
            result,
            Err(IoError::Deserialization(DeserializationError::Malformed(_)))
        ));
        assert_eq!(calls, 0);
    }

    /// Array whose buffer is shorter than its shape
    #[derive(Debug)]
    struct ShortArray {
        shape: Vec<usize>,
        data: Vec<f64>,
    }

    impl Array for ShortArray {
        fn shape(&self) -> &[usize] {
            &self.shape
        }

        fn data(&self) -> &[f64] {
            &self.data
        }

        fn data_mut(&mut self) -> &mut [f64] {
            &mut self.data
        }

        fn create(&self, shape: &[usize]) -> Box<dyn Array> {
            Box::new(ShortArray {
                shape: shape.to_vec(),
                data: vec![],
            })
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_allocator_with_short_buffer() {
        let block = TensorBlock::new(
            DenseArray::from_vec(vec![1.0, 2.0], &[1, 2]).unwrap(),
            Labels::new(["s"], &[[0]]).unwrap(),
            vec![],
            Labels::new(["p"], &[[0], [1]]).unwrap(),
        )
        .unwrap();
        let mut encoder = Encoder::new(Vec::new(), ByteOrder::Little);
        encoder.write_block(&block).unwrap();
        let bytes = encoder.into_inner();

        let mut create = |shape: &[usize]| -> Box<dyn Array> {
            Box::new(ShortArray {
                shape: shape.to_vec(),
                data: vec![0.0],
            })
        };
        let result = decoder(&bytes, ByteOrder::Little).read_block(&mut create, 0);
        assert!(matches!(
            result,
            Err(IoError::Deserialization(DeserializationError::Malformed(_)))
        ));
    }

    #[test]
    fn test_checksum_covers_header() {
        let header = Header::new(ByteOrder::Little, ContainerKind::Labels, 0);
        let labels = Labels::single();

        let mut encoder = Encoder::new(Vec::new(), ByteOrder::Little);
        encoder.write_header(&header).unwrap();
        encoder.write_labels(&labels).unwrap();
        encoder.write_checksum().unwrap();
        let mut bytes = encoder.into_inner();

        let mut decoder = Decoder::new(Cursor::new(bytes.as_slice()));
        decoder.read_header().unwrap();
        decoder.read_labels().unwrap();
        decoder.read_checksum(true).unwrap();
        decoder.expect_end().unwrap();

        // flip a bit in the header flags
        bytes[12] ^= 0x10;
        let mut decoder = Decoder::new(Cursor::new(bytes.as_slice()));
        decoder.read_header().unwrap();
        decoder.read_labels().unwrap();
        assert!(matches!(
            decoder.read_checksum(true),
            Err(IoError::Deserialization(
                DeserializationError::ChecksumMismatch { .. }
            ))
        ));
    }
}

//! Container header and format constants
//!
//! # Binary Format
//!
//! Every container starts with a fixed 14-byte header:
//!
//! - Magic bytes: "TMAP" (4 bytes)
//! - Byte order marker: `<` (little endian) or `>` (big endian) (1 byte)
//! - Version: u32 (4 bytes)
//! - Kind: u8, 0 for a tensor map, 1 for a single block, 2 for a single Labels (1 byte)
//! - Flags: u32 (4 bytes), see [`FLAG_HETEROGENEOUS_PROPERTIES`] and [`FLAG_CHECKSUM`]
//!
//! All multi-byte values after the marker, including the header fields, use
//! the declared byte order. When [`FLAG_CHECKSUM`] is set, the container ends
//! with the CRC32 of every preceding byte.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{IoError, IoResult};

/// Magic bytes at the start of every container
pub const MAGIC: &[u8; 4] = b"TMAP";

/// Current (and highest supported) container version
pub const VERSION: u32 = 1;

/// Size of the header in bytes
pub const HEADER_SIZE: usize = 14;

/// The map was built with heterogeneous properties allowed
pub const FLAG_HETEROGENEOUS_PROPERTIES: u32 = 1 << 0;

/// A CRC32 trailer follows the body
pub const FLAG_CHECKSUM: u32 = 1 << 1;

const KNOWN_FLAGS: u32 = FLAG_HETEROGENEOUS_PROPERTIES | FLAG_CHECKSUM;

/// Byte order of the multi-byte values in a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ByteOrder {
    /// Least significant byte first
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

impl ByteOrder {
    /// Byte order of the current platform
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// Marker byte stored in the header
    pub fn marker(self) -> u8 {
        match self {
            ByteOrder::Little => b'<',
            ByteOrder::Big => b'>',
        }
    }

    /// Parse a header marker byte
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'<' => Some(ByteOrder::Little),
            b'>' => Some(ByteOrder::Big),
            _ => None,
        }
    }
}

/// What a container holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// A full tensor map
    TensorMap,
    /// A single block, with its gradients
    TensorBlock,
    /// A single Labels
    Labels,
}

impl ContainerKind {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            ContainerKind::TensorMap => 0,
            ContainerKind::TensorBlock => 1,
            ContainerKind::Labels => 2,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ContainerKind::TensorMap),
            1 => Some(ContainerKind::TensorBlock),
            2 => Some(ContainerKind::Labels),
            _ => None,
        }
    }
}

/// Decoded container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Byte order of everything after the marker
    pub byte_order: ByteOrder,
    /// Format version
    pub version: u32,
    /// Content of the container
    pub kind: ContainerKind,
    /// Flag bits
    pub flags: u32,
}

impl Header {
    /// Header for a new container in the current version
    pub fn new(byte_order: ByteOrder, kind: ContainerKind, flags: u32) -> Self {
        Self {
            byte_order,
            version: VERSION,
            kind,
            flags,
        }
    }

    /// Is the CRC32 trailer present?
    pub fn has_checksum(&self) -> bool {
        self.flags & FLAG_CHECKSUM != 0
    }

    /// Does the map allow heterogeneous properties?
    pub fn heterogeneous_properties(&self) -> bool {
        self.flags & FLAG_HETEROGENEOUS_PROPERTIES != 0
    }

    /// Serialize the header
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(MAGIC);
        bytes[4] = self.byte_order.marker();
        let (version, flags) = match self.byte_order {
            ByteOrder::Little => (self.version.to_le_bytes(), self.flags.to_le_bytes()),
            ByteOrder::Big => (self.version.to_be_bytes(), self.flags.to_be_bytes()),
        };
        bytes[5..9].copy_from_slice(&version);
        bytes[9] = self.kind.to_byte();
        bytes[10..14].copy_from_slice(&flags);
        bytes
    }

    /// Parse the raw header fields, checking magic bytes and markers
    ///
    /// Version and flags are only decoded here; see [`Header::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CorruptHeader`] for bad magic bytes, an unknown
    /// byte order marker or an unknown container kind.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> IoResult<Self> {
        if &bytes[0..4] != MAGIC {
            return Err(IoError::corrupt_header(format!(
                "invalid magic bytes {:?}, expected {:?}",
                &bytes[0..4],
                MAGIC
            )));
        }

        let byte_order = ByteOrder::from_marker(bytes[4]).ok_or_else(|| {
            IoError::corrupt_header(format!("invalid byte order marker {:#04x}", bytes[4]))
        })?;

        let version = [bytes[5], bytes[6], bytes[7], bytes[8]];
        let flags = [bytes[10], bytes[11], bytes[12], bytes[13]];
        let (version, flags) = match byte_order {
            ByteOrder::Little => (u32::from_le_bytes(version), u32::from_le_bytes(flags)),
            ByteOrder::Big => (u32::from_be_bytes(version), u32::from_be_bytes(flags)),
        };

        let kind = ContainerKind::from_byte(bytes[9]).ok_or_else(|| {
            IoError::corrupt_header(format!("unknown container kind {}", bytes[9]))
        })?;

        Ok(Self {
            byte_order,
            version,
            kind,
            flags,
        })
    }

    /// Check that this reader can decode the container
    ///
    /// # Errors
    ///
    /// - [`IoError::UnsupportedVersion`] for versions above [`VERSION`]
    /// - [`IoError::CorruptHeader`] for version 0 or unknown flag bits
    pub fn validate(&self) -> IoResult<()> {
        if self.version > VERSION {
            return Err(IoError::UnsupportedVersion {
                found: self.version,
                supported: VERSION,
            });
        }
        if self.version == 0 {
            return Err(IoError::corrupt_header("invalid version 0"));
        }
        if self.flags & !KNOWN_FLAGS != 0 {
            return Err(IoError::corrupt_header(format!(
                "unknown flags {:#x}",
                self.flags & !KNOWN_FLAGS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip_both_orders() {
        for byte_order in [ByteOrder::Little, ByteOrder::Big] {
            let header = Header::new(byte_order, ContainerKind::TensorBlock, FLAG_CHECKSUM);
            let parsed = Header::parse(&header.to_bytes()).unwrap();
            assert_eq!(parsed, header);
            assert!(parsed.has_checksum());
            assert!(!parsed.heterogeneous_properties());
        }
    }

    #[test]
    fn test_big_endian_layout() {
        let header = Header::new(ByteOrder::Big, ContainerKind::TensorMap, 0);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..5], b"TMAP>");
        assert_eq!(&bytes[5..9], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = Header::new(ByteOrder::Little, ContainerKind::TensorMap, 0).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Header::parse(&bytes),
            Err(IoError::CorruptHeader(_))
        ));
    }

    #[test]
    fn test_bad_marker_and_kind() {
        let mut bytes = Header::new(ByteOrder::Little, ContainerKind::TensorMap, 0).to_bytes();
        bytes[4] = b'=';
        assert!(matches!(
            Header::parse(&bytes),
            Err(IoError::CorruptHeader(_))
        ));

        let mut bytes = Header::new(ByteOrder::Little, ContainerKind::TensorMap, 0).to_bytes();
        bytes[9] = 9;
        assert!(matches!(
            Header::parse(&bytes),
            Err(IoError::CorruptHeader(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut header = Header::new(ByteOrder::Little, ContainerKind::TensorMap, 0);
        assert!(header.validate().is_ok());

        header.version = 2;
        assert!(matches!(
            header.validate(),
            Err(IoError::UnsupportedVersion {
                found: 2,
                supported: 1
            })
        ));

        header.version = 1;
        header.flags = 1 << 7;
        assert!(matches!(header.validate(), Err(IoError::CorruptHeader(_))));
    }

    #[test]
    fn test_native_order_marker() {
        let native = ByteOrder::native();
        assert_eq!(ByteOrder::from_marker(native.marker()), Some(native));
    }
}

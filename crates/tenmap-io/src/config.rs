//! Configuration of the container writer and reader

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::format::ByteOrder;

/// Options used when writing a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WriteConfig {
    /// Byte order of every multi-byte value
    pub byte_order: ByteOrder,
    /// Append a CRC32 trailer
    pub checksum: bool,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Little,
            checksum: true,
        }
    }
}

impl WriteConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the byte order
    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Enable or disable the CRC32 trailer
    pub fn checksum(mut self, enable: bool) -> Self {
        self.checksum = enable;
        self
    }
}

/// Options used when reading a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReadConfig {
    /// Compare the CRC32 trailer (when present) with the content
    pub verify_checksum: bool,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            verify_checksum: true,
        }
    }
}

impl ReadConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable checksum verification
    pub fn verify_checksum(mut self, enable: bool) -> Self {
        self.verify_checksum = enable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_config_builder() {
        let config = WriteConfig::new()
            .byte_order(ByteOrder::Big)
            .checksum(false);
        assert_eq!(config.byte_order, ByteOrder::Big);
        assert!(!config.checksum);
        assert!(WriteConfig::default().checksum);
    }

    #[test]
    fn test_read_config_builder() {
        assert!(ReadConfig::default().verify_checksum);
        assert!(!ReadConfig::new().verify_checksum(false).verify_checksum);
    }
}

//! NBLK: checksummed binary container for recorded blocks
//!
//! Layout (little endian):
//!
//! | offset | size | field                     |
//! |--------|------|---------------------------|
//! | 0      | 4    | magic `"NBLK"`            |
//! | 4      | 4    | version (current: 1)      |
//! | 8      | 4    | CRC32 of the payload      |
//! | 12     | 8    | payload length in bytes   |
//! | 20     | n    | bincode-encoded [`Block`] |

use crate::{error::*, magic, neo::Block};
use std::path::Path;

/// Current container version
pub const BLOCK_FILE_VERSION: u32 = 1;

const HEADER_LEN: usize = 20;

/// Calculate CRC32 checksum
pub fn calculate_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Encode a block into the NBLK container
pub fn encode_block(block: &Block) -> Result<Vec<u8>> {
    let payload = bincode::serialize(block)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&magic::NBLK);
    bytes.extend_from_slice(&BLOCK_FILE_VERSION.to_le_bytes());
    bytes.extend_from_slice(&calculate_checksum(&payload).to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

/// Decode a block from the NBLK container, verifying magic, version and checksum
pub fn decode_block(bytes: &[u8]) -> Result<Block> {
    if bytes.len() < HEADER_LEN {
        return Err(RecordError::invalid_format(format!(
            "Data too short: need {} header bytes, got {}",
            HEADER_LEN,
            bytes.len()
        )));
    }

    let found = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if found != magic::NBLK {
        return Err(RecordError::InvalidMagic {
            expected: magic::NBLK,
            found,
        });
    }

    let version = read_u32(bytes, 4);
    if version != BLOCK_FILE_VERSION {
        return Err(RecordError::UnsupportedVersion {
            version,
            supported: BLOCK_FILE_VERSION,
        });
    }

    let expected = read_u32(bytes, 8);
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[12..HEADER_LEN]);
    let len = u64::from_le_bytes(len) as usize;

    let payload = bytes
        .get(HEADER_LEN..)
        .filter(|rest| rest.len() == len)
        .ok_or_else(|| {
            RecordError::invalid_format(format!(
                "payload length {} does not match header {}",
                bytes.len() - HEADER_LEN,
                len
            ))
        })?;

    let computed = calculate_checksum(payload);
    if computed != expected {
        return Err(RecordError::ChecksumMismatch { expected, computed });
    }

    Ok(bincode::deserialize(payload)?)
}

/// Write a block to a file
pub fn write_block(path: impl AsRef<Path>, block: &Block) -> Result<()> {
    let bytes = encode_block(block)?;
    std::fs::write(path.as_ref(), &bytes)?;
    log::debug!(
        "Wrote block {:?} ({} segments, {} bytes) to {}",
        block.name,
        block.segments.len(),
        bytes.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Read a block from a file
pub fn read_block(path: impl AsRef<Path>) -> Result<Block> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_block(&bytes)
}

/// True if the file starts with the NBLK magic
pub fn is_block_file(path: impl AsRef<Path>) -> Result<bool> {
    use std::io::Read;
    let mut head = [0u8; 4];
    let mut file = std::fs::File::open(path.as_ref())?;
    match file.read_exact(&mut head) {
        Ok(()) => Ok(head == magic::NBLK),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo::{AnalogSignal, Segment, SpikeTrain};
    use crate::NeuronId;
    use ndarray::array;

    fn sample_block() -> Block {
        let mut block = Block::new("pop_1");
        block.annotate("simulator", "spyn");
        let mut segment = Segment::new(0);
        segment.spiketrains.push(
            SpikeTrain::new(NeuronId::new(0), vec![3.0, 22.0], 0.0, 100.0).unwrap(),
        );
        segment.analogsignals.push(
            AnalogSignal::new("v", "mV", 1.0, 0.0, vec![NeuronId::new(0)], array![[-65.0], [-60.0]])
                .unwrap(),
        );
        block.segments.push(segment);
        block
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.nblk");
        let block = sample_block();
        write_block(&path, &block).unwrap();
        assert_eq!(read_block(&path).unwrap(), block);
        assert!(is_block_file(&path).unwrap());

        let text = dir.path().join("spikes.txt");
        std::fs::write(&text, "# first_id = 0\n").unwrap();
        assert!(!is_block_file(&text).unwrap());
    }

    #[test]
    fn test_header_fields() {
        let bytes = encode_block(&sample_block()).unwrap();
        assert_eq!(&bytes[0..4], b"NBLK");
        assert_eq!(read_u32(&bytes, 4), BLOCK_FILE_VERSION);
        assert_eq!(read_u32(&bytes, 8), calculate_checksum(&bytes[HEADER_LEN..]));
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = encode_block(&sample_block()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(decode_block(&bytes), Err(RecordError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut bytes = encode_block(&sample_block()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode_block(&bytes), Err(RecordError::InvalidMagic { .. })));

        let mut bytes = encode_block(&sample_block()).unwrap();
        bytes[4] = 9;
        assert!(matches!(
            decode_block(&bytes),
            Err(RecordError::UnsupportedVersion { version: 9, .. })
        ));
    }

    #[test]
    fn test_truncated() {
        let bytes = encode_block(&sample_block()).unwrap();
        assert!(matches!(decode_block(&bytes[..10]), Err(RecordError::InvalidFormat { .. })));
        assert!(matches!(
            decode_block(&bytes[..bytes.len() - 3]),
            Err(RecordError::InvalidFormat { .. })
        ));
    }
}

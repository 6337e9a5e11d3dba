use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use byteorder::{LittleEndian, ReadBytesExt};
use tracing::debug;
use super::gguf_utils::{self, GGUF_MAGIC};
use super::types::{GGUFError, GGUFValue};

/// Header and metadata of a GGUF checkpoint.
///
/// Only the key/value section is parsed; tensor descriptors and weights are
/// left to llama.cpp.
#[derive(Debug, Clone)]
pub struct GGUFReader {
    /// Format version from the header
    pub version: u32,
    /// Number of tensors declared in the header
    pub tensor_count: u64,
    /// Metadata key-value pairs
    pub metadata: BTreeMap<String, GGUFValue>,
}

impl GGUFReader {
    /// Opens `path` and reads its header and metadata.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GGUFError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(&mut BufReader::new(file))
    }

    /// Reads a GGUF header and metadata section from any seekable source.
    pub fn from_reader<R: Read + Seek>(reader: &mut R) -> Result<Self, GGUFError> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != GGUF_MAGIC {
            return Err(GGUFError::InvalidFormat(format!("Invalid magic number {:#010x}", magic)));
        }

        let version = reader.read_u32::<LittleEndian>()?;
        if version == 0 || version > 3 {
            return Err(GGUFError::InvalidFormat(format!("Unsupported version {}", version)));
        }

        let tensor_count = gguf_utils::read_count(reader, version)?;
        let metadata_count = gguf_utils::read_count(reader, version)?;
        debug!("Reading GGUF v{}: {} tensors, {} metadata entries", version, tensor_count, metadata_count);

        let mut metadata = BTreeMap::new();
        for _ in 0..metadata_count {
            let key = gguf_utils::read_string(reader, version)?;
            let value_type = reader.read_u32::<LittleEndian>()?;
            let value = gguf_utils::read_value_by_type(reader, value_type, version)?;
            metadata.insert(key, value);
        }

        Ok(Self {
            version,
            tensor_count,
            metadata,
        })
    }

    pub fn get(&self, key: &str) -> Option<&GGUFValue> {
        self.metadata.get(key)
    }

    /// `general.architecture`, e.g. "llama"
    pub fn architecture(&self) -> Option<&str> {
        self.get("general.architecture").and_then(GGUFValue::as_str)
    }

    /// `general.name`
    pub fn name(&self) -> Option<&str> {
        self.get("general.name").and_then(GGUFValue::as_str)
    }

    /// Number of transformer blocks, the unit `n_gpu_layers` counts in.
    pub fn block_count(&self) -> Option<u64> {
        self.arch_int("block_count")
    }

    /// Context length the model was trained with.
    pub fn context_length(&self) -> Option<u64> {
        self.arch_int("context_length")
    }

    fn arch_int(&self, suffix: &str) -> Option<u64> {
        let arch = self.architecture()?;
        self.get(&format!("{}.{}", arch, suffix))
            .and_then(GGUFValue::as_int)
            .and_then(|v| u64::try_from(v).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::{Cursor, Write};

    fn write_string(buf: &mut Vec<u8>, s: &str) {
        buf.write_u64::<LittleEndian>(s.len() as u64).unwrap();
        buf.write_all(s.as_bytes()).unwrap();
    }

    /// Builds a v3 file with an architecture, a name, two integer keys and a
    /// string array standing in for a tokenizer vocabulary.
    fn sample_file() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(GGUF_MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(3).unwrap();
        buf.write_u64::<LittleEndian>(291).unwrap();
        buf.write_u64::<LittleEndian>(5).unwrap();

        write_string(&mut buf, "general.architecture");
        buf.write_u32::<LittleEndian>(8).unwrap();
        write_string(&mut buf, "llama");

        write_string(&mut buf, "tokenizer.ggml.tokens");
        buf.write_u32::<LittleEndian>(9).unwrap();
        buf.write_u32::<LittleEndian>(8).unwrap();
        buf.write_u64::<LittleEndian>(3).unwrap();
        for token in ["<s>", "</s>", "hello"] {
            write_string(&mut buf, token);
        }

        write_string(&mut buf, "llama.block_count");
        buf.write_u32::<LittleEndian>(4).unwrap();
        buf.write_u32::<LittleEndian>(80).unwrap();

        write_string(&mut buf, "llama.context_length");
        buf.write_u32::<LittleEndian>(4).unwrap();
        buf.write_u32::<LittleEndian>(32764).unwrap();

        write_string(&mut buf, "general.name");
        buf.write_u32::<LittleEndian>(8).unwrap();
        write_string(&mut buf, "Midnight Miqu");

        buf
    }

    #[test]
    fn test_reads_header_and_metadata() {
        let reader = GGUFReader::from_reader(&mut Cursor::new(sample_file())).unwrap();

        assert_eq!(reader.version, 3);
        assert_eq!(reader.tensor_count, 291);
        assert_eq!(reader.architecture(), Some("llama"));
        assert_eq!(reader.name(), Some("Midnight Miqu"));
        assert_eq!(reader.block_count(), Some(80));
        assert_eq!(reader.context_length(), Some(32764));
    }

    #[test]
    fn test_arrays_are_skipped_but_recorded() {
        let reader = GGUFReader::from_reader(&mut Cursor::new(sample_file())).unwrap();
        assert_eq!(
            reader.get("tokenizer.ggml.tokens"),
            Some(&GGUFValue::Array { element_type: 8, len: 3 })
        );
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut data = sample_file();
        data[0] = b'X';
        let err = GGUFReader::from_reader(&mut Cursor::new(data)).unwrap_err();
        assert!(err.to_string().contains("Invalid magic number"));
    }

    #[test]
    fn test_truncated_file_is_io_error() {
        let mut data = sample_file();
        data.truncate(40);
        let err = GGUFReader::from_reader(&mut Cursor::new(data)).unwrap_err();
        assert!(matches!(err, GGUFError::IoError(_)));
    }

    #[test]
    fn test_is_gguf_file_on_disk() {
        let dir = std::env::temp_dir();
        let good = dir.join(format!("gguf-test-{}.gguf", uuid::Uuid::new_v4()));
        let bad = dir.join(format!("gguf-test-{}.bin", uuid::Uuid::new_v4()));
        std::fs::write(&good, sample_file()).unwrap();
        std::fs::write(&bad, b"not a model").unwrap();

        assert!(crate::gguf::is_gguf_file(&good));
        assert!(!crate::gguf::is_gguf_file(&bad));
        assert!(!crate::gguf::is_gguf_file(dir.join("does-not-exist.gguf")));

        let opened = GGUFReader::open(&good).unwrap();
        assert_eq!(opened.block_count(), Some(80));

        std::fs::remove_file(good).ok();
        std::fs::remove_file(bad).ok();
    }
}

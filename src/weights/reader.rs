use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use memmap2::Mmap;
use tracing::debug;

use super::types::{TensorInfo, WeightDType, WeightsError};

/// The magic number that identifies weight-container files
const WEIGHTS_MAGIC: u32 = 0x5457534E; // "NSWT" in ASCII

/// Supported container version
const WEIGHTS_VERSION: u32 = 1;

/// Tensor payloads start at the next multiple of this from the start of the file
const DATA_ALIGNMENT: u64 = 32;

/// Checks whether the file at `path` starts with the weight-container magic.
pub fn is_weights_file(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    match file.read_u32::<LittleEndian>() {
        Ok(magic) => magic == WEIGHTS_MAGIC,
        Err(_) => false,
    }
}

/// Reader for the neuroscan weight-container format.
///
/// Layout (all integers little-endian):
/// - magic u32, version u32
/// - metadata count u64, tensor count u64
/// - metadata entries: key string, value string (u64 length + UTF-8 bytes each)
/// - tensor entries: name string, n_dims u32, dims [u64], dtype u32,
///   offset u64 (relative to the data section)
/// - tensor payload, aligned to 32 bytes from the start of the file
///
/// The payload is memory-mapped; tensors are decoded to `Vec<f32>` on demand.
pub struct WeightsReader {
    /// Path to the container file
    pub path: PathBuf,
    /// Container format version
    pub version: u32,
    /// Metadata key-value pairs
    pub metadata: BTreeMap<String, String>,
    /// Information about each tensor
    pub tensors: Vec<TensorInfo>,
    /// When the container was opened
    pub loaded_at: DateTime<Utc>,
    /// Memory-mapped file contents
    data: Mmap,
    /// Offset of the data section from the start of the file
    data_start: u64,
}

impl WeightsReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let path = path.as_ref().to_path_buf();

        if !is_weights_file(&path) {
            return Err(Box::new(WeightsError::InvalidFormat("Invalid magic number".into())));
        }

        // Open file and parse the container header
        let mut file = File::open(&path)?;

        // Skip past the magic number
        file.seek(SeekFrom::Start(4))?;

        // Read version
        let version = file.read_u32::<LittleEndian>()?;
        if version != WEIGHTS_VERSION {
            return Err(Box::new(WeightsError::InvalidFormat(
                format!("Unsupported container version: {}", version)
            )));
        }

        // Read metadata count and tensor count
        let metadata_count = file.read_u64::<LittleEndian>()?;
        let tensor_count = file.read_u64::<LittleEndian>()?;

        debug!("Reading weight container: {} tensors, {} metadata entries", tensor_count, metadata_count);

        // Parse all metadata. Architecture and shape checks happen in the registry.
        let mut metadata = BTreeMap::new();
        for _ in 0..metadata_count {
            let key = read_string(&mut file)?;
            let value = read_string(&mut file)?;
            metadata.insert(key, value);
        }

        // Read tensor information
        let tensors = read_tensor_info(&mut file, tensor_count)?;

        // The data section starts at the next alignment boundary after the table
        let table_end = file.stream_position()?;
        let data_start = table_end.div_ceil(DATA_ALIGNMENT) * DATA_ALIGNMENT;

        // Memory-map the whole file; tensor reads slice into the mapping
        let data = unsafe { Mmap::map(&file)? };
        if (data.len() as u64) < data_start {
            return Err(Box::new(WeightsError::InvalidFormat(
                "File ends before the data section".into()
            )));
        }

        Ok(Self {
            path,
            version,
            metadata,
            tensors,
            loaded_at: Utc::now(),
            data,
            data_start,
        })
    }

    /// Looks up a metadata value by key.
    pub fn metadata_value(&self, key: &str) -> Result<&str, WeightsError> {
        self.metadata
            .get(key)
            .map(|v| v.as_str())
            .ok_or_else(|| WeightsError::MetadataNotFound(key.to_string()))
    }

    /// Looks up tensor information by name.
    pub fn tensor_info(&self, name: &str) -> Result<&TensorInfo, WeightsError> {
        self.tensors
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| WeightsError::TensorNotFound(name.to_string()))
    }

    /// Decodes a tensor's payload into f32 values.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the tensor to read
    ///
    /// # Returns
    ///
    /// The tensor's elements in row-major order, or an error if the payload
    /// is out of bounds for the mapped file.
    pub fn tensor_f32(&self, name: &str) -> Result<Vec<f32>, WeightsError> {
        let info = self.tensor_info(name)?.clone();
        let element_count = info.element_count();
        let byte_len = element_count * info.dtype.element_size();

        let start = self.data_start as usize + info.offset as usize;
        let end = start.checked_add(byte_len).ok_or_else(|| {
            WeightsError::InvalidFormat(format!("Tensor '{}' offset overflows", info.name))
        })?;
        if end > self.data.len() {
            return Err(WeightsError::InvalidFormat(format!(
                "Not enough data for tensor '{}': need {} bytes at offset {}, file has {}",
                info.name, byte_len, start, self.data.len()
            )));
        }

        // Decode little-endian f32s; the mapping carries no alignment guarantee
        let bytes = &self.data[start..end];
        let mut values = Vec::with_capacity(element_count);
        for chunk in bytes.chunks_exact(4) {
            values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        Ok(values)
    }
}

/// Read a length-prefixed UTF-8 string from the file
fn read_string(file: &mut File) -> Result<String, Box<dyn Error + Send + Sync>> {
    let str_len = file.read_u64::<LittleEndian>()?;

    let mut buffer = vec![0u8; str_len as usize];
    file.read_exact(&mut buffer)?;

    let string = String::from_utf8(buffer)
        .map_err(|e| Box::new(WeightsError::InvalidFormat(format!("Invalid UTF-8 in string: {}", e))))?;

    Ok(string)
}

/// Read the tensor table from the file
fn read_tensor_info(file: &mut File, tensor_count: u64) -> Result<Vec<TensorInfo>, Box<dyn Error + Send + Sync>> {
    let mut tensors = Vec::with_capacity(tensor_count as usize);

    for _ in 0..tensor_count {
        let name = read_string(file)?;

        let n_dims = file.read_u32::<LittleEndian>()?;
        let mut dims = Vec::with_capacity(n_dims as usize);
        for _ in 0..n_dims {
            dims.push(file.read_u64::<LittleEndian>()?);
        }

        let dtype_tag = file.read_u32::<LittleEndian>()?;
        let dtype = WeightDType::try_from(dtype_tag)?;

        let offset = file.read_u64::<LittleEndian>()?;

        tensors.push(TensorInfo { name, dims, dtype, offset });
    }

    Ok(tensors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a valid single-tensor container in the v1 layout.
    fn build_container(tensor_name: &str, dims: &[u64], values: &[f32]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&WEIGHTS_MAGIC.to_le_bytes());
        buf.extend_from_slice(&WEIGHTS_VERSION.to_le_bytes());
        buf.extend_from_slice(&2u64.to_le_bytes()); // metadata count
        buf.extend_from_slice(&1u64.to_le_bytes()); // tensor count

        for (k, v) in [("general.architecture", "custom-cnn"), ("vision.input_size", "16")] {
            buf.extend_from_slice(&(k.len() as u64).to_le_bytes());
            buf.extend_from_slice(k.as_bytes());
            buf.extend_from_slice(&(v.len() as u64).to_le_bytes());
            buf.extend_from_slice(v.as_bytes());
        }

        buf.extend_from_slice(&(tensor_name.len() as u64).to_le_bytes());
        buf.extend_from_slice(tensor_name.as_bytes());
        buf.extend_from_slice(&(dims.len() as u32).to_le_bytes());
        for d in dims {
            buf.extend_from_slice(&d.to_le_bytes());
        }
        buf.extend_from_slice(&0u32.to_le_bytes()); // dtype FLOAT32
        buf.extend_from_slice(&0u64.to_le_bytes()); // offset

        // Pad to the alignment boundary, then append the payload
        while buf.len() % DATA_ALIGNMENT as usize != 0 {
            buf.push(0);
        }
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }

        buf
    }

    fn write_temp(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("neuroscan-weights-{}", name));
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let path = write_temp("bad-magic.nsw", b"not a weight container at all");
        let result = WeightsReader::open(&path);

        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Invalid magic number"));
        }
    }

    #[test]
    fn test_open_rejects_unknown_version() {
        let mut bytes = build_container("w", &[2], &[1.0, 2.0]);
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        let path = write_temp("bad-version.nsw", &bytes);

        let result = WeightsReader::open(&path);
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Unsupported container version"));
        }
    }

    #[test]
    fn test_tensor_roundtrip() {
        let values = [0.5f32, -1.25, 3.0, 42.0];
        let bytes = build_container("conv1.weight", &[2, 2], &values);
        let path = write_temp("roundtrip.nsw", &bytes);

        let reader = WeightsReader::open(&path).unwrap();
        assert_eq!(reader.metadata_value("general.architecture").unwrap(), "custom-cnn");
        assert_eq!(reader.tensors.len(), 1);
        assert_eq!(reader.tensor_info("conv1.weight").unwrap().dims, vec![2, 2]);
        assert_eq!(reader.tensor_f32("conv1.weight").unwrap(), values.to_vec());
    }

    #[test]
    fn test_missing_tensor_and_metadata() {
        let bytes = build_container("w", &[1], &[1.0]);
        let path = write_temp("missing.nsw", &bytes);
        let reader = WeightsReader::open(&path).unwrap();

        let result = reader.tensor_f32("does-not-exist");
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Tensor not found"));
        }

        let result = reader.metadata_value("no.such.key");
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Metadata key not found"));
        }
    }

    #[test]
    fn test_truncated_payload() {
        // Declare 4 elements but provide only 2
        let mut bytes = build_container("w", &[4], &[1.0, 2.0, 3.0, 4.0]);
        bytes.truncate(bytes.len() - 8);
        let path = write_temp("truncated.nsw", &bytes);

        let reader = WeightsReader::open(&path).unwrap();
        let result = reader.tensor_f32("w");
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Not enough data"));
        }
    }
}

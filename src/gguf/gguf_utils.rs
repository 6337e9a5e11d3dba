use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use byteorder::{LittleEndian, ReadBytesExt};
use super::types::{GGUFError, GGUFValue};

/// The magic number that identifies GGUF files
pub const GGUF_MAGIC: u32 = 0x46554747; // "GGUF" in ASCII

/// Longest metadata string we are willing to allocate for
const MAX_STRING_LEN: u64 = 1 << 24;

/// Value type ids from the GGUF format
pub const TYPE_STRING: u32 = 8;
pub const TYPE_ARRAY: u32 = 9;

/// Reads a length or count field; version 1 files store these as u32.
pub fn read_count<R: Read>(reader: &mut R, version: u32) -> Result<u64, GGUFError> {
    if version >= 2 {
        Ok(reader.read_u64::<LittleEndian>()?)
    } else {
        Ok(reader.read_u32::<LittleEndian>()? as u64)
    }
}

/// Read a length-prefixed UTF-8 string
pub fn read_string<R: Read>(reader: &mut R, version: u32) -> Result<String, GGUFError> {
    let len = read_count(reader, version)?;
    if len > MAX_STRING_LEN {
        return Err(GGUFError::InvalidFormat(format!("String length {} is implausible", len)));
    }
    let mut buffer = vec![0u8; len as usize];
    reader.read_exact(&mut buffer)?;
    String::from_utf8(buffer).map_err(|e| GGUFError::InvalidFormat(format!("Invalid UTF-8 in string: {}", e)))
}

/// Byte width of fixed-size scalar types, `None` for strings and arrays
fn scalar_size(value_type: u32) -> Option<u64> {
    match value_type {
        0 | 1 | 7 => Some(1),   // UINT8, INT8, BOOL
        2 | 3 => Some(2),       // UINT16, INT16
        4 | 5 | 6 => Some(4),   // UINT32, INT32, FLOAT32
        10 | 11 | 12 => Some(8), // UINT64, INT64, FLOAT64
        _ => None,
    }
}

/// Read a GGUF value of the specified type. Arrays are skipped over and
/// returned as their element type and length.
pub fn read_value_by_type<R: Read + Seek>(reader: &mut R, value_type: u32, version: u32) -> Result<GGUFValue, GGUFError> {
    let value = match value_type {
        0 => GGUFValue::Int(reader.read_u8()? as i64),
        1 => GGUFValue::Int(reader.read_i8()? as i64),
        2 => GGUFValue::Int(reader.read_u16::<LittleEndian>()? as i64),
        3 => GGUFValue::Int(reader.read_i16::<LittleEndian>()? as i64),
        4 => GGUFValue::Int(reader.read_u32::<LittleEndian>()? as i64),
        5 => GGUFValue::Int(reader.read_i32::<LittleEndian>()? as i64),
        6 => GGUFValue::Float(reader.read_f32::<LittleEndian>()? as f64),
        7 => GGUFValue::Bool(reader.read_u8()? != 0),
        TYPE_STRING => GGUFValue::String(read_string(reader, version)?),
        TYPE_ARRAY => {
            let element_type = reader.read_u32::<LittleEndian>()?;
            let len = read_count(reader, version)?;
            skip_array(reader, element_type, len, version)?;
            GGUFValue::Array { element_type, len }
        }
        // Values above i64::MAX are not expected in metadata
        10 => GGUFValue::Int(reader.read_u64::<LittleEndian>()? as i64),
        11 => GGUFValue::Int(reader.read_i64::<LittleEndian>()?),
        12 => GGUFValue::Float(reader.read_f64::<LittleEndian>()?),
        _ => return Err(GGUFError::InvalidFormat(format!("Unknown value type: {}", value_type))),
    };
    Ok(value)
}

fn skip_array<R: Read + Seek>(reader: &mut R, element_type: u32, len: u64, version: u32) -> Result<(), GGUFError> {
    if let Some(size) = scalar_size(element_type) {
        let bytes = size
            .checked_mul(len)
            .and_then(|b| i64::try_from(b).ok())
            .ok_or_else(|| GGUFError::InvalidFormat(format!("Array of {} elements is too large", len)))?;
        reader.seek(SeekFrom::Current(bytes))?;
        return Ok(());
    }
    match element_type {
        TYPE_STRING => {
            for _ in 0..len {
                let str_len = read_count(reader, version)?;
                let offset = i64::try_from(str_len)
                    .map_err(|_| GGUFError::InvalidFormat(format!("String length {} is too large", str_len)))?;
                reader.seek(SeekFrom::Current(offset))?;
            }
            Ok(())
        }
        TYPE_ARRAY => {
            for _ in 0..len {
                let inner_type = reader.read_u32::<LittleEndian>()?;
                let inner_len = read_count(reader, version)?;
                skip_array(reader, inner_type, inner_len, version)?;
            }
            Ok(())
        }
        _ => Err(GGUFError::InvalidFormat(format!("Unknown array element type: {}", element_type))),
    }
}

/// Checks if a file at the given path is a GGUF format file by verifying its magic number.
///
/// Returns `false` for missing or unreadable files as well.
pub fn is_gguf_file<P: AsRef<Path>>(path: P) -> bool {
    if let Ok(mut file) = File::open(path) {
        if let Ok(magic) = file.read_u32::<LittleEndian>() {
            return magic == GGUF_MAGIC;
        }
    }
    false
}

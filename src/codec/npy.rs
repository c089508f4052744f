//! NumPy `.npy` single-array container.
//!
//! Layout: `\x93NUMPY` | major(1) | minor(1) | header_len(u16 LE) | header | data
//!
//! The header is the Python dict literal NumPy writes itself, e.g.
//! `{'descr': '<f8', 'fortran_order': False, 'shape': (20,), }`, followed by
//! spare spaces so the leading axis can grow in place, space padding up to a
//! 64-byte boundary and a final `\n`. Headers too long for a `u16` length
//! switch to version 2.0 with a `u32` length, as NumPy does.

use std::io::Write;
use std::path::Path;

use crate::array::{element_count, DType, DenseArray};
use crate::codec::{read_file, write_file};
use crate::error::{decode_error, SampleError};

pub const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Data section alignment.
const ARRAY_ALIGN: usize = 64;

/// Digits reserved for the leading axis so appends can rewrite the header.
const GROWTH_AXIS_MAX_DIGITS: usize = 21;

/// Python literal for a shape tuple: `()`, `(20,)`, `(2, 4, 3)`.
fn python_tuple(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [only] => format!("({only},)"),
        dims => {
            let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            format!("({})", dims.join(", "))
        }
    }
}

/// Unpadded header dict for `array`, including the growth padding.
pub fn header_dict(array: &DenseArray) -> String {
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        array.dtype().numpy_descr(),
        python_tuple(array.shape())
    );
    if let Some(leading) = array.shape().first() {
        let digits = leading.to_string().len();
        header.push_str(&" ".repeat(GROWTH_AXIS_MAX_DIGITS.saturating_sub(digits)));
    }
    header
}

/// Magic, version, length prefix and padded header.
fn wrap_header(header: &str) -> Vec<u8> {
    // +1 for the terminating newline
    let hlen = header.len() + 1;
    let v1_pad = ARRAY_ALIGN - (MAGIC.len() + 2 + 2 + hlen) % ARRAY_ALIGN;

    let mut out = Vec::with_capacity(MAGIC.len() + 6 + hlen + ARRAY_ALIGN);
    out.extend_from_slice(MAGIC);
    let padlen = match u16::try_from(hlen + v1_pad) {
        Ok(len) => {
            out.extend_from_slice(&[1, 0]);
            out.extend_from_slice(&len.to_le_bytes());
            v1_pad
        }
        Err(_) => {
            let v2_pad = ARRAY_ALIGN - (MAGIC.len() + 2 + 4 + hlen) % ARRAY_ALIGN;
            out.extend_from_slice(&[2, 0]);
            out.extend_from_slice(&((hlen + v2_pad) as u32).to_le_bytes());
            v2_pad
        }
    };
    out.extend_from_slice(header.as_bytes());
    out.resize(out.len() + padlen, b' ');
    out.push(b'\n');
    out
}

/// Full `.npy` byte image of `array`.
pub fn encode(array: &DenseArray) -> Vec<u8> {
    let mut bytes = wrap_header(&header_dict(array));
    bytes.extend_from_slice(&array.to_le_bytes());
    bytes
}

pub fn write<W: Write>(writer: &mut W, array: &DenseArray) -> Result<(), SampleError> {
    writer.write_all(&encode(array))?;
    Ok(())
}

/// Write `array` to `path`, overwriting any existing file.
pub fn save(path: &Path, array: &DenseArray) -> Result<u64, SampleError> {
    let bytes = encode(array);
    write_file(path, &bytes)?;
    log::info!(
        "[Npy] wrote {} ({} {}, {} bytes)",
        path.display(),
        array.shape_label(),
        array.dtype(),
        bytes.len()
    );
    Ok(bytes.len() as u64)
}

pub fn load(path: &Path) -> Result<DenseArray, SampleError> {
    decode(&read_file(path)?)
}

/// Parse a complete `.npy` image.
pub fn decode(bytes: &[u8]) -> Result<DenseArray, SampleError> {
    if bytes.len() < MAGIC.len() + 2 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(decode_error("missing \\x93NUMPY magic"));
    }

    let (major, minor) = (bytes[6], bytes[7]);
    let (header_start, header_len) = match major {
        1 => {
            let raw = bytes
                .get(8..10)
                .ok_or_else(|| decode_error("truncated header length"))?;
            (10, u16::from_le_bytes([raw[0], raw[1]]) as usize)
        }
        2 | 3 => {
            let raw = bytes
                .get(8..12)
                .ok_or_else(|| decode_error("truncated header length"))?;
            (12, u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
        }
        _ => {
            return Err(decode_error(format!(
                "unsupported npy version: {major}.{minor}"
            )))
        }
    };

    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .ok_or_else(|| decode_error("truncated header"))?;
    let header =
        std::str::from_utf8(header).map_err(|err| decode_error(format!("header: {err}")))?;

    let dtype = parse_descr(header)?;
    if parse_fortran_order(header)? {
        return Err(decode_error("fortran_order arrays are not supported"));
    }
    let shape = parse_shape(header)?;

    let expected = element_count(&shape)
        .and_then(|count| count.checked_mul(dtype.element_size()))
        .ok_or_else(|| decode_error(format!("shape {shape:?} overflows")))?;
    let data = &bytes[data_start..];
    if data.len() != expected {
        return Err(decode_error(format!(
            "expected {expected} data bytes, found {}",
            data.len()
        )));
    }
    DenseArray::from_le_bytes(shape, dtype, data)
}

/// Text following `'key':` in the header dict.
fn value_after<'a>(header: &'a str, key: &str) -> Result<&'a str, SampleError> {
    let quoted = format!("'{key}'");
    let start = header
        .find(&quoted)
        .ok_or_else(|| decode_error(format!("header has no {quoted}")))?;
    let rest = header[start + quoted.len()..].trim_start();
    rest.strip_prefix(':')
        .map(str::trim_start)
        .ok_or_else(|| decode_error(format!("malformed {quoted} entry")))
}

fn parse_descr(header: &str) -> Result<DType, SampleError> {
    let value = value_after(header, "descr")?;
    let value = value
        .strip_prefix('\'')
        .ok_or_else(|| decode_error("descr is not a string"))?;
    let end = value
        .find('\'')
        .ok_or_else(|| decode_error("unterminated descr"))?;
    let descr = &value[..end];
    DType::from_numpy_descr(descr).ok_or_else(|| decode_error(format!("unknown descr {descr}")))
}

fn parse_fortran_order(header: &str) -> Result<bool, SampleError> {
    let value = value_after(header, "fortran_order")?;
    if value.starts_with("False") {
        Ok(false)
    } else if value.starts_with("True") {
        Ok(true)
    } else {
        Err(decode_error("fortran_order is not a bool"))
    }
}

fn parse_shape(header: &str) -> Result<Vec<usize>, SampleError> {
    let value = value_after(header, "shape")?;
    let inner = value
        .strip_prefix('(')
        .and_then(|rest| rest.find(')').map(|end| &rest[..end]))
        .ok_or_else(|| decode_error("shape is not a tuple"))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.parse::<usize>()
                .map_err(|err| decode_error(format!("bad shape dim {dim:?}: {err}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn arange20() -> DenseArray {
        DenseArray::new([20], crate::fill::arange(0.0, 10.0, 0.5)).unwrap()
    }

    #[test]
    fn test_header_dict_matches_numpy_literal() {
        let header = header_dict(&arange20());
        assert!(header.starts_with("{'descr': '<f8', 'fortran_order': False, 'shape': (20,), }"));
        // 21 reserved digits minus the two used by "20"
        assert!(header.ends_with(&format!("}}{}", " ".repeat(19))));

        let matrix = DenseArray::new([3, 3], vec![0i32; 9]).unwrap();
        assert!(header_dict(&matrix).contains("'shape': (3, 3), }"));

        let scalar = DenseArray::new(Vec::<usize>::new(), vec![1.5f32]).unwrap();
        assert_eq!(
            header_dict(&scalar),
            "{'descr': '<f4', 'fortran_order': False, 'shape': (), }"
        );
    }

    #[test]
    fn test_encode_prefix_and_alignment() {
        let bytes = encode(&arange20());
        assert_eq!(&bytes[..6], MAGIC);
        assert_eq!(&bytes[6..8], &[1, 0]);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!(header_len, 118);
        assert_eq!((10 + header_len) % ARRAY_ALIGN, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        assert_eq!(bytes.len(), 128 + 20 * 8);
        assert_eq!(&bytes[128..136], &0.0f64.to_le_bytes());
        assert_eq!(&bytes[136..144], &0.5f64.to_le_bytes());
    }

    #[test]
    fn test_decode_restores_array() {
        let arrays = [
            arange20(),
            DenseArray::new([3, 3], (1..=9).collect::<Vec<i32>>()).unwrap(),
            DenseArray::new([2, 4, 3], vec![0.25f32; 24]).unwrap(),
            DenseArray::new([5], vec![0i64, 1, 1, 0, 2]).unwrap(),
            DenseArray::new(Vec::<usize>::new(), vec![7i32]).unwrap(),
        ];
        for array in arrays {
            assert_eq!(decode(&encode(&array)).unwrap(), array);
        }
    }

    #[test]
    fn test_long_header_switches_to_version_two() {
        let header = "x".repeat(70_000);
        let wrapped = wrap_header(&header);
        assert_eq!(&wrapped[6..8], &[2, 0]);
        let len = u32::from_le_bytes([wrapped[8], wrapped[9], wrapped[10], wrapped[11]]) as usize;
        assert_eq!((12 + len) % ARRAY_ALIGN, 0);
        assert_eq!(wrapped.len(), 12 + len);
    }

    #[test]
    fn test_decode_reads_version_two_headers() {
        let array = DenseArray::new([2], vec![1i32, 2]).unwrap();
        let header = "{'descr': '<i4', 'fortran_order': False, 'shape': (2,), }\n";
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&(header.len() as u32).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&array.to_le_bytes());
        assert_eq!(decode(&bytes).unwrap(), array);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = encode(&arange20());
        bytes[1] = b'X';
        assert!(matches!(decode(&bytes), Err(SampleError::Decode { .. })));
    }

    fn patch(bytes: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
        assert_eq!(from.len(), to.len());
        let pos = bytes
            .windows(from.len())
            .position(|window| window == from)
            .unwrap();
        let mut patched = bytes.to_vec();
        patched[pos..pos + to.len()].copy_from_slice(to);
        patched
    }

    #[test]
    fn test_decode_rejects_fortran_order() {
        let patched = patch(&encode(&arange20()), b"False", b"True ");
        let err = decode(&patched).unwrap_err();
        assert!(err.message().contains("fortran_order"));
    }

    #[test]
    fn test_decode_rejects_truncated_data() {
        let bytes = encode(&arange20());
        let err = decode(&bytes[..bytes.len() - 8]).unwrap_err();
        assert!(err.message().contains("data bytes"));
    }

    #[test]
    fn test_decode_rejects_unknown_descr() {
        let patched = patch(&encode(&arange20()), b"<f8", b"<c8");
        let err = decode(&patched).unwrap_err();
        assert!(err.message().contains("<c8"));
    }

    #[test]
    fn test_decode_rejects_overflowing_shape() {
        let header = format!(
            "{{'descr': '<i4', 'fortran_order': False, 'shape': ({}, 4), }}\n",
            usize::MAX
        );
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        let err = decode(&bytes).unwrap_err();
        assert!(err.message().contains("overflows"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("array.npy");
        let array = arange20();
        let written = save(&path, &array).unwrap();
        assert_eq!(written, std::fs::metadata(&path).unwrap().len());
        assert_eq!(load(&path).unwrap(), array);
    }
}

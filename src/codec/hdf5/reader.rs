use std::collections::BTreeMap;

use crate::array::{DType, DenseArray};
use crate::error::{decode_error, SampleError};

use super::{
    msg, Group, Node, MAX_RANK, OBJECT_HEADER_PREFIX, ROOT_ENTRY_OFFSET, SIGNATURE, SUPERBLOCK_SIZE,
    SYMBOL_ENTRY_SIZE, UNDEFINED_ADDRESS,
};

/// Deepest group nesting the reader follows.
const MAX_DEPTH: usize = 64;

/// Parse a file image and return its root group.
pub fn decode(bytes: &[u8]) -> Result<Group, SampleError> {
    if bytes.len() < SUPERBLOCK_SIZE {
        return Err(decode_error("truncated superblock"));
    }
    let reader = Reader { bytes };
    if reader.slice(0, SIGNATURE.len())? != SIGNATURE {
        return Err(decode_error("missing HDF5 signature"));
    }
    let version = reader.u8_at(8)?;
    if version != 0 {
        return Err(decode_error(format!("unsupported superblock version {version}")));
    }
    if reader.u8_at(13)? != 8 || reader.u8_at(14)? != 8 {
        return Err(decode_error("only 8-byte offsets and lengths are supported"));
    }
    let eof = reader.u64_at(40)?;
    if eof > bytes.len() as u64 {
        return Err(decode_error(format!(
            "file is truncated: end of file at {eof}, {} bytes present",
            bytes.len()
        )));
    }

    let root_header = reader.u64_at(ROOT_ENTRY_OFFSET + 8)?;
    match reader.node(root_header, 0)? {
        Node::Group(root) => Ok(root),
        Node::Dataset(_) => Err(decode_error("root object is not a group")),
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], SampleError> {
        let bytes = self.bytes;
        offset
            .checked_add(len)
            .and_then(|end| bytes.get(offset..end))
            .ok_or_else(|| decode_error(format!("read of {len} bytes at {offset} is out of bounds")))
    }

    fn u8_at(&self, offset: usize) -> Result<u8, SampleError> {
        Ok(self.slice(offset, 1)?[0])
    }

    fn u16_at(&self, offset: usize) -> Result<u16, SampleError> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.slice(offset, 2)?);
        Ok(u16::from_le_bytes(buf))
    }

    fn u32_at(&self, offset: usize) -> Result<u32, SampleError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.slice(offset, 4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64_at(&self, offset: usize) -> Result<u64, SampleError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.slice(offset, 8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn address(&self, offset: usize) -> Result<usize, SampleError> {
        let address = self.u64_at(offset)?;
        if address == UNDEFINED_ADDRESS {
            return Err(decode_error(format!("undefined address at {offset}")));
        }
        usize::try_from(address).map_err(|_| decode_error(format!("address {address} overflows")))
    }

    fn expect_signature(&self, offset: usize, signature: &[u8; 4]) -> Result<(), SampleError> {
        if self.slice(offset, 4)? != signature {
            return Err(decode_error(format!(
                "expected {} structure at {offset}",
                String::from_utf8_lossy(signature)
            )));
        }
        Ok(())
    }

    /// Messages of a version-1 object header, NIL messages skipped.
    fn messages(&self, address: u64) -> Result<Vec<(u16, &'a [u8])>, SampleError> {
        let start = usize::try_from(address)
            .map_err(|_| decode_error(format!("address {address} overflows")))?;
        let version = self.u8_at(start)?;
        if version != 1 {
            return Err(decode_error(format!(
                "unsupported object header version {version} at {start}"
            )));
        }
        let count = self.u16_at(start + 2)? as usize;
        let size = self.u32_at(start + 8)? as usize;
        let end = start + OBJECT_HEADER_PREFIX + size;

        let mut messages = Vec::with_capacity(count);
        let mut pos = start + OBJECT_HEADER_PREFIX;
        for _ in 0..count {
            if pos + 8 > end {
                break;
            }
            let kind = self.u16_at(pos)?;
            let len = self.u16_at(pos + 2)? as usize;
            let data = self.slice(pos + 8, len)?;
            if kind != msg::NIL {
                messages.push((kind, data));
            }
            pos += 8 + len;
        }
        Ok(messages)
    }

    fn node(&self, header: u64, depth: usize) -> Result<Node, SampleError> {
        if depth > MAX_DEPTH {
            return Err(decode_error(format!(
                "group nesting exceeds {MAX_DEPTH} levels"
            )));
        }
        let messages = self.messages(header)?;
        let find = |kind: u16| {
            messages
                .iter()
                .find(|(found, _)| *found == kind)
                .map(|(_, data)| *data)
        };

        if let Some(table) = find(msg::SYMBOL_TABLE) {
            let btree = read_u64(table, 0)? as usize;
            let heap = read_u64(table, 8)? as usize;
            return Ok(Node::Group(self.group(btree, heap, depth)?));
        }

        let missing = |name: &str| decode_error(format!("object at {header} has no {name} message"));
        let shape = dataspace(find(msg::DATASPACE).ok_or_else(|| missing("dataspace"))?)?;
        let dtype = datatype(find(msg::DATATYPE).ok_or_else(|| missing("datatype"))?)?;
        let (address, size) = layout(find(msg::LAYOUT).ok_or_else(|| missing("layout"))?)?;
        let raw = self.slice(address, size)?;
        Ok(Node::Dataset(DenseArray::from_le_bytes(shape, dtype, raw)?))
    }

    fn group(&self, btree: usize, heap: usize, depth: usize) -> Result<Group, SampleError> {
        self.expect_signature(heap, b"HEAP")?;
        let heap_size = self.u64_at(heap + 8)? as usize;
        let heap_data = self.address(heap + 24)?;
        let names = self.slice(heap_data, heap_size)?;

        let mut symbol_nodes = Vec::new();
        self.collect_symbol_nodes(btree, None, &mut symbol_nodes)?;

        let mut links = BTreeMap::new();
        for snod in symbol_nodes {
            self.expect_signature(snod, b"SNOD")?;
            let count = self.u16_at(snod + 6)? as usize;
            for index in 0..count {
                let entry = snod + 8 + index * SYMBOL_ENTRY_SIZE;
                let name = heap_name(names, self.u64_at(entry)? as usize)?;
                let header = self.u64_at(entry + 8)?;
                let node = self.node(header, depth + 1)?;
                if links.insert(name.clone(), node).is_some() {
                    return Err(SampleError::DuplicateName { name });
                }
            }
        }
        Ok(Group { links })
    }

    /// Leaf children of a group B-tree, left to right.
    fn collect_symbol_nodes(
        &self,
        address: usize,
        expected_level: Option<u8>,
        out: &mut Vec<usize>,
    ) -> Result<(), SampleError> {
        self.expect_signature(address, b"TREE")?;
        if self.u8_at(address + 4)? != 0 {
            return Err(decode_error(format!("B-tree at {address} is not a group tree")));
        }
        let level = self.u8_at(address + 5)?;
        if expected_level.is_some_and(|expected| expected != level) {
            return Err(decode_error(format!("B-tree at {address} has level {level} out of order")));
        }
        let entries = self.u16_at(address + 6)? as usize;
        for index in 0..entries {
            let child = self.address(address + 32 + index * 16)?;
            if level == 0 {
                out.push(child);
            } else {
                self.collect_symbol_nodes(child, Some(level - 1), out)?;
            }
        }
        Ok(())
    }
}

fn heap_name(names: &[u8], offset: usize) -> Result<String, SampleError> {
    let tail = names
        .get(offset..)
        .ok_or_else(|| decode_error(format!("name offset {offset} is outside the heap")))?;
    let len = tail
        .iter()
        .position(|byte| *byte == 0)
        .ok_or_else(|| decode_error("unterminated link name"))?;
    String::from_utf8(tail[..len].to_vec())
        .map_err(|err| decode_error(format!("link name is not UTF-8: {err}")))
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, SampleError> {
    let raw = data
        .get(offset..offset + 8)
        .ok_or_else(|| decode_error("object header message is truncated"))?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Ok(u64::from_le_bytes(buf))
}

fn dataspace(data: &[u8]) -> Result<Vec<usize>, SampleError> {
    let (version, rank) = match data {
        [version, rank, ..] => (*version, *rank as usize),
        _ => return Err(decode_error("dataspace message is truncated")),
    };
    if rank > MAX_RANK {
        return Err(decode_error(format!("dataspace rank {rank} exceeds {MAX_RANK}")));
    }
    let dims_start = match version {
        1 => 8,
        2 => 4,
        other => return Err(decode_error(format!("unsupported dataspace version {other}"))),
    };
    (0..rank)
        .map(|axis| read_u64(data, dims_start + axis * 8).map(|dim| dim as usize))
        .collect()
}

fn datatype(data: &[u8]) -> Result<DType, SampleError> {
    if data.len() < 8 {
        return Err(decode_error("datatype message is truncated"));
    }
    let class = data[0] & 0x0f;
    let bits = data[1];
    let size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if bits & 0x01 != 0 {
        return Err(decode_error("big-endian datatypes are not supported"));
    }
    match (class, size) {
        (0, 4) if bits & 0x08 != 0 => Ok(DType::Int32),
        (0, 8) if bits & 0x08 != 0 => Ok(DType::Int64),
        (1, 4) => Ok(DType::Float32),
        (1, 8) => Ok(DType::Float64),
        _ => Err(decode_error(format!(
            "unsupported datatype class {class} of {size} bytes"
        ))),
    }
}

fn layout(data: &[u8]) -> Result<(usize, usize), SampleError> {
    match data {
        [3, 1, ..] => {
            let address = read_u64(data, 2)?;
            let size = read_u64(data, 10)?;
            let address = usize::try_from(address)
                .map_err(|_| decode_error("dataset address overflows"))?;
            Ok((address, size as usize))
        }
        [version, class, ..] => Err(decode_error(format!(
            "unsupported layout version {version} class {class}"
        ))),
        _ => Err(decode_error("layout message is truncated")),
    }
}

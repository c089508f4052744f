use crate::array::{DType, DenseArray};

use super::{
    msg, Group, Node, BTREE_NODE_SIZE, CACHE_GROUP, CACHE_NONE, GROUP_INTERNAL_K, GROUP_LEAF_K,
    LOCAL_HEAP_HEADER, OBJECT_HEADER_PREFIX, ROOT_ENTRY_OFFSET, SIGNATURE, SNOD_CAPACITY,
    SNOD_SIZE, SUPERBLOCK_SIZE, SYMBOL_ENTRY_SIZE, UNDEFINED_ADDRESS,
};

/// Local-heap free-list offset meaning "no free block".
const HEAP_FREE_NULL: u64 = 1;
/// Object-header message flag: message content never changes.
const MSG_CONSTANT: u8 = 0x01;

/// Addresses a parent needs to link a written group.
#[derive(Debug, Clone, Copy)]
struct GroupAddrs {
    header: u64,
    btree: u64,
    heap: u64,
}

/// A symbol-table entry, as stored in SNODs and the superblock.
#[derive(Debug, Clone, Copy)]
struct SymbolEntry {
    name_offset: u64,
    header: u64,
    group: Option<GroupAddrs>,
}

impl SymbolEntry {
    fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        put_u64(out, self.name_offset);
        put_u64(out, self.header);
        match self.group {
            Some(group) => {
                put_u32(out, CACHE_GROUP);
                put_u32(out, 0);
                put_u64(out, group.btree);
                put_u64(out, group.heap);
            }
            None => {
                put_u32(out, CACHE_NONE);
                put_u32(out, 0);
            }
        }
        out.resize(start + SYMBOL_ENTRY_SIZE, 0);
    }
}

struct Message {
    kind: u16,
    flags: u8,
    data: Vec<u8>,
}

/// Complete file image with `root` as the root group.
///
/// Children are laid out before their parents so every address is known
/// when it is written; the superblock is patched in last.
pub fn encode(root: &Group) -> Vec<u8> {
    let mut writer = Writer {
        out: vec![0; SUPERBLOCK_SIZE],
    };
    let root_addrs = writer.write_group(root);
    let mut out = writer.out;
    let superblock = superblock(out.len() as u64, root_addrs);
    out[..SUPERBLOCK_SIZE].copy_from_slice(&superblock);
    out
}

fn superblock(eof: u64, root: GroupAddrs) -> Vec<u8> {
    let mut sb = Vec::with_capacity(SUPERBLOCK_SIZE);
    sb.extend_from_slice(&SIGNATURE);
    // superblock, free-space, root group and shared-header versions
    sb.extend_from_slice(&[0, 0, 0, 0, 0]);
    // offset and length sizes, reserved
    sb.extend_from_slice(&[8, 8, 0]);
    put_u16(&mut sb, GROUP_LEAF_K);
    put_u16(&mut sb, GROUP_INTERNAL_K);
    put_u32(&mut sb, 0);
    put_u64(&mut sb, 0);
    put_u64(&mut sb, UNDEFINED_ADDRESS);
    put_u64(&mut sb, eof);
    put_u64(&mut sb, UNDEFINED_ADDRESS);
    debug_assert_eq!(sb.len(), ROOT_ENTRY_OFFSET);
    SymbolEntry {
        name_offset: 0,
        header: root.header,
        group: Some(root),
    }
    .encode(&mut sb);
    sb
}

struct Writer {
    out: Vec<u8>,
}

impl Writer {
    fn position(&self) -> u64 {
        self.out.len() as u64
    }

    fn write_group(&mut self, group: &Group) -> GroupAddrs {
        let mut heap_data = vec![0u8; 8];
        let mut entries = Vec::with_capacity(group.len());
        for (name, node) in group.links.iter() {
            let name_offset = heap_data.len() as u64;
            heap_data.extend_from_slice(name.as_bytes());
            heap_data.push(0);
            pad_to_eight(&mut heap_data);

            let entry = match node {
                Node::Dataset(array) => SymbolEntry {
                    name_offset,
                    header: self.write_dataset(array),
                    group: None,
                },
                Node::Group(child) => {
                    let addrs = self.write_group(child);
                    SymbolEntry {
                        name_offset,
                        header: addrs.header,
                        group: Some(addrs),
                    }
                }
            };
            entries.push(entry);
        }

        let heap = self.write_local_heap(&heap_data);

        let mut children = Vec::new();
        for chunk in entries.chunks(SNOD_CAPACITY) {
            let address = self.write_symbol_node(chunk);
            let last_name = chunk.last().map_or(0, |entry| entry.name_offset);
            children.push((address, last_name));
        }
        let btree = self.write_btree_leaf(&children);

        let header = self.write_object_header(&[Message {
            kind: msg::SYMBOL_TABLE,
            flags: 0,
            data: [btree.to_le_bytes(), heap.to_le_bytes()].concat(),
        }]);
        GroupAddrs {
            header,
            btree,
            heap,
        }
    }

    fn write_dataset(&mut self, array: &DenseArray) -> u64 {
        let data_address = self.position();
        self.out.extend_from_slice(&array.to_le_bytes());
        // every structure after raw data starts on an 8-byte boundary
        pad_to_eight(&mut self.out);
        self.write_object_header(&[
            Message {
                kind: msg::DATASPACE,
                flags: 0,
                data: dataspace_message(array.shape()),
            },
            Message {
                kind: msg::DATATYPE,
                flags: MSG_CONSTANT,
                data: datatype_message(array.dtype()),
            },
            Message {
                kind: msg::FILL_VALUE,
                flags: MSG_CONSTANT,
                data: fill_value_message(),
            },
            Message {
                kind: msg::LAYOUT,
                flags: 0,
                data: layout_message(data_address, array.nbytes() as u64),
            },
        ])
    }

    fn write_object_header(&mut self, messages: &[Message]) -> u64 {
        let address = self.position();
        let body: usize = messages
            .iter()
            .map(|message| 8 + padded_len(message.data.len()))
            .sum();

        self.out.push(1);
        self.out.push(0);
        put_u16(&mut self.out, messages.len() as u16);
        put_u32(&mut self.out, 1);
        put_u32(&mut self.out, body as u32);
        self.out.resize(address as usize + OBJECT_HEADER_PREFIX, 0);

        for message in messages {
            put_u16(&mut self.out, message.kind);
            put_u16(&mut self.out, padded_len(message.data.len()) as u16);
            self.out.extend_from_slice(&[message.flags, 0, 0, 0]);
            self.out.extend_from_slice(&message.data);
            pad_to_eight(&mut self.out);
        }
        address
    }

    fn write_local_heap(&mut self, data: &[u8]) -> u64 {
        let address = self.position();
        self.out.extend_from_slice(b"HEAP");
        self.out.extend_from_slice(&[0, 0, 0, 0]);
        put_u64(&mut self.out, data.len() as u64);
        put_u64(&mut self.out, HEAP_FREE_NULL);
        put_u64(&mut self.out, address + LOCAL_HEAP_HEADER as u64);
        self.out.extend_from_slice(data);
        address
    }

    fn write_symbol_node(&mut self, entries: &[SymbolEntry]) -> u64 {
        let address = self.position();
        self.out.extend_from_slice(b"SNOD");
        self.out.extend_from_slice(&[1, 0]);
        put_u16(&mut self.out, entries.len() as u16);
        for entry in entries {
            entry.encode(&mut self.out);
        }
        self.out.resize(address as usize + SNOD_SIZE, 0);
        address
    }

    /// Group B-tree leaf pointing at symbol nodes; each key after the first
    /// is the heap offset of the last name in the child to its left.
    fn write_btree_leaf(&mut self, children: &[(u64, u64)]) -> u64 {
        let address = self.position();
        self.out.extend_from_slice(b"TREE");
        // node type 0 (group), level 0
        self.out.extend_from_slice(&[0, 0]);
        put_u16(&mut self.out, children.len() as u16);
        put_u64(&mut self.out, UNDEFINED_ADDRESS);
        put_u64(&mut self.out, UNDEFINED_ADDRESS);
        put_u64(&mut self.out, 0);
        for (child, key) in children {
            put_u64(&mut self.out, *child);
            put_u64(&mut self.out, *key);
        }
        self.out.resize(address as usize + BTREE_NODE_SIZE, 0);
        address
    }
}

/// `shape` has at most `MAX_RANK` axes; `Group::add_dataset` enforces it.
fn dataspace_message(shape: &[usize]) -> Vec<u8> {
    let mut data = vec![1, shape.len() as u8, 0, 0, 0, 0, 0, 0];
    for dim in shape {
        put_u64(&mut data, *dim as u64);
    }
    data
}

fn datatype_message(dtype: DType) -> Vec<u8> {
    let mut data = Vec::with_capacity(24);
    match dtype {
        DType::Int32 | DType::Int64 => {
            // version 1, fixed point; little endian, signed
            data.extend_from_slice(&[0x10, 0x08, 0, 0]);
            put_u32(&mut data, dtype.element_size() as u32);
            put_u16(&mut data, 0);
            put_u16(&mut data, (dtype.element_size() * 8) as u16);
        }
        DType::Float32 | DType::Float64 => {
            let (sign, exponent, mantissa, bias) = match dtype {
                DType::Float32 => (31, 8, 23, 127),
                _ => (63, 11, 52, 1023),
            };
            // version 1, floating point; little endian, implied leading mantissa bit
            data.extend_from_slice(&[0x11, 0x20, sign, 0]);
            put_u32(&mut data, dtype.element_size() as u32);
            put_u16(&mut data, 0);
            put_u16(&mut data, (dtype.element_size() * 8) as u16);
            data.extend_from_slice(&[mantissa, exponent, 0, mantissa]);
            put_u32(&mut data, bias);
        }
    }
    data
}

/// Version 2: late allocation, write fill only if set, no fill value defined.
fn fill_value_message() -> Vec<u8> {
    vec![2, 2, 2, 0]
}

/// Version 3 contiguous layout.
fn layout_message(address: u64, size: u64) -> Vec<u8> {
    let mut data = vec![3, 1];
    put_u64(&mut data, address);
    put_u64(&mut data, size);
    data
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(8) * 8
}

fn pad_to_eight(out: &mut Vec<u8>) {
    out.resize(padded_len(out.len()), 0);
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

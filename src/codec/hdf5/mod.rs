//! Hierarchical datasets in the HDF5 file format.
//!
//! Files are written in the earliest layout every HDF5 reader understands:
//! a version-0 superblock, version-1 object headers, and "old-style" groups
//! (a local heap of link names, a version-1 B-tree and symbol-table nodes).
//! Datasets use contiguous storage with little-endian IEEE floats or signed
//! two's complement integers.
//!
//! The writer keeps a single B-tree leaf per group, which bounds a group at
//! [`MAX_LINKS`] links. The reader also walks multi-level B-trees.

mod reader;
mod writer;

use std::collections::BTreeMap;
use std::path::Path;

use crate::array::DenseArray;
use crate::codec::{read_file, write_file};
use crate::error::SampleError;

pub use reader::decode;
pub use writer::encode;

/// File signature at offset 0.
const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];
/// Placeholder for "no address".
const UNDEFINED_ADDRESS: u64 = u64::MAX;
const SUPERBLOCK_SIZE: usize = 96;
const ROOT_ENTRY_OFFSET: usize = 56;
const SYMBOL_ENTRY_SIZE: usize = 40;
const OBJECT_HEADER_PREFIX: usize = 16;
const LOCAL_HEAP_HEADER: usize = 32;

/// Group leaf K: a symbol-table node holds up to `2 * K` links.
const GROUP_LEAF_K: u16 = 4;
/// Group internal K: a B-tree node holds up to `2 * K` children.
const GROUP_INTERNAL_K: u16 = 16;
const SNOD_CAPACITY: usize = 2 * GROUP_LEAF_K as usize;
const BTREE_CAPACITY: usize = 2 * GROUP_INTERNAL_K as usize;
const SNOD_SIZE: usize = 8 + SNOD_CAPACITY * SYMBOL_ENTRY_SIZE;
const BTREE_NODE_SIZE: usize = 24 + (2 * BTREE_CAPACITY + 1) * 8;

/// Largest number of links one group can hold.
pub const MAX_LINKS: usize = SNOD_CAPACITY * BTREE_CAPACITY;

/// Highest dataspace rank HDF5 readers accept.
pub const MAX_RANK: usize = 32;

/// Object-header message types.
mod msg {
    pub const NIL: u16 = 0x0000;
    pub const DATASPACE: u16 = 0x0001;
    pub const DATATYPE: u16 = 0x0003;
    pub const FILL_VALUE: u16 = 0x0005;
    pub const LAYOUT: u16 = 0x0008;
    pub const SYMBOL_TABLE: u16 = 0x0011;
}

/// Symbol-table cache types.
const CACHE_NONE: u32 = 0;
const CACHE_GROUP: u32 = 1;

/// One link target inside a [`Group`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Dataset(DenseArray),
    Group(Group),
}

/// A group of uniquely named links, kept in byte-wise name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    links: BTreeMap<String, Node>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a dataset; arrays above [`MAX_RANK`] dimensions are rejected.
    pub fn add_dataset(&mut self, name: impl Into<String>, array: DenseArray) -> Result<(), SampleError> {
        if array.ndim() > MAX_RANK {
            return Err(SampleError::UnsupportedValue {
                reason: format!(
                    "dataset rank {} exceeds the HDF5 limit of {MAX_RANK}",
                    array.ndim()
                ),
            });
        }
        self.link(name.into(), Node::Dataset(array))
    }

    /// Attach a fully built child group.
    pub fn add_group(&mut self, name: impl Into<String>, group: Group) -> Result<(), SampleError> {
        self.link(name.into(), Node::Group(group))
    }

    /// Builder form of [`Group::add_dataset`].
    pub fn with_dataset(mut self, name: impl Into<String>, array: DenseArray) -> Result<Self, SampleError> {
        self.add_dataset(name, array)?;
        Ok(self)
    }

    /// Builder form of [`Group::add_group`].
    pub fn with_group(mut self, name: impl Into<String>, group: Group) -> Result<Self, SampleError> {
        self.add_group(name, group)?;
        Ok(self)
    }

    fn link(&mut self, name: String, node: Node) -> Result<(), SampleError> {
        validate_link_name(&name)?;
        if self.links.contains_key(&name) {
            return Err(SampleError::DuplicateName { name });
        }
        if self.links.len() >= MAX_LINKS {
            return Err(SampleError::UnsupportedValue {
                reason: format!("group already holds {MAX_LINKS} links, cannot add {name:?}"),
            });
        }
        self.links.insert(name, node);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.links.get(name)
    }

    pub fn dataset(&self, name: &str) -> Option<&DenseArray> {
        match self.links.get(name) {
            Some(Node::Dataset(array)) => Some(array),
            _ => None,
        }
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        match self.links.get(name) {
            Some(Node::Group(group)) => Some(group),
            _ => None,
        }
    }

    /// Resolve a `/`-separated path such as `train/labels`.
    pub fn dataset_at(&self, path: &str) -> Option<&DenseArray> {
        let (parents, leaf) = match path.rsplit_once('/') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, path),
        };
        let mut group = self;
        for part in parents.into_iter().flat_map(|p| p.split('/')) {
            group = group.group(part)?;
        }
        group.dataset(leaf)
    }

    pub fn dataset_names(&self) -> Vec<&str> {
        self.names_where(|node| matches!(node, Node::Dataset(_)))
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.names_where(|node| matches!(node, Node::Group(_)))
    }

    fn names_where(&self, keep: impl Fn(&Node) -> bool) -> Vec<&str> {
        self.links
            .iter()
            .filter(|(_, node)| keep(node))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.links.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Groups and datasets below this group, recursively.
    pub fn count(&self) -> (usize, usize) {
        self.links
            .values()
            .fold((0, 0), |(groups, datasets), node| match node {
                Node::Dataset(_) => (groups, datasets + 1),
                Node::Group(child) => {
                    let (g, d) = child.count();
                    (groups + 1 + g, datasets + d)
                }
            })
    }
}

fn validate_link_name(name: &str) -> Result<(), SampleError> {
    if name.is_empty() || name == "." || name.contains('/') || name.contains('\0') {
        return Err(SampleError::UnsupportedValue {
            reason: format!("invalid link name {name:?}"),
        });
    }
    Ok(())
}

/// Write `root` as the file's root group, overwriting any existing file.
pub fn save(path: &Path, root: &Group) -> Result<u64, SampleError> {
    let bytes = encode(root);
    write_file(path, &bytes)?;
    let (groups, datasets) = root.count();
    log::info!(
        "[Hdf5] wrote {} ({} groups, {} datasets, {} bytes)",
        path.display(),
        groups,
        datasets,
        bytes.len()
    );
    Ok(bytes.len() as u64)
}

pub fn load(path: &Path) -> Result<Group, SampleError> {
    decode(&read_file(path)?)
}

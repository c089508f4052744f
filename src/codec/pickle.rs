//! Python pickle (protocol 4) encoding for object graphs.
//!
//! The encoder emits the same opcode stream CPython's C pickler produces for
//! the equivalent `int`/`float`/`str`/`list`/`dict` value: `PROTO 4`, the body
//! wrapped in `FRAME`s, `MEMOIZE` after every string and container, and
//! `MARK`-delimited `APPENDS`/`SETITEMS` batches of up to 1000 items
//! (single-element containers use `APPEND`/`SETITEM`). Nothing is ever
//! shared by identity, so the memo is written but never referenced.

use std::collections::HashSet;
use std::path::Path;

use crate::codec::{read_file, write_file};
use crate::error::{decode_error, SampleError};

/// Protocol level every sample is written with.
pub const PROTOCOL: u8 = 4;

const BATCH_SIZE: usize = 1000;
const FRAME_SIZE_MIN: usize = 4;
const FRAME_SIZE_TARGET: usize = 64 * 1024;

/// Opcodes used by the encoder and understood by the decoder.
mod op {
    pub const PROTO: u8 = 0x80;
    pub const FRAME: u8 = 0x95;
    pub const STOP: u8 = b'.';
    pub const MARK: u8 = b'(';
    pub const EMPTY_LIST: u8 = b']';
    pub const EMPTY_DICT: u8 = b'}';
    pub const APPEND: u8 = b'a';
    pub const APPENDS: u8 = b'e';
    pub const SETITEM: u8 = b's';
    pub const SETITEMS: u8 = b'u';
    pub const MEMOIZE: u8 = 0x94;
    pub const BINGET: u8 = b'h';
    pub const LONG_BINGET: u8 = b'j';
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const BININT2: u8 = b'M';
    pub const LONG1: u8 = 0x8a;
    pub const BINFLOAT: u8 = b'G';
    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINUNICODE: u8 = b'X';
    pub const BINUNICODE8: u8 = 0x8d;
}

/// Closed object-graph model.
///
/// Integers and floats stay distinct so `2` and `2.0` survive a round trip.
/// Mapping keys are text and keep their insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Sequence(Vec<Value>),
    Mapping(Vec<(String, Value)>),
}

impl Value {
    pub fn sequence<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }

    pub fn mapping<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    /// Look up a mapping entry by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Mapping(entries) => entries
                .iter()
                .find(|(entry, _)| entry == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Nesting depth; scalars are depth 0.
    pub fn depth(&self) -> usize {
        match self {
            Value::Sequence(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
            Value::Mapping(entries) => {
                1 + entries
                    .iter()
                    .map(|(_, value)| value.depth())
                    .max()
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

/// Builds the output, committing the current frame at object boundaries
/// once it passes the target size.
struct Encoder {
    out: Vec<u8>,
    frame: Vec<u8>,
}

impl Encoder {
    fn new() -> Self {
        Self {
            out: vec![op::PROTO, PROTOCOL],
            frame: Vec::new(),
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        self.frame.extend_from_slice(bytes);
    }

    fn commit_frame(&mut self, force: bool) {
        if self.frame.is_empty() || (!force && self.frame.len() < FRAME_SIZE_TARGET) {
            return;
        }
        if self.frame.len() >= FRAME_SIZE_MIN {
            self.out.push(op::FRAME);
            self.out
                .extend_from_slice(&(self.frame.len() as u64).to_le_bytes());
        }
        self.out.append(&mut self.frame);
    }

    fn finish(mut self) -> Vec<u8> {
        self.write(&[op::STOP]);
        self.commit_frame(true);
        self.out
    }

    fn save(&mut self, value: &Value) -> Result<(), SampleError> {
        self.commit_frame(false);
        match value {
            Value::Int(value) => self.save_int(*value),
            Value::Float(value) => {
                self.write(&[op::BINFLOAT]);
                self.write(&value.to_be_bytes());
            }
            Value::Text(text) => self.save_text(text),
            Value::Sequence(items) => self.save_sequence(items)?,
            Value::Mapping(entries) => self.save_mapping(entries)?,
        }
        Ok(())
    }

    fn save_int(&mut self, value: i64) {
        if (0..=0xff).contains(&value) {
            self.write(&[op::BININT1, value as u8]);
        } else if (0..=0xffff).contains(&value) {
            self.write(&[op::BININT2]);
            self.write(&(value as u16).to_le_bytes());
        } else if let Ok(small) = i32::try_from(value) {
            self.write(&[op::BININT]);
            self.write(&small.to_le_bytes());
        } else {
            let bytes = encode_long(value);
            self.write(&[op::LONG1, bytes.len() as u8]);
            self.write(&bytes);
        }
    }

    fn save_text(&mut self, text: &str) {
        let bytes = text.as_bytes();
        if let Ok(len) = u8::try_from(bytes.len()) {
            self.write(&[op::SHORT_BINUNICODE, len]);
        } else if let Ok(len) = u32::try_from(bytes.len()) {
            self.write(&[op::BINUNICODE]);
            self.write(&len.to_le_bytes());
        } else {
            self.write(&[op::BINUNICODE8]);
            self.write(&(bytes.len() as u64).to_le_bytes());
        }
        self.write(bytes);
        self.write(&[op::MEMOIZE]);
    }

    fn save_sequence(&mut self, items: &[Value]) -> Result<(), SampleError> {
        self.write(&[op::EMPTY_LIST, op::MEMOIZE]);
        if let [only] = items {
            self.save(only)?;
            self.write(&[op::APPEND]);
            return Ok(());
        }
        for batch in items.chunks(BATCH_SIZE) {
            self.write(&[op::MARK]);
            for item in batch {
                self.save(item)?;
            }
            self.write(&[op::APPENDS]);
        }
        Ok(())
    }

    fn save_mapping(&mut self, entries: &[(String, Value)]) -> Result<(), SampleError> {
        let mut keys = HashSet::with_capacity(entries.len());
        if let Some((key, _)) = entries.iter().find(|(key, _)| !keys.insert(key.as_str())) {
            return Err(SampleError::UnsupportedValue {
                reason: format!("mapping repeats key {key:?}"),
            });
        }

        self.write(&[op::EMPTY_DICT, op::MEMOIZE]);
        if let [(key, value)] = entries {
            self.save_key(key);
            self.save(value)?;
            self.write(&[op::SETITEM]);
            return Ok(());
        }
        for batch in entries.chunks(BATCH_SIZE) {
            self.write(&[op::MARK]);
            for (key, value) in batch {
                self.save_key(key);
                self.save(value)?;
            }
            self.write(&[op::SETITEMS]);
        }
        Ok(())
    }

    fn save_key(&mut self, key: &str) {
        self.commit_frame(false);
        self.save_text(key);
    }
}

/// Minimal little-endian two's complement bytes, as `LONG1` expects.
fn encode_long(value: i64) -> Vec<u8> {
    let mut bytes = value.to_le_bytes().to_vec();
    while bytes.len() > 1 {
        let last = bytes[bytes.len() - 1];
        let sign_of_next = bytes[bytes.len() - 2] & 0x80;
        if (last == 0x00 && sign_of_next == 0) || (last == 0xff && sign_of_next != 0) {
            bytes.pop();
        } else {
            break;
        }
    }
    bytes
}

fn decode_long(bytes: &[u8]) -> Result<i64, SampleError> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 8 {
        return Err(decode_error("LONG1 value does not fit in 64 bits"));
    }
    let fill = if bytes[bytes.len() - 1] & 0x80 != 0 {
        0xff
    } else {
        0x00
    };
    let mut buf = [fill; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

/// Protocol-4 byte image of `value`.
pub fn encode(value: &Value) -> Result<Vec<u8>, SampleError> {
    let mut encoder = Encoder::new();
    encoder.save(value)?;
    Ok(encoder.finish())
}

/// Write `value` to `path`, overwriting any existing file.
pub fn save(path: &Path, value: &Value) -> Result<u64, SampleError> {
    let bytes = encode(value)?;
    write_file(path, &bytes)?;
    log::info!(
        "[Pickle] wrote {} (protocol {}, depth {}, {} bytes)",
        path.display(),
        PROTOCOL,
        value.depth(),
        bytes.len()
    );
    Ok(bytes.len() as u64)
}

pub fn load(path: &Path) -> Result<Value, SampleError> {
    decode(&read_file(path)?)
}

/// Opcode reader for the subset of pickle the encoder emits, plus memo
/// lookups of strings and scalars.
struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    stack: Vec<Value>,
    marks: Vec<usize>,
    // `None` marks a memoized container; fetching one would alias it.
    memo: Vec<Option<Value>>,
}

impl<'a> Decoder<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], SampleError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| decode_error(format!("truncated pickle at offset {}", self.pos)))?;
        let bytes = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], SampleError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn take_text(&mut self, len: usize) -> Result<Value, SampleError> {
        let raw = self.take(len)?;
        let text = std::str::from_utf8(raw)
            .map_err(|err| decode_error(format!("string is not UTF-8: {err}")))?;
        Ok(Value::Text(text.to_string()))
    }

    fn pop(&mut self) -> Result<Value, SampleError> {
        self.stack
            .pop()
            .ok_or_else(|| decode_error(format!("stack underflow at offset {}", self.pos)))
    }

    fn pop_mark(&mut self) -> Result<Vec<Value>, SampleError> {
        let mark = self
            .marks
            .pop()
            .ok_or_else(|| decode_error("batch opcode without MARK"))?;
        if mark > self.stack.len() {
            return Err(decode_error("MARK points past the stack"));
        }
        Ok(self.stack.split_off(mark))
    }

    fn top_sequence(&mut self) -> Result<&mut Vec<Value>, SampleError> {
        match self.stack.last_mut() {
            Some(Value::Sequence(items)) => Ok(items),
            _ => Err(decode_error("APPEND target is not a list")),
        }
    }

    fn set_items(&mut self, pairs: Vec<Value>) -> Result<(), SampleError> {
        if pairs.len() % 2 != 0 {
            return Err(decode_error("SETITEMS with an odd item count"));
        }
        let entries = match self.stack.last_mut() {
            Some(Value::Mapping(entries)) => entries,
            _ => return Err(decode_error("SETITEM target is not a dict")),
        };
        let mut pairs = pairs.into_iter();
        while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
            let Value::Text(key) = key else {
                return Err(decode_error("only str dict keys are supported"));
            };
            // later assignments win, as in a Python dict
            match entries.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        }
        Ok(())
    }

    fn memo_get(&mut self, index: usize) -> Result<(), SampleError> {
        match self.memo.get(index) {
            Some(Some(value)) => {
                let value = value.clone();
                self.stack.push(value);
                Ok(())
            }
            Some(None) => Err(decode_error("shared container references are not supported")),
            None => Err(decode_error(format!("memo index {index} is unset"))),
        }
    }

    fn run(mut self) -> Result<Value, SampleError> {
        loop {
            let [opcode] = self.take_array::<1>()?;
            match opcode {
                op::PROTO => {
                    let [version] = self.take_array::<1>()?;
                    if version > 5 {
                        return Err(decode_error(format!("unsupported protocol {version}")));
                    }
                }
                op::FRAME => {
                    self.take(8)?;
                }
                op::STOP => {
                    let value = self.pop()?;
                    if !self.stack.is_empty() || !self.marks.is_empty() {
                        return Err(decode_error("values left on the stack at STOP"));
                    }
                    return Ok(value);
                }
                op::MARK => self.marks.push(self.stack.len()),
                op::EMPTY_LIST => self.stack.push(Value::Sequence(Vec::new())),
                op::EMPTY_DICT => self.stack.push(Value::Mapping(Vec::new())),
                op::APPEND => {
                    let item = self.pop()?;
                    self.top_sequence()?.push(item);
                }
                op::APPENDS => {
                    let items = self.pop_mark()?;
                    self.top_sequence()?.extend(items);
                }
                op::SETITEM => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    self.set_items(vec![key, value])?;
                }
                op::SETITEMS => {
                    let pairs = self.pop_mark()?;
                    self.set_items(pairs)?;
                }
                op::MEMOIZE => {
                    let entry = match self.stack.last() {
                        Some(Value::Sequence(_)) | Some(Value::Mapping(_)) => None,
                        Some(value) => Some(value.clone()),
                        None => return Err(decode_error("MEMOIZE on an empty stack")),
                    };
                    self.memo.push(entry);
                }
                op::BINGET => {
                    let [index] = self.take_array::<1>()?;
                    self.memo_get(index as usize)?;
                }
                op::LONG_BINGET => {
                    let index = u32::from_le_bytes(self.take_array::<4>()?);
                    self.memo_get(index as usize)?;
                }
                op::BININT1 => {
                    let [value] = self.take_array::<1>()?;
                    self.stack.push(Value::Int(value.into()));
                }
                op::BININT2 => {
                    let value = u16::from_le_bytes(self.take_array::<2>()?);
                    self.stack.push(Value::Int(value.into()));
                }
                op::BININT => {
                    let value = i32::from_le_bytes(self.take_array::<4>()?);
                    self.stack.push(Value::Int(value.into()));
                }
                op::LONG1 => {
                    let [len] = self.take_array::<1>()?;
                    let value = decode_long(self.take(len as usize)?)?;
                    self.stack.push(Value::Int(value));
                }
                op::BINFLOAT => {
                    let value = f64::from_be_bytes(self.take_array::<8>()?);
                    self.stack.push(Value::Float(value));
                }
                op::SHORT_BINUNICODE => {
                    let [len] = self.take_array::<1>()?;
                    let text = self.take_text(len as usize)?;
                    self.stack.push(text);
                }
                op::BINUNICODE => {
                    let len = u32::from_le_bytes(self.take_array::<4>()?);
                    let text = self.take_text(len as usize)?;
                    self.stack.push(text);
                }
                op::BINUNICODE8 => {
                    let len = u64::from_le_bytes(self.take_array::<8>()?);
                    let len = usize::try_from(len)
                        .map_err(|_| decode_error("BINUNICODE8 length overflows usize"))?;
                    let text = self.take_text(len)?;
                    self.stack.push(text);
                }
                other => {
                    return Err(decode_error(format!(
                        "unsupported opcode 0x{other:02x} at offset {}",
                        self.pos - 1
                    )))
                }
            }
        }
    }
}

/// Rebuild a [`Value`] from pickle bytes.
pub fn decode(bytes: &[u8]) -> Result<Value, SampleError> {
    Decoder {
        bytes,
        pos: 0,
        stack: Vec::new(),
        marks: Vec::new(),
        memo: Vec::new(),
    }
    .run()
}

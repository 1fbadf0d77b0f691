use crate::decoder::Decoder;
use crate::macros::encode_numeric;
use crate::macros::for_each_numeric;
use crate::macros::scope_pair;
use crate::tag::Error;
use crate::tag::Result;
use crate::tag::Scope;
use crate::tag::Tag;

/// An open container on the `Encoder` stack.
struct Frame {
    start: usize,
    scope: Scope,
    count: usize,
}

/// A state-machine driven encoder.
///
/// The encoder keeps a stack of open scopes so it can enforce structure and
/// back-patch the `u32` length of each container when it closes.
///
/// # Structural Invariants
///
/// 1. **Map scopes** accept only `Tag::Variant` entries.
/// 2. **Option, Result and Variant scopes** hold exactly one item.
/// 3. Bytes can only be taken once every scope is closed.
pub struct Encoder {
    buf: Vec<u8>,
    /// Open containers; empty means the root scope is active.
    stack: Vec<Frame>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// Creates a new encoder with default capacity.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
            stack: Vec::with_capacity(8),
        }
    }

    /// Consumes the encoder and returns the final byte vector.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if !self.stack.is_empty() {
            return Err(Error::ScopeStillOpen);
        }
        Ok(self.buf)
    }

    /// Returns a view of the current buffer.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        if !self.stack.is_empty() {
            return Err(Error::ScopeStillOpen);
        }
        Ok(&self.buf)
    }

    /// The currently active scope.
    pub fn scope(&self) -> Scope {
        self.stack.last().map_or(Scope::Root, |f| f.scope)
    }

    fn check_write(&self, tag: Tag) -> Result<()> {
        let Some(frame) = self.stack.last() else {
            return Ok(());
        };
        if frame.scope == Scope::Map && tag != Tag::Variant {
            return Err(Error::InvalidMapEntry);
        }
        if frame.scope.is_single() && frame.count >= 1 {
            return Err(Error::TooManyItems(frame.scope));
        }
        Ok(())
    }

    fn on_item_written(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.count += 1;
        }
    }

    fn write_tag(&mut self, tag: Tag) -> Result<()> {
        self.check_write(tag)?;
        self.buf.push(tag as u8);
        Ok(())
    }

    fn write_blob(&mut self, tag: Tag, v: &[u8]) -> Result<()> {
        if v.len() > u32::MAX as usize {
            return Err(Error::BlobTooLarge(v.len()));
        }
        self.write_tag(tag)?;
        self.buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(v);
        self.on_item_written();
        Ok(())
    }

    fn begin_scope(&mut self, tag: Tag, scope: Scope) -> Result<()> {
        self.write_tag(tag)?;
        self.buf.extend_from_slice(&[0, 0, 0, 0]);
        self.stack.push(Frame { start: self.buf.len(), scope, count: 0 });
        Ok(())
    }

    fn end_scope(&mut self, expected: Scope) -> Result<()> {
        let Some(frame) = self.stack.last() else {
            return Err(Error::ScopeUnderflow);
        };
        if frame.scope != expected {
            return Err(Error::ScopeMismatch { expected, actual: frame.scope });
        }
        if frame.scope.is_single() && frame.count == 0 {
            return Err(Error::EmptyAdt(frame.scope));
        }

        let start = frame.start;
        self.stack.pop();
        let body_len = self.buf.len() - start;
        if body_len > u32::MAX as usize {
            return Err(Error::BlobTooLarge(body_len));
        }
        self.buf[start - 4..start].copy_from_slice(&(body_len as u32).to_le_bytes());
        self.on_item_written();
        Ok(())
    }

    for_each_numeric!(encode_numeric);

    /// Encodes a boolean value.
    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.write_tag(if v { Tag::BoolTrue } else { Tag::BoolFalse })?;
        self.on_item_written();
        Ok(())
    }

    /// Encodes a char as its `u32` scalar value.
    pub fn char(&mut self, v: char) -> Result<()> {
        self.write_tag(Tag::Char)?;
        self.buf.extend_from_slice(&(v as u32).to_le_bytes());
        self.on_item_written();
        Ok(())
    }

    /// Encodes unit `()`.
    pub fn unit(&mut self) -> Result<()> {
        self.write_tag(Tag::Unit)?;
        self.on_item_written();
        Ok(())
    }

    /// Encodes `Option::None`.
    pub fn none(&mut self) -> Result<()> {
        self.write_tag(Tag::OptionNone)?;
        self.on_item_written();
        Ok(())
    }

    /// Encodes a UTF-8 string blob.
    pub fn str(&mut self, v: &str) -> Result<()> {
        self.write_blob(Tag::String, v.as_bytes())
    }

    /// Encodes a raw byte blob.
    pub fn bytes(&mut self, v: &[u8]) -> Result<()> {
        self.write_blob(Tag::Bytes, v)
    }

    /// Appends exactly one already-encoded item.
    ///
    /// The bytes are checked to hold a single well-formed item, so the
    /// surrounding scope rules still apply.
    pub fn raw(&mut self, item: &[u8]) -> Result<()> {
        let mut dec = Decoder::new(item);
        let tag = dec.peek_tag()?;
        dec.skip()?;
        if dec.remaining() != 0 {
            return Err(Error::TrailingBytes(dec.remaining()));
        }
        self.check_write(tag)?;
        self.buf.extend_from_slice(item);
        self.on_item_written();
        Ok(())
    }

    scope_pair!(list_begin, list_end, Tag::List, Scope::List, "a list of any number of items");
    scope_pair!(map_begin, map_end, Tag::Map, Scope::Map, "a map; entries are written with `variant_begin`");
    scope_pair!(some_begin, some_end, Tag::OptionSome, Scope::Option, "`Option::Some` around exactly one item");
    scope_pair!(ok_begin, ok_end, Tag::ResultOk, Scope::Result, "`Result::Ok` around exactly one item");
    scope_pair!(err_begin, err_end, Tag::ResultErr, Scope::Result, "`Result::Err` around exactly one item");

    /// Begins a named Variant. Also used for map entries, where the name is
    /// the key.
    ///
    /// The name is written immediately; exactly one payload item must follow.
    pub fn variant_begin(&mut self, name: &str) -> Result<()> {
        self.begin_scope(Tag::Variant, Scope::Variant)?;
        self.str(name)?;
        if let Some(frame) = self.stack.last_mut() {
            frame.count = 0;
        }
        Ok(())
    }

    /// Ends a Variant.
    pub fn variant_end(&mut self) -> Result<()> {
        self.end_scope(Scope::Variant)
    }
}

use crate::macros::decode_numeric;
use crate::macros::for_each_numeric;
use crate::tag::Error;
use crate::tag::Result;
use crate::tag::Tag;

/// A zero-copy, bounds-checked cursor over a byte slice.
///
/// Reading advances the cursor. Container reads hand out new decoders that
/// are restricted to the container's body.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Fails with `TrailingBytes` unless every byte has been consumed.
    pub fn finish(&self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(Error::TrailingBytes(self.buf.len()))
        }
    }

    /// Peeks the next tag without advancing.
    pub fn peek_tag(&self) -> Result<Tag> {
        let Some(&b) = self.buf.first() else {
            return Err(Error::UnexpectedEnd);
        };
        Tag::from_u8(b).ok_or(Error::InvalidTag(b))
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() {
            return Err(Error::UnexpectedEnd);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        bytes.try_into().map_err(|_| Error::UnexpectedEnd)
    }

    fn read_len(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?) as usize)
    }

    fn expect_tag(&mut self, expected: Tag) -> Result<()> {
        let actual = self.peek_tag()?;
        if actual != expected {
            return Err(Error::UnexpectedTag { expected, actual });
        }
        self.read_bytes(1)?;
        Ok(())
    }

    fn enter(&mut self, expected: Tag) -> Result<Decoder<'a>> {
        self.expect_tag(expected)?;
        let len = self.read_len()?;
        Ok(Decoder::new(self.read_bytes(len)?))
    }

    /// Skips the next item and its nested children.
    pub fn skip(&mut self) -> Result<()> {
        let tag = self.peek_tag()?;
        self.read_bytes(1)?;
        match tag.fixed_width() {
            Some(width) => {
                self.read_bytes(width)?;
            }
            None => {
                let len = self.read_len()?;
                self.read_bytes(len)?;
            }
        }
        Ok(())
    }

    /// Returns the raw encoding of the next item, tag included, and advances
    /// past it.
    pub fn item_bytes(&mut self) -> Result<&'a [u8]> {
        let start = self.buf;
        self.skip()?;
        Ok(&start[..start.len() - self.buf.len()])
    }

    for_each_numeric!(decode_numeric);

    /// Decodes a bool.
    pub fn bool(&mut self) -> Result<bool> {
        match self.peek_tag()? {
            Tag::BoolTrue => {
                self.read_bytes(1)?;
                Ok(true)
            }
            Tag::BoolFalse => {
                self.read_bytes(1)?;
                Ok(false)
            }
            actual => Err(Error::UnexpectedTag { expected: Tag::BoolTrue, actual }),
        }
    }

    /// Decodes a char.
    pub fn char(&mut self) -> Result<char> {
        self.expect_tag(Tag::Char)?;
        let v = u32::from_le_bytes(self.read_array::<4>()?);
        char::from_u32(v).ok_or(Error::InvalidChar(v))
    }

    /// Decodes unit `()`.
    pub fn unit(&mut self) -> Result<()> {
        self.expect_tag(Tag::Unit)
    }

    /// Decodes a UTF-8 string slice.
    pub fn str(&mut self) -> Result<&'a str> {
        self.expect_tag(Tag::String)?;
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Decodes a byte slice.
    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        self.expect_tag(Tag::Bytes)?;
        let len = self.read_len()?;
        self.read_bytes(len)
    }

    /// Decodes a List into an iterator over item decoders.
    pub fn list(&mut self) -> Result<ListIter<'a>> {
        Ok(ListIter { dec: self.enter(Tag::List)? })
    }

    /// Decodes a Map into an iterator over `(key, value)` pairs.
    pub fn map(&mut self) -> Result<MapIter<'a>> {
        Ok(MapIter { dec: self.enter(Tag::Map)? })
    }

    /// Decodes an Option, returning the payload decoder when present.
    pub fn option(&mut self) -> Result<Option<Decoder<'a>>> {
        match self.peek_tag()? {
            Tag::OptionNone => {
                self.read_bytes(1)?;
                Ok(None)
            }
            Tag::OptionSome => Ok(Some(self.enter(Tag::OptionSome)?)),
            actual => Err(Error::UnexpectedTag { expected: Tag::OptionSome, actual }),
        }
    }

    /// Decodes a Result, returning the payload decoder of whichever arm is present.
    pub fn result(&mut self) -> Result<std::result::Result<Decoder<'a>, Decoder<'a>>> {
        match self.peek_tag()? {
            Tag::ResultOk => Ok(Ok(self.enter(Tag::ResultOk)?)),
            Tag::ResultErr => Ok(Err(self.enter(Tag::ResultErr)?)),
            actual => Err(Error::UnexpectedTag { expected: Tag::ResultOk, actual }),
        }
    }

    /// Decodes a Variant into `(name, payload decoder)`.
    pub fn variant(&mut self) -> Result<(&'a str, Decoder<'a>)> {
        let mut inner = self.enter(Tag::Variant)?;
        let name = inner.str()?;
        Ok((name, inner))
    }
}

/// Items within a List.
#[derive(Debug, Clone)]
pub struct ListIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = Result<Decoder<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.dec.is_empty() {
            return None;
        }
        Some(self.dec.item_bytes().map(Decoder::new))
    }
}

/// Key-value entries within a Map.
#[derive(Debug, Clone)]
pub struct MapIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> Iterator for MapIter<'a> {
    type Item = Result<(&'a str, Decoder<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.dec.is_empty() {
            return None;
        }
        Some(self.dec.variant())
    }
}

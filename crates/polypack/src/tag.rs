//! Tags, scopes and errors shared by the encoder and decoder.

use thiserror::Error;

/// Polypack serialization and deserialization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid tag byte {0:#04x}")]
    InvalidTag(u8),
    #[error("expected tag {expected:?}, found {actual:?}")]
    UnexpectedTag { expected: Tag, actual: Tag },
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("{0:#x} is not a unicode scalar value")]
    InvalidChar(u32),
    /// A close call named a different scope than the innermost open one.
    #[error("scope mismatch: expected {expected:?}, found {actual:?}")]
    ScopeMismatch { expected: Scope, actual: Scope },
    #[error("no open scope to close")]
    ScopeUnderflow,
    #[error("buffer finished with open scopes")]
    ScopeStillOpen,
    #[error("input ended in the middle of an item")]
    UnexpectedEnd,
    /// Lengths are written as `u32`.
    #[error("{0} bytes do not fit a u32 length header")]
    BlobTooLarge(usize),
    #[error("too many items in scope {0:?}; expected exactly 1")]
    TooManyItems(Scope),
    #[error("empty scope {0:?}; expected exactly 1 item")]
    EmptyAdt(Scope),
    /// Map entries are written as variants.
    #[error("map entries must be variants")]
    InvalidMapEntry,
    #[error("{0} trailing bytes after last item")]
    TrailingBytes(usize),
    #[error("tag {0:?} cannot start a frame")]
    NotAFrame(Tag),
}

/// Specialized `Result` for polypack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Declares `Tag` with its byte and payload width in one table.
///
/// Width `None` means a `u32` length header follows the tag.
macro_rules! tags {
    ($($name:ident = $byte:literal, $width:expr;)*) => {
        /// The first byte of every encoded item.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Tag {
            $($name = $byte,)*
        }

        impl Tag {
            /// The tag for `b`, or `None` for unassigned bytes.
            pub const fn from_u8(b: u8) -> Option<Self> {
                match b {
                    $($byte => Some(Tag::$name),)*
                    _ => None,
                }
            }

            /// Payload width of a fixed-size tag, or `None` when a length
            /// header follows instead.
            pub const fn fixed_width(self) -> Option<usize> {
                match self {
                    $(Tag::$name => $width,)*
                }
            }
        }
    };
}

tags! {
    BoolTrue = 0x01, Some(0);
    BoolFalse = 0x02, Some(0);
    U8 = 0x03, Some(1);
    U16 = 0x04, Some(2);
    U32 = 0x05, Some(4);
    U64 = 0x06, Some(8);
    S8 = 0x07, Some(1);
    S16 = 0x08, Some(2);
    S32 = 0x09, Some(4);
    S64 = 0x0A, Some(8);
    F32 = 0x0B, Some(4);
    F64 = 0x0C, Some(8);
    Char = 0x0D, Some(4);
    Unit = 0x0E, Some(0);
    OptionNone = 0x0F, Some(0);
    String = 0x10, None;
    Bytes = 0x11, None;
    List = 0x20, None;
    Map = 0x21, None;
    OptionSome = 0x30, None;
    ResultOk = 0x31, None;
    ResultErr = 0x32, None;
    Variant = 0x33, None;
}

/// Open containers tracked by the `Encoder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Root,
    List,
    /// Holds `Tag::Variant` entries only.
    Map,
    /// The single-payload scopes: `Option`, `Result`, `Variant`.
    Option,
    Result,
    Variant,
}

impl Scope {
    /// Whether the scope must hold exactly one item.
    pub const fn is_single(self) -> bool {
        matches!(self, Scope::Option | Scope::Result | Scope::Variant)
    }
}

/// Bytes needed to learn the full length of a length-prefixed item.
pub const FRAME_HEADER_LEN: usize = 5;

/// Body length announced by the header of a blob or container.
pub fn frame_body_len(header: &[u8; FRAME_HEADER_LEN]) -> Result<usize> {
    let tag = Tag::from_u8(header[0]).ok_or(Error::InvalidTag(header[0]))?;
    if tag.fixed_width().is_some() {
        return Err(Error::NotAFrame(tag));
    }
    let [_, len @ ..] = *header;
    Ok(u32::from_le_bytes(len) as usize)
}

//! # Polypack
//!
//! A small, strict, schema-agnostic binary codec. It is the byte layer under
//! every polyrpc envelope.
//!
//! ## Philosophy
//!
//! - **TLV**: `[Tag][Length?][Value]`, so any item can be skipped without a schema.
//! - **Strict**: the encoder tracks open scopes and refuses malformed structure.
//! - **Zero-copy**: decoders are bounds-checked views into the input.
//!
//! ## Format
//!
//! - **Scalars**: `[Tag: 1b][Data: N]`
//! - **Blobs**: `[Tag: 1b][Len: 4b][Data: Len]`
//! - **Containers**: `[Tag: 1b][Len: 4b][Body: Len]`
//!
//! All integers are little-endian. A container's length header doubles as
//! its stream frame: read `FRAME_HEADER_LEN` bytes, then `frame_body_len`.

mod macros;

pub mod tag;
pub mod encoder;
pub mod decoder;

pub use tag::Error;
pub use tag::Result;
pub use tag::Scope;
pub use tag::Tag;
pub use tag::FRAME_HEADER_LEN;
pub use tag::frame_body_len;

pub use encoder::Encoder;

pub use decoder::Decoder;
pub use decoder::ListIter;
pub use decoder::MapIter;

#[cfg(test)]
mod tests;

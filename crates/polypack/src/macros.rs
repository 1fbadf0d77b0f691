//! Scalar method generators. Every little-endian numeric shares one shape.

/// Calls `$m!(method, type, Tag)` for each little-endian numeric scalar.
macro_rules! for_each_numeric {
    ($m:ident) => {
        $m!(u8,  u8,  crate::tag::Tag::U8);
        $m!(i8,  i8,  crate::tag::Tag::S8);
        $m!(u16, u16, crate::tag::Tag::U16);
        $m!(i16, i16, crate::tag::Tag::S16);
        $m!(u32, u32, crate::tag::Tag::U32);
        $m!(i32, i32, crate::tag::Tag::S32);
        $m!(u64, u64, crate::tag::Tag::U64);
        $m!(i64, i64, crate::tag::Tag::S64);
        $m!(f32, f32, crate::tag::Tag::F32);
        $m!(f64, f64, crate::tag::Tag::F64);
    };
}

/// `Encoder::$name(v)` writes `[tag][v as LE]`.
macro_rules! encode_numeric {
    ($name:ident, $ty:ty, $tag:expr) => {
        #[doc = concat!("Encodes a `", stringify!($ty), "` (LE).")]
        pub fn $name(&mut self, v: $ty) -> crate::tag::Result<()> {
            self.write_tag($tag)?;
            self.buf.extend_from_slice(&v.to_le_bytes());
            self.on_item_written();
            Ok(())
        }
    };
}

/// `Decoder::$name()` checks the tag and reads `size_of::<$ty>()` LE bytes.
macro_rules! decode_numeric {
    ($name:ident, $ty:ty, $tag:expr) => {
        #[doc = concat!("Decodes a `", stringify!($ty), "` (LE).")]
        pub fn $name(&mut self) -> crate::tag::Result<$ty> {
            self.expect_tag($tag)?;
            let bytes = self.read_array::<{ std::mem::size_of::<$ty>() }>()?;
            Ok(<$ty>::from_le_bytes(bytes))
        }
    };
}

/// `Encoder::$begin()` / `Encoder::$end()` for one container scope.
macro_rules! scope_pair {
    ($begin:ident, $end:ident, $tag:expr, $scope:expr, $what:literal) => {
        #[doc = concat!("Opens ", $what, ".")]
        pub fn $begin(&mut self) -> crate::tag::Result<()> {
            self.begin_scope($tag, $scope)
        }

        #[doc = concat!("Closes the scope opened by `", stringify!($begin), "`.")]
        pub fn $end(&mut self) -> crate::tag::Result<()> {
            self.end_scope($scope)
        }
    };
}

pub(crate) use for_each_numeric;
pub(crate) use scope_pair;
pub(crate) use encode_numeric;
pub(crate) use decode_numeric;

use crate::*;
use rand::Rng;

// ============================================================================
//  SCALARS
// ============================================================================

#[test]
fn test_numeric_roundtrip() -> Result<()> {
    let mut enc = Encoder::new();
    enc.u8(255)?;
    enc.i8(-128)?;
    enc.u16(u16::MAX)?;
    enc.i16(i16::MIN)?;
    enc.u32(0xDEAD_BEEF)?;
    enc.i32(-7)?;
    enc.u64(u64::MAX)?;
    enc.i64(i64::MIN)?;
    enc.f32(1.5)?;
    enc.f64(std::f64::consts::PI)?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.u8()?, 255);
    assert_eq!(dec.i8()?, -128);
    assert_eq!(dec.u16()?, u16::MAX);
    assert_eq!(dec.i16()?, i16::MIN);
    assert_eq!(dec.u32()?, 0xDEAD_BEEF);
    assert_eq!(dec.i32()?, -7);
    assert_eq!(dec.u64()?, u64::MAX);
    assert_eq!(dec.i64()?, i64::MIN);
    assert_eq!(dec.f32()?, 1.5);
    assert_eq!(dec.f64()?, std::f64::consts::PI);
    dec.finish()?;
    Ok(())
}

#[test]
fn test_bool_char_unit_none() -> Result<()> {
    let mut enc = Encoder::new();
    enc.bool(true)?;
    enc.bool(false)?;
    enc.char('λ')?;
    enc.unit()?;
    enc.none()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    assert!(dec.bool()?);
    assert!(!dec.bool()?);
    assert_eq!(dec.char()?, 'λ');
    dec.unit()?;
    assert!(dec.option()?.is_none());
    assert_eq!(dec.remaining(), 0);
    Ok(())
}

#[test]
fn test_scalar_layout_is_little_endian() -> Result<()> {
    let mut enc = Encoder::new();
    enc.u32(0x0102_0304)?;
    assert_eq!(enc.into_bytes()?, vec![Tag::U32 as u8, 0x04, 0x03, 0x02, 0x01]);
    Ok(())
}

#[test]
fn test_random_u64_roundtrip() -> Result<()> {
    let mut rng = rand::thread_rng();
    let values: Vec<u64> = (0..64).map(|_| rng.r#gen()).collect();

    let mut enc = Encoder::new();
    enc.list_begin()?;
    for v in &values {
        enc.u64(*v)?;
    }
    enc.list_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let decoded = dec
        .list()?
        .map(|item| item.and_then(|mut d| d.u64()))
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(decoded, values);
    Ok(())
}

// ============================================================================
//  BLOBS AND CONTAINERS
// ============================================================================

#[test]
fn test_str_and_bytes() -> Result<()> {
    let mut enc = Encoder::new();
    enc.str("hello")?;
    enc.bytes(&[1, 2, 3])?;
    enc.str("")?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.str()?, "hello");
    assert_eq!(dec.bytes()?, &[1, 2, 3]);
    assert_eq!(dec.str()?, "");
    Ok(())
}

#[test]
fn test_map_of_variants() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    enc.variant_begin("a")?;
    enc.u8(1)?;
    enc.variant_end()?;
    enc.variant_begin("b")?;
    enc.str("two")?;
    enc.variant_end()?;
    enc.map_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut map = dec.map()?;

    let (k, mut v) = map.next().ok_or(Error::UnexpectedEnd)??;
    assert_eq!(k, "a");
    assert_eq!(v.u8()?, 1);

    let (k, mut v) = map.next().ok_or(Error::UnexpectedEnd)??;
    assert_eq!(k, "b");
    assert_eq!(v.str()?, "two");

    assert!(map.next().is_none());
    Ok(())
}

#[test]
fn test_option_and_result() -> Result<()> {
    let mut enc = Encoder::new();
    enc.some_begin()?;
    enc.u16(9)?;
    enc.some_end()?;
    enc.ok_begin()?;
    enc.str("fine")?;
    enc.ok_end()?;
    enc.err_begin()?;
    enc.str("broken")?;
    enc.err_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut some = dec.option()?.ok_or(Error::UnexpectedEnd)?;
    assert_eq!(some.u16()?, 9);

    match dec.result()? {
        Ok(mut d) => assert_eq!(d.str()?, "fine"),
        Err(_) => panic!("expected ok"),
    }
    match dec.result()? {
        Err(mut d) => assert_eq!(d.str()?, "broken"),
        Ok(_) => panic!("expected err"),
    }
    Ok(())
}

#[test]
fn test_skip_nested() -> Result<()> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    enc.map_begin()?;
    enc.variant_begin("deep")?;
    enc.list_begin()?;
    enc.u64(1)?;
    enc.list_end()?;
    enc.variant_end()?;
    enc.map_end()?;
    enc.list_end()?;
    enc.u8(7)?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    dec.skip()?;
    assert_eq!(dec.u8()?, 7);
    Ok(())
}

#[test]
fn test_raw_appends_one_item() -> Result<()> {
    let mut inner = Encoder::new();
    inner.list_begin()?;
    inner.str("x")?;
    inner.list_end()?;
    let item = inner.into_bytes()?;

    let mut enc = Encoder::new();
    enc.some_begin()?;
    enc.raw(&item)?;
    enc.some_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut payload = dec.option()?.ok_or(Error::UnexpectedEnd)?;
    assert_eq!(payload.item_bytes()?, item.as_slice());
    Ok(())
}

#[test]
fn test_frame_body_len() -> Result<()> {
    let mut enc = Encoder::new();
    enc.variant_begin("Envelope")?;
    enc.bytes(&[0; 10])?;
    enc.variant_end()?;
    let bytes = enc.into_bytes()?;

    let header: [u8; FRAME_HEADER_LEN] = bytes[..FRAME_HEADER_LEN].try_into().unwrap();
    assert_eq!(frame_body_len(&header)? + FRAME_HEADER_LEN, bytes.len());
    Ok(())
}

// ============================================================================
//  STRUCTURAL ERRORS
// ============================================================================

#[test]
fn test_map_rejects_non_variant() {
    let mut enc = Encoder::new();
    enc.map_begin().unwrap();
    assert_eq!(enc.u8(1), Err(Error::InvalidMapEntry));
}

#[test]
fn test_option_rejects_second_item() {
    let mut enc = Encoder::new();
    enc.some_begin().unwrap();
    enc.u8(1).unwrap();
    assert_eq!(enc.u8(2), Err(Error::TooManyItems(Scope::Option)));
}

#[test]
fn test_empty_variant_rejected() {
    let mut enc = Encoder::new();
    enc.variant_begin("v").unwrap();
    assert_eq!(enc.variant_end(), Err(Error::EmptyAdt(Scope::Variant)));
}

#[test]
fn test_scope_mismatch_and_underflow() {
    let mut enc = Encoder::new();
    assert_eq!(enc.list_end(), Err(Error::ScopeUnderflow));
    enc.list_begin().unwrap();
    assert_eq!(
        enc.map_end(),
        Err(Error::ScopeMismatch { expected: Scope::Map, actual: Scope::List })
    );
    assert!(matches!(enc.into_bytes(), Err(Error::ScopeStillOpen)));
}

#[test]
fn test_raw_rejects_trailing_bytes() -> Result<()> {
    let mut two = Encoder::new();
    two.u8(1)?;
    two.u8(2)?;
    let bytes = two.into_bytes()?;

    let mut enc = Encoder::new();
    assert_eq!(enc.raw(&bytes), Err(Error::TrailingBytes(2)));
    Ok(())
}

#[test]
fn test_truncated_and_invalid_input() {
    let mut dec = Decoder::new(&[Tag::String as u8, 10, 0, 0, 0, b'a']);
    assert_eq!(dec.str(), Err(Error::UnexpectedEnd));

    let dec = Decoder::new(&[0xFF]);
    assert_eq!(dec.peek_tag(), Err(Error::InvalidTag(0xFF)));

    let mut dec = Decoder::new(&[Tag::U8 as u8, 1]);
    assert_eq!(
        dec.str(),
        Err(Error::UnexpectedTag { expected: Tag::String, actual: Tag::U8 })
    );

    let mut dec = Decoder::new(&[Tag::Char as u8, 0x00, 0xD8, 0x00, 0x00]);
    assert_eq!(dec.char(), Err(Error::InvalidChar(0xD800)));
}

#[test]
fn test_scalar_is_not_a_frame() {
    let header = [Tag::U32 as u8, 0, 0, 0, 0];
    assert_eq!(frame_body_len(&header), Err(Error::NotAFrame(Tag::U32)));
}

#[test]
fn test_tag_table_is_consistent() {
    let tags: Vec<Tag> = (0..=u8::MAX).filter_map(Tag::from_u8).collect();
    assert_eq!(tags.len(), 23);
    for tag in tags {
        assert_eq!(Tag::from_u8(tag as u8), Some(tag));
        // Only length-prefixed tags can start a frame.
        let framed = [tag as u8, 0, 0, 0, 0];
        assert_eq!(frame_body_len(&framed).is_ok(), tag.fixed_width().is_none(), "{tag:?}");
    }
    assert!(Scope::Variant.is_single());
    assert!(!Scope::Map.is_single());
    assert_eq!(Error::InvalidTag(0xFF).to_string(), "invalid tag byte 0xff");
}

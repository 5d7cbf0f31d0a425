//! decoder of the self describing binary JSON column format
//!
//! reference: https://github.com/mysql/mysql-server/blob/5.7/sql/json_binary.cc
use crate::decimal::MyDecimal;
use crate::error::{Error, Result};
use crate::time::{MyDateTime, MyTime};
use bytes::Bytes;
use serde_json::{Map, Number, Value};

const TYPE_SMALL_OBJECT: u8 = 0x00;
const TYPE_LARGE_OBJECT: u8 = 0x01;
const TYPE_SMALL_ARRAY: u8 = 0x02;
const TYPE_LARGE_ARRAY: u8 = 0x03;
const TYPE_LITERAL: u8 = 0x04;
const TYPE_INT16: u8 = 0x05;
const TYPE_UINT16: u8 = 0x06;
const TYPE_INT32: u8 = 0x07;
const TYPE_UINT32: u8 = 0x08;
const TYPE_INT64: u8 = 0x09;
const TYPE_UINT64: u8 = 0x0a;
const TYPE_DOUBLE: u8 = 0x0b;
const TYPE_STRING: u8 = 0x0c;
const TYPE_CUSTOM: u8 = 0x0f;

const LITERAL_NULL: u8 = 0x00;
const LITERAL_TRUE: u8 = 0x01;
const LITERAL_FALSE: u8 = 0x02;

/// decode one binary JSON document
///
/// an empty payload denotes SQL NULL stored in a JSON column
pub fn decode_json(input: &Bytes) -> Result<Value> {
    if input.is_empty() {
        return Ok(Value::Null);
    }
    decode_value(input[0], &input[1..])
}

fn decode_value(type_tag: u8, data: &[u8]) -> Result<Value> {
    match type_tag {
        TYPE_SMALL_OBJECT => decode_object(data, false),
        TYPE_LARGE_OBJECT => decode_object(data, true),
        TYPE_SMALL_ARRAY => decode_array(data, false),
        TYPE_LARGE_ARRAY => decode_array(data, true),
        TYPE_LITERAL => decode_literal(*first(data)?),
        TYPE_INT16 => Ok(Value::Number(Number::from(
            i16::from_le_bytes(fixed::<2>(data)?),
        ))),
        TYPE_UINT16 => Ok(Value::Number(Number::from(
            u16::from_le_bytes(fixed::<2>(data)?),
        ))),
        TYPE_INT32 => Ok(Value::Number(Number::from(
            i32::from_le_bytes(fixed::<4>(data)?),
        ))),
        TYPE_UINT32 => Ok(Value::Number(Number::from(
            u32::from_le_bytes(fixed::<4>(data)?),
        ))),
        TYPE_INT64 => Ok(Value::Number(Number::from(
            i64::from_le_bytes(fixed::<8>(data)?),
        ))),
        TYPE_UINT64 => Ok(Value::Number(Number::from(
            u64::from_le_bytes(fixed::<8>(data)?),
        ))),
        TYPE_DOUBLE => {
            let v = f64::from_le_bytes(fixed::<8>(data)?);
            Ok(Number::from_f64(v)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        TYPE_STRING => {
            let (len, n) = read_var_len(data)?;
            let bs = slice(data, n, len)?;
            Ok(Value::String(
                String::from_utf8(bs.to_vec()).map_err(crate::error::Error::from)?,
            ))
        }
        TYPE_CUSTOM => decode_opaque(data),
        _ => Err(Error::MalformedPacket(format!(
            "invalid json value type: {:#04x}",
            type_tag
        ))),
    }
}

fn decode_literal(b: u8) -> Result<Value> {
    match b {
        LITERAL_NULL => Ok(Value::Null),
        LITERAL_TRUE => Ok(Value::Bool(true)),
        LITERAL_FALSE => Ok(Value::Bool(false)),
        _ => Err(Error::MalformedPacket(format!(
            "invalid json literal: {:#04x}",
            b
        ))),
    }
}

/// object payload: count, size, per element (key offset, key length),
/// per element value slot, keys, values; offsets are relative to the
/// payload start
fn decode_object(data: &[u8], large: bool) -> Result<Value> {
    let (count, size) = container_head(data, large)?;
    if data.len() < size {
        return Err(Error::MalformedPacket(format!(
            "json object truncated: declared={}, actual={}",
            size,
            data.len()
        )));
    }
    let entry = if large { 4 } else { 2 };
    let key_entries_at = entry * 2;
    let value_entries_at = key_entries_at + count * (entry + 2);
    let mut map = Map::with_capacity(count);
    for i in 0..count {
        let key_at = key_entries_at + i * (entry + 2);
        let key_offset = read_offset(data, key_at, large)?;
        let key_len = u16::from_le_bytes(fixed::<2>(slice(data, key_at + entry, 2)?)?) as usize;
        let key_bytes = slice(data, key_offset, key_len)?;
        let key = String::from_utf8(key_bytes.to_vec()).map_err(crate::error::Error::from)?;
        let value = decode_slot(data, value_entries_at + i * (entry + 1), large)?;
        map.insert(key, value);
    }
    Ok(Value::Object(map))
}

fn decode_array(data: &[u8], large: bool) -> Result<Value> {
    let (count, size) = container_head(data, large)?;
    if data.len() < size {
        return Err(Error::MalformedPacket(format!(
            "json array truncated: declared={}, actual={}",
            size,
            data.len()
        )));
    }
    let entry = if large { 4 } else { 2 };
    let value_entries_at = entry * 2;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        values.push(decode_slot(data, value_entries_at + i * (entry + 1), large)?);
    }
    Ok(Value::Array(values))
}

/// a value slot inlines small scalars, anything else is an offset
/// into the container payload
fn decode_slot(data: &[u8], at: usize, large: bool) -> Result<Value> {
    let entry = if large { 4 } else { 2 };
    let slot_type = *first(slice(data, at, 1 + entry)?)?;
    let inline = &data[at + 1..at + 1 + entry];
    let inlined = match slot_type {
        TYPE_LITERAL => true,
        TYPE_INT16 | TYPE_UINT16 => true,
        TYPE_INT32 | TYPE_UINT32 => large,
        _ => false,
    };
    if inlined {
        return decode_value(slot_type, inline);
    }
    let offset = if large {
        u32::from_le_bytes(fixed::<4>(inline)?) as usize
    } else {
        u16::from_le_bytes(fixed::<2>(inline)?) as usize
    };
    if offset > data.len() {
        return Err(Error::MalformedPacket(format!(
            "json value offset out of range: {}",
            offset
        )));
    }
    decode_value(slot_type, &data[offset..])
}

fn container_head(data: &[u8], large: bool) -> Result<(usize, usize)> {
    if large {
        let count = u32::from_le_bytes(fixed::<4>(data)?) as usize;
        let size = u32::from_le_bytes(fixed::<4>(slice(data, 4, 4)?)?) as usize;
        Ok((count, size))
    } else {
        let count = u16::from_le_bytes(fixed::<2>(data)?) as usize;
        let size = u16::from_le_bytes(fixed::<2>(slice(data, 2, 2)?)?) as usize;
        Ok((count, size))
    }
}

fn read_offset(data: &[u8], at: usize, large: bool) -> Result<usize> {
    if large {
        Ok(u32::from_le_bytes(fixed::<4>(slice(data, at, 4)?)?) as usize)
    } else {
        Ok(u16::from_le_bytes(fixed::<2>(slice(data, at, 2)?)?) as usize)
    }
}

/// variable length integer: 7 bits per byte, high bit continues,
/// at most 5 bytes
fn read_var_len(data: &[u8]) -> Result<(usize, usize)> {
    let mut len = 0usize;
    for (i, b) in data.iter().take(5).enumerate() {
        len |= ((b & 0x7f) as usize) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((len, i + 1));
        }
    }
    Err(Error::MalformedPacket(
        "invalid json variable length".to_owned(),
    ))
}

/// custom value: 1-byte column type id, variable length size,
/// type specific payload
fn decode_opaque(data: &[u8]) -> Result<Value> {
    let type_id = *first(data)?;
    let (len, n) = read_var_len(&data[1..])?;
    let payload = slice(data, 1 + n, len)?;
    let v = match type_id {
        // newdecimal: precision and scale precede the packed form
        0xf6 | 0x00 => {
            let head = slice(payload, 0, 2)?;
            let (precision, decimals) = (head[0], head[1]);
            let mut bs = Bytes::copy_from_slice(&payload[2..]);
            let d = MyDecimal::read_from(&mut bs, precision, decimals)?;
            Value::String(d.to_string())
        }
        // temporal payloads reuse the packed in-memory form
        0x0a | 0x0e => {
            let packed = i64::from_le_bytes(fixed::<8>(payload)?);
            let dt = MyDateTime::from_packed(packed.unsigned_abs());
            Value::String(format!(
                "{:04}-{:02}-{:02}",
                dt.year, dt.month, dt.day
            ))
        }
        0x07 | 0x0c => {
            let packed = i64::from_le_bytes(fixed::<8>(payload)?);
            let dt = MyDateTime::from_packed(packed.unsigned_abs());
            Value::String(dt.to_string())
        }
        0x0b => {
            let packed = i64::from_le_bytes(fixed::<8>(payload)?);
            let tm = MyTime::from_packed(packed.unsigned_abs(), packed < 0);
            Value::String(tm.to_string())
        }
        _ => {
            let mut map = Map::with_capacity(2);
            map.insert("type".to_owned(), Value::Number(Number::from(type_id)));
            map.insert(
                "base64".to_owned(),
                Value::String(base64::encode(payload)),
            );
            Value::Object(map)
        }
    };
    Ok(v)
}

fn first(data: &[u8]) -> Result<&u8> {
    data.first()
        .ok_or_else(|| Error::MalformedPacket("json value truncated".to_owned()))
}

fn slice(data: &[u8], at: usize, len: usize) -> Result<&[u8]> {
    data.get(at..at + len)
        .ok_or_else(|| Error::MalformedPacket("json value truncated".to_owned()))
}

fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N]> {
    let bs = data
        .get(..N)
        .ok_or_else(|| Error::MalformedPacket("json value truncated".to_owned()))?;
    let mut out = [0u8; N];
    out.copy_from_slice(bs);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use serde_json::json;

    fn doc(type_tag: u8, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(type_tag);
        out.put_slice(payload);
        out.freeze()
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(Value::Null, decode_json(&Bytes::new()).unwrap());
        assert_eq!(
            Value::Null,
            decode_json(&doc(TYPE_LITERAL, &[LITERAL_NULL])).unwrap()
        );
        assert_eq!(
            Value::Bool(true),
            decode_json(&doc(TYPE_LITERAL, &[LITERAL_TRUE])).unwrap()
        );
        assert_eq!(
            json!(-2),
            decode_json(&doc(TYPE_INT16, &(-2i16).to_le_bytes())).unwrap()
        );
        assert_eq!(
            json!(65535),
            decode_json(&doc(TYPE_UINT16, &65535u16.to_le_bytes())).unwrap()
        );
        assert_eq!(
            json!(-123456789),
            decode_json(&doc(TYPE_INT32, &(-123456789i32).to_le_bytes())).unwrap()
        );
        assert_eq!(
            json!(18446744073709551615u64),
            decode_json(&doc(TYPE_UINT64, &u64::MAX.to_le_bytes())).unwrap()
        );
        assert_eq!(
            json!(1.5),
            decode_json(&doc(TYPE_DOUBLE, &1.5f64.to_le_bytes())).unwrap()
        );
    }

    #[test]
    fn test_decode_string() {
        let mut payload = vec![5u8];
        payload.extend_from_slice(b"hello");
        assert_eq!(
            json!("hello"),
            decode_json(&doc(TYPE_STRING, &payload)).unwrap()
        );
    }

    #[test]
    fn test_decode_long_string_var_len() {
        // 200 bytes: length encodes as two bytes 0xc8 0x01
        let body = vec![b'x'; 200];
        let mut payload = vec![0xc8, 0x01];
        payload.extend_from_slice(&body);
        let v = decode_json(&doc(TYPE_STRING, &payload)).unwrap();
        assert_eq!(Value::String("x".repeat(200)), v);
    }

    #[test]
    fn test_var_len_too_long() {
        let data = [0x80u8, 0x80, 0x80, 0x80, 0x80];
        assert!(read_var_len(&data).is_err());
    }

    // {"a": 1, "b": "x"} in small object form
    fn small_object_fixture() -> Bytes {
        let mut payload = BytesMut::new();
        payload.put_u16_le(2); // element count
        // key entries at 4, value entries at 4 + 2*4 = 12,
        // keys at 12 + 2*3 = 18, values (only "x") after keys at 20
        payload.put_u16_le(22); // total size
        payload.put_u16_le(18); // key "a" offset
        payload.put_u16_le(1);
        payload.put_u16_le(19); // key "b" offset
        payload.put_u16_le(1);
        // value slots
        payload.put_u8(TYPE_INT16);
        payload.put_u16_le(1);
        payload.put_u8(TYPE_STRING);
        payload.put_u16_le(20);
        // keys
        payload.put_slice(b"ab");
        // inline string value "x"
        payload.put_u8(1);
        payload.put_slice(b"x");
        doc(TYPE_SMALL_OBJECT, &payload)
    }

    #[test]
    fn test_decode_small_object() {
        let v = decode_json(&small_object_fixture()).unwrap();
        assert_eq!(json!({"a": 1, "b": "x"}), v);
    }

    #[test]
    fn test_decode_small_array() {
        let mut payload = BytesMut::new();
        payload.put_u16_le(3);
        payload.put_u16_le(4 + 3 * 3 + 8);
        payload.put_u8(TYPE_LITERAL);
        payload.put_u8(LITERAL_FALSE);
        payload.put_u8(0);
        payload.put_u8(TYPE_INT16);
        payload.put_u16_le(7);
        payload.put_u8(TYPE_DOUBLE);
        payload.put_u16_le(13); // offset of the double payload
        payload.put_f64_le(0.25);
        let v = decode_json(&doc(TYPE_SMALL_ARRAY, &payload)).unwrap();
        assert_eq!(json!([false, 7, 0.25]), v);
    }

    #[test]
    fn test_decode_large_array_inline_int32() {
        let mut payload = BytesMut::new();
        payload.put_u32_le(1);
        payload.put_u32_le(8 + 5);
        payload.put_u8(TYPE_INT32);
        payload.put_i32_le(-7);
        let v = decode_json(&doc(TYPE_LARGE_ARRAY, &payload)).unwrap();
        assert_eq!(json!([-7]), v);
    }

    #[test]
    fn test_decode_nested_object() {
        // [{"a": 1, "b": "x"}]
        let inner = small_object_fixture();
        let mut payload = BytesMut::new();
        payload.put_u16_le(1);
        payload.put_u16_le((4 + 3 + inner.len() - 1) as u16);
        payload.put_u8(inner[0]); // small object tag
        payload.put_u16_le(7); // offset past the slot table
        payload.put_slice(&inner[1..]);
        let v = decode_json(&doc(TYPE_SMALL_ARRAY, &payload)).unwrap();
        assert_eq!(json!([{"a": 1, "b": "x"}]), v);
    }

    #[test]
    fn test_decode_opaque_decimal() {
        // opaque newdecimal 1234567.890 (precision 10, scale 3)
        let mut payload = BytesMut::new();
        payload.put_u8(0xf6);
        payload.put_u8(8); // var length of the payload
        payload.put_u8(10);
        payload.put_u8(3);
        payload.put_slice(&[0x80, 0x12, 0xd6, 0x87, 0x03, 0x7a]);
        let v = decode_json(&doc(TYPE_CUSTOM, &payload)).unwrap();
        assert_eq!(json!("1234567.890"), v);
    }

    #[test]
    fn test_decode_opaque_unknown_type() {
        let mut payload = BytesMut::new();
        payload.put_u8(0xff); // geometry
        payload.put_u8(3);
        payload.put_slice(&[1, 2, 3]);
        let v = decode_json(&doc(TYPE_CUSTOM, &payload)).unwrap();
        assert_eq!(
            json!({"type": 255, "base64": base64::encode([1u8, 2, 3])}),
            v
        );
    }

    #[test]
    fn test_truncated_document() {
        assert!(decode_json(&doc(TYPE_INT32, &[0x01, 0x02])).is_err());
        let mut payload = BytesMut::new();
        payload.put_u16_le(4);
        payload.put_u16_le(100);
        assert!(decode_json(&doc(TYPE_SMALL_OBJECT, &payload)).is_err());
    }
}

//! Frame encoding

use super::constants::{class, field, frame, method, FRAME_END};
use super::message::{FieldTable, FieldValue, Method};
use bytes::{BufMut, BytesMut};
use std::io;

/// Encode a method frame for `channel`
pub fn encode_frame(channel: u16, msg: &Method) -> io::Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(128);

    buf.put_u8(frame::METHOD);
    buf.put_u16(channel);
    let size_pos = buf.len();
    buf.put_u32(0);

    let payload_start = buf.len();
    encode_method(&mut buf, msg)?;

    // Fill in payload size
    let size = buf.len() - payload_start;
    buf[size_pos..size_pos + 4].copy_from_slice(&(size as u32).to_be_bytes());
    buf.put_u8(FRAME_END);

    Ok(buf)
}

/// Encode a heartbeat frame
pub fn encode_heartbeat() -> BytesMut {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u8(frame::HEARTBEAT);
    buf.put_u16(0);
    buf.put_u32(0);
    buf.put_u8(FRAME_END);
    buf
}

fn encode_method(buf: &mut BytesMut, msg: &Method) -> io::Result<()> {
    match msg {
        Method::Start {
            version_major,
            version_minor,
            server_properties,
            mechanisms,
            locales,
        } => {
            put_method_id(buf, method::START);
            buf.put_u8(*version_major);
            buf.put_u8(*version_minor);
            put_table(buf, server_properties)?;
            put_long_string(buf, mechanisms.as_bytes());
            put_long_string(buf, locales.as_bytes());
        }
        Method::StartOk {
            client_properties,
            mechanism,
            response,
            locale,
        } => {
            put_method_id(buf, method::START_OK);
            put_table(buf, client_properties)?;
            put_short_string(buf, mechanism)?;
            put_long_string(buf, response);
            put_short_string(buf, locale)?;
        }
        Method::Secure { challenge } => {
            put_method_id(buf, method::SECURE);
            put_long_string(buf, challenge);
        }
        Method::Tune(tuning) | Method::TuneOk(tuning) => {
            let id = if matches!(msg, Method::Tune(_)) {
                method::TUNE
            } else {
                method::TUNE_OK
            };
            put_method_id(buf, id);
            buf.put_u16(tuning.channel_max);
            buf.put_u32(tuning.frame_max);
            buf.put_u16(tuning.heartbeat);
        }
        Method::Open { virtual_host } => {
            put_method_id(buf, method::OPEN);
            put_short_string(buf, virtual_host)?;
            // reserved-1 (capabilities), reserved-2 (insist)
            put_short_string(buf, "")?;
            buf.put_u8(0);
        }
        Method::OpenOk => {
            put_method_id(buf, method::OPEN_OK);
            // reserved-1 (known-hosts)
            put_short_string(buf, "")?;
        }
        Method::Close(reason) => {
            put_method_id(buf, method::CLOSE);
            buf.put_u16(reason.reply_code);
            put_short_string(buf, &reason.reply_text)?;
            buf.put_u16(reason.class_id);
            buf.put_u16(reason.method_id);
        }
        Method::CloseOk => put_method_id(buf, method::CLOSE_OK),
        Method::Other {
            class_id,
            method_id,
        } => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot encode method {}.{}", class_id, method_id),
            ))
        }
    }
    Ok(())
}

fn put_method_id(buf: &mut BytesMut, method_id: u16) {
    buf.put_u16(class::CONNECTION);
    buf.put_u16(method_id);
}

fn put_short_string(buf: &mut BytesMut, s: &str) -> io::Result<()> {
    let len = u8::try_from(s.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("short string longer than 255 bytes: {} bytes", s.len()),
        )
    })?;
    buf.put_u8(len);
    buf.put(s.as_bytes());
    Ok(())
}

fn put_long_string(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put(data);
}

fn put_table(buf: &mut BytesMut, table: &FieldTable) -> io::Result<()> {
    let len_pos = buf.len();
    buf.put_u32(0);

    for (key, value) in table {
        put_short_string(buf, key)?;
        put_field_value(buf, value)?;
    }

    let len = buf.len() - len_pos - 4;
    buf[len_pos..len_pos + 4].copy_from_slice(&(len as u32).to_be_bytes());
    Ok(())
}

fn put_field_value(buf: &mut BytesMut, value: &FieldValue) -> io::Result<()> {
    match value {
        FieldValue::Bool(v) => {
            buf.put_u8(field::BOOL);
            buf.put_u8(u8::from(*v));
        }
        FieldValue::I8(v) => {
            buf.put_u8(field::I8);
            buf.put_i8(*v);
        }
        FieldValue::U8(v) => {
            buf.put_u8(field::U8);
            buf.put_u8(*v);
        }
        FieldValue::I16(v) => {
            buf.put_u8(field::I16);
            buf.put_i16(*v);
        }
        FieldValue::U16(v) => {
            buf.put_u8(field::U16);
            buf.put_u16(*v);
        }
        FieldValue::I32(v) => {
            buf.put_u8(field::I32);
            buf.put_i32(*v);
        }
        FieldValue::U32(v) => {
            buf.put_u8(field::U32);
            buf.put_u32(*v);
        }
        FieldValue::I64(v) => {
            buf.put_u8(field::I64);
            buf.put_i64(*v);
        }
        FieldValue::F32(v) => {
            buf.put_u8(field::F32);
            buf.put_f32(*v);
        }
        FieldValue::F64(v) => {
            buf.put_u8(field::F64);
            buf.put_f64(*v);
        }
        FieldValue::Decimal { scale, value } => {
            buf.put_u8(field::DECIMAL);
            buf.put_u8(*scale);
            buf.put_u32(*value);
        }
        FieldValue::LongString(v) => {
            buf.put_u8(field::LONG_STRING);
            put_long_string(buf, v);
        }
        FieldValue::Bytes(v) => {
            buf.put_u8(field::BYTES);
            put_long_string(buf, v);
        }
        FieldValue::Array(values) => {
            buf.put_u8(field::ARRAY);
            let len_pos = buf.len();
            buf.put_u32(0);
            for v in values {
                put_field_value(buf, v)?;
            }
            let len = buf.len() - len_pos - 4;
            buf[len_pos..len_pos + 4].copy_from_slice(&(len as u32).to_be_bytes());
        }
        FieldValue::Timestamp(v) => {
            buf.put_u8(field::TIMESTAMP);
            buf.put_u64(*v);
        }
        FieldValue::Table(table) => {
            buf.put_u8(field::TABLE);
            put_table(buf, table)?;
        }
        FieldValue::Void => buf.put_u8(field::VOID),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::Tuning;

    #[test]
    fn test_encode_heartbeat() {
        assert_eq!(&encode_heartbeat()[..], &[8, 0, 0, 0, 0, 0, 0, 0xCE]);
    }

    #[test]
    fn test_encode_tune_ok_layout() {
        let buf = encode_frame(
            0,
            &Method::TuneOk(Tuning {
                channel_max: 2047,
                frame_max: 131_072,
                heartbeat: 60,
            }),
        )
        .unwrap();

        // type, channel, size
        assert_eq!(&buf[..7], &[1, 0, 0, 0, 0, 0, 12]);
        // class 10, method 31
        assert_eq!(&buf[7..11], &[0, 10, 0, 31]);
        assert_eq!(&buf[11..13], &2047u16.to_be_bytes());
        assert_eq!(&buf[13..17], &131_072u32.to_be_bytes());
        assert_eq!(&buf[17..19], &60u16.to_be_bytes());
        assert_eq!(buf[19], FRAME_END);
        assert_eq!(buf.len(), 20);
    }

    #[test]
    fn test_encode_open_carries_vhost() {
        let buf = encode_frame(
            0,
            &Method::Open {
                virtual_host: "orders".into(),
            },
        )
        .unwrap();
        assert_eq!(&buf[7..11], &[0, 10, 0, 40]);
        assert_eq!(buf[11], 6);
        assert_eq!(&buf[12..18], b"orders");
    }

    #[test]
    fn test_encode_start_ok_table_length() {
        let buf = encode_frame(
            0,
            &Method::StartOk {
                client_properties: vec![("product".into(), FieldValue::string("x"))],
                mechanism: "PLAIN".into(),
                response: b"\0guest\0guest".to_vec(),
                locale: "en_US".into(),
            },
        )
        .unwrap();
        // table length: key (1 + 7) + tag (1) + long string (4 + 1)
        assert_eq!(&buf[11..15], &14u32.to_be_bytes());
        assert_eq!(&buf[15..23], b"\x07product");
    }

    #[test]
    fn test_encode_rejects_long_short_string() {
        let err = encode_frame(
            0,
            &Method::Open {
                virtual_host: "v".repeat(256),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}

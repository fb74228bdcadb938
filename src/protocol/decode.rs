//! Frame decoding

use super::constants::{class, field, frame, method, FRAME_END, FRAME_HEADER_SIZE};
use super::message::{CloseReason, FieldTable, FieldValue, Frame, Method, Tuning};
use std::io;

/// Largest payload accepted before allocation (128 MiB)
const MAX_FRAME_SIZE: usize = 128 * 1024 * 1024;

/// Decode one frame from the front of `data`
///
/// # Returns
/// `Ok((frame, consumed))` - Frame and number of bytes consumed
/// `Err(e)` with `UnexpectedEof` - more bytes are needed
/// `Err(e)` with `InvalidData` - the bytes are not a valid frame
pub fn decode_frame(data: &[u8]) -> io::Result<(Frame, usize)> {
    if data.len() < FRAME_HEADER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete frame header",
        ));
    }

    let frame_type = data[0];
    let channel = u16::from_be_bytes([data[1], data[2]]);
    let size = u32::from_be_bytes([data[3], data[4], data[5], data[6]]) as usize;

    if size > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "frame size {} exceeds maximum allowed {}",
                size, MAX_FRAME_SIZE
            ),
        ));
    }

    let total = FRAME_HEADER_SIZE + size + 1;
    if data.len() < total {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete frame body",
        ));
    }

    if data[total - 1] != FRAME_END {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad frame end byte: 0x{:02X}", data[total - 1]),
        ));
    }

    let payload = &data[FRAME_HEADER_SIZE..total - 1];
    let decoded = match frame_type {
        frame::METHOD => Frame::Method {
            channel,
            method: decode_method(payload)?,
        },
        frame::HEARTBEAT => Frame::Heartbeat,
        other => Frame::Other {
            frame_type: other,
            channel,
        },
    };

    Ok((decoded, total))
}

fn decode_method(payload: &[u8]) -> io::Result<Method> {
    let mut r = Reader::new(payload);
    let class_id = r.u16()?;
    let method_id = r.u16()?;

    if class_id != class::CONNECTION {
        return Ok(Method::Other {
            class_id,
            method_id,
        });
    }

    let msg = match method_id {
        method::START => Method::Start {
            version_major: r.u8()?,
            version_minor: r.u8()?,
            server_properties: r.table()?,
            mechanisms: String::from_utf8_lossy(r.long_string()?).to_string(),
            locales: String::from_utf8_lossy(r.long_string()?).to_string(),
        },
        method::START_OK => Method::StartOk {
            client_properties: r.table()?,
            mechanism: r.short_string()?,
            response: r.long_string()?.to_vec(),
            locale: r.short_string()?,
        },
        method::SECURE => Method::Secure {
            challenge: r.long_string()?.to_vec(),
        },
        method::TUNE => Method::Tune(r.tuning()?),
        method::TUNE_OK => Method::TuneOk(r.tuning()?),
        method::OPEN => Method::Open {
            virtual_host: r.short_string()?,
        },
        method::OPEN_OK => Method::OpenOk,
        method::CLOSE => Method::Close(CloseReason {
            reply_code: r.u16()?,
            reply_text: r.short_string()?,
            class_id: r.u16()?,
            method_id: r.u16()?,
        }),
        method::CLOSE_OK => Method::CloseOk,
        _ => Method::Other {
            class_id,
            method_id,
        },
    };

    Ok(msg)
}

/// Cursor over a complete payload; running short means the payload is malformed
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame payload truncated",
            ));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> io::Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> io::Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> io::Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn short_string(&mut self) -> io::Result<String> {
        let len = self.u8()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).to_string())
    }

    fn long_string(&mut self) -> io::Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn tuning(&mut self) -> io::Result<Tuning> {
        Ok(Tuning {
            channel_max: self.u16()?,
            frame_max: self.u32()?,
            heartbeat: self.u16()?,
        })
    }

    fn table(&mut self) -> io::Result<FieldTable> {
        let len = self.u32()? as usize;
        let mut inner = Reader::new(self.take(len)?);
        let mut table = Vec::new();
        while inner.pos < inner.data.len() {
            let key = inner.short_string()?;
            let value = inner.field_value()?;
            table.push((key, value));
        }
        Ok(table)
    }

    fn field_value(&mut self) -> io::Result<FieldValue> {
        let tag = self.u8()?;
        let value = match tag {
            field::BOOL => FieldValue::Bool(self.u8()? != 0),
            field::I8 => FieldValue::I8(self.u8()? as i8),
            field::U8 => FieldValue::U8(self.u8()?),
            field::I16 => FieldValue::I16(i16::from_be_bytes(self.array()?)),
            field::U16 => FieldValue::U16(self.u16()?),
            field::I32 => FieldValue::I32(i32::from_be_bytes(self.array()?)),
            field::U32 => FieldValue::U32(self.u32()?),
            field::I64 => FieldValue::I64(i64::from_be_bytes(self.array()?)),
            field::F32 => FieldValue::F32(f32::from_be_bytes(self.array()?)),
            field::F64 => FieldValue::F64(f64::from_be_bytes(self.array()?)),
            field::DECIMAL => FieldValue::Decimal {
                scale: self.u8()?,
                value: self.u32()?,
            },
            field::LONG_STRING => FieldValue::LongString(self.long_string()?.to_vec()),
            field::BYTES => FieldValue::Bytes(self.long_string()?.to_vec()),
            field::ARRAY => {
                let len = self.u32()? as usize;
                let mut inner = Reader::new(self.take(len)?);
                let mut values = Vec::new();
                while inner.pos < inner.data.len() {
                    values.push(inner.field_value()?);
                }
                FieldValue::Array(values)
            }
            field::TIMESTAMP => FieldValue::Timestamp(self.u64()?),
            field::TABLE => FieldValue::Table(self.table()?),
            field::VOID => FieldValue::Void,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown field value type: 0x{:02X}", other),
                ))
            }
        };
        Ok(value)
    }
}

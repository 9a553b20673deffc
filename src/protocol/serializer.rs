// RESP reply serializer

use super::RespValue;
use bytes::{BufMut, BytesMut};

pub struct RespSerializer;

impl RespSerializer {
    /// Serialize a RESP value to bytes
    pub fn serialize(value: &RespValue) -> Vec<u8> {
        let mut buf = BytesMut::new();
        Self::write_value(&mut buf, value);
        buf.to_vec()
    }

    fn write_value(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(b"\r\n");
            }
            RespValue::Error(e) => {
                buf.put_u8(b'-');
                buf.put_slice(e.as_bytes());
                buf.put_slice(b"\r\n");
            }
            RespValue::Integer(i) => {
                buf.put_u8(b':');
                buf.put_slice(i.to_string().as_bytes());
                buf.put_slice(b"\r\n");
            }
            RespValue::BulkString(opt) => match opt {
                None => {
                    buf.put_slice(b"$-1\r\n");
                }
                Some(data) => {
                    buf.put_u8(b'$');
                    buf.put_slice(data.len().to_string().as_bytes());
                    buf.put_slice(b"\r\n");
                    buf.put_slice(data);
                    buf.put_slice(b"\r\n");
                }
            },
            RespValue::Array(opt) => match opt {
                None => {
                    buf.put_slice(b"*-1\r\n");
                }
                Some(arr) => {
                    buf.put_u8(b'*');
                    buf.put_slice(arr.len().to_string().as_bytes());
                    buf.put_slice(b"\r\n");
                    for item in arr {
                        Self::write_value(buf, item);
                    }
                }
            },
        }
    }

    /// Convenience method to create OK response
    pub fn ok() -> Vec<u8> {
        Self::serialize(&RespValue::SimpleString("OK".to_string()))
    }

    /// Convenience method to create error response
    pub fn error(msg: &str) -> Vec<u8> {
        Self::serialize(&RespValue::Error(msg.to_string()))
    }
}

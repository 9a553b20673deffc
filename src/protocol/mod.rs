// Protocol module - RESP reply values and their wire serialization

pub mod serializer;

pub use serializer::RespSerializer;

/// RESP (REdis Serialization Protocol) reply values
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(String),
    /// Error: -ERR unknown command\r\n
    Error(String),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $6\r\nfoobar\r\n (None for null bulk string)
    BulkString(Option<Vec<u8>>),
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n (None for null array)
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    pub fn as_simple_string(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bulk_string(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(Some(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(Some(arr)) => Some(arr),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&str> {
        match self {
            RespValue::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::BulkString(None) | RespValue::Array(None))
    }
}

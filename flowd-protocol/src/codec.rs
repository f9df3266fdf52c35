//! Newline-delimited JSON codec.
//!
//! Every message is one JSON document terminated by `\n`. The decoder
//! buffers partial reads and refuses lines over a configurable limit
//! so a misbehaving peer cannot grow the buffer without bound.

use crate::error::ProtocolError;
use crate::MAX_LINE_BYTES;

/// Encodes a value as a JSON line.
pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Line-delimited JSON decoder.
pub struct LineDecoder {
    buffer: Vec<u8>,
    max_line: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_line,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next JSON line. Returns `Ok(None)` when
    /// no complete line is buffered yet.
    pub fn decode_line<T: serde::de::DeserializeOwned>(
        &mut self,
    ) -> Result<Option<T>, ProtocolError> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if pos > self.max_line {
                    return Err(ProtocolError::LineTooLong {
                        size: pos,
                        max: self.max_line,
                    });
                }
                let line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                let json = std::str::from_utf8(&line[..line.len() - 1])
                    .map_err(|_| ProtocolError::InvalidUtf8)?;
                let value: T = serde_json::from_str(json)?;
                Ok(Some(value))
            }
            None => {
                if self.buffer.len() > self.max_line {
                    return Err(ProtocolError::LineTooLong {
                        size: self.buffer.len(),
                        max: self.max_line,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Operation, Request};

    #[test]
    fn encode_decode_roundtrip() {
        let request = Request::new("1", Operation::Ping);
        let encoded = encode(&request).unwrap();
        assert_eq!(*encoded.last().unwrap(), b'\n');

        let mut decoder = LineDecoder::new();
        decoder.extend(&encoded);

        let decoded: Request = decoder.decode_line().unwrap().unwrap();
        assert_eq!(decoded.id, "1");
        assert_eq!(decoded.op, Operation::Ping);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn multiple_lines_decode_in_order() {
        let req1 = Request::new("1", Operation::Ping);
        let req2 = Request::new("2", Operation::Info);

        let mut data = encode(&req1).unwrap();
        data.extend(encode(&req2).unwrap());

        let mut decoder = LineDecoder::new();
        decoder.extend(&data);

        let decoded1: Request = decoder.decode_line().unwrap().unwrap();
        assert_eq!(decoded1.id, "1");

        let decoded2: Request = decoder.decode_line().unwrap().unwrap();
        assert_eq!(decoded2.id, "2");

        assert!(decoder.decode_line::<Request>().unwrap().is_none());
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let encoded = encode(&Request::new("1", Operation::Ping)).unwrap();

        let mut decoder = LineDecoder::new();
        decoder.extend(&encoded[..10]);
        assert!(decoder.decode_line::<Request>().unwrap().is_none());

        decoder.extend(&encoded[10..]);
        let decoded: Request = decoder.decode_line().unwrap().unwrap();
        assert_eq!(decoded.id, "1");
    }

    #[test]
    fn oversized_line_rejected() {
        let mut decoder = LineDecoder::with_max_line(16);
        decoder.extend(&[b'x'; 32]);
        assert!(matches!(
            decoder.decode_line::<Request>(),
            Err(ProtocolError::LineTooLong { .. })
        ));
    }

    #[test]
    fn invalid_json_is_an_error_not_a_panic() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"{not json}\n");
        assert!(matches!(
            decoder.decode_line::<Request>(),
            Err(ProtocolError::Json(_))
        ));
    }
}

use crate::error::RpcError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single payload (10MB). Larger frames end the session.
pub const MAX_FRAME_LEN: usize = 10_000_000;

/// Transport strategy, fixed for the life of a connection.
///
/// Both strategies carry the compact JSON encoding of a message:
///
/// - `LengthPrefixed`: `[4-byte length, big-endian][payload]`, used on raw
///   TCP sockets. Handles any payload, no delimiter scanning.
/// - `LineDelimited`: `[payload]\n`, one text document per line, used for
///   the HTTP-tunneled variant. Compact JSON never contains a raw newline,
///   so the delimiter cannot appear inside a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    LengthPrefixed,
    LineDelimited,
}

impl Framing {
    /// Encode `msg` into one complete frame.
    pub fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, RpcError> {
        let payload = serde_json::to_vec(msg)?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(RpcError::FrameTooLarge(payload.len()));
        }

        let mut frame = Vec::with_capacity(payload.len() + 4);
        match self {
            Framing::LengthPrefixed => {
                frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                frame.extend_from_slice(&payload);
            }
            Framing::LineDelimited => {
                frame.extend_from_slice(&payload);
                frame.push(b'\n');
            }
        }
        Ok(frame)
    }

    /// Decode one complete frame, as produced by `encode` or `read_frame`.
    pub fn decode<T: DeserializeOwned>(&self, frame: &[u8]) -> Result<T, RpcError> {
        Ok(serde_json::from_slice(self.payload(frame)?)?)
    }

    /// Strip the framing from a complete frame and return its payload.
    pub fn payload<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8], RpcError> {
        match self {
            Framing::LengthPrefixed => {
                let Some((prefix, payload)) = frame.split_first_chunk::<4>() else {
                    return Err(truncated("missing length prefix"));
                };
                let len = u32::from_be_bytes(*prefix) as usize;
                if len > MAX_FRAME_LEN {
                    return Err(RpcError::FrameTooLarge(len));
                }
                if payload.len() != len {
                    return Err(truncated("length prefix does not match payload"));
                }
                Ok(payload)
            }
            Framing::LineDelimited => Ok(frame.trim_ascii_end()),
        }
    }

    /// Read one complete frame.
    ///
    /// Returns `None` when the peer closed the stream cleanly at a frame
    /// boundary. An EOF in the middle of a frame is an I/O error.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Option<Vec<u8>>, RpcError>
    where
        R: AsyncBufRead + Unpin,
    {
        match self {
            Framing::LengthPrefixed => {
                // Peek first so that a close between frames is not an error
                if reader.fill_buf().await?.is_empty() {
                    return Ok(None);
                }

                let mut len_bytes = [0u8; 4];
                reader.read_exact(&mut len_bytes).await?;
                let len = u32::from_be_bytes(len_bytes) as usize;
                if len > MAX_FRAME_LEN {
                    return Err(RpcError::FrameTooLarge(len));
                }

                let mut frame = vec![0u8; len + 4];
                frame[..4].copy_from_slice(&len_bytes);
                reader.read_exact(&mut frame[4..]).await?;
                Ok(Some(frame))
            }
            Framing::LineDelimited => {
                let mut line = Vec::new();
                loop {
                    line.clear();
                    // a full payload plus its delimiter fits in the limit
                    let n = (&mut *reader)
                        .take(MAX_FRAME_LEN as u64 + 1)
                        .read_until(b'\n', &mut line)
                        .await?;
                    if n == 0 {
                        return Ok(None);
                    }
                    let payload_len = line.strip_suffix(b"\n").map_or(line.len(), <[u8]>::len);
                    if payload_len > MAX_FRAME_LEN {
                        return Err(RpcError::FrameTooLarge(payload_len));
                    }
                    if line.last() != Some(&b'\n') {
                        return Err(truncated("stream ended inside a line"));
                    }
                    // blank lines carry no frame
                    if !line.trim_ascii().is_empty() {
                        return Ok(Some(line));
                    }
                }
            }
        }
    }

    /// Encode `msg` and write it as one frame.
    pub async fn write_frame<W, T>(&self, writer: &mut W, msg: &T) -> Result<(), RpcError>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let frame = self.encode(msg)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn truncated(reason: &str) -> RpcError {
    RpcError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{Params, RpcRequest, RpcResponse};
    use serde_json::json;
    use tokio::io::BufReader;
    use tokio_test::io::Builder;

    const BOTH: [Framing; 2] = [Framing::LengthPrefixed, Framing::LineDelimited];

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_map_round_trip() {
        let maps = [
            params(&[]),
            params(&[("name", "world")]),
            params(&[("name", "line\nbreak"), ("quote", "\"x\""), ("emoji", "héllo ✓")]),
        ];
        for framing in BOTH {
            for m in &maps {
                let frame = framing.encode(m).unwrap();
                let back: Params = framing.decode(&frame).unwrap();
                assert_eq!(&back, m, "{:?}", framing);
            }
        }
    }

    #[test]
    fn test_request_round_trip() {
        let req = RpcRequest::new(9, "Greet.Hello", &params(&[("name", "alice")]));
        for framing in BOTH {
            let back: RpcRequest = framing.decode(&framing.encode(&req).unwrap()).unwrap();
            assert_eq!(back, req);
        }
    }

    #[test]
    fn test_frame_layout() {
        let frame = Framing::LengthPrefixed.encode(&json!({"a": "b"})).unwrap();
        assert_eq!(&frame[..4], &9u32.to_be_bytes());
        assert_eq!(&frame[4..], br#"{"a":"b"}"#);

        let line = Framing::LineDelimited.encode(&json!({"a": "b"})).unwrap();
        assert_eq!(line, b"{\"a\":\"b\"}\n");
    }

    #[test]
    fn test_malformed_frame_is_decode_error() {
        for framing in BOTH {
            let mut frame = framing.encode(&json!({"a": "b"})).unwrap();
            let at = if framing == Framing::LengthPrefixed { 4 } else { 0 };
            frame[at] = b'#';
            let err = framing.decode::<Params>(&frame).unwrap_err();
            assert!(matches!(err, RpcError::Decode(_)));
        }
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut frame = Framing::LengthPrefixed.encode(&json!({"a": "b"})).unwrap();
        frame.pop();
        assert!(Framing::LengthPrefixed.decode::<Params>(&frame).is_err());
        assert!(Framing::LengthPrefixed.decode::<Params>(&[0, 1]).is_err());
    }

    #[tokio::test]
    async fn test_multiple_frames_on_one_stream() {
        let messages = vec![
            RpcResponse::with_result(json!(1), json!({"result": "OK"})),
            RpcResponse::with_error(json!(2), -32601, "Method not found: X"),
        ];
        for framing in BOTH {
            let mut buffer = Vec::new();
            for msg in &messages {
                framing.write_frame(&mut buffer, msg).await.unwrap();
            }

            let mut reader = BufReader::new(&buffer[..]);
            for expected in &messages {
                let frame = framing.read_frame(&mut reader).await.unwrap().unwrap();
                let got: RpcResponse = framing.decode(&frame).unwrap();
                assert_eq!(&got, expected);
            }
            assert!(framing.read_frame(&mut reader).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_read_across_partial_reads() {
        let frame = Framing::LengthPrefixed.encode(&json!({"name": "bob"})).unwrap();
        let mock = Builder::new()
            .read(&frame[..2])
            .read(&frame[2..7])
            .read(&frame[7..])
            .build();
        let mut reader = BufReader::new(mock);

        let got = Framing::LengthPrefixed.read_frame(&mut reader).await.unwrap();
        assert_eq!(got, Some(frame));
        assert!(Framing::LengthPrefixed.read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_lines_skipped() {
        let mock = Builder::new().read(b"\n\r\n{\"a\":\"b\"}\n").build();
        let mut reader = BufReader::new(mock);
        let frame = Framing::LineDelimited.read_frame(&mut reader).await.unwrap().unwrap();
        let got: Params = Framing::LineDelimited.decode(&frame).unwrap();
        assert_eq!(got, params(&[("a", "b")]));
    }

    #[tokio::test]
    async fn test_eof_inside_frame_is_error() {
        let frame = Framing::LengthPrefixed.encode(&json!({"name": "bob"})).unwrap();
        let mut reader = BufReader::new(&frame[..frame.len() - 1]);
        let err = Framing::LengthPrefixed.read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, RpcError::Io(_)));

        let mut reader = BufReader::new(&b"{\"a\":\"b\""[..]);
        let err = Framing::LineDelimited.read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, RpcError::Io(_)));
    }

    /// A map whose compact JSON encoding is exactly `len` bytes.
    fn map_encoding_to(len: usize) -> Params {
        // {"k":"<value>"} adds 8 bytes around the value
        let value = "a".repeat(len - 8);
        params(&[("k", value.as_str())])
    }

    #[tokio::test]
    async fn test_frame_at_size_cap_round_trips() {
        let m = map_encoding_to(MAX_FRAME_LEN);
        assert_eq!(serde_json::to_vec(&m).unwrap().len(), MAX_FRAME_LEN);

        for framing in BOTH {
            let frame = framing.encode(&m).unwrap();
            let mut reader = BufReader::new(&frame[..]);
            let read = framing.read_frame(&mut reader).await.unwrap().unwrap();
            assert_eq!(read, frame, "{:?}", framing);
            let back: Params = framing.decode(&read).unwrap();
            assert_eq!(back, m);
        }
    }

    #[tokio::test]
    async fn test_frame_over_size_cap_rejected() {
        let m = map_encoding_to(MAX_FRAME_LEN + 1);
        for framing in BOTH {
            let err = framing.encode(&m).unwrap_err();
            assert!(matches!(err, RpcError::FrameTooLarge(n) if n == MAX_FRAME_LEN + 1));
        }

        // an oversized line written by someone else is refused on read
        let mut line = serde_json::to_vec(&m).unwrap();
        line.push(b'\n');
        let mut reader = BufReader::new(&line[..]);
        let err = Framing::LineDelimited.read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, RpcError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn test_oversized_prefix_rejected() {
        let prefix = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        let mut reader = BufReader::new(&prefix[..]);
        let err = Framing::LengthPrefixed.read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, RpcError::FrameTooLarge(_)));
    }
}

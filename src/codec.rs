use crate::config::{WebSocketConfig, MAX_FRAME_HARD_LIMIT};
use crate::error::Error;
use crate::frame::{apply_mask, Frame, OpCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads and reassembles WebSocket frames off an `AsyncRead` half, per
/// spec §4.A.
pub struct FrameReader<R> {
    reader: R,
    config: WebSocketConfig,
}

/// A single on-the-wire frame header, before the payload has been read.
struct RawHeader {
    final_fragment: bool,
    opcode: OpCode,
    masked: bool,
    length: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, config: WebSocketConfig) -> Self {
        Self { reader, config }
    }

    async fn read_header(&mut self) -> Result<RawHeader, Error> {
        let mut header = [0u8; 2];
        self.reader.read_exact(&mut header).await?;

        let final_fragment = (header[0] & 0b1000_0000) != 0;
        let rsv1 = (header[0] & 0b0100_0000) != 0;
        let rsv2 = (header[0] & 0b0010_0000) != 0;
        let rsv3 = (header[0] & 0b0001_0000) != 0;
        if rsv1 || rsv2 || rsv3 {
            return Err(Error::RSVNotZero);
        }

        let opcode = OpCode::from_byte(header[0]);
        if !final_fragment && opcode.is_control() {
            return Err(Error::ControlFramesFragmented);
        }

        let masked = (header[1] & 0b1000_0000) != 0;
        let mut length = (header[1] & 0b0111_1111) as u64;

        if length > 125 && opcode.is_control() {
            return Err(Error::ControlFramePayloadSize);
        }

        if length == 126 {
            let mut be_bytes = [0u8; 2];
            self.reader.read_exact(&mut be_bytes).await?;
            length = u16::from_be_bytes(be_bytes) as u64;
        } else if length == 127 {
            let mut be_bytes = [0u8; 8];
            self.reader.read_exact(&mut be_bytes).await?;
            // spec §4.A: high 32 bits MUST be zero.
            if be_bytes[0..4] != [0, 0, 0, 0] {
                return Err(Error::InvalidExtendedLength);
            }
            length = u64::from_be_bytes(be_bytes);
        }

        if length as usize > MAX_FRAME_HARD_LIMIT {
            return Err(Error::FrameTooLarge);
        }
        if length as usize > self.config.max_frame_size() {
            return Err(Error::MaxFrameSize);
        }

        Ok(RawHeader {
            final_fragment,
            opcode,
            masked,
            length,
        })
    }

    async fn read_payload(&mut self, header: &RawHeader) -> Result<Vec<u8>, Error> {
        let mask = if header.masked {
            let mut mask = [0u8; 4];
            self.reader.read_exact(&mut mask).await?;
            Some(mask)
        } else {
            None
        };

        let mut payload = vec![0u8; header.length as usize];
        self.reader.read_exact(&mut payload).await?;

        if let Some(mask) = mask {
            apply_mask(&mut payload, mask);
        }

        Ok(payload)
    }

    /// Reads exactly one wire frame (no reassembly). Control frames and
    /// non-final data frames are both returned as-is; `read_frame` on
    /// `FrameReader` is the low-level primitive `FrameStream::read_message`
    /// builds fragment reassembly on top of.
    pub async fn read_raw_frame(&mut self) -> Result<(bool, Frame), Error> {
        let header = self.read_header().await?;
        let payload = self.read_payload(&header).await?;
        Ok((header.final_fragment, Frame::new(header.opcode, payload)))
    }

    /// Reads one complete message, transparently folding in continuation
    /// frames. Per spec §4.A: a continuation is accepted if its opcode is
    /// `Continuation` OR equals the first fragment's opcode (lenient
    /// acceptance); the reassembled frame's opcode is the first fragment's.
    pub async fn read_message(&mut self) -> Result<Frame, Error> {
        let (final_fragment, first) = self.read_raw_frame().await?;
        if final_fragment || first.opcode.is_control() {
            return Ok(first);
        }

        let initial_opcode = first.opcode;
        let mut buffer = first.payload;
        let max_message_size = self.config.max_message_size();

        loop {
            let (final_fragment, next) = self.read_raw_frame().await?;
            let acceptable = matches!(next.opcode, OpCode::Continuation) || next.opcode == initial_opcode;
            if !acceptable {
                return Err(Error::MismatchedContinuationOpcode);
            }

            buffer.extend_from_slice(&next.payload);
            if buffer.len() > max_message_size {
                return Err(Error::MaxMessageSize);
            }

            if final_fragment {
                return Ok(Frame::new(initial_opcode, buffer));
            }
        }
    }
}

/// Writes WebSocket frames to an `AsyncWrite` half, per spec §4.A.
pub struct FrameWriter<W> {
    writer: W,
    mask_outgoing: bool,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W, mask_outgoing: bool) -> Self {
        Self {
            writer,
            mask_outgoing,
        }
    }

    /// Writes a frame with `FIN=1` (no fragmentation on emit, per spec
    /// §4.A). Large payloads (>= 64KB) are written with a second, separate
    /// `write_all` call so the header/mask-key write doesn't force a copy of
    /// the whole payload into one buffer.
    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), Error> {
        let opcode_byte = 0b1000_0000 | frame.opcode.as_u8();
        let payload_len = frame.payload.len();

        let mut header = Vec::with_capacity(14);
        header.push(opcode_byte);

        let mask_bit = if self.mask_outgoing { 0b1000_0000 } else { 0 };
        if payload_len <= 125 {
            header.push(mask_bit | payload_len as u8);
        } else if payload_len <= 65535 {
            header.push(mask_bit | 126);
            header.extend_from_slice(&(payload_len as u16).to_be_bytes());
        } else {
            header.push(mask_bit | 127);
            header.extend_from_slice(&(payload_len as u64).to_be_bytes());
        }

        let mut payload = frame.payload;
        if self.mask_outgoing {
            let key = random_mask_key();
            header.extend_from_slice(&key);
            apply_mask(&mut payload, key);
        }

        self.writer.write_all(&header).await?;
        self.writer.write_all(&payload).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// A fresh CSPRNG-sourced masking key. Spec §9 notes the reference
/// implementation's mask-key derivation (tick XOR pointer times a weak PRNG)
/// is intentionally strengthened here; wire compatibility is unaffected
/// because the peer unmasks unconditionally against whatever key is sent.
fn random_mask_key() -> [u8; 4] {
    rand::random::<[u8; 4]>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn frame_roundtrip_all_opcodes() {
        for opcode in [
            OpCode::Text,
            OpCode::Binary,
            OpCode::Close,
            OpCode::Ping,
            OpCode::Pong,
        ] {
            let (client, server) = duplex(1 << 20);
            let mut writer = FrameWriter::new(client, true);
            let mut reader = FrameReader::new(server, WebSocketConfig::default());

            let payload = if opcode.is_control() {
                vec![7u8; 10]
            } else {
                vec![7u8; 4096]
            };
            writer
                .write_frame(Frame::new(opcode, payload.clone()))
                .await
                .unwrap();

            let (final_fragment, frame) = reader.read_raw_frame().await.unwrap();
            assert!(final_fragment);
            assert_eq!(frame.opcode, opcode);
            assert_eq!(frame.payload, payload);
        }
    }

    #[tokio::test]
    async fn large_binary_roundtrip() {
        let (client, server) = duplex(8 << 20);
        let mut writer = FrameWriter::new(client, true);
        let mut reader = FrameReader::new(server, WebSocketConfig::default());

        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        writer
            .write_frame(Frame::new(OpCode::Binary, payload.clone()))
            .await
            .unwrap();

        let (final_fragment, frame) = reader.read_raw_frame().await.unwrap();
        assert!(final_fragment);
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn fragmented_message_reassembles_with_lenient_continuation() {
        let (client, server) = duplex(1 << 20);
        let mut reader = FrameReader::new(server, WebSocketConfig::default());

        // Manually write 3 raw fragments: first=Text/FIN=0, second=Text/FIN=0
        // (lenient: not Continuation but matches initial opcode), third=Continuation/FIN=1.
        let mut raw = client;
        raw.write_all(&[0b0000_0001, 3]).await.unwrap();
        raw.write_all(b"foo").await.unwrap();
        raw.write_all(&[0b0000_0001, 3]).await.unwrap();
        raw.write_all(b"bar").await.unwrap();
        raw.write_all(&[0b1000_0000, 3]).await.unwrap();
        raw.write_all(b"baz").await.unwrap();

        let frame = reader.read_message().await.unwrap();
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload, b"foobarbaz");
    }

    #[tokio::test]
    async fn rejects_nonzero_high_bits_of_64bit_length() {
        let (mut client, server) = duplex(64);
        let mut reader = FrameReader::new(server, WebSocketConfig::default());

        client.write_all(&[0b1000_0010, 127]).await.unwrap();
        client
            .write_all(&[0, 0, 0, 1, 0, 0, 0, 0])
            .await
            .unwrap();

        let err = reader.read_raw_frame().await.unwrap_err();
        assert!(matches!(err, Error::InvalidExtendedLength));
    }
}

//! Newline framing for inbound packets.
//!
//! A packet is everything a client sends up to and including the first `\n`.
//! [`PacketReader`] accumulates socket reads in an elastic buffer that starts
//! at [`INITIAL_PACKET_CAPACITY`] bytes and doubles whenever the kernel fills
//! it, then hands off delimiter scanning to [`PacketDecoder`].

use std::io;

use bytes::{Bytes, BytesMut};
use memchr::memchr;
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;

/// Initial capacity of the per-connection packet buffer.
pub const INITIAL_PACKET_CAPACITY: usize = 1024;

/// An error that occurred while framing one packet from a client socket.
#[derive(Debug, Snafu)]
pub enum FramingError {
    /// Reading from the client socket failed. Terminates only the worker that
    /// owns the socket.
    #[snafu(display("read from client socket failed: {source}"))]
    Read { source: io::Error },
}

/// A decoder producing newline-terminated frames, delimiter inclusive.
///
/// Unlike a line codec, the trailing `\n` stays part of the frame: the byte
/// sequence committed to the store is exactly what the client sent. The
/// decoder remembers how far it has scanned, so repeated calls over a growing
/// buffer never re-examine old bytes.
#[derive(Debug, Clone, Default)]
pub struct PacketDecoder {
    scanned: usize,
}

impl Decoder for PacketDecoder {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        match memchr(b'\n', &src[self.scanned..]) {
            Some(index) => {
                let end = self.scanned + index + 1;
                self.scanned = 0;
                Ok(Some(src.split_to(end).freeze()))
            }
            None => {
                self.scanned = src.len();
                Ok(None)
            }
        }
    }
}

/// Per-connection packet reader with an elastic buffer.
#[derive(Debug)]
pub struct PacketReader {
    buf: BytesMut,
    decoder: PacketDecoder,
}

impl PacketReader {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_PACKET_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            decoder: PacketDecoder::default(),
        }
    }

    /// Reads one packet, up to and including the first `\n`.
    ///
    /// Bytes received after the delimiter are left in the internal buffer and
    /// discarded with the reader. Returns `Ok(None)` when the peer closes the
    /// connection before completing a packet.
    pub async fn read_packet<R>(&mut self, io: &mut R) -> Result<Option<Bytes>, FramingError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(packet) = self.decoder.decode(&mut self.buf).context(ReadSnafu)? {
                return Ok(Some(packet));
            }

            if self.buf.len() == self.buf.capacity() {
                // The previous read filled the buffer; double it so the next
                // read has the whole prior capacity as room.
                self.buf.reserve(self.buf.capacity());
            }

            let read = io.read_buf(&mut self.buf).await.context(ReadSnafu)?;
            if read == 0 {
                return Ok(None);
            }
        }
    }
}

impl Default for PacketReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    #[test]
    fn decode_keeps_delimiter() {
        let mut decoder = PacketDecoder::default();
        let mut input = BytesMut::from("abc\ndef\n");

        assert_eq!(decoder.decode(&mut input).unwrap().unwrap(), "abc\n");
        assert_eq!(decoder.decode(&mut input).unwrap().unwrap(), "def\n");
        assert_eq!(decoder.decode(&mut input).unwrap(), None);
    }

    #[test]
    fn decode_scans_incrementally() {
        let mut decoder = PacketDecoder::default();
        let mut input = BytesMut::from("abc");

        assert_eq!(decoder.decode(&mut input).unwrap(), None);
        input.extend_from_slice(b"def\ntail");
        assert_eq!(decoder.decode(&mut input).unwrap().unwrap(), "abcdef\n");
        assert_eq!(&input[..], b"tail");
    }

    #[tokio::test]
    async fn reads_one_packet() {
        let mut io = Builder::new().read(b"hello\n").build();
        let mut reader = PacketReader::new();

        let packet = reader.read_packet(&mut io).await.unwrap().unwrap();
        assert_eq!(packet, Bytes::from_static(b"hello\n"));
    }

    #[tokio::test]
    async fn reassembles_split_reads() {
        let mut io = Builder::new()
            .read(b"hel")
            .read(b"lo")
            .read(b" world\n")
            .build();
        let mut reader = PacketReader::new();

        let packet = reader.read_packet(&mut io).await.unwrap().unwrap();
        assert_eq!(packet, Bytes::from_static(b"hello world\n"));
    }

    #[tokio::test]
    async fn discards_bytes_after_delimiter() {
        let mut io = Builder::new().read(b"first\nsecond\n").build();
        let mut reader = PacketReader::new();

        let packet = reader.read_packet(&mut io).await.unwrap().unwrap();
        assert_eq!(packet, Bytes::from_static(b"first\n"));
    }

    #[tokio::test]
    async fn grows_past_initial_capacity() {
        // A payload larger than the initial buffer forces at least one
        // doubling; the received bytes must stay bit-exact.
        let mut payload = vec![b'x'; INITIAL_PACKET_CAPACITY * 2];
        payload.push(b'\n');

        let mut io = Builder::new().read(&payload).build();
        let mut reader = PacketReader::new();

        let packet = reader.read_packet(&mut io).await.unwrap().unwrap();
        assert_eq!(&packet[..], &payload[..]);
    }

    #[tokio::test]
    async fn eof_before_delimiter_yields_none() {
        let mut io = Builder::new().read(b"incomplete").build();
        let mut reader = PacketReader::new();

        assert_eq!(reader.read_packet(&mut io).await.unwrap(), None);
    }

    #[tokio::test]
    async fn immediate_eof_yields_none() {
        let mut io = Builder::new().build();
        let mut reader = PacketReader::new();

        assert_eq!(reader.read_packet(&mut io).await.unwrap(), None);
    }

    #[tokio::test]
    async fn surfaces_read_errors() {
        let mut io = Builder::new()
            .read(b"partial")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut reader = PacketReader::new();

        assert!(reader.read_packet(&mut io).await.is_err());
    }
}

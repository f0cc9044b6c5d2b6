use std::io::{ErrorKind, Write};

use anyhow::{anyhow, bail};
pub use byteorder::BigEndian as Endian;
use byteorder::ByteOrder;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

pub use any::AnyMessage;
pub use format::{PacketReadExt, PacketWriteExt};
pub use sync::{
    ActiveRecord, AttributeRecord, PushAttributeDelta, RequestAddXp, RequestOpenUi, SyncFullState,
};

mod any;

mod format;

mod sync;

/// One replication message kind. The encoding is versionless: a fixed
/// big-endian layout with no padding, identified only by the leading tag
/// byte of its frame.
pub trait Packet
where
    Self: Sized,
{
    const KIND: u8;

    /// Payload length excluding the tag byte, or `None` when the length is
    /// implied by embedded counts.
    fn fixed_length() -> Option<usize>;

    fn decode(payload: &[u8]) -> anyhow::Result<Self>;
    fn encode(&self, writer: &mut impl Write) -> anyhow::Result<()>;
}

/// Receiving half of an ordered replication stream.
pub struct Reader {
    reader: OwnedReadHalf,
    buffer: Vec<u8>,
}

impl Reader {
    fn new(reader: OwnedReadHalf) -> Reader {
        Reader {
            reader,
            buffer: Vec::with_capacity(512),
        }
    }

    async fn read_into(&mut self, count: usize) -> std::io::Result<()> {
        let offset = self.buffer.len();
        self.buffer.resize(offset + count, 0);
        self.reader.read_exact(&mut self.buffer[offset..]).await?;
        Ok(())
    }

    /// Receives the next message; `Ok(None)` on a clean end of stream.
    ///
    /// The wire format carries no length prefix, so an unknown tag cannot
    /// be resynchronized past on a byte stream and is an error here. The
    /// message-level tolerance for unknown tags lives in
    /// [`AnyMessage::decode_frame`], where frame boundaries are known.
    pub async fn recv(&mut self) -> anyhow::Result<Option<AnyMessage>> {
        let mut tag = [0u8; 1];
        match self.reader.read_exact(&mut tag).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        }

        let kind = tag[0];
        let registration = AnyMessage::registration_for(kind)
            .ok_or_else(|| anyhow!("unknown message kind {kind:#04x}"))?;

        self.buffer.clear();
        if let Some(length) = (registration.fixed_length)() {
            self.read_into(length).await?;
        } else {
            // The full snapshot is the only variable-length message; its
            // size follows from the two embedded record counts.
            self.read_into(4).await?;
            let base_count = Endian::read_u32(&self.buffer[0..4]) as usize;
            if base_count > crate::skills::MAX_NUM_SKILLS {
                bail!("snapshot base count {base_count} exceeds registry capacity");
            }
            self.read_into(base_count * sync::BASE_RECORD_LEN).await?;

            let offset = self.buffer.len();
            self.read_into(4).await?;
            let active_count = Endian::read_u32(&self.buffer[offset..offset + 4]) as usize;
            if active_count > crate::skills::MAX_NUM_SKILLS {
                bail!("snapshot active count {active_count} exceeds registry capacity");
            }
            self.read_into(active_count * sync::ACTIVE_RECORD_LEN + 1).await?;
        }

        trace!("RECV: {kind:#04x} {} length={}", registration.type_name, self.buffer.len());
        (registration.decode)(&self.buffer).map(Some)
    }
}

/// Sending half of an ordered replication stream. Messages go out in the
/// order they are passed to [`Writer::send`].
pub struct Writer {
    writer: BufWriter<OwnedWriteHalf>,
    buffer: Vec<u8>,
}

impl Writer {
    fn new(writer: OwnedWriteHalf) -> Writer {
        Writer {
            writer: BufWriter::new(writer),
            buffer: Vec::with_capacity(512),
        }
    }

    pub async fn send(&mut self, message: &AnyMessage) -> anyhow::Result<()> {
        self.buffer.clear();
        message.encode_frame(&mut self.buffer)?;
        trace!(
            "SEND: {:#04x} {} length={}",
            message.kind(),
            message.type_name(),
            self.buffer.len() - 1,
        );

        self.writer.write_all(&self.buffer).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

pub fn new_io(stream: TcpStream) -> (Reader, Writer) {
    let (reader, writer) = stream.into_split();
    (Reader::new(reader), Writer::new(writer))
}

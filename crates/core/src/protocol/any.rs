use std::any::type_name;
use std::io::Write;

use anyhow::bail;
use byteorder::WriteBytesExt;

use crate::protocol::{Packet, PushAttributeDelta, RequestAddXp, RequestOpenUi, SyncFullState};

pub(crate) struct MessageRegistration {
    pub type_name: &'static str,
    pub fixed_length: fn() -> Option<usize>,
    pub decode: fn(payload: &[u8]) -> anyhow::Result<AnyMessage>,
}

impl AnyMessage {
    fn message_registration<P: Packet + Into<AnyMessage>>() -> MessageRegistration {
        MessageRegistration {
            type_name: type_name::<P>(),
            fixed_length: P::fixed_length,
            decode: |payload| P::decode(payload).map(Into::into),
        }
    }

    /// Encodes a complete frame: leading tag byte followed by the payload.
    pub fn encode_frame(&self, writer: &mut impl Write) -> anyhow::Result<()> {
        writer.write_u8(self.kind())?;
        self.encode_payload(writer)
    }

    /// Decodes a complete frame. `Ok(None)` for an unrecognized tag so peer
    /// version skew degrades to a skipped message instead of a dead
    /// channel; truncated or malformed payloads are an error confined to
    /// this one frame.
    pub fn decode_frame(frame: &[u8]) -> anyhow::Result<Option<AnyMessage>> {
        let Some((&kind, payload)) = frame.split_first() else {
            bail!("empty frame");
        };
        let Some(registration) = Self::registration_for(kind) else {
            return Ok(None);
        };
        (registration.decode)(payload).map(Some)
    }
}

macro_rules! impl_message {
    ($ty:ident) => {
        impl From<$ty> for AnyMessage {
            fn from(message: $ty) -> AnyMessage {
                AnyMessage::$ty(message)
            }
        }
    };
}

macro_rules! impl_any {
    ($($ty:ident),+ $(,)?) => {
        /// Closed set of replication messages multiplexed on one logical
        /// channel, distinguished by the leading tag byte.
        #[derive(Clone, Debug, PartialEq)]
        pub enum AnyMessage {
            $($ty($ty),)+
        }

        impl AnyMessage {
            pub(crate) fn registration_for(kind: u8) -> Option<MessageRegistration> {
                match kind {
                    $($ty::KIND => Some(Self::message_registration::<$ty>()),)*
                    _ => None,
                }
            }

            pub fn kind(&self) -> u8 {
                match self {
                    $(AnyMessage::$ty(_) => $ty::KIND,)*
                }
            }

            pub fn type_name(&self) -> &'static str {
                match self {
                    $(AnyMessage::$ty(_) => type_name::<$ty>(),)*
                }
            }

            fn encode_payload(&self, writer: &mut impl Write) -> anyhow::Result<()> {
                match self {
                    $(AnyMessage::$ty(message) => message.encode(writer),)*
                }
            }
        }

        $(impl_message!($ty);)*
    }
}

impl_any!(
    SyncFullState,
    RequestOpenUi,
    RequestAddXp,
    PushAttributeDelta,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tag_is_skipped_not_fatal() {
        assert!(AnyMessage::decode_frame(&[0x7f, 1, 2, 3]).unwrap().is_none());
    }

    #[test]
    fn empty_frame_is_an_error() {
        assert!(AnyMessage::decode_frame(&[]).is_err());
    }
}

use tokio::sync::mpsc::UnboundedSender;
use tracing::{trace, warn};

use skillwire::protocol::AnyMessage;

use crate::progression::{PlayerProgression, Role};

/// Something a received message asks the host application to do, beyond
/// mutating the progression record itself.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChannelEvent {
    /// A client asked the server to open a GUI screen.
    OpenUi { gui_id: i32 },
}

/// Destination for encoded outbound frames. The channel stays ignorant of
/// the transport; production pushes into an mpsc feeding the connection
/// writer, tests collect into a `Vec`.
pub trait MessageSink {
    fn push(&mut self, frame: Vec<u8>) -> anyhow::Result<()>;
}

impl MessageSink for UnboundedSender<Vec<u8>> {
    fn push(&mut self, frame: Vec<u8>) -> anyhow::Result<()> {
        self.send(frame)?;
        Ok(())
    }
}

impl MessageSink for Vec<Vec<u8>> {
    fn push(&mut self, frame: Vec<u8>) -> anyhow::Result<()> {
        Vec::push(self, frame);
        Ok(())
    }
}

/// Routes replication frames between the wire and a [`PlayerProgression`],
/// enforcing which message kinds each side may accept.
///
/// Both directions share one logical channel; the leading tag byte decides
/// the kind. A message arriving on the wrong side is dropped without
/// touching the record, and an unrecognized tag skips that message only,
/// so peer version skew never kills the channel.
#[derive(Debug, Clone, Copy)]
pub struct ReplicationChannel {
    role: Role,
}

impl ReplicationChannel {
    pub fn new(role: Role) -> ReplicationChannel {
        ReplicationChannel { role }
    }

    pub fn role(&self) -> Role { self.role }

    /// Decodes one inbound frame and applies it to `progression`. Returns
    /// an event when the message asks the host for something; decode and
    /// apply errors are confined to this frame.
    pub fn handle_frame(
        &self, progression: &mut PlayerProgression, frame: &[u8],
    ) -> anyhow::Result<Option<ChannelEvent>> {
        let Some(message) = AnyMessage::decode_frame(frame)? else {
            warn!("skipping message with unrecognized tag {:?}", frame.first());
            return Ok(None);
        };

        trace!("received {}", message.type_name());
        match (self.role, message) {
            (Role::Authoritative, AnyMessage::RequestAddXp(request)) => {
                progression.add_xp(request.attribute_id, request.amount)?;
                Ok(None)
            }
            (Role::Authoritative, AnyMessage::RequestOpenUi(request)) => {
                Ok(Some(ChannelEvent::OpenUi { gui_id: request.gui_id }))
            }
            (Role::Observer, AnyMessage::SyncFullState(snapshot)) => {
                progression.apply_snapshot(&snapshot)?;
                Ok(None)
            }
            (Role::Observer, AnyMessage::PushAttributeDelta(delta)) => {
                progression.apply_attribute_delta(&delta)?;
                Ok(None)
            }
            (role, message) => {
                warn!("dropping {} received on the {role:?} side", message.type_name());
                Ok(None)
            }
        }
    }

    /// Drains the progression outbox, encoding each message as a frame and
    /// handing it to the sink in queue order. Returns how many frames were
    /// pushed.
    pub fn flush_outbound(
        &self, progression: &mut PlayerProgression, sink: &mut impl MessageSink,
    ) -> anyhow::Result<usize> {
        let mut pushed = 0;
        for message in progression.drain_outbound() {
            let mut frame = Vec::new();
            message.encode_frame(&mut frame)?;
            trace!("sending {}", message.type_name());
            sink.push(frame)?;
            pushed += 1;
        }
        Ok(pushed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use skillwire::protocol::{Packet, RequestAddXp, RequestOpenUi};
    use skillwire::skills::builtin;
    use skillwire::SkillId;

    use super::*;

    fn frame(message: impl Into<AnyMessage>) -> Vec<u8> {
        let mut bytes = Vec::new();
        message.into().encode_frame(&mut bytes).unwrap();
        bytes
    }

    fn player(role: Role) -> PlayerProgression {
        PlayerProgression::new(Arc::new(builtin::registry()), role).unwrap()
    }

    #[test]
    fn authoritative_side_applies_xp_requests() {
        let channel = ReplicationChannel::new(Role::Authoritative);
        let mut progression = player(Role::Authoritative);

        let request = RequestAddXp { amount: 2.0, attribute_id: SkillId::from_u8(0) };
        let event = channel.handle_frame(&mut progression, &frame(request)).unwrap();

        assert_eq!(event, None);
        assert_eq!(progression.skill_level(SkillId::from_u8(0)), 1);
    }

    #[test]
    fn open_ui_surfaces_as_an_event() {
        let channel = ReplicationChannel::new(Role::Authoritative);
        let mut progression = player(Role::Authoritative);

        let event = channel
            .handle_frame(&mut progression, &frame(RequestOpenUi { gui_id: 7 }))
            .unwrap();
        assert_eq!(event, Some(ChannelEvent::OpenUi { gui_id: 7 }));
    }

    #[test]
    fn wrong_side_messages_are_dropped_without_mutation() {
        let channel = ReplicationChannel::new(Role::Observer);
        let mut progression = player(Role::Observer);

        let request = RequestAddXp { amount: 2.0, attribute_id: SkillId::from_u8(0) };
        let event = channel.handle_frame(&mut progression, &frame(request)).unwrap();

        assert_eq!(event, None);
        assert_eq!(progression.skill_level(SkillId::from_u8(0)), 0);
        assert_eq!(progression.buffered_xp(skillwire::AttributeGroup::Strength), 0.0);
    }

    #[test]
    fn unrecognized_tag_skips_only_that_frame() {
        let channel = ReplicationChannel::new(Role::Authoritative);
        let mut progression = player(Role::Authoritative);

        assert_eq!(channel.handle_frame(&mut progression, &[0x7f, 1, 2]).unwrap(), None);

        // The channel still works afterwards.
        let request = RequestAddXp { amount: 2.0, attribute_id: SkillId::from_u8(0) };
        channel.handle_frame(&mut progression, &frame(request)).unwrap();
        assert_eq!(progression.skill_level(SkillId::from_u8(0)), 1);
    }

    #[test]
    fn truncated_payload_is_an_error_for_that_frame() {
        let channel = ReplicationChannel::new(Role::Authoritative);
        let mut progression = player(Role::Authoritative);

        let mut bytes = frame(RequestAddXp { amount: 2.0, attribute_id: SkillId::from_u8(0) });
        bytes.truncate(RequestAddXp::fixed_length().unwrap());
        assert!(channel.handle_frame(&mut progression, &bytes).is_err());
        assert_eq!(progression.skill_level(SkillId::from_u8(0)), 0);
    }

    #[test]
    fn flush_encodes_the_outbox_in_order() {
        let channel = ReplicationChannel::new(Role::Authoritative);
        let mut progression = player(Role::Authoritative);
        progression.add_xp(SkillId::from_u8(0), 0.25).unwrap();
        progression.queue_full_sync();

        let mut sink: Vec<Vec<u8>> = Vec::new();
        let pushed = channel.flush_outbound(&mut progression, &mut sink).unwrap();

        assert_eq!(pushed, 2);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0][0], 4); // attribute delta first, then the snapshot
        assert_eq!(sink[1][0], 1);
        assert_eq!(channel.flush_outbound(&mut progression, &mut sink).unwrap(), 0);
    }
}

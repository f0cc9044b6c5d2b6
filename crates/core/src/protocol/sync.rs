use std::io::Write;

use anyhow::bail;
use byteorder::{ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::skills::MAX_NUM_SKILLS;
use crate::SkillId;

use super::{Endian, Packet, PacketReadExt, PacketWriteExt};

/// Wire length of one base-skill record: id + level + xp.
pub(crate) const BASE_RECORD_LEN: usize = 6;

/// Wire length of one active-skill record: id + level + cooldown.
pub(crate) const ACTIVE_RECORD_LEN: usize = 6;

/// One base-skill entry of a full snapshot. Attributes carry their XP
/// counter; passive skills travel in the same list with `xp` always zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub id: SkillId,
    pub level: u8,
    pub xp: f32,
}

/// One active-skill entry of a full snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveRecord {
    pub id: SkillId,
    pub level: u8,
    pub cooldown_remaining_ticks: u32,
}

/// Complete replication image of one player's progression, pushed by the
/// authoritative side on join/rejoin. The identical layout doubles as the
/// persistent snapshot body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncFullState {
    pub base: Vec<AttributeRecord>,
    pub active: Vec<ActiveRecord>,
    pub skill_points: u8,
}

impl SyncFullState {
    /// Reads the snapshot body from the front of `payload`, leaving any
    /// remaining bytes in place. Used by both the packet decoder and the
    /// persistent-record loader, which appends trailing fields.
    pub fn read_from(payload: &mut &[u8]) -> anyhow::Result<SyncFullState> {
        let base_count = payload.read_u32::<Endian>()? as usize;
        if base_count > MAX_NUM_SKILLS {
            bail!("snapshot base count {base_count} exceeds registry capacity");
        }
        let mut base = Vec::with_capacity(base_count);
        for _ in 0..base_count {
            base.push(AttributeRecord {
                id: payload.read_skill_id()?,
                level: payload.read_u8()?,
                xp: payload.read_f32::<Endian>()?,
            });
        }

        let active_count = payload.read_u32::<Endian>()? as usize;
        if active_count > MAX_NUM_SKILLS {
            bail!("snapshot active count {active_count} exceeds registry capacity");
        }
        let mut active = Vec::with_capacity(active_count);
        for _ in 0..active_count {
            active.push(ActiveRecord {
                id: payload.read_skill_id()?,
                level: payload.read_u8()?,
                cooldown_remaining_ticks: payload.read_u32::<Endian>()?,
            });
        }

        let skill_points = payload.read_u8()?;
        Ok(SyncFullState { base, active, skill_points })
    }

    /// Writes the snapshot body. Inverse of [`SyncFullState::read_from`].
    pub fn write_to(&self, writer: &mut impl Write) -> anyhow::Result<()> {
        writer.write_u32::<Endian>(self.base.len() as u32)?;
        for record in self.base.iter() {
            writer.write_skill_id(record.id)?;
            writer.write_u8(record.level)?;
            writer.write_f32::<Endian>(record.xp)?;
        }

        writer.write_u32::<Endian>(self.active.len() as u32)?;
        for record in self.active.iter() {
            writer.write_skill_id(record.id)?;
            writer.write_u8(record.level)?;
            writer.write_u32::<Endian>(record.cooldown_remaining_ticks)?;
        }

        writer.write_u8(self.skill_points)?;
        Ok(())
    }
}

impl Packet for SyncFullState {
    const KIND: u8 = 1;

    fn fixed_length() -> Option<usize> { None }

    fn decode(mut payload: &[u8]) -> anyhow::Result<Self> {
        let state = SyncFullState::read_from(&mut payload)?;
        payload.expect_consumed()?;
        Ok(state)
    }

    fn encode(&self, writer: &mut impl Write) -> anyhow::Result<()> {
        self.write_to(writer)
    }
}

/// Observer asking the authoritative side to open a server-owned UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOpenUi {
    pub gui_id: i32,
}

impl Packet for RequestOpenUi {
    const KIND: u8 = 2;

    fn fixed_length() -> Option<usize> { Some(4) }

    fn decode(mut payload: &[u8]) -> anyhow::Result<Self> {
        let gui_id = payload.read_i32::<Endian>()?;
        payload.expect_consumed()?;
        Ok(RequestOpenUi { gui_id })
    }

    fn encode(&self, writer: &mut impl Write) -> anyhow::Result<()> {
        writer.write_i32::<Endian>(self.gui_id)?;
        Ok(())
    }
}

/// Coalesced XP flushed upstream by the observer's send buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestAddXp {
    pub amount: f32,
    pub attribute_id: SkillId,
}

impl Packet for RequestAddXp {
    const KIND: u8 = 3;

    fn fixed_length() -> Option<usize> { Some(5) }

    fn decode(mut payload: &[u8]) -> anyhow::Result<Self> {
        let amount = payload.read_f32::<Endian>()?;
        let attribute_id = payload.read_skill_id()?;
        payload.expect_consumed()?;
        Ok(RequestAddXp { amount, attribute_id })
    }

    fn encode(&self, writer: &mut impl Write) -> anyhow::Result<()> {
        writer.write_f32::<Endian>(self.amount)?;
        writer.write_skill_id(self.attribute_id)?;
        Ok(())
    }
}

/// Cheap single-attribute push after an authoritative XP mutation, instead
/// of a full snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PushAttributeDelta {
    pub id: SkillId,
    pub level: u8,
    pub xp: f32,
}

impl Packet for PushAttributeDelta {
    const KIND: u8 = 4;

    fn fixed_length() -> Option<usize> { Some(6) }

    fn decode(mut payload: &[u8]) -> anyhow::Result<Self> {
        let id = payload.read_skill_id()?;
        let level = payload.read_u8()?;
        let xp = payload.read_f32::<Endian>()?;
        payload.expect_consumed()?;
        Ok(PushAttributeDelta { id, level, xp })
    }

    fn encode(&self, writer: &mut impl Write) -> anyhow::Result<()> {
        writer.write_skill_id(self.id)?;
        writer.write_u8(self.level)?;
        writer.write_f32::<Endian>(self.xp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::AnyMessage;

    use super::*;

    fn round_trip(message: AnyMessage) -> AnyMessage {
        let mut frame = Vec::new();
        message.encode_frame(&mut frame).unwrap();
        AnyMessage::decode_frame(&frame).unwrap().unwrap()
    }

    #[test]
    fn snapshot_round_trips() {
        let snapshot = SyncFullState {
            base: vec![
                AttributeRecord { id: SkillId::from_u8(0), level: 3, xp: 2.5 },
                AttributeRecord { id: SkillId::from_u8(4), level: 1, xp: 0.0 },
            ],
            active: vec![ActiveRecord {
                id: SkillId::from_u8(5),
                level: 2,
                cooldown_remaining_ticks: 120,
            }],
            skill_points: 7,
        };
        assert_eq!(round_trip(snapshot.clone().into()), snapshot.into());
    }

    #[test]
    fn snapshot_byte_layout_is_stable() {
        let snapshot = SyncFullState {
            base: vec![AttributeRecord { id: SkillId::from_u8(0), level: 1, xp: 1.0 }],
            active: Vec::new(),
            skill_points: 3,
        };
        let mut frame = Vec::new();
        AnyMessage::from(snapshot).encode_frame(&mut frame).unwrap();
        assert_eq!(
            frame,
            [
                1, // tag
                0, 0, 0, 1, // base count
                0, 1, 0x3f, 0x80, 0, 0, // id, level, xp = 1.0f32
                0, 0, 0, 0, // active count
                3, // skill points
            ]
        );
    }

    #[test]
    fn fixed_messages_round_trip() {
        let open = RequestOpenUi { gui_id: -7 };
        assert_eq!(round_trip(open.into()), open.into());

        let add_xp = RequestAddXp { amount: 0.012, attribute_id: SkillId::from_u8(1) };
        assert_eq!(round_trip(add_xp.into()), add_xp.into());

        let delta = PushAttributeDelta { id: SkillId::from_u8(2), level: 4, xp: 3.25 };
        assert_eq!(round_trip(delta.into()), delta.into());
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut frame = Vec::new();
        AnyMessage::from(PushAttributeDelta { id: SkillId::from_u8(2), level: 4, xp: 3.25 })
            .encode_frame(&mut frame)
            .unwrap();
        frame.truncate(frame.len() - 1);
        assert!(AnyMessage::decode_frame(&frame).is_err());
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let mut frame = Vec::new();
        AnyMessage::from(RequestOpenUi { gui_id: 1 }).encode_frame(&mut frame).unwrap();
        frame.push(0xff);
        assert!(AnyMessage::decode_frame(&frame).is_err());
    }

    #[test]
    fn oversized_snapshot_count_is_rejected() {
        // A count beyond the registry capacity can only come from a
        // mismatched peer; refuse before allocating.
        let frame = [1u8, 0xff, 0xff, 0xff, 0xff];
        assert!(AnyMessage::decode_frame(&frame).is_err());
    }
}

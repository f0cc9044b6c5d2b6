use serde::{Deserialize, Serialize};
use strum_macros::{EnumIter, FromRepr};

pub mod protocol;
pub mod skills;

/// Simulation steps per second on both the authoritative and observer loops.
pub const TICKS_PER_SECOND: u32 = 20;

/// Key into the process-wide skill registry. Small on purpose: ids are
/// carried in every replication message and every stored record.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SkillId(u8);

impl SkillId {
    pub const fn from_u8(value: u8) -> SkillId {
        Self(value)
    }

    pub fn as_u8(&self) -> u8 { self.0 }

    /// True if this id sits in the reserved range owned by the four base
    /// attributes.
    pub fn is_attribute(&self) -> bool {
        (self.0 as usize) < skills::NUM_ATTRIBUTES
    }
}

/// The four base attribute trees. Every skill belongs to exactly one.
///
/// The discriminants double as the reserved skill ids for the attribute
/// skills themselves.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, FromRepr, Serialize, Deserialize)]
pub enum AttributeGroup {
    Strength = 0,
    Agility = 1,
    Intelligence = 2,
    Charisma = 3,
}

impl AttributeGroup {
    pub fn from_u8(value: u8) -> Option<AttributeGroup> {
        Self::from_repr(value)
    }

    /// Iterates the groups in id order.
    pub fn iter() -> AttributeGroupIter {
        <AttributeGroup as strum::IntoEnumIterator>::iter()
    }

    /// The reserved skill id of this attribute's own skill entry.
    pub fn id(&self) -> SkillId {
        SkillId::from_u8(*self as u8)
    }
}

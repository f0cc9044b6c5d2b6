use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::{AttributeGroup, SkillId, TICKS_PER_SECOND};

pub use state::{SkillProgress, SkillState};

mod state;

/// Number of base attributes; their skill ids occupy `0..NUM_ATTRIBUTES`.
pub const NUM_ATTRIBUTES: usize = 4;

/// Default level cap for passive and active skills.
pub const MAX_LEVEL: u8 = 5;

/// Level cap for the base attributes themselves.
pub const MAX_ATTRIBUTE_LEVEL: u8 = 30;

/// Character level past which attribute level-ups stop awarding skill points.
pub const MAX_SKILL_POINTS: u8 = 100;

/// Capacity of the registry table. Ids at or above this value are invalid.
pub const MAX_NUM_SKILLS: usize = 64;

/// XP an attribute must accumulate to go from `level` to `level + 1`.
pub fn xp_to_next(level: u8) -> f32 {
    let level = level as f32;
    level * level + 1.0
}

bitflags! {
    /// Behaviour flags for active skills.
    #[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
    pub struct ActiveFlags: u8 {
        /// Activating this skill arms the player-wide cooldown, blocking
        /// every other active skill until it drains.
        const GLOBAL_COOLDOWN = 0x1;
    }
}

/// Static parameters of an active skill.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ActiveParams {
    pub cooldown_ticks: u32,
    pub duration_ticks: u32,
    pub flags: ActiveFlags,
}

/// Closed set of skill variants. The variant decides the shape of the
/// per-player mutable state and the progression rule.
#[derive(Debug, Clone, PartialEq)]
pub enum SkillKind {
    /// A base stat levelled by accumulated XP.
    Attribute,
    /// Levelled by reaching an attribute-level gate, no activation.
    Passive,
    /// Explicitly activated, with a cooldown and optional effect duration.
    Active(ActiveParams),
}

/// Player-visible stats a skill may modify as a level-up side effect.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Stat {
    MaxHealth,
    AttackDamage,
    MovementSpeed,
}

/// A flat per-level bonus applied to a stat whenever the owning skill
/// levels up. Application is idempotent: re-granting replaces the previous
/// bonus from the same skill, it never stacks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatModifier {
    pub stat: Stat,
    pub per_level: f32,
}

/// A skill that must be known at a minimum level before another skill can
/// be learned.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Prerequisite {
    pub skill: SkillId,
    pub level: u8,
}

/// Immutable description of one skill. Created during startup registration
/// and never mutated or destroyed afterwards; all per-player state lives in
/// [`SkillState`].
#[derive(Debug, Clone, PartialEq)]
pub struct SkillDefinition {
    pub id: SkillId,
    pub name: &'static str,
    pub description: &'static str,
    pub group: AttributeGroup,
    pub tier: u8,
    pub max_level: u8,
    pub kind: SkillKind,
    pub prerequisites: SmallVec<[Prerequisite; 4]>,
    pub modifier: Option<StatModifier>,
}

impl SkillDefinition {
    /// A base attribute. Its id is the group's reserved id.
    pub fn attribute(group: AttributeGroup, name: &'static str) -> SkillDefinition {
        SkillDefinition {
            id: group.id(),
            name,
            description: "",
            group,
            tier: 0,
            max_level: MAX_ATTRIBUTE_LEVEL,
            kind: SkillKind::Attribute,
            prerequisites: SmallVec::new(),
            modifier: None,
        }
    }

    pub fn passive(id: SkillId, name: &'static str, group: AttributeGroup, tier: u8) -> SkillDefinition {
        SkillDefinition {
            id,
            name,
            description: "",
            group,
            tier,
            max_level: MAX_LEVEL,
            kind: SkillKind::Passive,
            prerequisites: SmallVec::new(),
            modifier: None,
        }
    }

    /// An active skill. `cooldown_secs` and `duration_secs` are wall-clock
    /// seconds, converted to ticks here so everything downstream counts in
    /// ticks only.
    pub fn active(
        id: SkillId, name: &'static str, group: AttributeGroup, tier: u8, cooldown_secs: u32,
        duration_secs: u32,
    ) -> SkillDefinition {
        SkillDefinition {
            id,
            name,
            description: "",
            group,
            tier,
            max_level: MAX_LEVEL,
            kind: SkillKind::Active(ActiveParams {
                cooldown_ticks: cooldown_secs * TICKS_PER_SECOND,
                duration_ticks: duration_secs * TICKS_PER_SECOND,
                flags: ActiveFlags::empty(),
            }),
            prerequisites: SmallVec::new(),
            modifier: None,
        }
    }

    pub fn with_description(mut self, description: &'static str) -> SkillDefinition {
        self.description = description;
        self
    }

    pub fn with_prerequisite(mut self, skill: SkillId, level: u8) -> SkillDefinition {
        self.prerequisites.push(Prerequisite { skill, level });
        self
    }

    pub fn with_modifier(mut self, stat: Stat, per_level: f32) -> SkillDefinition {
        self.modifier = Some(StatModifier { stat, per_level });
        self
    }

    pub fn with_global_cooldown(mut self) -> SkillDefinition {
        if let SkillKind::Active(params) = &mut self.kind {
            params.flags |= ActiveFlags::GLOBAL_COOLDOWN;
        }
        self
    }

    pub fn is_active(&self) -> bool {
        matches!(self.kind, SkillKind::Active(_))
    }

    pub fn active_params(&self) -> Option<&ActiveParams> {
        match &self.kind {
            SkillKind::Active(params) => Some(params),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum RegistryError {
    #[error("skill id {0:?} is already registered")]
    DuplicateId(SkillId),
    #[error("skill id {0:?} is outside the registry range")]
    IdOutOfRange(SkillId),
    #[error("id {0:?} conflicts with the reserved attribute range")]
    ReservedId(SkillId),
}

/// Process-wide table of skill definitions, keyed by [`SkillId`].
///
/// Built once during startup and injected into everything that needs
/// lookups; registration is rejected rather than overwritten, and there is
/// no de-registration. A lookup miss on an id received from the network or
/// storage is a decode error on the caller's side, never a panic here.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: Vec<Option<SkillDefinition>>,
}

impl SkillRegistry {
    pub fn new() -> SkillRegistry {
        SkillRegistry {
            skills: (0..MAX_NUM_SKILLS).map(|_| None).collect(),
        }
    }

    pub fn register(&mut self, definition: SkillDefinition) -> Result<(), RegistryError> {
        let index = definition.id.as_u8() as usize;
        if index >= MAX_NUM_SKILLS {
            return Err(RegistryError::IdOutOfRange(definition.id));
        }

        // Attributes own the low id range; nothing else may sit there.
        match definition.kind {
            SkillKind::Attribute if definition.id != definition.group.id() => {
                return Err(RegistryError::ReservedId(definition.id));
            }
            SkillKind::Passive | SkillKind::Active(_) if definition.id.is_attribute() => {
                return Err(RegistryError::ReservedId(definition.id));
            }
            _ => {}
        }

        if self.skills[index].is_some() {
            return Err(RegistryError::DuplicateId(definition.id));
        }

        self.skills[index] = Some(definition);
        Ok(())
    }

    pub fn get(&self, id: SkillId) -> Option<&SkillDefinition> {
        self.skills.get(id.as_u8() as usize)?.as_ref()
    }

    pub fn attribute(&self, group: AttributeGroup) -> Option<&SkillDefinition> {
        self.get(group.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SkillDefinition> {
        self.skills.iter().filter_map(|slot| slot.as_ref())
    }
}

pub mod builtin {
    //! The stock skill table: the four attributes plus the first passive
    //! and active skills built on top of them.

    use crate::{AttributeGroup, SkillId};

    use super::{SkillDefinition, SkillRegistry, Stat};

    pub const IRON_FLESH: SkillId = SkillId::from_u8(4);
    pub const FIRE_BLAST: SkillId = SkillId::from_u8(5);

    fn attribute_name(group: AttributeGroup) -> &'static str {
        match group {
            AttributeGroup::Strength => "Strength",
            AttributeGroup::Agility => "Agility",
            AttributeGroup::Intelligence => "Intelligence",
            AttributeGroup::Charisma => "Charisma",
        }
    }

    /// Builds a registry containing the stock table. The table is
    /// collision-free by construction, so registration cannot fail.
    pub fn registry() -> SkillRegistry {
        let mut registry = SkillRegistry::new();

        for group in AttributeGroup::iter() {
            registry
                .register(SkillDefinition::attribute(group, attribute_name(group)))
                .expect("attribute ids are reserved");
        }

        registry
            .register(
                SkillDefinition::passive(IRON_FLESH, "Iron Flesh", AttributeGroup::Strength, 1)
                    .with_description("Adds one heart per skill level")
                    .with_modifier(Stat::MaxHealth, 2.0),
            )
            .expect("builtin table is collision-free");

        registry
            .register(
                SkillDefinition::active(FIRE_BLAST, "Fire Blast", AttributeGroup::Intelligence, 1, 15, 0)
                    .with_description("Blast enemies with fire")
                    .with_global_cooldown()
                    .with_prerequisite(IRON_FLESH, 1),
            )
            .expect("builtin table is collision-free");

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xp_thresholds_are_quadratic() {
        assert_eq!(xp_to_next(0), 1.0);
        assert_eq!(xp_to_next(1), 2.0);
        assert_eq!(xp_to_next(5), 26.0);
        assert_eq!(xp_to_next(29), 842.0);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = SkillRegistry::new();
        let skill = SkillDefinition::passive(SkillId::from_u8(10), "Dodge", AttributeGroup::Agility, 1);
        registry.register(skill.clone()).unwrap();
        assert_eq!(
            registry.register(skill),
            Err(RegistryError::DuplicateId(SkillId::from_u8(10)))
        );
    }

    #[test]
    fn non_attributes_cannot_claim_the_reserved_range() {
        let mut registry = SkillRegistry::new();
        let skill = SkillDefinition::passive(SkillId::from_u8(2), "Dodge", AttributeGroup::Agility, 1);
        assert_eq!(
            registry.register(skill),
            Err(RegistryError::ReservedId(SkillId::from_u8(2)))
        );
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let mut registry = SkillRegistry::new();
        let skill = SkillDefinition::passive(SkillId::from_u8(64), "Dodge", AttributeGroup::Agility, 1);
        assert_eq!(
            registry.register(skill),
            Err(RegistryError::IdOutOfRange(SkillId::from_u8(64)))
        );
    }

    #[test]
    fn builtin_table_wires_prerequisites() {
        let registry = builtin::registry();
        let fire_blast = registry.get(builtin::FIRE_BLAST).unwrap();
        assert_eq!(
            fire_blast.prerequisites.as_slice(),
            &[Prerequisite { skill: builtin::IRON_FLESH, level: 1 }]
        );
        let params = fire_blast.active_params().unwrap();
        assert_eq!(params.cooldown_ticks, 300);
        assert!(params.flags.contains(ActiveFlags::GLOBAL_COOLDOWN));
    }
}

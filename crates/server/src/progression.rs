use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use skillwire::protocol::{
    ActiveRecord, AnyMessage, AttributeRecord, PushAttributeDelta, RequestAddXp, SyncFullState,
};
use skillwire::skills::{
    xp_to_next, ActiveFlags, SkillDefinition, SkillKind, SkillRegistry, SkillState,
    MAX_SKILL_POINTS, NUM_ATTRIBUTES,
};
use skillwire::{AttributeGroup, SkillId};

use crate::buffer::XpSendBuffer;
use crate::modifiers::StatModifiers;

/// Which side of the replication channel this instance is. The
/// authoritative copy is canonical; observers reconcile to it and only
/// ever push requests upstream.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Authoritative,
    Observer,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum ProgressionError {
    /// A wire or storage record referenced an id the registry has never
    /// heard of: a protocol or data mismatch, not a gameplay outcome.
    #[error("skill id {0:?} is not present in the registry")]
    UnknownSkillId(SkillId),
    #[error("id {0:?} is not a base attribute")]
    InvalidAttributeIndex(SkillId),
    #[error("record for {0:?} does not match the definition's kind")]
    KindMismatch(SkillId),
    #[error("level {level} for {skill:?} exceeds the definition cap")]
    LevelExceedsMax { skill: SkillId, level: u8 },
    #[error("registry is missing the {0:?} attribute")]
    MissingAttribute(AttributeGroup),
}

/// Why an activation attempt was turned down. Expected and frequent, so a
/// reason code rather than an error path for the caller to fear.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum ActivationRefused {
    #[error("skill {0:?} is not learned or not activatable")]
    NotLearned(SkillId),
    #[error("cooling down for another {remaining} ticks")]
    Cooling { remaining: u32 },
    #[error("global cooldown in effect for another {remaining} ticks")]
    GlobalCooldown { remaining: u32 },
}

/// The full progression record of one player: attribute, passive and
/// active skill state, the derived character level and point pool, and the
/// player-wide cooldown.
///
/// Exclusively owned by one logical side; all methods are synchronous and
/// complete within a tick. Outbound replication messages accumulate in an
/// internal outbox drained by the channel, which keeps every rule in here
/// testable without a transport.
#[derive(Debug)]
pub struct PlayerProgression {
    registry: Arc<SkillRegistry>,
    role: Role,
    /// Attribute and passive skill state. The four attributes are always
    /// present; passives appear once granted.
    base_skills: HashMap<SkillId, SkillState>,
    /// Active skill state, present once granted.
    active_skills: HashMap<SkillId, SkillState>,
    total_character_level: u8,
    skill_points: u8,
    global_cooldown_remaining: u32,
    modifiers: StatModifiers,
    /// Observer side only; never persisted.
    xp_send_buffer: Option<XpSendBuffer>,
    outbox: VecDeque<AnyMessage>,
}

impl PlayerProgression {
    pub fn new(registry: Arc<SkillRegistry>, role: Role) -> Result<PlayerProgression, ProgressionError> {
        let mut base_skills = HashMap::with_capacity(NUM_ATTRIBUTES);
        for group in AttributeGroup::iter() {
            let definition = registry
                .attribute(group)
                .ok_or(ProgressionError::MissingAttribute(group))?;
            base_skills.insert(definition.id, SkillState::new(definition));
        }

        let xp_send_buffer = match role {
            Role::Observer => Some(XpSendBuffer::new()),
            Role::Authoritative => None,
        };

        Ok(PlayerProgression {
            registry,
            role,
            base_skills,
            active_skills: HashMap::new(),
            total_character_level: 0,
            skill_points: 0,
            global_cooldown_remaining: 0,
            modifiers: StatModifiers::new(),
            xp_send_buffer,
            outbox: VecDeque::new(),
        })
    }

    pub fn role(&self) -> Role { self.role }

    pub fn registry(&self) -> &SkillRegistry { &self.registry }

    /// Sum of the base attribute levels.
    pub fn total_character_level(&self) -> u8 { self.total_character_level }

    pub fn skill_points(&self) -> u8 { self.skill_points }

    pub fn global_cooldown_remaining(&self) -> u32 { self.global_cooldown_remaining }

    pub fn set_global_cooldown(&mut self, ticks: u32) {
        self.global_cooldown_remaining = ticks;
    }

    pub fn modifiers(&self) -> &StatModifiers { &self.modifiers }

    /// Current level in any skill; 0 when unknown or not yet granted.
    pub fn skill_level(&self, id: SkillId) -> u8 {
        self.base_skills
            .get(&id)
            .or_else(|| self.active_skills.get(&id))
            .map_or(0, |state| state.level)
    }

    pub fn has_skill(&self, id: SkillId) -> bool {
        self.base_skills.contains_key(&id) || self.active_skills.contains_key(&id)
    }

    /// Accumulated XP in one attribute.
    pub fn attribute_xp(&self, group: AttributeGroup) -> f32 {
        self.base_skills.get(&group.id()).map_or(0.0, |state| state.xp())
    }

    /// XP pooled in the observer-side send buffer, if any.
    pub fn buffered_xp(&self, group: AttributeGroup) -> f32 {
        self.xp_send_buffer.as_ref().map_or(0.0, |buffer| buffer.pending(group))
    }

    /// Raises `id` towards `target_level`, one level per call. Returns
    /// true iff the level strictly increased.
    ///
    /// Each call resolves at most one level even when enough XP has pooled
    /// for several; callers loop if they want to drain a large award.
    pub fn grant_skill(&mut self, id: SkillId, target_level: u8) -> bool {
        let Some(definition) = self.registry.get(id).cloned() else {
            warn!("attempted to grant unregistered skill {id:?}");
            return false;
        };

        let current = self.skill_level(id);
        if target_level <= current || current >= definition.max_level {
            return false;
        }

        match definition.kind {
            SkillKind::Attribute => self.level_up_attribute(&definition),
            SkillKind::Passive => self.level_up_passive(&definition, target_level),
            SkillKind::Active(_) => self.level_up_active(&definition, target_level),
        }
    }

    fn level_up_attribute(&mut self, definition: &SkillDefinition) -> bool {
        let Some(state) = self.base_skills.get_mut(&definition.id) else {
            return false;
        };
        let threshold = xp_to_next(state.level);
        if state.xp() < threshold {
            return false;
        }

        state.level += 1;
        // Consume exactly one threshold; leftover XP stays for the next
        // grant and can never end up negative.
        state.add_xp(-threshold);
        true
    }

    fn level_up_passive(&mut self, definition: &SkillDefinition, target_level: u8) -> bool {
        if target_level > definition.max_level {
            return false;
        }
        let gate = definition.tier.saturating_sub(1) * 5;
        if self.skill_level(definition.group.id()) < gate {
            debug!(
                "passive {} requires {:?} level {gate}",
                definition.name, definition.group
            );
            return false;
        }

        let state = self
            .base_skills
            .entry(definition.id)
            .or_insert_with(|| SkillState::new(definition));
        state.level += 1;
        let level = state.level;
        self.apply_level_modifier(definition, level);
        self.queue_full_sync_if_authoritative();
        true
    }

    fn level_up_active(&mut self, definition: &SkillDefinition, target_level: u8) -> bool {
        let current = self.skill_level(definition.id);
        if target_level != current + 1 || target_level > definition.max_level {
            return false;
        }
        if let Some(unmet) = definition
            .prerequisites
            .iter()
            .find(|prerequisite| self.skill_level(prerequisite.skill) < prerequisite.level)
        {
            debug!(
                "{} requires {:?} at level {} first",
                definition.name, unmet.skill, unmet.level
            );
            return false;
        }

        let state = self
            .active_skills
            .entry(definition.id)
            .or_insert_with(|| SkillState::new(definition));
        state.level += 1;
        let level = state.level;
        self.apply_level_modifier(definition, level);
        self.queue_full_sync_if_authoritative();
        true
    }

    /// Applies the definition's stat bonus for the new level, replacing
    /// whatever bonus the same skill applied before.
    fn apply_level_modifier(&mut self, definition: &SkillDefinition, level: u8) {
        if let Some(modifier) = definition.modifier {
            self.modifiers
                .apply(definition.id, modifier.stat, modifier.per_level * level as f32);
        }
    }

    /// Awards XP to one attribute.
    ///
    /// On the authoritative side this mutates the attribute, resolves at
    /// most one level-up, and always queues a single-attribute delta for
    /// the observer. On the observer side the amount pools in the send
    /// buffer and flushes upstream once it crosses the threshold; nothing
    /// is granted locally.
    pub fn add_xp(&mut self, attribute_id: SkillId, amount: f32) -> Result<(), ProgressionError> {
        let group = AttributeGroup::from_u8(attribute_id.as_u8())
            .ok_or(ProgressionError::InvalidAttributeIndex(attribute_id))?;

        match self.role {
            Role::Observer => {
                if let Some(buffer) = self.xp_send_buffer.as_mut() {
                    if let Some(flushed) = buffer.accumulate(group, amount) {
                        self.outbox.push_back(
                            RequestAddXp { amount: flushed, attribute_id }.into(),
                        );
                    }
                }
            }
            Role::Authoritative => {
                if let Some(state) = self.base_skills.get_mut(&attribute_id) {
                    state.add_xp(amount);
                }
                let current = self.skill_level(attribute_id);
                if self.grant_skill(attribute_id, current + 1) {
                    self.total_character_level += 1;
                    if self.total_character_level <= MAX_SKILL_POINTS {
                        self.skill_points = self.skill_points.saturating_add(1);
                    }
                }
                if let Some(state) = self.base_skills.get(&attribute_id) {
                    self.outbox.push_back(
                        PushAttributeDelta {
                            id: attribute_id,
                            level: state.level,
                            xp: state.xp(),
                        }
                        .into(),
                    );
                }
            }
        }
        Ok(())
    }

    /// Takes one unallocated skill point. What the point buys is the
    /// caller's business.
    pub fn spend_skill_point(&mut self) -> bool {
        if self.skill_points > 0 {
            self.skill_points -= 1;
            true
        } else {
            false
        }
    }

    /// Attempts to use an active skill. On success the skill starts
    /// cooling for its cooldown minus four ticks per Intelligence level,
    /// and a global-cooldown skill locks the whole player for the same
    /// duration.
    pub fn activate_skill(&mut self, id: SkillId) -> Result<(), ActivationRefused> {
        if self.global_cooldown_remaining > 0 {
            return Err(ActivationRefused::GlobalCooldown {
                remaining: self.global_cooldown_remaining,
            });
        }

        let Some(params) = self
            .registry
            .get(id)
            .and_then(|definition| definition.active_params())
            .cloned()
        else {
            return Err(ActivationRefused::NotLearned(id));
        };

        let intelligence = self.skill_level(AttributeGroup::Intelligence.id());
        let Some(state) = self.active_skills.get_mut(&id).filter(|state| state.level >= 1) else {
            return Err(ActivationRefused::NotLearned(id));
        };
        if state.is_cooling() {
            return Err(ActivationRefused::Cooling { remaining: state.cooldown_remaining() });
        }

        let cooldown = params.cooldown_ticks.saturating_sub(4 * intelligence as u32);
        state.set_cooldown(cooldown);
        if params.flags.contains(ActiveFlags::GLOBAL_COOLDOWN) {
            self.global_cooldown_remaining = cooldown;
        }
        Ok(())
    }

    /// Advances this player by one simulation step. While the global
    /// cooldown is armed it counts down alone and every per-skill
    /// countdown is frozen; otherwise each active skill cools by one tick.
    pub fn on_tick(&mut self) {
        if self.global_cooldown_remaining > 0 {
            self.global_cooldown_remaining -= 1;
            return;
        }
        for state in self.active_skills.values_mut() {
            state.decrement_cooldown();
        }
    }

    /// Builds the full replication image, records sorted by id so the
    /// encoded bytes are deterministic.
    pub fn snapshot(&self) -> SyncFullState {
        let mut base: Vec<AttributeRecord> = self
            .base_skills
            .values()
            .map(|state| AttributeRecord {
                id: state.definition_id,
                level: state.level,
                xp: state.xp(),
            })
            .collect();
        base.sort_by_key(|record| record.id);

        let mut active: Vec<ActiveRecord> = self
            .active_skills
            .values()
            .map(|state| ActiveRecord {
                id: state.definition_id,
                level: state.level,
                cooldown_remaining_ticks: state.cooldown_remaining(),
            })
            .collect();
        active.sort_by_key(|record| record.id);

        SyncFullState { base, active, skill_points: self.skill_points }
    }

    /// Replaces this player's skill state with the snapshot's. Every
    /// record is validated against the registry before anything is
    /// touched, so a mismatched peer cannot leave the record half-applied.
    /// The character level is recomputed from the attribute levels rather
    /// than trusted.
    pub fn apply_snapshot(&mut self, snapshot: &SyncFullState) -> Result<(), ProgressionError> {
        let mut base = HashMap::with_capacity(snapshot.base.len().max(NUM_ATTRIBUTES));
        for group in AttributeGroup::iter() {
            let definition = self
                .registry
                .attribute(group)
                .ok_or(ProgressionError::MissingAttribute(group))?;
            base.insert(definition.id, SkillState::new(definition));
        }

        for record in snapshot.base.iter() {
            let definition = self
                .registry
                .get(record.id)
                .ok_or(ProgressionError::UnknownSkillId(record.id))?;
            if record.level > definition.max_level {
                return Err(ProgressionError::LevelExceedsMax {
                    skill: record.id,
                    level: record.level,
                });
            }
            let mut state = SkillState::new(definition);
            state.level = record.level;
            match definition.kind {
                SkillKind::Attribute => state.add_xp(record.xp),
                // Passives carry no XP; the wire field is always zero.
                SkillKind::Passive => {}
                SkillKind::Active(_) => return Err(ProgressionError::KindMismatch(record.id)),
            }
            base.insert(record.id, state);
        }

        let mut active = HashMap::with_capacity(snapshot.active.len());
        for record in snapshot.active.iter() {
            let definition = self
                .registry
                .get(record.id)
                .ok_or(ProgressionError::UnknownSkillId(record.id))?;
            if !definition.is_active() {
                return Err(ProgressionError::KindMismatch(record.id));
            }
            if record.level > definition.max_level {
                return Err(ProgressionError::LevelExceedsMax {
                    skill: record.id,
                    level: record.level,
                });
            }
            let mut state = SkillState::new(definition);
            state.level = record.level;
            state.set_cooldown(record.cooldown_remaining_ticks);
            active.insert(record.id, state);
        }

        self.base_skills = base;
        self.active_skills = active;
        self.skill_points = snapshot.skill_points;
        self.recompute_character_level();
        self.reapply_modifiers();
        Ok(())
    }

    /// Overwrites one attribute's state from a delta, leaving every other
    /// skill untouched. The derived character level is recomputed since an
    /// attribute level may have changed.
    pub fn apply_attribute_delta(&mut self, delta: &PushAttributeDelta) -> Result<(), ProgressionError> {
        if !delta.id.is_attribute() {
            return Err(ProgressionError::InvalidAttributeIndex(delta.id));
        }
        let definition = self
            .registry
            .get(delta.id)
            .ok_or(ProgressionError::UnknownSkillId(delta.id))?;
        if delta.level > definition.max_level {
            return Err(ProgressionError::LevelExceedsMax {
                skill: delta.id,
                level: delta.level,
            });
        }

        let mut state = SkillState::new(definition);
        state.level = delta.level;
        state.add_xp(delta.xp);
        self.base_skills.insert(delta.id, state);
        self.recompute_character_level();
        Ok(())
    }

    /// Queues a full snapshot push, e.g. the reconciliation sync on player
    /// join or rejoin.
    pub fn queue_full_sync(&mut self) {
        let snapshot = self.snapshot();
        self.outbox.push_back(snapshot.into());
    }

    fn queue_full_sync_if_authoritative(&mut self) {
        if self.role == Role::Authoritative {
            self.queue_full_sync();
        }
    }

    /// Drains the queued outbound replication messages, oldest first.
    pub fn drain_outbound(&mut self) -> impl Iterator<Item = AnyMessage> + '_ {
        self.outbox.drain(..)
    }

    fn recompute_character_level(&mut self) {
        // Validated attribute levels cap the sum at 4 × 30, but sum wide
        // anyway so a bad record can never overflow here.
        let total: u32 = self
            .base_skills
            .values()
            .filter(|state| state.definition_id.is_attribute())
            .map(|state| state.level as u32)
            .sum();
        self.total_character_level = total.min(u8::MAX as u32) as u8;
    }

    fn reapply_modifiers(&mut self) {
        self.modifiers = StatModifiers::new();
        let granted: Vec<(SkillId, u8)> = self
            .base_skills
            .values()
            .chain(self.active_skills.values())
            .filter(|state| state.level > 0)
            .map(|state| (state.definition_id, state.level))
            .collect();
        for (id, level) in granted {
            if let Some(definition) = self.registry.get(id).cloned() {
                self.apply_level_modifier(&definition, level);
            }
        }
    }
}

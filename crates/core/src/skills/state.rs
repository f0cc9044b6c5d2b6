use crate::SkillId;

use super::{xp_to_next, SkillDefinition, SkillKind};

/// Variant-specific mutable fields of one skill instance. The shape is
/// decided by the definition's static kind, never by inspecting the state
/// at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum SkillProgress {
    Attribute { xp: f32 },
    Passive,
    Active { cooldown_remaining_ticks: u32 },
}

/// Mutable runtime state for one skill held by one player. Exclusively
/// owned by that player's progression record; the definition it references
/// outlives it.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillState {
    pub definition_id: SkillId,
    pub level: u8,
    pub progress: SkillProgress,
}

impl SkillState {
    /// Fresh level-0 state with the progress shape matching the definition.
    pub fn new(definition: &SkillDefinition) -> SkillState {
        let progress = match definition.kind {
            SkillKind::Attribute => SkillProgress::Attribute { xp: 0.0 },
            SkillKind::Passive => SkillProgress::Passive,
            SkillKind::Active(_) => SkillProgress::Active { cooldown_remaining_ticks: 0 },
        };
        SkillState {
            definition_id: definition.id,
            level: 0,
            progress,
        }
    }

    /// Current XP; zero for variants that do not accumulate any.
    pub fn xp(&self) -> f32 {
        match &self.progress {
            SkillProgress::Attribute { xp } => *xp,
            _ => 0.0,
        }
    }

    /// XP required to reach the next level from the current one.
    pub fn xp_to_next(&self) -> f32 {
        xp_to_next(self.level)
    }

    /// Adds to the XP counter, negative amounts included. Never drops below
    /// zero. No-op for variants without XP.
    pub fn add_xp(&mut self, amount: f32) {
        if let SkillProgress::Attribute { xp } = &mut self.progress {
            *xp = (*xp + amount).max(0.0);
        }
    }

    pub fn cooldown_remaining(&self) -> u32 {
        match &self.progress {
            SkillProgress::Active { cooldown_remaining_ticks } => *cooldown_remaining_ticks,
            _ => 0,
        }
    }

    pub fn set_cooldown(&mut self, ticks: u32) {
        if let SkillProgress::Active { cooldown_remaining_ticks } = &mut self.progress {
            *cooldown_remaining_ticks = ticks;
        }
    }

    pub fn is_cooling(&self) -> bool {
        self.cooldown_remaining() > 0
    }

    pub fn decrement_cooldown(&mut self) {
        if let SkillProgress::Active { cooldown_remaining_ticks } = &mut self.progress {
            *cooldown_remaining_ticks = cooldown_remaining_ticks.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::skills::builtin;

    use super::*;

    #[test]
    fn progress_shape_follows_definition_kind() {
        let registry = builtin::registry();
        let strength = SkillState::new(registry.get(SkillId::from_u8(0)).unwrap());
        assert_eq!(strength.progress, SkillProgress::Attribute { xp: 0.0 });

        let iron_flesh = SkillState::new(registry.get(builtin::IRON_FLESH).unwrap());
        assert_eq!(iron_flesh.progress, SkillProgress::Passive);

        let fire_blast = SkillState::new(registry.get(builtin::FIRE_BLAST).unwrap());
        assert_eq!(fire_blast.progress, SkillProgress::Active { cooldown_remaining_ticks: 0 });
    }

    #[test]
    fn xp_never_goes_negative() {
        let registry = builtin::registry();
        let mut state = SkillState::new(registry.get(SkillId::from_u8(0)).unwrap());
        state.add_xp(1.5);
        state.add_xp(-10.0);
        assert_eq!(state.xp(), 0.0);
    }
}

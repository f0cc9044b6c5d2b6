use std::collections::HashMap;

use skillwire::skills::Stat;
use skillwire::SkillId;

/// Aggregate of stat bonuses granted by levelled skills, keyed by the
/// granting skill. Re-applying for the same skill replaces the previous
/// bonus, so repeated level-ups never double-stack.
#[derive(Debug, Clone, Default)]
pub struct StatModifiers {
    by_source: HashMap<SkillId, (Stat, f32)>,
}

impl StatModifiers {
    pub fn new() -> StatModifiers {
        StatModifiers::default()
    }

    pub fn apply(&mut self, source: SkillId, stat: Stat, amount: f32) {
        self.by_source.insert(source, (stat, amount));
    }

    /// Total bonus currently applied to one stat.
    pub fn bonus(&self, stat: Stat) -> f32 {
        self.by_source
            .values()
            .filter(|(applied, _)| *applied == stat)
            .map(|(_, amount)| amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reapplying_replaces_instead_of_stacking() {
        let source = SkillId::from_u8(4);
        let mut modifiers = StatModifiers::new();
        modifiers.apply(source, Stat::MaxHealth, 2.0);
        modifiers.apply(source, Stat::MaxHealth, 4.0);
        assert_eq!(modifiers.bonus(Stat::MaxHealth), 4.0);
    }

    #[test]
    fn bonuses_sum_across_sources() {
        let mut modifiers = StatModifiers::new();
        modifiers.apply(SkillId::from_u8(4), Stat::MaxHealth, 2.0);
        modifiers.apply(SkillId::from_u8(9), Stat::MaxHealth, 1.0);
        modifiers.apply(SkillId::from_u8(10), Stat::AttackDamage, 3.0);
        assert_eq!(modifiers.bonus(Stat::MaxHealth), 3.0);
        assert_eq!(modifiers.bonus(Stat::AttackDamage), 3.0);
        assert_eq!(modifiers.bonus(Stat::MovementSpeed), 0.0);
    }
}

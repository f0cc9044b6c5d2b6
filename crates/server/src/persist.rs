//! Storage layout for a player's progression record.
//!
//! The stored bytes are the full-state snapshot body followed by the
//! remaining player-wide cooldown, keyed externally by player identity.
//! Reusing the replication image keeps storage and wire from drifting
//! apart; the cooldown rides along so relogging never clears it.

use std::sync::Arc;

use byteorder::{ReadBytesExt, WriteBytesExt};

use skillwire::protocol::{Endian, PacketReadExt, SyncFullState};
use skillwire::skills::SkillRegistry;

use crate::progression::{PlayerProgression, Role};

/// Serializes the progression record for storage.
pub fn save(progression: &PlayerProgression) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    progression.snapshot().write_to(&mut bytes)?;
    bytes.write_u32::<Endian>(progression.global_cooldown_remaining())?;
    Ok(bytes)
}

/// Rebuilds a progression record from stored bytes.
///
/// The character level is recomputed from the attribute levels rather than
/// read back, so a corrupt or hand-edited record cannot smuggle one in. A
/// stored id missing from the registry fails the whole load.
pub fn load(
    registry: Arc<SkillRegistry>, bytes: &[u8], role: Role,
) -> anyhow::Result<PlayerProgression> {
    let mut reader = bytes;
    let snapshot = SyncFullState::read_from(&mut reader)?;
    let global_cooldown = reader.read_u32::<Endian>()?;
    reader.expect_consumed()?;

    let mut progression = PlayerProgression::new(registry, role)?;
    progression.apply_snapshot(&snapshot)?;
    progression.set_global_cooldown(global_cooldown);
    Ok(progression)
}

#[cfg(test)]
mod tests {
    use skillwire::skills::builtin;
    use skillwire::SkillId;

    use super::*;

    #[test]
    fn save_and_load_preserve_the_record() {
        let registry = Arc::new(builtin::registry());
        let mut progression =
            PlayerProgression::new(registry.clone(), Role::Authoritative).unwrap();
        progression.add_xp(SkillId::from_u8(0), 2.5).unwrap();
        progression.grant_skill(builtin::IRON_FLESH, 1);
        progression.grant_skill(builtin::FIRE_BLAST, 1);
        progression.activate_skill(builtin::FIRE_BLAST).unwrap();

        let bytes = save(&progression).unwrap();
        let loaded = load(registry, &bytes, Role::Authoritative).unwrap();

        assert_eq!(loaded.snapshot(), progression.snapshot());
        assert_eq!(loaded.global_cooldown_remaining(), 300);
        assert_eq!(loaded.total_character_level(), 1);
    }

    #[test]
    fn character_level_is_recomputed_not_trusted() {
        let registry = Arc::new(builtin::registry());
        let mut progression =
            PlayerProgression::new(registry.clone(), Role::Authoritative).unwrap();
        progression.add_xp(SkillId::from_u8(0), 2.0).unwrap();
        progression.add_xp(SkillId::from_u8(2), 2.0).unwrap();

        let bytes = save(&progression).unwrap();
        let loaded = load(registry, &bytes, Role::Observer).unwrap();
        assert_eq!(loaded.total_character_level(), 2);
    }

    #[test]
    fn unknown_stored_id_fails_the_load() {
        let registry = Arc::new(builtin::registry());
        let progression = PlayerProgression::new(registry.clone(), Role::Authoritative).unwrap();

        let mut bytes = save(&progression).unwrap();
        // Corrupt the first base record's id.
        bytes[4] = 42;
        assert!(load(registry, &bytes, Role::Authoritative).is_err());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let registry = Arc::new(builtin::registry());
        let progression = PlayerProgression::new(registry.clone(), Role::Authoritative).unwrap();

        let mut bytes = save(&progression).unwrap();
        bytes.push(0xff);
        assert!(load(registry, &bytes, Role::Authoritative).is_err());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let registry = Arc::new(builtin::registry());
        let progression = PlayerProgression::new(registry.clone(), Role::Authoritative).unwrap();

        let mut bytes = save(&progression).unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(load(registry, &bytes, Role::Authoritative).is_err());
    }
}

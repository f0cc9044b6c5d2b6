use skillwire::skills::NUM_ATTRIBUTES;
use skillwire::AttributeGroup;

/// Buffered XP above this amount is flushed upstream as one request.
pub const XP_SEND_THRESHOLD: f32 = 0.01;

/// Observer-side accumulator for small XP awards.
///
/// Sustained actions grant tiny amounts every tick; sending each one would
/// flood the channel. Amounts pool per attribute and flush as a single
/// upstream request once a slot crosses [`XP_SEND_THRESHOLD`]. This is a
/// rate limiter, not a cache: nothing here is ever read back as state, and
/// the buffer is never persisted.
#[derive(Debug, Clone, Default)]
pub struct XpSendBuffer {
    slots: [f32; NUM_ATTRIBUTES],
}

impl XpSendBuffer {
    pub fn new() -> XpSendBuffer {
        XpSendBuffer::default()
    }

    /// Adds `amount` to the attribute's slot. Returns the pooled total and
    /// resets the slot when the threshold is crossed.
    pub fn accumulate(&mut self, group: AttributeGroup, amount: f32) -> Option<f32> {
        let slot = &mut self.slots[group as usize];
        *slot += amount;
        if *slot > XP_SEND_THRESHOLD {
            Some(std::mem::take(slot))
        } else {
            None
        }
    }

    /// Amount pooled but not yet flushed for one attribute.
    pub fn pending(&self, group: AttributeGroup) -> f32 {
        self.slots[group as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_awards_pool_until_the_threshold() {
        let mut buffer = XpSendBuffer::new();
        let mut flushes = Vec::new();
        for _ in 0..4 {
            if let Some(flushed) = buffer.accumulate(AttributeGroup::Strength, 0.003) {
                flushes.push(flushed);
            }
        }

        assert_eq!(flushes.len(), 1);
        assert!((flushes[0] - 0.012).abs() < 1e-6);
        assert_eq!(buffer.pending(AttributeGroup::Strength), 0.0);
    }

    #[test]
    fn slots_are_independent() {
        let mut buffer = XpSendBuffer::new();
        assert!(buffer.accumulate(AttributeGroup::Strength, 0.008).is_none());
        assert!(buffer.accumulate(AttributeGroup::Agility, 0.008).is_none());
        assert!(buffer.accumulate(AttributeGroup::Strength, 0.008).is_some());
        assert!((buffer.pending(AttributeGroup::Agility) - 0.008).abs() < 1e-6);
    }

    #[test]
    fn one_large_award_flushes_immediately() {
        let mut buffer = XpSendBuffer::new();
        assert_eq!(buffer.accumulate(AttributeGroup::Charisma, 0.5), Some(0.5));
    }
}

//! The MIDI-to-keyboard map.
//!
//! Sixteen 16-bit entries, one per MIDI channel: the low seven bits route
//! the channel to keyboards, bit 7 is the "follow division mask" sentinel,
//! the upper byte is reserved for the model's stop-control banks.
//!
//! The model edits its own copy and publishes an immutable snapshot through
//! an `ArcSwap`; the MIDI thread loads the snapshot per event and never
//! blocks.

use arc_swap::ArcSwap;
use montre_core::FOLLOW_MASK;
use std::sync::Arc;

/// Immutable routing snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardMap {
    bits: [u16; 16],
}

impl KeyboardMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw entry for a channel.
    #[inline]
    pub fn entry(&self, channel: u8) -> u16 {
        self.bits.get(channel as usize & 15).copied().unwrap_or(0)
    }

    /// Keyboard routing bits for a channel.
    #[inline]
    pub fn keyboards(&self, channel: u8) -> u8 {
        (self.entry(channel) & 0x7f) as u8
    }

    /// Does this channel follow the division masks?
    #[inline]
    pub fn follows(&self, channel: u8) -> bool {
        self.entry(channel) as u8 & FOLLOW_MASK != 0
    }

    /// Route `channel` to `keyboard` (0-6) or not. Out-of-range arguments
    /// are ignored.
    pub fn set_route(&mut self, channel: u8, keyboard: u8, on: bool) {
        if channel > 15 || keyboard > 6 {
            return;
        }
        if on {
            self.bits[channel as usize] |= 1 << keyboard;
        } else {
            self.bits[channel as usize] &= !(1 << keyboard);
        }
    }

    /// Replace a full entry (used when loading channel presets).
    pub fn set_entry(&mut self, channel: u8, bits: u16) {
        if channel <= 15 {
            self.bits[channel as usize] = bits;
        }
    }
}

/// Shared cell: the model writes, the MIDI thread reads.
#[derive(Debug)]
pub struct MidiMap {
    cell: ArcSwap<KeyboardMap>,
}

impl Default for MidiMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiMap {
    pub fn new() -> Self {
        Self {
            cell: ArcSwap::from_pointee(KeyboardMap::new()),
        }
    }

    /// Current snapshot; cheap enough to call per event.
    #[inline]
    pub fn snapshot(&self) -> Arc<KeyboardMap> {
        self.cell.load_full()
    }

    /// Copy-modify-publish.
    pub fn modify(&self, f: impl FnOnce(&mut KeyboardMap)) {
        let mut next = **self.cell.load();
        f(&mut next);
        self.cell.store(Arc::new(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_bits() {
        let mut m = KeyboardMap::new();
        m.set_route(2, 0, true);
        m.set_route(2, 4, true);
        assert_eq!(m.keyboards(2), 0b1_0001);
        m.set_route(2, 0, false);
        assert_eq!(m.keyboards(2), 0b1_0000);
        // Ignored, not panicking.
        m.set_route(16, 0, true);
        m.set_route(0, 7, true);
        assert_eq!(m.keyboards(0), 0);
    }

    #[test]
    fn test_follow_sentinel() {
        let mut m = KeyboardMap::new();
        m.set_entry(3, 0x0081);
        assert!(m.follows(3));
        assert_eq!(m.keyboards(3), 0x01);
    }

    #[test]
    fn test_snapshot_isolation() {
        let map = MidiMap::new();
        let before = map.snapshot();
        map.modify(|m| m.set_route(0, 1, true));
        assert_eq!(before.keyboards(0), 0);
        assert_eq!(map.snapshot().keyboards(0), 0b10);
    }
}

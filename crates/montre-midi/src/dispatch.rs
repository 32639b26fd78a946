//! The MIDI thread's fast path.
//!
//! Notes become single command words on the u32 note ring, routed through
//! the keyboard map. Controllers are forwarded raw (three bytes) on the u8
//! ring for the model to interpret at its leisure; the audio thread never
//! sees them.

use crate::event::MidiEvent;
use crate::map::MidiMap;
use montre_core::{Command, Keymap, Producer};
use std::sync::Arc;

/// Translates normalized events into queue records.
pub struct Dispatcher {
    map: Arc<MidiMap>,
    notes: Producer<u32>,
    controls: Producer<u8>,
}

impl Dispatcher {
    pub fn new(map: Arc<MidiMap>, notes: Producer<u32>, controls: Producer<u8>) -> Self {
        Self {
            map,
            notes,
            controls,
        }
    }

    /// Handle one event. Returns `false` if a ring was full and the event
    /// was dropped, which the queue sizing is meant to make impossible.
    pub fn handle(&mut self, ev: MidiEvent) -> bool {
        match ev {
            MidiEvent::NoteOn { channel, note, .. } => {
                let mask = self.map.snapshot().keyboards(channel);
                let Some(idx) = Keymap::index(note) else {
                    return true;
                };
                if mask == 0 {
                    return true;
                }
                self.push_note(Command::KeyOn {
                    note: idx as u8,
                    mask,
                })
            }
            MidiEvent::NoteOff { channel, note } => {
                let mask = self.map.snapshot().keyboards(channel);
                let Some(idx) = Keymap::index(note) else {
                    return true;
                };
                if mask == 0 {
                    return true;
                }
                self.push_note(Command::KeyOff {
                    note: idx as u8,
                    mask,
                })
            }
            MidiEvent::Control {
                channel,
                control,
                value,
            } => {
                if self.controls.write_avail() < 3 {
                    return false;
                }
                self.controls.write(0, 0xb0 | channel);
                self.controls.write(1, control);
                self.controls.write(2, value);
                self.controls.write_commit(3);
                true
            }
            // Program changes are preset territory; the organ ignores them
            // here and the model handles preset recall on its own path.
            MidiEvent::Program { .. } => true,
        }
    }

    fn push_note(&mut self, cmd: Command) -> bool {
        if self.notes.write_avail() == 0 {
            return false;
        }
        let (word, _) = cmd.encode();
        self.notes.write(0, word);
        self.notes.write_commit(1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use montre_core::ring;

    fn dispatcher() -> (Dispatcher, montre_core::Consumer<u32>, montre_core::Consumer<u8>) {
        let map = Arc::new(MidiMap::new());
        map.modify(|m| m.set_route(0, 1, true));
        let (ntx, nrx) = ring::<u32>(64).unwrap();
        let (ctx, crx) = ring::<u8>(64).unwrap();
        (Dispatcher::new(map, ntx, ctx), nrx, crx)
    }

    #[test]
    fn test_note_routes_through_map() {
        let (mut d, nrx, _crx) = dispatcher();
        assert!(d.handle(MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 64
        }));
        assert_eq!(nrx.read_avail(), 1);
        let cmd = Command::decode(nrx.read(0), None).unwrap();
        assert_eq!(
            cmd,
            Command::KeyOn {
                note: 24,
                mask: 0b10
            }
        );
    }

    #[test]
    fn test_unrouted_channel_is_silent() {
        let (mut d, nrx, _crx) = dispatcher();
        d.handle(MidiEvent::NoteOn {
            channel: 5,
            note: 60,
            velocity: 64
        });
        assert_eq!(nrx.read_avail(), 0);
    }

    #[test]
    fn test_out_of_compass_note_ignored() {
        let (mut d, nrx, _crx) = dispatcher();
        d.handle(MidiEvent::NoteOn {
            channel: 0,
            note: 20,
            velocity: 64
        });
        d.handle(MidiEvent::NoteOn {
            channel: 0,
            note: 120,
            velocity: 64
        });
        assert_eq!(nrx.read_avail(), 0);
    }

    #[test]
    fn test_controller_forwarded_raw() {
        let (mut d, _nrx, crx) = dispatcher();
        d.handle(MidiEvent::Control {
            channel: 3,
            control: 64,
            value: 127
        });
        assert_eq!(crx.read_avail(), 3);
        assert_eq!(crx.read(0), 0xb3);
        assert_eq!(crx.read(1), 64);
        assert_eq!(crx.read(2), 127);
    }
}

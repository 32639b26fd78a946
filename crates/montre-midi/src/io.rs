//! Hardware MIDI input through midir.

use crate::dispatch::Dispatcher;
use crate::event::MidiEvent;
use crate::{Error, Result};
use midir::{Ignore, MidiInput, MidiInputConnection};
use tracing::{debug, warn};

/// An open input connection feeding a [`Dispatcher`]. Dropping it closes
/// the connection.
pub struct MidiInputHandle {
    _conn: MidiInputConnection<()>,
    name: String,
}

impl MidiInputHandle {
    /// Port name as reported by the driver.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// List available input port names.
pub fn input_ports() -> Result<Vec<String>> {
    let input = MidiInput::new("montre").map_err(|e| Error::Backend(e.to_string()))?;
    Ok(input
        .ports()
        .iter()
        .filter_map(|p| input.port_name(p).ok())
        .collect())
}

/// Connect the dispatcher to the first input port whose name contains
/// `filter`, or to the first port when `filter` is empty.
pub fn connect(filter: &str, mut dispatcher: Dispatcher) -> Result<MidiInputHandle> {
    let mut input = MidiInput::new("montre").map_err(|e| Error::Backend(e.to_string()))?;
    input.ignore(Ignore::All);

    let ports = input.ports();
    let port = ports
        .iter()
        .find(|p| {
            input
                .port_name(p)
                .map(|n| filter.is_empty() || n.contains(filter))
                .unwrap_or(false)
        })
        .ok_or_else(|| Error::PortNotFound(filter.to_owned()))?;
    let name = input
        .port_name(port)
        .map_err(|e| Error::Backend(e.to_string()))?;
    debug!(port = %name, "opening MIDI input");

    let conn = input
        .connect(
            port,
            "montre-in",
            move |_stamp, bytes, _| {
                if let Some(ev) = MidiEvent::parse(bytes) {
                    if !dispatcher.handle(ev) {
                        warn!("MIDI queue full, event dropped");
                    }
                }
            },
            (),
        )
        .map_err(|e| Error::Backend(e.to_string()))?;

    Ok(MidiInputHandle { _conn: conn, name })
}

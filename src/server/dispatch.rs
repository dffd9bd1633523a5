use anyhow::{Result, anyhow};
use log::debug;
use std::collections::HashMap;

use crate::actions::KeySink;
use crate::deck::SlideCommand;

/// Fires the desktop action bound to a slide command, if any.
pub fn dispatch_command(
    cmd: SlideCommand,
    bindings: &HashMap<String, String>,
    sink: &mut KeySink,
) -> Result<()> {
    let key = cmd.binding_key();
    let action = bindings.get(key).map(|s| s.trim()).unwrap_or_default();

    if action.is_empty() || action == "none" {
        return Ok(());
    }
    if let Some(rest) = action.strip_prefix("key:") {
        debug!("{key} -> key {rest}");
        return sink.key_chord(rest.trim());
    }

    Err(anyhow!("unknown action mapping for {key} -> '{action}'"))
}

use anyhow::{Result, anyhow};
use log::{info, warn};

/// Keys a binding chord may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyToken {
    Ctrl,
    Alt,
    Shift,
    Super,
    Right,
    Left,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    Esc,
    Space,
    Enter,
    F5,
}

/// Parse a chord like "CTRL+F5" or single "RIGHT".
pub fn parse_chord(chord: &str) -> Result<Vec<KeyToken>> {
    let mut keys = Vec::new();
    for part in chord.split('+') {
        let tok = part.trim().to_ascii_uppercase();
        let k = match tok.as_str() {
            "CTRL" | "CONTROL" => KeyToken::Ctrl,
            "ALT" => KeyToken::Alt,
            "SHIFT" => KeyToken::Shift,
            "SUPER" | "META" | "WIN" => KeyToken::Super,
            "RIGHT" => KeyToken::Right,
            "LEFT" => KeyToken::Left,
            "UP" => KeyToken::Up,
            "DOWN" => KeyToken::Down,
            "HOME" => KeyToken::Home,
            "END" => KeyToken::End,
            "PAGEUP" | "PGUP" => KeyToken::PageUp,
            "PAGEDOWN" | "PGDN" => KeyToken::PageDown,
            "ESC" | "ESCAPE" => KeyToken::Esc,
            "SPACE" => KeyToken::Space,
            "ENTER" | "RETURN" => KeyToken::Enter,
            "F5" => KeyToken::F5,
            "" => return Err(anyhow!("empty key token in '{chord}'")),
            other => return Err(anyhow!("unsupported key token: {other}")),
        };
        keys.push(k);
    }
    Ok(keys)
}

/// Virtual keyboard used to mirror slide moves into a desktop presenter.
pub struct KeySink {
    enabled: bool,
    #[allow(dead_code)]
    linux: Option<Box<LinuxUinput>>,
}

impl KeySink {
    pub fn new() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create()?;
            return Ok(Self {
                enabled: true,
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self::noop())
        }
    }

    /// Validates chords but emits nothing.
    pub fn noop() -> Self {
        Self {
            enabled: false,
            linux: None,
        }
    }

    /// Real device when `wanted`, otherwise (or on failure) a no-op sink.
    pub fn open(wanted: bool) -> Self {
        if !wanted {
            return Self::noop();
        }
        Self::new().unwrap_or_else(|e| {
            warn!("virtual keyboard unavailable ({e}); key bindings disabled");
            Self::noop()
        })
    }

    /// Whether chords reach a virtual keyboard.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Send a chord like "CTRL+F5" or single "RIGHT".
    pub fn key_chord(&mut self, chord: &str) -> Result<()> {
        let keys = parse_chord(chord)?;
        if !self.enabled {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            // press in order
            for k in &keys {
                dev.key_send(*k, 1)?;
            }
            dev.sync()?;
            // release in reverse
            for k in keys.iter().rev() {
                dev.key_send(*k, 0)?;
            }
            dev.sync()?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = keys;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn map_key(tok: KeyToken) -> uinput::event::keyboard::Key {
    use uinput::event::keyboard::Key as K;
    match tok {
        KeyToken::Ctrl => K::LeftControl,
        KeyToken::Alt => K::LeftAlt,
        KeyToken::Shift => K::LeftShift,
        KeyToken::Super => K::LeftMeta,
        KeyToken::Right => K::Right,
        KeyToken::Left => K::Left,
        KeyToken::Up => K::Up,
        KeyToken::Down => K::Down,
        KeyToken::Home => K::Home,
        KeyToken::End => K::End,
        KeyToken::PageUp => K::PageUp,
        KeyToken::PageDown => K::PageDown,
        KeyToken::Esc => K::Esc,
        KeyToken::Space => K::Space,
        KeyToken::Enter => K::Enter,
        KeyToken::F5 => K::F5,
    }
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(not(target_os = "linux"))]
struct LinuxUinput;

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create() -> Result<Self> {
        use uinput::event::keyboard::Key;

        let dev = uinput::default()?
            .name("Handctl Virtual Keyboard")?
            .event(Key::LeftControl)?
            .event(Key::LeftAlt)?
            .event(Key::LeftShift)?
            .event(Key::LeftMeta)?
            .event(Key::Right)?
            .event(Key::Left)?
            .event(Key::Up)?
            .event(Key::Down)?
            .event(Key::Home)?
            .event(Key::End)?
            .event(Key::PageUp)?
            .event(Key::PageDown)?
            .event(Key::Esc)?
            .event(Key::Space)?
            .event(Key::Enter)?
            .event(Key::F5)?
            .create()?;

        info!("uinput: created virtual keyboard");
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn key_send(&mut self, key: KeyToken, val: i32) -> Result<()> {
        self.dev.send(map_key(key), val)?;
        Ok(())
    }
}

//! Presentation state driven by navigation gestures.

use anyhow::Result;
use log::info;
use serde::Serialize;
use std::collections::HashMap;

use crate::actions::KeySink;
use crate::server::dispatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideCommand {
    Next,
    Previous,
    First,
    Last,
    Stop,
}

impl SlideCommand {
    /// Key under `[bindings]` that maps this command to an action.
    pub fn binding_key(&self) -> &'static str {
        match self {
            Self::Next => "slide.next",
            Self::Previous => "slide.previous",
            Self::First => "slide.first",
            Self::Last => "slide.last",
            Self::Stop => "slide.stop",
        }
    }
}

/// The slide-advance collaborator the session manager actuates.
pub trait SlideController: Send {
    fn actuate(&mut self, cmd: SlideCommand) -> Result<DeckStatus>;
    fn status(&self) -> DeckStatus;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeckStatus {
    pub title: Option<String>,
    /// Zero-based.
    pub current: usize,
    pub total: usize,
    pub running: bool,
}

#[derive(Debug, Clone)]
pub struct SlideDeck {
    title: Option<String>,
    current: usize,
    total: usize,
    running: bool,
}

impl SlideDeck {
    pub fn new(title: Option<String>, total: usize) -> Self {
        Self {
            title,
            current: 0,
            total,
            running: true,
        }
    }

    pub fn empty() -> Self {
        Self::new(None, 0)
    }

    #[cfg(test)]
    pub fn current(&self) -> usize {
        self.current
    }

    /// Returns whether the command changed anything.
    pub fn apply(&mut self, cmd: SlideCommand) -> bool {
        let last = self.total.saturating_sub(1);
        let before = (self.current, self.running);
        match cmd {
            SlideCommand::Next => {
                if self.current < last {
                    self.current += 1;
                }
            }
            SlideCommand::Previous => {
                self.current = self.current.saturating_sub(1);
            }
            SlideCommand::First => {
                self.current = 0;
                self.running = true;
            }
            SlideCommand::Last => {
                self.current = last;
                self.running = true;
            }
            SlideCommand::Stop => self.running = false,
        }
        before != (self.current, self.running)
    }

    pub fn status(&self) -> DeckStatus {
        DeckStatus {
            title: self.title.clone(),
            current: self.current,
            total: self.total,
            running: self.running,
        }
    }
}

/// Deck plus the key sink that mirrors each move to the desktop.
pub struct Presenter {
    deck: SlideDeck,
    sink: KeySink,
    bindings: HashMap<String, String>,
}

impl Presenter {
    pub fn new(deck: SlideDeck, sink: KeySink, bindings: HashMap<String, String>) -> Self {
        Self {
            deck,
            sink,
            bindings,
        }
    }

    pub fn replace_deck(&mut self, deck: SlideDeck) {
        self.deck = deck;
    }

    pub fn set_bindings(&mut self, bindings: HashMap<String, String>) {
        self.bindings = bindings;
    }

    pub fn replace_sink(&mut self, sink: KeySink) {
        self.sink = sink;
    }
}

impl SlideController for Presenter {
    fn actuate(&mut self, cmd: SlideCommand) -> Result<DeckStatus> {
        let moved = self.deck.apply(cmd);
        let status = self.deck.status();
        info!(
            "slide {:?}: {}/{}{}",
            cmd,
            status.current + 1,
            status.total,
            if moved { "" } else { " (unchanged)" }
        );
        dispatch::dispatch_command(cmd, &self.bindings, &mut self.sink)?;
        Ok(status)
    }

    fn status(&self) -> DeckStatus {
        self.deck.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_clamps_at_the_ends() {
        let mut deck = SlideDeck::new(Some("talk".into()), 3);
        assert!(!deck.apply(SlideCommand::Previous));
        assert!(deck.apply(SlideCommand::Next));
        assert!(deck.apply(SlideCommand::Next));
        assert!(!deck.apply(SlideCommand::Next));
        assert_eq!(deck.current(), 2);
        assert!(deck.apply(SlideCommand::First));
        assert_eq!(deck.current(), 0);
        assert!(deck.apply(SlideCommand::Last));
        assert_eq!(deck.current(), 2);
    }

    #[test]
    fn stop_ends_the_show_and_first_restarts_it() {
        let mut deck = SlideDeck::new(None, 5);
        deck.apply(SlideCommand::Next);
        assert!(deck.apply(SlideCommand::Stop));
        assert!(!deck.status().running);
        deck.apply(SlideCommand::First);
        assert!(deck.status().running);
        assert_eq!(deck.current(), 0);
    }

    #[test]
    fn empty_deck_stays_at_zero() {
        let mut deck = SlideDeck::empty();
        deck.apply(SlideCommand::Next);
        deck.apply(SlideCommand::Last);
        assert_eq!(deck.current(), 0);
    }

    #[test]
    fn presenter_moves_deck_with_noop_sink() {
        let mut bindings = HashMap::new();
        bindings.insert("slide.next".to_string(), "key:RIGHT".to_string());
        let mut p = Presenter::new(SlideDeck::new(None, 4), KeySink::noop(), bindings);
        let st = p.actuate(SlideCommand::Next).unwrap();
        assert_eq!(st.current, 1);
        assert_eq!(p.status().current, 1);
    }
}

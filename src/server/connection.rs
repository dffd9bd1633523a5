//! One task per client: admission, analysis, session update, replies and
//! liveness, strictly in arrival order.

use axum::extract::ws::{Message, WebSocket};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};

use super::admission::{FrameGate, Liveness};
use super::pipeline::{self, Analyzed};
use super::protocol::{self, ClientText, Outbound, PONG};
use super::registry::{Control, SessionGuard};
use super::{Engine, SharedState};
use crate::error::TransportError;
use crate::session::Session;
use crate::viz;

pub enum Inbound {
    Binary(Vec<u8>),
    Text(String),
}

/// Message transport of one client connection.
pub trait Transport: Send {
    /// `None` once the peer is gone.
    fn next_inbound(&mut self) -> impl Future<Output = Option<Inbound>> + Send;
    fn send_text(&mut self, text: String)
    -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl Transport for WebSocket {
    async fn next_inbound(&mut self) -> Option<Inbound> {
        while let Some(msg) = self.recv().await {
            match msg {
                Ok(Message::Binary(b)) => return Some(Inbound::Binary(b.to_vec())),
                Ok(Message::Text(t)) => return Some(Inbound::Text(t.as_str().to_owned())),
                Ok(Message::Close(_)) => return None,
                // ping/pong frames are answered by axum
                Ok(_) => continue,
                Err(e) => {
                    debug!("websocket read failed: {e}");
                    return None;
                }
            }
        }
        None
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

/// Runs a connection to completion. Transport failures end it quietly.
pub async fn serve<T: Transport>(io: T, state: SharedState, presentation: String) {
    if let Err(e) = drive(io, state, &presentation).await {
        debug!("connection for '{presentation}' ended: {e}");
    }
}

pub async fn drive<T: Transport>(
    io: T,
    state: SharedState,
    presentation: &str,
) -> Result<(), TransportError> {
    let (guard, control) = state.registry.register(presentation);
    let engine = state.engine();
    let s = &engine.profile.session;
    let mut conn = Connection {
        gate: FrameGate::new(s.frame_interval()),
        live: Liveness::new(Instant::now(), s.heartbeat(), s.stale_after()),
        session: Session::from_profile(&engine.profile),
        engine: Arc::clone(&engine),
        io,
        state,
        guard,
        control,
        closing: false,
    };
    conn.run().await
}

struct Connection<T> {
    io: T,
    state: SharedState,
    engine: Arc<Engine>,
    session: Session,
    gate: FrameGate,
    live: Liveness,
    guard: SessionGuard,
    control: mpsc::UnboundedReceiver<Control>,
    closing: bool,
}

impl<T: Transport> Connection<T> {
    async fn run(&mut self) -> Result<(), TransportError> {
        loop {
            let wait = self.engine.profile.session.recv_timeout();
            match timeout(wait, self.io.next_inbound()).await {
                Ok(None) => return Ok(()),
                Ok(Some(Inbound::Binary(bytes))) => self.on_frame(bytes).await?,
                Ok(Some(Inbound::Text(text))) => self.on_text(&text).await?,
                Err(_) => {}
            }
            self.housekeeping().await?;
            if self.closing {
                return Ok(());
            }
        }
    }

    /// Counts an arriving frame and asks the gate whether to process it.
    async fn admit(&mut self, now: Instant) -> bool {
        self.session.frame_received();
        self.live.frame_seen(now);
        if self.gate.admit(now) {
            return true;
        }
        self.session.frame_dropped();
        tokio::task::yield_now().await;
        false
    }

    async fn on_frame(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let now = Instant::now();
        if !self.admit(now).await {
            return Ok(());
        }

        let engine = Arc::clone(&self.engine);
        let provider = Arc::clone(&self.state.provider);
        let previous = self.session.previous().copied();
        let job = tokio::task::spawn_blocking(move || {
            pipeline::analyze_image(
                provider.as_ref(),
                &engine.classifier,
                &bytes,
                engine.profile.session.min_frame_bytes,
                previous.as_ref(),
            )
        });

        match job.await {
            Ok(Ok(analyzed)) => self.emit(now, analyzed).await,
            Ok(Err(e)) => {
                debug!("session {}: frame skipped: {e}", self.guard.id());
                self.session.frame_dropped();
                Ok(())
            }
            Err(e) => {
                warn!("session {}: analysis task failed: {e}", self.guard.id());
                self.session.frame_dropped();
                Ok(())
            }
        }
    }

    async fn on_text(&mut self, text: &str) -> Result<(), TransportError> {
        match protocol::parse_text(text) {
            ClientText::Ping => self.io.send_text(PONG.to_string()).await,
            ClientText::JsonPing => self.send(&Outbound::Pong).await,
            ClientText::Hello { client } => {
                info!(
                    "session {}: hello from {}",
                    self.guard.id(),
                    client.as_deref().unwrap_or("unnamed client")
                );
                Ok(())
            }
            ClientText::Heartbeat => Ok(()),
            ClientText::Landmarks(frame) => {
                let now = Instant::now();
                if !self.admit(now).await {
                    return Ok(());
                }
                let analyzed = pipeline::analyze_landmarks(
                    &self.engine.classifier,
                    frame.points,
                    frame.width,
                    frame.height,
                    self.session.previous(),
                );
                self.emit(now, analyzed).await
            }
            ClientText::Unknown(why) => {
                debug!("session {}: ignoring text message ({why})", self.guard.id());
                Ok(())
            }
        }
    }

    async fn emit(&mut self, now: Instant, analyzed: Analyzed) -> Result<(), TransportError> {
        let Analyzed { analysis, image } = analyzed;
        pipeline::log_fired(&analysis);
        let hand = analysis.detection.as_ref().map(|d| d.landmarks);

        let out = self.session.apply(now.into_std(), analysis);
        if let Some(cmd) = out.command {
            let mut presenter = self.state.presenter.lock();
            pipeline::actuate(&mut *presenter, cmd);
        }

        let mut event = out.event;
        if self.engine.profile.session.viz_frames && !event.gesture.is_none() {
            if let Some(img) = image {
                match tokio::task::spawn_blocking(move || viz::render(&img, hand.as_ref())).await {
                    Ok(Ok(b64)) => event.viz_frame = Some(b64),
                    Ok(Err(e)) => debug!("preview encode failed: {e}"),
                    Err(e) => debug!("preview task failed: {e}"),
                }
            }
        }
        self.send(&Outbound::Gesture(event)).await
    }

    async fn housekeeping(&mut self) -> Result<(), TransportError> {
        self.refresh_engine();

        while let Ok(ctl) = self.control.try_recv() {
            match ctl {
                Control::SetMode(mode) => {
                    if self.session.set_mode(mode) {
                        info!("session {}: mode set to {mode:?}", self.guard.id());
                    }
                }
                Control::Shutdown => self.closing = true,
            }
        }

        let now = Instant::now();
        let stats = self.session.stats(now.into_std());
        let due = self.live.poll(now);
        if due.heartbeat {
            self.send(&Outbound::Heartbeat).await?;
            self.send(&Outbound::Stats {
                fps: stats.fps,
                total_frames: stats.received,
            })
            .await?;
        }
        if due.stale_warning {
            let secs = self.live.silence(now).as_secs();
            warn!("session {}: no frames for {secs}s", self.guard.id());
            self.send(&Outbound::Warning {
                message: format!("no frames received for {secs}s"),
            })
            .await?;
        }

        self.guard.publish(self.session.mode(), stats);
        Ok(())
    }

    /// Picks up a reloaded profile between frames.
    fn refresh_engine(&mut self) {
        let current = self.state.engine();
        if current.generation == self.engine.generation {
            return;
        }
        let s = &current.profile.session;
        self.gate.set_interval(s.frame_interval());
        self.live.reconfigure(s.heartbeat(), s.stale_after());
        self.session.reconfigure(&current.profile);
        debug!(
            "session {}: now on profile generation {}",
            self.guard.id(),
            current.generation
        );
        self.engine = current;
    }

    async fn send(&mut self, msg: &Outbound) -> Result<(), TransportError> {
        let text = msg.to_json()?;
        self.io.send_text(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::rules::fixtures::hand;
    use crate::config::Profile;
    use crate::landmarks::LandmarkSet;
    use crate::provider::LandmarkProvider;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use image::RgbImage;
    use crate::deck::SlideController;
    use crate::provider::fixtures::png_frame;
    use crate::server::fixtures;
    use crate::server::registry::Control;
    use crate::session::Mode;
    use std::time::Duration;
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
    use tokio::task::JoinHandle;

    struct ChannelTransport {
        inbound: UnboundedReceiver<Inbound>,
        outbound: UnboundedSender<String>,
    }

    impl Transport for ChannelTransport {
        async fn next_inbound(&mut self) -> Option<Inbound> {
            self.inbound.recv().await
        }

        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.outbound.send(text).map_err(|_| TransportError::Send("client gone".into()))
        }
    }

    struct Client {
        tx: UnboundedSender<Inbound>,
        rx: UnboundedReceiver<String>,
        task: JoinHandle<Result<(), TransportError>>,
    }

    impl Client {
        fn connect(state: SharedState) -> Self {
            let (tx, inbound) = unbounded_channel();
            let (outbound, rx) = unbounded_channel();
            let io = ChannelTransport { inbound, outbound };
            let task = tokio::spawn(async move { drive(io, state, "talk").await });
            Self { tx, rx, task }
        }

        fn text(&self, s: &str) {
            self.tx.send(Inbound::Text(s.to_string())).unwrap();
        }

        fn landmarks(&self, ext: [bool; 5]) {
            let msg = serde_json::json!({
                "type": "landmarks",
                "points": hand(ext),
                "width": 640,
                "height": 480,
            });
            self.text(&msg.to_string());
        }

        fn drain(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(m) = self.rx.try_recv() {
                out.push(m);
            }
            out
        }

        fn drain_json(&mut self) -> Vec<serde_json::Value> {
            self.drain()
                .iter()
                .filter_map(|m| serde_json::from_str(m).ok())
                .collect()
        }
    }

    fn of_type<'a>(msgs: &'a [serde_json::Value], ty: &str) -> Vec<&'a serde_json::Value> {
        msgs.iter().filter(|m| m["type"] == ty).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn ping_gets_pong_and_hello_gets_nothing() {
        let mut c = Client::connect(fixtures::state(5));
        c.text("ping");
        c.text(r#"{"type":"hello","client":"viewer"}"#);
        c.text(r#"{"type":"ping"}"#);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let out = c.drain();
        assert_eq!(out[0], "pong");
        assert_eq!(out.len(), 2);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&out[1]).unwrap()["type"],
            "pong"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silence_warns_once_and_keeps_the_connection() {
        let mut c = Client::connect(fixtures::state(5));
        tokio::time::sleep(Duration::from_secs(30)).await;

        let msgs = c.drain_json();
        assert_eq!(of_type(&msgs, "warning").len(), 1);
        assert!(of_type(&msgs, "heartbeat").len() >= 5);
        let stats = of_type(&msgs, "stats");
        assert_eq!(stats[0]["total_frames"], 0);
        assert!(!c.task.is_finished());

        drop(c.tx);
        assert!(c.task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sixty_hz_input_is_throttled_to_fifteen() {
        let state = fixtures::state(100);
        let mut c = Client::connect(state.clone());
        let period = Duration::from_secs_f64(1.0 / 60.0);
        for _ in 0..60 {
            c.landmarks([false, true, false, false, false]);
            tokio::time::sleep(period).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        // timer ticks are whole milliseconds, so the last frame may land on
        // a sixteenth slot
        let msgs = c.drain_json();
        let events = of_type(&msgs, "gesture");
        assert!((15..=16).contains(&events.len()), "{} admitted", events.len());
        assert!(events.iter().all(|e| e["gesture"] == "next_slide"));
        assert_eq!(state.presenter.lock().status().current, events.len());

        let snap = state.registry.snapshot();
        assert_eq!(snap[0].stats.received, 60);
        assert_eq!(snap[0].stats.dropped, 60 - events.len() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_without_a_hand_report_no_gesture() {
        let state = fixtures::state(5);
        let mut c = Client::connect(state.clone());
        let frame = png_frame(64, 48);
        for _ in 0..10 {
            c.tx.send(Inbound::Binary(frame.clone())).unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let msgs = c.drain_json();
        let events = of_type(&msgs, "gesture");
        assert_eq!(events.len(), 10);
        for e in events {
            assert_eq!(e["gesture"], "no_gesture");
            assert_eq!(e["confidence"], 0.0);
            assert_eq!(e["current_mode"], "presentation");
            assert!(e.get("mode").is_none());
            assert!(e.get("viz_frame").is_none());
        }
        assert_eq!(state.presenter.lock().status().current, 0);
    }

    /// Reports the same pointing hand in every frame.
    struct PointingProvider;

    impl LandmarkProvider for PointingProvider {
        fn name(&self) -> &str {
            "pointing"
        }

        fn detect(&self, _frame: &RgbImage) -> anyhow::Result<Option<LandmarkSet>> {
            Ok(Some(hand([false, true, false, false, false])))
        }
    }

    fn pointing_state(viz_frames: bool) -> SharedState {
        let mut p = Profile::builtin().unwrap();
        p.session.viz_frames = viz_frames;
        fixtures::state_with_provider(p, 5, Arc::new(PointingProvider))
    }

    #[tokio::test(start_paused = true)]
    async fn fired_gesture_carries_an_annotated_jpeg() {
        let mut c = Client::connect(pointing_state(true));
        c.tx.send(Inbound::Binary(png_frame(64, 48))).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let msgs = c.drain_json();
        let ev = of_type(&msgs, "gesture");
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0]["gesture"], "next_slide");
        let b64 = ev[0]["viz_frame"].as_str().expect("viz_frame present");
        let jpeg = STANDARD.decode(b64).unwrap();
        assert_eq!(jpeg[..2], [0xFFu8, 0xD8]);
        let img = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[tokio::test(start_paused = true)]
    async fn viz_frames_can_be_turned_off() {
        let mut c = Client::connect(pointing_state(false));
        c.tx.send(Inbound::Binary(png_frame(64, 48))).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let msgs = c.drain_json();
        let ev = of_type(&msgs, "gesture");
        assert_eq!(ev[0]["gesture"], "next_slide");
        assert!(ev[0].get("viz_frame").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reported_fps_falls_to_zero_after_frames_stop() {
        let mut c = Client::connect(fixtures::state(100));
        // long enough to cover the first heartbeat
        for _ in 0..75 {
            c.landmarks([false, true, false, false, false]);
            tokio::time::sleep(Duration::from_millis(70)).await;
        }
        let during = c.drain_json();
        let stats = of_type(&during, "stats");
        assert!(stats.last().unwrap()["fps"].as_f64().unwrap() > 10.0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let after = c.drain_json();
        let stats = of_type(&after, "stats");
        assert!(stats.len() >= 5);
        assert_eq!(stats.last().unwrap()["fps"], 0.0);
        assert_eq!(stats.last().unwrap()["total_frames"], 75);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_frames_are_skipped() {
        let mut c = Client::connect(fixtures::state(5));
        c.tx.send(Inbound::Binary(vec![0u8; 10])).unwrap();
        c.tx.send(Inbound::Binary(vec![9u8; 4000])).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let msgs = c.drain_json();
        assert!(of_type(&msgs, "gesture").is_empty());
        assert!(!c.task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn draw_switches_mode_once_and_blocks_navigation() {
        let state = fixtures::state(10);
        let mut c = Client::connect(state.clone());
        for ext in [
            [false, true, true, false, false],
            [false, true, true, false, false],
            [false, true, false, false, false],
        ] {
            c.landmarks(ext);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let msgs = c.drain_json();
        let events = of_type(&msgs, "gesture");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["gesture"], "draw");
        assert_eq!(events[0]["mode"], "annotation");
        assert!(events[0]["coordinates"].is_array());
        assert!(events[1].get("mode").is_none());
        assert_eq!(events[2]["gesture"], "next_slide");
        assert_eq!(events[2]["suppressed"], true);
        assert_eq!(state.presenter.lock().status().current, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn external_mode_change_reaches_the_session() {
        let state = fixtures::state(10);
        let mut c = Client::connect(state.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.registry.broadcast(Control::SetMode(Mode::Annotation)), 1);
        tokio::time::sleep(Duration::from_millis(300)).await;

        c.landmarks([false, false, false, false, true]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let msgs = c.drain_json();
        let ev = of_type(&msgs, "gesture");
        assert_eq!(ev[0]["mode"], "annotation");
        assert_eq!(ev[0]["gesture"], "previous_slide");
        assert_eq!(ev[0]["suppressed"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_control_closes_the_session() {
        let state = fixtures::state(3);
        let c = Client::connect(state.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        state.registry.broadcast(Control::Shutdown);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(c.task.is_finished());
        assert!(state.registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn registry_entry_goes_away_on_disconnect() {
        let state = fixtures::state(3);
        let c = Client::connect(state.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.registry.len(), 1);
        drop(c.tx);
        c.task.await.unwrap().unwrap();
        assert!(state.registry.is_empty());
    }
}

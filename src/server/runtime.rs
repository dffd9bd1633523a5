//! Process wiring for `handctl serve`: runtime, listener, profile hot reload
//! and signal-driven shutdown.

use anyhow::{Result, anyhow};
use log::{info, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

use super::registry::Control;
use super::{AppState, SharedState, routes};
use crate::actions::KeySink;
use crate::config::ConfigStore;
use crate::deck::{Presenter, SlideDeck};
use crate::provider::NoHandProvider;

/// Quiet period that folds an editor's burst of writes into one reload.
const RELOAD_SETTLE: Duration = Duration::from_millis(200);

pub fn serve(store: ConfigStore, addr: Option<String>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(store, addr))
}

async fn run(store: ConfigStore, addr: Option<String>) -> Result<()> {
    let profile = store.profile.clone();
    let addr = addr.unwrap_or_else(|| profile.server.addr.clone());
    info!(
        "active profile '{}' (strategy {:?})",
        store.active_name, profile.classifier.strategy
    );

    let sink = KeySink::open(profile.controller.keys);
    info!(
        "key output {}",
        if sink.is_enabled() { "enabled" } else { "disabled" }
    );
    let presenter = Presenter::new(SlideDeck::empty(), sink, profile.bindings.clone());
    let state = AppState::new(profile, Arc::new(NoHandProvider), presenter);

    // dropping the watcher stops it
    let _watcher = watch_profiles(store, Arc::clone(&state))?;
    let stop = shutdown_signal()?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow!("cannot bind {addr}: {e}"))?;
    info!("listening on http://{}", listener.local_addr()?);
    info!(
        "gesture socket: ws://{}/ws/gesture_control/<presentation_id>",
        listener.local_addr()?
    );

    let closing = Arc::clone(&state);
    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(async move {
            let _ = stop.await;
            if closing.registry.is_empty() {
                info!("shutting down");
            } else {
                let n = closing.registry.broadcast(Control::Shutdown);
                info!("shutting down ({n} sessions closing)");
            }
        })
        .await?;

    info!("server stopped");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
fn shutdown_signal() -> Result<oneshot::Receiver<()>> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let (tx, rx) = oneshot::channel();
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("received signal {sig}");
                let _ = tx.send(());
            }
        })?;
    Ok(rx)
}

/// Watches the profile directory and the active pointer; every settled
/// change re-reads the active profile. A broken file keeps the last good one.
fn watch_profiles(mut store: ConfigStore, state: SharedState) -> Result<RecommendedWatcher> {
    let (tx, rx) = mpsc::channel::<()>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(ev) = res {
            if matches!(
                ev.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                let _ = tx.send(());
            }
        }
    })?;
    watcher.watch(&store.profiles_dir, RecursiveMode::NonRecursive)?;
    watcher.watch(&store.config_dir, RecursiveMode::NonRecursive)?;
    info!("watching {} for profile changes", store.profiles_dir.display());

    thread::Builder::new()
        .name("profile-watch".into())
        .spawn(move || {
            while rx.recv().is_ok() {
                thread::sleep(RELOAD_SETTLE);
                while rx.try_recv().is_ok() {}
                match store.reload() {
                    Ok(()) => state.install_profile(store.profile.clone()),
                    Err(e) => warn!("profile reload failed, keeping last good: {e:#}"),
                }
            }
        })?;
    Ok(watcher)
}

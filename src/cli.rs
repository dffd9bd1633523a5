use anyhow::{Result, anyhow};
use pico_args::Arguments;
use serde::Deserialize;
use std::{env, fs, path::PathBuf};

use crate::classifier::GestureClassifier;
use crate::config::ConfigStore;
use crate::landmarks::{LandmarkSet, normalize};
use crate::server::runtime;
use crate::smoothing::ConfidenceGate;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            match topic {
                Some(t) => print_subcmd_help(&t),
                None => print_help(),
            }
            Ok(())
        }

        Some("serve") => {
            let addr: Option<String> = pargs.opt_value_from_str("--addr")?;
            let profile: Option<String> = pargs.opt_value_from_str("--profile")?;
            let mut store = ConfigStore::load_or_install_default()?;
            if let Some(name) = profile {
                store.set_active(&name)?;
            }
            runtime::serve(store, addr)
        }

        Some("list") => {
            let store = ConfigStore::load_or_install_default()?;
            for name in store.list_profiles() {
                let mark = if name == store.active_name { "*" } else { " " };
                println!("{mark} {name}");
            }
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            let mut store = ConfigStore::load_or_install_default()?;
            store.set_active(&name)?;
            println!("active profile: {}", store.active_name);
            Ok(())
        }

        Some("check") => {
            let store = ConfigStore::load_or_install_default()?;
            let name: String = pargs
                .free_from_str()
                .unwrap_or_else(|_| store.active_name.clone());
            let p = store.peek(&name)?;
            print_json(&serde_json::json!({
                "ok": true,
                "data": {
                    "profile": name,
                    "path": store.profile_path(&name),
                    "strategy": p.classifier.strategy,
                    "labels": p.classifier.labels.len(),
                    "max_fps": p.session.max_fps,
                    "bindings": p.bindings.len(),
                }
            }));
            Ok(())
        }

        Some("doctor") => {
            let store = ConfigStore::load_or_install_default()?;
            print_json(&serde_json::json!({"ok": true, "data": store.doctor_report()}));
            Ok(())
        }

        Some("classify") => {
            let path: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl classify <landmarks.json>"))?;
            let store = ConfigStore::load_or_install_default()?;
            classify_file(&store, &path)
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameFile {
    One(LandmarkSet),
    Many(Vec<LandmarkSet>),
}

/// One JSON line per frame, each classified with the previous frame as
/// context.
fn classify_file(store: &ConfigStore, path: &PathBuf) -> Result<()> {
    let txt = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    let frames = match serde_json::from_str::<FrameFile>(&txt)
        .map_err(|_| anyhow!("{}: expected 21 [x,y,z] points or a list of such frames", path.display()))?
    {
        FrameFile::One(f) => vec![f],
        FrameFile::Many(v) => v,
    };

    let classifier = GestureClassifier::from_profile(&store.profile);
    let gate = ConfidenceGate::new(store.profile.thresholds.confidence);
    let mut previous: Option<LandmarkSet> = None;
    for (i, set) in frames.iter().enumerate() {
        let normalized = normalize(set);
        let c = classifier.classify(&crate::classifier::FrameInput {
            landmarks: set,
            normalized: &normalized,
            previous: previous.as_ref(),
            image: None,
        });
        let passes = !gate.apply(c.clone()).gesture.is_none();
        println!(
            "{}",
            serde_json::json!({
                "frame": i,
                "gesture": c.gesture,
                "confidence": c.confidence,
                "metadata": c.metadata,
                "passes_gate": passes,
            })
        );
        previous = Some(*set);
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"handctl: hand-gesture presentation controller

USAGE:
  handctl help [command]                    Show general or command-specific help
  handctl serve [--addr A] [--profile P]    Run the gesture server
  handctl list                              List profiles
  handctl use <name>                        Switch active profile
  handctl check [name]                      Validate a profile
  handctl doctor                            Diagnose uinput, profiles and model
  handctl classify <landmarks.json>         Classify recorded landmark frames

TIPS:
  - Profiles: ~/.config/handctl/profiles
  - Active profile pointer: ~/.config/handctl/active
  - Gesture socket: ws://<addr>/ws/gesture_control/<presentation_id>
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "serve" => println!(
            "usage: handctl serve [--addr HOST:PORT] [--profile NAME]\nRuns the HTTP/WebSocket server. --profile switches the active profile first.\nEdits to the active profile are picked up live; a broken edit keeps the last good one."
        ),
        "list" => {
            println!("usage: handctl list\nLists available profiles; marks active with '*'.")
        }
        "use" => println!(
            "usage: handctl use <name>\nValidates <name> and makes it the active profile."
        ),
        "check" => println!(
            "usage: handctl check [name]\nParses and validates a profile (default: the active one)."
        ),
        "doctor" => println!(
            "usage: handctl doctor\nReports /dev/uinput, profile paths and whether the configured model exists."
        ),
        "classify" => println!(
            "usage: handctl classify <landmarks.json>\nFile holds one frame (21 [x,y,z] points) or a list of frames.\nPrints one JSON result per frame using the active profile's classifier."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_json(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}

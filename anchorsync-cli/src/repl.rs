//! Line-oriented driver for a running node
//!
//! Stands in for the touch UI: each stdin line is one action, and session
//! events are printed as they arrive.

use anchorsync_core::core_session::{SessionEvent, SessionStatus};
use anchorsync_core::core_tracking::{LimitedReason, TrackingState, WorldMappingStatus};
use anchorsync_core::{Point3, SyncNode};
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

const HELP: &str = "\
commands:
  sketch x1 y1 z1 x2 y2 z2     draw a line segment
  track <state> [mapping]      set tracking (normal, limited, motion,
                               features, relocalizing, unavailable) and
                               mapping (notavailable, limited, extending,
                               mapped)
  interrupt | resume           simulate a session interruption
  save | load | share | reset
  dial host:port
  status | peers | help | quit";

#[derive(Debug, Clone, PartialEq)]
enum ReplCommand {
    Sketch(Point3, Point3),
    Track(TrackingState, Option<WorldMappingStatus>),
    Interrupt,
    Resume,
    Save,
    Load,
    Share,
    Reset,
    Dial(String),
    Status,
    Peers,
    Help,
    Quit,
}

fn parse_tracking(word: &str) -> Result<TrackingState, String> {
    match word {
        "normal" => Ok(TrackingState::Normal),
        "limited" | "initializing" => Ok(TrackingState::Limited(LimitedReason::Initializing)),
        "motion" => Ok(TrackingState::Limited(LimitedReason::ExcessiveMotion)),
        "features" => Ok(TrackingState::Limited(LimitedReason::InsufficientFeatures)),
        "relocalizing" => Ok(TrackingState::Limited(LimitedReason::Relocalizing)),
        "unavailable" | "none" => Ok(TrackingState::NotAvailable),
        other => Err(format!("unknown tracking state '{}'", other)),
    }
}

fn parse_mapping(word: &str) -> Result<WorldMappingStatus, String> {
    match word {
        "notavailable" | "none" => Ok(WorldMappingStatus::NotAvailable),
        "limited" => Ok(WorldMappingStatus::Limited),
        "extending" => Ok(WorldMappingStatus::Extending),
        "mapped" => Ok(WorldMappingStatus::Mapped),
        other => Err(format!("unknown mapping status '{}'", other)),
    }
}

fn parse_command(line: &str) -> Result<ReplCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let rest: Vec<&str> = words.collect();

    let command = match (verb, rest.as_slice()) {
        ("sketch", coords) if coords.len() == 6 => {
            let mut v = [0f32; 6];
            for (slot, word) in v.iter_mut().zip(coords) {
                *slot = word
                    .parse()
                    .map_err(|_| format!("'{}' is not a number", word))?;
            }
            ReplCommand::Sketch(Point3::new(v[0], v[1], v[2]), Point3::new(v[3], v[4], v[5]))
        }
        ("sketch", _) => return Err("sketch takes six coordinates".to_string()),
        ("track", [state]) => ReplCommand::Track(parse_tracking(state)?, None),
        ("track", [state, mapping]) => {
            ReplCommand::Track(parse_tracking(state)?, Some(parse_mapping(mapping)?))
        }
        ("track", _) => return Err("usage: track <state> [mapping]".to_string()),
        ("dial", [addr]) => ReplCommand::Dial(addr.to_string()),
        ("interrupt", []) => ReplCommand::Interrupt,
        ("resume", []) => ReplCommand::Resume,
        ("save", []) => ReplCommand::Save,
        ("load", []) => ReplCommand::Load,
        ("share", []) => ReplCommand::Share,
        ("reset", []) => ReplCommand::Reset,
        ("status", []) => ReplCommand::Status,
        ("peers", []) => ReplCommand::Peers,
        ("help", _) => ReplCommand::Help,
        ("quit", []) | ("exit", []) => ReplCommand::Quit,
        (other, _) => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(command)
}

fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::StateChanged(state) => format!("state: {}", state),
        SessionEvent::SketchAvailability(enabled) => {
            format!("sketching {}", if *enabled { "enabled" } else { "disabled" })
        }
        SessionEvent::SaveAvailability(enabled) => {
            format!("save {}", if *enabled { "available" } else { "unavailable" })
        }
        SessionEvent::StatusText(text) => text.replace('\n', " | "),
        SessionEvent::Message(text) => text.clone(),
        SessionEvent::AnchorAdded { anchor, origin } => {
            format!("anchor {} added ({:?})", anchor.name, origin)
        }
        SessionEvent::AnchorDropped { from, name, reason } => {
            format!("anchor {} from {} dropped: {}", name, from, reason.as_str())
        }
        SessionEvent::AnchorsCleared => "anchors cleared".to_string(),
        SessionEvent::MapApplied { source, anchors } => {
            format!("applied map from {} with {} anchors", source, anchors)
        }
        SessionEvent::ExperienceSaved { anchors, size } => {
            format!("saved map: {} anchors, {} bytes", anchors, size)
        }
        SessionEvent::WorldMapShared { peers, size } => {
            format!("shared map ({} bytes) with {} peers", size, peers)
        }
        SessionEvent::PeerJoined(info) => format!("{} joined", info),
        SessionEvent::PeerLeft(id) => format!("{} left", id),
        SessionEvent::Alert { title, message } => format!("[{}] {}", title, message),
        SessionEvent::Fatal(reason) => format!("FATAL: {}", reason),
    }
}

fn print_status(status: &SessionStatus) {
    println!("state: {}", status.state);
    println!("{}", status.tracking.status_text());
    println!(
        "anchors: {}  snapshot: {}  maps decoding: {}  save: {}",
        status.anchors.len(),
        status.has_snapshot,
        status.maps_in_flight,
        status.save_available
    );
    for entry in &status.anchors {
        let p = entry.anchor.transform.position();
        println!(
            "  {} ({:?}) at ({:.3}, {:.3}, {:.3})",
            entry.anchor.name, entry.origin, p.x, p.y, p.z
        );
    }
}

/// Read commands until `quit`, end of input, or a fatal session error
pub async fn run(node: &SyncNode) -> Result<()> {
    let session = node.session();
    let mut events = session.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    println!("* {}", describe_event(&event));
                    if matches!(event, SessionEvent::Fatal(_)) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => println!("* ({} events skipped)", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let tracking = node.tracking();
        let outcome: Result<(), String> = match command {
            ReplCommand::Sketch(src, dst) => session
                .sketch(src, dst)
                .await
                .map(|anchor| println!("placed {}", anchor.name))
                .map_err(|e| e.to_string()),
            ReplCommand::Track(state, mapping) => {
                tracking.set_status(state, mapping).await;
                Ok(())
            }
            ReplCommand::Interrupt => {
                tracking.interrupt().await;
                Ok(())
            }
            ReplCommand::Resume => {
                tracking.resume().await;
                Ok(())
            }
            ReplCommand::Save => session
                .save_experience()
                .await
                .map(|path| println!("saved to {}", path.display()))
                .map_err(|e| e.to_string()),
            ReplCommand::Load => session.load_experience().await.map_err(|e| e.to_string()),
            ReplCommand::Share => session
                .share_world_map()
                .await
                .map(|peers| println!("sent to {} peers", peers))
                .map_err(|e| e.to_string()),
            ReplCommand::Reset => session.reset().await.map_err(|e| e.to_string()),
            ReplCommand::Dial(addr) => node
                .dial(addr)
                .await
                .map(|info| println!("connected to {}", info))
                .map_err(|e| e.to_string()),
            ReplCommand::Status => session
                .status()
                .await
                .map(|status| print_status(&status))
                .map_err(|e| e.to_string()),
            ReplCommand::Peers => session
                .status()
                .await
                .map(|status| {
                    for peer in &status.peers {
                        println!("  {}", peer);
                    }
                })
                .map_err(|e| e.to_string()),
            ReplCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            ReplCommand::Quit => break,
        };

        if let Err(e) = outcome {
            println!("error: {}", e);
        }
        if printer.is_finished() {
            break;
        }
    }

    printer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sketch() {
        assert_eq!(
            parse_command("sketch 0 0 -0.1 0.05 0 -0.1"),
            Ok(ReplCommand::Sketch(
                Point3::new(0.0, 0.0, -0.1),
                Point3::new(0.05, 0.0, -0.1)
            ))
        );
        assert!(parse_command("sketch 1 2 3").is_err());
        assert!(parse_command("sketch a b c d e f").is_err());
    }

    #[test]
    fn test_parse_track() {
        assert_eq!(
            parse_command("track normal mapped"),
            Ok(ReplCommand::Track(TrackingState::Normal, Some(WorldMappingStatus::Mapped)))
        );
        assert_eq!(
            parse_command("track motion"),
            Ok(ReplCommand::Track(
                TrackingState::Limited(LimitedReason::ExcessiveMotion),
                None
            ))
        );
        assert!(parse_command("track sideways").is_err());
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("  save "), Ok(ReplCommand::Save));
        assert_eq!(parse_command("exit"), Ok(ReplCommand::Quit));
        assert_eq!(
            parse_command("dial 10.0.0.2:7420"),
            Ok(ReplCommand::Dial("10.0.0.2:7420".to_string()))
        );
        assert!(parse_command("teleport").is_err());
        assert!(parse_command("").is_err());
    }

    #[test]
    fn test_status_text_flattened() {
        let event = SessionEvent::StatusText("Mapping: Mapped\nTracking: Normal".to_string());
        assert_eq!(describe_event(&event), "Mapping: Mapped | Tracking: Normal");
    }
}

//! area-tile
//!
//! Host for the window manager core: loads configuration, installs a small
//! default policy (focus follows pointer, click to focus, drag chord moves a
//! window, key bindings spawn commands) and runs the event loop until a
//! signal or a fatal protocol error.

use std::cell::Cell;
use std::collections::HashMap;
use std::process::Stdio;
use std::rc::Rc;

use anyhow::Result;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use area_tile::config::Config;
use area_tile::wm::focus::DragChord;
use area_tile::x11::Modifiers;
use area_tile::{ClientId, EventKind, Notification, WindowManager, X11Conn};

/// Modifier bits that never distinguish a binding
const IGNORED_MODIFIERS: Modifiers = Modifiers::LOCK.union(Modifiers::MOD2);

/// Client being dragged and its position when the drag began
#[derive(Debug, Clone, Copy)]
struct Dragged {
    id: ClientId,
    x: i32,
    y: i32,
}

fn relevant(state: u16) -> Modifiers {
    Modifiers::from_bits_truncate(state) - IGNORED_MODIFIERS
}

/// Start `command` through the shell. The child is not awaited; tokio reaps
/// it in the background once it exits.
fn spawn_command(command: &str) -> std::io::Result<Child> {
    Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .spawn()
}

fn spawn(command: &str) {
    info!("Spawning: {}", command);
    if let Err(e) = spawn_command(command) {
        warn!("Failed to spawn {:?}: {}", command, e);
    }
}

fn install_policy(
    wm: &mut WindowManager<X11Conn>,
    chord: DragChord,
    commands: HashMap<(Modifiers, u32), String>,
) {
    for kind in [EventKind::Add, EventKind::Remove, EventKind::Rearrange] {
        wm.on_kind(kind, move |_, n| match serde_json::to_string(n) {
            Ok(payload) => debug!("{}: {}", kind.name(), payload),
            Err(e) => warn!("Failed to encode {} payload: {}", kind.name(), e),
        });
    }

    wm.on("enterNotify", |wm, n| {
        if let Notification::EnterNotify(p) = n {
            wm.focus(Some(p.id));
        }
    });

    let dragged: Rc<Cell<Option<Dragged>>> = Rc::default();

    let start = dragged.clone();
    wm.on("buttonPress", move |wm, n| {
        let Notification::ButtonPress(p) = n else {
            return;
        };
        wm.focus(Some(p.id));
        if p.button != chord.button || !relevant(p.state).contains(chord.modifiers) {
            return;
        }
        if let Some(client) = wm.client(p.id) {
            start.set(Some(Dragged {
                id: p.id,
                x: client.geometry.x,
                y: client.geometry.y,
            }));
            wm.begin_drag();
        }
    });

    wm.on("mouseDrag", move |wm, n| {
        let (Notification::MouseDrag(d), Some(target)) = (n, dragged.get()) else {
            return;
        };
        wm.move_window(
            target.id,
            target.x + d.move_x - d.x,
            target.y + d.move_y - d.y,
        );
    });

    wm.on("keyPress", move |_, n| {
        if let Notification::KeyPress(k) = n {
            if let Some(command) = commands.get(&(relevant(k.modifiers), k.keysym)) {
                spawn(command);
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, load_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting area-tile");
    if let Some(e) = load_error {
        warn!("Using default configuration: {:#}", e);
    }

    let options = config.options()?;
    let commands: HashMap<(Modifiers, u32), String> = config
        .resolved_bindings()?
        .into_iter()
        .filter_map(|resolved| {
            let key = (resolved.binding.modifiers - IGNORED_MODIFIERS, resolved.binding.keysym);
            resolved.command.map(|command| (key, command))
        })
        .collect();
    let chord = options.drag_chord;

    let conn = X11Conn::connect(None)?;
    let mut wm = WindowManager::new(conn, options);
    install_policy(&mut wm, chord, commands);

    let screen = wm.setup()?;
    info!("Screen {}x{}", screen.width, screen.height);
    let adopted = wm.scan()?;
    info!("Managing {} existing windows", adopted);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Handle SIGTERM and SIGINT
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    let _ = tx.send(()).await;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    let _ = tx.send(()).await;
                }
            }
        });
    }

    tokio::select! {
        result = wm.run(config.fallback_poll()) => {
            if let Err(e) = result {
                error!("Window manager stopped: {:#}", e);
                return Err(e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_modifiers_do_not_matter() {
        let state = (Modifiers::MOD4 | Modifiers::LOCK | Modifiers::MOD2).bits();
        assert_eq!(relevant(state), Modifiers::MOD4);
    }

    #[tokio::test]
    async fn test_spawned_command_is_reaped() {
        let mut child = spawn_command("exit 3").unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
        assert!(child.try_wait().unwrap().is_some());
    }
}

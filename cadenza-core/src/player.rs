//! The player event loop: one task owning the session and serializing every
//! command, transport callback and metadata result.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::library::{LibraryIndex, Song};
use crate::session::{PlaybackSession, ResolvedMetadata};
use crate::transport::{Transport, TransportEvent};

const LOG_TARGET: &str = "cadenza::player";

/// User-facing operations, applied in the order received
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    TogglePlayPause,
    Next,
    Previous,
    Select(Song),
    SelectIndex(usize),
    ShowPlaylist(String),
    SetVolume(f32),
    ToggleMute,
    ToggleShuffle,
    ToggleRepeat,
    ToggleSingleRepeat,
    Seek(u64),
    SeekFraction(f64),
    /// Re-resolve the current song with the next search candidate
    RefreshMetadata,
    /// Rescan the library and reload the session against it
    Rescan,
}

/// Sending side of a running [`Player`]
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<PlayerCommand>,
    transport_events: mpsc::UnboundedSender<TransportEvent>,
}

impl PlayerHandle {
    /// Queue a command for the player loop
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the player has stopped.
    pub fn send(&self, command: PlayerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| CoreError::invalid("player has stopped"))
    }

    /// Forward a transport callback to the player loop
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the player has stopped.
    pub fn transport_event(&self, event: TransportEvent) -> Result<()> {
        self.transport_events
            .send(event)
            .map_err(|_| CoreError::invalid("player has stopped"))
    }

    /// Convenience for a transport's position callback
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the player has stopped.
    pub fn position_changed(&self, source: PathBuf, position_ms: u64) -> Result<()> {
        self.transport_event(TransportEvent::PositionChanged {
            source,
            position_ms,
        })
    }
}

pub struct Player<T: Transport> {
    session: PlaybackSession<T>,
    library: Arc<LibraryIndex>,
    commands: mpsc::UnboundedReceiver<PlayerCommand>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    resolved: mpsc::UnboundedReceiver<ResolvedMetadata>,
    cancel_token: CancellationToken,
}

impl<T: Transport + 'static> Player<T> {
    /// Create a player around `session`.
    ///
    /// `resolved` is the receiving side of the channel the metadata fetcher
    /// answers on.
    #[must_use]
    pub fn new(
        session: PlaybackSession<T>,
        library: Arc<LibraryIndex>,
        resolved: mpsc::UnboundedReceiver<ResolvedMetadata>,
        cancel_token: Option<CancellationToken>,
    ) -> (Self, PlayerHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (event_tx, transport_events) = mpsc::unbounded_channel();

        let player = Self {
            session,
            library,
            commands,
            transport_events,
            resolved,
            cancel_token: cancel_token.unwrap_or_default(),
        };
        let handle = PlayerHandle {
            commands: command_tx,
            transport_events: event_tx,
        };
        (player, handle)
    }

    #[must_use]
    pub const fn session(&self) -> &PlaybackSession<T> {
        &self.session
    }

    /// Get a clone of the cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Start the loop in a background task; the session is handed back on exit
    #[must_use]
    pub fn start(self) -> tokio::task::JoinHandle<PlaybackSession<T>> {
        tokio::spawn(self.run())
    }

    /// Load the library, then process input until cancelled or every handle is dropped
    pub async fn run(mut self) -> PlaybackSession<T> {
        info!(target: LOG_TARGET, "Starting player for {:?}", self.library.root());
        self.session.load(self.library.catalog());

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: LOG_TARGET, "Player shutting down");
                    break;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if let Err(e) = self.handle_command(command).await {
                        warn!(target: LOG_TARGET, "Command rejected: {}", e);
                    }
                }
                Some(event) = self.transport_events.recv() => {
                    self.session.on_transport_event(event);
                }
                Some(resolved) = self.resolved.recv() => {
                    self.session.apply_metadata(resolved);
                }
            }
        }

        self.session
    }

    async fn handle_command(&mut self, command: PlayerCommand) -> Result<()> {
        let session = &mut self.session;
        match command {
            PlayerCommand::Play => session.play(),
            PlayerCommand::Pause => session.pause(),
            PlayerCommand::TogglePlayPause => session.toggle_play_pause(),
            PlayerCommand::Next => session.next(),
            PlayerCommand::Previous => session.previous(),
            PlayerCommand::Select(song) => session.select(&song),
            PlayerCommand::SelectIndex(index) => session.select_index(index),
            PlayerCommand::ShowPlaylist(name) => session.show_playlist(&name),
            PlayerCommand::SetVolume(volume) => session.set_volume(volume).map(|_| ()),
            PlayerCommand::ToggleMute => {
                session.toggle_mute();
                Ok(())
            }
            PlayerCommand::ToggleShuffle => {
                session.toggle_shuffle();
                Ok(())
            }
            PlayerCommand::ToggleRepeat => {
                session.toggle_repeat();
                Ok(())
            }
            PlayerCommand::ToggleSingleRepeat => {
                session.toggle_single_repeat();
                Ok(())
            }
            PlayerCommand::Seek(position_ms) => session.seek(position_ms).map(|_| ()),
            PlayerCommand::SeekFraction(fraction) => session.seek_fraction(fraction).map(|_| ()),
            PlayerCommand::RefreshMetadata => session.refresh_metadata().map(|_| ()),
            PlayerCommand::Rescan => {
                let library = Arc::clone(&self.library);
                let catalog = tokio::task::spawn_blocking(move || library.rescan())
                    .await
                    .map_err(|e| CoreError::invalid(format!("rescan task failed: {e}")))?;
                session.load(catalog);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MusicConfig;
    use crate::events::SessionEvent;
    use crate::fetcher::MetadataFetcher;
    use crate::metadata::{MetadataOrigin, MetadataStore};
    use crate::provider::MetadataProvider;
    use crate::resume::ResumeStore;
    use crate::session::PlayerStatus;
    use crate::tags::TagStore;
    use crate::testing::{MemoryTagStore, ScriptedProvider};
    use crate::transport::NullTransport;
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct Harness {
        _dir: tempfile::TempDir,
        root: PathBuf,
        handle: PlayerHandle,
        events: broadcast::Receiver<SessionEvent>,
        cancel: CancellationToken,
        join: tokio::task::JoinHandle<PlaybackSession<NullTransport>>,
    }

    fn touch(path: &std::path::Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"audio").unwrap();
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("music");
        touch(&root.join("A/1.mp3"));
        touch(&root.join("A/2.mp3"));
        touch(&root.join("B/3.mp3"));

        let music = MusicConfig {
            music_dir: root.clone(),
            save_lyrics_sidecar: false,
            ..MusicConfig::default()
        };
        let cancel = CancellationToken::new();

        let store = Arc::new(MetadataStore::new(
            Arc::new(MemoryTagStore::default()) as Arc<dyn TagStore>,
            Arc::new(ScriptedProvider::with_candidates(2)) as Arc<dyn MetadataProvider>,
            &music,
        ));
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let _fetcher = MetadataFetcher::new(store, Some(cancel.clone())).start(request_rx, result_tx);

        let session = PlaybackSession::new(
            NullTransport::default(),
            ResumeStore::open(dir.path().join("settings.json")),
            &music,
            request_tx,
        );
        let events = session.subscribe();
        let library = Arc::new(LibraryIndex::open(&root));
        let (player, handle) = Player::new(session, library, result_rx, Some(cancel.clone()));

        Harness {
            _dir: dir,
            root,
            handle,
            events,
            cancel,
            join: player.start(),
        }
    }

    async fn wait_for<F>(events: &mut broadcast::Receiver<SessionEvent>, mut matches: F) -> SessionEvent
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.unwrap();
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    fn resolved_title(event: &SessionEvent) -> Option<&str> {
        match event {
            SessionEvent::NowPlayingUpdated { now_playing }
                if now_playing.origin == MetadataOrigin::Remote =>
            {
                Some(now_playing.title.as_str())
            }
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_commands_flow_through_session() {
        let mut h = harness();

        let event = wait_for(&mut h.events, |e| resolved_title(e).is_some()).await;
        assert_eq!(resolved_title(&event), Some("Title 0"));

        h.handle.send(PlayerCommand::Next).unwrap();
        let event = wait_for(&mut h.events, |e| matches!(e, SessionEvent::SongChanged { .. })).await;
        assert!(matches!(event, SessionEvent::SongChanged { index: 1, .. }));
        wait_for(&mut h.events, |e| resolved_title(e).is_some()).await;

        h.handle.send(PlayerCommand::ShowPlaylist("Missing".into())).unwrap();
        h.handle.send(PlayerCommand::SetVolume(0.873)).unwrap();
        let event = wait_for(&mut h.events, |e| matches!(e, SessionEvent::VolumeChanged { .. })).await;
        assert!(matches!(event, SessionEvent::VolumeChanged { volume, .. } if (volume - 0.87).abs() < f32::EPSILON));

        h.cancel.cancel();
        let session = h.join.await.unwrap();
        assert_eq!(session.state().current_index, 1);
        assert_eq!(session.status(), PlayerStatus::Playing);
        assert_eq!(session.now_playing().unwrap().origin, MetadataOrigin::Remote);
    }

    #[tokio::test]
    async fn test_position_events_are_serialized_with_commands() {
        let mut h = harness();
        wait_for(&mut h.events, |e| resolved_title(e).is_some()).await;

        let source = h.root.join("A/1.mp3");
        h.handle.position_changed(source, 1_500).unwrap();
        let event = wait_for(&mut h.events, |e| matches!(e, SessionEvent::PositionChanged { .. })).await;
        assert_eq!(event, SessionEvent::PositionChanged { position_ms: 1_500 });

        h.cancel.cancel();
        let session = h.join.await.unwrap();
        assert_eq!(session.state().position_ms, 1_500);
    }

    #[tokio::test]
    async fn test_rescan_reloads_catalog() {
        let mut h = harness();
        wait_for(&mut h.events, |e| resolved_title(e).is_some()).await;

        touch(&h.root.join("C/4.mp3"));
        h.handle.send(PlayerCommand::Rescan).unwrap();

        let event = wait_for(&mut h.events, |e| matches!(e, SessionEvent::LibraryLoaded { .. })).await;
        let SessionEvent::LibraryLoaded { playlists, songs } = event else {
            unreachable!()
        };
        assert_eq!(songs, 4);
        assert!(playlists.iter().any(|p| p == "C"));

        drop(h.handle);
        let session = h.join.await.unwrap();
        assert_eq!(session.catalog().len(), 4);
    }
}

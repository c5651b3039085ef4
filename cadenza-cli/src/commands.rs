//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cadenza_core::library::try_scan;
use cadenza_core::lrc::format_time;
use cadenza_core::{
    CadenzaConfig, CoreError, DisplayLyrics, Id3TagStore, LibraryIndex, MetadataFetcher,
    MetadataProvider, MetadataStore, NowPlaying, NullTransport, PlaybackSession, Player,
    ResumeStore, SessionEvent, Song, TagStore,
};
use cadenza_metadata_timeless::TimelessProvider;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::Command;

/// Lyric lines printed before and after the active one
const LYRICS_CONTEXT_LINES: usize = 3;

pub async fn run(command: Command, config: &CadenzaConfig) -> Result<(), CoreError> {
    match command {
        Command::Playlists { songs } => playlists(&config.music.music_root(), songs).await,
        Command::Resolve { file, next } => resolve(config, &file, next).await,
        Command::Lyrics { file, at } => lyrics(&file, at).await,
        Command::Resume { wait } => resume(config, Duration::from_secs(wait)).await,
    }
}

async fn playlists(root: &Path, with_songs: bool) -> Result<(), CoreError> {
    let scan_root = root.to_path_buf();
    let catalog = tokio::task::spawn_blocking(move || try_scan(&scan_root))
        .await
        .map_err(join_error)??;

    if catalog.is_empty() {
        println!("No songs found under {}", root.display());
        return Ok(());
    }

    println!("{} song(s) under {}", catalog.len(), root.display());
    for playlist in catalog.playlists() {
        println!("{} ({})", playlist.name, playlist.songs.len());
        if with_songs {
            for song in &playlist.songs {
                println!("    {}", song.display_name);
            }
        }
    }
    Ok(())
}

fn metadata_store(config: &CadenzaConfig) -> Result<Arc<MetadataStore>, CoreError> {
    let provider = TimelessProvider::new(&config.provider)?;
    info!("Using metadata provider: {}", provider.name());
    Ok(Arc::new(MetadataStore::new(
        Arc::new(Id3TagStore),
        Arc::new(provider),
        &config.music,
    )))
}

async fn resolve(config: &CadenzaConfig, file: &Path, next: bool) -> Result<(), CoreError> {
    let song = Song::from_path(std::path::absolute(file)?);
    let store = metadata_store(config)?;
    let resolution = store.try_resolve(&song, next).await?;
    let metadata = resolution.metadata;

    println!("File:   {}", song.path.display());
    println!("Title:  {}", metadata.title);
    println!("Artist: {}", metadata.artist);
    println!("Album:  {}", metadata.album);
    println!("Cover:  {}", metadata.cover_or(&config.music.default_cover));
    if let Some(source_ref) = &metadata.source_ref {
        println!("Source: {source_ref}");
    }
    let lyrics = metadata.display_lyrics();
    println!(
        "Lyrics: {}",
        if lyrics.is_found() { "found" } else { "none" }
    );
    println!("Origin: {:?}", resolution.origin);
    Ok(())
}

async fn lyrics(file: &Path, at_ms: u64) -> Result<(), CoreError> {
    let path = std::path::absolute(file)?;
    if !tokio::fs::try_exists(&path).await? {
        return Err(CoreError::SongNotFound { path });
    }

    let tag_path = path.clone();
    let tags = tokio::task::spawn_blocking(move || Id3TagStore.read(&tag_path))
        .await
        .map_err(join_error)??;

    let raw = match tags.lyrics {
        Some(raw) => Some(raw),
        None => read_sidecar(&path).await,
    };
    let lyrics = DisplayLyrics::from_raw(raw.as_deref());
    print_lyrics(&lyrics, at_ms);
    Ok(())
}

async fn read_sidecar(song_path: &Path) -> Option<String> {
    let sidecar = song_path.with_extension("lrc");
    match tokio::fs::read_to_string(&sidecar).await {
        Ok(raw) => Some(raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Failed to read {:?}: {}", sidecar, e);
            None
        }
    }
}

fn print_lyrics(lyrics: &DisplayLyrics, at_ms: u64) {
    let active = lyrics.active_line(at_ms);
    println!("[{}]", format_time(at_ms));
    let window = lyrics.window(active, LYRICS_CONTEXT_LINES, LYRICS_CONTEXT_LINES);
    let first = active.saturating_sub(LYRICS_CONTEXT_LINES);
    for (offset, line) in window.iter().enumerate() {
        if line.text.is_empty() {
            continue;
        }
        let marker = if first + offset == active { ">" } else { " " };
        println!("{marker} {}", line.text);
    }
}

async fn resume(config: &CadenzaConfig, wait: Duration) -> Result<(), CoreError> {
    let root = config.music.music_root();
    let library = tokio::task::spawn_blocking(move || LibraryIndex::open(root))
        .await
        .map_err(join_error)?;
    let library = Arc::new(library);

    let settings_path = cadenza_core::paths::settings_path();
    let resume_store = ResumeStore::open(&settings_path);

    let cancel_token = CancellationToken::new();
    let (resolve_tx, resolve_rx) = mpsc::unbounded_channel();
    let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();

    let session = PlaybackSession::new(
        NullTransport::default(),
        resume_store,
        &config.music,
        resolve_tx,
    );
    let mut events = session.subscribe();

    let fetcher = MetadataFetcher::new(metadata_store(config)?, Some(cancel_token.clone()));
    let fetcher_task = fetcher.start(resolve_rx, resolved_tx);

    let (player, handle) = Player::new(
        session,
        Arc::clone(&library),
        resolved_rx,
        Some(cancel_token.clone()),
    );
    let player_task = player.start();

    let mut latest = None;
    tokio::select! {
        () = wait_for_metadata(&mut events, &mut latest) => {}
        () = tokio::time::sleep(wait) => {
            warn!("Metadata did not arrive within {:?}", wait);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    cancel_token.cancel();
    drop(handle);
    let session = player_task.await.map_err(join_error)?;
    fetcher_task.await.map_err(join_error)?;
    session.resume().flush()?;

    let state = session.state();
    let Some(song) = &state.now_playing else {
        println!("Nothing to resume: no songs under {}", library.root().display());
        return Ok(());
    };

    println!("Playlist: {}", state.playback_playlist);
    println!("Song:     {}", song.path.display());
    println!("Position: {}", format_time(state.position_ms));
    println!("Status:   {:?}", state.status);
    println!(
        "Modes:    shuffle={} repeat={} single_repeat={}",
        state.modes.shuffle, state.modes.repeat, state.modes.single_repeat
    );
    println!("Volume:   {:.2}", state.volume);

    if let Some(view) = latest.as_ref().or(session.now_playing()) {
        println!("Title:    {}", view.title);
        println!("Artist:   {}", view.artist);
        println!("Album:    {}", view.album);
        println!("Cover:    {}", view.cover);
        println!("Origin:   {:?}", view.origin);
        print_lyrics(&view.lyrics, state.position_ms);
    }
    Ok(())
}

/// Wait until the resolved metadata for the restored song arrives.
///
/// The first `NowPlayingUpdated` after load is the filename placeholder; the
/// second carries the resolution.
async fn wait_for_metadata(
    events: &mut broadcast::Receiver<SessionEvent>,
    latest: &mut Option<NowPlaying>,
) {
    let mut updates = 0;
    loop {
        match events.recv().await {
            Ok(SessionEvent::LibraryLoaded { songs: 0, .. }) => return,
            Ok(SessionEvent::NowPlayingUpdated { now_playing }) => {
                *latest = Some(*now_playing);
                updates += 1;
                if updates >= 2 {
                    return;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Missed {} session event(s)", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> CoreError {
    CoreError::InvalidOperation {
        reason: format!("background task failed: {e}"),
    }
}

//! Command-line argument parsing for Cadenza.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cadenza - local music library player engine.
#[derive(Parser, Debug)]
#[command(name = "cadenza")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Music root to use instead of `music.music_dir` from the config.
    #[arg(short, long, global = true)]
    pub music_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List discovered playlists and their songs.
    Playlists {
        /// Also print every song under its playlist.
        #[arg(short, long)]
        songs: bool,
    },

    /// Resolve title, artist, album, cover and lyrics for a song.
    Resolve {
        file: PathBuf,

        /// Skip the embedded tags and take the next search result.
        #[arg(short, long)]
        next: bool,
    },

    /// Print the lyrics around a playback position.
    Lyrics {
        file: PathBuf,

        /// Position in milliseconds.
        #[arg(short, long, default_value_t = 0)]
        at: u64,
    },

    /// Restore the saved session and show what would resume playing.
    Resume {
        /// Seconds to wait for remote metadata.
        #[arg(short, long, default_value_t = 30)]
        wait: u64,
    },
}

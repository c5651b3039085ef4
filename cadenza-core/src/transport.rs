use std::path::{Path, PathBuf};

/// Audio output the session drives. Decoding is entirely the implementor's concern.
pub trait Transport: Send {
    /// Load `path` as the current source, replacing the previous one
    fn set_source(&mut self, path: &Path);

    fn play(&mut self);

    fn pause(&mut self);

    /// Jump to `position_ms` within the current source
    fn seek(&mut self, position_ms: u64);

    /// Length of the current source, once known
    fn duration_ms(&self) -> Option<u64>;

    fn position_ms(&self) -> u64;

    /// Output volume in `[0, 1]`
    fn set_volume(&mut self, volume: f32);
}

/// Callbacks from the transport, tagged with the source they were issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    PositionChanged { source: PathBuf, position_ms: u64 },
    /// The source played to its end
    Completed { source: PathBuf },
}

impl TransportEvent {
    #[must_use]
    pub fn source(&self) -> &Path {
        match self {
            Self::PositionChanged { source, .. } | Self::Completed { source } => source,
        }
    }
}

/// Transport that produces no sound, tracking position and source only
#[derive(Debug, Clone, Default)]
pub struct NullTransport {
    source: Option<PathBuf>,
    position_ms: u64,
    playing: bool,
    volume: f32,
}

impl NullTransport {
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    #[must_use]
    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    #[must_use]
    pub const fn volume(&self) -> f32 {
        self.volume
    }
}

impl Transport for NullTransport {
    fn set_source(&mut self, path: &Path) {
        self.source = Some(path.to_path_buf());
        self.position_ms = 0;
        self.playing = false;
    }

    fn play(&mut self) {
        self.playing = self.source.is_some();
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn seek(&mut self, position_ms: u64) {
        self.position_ms = position_ms;
    }

    fn duration_ms(&self) -> Option<u64> {
        None
    }

    fn position_ms(&self) -> u64 {
        self.position_ms
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}

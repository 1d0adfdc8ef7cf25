//! Player state driven by the main loop
//!
//! There is no audio output; the player tracks the playlist, transport state
//! and volume, and synthesizes peak levels while playing.

use lark_core::rpc::{AudioPeaks, CommandError, PlaybackState, RpcResult};
use log::*;

pub const MAX_VOLUME: u8 = 100;

/// Operations the RPC modules ask the main loop to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Play(Vec<String>),
    Pause,
    Resume,
    Stop,
    Next,
    Previous,
    GetState,
    GetVolume,
    SetVolume(u8),
    GetPeaks,
    Count,
    Add(Vec<String>),
    Clear,
    Items,
    GetCurrent,
    GetLyricsLine,
    SetLyricsLine(String),
}

#[derive(Debug, Default)]
pub struct Player {
    playlist: Vec<String>,
    current: Option<usize>,
    state: PlaybackState,
    volume: u8,
    lyrics_line: Option<String>,
    ticks: u64,
}

impl Player {
    pub fn new(volume: u8) -> Self {
        Self {
            volume: volume.min(MAX_VOLUME),
            ..Default::default()
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn playlist(&self) -> &[String] {
        &self.playlist
    }

    pub fn current(&self) -> Option<&str> {
        self.current
            .and_then(|i| self.playlist.get(i))
            .map(String::as_str)
    }

    /// Replaces the playlist with `uris` (if any) and starts playing
    pub fn play(&mut self, uris: Vec<String>) -> Result<(), CommandError> {
        if !uris.is_empty() {
            self.playlist = uris;
            self.current = Some(0);
        }
        if self.playlist.is_empty() {
            return Err(CommandError::failed("playlist is empty"));
        }
        let index = *self.current.get_or_insert(0);
        self.start(index);
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Playing;
        }
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.lyrics_line = None;
    }

    /// Wraps around at the end of the playlist
    pub fn next(&mut self) {
        if self.playlist.is_empty() {
            return;
        }
        let index = self.current.map_or(0, |i| (i + 1) % self.playlist.len());
        self.select(index);
    }

    /// Wraps around at the start of the playlist
    pub fn previous(&mut self) {
        if self.playlist.is_empty() {
            return;
        }
        let len = self.playlist.len();
        let index = self.current.map_or(len - 1, |i| (i + len - 1) % len);
        self.select(index);
    }

    pub fn set_volume(&mut self, volume: u8) -> Result<(), CommandError> {
        if volume > MAX_VOLUME {
            return Err(CommandError::failed(format!(
                "volume {} is out of range 0-{}",
                volume, MAX_VOLUME
            )));
        }
        self.volume = volume;
        Ok(())
    }

    /// Appends to the playlist and returns the new length
    pub fn add(&mut self, uris: Vec<String>) -> usize {
        self.playlist.extend(uris);
        self.playlist.len()
    }

    pub fn clear(&mut self) {
        self.playlist.clear();
        self.current = None;
        self.stop();
    }

    pub fn peaks(&self) -> AudioPeaks {
        if self.state != PlaybackState::Playing {
            return AudioPeaks::default();
        }
        let scale = f32::from(self.volume) / f32::from(MAX_VOLUME);
        let phase = (self.ticks % 20) as f32 / 20.0;
        AudioPeaks {
            left: scale * (0.5 + 0.5 * phase),
            right: scale * (1.0 - 0.5 * phase),
        }
    }

    /// Advances the synthesized meter
    pub fn tick(&mut self) {
        if self.state == PlaybackState::Playing {
            self.ticks = self.ticks.wrapping_add(1);
        }
    }

    pub fn apply(&mut self, command: PlayerCommand) -> Result<RpcResult, CommandError> {
        Ok(match command {
            PlayerCommand::Play(uris) => self.play(uris)?.into(),
            PlayerCommand::Pause => self.pause().into(),
            PlayerCommand::Resume => self.resume().into(),
            PlayerCommand::Stop => self.stop().into(),
            PlayerCommand::Next => self.next().into(),
            PlayerCommand::Previous => self.previous().into(),
            PlayerCommand::GetState => self.state.into(),
            PlayerCommand::GetVolume => self.volume.into(),
            PlayerCommand::SetVolume(volume) => self.set_volume(volume)?.into(),
            PlayerCommand::GetPeaks => self.peaks().into(),
            PlayerCommand::Count => self.playlist.len().into(),
            PlayerCommand::Add(uris) => self.add(uris).into(),
            PlayerCommand::Clear => self.clear().into(),
            PlayerCommand::Items => self.playlist.clone().into(),
            PlayerCommand::GetCurrent => self.current().into(),
            PlayerCommand::GetLyricsLine => self.lyrics_line.clone().into(),
            PlayerCommand::SetLyricsLine(line) => {
                self.lyrics_line = Some(line);
                RpcResult::None
            }
        })
    }

    fn select(&mut self, index: usize) {
        self.current = Some(index);
        self.lyrics_line = None;
        if self.state != PlaybackState::Stopped {
            self.start(index);
        }
    }

    fn start(&mut self, index: usize) {
        self.state = PlaybackState::Playing;
        self.ticks = 0;
        info!("Playing {}", self.playlist[index]);
    }
}

//! Typed wrappers over [`RpcClient`] for the player's modules

use super::client::{ClientError, RpcClient};
use super::names::{lyrics, playback, playlist, software};
use super::types::{AudioPeaks, PlaybackState, RpcResult};

fn optional_text(result: RpcResult) -> Option<Option<String>> {
    match result {
        RpcResult::None => Some(None),
        other => other.into_text().map(Some),
    }
}

/// `Software` module
pub struct SoftwareProxy<'a> {
    client: &'a mut RpcClient,
}

impl<'a> SoftwareProxy<'a> {
    pub fn new(client: &'a mut RpcClient) -> Self {
        Self { client }
    }

    pub fn is_running(&mut self) -> Result<bool, ClientError> {
        self.client.invoke_as(
            software::MODULE,
            software::IS_RUNNING,
            vec![],
            "boolean",
            RpcResult::into_bool,
        )
    }

    pub fn version(&mut self) -> Result<String, ClientError> {
        self.client.invoke_as(
            software::MODULE,
            software::GET_VERSION,
            vec![],
            "text",
            RpcResult::into_text,
        )
    }

    /// Most recent log lines, oldest first. `None` returns the whole buffer.
    pub fn log(&mut self, count: Option<usize>) -> Result<Vec<String>, ClientError> {
        let args = count.map(|n| vec![n.to_string()]).unwrap_or_default();
        self.client.invoke_as(
            software::MODULE,
            software::GET_LOG,
            args,
            "string list",
            RpcResult::into_list,
        )
    }
}

/// `Playback` module
pub struct PlaybackProxy<'a> {
    client: &'a mut RpcClient,
}

impl<'a> PlaybackProxy<'a> {
    pub fn new(client: &'a mut RpcClient) -> Self {
        Self { client }
    }

    fn simple(&mut self, command: &str) -> Result<(), ClientError> {
        self.client
            .invoke_as(playback::MODULE, command, vec![], "nothing", |_| Some(()))
    }

    /// Starts playback; `uris` replace the playlist when not empty
    pub fn play(&mut self, uris: &[String]) -> Result<(), ClientError> {
        self.client
            .invoke_as(playback::MODULE, playback::PLAY, uris.to_vec(), "nothing", |_| Some(()))
    }

    pub fn pause(&mut self) -> Result<(), ClientError> {
        self.simple(playback::PAUSE)
    }

    pub fn resume(&mut self) -> Result<(), ClientError> {
        self.simple(playback::RESUME)
    }

    pub fn stop(&mut self) -> Result<(), ClientError> {
        self.simple(playback::STOP)
    }

    pub fn next(&mut self) -> Result<(), ClientError> {
        self.simple(playback::NEXT)
    }

    pub fn previous(&mut self) -> Result<(), ClientError> {
        self.simple(playback::PREVIOUS)
    }

    pub fn state(&mut self) -> Result<PlaybackState, ClientError> {
        self.client.invoke_as(
            playback::MODULE,
            playback::GET_STATE,
            vec![],
            "playback state",
            |r| r.into_text()?.parse().ok(),
        )
    }

    pub fn volume(&mut self) -> Result<u8, ClientError> {
        self.client.invoke_as(
            playback::MODULE,
            playback::GET_VOLUME,
            vec![],
            "volume 0-100",
            |r| {
                let v = r.into_number()?;
                (0.0..=100.0).contains(&v).then_some(v as u8)
            },
        )
    }

    pub fn set_volume(&mut self, volume: u8) -> Result<(), ClientError> {
        self.client.invoke_as(
            playback::MODULE,
            playback::SET_VOLUME,
            vec![volume.to_string()],
            "nothing",
            |_| Some(()),
        )
    }

    pub fn peaks(&mut self) -> Result<AudioPeaks, ClientError> {
        self.client.invoke_as(
            playback::MODULE,
            playback::GET_PEAKS,
            vec![],
            "left/right record",
            AudioPeaks::from_result,
        )
    }
}

/// `Playlist` module
pub struct PlaylistProxy<'a> {
    client: &'a mut RpcClient,
}

impl<'a> PlaylistProxy<'a> {
    pub fn new(client: &'a mut RpcClient) -> Self {
        Self { client }
    }

    pub fn count(&mut self) -> Result<usize, ClientError> {
        self.client.invoke_as(
            playlist::MODULE,
            playlist::COUNT,
            vec![],
            "count",
            |r| r.into_number().map(|n| n as usize),
        )
    }

    /// Appends `uris` and returns the new playlist length
    pub fn add(&mut self, uris: &[String]) -> Result<usize, ClientError> {
        self.client.invoke_as(
            playlist::MODULE,
            playlist::ADD,
            uris.to_vec(),
            "count",
            |r| r.into_number().map(|n| n as usize),
        )
    }

    pub fn clear(&mut self) -> Result<(), ClientError> {
        self.client
            .invoke_as(playlist::MODULE, playlist::CLEAR, vec![], "nothing", |_| Some(()))
    }

    pub fn items(&mut self) -> Result<Vec<String>, ClientError> {
        self.client.invoke_as(
            playlist::MODULE,
            playlist::ITEMS,
            vec![],
            "string list",
            RpcResult::into_list,
        )
    }

    pub fn current(&mut self) -> Result<Option<String>, ClientError> {
        self.client.invoke_as(
            playlist::MODULE,
            playlist::GET_CURRENT,
            vec![],
            "text or nothing",
            optional_text,
        )
    }
}

/// `Lyrics` module
pub struct LyricsProxy<'a> {
    client: &'a mut RpcClient,
}

impl<'a> LyricsProxy<'a> {
    pub fn new(client: &'a mut RpcClient) -> Self {
        Self { client }
    }

    pub fn current_line(&mut self) -> Result<Option<String>, ClientError> {
        self.client.invoke_as(
            lyrics::MODULE,
            lyrics::GET_CURRENT_LINE,
            vec![],
            "text or nothing",
            optional_text,
        )
    }

    pub fn set_line(&mut self, line: &str) -> Result<(), ClientError> {
        self.client.invoke_as(
            lyrics::MODULE,
            lyrics::SET_LINE,
            vec![line.to_string()],
            "nothing",
            |_| Some(()),
        )
    }
}

//! Module and command names shared by the host and its clients

pub mod software {
    pub const MODULE: &str = "Software";
    pub const IS_RUNNING: &str = "IsRunning";
    pub const GET_VERSION: &str = "GetVersion";
    pub const GET_LOG: &str = "GetLog";
}

pub mod playback {
    pub const MODULE: &str = "Playback";
    pub const PLAY: &str = "Play";
    pub const PAUSE: &str = "Pause";
    pub const RESUME: &str = "Resume";
    pub const STOP: &str = "Stop";
    pub const NEXT: &str = "Next";
    pub const PREVIOUS: &str = "Previous";
    pub const GET_STATE: &str = "GetState";
    pub const GET_VOLUME: &str = "GetVolume";
    pub const SET_VOLUME: &str = "SetVolume";
    pub const GET_PEAKS: &str = "GetPeaks";
}

pub mod playlist {
    pub const MODULE: &str = "Playlist";
    pub const COUNT: &str = "Count";
    pub const ADD: &str = "Add";
    pub const CLEAR: &str = "Clear";
    pub const ITEMS: &str = "Items";
    pub const GET_CURRENT: &str = "GetCurrent";
}

pub mod lyrics {
    pub const MODULE: &str = "Lyrics";
    pub const GET_CURRENT_LINE: &str = "GetCurrentLine";
    pub const SET_LINE: &str = "SetLine";
}

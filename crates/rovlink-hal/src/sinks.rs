//! Output sinks that take wall-clock time: the speaker and the face display.

use std::time::Duration;

use async_trait::async_trait;
use rovlink_types::{Keyframe, RovError};

/// Speaker output. `play` resolves when playback has finished.
#[async_trait]
pub trait AudioSink: Send {
    async fn play(&mut self, audio: &[u8]) -> Result<(), RovError>;
}

/// Face display. `render` resolves once the animation has been handed to the
/// display surface.
#[async_trait]
pub trait DisplaySink: Send {
    async fn render(&mut self, keyframes: &[Keyframe], duration: Duration)
    -> Result<(), RovError>;
}

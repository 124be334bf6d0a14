//! Frame source contracts and candidate descriptors

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backend::{DeviceOpener, ReplayOpener, SyntheticOpener};
use crate::{CameraError, Frame};

/// An opened camera-like device producing RGB frames
///
/// Sources live on the acquisition thread only and need not be `Send`.
pub trait FrameSource {
    /// Human readable name for logs
    fn name(&self) -> &str;

    /// Blocking read of the next frame
    fn read(&mut self) -> Result<Frame, CameraError>;

    /// Release the device; reads after close fail with `NotInitialized`
    fn close(&mut self);
}

/// Factory that can (re)open one candidate device
pub trait SourceOpener: Send {
    fn describe(&self) -> String;

    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// Capture geometry requested from sources that support it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
        }
    }
}

/// One entry of the prioritized candidate list
///
/// Textual forms: `device:<index>`, `replay:<dir>`, `synthetic` or
/// `synthetic:<w>x<h>@<fps>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceDescriptor {
    /// Physical camera by index
    Device(u32),
    /// Directory of still images played back in a loop
    Replay(PathBuf),
    /// Generated test pattern
    Synthetic { width: u32, height: u32, fps: u32 },
}

impl SourceDescriptor {
    /// The default probe order for USB / ribbon cameras
    pub fn default_candidates() -> Vec<SourceDescriptor> {
        [0, 1, 8, 9, 2, 3, 4]
            .into_iter()
            .map(SourceDescriptor::Device)
            .collect()
    }

    /// Build the opener for this candidate
    pub fn opener(&self, settings: SourceSettings) -> Box<dyn SourceOpener> {
        match self {
            SourceDescriptor::Device(index) => Box::new(DeviceOpener::new(*index, settings)),
            SourceDescriptor::Replay(dir) => Box::new(ReplayOpener::new(dir.clone(), settings.fps)),
            SourceDescriptor::Synthetic { width, height, fps } => {
                Box::new(SyntheticOpener::new(*width, *height, *fps))
            }
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Device(index) => write!(f, "device:{}", index),
            SourceDescriptor::Replay(dir) => write!(f, "replay:{}", dir.display()),
            SourceDescriptor::Synthetic { width, height, fps } => {
                write!(f, "synthetic:{}x{}@{}", width, height, fps)
            }
        }
    }
}

impl FromStr for SourceDescriptor {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CameraError::Format(format!("invalid camera candidate '{}'", s));
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind.trim(), Some(arg.trim())),
            None => (s.trim(), None),
        };

        match (kind, arg) {
            ("device", Some(index)) => index.parse().map(SourceDescriptor::Device).map_err(|_| invalid()),
            ("replay", Some(dir)) if !dir.is_empty() => Ok(SourceDescriptor::Replay(PathBuf::from(dir))),
            ("synthetic", None) => {
                let defaults = SourceSettings::default();
                Ok(SourceDescriptor::Synthetic {
                    width: defaults.width,
                    height: defaults.height,
                    fps: defaults.fps,
                })
            }
            ("synthetic", Some(spec)) => {
                let (size, fps) = spec.split_once('@').ok_or_else(invalid)?;
                let (width, height) = size.split_once('x').ok_or_else(invalid)?;
                let width: u32 = width.parse().map_err(|_| invalid())?;
                let height: u32 = height.parse().map_err(|_| invalid())?;
                let fps: u32 = fps.parse().map_err(|_| invalid())?;
                if width == 0 || height == 0 || fps == 0 {
                    return Err(invalid());
                }
                Ok(SourceDescriptor::Synthetic { width, height, fps })
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for SourceDescriptor {
    type Error = CameraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceDescriptor> for String {
    fn from(descriptor: SourceDescriptor) -> Self {
        descriptor.to_string()
    }
}

//! Startup probing over the candidate list

use tracing::{debug, info, warn};

use crate::{CameraError, FrameSource, SourceOpener};

/// Open one candidate and prove it delivers frames
///
/// Discards up to `warmup_frames` frames (stopping early at a failed read),
/// then requires one good verification frame. A source that opens but never
/// produces a frame is released and reported as unavailable.
pub fn open_verified(
    opener: &dyn SourceOpener,
    warmup_frames: u32,
) -> Result<Box<dyn FrameSource>, CameraError> {
    let mut source = opener.open()?;

    for _ in 0..warmup_frames {
        if let Err(e) = source.read() {
            debug!("{}: warm-up read failed: {}", opener.describe(), e);
            break;
        }
    }

    match source.read() {
        Ok(frame) => {
            info!(
                "{} verified ({}x{})",
                opener.describe(),
                frame.width(),
                frame.height()
            );
            Ok(source)
        }
        Err(e) => {
            source.close();
            Err(CameraError::DeviceUnavailable(format!(
                "{} opened but returned no frame: {}",
                opener.describe(),
                e
            )))
        }
    }
}

/// Try every candidate in order and return the first verified source with its
/// index in `openers`
pub fn probe_candidates(
    openers: &[Box<dyn SourceOpener>],
    warmup_frames: u32,
) -> Result<(usize, Box<dyn FrameSource>), CameraError> {
    let mut tried = Vec::with_capacity(openers.len());

    for (index, opener) in openers.iter().enumerate() {
        match open_verified(opener.as_ref(), warmup_frames) {
            Ok(source) => return Ok((index, source)),
            Err(e) => {
                warn!("Camera candidate {} rejected: {}", opener.describe(), e);
                tried.push(opener.describe());
            }
        }
    }

    Err(CameraError::DeviceUnavailable(if tried.is_empty() {
        "no camera candidates configured".to_string()
    } else {
        format!("tried {}", tried.join(", "))
    }))
}

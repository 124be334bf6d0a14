//! Plays a directory of still images back as a camera

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::Pacer;
use crate::{CameraError, Frame, FrameSource, SourceOpener};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Opener for a replay directory
#[derive(Debug, Clone)]
pub struct ReplayOpener {
    dir: PathBuf,
    fps: u32,
}

impl ReplayOpener {
    pub fn new(dir: PathBuf, fps: u32) -> Self {
        Self { dir, fps }
    }
}

impl SourceOpener for ReplayOpener {
    fn describe(&self) -> String {
        format!("replay:{}", self.dir.display())
    }

    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        let files = list_images(&self.dir)?;
        info!("Replay source {} has {} images", self.dir.display(), files.len());
        Ok(Box::new(ReplaySource::new(self.describe(), files, self.fps)))
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CameraError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| CameraError::DeviceUnavailable(format!("{}: {}", dir.display(), e)))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(CameraError::DeviceUnavailable(format!(
            "{} contains no images",
            dir.display()
        )));
    }
    Ok(files)
}

/// Cycles through image files in name order
pub struct ReplaySource {
    name: String,
    files: Vec<PathBuf>,
    position: usize,
    pacer: Pacer,
    counter: u64,
    open: bool,
}

impl ReplaySource {
    pub fn new(name: String, files: Vec<PathBuf>, fps: u32) -> Self {
        Self {
            name,
            files,
            position: 0,
            pacer: Pacer::new(fps),
            counter: 0,
            open: true,
        }
    }
}

impl FrameSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<Frame, CameraError> {
        if !self.open {
            return Err(CameraError::NotInitialized);
        }
        self.pacer.wait();

        let path = &self.files[self.position];
        self.position = (self.position + 1) % self.files.len();

        // A file deleted from under us is a device loss, a bad file is a bad read
        if !path.exists() {
            return Err(CameraError::DeviceLost(format!("{} disappeared", path.display())));
        }
        let image = image::open(path)
            .map_err(|e| CameraError::Format(format!("{}: {}", path.display(), e)))?
            .to_rgb8();

        self.counter += 1;
        Frame::from_image(image, self.counter)
    }

    fn close(&mut self) {
        if self.open {
            debug!("Closing {}", self.name);
            self.open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("replay-test-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let opener = ReplayOpener::new(PathBuf::from("/nonexistent/replay/dir"), 10);
        assert!(matches!(opener.open(), Err(CameraError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_empty_directory_is_unavailable() {
        let dir = temp_dir("empty");
        std::fs::write(dir.join("notes.txt"), b"not an image").unwrap();
        let opener = ReplayOpener::new(dir.clone(), 10);
        assert!(matches!(opener.open(), Err(CameraError::DeviceUnavailable(_))));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_cycles_through_images_in_order() {
        let dir = temp_dir("cycle");
        RgbImage::from_pixel(4, 4, Rgb([10, 0, 0])).save(dir.join("a.png")).unwrap();
        RgbImage::from_pixel(4, 4, Rgb([20, 0, 0])).save(dir.join("b.png")).unwrap();

        let mut source = ReplayOpener::new(dir.clone(), 1000).open().unwrap();
        let reds: Vec<u8> = (0..3)
            .map(|_| source.read().unwrap().get_pixel(0, 0).unwrap()[0])
            .collect();

        assert_eq!(reds, vec![10, 20, 10]);
        let _ = std::fs::remove_dir_all(dir);
    }
}

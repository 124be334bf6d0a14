//! Physical cameras (USB webcam or ribbon-cable module)

use crate::source::SourceSettings;
use crate::{CameraError, FrameSource, SourceOpener};

/// Opener for a camera by index
#[derive(Debug, Clone)]
pub struct DeviceOpener {
    index: u32,
    #[cfg_attr(not(feature = "camera"), allow(dead_code))]
    settings: SourceSettings,
}

impl DeviceOpener {
    pub fn new(index: u32, settings: SourceSettings) -> Self {
        Self { index, settings }
    }
}

impl SourceOpener for DeviceOpener {
    fn describe(&self) -> String {
        format!("device:{}", self.index)
    }

    #[cfg(feature = "camera")]
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        native::NativeCamera::open(self.index, self.settings)
            .map(|camera| Box::new(camera) as Box<dyn FrameSource>)
    }

    #[cfg(not(feature = "camera"))]
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        Err(CameraError::DeviceUnavailable(format!(
            "{}: built without the `camera` feature",
            self.describe()
        )))
    }
}

#[cfg(feature = "camera")]
mod native {
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    };
    use nokhwa::Camera;
    use tracing::{debug, info};

    use crate::source::SourceSettings;
    use crate::{CameraError, Frame, FrameSource};

    pub struct NativeCamera {
        name: String,
        camera: Option<Camera>,
        counter: u64,
    }

    impl NativeCamera {
        pub fn open(index: u32, settings: SourceSettings) -> Result<Self, CameraError> {
            let format = CameraFormat::new(
                Resolution::new(settings.width, settings.height),
                FrameFormat::MJPEG,
                settings.fps,
            );
            let requested =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

            let mut camera = Camera::new(CameraIndex::Index(index), requested)
                .map_err(|e| CameraError::DeviceUnavailable(format!("device:{}: {}", index, e)))?;
            camera
                .open_stream()
                .map_err(|e| CameraError::DeviceUnavailable(format!("device:{}: {}", index, e)))?;

            let name = format!("device:{} ({})", index, camera.info().human_name());
            info!("Opened {} at {}", name, camera.camera_format());

            Ok(Self {
                name,
                camera: Some(camera),
                counter: 0,
            })
        }
    }

    impl FrameSource for NativeCamera {
        fn name(&self) -> &str {
            &self.name
        }

        fn read(&mut self) -> Result<Frame, CameraError> {
            let camera = self.camera.as_mut().ok_or(CameraError::NotInitialized)?;

            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(e) if camera.is_stream_open() => {
                    debug!("{}: frame read failed: {}", self.name, e);
                    return Err(CameraError::ReadTimeout);
                }
                Err(e) => return Err(CameraError::DeviceLost(e.to_string())),
            };
            let decoded = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| CameraError::Format(e.to_string()))?;

            let (width, height) = (decoded.width(), decoded.height());
            self.counter += 1;
            Frame::new(decoded.into_raw(), width, height, self.counter)
        }

        fn close(&mut self) {
            if let Some(mut camera) = self.camera.take() {
                if let Err(e) = camera.stop_stream() {
                    debug!("{}: stop_stream failed: {}", self.name, e);
                }
            }
        }
    }

    impl Drop for NativeCamera {
        fn drop(&mut self) {
            self.close();
        }
    }
}

use image::RgbaImage;

use super::CaptureError;

pub trait FrameSource: Send {
    /// `None` until the source reports usable, non-zero dimensions.
    fn dimensions(&self) -> Option<(u32, u32)>;
    fn grab(&mut self) -> Result<RgbaImage, CaptureError>;
    fn is_live(&self) -> bool;
    fn release(&mut self);
}

pub trait DisplayProvider: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn FrameSource>, CaptureError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PrimaryDisplay;

impl DisplayProvider for PrimaryDisplay {
    fn acquire(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| CaptureError::PermissionDenied(format!("failed to list monitors: {e}")))?;

        let mut fallback = None;
        let mut primary = None;
        for monitor in monitors {
            match monitor.is_primary() {
                Ok(true) => {
                    primary = Some(monitor);
                    break;
                }
                Ok(false) if fallback.is_none() => fallback = Some(monitor),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(target: "capture", error = %e, "could not query monitor");
                }
            }
        }
        let monitor = primary.or(fallback).ok_or_else(|| {
            CaptureError::PermissionDenied("no shareable display found".to_string())
        })?;
        let monitor_id = monitor
            .id()
            .map_err(|e| CaptureError::PermissionDenied(format!("display unavailable: {e}")))?;

        tracing::info!(target: "capture", monitor_id, "display acquired");
        Ok(Box::new(XcapSource {
            monitor_id,
            live: true,
        }))
    }
}

struct XcapSource {
    monitor_id: u32,
    live: bool,
}

impl XcapSource {
    /// Monitors are looked up again on every use so an unplugged display ends the stream.
    fn monitor(&self) -> Option<xcap::Monitor> {
        xcap::Monitor::all()
            .ok()?
            .into_iter()
            .find(|m| m.id().ok() == Some(self.monitor_id))
    }
}

impl FrameSource for XcapSource {
    fn dimensions(&self) -> Option<(u32, u32)> {
        if !self.live {
            return None;
        }
        let monitor = self.monitor()?;
        let width = monitor.width().ok()?;
        let height = monitor.height().ok()?;
        (width > 0 && height > 0).then_some((width, height))
    }

    fn grab(&mut self) -> Result<RgbaImage, CaptureError> {
        if !self.live {
            return Err(CaptureError::SourceEnded);
        }
        let Some(monitor) = self.monitor() else {
            self.live = false;
            return Err(CaptureError::SourceEnded);
        };
        monitor
            .capture_image()
            .map_err(|e| CaptureError::Grab(e.to_string()))
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn release(&mut self) {
        self.live = false;
    }
}

use log::{error, info};

use crate::error::OverlayError;

/// The platform's full-screen blocking surface.
pub trait OverlaySurface: Send {
    fn add(&mut self, app_id: &str) -> Result<(), OverlayError>;
    fn remove(&mut self) -> Result<(), OverlayError>;
}

/// Surface for hosts that draw the overlay themselves on `AppBlocked`.
#[derive(Debug, Default)]
pub struct HeadlessSurface;

impl OverlaySurface for HeadlessSurface {
    fn add(&mut self, app_id: &str) -> Result<(), OverlayError> {
        info!("Overlay requested for {app_id}");
        Ok(())
    }

    fn remove(&mut self) -> Result<(), OverlayError> {
        info!("Overlay dismissed");
        Ok(())
    }
}

/// Owns at most one overlay, keyed by the app it covers.
///
/// `overlaid_app` always matches what is on screen: a failed add or remove
/// clears it so a later tick can try again.
pub struct OverlayController {
    surface: Box<dyn OverlaySurface>,
    overlaid_app: Option<String>,
}

impl OverlayController {
    pub fn new(surface: Box<dyn OverlaySurface>) -> Self {
        Self {
            surface,
            overlaid_app: None,
        }
    }

    /// Returns whether the overlay is showing for `app_id` afterwards.
    pub fn show(&mut self, app_id: &str) -> bool {
        if self.overlaid_app.as_deref() == Some(app_id) {
            return true;
        }
        self.hide();

        match self.surface.add(app_id) {
            Ok(()) => {
                info!("Overlay ADDED for {app_id}");
                self.overlaid_app = Some(app_id.to_owned());
                true
            }
            Err(err) => {
                error!("Failed to add overlay for {app_id}: {err}");
                self.overlaid_app = None;
                false
            }
        }
    }

    pub fn hide(&mut self) {
        let Some(app_id) = self.overlaid_app.take() else {
            return;
        };
        match self.surface.remove() {
            Ok(()) => info!("Overlay REMOVED for {app_id}"),
            Err(err) => error!("Failed to remove overlay for {app_id}: {err}"),
        }
    }

    /// Hides the overlay only if it is showing for `app_id`.
    pub fn hide_for(&mut self, app_id: &str) {
        if self.overlaid_app.as_deref() == Some(app_id) {
            self.hide();
        }
    }

    pub fn overlaid_app(&self) -> Option<&str> {
        self.overlaid_app.as_deref()
    }

    pub fn is_showing(&self) -> bool {
        self.overlaid_app.is_some()
    }
}

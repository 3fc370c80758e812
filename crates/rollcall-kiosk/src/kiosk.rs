//! The kiosk capture loop.
//!
//! One [`Session`] owns everything the loop touches. Each [`Session::step`]
//! grabs a frame, finds faces, resolves each against the gallery, records
//! attendance, pulses the door for recognized people and shows the annotated
//! frame. Everything runs on the calling thread; a door pulse stalls the loop
//! for the whole hold.

use crate::display::{Display, DisplayError};
use crate::overlay;
use image::{imageops, GrayImage};
use rollcall_core::{BoundingBox, FaceEngine, FirstMatch, Gallery, Identity, PixelRect};
use rollcall_hw::{frame::is_dark_frame, Actuator, DoorError, Frame, FrameSource};
use rollcall_ledger::Ledger;
use std::time::Duration;
use thiserror::Error;

/// Fraction of the box size added on every side before cropping for the matcher.
pub const CROP_MARGIN: f32 = 0.2;
/// Frames with more than this share of near-black pixels are not searched.
pub const DARK_FRAME_FRACTION: f32 = 0.95;
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("door actuator failed: {0}")]
    Door(#[from] DoorError),
    #[error(transparent)]
    Display(#[from] DisplayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `q` pressed or the window closed.
    QuitRequested,
    CameraFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped(StopReason),
}

/// What the ledger said about a recognized face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting today; a row was written.
    Marked,
    AlreadyMarked,
    /// The ledger could not be read or written. The door still opened.
    LedgerFailed,
}

/// One face found in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub rect: PixelRect,
    pub identity: Option<Identity>,
    /// `None` for unrecognized faces.
    pub admission: Option<Admission>,
}

impl Sighting {
    pub fn label(&self) -> &str {
        self.identity.as_ref().map_or(UNKNOWN_LABEL, Identity::as_str)
    }
}

pub struct Session<S, D, A, E> {
    pub source: S,
    pub display: D,
    pub door: A,
    pub engine: E,
    pub gallery: Gallery,
    pub matcher: FirstMatch,
    pub ledger: Ledger,
    /// Door hold per recognized face.
    pub hold: Duration,
    state: LoopState,
}

impl<S, D, A, E> Session<S, D, A, E>
where
    S: FrameSource,
    D: Display,
    A: Actuator,
    E: FaceEngine,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        display: D,
        door: A,
        engine: E,
        gallery: Gallery,
        matcher: FirstMatch,
        ledger: Ledger,
        hold: Duration,
    ) -> Self {
        Self {
            source,
            display,
            door,
            engine,
            gallery,
            matcher,
            ledger,
            hold,
            state: LoopState::Running,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until the operator quits or the camera fails.
    ///
    /// Door and display failures end the loop with an error.
    pub fn run(&mut self) -> Result<StopReason, KioskError> {
        tracing::info!(
            identities = self.gallery.len(),
            hold_secs = self.hold.as_secs(),
            "kiosk running"
        );
        loop {
            if let LoopState::Stopped(reason) = self.state() {
                tracing::info!(?reason, "kiosk stopped");
                return Ok(reason);
            }
            for sighting in self.step()? {
                tracing::debug!(
                    label = sighting.label(),
                    rect = ?sighting.rect,
                    admission = ?sighting.admission,
                    "face in frame"
                );
            }
        }
    }

    /// Process one frame. A no-op once the session has stopped.
    pub fn step(&mut self) -> Result<Vec<Sighting>, KioskError> {
        if self.state != LoopState::Running {
            return Ok(Vec::new());
        }

        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "camera read failed");
                self.state = LoopState::Stopped(StopReason::CameraFailure);
                return Ok(Vec::new());
            }
        };

        let (sequence, captured) = (frame.sequence, frame.timestamp);
        let (annotated, sightings) = self.process(frame)?;
        self.display.show(&annotated)?;
        tracing::trace!(
            sequence,
            faces = sightings.len(),
            elapsed_ms = captured.elapsed().as_millis() as u64,
            "frame processed"
        );

        if self.display.quit_requested() {
            self.state = LoopState::Stopped(StopReason::QuitRequested);
        }
        Ok(sightings)
    }

    fn process(&mut self, frame: Frame) -> Result<(image::RgbImage, Vec<Sighting>), KioskError> {
        let gray = frame.to_luma();
        let mut annotated = frame.image;
        let (width, height) = gray.dimensions();

        let mut sightings = Vec::new();
        for face in self.locate(&gray) {
            let Some(rect) = face.to_pixel_rect(width, height) else {
                continue;
            };
            overlay::draw_face_box(&mut annotated, rect);

            let identity = match face.expanded(CROP_MARGIN).to_pixel_rect(width, height) {
                Some(crop) => self.identify(&gray, crop),
                None => None,
            };

            let admission = match &identity {
                Some(identity) => {
                    overlay::draw_label(&mut annotated, rect, identity.as_str(), overlay::KNOWN_COLOR);
                    Some(self.admit(identity)?)
                }
                None => {
                    overlay::draw_label(&mut annotated, rect, UNKNOWN_LABEL, overlay::UNKNOWN_COLOR);
                    None
                }
            };

            sightings.push(Sighting {
                rect,
                identity,
                admission,
            });
        }

        Ok((annotated, sightings))
    }

    fn locate(&mut self, gray: &GrayImage) -> Vec<BoundingBox> {
        if is_dark_frame(gray.as_raw(), DARK_FRAME_FRACTION) {
            tracing::trace!("dark frame, skipping detection");
            return Vec::new();
        }
        match self.engine.detect(gray) {
            Ok(faces) => faces,
            Err(err) => {
                tracing::warn!(error = %err, "face detection failed on frame");
                Vec::new()
            }
        }
    }

    fn identify(&mut self, gray: &GrayImage, crop: PixelRect) -> Option<Identity> {
        let region = imageops::crop_imm(gray, crop.x, crop.y, crop.width, crop.height).to_image();
        self.matcher.identify(&mut self.engine, &self.gallery, &region)
    }

    /// Record attendance and release the door.
    fn admit(&mut self, identity: &Identity) -> Result<Admission, KioskError> {
        let admission = match self.ledger.record(identity.as_str()) {
            Ok(true) => {
                tracing::info!(name = %identity, "welcome, attendance marked");
                Admission::Marked
            }
            Ok(false) => {
                tracing::info!(name = %identity, "already marked today");
                Admission::AlreadyMarked
            }
            Err(err) => {
                tracing::error!(name = %identity, error = %err, "failed to record attendance");
                Admission::LedgerFailed
            }
        };

        self.door.open(self.hold)?;
        Ok(admission)
    }
}

//! rollcall-hw: Hardware abstraction for camera capture and the door actuator.
//!
//! Provides V4L2-based camera access and the serial link to the door-lock
//! controller.

pub mod camera;
pub mod door;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, FrameSource, PixelFormat};
pub use door::{Actuator, DoorError, DoorLink, SerialSettings};
pub use frame::Frame;

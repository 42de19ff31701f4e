//! Production providers
//!
//! [`touch`] defines the touchscreen-rotation seam (always available);
//! [`x11`] implements the RR-screen provider and the XInput rotation
//! backend over `x11rb` when the `x11` feature is enabled.

pub mod touch;

#[cfg(feature = "x11")]
pub mod x11;

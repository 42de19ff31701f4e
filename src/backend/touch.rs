//! Touchscreen rotation slaving
//!
//! When the laptop panel rotates, every attached touchscreen gets a 3×3
//! coordinate-transformation matrix matching the new rotation so pointer
//! input stays aligned with the picture. Recognized drawing tablets are
//! excluded: they calibrate against their own surface, not the screen.

use crate::randr::Rotation;

/// The four evdev coordinate-transformation matrices, one per rotation.
pub const TOUCH_MATRICES: [(Rotation, [f32; 9]); 4] = [
    (Rotation::Rotate0, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
    (Rotation::Rotate90, [0.0, -1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
    (
        Rotation::Rotate180,
        [-1.0, 0.0, 1.0, 0.0, -1.0, 1.0, 0.0, 0.0, 1.0],
    ),
    (
        Rotation::Rotate270,
        [0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 1.0],
    ),
];

/// The transformation matrix for a rotation.
pub fn matrix_for(rotation: Rotation) -> [f32; 9] {
    TOUCH_MATRICES
        .iter()
        .find(|(r, _)| *r == rotation)
        .map(|(_, m)| *m)
        .expect("all four rotations have a matrix")
}

/// Applies rotation matrices to the attached touch input devices.
pub trait TouchscreenRotator: Send + Sync {
    /// Slave every touchscreen/tablet device to `rotation`.
    fn rotate_all(&self, rotation: Rotation);
}

/// Decides whether an input device is a drawing tablet that must keep its
/// own calibration. Injectable because real detection needs a hardware
/// database the daemon should not hard-depend on.
pub trait TabletDatabase: Send + Sync {
    /// Whether `device_name` names a drawing tablet.
    fn is_drawing_tablet(&self, device_name: &str) -> bool;
}

/// Conservative fallback classifier: matches the vendor names that ship
/// built-in drawing surfaces.
pub struct NameHeuristicTablets;

impl TabletDatabase for NameHeuristicTablets {
    fn is_drawing_tablet(&self, device_name: &str) -> bool {
        let name = device_name.to_ascii_lowercase();
        name.contains("wacom") || name.contains("pen and multitouch")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_rotation_has_a_matrix() {
        for rotation in crate::randr::mode::ROTATION_CYCLE {
            let m = matrix_for(rotation);
            // The last row is always (0, 0, 1) for an affine transform.
            assert_eq!(&m[6..], &[0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_identity_for_no_rotation() {
        assert_eq!(
            matrix_for(Rotation::Rotate0),
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_tablet_heuristic() {
        let db = NameHeuristicTablets;
        assert!(db.is_drawing_tablet("Wacom Intuos Pro"));
        assert!(!db.is_drawing_tablet("ELAN Touchscreen"));
    }
}

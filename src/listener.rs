//! Listener world->head transform (spec.md §4.5).

use crate::math::{Mat4, Vec4};

/// External listener state, read by the core each tick it is dirty.
#[derive(Copy, Clone, Debug)]
pub struct Listener {
    pub position: Vec4,
    pub velocity: Vec4,
    /// Forward ("AT") vector.
    pub at: Vec4,
    /// Up vector.
    pub up: Vec4,
    pub gain: f32,
    pub meters_per_unit: f32,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec4::point(0.0, 0.0, 0.0),
            velocity: Vec4::direction(0.0, 0.0, 0.0),
            at: Vec4::direction(0.0, 0.0, -1.0),
            up: Vec4::direction(0.0, 1.0, 0.0),
            gain: 1.0,
            meters_per_unit: 1.0,
        }
    }
}

/// Derived parameter block the core computes from a `Listener`, consumed by
/// the voice updater.
#[derive(Copy, Clone, Debug)]
pub struct ListenerParams {
    /// World -> head transform.
    pub matrix: Mat4,
    /// Listener velocity, transformed into head space.
    pub velocity: Vec4,
    pub gain: f32,
    pub meters_per_unit: f32,
}

/// `UpdateListenerParams`: builds the listener's world->head transform.
///
/// Normalizes AT/UP, derives a right vector `U = normalize(AT x UP)`, forms
/// the rotation matrix, transforms the listener position through it, then
/// overwrites the translation row with the negated transformed position so
/// the composite matrix moves a world-space point into head space (listener
/// origin at 0, facing -Z, up +Y).
pub fn update_listener_params(listener: &Listener) -> ListenerParams {
    let n = listener.at.normalize();
    let v = listener.up.normalize();
    let u = n.cross3(v).normalize();

    let mut m = Mat4 {
        rows: [
            Vec4::direction(u.x, v.x, -n.x),
            Vec4::direction(u.y, v.y, -n.y),
            Vec4::direction(u.z, v.z, -n.z),
            Vec4::point(0.0, 0.0, 0.0),
        ],
    };

    let transformed_pos = m.transform(listener.position);
    m.set_row3(-transformed_pos.x, -transformed_pos.y, -transformed_pos.z, 1.0);

    let velocity = m.transform(listener.velocity);

    ListenerParams {
        matrix: m,
        velocity,
        gain: listener.gain,
        meters_per_unit: listener.meters_per_unit,
    }
}

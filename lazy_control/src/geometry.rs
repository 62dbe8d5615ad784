// src/geometry.rs
//
// Planar helpers for the flocking arena: angle wrapping, the periodic
// (toroidal) square arena centred at the origin, and the sin/cos embedding of
// periodic displacements used in observations.

use std::f64::consts::PI;

/// Wrap an angle into [-pi, pi).
pub fn wrap_to_pi(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

/// Wrap a coordinate into [-span/2, span/2).
pub fn wrap_to_interval(x: f64, span: f64) -> f64 {
    let half = span / 2.0;
    (x + half).rem_euclid(span) - half
}

/// Wrap a position into the rectangle [-w/2, w/2) x [-h/2, h/2).
pub fn wrap_to_rectangle(x: f64, y: f64, width: f64, height: f64) -> (f64, f64) {
    (wrap_to_interval(x, width), wrap_to_interval(y, height))
}

/// Minimum-image displacement on a periodic axis of length `span`.
pub fn periodic_displacement(d: f64, span: f64) -> f64 {
    d - span * (d / span).round()
}

/// Minimum-image relative position and its length.
pub fn periodic_rel_pos_dist(dx: f64, dy: f64, width: f64, height: f64) -> ([f64; 2], f64) {
    let px = periodic_displacement(dx, width);
    let py = periodic_displacement(dy, height);
    ([px, py], px.hypot(py))
}

/// The square arena agents live in. When periodic, both axes wrap with
/// period `side` and displacements use the minimum image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub side: f64,
    pub periodic: bool,
}

impl Arena {
    pub fn new(side: f64, periodic: bool) -> Self {
        Self { side, periodic }
    }

    /// Displacement from (x_i, y_i) to (x_j, y_j) and its length.
    pub fn displacement(&self, dx: f64, dy: f64) -> ([f64; 2], f64) {
        if self.periodic {
            periodic_rel_pos_dist(dx, dy, self.side, self.side)
        } else {
            ([dx, dy], dx.hypot(dy))
        }
    }

    /// Wrap a position back into the arena (identity when not periodic).
    pub fn wrap(&self, x: f64, y: f64) -> (f64, f64) {
        if self.periodic {
            wrap_to_rectangle(x, y, self.side, self.side)
        } else {
            (x, y)
        }
    }
}

/// Embed a periodic displacement as [cos(x'), sin(x'), cos(y'), sin(y')],
/// where x' = 2*pi*dx/width (same for y).
pub fn map_periodic_to_continuous(dx: f64, dy: f64, width: f64, height: f64) -> [f64; 4] {
    let ax = 2.0 * PI * dx / width;
    let ay = 2.0 * PI * dy / height;
    [ax.cos(), ax.sin(), ay.cos(), ay.sin()]
}

// Two-link inverse kinematics by bounded grid search
//
// Forward model:
//   x = Llower*sin(theta) + Lupper*sin(phi)
//   y = Llower*cos(theta) - Lupper*cos(phi) + h
//
// Substituting sin(theta) from the x equation into the y equation leaves y as a
// function of phi alone. Phi is found by scanning that function, then theta by
// scanning the x equation with phi fixed. Both scans cover [-pi/2, pi/2).

use std::f64::consts::PI;

use tracing::{debug, warn};

use super::geometry::ArmGeometry;

/// Number of grid points in each scan
pub const SEARCH_STEPS: i32 = 2000;

/// Grid resolution in radians (about 0.09 degrees)
pub const SEARCH_RESOLUTION: f64 = PI / SEARCH_STEPS as f64;

/// Largest per-axis forward kinematics error accepted as converged
pub const POSITION_TOLERANCE: f64 = 0.1;

/// Result of an inverse kinematics solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    /// Lower joint angle in radians
    pub theta: f64,
    /// Upper joint angle in radians
    pub phi: f64,
    /// Smallest |y - y(phi)| seen during the phi scan
    pub phi_deviation: f64,
    /// Smallest |x - x(theta, phi)| seen during the theta scan
    pub theta_deviation: f64,
    /// Forward kinematics residual (x, y) of the solved angles
    pub residual: (f64, f64),
    /// Both residuals within POSITION_TOLERANCE
    pub converged: bool,
}

impl Solution {
    pub fn theta_degrees(&self) -> f64 {
        self.theta.to_degrees()
    }

    pub fn phi_degrees(&self) -> f64 {
        self.phi.to_degrees()
    }
}

/// Stateless solver bound to one arm geometry
#[derive(Debug, Clone, Copy)]
pub struct KinematicsSolver {
    geometry: ArmGeometry,
}

impl KinematicsSolver {
    pub fn new(geometry: ArmGeometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &ArmGeometry {
        &self.geometry
    }

    /// Solve for the joint angles placing the grabber at (x, y).
    ///
    /// Always returns the best angles found. `converged` is false when
    /// forward kinematics of those angles misses (x, y) by more than
    /// [`POSITION_TOLERANCE`] on either axis, which is the case for any target
    /// outside the reachable envelope.
    pub fn solve(&self, x: f64, y: f64) -> Solution {
        let (mut phi, mut phi_deviation) =
            scan(|phi| self.implied_y(x, phi).map_or(f64::INFINITY, |implied| (y - implied).abs()));

        // No phi lets theta satisfy x: fall back to the closest approach
        if phi_deviation.is_infinite() {
            (phi, phi_deviation) = scan(|phi| (y - self.closest_y(x, phi)).abs());
        }

        let (theta, theta_deviation) = scan(|theta| {
            (x - (self.geometry.lower_length * theta.sin() + self.geometry.upper_length * phi.sin()))
                .abs()
        });

        let (fx, fy) = self.geometry.forward(theta, phi);
        let residual = ((x - fx).abs(), (y - fy).abs());
        let converged = residual.0 <= POSITION_TOLERANCE && residual.1 <= POSITION_TOLERANCE;

        debug!(
            "IK ({:.3}, {:.3}): theta={:.3} deg, phi={:.3} deg, scan deviations ({:.6}, {:.6})",
            x,
            y,
            theta.to_degrees(),
            phi.to_degrees(),
            phi_deviation,
            theta_deviation
        );

        if !converged {
            warn!(
                "IK did not converge for ({:.3}, {:.3}): reaches ({:.3}, {:.3})",
                x, y, fx, fy
            );
        }

        Solution {
            theta,
            phi,
            phi_deviation,
            theta_deviation,
            residual,
            converged,
        }
    }

    /// y reached with upper angle `phi` once theta is chosen to satisfy x.
    /// None when no theta reaches x for this phi.
    fn implied_y(&self, x: f64, phi: f64) -> Option<f64> {
        let radicand = self.radicand(x, phi);
        (radicand >= 0.0).then(|| self.y_from_radicand(radicand, phi))
    }

    /// Like `implied_y`, with the lower link stretched as far toward x as it
    /// goes when x is out of its reach
    fn closest_y(&self, x: f64, phi: f64) -> f64 {
        self.y_from_radicand(self.radicand(x, phi).max(0.0), phi)
    }

    fn radicand(&self, x: f64, phi: f64) -> f64 {
        let lower = self.geometry.lower_length;
        let horizontal = x - self.geometry.upper_length * phi.sin();
        lower * lower - horizontal * horizontal
    }

    fn y_from_radicand(&self, radicand: f64, phi: f64) -> f64 {
        radicand.sqrt() - self.geometry.upper_length * phi.cos() + self.geometry.pivot_height
    }
}

/// Grid scan over [-pi/2, pi/2), returns the angle with the smallest
/// deviation. The first minimum wins on ties.
fn scan<F>(deviation: F) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let half = SEARCH_STEPS / 2;
    let mut best_angle = 0.0;
    let mut best_deviation = f64::INFINITY;

    for i in -half..half {
        let angle = i as f64 * SEARCH_RESOLUTION;
        let d = deviation(angle);
        if d < best_deviation {
            best_deviation = d;
            best_angle = angle;
        }
    }

    (best_angle, best_deviation)
}

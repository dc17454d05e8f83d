// Named grabber placements
//
// Coordinates are relative to the robot centre (x) and the ground (y). Rear
// placements mirror the front ones through the base pivot.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Arm folded upright over the pivot
    Home,
    LowFront,
    LowRear,
    MidFront,
    MidRear,
    HighFront,
    HighRear,
}

impl Preset {
    pub const ALL: [Preset; 7] = [
        Preset::Home,
        Preset::LowFront,
        Preset::LowRear,
        Preset::MidFront,
        Preset::MidRear,
        Preset::HighFront,
        Preset::HighRear,
    ];

    /// Grabber (x, y) for this placement
    pub fn position(self) -> (f64, f64) {
        match self {
            // Grabber centreline height with the arm folded
            Preset::Home => (0.0, 17.625),
            Preset::LowFront => (26.0, 6.5),
            Preset::LowRear => (-26.0, 6.5),
            Preset::MidFront => (30.0, 24.0),
            Preset::MidRear => (-30.0, 24.0),
            Preset::HighFront => (30.0, 36.0),
            Preset::HighRear => (-30.0, 36.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::Home => "home",
            Preset::LowFront => "low_front",
            Preset::LowRear => "low_rear",
            Preset::MidFront => "mid_front",
            Preset::MidRear => "mid_rear",
            Preset::HighFront => "high_front",
            Preset::HighRear => "high_rear",
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("unknown preset '{}'", s))
    }
}

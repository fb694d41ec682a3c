//! Device-configuration profiles tried during negotiation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Rear camera, pointing away from the user.
    Environment,
    /// No preference; any device is acceptable.
    #[default]
    Unspecified,
}

/// A frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Creates a resolution from width and height.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One candidate device configuration.
///
/// `ideal` is a hint the platform may round to whatever it supports;
/// `exact` is a hard requirement and the open fails with
/// [`DeviceErrorKind::OverconstrainedProfile`](super::DeviceErrorKind::OverconstrainedProfile)
/// if the device cannot honour it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConstraintProfile {
    /// Preferred facing direction.
    #[serde(default)]
    pub facing: FacingMode,
    /// Preferred frame size.
    #[serde(default)]
    pub ideal: Option<Resolution>,
    /// Required frame size.
    #[serde(default)]
    pub exact: Option<Resolution>,
}

impl ConstraintProfile {
    /// Any device at its default resolution.
    pub const fn any() -> Self {
        Self {
            facing: FacingMode::Unspecified,
            ideal: None,
            exact: None,
        }
    }

    /// An environment-facing device with no size constraint.
    pub const fn environment() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal: None,
            exact: None,
        }
    }

    /// Adds an ideal resolution hint.
    pub const fn with_ideal(mut self, width: u32, height: u32) -> Self {
        self.ideal = Some(Resolution::new(width, height));
        self
    }

    /// Adds a hard resolution requirement.
    pub const fn with_exact(mut self, width: u32, height: u32) -> Self {
        self.exact = Some(Resolution::new(width, height));
        self
    }

    /// The resolution this profile asks for, hard requirement first.
    pub fn requested_resolution(&self) -> Option<Resolution> {
        self.exact.or(self.ideal)
    }
}

impl fmt::Display for ConstraintProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let facing = match self.facing {
            FacingMode::Environment => "environment",
            FacingMode::Unspecified => "any",
        };
        match (self.exact, self.ideal) {
            (Some(exact), _) => write!(f, "{facing} facing, exactly {exact}"),
            (None, Some(ideal)) => write!(f, "{facing} facing, ideally {ideal}"),
            (None, None) => write!(f, "{facing} facing, default resolution"),
        }
    }
}

/// The fallback list, most specific first.
///
/// Environment-facing requests degrade from 1080p down to no size
/// preference, then the facing preference is dropped, ending with
/// "any device, default resolution".
pub fn default_profiles() -> Vec<ConstraintProfile> {
    vec![
        ConstraintProfile::environment().with_ideal(1920, 1080),
        ConstraintProfile::environment().with_ideal(1280, 720),
        ConstraintProfile::environment().with_exact(640, 480),
        ConstraintProfile::environment(),
        ConstraintProfile::any().with_ideal(1280, 720),
        ConstraintProfile::any(),
    ]
}

/// A profile the negotiator accepted, with its position in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedProfile {
    /// Index into the negotiator's profile list.
    pub index: usize,
    /// The accepted profile.
    pub profile: ConstraintProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles_degrade_to_any() {
        let profiles = default_profiles();

        assert_eq!(profiles[0].facing, FacingMode::Environment);
        assert_eq!(profiles[0].ideal, Some(Resolution::new(1920, 1080)));
        assert_eq!(profiles[4], ConstraintProfile::any().with_ideal(1280, 720));
        assert_eq!(profiles.last(), Some(&ConstraintProfile::any()));
    }

    #[test]
    fn test_exact_takes_precedence() {
        let profile = ConstraintProfile::any()
            .with_ideal(1280, 720)
            .with_exact(640, 480);
        assert_eq!(profile.requested_resolution(), Some(Resolution::new(640, 480)));
    }

    #[test]
    fn test_profile_from_toml() {
        let profile: ConstraintProfile =
            toml::from_str("facing = \"environment\"\nideal = { width = 800, height = 600 }")
                .unwrap();
        assert_eq!(profile, ConstraintProfile::environment().with_ideal(800, 600));
        assert_eq!(profile.to_string(), "environment facing, ideally 800x600");
    }
}

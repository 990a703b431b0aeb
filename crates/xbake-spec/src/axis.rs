//! Coordinate convention remapping.
//!
//! A texture consumer describes its convention with a forward axis and an
//! up axis, each one of the six signed renderer axes. The remaining axis
//! ("right") is derived so that `(right, forward, up)` is right-handed,
//! i.e. `right = forward × up`.
//!
//! | forward | up | right |
//! |---------|----|-------|
//! | +Y      | +Z | +X    |
//! | +Z      | +Y | −X    |
//! | −Y      | +Z | −X    |
//!
//! Forward and up must lie on different physical axes. The 12 pairs that
//! share one (`+Y/+Y`, `+Y/−Y`, ...) are degenerate: [`resolve`] rejects them
//! and [`resolve_or_fallback`] substitutes [`AxisAssignment::identity`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the three renderer coordinate components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    X,
    Y,
    Z,
}

impl Component {
    /// Returns the component index (X = 0, Y = 1, Z = 2).
    pub fn index(&self) -> usize {
        match self {
            Component::X => 0,
            Component::Y => 1,
            Component::Z => 2,
        }
    }

    /// Returns the component for an index in `0..3`.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Component::X),
            1 => Some(Component::Y),
            2 => Some(Component::Z),
            _ => None,
        }
    }

    /// Returns the upper-case component letter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::X => "X",
            Component::Y => "Y",
            Component::Z => "Z",
        }
    }
}

/// A signed renderer axis.
///
/// Serialized with the identifiers used by the bake settings
/// (`POS_X`, `NEG_X`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignedAxis {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl SignedAxis {
    /// Returns all six signed axes.
    pub fn all() -> &'static [SignedAxis] {
        &[
            SignedAxis::PosX,
            SignedAxis::NegX,
            SignedAxis::PosY,
            SignedAxis::NegY,
            SignedAxis::PosZ,
            SignedAxis::NegZ,
        ]
    }

    /// Builds a signed axis from a component and a sign.
    pub fn new(component: Component, negative: bool) -> Self {
        match (component, negative) {
            (Component::X, false) => SignedAxis::PosX,
            (Component::X, true) => SignedAxis::NegX,
            (Component::Y, false) => SignedAxis::PosY,
            (Component::Y, true) => SignedAxis::NegY,
            (Component::Z, false) => SignedAxis::PosZ,
            (Component::Z, true) => SignedAxis::NegZ,
        }
    }

    /// Returns the physical axis this signed axis lies on.
    pub fn component(&self) -> Component {
        match self {
            SignedAxis::PosX | SignedAxis::NegX => Component::X,
            SignedAxis::PosY | SignedAxis::NegY => Component::Y,
            SignedAxis::PosZ | SignedAxis::NegZ => Component::Z,
        }
    }

    /// Returns true for the negative direction.
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            SignedAxis::NegX | SignedAxis::NegY | SignedAxis::NegZ
        )
    }

    /// Returns the unit vector for this axis.
    pub fn vector(&self) -> [i32; 3] {
        let mut v = [0; 3];
        v[self.component().index()] = if self.is_negative() { -1 } else { 1 };
        v
    }

    /// Returns the signed axis for a unit vector, if it is one.
    pub fn from_vector(v: [i32; 3]) -> Option<Self> {
        let mut found = None;
        for (index, value) in v.iter().enumerate() {
            match value {
                0 => {}
                1 | -1 if found.is_none() => {
                    let component = Component::from_index(index)?;
                    found = Some(SignedAxis::new(component, *value < 0));
                }
                _ => return None,
            }
        }
        found
    }

    /// Returns the display form ("+X", "-Z", ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            SignedAxis::PosX => "+X",
            SignedAxis::NegX => "-X",
            SignedAxis::PosY => "+Y",
            SignedAxis::NegY => "-Y",
            SignedAxis::PosZ => "+Z",
            SignedAxis::NegZ => "-Z",
        }
    }
}

impl std::fmt::Display for SignedAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SignedAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "+X" | "X" | "POS_X" => Ok(SignedAxis::PosX),
            "-X" | "NEG_X" => Ok(SignedAxis::NegX),
            "+Y" | "Y" | "POS_Y" => Ok(SignedAxis::PosY),
            "-Y" | "NEG_Y" => Ok(SignedAxis::NegY),
            "+Z" | "Z" | "POS_Z" => Ok(SignedAxis::PosZ),
            "-Z" | "NEG_Z" => Ok(SignedAxis::NegZ),
            _ => Err(format!("unknown axis: {}", s)),
        }
    }
}

/// Where each output channel of an axis-dependent map is sourced from.
///
/// Output channel order is fixed: right → R, forward → G, up → B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisAssignment {
    pub right: SignedAxis,
    pub forward: SignedAxis,
    pub up: SignedAxis,
}

impl AxisAssignment {
    /// The renderer's native convention (right +X, forward +Y, up +Z).
    ///
    /// Also the fallback for degenerate forward/up pairs.
    pub fn identity() -> Self {
        Self {
            right: SignedAxis::PosX,
            forward: SignedAxis::PosY,
            up: SignedAxis::PosZ,
        }
    }

    /// Returns the sources in output channel order (R, G, B).
    pub fn channels(&self) -> [SignedAxis; 3] {
        [self.right, self.forward, self.up]
    }
}

impl Default for AxisAssignment {
    fn default() -> Self {
        Self::identity()
    }
}

/// Axis resolution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AxisError {
    /// Forward and up share a physical axis, so no right axis exists.
    #[error("forward axis {forward} and up axis {up} lie on the same physical axis")]
    DegenerateAxes { forward: SignedAxis, up: SignedAxis },
}

/// Resolves a forward/up convention into a right-handed assignment.
pub fn resolve(forward: SignedAxis, up: SignedAxis) -> Result<AxisAssignment, AxisError> {
    if forward.component() == up.component() {
        return Err(AxisError::DegenerateAxes { forward, up });
    }

    let right = SignedAxis::from_vector(cross(forward.vector(), up.vector()))
        .ok_or(AxisError::DegenerateAxes { forward, up })?;

    Ok(AxisAssignment { right, forward, up })
}

/// Resolves a convention, substituting the identity assignment when the
/// pair is degenerate.
///
/// The error is returned alongside the fallback so callers can surface it;
/// it is also logged as a warning.
pub fn resolve_or_fallback(
    forward: SignedAxis,
    up: SignedAxis,
) -> (AxisAssignment, Option<AxisError>) {
    match resolve(forward, up) {
        Ok(assignment) => (assignment, None),
        Err(err) => {
            log::warn!("{}; falling back to right +X, forward +Y, up +Z", err);
            (AxisAssignment::identity(), Some(err))
        }
    }
}

fn cross(a: [i32; 3], b: [i32; 3]) -> [i32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_axis() -> impl Strategy<Value = SignedAxis> {
        proptest::sample::select(SignedAxis::all().to_vec())
    }

    #[test]
    fn test_default_convention_is_identity() {
        let assignment = resolve(SignedAxis::PosY, SignedAxis::PosZ).unwrap();
        assert_eq!(assignment, AxisAssignment::identity());
    }

    #[test]
    fn test_y_up_convention() {
        let assignment = resolve(SignedAxis::PosZ, SignedAxis::PosY).unwrap();
        assert_eq!(assignment.right, SignedAxis::NegX);
    }

    #[test]
    fn test_known_right_axes() {
        let cases = [
            (SignedAxis::PosY, SignedAxis::PosX, SignedAxis::NegZ),
            (SignedAxis::PosY, SignedAxis::NegZ, SignedAxis::NegX),
            (SignedAxis::NegY, SignedAxis::PosZ, SignedAxis::NegX),
            (SignedAxis::PosX, SignedAxis::PosZ, SignedAxis::NegY),
            (SignedAxis::NegX, SignedAxis::PosY, SignedAxis::NegZ),
            (SignedAxis::NegZ, SignedAxis::PosX, SignedAxis::NegY),
        ];
        for (forward, up, right) in cases {
            assert_eq!(resolve(forward, up).unwrap().right, right, "{forward}/{up}");
        }
    }

    #[test]
    fn test_exactly_twelve_degenerate_pairs() {
        let mut degenerate = 0;
        let mut valid = 0;
        for &forward in SignedAxis::all() {
            for &up in SignedAxis::all() {
                match resolve(forward, up) {
                    Ok(_) => valid += 1,
                    Err(AxisError::DegenerateAxes { .. }) => degenerate += 1,
                }
            }
        }
        assert_eq!(degenerate, 12);
        assert_eq!(valid, 24);
    }

    #[test]
    fn test_fallback_is_identity_and_reports() {
        let (assignment, err) = resolve_or_fallback(SignedAxis::PosY, SignedAxis::NegY);
        assert_eq!(assignment, AxisAssignment::identity());
        assert_eq!(
            err,
            Some(AxisError::DegenerateAxes {
                forward: SignedAxis::PosY,
                up: SignedAxis::NegY
            })
        );
    }

    #[test]
    fn test_axis_parsing() {
        assert_eq!("+y".parse::<SignedAxis>().unwrap(), SignedAxis::PosY);
        assert_eq!("NEG_Z".parse::<SignedAxis>().unwrap(), SignedAxis::NegZ);
        assert!("w".parse::<SignedAxis>().is_err());
    }

    #[test]
    fn test_axis_serde_identifiers() {
        let json = serde_json::to_string(&SignedAxis::NegX).unwrap();
        assert_eq!(json, "\"NEG_X\"");
    }

    proptest! {
        #[test]
        fn resolve_is_deterministic(forward in any_axis(), up in any_axis()) {
            prop_assert_eq!(resolve(forward, up), resolve(forward, up));
            prop_assert_eq!(resolve_or_fallback(forward, up), resolve_or_fallback(forward, up));
        }

        #[test]
        fn valid_pairs_are_right_handed(forward in any_axis(), up in any_axis()) {
            if let Ok(a) = resolve(forward, up) {
                prop_assert_eq!(a.right.vector(), cross(a.forward.vector(), a.up.vector()));
                let components = [a.right.component(), a.forward.component(), a.up.component()];
                prop_assert!(components[0] != components[1]);
                prop_assert!(components[1] != components[2]);
                prop_assert!(components[0] != components[2]);
                // right × forward = up closes the cycle
                prop_assert_eq!(cross(a.right.vector(), a.forward.vector()), a.up.vector());
            } else {
                prop_assert_eq!(forward.component(), up.component());
            }
        }
    }
}

// Angle helpers for wrapped module headings
//
// Canonical representation: degrees in [0, 360).

/// One full turn in degrees
pub const FULL_TURN_DEG: f64 = 360.0;
const HALF_TURN_DEG: f64 = 180.0;

/// Wrap any angle (degrees) into [0, 360)
///
/// Total over finite inputs: negatives, values above a full turn and exact
/// multiples of 360 all land strictly inside the range.
pub fn normalize_degrees(raw: f64) -> f64 {
    let wrapped = raw.rem_euclid(FULL_TURN_DEG);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if wrapped >= FULL_TURN_DEG { 0.0 } else { wrapped }
}

/// Convert a fractional rotation count (1.0 = one turn) to a wrapped angle
pub fn rotations_to_degrees(rotations: f64) -> f64 {
    normalize_degrees(rotations * FULL_TURN_DEG)
}

/// Convert a wrapped angle to a rotation fraction in [0, 1)
pub fn degrees_to_rotations(degrees: f64) -> f64 {
    normalize_degrees(degrees) / FULL_TURN_DEG
}

/// Signed shortest rotation from `from` to `to`, in (-180, 180]
pub fn shortest_delta(from: f64, to: f64) -> f64 {
    let delta = normalize_degrees(to - from);
    if delta > HALF_TURN_DEG {
        delta - FULL_TURN_DEG
    } else {
        delta
    }
}

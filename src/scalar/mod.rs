/// Floating point type used for times, states and tolerances
pub type RealType = f64;

pub type IndexType = usize;

/// Unit roundoff of [RealType]
pub const UNIT_ROUNDOFF: RealType = RealType::EPSILON;

/// Weighted root-mean-square norm, `sqrt(sum((v_i * w_i)^2) / n)`.
pub fn wrms_norm(v: &[RealType], w: &[RealType]) -> RealType {
    if v.is_empty() {
        return 0.0;
    }
    let sum = v
        .iter()
        .zip(w.iter())
        .map(|(vi, wi)| (vi * wi) * (vi * wi))
        .sum::<RealType>();
    (sum / v.len() as RealType).sqrt()
}

use nalgebra::DVector;
use num_traits::{abs, One, Zero};

use crate::{IndexType, RealType, UNIT_ROUNDOFF};

/// Locates zero crossings of a vector of root functions over an interval.
///
/// A component that is exactly zero at the lower boundary is not considered
/// to cross until it leaves zero, so a root that was just reported is not
/// found again at the start of the next interval.
pub struct RootFinder {
    t0: RealType,
    g0: DVector<RealType>,
    g1: DVector<RealType>,
    gmid: DVector<RealType>,
}

impl RootFinder {
    pub fn new(nroots: IndexType) -> Self {
        Self {
            t0: RealType::zero(),
            g0: DVector::zeros(nroots),
            g1: DVector::zeros(nroots),
            gmid: DVector::zeros(nroots),
        }
    }

    pub fn nroots(&self) -> IndexType {
        self.g0.len()
    }

    pub fn t0(&self) -> RealType {
        self.t0
    }

    /// Set the lower boundary of the root search.
    /// This function should be called first after [Self::new]
    pub fn set_g0(
        &mut self,
        t: RealType,
        mut eval: impl FnMut(RealType, &mut [RealType]) -> i32,
    ) -> Result<(), i32> {
        let flag = eval(t, self.g0.as_mut_slice());
        if flag != 0 {
            return Err(flag);
        }
        self.t0 = t;
        Ok(())
    }

    // returns (zero found at g1 with a non-zero g0, index of the earliest sign change)
    fn scan(g0: &DVector<RealType>, g1: &DVector<RealType>) -> (bool, Option<IndexType>) {
        let mut rootfnd = false;
        let mut gfracmax = RealType::zero();
        let mut imax = None;
        for (i, (&g0, &g1)) in g0.iter().zip(g1.iter()).enumerate() {
            if g0 == RealType::zero() {
                continue;
            }
            if g1 == RealType::zero() {
                rootfnd = true;
            } else if g0 * g1 < RealType::zero() {
                let gfrac = abs(g1 / (g1 - g0));
                if imax.is_none() || gfrac > gfracmax {
                    gfracmax = gfrac;
                    imax = Some(i);
                }
            }
        }
        (rootfnd, imax)
    }

    /// Set the upper boundary of the root search and check for a zero crossing in `(t0, t]`.
    ///
    /// If a crossing is found, the time of the earliest root is returned and
    /// [Self::root_directions] reports which components fired; the root becomes the lower
    /// boundary of the next search.
    /// Otherwise `t` becomes the new lower boundary.
    ///
    /// The root is located with the modified secant (Illinois) method described in the
    /// Sundials docs:
    /// <https://sundials.readthedocs.io/en/latest/cvode/Mathematics_link.html#rootfinding>
    pub fn set_g1(
        &mut self,
        t: RealType,
        mut eval: impl FnMut(RealType, &mut [RealType]) -> i32,
    ) -> Result<Option<RealType>, i32> {
        let flag = eval(t, self.g1.as_mut_slice());
        if flag != 0 {
            return Err(flag);
        }

        let (rootfnd, imax) = Self::scan(&self.g0, &self.g1);
        let mut imax = match imax {
            Some(imax) => imax,
            None => {
                if rootfnd {
                    // found a root at the upper boundary and no other sign change
                    return Ok(Some(t));
                }
                self.t0 = t;
                std::mem::swap(&mut self.g0, &mut self.g1);
                return Ok(None);
            }
        };

        let mut alpha = RealType::one();
        let mut sign_change = [false, true];
        let mut i = 0;
        let mut t1 = t;
        let mut t0 = self.t0;
        let tol = 100.0 * UNIT_ROUNDOFF * (abs(t1) + abs(t1 - t0));
        let half = 0.5;
        let double = 2.0;
        let five = 5.0;
        let pntone = 0.1;
        while abs(t1 - t0) > tol {
            let mut t_mid =
                t1 - (t1 - t0) * self.g1[imax] / (self.g1[imax] - alpha * self.g0[imax]);

            // adjust t_mid away from the boundaries
            if abs(t_mid - t0) < half * tol {
                let fracint = abs(t1 - t0) / tol;
                let fracsub = if fracint > five {
                    pntone
                } else {
                    half / fracint
                };
                t_mid = t0 + fracsub * (t1 - t0);
            }
            if abs(t1 - t_mid) < half * tol {
                let fracint = abs(t1 - t0) / tol;
                let fracsub = if fracint > five {
                    pntone
                } else {
                    half / fracint
                };
                t_mid = t1 - fracsub * (t1 - t0);
            }

            let flag = eval(t_mid, self.gmid.as_mut_slice());
            if flag != 0 {
                return Err(flag);
            }

            let (rootfnd, imax_mid) = Self::scan(&self.g0, &self.gmid);
            let lower = imax_mid.is_some();
            if let Some(imax_mid) = imax_mid {
                // Sign change found in (tlo,tmid); replace thi with tmid.
                t1 = t_mid;
                imax = imax_mid;
                std::mem::swap(&mut self.g1, &mut self.gmid);
            } else if rootfnd {
                // No sign change in (tlo,tmid), but g = 0 at tmid; return root tmid.
                t1 = t_mid;
                std::mem::swap(&mut self.g1, &mut self.gmid);
                break;
            } else {
                // No sign change in (tlo,tmid), and no zero at tmid. Sign change must be in
                // (tmid,thi). Replace tlo with tmid.
                t0 = t_mid;
                std::mem::swap(&mut self.g0, &mut self.gmid);
            }

            sign_change[i % 2] = lower;
            if i >= 2 {
                alpha = if sign_change[0] != sign_change[1] {
                    RealType::one()
                } else if sign_change[0] {
                    half * alpha
                } else {
                    double * alpha
                };
            }
            i += 1;
        }
        Ok(Some(t1))
    }

    /// After [Self::set_g1] returned a root, fill `roots` with `+1` for components that rose
    /// through zero, `-1` for those that fell through zero and `0` for the rest, then make the
    /// root the lower boundary of the next search.
    pub fn root_directions(&mut self, t_root: RealType, roots: &mut [i32]) {
        for (i, r) in roots.iter_mut().enumerate() {
            let (g0, g1) = (self.g0[i], self.g1[i]);
            *r = if g0 != RealType::zero() && (g1 == RealType::zero() || g0 * g1 < RealType::zero())
            {
                if g0 < RealType::zero() {
                    1
                } else {
                    -1
                }
            } else {
                0
            };
        }
        self.t0 = t_root;
        std::mem::swap(&mut self.g0, &mut self.g1);
    }
}

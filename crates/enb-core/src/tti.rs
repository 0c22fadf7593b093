use core::fmt;

/// Number of subframes in a hyperframe (1024 frames of 10 subframes)
pub const TTIS_PER_HYPERFRAME: u32 = 10240;

/// FDD HARQ feedback delay in subframes: a TB sent at `n` is acked at `n + 4`
pub const FDD_HARQ_DELAY_MS: u32 = 4;

/// Difference between two raw TTI counts, handling hyperframe wrap-around.
/// The result is in `[-5120, 5120)`.
pub fn tti_diff(a: u32, b: u32) -> i32 {
    let wrap = TTIS_PER_HYPERFRAME as i32;
    let mut diff = a as i32 - b as i32;
    while diff < -wrap / 2 {
        diff += wrap;
    }
    while diff >= wrap / 2 {
        diff -= wrap;
    }
    diff
}

/// A point on the 1 ms TTI clock, kept reduced modulo the hyperframe.
///
/// All timing comparisons go through [`TtiPoint::diff`]; raw integer ordering
/// on the wrapped count is meaningless and deliberately not implemented.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TtiPoint(u32);

impl TtiPoint {
    pub fn new(count: u32) -> TtiPoint {
        TtiPoint(count % TTIS_PER_HYPERFRAME)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// System frame number, 0..1023
    pub fn sfn(self) -> u32 {
        self.0 / 10
    }

    /// Subframe index within the frame, 0..9
    pub fn sf_idx(self) -> u32 {
        self.0 % 10
    }

    /// Add a (possibly negative) number of subframes
    pub fn add(self, subframes: i32) -> TtiPoint {
        let wrap = TTIS_PER_HYPERFRAME as i32;
        TtiPoint(((self.0 as i32 + subframes).rem_euclid(wrap)) as u32)
    }

    /// Signed difference in subframes, `self - other`, in `[-5120, 5120)`
    pub fn diff(self, other: TtiPoint) -> i32 {
        tti_diff(self.0, other.0)
    }

    /// Age of this point compared to now
    #[inline(always)]
    pub fn age(self, now: TtiPoint) -> i32 {
        now.diff(self)
    }

    /// True if this point lies strictly before `other` on the wrapped clock
    pub fn is_before(self, other: TtiPoint) -> bool {
        self.diff(other) < 0
    }

    /// The TTI at which HARQ feedback for a transmission at `self` is expected
    pub fn ack_tti(self) -> TtiPoint {
        self.add(FDD_HARQ_DELAY_MS as i32)
    }

    /// The TTI at which a grant issued at `self` takes effect on the air
    pub fn tx_tti(self) -> TtiPoint {
        self.add(FDD_HARQ_DELAY_MS as i32)
    }
}

impl fmt::Display for TtiPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4}.{}", self.sfn(), self.sf_idx())
    }
}

impl fmt::Debug for TtiPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4}.{}", self.sfn(), self.sf_idx())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_diff_across_wrap() {
        let initial = TtiPoint::new(0);

        let mut tti = initial;
        // Walk forward far enough that the hyperframe wraps many times
        let iterations = 50000;
        let increment = 1234;
        for _ in 0..iterations {
            let next = tti.add(increment);
            assert_eq!(next.diff(tti), increment);
            assert_eq!(tti.diff(next), -increment);
            tti = next;
        }

        // Walk back; must land exactly on the initial point
        for _ in 0..iterations {
            let next = tti.add(-increment);
            assert_eq!(next.diff(tti), -increment);
            tti = next;
        }
        assert_eq!(tti, initial);
    }

    #[test]
    fn test_no_raw_ordering() {
        // 10239 is one subframe before 0 on the wrapped clock
        let late = TtiPoint::new(TTIS_PER_HYPERFRAME - 1);
        let early = TtiPoint::new(0);
        assert!(late.is_before(early));
        assert_eq!(early.diff(late), 1);
        assert_eq!(late.age(early), 1);
    }

    #[test]
    fn test_sfn_sf_idx() {
        let tti = TtiPoint::new(10235);
        assert_eq!(tti.sfn(), 1023);
        assert_eq!(tti.sf_idx(), 5);
        assert_eq!(tti.add(5), TtiPoint::new(0));
    }

    #[test]
    fn test_harq_timing() {
        let tx = TtiPoint::new(200);
        assert_eq!(tx.ack_tti(), TtiPoint::new(204));
    }
}

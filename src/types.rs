/// Whether submodels assume a known (zero, after centering) mean or
/// estimate a constant trend jointly with the prediction (§4.6, §9's
/// resolved Open Question: universal Kriging with a constant trend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KrigingType {
    Simple,
    Ordinary,
}

impl KrigingType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "ordinary" => KrigingType::Ordinary,
            _ => KrigingType::Simple,
        }
    }
}

/// Bitfield controlling which optional outputs the driver populates,
/// mirroring §6's `outputLevel` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLevel {
    raw: i64,
}

impl OutputLevel {
    pub const PER_SUBMODEL: i64 = 1;
    pub const FULL_TENSORS: i64 = 2;
    pub const JOINT_COV: i64 = 10;

    pub fn new(raw: i64) -> Self {
        OutputLevel { raw }
    }

    /// `-1` requests alternatives only, `-3` alternatives plus the nested
    /// predictor; any negative value enables alternatives.
    pub fn alternatives_requested(&self) -> bool {
        self.raw < 0
    }

    /// Whether the nested predictor itself should be computed. Only the
    /// `-1` (alternatives-only) case skips it.
    pub fn nested_requested(&self) -> bool {
        self.raw != -1
    }

    fn magnitude(&self) -> i64 {
        self.raw.abs()
    }

    /// `outputLevel` is not a pure power-of-two bitmask: `+1`/`+2` are
    /// ones-digit bit flags, but `+10` is an additive tens-digit signal (so
    /// `12` means "full tensors and joint cov", not "full tensors" with a
    /// stray high bit). The ones digit carries the low bit flags; anything
    /// from `10` up flips the joint-cov signal on.
    fn bits(&self) -> i64 {
        self.magnitude() % 10
    }

    pub fn per_submodel(&self) -> bool {
        self.bits() & Self::PER_SUBMODEL != 0
    }

    pub fn full_tensors(&self) -> bool {
        self.bits() & Self::FULL_TENSORS != 0
    }

    pub fn joint_cov(&self) -> bool {
        self.magnitude() >= Self::JOINT_COV
    }
}

/// Per-phase wall-clock durations, labelled as in §6's output aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DurationDetails {
    pub part_a: f64,
    pub part_b: f64,
    pub part_c: f64,
    pub part_d: f64,
    pub part_e: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_level_zero_requests_only_base() {
        let level = OutputLevel::new(0);
        assert!(!level.per_submodel());
        assert!(!level.full_tensors());
        assert!(!level.joint_cov());
        assert!(level.nested_requested());
        assert!(!level.alternatives_requested());
    }

    #[test]
    fn output_level_combines_bits() {
        let level = OutputLevel::new(3);
        assert!(level.per_submodel());
        assert!(level.full_tensors());
        assert!(!level.joint_cov());
    }

    #[test]
    fn full_tensors_alone_does_not_imply_joint_cov() {
        let level = OutputLevel::new(2);
        assert!(!level.per_submodel());
        assert!(level.full_tensors());
        assert!(!level.joint_cov());
    }

    #[test]
    fn joint_cov_alone_does_not_imply_full_tensors() {
        let level = OutputLevel::new(10);
        assert!(!level.per_submodel());
        assert!(!level.full_tensors());
        assert!(level.joint_cov());
    }

    #[test]
    fn joint_cov_combines_with_ones_digit_bits() {
        let level = OutputLevel::new(13);
        assert!(level.per_submodel());
        assert!(level.full_tensors());
        assert!(level.joint_cov());
    }

    #[test]
    fn negative_output_level_requests_alternatives() {
        let alt_only = OutputLevel::new(-1);
        assert!(alt_only.alternatives_requested());
        assert!(!alt_only.nested_requested());

        let both = OutputLevel::new(-3);
        assert!(both.alternatives_requested());
        assert!(both.nested_requested());
        assert!(both.per_submodel());
    }
}

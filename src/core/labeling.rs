//! Ground-truth labeling of heart-rate readings.

/// Default abnormality threshold in beats per minute.
pub const DEFAULT_THRESHOLD: i32 = 100;

/// Maps a reading to its ground-truth label (`true` = abnormal).
///
/// Implementations must be pure: the same value always gets the same label.
pub trait LabelingPolicy: Send + Sync {
    fn label(&self, value: i32) -> bool;
}

/// Labels a reading abnormal when it is strictly above a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub threshold: i32,
}

impl ThresholdPolicy {
    pub fn new(threshold: i32) -> Self {
        Self { threshold }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl LabelingPolicy for ThresholdPolicy {
    fn label(&self, value: i32) -> bool {
        value > self.threshold
    }
}

impl<F> LabelingPolicy for F
where
    F: Fn(i32) -> bool + Send + Sync,
{
    fn label(&self, value: i32) -> bool {
        self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict() {
        let policy = ThresholdPolicy::default();
        assert!(!policy.label(60));
        assert!(!policy.label(100));
        assert!(policy.label(101));
        assert!(policy.label(180));
    }

    #[test]
    fn test_custom_threshold() {
        let policy = ThresholdPolicy::new(120);
        assert!(!policy.label(110));
        assert!(!policy.label(120));
        assert!(policy.label(121));
    }

    #[test]
    fn test_closure_policy() {
        // Bradycardia or tachycardia
        let policy = |bpm: i32| !(50..=100).contains(&bpm);
        assert!(policy.label(45));
        assert!(!policy.label(70));
        assert!(policy.label(120));
    }
}

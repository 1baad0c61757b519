//! 扫描序列临床相关性分类器
//!
//! 按序列名的启发式规则给出"可能临床相关"的初始判断，
//! 结果仅作为种子，最终以人工确认为准。

use regex::{Regex, RegexSet};

/// 序列名分类器
///
/// 规则不区分大小写；t1/t2 要求前一个字符不是字母，避免匹配
/// 诸如 "sat1" 的序列名；含 "kspace" 的序列名一律非临床。
#[derive(Debug)]
pub struct ScanClassifier {
    rules: RegexSet,
    kspace: Regex,
}

impl ScanClassifier {
    pub fn new() -> Self {
        let rules = RegexSet::new([
            r"(?i)(^|[^a-z])t1",
            r"(?i)(^|[^a-z])t2",
            r"(?i)mprage",
            r"(?i)qsm",
            r"(?i)flair",
            r"(?i)fl3d",
        ])
        .expect("classifier patterns are valid");
        let kspace = Regex::new(r"(?i)kspace").expect("kspace pattern is valid");
        Self { rules, kspace }
    }

    /// 该序列名是否可能临床相关
    pub fn is_likely_clinical(&self, name: &str) -> bool {
        if self.kspace.is_match(name) {
            return false;
        }
        self.rules.is_match(name)
    }
}

impl Default for ScanClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clinical_sequences() {
        let classifier = ScanClassifier::new();

        assert!(classifier.is_likely_clinical("t2_space_sag_p2_iso"));
        assert!(classifier.is_likely_clinical("Head_t1_mprage"));
        assert!(classifier.is_likely_clinical("t1_mprage_sag_p3_iso_1_ADNI"));
        assert!(classifier.is_likely_clinical("Head_No MT fl3d_axial_p2_iso"));
        assert!(classifier.is_likely_clinical("QSM_p2_1mm"));
        assert!(classifier.is_likely_clinical("FLAIR_3D"));
    }

    #[test]
    fn test_non_clinical_sequences() {
        let classifier = ScanClassifier::new();

        assert!(!classifier.is_likely_clinical("Shouldnt_be_shown"));
        assert!(!classifier.is_likely_clinical("localizer"));
        assert!(!classifier.is_likely_clinical("AAHead_Scout"));
    }

    #[test]
    fn test_kspace_guard() {
        let classifier = ScanClassifier::new();

        // kspace守卫优先于所有匹配规则
        assert!(!classifier.is_likely_clinical("localizer_kspace"));
        assert!(!classifier.is_likely_clinical("t2_space_kspace"));
        assert!(!classifier.is_likely_clinical("KSPACE_t1_mprage"));
    }

    #[test]
    fn test_letter_boundary_for_t1_t2() {
        let classifier = ScanClassifier::new();

        // t1/t2 前是字母时不匹配
        assert!(!classifier.is_likely_clinical("sat1_weighted"));
        assert!(!classifier.is_likely_clinical("post2_recon"));
        // 数字、下划线或行首可以
        assert!(classifier.is_likely_clinical("t1"));
        assert!(classifier.is_likely_clinical("3D_T2_tse"));
    }
}

//! 数据状态机
//!
//! 管理影像会话数据状态的生命周期转换

use ifr_core::{DataStatus, IfrError, Result};

/// 终止状态：这些会话永远不会被报告
pub const TERMINAL_STATUSES: [DataStatus; 2] = [DataStatus::NotScanned, DataStatus::Excluded];

/// 待修复状态：会话出现在管理员修复队列中
pub const REPAIR_STATUSES: [DataStatus; 5] = [
    DataStatus::InvalidLabel,
    DataStatus::NotFound,
    DataStatus::ArchivedElsewhere,
    DataStatus::FixRequired,
    DataStatus::FoundNoClinical,
];

/// 修复操作允许的目标状态
pub const FIX_OPTIONS: [DataStatus; 6] = [
    DataStatus::Present,
    DataStatus::NotScanned,
    DataStatus::FixRequired,
    DataStatus::NotRequired,
    DataStatus::Excluded,
    DataStatus::ArchivedElsewhere,
];

/// 状态转换事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// 管理员修复操作，指定目标状态
    Repaired(DataStatus),
    /// 归档坐标变化后的自动复查结果
    Rechecked { found: bool },
    /// 临床审查确定会话不含临床相关扫描
    ClinicalReviewFoundNone,
    /// 管理员将无临床扫描的会话标记为不需要报告
    PromotedNotRequired,
}

/// 数据状态机
#[derive(Debug, Default)]
pub struct DataStatusMachine;

impl DataStatusMachine {
    pub fn new() -> Self {
        Self
    }

    /// 检查修复目标是否在允许的目标集合内
    pub fn is_fix_option(target: DataStatus) -> bool {
        FIX_OPTIONS.contains(&target)
    }

    /// 状态是否为终止状态（永不报告）
    pub fn is_terminal(status: DataStatus) -> bool {
        TERMINAL_STATUSES.contains(&status)
    }

    /// 状态是否需要修复
    pub fn needs_repair(status: DataStatus) -> bool {
        REPAIR_STATUSES.contains(&status)
    }

    /// 修复队列排序用的严重程度等级，数值越小越靠前
    pub fn repair_severity(status: DataStatus) -> Option<u8> {
        match status {
            DataStatus::InvalidLabel => Some(0),
            DataStatus::FixRequired => Some(1),
            DataStatus::NotFound => Some(2),
            DataStatus::ArchivedElsewhere => Some(3),
            DataStatus::FoundNoClinical => Some(4),
            _ => None,
        }
    }

    /// 执行状态转换
    pub fn transition(&self, from: DataStatus, event: &StatusEvent) -> Result<DataStatus> {
        match event {
            StatusEvent::Repaired(target) => {
                if Self::is_fix_option(*target) {
                    Ok(*target)
                } else {
                    Err(invalid(from, *target))
                }
            }
            StatusEvent::Rechecked { found } => {
                if *found {
                    Ok(DataStatus::Present)
                } else {
                    Ok(DataStatus::NotFound)
                }
            }
            StatusEvent::ClinicalReviewFoundNone => {
                if from == DataStatus::Present {
                    Ok(DataStatus::FoundNoClinical)
                } else {
                    Err(invalid(from, DataStatus::FoundNoClinical))
                }
            }
            StatusEvent::PromotedNotRequired => {
                if from == DataStatus::FoundNoClinical {
                    Ok(DataStatus::NotRequired)
                } else {
                    Err(invalid(from, DataStatus::NotRequired))
                }
            }
        }
    }
}

fn invalid(from: DataStatus, to: DataStatus) -> IfrError {
    IfrError::InvalidStatusTransition {
        from: from.label().to_string(),
        to: to.label().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_options() {
        let sm = DataStatusMachine::new();

        // 允许的修复目标
        for target in FIX_OPTIONS {
            let result = sm.transition(DataStatus::NotFound, &StatusEvent::Repaired(target));
            assert_eq!(result.unwrap(), target);
        }

        // 不允许直接修复到的状态
        for target in [
            DataStatus::Unknown,
            DataStatus::NotFound,
            DataStatus::InvalidLabel,
            DataStatus::NotChecked,
            DataStatus::FoundNoClinical,
        ] {
            assert!(sm
                .transition(DataStatus::NotFound, &StatusEvent::Repaired(target))
                .is_err());
        }
    }

    #[test]
    fn test_recheck_outcomes() {
        let sm = DataStatusMachine::new();

        let found = sm
            .transition(DataStatus::NotFound, &StatusEvent::Rechecked { found: true })
            .unwrap();
        assert_eq!(found, DataStatus::Present);

        let missing = sm
            .transition(DataStatus::Present, &StatusEvent::Rechecked { found: false })
            .unwrap();
        assert_eq!(missing, DataStatus::NotFound);
    }

    #[test]
    fn test_found_no_clinical_only_from_present() {
        let sm = DataStatusMachine::new();

        assert_eq!(
            sm.transition(DataStatus::Present, &StatusEvent::ClinicalReviewFoundNone)
                .unwrap(),
            DataStatus::FoundNoClinical
        );
        assert!(sm
            .transition(DataStatus::NotFound, &StatusEvent::ClinicalReviewFoundNone)
            .is_err());
    }

    #[test]
    fn test_not_required_promotion() {
        let sm = DataStatusMachine::new();

        assert_eq!(
            sm.transition(
                DataStatus::FoundNoClinical,
                &StatusEvent::PromotedNotRequired
            )
            .unwrap(),
            DataStatus::NotRequired
        );
        assert!(sm
            .transition(DataStatus::Present, &StatusEvent::PromotedNotRequired)
            .is_err());
    }

    #[test]
    fn test_repair_severity_ordering() {
        let invalid = DataStatusMachine::repair_severity(DataStatus::InvalidLabel).unwrap();
        let no_clinical = DataStatusMachine::repair_severity(DataStatus::FoundNoClinical).unwrap();
        assert!(invalid < no_clinical);
        assert!(DataStatusMachine::repair_severity(DataStatus::Present).is_none());
    }
}

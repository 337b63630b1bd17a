use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 发票状态 (唯一的规范状态枚举)
///
/// 供应商提交流程使用的旧名称 (`Pending`, `PM Approved`, `Info Requested` 等)
/// 只在边界处通过 [`InvoiceStatus::from_str`] 归一化:
///
/// | 旧名称 | 规范状态 |
/// |---|---|
/// | `Pending` | `RECEIVED` |
/// | `Processing` | `DIGITIZING` |
/// | `PM Approved` | `PENDING_APPROVAL` |
/// | `Info Requested` | `AWAITING_INFO` |
/// | `Approved` | `APPROVED` |
/// | `Rejected` | `REJECTED` |
/// | `Paid` | `PAID` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Received,
    Digitizing,
    ValidationRequired,
    MatchDiscrepancy,
    Verified,
    PendingApproval,
    Approved,
    Rejected,
    Paid,
    AwaitingInfo,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 10] = [
        InvoiceStatus::Received,
        InvoiceStatus::Digitizing,
        InvoiceStatus::ValidationRequired,
        InvoiceStatus::MatchDiscrepancy,
        InvoiceStatus::Verified,
        InvoiceStatus::PendingApproval,
        InvoiceStatus::Approved,
        InvoiceStatus::Rejected,
        InvoiceStatus::Paid,
        InvoiceStatus::AwaitingInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Received => "RECEIVED",
            InvoiceStatus::Digitizing => "DIGITIZING",
            InvoiceStatus::ValidationRequired => "VALIDATION_REQUIRED",
            InvoiceStatus::MatchDiscrepancy => "MATCH_DISCREPANCY",
            InvoiceStatus::Verified => "VERIFIED",
            InvoiceStatus::PendingApproval => "PENDING_APPROVAL",
            InvoiceStatus::Approved => "APPROVED",
            InvoiceStatus::Rejected => "REJECTED",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::AwaitingInfo => "AWAITING_INFO",
        }
    }

    /// 终态: PAID 永久终止; REJECTED 只能通过重新提交离开
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Rejected)
    }

    /// 状态转换表 (有向边)
    ///
    /// 在基础表之上: 所有非终态都可以进入 REJECTED;
    /// 处理中的状态可以进入 AWAITING_INFO, 供应商答复后回到 RECEIVED。
    pub fn allowed_targets(&self) -> &'static [InvoiceStatus] {
        use InvoiceStatus::*;
        match self {
            Received => &[Digitizing, AwaitingInfo, Rejected],
            Digitizing => &[ValidationRequired, MatchDiscrepancy, Verified, AwaitingInfo, Rejected],
            ValidationRequired => &[Digitizing, AwaitingInfo, Rejected],
            MatchDiscrepancy => &[Digitizing, Verified, AwaitingInfo, Rejected],
            Verified => &[PendingApproval, AwaitingInfo, Rejected],
            PendingApproval => &[Approved, AwaitingInfo, Rejected],
            Approved => &[Paid, Rejected],
            AwaitingInfo => &[Received, Rejected],
            Rejected => &[Received],
            Paid => &[],
        }
    }

    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        self.allowed_targets().contains(&next)
    }

    /// 校验一条完整路径 (起点为 self) 上的每一条边
    pub fn validate_path(&self, path: &[InvoiceStatus]) -> Result<(), (InvoiceStatus, InvoiceStatus)> {
        let mut from = *self;
        for &to in path {
            if !from.can_transition_to(to) {
                return Err((from, to));
            }
            from = to;
        }
        Ok(())
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown invoice status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    /// 同时接受规范名称和供应商流程的旧名称
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        let status = match normalized.as_str() {
            "RECEIVED" | "PENDING" => InvoiceStatus::Received,
            "DIGITIZING" | "PROCESSING" => InvoiceStatus::Digitizing,
            "VALIDATION_REQUIRED" => InvoiceStatus::ValidationRequired,
            "MATCH_DISCREPANCY" => InvoiceStatus::MatchDiscrepancy,
            "VERIFIED" => InvoiceStatus::Verified,
            "PENDING_APPROVAL" | "PM_APPROVED" => InvoiceStatus::PendingApproval,
            "APPROVED" => InvoiceStatus::Approved,
            "REJECTED" => InvoiceStatus::Rejected,
            "PAID" => InvoiceStatus::Paid,
            "AWAITING_INFO" | "INFO_REQUESTED" => InvoiceStatus::AwaitingInfo,
            _ => return Err(UnknownStatus(s.to_string())),
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_names_normalize() {
        assert_eq!("Pending".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::Received);
        assert_eq!("PM Approved".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::PendingApproval);
        assert_eq!("Info Requested".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::AwaitingInfo);
        assert_eq!("match_discrepancy".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::MatchDiscrepancy);
        assert!("Archived".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn canonical_names_round_trip() {
        for status in InvoiceStatus::ALL {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
    }

    #[test]
    fn every_status_reachable_from_received() {
        let mut seen = vec![InvoiceStatus::Received];
        let mut frontier = vec![InvoiceStatus::Received];
        while let Some(s) = frontier.pop() {
            for &next in s.allowed_targets() {
                if !seen.contains(&next) {
                    seen.push(next);
                    frontier.push(next);
                }
            }
        }
        assert_eq!(seen.len(), InvoiceStatus::ALL.len());
    }

    #[test]
    fn paid_is_a_dead_end() {
        assert!(InvoiceStatus::Paid.allowed_targets().is_empty());
        assert!(!InvoiceStatus::Paid.can_transition_to(InvoiceStatus::Rejected));
    }

    #[test]
    fn path_validation_reports_first_bad_edge() {
        let err = InvoiceStatus::Received
            .validate_path(&[InvoiceStatus::Digitizing, InvoiceStatus::PendingApproval])
            .unwrap_err();
        assert_eq!(err, (InvoiceStatus::Digitizing, InvoiceStatus::PendingApproval));
        assert!(InvoiceStatus::PendingApproval
            .validate_path(&[InvoiceStatus::Approved, InvoiceStatus::Paid])
            .is_ok());
    }
}

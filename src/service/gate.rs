use crate::models::{Actor, Invoice, InvoiceFilter, Role};

/// 受控操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewInvoice,
    ViewAuditLog,
    Submit,
    ManageIngestion,
    ProcessMatch,
    /// 匹配差异 / 人工复核状态下的手工放行
    OverrideMatch,
    ApproveMatch,
    FinanceApprove,
    ReleasePayment,
    Reject,
    RequestInfo,
    RespondInfo,
    Resubmit,
}

impl Permission {
    /// 每个权限允许的角色 (Admin 总是允许, 不必列出)
    pub fn roles(&self) -> &'static [Role] {
        match self {
            Permission::ViewInvoice => &[
                Role::Admin,
                Role::FinanceUser,
                Role::ProjectManager,
                Role::Vendor,
            ],
            Permission::ViewAuditLog => &[Role::Admin, Role::FinanceUser],
            Permission::Submit => &[Role::Admin, Role::FinanceUser, Role::Vendor],
            Permission::ManageIngestion => &[Role::Admin, Role::FinanceUser],
            Permission::ProcessMatch => &[Role::Admin, Role::FinanceUser],
            Permission::OverrideMatch => &[Role::Admin, Role::FinanceUser],
            Permission::ApproveMatch => &[Role::Admin, Role::ProjectManager],
            Permission::FinanceApprove => &[Role::Admin, Role::FinanceUser],
            Permission::ReleasePayment => &[Role::Admin],
            Permission::Reject => &[Role::Admin, Role::ProjectManager, Role::FinanceUser],
            Permission::RequestInfo => &[Role::Admin, Role::ProjectManager],
            Permission::RespondInfo => &[Role::Admin, Role::Vendor],
            Permission::Resubmit => &[Role::Admin, Role::Vendor],
        }
    }

    /// 日志 / 提示用名称
    pub fn name(&self) -> &'static str {
        match self {
            Permission::ViewInvoice => "view invoices",
            Permission::ViewAuditLog => "view the audit log",
            Permission::Submit => "submit invoices",
            Permission::ManageIngestion => "manage invoice ingestion",
            Permission::ProcessMatch => "run three-way matching",
            Permission::OverrideMatch => "override a failed match",
            Permission::ApproveMatch => "approve matched invoices",
            Permission::FinanceApprove => "give finance approval",
            Permission::ReleasePayment => "release payment",
            Permission::Reject => "reject invoices",
            Permission::RequestInfo => "request information",
            Permission::RespondInfo => "respond to information requests",
            Permission::Resubmit => "resubmit invoices",
        }
    }
}

/// 授权结果; 拒绝时总带原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// 只看角色的检查器
pub fn require_role(allowed: &'static [Role]) -> impl Fn(&Actor) -> GateDecision {
    move |actor: &Actor| {
        if actor.is_admin() || allowed.contains(&actor.role) {
            return GateDecision::allow();
        }
        let names: Vec<&str> = allowed.iter().map(|r| r.as_str()).collect();
        GateDecision::deny(format!(
            "role {} is not one of: {}",
            actor.role,
            names.join(", ")
        ))
    }
}

/// 角色 + 资源范围 (PM 限本人负责的项目, 供应商限本供应商的发票)
pub fn authorize(actor: &Actor, permission: Permission, resource: Option<&Invoice>) -> GateDecision {
    let by_role = require_role(permission.roles())(actor);
    if !by_role.allowed {
        return GateDecision::deny(format!(
            "{} may not {}: {}",
            actor.name,
            permission.name(),
            by_role.reason.unwrap_or_default()
        ));
    }

    let invoice = match resource {
        Some(invoice) => invoice,
        None => return GateDecision::allow(),
    };

    match actor.role {
        Role::ProjectManager => match invoice.project.as_deref() {
            Some(project) if actor.is_assigned_to(project) => GateDecision::allow(),
            Some(project) => GateDecision::deny(format!(
                "{} is not assigned to project {}",
                actor.name, project
            )),
            None => GateDecision::deny(format!(
                "invoice {} has no project, so {} cannot act on it",
                invoice.invoice_number, actor.name
            )),
        },
        Role::Vendor => match actor.vendor.as_deref() {
            Some(vendor) if vendor == invoice.vendor_name => GateDecision::allow(),
            _ => GateDecision::deny(format!(
                "invoice {} does not belong to {}'s vendor account",
                invoice.invoice_number, actor.name
            )),
        },
        Role::Admin | Role::FinanceUser => GateDecision::allow(),
    }
}

pub fn check_permission(actor: &Actor, permission: Permission, resource: Option<&Invoice>) -> bool {
    authorize(actor, permission, resource).allowed
}

/// 列表可见范围
pub fn visibility(actor: &Actor) -> InvoiceFilter {
    match actor.role {
        Role::Admin | Role::FinanceUser => InvoiceFilter::All,
        Role::ProjectManager => InvoiceFilter::Projects(actor.assigned_projects.clone()),
        Role::Vendor => match &actor.vendor {
            Some(vendor) => InvoiceFilter::Vendor(vendor.clone()),
            None => InvoiceFilter::Nothing,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewInvoice;
    use bigdecimal::BigDecimal;
    use chrono::Utc;

    fn invoice(project: Option<&str>) -> Invoice {
        Invoice::from_submission(
            NewInvoice {
                vendor_name: "Acme Supplies".to_string(),
                invoice_number: "INV-7".to_string(),
                invoice_date: None,
                amount: BigDecimal::from(100),
                currency: "INR".to_string(),
                line_items: vec![],
                po_number: None,
                project: project.map(str::to_string),
                assigned_pm: None,
            },
            "v1",
            Utc::now(),
        )
    }

    #[test]
    fn admin_passes_every_gate() {
        let admin = Actor::new("a1", "Asha", Role::Admin);
        let inv = invoice(Some("P9"));
        for perm in [
            Permission::ReleasePayment,
            Permission::RespondInfo,
            Permission::ApproveMatch,
            Permission::ViewAuditLog,
        ] {
            assert!(check_permission(&admin, perm, Some(&inv)));
        }
    }

    #[test]
    fn pm_is_limited_to_assigned_projects() {
        let pm = Actor::new("pm1", "Priya", Role::ProjectManager).with_projects(["P1"]);
        assert!(check_permission(&pm, Permission::ApproveMatch, Some(&invoice(Some("P1")))));

        let denied = authorize(&pm, Permission::ApproveMatch, Some(&invoice(Some("P2"))));
        assert!(!denied.allowed);
        assert!(denied.reason.unwrap().contains("P2"));

        assert!(!check_permission(&pm, Permission::ApproveMatch, Some(&invoice(None))));
    }

    #[test]
    fn vendor_only_sees_own_invoices() {
        let vendor = Actor::new("v1", "Vik", Role::Vendor).with_vendor("Acme Supplies");
        let other = Actor::new("v2", "Olu", Role::Vendor).with_vendor("Other Ltd");
        let inv = invoice(Some("P1"));

        assert!(check_permission(&vendor, Permission::Resubmit, Some(&inv)));
        assert!(!check_permission(&other, Permission::Resubmit, Some(&inv)));
        assert_eq!(visibility(&vendor), InvoiceFilter::Vendor("Acme Supplies".to_string()));
        assert_eq!(visibility(&Actor::new("v3", "Nia", Role::Vendor)), InvoiceFilter::Nothing);
    }

    #[test]
    fn role_denials_carry_a_reason() {
        let finance = Actor::new("f1", "Farah", Role::FinanceUser);
        let decision = require_role(&[Role::Admin])(&finance);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("FinanceUser"));

        assert!(!check_permission(&finance, Permission::ReleasePayment, None));
        assert!(!check_permission(&finance, Permission::ApproveMatch, None));
        assert!(check_permission(&finance, Permission::ViewAuditLog, None));
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    FinanceUser,
    ProjectManager,
    Vendor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::FinanceUser => "FinanceUser",
            Role::ProjectManager => "ProjectManager",
            Role::Vendor => "Vendor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "admin" => Ok(Role::Admin),
            "financeuser" | "finance" => Ok(Role::FinanceUser),
            "projectmanager" | "pm" => Ok(Role::ProjectManager),
            "vendor" => Ok(Role::Vendor),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// 操作者 (由外部会话层解析后传入, 核心只做授权不做认证)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub assigned_projects: Vec<String>,
    /// 供应商账号所属的供应商名称
    #[serde(default)]
    pub vendor: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            assigned_projects: Vec::new(),
            vendor: None,
        }
    }

    pub fn with_projects<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assigned_projects = projects.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_assigned_to(&self, project: &str) -> bool {
        self.assigned_projects.iter().any(|p| p == project)
    }
}

//! In-memory case store for tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;

use super::{
    AppUserRecord, CaseAction, CaseProvider, CaseRecord, DashboardStats, EmployeeRecord,
    ProviderResponse, RemediationOptions, RevokeScope,
};
use crate::discovery::DiscoveryResult;
use crate::error::{EngineError, EngineResult};
use crate::types::{Resolution, RiskLevel};

/// A mutating call received by [`InMemoryCaseProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    ExecuteRemediation { case_id: String, action: CaseAction },
    RevokeEmployeeAccess { employee_id: String, scope: RevokeScope },
    GlobalAppRemoval { app_id: String },
    RevokeAppForUsers { app_id: String, user_ids: Vec<String> },
    RecordScan { case_id: String },
    ResolveFindings { case_id: String },
}

/// Case store backed by in-process maps.
#[derive(Debug, Default)]
pub struct InMemoryCaseProvider {
    cases: RwLock<HashMap<String, CaseRecord>>,
    employees: RwLock<HashMap<String, EmployeeRecord>>,
    app_users: RwLock<HashMap<String, Vec<AppUserRecord>>>,
    scans: RwLock<HashMap<String, DiscoveryResult>>,
    calls: RwLock<Vec<ProviderCall>>,
    unavailable: RwLock<bool>,
}

impl InMemoryCaseProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_case(&self, case: CaseRecord) {
        self.cases.write().await.insert(case.id.clone(), case);
    }

    pub async fn add_employee(&self, employee: EmployeeRecord) {
        self.employees
            .write()
            .await
            .insert(employee.id.clone(), employee);
    }

    pub async fn add_app_user(&self, app_id: &str, user: AppUserRecord) {
        self.app_users
            .write()
            .await
            .entry(app_id.to_string())
            .or_default()
            .push(user);
    }

    /// Makes every call fail with [`EngineError::Provider`].
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    /// Mutating calls in arrival order.
    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.calls.read().await.clone()
    }

    /// Last scan recorded against a case.
    pub async fn scan_for(&self, case_id: &str) -> Option<DiscoveryResult> {
        self.scans.read().await.get(case_id).cloned()
    }

    async fn check(&self) -> EngineResult<()> {
        if *self.unavailable.read().await {
            return Err(EngineError::Provider("case store unavailable".into()));
        }
        Ok(())
    }

    async fn record(&self, call: ProviderCall) -> EngineResult<()> {
        self.check().await?;
        self.calls.write().await.push(call);
        Ok(())
    }
}

#[async_trait]
impl CaseProvider for InMemoryCaseProvider {
    async fn get_case(&self, case_id: &str) -> EngineResult<Option<CaseRecord>> {
        self.check().await?;
        Ok(self.cases.read().await.get(case_id).cloned())
    }

    async fn list_cases(&self) -> EngineResult<Vec<CaseRecord>> {
        self.check().await?;
        let mut cases: Vec<CaseRecord> = self.cases.read().await.values().cloned().collect();
        cases.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(cases)
    }

    async fn get_employee(&self, employee_id: &str) -> EngineResult<Option<EmployeeRecord>> {
        self.check().await?;
        Ok(self.employees.read().await.get(employee_id).cloned())
    }

    async fn get_dashboard_stats(&self) -> EngineResult<DashboardStats> {
        self.check().await?;
        let cases = self.cases.read().await;
        let scans = self.scans.read().await;
        let open_findings = scans
            .values()
            .flat_map(|s| s.findings.iter())
            .filter(|f| f.is_open());
        let (open, high): (usize, usize) = open_findings.fold((0, 0), |(open, high), f| {
            (open + 1, high + usize::from(f.severity >= RiskLevel::High))
        });
        Ok(DashboardStats {
            total_cases: cases.len(),
            open_cases: cases.values().filter(|c| c.status != "closed").count(),
            open_findings: open,
            high_risk_findings: high,
        })
    }

    async fn list_app_users(&self, app_id: &str) -> EngineResult<Vec<AppUserRecord>> {
        self.check().await?;
        Ok(self
            .app_users
            .read()
            .await
            .get(app_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_remediation(
        &self,
        case_id: &str,
        action: &CaseAction,
        _options: &RemediationOptions,
    ) -> EngineResult<ProviderResponse> {
        self.record(ProviderCall::ExecuteRemediation {
            case_id: case_id.to_string(),
            action: action.clone(),
        })
        .await?;
        if !self.cases.read().await.contains_key(case_id) {
            return Ok(ProviderResponse::error(format!("case {case_id} not found")));
        }
        Ok(ProviderResponse::success(json!({ "case_id": case_id })))
    }

    async fn revoke_employee_access(
        &self,
        employee_id: &str,
        scope: &RevokeScope,
    ) -> EngineResult<ProviderResponse> {
        self.record(ProviderCall::RevokeEmployeeAccess {
            employee_id: employee_id.to_string(),
            scope: scope.clone(),
        })
        .await?;
        Ok(ProviderResponse::success(
            json!({ "employee_id": employee_id, "scope": scope.to_string() }),
        ))
    }

    async fn global_app_removal(
        &self,
        app_id: &str,
        app_name: &str,
    ) -> EngineResult<ProviderResponse> {
        self.record(ProviderCall::GlobalAppRemoval {
            app_id: app_id.to_string(),
        })
        .await?;
        let mut app_users = self.app_users.write().await;
        let removed = app_users.get_mut(app_id).map_or(0, |users| {
            let active = users.iter().filter(|u| u.active).count();
            users.iter_mut().for_each(|u| u.active = false);
            active
        });
        Ok(ProviderResponse::success(
            json!({ "app_id": app_id, "app_name": app_name, "users_removed": removed }),
        ))
    }

    async fn revoke_app_for_users(
        &self,
        app_id: &str,
        user_ids: &[String],
    ) -> EngineResult<ProviderResponse> {
        self.record(ProviderCall::RevokeAppForUsers {
            app_id: app_id.to_string(),
            user_ids: user_ids.to_vec(),
        })
        .await?;
        let mut app_users = self.app_users.write().await;
        let mut removed = 0;
        if let Some(users) = app_users.get_mut(app_id) {
            for user in users.iter_mut().filter(|u| user_ids.contains(&u.employee_id)) {
                if user.active {
                    user.active = false;
                    removed += 1;
                }
            }
        }
        Ok(ProviderResponse::success(
            json!({ "app_id": app_id, "users_removed": removed }),
        ))
    }

    async fn record_scan(
        &self,
        case_id: &str,
        result: &DiscoveryResult,
    ) -> EngineResult<ProviderResponse> {
        self.record(ProviderCall::RecordScan {
            case_id: case_id.to_string(),
        })
        .await?;
        self.scans
            .write()
            .await
            .insert(case_id.to_string(), result.clone());
        Ok(ProviderResponse::success(json!({
            "case_id": case_id,
            "artifacts": result.artifacts.len(),
            "findings": result.findings.len(),
        })))
    }

    async fn resolve_findings(
        &self,
        case_id: &str,
        resolution: &Resolution,
    ) -> EngineResult<ProviderResponse> {
        self.record(ProviderCall::ResolveFindings {
            case_id: case_id.to_string(),
        })
        .await?;
        let closed = self
            .scans
            .write()
            .await
            .get_mut(case_id)
            .map(|scan| scan.apply_resolution(resolution))
            .unwrap_or_default();
        Ok(ProviderResponse::success(json!({
            "case_id": case_id,
            "closed_findings": closed,
        })))
    }
}

//! Tenant and department directory

use dashmap::DashMap;
use tracing::{debug, info};
use voicedesk_infra_common::{BusinessHours, DepartmentId, TenantId};

use crate::error::{DirectoryError, Result};
use crate::types::{Department, Tenant};

/// Store of tenants and their departments.
///
/// Hard deletion cascades within this store; owning stores in other crates
/// (ledger, audit, callbacks, agents) expose `purge_tenant` and the engine
/// fans the cascade out to them.
pub struct TenantDirectory {
    tenants: DashMap<TenantId, Tenant>,
    departments: DashMap<DepartmentId, Department>,
}

impl TenantDirectory {
    pub fn new() -> Self {
        TenantDirectory {
            tenants: DashMap::new(),
            departments: DashMap::new(),
        }
    }

    pub fn create_tenant(&self, tenant: Tenant) -> Result<()> {
        if tenant.name.is_empty() {
            return Err(DirectoryError::validation("tenant name must not be empty"));
        }
        if tenant.max_concurrent_calls == 0 {
            return Err(DirectoryError::validation(
                "max_concurrent_calls must be >= 1",
            ));
        }
        info!(tenant = %tenant.id, name = %tenant.name, "tenant created");
        self.tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    pub fn get_tenant(&self, tenant_id: &TenantId) -> Result<Tenant> {
        self.tenants
            .get(tenant_id)
            .map(|t| t.clone())
            .ok_or_else(|| DirectoryError::not_found("tenant", tenant_id.to_string()))
    }

    pub fn update_tenant(&self, tenant: Tenant) -> Result<()> {
        if !self.tenants.contains_key(&tenant.id) {
            return Err(DirectoryError::not_found("tenant", tenant.id.to_string()));
        }
        self.tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    /// Soft deactivation: active sessions continue, new ones are refused.
    pub fn set_active(&self, tenant_id: &TenantId, active: bool) -> Result<()> {
        let mut tenant = self
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| DirectoryError::not_found("tenant", tenant_id.to_string()))?;
        tenant.active = active;
        info!(tenant = %tenant_id, active, "tenant active flag changed");
        Ok(())
    }

    /// Hard deletion. Removes the tenant and its departments and returns
    /// the removed tenant so the engine can cascade to the other stores.
    pub fn remove_tenant(&self, tenant_id: &TenantId) -> Result<Tenant> {
        let (_, tenant) = self
            .tenants
            .remove(tenant_id)
            .ok_or_else(|| DirectoryError::not_found("tenant", tenant_id.to_string()))?;
        self.departments.retain(|_, d| &d.tenant_id != tenant_id);
        info!(tenant = %tenant_id, "tenant removed");
        Ok(tenant)
    }

    pub fn is_active(&self, tenant_id: &TenantId) -> bool {
        self.tenants
            .get(tenant_id)
            .map(|t| t.active)
            .unwrap_or(false)
    }

    pub fn list_tenants(&self) -> Vec<Tenant> {
        self.tenants.iter().map(|t| t.clone()).collect()
    }

    /// Resolve the tenant owning a carrier number
    pub fn find_by_did(&self, did: &str) -> Option<Tenant> {
        self.tenants
            .iter()
            .find(|t| t.dids.iter().any(|d| d == did))
            .map(|t| t.clone())
    }

    pub fn upsert_department(&self, department: Department) -> Result<()> {
        if !self.tenants.contains_key(&department.tenant_id) {
            return Err(DirectoryError::not_found(
                "tenant",
                department.tenant_id.to_string(),
            ));
        }
        debug!(department = %department.id, tenant = %department.tenant_id, "department upserted");
        self.departments.insert(department.id.clone(), department);
        Ok(())
    }

    /// Tenant-scoped department lookup
    pub fn get_department(
        &self,
        tenant_id: &TenantId,
        department_id: &DepartmentId,
    ) -> Result<Department> {
        match self.departments.get(department_id) {
            Some(d) if &d.tenant_id == tenant_id => Ok(d.clone()),
            _ => Err(DirectoryError::not_found(
                "department",
                department_id.to_string(),
            )),
        }
    }

    pub fn list_departments(&self, tenant_id: &TenantId) -> Vec<Department> {
        self.departments
            .iter()
            .filter(|d| &d.tenant_id == tenant_id)
            .map(|d| d.clone())
            .collect()
    }

    /// Effective business hours for a call into a department: the
    /// department override when present, else the tenant policy.
    pub fn effective_hours(
        &self,
        tenant_id: &TenantId,
        department_id: Option<&DepartmentId>,
    ) -> Result<BusinessHours> {
        let tenant = self.get_tenant(tenant_id)?;
        if let Some(dept_id) = department_id {
            let department = self.get_department(tenant_id, dept_id)?;
            if let Some(hours) = department.hours_override {
                return Ok(hours);
            }
        }
        Ok(tenant.business_hours)
    }
}

impl Default for TenantDirectory {
    fn default() -> Self {
        Self::new()
    }
}

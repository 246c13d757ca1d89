//! Tenant configuration: grading policy and pass mark per school.

use crate::error::{EngineError, EngineResult};
use crate::policy::GradingPolicy;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

pub trait TenantConfig {
    fn grading_policy(&self, tenant_id: &str) -> EngineResult<GradingPolicy>;
    fn pass_mark(&self, tenant_id: &str) -> EngineResult<f64>;
}

pub struct SqliteTenants<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTenants<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl TenantConfig for SqliteTenants<'_> {
    fn grading_policy(&self, tenant_id: &str) -> EngineResult<GradingPolicy> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT grading_system FROM tenants WHERE id = ?",
                [tenant_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Err(EngineError::not_found("tenant", tenant_id));
        };
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| EngineError::InvalidPolicy(e.to_string()))?;
        GradingPolicy::from_json(&value)
    }

    fn pass_mark(&self, tenant_id: &str) -> EngineResult<f64> {
        self.conn
            .query_row(
                "SELECT pass_mark FROM tenants WHERE id = ?",
                [tenant_id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| EngineError::not_found("tenant", tenant_id))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSummary {
    pub id: String,
    pub name: String,
    pub pass_mark: f64,
    pub grading_system: serde_json::Value,
}

pub fn create_tenant(conn: &Connection, name: &str, pass_mark: f64) -> EngineResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidInput("name must not be empty".into()));
    }
    let id = Uuid::new_v4().to_string();
    let policy = GradingPolicy::standard().to_json().to_string();
    conn.execute(
        "INSERT INTO tenants(id, name, grading_system, pass_mark) VALUES(?, ?, ?, ?)",
        (&id, name, &policy, pass_mark),
    )?;
    tracing::info!(tenant_id = %id, name, "tenant created");
    Ok(id)
}

/// Replaces the tenant's bands after checking they partition `[0, max_score]`.
pub fn set_grading_policy(
    conn: &Connection,
    tenant_id: &str,
    raw: &serde_json::Value,
    max_score: f64,
) -> EngineResult<GradingPolicy> {
    let policy = GradingPolicy::from_json(raw)?;
    policy.validate(max_score)?;
    let changed = conn.execute(
        "UPDATE tenants SET grading_system = ? WHERE id = ?",
        (policy.to_json().to_string(), tenant_id),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found("tenant", tenant_id));
    }
    Ok(policy)
}

pub fn set_pass_mark(conn: &Connection, tenant_id: &str, pass_mark: f64) -> EngineResult<()> {
    if !pass_mark.is_finite() || pass_mark < 0.0 {
        return Err(EngineError::InvalidInput(
            "passMark must be a non-negative number".into(),
        ));
    }
    let changed = conn.execute(
        "UPDATE tenants SET pass_mark = ? WHERE id = ?",
        (pass_mark, tenant_id),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found("tenant", tenant_id));
    }
    Ok(())
}

pub fn get_tenant(conn: &Connection, tenant_id: &str) -> EngineResult<TenantSummary> {
    let row: Option<(String, String, f64, String)> = conn
        .query_row(
            "SELECT id, name, pass_mark, grading_system FROM tenants WHERE id = ?",
            [tenant_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((id, name, pass_mark, raw)) = row else {
        return Err(EngineError::not_found("tenant", tenant_id));
    };
    Ok(TenantSummary {
        id,
        name,
        pass_mark,
        grading_system: serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::json!({})),
    })
}

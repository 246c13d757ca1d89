use crate::error::EngineResult;
use crate::exams::ExamInstance;
use crate::policy::GradingPolicy;
use crate::roster::{Enrollment, SqliteRoster};
use crate::tenant::{SqliteTenants, TenantConfig};
use rusqlite::Connection;

/// Everything an engine operation reads from: the (transaction) connection
/// plus the two external collaborators.
pub struct EngineContext<'a> {
    pub conn: &'a Connection,
    pub enrollment: &'a dyn Enrollment,
    pub tenants: &'a dyn TenantConfig,
}

impl<'a> EngineContext<'a> {
    pub fn pass_mark(&self, exam: &ExamInstance) -> EngineResult<f64> {
        self.tenants.pass_mark(&exam.tenant_id)
    }

    pub fn policy(&self, exam: &ExamInstance) -> EngineResult<GradingPolicy> {
        self.tenants.grading_policy(&exam.tenant_id)
    }
}

/// SQLite-backed collaborators bound to one connection.
pub struct SqliteCollaborators<'a> {
    pub roster: SqliteRoster<'a>,
    pub tenants: SqliteTenants<'a>,
}

impl<'a> SqliteCollaborators<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            roster: SqliteRoster::new(conn),
            tenants: SqliteTenants::new(conn),
        }
    }

    pub fn context(&'a self, conn: &'a Connection) -> EngineContext<'a> {
        EngineContext {
            conn,
            enrollment: &self.roster,
            tenants: &self.tenants,
        }
    }
}

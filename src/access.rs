//! Users, roles, capabilities and the access policy.
//!
//! Authorization is decided from an explicit [`AccessContext`] built per
//! request: the acting user's capabilities plus the companies they are
//! permissioned on. There is no ambient current-user state; every service
//! operation receives the context it is judged by. All checks fail closed.

use super::error::PortalError;
use super::types::Language;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum Role {
    #[n(0)]
    ApAdmin,
    #[n(1)]
    ApReporter,
    #[n(2)]
    ApManager,
    #[n(3)]
    Supplier,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Capability {
    ViewAllInvoices,
    EditInvoice,
    ChangeInvoiceStatus,
    ViewInvoiceHistory,
    ViewAllTaxpayers,
    EditTaxpayer,
    ChangeTaxpayerStatus,
    ManageAps,
    CreateInvoice,
    CreateTaxpayer,
    PostComment,
}

impl Role {
    /// Flat group-to-capability grants; roles do not inherit from one
    /// another.
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::ApAdmin => &[
                ViewAllInvoices,
                EditInvoice,
                ChangeInvoiceStatus,
                ViewInvoiceHistory,
                ViewAllTaxpayers,
                EditTaxpayer,
                ChangeTaxpayerStatus,
                PostComment,
            ],
            Role::ApReporter => &[ViewAllInvoices, ViewAllTaxpayers],
            Role::ApManager => &[ManageAps],
            Role::Supplier => &[CreateInvoice, CreateTaxpayer, PostComment],
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct User {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub email: String,
    #[n(2)]
    pub preferred_language: Language,
    #[n(3)]
    pub role: Role,
}

/// Resolved authorization facts for one acting user, computed once per
/// operation.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub user_id: String,
    pub email: String,
    pub language: Language,
    role: Role,
    companies: Vec<String>,
}

impl AccessContext {
    pub fn for_user(user: &User, companies: Vec<String>) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            language: user.preferred_language,
            role: user.role,
            companies,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.capabilities().contains(&capability)
    }

    pub fn owns_company(&self, company_id: &str) -> bool {
        self.companies.iter().any(|c| c == company_id)
    }

    pub fn require(&self, capability: Capability) -> Result<(), PortalError> {
        if self.can(capability) {
            return Ok(());
        }
        Err(PortalError::Forbidden)
    }

    /// Ownership gate with a view-all escape hatch: holders of `bypass` see
    /// every company, anyone else must be permissioned on this one.
    pub fn require_company(
        &self,
        company_id: &str,
        bypass: Capability,
    ) -> Result<(), PortalError> {
        if self.can(bypass) || self.owns_company(company_id) {
            return Ok(());
        }
        Err(PortalError::Forbidden)
    }

    /// Same gate but concealing the entity's existence from other tenants.
    pub fn require_company_or_not_found(
        &self,
        company_id: &str,
        bypass: Capability,
    ) -> Result<(), PortalError> {
        if self.can(bypass) || self.owns_company(company_id) {
            return Ok(());
        }
        Err(PortalError::NotFound)
    }
}

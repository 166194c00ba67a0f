//! Permission matrix
//!
//! Every guarded operation is an [`Action`]; [`Action::allowed_roles`] is the
//! only place that decides which roles may perform it.

use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::UserRole;

use UserRole::{Admin, HeadOf, Sales, TalentManager};

/// The caller of a core operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    /// Roles that may act on records owned by someone else
    pub fn overrides_ownership(&self) -> bool {
        matches!(self.role, Admin | HeadOf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateNegotiation,
    EditNegotiation,
    SubmitNegotiation,
    DeleteNegotiation,
    DiscussNegotiation,
    ValidateNegotiation,
    RefuseNegotiation,
    ProgressCollaboration,
    ValidateTalentInvoice,
    MarkCollaborationLost,
    EditCollaborationAmount,
    MarkTalentPaid,
    CreateDocument,
    EditDocument,
    SendDocument,
    AcceptQuote,
    RefuseQuote,
    ConvertQuote,
    IssueCreditNote,
    MarkDocumentPaid,
    ReversePayment,
    SyncBankTransactions,
    AssociateBankTransaction,
    ManageTalents,
    ManageBrands,
}

const EVERYONE: &[UserRole] = &[Admin, HeadOf, TalentManager, Sales];
const REVIEWERS: &[UserRole] = &[Admin, HeadOf];
const DEAL_TEAM: &[UserRole] = &[Admin, HeadOf, TalentManager];
const SALES_DESK: &[UserRole] = &[Admin, HeadOf, Sales];
const ADMIN_ONLY: &[UserRole] = &[Admin];

impl Action {
    pub fn allowed_roles(self) -> &'static [UserRole] {
        match self {
            Action::CreateNegotiation
            | Action::EditNegotiation
            | Action::SubmitNegotiation
            | Action::DeleteNegotiation => EVERYONE,
            Action::DiscussNegotiation
            | Action::ValidateNegotiation
            | Action::RefuseNegotiation => REVIEWERS,
            Action::ProgressCollaboration => DEAL_TEAM,
            Action::ValidateTalentInvoice
            | Action::MarkCollaborationLost
            | Action::EditCollaborationAmount => REVIEWERS,
            Action::MarkTalentPaid => ADMIN_ONLY,
            Action::CreateDocument
            | Action::EditDocument
            | Action::SendDocument
            | Action::AcceptQuote
            | Action::RefuseQuote
            | Action::ConvertQuote => SALES_DESK,
            Action::IssueCreditNote => REVIEWERS,
            Action::MarkDocumentPaid
            | Action::ReversePayment
            | Action::SyncBankTransactions
            | Action::AssociateBankTransaction => ADMIN_ONLY,
            Action::ManageTalents | Action::ManageBrands => DEAL_TEAM,
        }
    }

    pub fn permits(self, role: UserRole) -> bool {
        self.allowed_roles().contains(&role)
    }
}

/// Reject the actor unless its role is in the action's allowed set
pub fn authorize(actor: &Actor, action: Action) -> ApiResult<()> {
    if action.permits(actor.role) {
        return Ok(());
    }
    tracing::warn!(
        user_id = %actor.user_id,
        role = actor.role.as_str(),
        action = ?action,
        "Action forbidden"
    );
    Err(ApiError::Forbidden)
}

/// Like [`authorize`], and the actor must also own the record unless its
/// role overrides ownership.
pub fn authorize_owner(actor: &Actor, action: Action, owner_id: Uuid) -> ApiResult<()> {
    authorize(actor, action)?;
    if actor.user_id == owner_id || actor.overrides_ownership() {
        return Ok(());
    }
    tracing::warn!(
        user_id = %actor.user_id,
        owner_id = %owner_id,
        action = ?action,
        "Action forbidden on a record owned by another user"
    );
    Err(ApiError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: UserRole) -> Actor {
        Actor::new(Uuid::new_v4(), role)
    }

    #[test]
    fn test_only_admin_touches_payments() {
        for action in [
            Action::MarkDocumentPaid,
            Action::ReversePayment,
            Action::MarkTalentPaid,
            Action::AssociateBankTransaction,
        ] {
            assert!(authorize(&actor(Admin), action).is_ok());
            for role in [HeadOf, TalentManager, Sales] {
                assert!(matches!(
                    authorize(&actor(role), action),
                    Err(ApiError::Forbidden)
                ));
            }
        }
    }

    #[test]
    fn test_reviewers_validate_negotiations() {
        assert!(authorize(&actor(HeadOf), Action::ValidateNegotiation).is_ok());
        assert!(authorize(&actor(Admin), Action::RefuseNegotiation).is_ok());
        assert!(authorize(&actor(TalentManager), Action::ValidateNegotiation).is_err());
        assert!(authorize(&actor(Sales), Action::RefuseNegotiation).is_err());
    }

    #[test]
    fn test_sales_desk_handles_quotes_but_not_credit_notes() {
        assert!(authorize(&actor(Sales), Action::AcceptQuote).is_ok());
        assert!(authorize(&actor(Sales), Action::ConvertQuote).is_ok());
        assert!(authorize(&actor(Sales), Action::SendDocument).is_ok());
        assert!(authorize(&actor(Sales), Action::IssueCreditNote).is_err());
        assert!(authorize(&actor(TalentManager), Action::EditDocument).is_err());
    }

    #[test]
    fn test_owner_check_applies_to_talent_managers_only() {
        let owner = actor(TalentManager);
        let other = actor(TalentManager);
        assert!(authorize_owner(&owner, Action::SubmitNegotiation, owner.user_id).is_ok());
        assert!(authorize_owner(&other, Action::SubmitNegotiation, owner.user_id).is_err());
        assert!(authorize_owner(&actor(HeadOf), Action::SubmitNegotiation, owner.user_id).is_ok());
        assert!(authorize_owner(&actor(Admin), Action::DeleteNegotiation, owner.user_id).is_ok());
    }
}

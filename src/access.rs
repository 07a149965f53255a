use uuid::Uuid;

use crate::error::ProgressError;
use crate::models::{Requester, Role};

impl Role {
    /// Tutors and admins review entries and may see every intern's data.
    pub fn can_review(self) -> bool {
        matches!(self, Role::Tutor | Role::Admin)
    }

    pub fn can_view(self, requester_id: Uuid, target_user_id: Uuid) -> bool {
        self.can_review() || requester_id == target_user_id
    }
}

pub fn check_access(requester_role: Role, requester_id: Uuid, target_user_id: Uuid) -> bool {
    requester_role.can_view(requester_id, target_user_id)
}

pub fn ensure_access(requester: &Requester, target_user_id: Uuid) -> Result<(), ProgressError> {
    if check_access(requester.role, requester.id, target_user_id) {
        Ok(())
    } else {
        Err(ProgressError::AccessDenied {
            role: requester.role,
            requester: requester.id,
            target: target_user_id.to_string(),
        })
    }
}

pub fn ensure_reviewer(requester: &Requester) -> Result<(), ProgressError> {
    if requester.role.can_review() {
        Ok(())
    } else {
        Err(ProgressError::AccessDenied {
            role: requester.role,
            requester: requester.id,
            target: "all interns".to_string(),
        })
    }
}

// Roles and capability grants for mutating operations.
//
// The HTTP boundary resolves who is calling (session lookup) and asks
// `authorize` for a `Grant`. Core operations take that grant and check it
// covers the operation they perform.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("not logged in")]
    Unauthenticated,

    #[error("role `{role}` may not perform {operation}")]
    Forbidden { role: Role, operation: Operation },
}

/// A session-scoped privilege label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Uploader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Uploader => "uploader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every mutating entry point of the core, with the roles allowed to run it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ImportRoster,
    Draw,
    ClearWinners,
    ClearRoster,
    StoreScreenshot,
    DeleteScreenshot,
}

impl Operation {
    pub fn permitted_roles(&self) -> &'static [Role] {
        match self {
            Operation::ImportRoster => &[Role::Admin, Role::Uploader],
            Operation::Draw
            | Operation::ClearWinners
            | Operation::ClearRoster
            | Operation::StoreScreenshot
            | Operation::DeleteScreenshot => &[Role::Admin],
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.permitted_roles().contains(&role)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::ImportRoster => "roster import",
            Operation::Draw => "draw",
            Operation::ClearWinners => "clear winners",
            Operation::ClearRoster => "clear roster",
            Operation::StoreScreenshot => "screenshot upload",
            Operation::DeleteScreenshot => "screenshot delete",
        };
        f.write_str(name)
    }
}

/// Proof that a caller with `role` was authorized for `operation`.
///
/// Fields are private: the only way to obtain a grant is [`authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    role: Role,
    operation: Operation,
}

impl Grant {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Check that this grant was issued for `operation`.
    pub fn ensure(&self, operation: Operation) -> Result<(), AuthError> {
        if self.operation == operation && operation.permits(self.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden {
                role: self.role,
                operation,
            })
        }
    }
}

/// Resolve a caller's role into a grant for `operation`.
pub fn authorize(role: Option<Role>, operation: Operation) -> Result<Grant, AuthError> {
    let role = role.ok_or(AuthError::Unauthenticated)?;
    if operation.permits(role) {
        Ok(Grant { role, operation })
    } else {
        Err(AuthError::Forbidden { role, operation })
    }
}

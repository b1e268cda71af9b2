//! Authenticated callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    /// Restaurant owner or staff.
    Restaurant,
    /// Delivery partner.
    Courier,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Customer => "customer",
            Role::Restaurant => "restaurant",
            Role::Courier => "courier",
        };
        write!(f, "{}", s)
    }
}

/// The user on whose behalf an operation runs. Identity verification happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn customer(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Customer)
    }

    pub fn restaurant(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Restaurant)
    }

    pub fn courier(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Courier)
    }
}

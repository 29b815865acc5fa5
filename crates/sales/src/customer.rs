use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lumberyard_core::{CustomerId, DomainError, DomainResult, Entity};

/// A buyer. Walk-in customers are created ad hoc at the point of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_walk_in: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl Customer {
    pub fn create(input: NewCustomer, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("customer name cannot be empty"));
        }

        let email = non_blank(input.email);
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(DomainError::validation(format!("invalid email: {email}")));
            }
        }

        Ok(Self {
            id: CustomerId::new(),
            name: name.to_string(),
            email,
            phone: non_blank(input.phone),
            address: non_blank(input.address),
            is_walk_in: false,
            created_at: now,
        })
    }

    /// Ad-hoc customer for a point-of-sale order. A blank name becomes "Walk-in Customer".
    pub fn walk_in(name: &str, now: DateTime<Utc>) -> Self {
        let name = match name.trim() {
            "" => "Walk-in Customer",
            trimmed => trimmed,
        };

        Self {
            id: CustomerId::new(),
            name: name.to_string(),
            email: None,
            phone: None,
            address: None,
            is_walk_in: true,
            created_at: now,
        }
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

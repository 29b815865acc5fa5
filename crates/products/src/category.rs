use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lumberyard_core::{CategoryId, DomainError, DomainResult, Entity};

/// Grouping of products (e.g. "Hardwood", "Plywood").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Category {
    pub fn create(input: NewCategory, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("category name cannot be empty"));
        }

        Ok(Self {
            id: CategoryId::new(),
            name: name.to_string(),
            description: input.description,
            created_at: now,
        })
    }
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

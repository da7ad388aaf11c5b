//! Request and response bodies shared by the evidence handlers.

use serde::{Deserialize, Serialize};

use crate::models::custody::CustodyAction;

/// List envelope
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}

/// Manual custody log entry
#[derive(Debug, Clone, Deserialize)]
pub struct CustodyEntryRequest {
    pub action: CustodyAction,
    pub location: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub witness_id: Option<i64>,
}

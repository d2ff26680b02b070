use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ProductId, Timestamp, UserId};

/// 上架商品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub image: String,
    pub category: String,
    pub price: f64,
    pub wish_list_count: i32,
    pub created_by: UserId,
    #[serde(skip)]
    pub created_at: Option<Timestamp>,
}

/// 创建商品时由客户端提供的字段
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub image: String,
    pub category: String,
    pub price: f64,
}

impl Product {
    pub fn list(
        id: ProductId,
        draft: NewProduct,
        created_by: UserId,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        let name = draft.name.trim().to_owned();
        if name.is_empty() {
            return Err(DomainError::invalid_argument("name", "cannot be empty"));
        }
        if !draft.price.is_finite() || draft.price < 0.0 {
            return Err(DomainError::invalid_argument(
                "price",
                "must be a non-negative number",
            ));
        }

        Ok(Self {
            id,
            name,
            description: draft.description,
            image: draft.image,
            category: draft.category,
            price: draft.price,
            wish_list_count: 0,
            created_by,
            created_at: Some(now),
        })
    }
}

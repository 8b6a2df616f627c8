use serde::{Deserialize, Serialize};

pub const TYPE_PRODUCT_SALES: &str = "product_sales";
pub const TYPE_MEMBERSHIP: &str = "membership";

#[derive(Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct Business {
    pub id: String,
    pub user_id: String,
    pub business_name: String,
    pub business_type: String,
    pub whatsapp_number: String,
}

impl Business {
    pub fn is_membership(&self) -> bool {
        self.business_type == TYPE_MEMBERSHIP
    }

    pub fn is_product_sales(&self) -> bool {
        self.business_type == TYPE_PRODUCT_SALES
    }
}

use crate::models::businesses::Business;

use sqlx::PgPool;

#[derive(Clone)]
pub struct BusinessRepository {
    conn: PgPool,
}

impl BusinessRepository {
    pub fn new(conn: PgPool) -> Self {
        BusinessRepository { conn }
    }

    /// Resolves the business receiving a transfer by its WhatsApp number.
    /// Numbers are unique across businesses.
    pub async fn find_by_whatsapp_number(
        &self,
        whatsapp_number: &str,
    ) -> Result<Option<Business>, anyhow::Error> {
        let business = sqlx::query_as::<_, Business>(
            "SELECT * FROM businesses WHERE whatsapp_number = $1",
        )
        .bind(whatsapp_number)
        .fetch_optional(&self.conn)
        .await?;

        Ok(business)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Business>, anyhow::Error> {
        let business = sqlx::query_as::<_, Business>("SELECT * FROM businesses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(business)
    }
}

use crate::models::payments::{NewPayment, Payment};

use sqlx::PgPool;
use uuid::Uuid;

/// Append-only payment ledger. Rows never change after insert except for
/// status transitions.
#[derive(Clone)]
pub struct PaymentRepository {
    conn: PgPool,
}

impl PaymentRepository {
    pub fn new(conn: PgPool) -> Self {
        PaymentRepository { conn }
    }

    /// Duplicate lookup key: a SINPE reference already seen for this
    /// business. Flagged duplicate rows count as hits too, so a reference
    /// delivered three times still yields one confirmed payment.
    pub async fn find_by_sinpe_reference(
        &self,
        business_id: &str,
        sinpe_reference: &str,
    ) -> Result<Option<Payment>, anyhow::Error> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE business_id = $1 AND sinpe_reference = $2",
        )
        .bind(business_id)
        .bind(sinpe_reference)
        .fetch_optional(&self.conn)
        .await?;

        Ok(payment)
    }

    pub async fn insert(&self, new: NewPayment) -> Result<Payment, anyhow::Error> {
        let payment_id = Uuid::new_v4().hyphenated().to_string();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments
            (id, business_id, customer_id, amount_in_cents, payment_date,
             sinpe_reference, sender_name, sender_phone, image_url,
             payment_period_month, payment_period_year,
             is_duplicate_flag, amount_mismatch_flag, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(&payment_id)
        .bind(&new.business_id)
        .bind(new.customer_id.as_deref())
        .bind(new.amount_in_cents)
        .bind(new.payment_date)
        .bind(new.sinpe_reference.as_deref())
        .bind(new.sender_name.as_deref())
        .bind(new.sender_phone.as_deref())
        .bind(new.image_url.as_deref())
        .bind(new.payment_period_month)
        .bind(new.payment_period_year)
        .bind(new.is_duplicate_flag)
        .bind(new.amount_mismatch_flag)
        .bind(&new.status)
        .fetch_one(&self.conn)
        .await?;

        Ok(payment)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Payment>, anyhow::Error> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(payment)
    }

    pub async fn list_for_business(
        &self,
        business_id: &str,
    ) -> Result<Vec<Payment>, anyhow::Error> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE business_id = $1 ORDER BY payment_date DESC",
        )
        .bind(business_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(payments)
    }

    pub async fn list_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Payment>, anyhow::Error> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE customer_id = $1 ORDER BY payment_date DESC",
        )
        .bind(customer_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(payments)
    }

    pub async fn update_status(&self, id: &str, status: &str) -> Result<Payment, anyhow::Error> {
        let payment = sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = $1 WHERE id = $2 RETURNING *",
        )
        .bind(status)
        .bind(id)
        .fetch_one(&self.conn)
        .await?;

        Ok(payment)
    }
}

use crate::models::businesses;
use crate::models::customers::{Customer, OverdueCandidate, RegisterCustomer, UpdateCustomer};

use anyhow::bail;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Customer registry. All metric mutation goes through the narrow update
/// operations here; nothing else writes customer counters.
#[derive(Clone)]
pub struct CustomerRepository {
    conn: PgPool,
}

impl CustomerRepository {
    pub fn new(conn: PgPool) -> Self {
        CustomerRepository { conn }
    }

    pub async fn find_by_phone(
        &self,
        business_id: &str,
        phone: &str,
    ) -> Result<Option<Customer>, anyhow::Error> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE business_id = $1 AND phone = $2",
        )
        .bind(business_id)
        .bind(phone)
        .fetch_optional(&self.conn)
        .await?;

        Ok(customer)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Customer>, anyhow::Error> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(customer)
    }

    pub async fn list_for_business(
        &self,
        business_id: &str,
    ) -> Result<Vec<Customer>, anyhow::Error> {
        let customers = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE business_id = $1 ORDER BY created_at DESC",
        )
        .bind(business_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(customers)
    }

    /// Inserts a customer registered by the business owner. Verified from the
    /// start, with the membership fields already validated by the caller.
    pub async fn insert_registered(
        &self,
        req: &RegisterCustomer,
    ) -> Result<Customer, anyhow::Error> {
        self.insert(
            &req.business_id,
            &req.phone,
            &req.full_name,
            true,
            req.payment_due_day,
            req.monthly_fee_in_cents,
            req.membership_start_date,
        )
        .await
    }

    /// Inserts a customer discovered through an inbound payment. Unverified
    /// until the owner completes the registration.
    pub async fn insert_from_payment(
        &self,
        business_id: &str,
        phone: &str,
        full_name: &str,
    ) -> Result<Customer, anyhow::Error> {
        self.insert(business_id, phone, full_name, false, None, None, None)
            .await
    }

    async fn insert(
        &self,
        business_id: &str,
        phone: &str,
        full_name: &str,
        is_verified: bool,
        payment_due_day: Option<i32>,
        monthly_fee_in_cents: Option<i64>,
        membership_start_date: Option<NaiveDate>,
    ) -> Result<Customer, anyhow::Error> {
        let customer_id = Uuid::new_v4().hyphenated().to_string();

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers
            (id, business_id, phone, full_name, is_verified,
             payment_due_day, monthly_fee_in_cents, membership_start_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&customer_id)
        .bind(business_id)
        .bind(phone)
        .bind(full_name)
        .bind(is_verified)
        .bind(payment_due_day)
        .bind(monthly_fee_in_cents)
        .bind(membership_start_date)
        .fetch_one(&self.conn)
        .await?;

        Ok(customer)
    }

    pub async fn update_profile(
        &self,
        id: &str,
        update: &UpdateCustomer,
    ) -> Result<Customer, anyhow::Error> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers SET
                full_name = COALESCE($1, full_name),
                is_verified = COALESCE($2, is_verified),
                payment_due_day = COALESCE($3, payment_due_day),
                monthly_fee_in_cents = COALESCE($4, monthly_fee_in_cents)
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(update.full_name.as_deref())
        .bind(update.is_verified)
        .bind(update.payment_due_day)
        .bind(update.monthly_fee_in_cents)
        .bind(id)
        .fetch_one(&self.conn)
        .await?;

        Ok(customer)
    }

    pub async fn delete(&self, id: &str) -> Result<(), anyhow::Error> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id)
            .execute(&self.conn)
            .await?;

        if result.rows_affected() == 0 {
            bail!("Customer not found: {}", id);
        }

        Ok(())
    }

    /// Applies one product sale to the customer's counters in a single
    /// atomic update.
    pub async fn record_product_sale(
        &self,
        customer_id: &str,
        amount_in_cents: i64,
        payment_date: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            UPDATE customers SET
                total_purchases = total_purchases + 1,
                total_spent_in_cents = total_spent_in_cents + $1,
                last_purchase_date = $2
            WHERE id = $3
            "#,
        )
        .bind(amount_in_cents)
        .bind(payment_date)
        .bind(customer_id)
        .execute(&self.conn)
        .await?;

        Ok(())
    }

    /// Increments the on-time or late counter for one membership payment.
    pub async fn record_membership_payment(
        &self,
        customer_id: &str,
        on_time: bool,
    ) -> Result<(), anyhow::Error> {
        let query = if on_time {
            "UPDATE customers SET on_time_payment_count = on_time_payment_count + 1 WHERE id = $1"
        } else {
            "UPDATE customers SET late_payment_count = late_payment_count + 1 WHERE id = $1"
        };

        sqlx::query(query).bind(customer_id).execute(&self.conn).await?;

        Ok(())
    }

    /// Membership customers that have missed the current payment window and
    /// are not yet flagged. A customer qualifies once the local day of month
    /// is past `due_day + grace` and no confirmed payment exists for the
    /// current period.
    pub async fn list_newly_overdue(
        &self,
        today_day: i32,
        period_month: i32,
        period_year: i32,
        grace_days: i32,
    ) -> Result<Vec<OverdueCandidate>, anyhow::Error> {
        let candidates = sqlx::query_as::<_, OverdueCandidate>(
            r#"
            SELECT c.id, c.business_id, c.phone, c.full_name
            FROM customers c
            JOIN businesses b ON c.business_id = b.id
            WHERE b.business_type = $1
              AND c.is_overdue = FALSE
              AND c.payment_due_day IS NOT NULL
              AND c.monthly_fee_in_cents IS NOT NULL
              AND $2 > c.payment_due_day + $3
              AND NOT EXISTS (
                  SELECT 1 FROM payments p
                  WHERE p.customer_id = c.id
                    AND p.status = 'confirmed'
                    AND p.payment_period_month = $4
                    AND p.payment_period_year = $5
              )
            "#,
        )
        .bind(businesses::TYPE_MEMBERSHIP)
        .bind(today_day)
        .bind(grace_days)
        .bind(period_month)
        .bind(period_year)
        .fetch_all(&self.conn)
        .await?;

        Ok(candidates)
    }

    /// Idempotent: flagging an already-overdue customer is a no-op.
    pub async fn mark_overdue(&self, customer_id: &str) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE customers SET is_overdue = TRUE WHERE id = $1")
            .bind(customer_id)
            .execute(&self.conn)
            .await?;

        Ok(())
    }

    /// Overwrites `frequent_buyer` for every product-sales customer from the
    /// current purchase count and recency.
    pub async fn recalculate_frequent_buyer(
        &self,
        min_purchases: i32,
        window_start: DateTime<Utc>,
    ) -> Result<u64, anyhow::Error> {
        let result = sqlx::query(
            r#"
            UPDATE customers c SET frequent_buyer =
                (c.total_purchases >= $1
                 AND c.last_purchase_date IS NOT NULL
                 AND c.last_purchase_date >= $2)
            FROM businesses b
            WHERE c.business_id = b.id AND b.business_type = $3
            "#,
        )
        .bind(min_purchases)
        .bind(window_start)
        .bind(businesses::TYPE_PRODUCT_SALES)
        .execute(&self.conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Overwrites `good_standing` for every membership customer. A member is
    /// in good standing while at least four of every five recorded payments
    /// were on time; members with no payment history keep the flag.
    pub async fn recalculate_good_standing(&self) -> Result<u64, anyhow::Error> {
        let result = sqlx::query(
            r#"
            UPDATE customers c SET good_standing =
                (c.on_time_payment_count >= c.late_payment_count * 4)
            FROM businesses b
            WHERE c.business_id = b.id AND b.business_type = $1
            "#,
        )
        .bind(businesses::TYPE_MEMBERSHIP)
        .execute(&self.conn)
        .await?;

        Ok(result.rows_affected())
    }
}

//! Persistence gateway for committed rankings.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use hotlist_core::CategoryScore;

#[async_trait]
pub trait RankingGateway: Send + Sync {
    /// Replace the committed ranking for one category and date in a single
    /// transaction, so a same-day rerun updates rows instead of duplicating
    /// them.
    async fn replace_for_category(
        &self,
        category_id: i64,
        date: NaiveDate,
        rows: &[CategoryScore],
    ) -> anyhow::Result<()>;

    async fn top_for_category(
        &self,
        category_id: i64,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<CategoryScore>>;

    /// Delete rows older than `cutoff`, returning how many went.
    async fn purge_before(&self, cutoff: NaiveDate) -> anyhow::Result<u64>;
}

pub struct PgRankingGateway {
    pool: PgPool,
}

impl PgRankingGateway {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS category_scores (
                product_id        TEXT        NOT NULL,
                category_id       BIGINT      NOT NULL,
                score             DOUBLE PRECISION NOT NULL,
                rank_in_category  INTEGER     NOT NULL,
                recommend_date    DATE        NOT NULL,
                reasons           TEXT[]      NOT NULL DEFAULT '{}',
                recommendation    TEXT,
                PRIMARY KEY (category_id, recommend_date, product_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RankingGateway for PgRankingGateway {
    async fn replace_for_category(
        &self,
        category_id: i64,
        date: NaiveDate,
        rows: &[CategoryScore],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM category_scores
             WHERE category_id = $1 AND recommend_date = $2
            "#,
        )
        .bind(category_id)
        .bind(date)
        .execute(&mut *tx)
        .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO category_scores
                    (product_id, category_id, score, rank_in_category,
                     recommend_date, reasons, recommendation)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&row.product_id)
            .bind(row.category_id)
            .bind(row.score)
            .bind(row.rank_in_category as i32)
            .bind(row.recommend_date)
            .bind(&row.reasons)
            .bind(&row.recommendation)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn top_for_category(
        &self,
        category_id: i64,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<CategoryScore>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, category_id, score, rank_in_category,
                   recommend_date, reasons, recommendation
              FROM category_scores
             WHERE category_id = $1 AND recommend_date = $2
             ORDER BY rank_in_category
            "#,
        )
        .bind(category_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CategoryScore {
                    product_id: row.try_get("product_id")?,
                    category_id: row.try_get("category_id")?,
                    score: row.try_get("score")?,
                    rank_in_category: row.try_get::<i32, _>("rank_in_category")? as u32,
                    recommend_date: row.try_get("recommend_date")?,
                    reasons: row.try_get("reasons")?,
                    recommendation: row.try_get("recommendation")?,
                })
            })
            .collect()
    }

    async fn purge_before(&self, cutoff: NaiveDate) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM category_scores
             WHERE recommend_date < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

use anyhow::Result;
use chrono::Utc;
use shared::{ProductInput, ProductListQuery};
use sqlx::{QueryBuilder, Sqlite};

use super::{new_id, order_clause, page_window, push_search, Database, Product};

const SEARCH_COLUMNS: &[&str] = &["name", "description", "category"];

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &ProductListQuery) {
    if let Some(category) = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        qb.push(" AND category = ")
            .push_bind(category.to_string())
            .push(" COLLATE NOCASE");
    }
    if let Some(product_type) = query.product_type {
        qb.push(" AND product_type = ").push_bind(product_type);
    }
    push_search(qb, SEARCH_COLUMNS, query.search.as_deref());
}

impl Database {
    pub async fn create_product(&self, input: &ProductInput, created_by: &str) -> Result<Product> {
        let id = new_id();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, category, product_type,
                                  image_url, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.category)
        .bind(input.product_type)
        .bind(&input.image_url)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_product(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("product {} vanished after insert", id))
    }

    pub async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    pub async fn get_products(&self, query: &ProductListQuery) -> Result<(Vec<Product>, u64)> {
        let (_, limit, offset) = page_window(query.page, query.limit);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM products WHERE 1=1");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM products WHERE 1=1");
        push_filters(&mut select, query);
        select.push(order_clause(query.sort_by));
        select
            .push(" LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(offset);
        let products = select.build_query_as::<Product>().fetch_all(&self.pool).await?;

        Ok((products, total.max(0) as u64))
    }

    /// Distinct categories in use, alphabetically.
    pub async fn get_product_categories(&self) -> Result<Vec<String>> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM products ORDER BY category COLLATE NOCASE ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn count_products(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    pub async fn update_product(&self, id: &str, input: &ProductInput) -> Result<Option<Product>> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = ?, description = ?, price = ?, category = ?, product_type = ?,
                image_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.category)
        .bind(input.product_type)
        .bind(&input.image_url)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_product(id).await
    }

    pub async fn delete_product(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ProductType;

    fn input(name: &str, category: &str, product_type: ProductType) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            description: "Grass fed".into(),
            price: 24.5,
            category: category.to_string(),
            product_type,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_filters_and_categories() {
        let db = Database::in_memory().await.unwrap();
        let admin = db.create_user("admin@example.com", "h", None).await.unwrap();
        db.create_product(&input("Ribeye", "Beef", ProductType::Chilled), &admin.id)
            .await
            .unwrap();
        db.create_product(&input("Lamb rack", "Lamb", ProductType::Frozen), &admin.id)
            .await
            .unwrap();
        db.create_product(&input("Brisket", "Beef", ProductType::Frozen), &admin.id)
            .await
            .unwrap();

        let query = ProductListQuery {
            page: 1,
            limit: 10,
            category: Some("beef".into()),
            ..ProductListQuery::default()
        };
        let (_, total) = db.get_products(&query).await.unwrap();
        assert_eq!(total, 2);

        let query = ProductListQuery {
            page: 1,
            limit: 10,
            product_type: Some(ProductType::Frozen),
            search: Some("rack".into()),
            ..ProductListQuery::default()
        };
        let (items, total) = db.get_products(&query).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].name, "Lamb rack");

        assert_eq!(db.get_product_categories().await.unwrap(), vec!["Beef", "Lamb"]);
        assert_eq!(db.count_products().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_update_missing_product() {
        let db = Database::in_memory().await.unwrap();
        let updated = db
            .update_product("missing", &input("X", "Beef", ProductType::Chilled))
            .await
            .unwrap();
        assert!(updated.is_none());
    }
}

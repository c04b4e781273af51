use sqlx::PgPool;
use uuid::Uuid;

use crate::posts::repo_types::Post;

pub async fn insert(
    db: &PgPool,
    author_id: Uuid,
    title: &str,
    body: &str,
) -> anyhow::Result<Post> {
    let post = sqlx::query_as::<_, Post>(
        r#"
        INSERT INTO posts (author_id, title, body)
        VALUES ($1, $2, $3)
        RETURNING id, author_id, title, body, created_at, updated_at
        "#,
    )
    .bind(author_id)
    .bind(title)
    .bind(body)
    .fetch_one(db)
    .await?;
    Ok(post)
}

pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Post>> {
    let post = sqlx::query_as::<_, Post>(
        r#"
        SELECT id, author_id, title, body, created_at, updated_at
        FROM posts
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(post)
}

/// Newest first; id breaks creation-time ties so paging stays stable.
pub async fn list_recent(db: &PgPool, limit: i64, offset: i64) -> anyhow::Result<Vec<Post>> {
    let rows = sqlx::query_as::<_, Post>(
        r#"
        SELECT id, author_id, title, body, created_at, updated_at
        FROM posts
        ORDER BY created_at DESC, id DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count(db: &PgPool) -> anyhow::Result<i64> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
        .fetch_one(db)
        .await?;
    Ok(total)
}

pub async fn list_by_author(
    db: &PgPool,
    author_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Post>> {
    let rows = sqlx::query_as::<_, Post>(
        r#"
        SELECT id, author_id, title, body, created_at, updated_at
        FROM posts
        WHERE author_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(author_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count_by_author(db: &PgPool, author_id: Uuid) -> anyhow::Result<i64> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(db)
        .await?;
    Ok(total)
}

pub async fn update(db: &PgPool, id: Uuid, title: &str, body: &str) -> anyhow::Result<Post> {
    let post = sqlx::query_as::<_, Post>(
        r#"
        UPDATE posts SET title = $2, body = $3, updated_at = now()
        WHERE id = $1
        RETURNING id, author_id, title, body, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(body)
    .fetch_one(db)
    .await?;
    Ok(post)
}

pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

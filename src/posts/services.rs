use uuid::Uuid;

use crate::error::{AppError, FieldError};
use crate::posts::repo_types::Post;

/// Only the author may mutate a post. No side effects on success.
pub fn ensure_owner(post: &Post, user_id: Uuid) -> Result<(), AppError> {
    if post.author_id != user_id {
        return Err(AppError::Forbidden(
            "only the author may modify this post".into(),
        ));
    }
    Ok(())
}

/// Field checks shared by create and update.
pub fn validate_post_fields(title: &str, body: &str) -> Result<(), AppError> {
    let mut errors = Vec::new();
    let title = title.trim();
    if title.is_empty() {
        errors.push(FieldError::new("title", "title is required"));
    } else if title.chars().count() > 200 {
        errors.push(FieldError::new("title", "must be at most 200 characters"));
    }
    if body.trim().is_empty() {
        errors.push(FieldError::new("body", "body is required"));
    } else if body.chars().count() > 50_000 {
        errors.push(FieldError::new("body", "must be at most 50000 characters"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn post_by(author_id: Uuid) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id,
            title: "hello".into(),
            body: "world".into(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn author_passes_ownership_check() {
        let author = Uuid::new_v4();
        assert!(ensure_owner(&post_by(author), author).is_ok());
    }

    #[test]
    fn non_author_is_forbidden() {
        let author = Uuid::new_v4();
        let other = Uuid::new_v4();
        let err = ensure_owner(&post_by(author), other).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn empty_title_or_body_is_rejected() {
        assert!(validate_post_fields("", "body").is_err());
        assert!(validate_post_fields("title", "   ").is_err());
        assert!(validate_post_fields("title", "body").is_ok());
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let long_title = "t".repeat(201);
        assert!(validate_post_fields(&long_title, "body").is_err());
        let long_body = "b".repeat(50_001);
        assert!(validate_post_fields("title", &long_body).is_err());
    }
}

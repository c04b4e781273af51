use serde::{Deserialize, Serialize};

use crate::posts::repo_types::Post;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: String,
    pub body: String,
}

/// One page of posts with enough metadata to render pager controls.
#[derive(Debug, Serialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}
fn default_page() -> i64 {
    1
}
fn default_per_page() -> i64 {
    20
}

impl Pagination {
    /// Clamp to sane bounds and translate to LIMIT/OFFSET.
    pub fn clamp(&self) -> (i64, i64, i64, i64) {
        let page = self.page.max(1);
        let per_page = self.per_page.clamp(1, 100);
        (page, per_page, per_page, (page - 1) * per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_give_first_page_of_twenty() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        let (page, per_page, limit, offset) = p.clamp();
        assert_eq!((page, per_page, limit, offset), (1, 20, 20, 0));
    }

    #[test]
    fn clamp_bounds_page_and_per_page() {
        let p = Pagination {
            page: 0,
            per_page: 1000,
        };
        let (page, per_page, limit, offset) = p.clamp();
        assert_eq!((page, per_page, limit, offset), (1, 100, 100, 0));

        let p = Pagination {
            page: -5,
            per_page: 0,
        };
        let (page, per_page, limit, offset) = p.clamp();
        assert_eq!((page, per_page, limit, offset), (1, 1, 1, 0));
    }

    #[test]
    fn offset_advances_with_page() {
        let p = Pagination {
            page: 3,
            per_page: 10,
        };
        let (_, _, limit, offset) = p.clamp();
        assert_eq!((limit, offset), (10, 20));
    }
}

pub mod ai;
pub mod auth;
pub mod chat;
pub mod credit;
pub mod file;
pub mod notification;
pub mod school;
pub mod user;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PaginationQuery {
    pub fn offset(&self) -> i64 {
        let page = self.page.unwrap_or(1).max(1);
        (page - 1) * self.per_page()
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let q = PaginationQuery {
            page: None,
            per_page: None,
        };
        assert_eq!(q.page(), 1);
        assert_eq!(q.per_page(), 20);
        assert_eq!(q.offset(), 0);

        let q = PaginationQuery {
            page: Some(3),
            per_page: Some(500),
        };
        assert_eq!(q.per_page(), 100);
        assert_eq!(q.offset(), 200);

        let q = PaginationQuery {
            page: Some(-1),
            per_page: Some(0),
        };
        assert_eq!(q.page(), 1);
        assert_eq!(q.per_page(), 1);
        assert_eq!(q.offset(), 0);
    }
}

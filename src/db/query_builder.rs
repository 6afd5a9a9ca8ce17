//! Dynamic, parameterized listing queries for the admin user search.
//!
//! Every filter appends a SQL fragment with `$n` placeholders and pushes the
//! matching values onto a parallel parameter list, so free text is always
//! bound, never interpolated. Pagination is tracked as a separate unit and
//! only rendered by `build()`, which keeps the count query's parameter list
//! correct no matter which of the two is built first.

use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgArguments;
use sqlx::Arguments;
use uuid::Uuid;

/// A value destined for a `$n` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    Bool(bool),
    Int(i64),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

/// Packs parameters for `sqlx::query_with` / `query_as_with`, preserving order.
pub fn to_arguments(params: &[QueryParam]) -> anyhow::Result<PgArguments> {
    let mut args = PgArguments::default();
    for p in params {
        let res = match p {
            QueryParam::Text(v) => args.add(v),
            QueryParam::Bool(v) => args.add(v),
            QueryParam::Int(v) => args.add(v),
            QueryParam::Uuid(v) => args.add(v),
            QueryParam::Timestamp(v) => args.add(v),
        };
        res.map_err(|e| anyhow::anyhow!("failed to encode query parameter: {e}"))?;
    }
    Ok(args)
}

const USER_SELECT: &str = "SELECT u.id, u.email, u.first_name, u.last_name, u.role, \
     u.school_id, s.name AS school_name, u.credits_balance, u.is_active, \
     u.email_verified, u.status, u.last_login_at, u.created_at, u.updated_at \
     FROM users u LEFT JOIN schools s ON s.id = u.school_id";

const USER_COUNT: &str =
    "SELECT COUNT(*) FROM users u LEFT JOIN schools s ON s.id = u.school_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn parse(s: Option<&str>) -> Self {
        match s.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }
}

/// Maps logical sort fields to column expressions. Anything outside the
/// whitelist sorts by creation time instead of erroring.
fn sort_column(field: &str) -> &'static str {
    match field {
        "name" | "last_name" => "u.last_name",
        "first_name" => "u.first_name",
        "email" => "u.email",
        "role" => "u.role",
        "school" => "s.name",
        "credits" | "credits_balance" => "u.credits_balance",
        "last_login" | "last_login_at" => "u.last_login_at",
        "status" => "u.status",
        _ => "u.created_at",
    }
}

fn signup_cutoff(bucket: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let days = match bucket {
        "last_7_days" => 7,
        "last_30_days" => 30,
        "last_90_days" => 90,
        _ => return None,
    };
    Some(now - Duration::days(days))
}

fn last_login_cutoff(bucket: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let days = match bucket {
        "today" => 1,
        "this_week" => 7,
        "this_month" => 30,
        _ => return None,
    };
    Some(now - Duration::days(days))
}

#[derive(Debug, Clone, Copy)]
struct Pagination {
    limit: i64,
    offset: i64,
}

/// Fluent builder for the filtered/sorted/paginated user listing.
#[derive(Debug, Default)]
pub struct UserQueryBuilder {
    conditions: Vec<String>,
    params: Vec<QueryParam>,
    sort: Option<(String, SortDirection)>,
    pagination: Option<Pagination>,
}

impl UserQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_placeholder(&self) -> usize {
        self.params.len() + 1
    }

    /// Full-text match on name/email, falling back to substring match.
    /// Consumes two placeholders: the raw term and the wildcarded term.
    pub fn search(mut self, term: &str) -> Self {
        let term = term.trim();
        if term.is_empty() {
            return self;
        }
        let ts = self.next_placeholder();
        let like = ts + 1;
        self.conditions.push(format!(
            "(to_tsvector('simple', u.first_name || ' ' || u.last_name || ' ' || u.email) \
             @@ plainto_tsquery('simple', ${ts}) \
             OR CONCAT(u.first_name, ' ', u.last_name) ILIKE ${like} \
             OR u.email ILIKE ${like})"
        ));
        self.params.push(QueryParam::Text(term.to_string()));
        self.params.push(QueryParam::Text(format!("%{term}%")));
        self
    }

    pub fn with_role(mut self, role: Option<&str>) -> Self {
        if let Some(role) = role.filter(|r| !r.trim().is_empty()) {
            let n = self.next_placeholder();
            self.conditions.push(format!("u.role = ${n}"));
            self.params.push(QueryParam::Text(role.trim().to_string()));
        }
        self
    }

    pub fn in_school(mut self, school_id: Option<Uuid>) -> Self {
        if let Some(id) = school_id {
            let n = self.next_placeholder();
            self.conditions.push(format!("u.school_id = ${n}"));
            self.params.push(QueryParam::Uuid(id));
        }
        self
    }

    pub fn active(mut self, is_active: Option<bool>) -> Self {
        if let Some(v) = is_active {
            let n = self.next_placeholder();
            self.conditions.push(format!("u.is_active = ${n}"));
            self.params.push(QueryParam::Bool(v));
        }
        self
    }

    pub fn email_verified(mut self, verified: Option<bool>) -> Self {
        if let Some(v) = verified {
            let n = self.next_placeholder();
            self.conditions.push(format!("u.email_verified = ${n}"));
            self.params.push(QueryParam::Bool(v));
        }
        self
    }

    pub fn with_status(mut self, status: Option<&str>) -> Self {
        if let Some(status) = status.filter(|s| !s.trim().is_empty()) {
            let n = self.next_placeholder();
            self.conditions.push(format!("u.status = ${n}"));
            self.params.push(QueryParam::Text(status.trim().to_string()));
        }
        self
    }

    /// Restrict to accounts created within a named bucket. Unknown bucket
    /// names are ignored rather than rejected.
    pub fn created_within(self, bucket: Option<&str>) -> Self {
        self.created_within_at(bucket, Utc::now())
    }

    fn created_within_at(mut self, bucket: Option<&str>, now: DateTime<Utc>) -> Self {
        if let Some(cutoff) = bucket.and_then(|b| signup_cutoff(b.trim(), now)) {
            let n = self.next_placeholder();
            self.conditions.push(format!("u.created_at >= ${n}"));
            self.params.push(QueryParam::Timestamp(cutoff));
        }
        self
    }

    pub fn last_login_within(self, bucket: Option<&str>) -> Self {
        self.last_login_within_at(bucket, Utc::now())
    }

    fn last_login_within_at(mut self, bucket: Option<&str>, now: DateTime<Utc>) -> Self {
        if let Some(cutoff) = bucket.and_then(|b| last_login_cutoff(b.trim(), now)) {
            let n = self.next_placeholder();
            self.conditions.push(format!("u.last_login_at >= ${n}"));
            self.params.push(QueryParam::Timestamp(cutoff));
        }
        self
    }

    pub fn sort_by(mut self, field: Option<&str>, direction: Option<&str>) -> Self {
        let column = sort_column(field.unwrap_or("created_at").trim());
        self.sort = Some((column.to_string(), SortDirection::parse(direction)));
        self
    }

    /// Pagination is kept out of the filter parameter list until `build()`
    /// renders it, so `build_count()` never has to strip parameters.
    pub fn paginate(mut self, limit: i64, offset: i64) -> Self {
        self.pagination = Some(Pagination {
            limit: limit.clamp(1, 100),
            offset: offset.max(0),
        });
        self
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn build(&self) -> (String, Vec<QueryParam>) {
        let mut sql = String::from(USER_SELECT);
        sql.push_str(&self.where_clause());

        let (column, direction) = self
            .sort
            .clone()
            .unwrap_or(("u.created_at".to_string(), SortDirection::Desc));
        sql.push_str(&format!(" ORDER BY {} {}", column, direction.as_sql()));

        let mut params = self.params.clone();
        if let Some(p) = self.pagination {
            sql.push_str(&format!(
                " LIMIT ${} OFFSET ${}",
                params.len() + 1,
                params.len() + 2
            ));
            params.push(QueryParam::Int(p.limit));
            params.push(QueryParam::Int(p.offset));
        }
        (sql, params)
    }

    /// Same WHERE clause as `build()`, no ORDER BY / LIMIT / OFFSET, and only
    /// the filter parameters.
    pub fn build_count(&self) -> (String, Vec<QueryParam>) {
        let mut sql = String::from(USER_COUNT);
        sql.push_str(&self.where_clause());
        (sql, self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Highest `$n` referenced in a query string.
    fn max_placeholder(sql: &str) -> usize {
        let bytes = sql.as_bytes();
        let mut max = 0;
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let mut j = i + 1;
                let mut n = 0usize;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    n = n * 10 + (bytes[j] - b'0') as usize;
                    j += 1;
                }
                if j > i + 1 {
                    max = max.max(n);
                }
                i = j;
            } else {
                i += 1;
            }
        }
        max
    }

    #[test]
    fn empty_builder_has_no_where_or_params() {
        let (sql, params) = UserQueryBuilder::new().build();
        assert!(!sql.contains("WHERE"));
        assert!(sql.contains("ORDER BY u.created_at DESC"));
        assert!(params.is_empty());
    }

    #[test]
    fn placeholder_count_matches_param_count() {
        let builder = UserQueryBuilder::new()
            .search("novak")
            .with_role(Some("teacher"))
            .in_school(Some(Uuid::new_v4()))
            .active(Some(true))
            .email_verified(Some(false))
            .with_status(Some("active"))
            .created_within(Some("last_30_days"))
            .last_login_within(Some("this_week"))
            .sort_by(Some("email"), Some("asc"))
            .paginate(25, 50);

        let (sql, params) = builder.build();
        assert_eq!(max_placeholder(&sql), params.len());

        let (count_sql, count_params) = builder.build_count();
        assert_eq!(max_placeholder(&count_sql), count_params.len());
    }

    #[test]
    fn count_query_drops_exactly_the_pagination_params() {
        let builder = UserQueryBuilder::new()
            .search("kovar")
            .with_role(Some("student"))
            .paginate(10, 20);

        let (sql, params) = builder.build();
        let (count_sql, count_params) = builder.build_count();

        assert_eq!(params.len(), count_params.len() + 2);
        assert_eq!(&params[..count_params.len()], &count_params[..]);
        assert_eq!(
            params[params.len() - 2..],
            [QueryParam::Int(10), QueryParam::Int(20)]
        );
        assert!(!count_sql.contains("LIMIT"));
        assert!(!count_sql.contains("OFFSET"));
        assert!(!count_sql.contains("ORDER BY"));
        assert!(sql.contains("LIMIT"));
    }

    #[test]
    fn count_before_build_is_equivalent() {
        let builder = UserQueryBuilder::new().with_role(Some("teacher")).paginate(5, 0);
        let (count_first, params_first) = builder.build_count();
        let _ = builder.build();
        let (count_second, params_second) = builder.build_count();
        assert_eq!(count_first, count_second);
        assert_eq!(params_first, params_second);
    }

    #[test]
    fn search_consumes_two_placeholders() {
        let (sql, params) = UserQueryBuilder::new().search("ana").build();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], QueryParam::Text("ana".into()));
        assert_eq!(params[1], QueryParam::Text("%ana%".into()));
        assert!(sql.contains("plainto_tsquery('simple', $1)"));
        assert!(sql.contains("ILIKE $2"));
    }

    #[test]
    fn blank_search_is_a_no_op() {
        let (sql, params) = UserQueryBuilder::new().search("   ").build();
        assert!(!sql.contains("WHERE"));
        assert!(params.is_empty());
    }

    #[test]
    fn unknown_sort_field_falls_back_to_created_at() {
        let (sql, _) = UserQueryBuilder::new()
            .sort_by(Some("password_hash; DROP TABLE users"), Some("asc"))
            .build();
        assert!(sql.contains("ORDER BY u.created_at ASC"));
        assert!(!sql.contains("DROP TABLE"));
    }

    #[test]
    fn unknown_direction_defaults_to_desc() {
        let (sql, _) = UserQueryBuilder::new()
            .sort_by(Some("email"), Some("sideways"))
            .build();
        assert!(sql.contains("ORDER BY u.email DESC"));
    }

    #[test]
    fn unknown_bucket_is_ignored() {
        let (sql, params) = UserQueryBuilder::new()
            .created_within(Some("last_century"))
            .last_login_within(Some("yesterday"))
            .build();
        assert!(!sql.contains("WHERE"));
        assert!(params.is_empty());
    }

    #[test]
    fn date_buckets_bind_a_cutoff_timestamp() {
        let now = Utc::now();
        let builder = UserQueryBuilder::new().created_within_at(Some("last_7_days"), now);
        let (sql, params) = builder.build();
        assert!(sql.contains("u.created_at >= $1"));
        assert_eq!(params, vec![QueryParam::Timestamp(now - Duration::days(7))]);
    }

    #[test]
    fn pagination_is_clamped() {
        let (_, params) = UserQueryBuilder::new().paginate(10_000, -5).build();
        assert_eq!(
            params,
            vec![QueryParam::Int(100), QueryParam::Int(0)]
        );
    }
}

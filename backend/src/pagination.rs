//! `page`/`per_page` list paging and a small WHERE-clause builder

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 25;
pub const MAX_PER_PAGE: i64 = 100;

/// `?page=&per_page=`; pages are 1-indexed and out-of-range values are clamped
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationParams {
    pub page: i64,
    pub per_page: i64,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PaginationParams {
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// Saturates for absurd page numbers; such pages are simply empty
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

/// `{ data, meta }` body of every list endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, params: &PaginationParams, total: i64) -> Self {
        let per_page = params.limit();
        Self {
            data,
            meta: PaginationMeta {
                page: params.page(),
                per_page,
                total,
                total_pages: (total + per_page - 1) / per_page,
            },
        }
    }
}

/// Collects AND-ed filter fragments. Each `{}` in a fragment becomes the
/// same numbered placeholder, so one bind can feed several columns.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    fragments: Vec<String>,
    params: usize,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the placeholder index the fragment was given
    pub fn add_condition(&mut self, fragment: &str) -> usize {
        self.params += 1;
        self.fragments
            .push(fragment.replace("{}", &format!("${}", self.params)));
        self.params
    }

    pub fn add_static(&mut self, fragment: &str) {
        self.fragments.push(fragment.to_string());
    }

    pub fn where_clause(&self) -> String {
        if self.fragments.is_empty() {
            return String::new();
        }
        format!("WHERE {}", self.fragments.join(" AND "))
    }

    /// First placeholder free for LIMIT/OFFSET
    pub fn next_param(&self) -> usize {
        self.params + 1
    }
}

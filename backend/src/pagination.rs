//! Pagination and query helpers for the workflow API
//!
//! Provides standardized pagination, sorting, and filtering for list endpoints.

use serde::{Deserialize, Serialize};

use crate::workflows::{WorkflowFilter, WorkflowOrdering};

/// Default page size if not specified
pub const DEFAULT_PAGE_SIZE: i64 = 25;
/// Maximum allowed page size
pub const MAX_PAGE_SIZE: i64 = 100;
/// Default page number (1-indexed for API consumers)
pub const DEFAULT_PAGE: i64 = 1;

/// Standard pagination query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    /// Sort field
    pub sort_by: Option<String>,
    /// Sort direction (asc/desc)
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
}

fn default_page() -> i64 {
    DEFAULT_PAGE
}

fn default_per_page() -> i64 {
    DEFAULT_PAGE_SIZE
}

fn default_sort_order() -> String {
    "desc".to_string()
}

impl PaginationParams {
    /// Get SQL OFFSET value
    pub fn offset(&self) -> i64 {
        let page = self.page.max(1);
        (page - 1) * self.limit()
    }

    /// Get SQL LIMIT value
    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn is_ascending(&self) -> bool {
        self.sort_order.eq_ignore_ascii_case("asc")
    }

    /// Validate and sanitize sort field against allowed fields
    pub fn validated_sort_field(&self, allowed: &[&str], default: &str) -> String {
        self.sort_by
            .as_ref()
            .filter(|s| allowed.contains(&s.as_str()))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PAGE_SIZE,
            sort_by: None,
            sort_order: "desc".to_string(),
        }
    }
}

/// Pagination metadata returned with list responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    /// Current page (1-indexed)
    pub page: i64,
    /// Items per page
    pub per_page: i64,
    /// Total number of items
    pub total: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Whether there's a next page
    pub has_next: bool,
    /// Whether there's a previous page
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = (total + per_page - 1) / per_page;
        Self {
            page,
            per_page,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Standard paginated response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// The actual data items
    pub data: Vec<T>,
    /// Pagination metadata
    pub meta: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, params: &PaginationParams, total: i64) -> Self {
        Self {
            data,
            meta: PaginationMeta::new(params.page.max(1), params.limit(), total),
        }
    }
}

/// Search parameters common across list endpoints
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchParams {
    /// Free-text search query
    pub q: Option<String>,
}

impl SearchParams {
    /// Trimmed query, or None when blank
    pub fn query(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
    }
}

/// Get search pattern for ILIKE queries
pub fn search_pattern(query: &str) -> String {
    format!("%{}%", query.trim())
}

/// SQL query builder helper for dynamic filtering
#[derive(Debug, Default)]
pub struct QueryBuilder {
    conditions: Vec<String>,
    param_count: usize,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition (returns the parameter placeholder number).
    /// Every `{}` in the condition refers to the same parameter.
    pub fn add_condition(&mut self, condition: &str) -> usize {
        self.param_count += 1;
        let full_condition = condition.replace("{}", &format!("${}", self.param_count));
        self.conditions.push(full_condition);
        self.param_count
    }

    /// Add condition only if value is Some
    pub fn add_optional<T>(&mut self, condition: &str, value: &Option<T>) -> Option<usize> {
        if value.is_some() {
            Some(self.add_condition(condition))
        } else {
            None
        }
    }

    /// Get the WHERE clause (empty string if no conditions)
    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// Get current parameter count
    pub fn param_count(&self) -> usize {
        self.param_count
    }
}

/// Workflow list parameters
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WorkflowListParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    pub sort_by: Option<String>,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
    /// Free-text search over name and description
    pub q: Option<String>,
    /// Filter by active status
    pub is_active: Option<bool>,
    /// Filter by trigger event name
    pub trigger_event: Option<String>,
}

impl WorkflowListParams {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            per_page: self.per_page,
            sort_by: self.sort_by.clone(),
            sort_order: self.sort_order.clone(),
        }
    }

    pub fn to_filter(&self) -> WorkflowFilter {
        let pagination = self.pagination();
        let sort_field = pagination.validated_sort_field(&["created_at", "name"], "created_at");
        let ordering = match (sort_field.as_str(), pagination.is_ascending()) {
            ("name", true) => WorkflowOrdering::Name,
            ("name", false) => WorkflowOrdering::NameDesc,
            (_, true) => WorkflowOrdering::CreatedAt,
            (_, false) => WorkflowOrdering::CreatedAtDesc,
        };

        WorkflowFilter {
            is_active: self.is_active,
            trigger_event: self.trigger_event.clone(),
            search: SearchParams { q: self.q.clone() }.query(),
            ordering,
            limit: pagination.limit(),
            offset: pagination.offset(),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};
use crate::store::Window;

/// How an operation numbers its pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageBase {
    /// First page is 0; offset = page * size
    Zero,
    /// First page is 1; offset = (page - 1) * size
    One,
}

impl PageBase {
    fn first(self) -> i64 {
        match self {
            PageBase::Zero => 0,
            PageBase::One => 1,
        }
    }
}

/// Page size bounds shared by every paged operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimits {
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

/// A validated page request in the convention of the operation it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
    pub base: PageBase,
}

impl PageRequest {
    pub fn window(&self) -> Window {
        let index = self.page - self.base.first();
        // both factors are validated non-negative
        let offset = u64::try_from(index.saturating_mul(self.size)).unwrap_or(u64::MAX);
        Window::new(offset, u64::try_from(self.size).unwrap_or(u64::MAX))
    }
}

/// One window of a filtered search. Only the current window is reported;
/// there is no total count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub number_of_elements: usize,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: PageRequest) -> Self {
        Self {
            number_of_elements: content.len(),
            content,
            page: request.page,
            size: request.size,
        }
    }
}

impl PageLimits {
    /// Listing pagination: both `page` and `size` select one window, anything
    /// else means the whole collection.
    pub fn optional(
        &self,
        page: Option<i64>,
        size: Option<i64>,
        base: PageBase,
    ) -> CatalogResult<Option<PageRequest>> {
        match (page, size) {
            (Some(page), Some(size)) => self.checked(page, size, base).map(Some),
            _ => Ok(None),
        }
    }

    /// Search pagination: missing values fall back to the first page and the
    /// default size.
    pub fn with_defaults(
        &self,
        page: Option<i64>,
        size: Option<i64>,
        base: PageBase,
    ) -> CatalogResult<PageRequest> {
        self.checked(
            page.unwrap_or(base.first()),
            size.unwrap_or(self.default_page_size),
            base,
        )
    }

    fn checked(&self, page: i64, size: i64, base: PageBase) -> CatalogResult<PageRequest> {
        if page < base.first() {
            return Err(CatalogError::validation(
                "page",
                format!("must be at least {}", base.first()),
            ));
        }
        if size < 1 {
            return Err(CatalogError::validation("size", "must be at least 1"));
        }
        if size > self.max_page_size {
            return Err(CatalogError::validation(
                "size",
                format!("must be at most {}", self.max_page_size),
            ));
        }
        Ok(PageRequest { page, size, base })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_based_offsets() {
        let limits = PageLimits::default();
        let first = limits.with_defaults(Some(0), Some(10), PageBase::Zero).unwrap();
        assert_eq!(first.window(), Window::new(0, 10));

        let third = limits.with_defaults(Some(2), Some(10), PageBase::Zero).unwrap();
        assert_eq!(third.window(), Window::new(20, 10));
    }

    #[test]
    fn test_one_based_offsets() {
        let limits = PageLimits::default();
        let first = limits.with_defaults(Some(1), Some(5), PageBase::One).unwrap();
        assert_eq!(first.window(), Window::new(0, 5));

        let err = limits.with_defaults(Some(0), Some(5), PageBase::One).unwrap_err();
        assert!(matches!(err, CatalogError::Validation { ref field, .. } if field == "page"));
    }

    #[test]
    fn test_defaults_apply_to_searches() {
        let limits = PageLimits::default();
        let request = limits.with_defaults(None, None, PageBase::Zero).unwrap();
        assert_eq!((request.page, request.size), (0, 10));

        let request = limits.with_defaults(None, None, PageBase::One).unwrap();
        assert_eq!(request.page, 1);
    }

    #[test]
    fn test_only_one_of_page_and_size_means_everything() {
        let limits = PageLimits::default();
        assert_eq!(limits.optional(Some(1), None, PageBase::Zero).unwrap(), None);
        assert_eq!(limits.optional(None, Some(5), PageBase::Zero).unwrap(), None);
        assert!(limits.optional(Some(1), Some(5), PageBase::Zero).unwrap().is_some());
    }

    #[test]
    fn test_rejects_bad_sizes_and_pages() {
        let limits = PageLimits {
            default_page_size: 10,
            max_page_size: 20,
        };
        assert!(limits.optional(Some(0), Some(0), PageBase::Zero).is_err());
        assert!(limits.optional(Some(0), Some(21), PageBase::Zero).is_err());
        assert!(limits.optional(Some(-1), Some(5), PageBase::Zero).is_err());
        assert!(limits.optional(Some(0), Some(20), PageBase::Zero).is_ok());
    }
}

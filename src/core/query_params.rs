use std::collections::HashMap;

use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Parse query parameters from a raw query string (`user=john&page=2`).
///
/// Values are URL-decoded. Multiple values for the same key are not supported
/// (only the last is kept).
pub fn parse_query_params(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for param in query.split('&').filter(|p| !p.is_empty()) {
        if let Some((key, encoded_value)) = param.split_once('=') {
            let decoded = urlencoding::decode(encoded_value)
                .unwrap_or(std::borrow::Cow::Borrowed(encoded_value))
                .to_string();
            params.insert(key.to_string(), decoded);
        } else {
            // Flag parameter without value
            params.insert(param.to_string(), String::new());
        }
    }

    params
}

/// Get an integer parameter with validation and default
pub fn get_int(params: &HashMap<String, String>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
        .max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub size: usize,
}

impl Page {
    pub fn from_query(query: &str) -> Self {
        let params = parse_query_params(query);
        Self {
            page: get_int(&params, "page", 1),
            size: get_int(&params, "size", DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
        }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip((self.page - 1).saturating_mul(self.size))
            .take(self.size)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_values_and_flags() {
        let params = parse_query_params("q=hello%20world&all&page=2");
        assert_eq!(params.get("q").map(String::as_str), Some("hello world"));
        assert_eq!(params.get("all").map(String::as_str), Some(""));
        assert_eq!(get_int(&params, "page", 1), 2);
    }

    #[test]
    fn page_is_clamped() {
        let page = Page::from_query("page=0&size=1000");
        assert_eq!(page, Page { page: 1, size: MAX_PAGE_SIZE });

        let page = Page::from_query("page=2&size=2");
        assert_eq!(page.apply(vec![1, 2, 3, 4, 5]), vec![3, 4]);
    }

    #[test]
    fn huge_page_numbers_yield_nothing() {
        let page = Page::from_query(&format!("page={}", usize::MAX));
        assert!(page.apply(vec![1, 2, 3]).is_empty());
    }
}

// Copyright (c) 2023 The Cocoon Authors

use cocoon_store_exports::RangeQuery;

/// Pattern match where `%` stands for any sequence of characters
/// ```
/// # use cocoon_store_worker::like;
/// assert!(like("c1;%account", "c1;ben.account"));
/// assert!(!like("c1;%account", "c1;account.ken"));
/// assert!(like("a%b%c", "a__b__c"));
/// assert!(like("abc", "abc"));
/// ```
pub fn like(pattern: &str, s: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return pattern == s;
    }
    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !s.starts_with(first) || s.len() < first.len() + last.len() || !s.ends_with(last) {
        return false;
    }
    let mut rest = &s[first.len()..s.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

/// Whether `key` is selected by `query`
pub fn matches_range(key: &str, query: &RangeQuery) -> bool {
    match (query.start.is_empty(), query.end.is_empty()) {
        (false, false) => {
            key >= query.start.as_str()
                && if query.inclusive {
                    key <= query.end.as_str() || key.starts_with(&query.end)
                } else {
                    key < query.end.as_str()
                }
        }
        (false, true) => key.starts_with(&query.start),
        (true, false) => like(&query.end, key),
        (true, true) => true,
    }
}

//! Trending issues

use chrono::{DateTime, Duration, Utc};
use shared::models::Issue;

/// Issues created after `now - window`, most liked first, at most `limit`.
///
/// Equal like counts keep their snapshot order.
pub fn trending(issues: &[Issue], now: DateTime<Utc>, window: Duration, limit: usize) -> Vec<Issue> {
    let cutoff = now - window;
    let mut recent: Vec<&Issue> = issues.iter().filter(|i| i.created_at > cutoff).collect();
    recent.sort_by(|a, b| b.like_count.cmp(&a.like_count));
    recent.into_iter().take(limit).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(id: &str, created_at: DateTime<Utc>, likes: u64) -> Issue {
        serde_json::from_value(json!({
            "id": id,
            "title": id,
            "created_at": created_at,
            "like_count": likes
        }))
        .unwrap()
    }

    fn ids(issues: &[Issue]) -> Vec<&str> {
        issues.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn old_issues_are_excluded_whatever_their_likes() {
        let now = Utc::now();
        let issues = vec![
            issue("old", now - Duration::days(8), 100),
            issue("new", now - Duration::days(1), 1),
        ];
        assert_eq!(ids(&trending(&issues, now, Duration::days(7), 3)), ["new"]);
    }

    #[test]
    fn ranks_by_likes_and_keeps_fetch_order_on_ties() {
        let now = Utc::now();
        let day = |d| now - Duration::days(d);
        let issues = vec![
            issue("a", day(1), 2),
            issue("b", day(2), 5),
            issue("c", day(3), 2),
            issue("d", day(4), 7),
            issue("e", day(5), 2),
        ];
        assert_eq!(ids(&trending(&issues, now, Duration::days(7), 3)), ["d", "b", "a"]);
        assert_eq!(ids(&trending(&issues, now, Duration::days(7), 10)), ["d", "b", "a", "c", "e"]);
    }

    #[test]
    fn empty_snapshot() {
        assert!(trending(&[], Utc::now(), Duration::days(7), 3).is_empty());
    }
}

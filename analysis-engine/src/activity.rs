use chrono::{DateTime, Duration, Utc};
use reputebot_core::{AnalysisError, Post};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityEstimate {
    pub posts_per_day: f64,
    pub originality_ratio: f64,
    pub posts_in_window: usize,
    /// Nothing was posted inside the window.
    pub low_confidence: bool,
}

pub fn estimate(posts: &[Post], window_days: u32) -> Result<ActivityEstimate, AnalysisError> {
    estimate_at(posts, window_days, Utc::now())
}

/// Counts only posts timestamped within `[now - window_days, now]`.
pub fn estimate_at(
    posts: &[Post],
    window_days: u32,
    now: DateTime<Utc>,
) -> Result<ActivityEstimate, AnalysisError> {
    let start = window_start(window_days, now)?;

    let (in_window, original) = posts
        .iter()
        .filter(|post| post.timestamp >= start && post.timestamp <= now)
        .fold((0usize, 0usize), |(count, original), post| {
            (count + 1, original + usize::from(post.is_original))
        });

    if in_window == 0 {
        return Ok(ActivityEstimate {
            posts_per_day: 0.0,
            originality_ratio: 0.0,
            posts_in_window: 0,
            low_confidence: true,
        });
    }

    Ok(ActivityEstimate {
        posts_per_day: in_window as f64 / f64::from(window_days),
        originality_ratio: original as f64 / in_window as f64,
        posts_in_window: in_window,
        low_confidence: false,
    })
}

/// Oldest timestamp still inside the lookback window.
pub fn window_start(window_days: u32, now: DateTime<Utc>) -> Result<DateTime<Utc>, AnalysisError> {
    if window_days == 0 {
        return Err(AnalysisError::InvalidWindow { days: window_days });
    }
    Ok(now - Duration::days(i64::from(window_days)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn post(days_ago: i64, is_original: bool) -> Post {
        Post {
            id: format!("at://did:plc:t/app.bsky.feed.post/{days_ago}"),
            author_handle: "t.bsky.social".to_string(),
            text: "hello".to_string(),
            timestamp: now() - Duration::days(days_ago),
            is_original,
        }
    }

    #[test]
    fn test_only_posts_inside_window_count() {
        let posts = vec![post(40, true), post(5, true)];
        let estimate = estimate_at(&posts, 30, now()).unwrap();
        assert_eq!(estimate.posts_in_window, 1);
        assert!((estimate.posts_per_day - 1.0 / 30.0).abs() < 1e-9);
        assert!(!estimate.low_confidence);
    }

    #[test]
    fn test_originality_ratio() {
        let mut posts: Vec<Post> = (0..10).map(|day| post(day, true)).collect();
        posts.extend((0..5).map(|day| post(day, false)));
        let estimate = estimate_at(&posts, 30, now()).unwrap();
        assert!((estimate.originality_ratio - 10.0 / 15.0).abs() < 1e-9);
        assert!((estimate.posts_per_day - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_is_low_confidence() {
        let estimate = estimate_at(&[post(90, true)], 30, now()).unwrap();
        assert_eq!(estimate.posts_per_day, 0.0);
        assert_eq!(estimate.originality_ratio, 0.0);
        assert!(estimate.low_confidence);

        assert!(estimate_at(&[], 7, now()).unwrap().low_confidence);
    }

    #[test]
    fn test_window_edges_are_inclusive() {
        let posts = vec![post(30, true), post(0, false)];
        let estimate = estimate_at(&posts, 30, now()).unwrap();
        assert_eq!(estimate.posts_in_window, 2);
    }

    #[test]
    fn test_future_posts_are_ignored() {
        let estimate = estimate_at(&[post(-1, true)], 30, now()).unwrap();
        assert_eq!(estimate.posts_in_window, 0);
    }

    #[test]
    fn test_zero_window_is_rejected() {
        assert_eq!(
            estimate_at(&[post(1, true)], 0, now()),
            Err(AnalysisError::InvalidWindow { days: 0 })
        );
    }
}

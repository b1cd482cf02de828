use reputebot_core::AnalysisResult;

const ELLIPSIS: &str = "...";

/// Renders the reply for one analyzed account.
pub fn format(target_handle: &str, result: &AnalysisResult) -> String {
    let verdict = if result.recommendation {
        "✅ Yes"
    } else {
        "❌ No"
    };
    let sourcing = if result.originality_ratio >= 0.5 {
        "mostly original"
    } else {
        "mostly reposts"
    };

    let mut reply = format!(
        "Should you follow @{target_handle}?\n\
         {verdict} — here's why:\n\
         🔹 Vibes: {}\n\
         🔹 Persona: {}\n\
         🔹 ~{} posts/day, {sourcing}",
        result.vibe_label,
        result.persona_label,
        format_rate(result.posts_per_day),
    );
    if let Some(category) = result.top_category {
        reply.push_str(&format!(
            "\n🔹 Posts on {}\n📌 Add to your {} Feed.",
            category.topic(),
            category.feed_name()
        ));
    }
    reply
}

/// One decimal, except that a slow but non-zero rate keeps two so it never
/// reads as zero.
fn format_rate(posts_per_day: f64) -> String {
    if posts_per_day > 0.0 && posts_per_day < 0.1 {
        format!("{posts_per_day:.2}")
    } else {
        format!("{posts_per_day:.1}")
    }
}

/// Reply used when there is not enough recent activity to judge.
pub fn format_insufficient(target_handle: &str) -> String {
    format!(
        "Should you follow @{target_handle}?\n🤔 Not sure yet: there aren't enough recent posts to read the vibes. Check back later!"
    )
}

/// Clips to `max_chars` characters, ending in an ellipsis when anything was cut.
pub fn truncate_reply(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut clipped: String = text.chars().take(keep).collect();
    clipped.truncate(clipped.trim_end().len());
    clipped.push_str(ELLIPSIS);
    clipped
}

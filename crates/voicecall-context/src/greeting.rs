use dashmap::DashMap;

/// Time-of-day-varied greeting templates. `{interest}` is substituted with a
/// weighted-random pick from the tenant's interest list.
const MORNING_TEMPLATES: &[&str] = &[
    "Good morning! It's lovely to catch up with you. How's your morning been so far?",
    "Morning! I was just thinking about {interest} — have you had any today?",
];
const AFTERNOON_TEMPLATES: &[&str] = &[
    "Good afternoon! How has your day been treating you?",
    "Hi there, good afternoon. I wanted to check in and hear how {interest} is going.",
];
const EVENING_TEMPLATES: &[&str] = &[
    "Good evening! How was your day overall?",
    "Evening! Before we wrap up the day, how's {interest} been lately?",
];

fn templates_for_hour(local_hour: u32) -> &'static [&'static str] {
    match local_hour {
        5..=11 => MORNING_TEMPLATES,
        12..=17 => AFTERNOON_TEMPLATES,
        _ => EVENING_TEMPLATES,
    }
}

/// Tracks the last-used template index per tenant so the same greeting isn't
/// repeated call after call (§4.11).
#[derive(Default)]
pub struct GreetingRotator {
    last_used: DashMap<String, usize>,
}

impl GreetingRotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next greeting template for `tenant_id` at `local_hour`,
    /// rotating away from whatever was used last time for this tenant.
    pub fn next_template(&self, tenant_id: &str, local_hour: u32) -> &'static str {
        let pool = templates_for_hour(local_hour);
        if pool.len() == 1 {
            return pool[0];
        }

        let mut entry = self.last_used.entry(tenant_id.to_string()).or_insert(usize::MAX);
        let next = if *entry == usize::MAX {
            0
        } else {
            (*entry + 1) % pool.len()
        };
        *entry = next;
        pool[next]
    }
}

/// Weighted pick of an interest token, biased toward interests mentioned in
/// the last 7 days of memories (Decision D2): each interest's weight is its
/// recent-mention count, with a floor of 1 so every interest stays reachable.
pub fn pick_weighted_interest<'a>(interests: &'a [String], recent_mention_counts: &[u32]) -> Option<&'a str> {
    if interests.is_empty() {
        return None;
    }
    let weights: Vec<u32> = interests
        .iter()
        .enumerate()
        .map(|(i, _)| recent_mention_counts.get(i).copied().unwrap_or(0).max(1))
        .collect();
    let total: u32 = weights.iter().sum();
    let pick = pseudo_random_u32() % total;

    let mut cumulative = 0u32;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        if pick < cumulative {
            return Some(interests[i].as_str());
        }
    }
    interests.last().map(|s| s.as_str())
}

/// Deterministic-enough pseudo-random source for greeting variety, avoiding
/// a `rand` dependency for a single weighted pick.
fn pseudo_random_u32() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
}

/// Render `{interest}` in a greeting template, or drop the clause gracefully
/// if the tenant has no interests recorded.
pub fn render_greeting(template: &str, interest: Option<&str>) -> String {
    match interest {
        Some(i) => template.replace("{interest}", i),
        None => template.replace("{interest}", "how things have been"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotator_picks_a_different_template_each_call() {
        let rotator = GreetingRotator::new();
        let first = rotator.next_template("tenant-1", 9);
        let second = rotator.next_template("tenant-1", 9);
        assert_ne!(first, second);
    }

    #[test]
    fn hour_selects_the_right_pool() {
        assert!(MORNING_TEMPLATES.contains(&GreetingRotator::new().next_template("t", 8)));
        assert!(AFTERNOON_TEMPLATES.contains(&GreetingRotator::new().next_template("t", 14)));
        assert!(EVENING_TEMPLATES.contains(&GreetingRotator::new().next_template("t", 20)));
    }

    #[test]
    fn weighted_pick_never_selects_unlisted_interest() {
        let interests = vec!["gardening".to_string(), "fishing".to_string()];
        let counts = vec![5, 0];
        for _ in 0..20 {
            let picked = pick_weighted_interest(&interests, &counts).unwrap();
            assert!(interests.iter().any(|i| i == picked));
        }
    }

    #[test]
    fn render_falls_back_gracefully_with_no_interest() {
        let rendered = render_greeting("Hi, how's {interest}?", None);
        assert_eq!(rendered, "Hi, how's how things have been?");
    }
}

//! Robots document parser and matcher.
//!
//! Rule selection follows the longest-match convention: the most specific
//! matching `Allow`/`Disallow` pattern wins and `Allow` wins ties. Patterns may
//! contain `*` wildcards and a trailing `$` end anchor.

use std::collections::BTreeSet;
use std::time::Duration;

/// Parsed robots rules for one domain.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<AgentGroup>,
    sitemaps: Vec<String>,
}

/// One `User-agent` group and the rules that follow it.
#[derive(Debug, Clone, Default)]
struct AgentGroup {
    /// Lowercased product tokens, `*` for the wildcard group
    agents: Vec<String>,
    rules: Vec<PathRule>,
    crawl_delay: Option<f64>,
}

#[derive(Debug, Clone)]
struct PathRule {
    pattern: String,
    allow: bool,
}

impl RobotsRules {
    /// Parse a robots document. Unknown directives and malformed lines are skipped.
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut current: Option<AgentGroup> = None;

        for raw_line in content.lines() {
            let line = match raw_line.split_once('#') {
                Some((before, _)) => before.trim(),
                None => raw_line.trim(),
            };
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    let agent = value.to_ascii_lowercase();
                    match current.as_mut() {
                        // Consecutive user-agent lines share one group
                        Some(group) if group.rules.is_empty() && group.crawl_delay.is_none() => {
                            group.agents.push(agent);
                        }
                        _ => {
                            if let Some(done) = current.take() {
                                robots.groups.push(done);
                            }
                            current = Some(AgentGroup {
                                agents: vec![agent],
                                ..Default::default()
                            });
                        }
                    }
                }
                "allow" | "disallow" => {
                    // An empty Disallow means "allow everything" and adds no rule
                    if let (Some(group), false) = (current.as_mut(), value.is_empty()) {
                        group.rules.push(PathRule {
                            pattern: value.to_string(),
                            allow: directive == "allow",
                        });
                    }
                }
                "crawl-delay" => {
                    if let (Some(group), Ok(delay)) = (current.as_mut(), value.parse::<f64>()) {
                        if delay.is_finite() && delay >= 0.0 {
                            group.crawl_delay = Some(delay);
                        }
                    }
                }
                "sitemap" => robots.sitemaps.push(value.to_string()),
                _ => {}
            }
        }

        if let Some(done) = current {
            robots.groups.push(done);
        }
        robots
    }

    /// Pick the group that applies to a user agent.
    ///
    /// The user agent is reduced to its product token (`FilingHarvest/1.0` ->
    /// `filingharvest`). The longest group token contained in it wins; the `*`
    /// group is the fallback.
    fn group_for(&self, user_agent: &str) -> Option<&AgentGroup> {
        let product = product_token(user_agent);

        let mut best: Option<(&AgentGroup, usize)> = None;
        for group in &self.groups {
            for agent in &group.agents {
                if agent == "*" || agent.is_empty() {
                    continue;
                }
                if product.contains(agent.as_str())
                    && best.map_or(true, |(_, len)| agent.len() > len)
                {
                    best = Some((group, agent.len()));
                }
            }
        }

        best.map(|(g, _)| g).or_else(|| {
            self.groups
                .iter()
                .find(|g| g.agents.iter().any(|a| a == "*"))
        })
    }

    /// Check if a path (with optional query string) is allowed.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        // (specificity, allow)
        let mut verdict: Option<(usize, bool)> = None;
        for rule in &group.rules {
            if !pattern_matches(&rule.pattern, path) {
                continue;
            }
            let specificity = rule.pattern.len();
            verdict = match verdict {
                Some((len, allow))
                    if len > specificity || (len == specificity && (allow || !rule.allow)) =>
                {
                    Some((len, allow))
                }
                _ => Some((specificity, rule.allow)),
            };
        }

        verdict.map_or(true, |(_, allow)| allow)
    }

    /// Crawl delay declared for the agent's group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .and_then(|g| g.crawl_delay)
            .map(Duration::from_secs_f64)
    }

    /// Disallow patterns that apply to the agent.
    pub fn disallowed_paths(&self, user_agent: &str) -> BTreeSet<String> {
        self.group_for(user_agent)
            .map(|g| {
                g.rules
                    .iter()
                    .filter(|r| !r.allow)
                    .map(|r| r.pattern.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pattern of the rule that blocked `path`, for decision reasons.
    pub fn blocking_rule(&self, user_agent: &str, path: &str) -> Option<String> {
        if self.is_allowed(user_agent, path) {
            return None;
        }
        self.group_for(user_agent).and_then(|g| {
            g.rules
                .iter()
                .filter(|r| !r.allow && pattern_matches(&r.pattern, path))
                .max_by_key(|r| r.pattern.len())
                .map(|r| r.pattern.clone())
        })
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    pub fn disallows_all(&self, user_agent: &str) -> bool {
        !self.is_allowed(user_agent, "/")
    }
}

fn product_token(user_agent: &str) -> String {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Match a robots path pattern against a path.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    if !path.starts_with(first) {
        return false;
    }
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return !anchored || path.len() == first.len();
    }

    let mut pos = first.len();
    for (i, part) in rest.iter().enumerate() {
        let last = i + 1 == rest.len();
        if last && anchored {
            return path.len() >= pos + part.len() && path.ends_with(part);
        }
        if part.is_empty() {
            continue;
        }
        match path[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }
    true
}

use serde::Serialize;

/// The `User-agent: *` rules of a robots.txt file plus its sitemap
/// directives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RobotsTxt {
    rules: Vec<Rule>,
    pub sitemaps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Rule {
    allow: bool,
    path: String,
}

impl RobotsTxt {
    pub fn parse(text: &str) -> RobotsTxt {
        let mut robots = RobotsTxt::default();
        // Agents named by the group currently being read.
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_rules = false;

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else { continue };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_rules {
                        group_agents.clear();
                        in_rules = false;
                    }
                    group_agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    if !group_agents.iter().any(|a| a == "*") {
                        continue;
                    }
                    // An empty Disallow allows everything.
                    if value.is_empty() {
                        continue;
                    }
                    robots.rules.push(Rule {
                        allow: key == "allow",
                        path: value.to_string(),
                    });
                }
                "sitemap" if !value.is_empty() => robots.sitemaps.push(value.to_string()),
                _ => {}
            }
        }
        robots
    }

    /// Longest matching rule wins; on equal length Allow wins.
    pub fn allows(&self, path: &str) -> bool {
        self.rules
            .iter()
            .filter(|r| rule_matches(&r.path, path))
            .max_by_key(|r| (r.path.len(), r.allow))
            .map(|r| r.allow)
            .unwrap_or(true)
    }
}

/// Prefix match with `*` wildcards and a `$` end anchor.
fn rule_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;
    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            if !path.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if anchored && i == last {
            return path.len() >= pos + part.len() && path[pos..].ends_with(part);
        } else {
            match path[pos..].find(part) {
                Some(idx) => pos += idx + part.len(),
                None => return false,
            }
        }
    }
    !anchored || pos == path.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "\
User-agent: Googlebot
Disallow: /

User-agent: *
Disallow: /private/
Allow: /private/press/
Disallow: /*.pdf$

Sitemap: https://example.com/sitemap_index.xml
";

    #[test]
    fn star_group_only() {
        let r = RobotsTxt::parse(ROBOTS);
        assert!(r.allows("/"));
        assert!(r.allows("/blog/post"));
        assert!(!r.allows("/private/data"));
        assert!(r.allows("/private/press/release"));
    }

    #[test]
    fn wildcard_and_anchor() {
        let r = RobotsTxt::parse(ROBOTS);
        assert!(!r.allows("/files/report.pdf"));
        assert!(r.allows("/files/report.pdf?download=1"));
    }

    #[test]
    fn sitemaps_collected() {
        let r = RobotsTxt::parse(ROBOTS);
        assert_eq!(r.sitemaps, vec!["https://example.com/sitemap_index.xml".to_string()]);
    }

    #[test]
    fn empty_disallow_allows_all() {
        let r = RobotsTxt::parse("User-agent: *\nDisallow:\n");
        assert!(r.allows("/anything"));
        assert!(!RobotsTxt::parse("User-agent: *\nDisallow: /\n").allows("/anything"));
    }
}

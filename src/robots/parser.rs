//! Robots.txt parser and rule evaluation
//!
//! Groups are selected by agent token and rules are evaluated by
//! specificity: the longest matching pattern decides, regardless of the
//! order rules were declared in. Equal-length Allow and Disallow matches
//! resolve to Allow.

/// One Allow or Disallow line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub allow: bool,
    pub pattern: String,
}

impl Rule {
    /// Pattern length not counting `*` wildcards
    pub fn specificity(&self) -> usize {
        self.pattern.chars().filter(|c| *c != '*').count()
    }

    pub fn matches(&self, path: &str) -> bool {
        pattern_matches(&self.pattern, path)
    }
}

/// A run of User-agent lines and the directives that follow them
#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt content
#[derive(Debug, Clone, Default)]
pub struct RobotsRuleSet {
    groups: Vec<Group>,
    /// Lines carrying a known robots.txt field
    directives: usize,
}

/// Groups that apply to one agent
struct Selection<'a> {
    specific: Vec<&'a Group>,
    wildcard: Vec<&'a Group>,
}

impl RobotsRuleSet {
    /// Parses raw robots.txt content
    ///
    /// Unknown directives, lines without a colon and directives appearing
    /// before the first User-agent line are ignored. An empty `Disallow:`
    /// carries no rule.
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut reading_agents = false;
        let mut directives = 0;

        for line in content.lines() {
            let line = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            }
            .trim();

            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();
            if is_known_field(&field) {
                directives += 1;
            }

            match field.as_str() {
                "user-agent" => {
                    // A User-agent line after directives starts a new group
                    if !reading_agents && !current.agents.is_empty() {
                        groups.push(std::mem::take(&mut current));
                    }
                    current.agents.push(value.to_ascii_lowercase());
                    reading_agents = true;
                }
                "allow" | "disallow" => {
                    reading_agents = false;
                    if current.agents.is_empty() || value.is_empty() {
                        continue;
                    }
                    current.rules.push(Rule {
                        allow: field == "allow",
                        pattern: value.to_string(),
                    });
                }
                "crawl-delay" => {
                    reading_agents = false;
                    if current.agents.is_empty() {
                        continue;
                    }
                    if let Ok(delay) = value.parse::<f64>() {
                        if delay.is_finite() && delay >= 0.0 {
                            current.crawl_delay = Some(delay);
                        }
                    }
                }
                _ => {}
            }
        }

        if !current.agents.is_empty() {
            groups.push(current);
        }

        Self { groups, directives }
    }

    /// Returns true if any line carried a known robots.txt field
    ///
    /// Content with none of them (an HTML page served at /robots.txt, say)
    /// is not a policy.
    pub fn has_directives(&self) -> bool {
        self.directives > 0
    }

    /// Returns true if the rule set has no groups at all
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Picks the groups that apply to `agent`
    ///
    /// A group token applies when the agent name starts with it
    /// (case-insensitive). The longest such token wins, the first declared
    /// on ties, and every group declaring the winning token is merged. The
    /// wildcard groups are kept separately for crawl-delay purposes.
    fn select(&self, agent: &str) -> Selection<'_> {
        let agent = agent.to_ascii_lowercase();

        let mut best: Option<&str> = None;
        for group in &self.groups {
            for token in &group.agents {
                if token == "*" || token.is_empty() || !agent.starts_with(token.as_str()) {
                    continue;
                }
                if best.map_or(true, |b| token.len() > b.len()) {
                    best = Some(token);
                }
            }
        }

        let specific = match best {
            Some(token) => self
                .groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == token))
                .collect(),
            None => Vec::new(),
        };
        let wildcard = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a == "*"))
            .collect();

        Selection { specific, wildcard }
    }

    /// Returns the rule that decides `path` for `agent`, if any matches
    ///
    /// `path` is the URL path including `?query` when present.
    pub fn decisive_rule(&self, path: &str, agent: &str) -> Option<&Rule> {
        let selection = self.select(agent);
        let groups = if selection.specific.is_empty() {
            selection.wildcard
        } else {
            selection.specific
        };

        groups
            .into_iter()
            .flat_map(|g| g.rules.iter())
            .filter(|rule| rule.matches(path))
            .max_by(|a, b| {
                a.specificity()
                    .cmp(&b.specificity())
                    .then(a.allow.cmp(&b.allow))
            })
    }

    /// Checks if a path is allowed for the given agent
    ///
    /// Absence of any matching rule means allowed.
    pub fn is_allowed(&self, path: &str, agent: &str) -> bool {
        self.decisive_rule(path, agent).map_or(true, |rule| rule.allow)
    }

    /// Effective crawl delay in seconds
    ///
    /// The larger of the specific-agent and wildcard delays when both are
    /// declared.
    pub fn crawl_delay(&self, agent: &str) -> Option<f64> {
        let selection = self.select(agent);
        selection
            .specific
            .iter()
            .chain(selection.wildcard.iter())
            .filter_map(|g| g.crawl_delay)
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
    }
}

fn is_known_field(field: &str) -> bool {
    matches!(
        field,
        "user-agent" | "allow" | "disallow" | "crawl-delay" | "sitemap" | "host"
    )
}

/// Matches a robots.txt path pattern against a path
///
/// Patterns are anchored at the start. `*` matches any run of characters
/// and a trailing `$` anchors the end.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let mut pieces = pattern.split('*');
    let first = pieces.next().unwrap_or("");
    let Some(mut rest) = path.strip_prefix(first) else {
        return false;
    };

    let pieces: Vec<&str> = pieces.collect();
    let Some((last, middle)) = pieces.split_last() else {
        return !anchored || rest.is_empty();
    };

    for piece in middle {
        match rest.find(piece) {
            Some(idx) => rest = &rest[idx + piece.len()..],
            None => return false,
        }
    }

    if anchored {
        rest.ends_with(last)
    } else {
        rest.contains(last)
    }
}

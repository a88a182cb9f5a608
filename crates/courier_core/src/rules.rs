use url::Url;

pub type RuleId = u64;

/// A session-scoped rule forcing the `Referer` header for one exact URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferrerRule {
    pub id: RuleId,
    pub url_filter: String,
    pub referrer: String,
    pub scope_domain: String,
}

/// The live rule table. Ids are monotonic over the process lifetime and
/// never reused while a rule is still installed.
#[derive(Debug, Default)]
pub struct ReferrerRuleSet {
    next_id: RuleId,
    rules: Vec<ReferrerRule>,
}

impl ReferrerRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        url_filter: impl Into<String>,
        referrer: impl Into<String>,
        scope_domain: impl Into<String>,
    ) -> RuleId {
        let id = self.next_id;
        self.next_id += 1;
        self.rules.push(ReferrerRule {
            id,
            url_filter: url_filter.into(),
            referrer: referrer.into(),
            scope_domain: scope_domain.into(),
        });
        id
    }

    /// Removes by id. Missing ids are tolerated: disabling a rule that was
    /// already removed or never took effect is not an error.
    pub fn remove(&mut self, id: RuleId) {
        self.rules.retain(|rule| rule.id != id);
    }

    /// Forced `Referer` value for a request to `url` issued from `scope`,
    /// if an installed rule matches. The newest matching rule wins.
    pub fn forced_referrer(&self, scope: &str, url: &str) -> Option<&str> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.scope_domain == scope && urls_match(&rule.url_filter, url))
            .map(|rule| rule.referrer.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Exact match, normalized through `Url` when both sides parse so spelling
/// differences (default ports, percent-encoding case) do not defeat it.
fn urls_match(filter: &str, candidate: &str) -> bool {
    if filter == candidate {
        return true;
    }
    match (Url::parse(filter), Url::parse(candidate)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Label that marks a container as routed by the reverse proxy.
pub const DEFAULT_ENABLE_LABEL: &str = "traefik.enable";

/// Label carrying the comma-separated domains a container wants certificates for.
pub const DEFAULT_DOMAINS_LABEL: &str = "mkcert.domains";

/// Names of the labels the reconciler selects containers by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    /// Boolean label that must be `true`
    pub enable: String,
    /// String label holding the domain list
    pub domains: String,
}

impl Default for LabelSelector {
    fn default() -> Self {
        Self {
            enable: DEFAULT_ENABLE_LABEL.to_string(),
            domains: DEFAULT_DOMAINS_LABEL.to_string(),
        }
    }
}

impl LabelSelector {
    pub fn new(enable: impl Into<String>, domains: impl Into<String>) -> Self {
        Self {
            enable: enable.into(),
            domains: domains.into(),
        }
    }

    /// Whether a raw enable-label value switches the container on.
    pub fn is_enabled_value(value: &str) -> bool {
        value.trim().eq_ignore_ascii_case("true")
    }
}

/// Parse a domains label into an ordered, deduplicated list.
///
/// Entries are trimmed and empty entries dropped. The first occurrence of a
/// domain wins, so element 0 stays the certificate's primary name.
pub fn parse_domains(raw: &str) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let domain = part.trim();
        if domain.is_empty() || domains.iter().any(|d| d == domain) {
            continue;
        }
        domains.push(domain.to_string());
    }
    domains
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_domains_trims_dedups_and_keeps_order() {
        assert_eq!(
            parse_domains("a.example.com, b.example.com ,a.example.com"),
            vec!["a.example.com", "b.example.com"]
        );
    }

    #[test]
    fn parse_domains_drops_empty_entries() {
        assert_eq!(parse_domains(" , one.test,, ,two.test,"), vec!["one.test", "two.test"]);
        assert!(parse_domains("").is_empty());
        assert!(parse_domains(" ,  , ").is_empty());
    }

    #[test]
    fn parse_domains_single_entry() {
        assert_eq!(parse_domains("app.localhost"), vec!["app.localhost"]);
    }

    #[test]
    fn enable_value_is_case_insensitive_true() {
        assert!(LabelSelector::is_enabled_value("true"));
        assert!(LabelSelector::is_enabled_value(" TRUE "));
        assert!(!LabelSelector::is_enabled_value("false"));
        assert!(!LabelSelector::is_enabled_value("1"));
        assert!(!LabelSelector::is_enabled_value(""));
    }

    #[test]
    fn default_selector_uses_proxy_labels() {
        let selector = LabelSelector::default();
        assert_eq!(selector.enable, "traefik.enable");
        assert_eq!(selector.domains, "mkcert.domains");
    }
}

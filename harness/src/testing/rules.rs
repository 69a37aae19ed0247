//! Comparison rules
//!
//! A [`ComparisonRuleSet`] describes which differences between a capture and
//! its reference are tolerated. Rules are applied identically to both sides.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

/// Nesting level of the record hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Resource,
    Scope,
    Entry,
    Point,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::Resource => "resource",
            Level::Scope => "scope",
            Level::Entry => "entry",
            Level::Point => "point",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resource" => Ok(Level::Resource),
            "scope" => Ok(Level::Scope),
            "entry" => Ok(Level::Entry),
            "point" => Ok(Level::Point),
            other => Err(format!("unknown level '{other}' (resource, scope, entry, point)")),
        }
    }
}

/// Which attribute maps a field rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldScope {
    Resource,
    Scope,
    Entry,
    Point,
    Any,
}

impl FieldScope {
    pub fn covers(&self, level: Level) -> bool {
        matches!(
            (self, level),
            (FieldScope::Any, _)
                | (FieldScope::Resource, Level::Resource)
                | (FieldScope::Scope, Level::Scope)
                | (FieldScope::Entry, Level::Entry)
                | (FieldScope::Point, Level::Point)
        )
    }
}

/// String normalization applied to a field value on both sides
#[derive(Clone)]
pub struct ValueTransform {
    label: String,
    apply: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl ValueTransform {
    pub fn new(label: &str, apply: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            label: label.to_string(),
            apply: Arc::new(apply),
        }
    }

    pub fn apply(&self, value: &str) -> String {
        (self.apply)(value)
    }

    /// Replace any value with `*`
    pub fn replace_with_star() -> Self {
        Self::new("replace_with_star", |_| "*".to_string())
    }

    /// Collapse values starting with a known prefix to that prefix
    pub fn shorten_to_prefix(prefixes: &[&str]) -> Self {
        let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
        Self::new("shorten_to_prefix", move |value| {
            prefixes
                .iter()
                .find(|prefix| value.starts_with(prefix.as_str()))
                .cloned()
                .unwrap_or_else(|| value.to_string())
        })
    }

    /// Remove every match of `pattern`
    pub fn strip(pattern: Regex) -> Self {
        let label = format!("strip({})", pattern.as_str());
        Self::new(&label, move |value| pattern.replace_all(value, "").into_owned())
    }

    /// Keep the last path segment of an image reference and drop an arch suffix
    pub fn image_name() -> Self {
        const ARCHES: [&str; 4] = ["-amd64", "-arm64", "-ppc64le", "-s390x"];
        Self::new("image_name", |value| {
            let last = value.rsplit('/').next().unwrap_or(value);
            ARCHES
                .iter()
                .find_map(|arch| last.strip_suffix(arch))
                .unwrap_or(last)
                .to_string()
        })
    }
}

impl fmt::Debug for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueTransform({})", self.label)
    }
}

#[derive(Debug, Clone)]
pub enum Rule {
    /// Compare the lists at this level as multisets
    IgnoreOrder(Level),
    /// Only presence of the field is compared
    IgnoreFieldValue { name: String, scope: FieldScope },
    /// Field is stripped from both sides before comparison
    IgnoreField { name: String },
    TransformFieldValue {
        name: String,
        scope: FieldScope,
        transform: ValueTransform,
    },
    /// Keep only the first point of the named series (all series when empty)
    CollapseSubsequentPoints { names: Vec<String> },
    IgnoreTimestamps,
    IgnorePointValues,
    IgnoreScopeVersion,
}

/// Ordered set of comparison rules
#[derive(Debug, Clone, Default)]
pub struct ComparisonRuleSet {
    rules: Vec<Rule>,
}

impl ComparisonRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order-insensitive at every level
    pub fn unordered() -> Self {
        Self::new()
            .ignore_order(Level::Resource)
            .ignore_order(Level::Scope)
            .ignore_order(Level::Entry)
            .ignore_order(Level::Point)
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn ignore_order(self, level: Level) -> Self {
        self.rule(Rule::IgnoreOrder(level))
    }

    pub fn ignore_field_value(self, name: &str, scope: FieldScope) -> Self {
        self.rule(Rule::IgnoreFieldValue {
            name: name.to_string(),
            scope,
        })
    }

    pub fn ignore_field(self, name: &str) -> Self {
        self.rule(Rule::IgnoreField { name: name.to_string() })
    }

    pub fn transform_field_value(self, name: &str, scope: FieldScope, transform: ValueTransform) -> Self {
        self.rule(Rule::TransformFieldValue {
            name: name.to_string(),
            scope,
            transform,
        })
    }

    pub fn collapse_subsequent_points(self, names: &[&str]) -> Self {
        self.rule(Rule::CollapseSubsequentPoints {
            names: names.iter().map(|n| n.to_string()).collect(),
        })
    }

    pub fn ignore_timestamps(self) -> Self {
        self.rule(Rule::IgnoreTimestamps)
    }

    pub fn ignore_point_values(self) -> Self {
        self.rule(Rule::IgnorePointValues)
    }

    pub fn ignore_scope_version(self) -> Self {
        self.rule(Rule::IgnoreScopeVersion)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn ignores_order(&self, level: Level) -> bool {
        self.rules
            .iter()
            .any(|rule| matches!(rule, Rule::IgnoreOrder(l) if *l == level))
    }

    pub fn ignores_value(&self, name: &str, level: Level) -> bool {
        self.rules.iter().any(|rule| {
            matches!(rule, Rule::IgnoreFieldValue { name: n, scope } if n == name && scope.covers(level))
        })
    }

    pub fn strips(&self, name: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| matches!(rule, Rule::IgnoreField { name: n } if n == name))
    }

    /// Transforms for `name` at `level`, in declaration order
    pub fn transforms_for<'a>(&'a self, name: &'a str, level: Level) -> impl Iterator<Item = &'a ValueTransform> + 'a {
        self.rules.iter().filter_map(move |rule| match rule {
            Rule::TransformFieldValue { name: n, scope, transform } if n == name && scope.covers(level) => {
                Some(transform)
            }
            _ => None,
        })
    }

    /// Whether only the first point of series `name` is kept
    pub fn collapses(&self, name: &str) -> bool {
        self.rules.iter().any(|rule| match rule {
            Rule::CollapseSubsequentPoints { names } => names.is_empty() || names.iter().any(|n| n == name),
            _ => false,
        })
    }

    pub fn ignores_timestamps(&self) -> bool {
        self.rules.iter().any(|rule| matches!(rule, Rule::IgnoreTimestamps))
    }

    pub fn ignores_point_values(&self) -> bool {
        self.rules.iter().any(|rule| matches!(rule, Rule::IgnorePointValues))
    }

    pub fn ignores_scope_version(&self) -> bool {
        self.rules.iter().any(|rule| matches!(rule, Rule::IgnoreScopeVersion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_scope_coverage() {
        assert!(FieldScope::Any.covers(Level::Point));
        assert!(FieldScope::Resource.covers(Level::Resource));
        assert!(!FieldScope::Resource.covers(Level::Entry));
    }

    #[test]
    fn test_rule_queries() {
        let rules = ComparisonRuleSet::new()
            .ignore_order(Level::Entry)
            .ignore_field_value("container.id", FieldScope::Resource)
            .ignore_field("k8s.pod.uid")
            .collapse_subsequent_points(&["up"]);

        assert!(rules.ignores_order(Level::Entry));
        assert!(!rules.ignores_order(Level::Resource));
        assert!(rules.ignores_value("container.id", Level::Resource));
        assert!(!rules.ignores_value("container.id", Level::Point));
        assert!(rules.strips("k8s.pod.uid"));
        assert!(rules.collapses("up"));
        assert!(!rules.collapses("down"));
        assert!(!rules.ignores_timestamps());
    }

    #[test]
    fn test_empty_collapse_list_means_every_series() {
        let rules = ComparisonRuleSet::new().collapse_subsequent_points(&[]);
        assert!(rules.collapses("anything"));
    }

    #[test]
    fn test_builtin_transforms() {
        let shorten = ValueTransform::shorten_to_prefix(&["kube-proxy", "coredns"]);
        assert_eq!(shorten.apply("kube-proxy-7x2lm"), "kube-proxy");
        assert_eq!(shorten.apply("etcd-kind"), "etcd-kind");

        assert_eq!(ValueTransform::replace_with_star().apply("abc123"), "*");

        let image = ValueTransform::image_name();
        assert_eq!(image.apply("quay.io/signalfx/splunk-otel-collector-amd64"), "splunk-otel-collector");

        let strip = ValueTransform::strip(Regex::new(r"\d+").unwrap());
        assert_eq!(strip.apply("pod-123-x9"), "pod--x");
    }

    #[test]
    fn test_transforms_apply_in_declaration_order() {
        let rules = ComparisonRuleSet::new()
            .transform_field_value("k8s.pod.name", FieldScope::Resource, ValueTransform::shorten_to_prefix(&["coredns"]))
            .transform_field_value("k8s.pod.name", FieldScope::Any, ValueTransform::new("upper", |v| v.to_uppercase()));

        let result = rules
            .transforms_for("k8s.pod.name", Level::Resource)
            .fold("coredns-5d78c".to_string(), |value, t| t.apply(&value));
        assert_eq!(result, "COREDNS");

        assert_eq!(rules.transforms_for("k8s.pod.name", Level::Point).count(), 1);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("scope".parse::<Level>().unwrap(), Level::Scope);
        assert!("datapoint".parse::<Level>().is_err());
    }
}

//! Excluded-asset filters
//!
//! Filters are asset names with optional `*` wildcards, matched
//! case-insensitively against the whole name.

use crate::error::{Error, Result};
use crate::types::Asset;
use regex::{Regex, RegexBuilder};

/// Compiled set of excluded-asset filters
#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    patterns: Vec<Regex>,
}

impl AssetFilter {
    /// Compile the filters of a subscription
    pub fn new<S: AsRef<str>>(filters: &[S]) -> Result<Self> {
        let patterns = filters
            .iter()
            .map(AsRef::as_ref)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether `name` is excluded
    pub fn is_excluded(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Assets that are not excluded, in their original order
    pub fn retain<'a>(&self, assets: &'a [Asset]) -> Vec<&'a Asset> {
        assets.iter().filter(|a| !self.is_excluded(&a.name)).collect()
    }
}

fn compile(filter: &str) -> Result<Regex> {
    let body = filter
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    RegexBuilder::new(&format!("^{body}$"))
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Parse(format!("invalid asset filter '{filter}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> Asset {
        Asset {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            non_shipping: false,
            locations: vec![],
        }
    }

    #[test]
    fn test_exact_filter_is_case_insensitive() {
        let filter = AssetFilter::new(&["Microsoft.NET.Sdk"]).unwrap();
        assert!(filter.is_excluded("microsoft.net.sdk"));
        assert!(!filter.is_excluded("Microsoft.NET.Sdk.Web"));
    }

    #[test]
    fn test_wildcard_filter() {
        let filter = AssetFilter::new(&["Microsoft.*.Ref", "*.Internal"]).unwrap();
        assert!(filter.is_excluded("Microsoft.NETCore.App.Ref"));
        assert!(filter.is_excluded("Foo.Internal"));
        assert!(!filter.is_excluded("Microsoft.NETCore.App"));
    }

    #[test]
    fn test_regex_characters_are_literal() {
        let filter = AssetFilter::new(&["Foo+Bar"]).unwrap();
        assert!(filter.is_excluded("Foo+Bar"));
        assert!(!filter.is_excluded("FooBar"));
    }

    #[test]
    fn test_retain_keeps_order() {
        let filter = AssetFilter::new(&["B*", " "]).unwrap();
        let assets = vec![asset("A"), asset("Bee"), asset("C")];
        let kept: Vec<_> = filter.retain(&assets).iter().map(|a| a.name.as_str()).collect();
        assert_eq!(kept, vec!["A", "C"]);
    }
}

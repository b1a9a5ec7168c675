//! Four-tier CNAE classification: exact code, longest prefix, category
//! fallback, absolute default. Resolution is total.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::code::{digits_only, format_canonical, normalize, ActivityCode, Category};
use super::rules::{PrefixRule, RuleTables, SourceTier, TaxRuleSet, DEFAULT_NOTE, ESTIMATED_NOTE};
use crate::config::TaxConfig;
use crate::error::TaxError;
use crate::types::{with_metadata, ComputationOutput};
use crate::TaxResult;

type CacheKey = (String, Option<Category>);

/// Maps activity codes to rulesets. Immutable after construction apart from
/// the optional bounded cache, which never changes an answer.
#[derive(Debug)]
pub struct RuleResolver {
    tables: RuleTables,
    /// Longest prefix first, ties alphabetical.
    prefixes: Vec<PrefixRule>,
    cache: Option<RwLock<HashMap<CacheKey, TaxRuleSet>>>,
    capacity: usize,
}

impl RuleResolver {
    pub fn new(mut tables: RuleTables) -> Self {
        // External tables may key exact rules in dashed form.
        tables.exact = std::mem::take(&mut tables.exact)
            .into_iter()
            .map(|(key, rule)| (normalize(&key), rule))
            .collect();
        let mut prefixes = tables.prefixes.clone();
        prefixes.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });
        RuleResolver {
            tables,
            prefixes,
            cache: None,
            capacity: 0,
        }
    }

    /// Resolver with a result cache holding at most `capacity` entries.
    /// Once full, further results are computed but not stored.
    pub fn with_cache(tables: RuleTables, capacity: usize) -> Self {
        let mut resolver = RuleResolver::new(tables);
        if capacity > 0 {
            resolver.cache = Some(RwLock::new(HashMap::with_capacity(capacity)));
            resolver.capacity = capacity;
        }
        resolver
    }

    pub fn from_config(config: &TaxConfig) -> Self {
        RuleResolver::with_cache(config.rules.clone(), config.resolver_cache_capacity)
    }

    pub fn tables(&self) -> &RuleTables {
        &self.tables
    }

    /// Classify `code`. Never fails; unknown codes fall through to the
    /// category table and finally to the default ruleset.
    pub fn resolve(&self, code: &str, category: Option<Category>) -> TaxRuleSet {
        self.resolve_with_cache_stats(code, category).0
    }

    /// Classify an already validated code using its own category as the
    /// fallback.
    pub fn resolve_code(&self, code: &ActivityCode) -> TaxRuleSet {
        self.resolve(code.digits(), Some(code.category()))
    }

    /// Same as [`resolve`](Self::resolve), also reporting whether the answer
    /// came from the cache.
    pub fn resolve_with_cache_stats(
        &self,
        code: &str,
        category: Option<Category>,
    ) -> (TaxRuleSet, bool) {
        let normalized = normalize(code);
        let Some(cache) = &self.cache else {
            return (self.resolve_uncached(&normalized, category), false);
        };

        let key = (normalized, category);
        if let Some(hit) = cache.read().get(&key) {
            return (hit.clone(), true);
        }
        let ruleset = self.resolve_uncached(&key.0, category);
        let mut guard = cache.write();
        if guard.len() < self.capacity {
            guard.insert(key, ruleset.clone());
        }
        (ruleset, false)
    }

    fn resolve_uncached(&self, normalized: &str, category: Option<Category>) -> TaxRuleSet {
        if let Some(rule) = self.tables.exact.get(normalized) {
            debug!(code = normalized, "activity resolved by exact code");
            return rule.to_ruleset(SourceTier::Exact, normalized, None);
        }

        let digits = digits_only(normalized);
        if !digits.is_empty() {
            if let Some(p) = self.prefixes.iter().find(|p| digits.starts_with(&p.prefix)) {
                debug!(code = normalized, prefix = %p.prefix, "activity resolved by prefix");
                return p.rule.to_ruleset(SourceTier::Prefix, &p.prefix, None);
            }
        }

        if let Some(cat) = category {
            if let Some(rule) = self.tables.categories.get(&cat) {
                debug!(code = normalized, category = %cat, "activity resolved by category fallback");
                return rule.to_ruleset(SourceTier::Category, cat.label(), Some(ESTIMATED_NOTE));
            }
        }

        debug!(code = normalized, "activity resolved by default ruleset");
        self.tables
            .default
            .to_ruleset(SourceTier::Default, "default", Some(DEFAULT_NOTE))
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.as_ref().map(|c| c.read().len()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyInput {
    pub activity_code: String,
    #[serde(default)]
    pub category: Option<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// `DDDD-D/DD` when the input had seven digits, otherwise the normalized input.
    pub code: String,
    pub digits: String,
    pub ruleset: TaxRuleSet,
}

/// Classify a single activity code.
pub fn classify_activity(
    input: &ClassifyInput,
    config: &TaxConfig,
) -> TaxResult<ComputationOutput<Classification>> {
    let start = Instant::now();
    if input.activity_code.trim().is_empty() {
        return Err(TaxError::invalid(
            "activity_code",
            "Activity code must not be empty",
        ));
    }

    let resolver = RuleResolver::new(config.rules.clone());
    let ruleset = resolver.resolve(&input.activity_code, input.category);
    let digits = digits_only(&normalize(&input.activity_code));

    let mut warnings = Vec::new();
    if let Some(note) = &ruleset.note {
        if ruleset.source_tier.is_fallback() {
            warnings.push(note.clone());
        }
    }
    if let Some(reason) = &ruleset.forbidden_reason {
        warnings.push(reason.clone());
    }

    let output = Classification {
        code: format_canonical(&digits),
        digits,
        ruleset,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "tiers": ["exact", "longest prefix", "category", "default"],
        "prefix_order": "length descending, ties alphabetical",
    });

    Ok(with_metadata(
        "CNAE classification (exact → prefix → category → default)",
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

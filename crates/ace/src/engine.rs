//! The orchestrator tying together attribute resolution, the verdict cache,
//! the policy tree, and preference reconciliation.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::attribute::Attribute;
use crate::attribute_set::AttributeSet;
use crate::cache::VerdictCache;
use crate::effect::{Effect, PolicyResult};
use crate::loader::PolicyLoader;
use crate::pip::PolicyInformationPoint;
use crate::preference::{GlobalPreference, UserPreference, reconcile};
use crate::request::Request;
use crate::storage::{PreferenceKey, SettingsStore};
use crate::tree::NodeTrace;

/// Per-node evaluation trace plus timing, returned by
/// [`PolicyEvaluator::evaluate_with_audit`] for callers that need to explain
/// a decision rather than just act on it.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub result: PolicyResult,
    pub policy_effect: Effect,
    pub trace: Vec<NodeTrace>,
    pub cache_hit: bool,
    pub evaluation_time_ms: f64,
}

/// Evaluates access-control requests against a hot-reloadable policy tree,
/// a content-addressed verdict cache, and the caller's preferences.
pub struct PolicyEvaluator {
    loader: Arc<PolicyLoader>,
    cache: Arc<VerdictCache>,
    cache_enabled: bool,
    pip: Arc<dyn PolicyInformationPoint>,
    settings: Arc<dyn SettingsStore>,
}

impl PolicyEvaluator {
    #[must_use]
    pub fn new(
        loader: Arc<PolicyLoader>,
        cache: VerdictCache,
        pip: Arc<dyn PolicyInformationPoint>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            loader,
            cache: Arc::new(cache),
            cache_enabled: true,
            pip,
            settings,
        }
    }

    /// Enables or disables the verdict cache, mirroring
    /// [`crate::config::CacheConfig::enabled`]. Disabling it forces a full
    /// tree walk on every evaluation and skips writing the result back.
    #[must_use]
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Evaluates `request`, honouring the verdict cache and the caller's
    /// reconciled preferences.
    ///
    /// Steps (per the orchestration contract): resolve the tree's full
    /// attribute schema, resolve those attributes via the PIP, compute the
    /// attribute set's fingerprint, consult the cache, evaluate the tree on
    /// a miss, cache the verdict, then reconcile with preferences. The cache
    /// stores the raw policy verdict (pre-reconciliation) so a later
    /// preference change is reflected immediately without invalidating the
    /// cache.
    ///
    /// Always succeeds: every collaborator failure (a PIP outage, a cache or
    /// settings backend error) is recovered locally and logged rather than
    /// surfaced, so the seven-valued [`PolicyResult`] is the only thing a
    /// caller ever sees.
    #[instrument(skip(self, request), fields(subject = %request.subject, resource = %request.resource))]
    pub async fn evaluate(&self, request: &Request) -> PolicyResult {
        self.evaluate_with_audit(request).await.result
    }

    /// As [`PolicyEvaluator::evaluate`], but also returns the per-node trace
    /// and timing of the underlying tree walk (absent on a cache hit, since
    /// no walk happened).
    #[instrument(skip(self, request), fields(subject = %request.subject, resource = %request.resource))]
    pub async fn evaluate_with_audit(&self, request: &Request) -> EvaluationResult {
        let start = Instant::now();
        let tree = self.loader.current();

        let attribute_ids = tree.referenced_attribute_ids();
        let attrs = match self.pip.resolve(request, attribute_ids).await {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(error = %e, "PIP resolution failed for the whole request; marking every declared attribute undetermined");
                attribute_ids
                    .iter()
                    .map(|id| Attribute::undetermined(id.clone()))
                    .collect::<AttributeSet>()
            }
        };
        let fingerprint = attrs.fingerprint();

        let cached = if self.cache_enabled {
            match self.cache.get(&fingerprint).await {
                Ok(hit) => hit,
                Err(e) => {
                    warn!(error = %e, "verdict cache read failed; treating as a miss");
                    None
                }
            }
        } else {
            None
        };

        let (policy_effect, trace, cache_hit) = if let Some(cached) = cached {
            debug!(fingerprint = %fingerprint, "verdict cache hit");
            (effect_from_cached(cached), Vec::new(), true)
        } else {
            let (effect, trace) = tree.evaluate_with_trace(&attrs);
            if self.cache_enabled {
                if let Err(e) = self.cache.put(fingerprint, PolicyResult::from(effect)).await {
                    warn!(error = %e, "verdict cache write failed; continuing without caching this verdict");
                }
            }
            (effect, trace, false)
        };

        let global = self.settings.global_preference().await.unwrap_or_else(|e| {
            warn!(error = %e, "settings read failed for global preference; defaulting");
            GlobalPreference::Default
        });
        let key = PreferenceKey::new(&request.subject, &request.resource);
        let preference = self.settings.preference(&key).await.unwrap_or_else(|e| {
            warn!(error = %e, "settings read failed for widget preference; defaulting");
            UserPreference::Default
        });
        let result = reconcile(global, preference, PolicyResult::from(policy_effect));

        EvaluationResult {
            result,
            policy_effect,
            trace,
            cache_hit,
            evaluation_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    }

    /// Looks up `request` in the verdict cache without ever walking the
    /// policy tree, returning `None` on a miss rather than falling back to a
    /// full evaluation.
    ///
    /// Still resolves attributes through the PIP and reconciles a hit with
    /// the caller's preferences, since the cache is keyed on the resolved
    /// attribute set's fingerprint and a raw, unreconciled policy verdict
    /// would be a different contract than [`PolicyEvaluator::evaluate`].
    #[instrument(skip(self, request), fields(subject = %request.subject, resource = %request.resource))]
    pub async fn evaluate_from_cache_only(&self, request: &Request) -> Option<PolicyResult> {
        if !self.cache_enabled {
            return None;
        }
        let tree = self.loader.current();
        let attribute_ids = tree.referenced_attribute_ids();
        let attrs = match self.pip.resolve(request, attribute_ids).await {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(error = %e, "PIP resolution failed during a cache-only lookup");
                return None;
            }
        };
        let fingerprint = attrs.fingerprint();
        let cached = match self.cache.get(&fingerprint).await {
            Ok(hit) => hit?,
            Err(e) => {
                warn!(error = %e, "verdict cache read failed during a cache-only lookup");
                return None;
            }
        };

        let global = self.settings.global_preference().await.unwrap_or_else(|e| {
            warn!(error = %e, "settings read failed for global preference; defaulting");
            GlobalPreference::Default
        });
        let key = PreferenceKey::new(&request.subject, &request.resource);
        let preference = self.settings.preference(&key).await.unwrap_or_else(|e| {
            warn!(error = %e, "settings read failed for widget preference; defaulting");
            UserPreference::Default
        });
        Some(reconcile(global, preference, cached))
    }

    /// The filesystem path the currently-published policy tree was loaded
    /// from, or an empty string if it was built in-process with no backing
    /// file (see [`crate::loader::PolicyLoader::from_tree`]).
    #[must_use]
    pub fn current_policy_path(&self) -> String {
        self.loader.current_policy_path()
    }

    /// Reparses and atomically publishes the policy document at `path`,
    /// purging the verdict cache only once the new tree is live.
    ///
    /// On parse failure the previously-published tree is untouched and the
    /// cache is left intact, matching the "reload is all-or-nothing" rule.
    pub async fn update_policy(
        &self,
        path: &std::path::Path,
    ) -> Result<(), crate::error::LoadError> {
        self.loader.update_policy(path)?;
        if let Err(e) = self.cache.purge_all().await {
            warn!(error = %e, "verdict cache purge failed after successful reload");
        }
        Ok(())
    }

    #[must_use]
    pub fn cache(&self) -> &VerdictCache {
        self.cache.as_ref()
    }

    /// A shared handle to the same verdict cache this evaluator reads from,
    /// so a [`crate::reload::PolicyReloadService`] built from the same
    /// evaluator purges the cache the evaluator actually serves from, not an
    /// independent one.
    #[must_use]
    pub fn cache_handle(&self) -> Arc<VerdictCache> {
        Arc::clone(&self.cache)
    }

    /// A shared handle to the policy loader this evaluator reads from, for
    /// wiring a [`crate::reload::PolicyReloadService`] onto the same tree.
    #[must_use]
    pub fn loader_handle(&self) -> Arc<PolicyLoader> {
        Arc::clone(&self.loader)
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }
}

fn effect_from_cached(result: PolicyResult) -> Effect {
    match result {
        PolicyResult::Permit => Effect::Permit,
        PolicyResult::Deny => Effect::Deny,
        PolicyResult::PromptOneShot => Effect::PromptOneShot,
        PolicyResult::PromptSession => Effect::PromptSession,
        PolicyResult::PromptBlanket => Effect::PromptBlanket,
        PolicyResult::NotApplicable => Effect::NotApplicable,
        PolicyResult::Undetermined => Effect::Undetermined,
    }
}

/// Convenience constructor wiring in-memory defaults for every collaborator
/// except the policy document itself, for tests and the `ace-cli` binary.
pub fn in_memory_evaluator(
    policy_path: &std::path::Path,
    pip: Arc<dyn PolicyInformationPoint>,
) -> Result<PolicyEvaluator, crate::error::LoadError> {
    let loader = Arc::new(PolicyLoader::from_file(policy_path)?);
    let cache = VerdictCache::in_memory();
    let settings = Arc::new(crate::storage::settings::InMemorySettingsStore::new());
    Ok(PolicyEvaluator::new(loader, cache, pip, settings))
}

/// Builds an evaluator wired from an [`crate::config::AceConfig`]: loads the
/// policy document at `config.policy_path` and honours
/// `config.cache.enabled`, so disabling the cache in configuration actually
/// disables it rather than being a no-op knob.
pub fn evaluator_from_config(
    config: &crate::config::AceConfig,
    pip: Arc<dyn PolicyInformationPoint>,
    settings: Arc<dyn SettingsStore>,
) -> Result<PolicyEvaluator, crate::error::LoadError> {
    let loader = Arc::new(PolicyLoader::from_file(&config.policy_path)?);
    let cache = VerdictCache::in_memory();
    Ok(PolicyEvaluator::new(loader, cache, pip, settings).with_cache_enabled(config.cache.enabled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, AttributeValue};
    use crate::pip::StaticPip;
    use crate::preference::{GlobalPreference, UserPreference};

    fn evaluator_with(doc: &str, pip: StaticPip) -> PolicyEvaluator {
        let tree = crate::loader::parse_policy_document(doc).unwrap();
        let loader = Arc::new(PolicyLoader::from_tree(tree));
        let cache = VerdictCache::in_memory();
        let settings = Arc::new(crate::storage::settings::InMemorySettingsStore::new());
        PolicyEvaluator::new(loader, cache, Arc::new(pip), settings)
    }

    const DOC: &str = r#"
        <Policy name="root" algorithm="deny-overrides">
          <Rule name="allow-trusted" effect="Permit">
            <Condition>
              <Match attribute="subject.trusted" operator="equal" value="true"/>
            </Condition>
          </Rule>
          <Rule name="deny-default" effect="Deny"/>
        </Policy>
    "#;

    #[tokio::test]
    async fn evaluate_permits_trusted_subject() {
        let mut pip = StaticPip::new();
        pip.insert(Attribute::new(
            "subject.trusted",
            vec![AttributeValue::String("true".into())],
        ));
        let evaluator = evaluator_with(DOC, pip);
        let req = Request::new("w1", "camera", "capture");
        assert_eq!(
            evaluator.evaluate(&req).await,
            PolicyResult::Permit
        );
    }

    #[tokio::test]
    async fn second_identical_request_is_a_cache_hit() {
        let mut pip = StaticPip::new();
        pip.insert(Attribute::new(
            "subject.trusted",
            vec![AttributeValue::String("true".into())],
        ));
        let evaluator = evaluator_with(DOC, pip);
        let req = Request::new("w1", "camera", "capture");
        let first = evaluator.evaluate_with_audit(&req).await;
        assert!(!first.cache_hit);
        let second = evaluator.evaluate_with_audit(&req).await;
        assert!(second.cache_hit);
        assert_eq!(second.result, PolicyResult::Permit);
    }

    #[tokio::test]
    async fn global_always_deny_preference_overrides_policy_permit() {
        let mut pip = StaticPip::new();
        pip.insert(Attribute::new(
            "subject.trusted",
            vec![AttributeValue::String("true".into())],
        ));
        let evaluator = evaluator_with(DOC, pip);
        evaluator
            .settings()
            .set_global_preference(GlobalPreference::AlwaysDeny)
            .await
            .unwrap();
        let req = Request::new("w1", "camera", "capture");
        assert_eq!(evaluator.evaluate(&req).await, PolicyResult::Deny);
    }

    #[tokio::test]
    async fn preference_reconciliation_escalates_permit_to_prompt() {
        let mut pip = StaticPip::new();
        pip.insert(Attribute::new(
            "subject.trusted",
            vec![AttributeValue::String("true".into())],
        ));
        let evaluator = evaluator_with(DOC, pip);
        let key = PreferenceKey::new("w1", "camera");
        evaluator
            .settings()
            .set_preference(key, UserPreference::OneShotPrompt)
            .await
            .unwrap();
        let req = Request::new("w1", "camera", "capture");
        assert_eq!(
            evaluator.evaluate(&req).await,
            PolicyResult::PromptOneShot
        );
    }

    #[tokio::test]
    async fn undetermined_subject_attribute_yields_undetermined_result() {
        let pip = StaticPip::new();
        let evaluator = evaluator_with(DOC, pip);
        let req = Request::new("w1", "camera", "capture");
        assert_eq!(
            evaluator.evaluate(&req).await,
            PolicyResult::Undetermined
        );
    }

    #[tokio::test]
    async fn cache_only_lookup_misses_before_a_real_evaluation() {
        let mut pip = StaticPip::new();
        pip.insert(Attribute::new(
            "subject.trusted",
            vec![AttributeValue::String("true".into())],
        ));
        let evaluator = evaluator_with(DOC, pip);
        let req = Request::new("w1", "camera", "capture");
        assert_eq!(evaluator.evaluate_from_cache_only(&req).await, None);
        let _ = evaluator.evaluate(&req).await;
        assert_eq!(
            evaluator.evaluate_from_cache_only(&req).await,
            Some(PolicyResult::Permit)
        );
    }

    #[tokio::test]
    async fn disabled_cache_never_records_a_hit() {
        let mut pip = StaticPip::new();
        pip.insert(Attribute::new(
            "subject.trusted",
            vec![AttributeValue::String("true".into())],
        ));
        let evaluator = evaluator_with(DOC, pip).with_cache_enabled(false);
        let req = Request::new("w1", "camera", "capture");
        let first = evaluator.evaluate_with_audit(&req).await;
        assert!(!first.cache_hit);
        let second = evaluator.evaluate_with_audit(&req).await;
        assert!(!second.cache_hit);
        assert_eq!(evaluator.evaluate_from_cache_only(&req).await, None);
    }

    #[test]
    fn in_memory_tree_has_no_backing_policy_path() {
        let tree = crate::loader::parse_policy_document(DOC).unwrap();
        let loader = Arc::new(PolicyLoader::from_tree(tree));
        let cache = VerdictCache::in_memory();
        let settings = Arc::new(crate::storage::settings::InMemorySettingsStore::new());
        let evaluator =
            PolicyEvaluator::new(loader, cache, Arc::new(StaticPip::new()), settings);
        assert_eq!(evaluator.current_policy_path(), "");
    }
}

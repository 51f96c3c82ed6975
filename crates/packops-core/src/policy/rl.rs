//! Tabular policy driven by learned per-bucket action preferences.
//!
//! States are discretized into a bucket key; each bucket maps actions to a
//! preference score updated offline by the trainer. Unseen or unhelpful
//! buckets fall back to the rule-based policy, so a cold table behaves
//! exactly like the heuristic router.

use super::rule_based::RuleBasedPolicy;
use super::{Policy, PolicyMode};
use crate::action::Action;
use crate::config::PolicyConfig;
use crate::error::Result;
use crate::task_state::{StateSnapshot, TaskState};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Featurization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepsBucket {
    Low,
    Mid,
    High,
}

impl StepsBucket {
    pub fn of(steps: u32) -> Self {
        match steps {
            0..=3 => StepsBucket::Low,
            4..=7 => StepsBucket::Mid,
            _ => StepsBucket::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepsBucket::Low => "low",
            StepsBucket::Mid => "mid",
            StepsBucket::High => "high",
        }
    }
}

/// The discrete features a bucket is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features<'a> {
    pub stage: &'a str,
    pub has_research: bool,
    pub has_icp: bool,
    pub steps: StepsBucket,
    pub gates: usize,
}

impl<'a> Features<'a> {
    pub fn from_state(state: &'a TaskState) -> Self {
        Self {
            stage: &state.current_stage,
            has_research: state.has_research,
            has_icp: state.has_icp,
            steps: StepsBucket::of(state.steps_taken),
            gates: state.gates_passed.len(),
        }
    }

    pub fn from_snapshot(snap: &'a StateSnapshot) -> Self {
        let mut gates: Vec<&str> = snap.gates_passed.iter().map(String::as_str).collect();
        gates.sort_unstable();
        gates.dedup();
        Self {
            stage: &snap.current_stage,
            has_research: snap.has_research,
            has_icp: snap.has_icp,
            steps: StepsBucket::of(snap.steps_taken),
            gates: gates.len(),
        }
    }

    /// `stage=<s>|research=<0|1>|icp=<0|1>|steps=<low|mid|high>|gates=<n>`.
    ///
    /// The stage is free text from the record, so `%`, `|` and `=` in it are
    /// percent-encoded to keep distinct feature tuples on distinct keys.
    pub fn key(&self) -> String {
        format!(
            "stage={}|research={}|icp={}|steps={}|gates={}",
            escape(self.stage),
            u8::from(self.has_research),
            u8::from(self.has_icp),
            self.steps.as_str(),
            self.gates
        )
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            '|' => out.push_str("%7C"),
            '=' => out.push_str("%3D"),
            c => out.push(c),
        }
    }
    out
}

pub fn bucket_key(state: &TaskState) -> String {
    Features::from_state(state).key()
}

// ---------------------------------------------------------------------------
// WeightTable
// ---------------------------------------------------------------------------

/// Bucket key → action → preference. Missing entries read as 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightTable {
    buckets: BTreeMap<String, BTreeMap<Action, f64>>,
}

impl WeightTable {
    /// Load the table from `path`. A missing file is an empty table; a
    /// malformed file or entry is skipped with a warning.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read weight table; starting empty");
                return Self::default();
            }
        };
        let value: Value = match serde_json::from_str(&data) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed weight table; starting empty");
                return Self::default();
            }
        };
        let Value::Object(raw) = value else {
            warn!(path = %path.display(), "weight table is not a JSON object; starting empty");
            return Self::default();
        };

        let mut table = Self::default();
        for (key, scores) in raw {
            let Value::Object(scores) = scores else {
                warn!(bucket = %key, "bucket is not an object; skipped");
                continue;
            };
            let bucket = table.buckets.entry(key.clone()).or_default();
            for (name, score) in scores {
                let Ok(action) = name.parse::<Action>() else {
                    warn!(bucket = %key, action = %name, "unknown action in weight table; skipped");
                    continue;
                };
                match score.as_f64() {
                    Some(s) if s.is_finite() => {
                        bucket.insert(action, s);
                    }
                    _ => warn!(bucket = %key, action = %name, "non-numeric weight; skipped"),
                }
            }
        }
        table
    }

    /// Write the whole table atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = Map::new();
        for (key, scores) in &self.buckets {
            let mut bucket = Map::new();
            for (action, score) in scores {
                bucket.insert(action.as_str().to_string(), Value::from(*score));
            }
            out.insert(key.clone(), Value::Object(bucket));
        }
        crate::io::write_json_pretty(path, &Value::Object(out))
    }

    pub fn bucket(&self, key: &str) -> Option<&BTreeMap<Action, f64>> {
        self.buckets.get(key)
    }

    /// The bucket for `key`, created with every action at 0 if absent.
    pub fn bucket_mut(&mut self, key: &str) -> &mut BTreeMap<Action, f64> {
        self.buckets.entry(key.to_string()).or_insert_with(|| {
            Action::all().iter().map(|&a| (a, 0.0)).collect()
        })
    }

    pub fn weight(&self, key: &str, action: Action) -> f64 {
        self.bucket(key)
            .and_then(|b| b.get(&action))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RlPolicy
// ---------------------------------------------------------------------------

pub struct RlPolicy {
    weights: WeightTable,
    weights_path: PathBuf,
    use_softmax: bool,
    rng: StdRng,
    fallback: RuleBasedPolicy,
}

impl RlPolicy {
    pub fn load(weights_path: &Path, settings: &PolicyConfig) -> Self {
        Self::with_table(WeightTable::load(weights_path), weights_path, settings)
    }

    pub fn with_table(weights: WeightTable, weights_path: &Path, settings: &PolicyConfig) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            weights,
            weights_path: weights_path.to_path_buf(),
            use_softmax: settings.use_softmax,
            rng,
            fallback: RuleBasedPolicy::new(),
        }
    }

    /// Mutable access for the trainer.
    pub fn weights_mut(&mut self) -> &mut WeightTable {
        &mut self.weights
    }

    pub fn save(&self) -> Result<()> {
        self.weights.save(&self.weights_path)
    }

    /// Scores for every action in canonical order; missing entries are 0.
    fn scores(&self, key: &str) -> Option<Vec<(Action, f64)>> {
        let bucket = self.weights.bucket(key)?;
        Some(
            Action::all()
                .iter()
                .map(|&a| (a, bucket.get(&a).copied().unwrap_or(0.0)))
                .collect(),
        )
    }

    fn sample(&mut self, scores: &[(Action, f64)]) -> Option<Action> {
        let max = scores
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = scores.iter().map(|(_, s)| (s - max).exp()).collect();
        let dist = WeightedIndex::new(&exps).ok()?;
        Some(scores[dist.sample(&mut self.rng)].0)
    }
}

/// Highest-scoring action; ties go to the earliest action in canonical order.
fn argmax(scores: &[(Action, f64)]) -> Option<(Action, f64)> {
    scores.iter().copied().fold(None, |best, (a, s)| match best {
        Some((_, b)) if b >= s => best,
        _ => Some((a, s)),
    })
}

impl Policy for RlPolicy {
    fn select_next(&mut self, state: &TaskState) -> Action {
        let key = bucket_key(state);
        let Some(scores) = self.scores(&key) else {
            debug!(bucket = %key, "unseen bucket; rule-based fallback");
            return self.fallback.decide(state);
        };
        if self.use_softmax {
            if scores.iter().all(|(_, s)| *s == 0.0) {
                debug!(bucket = %key, "all-zero bucket; rule-based fallback");
                return self.fallback.decide(state);
            }
            return match self.sample(&scores) {
                Some(action) => action,
                None => {
                    warn!(bucket = %key, "softmax degenerated; rule-based fallback");
                    self.fallback.decide(state)
                }
            };
        }

        match argmax(&scores).filter(|(_, s)| *s > 0.0) {
            Some((action, score)) => {
                debug!(bucket = %key, %action, score, "argmax");
                action
            }
            None => {
                debug!(bucket = %key, "no positive preference; rule-based fallback");
                self.fallback.decide(state)
            }
        }
    }

    fn mode(&self) -> PolicyMode {
        PolicyMode::Rl
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn state(stage: &str, research: bool, icp: bool, steps: u32, gates: &[&str]) -> TaskState {
        TaskState {
            current_stage: stage.to_string(),
            has_research: research,
            has_icp: icp,
            steps_taken: steps,
            gates_passed: gates.iter().map(|g| g.to_string()).collect::<BTreeSet<_>>(),
            ..TaskState::default()
        }
    }

    fn policy(table: WeightTable, softmax: bool, seed: Option<u64>) -> RlPolicy {
        RlPolicy::with_table(
            table,
            Path::new("unused.json"),
            &PolicyConfig {
                use_softmax: softmax,
                seed,
            },
        )
    }

    #[test]
    fn key_format_and_step_buckets() {
        let s = state("scoring", true, false, 5, &["idea", "validation"]);
        assert_eq!(bucket_key(&s), "stage=scoring|research=1|icp=0|steps=mid|gates=2");
        assert_eq!(StepsBucket::of(3), StepsBucket::Low);
        assert_eq!(StepsBucket::of(7), StepsBucket::Mid);
        assert_eq!(StepsBucket::of(8), StepsBucket::High);
    }

    #[test]
    fn key_ignores_fields_outside_features() {
        let mut a = state("idea", false, false, 0, &[]);
        let mut b = a.clone();
        a.run_id = "r1".into();
        b.run_id = "r2".into();
        b.resources_used = 99_999;
        assert_eq!(bucket_key(&a), bucket_key(&b));
    }

    #[test]
    fn crafted_stage_names_do_not_collide() {
        let tricky = state("idea|research=1", false, false, 0, &[]);
        let plain = state("idea", true, false, 0, &[]);
        assert_ne!(bucket_key(&tricky), bucket_key(&plain));
        assert!(bucket_key(&tricky).starts_with("stage=idea%7Cresearch%3D1|"));
    }

    #[test]
    fn snapshot_key_matches_state_key() {
        let s = state("deep_dive", true, true, 9, &["idea", "scoring"]);
        assert_eq!(Features::from_snapshot(&s.snapshot()).key(), bucket_key(&s));
    }

    #[test]
    fn cold_start_matches_rule_based() {
        let mut rl = policy(WeightTable::default(), false, None);
        let rules = RuleBasedPolicy::new();
        for s in [
            state("idea", false, false, 0, &[]),
            state("idea", true, false, 1, &[]),
            state("validation", true, true, 2, &["idea"]),
            state("deep_dive", true, true, 4, &["idea", "scoring"]),
            state("published", true, true, 9, &[]),
        ] {
            assert_eq!(rl.select_next(&s), rules.decide(&s));
        }
    }

    #[test]
    fn non_positive_bucket_falls_back() {
        let s = state("idea", false, false, 0, &[]);
        let mut table = WeightTable::default();
        let bucket = table.bucket_mut(&bucket_key(&s));
        bucket.insert(Action::Publish, -0.5);
        let mut rl = policy(table, false, None);
        assert_eq!(rl.select_next(&s), Action::Research);
    }

    #[test]
    fn softmax_samples_negative_only_bucket() {
        let s = state("idea", false, false, 0, &[]);
        let mut table = WeightTable::default();
        table.bucket_mut(&bucket_key(&s)).insert(Action::Research, -5.0);
        let mut rl = policy(table, true, Some(7));
        let picks: Vec<Action> = (0..30).map(|_| rl.select_next(&s)).collect();
        assert!(picks.iter().any(|a| *a != Action::Research));
    }

    #[test]
    fn softmax_all_zero_bucket_falls_back() {
        let s = state("idea", false, false, 0, &[]);
        let mut table = WeightTable::default();
        table.bucket_mut(&bucket_key(&s)).insert(Action::Publish, 0.0);
        let mut rl = policy(table, true, Some(7));
        assert_eq!(rl.select_next(&s), Action::Research);
    }

    #[test]
    fn argmax_picks_best_and_breaks_ties_canonically() {
        let s = state("idea", false, false, 0, &[]);
        let key = bucket_key(&s);
        let mut table = WeightTable::default();
        table.bucket_mut(&key).insert(Action::Test, 0.4);
        table.bucket_mut(&key).insert(Action::Evaluate, 0.4);
        table.bucket_mut(&key).insert(Action::Deploy, 0.1);
        let mut rl = policy(table, false, None);
        assert_eq!(rl.select_next(&s), Action::Evaluate);
    }

    #[test]
    fn seeded_softmax_is_reproducible() {
        let s = state("idea", false, false, 0, &[]);
        let key = bucket_key(&s);
        let mut table = WeightTable::default();
        table.bucket_mut(&key).insert(Action::Evaluate, 1.0);
        table.bucket_mut(&key).insert(Action::Research, 0.9);

        let picks = |seed| {
            let mut rl = policy(table.clone(), true, Some(seed));
            (0..20).map(|_| rl.select_next(&s)).collect::<Vec<_>>()
        };
        assert_eq!(picks(42), picks(42));
    }

    #[test]
    fn softmax_concentrates_on_dominant_action() {
        let s = state("idea", false, false, 0, &[]);
        let key = bucket_key(&s);
        let mut table = WeightTable::default();
        table.bucket_mut(&key).insert(Action::Evaluate, 500.0);
        let mut rl = policy(table, true, Some(1));
        for _ in 0..10 {
            assert_eq!(rl.select_next(&s), Action::Evaluate);
        }
    }

    #[test]
    fn load_skips_unknown_and_malformed_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights.json");
        std::fs::write(
            &path,
            r#"{
                "stage=idea|research=0|icp=0|steps=low|gates=0": {
                    "RESEARCH": 0.3, "LAUNCH_ROCKET": 9.0, "TEST": "high"
                },
                "broken": [1, 2]
            }"#,
        )
        .unwrap();
        let table = WeightTable::load(&path);
        assert_eq!(table.len(), 1);
        let key = "stage=idea|research=0|icp=0|steps=low|gates=0";
        assert_eq!(table.weight(key, Action::Research), 0.3);
        assert_eq!(table.weight(key, Action::Test), 0.0);
        assert_eq!(table.bucket(key).map(|b| b.len()), Some(1));
    }

    #[test]
    fn load_malformed_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(WeightTable::load(&path).is_empty());
        assert!(WeightTable::load(&dir.path().join("absent.json")).is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy/weights.json");
        let mut table = WeightTable::default();
        *table.bucket_mut("k").entry(Action::Stop).or_default() += 0.25;
        table.save(&path).unwrap();

        let loaded = WeightTable::load(&path);
        assert_eq!(loaded, table);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"STOP\": 0.25"));
    }
}

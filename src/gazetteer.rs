//! The record-linkage model: a capability wrapped behind a small interface
//! (`threshold`, `match_messy`, `index`, `save`, `load`) so the Matcher does
//! not depend on how candidates are actually scored.
//!
//! Candidates are generated by exact-match blocking on `country` and scored
//! by a logistic model over two string-similarity features (`name`,
//! `address`), following the same "compare two records, produce a
//! confidence score" shape as a `strsim`-based deduplication engine.

use std::collections::HashMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::country::CountryCode;
use crate::errors::MatchError;
use crate::model::{FacilityId, FacilityListItemId};

/// The cleaned `{country, name, address}` triple a record is scored on.
/// Fields must already have passed through [`crate::normalize::clean`].
#[derive(Clone, Debug)]
pub struct CleanedRecord {
    pub country: CountryCode,
    pub name: String,
    pub address: String,
}

/// One labeled training example: two records and whether they refer to the
/// same real-world facility. Shipped as the training file read on a fresh
/// fit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LabeledPair {
    pub record1: TrainingRecord,
    pub record2: TrainingRecord,
    pub is_match: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub country: String,
    pub name: String,
    pub address: String,
}

/// The fitted weights, the only thing persisted to `model_file_path`. Small
/// enough (bias + 3 feature weights) that a hand-rolled gradient-descent fit
/// is appropriate; this is not a general-purpose ML model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct LogisticModel {
    bias: f64,
    w_country: f64,
    w_name: f64,
    w_address: f64,
}

impl LogisticModel {
    fn score(&self, country_match: f64, name_sim: f64, address_sim: f64) -> f64 {
        let z = self.bias
            + self.w_country * country_match
            + self.w_name * name_sim
            + self.w_address * address_sim;
        1.0 / (1.0 + (-z).exp())
    }

    fn fit(samples: &[(f64, f64, f64, bool)]) -> Self {
        const EPOCHS: usize = 500;
        const LEARNING_RATE: f64 = 0.5;

        let mut model = LogisticModel {
            bias: -1.0,
            w_country: 1.0,
            w_name: 2.0,
            w_address: 2.0,
        };
        if samples.is_empty() {
            return model;
        }
        let n = samples.len() as f64;

        for _ in 0..EPOCHS {
            let mut grad = (0.0, 0.0, 0.0, 0.0);
            for &(country_match, name_sim, address_sim, is_match) in samples {
                let predicted = model.score(country_match, name_sim, address_sim);
                let target = if is_match { 1.0 } else { 0.0 };
                let error = predicted - target;
                grad.0 += error;
                grad.1 += error * country_match;
                grad.2 += error * name_sim;
                grad.3 += error * address_sim;
            }
            model.bias -= LEARNING_RATE * grad.0 / n;
            model.w_country -= LEARNING_RATE * grad.1 / n;
            model.w_name -= LEARNING_RATE * grad.2 / n;
            model.w_address -= LEARNING_RATE * grad.3 / n;
        }

        model
    }
}

fn similarity_features(messy: &CleanedRecord, candidate: &CleanedRecord) -> (f64, f64, f64) {
    let country_match = if messy.country == candidate.country {
        1.0
    } else {
        0.0
    };
    let name_sim = strsim::jaro_winkler(&messy.name, &candidate.name);
    let address_sim = strsim::jaro_winkler(&messy.address, &candidate.address);
    (country_match, name_sim, address_sim)
}

/// A trained, indexed gazetteer: blocking index over the canonical set plus
/// the fitted scoring model. The Matcher's sole input.
pub struct Gazetteer {
    model: LogisticModel,
    index: HashMap<CountryCode, Vec<FacilityId>>,
    /// Unlabeled-pair scores drawn at fit time, used only to compute
    /// `threshold()`. Freed by `cleanup()`; `index()` must be rerun after a
    /// fresh fit regardless, matching the source two-step.
    training_sample_scores: Option<Vec<f64>>,
}

impl Gazetteer {
    /// An untrained gazetteer with an empty index. Only valid to pass into
    /// the Matcher when the canonical set or the messy set is empty, since
    /// those branches never consult the model.
    pub fn empty() -> Self {
        Gazetteer {
            model: LogisticModel {
                bias: 0.0,
                w_country: 0.0,
                w_name: 0.0,
                w_address: 0.0,
            },
            index: HashMap::new(),
            training_sample_scores: None,
        }
    }

    /// Load a previously fitted model and treat it as read-only static;
    /// skips training entirely. The caller must still call `index`.
    pub fn load(model_path: &Path) -> Result<Self, MatchError> {
        let bytes = std::fs::read(model_path)
            .map_err(|e| MatchError::Internal(format!("reading model file: {e}")))?;
        let (model, _len): (LogisticModel, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| MatchError::Internal(format!("decoding model file: {e}")))?;
        Ok(Gazetteer {
            model,
            index: HashMap::new(),
            training_sample_scores: None,
        })
    }

    /// Construct a fresh model: sample up to `sample_size` messy×canonical
    /// pairs, read the labeled training file, fit, and persist.
    pub fn fit(
        training_file_path: &Path,
        model_path: &Path,
        messy: &HashMap<FacilityListItemId, CleanedRecord>,
        canonical: &HashMap<FacilityId, CleanedRecord>,
        sample_size: usize,
    ) -> Result<Self, MatchError> {
        let training_json = std::fs::read_to_string(training_file_path)
            .map_err(|e| MatchError::Internal(format!("reading training file: {e}")))?;
        let labeled: Vec<LabeledPair> = serde_json::from_str(&training_json)
            .map_err(|e| MatchError::Internal(format!("parsing training file: {e}")))?;

        let samples: Vec<(f64, f64, f64, bool)> = labeled
            .iter()
            .map(|pair| {
                let country_match = if pair.record1.country.eq_ignore_ascii_case(&pair.record2.country) {
                    1.0
                } else {
                    0.0
                };
                let name_sim = strsim::jaro_winkler(&pair.record1.name, &pair.record2.name);
                let address_sim = strsim::jaro_winkler(&pair.record1.address, &pair.record2.address);
                (country_match, name_sim, address_sim, pair.is_match)
            })
            .collect();

        let model = LogisticModel::fit(&samples);

        let training_sample_scores = draw_sample_scores(&model, messy, canonical, sample_size);

        let encoded = bincode::serde::encode_to_vec(model, bincode::config::standard())
            .map_err(|e| MatchError::Internal(format!("encoding model file: {e}")))?;
        std::fs::write(model_path, encoded)
            .map_err(|e| MatchError::Internal(format!("writing model file: {e}")))?;

        Ok(Gazetteer {
            model,
            index: HashMap::new(),
            training_sample_scores: Some(training_sample_scores),
        })
    }

    /// Build the blocking index over the current canonical set. Must be
    /// called after `load`, and again after `cleanup` following a fresh fit.
    pub fn index(&mut self, canonical: &HashMap<FacilityId, CleanedRecord>) {
        let mut index: HashMap<CountryCode, Vec<FacilityId>> = HashMap::new();
        for (id, record) in canonical {
            index.entry(record.country).or_default().push(*id);
        }
        self.index = index;
    }

    /// Free the training sample. Required after a fresh fit before the
    /// gazetteer can be reused; `index` must be called again afterward.
    pub fn cleanup(&mut self) {
        self.training_sample_scores = None;
    }

    /// Compute (but do not enforce) an internal threshold from the sampled
    /// pair scores, adjusted by `recall_weight`. Recorded in match results
    /// for telemetry; the enforced cutoff is the caller's
    /// `gazetteer_threshold`, per the retained source behavior.
    pub fn threshold(&self, recall_weight: f64) -> f64 {
        let scores = match &self.training_sample_scores {
            Some(scores) if !scores.is_empty() => scores,
            _ => return 0.5,
        };
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let recall_weight = recall_weight.max(0.01);
        (mean / recall_weight).clamp(0.0, 1.0)
    }

    /// Score every messy row against its blocked candidates. Returns
    /// `ModelBlockingFailure` if the canonical set is non-empty but no
    /// candidate shares a blocking key with any messy row.
    pub fn match_messy(
        &self,
        messy: &HashMap<FacilityListItemId, CleanedRecord>,
        canonical: &HashMap<FacilityId, CleanedRecord>,
        gazetteer_threshold: f64,
    ) -> Result<HashMap<FacilityListItemId, Vec<(FacilityId, f64)>>, MatchError> {
        let mut any_blocked = false;
        let mut results = HashMap::new();

        for (item_id, messy_record) in messy {
            let Some(candidate_ids) = self.index.get(&messy_record.country) else {
                continue;
            };
            if !candidate_ids.is_empty() {
                any_blocked = true;
            }

            let mut scored = Vec::new();
            for candidate_id in candidate_ids {
                let Some(candidate_record) = canonical.get(candidate_id) else {
                    continue;
                };
                let (country_match, name_sim, address_sim) =
                    similarity_features(messy_record, candidate_record);
                let score = self.model.score(country_match, name_sim, address_sim);
                if score >= gazetteer_threshold {
                    scored.push((*candidate_id, score));
                }
            }
            if !scored.is_empty() {
                results.insert(*item_id, scored);
            }
        }

        if !canonical.is_empty() && !messy.is_empty() && !any_blocked {
            return Err(MatchError::ModelBlockingFailure);
        }

        Ok(results)
    }
}

fn draw_sample_scores(
    model: &LogisticModel,
    messy: &HashMap<FacilityListItemId, CleanedRecord>,
    canonical: &HashMap<FacilityId, CleanedRecord>,
    sample_size: usize,
) -> Vec<f64> {
    if messy.is_empty() || canonical.is_empty() {
        return Vec::new();
    }

    let messy_records: Vec<&CleanedRecord> = messy.values().collect();
    let canonical_records: Vec<&CleanedRecord> = canonical.values().collect();

    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for i in 0..messy_records.len() {
        for j in 0..canonical_records.len() {
            pairs.push((i, j));
        }
    }

    let mut rng = StdRng::seed_from_u64(0x5ACE_7EED);
    pairs.shuffle(&mut rng);
    pairs.truncate(sample_size);

    pairs
        .into_iter()
        .map(|(i, j)| {
            let (country_match, name_sim, address_sim) =
                similarity_features(messy_records[i], canonical_records[j]);
            model.score(country_match, name_sim, address_sim)
        })
        .collect()
}

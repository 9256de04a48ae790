//! Process-wide weight profile with atomic snapshot replacement

use crate::error::ValidationError;
use crate::retrieval::{BackendKind, DocType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeightError {
    #[error("Invalid weight profile: {}", describe(.0))]
    Invalid(Vec<ValidationError>),
}

pub(crate) fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Tunable scoring parameters, read as one snapshot per query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightProfile {
    pub document_collection_weight: f64,
    pub email_collection_weight: f64,
    /// 0 disables recency decay entirely
    pub recency_weight: f64,
    pub recency_decay_days: i64,
    pub vector_backend_weight: f64,
    pub fulltext_backend_weight: f64,
    /// Share of the final score taken by the cross-encoder, in [0, 1]
    pub reranker_weight: f64,
}

impl Default for WeightProfile {
    fn default() -> Self {
        Self {
            document_collection_weight: 1.0,
            email_collection_weight: 1.0,
            recency_weight: 0.2,
            recency_decay_days: 365,
            vector_backend_weight: 1.0,
            fulltext_backend_weight: 1.0,
            reranker_weight: 0.7,
        }
    }
}

impl WeightProfile {
    pub fn backend_weight(&self, backend: BackendKind) -> f64 {
        match backend {
            BackendKind::Vector => self.vector_backend_weight,
            BackendKind::Fulltext => self.fulltext_backend_weight,
        }
    }

    pub fn collection_weight(&self, doc_type: DocType) -> f64 {
        match doc_type {
            DocType::Document => self.document_collection_weight,
            DocType::Email => self.email_collection_weight,
        }
    }

    /// Check every field, reporting paths relative to `prefix`
    pub fn validate_at(&self, prefix: &str) -> Vec<ValidationError> {
        let path = |field: &str| {
            if prefix.is_empty() {
                field.to_string()
            } else {
                format!("{}.{}", prefix, field)
            }
        };

        let mut errors = Vec::new();
        let weights = [
            ("document_collection_weight", self.document_collection_weight),
            ("email_collection_weight", self.email_collection_weight),
            ("recency_weight", self.recency_weight),
            ("vector_backend_weight", self.vector_backend_weight),
            ("fulltext_backend_weight", self.fulltext_backend_weight),
            ("reranker_weight", self.reranker_weight),
        ];

        for (field, value) in weights {
            if !value.is_finite() {
                errors.push(ValidationError::new(path(field), "must be a finite number"));
            } else if value < 0.0 {
                errors.push(ValidationError::new(
                    path(field),
                    format!("must be >= 0, got {}", value),
                ));
            }
        }

        if self.reranker_weight.is_finite() && self.reranker_weight > 1.0 {
            errors.push(ValidationError::new(
                path("reranker_weight"),
                format!("must be <= 1, got {}", self.reranker_weight),
            ));
        }

        if self.recency_decay_days < 1 {
            errors.push(ValidationError::new(
                path("recency_decay_days"),
                format!("must be >= 1, got {}", self.recency_decay_days),
            ));
        }

        errors
    }

    pub fn validate(&self) -> Result<(), WeightError> {
        let errors = self.validate_at("");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(WeightError::Invalid(errors))
        }
    }
}

/// Partial profile as accepted by the administrative update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightUpdate {
    pub document_collection_weight: Option<f64>,
    pub email_collection_weight: Option<f64>,
    pub recency_weight: Option<f64>,
    pub recency_decay_days: Option<i64>,
    pub vector_backend_weight: Option<f64>,
    pub fulltext_backend_weight: Option<f64>,
    pub reranker_weight: Option<f64>,
}

impl WeightUpdate {
    pub const FIELDS: [&'static str; 7] = [
        "document_collection_weight",
        "email_collection_weight",
        "recency_weight",
        "recency_decay_days",
        "vector_backend_weight",
        "fulltext_backend_weight",
        "reranker_weight",
    ];

    /// Parse a JSON object, naming every unknown or mistyped field
    ///
    /// `null` leaves a field unset. `recency_decay_days` must be an integer;
    /// every other field accepts any JSON number.
    pub fn from_json(value: &Value) -> Result<Self, Vec<ValidationError>> {
        let Some(object) = value.as_object() else {
            return Err(vec![ValidationError::new(
                "weights",
                "must be a JSON object",
            )]);
        };

        let mut update = WeightUpdate::default();
        let mut errors = Vec::new();

        for (field, value) in object {
            if value.is_null() {
                continue;
            }
            if field == "recency_decay_days" {
                match value.as_i64() {
                    Some(days) => update.recency_decay_days = Some(days),
                    None => errors.push(ValidationError::new(
                        field.as_str(),
                        format!("must be an integer, got {}", value),
                    )),
                }
                continue;
            }

            let slot = match field.as_str() {
                "document_collection_weight" => &mut update.document_collection_weight,
                "email_collection_weight" => &mut update.email_collection_weight,
                "recency_weight" => &mut update.recency_weight,
                "vector_backend_weight" => &mut update.vector_backend_weight,
                "fulltext_backend_weight" => &mut update.fulltext_backend_weight,
                "reranker_weight" => &mut update.reranker_weight,
                _ => {
                    errors.push(ValidationError::new(
                        field.as_str(),
                        format!("unknown field, expected one of {}", Self::FIELDS.join(", ")),
                    ));
                    continue;
                }
            };
            match value.as_f64() {
                Some(number) => *slot = Some(number),
                None => errors.push(ValidationError::new(
                    field.as_str(),
                    format!("must be a number, got {}", value),
                )),
            }
        }

        if errors.is_empty() {
            Ok(update)
        } else {
            Err(errors)
        }
    }

    /// New profile: `base` with every provided field replaced
    pub fn merge_onto(&self, base: &WeightProfile) -> WeightProfile {
        WeightProfile {
            document_collection_weight: self
                .document_collection_weight
                .unwrap_or(base.document_collection_weight),
            email_collection_weight: self
                .email_collection_weight
                .unwrap_or(base.email_collection_weight),
            recency_weight: self.recency_weight.unwrap_or(base.recency_weight),
            recency_decay_days: self.recency_decay_days.unwrap_or(base.recency_decay_days),
            vector_backend_weight: self
                .vector_backend_weight
                .unwrap_or(base.vector_backend_weight),
            fulltext_backend_weight: self
                .fulltext_backend_weight
                .unwrap_or(base.fulltext_backend_weight),
            reranker_weight: self.reranker_weight.unwrap_or(base.reranker_weight),
        }
    }
}

impl From<WeightProfile> for WeightUpdate {
    fn from(profile: WeightProfile) -> Self {
        Self {
            document_collection_weight: Some(profile.document_collection_weight),
            email_collection_weight: Some(profile.email_collection_weight),
            recency_weight: Some(profile.recency_weight),
            recency_decay_days: Some(profile.recency_decay_days),
            vector_backend_weight: Some(profile.vector_backend_weight),
            fulltext_backend_weight: Some(profile.fulltext_backend_weight),
            reranker_weight: Some(profile.reranker_weight),
        }
    }
}

/// Holder of the active `WeightProfile`
///
/// Readers clone an `Arc` to an immutable snapshot; writers build a complete
/// new profile and swap the pointer, so no reader ever sees a half-applied
/// update.
#[derive(Debug)]
pub struct WeightConfigStore {
    current: RwLock<Arc<WeightProfile>>,
}

impl Default for WeightConfigStore {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(WeightProfile::default())),
        }
    }
}

impl WeightConfigStore {
    /// Start from a validated profile
    pub fn new(initial: WeightProfile) -> Result<Self, WeightError> {
        initial.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(initial)),
        })
    }

    pub fn get(&self) -> Arc<WeightProfile> {
        // The guarded value is only ever a whole Arc, so a poisoned lock still holds a complete snapshot
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Active profile with `update` merged on top, without storing it
    pub fn resolve(&self, update: Option<&WeightUpdate>) -> Result<Arc<WeightProfile>, WeightError> {
        let current = self.get();
        let Some(update) = update else {
            return Ok(current);
        };
        let merged = update.merge_onto(&current);
        merged.validate()?;
        Ok(Arc::new(merged))
    }

    /// Replace the whole profile; the previous one stays active on error
    pub fn set(&self, profile: WeightProfile) -> Result<Arc<WeightProfile>, WeightError> {
        self.update(&WeightUpdate::from(profile))
    }

    /// Merge a partial update onto the active profile, validate, then swap
    pub fn update(&self, update: &WeightUpdate) -> Result<Arc<WeightProfile>, WeightError> {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let merged = update.merge_onto(&guard);
        if let Err(e) = merged.validate() {
            tracing::warn!("Rejected weight update: {}", e);
            return Err(e);
        }

        let merged = Arc::new(merged);
        *guard = Arc::clone(&merged);
        tracing::info!("Weight profile updated: {:?}", merged);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_valid() {
        assert!(WeightProfile::default().validate().is_ok());
    }

    #[test]
    fn negative_decay_days_is_rejected_and_prior_profile_kept() {
        let store = WeightConfigStore::default();
        let before = store.get();

        let update = WeightUpdate {
            recency_decay_days: Some(-1),
            ..Default::default()
        };
        let err = store.update(&update).unwrap_err();

        let WeightError::Invalid(fields) = err;
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].path, "recency_decay_days");
        assert_eq!(*store.get(), *before);
        assert_eq!(store.get().recency_decay_days, 365);
    }

    #[test]
    fn all_invalid_fields_are_reported() {
        let profile = WeightProfile {
            email_collection_weight: -0.5,
            vector_backend_weight: f64::NAN,
            reranker_weight: 1.5,
            recency_decay_days: 0,
            ..Default::default()
        };
        let errors = profile.validate_at("weights");
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "weights.email_collection_weight",
                "weights.vector_backend_weight",
                "weights.reranker_weight",
                "weights.recency_decay_days",
            ]
        );
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let store = WeightConfigStore::default();
        let update = WeightUpdate {
            vector_backend_weight: Some(1.1),
            document_collection_weight: Some(1.5),
            ..Default::default()
        };
        let updated = store.update(&update).unwrap();

        assert_eq!(updated.vector_backend_weight, 1.1);
        assert_eq!(updated.document_collection_weight, 1.5);
        assert_eq!(updated.reranker_weight, 0.7);
        assert_eq!(*store.get(), *updated);
    }

    #[test]
    fn zero_weights_are_allowed() {
        let store = WeightConfigStore::default();
        let profile = WeightProfile {
            email_collection_weight: 0.0,
            recency_weight: 0.0,
            reranker_weight: 0.0,
            ..Default::default()
        };
        assert!(store.set(profile.clone()).is_ok());
        assert_eq!(*store.get(), profile);
    }

    #[test]
    fn held_snapshot_is_unaffected_by_later_updates() {
        let store = WeightConfigStore::default();
        let snapshot = store.get();
        store
            .update(&WeightUpdate {
                recency_weight: Some(0.9),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(snapshot.recency_weight, 0.2);
        assert_eq!(store.get().recency_weight, 0.9);
    }

    #[test]
    fn concurrent_readers_see_whole_profiles() {
        let store = Arc::new(WeightConfigStore::default());
        let a = WeightProfile {
            vector_backend_weight: 2.0,
            fulltext_backend_weight: 2.0,
            ..Default::default()
        };
        let b = WeightProfile {
            vector_backend_weight: 3.0,
            fulltext_backend_weight: 3.0,
            ..Default::default()
        };

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..500 {
                    let p = if i % 2 == 0 { a.clone() } else { b.clone() };
                    store.set(p).unwrap();
                }
            })
        };

        for _ in 0..500 {
            let p = store.get();
            assert_eq!(p.vector_backend_weight, p.fulltext_backend_weight);
        }
        writer.join().unwrap();
    }

    #[test]
    fn json_update_names_unknown_and_mistyped_fields() {
        let body = serde_json::json!({
            "recency_decay_days": 30.5,
            "reranker_weight": "high",
            "chromadb_weight": 1.0,
            "vector_backend_weight": 1.2,
        });
        let errors = WeightUpdate::from_json(&body).unwrap_err();

        let mut fields: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        fields.sort();
        assert_eq!(fields, vec!["chromadb_weight", "recency_decay_days", "reranker_weight"]);
    }

    #[test]
    fn json_update_accepts_integers_for_weights() {
        let body = serde_json::json!({"vector_backend_weight": 2, "recency_decay_days": 30, "reranker_weight": null});
        let update = WeightUpdate::from_json(&body).unwrap();
        assert_eq!(update.vector_backend_weight, Some(2.0));
        assert_eq!(update.recency_decay_days, Some(30));
        assert_eq!(update.reranker_weight, None);

        assert!(WeightUpdate::from_json(&serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn resolve_does_not_touch_the_store() {
        let store = WeightConfigStore::default();
        let update = WeightUpdate {
            email_collection_weight: Some(3.0),
            ..Default::default()
        };

        let resolved = store.resolve(Some(&update)).unwrap();
        assert_eq!(resolved.email_collection_weight, 3.0);
        assert_eq!(store.get().email_collection_weight, 1.0);

        let bad = WeightUpdate {
            reranker_weight: Some(2.0),
            ..Default::default()
        };
        assert!(store.resolve(Some(&bad)).is_err());
        assert_eq!(*store.resolve(None).unwrap(), WeightProfile::default());
    }

    #[test]
    fn update_deserializes_from_subset() {
        let update: WeightUpdate = serde_json::from_str(r#"{"recency_decay_days": 30}"#).unwrap();
        assert_eq!(update.recency_decay_days, Some(30));
        assert_eq!(update.reranker_weight, None);
    }
}

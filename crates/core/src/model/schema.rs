use std::collections::BTreeMap;
use std::collections::HashSet;

use thiserror::Error;

use super::answer::{Answer, AnswerError, AnswerKind};
use super::ids::{StepKey, StepKeyError};

/// Declaration of a single step: its key, a stable name and its value kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    key: StepKey,
    name: String,
    kind: AnswerKind,
}

impl StepSpec {
    #[must_use]
    pub fn key(&self) -> StepKey {
        self.key
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> AnswerKind {
        self.kind
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SchemaError {
    #[error(transparent)]
    InvalidKey(#[from] StepKeyError),
    #[error("step {0} declared twice")]
    DuplicateStep(StepKey),
    #[error("step name {0:?} declared twice")]
    DuplicateName(String),
    #[error("step name must not be empty")]
    EmptyName,
}

/// Registry mapping step keys to their declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSchema {
    steps: BTreeMap<StepKey, StepSpec>,
}

#[derive(Debug, Default)]
pub struct StepSchemaBuilder {
    pending: Vec<(u32, String, AnswerKind)>,
}

impl StepSchemaBuilder {
    #[must_use]
    pub fn step(mut self, key: u32, name: impl Into<String>, kind: AnswerKind) -> Self {
        self.pending.push((key, name.into(), kind));
        self
    }

    /// Finish the schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` on a zero key, an empty name or a duplicate key/name.
    pub fn build(self) -> Result<StepSchema, SchemaError> {
        let mut steps = BTreeMap::new();
        let mut names = HashSet::new();
        for (raw, name, kind) in self.pending {
            let key = StepKey::new(raw)?;
            let name = name.trim().to_owned();
            if name.is_empty() {
                return Err(SchemaError::EmptyName);
            }
            if !names.insert(name.clone()) {
                return Err(SchemaError::DuplicateName(name));
            }
            if steps.contains_key(&key) {
                return Err(SchemaError::DuplicateStep(key));
            }
            steps.insert(key, StepSpec { key, name, kind });
        }
        Ok(StepSchema { steps })
    }
}

impl StepSchema {
    #[must_use]
    pub fn builder() -> StepSchemaBuilder {
        StepSchemaBuilder::default()
    }

    /// Default schema of the financial intake questionnaire.
    #[must_use]
    pub fn intake() -> Self {
        use AnswerKind::{Boolean, Integer, Json, Text, Url};

        const STEPS: &[(u32, &str, AnswerKind)] = &[
            (1, "project_type", Text),
            (2, "initial_investment", Integer),
            (3, "monthly_savings", Text),
            (4, "investment_horizon", Text),
            (5, "has_existing_investments", Boolean),
            (6, "existing_investments", Json),
            (7, "household_status", Text),
            (8, "dependents", Integer),
            (9, "profession", Text),
            (10, "annual_income", Text),
            (11, "monthly_expenses", Integer),
            (12, "real_estate_assets", Integer),
            (13, "liquid_savings", Integer),
            (14, "outstanding_debts", Integer),
            (15, "tax_bracket", Text),
            (16, "knows_equities", Boolean),
            (17, "knows_bonds", Boolean),
            (18, "knows_funds", Boolean),
            (19, "past_losses", Boolean),
            (20, "reaction_to_drop", Text),
            (21, "risk_tolerance", Text),
            (22, "loss_capacity", Text),
            (23, "esg_preference", Boolean),
            (24, "esg_themes", Json),
            (25, "allocation_preference", Json),
            (26, "identity_document", Url),
            (27, "proof_of_address", Url),
            (28, "proof_of_income", Url),
            (29, "tax_notice", Url),
            (30, "bank_details", Url),
            (31, "first_name", Text),
            (32, "last_name", Text),
            (33, "birth_date", Text),
            (34, "email", Text),
            (35, "phone", Text),
            (36, "address", Text),
            (37, "nationality", Text),
            (38, "us_person", Boolean),
            (39, "politically_exposed", Boolean),
            (40, "terms_accepted", Boolean),
        ];

        let mut steps = BTreeMap::new();
        for &(raw, name, kind) in STEPS {
            if let Ok(key) = StepKey::new(raw) {
                steps.insert(
                    key,
                    StepSpec {
                        key,
                        name: name.to_owned(),
                        kind,
                    },
                );
            }
        }
        Self { steps }
    }

    #[must_use]
    pub fn get(&self, key: StepKey) -> Option<&StepSpec> {
        self.steps.get(&key)
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&StepSpec> {
        self.steps.values().find(|spec| spec.name == name)
    }

    #[must_use]
    pub fn contains(&self, key: StepKey) -> bool {
        self.steps.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepSpec> {
        self.steps.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Decode `raw` as the kind declared for `key`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::UnknownStep` for undeclared keys and
    /// `AnswerError::InvalidValue` when `raw` does not decode.
    pub fn validate(&self, key: StepKey, raw: &str) -> Result<Answer, AnswerError> {
        let spec = self.get(key).ok_or(AnswerError::UnknownStep(key))?;
        Answer::decode(spec.kind, raw).map_err(|source| AnswerError::InvalidValue {
            step: key,
            kind: spec.kind,
            source,
        })
    }

    /// Check a typed answer against the kind declared for `key`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::UnknownStep` or `AnswerError::KindMismatch`.
    pub fn check(&self, key: StepKey, answer: &Answer) -> Result<(), AnswerError> {
        let spec = self.get(key).ok_or(AnswerError::UnknownStep(key))?;
        if spec.kind == answer.kind() {
            Ok(())
        } else {
            Err(AnswerError::KindMismatch {
                step: key,
                expected: spec.kind,
                found: answer.kind(),
            })
        }
    }
}

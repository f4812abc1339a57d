use serde::{Deserialize, Serialize};

/// Attributes computed by the advisory backend from a session's answers.
///
/// This workspace never writes them; they are read to drive later screens
/// (envelope selection, insurance summary).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFields {
    pub risk_score: Option<i64>,
    pub color_code: Option<String>,
}

impl DerivedFields {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.risk_score.is_none() && self.color_code.is_none()
    }
}

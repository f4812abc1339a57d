use std::collections::BTreeMap;
use std::sync::Arc;

use intake_core::graph::{GraphError, Navigation, StepGraph, Transition};
use intake_core::model::StepKey;
use tracing::{info, warn};

use crate::answer_store::AnswerStore;
use crate::error::{AnswerStoreError, WizardError};

/// Generic driver walking the intake pages of a [`StepGraph`].
///
/// A page only advances once its answers are stored: a failed save returns
/// [`WizardError::NotSaved`] and the caller stays on the page, free to submit
/// the same answers again.
#[derive(Clone)]
pub struct WizardDriver {
    store: Arc<AnswerStore>,
    graph: Arc<StepGraph>,
}

impl WizardDriver {
    #[must_use]
    pub fn new(store: Arc<AnswerStore>, graph: StepGraph) -> Self {
        Self {
            store,
            graph: Arc::new(graph),
        }
    }

    /// Stored answers for the steps owned by `route`.
    ///
    /// # Errors
    ///
    /// Returns `WizardError::Graph` if `route` is not a page.
    pub async fn hydrate(&self, route: &str) -> Result<BTreeMap<StepKey, String>, WizardError> {
        let page = self
            .graph
            .page(route)
            .ok_or_else(|| GraphError::UnknownRoute(route.to_owned()))?;
        Ok(self.store.get_responses(page.steps()).await)
    }

    /// Save a page and resolve where the visitor goes next.
    ///
    /// # Errors
    ///
    /// Returns `WizardError::Graph` for unknown routes,
    /// `WizardError::StepNotOnPage` for foreign steps, `WizardError::Invalid`
    /// for values rejected by the schema and `WizardError::NotSaved` when
    /// the backend did not store the answers.
    pub async fn submit(
        &self,
        route: &str,
        answers: Vec<(StepKey, String)>,
    ) -> Result<Navigation, WizardError> {
        let page = self
            .graph
            .page(route)
            .ok_or_else(|| GraphError::UnknownRoute(route.to_owned()))?;
        if let Some((step, _)) = answers.iter().find(|(step, _)| !page.owns(*step)) {
            return Err(WizardError::StepNotOnPage {
                route: route.to_owned(),
                step: *step,
            });
        }

        self.store
            .update_responses(&answers)
            .await
            .map_err(|err| match err {
                AnswerStoreError::Answer(invalid) => WizardError::Invalid(invalid),
                AnswerStoreError::Storage(source) => {
                    warn!(route, error = %source, "page not saved; navigation blocked");
                    WizardError::NotSaved {
                        route: route.to_owned(),
                        source,
                    }
                }
            })?;

        let branch_step = match page.next() {
            Transition::Branch { step, .. } => Some(*step),
            Transition::Goto(_) | Transition::Finish => None,
        };
        let branch_value = match branch_step {
            Some(step) => match answers.iter().rev().find(|(s, _)| *s == step) {
                Some((_, value)) => Some(value.clone()),
                None => self.store.get_response(step).await,
            },
            None => None,
        };

        let navigation = self.graph.next(route, |step| {
            if Some(step) == branch_step {
                branch_value.as_deref()
            } else {
                None
            }
        })?;
        info!(route, next = ?navigation, "page saved");
        Ok(navigation)
    }

    /// First page on the visitor's path with an unanswered step.
    ///
    /// Returns `None` once every page on the path is answered.
    pub async fn resume(&self) -> Option<String> {
        let steps: Vec<StepKey> = self
            .graph
            .pages()
            .flat_map(|page| page.steps().iter().copied())
            .collect();
        let answers = self.store.get_responses(&steps).await;

        self.graph
            .path(|step| answers.get(&step).map(String::as_str))
            .into_iter()
            .find(|page| page.steps().iter().any(|step| !answers.contains_key(step)))
            .map(|page| page.route().to_owned())
    }
}

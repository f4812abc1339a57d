use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::model::StepKey;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphError {
    #[error("a wizard needs at least one page")]
    Empty,
    #[error("route {0:?} declared twice")]
    DuplicateRoute(String),
    #[error("entry route {0:?} is not a page")]
    UnknownEntry(String),
    #[error("route {from:?} leads to unknown route {to:?}")]
    UnknownTarget { from: String, to: String },
    #[error("step {step} is owned by both {first:?} and {second:?}")]
    StepOwnedTwice {
        step: StepKey,
        first: String,
        second: String,
    },
    #[error("route {route:?} branches on step {step}, which no page owns")]
    UnownedBranchStep { route: String, step: StepKey },
    #[error("route {route:?} branches on step {step}, owned by later page {owner:?}")]
    BranchStepNotBefore {
        route: String,
        step: StepKey,
        owner: String,
    },
    #[error("unknown route {0:?}")]
    UnknownRoute(String),
}

//
// ─── PAGES ─────────────────────────────────────────────────────────────────────
//

/// What happens after a page has been saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Goto(String),
    /// Compare the stored answer of `step` against `equals` (trimmed,
    /// ASCII case-insensitive). A missing answer takes `otherwise`.
    Branch {
        step: StepKey,
        equals: String,
        then: String,
        otherwise: String,
    },
    Finish,
}

impl Transition {
    #[must_use]
    pub fn goto(route: impl Into<String>) -> Self {
        Self::Goto(route.into())
    }

    #[must_use]
    pub fn branch(
        step: StepKey,
        equals: impl Into<String>,
        then: impl Into<String>,
        otherwise: impl Into<String>,
    ) -> Self {
        Self::Branch {
            step,
            equals: equals.into(),
            then: then.into(),
            otherwise: otherwise.into(),
        }
    }

    fn targets(&self) -> Vec<&str> {
        match self {
            Transition::Goto(to) => vec![to.as_str()],
            Transition::Branch {
                then, otherwise, ..
            } => vec![then.as_str(), otherwise.as_str()],
            Transition::Finish => Vec::new(),
        }
    }
}

/// One wizard screen: the steps it owns and where it leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    route: String,
    steps: Vec<StepKey>,
    next: Transition,
}

impl Page {
    #[must_use]
    pub fn new(route: impl Into<String>, steps: Vec<StepKey>, next: Transition) -> Self {
        Self {
            route: route.into(),
            steps,
            next,
        }
    }

    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    #[must_use]
    pub fn steps(&self) -> &[StepKey] {
        &self.steps
    }

    #[must_use]
    pub fn next(&self) -> &Transition {
        &self.next
    }

    #[must_use]
    pub fn owns(&self, step: StepKey) -> bool {
        self.steps.contains(&step)
    }
}

/// Outcome of resolving a page's transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Next(String),
    Finished,
}

/// Routes reachable from `from` by following transitions, excluding `from`
/// unless it lies on a cycle.
fn reachable<'p>(
    pages: &'p [Page],
    index: &HashMap<String, usize>,
    from: &str,
) -> HashSet<&'p str> {
    let mut seen = HashSet::new();
    let mut stack: Vec<&str> = index
        .get(from)
        .map(|&i| pages[i].next.targets())
        .unwrap_or_default();
    while let Some(route) = stack.pop() {
        let Some(&i) = index.get(route) else {
            continue;
        };
        let page = &pages[i];
        if seen.insert(page.route.as_str()) {
            stack.extend(page.next.targets());
        }
    }
    seen
}

//
// ─── GRAPH ─────────────────────────────────────────────────────────────────────
//

/// Declarative page sequence consumed by the wizard driver.
///
/// # Examples
///
/// ```
/// # use intake_core::graph::{Navigation, Page, StepGraph, Transition};
/// # use intake_core::model::StepKey;
/// let s1 = StepKey::new(1)?;
/// let graph = StepGraph::new(
///     "project",
///     vec![
///         Page::new("project", vec![s1], Transition::goto("done")),
///         Page::new("done", vec![], Transition::Finish),
///     ],
/// )?;
/// let next = graph.next("project", |_| None)?;
/// assert_eq!(next, Navigation::Next("done".into()));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct StepGraph {
    entry: String,
    pages: Vec<Page>,
    index: HashMap<String, usize>,
}

impl StepGraph {
    /// Build and validate a graph.
    ///
    /// # Errors
    ///
    /// Returns `GraphError` if the graph is empty, a route is duplicated or
    /// unreachable by name, a step belongs to two pages, or a branch tests a
    /// step that is not owned by the branching page or one leading to it.
    pub fn new(entry: impl Into<String>, pages: Vec<Page>) -> Result<Self, GraphError> {
        let entry = entry.into();
        if pages.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut index = HashMap::with_capacity(pages.len());
        let mut owners: HashMap<StepKey, &str> = HashMap::new();
        for (i, page) in pages.iter().enumerate() {
            if index.insert(page.route.clone(), i).is_some() {
                return Err(GraphError::DuplicateRoute(page.route.clone()));
            }
            let mut seen = HashSet::new();
            for step in &page.steps {
                if !seen.insert(*step) {
                    continue;
                }
                if let Some(first) = owners.insert(*step, page.route.as_str()) {
                    return Err(GraphError::StepOwnedTwice {
                        step: *step,
                        first: first.to_owned(),
                        second: page.route.clone(),
                    });
                }
            }
        }

        if !index.contains_key(&entry) {
            return Err(GraphError::UnknownEntry(entry));
        }

        for page in &pages {
            for target in page.next.targets() {
                if !index.contains_key(target) {
                    return Err(GraphError::UnknownTarget {
                        from: page.route.clone(),
                        to: target.to_owned(),
                    });
                }
            }
            if let Transition::Branch { step, .. } = &page.next {
                let Some(owner) = owners.get(step).copied() else {
                    return Err(GraphError::UnownedBranchStep {
                        route: page.route.clone(),
                        step: *step,
                    });
                };
                // The owner must be this page or one the visitor passes first.
                if owner != page.route
                    && !reachable(&pages, &index, owner).contains(page.route.as_str())
                {
                    return Err(GraphError::BranchStepNotBefore {
                        route: page.route.clone(),
                        step: *step,
                        owner: owner.to_owned(),
                    });
                }
            }
        }

        Ok(Self {
            entry,
            pages,
            index,
        })
    }

    /// The hand-wired intake sequence, expressed as data.
    ///
    /// # Panics
    ///
    /// Panics if the built-in table is inconsistent; covered by tests.
    #[must_use]
    pub fn intake() -> Self {
        fn keys(range: std::ops::RangeInclusive<u32>) -> Vec<StepKey> {
            range.filter_map(|n| StepKey::new(n).ok()).collect()
        }
        let step = |n: u32| keys(n..=n)[0];

        let pages = vec![
            Page::new("project", keys(1..=1), Transition::goto("amount")),
            Page::new("amount", keys(2..=2), Transition::goto("savings")),
            Page::new("savings", keys(3..=4), Transition::goto("holdings")),
            Page::new(
                "holdings",
                keys(5..=5),
                Transition::branch(step(5), "true", "holdings-detail", "household"),
            ),
            Page::new("holdings-detail", keys(6..=6), Transition::goto("household")),
            Page::new("household", keys(7..=9), Transition::goto("income")),
            Page::new("income", keys(10..=11), Transition::goto("assets")),
            Page::new("assets", keys(12..=15), Transition::goto("knowledge")),
            Page::new("knowledge", keys(16..=19), Transition::goto("risk")),
            Page::new("risk", keys(20..=22), Transition::goto("sustainability")),
            Page::new(
                "sustainability",
                keys(23..=23),
                Transition::branch(step(23), "true", "sustainability-themes", "allocation"),
            ),
            Page::new(
                "sustainability-themes",
                keys(24..=24),
                Transition::goto("allocation"),
            ),
            Page::new("allocation", keys(25..=25), Transition::goto("documents")),
            Page::new("documents", keys(26..=30), Transition::goto("identity")),
            Page::new("identity", keys(31..=37), Transition::goto("declarations")),
            Page::new("declarations", keys(38..=39), Transition::goto("signature")),
            Page::new("signature", keys(40..=40), Transition::Finish),
        ];

        Self::new("project", pages).expect("built-in intake graph is consistent")
    }

    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    #[must_use]
    pub fn page(&self, route: &str) -> Option<&Page> {
        self.index.get(route).map(|&i| &self.pages[i])
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }

    /// Resolve where `route` leads, given a lookup of stored raw answers.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::UnknownRoute` if `route` is not a page.
    pub fn next<'a, F>(&self, route: &str, lookup: F) -> Result<Navigation, GraphError>
    where
        F: Fn(StepKey) -> Option<&'a str>,
    {
        let page = self
            .page(route)
            .ok_or_else(|| GraphError::UnknownRoute(route.to_owned()))?;
        Ok(match &page.next {
            Transition::Goto(to) => Navigation::Next(to.clone()),
            Transition::Branch {
                step,
                equals,
                then,
                otherwise,
            } => {
                let taken = lookup(*step)
                    .is_some_and(|raw| raw.trim().eq_ignore_ascii_case(equals.trim()));
                Navigation::Next(if taken { then.clone() } else { otherwise.clone() })
            }
            Transition::Finish => Navigation::Finished,
        })
    }

    /// Pages visited from the entry when following `lookup`, in order.
    ///
    /// Stops at `Finish` or on the first revisited route.
    pub fn path<'a, F>(&self, lookup: F) -> Vec<&Page>
    where
        F: Fn(StepKey) -> Option<&'a str>,
    {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.entry.clone();
        while visited.insert(current.clone()) {
            let Some(page) = self.page(&current) else {
                break;
            };
            path.push(page);
            match self.next(&current, &lookup) {
                Ok(Navigation::Next(to)) => current = to,
                _ => break,
            }
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn key(n: u32) -> StepKey {
        StepKey::new(n).unwrap()
    }

    #[test]
    fn intake_graph_is_valid() {
        let graph = StepGraph::intake();
        assert_eq!(graph.entry(), "project");
        assert!(graph.page("signature").is_some());
        let owned: usize = graph.pages().map(|p| p.steps().len()).sum();
        assert_eq!(owned, 40);
    }

    #[test]
    fn branch_follows_stored_answer() {
        let graph = StepGraph::intake();
        let yes = graph.next("holdings", |_| Some(" TRUE ")).unwrap();
        assert_eq!(yes, Navigation::Next("holdings-detail".into()));
        let no = graph.next("holdings", |_| Some("false")).unwrap();
        assert_eq!(no, Navigation::Next("household".into()));
        let missing = graph.next("holdings", |_| None).unwrap();
        assert_eq!(missing, Navigation::Next("household".into()));
    }

    #[test]
    fn last_page_finishes() {
        let graph = StepGraph::intake();
        assert_eq!(graph.next("signature", |_| None).unwrap(), Navigation::Finished);
        assert_eq!(
            graph.next("nowhere", |_| None),
            Err(GraphError::UnknownRoute("nowhere".into()))
        );
    }

    #[test]
    fn path_skips_untaken_branches() {
        let graph = StepGraph::intake();
        let answers: HashMap<StepKey, &str> = [(key(5), "false"), (key(23), "true")].into();
        let routes: Vec<&str> = graph
            .path(|k| answers.get(&k).copied())
            .into_iter()
            .map(Page::route)
            .collect();
        assert!(!routes.contains(&"holdings-detail"));
        assert!(routes.contains(&"sustainability-themes"));
        assert_eq!(routes.first(), Some(&"project"));
        assert_eq!(routes.last(), Some(&"signature"));
    }

    #[test]
    fn rejects_unknown_targets_and_entries() {
        let err = StepGraph::new(
            "a",
            vec![Page::new("a", vec![key(1)], Transition::goto("b"))],
        )
        .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownTarget {
                from: "a".into(),
                to: "b".into()
            }
        );

        let err = StepGraph::new("x", vec![Page::new("a", vec![], Transition::Finish)])
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownEntry("x".into()));
        assert_eq!(StepGraph::new("a", Vec::new()).unwrap_err(), GraphError::Empty);
    }

    #[test]
    fn rejects_shared_steps_and_unowned_branches() {
        let err = StepGraph::new(
            "a",
            vec![
                Page::new("a", vec![key(1)], Transition::goto("b")),
                Page::new("b", vec![key(1)], Transition::Finish),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::StepOwnedTwice { .. }));

        let err = StepGraph::new(
            "a",
            vec![
                Page::new("a", vec![key(1)], Transition::branch(key(9), "x", "b", "b")),
                Page::new("b", vec![], Transition::Finish),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::UnownedBranchStep { .. }));
    }

    #[test]
    fn rejects_branch_on_later_page() {
        let err = StepGraph::new(
            "a",
            vec![
                Page::new("a", vec![key(1)], Transition::branch(key(2), "x", "b", "b")),
                Page::new("b", vec![key(2)], Transition::Finish),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            GraphError::BranchStepNotBefore {
                route: "a".into(),
                step: key(2),
                owner: "b".into(),
            }
        );
    }

    #[test]
    fn accepts_branch_on_earlier_page() {
        let graph = StepGraph::new(
            "a",
            vec![
                Page::new("a", vec![key(1)], Transition::goto("b")),
                Page::new("b", vec![key(2)], Transition::branch(key(1), "yes", "c", "d")),
                Page::new("c", vec![], Transition::goto("d")),
                Page::new("d", vec![], Transition::Finish),
            ],
        )
        .unwrap();
        assert_eq!(
            graph.next("b", |_| Some("YES")).unwrap(),
            Navigation::Next("c".into())
        );
    }

    #[test]
    fn rejects_duplicate_routes() {
        let err = StepGraph::new(
            "a",
            vec![
                Page::new("a", vec![], Transition::Finish),
                Page::new("a", vec![], Transition::Finish),
            ],
        )
        .unwrap_err();
        assert_eq!(err, GraphError::DuplicateRoute("a".into()));
    }
}
